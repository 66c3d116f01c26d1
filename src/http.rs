use reqwest::Client;
use std::error::Error as StdError;

const BODY_EXCERPT_CHARS: usize = 500;

pub fn build_client() -> Client {
    Client::builder()
        .user_agent(concat!("vps-doctor/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Error text with the whole source chain, e.g. `error sending request: connection refused`.
pub fn describe_error(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.ends_with(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

pub fn body_excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    if trimmed.chars().count() <= BODY_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
    format!("{cut}... (truncated)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_bodies_are_kept() {
        assert_eq!(body_excerpt("  internal error \n"), "internal error");
        assert_eq!(body_excerpt(""), "<empty body>");
    }

    #[test]
    fn long_bodies_are_cut_on_char_boundary() {
        let body = "ж".repeat(BODY_EXCERPT_CHARS + 10);
        let excerpt = body_excerpt(&body);
        assert!(excerpt.ends_with("... (truncated)"));
        assert_eq!(
            excerpt.chars().count(),
            BODY_EXCERPT_CHARS + "... (truncated)".len()
        );
    }

    #[tokio::test]
    async fn describe_error_includes_cause() {
        let client = build_client();
        let err = client
            .get("http://127.0.0.1:9/")
            .send()
            .await
            .expect_err("порт 9 не должен принимать соединения");

        let text = describe_error(&err);
        assert!(text.starts_with(&err.to_string()));
        if let Some(cause) = err.source() {
            assert!(text.contains(&cause.to_string()));
        }
    }
}
