use crate::error::TransportError;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    /// The event's `id:` field, if any — tracked so the caller can resume
    /// with `Last-Event-ID` after a reconnect (spec §4.3.1).
    pub id: Option<String>,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseEventParser {
    current_event: Option<String>,
    current_id: Option<String>,
    data: String,
}

impl SseEventParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed_line(&mut self, raw_line: &str) -> Option<SseEvent> {
        let line = raw_line.trim_end_matches(['\r', '\n']);

        if line.is_empty() {
            if self.current_event.is_none() && self.current_id.is_none() && self.data.is_empty() {
                return None;
            }

            let event = SseEvent {
                event_type: self.current_event.take(),
                id: self.current_id.clone(),
                data: std::mem::take(&mut self.data),
            };
            return Some(event);
        }

        if line.starts_with(":") {
            return None;
        }

        if let Some(stripped) = line.strip_prefix("event:") {
            let value = stripped.trim_start();
            self.current_event = if value.is_empty() { None } else { Some(value.to_string()) };
            return None;
        }

        if let Some(stripped) = line.strip_prefix("id:") {
            let value = stripped.trim_start();
            // A bare "id:" clears the last event id, per the SSE spec; we
            // mirror that rather than silently keeping a stale id around.
            self.current_id = if value.is_empty() { None } else { Some(value.to_string()) };
            return None;
        }

        if let Some(stripped) = line.strip_prefix("data:") {
            let value = stripped.trim_start();
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(value);
            return None;
        }

        None
    }
}

pub fn resolve_rpc_url(sse_url: &Url, endpoint: &str) -> Result<Url, TransportError> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err(TransportError::Custom("empty RPC endpoint announced".to_string()));
    }

    match Url::parse(trimmed) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => sse_url.join(trimmed).map_err(TransportError::from),
        Err(err) => Err(TransportError::from(err)),
    }
}

/// Session-expiry detection (spec §4.3.1): HTTP 404 plus a message matching
/// any of the known phrases, or any 404 that isn't about a missing tool.
pub fn is_session_expired_response(status: reqwest::StatusCode, body: &str) -> bool {
    if status != reqwest::StatusCode::NOT_FOUND {
        return false;
    }
    let lower = body.to_lowercase();
    let session_not_found = lower.contains("session") && lower.contains("not found");
    const MARKERS: [&str; 3] = ["session expired", "invalid session", "session is no longer valid"];
    session_not_found || MARKERS.iter().any(|m| lower.contains(m)) || !lower.contains("tool")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/v1/sse").unwrap()
    }

    #[test]
    fn resolves_relative_endpoint() {
        let url = resolve_rpc_url(&base_url(), "mcp").expect("url");
        assert_eq!(url.as_str(), "https://example.com/v1/mcp");
    }

    #[test]
    fn resolves_absolute_path_endpoint() {
        let url = resolve_rpc_url(&base_url(), "/bridge/mcp").expect("url");
        assert_eq!(url.as_str(), "https://example.com/bridge/mcp");
    }

    #[test]
    fn resolves_full_url_endpoint() {
        let url = resolve_rpc_url(&base_url(), "https://api.example.com/mcp").expect("url");
        assert_eq!(url.as_str(), "https://api.example.com/mcp");
    }

    #[test]
    fn parses_endpoint_event() {
        let mut parser = SseEventParser::new();
        assert!(parser.feed_line("event: endpoint").is_none());
        assert!(parser.feed_line("data: /mcp").is_none());
        let event = parser.feed_line("").expect("event");
        assert_eq!(event.event_type.as_deref(), Some("endpoint"));
        assert_eq!(event.data, "/mcp");
    }

    #[test]
    fn parser_ignores_comment_lines() {
        let mut parser = SseEventParser::new();
        assert!(parser.feed_line(": this is a comment").is_none());
        assert!(parser.feed_line(":another comment").is_none());
        assert!(parser.feed_line("").is_none());
    }

    #[test]
    fn parser_handles_multiline_data() {
        let mut parser = SseEventParser::new();
        assert!(parser.feed_line("data: line1").is_none());
        assert!(parser.feed_line("data: line2").is_none());
        assert!(parser.feed_line("data: line3").is_none());
        let event = parser.feed_line("").expect("event");
        assert!(event.event_type.is_none());
        assert_eq!(event.data, "line1\nline2\nline3");
    }

    #[test]
    fn parser_tracks_last_event_id_across_events() {
        let mut parser = SseEventParser::new();
        assert!(parser.feed_line("id: 42").is_none());
        assert!(parser.feed_line("data: first").is_none());
        let event = parser.feed_line("").expect("event");
        assert_eq!(event.id.as_deref(), Some("42"));
    }

    #[test]
    fn parser_handles_crlf_line_endings() {
        let mut parser = SseEventParser::new();
        assert!(parser.feed_line("data: test\r\n").is_none());
        let event = parser.feed_line("\r\n").expect("event");
        assert_eq!(event.data, "test");
    }

    #[test]
    fn session_expired_detected_on_404_with_matching_phrase() {
        assert!(is_session_expired_response(
            reqwest::StatusCode::NOT_FOUND,
            "Error: session not found"
        ));
        assert!(is_session_expired_response(
            reqwest::StatusCode::NOT_FOUND,
            "the session is no longer valid"
        ));
    }

    #[test]
    fn session_expired_not_reported_for_unrelated_404() {
        assert!(!is_session_expired_response(
            reqwest::StatusCode::NOT_FOUND,
            "unknown tool: frobnicate"
        ));
        assert!(!is_session_expired_response(reqwest::StatusCode::BAD_REQUEST, "session not found"));
    }
}
