use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use crate::types::{ActionResult, CallRequest, MessageRequest};

pub const CALL_PATH: &str = "call/start";
pub const MESSAGE_PATH: &str = "sms/send";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The bridge service. One attempt per call; callers decide what to show.
#[async_trait]
pub trait BridgeApi: Send + Sync {
    async fn start_call(&self, request: &CallRequest) -> Result<ActionResult>;

    async fn send_message(&self, request: &MessageRequest) -> Result<ActionResult>;
}

pub struct HttpBridgeApi {
    client: Client,
    base_url: String,
}

impl HttpBridgeApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(BridgeError::Config("backend URL is not set".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<ActionResult> {
        let url = self.endpoint(path);
        debug!(%url, "posting to bridge service");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        let result = interpret_response(status, &text);
        if let Err(ref e) = result {
            warn!(%url, %status, "bridge request failed: {}", e);
        }
        result
    }
}

#[async_trait]
impl BridgeApi for HttpBridgeApi {
    async fn start_call(&self, request: &CallRequest) -> Result<ActionResult> {
        self.post(CALL_PATH, request).await
    }

    async fn send_message(&self, request: &MessageRequest) -> Result<ActionResult> {
        self.post(MESSAGE_PATH, request).await
    }
}

/// Turns a completed exchange into an outcome.
///
/// A body shaped like an `ActionResult` is returned as-is, whatever the
/// status. Any other JSON error body becomes a rejection carrying its
/// `detail` or `message`. An unreadable body on a 2xx counts as a transport
/// failure because the exchange produced nothing usable.
pub fn interpret_response(status: StatusCode, body: &str) -> Result<ActionResult> {
    let json: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) if status.is_success() => {
            return Err(BridgeError::Transport(format!(
                "invalid response from bridge service: {e}"
            )));
        }
        Err(_) => return Err(BridgeError::Rejected(status_line(status))),
    };

    if json.get("success").is_some() {
        return Ok(serde_json::from_value(json)?);
    }

    let reason = ["detail", "message"]
        .iter()
        .find_map(|key| match json.get(*key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        })
        .unwrap_or_else(|| status_line(status));

    if status.is_success() {
        Err(BridgeError::Transport(format!(
            "unexpected response from bridge service: {reason}"
        )))
    } else {
        Err(BridgeError::Rejected(reason))
    }
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
        None => format!("HTTP {}", status.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_body_passes_through_any_status() {
        let ok = interpret_response(StatusCode::OK, r#"{"success":true,"jobdiva_note_created":true}"#)
            .unwrap();
        assert!(ok.success && ok.note_created);

        let refused = interpret_response(
            StatusCode::BAD_REQUEST,
            r#"{"success":false,"message":"No mapping for recruiter"}"#,
        )
        .unwrap();
        assert!(!refused.success);
        assert_eq!(refused.message.as_deref(), Some("No mapping for recruiter"));
    }

    #[test]
    fn error_detail_becomes_rejection() {
        let err = interpret_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"detail":"Failed to initiate call via GoTo Connect"}"#,
        )
        .unwrap_err();
        match err {
            BridgeError::Rejected(m) => assert_eq!(m, "Failed to initiate call via GoTo Connect"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_json_error_uses_status_line() {
        let err = interpret_response(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.to_string(), "HTTP 502 Bad Gateway");
    }

    #[test]
    fn garbage_on_success_is_a_transport_failure() {
        let err = interpret_response(StatusCode::OK, "not json").unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
    }

    #[test]
    fn empty_base_url_is_rejected() {
        assert!(matches!(
            HttpBridgeApi::new("  ", DEFAULT_TIMEOUT),
            Err(BridgeError::Config(_))
        ));
        let api = HttpBridgeApi::new("https://bridge.test/api/", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(api.endpoint(CALL_PATH), "https://bridge.test/api/call/start");
    }
}
