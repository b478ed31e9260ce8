use serde::{Deserialize, Serialize};

/// Name used when no candidate name can be found on the page.
pub const UNKNOWN_CANDIDATE: &str = "Unknown Candidate";
/// Name used when neither the stored record nor the page names the operator.
pub const UNKNOWN_OPERATOR: &str = "Unknown Recruiter";

/// Message limit in UTF-16 code units, the unit a textarea's `maxlength`
/// and the counter in the page both use.
pub const MESSAGE_MAX_CHARS: usize = 1000;

/// Length of a message body as the browser counts it.
pub fn message_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Longest prefix of `text` within the message limit. Never splits a
/// character.
pub fn clamp_message(text: &str) -> &str {
    let mut units = 0;
    for (i, c) in text.char_indices() {
        units += c.len_utf16();
        if units > MESSAGE_MAX_CHARS {
            return &text[..i];
        }
    }
    text
}

/// The person on the host page a call or message targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInfo {
    pub candidate_id: Option<String>,
    pub candidate_name: String,
    pub candidate_phone: Option<String>,
}

impl CandidateInfo {
    /// Returns the phone number when the candidate can be contacted.
    pub fn reachable_phone(&self) -> Option<&str> {
        self.candidate_phone.as_deref().filter(|p| !p.is_empty())
    }
}

/// The operator driving the browser. Serialized with the field names the
/// bridge service expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorInfo {
    #[serde(rename = "recruiter_id", default)]
    pub operator_id: Option<String>,
    #[serde(rename = "recruiter_name")]
    pub operator_name: String,
}

impl OperatorInfo {
    pub fn unknown() -> Self {
        Self {
            operator_id: None,
            operator_name: UNKNOWN_OPERATOR.to_string(),
        }
    }
}

/// Entities captured from the page at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub candidate: Option<CandidateInfo>,
    pub operator: OperatorInfo,
}

/// Body of `POST /call/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRequest {
    #[serde(flatten)]
    pub candidate: CandidateInfo,
    #[serde(flatten)]
    pub operator: OperatorInfo,
}

/// Body of `POST /sms/send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRequest {
    #[serde(flatten)]
    pub candidate: CandidateInfo,
    #[serde(flatten)]
    pub operator: OperatorInfo,
    pub message: String,
}

impl MessageRequest {
    /// Builds a request from a raw composed body. Returns `None` when the
    /// trimmed body is empty or exceeds the message limit.
    pub fn new(candidate: CandidateInfo, operator: OperatorInfo, body: &str) -> Option<Self> {
        let message = body.trim();
        if message.is_empty() || message_len(message) > MESSAGE_MAX_CHARS {
            return None;
        }
        Some(Self {
            candidate,
            operator,
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    Call(CallRequest),
    Message(MessageRequest),
}

/// Outcome reported by the bridge service for either action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(rename = "jobdiva_note_created", default)]
    pub note_created: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// Identifier of the created call or message.
    #[serde(default, alias = "goto_call_id", alias = "goto_message_id")]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub interaction_log_id: Option<String>,
    #[serde(default)]
    pub call_method: Option<String>,
    #[serde(default)]
    pub tel_uri: Option<String>,
}

impl ActionResult {
    /// The `tel:` URI to dial by hand when the service could not place the
    /// call itself.
    pub fn manual_dial(&self) -> Option<&str> {
        match self.call_method.as_deref() {
            Some("tel_fallback") => self.tel_uri.as_deref(),
            _ => None,
        }
    }
}
