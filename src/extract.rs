//! Entity extraction from the host page.
//!
//! Each field has an ordered chain of selector strategies, most reliable
//! first:
//! 1. Test hooks - `data-testid` attributes
//! 2. Class names - semantic classes the host happens to use
//! 3. Generic tags - headings and `tel:` anchors, most likely to misfire
//!
//! Strategies are pure functions over a `DomSnapshot`; the first one that
//! yields a non-empty value wins.

use tracing::{debug, warn};
use url::Url;

use crate::error::{BridgeError, Result};
use crate::page::{DomSnapshot, NodeText, PageSurface};
use crate::types::{CandidateInfo, OperatorInfo, PageContext, UNKNOWN_CANDIDATE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    TestHook,
    ClassName,
    GenericTag,
}

/// One way of reading a field off the page.
#[derive(Debug, Clone, Copy)]
pub struct Strategy {
    pub selector: &'static str,
    pub tier: Tier,
    read: fn(&NodeText) -> Option<String>,
}

impl Strategy {
    const fn text(selector: &'static str, tier: Tier) -> Self {
        Self {
            selector,
            tier,
            read: read_text,
        }
    }

    const fn tel_link(selector: &'static str, tier: Tier) -> Self {
        Self {
            selector,
            tier,
            read: read_tel_link,
        }
    }

    pub fn apply(&self, snapshot: &DomSnapshot) -> Option<String> {
        snapshot.get(self.selector).and_then(self.read)
    }
}

fn read_text(node: &NodeText) -> Option<String> {
    let text = node.text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn read_tel_link(node: &NodeText) -> Option<String> {
    read_text(node).or_else(|| {
        node.href
            .as_deref()
            .and_then(|h| h.strip_prefix("tel:"))
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
    })
}

pub const CANDIDATE_NAME: &[Strategy] = &[
    Strategy::text(r#"[data-testid="candidate-name"]"#, Tier::TestHook),
    Strategy::text(".candidate-name", Tier::ClassName),
    Strategy::text("h1.candidate-header", Tier::GenericTag),
];

pub const CANDIDATE_PHONE: &[Strategy] = &[
    Strategy::text(r#"[data-testid="candidate-phone"]"#, Tier::TestHook),
    Strategy::text(".candidate-phone", Tier::ClassName),
    Strategy::tel_link(r#"a[href^="tel:"]"#, Tier::GenericTag),
];

pub const CANDIDATE_ID: &[Strategy] = &[
    Strategy::text(r#"[data-testid="candidate-id"]"#, Tier::TestHook),
    Strategy::text(".candidate-id", Tier::ClassName),
];

pub const OPERATOR_NAME: &[Strategy] = &[
    Strategy::text(r#"[data-testid="user-name"]"#, Tier::TestHook),
    Strategy::text(".user-name", Tier::ClassName),
];

/// Query parameters that carry the candidate id, in priority order.
pub const ID_QUERY_PARAMS: &[&str] = &["candidateId", "id"];

/// Every selector a snapshot needs to cover for the chains above.
pub fn snapshot_selectors() -> Vec<&'static str> {
    [CANDIDATE_NAME, CANDIDATE_PHONE, CANDIDATE_ID, OPERATOR_NAME]
        .iter()
        .flat_map(|chain| chain.iter().map(|s| s.selector))
        .collect()
}

/// Runs a chain and returns the first value with the tier it came from.
pub fn first_match(snapshot: &DomSnapshot, chain: &[Strategy]) -> Option<(Tier, String)> {
    chain
        .iter()
        .find_map(|s| s.apply(snapshot).map(|v| (s.tier, v)))
}

/// Keeps digits and a leading `+`. Applying it twice changes nothing.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        out.push('+');
    }
    out.extend(trimmed.chars().filter(char::is_ascii_digit));
    out
}

/// Candidate id from the query string, if the URL parses.
pub fn id_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    ID_QUERY_PARAMS.iter().find_map(|key| {
        parsed
            .query_pairs()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.into_owned())
    })
}

pub fn extract_candidate(snapshot: &DomSnapshot) -> CandidateInfo {
    let candidate_name = first_match(snapshot, CANDIDATE_NAME)
        .map(|(_, v)| v)
        .unwrap_or_else(|| UNKNOWN_CANDIDATE.to_string());

    let candidate_phone = first_match(snapshot, CANDIDATE_PHONE)
        .map(|(_, v)| normalize_phone(&v))
        .filter(|p| p.chars().any(|c| c.is_ascii_digit()));

    let candidate_id = first_match(snapshot, CANDIDATE_ID)
        .map(|(_, v)| v)
        .or_else(|| id_from_url(&snapshot.url));

    debug!(
        name = %candidate_name,
        has_phone = candidate_phone.is_some(),
        id = ?candidate_id,
        "extracted candidate"
    );

    CandidateInfo {
        candidate_id,
        candidate_name,
        candidate_phone,
    }
}

/// The stored operator record wins, then the page, then the sentinel.
pub fn extract_operator(snapshot: &DomSnapshot, stored: Option<&OperatorInfo>) -> OperatorInfo {
    if let Some(op) = stored.filter(|op| !op.operator_name.trim().is_empty()) {
        return op.clone();
    }
    match first_match(snapshot, OPERATOR_NAME) {
        Some((_, name)) => OperatorInfo {
            operator_id: None,
            operator_name: name,
        },
        None => OperatorInfo::unknown(),
    }
}

/// Reads both entities from one snapshot. Fails with `Extraction` when the
/// page cannot be read at all.
pub fn read_context<P: PageSurface + ?Sized>(
    page: &mut P,
    stored: Option<&OperatorInfo>,
) -> Result<PageContext> {
    let snapshot = page
        .snapshot(&snapshot_selectors())
        .map_err(|e| BridgeError::Extraction(e.to_string()))?;
    Ok(PageContext {
        candidate: Some(extract_candidate(&snapshot)),
        operator: extract_operator(&snapshot, stored),
    })
}

/// `read_context` with the failure absorbed: no candidate, and the operator
/// from the stored record or the sentinel.
pub fn capture_context<P: PageSurface + ?Sized>(
    page: &mut P,
    stored: Option<&OperatorInfo>,
) -> PageContext {
    read_context(page, stored).unwrap_or_else(|e| {
        warn!("{}", e);
        PageContext {
            candidate: None,
            operator: stored.cloned().unwrap_or_else(OperatorInfo::unknown),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::MemoryPage;
    use crate::types::UNKNOWN_OPERATOR;

    #[test]
    fn normalize_strips_formatting() {
        assert_eq!(normalize_phone("(415) 555-1234"), "4155551234");
        assert_eq!(normalize_phone("+1 415 555 1234"), "+14155551234");
        assert_eq!(normalize_phone("  +44 (0)20 7946-0958 "), "+4402079460958");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["(415) 555-1234", "+1 415 555 1234", "1+2", "tel 12", "", "+"] {
            let once = normalize_phone(raw);
            assert_eq!(normalize_phone(&once), once, "input {raw:?}");
        }
        assert_eq!(normalize_phone("4155551234"), "4155551234");
        assert_eq!(normalize_phone("+14155551234"), "+14155551234");
    }

    #[test]
    fn only_a_leading_plus_survives() {
        assert_eq!(normalize_phone("1+2"), "12");
        assert_eq!(normalize_phone("ext. +5"), "5");
    }

    #[test]
    fn test_hooks_win_over_classes_and_tags() {
        let snap = DomSnapshot::new("https://host.test/candidate")
            .with_text(r#"[data-testid="candidate-name"]"#, " Ada Lovelace ")
            .with_text(".candidate-name", "Wrong")
            .with_text("h1.candidate-header", "Also wrong");
        assert_eq!(
            first_match(&snap, CANDIDATE_NAME),
            Some((Tier::TestHook, "Ada Lovelace".to_string()))
        );
    }

    #[test]
    fn empty_matches_fall_through_to_next_strategy() {
        let snap = DomSnapshot::new("https://host.test/candidate")
            .with_text(r#"[data-testid="candidate-name"]"#, "   ")
            .with_text("h1.candidate-header", "Ada");
        assert_eq!(
            first_match(&snap, CANDIDATE_NAME),
            Some((Tier::GenericTag, "Ada".to_string()))
        );
    }

    #[test]
    fn tel_anchor_falls_back_to_href() {
        let snap = DomSnapshot::new("https://host.test/candidate").with_link(
            r#"a[href^="tel:"]"#,
            "",
            "tel:+1-415-555-1234",
        );
        let candidate = extract_candidate(&snap);
        assert_eq!(candidate.candidate_phone.as_deref(), Some("+14155551234"));
    }

    #[test]
    fn bare_page_yields_sentinel_and_url_id() {
        let snap = DomSnapshot::new("https://host.test/candidate/view?candidateId=991&id=5");
        let candidate = extract_candidate(&snap);
        assert_eq!(candidate.candidate_name, UNKNOWN_CANDIDATE);
        assert_eq!(candidate.candidate_phone, None);
        assert_eq!(candidate.candidate_id.as_deref(), Some("991"));

        let snap = DomSnapshot::new("https://host.test/candidate?id=5");
        assert_eq!(extract_candidate(&snap).candidate_id.as_deref(), Some("5"));

        let snap = DomSnapshot::new("not a url");
        assert_eq!(extract_candidate(&snap).candidate_id, None);
    }

    #[test]
    fn dom_id_beats_url_id() {
        let snap = DomSnapshot::new("https://host.test/candidate?candidateId=1")
            .with_text(".candidate-id", "C-42");
        assert_eq!(extract_candidate(&snap).candidate_id.as_deref(), Some("C-42"));
    }

    #[test]
    fn phone_without_digits_is_unresolved() {
        let snap = DomSnapshot::new("https://host.test/candidate")
            .with_text(".candidate-phone", "n/a");
        assert_eq!(extract_candidate(&snap).candidate_phone, None);
    }

    #[test]
    fn operator_prefers_stored_record() {
        let snap = DomSnapshot::new("https://host.test").with_text(".user-name", "Page User");
        let stored = OperatorInfo {
            operator_id: Some("r-1".into()),
            operator_name: "Stored".into(),
        };
        assert_eq!(extract_operator(&snap, Some(&stored)), stored);
        assert_eq!(extract_operator(&snap, None).operator_name, "Page User");
        assert_eq!(
            extract_operator(&DomSnapshot::new("x"), None).operator_name,
            UNKNOWN_OPERATOR
        );
    }

    #[test]
    fn unreadable_page_yields_no_candidate_but_an_operator() {
        let mut page = MemoryPage::new("https://host.test/candidate").broken();
        assert!(matches!(
            read_context(&mut page, None),
            Err(BridgeError::Extraction(_))
        ));
        let ctx = capture_context(&mut page, None);
        assert!(ctx.candidate.is_none());
        assert_eq!(ctx.operator, OperatorInfo::unknown());
    }

    #[test]
    fn extraction_does_not_touch_the_page() {
        let mut page = MemoryPage::new("https://host.test/candidate?id=7")
            .with_text(".candidate-name", "Ada")
            .with_text(".candidate-phone", "(415) 555-1234");
        let candidate = capture_context(&mut page, None).candidate.unwrap();
        assert_eq!(candidate.candidate_phone.as_deref(), Some("4155551234"));
        assert_eq!(page.count("jobdiva-goto-bridge-container"), 0);
    }
}
