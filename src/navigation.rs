//! Client-side navigation detection.
//!
//! Single-page hosts change the address without reloading, and there is no
//! navigation event to listen for. The page reports its URL on every batch
//! of DOM mutations instead, and the monitor decides whether that URL is new.

use tracing::debug;

pub const DEFAULT_PAGE_MARKERS: &[&str] = &["candidate", "Candidate"];

#[derive(Debug, Clone)]
pub struct NavigationMonitor {
    last_url: String,
}

impl NavigationMonitor {
    pub fn new(initial_url: impl Into<String>) -> Self {
        Self {
            last_url: initial_url.into(),
        }
    }

    pub fn last_url(&self) -> &str {
        &self.last_url
    }

    /// Records `url` and returns true when it differs from the last one seen.
    pub fn observe(&mut self, url: &str) -> bool {
        if url == self.last_url {
            return false;
        }
        debug!(from = %self.last_url, to = %url, "client-side navigation");
        self.last_url = url.to_string();
        true
    }

    /// Re-seeds after a real document load.
    pub fn reset(&mut self, url: &str) {
        self.last_url = url.to_string();
    }
}

/// Whether the URL looks like a page the controls belong on.
pub fn is_candidate_page(url: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| url.contains(m.as_str()))
}

pub fn default_markers() -> Vec<String> {
    DEFAULT_PAGE_MARKERS.iter().map(|m| m.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_urls_never_trigger() {
        let mut monitor = NavigationMonitor::new("https://host.test/candidate?id=1");
        let triggers = (0..50)
            .filter(|_| monitor.observe("https://host.test/candidate?id=1"))
            .count();
        assert_eq!(triggers, 0);
    }

    #[test]
    fn one_change_triggers_once() {
        let mut monitor = NavigationMonitor::new("https://host.test/candidate?id=1");
        let feed = [
            "https://host.test/candidate?id=1",
            "https://host.test/candidate?id=2",
            "https://host.test/candidate?id=2",
            "https://host.test/candidate?id=2",
        ];
        let triggers = feed.iter().filter(|u| monitor.observe(u)).count();
        assert_eq!(triggers, 1);
        assert_eq!(monitor.last_url(), "https://host.test/candidate?id=2");
    }

    #[test]
    fn going_back_counts_as_navigation() {
        let mut monitor = NavigationMonitor::new("a");
        assert!(monitor.observe("b"));
        assert!(monitor.observe("a"));
    }

    #[test]
    fn reset_swallows_the_reloaded_url() {
        let mut monitor = NavigationMonitor::new("a");
        monitor.reset("b");
        assert!(!monitor.observe("b"));
    }

    #[test]
    fn markers_are_case_sensitive_substrings() {
        let markers = default_markers();
        assert!(is_candidate_page("https://host.test/Candidate/Detail", &markers));
        assert!(is_candidate_page("https://host.test/app#/candidate/5", &markers));
        assert!(!is_candidate_page("https://host.test/jobs/5", &markers));
        assert!(!is_candidate_page("https://host.test/CANDIDATE", &markers));
    }
}
