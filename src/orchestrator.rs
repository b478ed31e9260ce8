//! The call and message workflows.
//!
//! Both are short linear state machines. Each is split at its single network
//! round trip: `begin_*` validates and returns the request to send, and
//! `finish_*` presents whatever came back. Nothing here awaits, so the agent
//! loop stays free while a request is out.

use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::inject::UiInjector;
use crate::page::PageSurface;
use crate::types::{
    ActionResult, CallRequest, CandidateInfo, MessageRequest, OperatorInfo, message_len,
};

pub const MISSING_PHONE: &str = "Unable to extract candidate phone number from the page.";
pub const EMPTY_MESSAGE: &str = "Please enter a message.";
pub const CALL_IN_FLIGHT: &str = "A call is already being started. Please wait for it to finish.";
pub const MESSAGE_IN_FLIGHT: &str = "A message is still being sent. Please wait for it to finish.";

/// Synchronous decision surface. Implementations may block (modal dialogs)
/// or not, but `confirm` must return the operator's answer.
pub trait Prompter {
    fn confirm(&mut self, text: &str) -> bool;

    fn notify(&mut self, text: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Validating,
    Confirming,
    Requesting,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Idle,
    Validating,
    Composing,
    Sending,
    Succeeded,
    Failed,
}

#[derive(Debug)]
pub struct Orchestrator {
    call: CallState,
    message: MessageState,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            call: CallState::Idle,
            message: MessageState::Idle,
        }
    }

    pub fn call_state(&self) -> CallState {
        self.call
    }

    pub fn message_state(&self) -> MessageState {
        self.message
    }

    /// Both workflows start over on a new document. Requests still out are
    /// abandoned by the caller.
    pub fn reset(&mut self) {
        self.call = CallState::Idle;
        self.message = MessageState::Idle;
    }

    /// Validates and confirms a call. Returns the request to send, or `None`
    /// when the workflow ended before the network step.
    pub fn begin_call(
        &mut self,
        candidate: Option<&CandidateInfo>,
        operator: &OperatorInfo,
        prompter: &mut dyn Prompter,
    ) -> Option<CallRequest> {
        if self.call == CallState::Requesting {
            prompter.notify(CALL_IN_FLIGHT);
            return None;
        }

        match self.prepare_call(candidate, operator, prompter) {
            Ok(request) => {
                self.call = CallState::Requesting;
                info!(candidate = %request.candidate.candidate_name, "starting call");
                Some(request)
            }
            Err(BridgeError::Cancelled) => {
                debug!("call cancelled by operator");
                self.call = CallState::Idle;
                None
            }
            Err(e) => {
                warn!("call blocked: {}", e);
                prompter.notify(&e.to_string());
                self.call = CallState::Idle;
                None
            }
        }
    }

    /// Validation and confirmation. Declining yields `Cancelled`.
    fn prepare_call(
        &mut self,
        candidate: Option<&CandidateInfo>,
        operator: &OperatorInfo,
        prompter: &mut dyn Prompter,
    ) -> Result<CallRequest> {
        self.call = CallState::Validating;
        let (candidate, phone) = validate(candidate)?;

        self.call = CallState::Confirming;
        let question = format!(
            "Initiate call to {} at {}?",
            candidate.candidate_name, phone
        );
        if !prompter.confirm(&question) {
            return Err(BridgeError::Cancelled);
        }
        Ok(CallRequest {
            candidate: candidate.clone(),
            operator: operator.clone(),
        })
    }

    pub fn finish_call(&mut self, outcome: Result<ActionResult>, prompter: &mut dyn Prompter) {
        match outcome {
            Ok(result) if result.success => {
                self.call = CallState::Succeeded;
                info!(note_created = result.note_created, "call started");
                let mut text = format!(
                    "Call initiated successfully!\n\n{}",
                    note_line(result.note_created)
                );
                if let Some(tel) = result.manual_dial() {
                    text.push_str(&format!("\nDial manually: {tel}"));
                }
                prompter.notify(&text);
            }
            other => {
                self.call = CallState::Failed;
                let text = failure_text("initiate call", "initiating call", other);
                warn!("{}", text);
                prompter.notify(&text);
            }
        }
    }

    /// Opens the composer for a reachable candidate. Returns whether it
    /// opened.
    pub fn open_composer<P: PageSurface + ?Sized>(
        &mut self,
        candidate: Option<&CandidateInfo>,
        operator: &OperatorInfo,
        injector: &mut UiInjector,
        page: &mut P,
        prompter: &mut dyn Prompter,
    ) -> Result<bool> {
        if self.message == MessageState::Sending {
            prompter.notify(MESSAGE_IN_FLIGHT);
            return Ok(false);
        }

        self.message = MessageState::Validating;
        let (candidate, _) = match validate(candidate) {
            Ok(v) => v,
            Err(e) => {
                warn!("message blocked: {}", e);
                prompter.notify(&e.to_string());
                self.message = MessageState::Idle;
                return Ok(false);
            }
        };

        injector.show_compose_overlay(page, candidate, operator)?;
        self.message = MessageState::Composing;
        Ok(true)
    }

    /// Handles a Send press with the field's current value. Blank bodies are
    /// refused inline; presses while a send is out are ignored.
    pub fn begin_send<P: PageSurface + ?Sized>(
        &mut self,
        body: &str,
        injector: &mut UiInjector,
        page: &mut P,
    ) -> Result<Option<MessageRequest>> {
        match injector.overlay() {
            None => return Ok(None),
            Some(o) if o.sending || self.message == MessageState::Sending => {
                debug!("send already in flight");
                return Ok(None);
            }
            Some(_) => {}
        }

        injector.on_input(page, body)?;
        let request = injector.overlay().and_then(|o| {
            MessageRequest::new(o.candidate.clone(), o.operator.clone(), &o.body)
        });

        let Some(request) = request else {
            injector.show_inline_error(page, EMPTY_MESSAGE)?;
            return Ok(None);
        };

        injector.show_inline_error(page, "")?;
        injector.set_sending(page, true)?;
        self.message = MessageState::Sending;
        info!(candidate = %request.candidate.candidate_name, chars = message_len(&request.message), "sending message");
        Ok(Some(request))
    }

    pub fn finish_send<P: PageSurface + ?Sized>(
        &mut self,
        outcome: Result<ActionResult>,
        injector: &mut UiInjector,
        page: &mut P,
        prompter: &mut dyn Prompter,
    ) -> Result<()> {
        match outcome {
            Ok(result) if result.success => {
                self.message = MessageState::Succeeded;
                info!(note_created = result.note_created, "message sent");
                injector.close_overlay(page)?;
                prompter.notify(&format!(
                    "SMS sent successfully!\n\n{}",
                    note_line(result.note_created)
                ));
            }
            other => {
                self.message = MessageState::Failed;
                let text = failure_text("send SMS", "sending SMS", other);
                warn!("{}", text);
                if injector.overlay().is_some() {
                    injector.set_sending(page, false)?;
                    injector.show_inline_error(page, &text)?;
                } else {
                    prompter.notify(&text);
                }
            }
        }
        Ok(())
    }

    /// Closes the composer. A send already out still reports when it lands.
    pub fn dismiss_composer<P: PageSurface + ?Sized>(
        &mut self,
        injector: &mut UiInjector,
        page: &mut P,
    ) -> Result<()> {
        injector.close_overlay(page)?;
        if self.message != MessageState::Sending {
            self.message = MessageState::Idle;
        }
        Ok(())
    }
}

fn validate(candidate: Option<&CandidateInfo>) -> Result<(&CandidateInfo, &str)> {
    candidate
        .and_then(|c| c.reachable_phone().map(|p| (c, p)))
        .ok_or_else(|| BridgeError::Validation(MISSING_PHONE.to_string()))
}

fn note_line(created: bool) -> &'static str {
    if created {
        "Candidate note: created"
    } else {
        "Candidate note: not created"
    }
}

fn failure_text(action: &str, doing: &str, outcome: Result<ActionResult>) -> String {
    match outcome {
        Ok(result) => format!(
            "Failed to {action}: {}",
            result.message.as_deref().unwrap_or("no reason given")
        ),
        Err(BridgeError::Rejected(reason)) => format!("Failed to {action}: {reason}"),
        Err(e) => format!("Error {doing}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::{INLINE_ERROR_ID, OVERLAY_ID, SEND_ID, SEND_LABEL, TEXTAREA_ID};
    use crate::page::MemoryPage;

    #[derive(Default)]
    struct Scripted {
        answers: Vec<bool>,
        questions: Vec<String>,
        notices: Vec<String>,
    }

    impl Prompter for Scripted {
        fn confirm(&mut self, text: &str) -> bool {
            self.questions.push(text.to_string());
            if self.answers.is_empty() {
                false
            } else {
                self.answers.remove(0)
            }
        }

        fn notify(&mut self, text: &str) {
            self.notices.push(text.to_string());
        }
    }

    fn reachable() -> CandidateInfo {
        CandidateInfo {
            candidate_id: Some("c-1".into()),
            candidate_name: "Ada".into(),
            candidate_phone: Some("4155551234".into()),
        }
    }

    fn unreachable() -> CandidateInfo {
        CandidateInfo {
            candidate_phone: None,
            ..reachable()
        }
    }

    fn ok(note: bool) -> Result<ActionResult> {
        Ok(ActionResult {
            success: true,
            note_created: note,
            message: None,
            reference_id: None,
            interaction_log_id: None,
            call_method: None,
            tel_uri: None,
        })
    }

    #[test]
    fn call_without_phone_is_blocked() {
        let mut orch = Orchestrator::new();
        let mut prompter = Scripted::default();
        let op = OperatorInfo::unknown();
        assert!(orch.begin_call(Some(&unreachable()), &op, &mut prompter).is_none());
        assert!(orch.begin_call(None, &op, &mut prompter).is_none());
        assert_eq!(prompter.notices, vec![MISSING_PHONE, MISSING_PHONE]);
        assert!(prompter.questions.is_empty());
        assert_eq!(orch.call_state(), CallState::Idle);
    }

    #[test]
    fn preparation_distinguishes_cancel_from_validation() {
        let mut orch = Orchestrator::new();
        let op = OperatorInfo::unknown();
        let mut declining = Scripted::default();
        assert!(matches!(
            orch.prepare_call(Some(&reachable()), &op, &mut declining),
            Err(BridgeError::Cancelled)
        ));
        assert!(matches!(
            orch.prepare_call(Some(&unreachable()), &op, &mut declining),
            Err(BridgeError::Validation(ref m)) if m == MISSING_PHONE
        ));
        assert_eq!(declining.questions.len(), 1);
    }

    #[test]
    fn reset_clears_both_workflows() {
        let mut orch = Orchestrator::new();
        let mut prompter = Scripted {
            answers: vec![true],
            ..Default::default()
        };
        let mut injector = UiInjector::new();
        let mut page = MemoryPage::new("https://host.test/candidate");
        let op = OperatorInfo::unknown();
        assert!(orch.begin_call(Some(&reachable()), &op, &mut prompter).is_some());
        orch.open_composer(Some(&reachable()), &op, &mut injector, &mut page, &mut prompter)
            .unwrap();
        assert!(orch.begin_send("Hi", &mut injector, &mut page).unwrap().is_some());

        orch.reset();
        assert_eq!(orch.call_state(), CallState::Idle);
        assert_eq!(orch.message_state(), MessageState::Idle);
    }

    #[test]
    fn declined_confirmation_returns_to_idle() {
        let mut orch = Orchestrator::new();
        let mut prompter = Scripted {
            answers: vec![false],
            ..Default::default()
        };
        let req = orch.begin_call(Some(&reachable()), &OperatorInfo::unknown(), &mut prompter);
        assert!(req.is_none());
        assert_eq!(prompter.questions, vec!["Initiate call to Ada at 4155551234?"]);
        assert!(prompter.notices.is_empty());
        assert_eq!(orch.call_state(), CallState::Idle);
    }

    #[test]
    fn second_call_is_refused_while_first_is_out() {
        let mut orch = Orchestrator::new();
        let mut prompter = Scripted {
            answers: vec![true, true],
            ..Default::default()
        };
        let op = OperatorInfo::unknown();
        assert!(orch.begin_call(Some(&reachable()), &op, &mut prompter).is_some());
        assert_eq!(orch.call_state(), CallState::Requesting);
        assert!(orch.begin_call(Some(&reachable()), &op, &mut prompter).is_none());
        assert_eq!(prompter.notices, vec![CALL_IN_FLIGHT]);

        orch.finish_call(ok(true), &mut prompter);
        assert_eq!(orch.call_state(), CallState::Succeeded);
        assert!(orch.begin_call(Some(&reachable()), &op, &mut prompter).is_some());
    }

    #[test]
    fn call_outcomes_are_presented() {
        let mut orch = Orchestrator::new();
        let mut prompter = Scripted::default();

        let mut fallback = ok(false).unwrap();
        fallback.call_method = Some("tel_fallback".into());
        fallback.tel_uri = Some("tel:+14155551234".into());
        orch.finish_call(Ok(fallback), &mut prompter);
        assert!(prompter.notices[0].contains("Candidate note: not created"));
        assert!(prompter.notices[0].contains("Dial manually: tel:+14155551234"));

        orch.finish_call(Err(BridgeError::Transport("connection refused".into())), &mut prompter);
        assert_eq!(prompter.notices[1], "Error initiating call: connection refused");
        assert_eq!(orch.call_state(), CallState::Failed);

        orch.finish_call(Err(BridgeError::Rejected("No GoTo mapping".into())), &mut prompter);
        assert_eq!(prompter.notices[2], "Failed to initiate call: No GoTo mapping");
    }

    #[test]
    fn composer_does_not_open_without_phone() {
        let mut orch = Orchestrator::new();
        let mut injector = UiInjector::new();
        let mut page = MemoryPage::new("https://host.test/candidate");
        let mut prompter = Scripted::default();
        let opened = orch
            .open_composer(Some(&unreachable()), &OperatorInfo::unknown(), &mut injector, &mut page, &mut prompter)
            .unwrap();
        assert!(!opened);
        assert_eq!(page.count(OVERLAY_ID), 0);
        assert_eq!(prompter.notices, vec![MISSING_PHONE]);
        assert_eq!(orch.message_state(), MessageState::Idle);
    }

    #[test]
    fn blank_body_is_refused_inline() {
        let mut orch = Orchestrator::new();
        let mut injector = UiInjector::new();
        let mut page = MemoryPage::new("https://host.test/candidate");
        let mut prompter = Scripted::default();
        orch.open_composer(Some(&reachable()), &OperatorInfo::unknown(), &mut injector, &mut page, &mut prompter)
            .unwrap();

        let req = orch.begin_send("   ", &mut injector, &mut page).unwrap();
        assert!(req.is_none());
        assert_eq!(page.text_of(INLINE_ERROR_ID), Some(EMPTY_MESSAGE));
        assert!(!page.is_disabled(SEND_ID));
        assert_eq!(orch.message_state(), MessageState::Composing);
    }

    #[test]
    fn send_locks_until_outcome_and_failure_keeps_text() {
        let mut orch = Orchestrator::new();
        let mut injector = UiInjector::new();
        let mut page = MemoryPage::new("https://host.test/candidate");
        let mut prompter = Scripted::default();
        orch.open_composer(Some(&reachable()), &OperatorInfo::unknown(), &mut injector, &mut page, &mut prompter)
            .unwrap();

        let req = orch.begin_send("  Hello  ", &mut injector, &mut page).unwrap().unwrap();
        assert_eq!(req.message, "Hello");
        assert!(page.is_disabled(SEND_ID));
        assert!(orch.begin_send("Hello", &mut injector, &mut page).unwrap().is_none());

        orch.finish_send(
            Err(BridgeError::Transport("timed out".into())),
            &mut injector,
            &mut page,
            &mut prompter,
        )
        .unwrap();
        assert!(!page.is_disabled(SEND_ID));
        assert_eq!(page.text_of(SEND_ID), Some(SEND_LABEL));
        assert_eq!(page.text_of(INLINE_ERROR_ID), Some("Error sending SMS: timed out"));
        assert_eq!(injector.overlay().unwrap().body, "  Hello  ");
        assert_eq!(page.count(TEXTAREA_ID), 1);
        assert!(prompter.notices.is_empty());

        // Retry goes out again.
        assert!(orch.begin_send("  Hello  ", &mut injector, &mut page).unwrap().is_some());
    }

    #[test]
    fn success_closes_composer_and_reports_note() {
        let mut orch = Orchestrator::new();
        let mut injector = UiInjector::new();
        let mut page = MemoryPage::new("https://host.test/candidate");
        let mut prompter = Scripted::default();
        orch.open_composer(Some(&reachable()), &OperatorInfo::unknown(), &mut injector, &mut page, &mut prompter)
            .unwrap();
        orch.begin_send("Hello", &mut injector, &mut page).unwrap().unwrap();
        orch.finish_send(ok(false), &mut injector, &mut page, &mut prompter).unwrap();

        assert_eq!(page.count(OVERLAY_ID), 0);
        assert_eq!(orch.message_state(), MessageState::Succeeded);
        assert_eq!(prompter.notices, vec!["SMS sent successfully!\n\nCandidate note: not created"]);
    }

    #[test]
    fn outcome_after_dismissal_is_a_notice() {
        let mut orch = Orchestrator::new();
        let mut injector = UiInjector::new();
        let mut page = MemoryPage::new("https://host.test/candidate");
        let mut prompter = Scripted::default();
        orch.open_composer(Some(&reachable()), &OperatorInfo::unknown(), &mut injector, &mut page, &mut prompter)
            .unwrap();
        orch.begin_send("Hello", &mut injector, &mut page).unwrap().unwrap();
        orch.dismiss_composer(&mut injector, &mut page).unwrap();
        assert_eq!(orch.message_state(), MessageState::Sending);

        let rejected = Ok(ActionResult {
            success: false,
            message: Some("carrier refused".into()),
            ..ok(false).unwrap()
        });
        orch.finish_send(rejected, &mut injector, &mut page, &mut prompter).unwrap();
        assert_eq!(prompter.notices, vec!["Failed to send SMS: carrier refused"]);
        assert_eq!(orch.message_state(), MessageState::Failed);
    }
}
