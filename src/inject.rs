//! Injected controls and the message composer.
//!
//! Everything here is mounted under reserved ids, so mounting is idempotent
//! and the injector never touches host-owned nodes.

use tracing::{debug, info};

use crate::error::Result;
use crate::page::{Binding, Element, PageSurface, Placement};
use crate::types::{CandidateInfo, MESSAGE_MAX_CHARS, OperatorInfo, clamp_message, message_len};

pub const CONTAINER_ID: &str = "jobdiva-goto-bridge-container";
pub const CALL_BUTTON_ID: &str = "jobdiva-goto-call-btn";
pub const MESSAGE_BUTTON_ID: &str = "jobdiva-goto-sms-btn";

pub const OVERLAY_ID: &str = "jobdiva-goto-sms-modal";
pub const CLOSE_ID: &str = "jobdiva-goto-modal-close";
pub const TEXTAREA_ID: &str = "jobdiva-goto-sms-message";
pub const COUNTER_ID: &str = "jobdiva-goto-char-count";
pub const INLINE_ERROR_ID: &str = "jobdiva-goto-sms-error";
pub const CANCEL_ID: &str = "jobdiva-goto-cancel-btn";
pub const SEND_ID: &str = "jobdiva-goto-send-sms-btn";

pub const SEND_LABEL: &str = "Send SMS";
pub const SENDING_LABEL: &str = "Sending...";

/// Host regions the controls are prepended to, best first.
pub const INSERTION_REGIONS: &[&str] = &[".candidate-header", ".candidate-details"];

// Event names the page emits back; see `agent::PageEvent`.
pub const EVENT_CALL: &str = "call_clicked";
pub const EVENT_MESSAGE: &str = "message_clicked";
pub const EVENT_DISMISS: &str = "overlay_dismissed";

/// State of the open composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeOverlay {
    pub candidate: CandidateInfo,
    pub operator: OperatorInfo,
    pub body: String,
    pub sending: bool,
}

impl ComposeOverlay {
    /// What the page counter shows, in UTF-16 units like `maxlength`.
    pub fn char_count(&self) -> usize {
        message_len(&self.body)
    }
}

#[derive(Debug, Default)]
pub struct UiInjector {
    overlay: Option<ComposeOverlay>,
}

impl UiInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overlay(&self) -> Option<&ComposeOverlay> {
        self.overlay.as_ref()
    }

    /// Mounts the Call and Message controls unless they are already on the
    /// page. Returns whether anything was mounted.
    pub fn ensure_controls<P: PageSurface + ?Sized>(
        &self,
        page: &mut P,
        candidate: Option<&CandidateInfo>,
        operator: &OperatorInfo,
    ) -> Result<bool> {
        if page.contains(CONTAINER_ID)? {
            debug!("controls already mounted");
            return Ok(false);
        }

        let target = candidate
            .map(|c| c.candidate_name.as_str())
            .unwrap_or("candidate");
        let container = Element::new("div")
            .id(CONTAINER_ID)
            .class("jobdiva-goto-bridge-buttons")
            .attr("data-operator", operator.operator_name.clone())
            .child(
                Element::new("button")
                    .id(CALL_BUTTON_ID)
                    .class("jobdiva-goto-btn jobdiva-goto-call")
                    .attr("title", format!("Call {target}"))
                    .text("Call via GoTo")
                    .on(emit(EVENT_CALL, None)),
            )
            .child(
                Element::new("button")
                    .id(MESSAGE_BUTTON_ID)
                    .class("jobdiva-goto-btn jobdiva-goto-sms")
                    .attr("title", format!("Text {target}"))
                    .text("Text via GoTo")
                    .on(emit(EVENT_MESSAGE, None)),
            );

        // A region can vanish during a host re-render; mount reports it.
        for region in INSERTION_REGIONS {
            let placement = Placement::Prepend(region.to_string());
            if page.mount(&placement, &container)? {
                info!(?placement, "mounted action controls");
                return Ok(true);
            }
        }

        let placement = Placement::Body;
        let floating = container
            .style("position", "fixed")
            .style("top", "100px")
            .style("right", "20px")
            .style("z-index", "10000");
        page.mount(&placement, &floating)?;
        info!(?placement, "mounted action controls");
        Ok(true)
    }

    /// Replaces any open composer with a fresh one for this candidate.
    pub fn show_compose_overlay<P: PageSurface + ?Sized>(
        &mut self,
        page: &mut P,
        candidate: &CandidateInfo,
        operator: &OperatorInfo,
    ) -> Result<()> {
        page.remove(OVERLAY_ID)?;
        self.overlay = None;

        let phone = candidate.candidate_phone.as_deref().unwrap_or("no phone");
        let header = Element::new("div")
            .class("jobdiva-goto-modal-header")
            .child(Element::new("h3").text("Send SMS via GoTo"))
            .child(
                Element::new("button")
                    .id(CLOSE_ID)
                    .class("jobdiva-goto-modal-close")
                    .text("\u{00d7}")
                    .on(emit(EVENT_DISMISS, Some("close"))),
            );

        let body = Element::new("div")
            .class("jobdiva-goto-modal-body")
            .child(Element::new("p").text(format!(
                "To: {} ({})",
                candidate.candidate_name, phone
            )))
            .child(Element::new("p").text(format!("From: {}", operator.operator_name)))
            .child(
                Element::new("textarea")
                    .id(TEXTAREA_ID)
                    .attr("placeholder", "Enter your message...")
                    .attr("rows", "5")
                    .attr("maxlength", MESSAGE_MAX_CHARS.to_string())
                    .on(Binding::Input),
            )
            .child(
                Element::new("div")
                    .class("jobdiva-goto-char-count")
                    .child(Element::new("span").id(COUNTER_ID).text("0"))
                    .child(Element::new("span").text(format!(" / {MESSAGE_MAX_CHARS} characters"))),
            )
            .child(
                Element::new("p")
                    .id(INLINE_ERROR_ID)
                    .class("jobdiva-goto-sms-error")
                    .text(""),
            );

        let footer = Element::new("div")
            .class("jobdiva-goto-modal-footer")
            .child(
                Element::new("button")
                    .id(CANCEL_ID)
                    .class("jobdiva-goto-btn-secondary")
                    .text("Cancel")
                    .on(emit(EVENT_DISMISS, Some("cancel"))),
            )
            .child(
                Element::new("button")
                    .id(SEND_ID)
                    .class("jobdiva-goto-btn-primary")
                    .text(SEND_LABEL)
                    .on(Binding::Send {
                        source: TEXTAREA_ID.to_string(),
                    }),
            );

        let overlay = Element::new("div")
            .id(OVERLAY_ID)
            .class("jobdiva-goto-modal")
            .on(Binding::Backdrop)
            .child(
                Element::new("div")
                    .class("jobdiva-goto-modal-content")
                    .child(header)
                    .child(body)
                    .child(footer),
            );

        page.mount(&Placement::Body, &overlay)?;
        page.focus(TEXTAREA_ID)?;

        self.overlay = Some(ComposeOverlay {
            candidate: candidate.clone(),
            operator: operator.clone(),
            body: String::new(),
            sending: false,
        });
        info!(candidate = %candidate.candidate_name, "opened composer");
        Ok(())
    }

    /// Tracks the composed text. Input past the limit is cut off and written
    /// back to the field.
    pub fn on_input<P: PageSurface + ?Sized>(&mut self, page: &mut P, value: &str) -> Result<()> {
        let Some(overlay) = self.overlay.as_mut() else {
            return Ok(());
        };
        let clamped = clamp_message(value);
        if clamped.len() < value.len() {
            page.set_value(TEXTAREA_ID, clamped)?;
            overlay.body = clamped.to_string();
        } else {
            overlay.body = value.to_string();
        }
        page.set_text(COUNTER_ID, &overlay.char_count().to_string())
    }

    pub fn set_sending<P: PageSurface + ?Sized>(&mut self, page: &mut P, sending: bool) -> Result<()> {
        let Some(overlay) = self.overlay.as_mut() else {
            return Ok(());
        };
        overlay.sending = sending;
        page.set_disabled(SEND_ID, sending)?;
        page.set_text(SEND_ID, if sending { SENDING_LABEL } else { SEND_LABEL })
    }

    pub fn show_inline_error<P: PageSurface + ?Sized>(&mut self, page: &mut P, text: &str) -> Result<()> {
        if self.overlay.is_none() {
            return Ok(());
        }
        page.set_text(INLINE_ERROR_ID, text)
    }

    /// Drops the composer state after its document went away. The page is
    /// not touched.
    pub fn forget(&mut self) {
        if self.overlay.take().is_some() {
            debug!("forgot composer of a replaced document");
        }
    }

    pub fn close_overlay<P: PageSurface + ?Sized>(&mut self, page: &mut P) -> Result<()> {
        if self.overlay.take().is_some() {
            debug!("closed composer");
        }
        page.remove(OVERLAY_ID)
    }
}

fn emit(event: &str, reason: Option<&str>) -> Binding {
    Binding::Emit {
        event: event.to_string(),
        reason: reason.map(str::to_string),
    }
}
