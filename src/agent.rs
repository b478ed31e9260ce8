//! The agent's event loop.
//!
//! Events are handled strictly one at a time. The only work that leaves the
//! loop is the HTTP exchange, which runs as a tokio task and comes back as a
//! `*Finished` event.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::api::BridgeApi;
use crate::error::Result;
use crate::extract::capture_context;
use crate::inject::UiInjector;
use crate::navigation::{NavigationMonitor, default_markers, is_candidate_page};
use crate::orchestrator::{Orchestrator, Prompter};
use crate::page::PageSurface;
use crate::types::{ActionRequest, ActionResult, OperatorInfo, PageContext};

/// Events emitted by the in-page bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageEvent {
    Ready { url: String },
    Mutation { url: String },
    CallClicked,
    MessageClicked,
    OverlayInput { value: String },
    SendClicked { value: String },
    OverlayDismissed {
        #[serde(default)]
        reason: Option<String>,
    },
}

#[derive(Debug)]
pub enum AgentEvent {
    Page(PageEvent),
    /// A real load replaced the document and everything injected with it.
    DocumentLoaded,
    /// `document` is the generation the request was sent from.
    CallFinished {
        document: u64,
        outcome: Result<ActionResult>,
    },
    MessageFinished {
        document: u64,
        outcome: Result<ActionResult>,
    },
    /// Stops `run` after the events queued before it.
    Shutdown,
}

/// Accepts the shapes a DevTools binding payload can arrive in: the event
/// object, its JSON text, or a wrapper carrying it as the first argument.
pub fn decode_page_event(payload: &Value) -> Option<PageEvent> {
    match payload {
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .ok()
            .and_then(|v| decode_page_event(&v)),
        Value::Object(map) if map.contains_key("type") => {
            serde_json::from_value(payload.clone()).ok()
        }
        Value::Object(map) => map.get("args").and_then(decode_page_event),
        Value::Array(items) => items.first().and_then(decode_page_event),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// URL substrings that mark a page the controls belong on.
    pub page_markers: Vec<String>,
    /// Operator record from the configuration store.
    pub stored_operator: Option<OperatorInfo>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            page_markers: default_markers(),
            stored_operator: None,
        }
    }
}

pub struct Agent<P, Q> {
    page: P,
    prompter: Q,
    api: Arc<dyn BridgeApi>,
    settings: AgentSettings,
    events: UnboundedSender<AgentEvent>,
    runtime: Handle,
    monitor: NavigationMonitor,
    injector: UiInjector,
    orchestrator: Orchestrator,
    context: Option<PageContext>,
    initializations: usize,
    /// Bumped on every real load. Results from older documents are dropped.
    document: u64,
}

impl<P: PageSurface, Q: Prompter> Agent<P, Q> {
    pub fn new(
        page: P,
        prompter: Q,
        api: Arc<dyn BridgeApi>,
        settings: AgentSettings,
        events: UnboundedSender<AgentEvent>,
        runtime: Handle,
    ) -> Self {
        Self {
            page,
            prompter,
            api,
            settings,
            events,
            runtime,
            monitor: NavigationMonitor::new(String::new()),
            injector: UiInjector::new(),
            orchestrator: Orchestrator::new(),
            context: None,
            initializations: 0,
            document: 0,
        }
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut P {
        &mut self.page
    }

    pub fn prompter(&self) -> &Q {
        &self.prompter
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn injector(&self) -> &UiInjector {
        &self.injector
    }

    pub fn context(&self) -> Option<&PageContext> {
        self.context.as_ref()
    }

    /// How many times initialization has run.
    pub fn initializations(&self) -> usize {
        self.initializations
    }

    /// Installs the page side and handles events until `Shutdown` arrives or
    /// every sender is gone.
    pub fn run(mut self, mut events: UnboundedReceiver<AgentEvent>) {
        if let Err(e) = self.page.install() {
            warn!("could not install page bootstrap: {}", e);
        }
        while let Some(event) = events.blocking_recv() {
            if matches!(event, AgentEvent::Shutdown) {
                break;
            }
            if let Err(e) = self.handle(event) {
                warn!("event handling failed: {}", e);
            }
        }
        info!("agent stopping");
    }

    pub fn handle(&mut self, event: AgentEvent) -> Result<()> {
        match event {
            AgentEvent::DocumentLoaded => {
                debug!("document loaded, dropping page state");
                self.document += 1;
                self.injector.forget();
                self.orchestrator.reset();
                self.context = None;
                self.page.install()
            }
            AgentEvent::CallFinished { document, .. }
            | AgentEvent::MessageFinished { document, .. }
                if document != self.document =>
            {
                debug!(document, "dropping result for a replaced document");
                Ok(())
            }
            AgentEvent::Page(PageEvent::Ready { url }) => {
                self.monitor.reset(&url);
                self.initialize()
            }
            AgentEvent::Page(PageEvent::Mutation { url }) => {
                if self.monitor.observe(&url) {
                    self.initialize()?;
                }
                Ok(())
            }
            AgentEvent::Page(PageEvent::CallClicked) => {
                let ctx = self.refresh_context();
                if let Some(request) =
                    self.orchestrator
                        .begin_call(ctx.candidate.as_ref(), &ctx.operator, &mut self.prompter)
                {
                    self.dispatch(ActionRequest::Call(request));
                }
                Ok(())
            }
            AgentEvent::Page(PageEvent::MessageClicked) => {
                let ctx = self.refresh_context();
                self.orchestrator.open_composer(
                    ctx.candidate.as_ref(),
                    &ctx.operator,
                    &mut self.injector,
                    &mut self.page,
                    &mut self.prompter,
                )?;
                Ok(())
            }
            AgentEvent::Page(PageEvent::OverlayInput { value }) => {
                self.injector.on_input(&mut self.page, &value)
            }
            AgentEvent::Page(PageEvent::SendClicked { value }) => {
                if let Some(request) =
                    self.orchestrator
                        .begin_send(&value, &mut self.injector, &mut self.page)?
                {
                    self.dispatch(ActionRequest::Message(request));
                }
                Ok(())
            }
            AgentEvent::Page(PageEvent::OverlayDismissed { reason }) => {
                debug!(?reason, "composer dismissed");
                self.orchestrator
                    .dismiss_composer(&mut self.injector, &mut self.page)
            }
            AgentEvent::CallFinished { outcome, .. } => {
                self.orchestrator.finish_call(outcome, &mut self.prompter);
                Ok(())
            }
            AgentEvent::MessageFinished { outcome, .. } => self.orchestrator.finish_send(
                outcome,
                &mut self.injector,
                &mut self.page,
                &mut self.prompter,
            ),
            AgentEvent::Shutdown => Ok(()),
        }
    }

    /// Extracts the page's entities and mounts the controls on candidate
    /// pages. Safe to repeat.
    pub fn initialize(&mut self) -> Result<()> {
        self.initializations += 1;
        let url = self.page.current_url()?;
        if !is_candidate_page(&url, &self.settings.page_markers) {
            debug!(%url, "not a candidate page");
            self.context = None;
            return Ok(());
        }

        info!(%url, "candidate page detected, initializing");
        let ctx = self.capture_context();
        self.injector
            .ensure_controls(&mut self.page, ctx.candidate.as_ref(), &ctx.operator)?;
        self.context = Some(ctx);
        Ok(())
    }

    /// Reads the entities fresh. Host pages often fill in details after the
    /// URL changes, so every action looks again rather than trusting the
    /// snapshot from initialization.
    fn refresh_context(&mut self) -> PageContext {
        let ctx = self.capture_context();
        self.context = Some(ctx.clone());
        ctx
    }

    fn capture_context(&mut self) -> PageContext {
        capture_context(&mut self.page, self.settings.stored_operator.as_ref())
    }

    fn dispatch(&self, request: ActionRequest) {
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let document = self.document;
        self.runtime.spawn(async move {
            let event = match request {
                ActionRequest::Call(req) => AgentEvent::CallFinished {
                    document,
                    outcome: api.start_call(&req).await,
                },
                ActionRequest::Message(req) => AgentEvent::MessageFinished {
                    document,
                    outcome: api.send_message(&req).await,
                },
            };
            if events.send(event).is_err() {
                debug!("agent stopped before the request finished");
            }
        });
    }
}
