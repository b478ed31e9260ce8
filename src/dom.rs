//! `PageSurface` and `Prompter` over a live DevTools tab.
//!
//! All DOM work goes through a small bootstrap installed into the page
//! (`window.__pageBridge`). It builds elements from `Element` descriptions,
//! answers snapshot queries, and forwards operator events and mutation
//! batches to the agent through a DevTools binding.

use std::sync::Arc;

use headless_chrome::Tab;
use headless_chrome::protocol::cdp::types::Event;
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::agent::{AgentEvent, decode_page_event};
use crate::error::{BridgeError, Result};
use crate::orchestrator::Prompter;
use crate::page::{DomSnapshot, Element, PageSurface, Placement};

pub const BINDING_NAME: &str = "__pageBridgeEmit";

/// Installed once per document. Re-running it only re-announces readiness.
///
/// The script:
///   1. Builds injected elements with text nodes only (no innerHTML).
///   2. Wires `Binding`s to click/input listeners that emit JSON events.
///   3. Observes the whole document and reports `location.href` at most once
///      per animation frame.
///   4. Emits `ready` once the document has loaded.
const BOOTSTRAP_JS: &str = r#"
(() => {
  const announce = () => {
    if (document.readyState === 'loading') {
      document.addEventListener('DOMContentLoaded', announce, { once: true });
      return;
    }
    window.__pageBridge.emit({ type: 'ready', url: location.href });
  };

  if (window.__pageBridge) {
    announce();
    return 'present';
  }

  const emit = (event) => {
    const binding = window['__pageBridgeEmit'];
    if (typeof binding === 'function') binding(JSON.stringify(event));
  };
  const byId = (id) => document.getElementById(id);
  const query = (sel) => {
    try { return document.querySelector(sel); } catch (_) { return null; }
  };

  function wire(el, on) {
    if (!on) return;
    if (on.kind === 'emit') {
      el.addEventListener('click', (e) => {
        e.preventDefault();
        const event = { type: on.event };
        if (on.reason) event.reason = on.reason;
        emit(event);
      });
    } else if (on.kind === 'backdrop') {
      el.addEventListener('click', (e) => {
        if (e.target === el) emit({ type: 'overlay_dismissed', reason: 'backdrop' });
      });
    } else if (on.kind === 'input') {
      el.addEventListener('input', () => emit({ type: 'overlay_input', value: el.value }));
    } else if (on.kind === 'send') {
      el.addEventListener('click', (e) => {
        e.preventDefault();
        const src = byId(on.source);
        emit({ type: 'send_clicked', value: src ? src.value : '' });
      });
    }
  }

  function build(spec) {
    const el = document.createElement(spec.tag);
    if (spec.id) el.id = spec.id;
    if (spec.class) el.className = spec.class;
    if (spec.text) el.textContent = spec.text;
    for (const [k, v] of Object.entries(spec.attrs || {})) el.setAttribute(k, v);
    for (const [k, v] of Object.entries(spec.style || {})) el.style.setProperty(k, v);
    for (const child of spec.children || []) el.appendChild(build(child));
    wire(el, spec.on);
    return el;
  }

  let scheduled = false;
  new MutationObserver(() => {
    if (scheduled) return;
    scheduled = true;
    requestAnimationFrame(() => {
      scheduled = false;
      emit({ type: 'mutation', url: location.href });
    });
  }).observe(document, { subtree: true, childList: true });

  window.__pageBridge = {
    emit,
    snapshot(selectors) {
      const matches = {};
      for (const sel of selectors) {
        const el = query(sel);
        if (el) matches[sel] = { text: (el.textContent || '').trim(), href: el.getAttribute('href') };
      }
      return JSON.stringify({ url: location.href, matches });
    },
    exists(id) { return byId(id) !== null; },
    mount(placement, spec) {
      if (placement.at === 'prepend') {
        const parent = query(placement.selector);
        if (!parent) return false;
        parent.insertBefore(build(spec), parent.firstChild);
      } else {
        document.body.appendChild(build(spec));
      }
      return true;
    },
    remove(id) {
      let el;
      while ((el = byId(id))) el.remove();
      return true;
    },
    setText(id, text) { const el = byId(id); if (el) el.textContent = text; return !!el; },
    setValue(id, value) { const el = byId(id); if (el) el.value = value; return !!el; },
    setDisabled(id, disabled) { const el = byId(id); if (el) el.disabled = disabled; return !!el; },
    focus(id) { const el = byId(id); if (el) el.focus(); return !!el; },
  };

  announce();
  return 'installed';
})()
"#;

pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }

    /// Routes page events and document loads into the agent's queue. The
    /// DevTools reader thread calls these closures, so they must not block.
    pub fn connect(&self, events: UnboundedSender<AgentEvent>) -> Result<()> {
        let page_events = events.clone();
        self.tab
            .expose_function(
                BINDING_NAME,
                Arc::new(move |payload: Value| match decode_page_event(&payload) {
                    Some(event) => {
                        let _ = page_events.send(AgentEvent::Page(event));
                    }
                    None => debug!(%payload, "ignoring unknown page event"),
                }),
            )
            .map_err(BridgeError::page)?;

        self.tab
            .add_event_listener(Arc::new(move |event: &Event| {
                if let Event::PageLoadEventFired(_) = event {
                    let _ = events.send(AgentEvent::DocumentLoaded);
                }
            }))
            .map_err(BridgeError::page)?;
        Ok(())
    }

    fn eval(&self, expression: &str) -> Result<Option<Value>> {
        let result = self
            .tab
            .evaluate(expression, false)
            .map_err(BridgeError::page)?;
        Ok(result.value)
    }

    fn invoke(&self, method: &str, args: &[Value]) -> Result<Option<Value>> {
        let args = args
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        self.eval(&format!("window.__pageBridge.{method}({args})"))
    }
}

impl PageSurface for ChromePage {
    fn install(&mut self) -> Result<()> {
        let status = self.eval(BOOTSTRAP_JS)?;
        debug!(?status, "bootstrap evaluated");
        Ok(())
    }

    fn current_url(&mut self) -> Result<String> {
        match self.eval("window.location.href")? {
            Some(Value::String(url)) => Ok(url),
            other => Err(BridgeError::Page(format!("unexpected location: {other:?}"))),
        }
    }

    fn snapshot(&mut self, selectors: &[&str]) -> Result<DomSnapshot> {
        match self.invoke("snapshot", &[json!(selectors)])? {
            Some(Value::String(raw)) => Ok(serde_json::from_str(&raw)?),
            other => Err(BridgeError::Page(format!("unexpected snapshot: {other:?}"))),
        }
    }

    fn contains(&mut self, id: &str) -> Result<bool> {
        Ok(matches!(
            self.invoke("exists", &[json!(id)])?,
            Some(Value::Bool(true))
        ))
    }

    fn mount(&mut self, placement: &Placement, element: &Element) -> Result<bool> {
        let mounted = self.invoke(
            "mount",
            &[serde_json::to_value(placement)?, serde_json::to_value(element)?],
        )?;
        Ok(matches!(mounted, Some(Value::Bool(true))))
    }

    fn remove(&mut self, id: &str) -> Result<()> {
        self.invoke("remove", &[json!(id)])?;
        Ok(())
    }

    fn set_text(&mut self, id: &str, text: &str) -> Result<()> {
        self.invoke("setText", &[json!(id), json!(text)])?;
        Ok(())
    }

    fn set_value(&mut self, id: &str, value: &str) -> Result<()> {
        self.invoke("setValue", &[json!(id), json!(value)])?;
        Ok(())
    }

    fn set_disabled(&mut self, id: &str, disabled: bool) -> Result<()> {
        self.invoke("setDisabled", &[json!(id), json!(disabled)])?;
        Ok(())
    }

    fn focus(&mut self, id: &str) -> Result<()> {
        self.invoke("focus", &[json!(id)])?;
        Ok(())
    }
}

/// Modal `confirm`/`alert` in the page. Evaluation blocks until the operator
/// answers, which is what the workflows expect.
pub struct ChromePrompter {
    tab: Arc<Tab>,
}

impl ChromePrompter {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }
}

impl Prompter for ChromePrompter {
    fn confirm(&mut self, text: &str) -> bool {
        match self.tab.evaluate(&format!("window.confirm({})", json!(text)), false) {
            Ok(result) => matches!(result.value, Some(Value::Bool(true))),
            Err(e) => {
                warn!("confirm dialog failed, treating as no: {}", e);
                false
            }
        }
    }

    fn notify(&mut self, text: &str) {
        if let Err(e) = self.tab.evaluate(&format!("window.alert({})", json!(text)), false) {
            warn!("alert failed: {} (message was: {})", e, text);
        }
    }
}
