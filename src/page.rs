//! The DOM seam between the agent and whatever document it is attached to.
//!
//! `PageSurface` is implemented over a live DevTools tab (see `dom`) and by
//! `MemoryPage`, a small in-memory document used for dry runs and tests.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Text and link target of the first element a selector matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeText {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub href: Option<String>,
}

/// Read-only view of the page taken in a single round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DomSnapshot {
    pub url: String,
    #[serde(default)]
    pub matches: HashMap<String, NodeText>,
}

impl DomSnapshot {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            matches: HashMap::new(),
        }
    }

    pub fn with_text(mut self, selector: &str, text: &str) -> Self {
        self.matches.insert(
            selector.to_string(),
            NodeText {
                text: text.to_string(),
                href: None,
            },
        );
        self
    }

    pub fn with_link(mut self, selector: &str, text: &str, href: &str) -> Self {
        self.matches.insert(
            selector.to_string(),
            NodeText {
                text: text.to_string(),
                href: Some(href.to_string()),
            },
        );
        self
    }

    pub fn get(&self, selector: &str) -> Option<&NodeText> {
        self.matches.get(selector)
    }
}

/// What the page does when the operator interacts with an injected element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Binding {
    /// Click emits `{type: event, reason}`.
    Emit {
        event: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Click on the element itself, not its children, dismisses the overlay.
    Backdrop,
    /// Every input event emits the current value.
    Input,
    /// Click emits the value of the element with id `source`.
    Send { source: String },
}

/// Description of an element tree the page should build. Text is always set
/// as a text node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Element {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub style: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<Binding>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn class(mut self, class: &str) -> Self {
        self.class = Some(class.to_string());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    pub fn style(mut self, property: &str, value: &str) -> Self {
        self.style.insert(property.to_string(), value.to_string());
        self
    }

    pub fn on(mut self, binding: Binding) -> Self {
        self.on = Some(binding);
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn find(&self, id: &str) -> Option<&Element> {
        if self.id.as_deref() == Some(id) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Element> {
        if self.id.as_deref() == Some(id) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    fn remove_descendant(&mut self, id: &str) {
        self.children.retain(|c| c.id.as_deref() != Some(id));
        for child in &mut self.children {
            child.remove_descendant(id);
        }
    }

    fn count(&self, id: &str) -> usize {
        let own = usize::from(self.id.as_deref() == Some(id));
        own + self.children.iter().map(|c| c.count(id)).sum::<usize>()
    }
}

/// Where a new element tree goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "at", content = "selector", rename_all = "snake_case")]
pub enum Placement {
    /// Before the first child of the first element matching the selector.
    Prepend(String),
    /// Appended to `document.body`.
    Body,
}

/// DOM operations the agent needs. Every method is one round trip.
pub trait PageSurface {
    /// Prepares a freshly loaded document. Must be safe to repeat.
    fn install(&mut self) -> Result<()> {
        Ok(())
    }

    fn current_url(&mut self) -> Result<String>;

    /// First-match text for each selector, plus the current URL.
    fn snapshot(&mut self, selectors: &[&str]) -> Result<DomSnapshot>;

    fn contains(&mut self, id: &str) -> Result<bool>;

    /// Builds the element at `placement`. Returns false without mounting
    /// anything when a `Prepend` region is not on the page.
    fn mount(&mut self, placement: &Placement, element: &Element) -> Result<bool>;

    /// Removes every element with the id. Missing ids are not an error.
    fn remove(&mut self, id: &str) -> Result<()>;

    fn set_text(&mut self, id: &str, text: &str) -> Result<()>;

    fn set_value(&mut self, id: &str, value: &str) -> Result<()>;

    fn set_disabled(&mut self, id: &str, disabled: bool) -> Result<()>;

    fn focus(&mut self, id: &str) -> Result<()>;
}

/// In-memory document. Host content is a selector table; injected elements
/// are kept in mount order.
#[derive(Debug, Default)]
pub struct MemoryPage {
    url: String,
    host: HashMap<String, NodeText>,
    regions: Vec<String>,
    mounted: Vec<(Placement, Element)>,
    focused: Option<String>,
    broken: bool,
}

impl MemoryPage {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, selector: &str, text: &str) -> Self {
        self.host.insert(
            selector.to_string(),
            NodeText {
                text: text.to_string(),
                href: None,
            },
        );
        self
    }

    pub fn with_link(mut self, selector: &str, text: &str, href: &str) -> Self {
        self.host.insert(
            selector.to_string(),
            NodeText {
                text: text.to_string(),
                href: Some(href.to_string()),
            },
        );
        self
    }

    /// Marks a host region (e.g. `.candidate-header`) as present.
    pub fn with_region(mut self, selector: &str) -> Self {
        self.regions.push(selector.to_string());
        self
    }

    /// Makes every snapshot fail, as a detached tab would.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    /// Client-side navigation: the URL changes, the document stays.
    pub fn navigate(&mut self, url: &str) {
        self.url = url.to_string();
    }

    /// A real load: the document is rebuilt and everything injected is gone.
    pub fn reload(&mut self) {
        self.mounted.clear();
        self.focused = None;
    }

    /// The host drops a region, as single-page apps do while re-rendering.
    pub fn remove_region(&mut self, selector: &str) {
        self.regions.retain(|r| r != selector);
        self.host.remove(selector);
    }

    /// Replaces the host content, keeping injected elements.
    pub fn set_host_text(&mut self, selector: &str, text: &str) {
        self.host.insert(
            selector.to_string(),
            NodeText {
                text: text.to_string(),
                href: None,
            },
        );
    }

    pub fn count(&self, id: &str) -> usize {
        self.mounted.iter().map(|(_, e)| e.count(id)).sum()
    }

    pub fn find(&self, id: &str) -> Option<&Element> {
        self.mounted.iter().find_map(|(_, e)| e.find(id))
    }

    pub fn placement_of(&self, id: &str) -> Option<&Placement> {
        self.mounted
            .iter()
            .find(|(_, e)| e.id.as_deref() == Some(id))
            .map(|(p, _)| p)
    }

    pub fn text_of(&self, id: &str) -> Option<&str> {
        self.find(id).and_then(|e| e.text.as_deref())
    }

    pub fn value_of(&self, id: &str) -> Option<&str> {
        self.find(id)
            .and_then(|e| e.attrs.get("value"))
            .map(String::as_str)
    }

    pub fn is_disabled(&self, id: &str) -> bool {
        self.find(id)
            .map(|e| e.attrs.contains_key("disabled"))
            .unwrap_or(false)
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    fn has_region(&self, selector: &str) -> bool {
        self.regions.iter().any(|r| r == selector) || self.host.contains_key(selector)
    }

    fn element_mut(&mut self, id: &str) -> Result<&mut Element> {
        self.mounted
            .iter_mut()
            .find_map(|(_, e)| e.find_mut(id))
            .ok_or_else(|| BridgeError::Page(format!("no element #{id}")))
    }
}

impl PageSurface for MemoryPage {
    fn current_url(&mut self) -> Result<String> {
        Ok(self.url.clone())
    }

    fn snapshot(&mut self, selectors: &[&str]) -> Result<DomSnapshot> {
        if self.broken {
            return Err(BridgeError::Page("document is detached".into()));
        }
        let matches = selectors
            .iter()
            .filter_map(|s| self.host.get(*s).map(|n| (s.to_string(), n.clone())))
            .collect();
        Ok(DomSnapshot {
            url: self.url.clone(),
            matches,
        })
    }

    fn contains(&mut self, id: &str) -> Result<bool> {
        Ok(self.count(id) > 0)
    }

    fn mount(&mut self, placement: &Placement, element: &Element) -> Result<bool> {
        if let Placement::Prepend(region) = placement {
            if !self.has_region(region) {
                return Ok(false);
            }
        }
        self.mounted.push((placement.clone(), element.clone()));
        Ok(true)
    }

    fn remove(&mut self, id: &str) -> Result<()> {
        self.mounted.retain(|(_, e)| e.id.as_deref() != Some(id));
        for (_, element) in &mut self.mounted {
            element.remove_descendant(id);
        }
        if self.focused.as_deref() == Some(id) {
            self.focused = None;
        }
        Ok(())
    }

    fn set_text(&mut self, id: &str, text: &str) -> Result<()> {
        self.element_mut(id)?.text = Some(text.to_string());
        Ok(())
    }

    fn set_value(&mut self, id: &str, value: &str) -> Result<()> {
        self.element_mut(id)?
            .attrs
            .insert("value".to_string(), value.to_string());
        Ok(())
    }

    fn set_disabled(&mut self, id: &str, disabled: bool) -> Result<()> {
        let element = self.element_mut(id)?;
        if disabled {
            element.attrs.insert("disabled".to_string(), String::new());
        } else {
            element.attrs.remove("disabled");
        }
        Ok(())
    }

    fn focus(&mut self, id: &str) -> Result<()> {
        self.element_mut(id)?;
        self.focused = Some(id.to_string());
        Ok(())
    }
}
