//! Page bridge agent: reads candidate details off a third-party web app,
//! overlays Call/Text controls, and drives the bridge service's call and
//! message endpoints from them.

pub mod agent;
pub mod api;
pub mod config;
pub mod dom;
pub mod error;
pub mod extract;
pub mod inject;
pub mod navigation;
pub mod orchestrator;
pub mod page;
pub mod types;

pub use agent::{Agent, AgentEvent, AgentSettings, PageEvent};
pub use api::{BridgeApi, HttpBridgeApi};
pub use config::{BridgeConfig, ConfigPatch, ConfigStore, FileConfigStore};
pub use error::{BridgeError, Result};
pub use orchestrator::{CallState, MessageState, Orchestrator, Prompter};
pub use page::{MemoryPage, PageSurface};
pub use types::{ActionResult, CandidateInfo, OperatorInfo, PageContext};
