//! # SIP-Event-Core
//!
//! SIP registration and dialog event reconciliation for the CCM call monitor.
//!
//! This crate provides:
//! - Typed inbound events from the registrar and the SIP proxy
//! - Reconcilers that turn each event into a store transition and an
//!   [`EventResult`] describing what changed
//! - Store ports for registrations, live calls and call history, with
//!   in-memory implementations
//! - Fan-out of results to notification subscribers
//!
//! ## Architecture
//!
//! The [`SipEventManager`] routes every event to exactly one reconciler.
//! Reconcilers never return errors: a failing store is logged and reported
//! as `NothingChanged`, and the event is not retried. Dialog events for the
//! same key may arrive out of order or twice; starts and ends are idempotent
//! and a closed call stays closed.
//!
//! ```no_run
//! use ccm_sip_event_core::prelude::*;
//!
//! # async fn run() -> ccm_sip_event_core::Result<()> {
//! let (manager, _stores) = SipEventManager::in_memory(SipEventConfig::from_env()?)?;
//! let event: SipEvent = serde_json::from_str(r#"{"kind":"registration_expire","sip_address":"codec1@sr.se"}"#)?;
//! let result = manager.handle(event).await;
//! println!("{}", result);
//! # Ok(())
//! # }
//! ```

pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod manager;
pub mod notify;
pub mod party;
pub mod reconciler;
pub mod result;
pub mod store;
pub mod types;

pub use config::SipEventConfig;
pub use error::{Result, SipEventError};
pub use events::{
    DialogEvent, DialogStatus, ExternalDialogEvent, ExternalDialogStatus, RegistrationEvent,
    RegistrationExpireEvent, SipEvent,
};
pub use manager::{InMemoryStores, SipEventManager, SipEventManagerBuilder};
pub use notify::ResultNotifier;
pub use result::{ChangeStatus, EventResult};
pub use store::{CallHistoryStore, CallStore, RegistrationStore};
pub use types::{Call, CallHistory, CallInfo, CallParty, DialogKey, OngoingCall, SipUri, UserAgentRegistration};

/// Commonly used types
pub mod prelude {
    pub use crate::collaborators::{
        DefaultDisplayNameResolver, DisplayNameResolver, LocationResolver, Localizer,
        StaticLocalizer, StaticLocationResolver,
    };
    pub use crate::config::SipEventConfig;
    pub use crate::error::{Result, SipEventError};
    pub use crate::events::*;
    pub use crate::manager::{InMemoryStores, SipEventManager};
    pub use crate::result::{ChangeStatus, EventResult};
    pub use crate::store::*;
    pub use crate::types::*;
}
