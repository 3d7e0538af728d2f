//! Store ports used by the reconcilers
//!
//! The engine never owns persistence. Registrations, live calls and call
//! history are reached through these traits and injected as `Arc<dyn …>`.
//!
//! ## Consistency expectations
//!
//! - Operations on one dialog key must give read-your-writes consistency
//!   within a process; `CallStore::upsert` and `CallStore::create_if_absent`
//!   must be atomic per key so a racing pair of events cannot produce two
//!   open calls for the same key, and `upsert` never turns a started call
//!   back into a progressing one.
//! - `CallStore::get_info` and `CallStore::exists` also report calls that
//!   were closed recently. Reconcilers rely on this to keep redelivered
//!   events for a finished call from recreating it.
//! - Operations fail fast with an error instead of blocking.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::result::EventResult;
use crate::types::{Call, CallHistory, CallInfo, DialogKey, OngoingCall, UserAgentRegistration};

pub mod memory;

pub use memory::{InMemoryCallHistoryStore, InMemoryCallStore, InMemoryRegistrationStore, SipAccount};

/// Currently registered user agents, keyed by SIP URI
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn find_by_uri(&self, sip_uri: &str) -> Result<Option<UserAgentRegistration>>;

    /// Insert or refresh a registration; the returned result is store-defined
    async fn upsert(&self, registration: UserAgentRegistration) -> Result<EventResult>;

    async fn delete_by_uri(&self, sip_uri: &str) -> Result<EventResult>;

    async fn list_all(&self) -> Result<Vec<UserAgentRegistration>>;
}

/// Calls in flight, keyed by dialog key
#[async_trait]
pub trait CallStore: Send + Sync {
    async fn exists(&self, key: &DialogKey) -> Result<bool>;

    /// True if `sip_address` is a party to any open call
    async fn exists_by_address(&self, sip_address: &str) -> Result<bool>;

    async fn get_info(&self, key: &DialogKey) -> Result<Option<CallInfo>>;

    async fn get_info_by_id(&self, id: Uuid) -> Result<Option<CallInfo>>;

    /// Insert or replace a call and return its store id.
    ///
    /// A call without an id that matches an existing open call by key takes
    /// over that call's id. A call persisted with `closed` set is archived.
    async fn upsert(&self, call: Call) -> Result<Uuid>;

    /// Insert `call` only if its key is unknown, open or recently closed.
    /// Returns the new id, or `None` when the key was already taken.
    async fn create_if_absent(&self, call: Call) -> Result<Option<Uuid>>;

    async fn update_progress(&self, id: Uuid, sip_code: &str, sip_message: &str) -> Result<()>;

    /// Mark closed, archive to history and drop from the live set
    async fn close(&self, id: Uuid) -> Result<()>;

    async fn fail_and_close(&self, id: Uuid, sip_code: &str, sip_message: &str) -> Result<()>;

    /// Open calls, newest first
    async fn ongoing_calls(&self, anonymize: bool) -> Result<Vec<OngoingCall>>;

    /// Most recently updated open call involving `sip_address`
    async fn ongoing_call_by_address(&self, sip_address: &str) -> Result<Option<OngoingCall>>;
}

/// Archive of finished calls
#[async_trait]
pub trait CallHistoryStore: Send + Sync {
    async fn save(&self, history: CallHistory) -> Result<()>;

    async fn list(&self) -> Result<Vec<CallHistory>>;
}
