//! In-memory store implementations

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{Result, SipEventError};
use crate::logging::sanitize;
use crate::result::EventResult;
use crate::store::{CallHistoryStore, CallStore, RegistrationStore};
use crate::types::{Call, CallHistory, CallInfo, DialogKey, OngoingCall, UserAgentRegistration};

/// A provisioned SIP account that registrations are linked to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipAccount {
    pub id: Uuid,
    /// SIP URI the account registers with
    pub username: String,
    pub display_name: Option<String>,
}

impl SipAccount {
    pub fn new(username: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            display_name,
        }
    }
}

/// Registrations held in a concurrent map
pub struct InMemoryRegistrationStore {
    registrations: Arc<DashMap<String, UserAgentRegistration>>,
    accounts: Arc<DashMap<String, SipAccount>>,
}

impl InMemoryRegistrationStore {
    pub fn new() -> Self {
        Self {
            registrations: Arc::new(DashMap::new()),
            accounts: Arc::new(DashMap::new()),
        }
    }

    /// Provision an account; later registrations of its SIP URI link to it
    pub fn add_account(&self, account: SipAccount) {
        self.accounts.insert(account.username.clone(), account);
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Drop every registration whose expiry has passed
    pub fn remove_expired(&self, now: DateTime<Utc>) -> Vec<UserAgentRegistration> {
        let expired: Vec<String> = self
            .registrations
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        let removed: Vec<UserAgentRegistration> = expired
            .into_iter()
            .filter_map(|uri| self.registrations.remove(&uri).map(|(_, reg)| reg))
            .collect();

        if !removed.is_empty() {
            debug!("Removed {} expired registrations", removed.len());
        }
        removed
    }
}

impl Default for InMemoryRegistrationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistrationStore for InMemoryRegistrationStore {
    async fn find_by_uri(&self, sip_uri: &str) -> Result<Option<UserAgentRegistration>> {
        Ok(self.registrations.get(sip_uri).map(|entry| entry.clone()))
    }

    async fn upsert(&self, mut registration: UserAgentRegistration) -> Result<EventResult> {
        if let Some(account) = self.accounts.get(&registration.sip_uri) {
            registration.user_account_id = Some(account.id);
            registration.account_display_name = account.display_name.clone();
        }

        let result = match self.registrations.entry(registration.sip_uri.clone()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get();
                registration.id = existing.id;
                let changed = !existing.same_binding(&registration)
                    || existing.user_account_id != registration.user_account_id
                    || existing.account_display_name != registration.account_display_name;
                let result = if changed {
                    EventResult::codec_updated(registration.id, &registration.sip_uri)
                } else {
                    EventResult::nothing_changed()
                };
                entry.insert(registration);
                result
            }
            Entry::Vacant(entry) => {
                let result = EventResult::codec_added(registration.id, &registration.sip_uri);
                entry.insert(registration);
                result
            }
        };
        Ok(result)
    }

    async fn delete_by_uri(&self, sip_uri: &str) -> Result<EventResult> {
        Ok(match self.registrations.remove(sip_uri) {
            Some((uri, registration)) => EventResult::codec_removed(registration.id, uri),
            None => EventResult::nothing_changed(),
        })
    }

    async fn list_all(&self) -> Result<Vec<UserAgentRegistration>> {
        Ok(self.registrations.iter().map(|entry| entry.clone()).collect())
    }
}

/// Call history kept in a vector
pub struct InMemoryCallHistoryStore {
    entries: RwLock<Vec<CallHistory>>,
    unavailable: AtomicBool,
}

impl InMemoryCallHistoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make subsequent saves fail, as an unreachable archive would
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for InMemoryCallHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallHistoryStore for InMemoryCallHistoryStore {
    async fn save(&self, history: CallHistory) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SipEventError::store("save call history", "history store unavailable"));
        }
        self.entries.write().push(history);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<CallHistory>> {
        Ok(self.entries.read().clone())
    }
}

/// A call that was closed and archived, remembered by key for a while
#[derive(Debug, Clone)]
struct ClosedCall {
    info: CallInfo,
    closed_at: DateTime<Utc>,
}

/// Upper bound between two sweeps of closed calls
const MAX_SWEEP_INTERVAL_SECS: i64 = 60;

/// Live calls held in concurrent maps.
///
/// Closed calls are remembered for the retention window and forgotten by a
/// sweep that runs at most once per window, piggybacked on writes. The same
/// sweep retries archiving calls whose history save failed.
pub struct InMemoryCallStore {
    calls: Arc<DashMap<Uuid, Call>>,
    keys: Arc<DashMap<DialogKey, Uuid>>,
    closed: Arc<DashMap<DialogKey, ClosedCall>>,
    /// Closed calls still waiting for their history record, with the failed flag
    unarchived: Arc<DashMap<Uuid, bool>>,
    history: Arc<dyn CallHistoryStore>,
    retention: Duration,
    sweep_interval: Duration,
    last_sweep: Mutex<DateTime<Utc>>,
}

impl InMemoryCallStore {
    pub fn new(history: Arc<dyn CallHistoryStore>, retention: Duration) -> Self {
        Self {
            calls: Arc::new(DashMap::new()),
            keys: Arc::new(DashMap::new()),
            closed: Arc::new(DashMap::new()),
            unarchived: Arc::new(DashMap::new()),
            history,
            retention,
            sweep_interval: retention.min(Duration::seconds(MAX_SWEEP_INTERVAL_SECS)),
            last_sweep: Mutex::new(Utc::now()),
        }
    }

    /// Number of calls in the live set
    pub fn open_call_count(&self) -> usize {
        self.calls.iter().filter(|entry| !entry.closed).count()
    }

    /// Number of closed calls still remembered by key
    pub fn closed_call_count(&self) -> usize {
        self.closed.len()
    }

    /// Full stored call by id
    pub fn call(&self, id: Uuid) -> Option<Call> {
        self.calls.get(&id).map(|entry| entry.clone())
    }

    /// Forget closed calls older than the retention window
    pub fn purge_closed(&self, now: DateTime<Utc>) -> usize {
        let before = self.closed.len();
        let retention = self.retention;
        self.closed.retain(|_, closed| now - closed.closed_at < retention);
        before.saturating_sub(self.closed.len())
    }

    /// Purge expired tombstones and retry pending archives, at most once per
    /// sweep interval
    pub async fn sweep(&self, now: DateTime<Utc>) {
        {
            let mut last = self.last_sweep.lock();
            if now - *last < self.sweep_interval {
                return;
            }
            *last = now;
        }

        let purged = self.purge_closed(now);
        let pending: Vec<(Uuid, bool)> = self
            .unarchived
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        let mut archived = 0;
        for (id, failed) in pending {
            match self.archive(id, failed).await {
                Ok(true) => archived += 1,
                Ok(false) => {}
                Err(_) => {
                    self.unarchived.remove(&id);
                }
            }
        }

        if purged > 0 || archived > 0 {
            debug!(
                "Swept call store: {} closed calls forgotten, {} pending calls archived",
                purged, archived
            );
        }
    }

    fn closed_info(&self, key: &DialogKey) -> Option<CallInfo> {
        let now = Utc::now();
        let closed = self.closed.get(key)?;
        if now - closed.closed_at < self.retention {
            Some(closed.info.clone())
        } else {
            drop(closed);
            self.closed.remove(key);
            None
        }
    }

    /// Mark the call closed and move it to history. Returns false when the
    /// history save failed and the call stays in the live set for a later
    /// sweep.
    async fn archive(&self, id: Uuid, failed: bool) -> Result<bool> {
        let call = {
            let mut entry = self
                .calls
                .get_mut(&id)
                .ok_or_else(|| SipEventError::CallNotFound(id.to_string()))?;
            if !entry.closed {
                entry.closed = true;
                entry.updated = Utc::now();
            }
            entry.clone()
        };

        if let Err(e) = self.history.save(CallHistory::from_call(id, &call, failed)).await {
            error!(
                "Unable to save call history for {}, from:{}, to:{}. Did not remove call: {}",
                call.key,
                sanitize(&call.from.sip),
                sanitize(&call.to.sip),
                e
            );
            self.unarchived.insert(id, failed);
            return Ok(false);
        }

        // Tombstone first so the key is never briefly unknown
        if let Some(info) = call.info() {
            self.closed.insert(
                call.key.clone(),
                ClosedCall {
                    info,
                    closed_at: call.updated,
                },
            );
        }
        self.calls.remove(&id);
        self.keys.remove_if(&call.key, |_, stored| *stored == id);
        self.unarchived.remove(&id);
        debug!("Archived call {} ({})", id, call.key);
        Ok(true)
    }
}

/// Refresh a stored call from an incoming one without undoing its start.
///
/// A call that is already started keeps its parties and start time when a
/// not-yet-started version of it arrives late; only the SIP state is taken.
/// A closed call stays closed.
fn merge_call(stored: &mut Call, incoming: Call) {
    let closed = stored.closed || incoming.closed;
    if stored.is_started && !incoming.is_started {
        stored.sip_code = incoming.sip_code;
        stored.sip_message = incoming.sip_message;
        if !incoming.sdp.is_empty() {
            stored.sdp = incoming.sdp;
        }
        stored.updated = incoming.updated;
    } else {
        *stored = incoming;
    }
    stored.closed = closed;
}

#[async_trait]
impl CallStore for InMemoryCallStore {
    async fn exists(&self, key: &DialogKey) -> Result<bool> {
        Ok(self.get_info(key).await?.is_some())
    }

    async fn exists_by_address(&self, sip_address: &str) -> Result<bool> {
        Ok(self
            .calls
            .iter()
            .any(|entry| !entry.closed && entry.involves(sip_address)))
    }

    async fn get_info(&self, key: &DialogKey) -> Result<Option<CallInfo>> {
        let live = self
            .keys
            .get(key)
            .and_then(|id| self.calls.get(&*id).and_then(|call| call.info()));
        Ok(live.or_else(|| self.closed_info(key)))
    }

    async fn get_info_by_id(&self, id: Uuid) -> Result<Option<CallInfo>> {
        if let Some(call) = self.calls.get(&id) {
            return Ok(call.info());
        }
        Ok(self
            .closed
            .iter()
            .find(|entry| entry.info.id == id)
            .map(|entry| entry.info.clone()))
    }

    async fn upsert(&self, mut call: Call) -> Result<Uuid> {
        let key = call.key.clone();
        let closed = call.closed;
        call.updated = Utc::now();

        // The key entry stays locked until the call is written
        let id = match self.keys.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let stored = *entry.get();
                if let Some(requested) = call.id {
                    if requested != stored {
                        warn!(
                            "Call {} already stored as {}, ignoring requested id {}",
                            key, stored, requested
                        );
                    }
                }
                call.id = Some(stored);
                match self.calls.get_mut(&stored) {
                    Some(mut existing) => merge_call(&mut existing, call),
                    None => {
                        self.calls.insert(stored, call);
                    }
                }
                stored
            }
            Entry::Vacant(entry) => {
                let id = call.id.unwrap_or_else(Uuid::new_v4);
                call.id = Some(id);
                self.calls.insert(id, call);
                entry.insert(id);
                id
            }
        };
        self.closed.remove(&key);

        if closed {
            self.archive(id, false).await?;
        }
        self.sweep(Utc::now()).await;
        Ok(id)
    }

    async fn create_if_absent(&self, mut call: Call) -> Result<Option<Uuid>> {
        if self.closed_info(&call.key).is_some() {
            return Ok(None);
        }
        match self.keys.entry(call.key.clone()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(entry) => {
                let id = call.id.unwrap_or_else(Uuid::new_v4);
                call.id = Some(id);
                call.updated = Utc::now();
                self.calls.insert(id, call);
                entry.insert(id);
                Ok(Some(id))
            }
        }
    }

    async fn update_progress(&self, id: Uuid, sip_code: &str, sip_message: &str) -> Result<()> {
        let mut call = self.calls.get_mut(&id).ok_or_else(|| {
            error!("Could not update progress for {} since there is no call to be found", id);
            SipEventError::CallNotFound(id.to_string())
        })?;
        call.sip_code = sip_code.to_string();
        call.sip_message = sip_message.to_string();
        call.updated = Utc::now();
        Ok(())
    }

    async fn close(&self, id: Uuid) -> Result<()> {
        self.archive(id, false).await?;
        self.sweep(Utc::now()).await;
        Ok(())
    }

    async fn fail_and_close(&self, id: Uuid, sip_code: &str, sip_message: &str) -> Result<()> {
        {
            let mut call = self
                .calls
                .get_mut(&id)
                .ok_or_else(|| SipEventError::CallNotFound(id.to_string()))?;
            if !sip_code.is_empty() {
                call.sip_code = sip_code.to_string();
                call.sip_message = sip_message.to_string();
            }
        }
        self.archive(id, true).await?;
        self.sweep(Utc::now()).await;
        Ok(())
    }

    async fn ongoing_calls(&self, anonymize: bool) -> Result<Vec<OngoingCall>> {
        let mut calls: Vec<OngoingCall> = self
            .calls
            .iter()
            .filter(|entry| !entry.closed)
            .map(|entry| OngoingCall::from_call(*entry.key(), entry.value()))
            .collect();
        calls.sort_by(|a, b| b.started.cmp(&a.started));
        if anonymize {
            calls = calls.into_iter().map(OngoingCall::anonymized).collect();
        }
        Ok(calls)
    }

    async fn ongoing_call_by_address(&self, sip_address: &str) -> Result<Option<OngoingCall>> {
        Ok(self
            .calls
            .iter()
            .filter(|entry| !entry.closed && entry.involves(sip_address))
            .max_by_key(|entry| entry.updated)
            .map(|entry| OngoingCall::from_call(*entry.key(), entry.value())))
    }
}
