//! Proxy dialog events to call store mutations
//!
//! ## States per dialog key
//!
//! ```text
//!   Absent ──Start──────────────▶ Started ──Progress──▶ Started
//!     │                             │
//!     └─Progress─▶ Progressing ─Start (absorbed, same id)─┘
//!                     │             │
//!                     └──End/Failed─┴──▶ Closed (archived)
//! ```
//!
//! Every event for a closed key is a no-op. Store failures during handling
//! are logged and reported as `NothingChanged`; the proxy resends on real
//! failures, so nothing is retried here.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::collaborators::{DisplayNameResolver, Localizer};
use crate::config::SipEventConfig;
use crate::error::Result;
use crate::events::{DialogEvent, DialogStatus};
use crate::logging::sanitize;
use crate::party::PartyResolver;
use crate::result::EventResult;
use crate::store::{CallStore, RegistrationStore};
use crate::types::Call;

pub struct DialogReconciler {
    registrations: Arc<dyn RegistrationStore>,
    calls: Arc<dyn CallStore>,
    display_names: Arc<dyn DisplayNameResolver>,
    localizer: Arc<dyn Localizer>,
    config: Arc<SipEventConfig>,
}

impl DialogReconciler {
    pub fn new(
        registrations: Arc<dyn RegistrationStore>,
        calls: Arc<dyn CallStore>,
        display_names: Arc<dyn DisplayNameResolver>,
        localizer: Arc<dyn Localizer>,
        config: Arc<SipEventConfig>,
    ) -> Self {
        Self {
            registrations,
            calls,
            display_names,
            localizer,
            config,
        }
    }

    pub async fn handle(&self, event: &DialogEvent) -> EventResult {
        info!("Handle dialog {}", event);

        match event.status {
            DialogStatus::Start => self.start(event).await,
            DialogStatus::Progress => self.progress(event).await,
            DialogStatus::Failed => self.failed(event).await,
            DialogStatus::End => self.end(event).await,
            DialogStatus::SingleBye => {
                // The proxy saw a BYE for a dialog it never tracked
                info!(
                    "Received single BYE. Hangup reason:{}, from:{}, to:{}",
                    sanitize(&event.hangup_reason),
                    sanitize(&event.from_sip_uri.user_at_host()),
                    sanitize(&event.to_sip_uri.user_at_host())
                );
                EventResult::nothing_changed()
            }
            DialogStatus::Unknown => {
                info!("Unhandled dialog status for {}", event.dialog_key());
                EventResult::nothing_changed()
            }
        }
    }

    async fn start(&self, event: &DialogEvent) -> EventResult {
        self.try_start(event).await.unwrap_or_else(|e| {
            error!("Error while registering call with {}: {}", event.dialog_key(), e);
            EventResult::nothing_changed()
        })
    }

    async fn try_start(&self, event: &DialogEvent) -> Result<EventResult> {
        let key = event.dialog_key();
        let existing = self.calls.get_info(&key).await?;

        if let Some(info) = &existing {
            if info.closed {
                warn!("Call with {} already closed, ignoring start", key);
                return Ok(EventResult::nothing_changed());
            }
            if info.is_started {
                debug!("Call with {} already exists", key);
                return Ok(EventResult::nothing_changed());
            }
        }

        let mut call = self.build_call(event, true).await?;
        if let Some(info) = existing {
            // Created earlier by an out-of-order progress event
            debug!("Starting call {} created by progress, keeping id {}", key, info.id);
            call.id = Some(info.id);
            call.started = info.started;
        }

        let from_sip = call.from.sip.clone();
        let id = self.calls.upsert(call).await?;
        Ok(EventResult::call_started(id, from_sip))
    }

    async fn progress(&self, event: &DialogEvent) -> EventResult {
        self.try_progress(event).await.unwrap_or_else(|e| {
            error!("Error while adding progress to call with {}: {}", event.dialog_key(), e);
            EventResult::nothing_changed()
        })
    }

    async fn try_progress(&self, event: &DialogEvent) -> Result<EventResult> {
        if self.config.is_termination_method(&event.method) {
            warn!("Progress call ({}, ignoring it) {}", sanitize(&event.method), event);
            return Ok(EventResult::nothing_changed());
        }

        let key = event.dialog_key();
        let info = match self.calls.get_info(&key).await? {
            Some(info) => Some(info),
            None => {
                // Kept for compatibility: progress before start creates a call
                // that is not yet started
                let call = self.build_call(event, false).await?;
                let from_sip = call.from.sip.clone();
                if let Some(id) = self.calls.create_if_absent(call).await? {
                    warn!("Progress call (creating it) {}", event);
                    return Ok(EventResult::call_started(id, from_sip));
                }
                debug!("Call with {} created concurrently, adding progress", key);
                self.calls.get_info(&key).await?
            }
        };

        let Some(info) = info else {
            warn!("Unable to find call with {} (progress)", key);
            return Ok(EventResult::nothing_changed());
        };
        if info.closed {
            warn!("Call with {} already closed (progress)", key);
            return Ok(EventResult::nothing_changed());
        }

        self.calls
            .update_progress(info.id, &event.sip_code, &event.sip_message)
            .await?;
        Ok(EventResult::call_progress(info.id, info.from_sip_address))
    }

    async fn failed(&self, event: &DialogEvent) -> EventResult {
        self.try_failed(event).await.unwrap_or_else(|e| {
            error!("Error while closing failed call with {}: {}", event.dialog_key(), e);
            EventResult::nothing_changed()
        })
    }

    async fn try_failed(&self, event: &DialogEvent) -> Result<EventResult> {
        let key = event.dialog_key();
        let Some(info) = self.calls.get_info(&key).await? else {
            warn!("Unable to find call with {} (failed)", key);
            return Ok(EventResult::nothing_changed());
        };
        if info.closed {
            warn!("Failed call with {} already closed", key);
            return Ok(EventResult::nothing_changed());
        }

        self.calls
            .fail_and_close(info.id, &event.sip_code, &event.sip_message)
            .await?;
        Ok(EventResult::call_failed(info.id, info.from_sip_address))
    }

    async fn end(&self, event: &DialogEvent) -> EventResult {
        self.try_end(event).await.unwrap_or_else(|e| {
            error!("Error while closing call with {}: {}", event.dialog_key(), e);
            EventResult::nothing_changed()
        })
    }

    async fn try_end(&self, event: &DialogEvent) -> Result<EventResult> {
        let key = event.dialog_key();
        let Some(info) = self.calls.get_info(&key).await? else {
            warn!("Unable to find call with {} (end)", key);
            return Ok(EventResult::nothing_changed());
        };
        if info.closed {
            warn!("Call with {} already closed", key);
            return Ok(EventResult::nothing_changed());
        }

        self.calls.close(info.id).await?;
        Ok(EventResult::call_closed(info.id, info.from_sip_address))
    }

    async fn build_call(&self, event: &DialogEvent, started: bool) -> Result<Call> {
        let resolver = PartyResolver {
            registrations: self.registrations.as_ref(),
            display_names: self.display_names.as_ref(),
            localizer: self.localizer.as_ref(),
            sip_domain: &self.config.sip_domain,
            telephone_category_key: &self.config.telephone_category_key,
        };
        let from = resolver
            .resolve(&event.from_sip_uri, &event.from_display_name, &event.from_tag)
            .await?;
        let to = resolver
            .resolve(&event.to_sip_uri, &event.to_display_name, &event.to_tag)
            .await?;

        let now = Utc::now();
        let mut call = Call::new(event.dialog_key());
        call.is_phone_call = from.is_phone || to.is_phone;
        call.from = from.party;
        call.to = to.party;
        call.started = now;
        call.updated = now;
        call.is_started = started;
        call.is_external = false;
        call.sip_code = event.sip_code.clone();
        call.sip_message = event.sip_message.clone();
        call.sdp = event.sdp.clone();
        Ok(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{DefaultDisplayNameResolver, StaticLocalizer};
    use crate::result::ChangeStatus;
    use crate::store::{InMemoryCallHistoryStore, InMemoryCallStore, InMemoryRegistrationStore};
    use tracing_test::traced_test;

    fn reconciler() -> (DialogReconciler, Arc<InMemoryCallStore>) {
        let history = Arc::new(InMemoryCallHistoryStore::new());
        let calls = Arc::new(InMemoryCallStore::new(history, chrono::Duration::hours(1)));
        let reconciler = DialogReconciler::new(
            Arc::new(InMemoryRegistrationStore::new()),
            calls.clone(),
            Arc::new(DefaultDisplayNameResolver),
            Arc::new(StaticLocalizer::new()),
            Arc::new(SipEventConfig::default()),
        );
        (reconciler, calls)
    }

    fn event(json: &str) -> DialogEvent {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn test_single_bye_is_logged() {
        let (reconciler, calls) = reconciler();
        let bye = event(
            r#"{"status":"single_bye","call_id":"b1","from_sip_uri":"sip:alice@sr.se","to_sip_uri":"sip:bob@sr.se","hangup_reason":"rtp timeout"}"#,
        );

        assert!(reconciler.handle(&bye).await.is_nothing_changed());
        assert_eq!(calls.open_call_count(), 0);
        assert!(logs_contain(
            "Received single BYE. Hangup reason:rtp timeout, from:alice@sr.se, to:bob@sr.se"
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_termination_method_progress_is_logged() {
        let (reconciler, calls) = reconciler();
        let progress = event(
            r#"{"status":"progress","call_id":"p1","from_sip_uri":"sip:alice@sr.se","to_sip_uri":"sip:bob@sr.se","method":"BYE"}"#,
        );

        assert!(reconciler.handle(&progress).await.is_nothing_changed());
        assert_eq!(calls.open_call_count(), 0);
        assert!(logs_contain("Progress call (BYE, ignoring it)"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_progress_creates_call_once() {
        let (reconciler, calls) = reconciler();
        let progress = event(
            r#"{"status":"progress","call_id":"p2","from_sip_uri":"sip:alice@sr.se","to_sip_uri":"sip:bob@sr.se","method":"INVITE","sip_code":"180"}"#,
        );

        let created = reconciler.handle(&progress).await;
        assert_eq!(created.change_status(), ChangeStatus::CallStarted);
        assert!(logs_contain("Progress call (creating it)"));

        let again = reconciler.handle(&progress).await;
        assert_eq!(again.change_status(), ChangeStatus::CallProgress);
        assert_eq!(again.changed_object_id(), created.changed_object_id());
        assert_eq!(calls.open_call_count(), 1);
    }
}
