//! Call events from a third-party call store

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::collaborators::LocationResolver;
use crate::error::Result;
use crate::events::{ExternalDialogEvent, ExternalDialogStatus};
use crate::logging::sanitize;
use crate::result::EventResult;
use crate::store::CallStore;
use crate::types::{Call, CallParty};

pub struct ExternalDialogReconciler {
    calls: Arc<dyn CallStore>,
    locations: Arc<dyn LocationResolver>,
}

impl ExternalDialogReconciler {
    pub fn new(calls: Arc<dyn CallStore>, locations: Arc<dyn LocationResolver>) -> Self {
        Self { calls, locations }
    }

    pub async fn handle(&self, event: &ExternalDialogEvent) -> EventResult {
        match event.status {
            ExternalDialogStatus::Start => self.start(event).await,
            ExternalDialogStatus::End => self.end(event).await,
            ExternalDialogStatus::Unknown => {
                info!(
                    "Ignoring external dialog event with unknown status, call id:{}",
                    sanitize(&event.call_id)
                );
                EventResult::nothing_changed()
            }
        }
    }

    async fn start(&self, event: &ExternalDialogEvent) -> EventResult {
        match self.try_start(event).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    "Error while registering call with call id:{} (external): {}",
                    sanitize(&event.call_id),
                    e
                );
                EventResult::nothing_changed()
            }
        }
    }

    async fn try_start(&self, event: &ExternalDialogEvent) -> Result<EventResult> {
        debug!(
            "Register call from:{} to:{}, call id:{}",
            sanitize(&event.from_username),
            sanitize(&event.to_username),
            sanitize(&event.call_id)
        );

        let key = event.dialog_key();
        if self.calls.exists(&key).await? {
            if event.ended.is_some() {
                debug!(
                    "Call with id:{} should be ended, closing it instead of registering it",
                    sanitize(&event.call_id)
                );
                return self.try_end(event).await;
            }
            debug!("Call with id:{} already exists", sanitize(&event.call_id));
            return Ok(EventResult::nothing_changed());
        }

        let mut call = Call::new(key);
        call.from = self.party(
            &event.from_username,
            &event.from_display_name,
            &event.from_id,
            event.from_category.as_deref(),
            event.from_ip.as_deref(),
        );
        call.to = self.party(
            &event.to_username,
            &event.to_display_name,
            &event.to_id,
            event.to_category.as_deref(),
            event.to_ip.as_deref(),
        );
        call.started = event.started.unwrap_or_else(Utc::now);
        call.updated = Utc::now();
        call.closed = event.ended.is_some();
        call.is_started = true;
        call.is_external = true;
        call.sdp = event.sdp.clone();

        let from_sip = call.from.sip.clone();
        let id = self.calls.upsert(call).await?;
        Ok(EventResult::call_started(id, from_sip))
    }

    async fn end(&self, event: &ExternalDialogEvent) -> EventResult {
        match self.try_end(event).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    "Error while closing call with call id:{} (external): {}",
                    sanitize(&event.call_id),
                    e
                );
                EventResult::nothing_changed()
            }
        }
    }

    async fn try_end(&self, event: &ExternalDialogEvent) -> Result<EventResult> {
        debug!("Closing call with id:{} (external)", sanitize(&event.call_id));

        let Some(info) = self.calls.get_info(&event.dialog_key()).await? else {
            warn!("Unable to find call with call id:{} (external)", sanitize(&event.call_id));
            return Ok(EventResult::nothing_changed());
        };
        if info.closed {
            warn!("Call with call id:{} already closed (external)", sanitize(&event.call_id));
            return Ok(EventResult::nothing_changed());
        }

        self.calls.close(info.id).await?;
        Ok(EventResult::call_closed(info.id, info.from_sip_address))
    }

    fn party(
        &self,
        username: &str,
        display_name: &str,
        id: &str,
        category: Option<&str>,
        ip: Option<&str>,
    ) -> CallParty {
        CallParty {
            sip: username.to_string(),
            display_name: display_name.to_string(),
            category: category.map(str::to_string),
            registration_id: parse_party_id(id),
            user_account_id: None,
            tag: String::new(),
            external_location: ip.and_then(|ip| self.locations.region_name_by_ip(ip)),
        }
    }
}

/// External ids are UUIDs; anything else is dropped
fn parse_party_id(id: &str) -> Option<Uuid> {
    let id = id.trim();
    if id.is_empty() {
        return None;
    }
    match Uuid::parse_str(id) {
        Ok(uuid) => Some(uuid),
        Err(_) => {
            warn!("Ignoring malformed external party id {}", sanitize(id));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StaticLocationResolver;
    use crate::store::{InMemoryCallHistoryStore, InMemoryCallStore};
    use tracing_test::traced_test;

    #[test]
    fn test_parse_party_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_party_id(&id.to_string()), Some(id));
        assert_eq!(parse_party_id(""), None);
        assert_eq!(parse_party_id("not-a-uuid"), None);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unknown_status_is_logged_at_info() {
        let history = Arc::new(InMemoryCallHistoryStore::new());
        let calls = Arc::new(InMemoryCallStore::new(history, chrono::Duration::hours(1)));
        let reconciler = ExternalDialogReconciler::new(calls.clone(), Arc::new(StaticLocationResolver::new()));
        let event: ExternalDialogEvent =
            serde_json::from_str(r#"{"status":"ringing","call_id":"ext-9"}"#).unwrap();

        assert!(reconciler.handle(&event).await.is_nothing_changed());
        assert_eq!(calls.open_call_count(), 0);
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|line| line.contains("INFO") && line.contains("unknown status, call id:ext-9"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("expected one info line, found {}", n)),
            }
        });
    }
}
