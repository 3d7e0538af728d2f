//! Outcome of handling one event

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    NothingChanged,
    CallStarted,
    CallProgress,
    CallFailed,
    CallClosed,
    CodecAdded,
    CodecUpdated,
    CodecRemoved,
}

impl ChangeStatus {
    pub fn is_call_change(&self) -> bool {
        matches!(
            self,
            ChangeStatus::CallStarted
                | ChangeStatus::CallProgress
                | ChangeStatus::CallFailed
                | ChangeStatus::CallClosed
        )
    }

    pub fn is_codec_change(&self) -> bool {
        matches!(
            self,
            ChangeStatus::CodecAdded | ChangeStatus::CodecUpdated | ChangeStatus::CodecRemoved
        )
    }
}

/// Immutable result returned for every handled event.
///
/// `changed_object_id` is the store identifier of the call or registration,
/// never the SIP Call-ID. Serialized for notification consumers but never
/// read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventResult {
    change_status: ChangeStatus,
    changed_object_id: Option<Uuid>,
    sip_address: Option<String>,
}

impl EventResult {
    pub fn nothing_changed() -> Self {
        Self {
            change_status: ChangeStatus::NothingChanged,
            changed_object_id: None,
            sip_address: None,
        }
    }

    pub fn call_started(id: Uuid, sip_address: impl Into<String>) -> Self {
        Self::with_status(ChangeStatus::CallStarted, id, sip_address)
    }

    pub fn call_progress(id: Uuid, sip_address: impl Into<String>) -> Self {
        Self::with_status(ChangeStatus::CallProgress, id, sip_address)
    }

    pub fn call_failed(id: Uuid, sip_address: impl Into<String>) -> Self {
        Self::with_status(ChangeStatus::CallFailed, id, sip_address)
    }

    pub fn call_closed(id: Uuid, sip_address: impl Into<String>) -> Self {
        Self::with_status(ChangeStatus::CallClosed, id, sip_address)
    }

    pub fn codec_added(id: Uuid, sip_address: impl Into<String>) -> Self {
        Self::with_status(ChangeStatus::CodecAdded, id, sip_address)
    }

    pub fn codec_updated(id: Uuid, sip_address: impl Into<String>) -> Self {
        Self::with_status(ChangeStatus::CodecUpdated, id, sip_address)
    }

    pub fn codec_removed(id: Uuid, sip_address: impl Into<String>) -> Self {
        Self::with_status(ChangeStatus::CodecRemoved, id, sip_address)
    }

    pub(crate) fn with_status(status: ChangeStatus, id: Uuid, sip_address: impl Into<String>) -> Self {
        if status == ChangeStatus::NothingChanged {
            return Self::nothing_changed();
        }
        Self {
            change_status: status,
            changed_object_id: Some(id),
            sip_address: Some(sip_address.into()),
        }
    }

    pub fn change_status(&self) -> ChangeStatus {
        self.change_status
    }

    pub fn changed_object_id(&self) -> Option<Uuid> {
        self.changed_object_id
    }

    pub fn sip_address(&self) -> Option<&str> {
        self.sip_address.as_deref()
    }

    pub fn is_nothing_changed(&self) -> bool {
        self.change_status == ChangeStatus::NothingChanged
    }
}

impl Default for EventResult {
    fn default() -> Self {
        Self::nothing_changed()
    }
}

impl fmt::Display for EventResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Change status:{:?}", self.change_status)?;
        if let Some(id) = self.changed_object_id {
            write!(f, ", Changed object id:{}", id)?;
        }
        if let Some(address) = &self.sip_address {
            write!(f, ", SIP address:{}", crate::logging::sanitize(address))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_changed_has_no_payload() {
        let result = EventResult::nothing_changed();
        assert!(result.is_nothing_changed());
        assert_eq!(result.changed_object_id(), None);
        assert_eq!(result.sip_address(), None);
        assert_eq!(result.to_string(), "Change status:NothingChanged");
    }

    #[test]
    fn test_with_status_nothing_changed_drops_payload() {
        let result = EventResult::with_status(ChangeStatus::NothingChanged, Uuid::new_v4(), "alice@sr.se");
        assert_eq!(result, EventResult::nothing_changed());
    }

    #[test]
    fn test_call_result() {
        let id = Uuid::new_v4();
        let result = EventResult::call_closed(id, "alice@sr.se");
        assert_eq!(result.change_status(), ChangeStatus::CallClosed);
        assert!(result.change_status().is_call_change());
        assert!(!result.change_status().is_codec_change());
        assert_eq!(result.changed_object_id(), Some(id));
        assert_eq!(result.sip_address(), Some("alice@sr.se"));
    }

    #[test]
    fn test_result_serializes_for_consumers() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(EventResult::codec_removed(id, "codec1@sr.se")).unwrap();
        assert_eq!(json["change_status"], "codec_removed");
        assert_eq!(json["changed_object_id"], id.to_string());
        assert_eq!(json["sip_address"], "codec1@sr.se");

        let json = serde_json::to_value(EventResult::nothing_changed()).unwrap();
        assert!(json["changed_object_id"].is_null());
    }
}
