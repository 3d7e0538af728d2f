//! Inbound SIP events
//!
//! Events arrive already parsed from the registrar's wire format. They are
//! modelled as one tagged enum so dispatch is a single `match`; unknown
//! kinds and statuses deserialize into catch-all variants instead of failing.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logging::sanitize;
use crate::types::{DialogKey, SipUri};

/// Any event the engine accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SipEvent {
    Registration(RegistrationEvent),
    RegistrationExpire(RegistrationExpireEvent),
    Dialog(DialogEvent),
    ExternalDialog(ExternalDialogEvent),
    #[serde(other)]
    Unknown,
}

impl SipEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SipEvent::Registration(_) => "registration",
            SipEvent::RegistrationExpire(_) => "registration_expire",
            SipEvent::Dialog(_) => "dialog",
            SipEvent::ExternalDialog(_) => "external_dialog",
            SipEvent::Unknown => "unknown",
        }
    }
}

/// A REGISTER seen by the registrar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationEvent {
    pub sip_uri: SipUri,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub from_display_name: String,
    #[serde(default)]
    pub to_display_name: String,
    #[serde(default)]
    pub registrar: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub port: u16,
    /// Expiration interval in seconds, 0 means unregister
    pub expires: u32,
    /// Registrar clock, unix seconds
    #[serde(default)]
    pub unix_timestamp: i64,
    #[serde(default)]
    pub reg_type: Option<String>,
}

impl RegistrationEvent {
    /// To-header display name, falling back to the From-header one
    pub fn display_name(&self) -> &str {
        if self.to_display_name.is_empty() {
            &self.from_display_name
        } else {
            &self.to_display_name
        }
    }
}

/// The registrar dropped a binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationExpireEvent {
    pub sip_address: SipUri,
    #[serde(default)]
    pub reg_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogStatus {
    Start,
    Progress,
    Failed,
    End,
    /// BYE seen by the proxy without a dialog it knew about
    SingleBye,
    #[serde(other)]
    Unknown,
}

/// Dialog state change reported by the proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogEvent {
    pub status: DialogStatus,
    pub call_id: String,
    #[serde(default)]
    pub hash_id: String,
    #[serde(default)]
    pub hash_entry: String,
    pub from_sip_uri: SipUri,
    pub to_sip_uri: SipUri,
    #[serde(default)]
    pub from_display_name: String,
    #[serde(default)]
    pub to_display_name: String,
    #[serde(default)]
    pub from_tag: String,
    #[serde(default)]
    pub to_tag: String,
    #[serde(default)]
    pub sip_code: String,
    #[serde(default)]
    pub sip_message: String,
    #[serde(default)]
    pub sdp: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub hangup_reason: String,
}

impl DialogEvent {
    pub fn dialog_key(&self) -> DialogKey {
        DialogKey::new(&self.call_id, &self.hash_id, &self.hash_entry)
    }
}

impl fmt::Display for DialogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {}, from:{}, to:{}, method:{}, code:{} {}",
            self.status,
            self.dialog_key(),
            sanitize(&self.from_sip_uri.user_at_host()),
            sanitize(&self.to_sip_uri.user_at_host()),
            sanitize(&self.method),
            sanitize(&self.sip_code),
            sanitize(&self.sip_message)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalDialogStatus {
    Start,
    End,
    #[serde(other)]
    Unknown,
}

/// Call event from a third-party call store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalDialogEvent {
    pub status: ExternalDialogStatus,
    pub call_id: String,
    #[serde(default)]
    pub from_username: String,
    #[serde(default)]
    pub to_username: String,
    #[serde(default)]
    pub from_id: String,
    #[serde(default)]
    pub to_id: String,
    #[serde(default)]
    pub from_display_name: String,
    #[serde(default)]
    pub to_display_name: String,
    #[serde(default)]
    pub from_category: Option<String>,
    #[serde(default)]
    pub to_category: Option<String>,
    #[serde(default)]
    pub from_ip: Option<String>,
    #[serde(default)]
    pub to_ip: Option<String>,
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sdp: String,
}

impl ExternalDialogEvent {
    pub fn dialog_key(&self) -> DialogKey {
        DialogKey::external(&self.call_id)
    }
}
