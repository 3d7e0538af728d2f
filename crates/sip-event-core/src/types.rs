//! Core types: SIP addresses, registrations and calls

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SipEventError};

/// A SIP address reduced to the parts the engine cares about.
///
/// Serialized as its textual form (`user@host`), parsed leniently from
/// `sip:`/`sips:` URIs, name-addr brackets and trailing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SipUri {
    pub user: String,
    pub host: Option<String>,
}

impl SipUri {
    pub fn new(user: impl Into<String>, host: Option<String>) -> Self {
        Self {
            user: user.into(),
            host,
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let mut s = input.trim();
        if let (Some(start), Some(end)) = (s.find('<'), s.rfind('>')) {
            if start < end {
                s = &s[start + 1..end];
            }
        }
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("sips:") {
            s = &s[5..];
        } else if lower.starts_with("sip:") {
            s = &s[4..];
        }
        let s = s.split([';', '?']).next().unwrap_or_default().trim();

        let (user, host) = match s.split_once('@') {
            Some((user, host)) => (user, Some(host)),
            None => (s, None),
        };
        if user.is_empty() {
            return Err(SipEventError::InvalidSipUri(input.to_string()));
        }
        let host = host.filter(|h| !h.is_empty()).map(str::to_string);
        Ok(Self::new(user, host))
    }

    /// `user@host`, or just the user when there is no host
    pub fn user_at_host(&self) -> String {
        match &self.host {
            Some(host) => format!("{}@{}", self.user, host),
            None => self.user.clone(),
        }
    }

    /// A user part made only of digits is taken to be a telephone number
    pub fn is_numeric_user(&self) -> bool {
        is_numeric(&self.user)
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_at_host())
    }
}

impl FromStr for SipUri {
    type Err = SipEventError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SipUri {
    type Error = SipEventError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SipUri> for String {
    fn from(uri: SipUri) -> Self {
        uri.user_at_host()
    }
}

pub fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// Identity of one proxy-tracked call attempt.
///
/// Externally originated calls use the external call id with empty hash parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogKey {
    pub call_id: String,
    pub hash_id: String,
    pub hash_entry: String,
}

impl DialogKey {
    pub fn new(
        call_id: impl Into<String>,
        hash_id: impl Into<String>,
        hash_entry: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            hash_id: hash_id.into(),
            hash_entry: hash_entry.into(),
        }
    }

    pub fn external(call_id: impl Into<String>) -> Self {
        Self::new(call_id, "", "")
    }

    pub fn is_external(&self) -> bool {
        self.hash_id.is_empty() && self.hash_entry.is_empty()
    }
}

impl fmt::Display for DialogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "call id:{}, hash id:{}, hash entry:{}",
            crate::logging::sanitize(&self.call_id),
            crate::logging::sanitize(&self.hash_id),
            crate::logging::sanitize(&self.hash_entry)
        )
    }
}

/// A currently registered SIP endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAgentRegistration {
    /// Store identifier, kept across refreshes of the same SIP URI
    pub id: Uuid,
    pub sip_uri: String,
    pub user_agent_header: String,
    pub username: String,
    pub display_name: String,
    pub registrar: String,
    pub ip_address: String,
    pub port: u16,
    pub expiration_time_seconds: u32,
    /// Registrar clock, unix seconds
    pub server_timestamp: i64,
    /// Account this endpoint belongs to, when the SIP URI is a known account
    pub user_account_id: Option<Uuid>,
    pub account_display_name: Option<String>,
}

impl UserAgentRegistration {
    pub fn new(
        sip_uri: impl Into<String>,
        user_agent_header: impl Into<String>,
        display_name: impl Into<String>,
        registrar: impl Into<String>,
        ip_address: impl Into<String>,
        port: u16,
        expiration_time_seconds: u32,
        server_timestamp: i64,
    ) -> Self {
        let sip_uri = sip_uri.into();
        Self {
            id: Uuid::new_v4(),
            username: sip_uri.clone(),
            sip_uri,
            user_agent_header: user_agent_header.into(),
            display_name: display_name.into(),
            registrar: registrar.into(),
            ip_address: ip_address.into(),
            port,
            expiration_time_seconds,
            server_timestamp,
            user_account_id: None,
            account_display_name: None,
        }
    }

    /// Point in time after which the registrar considers the binding gone.
    /// `None` when the registrar timestamp is out of range.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.server_timestamp
            .checked_add(i64::from(self.expiration_time_seconds))
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|at| at <= now).unwrap_or(false)
    }

    /// True when everything except the refresh bookkeeping is the same
    pub fn same_binding(&self, other: &UserAgentRegistration) -> bool {
        self.sip_uri == other.sip_uri
            && self.user_agent_header == other.user_agent_header
            && self.display_name == other.display_name
            && self.registrar == other.registrar
            && self.ip_address == other.ip_address
            && self.port == other.port
    }
}

/// One side of a call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallParty {
    /// Canonical SIP address, raw number or raw `user@host`
    pub sip: String,
    pub display_name: String,
    pub category: Option<String>,
    /// Registration this party resolved to, if any
    pub registration_id: Option<Uuid>,
    pub user_account_id: Option<Uuid>,
    pub tag: String,
    /// Region name for externally originated calls
    pub external_location: Option<String>,
}

/// A call or call attempt in progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Assigned by the call store on first persistence
    pub id: Option<Uuid>,
    pub key: DialogKey,
    pub from: CallParty,
    pub to: CallParty,
    pub started: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub sip_code: String,
    pub sip_message: String,
    pub is_started: bool,
    pub closed: bool,
    pub is_phone_call: bool,
    pub is_external: bool,
    pub sdp: String,
}

impl Call {
    pub fn new(key: DialogKey) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            is_external: key.is_external(),
            key,
            from: CallParty::default(),
            to: CallParty::default(),
            started: now,
            updated: now,
            sip_code: String::new(),
            sip_message: String::new(),
            is_started: false,
            closed: false,
            is_phone_call: false,
            sdp: String::new(),
        }
    }

    /// True if `address` is either party of this call
    pub fn involves(&self, address: &str) -> bool {
        !address.is_empty() && (self.from.sip == address || self.to.sip == address)
    }

    pub fn info(&self) -> Option<CallInfo> {
        let id = self.id?;
        Some(CallInfo {
            id,
            started: self.started,
            is_started: self.is_started,
            from_sip_address: self.from.sip.clone(),
            to_sip_address: self.to.sip.clone(),
            from_id: self.from.registration_id,
            to_id: self.to.registration_id,
            closed: self.closed,
        })
    }
}

/// Read projection of a stored call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallInfo {
    pub id: Uuid,
    pub started: DateTime<Utc>,
    pub is_started: bool,
    pub from_sip_address: String,
    pub to_sip_address: String,
    pub from_id: Option<Uuid>,
    pub to_id: Option<Uuid>,
    pub closed: bool,
}

/// Archived record of a finished call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallHistory {
    pub call_id: Uuid,
    pub key: DialogKey,
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
    pub is_phone_call: bool,
    pub is_external: bool,
    pub failed: bool,
    pub sip_code: String,
    pub sip_message: String,
    pub from: CallParty,
    pub to: CallParty,
}

impl CallHistory {
    pub fn from_call(id: Uuid, call: &Call, failed: bool) -> Self {
        Self {
            call_id: id,
            key: call.key.clone(),
            started: call.started,
            ended: call.updated,
            is_phone_call: call.is_phone_call,
            is_external: call.is_external,
            failed,
            sip_code: call.sip_code.clone(),
            sip_message: call.sip_message.clone(),
            from: call.from.clone(),
            to: call.to.clone(),
        }
    }
}

/// Ongoing call as shown to operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OngoingCall {
    pub id: Uuid,
    pub started: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub is_started: bool,
    pub is_phone_call: bool,
    pub is_external: bool,
    pub sip_code: String,
    pub sip_message: String,
    pub sdp: String,
    pub from: CallParty,
    pub to: CallParty,
}

impl OngoingCall {
    pub fn from_call(id: Uuid, call: &Call) -> Self {
        Self {
            id,
            started: call.started,
            updated: call.updated,
            is_started: call.is_started,
            is_phone_call: call.is_phone_call,
            is_external: call.is_external,
            sip_code: call.sip_code.clone(),
            sip_message: call.sip_message.clone(),
            sdp: call.sdp.clone(),
            from: call.from.clone(),
            to: call.to.clone(),
        }
    }

    /// Mask telephone numbers in both parties
    pub fn anonymized(mut self) -> Self {
        for party in [&mut self.from, &mut self.to] {
            party.sip = anonymize_phone_number(&party.sip);
            party.display_name = anonymize_phone_number(&party.display_name);
        }
        self
    }
}

/// Keep the last three digits of a telephone number, mask the rest.
///
/// Anything that is not a telephone number is returned unchanged.
pub fn anonymize_phone_number(value: &str) -> String {
    let digits = value.strip_prefix('+').unwrap_or(value);
    if !is_numeric(digits) || digits.len() <= 3 {
        return value.to_string();
    }
    let keep = digits.len() - 3;
    let mut masked: String = "*".repeat(keep);
    masked.push_str(&digits[keep..]);
    masked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sip_uri_variants() {
        let uri = SipUri::parse("sip:alice@sr.se").unwrap();
        assert_eq!(uri.user, "alice");
        assert_eq!(uri.host.as_deref(), Some("sr.se"));

        let uri = SipUri::parse("\"Alice\" <sips:alice@sr.se;transport=tls>").unwrap();
        assert_eq!(uri.user_at_host(), "alice@sr.se");

        let uri = SipUri::parse("0701234567").unwrap();
        assert_eq!(uri.host, None);
        assert!(uri.is_numeric_user());

        assert!(SipUri::parse("sip:@sr.se").is_err());
        assert!(SipUri::parse("").is_err());
    }

    #[test]
    fn test_sip_uri_serde_as_string() {
        let uri: SipUri = serde_json::from_str("\"sip:bob@example.org\"").unwrap();
        assert_eq!(uri.user, "bob");
        assert_eq!(serde_json::to_string(&uri).unwrap(), "\"bob@example.org\"");
    }

    #[test]
    fn test_numeric_user() {
        assert!(is_numeric("4686"));
        assert!(!is_numeric("+4686"));
        assert!(!is_numeric("studio1"));
        assert!(!is_numeric(""));
    }

    #[test]
    fn test_dialog_key_external() {
        let key = DialogKey::external("ext-1");
        assert!(key.is_external());
        assert!(!DialogKey::new("c1", "h1", "e1").is_external());
    }

    #[test]
    fn test_dialog_key_display_is_sanitized() {
        let key = DialogKey::new("c1\nfake", "h1", "e1");
        assert_eq!(key.to_string(), "call id:c1fake, hash id:h1, hash entry:e1");
    }

    #[test]
    fn test_registration_expiry() {
        let reg = UserAgentRegistration::new("alice@sr.se", "Quantum", "Alice", "reg1", "10.0.0.1", 5060, 60, 1_000);
        let expires = reg.expires_at().unwrap();
        assert_eq!(expires.timestamp(), 1_060);
        assert!(reg.is_expired(Utc.timestamp_opt(1_060, 0).unwrap()));
        assert!(!reg.is_expired(Utc.timestamp_opt(1_059, 0).unwrap()));
    }

    #[test]
    fn test_registration_expiry_out_of_range_timestamp() {
        let reg = UserAgentRegistration::new("alice@sr.se", "Quantum", "Alice", "reg1", "10.0.0.1", 5060, 600, i64::MAX);
        assert_eq!(reg.expires_at(), None);
        assert!(!reg.is_expired(Utc::now()));

        let reg = UserAgentRegistration::new("alice@sr.se", "Quantum", "Alice", "reg1", "10.0.0.1", 5060, 600, i64::MIN);
        assert_eq!(reg.expires_at(), None);
    }

    #[test]
    fn test_anonymize_phone_number() {
        assert_eq!(anonymize_phone_number("0701234567"), "*******567");
        assert_eq!(anonymize_phone_number("+46701234567"), "********567");
        assert_eq!(anonymize_phone_number("123"), "123");
        assert_eq!(anonymize_phone_number("alice@sr.se"), "alice@sr.se");
    }

    #[test]
    fn test_call_info_requires_id() {
        let mut call = Call::new(DialogKey::new("c1", "h1", "e1"));
        assert!(call.info().is_none());
        call.id = Some(Uuid::new_v4());
        call.from.sip = "alice@sr.se".to_string();
        let info = call.info().unwrap();
        assert_eq!(info.from_sip_address, "alice@sr.se");
        assert!(call.involves("alice@sr.se"));
        assert!(!call.involves(""));
    }
}
