//! Shared builders for the integration tests

#![allow(dead_code)]

use ccm_sip_event_core::prelude::*;

pub const DOMAIN: &str = "sr.se";

pub fn manager() -> (SipEventManager, InMemoryStores) {
    let config = SipEventConfig {
        sip_domain: DOMAIN.to_string(),
        ..Default::default()
    };
    SipEventManager::in_memory(config).unwrap()
}

pub fn uri(address: &str) -> SipUri {
    SipUri::parse(address).unwrap()
}

pub fn registration(address: &str, expires: u32) -> RegistrationEvent {
    RegistrationEvent {
        sip_uri: uri(address),
        user_agent: "Quantum ST/3.1".to_string(),
        from_display_name: String::new(),
        to_display_name: "Studio 4".to_string(),
        registrar: "registrar.sr.se".to_string(),
        ip_address: "10.10.1.20".to_string(),
        port: 5060,
        expires,
        unix_timestamp: 1_700_000_000,
        reg_type: None,
    }
}

pub fn dialog(status: DialogStatus, call_id: &str, from: &str, to: &str) -> DialogEvent {
    DialogEvent {
        status,
        call_id: call_id.to_string(),
        hash_id: "h1".to_string(),
        hash_entry: "e1".to_string(),
        from_sip_uri: uri(from),
        to_sip_uri: uri(to),
        from_display_name: String::new(),
        to_display_name: String::new(),
        from_tag: "ft".to_string(),
        to_tag: "tt".to_string(),
        sip_code: String::new(),
        sip_message: String::new(),
        sdp: String::new(),
        method: "INVITE".to_string(),
        hangup_reason: String::new(),
    }
}

pub fn external(status: ExternalDialogStatus, call_id: &str) -> ExternalDialogEvent {
    ExternalDialogEvent {
        status,
        call_id: call_id.to_string(),
        from_username: "reporter1".to_string(),
        to_username: "studio4".to_string(),
        from_id: String::new(),
        to_id: String::new(),
        from_display_name: "Reporter".to_string(),
        to_display_name: "Studio 4".to_string(),
        from_category: Some("Field".to_string()),
        to_category: None,
        from_ip: None,
        to_ip: None,
        started: None,
        ended: None,
        sdp: String::new(),
    }
}
