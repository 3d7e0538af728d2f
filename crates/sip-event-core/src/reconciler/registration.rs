//! Registration events to registration store mutations

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::events::RegistrationEvent;
use crate::logging::sanitize;
use crate::result::EventResult;
use crate::store::{CallStore, RegistrationStore};
use crate::types::{SipUri, UserAgentRegistration};

pub struct RegistrationReconciler {
    registrations: Arc<dyn RegistrationStore>,
    calls: Arc<dyn CallStore>,
    deletion_reg_type: String,
}

impl RegistrationReconciler {
    pub fn new(
        registrations: Arc<dyn RegistrationStore>,
        calls: Arc<dyn CallStore>,
        deletion_reg_type: impl Into<String>,
    ) -> Self {
        Self {
            registrations,
            calls,
            deletion_reg_type: deletion_reg_type.into(),
        }
    }

    /// Register or refresh a user agent. An expiration of zero is an
    /// unregistration and never stored.
    pub async fn register(&self, event: &RegistrationEvent) -> EventResult {
        if event.expires == 0 {
            return self.unregister(&event.sip_uri, event.reg_type.as_deref()).await;
        }

        let sip_uri = event.sip_uri.user_at_host();
        let registration = UserAgentRegistration::new(
            sip_uri.clone(),
            event.user_agent.clone(),
            event.display_name(),
            event.registrar.clone(),
            event.ip_address.clone(),
            event.port,
            event.expires,
            event.unix_timestamp,
        );

        match self.registrations.upsert(registration).await {
            Ok(result) => {
                debug!("Registered {} ({})", sanitize(&sip_uri), result);
                result
            }
            Err(e) => {
                error!("Error while registering {}: {}", sanitize(&sip_uri), e);
                EventResult::nothing_changed()
            }
        }
    }

    /// Remove a registration.
    ///
    /// An explicit deletion of an address that is still party to an open call
    /// is logged as an anomaly; the removal happens regardless.
    pub async fn unregister(&self, sip_address: &SipUri, reg_type: Option<&str>) -> EventResult {
        let address = sip_address.user_at_host();

        if reg_type == Some(self.deletion_reg_type.as_str()) {
            info!(
                "Unregister codec {}, type:{}",
                sanitize(&address),
                self.deletion_reg_type
            );
            match self.calls.exists_by_address(&address).await {
                Ok(true) => error!("Unregistering codec but it's in a call {}", sanitize(&address)),
                Ok(false) => {}
                Err(e) => warn!(
                    "Could not check calls for {} while unregistering: {}",
                    sanitize(&address),
                    e
                ),
            }
        }

        match self.registrations.delete_by_uri(&address).await {
            Ok(result) => result,
            Err(e) => {
                error!("Error while unregistering {}: {}", sanitize(&address), e);
                EventResult::nothing_changed()
            }
        }
    }
}
