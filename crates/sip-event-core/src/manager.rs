//! Entry point that routes inbound SIP events to the reconcilers

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::collaborators::{
    DefaultDisplayNameResolver, DisplayNameResolver, LocationResolver, Localizer,
    StaticLocalizer, StaticLocationResolver,
};
use crate::config::SipEventConfig;
use crate::error::Result;
use crate::events::{ExternalDialogEvent, SipEvent};
use crate::notify::ResultNotifier;
use crate::reconciler::{DialogReconciler, ExternalDialogReconciler, RegistrationReconciler};
use crate::result::EventResult;
use crate::store::{
    CallStore, InMemoryCallHistoryStore, InMemoryCallStore, InMemoryRegistrationStore,
    RegistrationStore,
};

/// Handles to the stores behind [`SipEventManager::in_memory`]
#[derive(Clone)]
pub struct InMemoryStores {
    pub registrations: Arc<InMemoryRegistrationStore>,
    pub calls: Arc<InMemoryCallStore>,
    pub history: Arc<InMemoryCallHistoryStore>,
}

/// Owns one reconciler per event family and publishes every result that
/// changed something.
pub struct SipEventManager {
    config: Arc<SipEventConfig>,
    registration: RegistrationReconciler,
    dialog: DialogReconciler,
    external: ExternalDialogReconciler,
    notifier: ResultNotifier,
}

impl SipEventManager {
    pub fn builder(
        registrations: Arc<dyn RegistrationStore>,
        calls: Arc<dyn CallStore>,
    ) -> SipEventManagerBuilder {
        SipEventManagerBuilder::new(registrations, calls)
    }

    /// Manager backed by fresh in-memory stores
    pub fn in_memory(config: SipEventConfig) -> Result<(Self, InMemoryStores)> {
        let history = Arc::new(InMemoryCallHistoryStore::new());
        let calls = Arc::new(InMemoryCallStore::new(
            history.clone(),
            config.closed_call_retention(),
        ));
        let registrations = Arc::new(InMemoryRegistrationStore::new());

        let manager = Self::builder(registrations.clone(), calls.clone())
            .with_config(config)
            .build()?;
        let stores = InMemoryStores {
            registrations,
            calls,
            history,
        };
        Ok((manager, stores))
    }

    /// Handle one event. Never fails; problems are logged and reported as
    /// `NothingChanged`.
    pub async fn handle(&self, event: SipEvent) -> EventResult {
        if !self.config.enabled {
            trace!("SIP event handling disabled, dropping {} event", event.kind());
            return EventResult::nothing_changed();
        }

        let result = match &event {
            SipEvent::Registration(registration) => self.registration.register(registration).await,
            SipEvent::RegistrationExpire(expire) => {
                self.registration
                    .unregister(&expire.sip_address, expire.reg_type.as_deref())
                    .await
            }
            SipEvent::Dialog(dialog) => self.dialog.handle(dialog).await,
            SipEvent::ExternalDialog(external) => self.external.handle(external).await,
            SipEvent::Unknown => {
                info!("Unhandled SIP event kind, ignoring it");
                EventResult::nothing_changed()
            }
        };

        self.publish(&result);
        result
    }

    /// Handle a call event from the external call store
    pub async fn handle_external_dialog(&self, event: &ExternalDialogEvent) -> EventResult {
        if !self.config.enabled {
            trace!("SIP event handling disabled, dropping external dialog event");
            return EventResult::nothing_changed();
        }
        let result = self.external.handle(event).await;
        self.publish(&result);
        result
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventResult> {
        self.notifier.subscribe()
    }

    pub fn config(&self) -> &SipEventConfig {
        &self.config
    }

    fn publish(&self, result: &EventResult) {
        if result.is_nothing_changed() {
            return;
        }
        let receivers = self.notifier.publish(result);
        debug!("Published {} to {} subscriber(s)", result, receivers);
    }
}

/// Builder for [`SipEventManager`]; collaborators default to the static
/// implementations.
///
/// ```rust
/// # use std::sync::Arc;
/// # use ccm_sip_event_core::prelude::*;
/// # tokio_test::block_on(async {
/// let history = Arc::new(InMemoryCallHistoryStore::new());
/// let calls = Arc::new(InMemoryCallStore::new(history, chrono::Duration::hours(1)));
/// let manager = SipEventManager::builder(Arc::new(InMemoryRegistrationStore::new()), calls)
///     .with_localizer(Arc::new(StaticLocalizer::new().with_text("Telephone", "Telefon")))
///     .build()?;
///
/// let event: SipEvent = serde_json::from_str(r#"{"kind":"unknown_kind"}"#)?;
/// assert!(manager.handle(event).await.is_nothing_changed());
/// # Ok::<(), SipEventError>(())
/// # });
/// ```
pub struct SipEventManagerBuilder {
    registrations: Arc<dyn RegistrationStore>,
    calls: Arc<dyn CallStore>,
    config: SipEventConfig,
    display_names: Option<Arc<dyn DisplayNameResolver>>,
    localizer: Option<Arc<dyn Localizer>>,
    locations: Option<Arc<dyn LocationResolver>>,
}

impl SipEventManagerBuilder {
    pub fn new(registrations: Arc<dyn RegistrationStore>, calls: Arc<dyn CallStore>) -> Self {
        Self {
            registrations,
            calls,
            config: SipEventConfig::default(),
            display_names: None,
            localizer: None,
            locations: None,
        }
    }

    pub fn with_config(mut self, config: SipEventConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_display_name_resolver(mut self, resolver: Arc<dyn DisplayNameResolver>) -> Self {
        self.display_names = Some(resolver);
        self
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = Some(localizer);
        self
    }

    pub fn with_location_resolver(mut self, resolver: Arc<dyn LocationResolver>) -> Self {
        self.locations = Some(resolver);
        self
    }

    /// Validate the configuration and wire the reconcilers
    pub fn build(self) -> Result<SipEventManager> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let display_names = self
            .display_names
            .unwrap_or_else(|| Arc::new(DefaultDisplayNameResolver));
        let localizer = self
            .localizer
            .unwrap_or_else(|| Arc::new(StaticLocalizer::new()));
        let locations = self
            .locations
            .unwrap_or_else(|| Arc::new(StaticLocationResolver::new()));

        let registration = RegistrationReconciler::new(
            self.registrations.clone(),
            self.calls.clone(),
            config.deletion_reg_type.clone(),
        );
        let dialog = DialogReconciler::new(
            self.registrations,
            self.calls.clone(),
            display_names,
            localizer,
            config.clone(),
        );
        let external = ExternalDialogReconciler::new(self.calls, locations);
        let notifier = ResultNotifier::new(config.notification_capacity);

        info!(
            "SIP event manager ready (enabled:{}, sip domain:{})",
            config.enabled, config.sip_domain
        );

        Ok(SipEventManager {
            config,
            registration,
            dialog,
            external,
            notifier,
        })
    }
}
