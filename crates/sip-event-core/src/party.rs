//! Resolution of a dialog party against the live registrations

use tracing::debug;

use crate::collaborators::{DisplayNameResolver, Localizer};
use crate::error::Result;
use crate::store::RegistrationStore;
use crate::types::{CallParty, SipUri};

/// Resolved party together with the phone-call marker it implies
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParty {
    pub party: CallParty,
    pub is_phone: bool,
}

/// Settings shared by every resolution
pub struct PartyResolver<'a> {
    pub registrations: &'a dyn RegistrationStore,
    pub display_names: &'a dyn DisplayNameResolver,
    pub localizer: &'a dyn Localizer,
    pub sip_domain: &'a str,
    pub telephone_category_key: &'a str,
}

impl PartyResolver<'_> {
    /// Resolve one side of a dialog.
    ///
    /// 1. a registration whose SIP URI equals the user part or `user@host`
    ///    supplies the canonical URI, display name and account id;
    /// 2. otherwise an all-digit user part is a telephone number;
    /// 3. otherwise the raw `user@host` is kept.
    pub async fn resolve(&self, uri: &SipUri, display_name: &str, tag: &str) -> Result<ResolvedParty> {
        let mut party = CallParty {
            display_name: display_name.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        };

        let user_at_host = uri.user_at_host();
        let mut registration = self.registrations.find_by_uri(&user_at_host).await?;
        if registration.is_none() && user_at_host != uri.user {
            registration = self.registrations.find_by_uri(&uri.user).await?;
        }

        if let Some(registration) = registration {
            debug!("Party {} resolved to registration {}", user_at_host, registration.id);
            party.display_name = self.display_names.display_name(&registration, self.sip_domain);
            party.sip = registration.sip_uri;
            party.registration_id = Some(registration.id);
            party.user_account_id = registration.user_account_id;
            return Ok(ResolvedParty { party, is_phone: false });
        }

        if uri.is_numeric_user() {
            party.sip = uri.user.clone();
            party.category = Some(self.localizer.localize(self.telephone_category_key));
            return Ok(ResolvedParty { party, is_phone: true });
        }

        party.sip = user_at_host;
        Ok(ResolvedParty { party, is_phone: false })
    }
}
