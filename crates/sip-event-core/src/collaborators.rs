//! Collaborators the reconcilers consult but do not own: display names,
//! localized labels and IP geolocation.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::types::UserAgentRegistration;

/// Computes the name shown for a registered party
pub trait DisplayNameResolver: Send + Sync {
    fn display_name(&self, registration: &UserAgentRegistration, sip_domain: &str) -> String;
}

/// Account name, then registration name, then username without the home
/// domain, then the SIP URI.
#[derive(Debug, Clone, Default)]
pub struct DefaultDisplayNameResolver;

impl DisplayNameResolver for DefaultDisplayNameResolver {
    fn display_name(&self, registration: &UserAgentRegistration, sip_domain: &str) -> String {
        let candidates = [
            registration.account_display_name.as_deref().unwrap_or_default(),
            registration.display_name.as_str(),
        ];
        if let Some(name) = candidates.iter().map(|c| c.trim()).find(|c| !c.is_empty()) {
            return name.to_string();
        }

        let username = registration.username.trim();
        if !username.is_empty() {
            return strip_domain(username, sip_domain).to_string();
        }
        registration.sip_uri.clone()
    }
}

fn strip_domain<'a>(username: &'a str, sip_domain: &str) -> &'a str {
    if sip_domain.is_empty() {
        return username;
    }
    match username.rsplit_once('@') {
        Some((user, domain)) if domain.eq_ignore_ascii_case(sip_domain) => user,
        _ => username,
    }
}

/// Looks up localized text by key
pub trait Localizer: Send + Sync {
    fn localize(&self, key: &str) -> String;
}

/// Fixed translation table; unknown keys come back unchanged
#[derive(Debug, Clone, Default)]
pub struct StaticLocalizer {
    texts: HashMap<String, String>,
}

impl StaticLocalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.texts.insert(key.into(), text.into());
        self
    }
}

impl Localizer for StaticLocalizer {
    fn localize(&self, key: &str) -> String {
        self.texts.get(key).cloned().unwrap_or_else(|| key.to_string())
    }
}

/// Maps an IP address to a region name
pub trait LocationResolver: Send + Sync {
    fn region_name_by_ip(&self, ip_address: &str) -> Option<String>;
}

#[derive(Debug, Clone)]
struct Network {
    address: IpAddr,
    prefix_len: u8,
    region: String,
}

impl Network {
    fn contains(&self, ip: &IpAddr) -> bool {
        match (self.address, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                prefix_match(&net.octets(), &ip.octets(), self.prefix_len)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                prefix_match(&net.octets(), &ip.octets(), self.prefix_len)
            }
            _ => false,
        }
    }
}

fn prefix_match(net: &[u8], ip: &[u8], prefix_len: u8) -> bool {
    let full = (prefix_len / 8) as usize;
    let rest = prefix_len % 8;
    if full > net.len() || net[..full] != ip[..full] {
        return false;
    }
    if rest == 0 || full == net.len() {
        return true;
    }
    let mask = 0xffu8 << (8 - rest);
    net[full] & mask == ip[full] & mask
}

/// Region lookup from a list of networks; the longest matching prefix wins
#[derive(Debug, Clone, Default)]
pub struct StaticLocationResolver {
    networks: Vec<Network>,
}

impl StaticLocationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `address/prefix_len` for `region`. Prefixes longer than the address
    /// family allows are clamped.
    pub fn with_network(mut self, address: IpAddr, prefix_len: u8, region: impl Into<String>) -> Self {
        let max = if address.is_ipv4() { 32 } else { 128 };
        self.networks.push(Network {
            address,
            prefix_len: prefix_len.min(max),
            region: region.into(),
        });
        self
    }
}

impl LocationResolver for StaticLocationResolver {
    fn region_name_by_ip(&self, ip_address: &str) -> Option<String> {
        let ip: IpAddr = ip_address.trim().parse().ok()?;
        self.networks
            .iter()
            .filter(|network| network.contains(&ip))
            .max_by_key(|network| network.prefix_len)
            .map(|network| network.region.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> UserAgentRegistration {
        UserAgentRegistration::new("studio1@sr.se", "Quantum", "", "reg", "10.0.0.1", 5060, 60, 0)
    }

    #[test]
    fn test_display_name_prefers_account_name() {
        let mut reg = registration();
        reg.display_name = "Studio One".to_string();
        reg.account_display_name = Some("Studio 1 Stockholm".to_string());
        assert_eq!(DefaultDisplayNameResolver.display_name(&reg, "sr.se"), "Studio 1 Stockholm");

        reg.account_display_name = Some("  ".to_string());
        assert_eq!(DefaultDisplayNameResolver.display_name(&reg, "sr.se"), "Studio One");
    }

    #[test]
    fn test_display_name_strips_home_domain() {
        let reg = registration();
        assert_eq!(DefaultDisplayNameResolver.display_name(&reg, "sr.se"), "studio1");
        assert_eq!(DefaultDisplayNameResolver.display_name(&reg, "other.se"), "studio1@sr.se");
    }

    #[test]
    fn test_localizer_falls_back_to_key() {
        let localizer = StaticLocalizer::new().with_text("Telephone", "Telefon");
        assert_eq!(localizer.localize("Telephone"), "Telefon");
        assert_eq!(localizer.localize("Codec"), "Codec");
    }

    #[test]
    fn test_location_longest_prefix() {
        let resolver = StaticLocationResolver::new()
            .with_network("10.0.0.0".parse().unwrap(), 8, "Sweden")
            .with_network("10.20.0.0".parse().unwrap(), 16, "Göteborg")
            .with_network("2001:db8::".parse().unwrap(), 32, "Lab");

        assert_eq!(resolver.region_name_by_ip("10.1.2.3").as_deref(), Some("Sweden"));
        assert_eq!(resolver.region_name_by_ip("10.20.9.9").as_deref(), Some("Göteborg"));
        assert_eq!(resolver.region_name_by_ip("2001:db8::1").as_deref(), Some("Lab"));
        assert_eq!(resolver.region_name_by_ip("192.168.1.1"), None);
        assert_eq!(resolver.region_name_by_ip("not-an-ip"), None);
    }

    #[test]
    fn test_prefix_match_partial_octet() {
        assert!(prefix_match(&[192, 168, 0, 0], &[192, 168, 1, 7], 23));
        assert!(!prefix_match(&[192, 168, 0, 0], &[192, 168, 2, 7], 23));
        assert!(prefix_match(&[1, 2, 3, 4], &[9, 9, 9, 9], 0));
        assert!(prefix_match(&[1, 2, 3, 4], &[1, 2, 3, 4], 32));
    }
}
