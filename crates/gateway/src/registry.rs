//! Provider Registry / Factory (spec section 4.2).
//!
//! A pure function of configuration to an ordered list of available
//! providers, grounded on `holler::backend::BackendPool::route_tool`'s
//! deterministic dispatch table — generalized from "route by tool-name
//! prefix" to "filter and order providers by availability and priority".

use patch::{PrimaryProvider, ProviderConfig};
use signal::ProviderKind;

fn to_provider_kind(p: PrimaryProvider) -> ProviderKind {
    match p {
        PrimaryProvider::P1 => ProviderKind::P1,
        PrimaryProvider::P2 => ProviderKind::P2,
    }
}

/// Providers installed and enabled for this gateway instance, per spec
/// 4.2: P1 requires credentials AND a base URL AND not explicitly
/// disabled; P2 is available unless explicitly disabled.
pub fn available_providers(config: &ProviderConfig) -> Vec<ProviderKind> {
    let mut providers = Vec::new();
    if config.p1_enabled && config.p1_credentials.is_some() && config.p1_base_url.is_some() {
        providers.push(ProviderKind::P1);
    }
    if config.p2_enabled {
        providers.push(ProviderKind::P2);
    }
    providers
}

/// `[primary, fallback]` with unavailable entries filtered out, in a
/// deterministic order: primary first, then the other available
/// provider.
pub fn priority(config: &ProviderConfig) -> Vec<ProviderKind> {
    let available = available_providers(config);
    let primary = to_provider_kind(config.primary);
    let fallback = match primary {
        ProviderKind::P1 => ProviderKind::P2,
        ProviderKind::P2 => ProviderKind::P1,
    };

    [primary, fallback]
        .into_iter()
        .filter(|p| available.contains(p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(p1_enabled: bool, p1_creds: bool, p2_enabled: bool, primary: PrimaryProvider) -> ProviderConfig {
        ProviderConfig {
            primary,
            p1_enabled,
            p2_enabled,
            p1_credentials: p1_creds.then(|| "tok".to_string()),
            p1_base_url: p1_creds.then(|| "https://p1.example.com".to_string()),
        }
    }

    #[test]
    fn p1_unavailable_without_credentials() {
        let cfg = config(true, false, true, PrimaryProvider::P1);
        assert_eq!(available_providers(&cfg), vec![ProviderKind::P2]);
    }

    #[test]
    fn p1_unavailable_without_base_url() {
        let mut cfg = config(true, true, true, PrimaryProvider::P1);
        cfg.p1_base_url = None;
        assert_eq!(available_providers(&cfg), vec![ProviderKind::P2]);
    }

    #[test]
    fn both_available_when_configured() {
        let cfg = config(true, true, true, PrimaryProvider::P1);
        assert_eq!(available_providers(&cfg), vec![ProviderKind::P1, ProviderKind::P2]);
    }

    #[test]
    fn priority_puts_primary_first() {
        let cfg = config(true, true, true, PrimaryProvider::P2);
        assert_eq!(priority(&cfg), vec![ProviderKind::P2, ProviderKind::P1]);
    }

    #[test]
    fn priority_filters_unavailable_fallback() {
        let cfg = config(false, false, true, PrimaryProvider::P1);
        // Primary P1 unavailable (disabled), only P2 remains.
        assert_eq!(priority(&cfg), vec![ProviderKind::P2]);
    }

    #[test]
    fn priority_empty_when_nothing_available() {
        let cfg = config(false, false, false, PrimaryProvider::P1);
        assert!(priority(&cfg).is_empty());
    }
}
