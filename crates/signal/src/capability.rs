//! Provider identity and static capability descriptors.

use serde::{Deserialize, Serialize};

/// Identifier of one of the two supported provider variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Official HTTP/webhook-based provider.
    P1,
    /// QR-code-authenticated socket provider.
    P2,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P1 => "p1",
            Self::P2 => "p2",
        }
    }

    /// Static capability set for this variant, per spec.md §4.1.
    pub fn capabilities(&self) -> Capabilities {
        match self {
            Self::P1 => Capabilities {
                supports_templates: true,
                supports_interactive: true,
                requires_qr_auth: false,
                is_official: true,
            },
            Self::P2 => Capabilities {
                supports_templates: false,
                supports_interactive: false,
                requires_qr_auth: true,
                is_official: false,
            },
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static, per-variant capability flags (never change at runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_templates: bool,
    pub supports_interactive: bool,
    pub requires_qr_auth: bool,
    pub is_official: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2_never_supports_templates() {
        assert!(!ProviderKind::P2.capabilities().supports_templates);
        assert!(ProviderKind::P2.capabilities().requires_qr_auth);
    }

    #[test]
    fn p1_is_official_and_supports_templates() {
        let caps = ProviderKind::P1.capabilities();
        assert!(caps.is_official);
        assert!(caps.supports_templates);
        assert!(!caps.requires_qr_auth);
    }
}
