//! Credential validity check.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::{CheckKind, ThresholdRegistry, Verdict};
use crate::domain::ports::ProxyInspector;

use super::{bounded, human};

pub struct ProxyCheck {
    inspector: Arc<dyn ProxyInspector>,
}

impl ProxyCheck {
    pub fn new(inspector: Arc<dyn ProxyInspector>) -> Self {
        Self { inspector }
    }

    pub async fn evaluate(&self, registry: &ThresholdRegistry) -> Verdict {
        match bounded(registry.probe_timeout, self.inspector.remaining_validity()).await {
            Ok(remaining) => classify(remaining, registry),
            Err(e) => {
                tracing::warn!(error = %e, "proxy probe failed");
                Verdict::probe_unavailable(CheckKind::Proxy).with_detail(e.to_string())
            }
        }
    }
}

/// Threshold rule for the remaining credential validity.
pub fn classify(remaining: Option<Duration>, registry: &ThresholdRegistry) -> Verdict {
    let Some(remaining) = remaining else {
        return Verdict::ok(CheckKind::Proxy, "proxy_not_configured");
    };

    if remaining.is_zero() {
        Verdict::fatal(CheckKind::Proxy, "proxy_expired").with_detail("proxy has expired")
    } else if remaining < registry.proxy_verification_time {
        Verdict::warn(CheckKind::Proxy, "proxy_expiring").with_detail(format!(
            "proxy valid for {} (verification limit {})",
            human(remaining),
            human(registry.proxy_verification_time)
        ))
    } else {
        Verdict::ok(CheckKind::Proxy, "proxy_valid")
    }
}
