//! Proxy validity derived from the proxy file's renewal time.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::domain::errors::ProbeError;
use crate::domain::ports::ProxyInspector;

/// Validity = modification time + lifetime - now, floored at zero.
#[derive(Debug, Clone)]
pub struct ProxyFile {
    path: PathBuf,
    lifetime: Duration,
}

impl ProxyFile {
    pub fn new(path: impl Into<PathBuf>, lifetime: Duration) -> Self {
        Self {
            path: path.into(),
            lifetime,
        }
    }
}

#[async_trait]
impl ProxyInspector for ProxyFile {
    async fn remaining_validity(&self) -> Result<Option<Duration>, ProbeError> {
        let renewed = tokio::fs::metadata(&self.path).await?.modified()?;
        let expires = renewed + self.lifetime;
        let remaining = expires
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO);
        Ok(Some(remaining))
    }
}

/// Used when no proxy file is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProxy;

#[async_trait]
impl ProxyInspector for NoProxy {
    async fn remaining_validity(&self) -> Result<Option<Duration>, ProbeError> {
        Ok(None)
    }
}
