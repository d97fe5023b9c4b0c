//! Proxy inspector port.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::ProbeError;

/// Reports how long the current credential remains valid.
#[async_trait]
pub trait ProxyInspector: Send + Sync {
    /// Remaining validity. `Ok(None)` means no proxy is in use; a zero
    /// duration means it has expired.
    async fn remaining_validity(&self) -> Result<Option<Duration>, ProbeError>;
}
