use async_trait::async_trait;

use crate::error::Error;

/// Write-only keyed blob store for finished reports.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist `body` under `key`, replacing any earlier report.
    /// Returns a human-readable location of the stored report.
    async fn write(&self, key: &str, body: &str) -> Result<String, Error>;
}
