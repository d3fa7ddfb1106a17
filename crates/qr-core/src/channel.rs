use async_trait::async_trait;

use crate::error::Error;
use crate::stage::StageMessage;

/// The publishing half of the research topic.
///
/// Returning `Ok` means the message was accepted for delivery, not that it
/// has been handled.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: StageMessage) -> Result<(), Error>;
}
