//! Run-completion notifications
//!
//! The sync engine calls [`Notifier::notify`] exactly once when a run
//! finishes. Delivery (email or webhook) belongs to the host.

use async_trait::async_trait;

use crate::error::Result;

/// Notification delivery capability
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification with a short title and a human-readable body
    async fn notify(&self, title: &str, message: &str) -> Result<()>;
}

/// Notifier that prints to stdout
#[derive(Debug, Clone, Default)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, title: &str, message: &str) -> Result<()> {
        println!("[NOTIFICATION] {}: {}", title, message);
        Ok(())
    }
}
