use anyhow::Result;
use async_trait::async_trait;

/// The capability that actually delivers text into the addressed process.
///
/// Implemented outside this crate (tmux send-keys, a PTY writer, a test
/// double). `Ok(false)` and `Err` are both treated as retryable delivery
/// failures.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, target: &str, text: &str) -> Result<bool>;
}
