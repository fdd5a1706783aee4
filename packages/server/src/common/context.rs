//! Per-request command context: who is calling and until when.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::auth::Actor;
use super::error::CoreError;

/// Carried by every command. The deadline is inherited from the calling
/// request; when it elapses in-flight I/O is dropped, the open transaction
/// rolls back and the command returns `TIMEOUT`.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    pub actor: Actor,
    pub deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            deadline: None,
        }
    }

    pub fn with_timeout(actor: Actor, timeout: Duration) -> Self {
        Self {
            actor,
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn system() -> Self {
        Self::new(Actor::system())
    }

    /// Same deadline, different actor (used when a command fires a
    /// follow-up transition on behalf of the system).
    pub fn as_system(&self) -> Self {
        Self {
            actor: Actor::system(),
            deadline: self.deadline,
        }
    }

    /// Run the transactional part of a command under the deadline.
    ///
    /// Dropping the future on expiry drops the transaction handle, which rolls
    /// it back. Post-commit side effects are dispatched by the caller after
    /// this returns, so they never run for a timed-out command.
    pub async fn within_deadline<T, F>(&self, fut: F) -> Result<T, CoreError>
    where
        F: Future<Output = Result<T, CoreError>>,
    {
        match self.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, fut).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(actor = %self.actor.user_id, "command deadline elapsed");
                    Err(CoreError::Timeout)
                }
            },
            None => fut.await,
        }
    }
}
