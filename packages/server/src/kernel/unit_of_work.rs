//! One command, one transaction, side effects after commit.
//!
//! A [`UnitOfWork`] owns the store transaction and a buffer of
//! [`SideEffect`]s. Nothing in the buffer runs until [`UnitOfWork::commit`]
//! succeeds and the caller dispatches the returned [`PostCommit`]. Dropping
//! the unit of work (error, timeout) rolls the transaction back and discards
//! the buffer.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use tracing::{debug, warn};

use super::store::StoreTx;
use super::{Notification, ServerDeps};
use crate::common::error::CoreError;
use crate::domains::listings::events::{ListingStatusChanged, STATUS_CHANGED_SUBJECT};

/// External work deferred until the transaction commits.
#[derive(Debug, Clone)]
pub enum SideEffect {
    /// Publish on the status stream, then fan out its notifications.
    StatusChanged(ListingStatusChanged),
    Notify(Notification),
    /// Hand a job to the processing queue, optionally after a delay.
    Enqueue {
        job_id: String,
        payload: Bytes,
        delay: Option<Duration>,
    },
}

impl SideEffect {
    pub fn name(&self) -> &'static str {
        match self {
            SideEffect::StatusChanged(_) => "status_changed",
            SideEffect::Notify(_) => "notify",
            SideEffect::Enqueue { .. } => "enqueue",
        }
    }
}

pub struct UnitOfWork {
    tx: Box<dyn StoreTx>,
    effects: Vec<SideEffect>,
}

impl UnitOfWork {
    pub async fn begin(deps: &ServerDeps) -> Result<Self, CoreError> {
        Ok(Self {
            tx: deps.store.begin().await?,
            effects: Vec::new(),
        })
    }

    pub fn defer(&mut self, effect: SideEffect) {
        self.effects.push(effect);
    }

    pub fn pending(&self) -> &[SideEffect] {
        &self.effects
    }

    pub async fn commit(self) -> Result<PostCommit, CoreError> {
        let UnitOfWork { tx, effects } = self;
        tx.commit().await?;
        Ok(PostCommit { effects })
    }
}

impl Deref for UnitOfWork {
    type Target = dyn StoreTx;

    fn deref(&self) -> &Self::Target {
        &*self.tx
    }
}

impl DerefMut for UnitOfWork {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.tx
    }
}

/// Side effects of a committed unit of work.
#[must_use = "post-commit effects do nothing until dispatched"]
#[derive(Debug, Default)]
pub struct PostCommit {
    effects: Vec<SideEffect>,
}

impl PostCommit {
    pub fn effects(&self) -> &[SideEffect] {
        &self.effects
    }

    /// Run every effect in order. Failures are logged and counted; the
    /// command already committed, so they never surface to the caller.
    pub async fn dispatch(self, deps: &ServerDeps) {
        for effect in self.effects {
            let name = effect.name();
            if let Err(e) = run(effect, deps).await {
                warn!(effect = name, error = %e, "post-commit effect failed");
                metrics::counter!("post_commit_failures_total", "effect" => name).increment(1);
            }
        }
    }
}

async fn run(effect: SideEffect, deps: &ServerDeps) -> Result<()> {
    match effect {
        SideEffect::StatusChanged(event) => {
            metrics::counter!(
                "listing_status_transitions_total",
                "from" => event.old_status.as_str(),
                "to" => event.new_status.as_str()
            )
            .increment(1);
            let payload = serde_json::to_vec(&event)?;
            deps.events
                .publish(STATUS_CHANGED_SUBJECT.to_string(), Bytes::from(payload))
                .await?;
            for notification in event.notifications() {
                if let Err(e) = deps.notifications.notify(&notification).await {
                    warn!(template = %notification.template, error = %e, "notification failed");
                    metrics::counter!("post_commit_failures_total", "effect" => "notify")
                        .increment(1);
                }
            }
            Ok(())
        }
        SideEffect::Notify(notification) => deps.notifications.notify(&notification).await,
        SideEffect::Enqueue {
            job_id,
            payload,
            delay: None,
        } => deps.processing_queue.enqueue(&job_id, payload).await,
        SideEffect::Enqueue {
            job_id,
            payload,
            delay: Some(delay),
        } if delay.is_zero() => deps.processing_queue.enqueue(&job_id, payload).await,
        SideEffect::Enqueue {
            job_id,
            payload,
            delay: Some(delay),
        } => {
            // Not durable: a restart before the delay elapses loses the retry.
            debug!(job_id = %job_id, delay_ms = delay.as_millis() as u64, "scheduling delayed enqueue");
            let queue = deps.processing_queue.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = queue.enqueue(&job_id, payload).await {
                    warn!(job_id = %job_id, error = %e, "delayed enqueue failed");
                    metrics::counter!("post_commit_failures_total", "effect" => "enqueue")
                        .increment(1);
                }
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ListingIdentityId, ListingVersionId, UserId};
    use crate::domains::listings::models::{ListingIdentity, ListingStatus};
    use crate::kernel::TestDependencies;
    use chrono::Utc;

    fn status_event(actor: i64) -> ListingStatusChanged {
        ListingStatusChanged {
            identity_id: ListingIdentityId::new(1),
            version_id: ListingVersionId::new(1),
            owner_user_id: UserId::new(55),
            old_status: ListingStatus::PendingPhotoProcessing,
            new_status: ListingStatus::PendingOwnerApproval,
            reason: None,
            actor_id: UserId::new(actor),
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_effects_run_only_after_commit() {
        let test = TestDependencies::new();
        let deps = test.deps();

        {
            let mut uow = UnitOfWork::begin(&deps).await.unwrap();
            let identity = ListingIdentity::new(UserId::new(55), "TQ000001".into(), Utc::now());
            uow.insert_identity(&identity).await.unwrap();
            uow.defer(SideEffect::StatusChanged(status_event(0)));
            // dropped without commit
        }
        assert!(test.nats.published_messages().is_empty());
        assert!(test.store.snapshot().await.identities.is_empty());

        let mut uow = UnitOfWork::begin(&deps).await.unwrap();
        uow.defer(SideEffect::StatusChanged(status_event(0)));
        uow.defer(SideEffect::Enqueue {
            job_id: "7".into(),
            payload: Bytes::from_static(b"{}"),
            delay: Some(Duration::ZERO),
        });
        let post = uow.commit().await.unwrap();
        assert_eq!(post.effects().len(), 2);
        post.dispatch(&deps).await;

        assert_eq!(test.nats.publish_count_for(STATUS_CHANGED_SUBJECT), 1);
        assert_eq!(test.notifier.templates_for(UserId::new(55)), vec!["listing.media_ready"]);
        assert_eq!(test.queue.job_ids(), vec!["7".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_effect_does_not_stop_the_rest() {
        let test = TestDependencies::new();
        test.queue.fail_next(1);
        let deps = test.deps();

        let mut uow = UnitOfWork::begin(&deps).await.unwrap();
        uow.defer(SideEffect::Enqueue {
            job_id: "1".into(),
            payload: Bytes::new(),
            delay: None,
        });
        uow.defer(SideEffect::Notify(Notification::new(
            UserId::new(9),
            "photo_session.confirmed",
            serde_json::json!({}),
        )));
        uow.commit().await.unwrap().dispatch(&deps).await;

        assert!(test.queue.job_ids().is_empty());
        assert_eq!(test.notifier.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_enqueue_fires_after_delay() {
        let test = TestDependencies::new();
        let deps = test.deps();

        let mut uow = UnitOfWork::begin(&deps).await.unwrap();
        uow.defer(SideEffect::Enqueue {
            job_id: "3".into(),
            payload: Bytes::new(),
            delay: Some(Duration::from_secs(2)),
        });
        uow.commit().await.unwrap().dispatch(&deps).await;
        assert!(test.queue.job_ids().is_empty());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(test.queue.job_ids(), vec!["3".to_string()]);
    }
}
