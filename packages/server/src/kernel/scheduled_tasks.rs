//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! Reservation holds are enforced when a slot is next touched, so nothing
//! here is needed for correctness. The sweep only keeps lapsed holds from
//! lingering in RESERVED and moves their listings back to scheduling.
//!
//! ```text
//! Scheduler (every minute)
//!     │
//!     └─► release_expired_reservations()
//!             └─► per slot: release, cancel candidate session, reschedule listing
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::common::{Actor, RequestContext};
use crate::domains::photo_sessions::actions::release_expired_reservations;
use crate::kernel::ServerDeps;

const RESERVATION_SWEEP_SCHEDULE: &str = "0 * * * * *";

/// Start all scheduled tasks
pub async fn start_scheduler(deps: Arc<ServerDeps>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let sweep_job = Job::new_async(RESERVATION_SWEEP_SCHEDULE, move |_uuid, _lock| {
        let deps = deps.clone();
        Box::pin(async move {
            run_reservation_sweep(&deps).await;
        })
    })?;

    scheduler.add(sweep_job).await?;
    scheduler.start().await?;

    tracing::info!("Scheduled tasks started (reservation sweep every minute)");
    Ok(scheduler)
}

async fn run_reservation_sweep(deps: &ServerDeps) {
    let ctx = RequestContext::with_timeout(Actor::system(), deps.settings.command_timeout);
    match release_expired_reservations(&ctx, deps).await {
        Ok(report) if report.released_slots > 0 => tracing::info!(
            released_slots = report.released_slots,
            cancelled_sessions = report.cancelled_sessions,
            listings_rescheduled = report.listings_rescheduled,
            "reservation sweep finished"
        ),
        Ok(_) => tracing::debug!("reservation sweep found nothing to release"),
        Err(e) => tracing::error!(error = %e, "reservation sweep failed"),
    }
}
