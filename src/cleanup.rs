use crate::{app_state::AppState, logins, snippets};
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tower_sessions::{session_store, ExpiredDeletion};
use tracing::{debug, error, info};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(15 * 60);
const CLEANUP_BATCH_SIZE: i64 = 100;

/// Start the background task that periodically removes expired snippets, logins and sessions.
pub fn spawn_cleanup_job(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            target: "cleanup",
            interval_secs = CLEANUP_INTERVAL.as_secs(),
            batch_size = CLEANUP_BATCH_SIZE,
            "starting cleanup background task"
        );

        let mut ticker = interval(CLEANUP_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(err) = run_cleanup_cycle(&state).await {
                error!(target: "cleanup", %err, "cleanup cycle failed");
            }
        }
    })
}

/// One pass over expired data. Returns the number of snippets and logins removed.
pub async fn run_cleanup_cycle(state: &AppState) -> Result<CleanupReport, CleanupError> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let mut report = CleanupReport::default();

    // Batched: a backlog is drained over several short statements.
    loop {
        let removed =
            snippets::delete_expired_snippets(state.db(), now, CLEANUP_BATCH_SIZE).await?;
        report.snippets_removed += removed;
        if removed < CLEANUP_BATCH_SIZE as u64 {
            break;
        }
    }

    report.logins_removed = logins::delete_expired_logins(state.db(), now).await?;
    state.session_store().delete_expired().await?;

    if report.snippets_removed > 0 || report.logins_removed > 0 {
        info!(
            target: "cleanup",
            snippets_removed = report.snippets_removed,
            logins_removed = report.logins_removed,
            "expired data removed"
        );
    } else {
        debug!(target: "cleanup", "nothing expired in this cycle");
    }

    Ok(report)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub snippets_removed: u64,
    pub logins_removed: u64,
}

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("session store error: {0}")]
    SessionStore(#[from] session_store::Error),
}
