use crate::task::{TaskRepository, TaskService, TaskServiceError};
use chrono::{DateTime, Days, Local, NaiveTime, TimeDelta, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cron expression of the pending task report: every day at local midnight.
pub const PENDING_REPORT_CRON: &str = "0 0 0 * * ?";

/// Logs every task that is not `DONE`, one record per task.
///
/// # Returns
///
/// The number of pending tasks that were logged.
#[tracing::instrument(skip(service))]
pub async fn pending_tasks<R: TaskRepository>(
    service: &TaskService<R>,
) -> Result<usize, TaskServiceError> {
    let pending = service.get_pending_tasks().await?;
    tracing::info!("Pending tasks: {}", pending.len());
    for task in &pending {
        tracing::info!(task_id = task.id(), title = task.title(), "Pending task");
    }
    Ok(pending.len())
}

/// Time left from `now` until the next midnight in its time zone.
///
/// When midnight is skipped by a daylight saving change, the wait ends at the
/// first valid local time of the new day.
pub fn until_next_midnight<Tz: TimeZone>(now: DateTime<Tz>) -> Duration {
    let zone = now.timezone();
    let midnight = (now.date_naive() + Days::new(1)).and_time(NaiveTime::MIN);
    let next_run = (0..=1)
        .find_map(|hours| {
            zone.from_local_datetime(&(midnight + TimeDelta::hours(hours)))
                .earliest()
        })
        .unwrap_or_else(|| now.clone() + TimeDelta::days(1));
    (next_run - now).to_std().unwrap_or(Duration::ZERO)
}

/// Spawns the daily pending task report.
///
/// The loop sleeps until local midnight, runs the report and repeats until
/// `cancel` fires. A failed run is logged and the next one is still scheduled.
pub fn spawn_pending_report<R>(
    service: Arc<TaskService<R>>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    R: TaskRepository + 'static,
{
    tokio::spawn(async move {
        tracing::info!(cron = PENDING_REPORT_CRON, "Pending task report scheduled");
        loop {
            let wait = until_next_midnight(Local::now());
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if let Err(err) = pending_tasks(&service).await {
                        tracing::error!("Pending task report failed: {}", err);
                    }
                }
                () = cancel.cancelled() => {
                    tracing::info!("Pending task report stopped");
                    return;
                }
            }
        }
    })
}
