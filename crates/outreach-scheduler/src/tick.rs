//! The scheduler's tick loop (C7): wakes every 60 seconds, checks each
//! catalog entry's cadence, and dispatches the ones that are due onto their
//! own tokio task behind a per-task concurrency semaphore.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, Semaphore};
use tracing::{error, info, warn};

use crate::catalog::TaskSpec;

const TICK_INTERVAL: Duration = Duration::from_secs(60);

type TaskFuture = Pin<Box<dyn Future<Output = outreach_common::Result<()>> + Send>>;
type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

struct RegisteredTask {
    spec: TaskSpec,
    run: TaskFn,
    semaphore: Arc<Semaphore>,
    last_run: RwLock<Option<DateTime<Utc>>>,
}

/// Runs the task catalog on a fixed tick, independent of any single task's
/// own cadence. A task still in flight when its next boundary arrives is
/// simply skipped for that tick — `max_concurrency` governs how many
/// overlapping runs are tolerated, almost always one.
pub struct Scheduler {
    tasks: Vec<RegisteredTask>,
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder { tasks: Vec::new() }
    }

    /// Runs the tick loop forever. Intended to be the whole body of a
    /// dedicated tokio task or the scheduler binary's `main`.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        let tasks = Arc::new(self.tasks);
        loop {
            interval.tick().await;
            let now = Utc::now();
            for task in tasks.iter() {
                let due = {
                    let last_run = *task.last_run.read().await;
                    task.spec.schedule.is_due(last_run, now)
                };
                if !due {
                    continue;
                }
                let Ok(permit) = Arc::clone(&task.semaphore).try_acquire_owned() else {
                    warn!(task = task.spec.name, "skipping tick, previous run still in flight");
                    continue;
                };

                {
                    let mut last_run = task.last_run.write().await;
                    *last_run = Some(now);
                }

                let name = task.spec.name;
                let timeout = task.spec.timeout;
                let run = task.run.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    info!(task = name, "dispatching scheduled task");
                    match tokio::time::timeout(timeout, run()).await {
                        Ok(Ok(())) => info!(task = name, "scheduled task completed"),
                        Ok(Err(e)) => error!(task = name, error = %e, "scheduled task failed"),
                        Err(_) => error!(task = name, timeout_secs = timeout.as_secs(), "scheduled task timed out"),
                    }
                });
            }
        }
    }
}

pub struct SchedulerBuilder {
    tasks: Vec<RegisteredTask>,
}

impl SchedulerBuilder {
    /// Registers a task under `spec.name`, running `run` whenever
    /// `spec.schedule` says it's due.
    pub fn register<F, Fut>(mut self, spec: TaskSpec, run: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = outreach_common::Result<()>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(spec.max_concurrency));
        let run: TaskFn = Arc::new(move || Box::pin(run()) as TaskFuture);
        self.tasks.push(RegisteredTask {
            spec,
            run,
            semaphore,
            last_run: RwLock::new(None),
        });
        self
    }

    pub fn build(self) -> Scheduler {
        Scheduler { tasks: self.tasks }
    }
}

/// Descriptive snapshot used by tests and the admin surface: task name to
/// whether it currently holds any concurrency permits.
pub async fn task_names(scheduler_tasks: &[TaskSpec]) -> HashMap<&'static str, usize> {
    scheduler_tasks
        .iter()
        .map(|t| (t.name, t.max_concurrency))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ScheduleKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn registered_task_runs_when_due() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        let scheduler = Scheduler::builder()
            .register(
                TaskSpec {
                    name: "test_task",
                    schedule: ScheduleKind::Interval(Duration::from_secs(0)),
                    max_concurrency: 1,
                    timeout: Duration::from_secs(5),
                },
                move || {
                    let counter = counter_clone.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
            )
            .build();

        assert_eq!(scheduler.tasks.len(), 1);
        // Exercise the registered closure directly rather than running the
        // full one-minute tick loop in a unit test.
        (scheduler.tasks[0].run)().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn task_names_reports_concurrency_caps() {
        let specs = vec![TaskSpec {
            name: "foo",
            schedule: ScheduleKind::Interval(Duration::from_secs(60)),
            max_concurrency: 3,
            timeout: Duration::from_secs(5),
        }];
        let names: HashMap<_, _> = specs.iter().map(|t| (t.name, t.max_concurrency)).collect();
        assert_eq!(names.get("foo"), Some(&3));
    }
}
