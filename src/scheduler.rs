//! # Task Scheduler
//!
//! Runs named periodic jobs until cancelled.
//!
//! Each job is invoked immediately, then again `interval` after its previous
//! invocation finished. A failing invocation is logged with the job name and
//! the job keeps running on its interval; only cancellation stops a job.
//!
//! The binary drives the scheduler from a `current_thread` runtime, so job
//! bodies never run in parallel: they interleave at `.await` points only.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A registered periodic job
#[derive(Debug)]
struct ScheduledTask {
    name: String,
    interval: Duration,
    handle: JoinHandle<()>,
}

/// Cooperative scheduler of named periodic jobs
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use greybike::scheduler::Scheduler;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let mut scheduler = Scheduler::new();
///     scheduler.schedule("heartbeat", Duration::from_secs(1), || async {
///         println!("tick");
///         Ok(())
///     });
///     tokio::time::sleep(Duration::from_secs(3)).await;
///     scheduler.cancel_all().await;
/// }
/// ```
#[derive(Debug)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
    cancel: CancellationToken,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Register a job and start running it
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&mut self, name: &str, interval: Duration, job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let token = self.cancel.child_token();
        let task_name = name.to_string();
        let handle = tokio::spawn(run_periodically(task_name, interval, token, job));

        info!("Scheduled task '{}' every {:?}", name, interval);
        self.tasks.push(ScheduledTask {
            name: name.to_string(),
            interval,
            handle,
        });
    }

    /// Signal every job to stop and wait until each one has exited
    ///
    /// The scheduler stays usable: jobs scheduled afterwards run normally.
    pub async fn cancel_all(&mut self) {
        std::mem::replace(&mut self.cancel, CancellationToken::new()).cancel();

        for task in self.tasks.drain(..) {
            match task.handle.await {
                Ok(()) => debug!("Task '{}' stopped", task.name),
                Err(e) if e.is_cancelled() => info!("Task '{}' cancelled", task.name),
                Err(e) => error!("Task '{}' ended abnormally: {}", task.name, e),
            }
        }
    }

    /// Number of registered jobs
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Names and intervals of registered jobs, in registration order
    pub fn jobs(&self) -> impl Iterator<Item = (&str, Duration)> {
        self.tasks.iter().map(|t| (t.name.as_str(), t.interval))
    }
}

/// Job loop: run, log failures, sleep, repeat until cancelled
async fn run_periodically<F, Fut>(
    name: String,
    interval: Duration,
    token: CancellationToken,
    mut job: F,
) where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,

            result = job() => {
                if let Err(e) = result {
                    error!("Task '{}' failed: {:#}", name, e);
                }
            }
        }

        tokio::select! {
            biased;

            _ = token.cancelled() => break,

            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("Task '{}' cancelled", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_runs_immediately_then_on_interval() {
        let mut scheduler = Scheduler::new();
        let calls = counter();
        let job_calls = calls.clone();

        scheduler.schedule("count", Duration::from_secs(1), move || {
            let calls = job_calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "Job should run immediately");

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        scheduler.cancel_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_job_is_rescheduled_and_isolated() {
        let mut scheduler = Scheduler::new();
        let failures = counter();
        let successes = counter();

        let failing = failures.clone();
        scheduler.schedule("always_fails", Duration::from_millis(100), move || {
            let failing = failing.clone();
            async move {
                failing.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("sensor unplugged")
            }
        });

        let healthy = successes.clone();
        scheduler.schedule("healthy", Duration::from_millis(250), move || {
            let healthy = healthy.clone();
            async move {
                healthy.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        tokio::time::sleep(Duration::from_millis(1050)).await;

        // 0, 100, ..., 1000 ms
        assert_eq!(failures.load(Ordering::SeqCst), 11);
        // 0, 250, 500, 750, 1000 ms
        assert_eq!(successes.load(Ordering::SeqCst), 5);

        scheduler.cancel_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_measured_from_completion() {
        let mut scheduler = Scheduler::new();
        let calls = counter();
        let job_calls = calls.clone();

        scheduler.schedule("slow", Duration::from_secs(1), move || {
            let calls = job_calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            }
        });

        // Starts at 0s and 2s, third run would start at 4s
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        scheduler.cancel_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_stops_jobs() {
        let mut scheduler = Scheduler::new();
        let calls = counter();

        for name in ["a", "b"] {
            let job_calls = calls.clone();
            scheduler.schedule(name, Duration::from_millis(10), move || {
                let calls = job_calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
        }
        assert_eq!(scheduler.len(), 2);

        tokio::time::sleep(Duration::from_millis(55)).await;
        scheduler.cancel_all().await;
        assert!(scheduler.is_empty());

        let after_cancel = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_cancel, "No runs after cancellation");
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_after_cancel_all_runs() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule("a", Duration::from_millis(10), || async { Ok(()) });
        scheduler.cancel_all().await;

        let calls = counter();
        let job_calls = calls.clone();
        scheduler.schedule("b", Duration::from_millis(10), move || {
            let calls = job_calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        assert_eq!(scheduler.len(), 1);

        // 0, 10, ..., 50 ms
        tokio::time::sleep(Duration::from_millis(55)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 6);

        scheduler.cancel_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_suspended_job() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule("hung_read", Duration::from_secs(1), || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });

        tokio::task::yield_now().await;
        tokio::time::timeout(Duration::from_secs(1), scheduler.cancel_all())
            .await
            .expect("cancel_all should not wait for the hung job body");
    }

    #[tokio::test]
    async fn test_jobs_listing() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule("write_log", Duration::from_millis(100), || async { Ok(()) });

        let jobs: Vec<_> = scheduler.jobs().collect();
        assert_eq!(jobs, vec![("write_log", Duration::from_millis(100))]);

        scheduler.cancel_all().await;
    }
}
