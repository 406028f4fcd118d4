use crate::registry::TaskParameter;
use crate::schedule::ScheduleInner;
use crate::worker::CancelToken;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, error, trace};

/// The loop every schedule worker runs, on a spawned thread or (for the declared
/// main thread) on the caller's context. For each task in array order: honor the
/// upstream wait through the epoch monitor, execute the function, and publish
/// completion when other tasks depend on this one. The list is walked again only
/// while the schedule's repeat flag and this thread's running flag both hold.
///
/// The only suspension points are the upstream monitor wait and the task body
/// itself; no lock is held across either.
pub(crate) fn run_thread(
    inner: &Arc<ScheduleInner>,
    thread_index: usize,
    token: &CancelToken,
    parameter: Option<TaskParameter>,
) {
    let thread = &inner.threads[thread_index];
    let mut seen = vec![0u64; thread.tasks.len()];

    debug!(schedule = %inner.name, thread = %thread.name, "worker entering its task list");

    'run: loop {
        for (task_index, task) in thread.tasks.iter().enumerate() {
            if token.is_cancelled() || !thread.running.load(Ordering::SeqCst) {
                break 'run;
            }

            if let Some(wait) = &task.wait {
                let (wait_thread, wait_task) = wait.target;
                let upstream = &inner.threads[wait_thread].tasks[wait_task];
                trace!(
                    thread = %thread.name,
                    task = %task.name,
                    upstream = %format!("{}:{}", wait.thread, wait.task),
                    "waiting on upstream completion"
                );
                match upstream.monitor.wait_past(seen[task_index], token) {
                    Some(epoch) => seen[task_index] = epoch,
                    None => break 'run,
                }
            }

            trace!(thread = %thread.name, task = %task.name, "executing task");
            let outcome =
                catch_unwind(AssertUnwindSafe(|| (task.function)(parameter.as_ref())));
            if outcome.is_err() {
                error!(
                    schedule = %inner.name,
                    thread = %thread.name,
                    task = %task.name,
                    "task panicked; treating it as completed so dependents are not starved"
                );
            }

            if task.dependency {
                task.monitor.publish();
            }
        }

        if !inner.repeat.load(Ordering::SeqCst) {
            break;
        }
    }

    thread.running.store(false, Ordering::SeqCst);
    inner.idle.depart();

    debug!(schedule = %inner.name, thread = %thread.name, "worker exiting");
}
