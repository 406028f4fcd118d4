#[allow(missing_docs)]
pub mod document;

#[allow(missing_docs)]
pub mod loader;

#[allow(missing_docs)]
pub(crate) mod runtime;

pub use document::*;
pub use loader::*;

use crate::errors::TaskLoomErrors;
use crate::monitor::{IdleGate, Monitor};
use crate::registry::{TaskFunction, TaskParameter};
use crate::utils::lock;
use crate::worker::{CancelToken, WorkerThread};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// A resolved ``wait`` edge: the upstream names as declared, plus the
/// ``(thread index, task index)`` the loader resolved them to. Edges are indices
/// into the schedule-owned arena, the graph never holds pointers into itself
pub(crate) struct WaitPoint {
    pub(crate) thread: String,
    pub(crate) task: String,
    pub(crate) target: (usize, usize),
}

/// [`ScheduleTask`] is one entry of a thread's task list after the loader resolved
/// it: the registered function, the optional upstream wait edge, and the completion
/// [`Monitor`] this task publishes on when others depend on it
///
/// # See Also
/// - [`ScheduleThread`]
/// - [`Monitor`]
pub struct ScheduleTask {
    pub(crate) name: String,
    pub(crate) function: TaskFunction,
    pub(crate) wait: Option<WaitPoint>,
    pub(crate) dependency: bool,
    pub(crate) dependents: usize,
    pub(crate) monitor: Monitor,
}

impl ScheduleTask {
    /// The task name as declared in the document
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checks if this task declares an upstream ``wait`` it must not begin before
    pub fn is_dependent(&self) -> bool {
        self.wait.is_some()
    }

    /// Checks if some other task's ``wait`` targets this task
    pub fn is_dependency(&self) -> bool {
        self.dependency
    }

    /// The number of distinct dependents targeting this task, kept for diagnostics
    pub fn dependents(&self) -> usize {
        self.dependents
    }

    /// The upstream ``(thread, task)`` pair this task waits on, when declared
    pub fn wait(&self) -> Option<(&str, &str)> {
        self.wait
            .as_ref()
            .map(|wait| (wait.thread.as_str(), wait.task.as_str()))
    }
}

impl Debug for ScheduleTask {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleTask")
            .field("name", &self.name)
            .field("wait", &self.wait().map(|(thread, task)| format!("{thread}:{task}")))
            .field("dependency", &self.dependency)
            .field("dependents", &self.dependents)
            .finish()
    }
}

/// [`ScheduleThread`] is one declared thread of execution: a name, an ordered list
/// of [`ScheduleTask`]s and the running flag its worker maintains. Task order is
/// strictly the array order of the source document; wait edges never reorder a
/// thread, they only block it at the declared points
///
/// # See Also
/// - [`Schedule`]
/// - [`ScheduleTask`]
pub struct ScheduleThread {
    pub(crate) name: String,
    pub(crate) tasks: Vec<ScheduleTask>,
    pub(crate) running: AtomicBool,
}

impl ScheduleThread {
    /// The thread name as declared in the document
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The resolved tasks of this thread, in execution order
    pub fn tasks(&self) -> &[ScheduleTask] {
        &self.tasks
    }

    /// Checks if this thread's worker is currently between start and exit
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Debug for ScheduleThread {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleThread")
            .field("name", &self.name)
            .field("tasks", &self.tasks)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Per-run bookkeeping guarded by the lifecycle mutex: whether a run is in flight
/// and the cancel tokens of that run, one per thread
pub(crate) struct Lifecycle {
    pub(crate) started: bool,
    pub(crate) tokens: Vec<CancelToken>,
}

/// The shared core every worker holds an ``Arc`` of. The arena of threads and
/// tasks is immutable once built; only the atomics and the lifecycle record move
pub(crate) struct ScheduleInner {
    pub(crate) name: String,
    pub(crate) main_thread: Option<String>,
    pub(crate) repeat: AtomicBool,
    pub(crate) threads: Vec<ScheduleThread>,
    pub(crate) index: HashMap<String, usize>,
    pub(crate) idle: IdleGate,
    pub(crate) lifecycle: Mutex<Lifecycle>,
}

/// [`Schedule`] is the root graph object: a collection of declared threads plus
/// global metadata, built from a JSON document by the [`ScheduleLoader`]. Starting
/// it spawns one OS worker per thread; workers execute their task lists in array
/// order, blocking on upstream [`Monitor`]s wherever the document declared a
/// ``wait``, so that a dependent task always observes the side effects of its
/// upstream task
///
/// # Constructor(s)
/// For the common case of resolving against the process-wide registry, use
/// [`Schedule::load`], [`Schedule::from_json_str`] or [`Schedule::from_value`].
/// For a scoped registry, build a [`ScheduleLoader`] via [`ScheduleLoader::builder`]
///
/// # Main Thread Behavior
/// When the document declares ``main_thread``, that thread's task list runs on the
/// **caller's context** inside [`Schedule::start`], which then returns when the
/// list is exhausted (or the run is stopped from another thread). Without
/// ``main_thread``, every thread is spawned and ``start`` returns immediately
///
/// # Lifecycle
/// ``Created → Running (on start) → Exiting (on stop, or list exhausted without
/// repeat) → Joined``. [`Schedule::stop`] is idempotent and safe to call
/// concurrently with running workers; dropping the schedule stops it first.
/// A stopped schedule may be started again
///
/// # Example
/// ```ignore
/// use taskloom::registry::register_task;
/// use taskloom::schedule::Schedule;
///
/// register_task("tell", |_| { println!("a joke"); None });
/// register_task("laugh", |_| { println!("ha!"); None });
///
/// let schedule = Schedule::from_json_str(r#"{
///     "name": "open mic",
///     "threads": {
///         "stage": [ { "task": "tell" } ],
///         "crowd": [ { "task": "laugh", "wait": "stage:tell" } ]
///     }
/// }"#)?;
///
/// schedule.start(None)?;
/// schedule.wait_idle();
/// schedule.stop();
/// ```
///
/// # See Also
/// - [`ScheduleLoader`]
/// - [`ScheduleDocument`]
/// - [`ScheduleThread`]
pub struct Schedule {
    pub(crate) inner: Arc<ScheduleInner>,
    pub(crate) workers: Mutex<Vec<WorkerThread>>,
}

impl Debug for Schedule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schedule")
            .field("name", &self.inner.name)
            .field("main_thread", &self.inner.main_thread)
            .field("repeat", &self.is_repeating())
            .field("threads", &self.inner.threads)
            .finish()
    }
}

impl Schedule {
    /// Loads, validates and resolves the schedule file at ``path`` against the
    /// process-wide registry
    ///
    /// # Returns
    /// The runnable [`Schedule`], or the first build error encountered; no
    /// schedule is produced on failure
    ///
    /// # See Also
    /// - [`ScheduleLoader::load`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TaskLoomErrors> {
        ScheduleLoader::builder().build().load(path)
    }

    /// Parses, validates and resolves ``text`` against the process-wide registry
    ///
    /// # See Also
    /// - [`ScheduleLoader::load_json_str`]
    pub fn from_json_str(text: &str) -> Result<Self, TaskLoomErrors> {
        ScheduleLoader::builder().build().load_json_str(text)
    }

    /// Interprets an already parsed JSON ``value`` against the process-wide registry
    ///
    /// # See Also
    /// - [`ScheduleLoader::load_value`]
    pub fn from_value(value: serde_json::Value) -> Result<Self, TaskLoomErrors> {
        ScheduleLoader::builder().build().load_value(value)
    }

    /// The schedule name as declared in the document
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The declared main thread name, when one was declared
    pub fn main_thread(&self) -> Option<&str> {
        self.inner.main_thread.as_deref()
    }

    /// Checks if the workers loop their task lists indefinitely. Cleared by
    /// [`Schedule::pause`]
    pub fn is_repeating(&self) -> bool {
        self.inner.repeat.load(Ordering::SeqCst)
    }

    /// The declared threads, in name order
    pub fn threads(&self) -> impl Iterator<Item = &ScheduleThread> {
        self.inner.threads.iter()
    }

    /// Looks up one declared thread by name
    pub fn thread(&self, name: &str) -> Option<&ScheduleThread> {
        self.inner
            .index
            .get(name)
            .map(|&thread_index| &self.inner.threads[thread_index])
    }

    /// Counts every task across every thread
    pub fn task_count(&self) -> usize {
        self.inner
            .threads
            .iter()
            .map(|thread| thread.tasks.len())
            .sum()
    }

    /// Starts the schedule: marks every thread running, resets every completion
    /// monitor, then spawns one worker per declared thread, handing each a clone
    /// of ``parameter``. When the document declares ``main_thread``, that thread's
    /// loop runs on the caller's context and this method returns once it exits;
    /// otherwise the method returns as soon as every worker is spawned
    ///
    /// # Argument(s)
    /// This method accepts one single argument, that being the opaque ``parameter``
    /// passed to every task function of the run
    ///
    /// # Returns
    /// ``Ok`` once the run is underway (or, with a main thread, finished on this
    /// context). [`TaskLoomErrors::AlreadyStarted`] when a previous run has not
    /// been stopped, or [`TaskLoomErrors::WorkerSpawn`] when the OS refuses a
    /// worker, in which case every already-spawned worker has been cancelled and
    /// joined again before the error returns
    ///
    /// # See Also
    /// - [`Schedule::wait_idle`]
    /// - [`Schedule::stop`]
    pub fn start(&self, parameter: Option<TaskParameter>) -> Result<(), TaskLoomErrors> {
        let inner = &self.inner;

        let tokens: Vec<CancelToken> = {
            let mut lifecycle = lock(&inner.lifecycle);
            if lifecycle.started {
                return Err(TaskLoomErrors::AlreadyStarted(inner.name.clone()));
            }
            lifecycle.started = true;
            lifecycle.tokens = inner.threads.iter().map(|_| CancelToken::new()).collect();
            lifecycle.tokens.clone()
        };

        for thread in &inner.threads {
            thread.running.store(true, Ordering::SeqCst);
            for task in &thread.tasks {
                task.monitor.reset();
            }
        }

        let main_index = inner
            .main_thread
            .as_ref()
            .and_then(|name| inner.index.get(name).copied());

        info!(schedule = %inner.name, threads = inner.threads.len(), "starting schedule");

        for (thread_index, thread) in inner.threads.iter().enumerate() {
            if Some(thread_index) == main_index {
                continue;
            }

            inner.idle.arrive();
            let token = tokens[thread_index].clone();
            let worker = WorkerThread::start(
                format!("{}:{}", inner.name, thread.name),
                token.clone(),
                {
                    let inner = inner.clone();
                    let parameter = parameter.clone();
                    move || runtime::run_thread(&inner, thread_index, &token, parameter)
                },
            );

            match worker {
                Ok(worker) => lock(&self.workers).push(worker),
                Err(error) => {
                    inner.idle.depart();
                    self.stop();
                    return Err(error);
                }
            }
        }

        if let Some(main_index) = main_index {
            inner.idle.arrive();
            let token = tokens[main_index].clone();
            runtime::run_thread(inner, main_index, &token, parameter);
        }

        Ok(())
    }

    /// Blocks the caller until every worker of the current run has exited its
    /// loop. Returns immediately when nothing is running. After this method
    /// returns, no thread's running flag is set
    ///
    /// # See Also
    /// - [`Schedule::start`]
    /// - [`Schedule::stop`]
    pub fn wait_idle(&self) {
        self.inner.idle.wait_idle();
    }

    /// Clears the ``repeat`` flag and nothing else: workers finish their current
    /// iteration naturally and then exit, running tasks are never disturbed. On a
    /// non-repeating schedule this is a no-op
    ///
    /// # See Also
    /// - [`Schedule::wait_idle`]
    /// - [`Schedule::stop`]
    pub fn pause(&self) {
        debug!(schedule = %self.inner.name, "clearing repeat flag");
        self.inner.repeat.store(false, Ordering::SeqCst);
    }

    /// Stops the run: cancels every worker's token, clears every running flag,
    /// interrupts every completion monitor so blocked waiters wake, then joins the
    /// workers. Cancellation is cooperative, a task already inside its function
    /// body runs to completion first. Calling this twice is equivalent to calling
    /// it once, and it is safe to invoke concurrently with running workers. Join
    /// failures are logged rather than surfaced, a leaked worker is preferable to
    /// a dangling one
    ///
    /// # See Also
    /// - [`Schedule::start`]
    /// - [`Schedule::pause`]
    pub fn stop(&self) {
        let inner = &self.inner;

        let drained: Vec<WorkerThread> = lock(&self.workers).drain(..).collect();
        for worker in &drained {
            worker.cancel();
        }
        // The main thread's loop has no worker handle; its token lives in the
        // lifecycle record alongside the others.
        let tokens: Vec<CancelToken> = lock(&inner.lifecycle).tokens.clone();
        for token in &tokens {
            token.cancel();
        }

        for thread in &inner.threads {
            thread.running.store(false, Ordering::SeqCst);
            for task in &thread.tasks {
                task.monitor.interrupt();
            }
        }

        for worker in drained {
            let name = worker.name().to_owned();
            if worker.join().is_err() {
                warn!(worker = %name, "worker terminated abnormally during stop");
            }
        }

        let mut lifecycle = lock(&inner.lifecycle);
        lifecycle.started = false;
        lifecycle.tokens.clear();
    }

    /// Re-exports the built graph as a [`ScheduleDocument`]. The result is not
    /// required to be byte-identical to the source document, but every dependency
    /// edge survives the round trip
    ///
    /// # See Also
    /// - [`ScheduleDocument`]
    pub fn to_document(&self) -> ScheduleDocument {
        let threads: BTreeMap<String, Vec<TaskRecord>> = self
            .inner
            .threads
            .iter()
            .map(|thread| {
                let records = thread
                    .tasks
                    .iter()
                    .map(|task| TaskRecord {
                        task: task.name.clone(),
                        wait: task
                            .wait
                            .as_ref()
                            .map(|wait| format!("{}:{}", wait.thread, wait.task)),
                    })
                    .collect();
                (thread.name.clone(), records)
            })
            .collect();

        ScheduleDocument {
            name: self.inner.name.clone(),
            main_thread: self.inner.main_thread.clone(),
            repeat: self.is_repeating(),
            threads,
        }
    }
}

impl Drop for Schedule {
    fn drop(&mut self) {
        self.stop();
    }
}
