use thiserror::Error;

#[allow(unused_imports)]
use crate::schedule::Schedule;

#[allow(unused_imports)]
use crate::pool::ThreadPool;

/// [`TaskLoomErrors`] is the main enum that contains all the errors which can be thrown by
/// TaskLoom, it uses under the hood [`thiserror`] to make it as smooth sailing to add more
/// errors in the future as possible. Every public operation of the library reports failure
/// through this enum; failures that originate inside a task function body are invisible to
/// the scheduler and never surface here
#[derive(Error, Debug)]
pub enum TaskLoomErrors {
    /// This error is meant to happen when a schedule document references a task name
    /// that was never registered. The graph builder resolves every task against the
    /// registry at build time, an unresolved name is fatal and no schedule is produced
    #[error("`{0}` is not a registered task")]
    UnresolvedTask(String),

    /// This error is meant to happen when a schedule, thread or task name falls outside
    /// the accepted 1 to 63 character range. The first field is what kind of name was
    /// rejected and the second is the offending name itself
    #[error("{0} name `{1}` must be 1 to 63 characters long")]
    InvalidNameLength(String, String),

    /// This error is meant to happen when the ``threads`` object of a schedule
    /// document is empty, a schedule must declare at least one thread
    #[error("Schedule declares no threads")]
    NoThreads,

    /// This error is meant to happen when a thread declares an empty task list,
    /// every declared thread must carry at least one task
    #[error("Thread `{0}` declares no tasks")]
    EmptyThread(String),

    /// This error is meant to happen when a schedule document declares more
    /// threads than the runtime supports
    #[error("Schedule declares {0} thread(s), the maximum is {1}")]
    TooManyThreads(usize, usize),

    /// This error is meant to happen when one thread declares more tasks
    /// than the runtime supports
    #[error("Thread `{0}` declares {1} task(s), the maximum is {2}")]
    TooManyTasks(String, usize, usize),

    /// This error is meant to happen when a ``wait`` reference does not contain
    /// exactly one ``:`` delimiter separating the thread name from the task name
    #[error("Wait reference `{0}` must contain exactly one `:` delimiter")]
    MalformedWait(String),

    /// This error is meant to happen during cross-resolution when a task waits on
    /// a thread that the schedule never declares. The fields are the dependent task,
    /// its enclosing thread and the unknown thread name
    #[error("Task `{0}` in thread `{1}` waits on unknown thread `{2}`")]
    UnknownWaitThread(String, String, String),

    /// This error is meant to happen during cross-resolution when the wait thread
    /// exists but declares no task with the referenced name
    #[error("Task `{0}` in thread `{1}` waits on `{2}:{3}`, but thread `{2}` declares no such task")]
    UnknownWaitTask(String, String, String, String),

    /// This error is meant to happen when one thread declares the same task name twice,
    /// a downstream ``wait`` could not be resolved unambiguously in that case
    #[error("Thread `{0}` declares task `{1}` more than once, wait resolution would be ambiguous")]
    DuplicateTask(String, String),

    /// This error is meant to happen when the combined graph of declaration order and
    /// wait edges contains a cycle (self-dependence included). Such a schedule would
    /// deadlock at run time, as such it is rejected at build time. The fields name one
    /// task on the cycle as ``thread`` and ``task``
    #[error("Dependency cycle through `{0}:{1}`, the wait graph must be acyclic")]
    DependencyCycle(String, String),

    /// This error is meant to happen when ``main_thread`` names a thread that does
    /// not appear in the ``threads`` object
    #[error("`main_thread` names `{0}`, which is not a declared thread")]
    UnknownMainThread(String),

    /// This error is meant to happen when [`Schedule::start`] is invoked while a
    /// previous run of the same schedule has not been stopped yet
    #[error("Schedule `{0}` has already been started")]
    AlreadyStarted(String),

    /// This error is meant to happen when the operating system refuses to spawn a
    /// worker thread. The caller can expect that every worker spawned before the
    /// failure has been cancelled and joined again
    #[error("Failed to spawn worker `{0}`")]
    WorkerSpawn(String, #[source] std::io::Error),

    /// This error is meant to happen when joining a worker thread fails, which in
    /// practice means the worker terminated by panicking outside of a task body
    #[error("Worker `{0}` terminated abnormally")]
    WorkerJoin(String),

    /// This error is meant to happen when [`ThreadPool::construct`] is handed a
    /// thread quantity outside the accepted range
    #[error("A thread pool needs 1 to {1} thread(s), got {0}")]
    PoolSize(usize, usize),

    /// This error is meant to happen when work is dispatched to a pool that has
    /// begun shutting down
    #[error("The thread pool is shutting down and accepts no new work")]
    PoolShutDown,

    /// This error is meant to happen when a schedule document is not a JSON object
    /// at the top level, a standalone value cannot describe a schedule
    #[error("The schedule document must be a JSON object")]
    NotAnObject,

    /// This error wraps the underlying I/O failure when a schedule file cannot be read
    #[error("Failed to read schedule file")]
    Io(#[from] std::io::Error),

    /// This error wraps the underlying parse failure when schedule text is not valid
    /// JSON or does not match the document schema
    #[error("Failed to parse schedule document")]
    Json(#[from] serde_json::Error),
}
