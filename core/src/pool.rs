use crate::errors::TaskLoomErrors;
use crate::registry::{TaskFunction, TaskParameter, TaskReturn};
use crate::utils::lock;
use crate::worker::{CancelToken, WorkerThread};
use crossbeam::utils::Backoff;
use std::fmt::{Debug, Formatter};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use tracing::{debug, error, trace, warn};

/// The most worker threads one pool may own
pub const MAX_POOL_THREADS: usize = 64;

/// One dispatched work item: the function plus its opaque parameter
type PoolJob = (TaskFunction, Option<TaskParameter>);

/// The mutable half of a slot record, guarded by the slot mutex: the pending job
/// (written by the dispatcher, taken by the worker) and the return value of the
/// most recently finished job
struct SlotState {
    job: Option<PoolJob>,
    last_return: Option<TaskReturn>,
}

/// One worker's record inside the pool: its busy flag, its monitor and its job
/// state. The ``running`` flag is set by the dispatcher when a job is assigned and
/// cleared by the worker once the return value is stored, so the sum of set flags
/// across slots is exactly the number of jobs currently in flight
struct PoolSlot {
    running: AtomicBool,
    state: Mutex<SlotState>,
    signal: Condvar,
}

impl PoolSlot {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            state: Mutex::new(SlotState { job: None, last_return: None }),
            signal: Condvar::new(),
        }
    }
}

/// The pool-level start monitor: workers arrive and block on it, the constructor
/// waits until every worker has arrived and then broadcasts the release. This is
/// the only purpose the pool-level monitor serves; wait-idle is a polling
/// discipline over the slot flags
struct StartGate {
    state: Mutex<StartState>,
    signal: Condvar,
}

struct StartState {
    arrived: usize,
    released: bool,
}

impl StartGate {
    fn new() -> Self {
        Self {
            state: Mutex::new(StartState { arrived: 0, released: false }),
            signal: Condvar::new(),
        }
    }

    /// Worker side: register arrival, then block until the gate opens
    fn arrive_and_wait(&self) {
        let mut state = lock(&self.state);
        state.arrived += 1;
        self.signal.notify_all();
        while !state.released {
            state = self
                .signal
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Constructor side: block until ``expected`` workers arrived, then broadcast
    /// the release
    fn open(&self, expected: usize) {
        let mut state = lock(&self.state);
        while state.arrived < expected {
            state = self
                .signal
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.released = true;
        self.signal.notify_all();
    }

    /// Opens the gate unconditionally, used when construction is rolled back and
    /// the already-spawned workers must be let through to observe the shutdown
    fn force_open(&self) {
        let mut state = lock(&self.state);
        state.released = true;
        self.signal.notify_all();
    }
}

struct PoolInner {
    slots: Vec<PoolSlot>,
    start: StartGate,
    dispatch: Mutex<()>,
    shutdown: AtomicBool,
}

/// [`ThreadPool`] is a fixed-size set of worker threads dispatching arbitrary
/// ``(function, parameter)`` work items. Dispatch scans the flat slot array for an
/// idle worker under the pool mutex, first-idle-wins; fairness across slots is not
/// guaranteed. There is no job queue: when every slot is busy the dispatcher backs
/// off and retries until one frees up
///
/// # Constructor(s)
/// Pools are created via [`ThreadPool::construct`] with the desired thread
/// quantity (1 to 64). Construction spawns every worker, waits until all of them
/// have arrived at the start monitor, then broadcasts it to release them at once
///
/// # Lifecycle
/// [`ThreadPool::wait_idle`] blocks until no slot is busy. Dropping the pool sets
/// the shutdown flag, wakes every slot and joins every worker; a job already
/// assigned to a slot is finished first, but new dispatch attempts are refused
///
/// # Example
/// ```ignore
/// use std::sync::Arc;
/// use taskloom::pool::ThreadPool;
///
/// let pool = ThreadPool::construct(4)?;
///
/// for index in 0..16 {
///     pool.execute(move |_| { println!("job {index}"); None }, None)?;
/// }
///
/// pool.wait_idle();
/// ```
///
/// # See Also
/// - [`ThreadPool::construct`]
/// - [`ThreadPool::execute`]
/// - [`ThreadPool::wait_idle`]
pub struct ThreadPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<WorkerThread>>,
}

impl Debug for ThreadPool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("thread_quantity", &self.inner.slots.len())
            .field("running", &self.running_count())
            .field("shutdown", &self.inner.shutdown.load(Ordering::SeqCst))
            .finish()
    }
}

/// The loop every pool worker runs against its own slot: block on the slot
/// monitor until a job (or shutdown) arrives, execute the job outside every lock,
/// store its return value, clear the busy flag, repeat
fn pool_work(inner: &Arc<PoolInner>, slot_index: usize) {
    inner.start.arrive_and_wait();
    let slot = &inner.slots[slot_index];

    loop {
        let job = {
            let mut state = lock(&slot.state);
            loop {
                if let Some(job) = state.job.take() {
                    break job;
                }
                if inner.shutdown.load(Ordering::SeqCst) {
                    debug!(slot = slot_index, "pool worker exiting");
                    return;
                }
                state = slot
                    .signal
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        trace!(slot = slot_index, "executing pool job");
        let (function, parameter) = job;
        let outcome = catch_unwind(AssertUnwindSafe(|| function(parameter.as_ref())));
        if outcome.is_err() {
            error!(slot = slot_index, "pool job panicked");
        }

        {
            let mut state = lock(&slot.state);
            state.last_return = outcome.ok().flatten();
        }
        slot.running.store(false, Ordering::SeqCst);
    }
}

impl ThreadPool {
    /// Creates / Constructs a new [`ThreadPool`] instance with ``thread_quantity``
    /// workers. The constructor returns only after every worker has arrived at the
    /// pool-level start monitor and been released by its broadcast, so a returned
    /// pool is immediately able to accept work on every slot
    ///
    /// # Argument(s)
    /// This method accepts one single argument, that being ``thread_quantity``,
    /// the fixed number of workers, 1 to [`MAX_POOL_THREADS`]
    ///
    /// # Returns
    /// The constructed pool, [`TaskLoomErrors::PoolSize`] on an out-of-range
    /// quantity, or [`TaskLoomErrors::WorkerSpawn`] when the OS refuses a worker,
    /// in which case every already-spawned worker has been released and joined
    /// again before the error returns
    ///
    /// # See Also
    /// - [`ThreadPool`]
    /// - [`MAX_POOL_THREADS`]
    pub fn construct(thread_quantity: usize) -> Result<Self, TaskLoomErrors> {
        if thread_quantity == 0 || thread_quantity > MAX_POOL_THREADS {
            return Err(TaskLoomErrors::PoolSize(thread_quantity, MAX_POOL_THREADS));
        }

        let inner = Arc::new(PoolInner {
            slots: (0..thread_quantity).map(|_| PoolSlot::new()).collect(),
            start: StartGate::new(),
            dispatch: Mutex::new(()),
            shutdown: AtomicBool::new(false),
        });

        let mut workers: Vec<WorkerThread> = Vec::with_capacity(thread_quantity);
        for slot_index in 0..thread_quantity {
            let worker = WorkerThread::start(
                format!("taskloom-pool-{slot_index}"),
                CancelToken::new(),
                {
                    let inner = inner.clone();
                    move || pool_work(&inner, slot_index)
                },
            );

            match worker {
                Ok(worker) => workers.push(worker),
                Err(error) => {
                    // Rollback: let the spawned workers through the gate so they
                    // observe the shutdown, then join them.
                    inner.shutdown.store(true, Ordering::SeqCst);
                    inner.start.force_open();
                    for worker in workers {
                        let name = worker.name().to_owned();
                        if worker.join().is_err() {
                            warn!(worker = %name, "pool worker terminated abnormally during rollback");
                        }
                    }
                    return Err(error);
                }
            }
        }

        inner.start.open(thread_quantity);
        debug!(thread_quantity, "thread pool constructed");

        Ok(Self { inner, workers: Mutex::new(workers) })
    }

    /// The fixed number of workers this pool owns
    pub fn thread_quantity(&self) -> usize {
        self.inner.slots.len()
    }

    /// Dispatches one work item. Under the pool mutex the slot array is scanned
    /// for a worker whose busy flag is clear; the job is written into the first
    /// one found and that slot's monitor is notified. When every slot is busy the
    /// mutex is released and the dispatcher backs off (yielding the CPU) before
    /// scanning again, so this method returns only once the job is assigned
    ///
    /// # Argument(s)
    /// This method accepts two arguments, those being the ``function`` to execute
    /// and the opaque ``parameter`` handed to it
    ///
    /// # Returns
    /// ``Ok`` once a slot accepted the job, or [`TaskLoomErrors::PoolShutDown`]
    /// when the pool is winding down
    ///
    /// # See Also
    /// - [`ThreadPool::wait_idle`]
    /// - [`TaskFunction`]
    pub fn execute(
        &self,
        function: impl Fn(Option<&TaskParameter>) -> Option<TaskReturn> + Send + Sync + 'static,
        parameter: Option<TaskParameter>,
    ) -> Result<(), TaskLoomErrors> {
        self.execute_function(Arc::new(function), parameter)
    }

    /// Identical to [`ThreadPool::execute`] but accepts an already shared
    /// [`TaskFunction`], useful when the same function is dispatched repeatedly
    ///
    /// # See Also
    /// - [`ThreadPool::execute`]
    pub fn execute_function(
        &self,
        function: TaskFunction,
        parameter: Option<TaskParameter>,
    ) -> Result<(), TaskLoomErrors> {
        let backoff = Backoff::new();
        loop {
            if self.inner.shutdown.load(Ordering::SeqCst) {
                return Err(TaskLoomErrors::PoolShutDown);
            }

            {
                let _dispatch = lock(&self.inner.dispatch);
                let idle = self
                    .inner
                    .slots
                    .iter()
                    .enumerate()
                    .find(|(_, slot)| !slot.running.load(Ordering::SeqCst));

                if let Some((slot_index, slot)) = idle {
                    let mut state = lock(&slot.state);
                    state.job = Some((function, parameter));
                    slot.running.store(true, Ordering::SeqCst);
                    slot.signal.notify_one();
                    trace!(slot = slot_index, "job assigned");
                    return Ok(());
                }
            }

            backoff.snooze();
        }
    }

    /// The number of slots whose busy flag is currently set, which is exactly the
    /// number of jobs in flight
    pub fn running_count(&self) -> usize {
        self.inner
            .slots
            .iter()
            .filter(|slot| slot.running.load(Ordering::SeqCst))
            .count()
    }

    /// Blocks the caller until no slot is busy, polling the busy flags and
    /// yielding the CPU between checks. Jobs dispatched *while* this method is
    /// waiting extend the wait
    ///
    /// # See Also
    /// - [`ThreadPool::execute`]
    /// - [`ThreadPool::running_count`]
    pub fn wait_idle(&self) {
        let backoff = Backoff::new();
        while self.running_count() > 0 {
            backoff.snooze();
        }
    }

    /// Takes the return value of the most recently finished job on ``slot_index``,
    /// leaving the slot record empty. Returns ``None`` for an out-of-range index,
    /// a slot that has not finished a job yet, or a job that produced no value
    ///
    /// # See Also
    /// - [`TaskReturn`]
    pub fn take_last_return(&self, slot_index: usize) -> Option<TaskReturn> {
        let slot = self.inner.slots.get(slot_index)?;
        lock(&slot.state).last_return.take()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        for slot in &self.inner.slots {
            let _state = lock(&slot.state);
            slot.signal.notify_all();
        }

        let drained: Vec<WorkerThread> = lock(&self.workers).drain(..).collect();
        for worker in drained {
            let name = worker.name().to_owned();
            if worker.join().is_err() {
                warn!(worker = %name, "pool worker terminated abnormally during drop");
            }
        }
    }
}
