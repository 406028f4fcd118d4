use crate::errors::TaskLoomErrors;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tracing::{debug, warn};

#[allow(unused_imports)]
use crate::schedule::Schedule;

/// [`CancelToken`] is an advisory cancellation flag shared between a worker and
/// whoever supervises it. Cancellation in TaskLoom is strictly cooperative: setting
/// the token never interrupts a running task body, the worker observes the token at
/// its next loop boundary or monitor wait and winds down on its own
///
/// # Constructor(s)
/// Tokens are created via [`CancelToken::new`] and shared by cloning, every clone
/// observes the same flag
///
/// # See Also
/// - [`WorkerThread`]
/// - [`WorkerThread::cancel`]
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates / Constructs a new [`CancelToken`] in the not-cancelled state
    ///
    /// # See Also
    /// - [`CancelToken`]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Requests cancellation. The request is sticky, there is no way to
    /// un-cancel a token
    ///
    /// # See Also
    /// - [`CancelToken::is_cancelled`]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Checks if cancellation has been requested
    ///
    /// # Returns
    /// A boolean value indicating if the token has been cancelled
    ///
    /// # See Also
    /// - [`CancelToken::cancel`]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// [`WorkerThread`] is a thin abstraction over one OS thread, pairing the join
/// handle with the [`CancelToken`] the worker body observes. It is the only place
/// in the library that touches [`std::thread`] directly; the [`Schedule`] runtime
/// and the thread pool both own their workers through it
///
/// # Constructor(s)
/// Workers are spawned via [`WorkerThread::start`], which names the OS thread and
/// surfaces spawn failure as an error instead of panicking
///
/// # See Also
/// - [`CancelToken`]
/// - [`WorkerThread::start`]
/// - [`WorkerThread::join`]
pub struct WorkerThread {
    name: String,
    token: CancelToken,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Spawns a new named OS thread executing ``body``. The supplied ``token`` is
    /// retained so [`WorkerThread::cancel`] can reach the body later; the body is
    /// expected to capture a clone of the same token and poll it
    ///
    /// # Argument(s)
    /// This method accepts three arguments, those being the ``name`` given to the OS
    /// thread, the shared ``token`` and the ``body`` closure the thread executes
    ///
    /// # Returns
    /// The [`WorkerThread`] handle on success, otherwise
    /// [`TaskLoomErrors::WorkerSpawn`] carrying the underlying I/O error
    ///
    /// # See Also
    /// - [`WorkerThread`]
    /// - [`CancelToken`]
    pub fn start(
        name: impl Into<String>,
        token: CancelToken,
        body: impl FnOnce() + Send + 'static,
    ) -> Result<Self, TaskLoomErrors> {
        let name = name.into();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(body)
            .map_err(|error| TaskLoomErrors::WorkerSpawn(name.clone(), error))?;

        debug!(worker = %name, "spawned worker thread");

        Ok(Self { name, token, handle: Some(handle) })
    }

    /// The name the worker was spawned under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requests cancellation of the worker by setting its [`CancelToken`]. This is
    /// advisory only: a body already inside a task function runs that task to
    /// completion before observing the token
    ///
    /// # See Also
    /// - [`CancelToken::cancel`]
    /// - [`WorkerThread::join`]
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Blocks until the worker returns, then releases the handle
    ///
    /// # Returns
    /// ``Ok`` when the worker exited normally, otherwise
    /// [`TaskLoomErrors::WorkerJoin`], which in practice means the body panicked
    /// outside of a task function
    ///
    /// # See Also
    /// - [`WorkerThread::cancel`]
    pub fn join(mut self) -> Result<(), TaskLoomErrors> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| TaskLoomErrors::WorkerJoin(self.name.clone())),
            None => Ok(()),
        }
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        // A dropped handle still joins so no worker outlives its owner.
        if let Some(handle) = self.handle.take() {
            self.token.cancel();
            if handle.join().is_err() {
                warn!(worker = %self.name, "worker terminated abnormally while dropping");
            }
        }
    }
}

impl Debug for WorkerThread {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerThread")
            .field("name", &self.name)
            .field("joined", &self.handle.is_none())
            .finish()
    }
}
