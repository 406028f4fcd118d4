use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

#[allow(unused_imports)]
use crate::schedule::{Schedule, ScheduleLoader};

/// The process-wide default [`TaskRegistry`]. Schedules built through
/// [`Schedule::load`] (and friends) resolve their task names against this
/// registry; for a scoped registry one supplies their own instance via
/// [`ScheduleLoader::builder`]
///
/// # See Also
/// - [`TaskRegistry`]
/// - [`register_task`]
/// - [`find_task`]
pub static TASKLOOM_REGISTRY: Lazy<Arc<TaskRegistry>> =
    Lazy::new(|| Arc::new(TaskRegistry::new()));

/// The opaque parameter handed to every task function. The schedule runtime passes the
/// parameter supplied to [`Schedule::start`] to each task unchanged; the thread pool
/// passes whatever was supplied alongside the dispatched function
pub type TaskParameter = Arc<dyn Any + Send + Sync>;

/// The opaque value a task function may hand back. The schedule runtime discards it;
/// a thread pool slot stores the most recent one for later retrieval
pub type TaskReturn = Box<dyn Any + Send>;

/// [`TaskFunction`] is the callable unit of work TaskLoom coordinates. It receives an
/// optional shared [`TaskParameter`] and may produce a [`TaskReturn`]. Functions are
/// registered by unique name and resolved by the graph builder, never on the hot path
pub type TaskFunction =
    Arc<dyn Fn(Option<&TaskParameter>) -> Option<TaskReturn> + Send + Sync>;

/// [`TaskRegistry`] is a mapping from task name to [`TaskFunction`], written during
/// setup and read by the graph builder when a schedule document is loaded. It has no
/// ordering guarantees
///
/// # Constructor(s)
/// A registry is constructed via [`TaskRegistry::new`] (or [`TaskRegistry::default`]).
/// For simple demos and examples, it may be preferred to use the default provided
/// process-wide registry, that being [`TASKLOOM_REGISTRY`]
///
/// # Usage Note(s)
/// Mutating a registry while one of its schedules is between [`Schedule::start`] and
/// [`Schedule::stop`] is not sanctioned. The runtime never consults the registry after
/// build time, so nothing enforces this, it is a documented precondition
///
/// # Example
/// ```ignore
/// use taskloom::registry::TaskRegistry;
///
/// let registry = TaskRegistry::new();
/// registry.register("greet", |_parameter| {
///     println!("hello from a task");
///     None
/// });
///
/// assert!(registry.find("greet").is_some());
/// ```
///
/// # See Also
/// - [`TASKLOOM_REGISTRY`]
/// - [`TaskFunction`]
/// - [`Schedule`]
#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<String, TaskFunction>,
}

impl Debug for TaskRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> =
            self.tasks.iter().map(|entry| entry.key().clone()).collect();
        names.sort_unstable();
        f.debug_struct("TaskRegistry").field("tasks", &names).finish()
    }
}

impl TaskRegistry {
    /// Creates / Constructs a new empty [`TaskRegistry`] instance
    ///
    /// # See Also
    /// - [`TaskRegistry`]
    /// - [`TASKLOOM_REGISTRY`]
    pub fn new() -> Self {
        Self { tasks: DashMap::new() }
    }

    /// Registers ``function`` under ``name``, inserting or replacing. Registering the
    /// same name twice keeps the most recent function
    ///
    /// # Argument(s)
    /// This method accepts two arguments, those being the ``name`` under which the
    /// function is looked up by schedule documents and the ``function`` itself
    ///
    /// # See Also
    /// - [`TaskRegistry::find`]
    /// - [`TaskFunction`]
    pub fn register(
        &self,
        name: impl Into<String>,
        function: impl Fn(Option<&TaskParameter>) -> Option<TaskReturn> + Send + Sync + 'static,
    ) {
        self.tasks.insert(name.into(), Arc::new(function));
    }

    /// Looks up the [`TaskFunction`] registered under ``name``
    ///
    /// # Returns
    /// The registered function, or ``None`` when no function carries that name
    ///
    /// # See Also
    /// - [`TaskRegistry::register`]
    /// - [`TaskFunction`]
    pub fn find(&self, name: &str) -> Option<TaskFunction> {
        self.tasks.get(name).map(|entry| entry.value().clone())
    }

    /// Removes the function registered under ``name``
    ///
    /// # Returns
    /// A boolean value indicating if a function was actually removed, true if it
    /// was and false if no function carried that name
    ///
    /// # See Also
    /// - [`TaskRegistry::register`]
    pub fn unregister(&self, name: &str) -> bool {
        self.tasks.remove(name).is_some()
    }

    /// Removes every registered function, leaving the registry empty
    ///
    /// # See Also
    /// - [`TaskRegistry::unregister`]
    pub fn clear(&self) {
        self.tasks.clear();
    }

    /// Counts the registered functions
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Checks if the registry holds no functions
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Registers ``function`` under ``name`` on the process-wide [`TASKLOOM_REGISTRY`].
/// This is the convenience surface the demo programs use; libraries embedding
/// TaskLoom may prefer a scoped [`TaskRegistry`] instead
///
/// # See Also
/// - [`TASKLOOM_REGISTRY`]
/// - [`TaskRegistry::register`]
pub fn register_task(
    name: impl Into<String>,
    function: impl Fn(Option<&TaskParameter>) -> Option<TaskReturn> + Send + Sync + 'static,
) {
    TASKLOOM_REGISTRY.register(name, function);
}

/// Looks up ``name`` on the process-wide [`TASKLOOM_REGISTRY`]
///
/// # Returns
/// The registered function, or ``None`` when no function carries that name
///
/// # See Also
/// - [`TASKLOOM_REGISTRY`]
/// - [`TaskRegistry::find`]
pub fn find_task(name: &str) -> Option<TaskFunction> {
    TASKLOOM_REGISTRY.find(name)
}

/// Removes ``name`` from the process-wide [`TASKLOOM_REGISTRY`]
///
/// # Returns
/// A boolean value indicating if a function was actually removed
///
/// # See Also
/// - [`TASKLOOM_REGISTRY`]
/// - [`TaskRegistry::unregister`]
pub fn remove_task(name: &str) -> bool {
    TASKLOOM_REGISTRY.unregister(name)
}
