#[allow(missing_docs)]
pub mod errors;

#[allow(missing_docs)]
pub mod monitor;

#[allow(missing_docs)]
pub mod pool;

#[allow(missing_docs)]
pub mod registry;

#[allow(missing_docs)]
pub mod schedule;

#[allow(missing_docs)]
pub mod worker;

#[allow(missing_docs)]
pub(crate) mod utils;

use crate::registry::TASKLOOM_REGISTRY;
use once_cell::sync::Lazy;

/// Initializes the library: constructs the process-wide task registry. Calling
/// this is optional (the registry is lazily created on first use) and idempotent;
/// it exists so embedders can pay the setup cost at a moment of their choosing
///
/// # See Also
/// - [`quit`]
/// - [`TASKLOOM_REGISTRY`]
pub fn init() {
    Lazy::force(&TASKLOOM_REGISTRY);
}

/// Tears the library down: clears the process-wide task registry. Schedules that
/// are already built keep their resolved functions, the registry is never
/// consulted after build time
///
/// # See Also
/// - [`init`]
/// - [`TASKLOOM_REGISTRY`]
pub fn quit() {
    TASKLOOM_REGISTRY.clear();
}

/// The convenience import surface: ``use taskloom::prelude::*`` brings in the
/// handful of items nearly every embedder touches
pub mod prelude {
    pub use crate::errors::TaskLoomErrors;
    pub use crate::pool::ThreadPool;
    pub use crate::registry::{
        TASKLOOM_REGISTRY, TaskFunction, TaskParameter, TaskRegistry, TaskReturn, find_task,
        register_task, remove_task,
    };
    pub use crate::schedule::{Schedule, ScheduleDocument, ScheduleLoader};
    pub use crate::{init, quit};
}
