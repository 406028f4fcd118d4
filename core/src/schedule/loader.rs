use crate::errors::TaskLoomErrors;
use crate::monitor::{IdleGate, Monitor};
use crate::registry::{TASKLOOM_REGISTRY, TaskRegistry};
use crate::schedule::document::{ScheduleDocument, WaitRef};
use crate::schedule::{
    Lifecycle, Schedule, ScheduleInner, ScheduleTask, ScheduleThread, WaitPoint,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::sync::atomic::AtomicBool;
use tracing::debug;
use typed_builder::TypedBuilder;

/// This is the builder configs to use for building a [`ScheduleLoader`] instance.
/// By itself it should not be used, and it resides in [`ScheduleLoader::builder`]
#[derive(TypedBuilder)]
#[builder(build_method(into = ScheduleLoader))]
pub struct ScheduleLoaderConfig {
    /// The [`TaskRegistry`] task names are resolved against
    ///
    /// # Default Value
    /// Every loader uses as default value the process-wide [`TASKLOOM_REGISTRY`].
    /// Supplying a scoped registry removes the implicit process-wide coupling,
    /// which is the preferable shape for libraries and for testing
    ///
    /// # See Also
    /// - [`TASKLOOM_REGISTRY`]
    /// - [`TaskRegistry`]
    /// - [`ScheduleLoader`]
    #[builder(default = TASKLOOM_REGISTRY.clone())]
    registry: Arc<TaskRegistry>,
}

impl From<ScheduleLoaderConfig> for ScheduleLoader {
    fn from(config: ScheduleLoaderConfig) -> Self {
        Self { registry: config.registry }
    }
}

/// [`ScheduleLoader`] consumes a schedule document and produces a runnable
/// [`Schedule`]. It performs the whole graph build:
/// 1. Shape validation of the document (delegated to [`ScheduleDocument::validate`]).
/// 2. Per-thread descriptor construction, resolving every task name against the
///    registry and parsing every ``wait`` reference.
/// 3. A second pass cross-resolving wait edges to ``(thread, task)`` indices and
///    marking the upstream tasks as dependencies.
/// 4. Rejection of every cycle in the combined graph of declaration order and
///    wait edges, self-dependence and same-thread forward waits included; such a
///    schedule would deadlock at run time.
///
/// Any failure is fatal: no schedule is produced and nothing is spawned
///
/// # Constructor(s)
/// If one wishes to construct their own [`ScheduleLoader`], they may do so via
/// [`ScheduleLoader::builder`]; for resolving against the process-wide registry
/// the convenience constructors on [`Schedule`] build a default loader internally
///
/// # Example
/// ```ignore
/// use std::sync::Arc;
/// use taskloom::registry::TaskRegistry;
/// use taskloom::schedule::ScheduleLoader;
///
/// let registry = Arc::new(TaskRegistry::new());
/// registry.register("step", |_| None);
///
/// let loader = ScheduleLoader::builder().registry(registry).build();
/// let schedule = loader.load_json_str(r#"{
///     "name": "scoped",
///     "threads": { "only": [ { "task": "step" } ] }
/// }"#)?;
/// ```
///
/// # See Also
/// - [`Schedule`]
/// - [`ScheduleDocument`]
/// - [`TaskRegistry`]
pub struct ScheduleLoader {
    registry: Arc<TaskRegistry>,
}

impl ScheduleLoader {
    /// Constructs a loader builder, which is used for supplying the registry to
    /// then construct a [`ScheduleLoader`]
    ///
    /// # Returns
    /// The [`ScheduleLoaderConfigBuilder`] builder for constructing the loader
    ///
    /// # See Also
    /// - [`ScheduleLoader`]
    /// - [`ScheduleLoaderConfig`]
    pub fn builder() -> ScheduleLoaderConfigBuilder {
        ScheduleLoaderConfig::builder()
    }

    /// Reads the schedule file at ``path`` and builds it
    ///
    /// # See Also
    /// - [`ScheduleLoader::build`]
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Schedule, TaskLoomErrors> {
        self.build(ScheduleDocument::from_path(path)?)
    }

    /// Parses ``text`` as a schedule document and builds it
    ///
    /// # See Also
    /// - [`ScheduleLoader::build`]
    pub fn load_json_str(&self, text: &str) -> Result<Schedule, TaskLoomErrors> {
        self.build(ScheduleDocument::from_json_str(text)?)
    }

    /// Interprets an already parsed JSON ``value`` as a schedule document and
    /// builds it
    ///
    /// # See Also
    /// - [`ScheduleLoader::build`]
    pub fn load_value(&self, value: serde_json::Value) -> Result<Schedule, TaskLoomErrors> {
        self.build(ScheduleDocument::from_value(value)?)
    }

    /// Builds a runnable [`Schedule`] out of a validated ``document``. This is
    /// where names become indices: every task resolves to its registered function,
    /// every wait reference resolves to a position in the schedule-owned arena,
    /// and the combined order/wait graph is checked for cycles
    ///
    /// # Returns
    /// The runnable schedule, or the first build error; the error cases are
    /// spelled out on [`TaskLoomErrors`]
    ///
    /// # See Also
    /// - [`Schedule`]
    /// - [`ScheduleDocument`]
    pub fn build(&self, document: ScheduleDocument) -> Result<Schedule, TaskLoomErrors> {
        document.validate()?;

        // Pass 1: per-thread descriptors, registry resolution, wait parsing.
        let mut threads: Vec<ScheduleThread> = Vec::with_capacity(document.threads.len());
        let mut index: HashMap<String, usize> = HashMap::with_capacity(document.threads.len());

        for (thread_name, records) in &document.threads {
            let mut tasks: Vec<ScheduleTask> = Vec::with_capacity(records.len());
            let mut declared: HashSet<&str> = HashSet::with_capacity(records.len());

            for record in records {
                if !declared.insert(record.task.as_str()) {
                    return Err(TaskLoomErrors::DuplicateTask(
                        thread_name.clone(),
                        record.task.clone(),
                    ));
                }

                let function = self
                    .registry
                    .find(&record.task)
                    .ok_or_else(|| TaskLoomErrors::UnresolvedTask(record.task.clone()))?;

                let wait = record
                    .wait
                    .as_deref()
                    .map(WaitRef::parse)
                    .transpose()?
                    .map(|reference| WaitPoint {
                        thread: reference.thread,
                        task: reference.task,
                        target: (0, 0),
                    });

                tasks.push(ScheduleTask {
                    name: record.task.clone(),
                    function,
                    wait,
                    dependency: false,
                    dependents: 0,
                    monitor: Monitor::new(),
                });
            }

            debug!(thread = %thread_name, tasks = tasks.len(), "built thread descriptor");
            index.insert(thread_name.clone(), threads.len());
            threads.push(ScheduleThread {
                name: thread_name.clone(),
                tasks,
                running: AtomicBool::new(false),
            });
        }

        if let Some(main_thread) = &document.main_thread
            && !index.contains_key(main_thread)
        {
            return Err(TaskLoomErrors::UnknownMainThread(main_thread.clone()));
        }

        // Pass 2: cross-resolve wait edges to arena indices.
        let mut edges: Vec<(usize, usize, usize, usize)> = Vec::new();
        for (thread_index, thread) in threads.iter().enumerate() {
            for (task_index, task) in thread.tasks.iter().enumerate() {
                let Some(wait) = &task.wait else { continue };

                let upstream_thread = *index.get(&wait.thread).ok_or_else(|| {
                    TaskLoomErrors::UnknownWaitThread(
                        task.name.clone(),
                        thread.name.clone(),
                        wait.thread.clone(),
                    )
                })?;
                let upstream_task = threads[upstream_thread]
                    .tasks
                    .iter()
                    .position(|candidate| candidate.name == wait.task)
                    .ok_or_else(|| {
                        TaskLoomErrors::UnknownWaitTask(
                            task.name.clone(),
                            thread.name.clone(),
                            wait.thread.clone(),
                            wait.task.clone(),
                        )
                    })?;

                edges.push((thread_index, task_index, upstream_thread, upstream_task));
            }
        }

        for &(thread_index, task_index, upstream_thread, upstream_task) in &edges {
            if let Some(wait) = threads[thread_index].tasks[task_index].wait.as_mut() {
                wait.target = (upstream_thread, upstream_task);
            }
            let upstream = &mut threads[upstream_thread].tasks[upstream_task];
            upstream.dependency = true;
            upstream.dependents += 1;
        }

        reject_cycles(&threads, &edges)?;

        debug!(
            schedule = %document.name,
            threads = threads.len(),
            edges = edges.len(),
            "schedule graph built"
        );

        Ok(Schedule {
            inner: Arc::new(ScheduleInner {
                name: document.name,
                main_thread: document.main_thread,
                repeat: AtomicBool::new(document.repeat),
                threads,
                index,
                idle: IdleGate::new(),
                lifecycle: Mutex::new(Lifecycle { started: false, tokens: Vec::new() }),
            }),
            workers: Mutex::new(Vec::new()),
        })
    }
}

/// Rejects every cycle in the happens-before graph: intra-thread declaration
/// order contributes one edge per consecutive task pair, and every resolved wait
/// contributes an upstream → dependent edge. Kahn's topological sort either
/// consumes all nodes or leaves the cycle behind
fn reject_cycles(
    threads: &[ScheduleThread],
    edges: &[(usize, usize, usize, usize)],
) -> Result<(), TaskLoomErrors> {
    // Flat node ids per task, offset by thread.
    let mut offsets: Vec<usize> = Vec::with_capacity(threads.len());
    let mut total = 0usize;
    for thread in threads {
        offsets.push(total);
        total += thread.tasks.len();
    }
    let id = |thread_index: usize, task_index: usize| offsets[thread_index] + task_index;

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); total];
    let mut indegree: Vec<usize> = vec![0; total];

    for (thread_index, thread) in threads.iter().enumerate() {
        for task_index in 1..thread.tasks.len() {
            successors[id(thread_index, task_index - 1)].push(id(thread_index, task_index));
            indegree[id(thread_index, task_index)] += 1;
        }
    }
    for &(thread_index, task_index, upstream_thread, upstream_task) in edges {
        successors[id(upstream_thread, upstream_task)].push(id(thread_index, task_index));
        indegree[id(thread_index, task_index)] += 1;
    }

    let mut ready: VecDeque<usize> = indegree
        .iter()
        .enumerate()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(node, _)| node)
        .collect();

    let mut processed = 0usize;
    while let Some(node) = ready.pop_front() {
        processed += 1;
        for &successor in &successors[node] {
            indegree[successor] -= 1;
            if indegree[successor] == 0 {
                ready.push_back(successor);
            }
        }
    }

    if processed == total {
        return Ok(());
    }

    // Name one task still on the cycle for the error.
    for (thread_index, thread) in threads.iter().enumerate() {
        for (task_index, task) in thread.tasks.iter().enumerate() {
            if indegree[id(thread_index, task_index)] > 0 {
                return Err(TaskLoomErrors::DependencyCycle(
                    thread.name.clone(),
                    task.name.clone(),
                ));
            }
        }
    }

    Ok(())
}
