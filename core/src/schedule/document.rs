use crate::errors::TaskLoomErrors;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::Path;

#[allow(unused_imports)]
use crate::schedule::Schedule;

/// The most threads one schedule document may declare
pub const MAX_THREADS: usize = 64;

/// The most tasks one thread may declare
pub const MAX_TASKS_PER_THREAD: usize = 256;

/// The longest accepted schedule, thread or task name, in characters
pub const MAX_NAME_LENGTH: usize = 63;

/// [`ScheduleDocument`] is the serde model of the JSON schedule format. It carries
/// the declarative description only; resolving names against a registry and wiring
/// the dependency graph is the loader's job, and a validated document is still not
/// a runnable [`Schedule`]
///
/// # Document Format
/// ```json
/// {
///   "name": "morning",
///   "main_thread": "brew",
///   "repeat": false,
///   "threads": {
///     "brew": [ { "task": "grind" }, { "task": "pour" } ],
///     "toast": [ { "task": "butter", "wait": "brew:pour" } ]
///   }
/// }
/// ```
/// ``main_thread`` and ``repeat`` are optional; ``repeat`` defaults to false.
/// Unknown properties are ignored. Task order within a thread is the array order
/// of the source document; the ordering of the ``threads`` object itself carries
/// no meaning, each thread runs on its own worker
///
/// # Constraint(s)
/// At most 64 threads, at most 256 tasks per thread, names 1 to 63 characters,
/// and a ``wait`` reference contains exactly one ``:`` delimiter. These are
/// enforced by [`ScheduleDocument::validate`]
///
/// # See Also
/// - [`TaskRecord`]
/// - [`WaitRef`]
/// - [`Schedule`]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ScheduleDocument {
    /// The schedule name, 1 to 63 characters
    pub name: String,

    /// The thread that runs on the caller's context instead of a spawned worker,
    /// when declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_thread: Option<String>,

    /// Whether every thread loops its task list indefinitely
    #[serde(default)]
    pub repeat: bool,

    /// The threads of the schedule, each an ordered list of task records
    pub threads: BTreeMap<String, Vec<TaskRecord>>,
}

/// [`TaskRecord`] is one entry of a thread's task array: the registered task name
/// plus an optional upstream [`WaitRef`] this task must not begin before
///
/// # See Also
/// - [`ScheduleDocument`]
/// - [`WaitRef`]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct TaskRecord {
    /// The registered task name to execute
    pub task: String,

    /// An upstream reference of the form ``"<thread>:<task>"``
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<String>,
}

/// [`WaitRef`] is a parsed ``wait`` reference, the ``"<thread>:<task>"`` pair a
/// dependent task names its upstream by. Parsing checks syntax only; whether the
/// pair resolves to a declared task is established by the loader's second pass
///
/// # See Also
/// - [`TaskRecord`]
/// - [`WaitRef::parse`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaitRef {
    /// The thread the upstream task lives on
    pub thread: String,

    /// The upstream task name
    pub task: String,
}

impl WaitRef {
    /// Parses ``raw`` as a wait reference. The string must contain exactly one
    /// ``:`` delimiter and both halves must be valid names
    ///
    /// # Returns
    /// The parsed [`WaitRef`], or [`TaskLoomErrors::MalformedWait`] /
    /// [`TaskLoomErrors::InvalidNameLength`] on bad syntax
    ///
    /// # See Also
    /// - [`WaitRef`]
    pub fn parse(raw: &str) -> Result<Self, TaskLoomErrors> {
        let mut halves = raw.split(':');
        match (halves.next(), halves.next(), halves.next()) {
            (Some(thread), Some(task), None) => {
                check_name("wait thread", thread)?;
                check_name("wait task", task)?;
                Ok(Self { thread: thread.to_owned(), task: task.to_owned() })
            }
            _ => Err(TaskLoomErrors::MalformedWait(raw.to_owned())),
        }
    }
}

impl Display for WaitRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.thread, self.task)
    }
}

/// Validates that ``name`` falls in the accepted 1 to 63 character range,
/// ``kind`` names the offender in the error
pub(crate) fn check_name(kind: &str, name: &str) -> Result<(), TaskLoomErrors> {
    let length = name.chars().count();
    if length == 0 || length > MAX_NAME_LENGTH {
        return Err(TaskLoomErrors::InvalidNameLength(
            kind.to_owned(),
            name.to_owned(),
        ));
    }
    Ok(())
}

impl ScheduleDocument {
    /// Reads and parses the schedule file at ``path``. The file provider is plain
    /// [`std::fs`]; everything after the byte buffer is [`ScheduleDocument::from_json_str`]
    ///
    /// # Returns
    /// The validated document, or the underlying I/O / parse / shape error
    ///
    /// # See Also
    /// - [`ScheduleDocument::from_json_str`]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TaskLoomErrors> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parses ``text`` as a schedule document and validates its shape
    ///
    /// # Returns
    /// The validated document, or the underlying parse / shape error
    ///
    /// # See Also
    /// - [`ScheduleDocument::validate`]
    pub fn from_json_str(text: &str) -> Result<Self, TaskLoomErrors> {
        let document: Self = serde_json::from_str(text)?;
        document.validate()?;
        Ok(document)
    }

    /// Interprets an already parsed JSON ``value`` as a schedule document and
    /// validates its shape. A non-object value is rejected up front
    ///
    /// # Returns
    /// The validated document, or the underlying shape error
    ///
    /// # See Also
    /// - [`ScheduleDocument::validate`]
    pub fn from_value(value: serde_json::Value) -> Result<Self, TaskLoomErrors> {
        if !value.is_object() {
            return Err(TaskLoomErrors::NotAnObject);
        }
        let document: Self = serde_json::from_value(value)?;
        document.validate()?;
        Ok(document)
    }

    /// Checks the document against the declarative constraints: name lengths,
    /// thread and task counts, non-empty task lists and ``wait`` syntax. Name
    /// *resolution* (registry lookups, wait targets, ``main_thread`` existence)
    /// belongs to the loader, not here
    ///
    /// # Returns
    /// ``Ok`` when the shape is acceptable, otherwise the first violation found
    ///
    /// # See Also
    /// - [`WaitRef::parse`]
    pub fn validate(&self) -> Result<(), TaskLoomErrors> {
        check_name("schedule", &self.name)?;

        if self.threads.is_empty() {
            return Err(TaskLoomErrors::NoThreads);
        }
        if self.threads.len() > MAX_THREADS {
            return Err(TaskLoomErrors::TooManyThreads(
                self.threads.len(),
                MAX_THREADS,
            ));
        }

        for (thread_name, records) in &self.threads {
            check_name("thread", thread_name)?;
            if records.is_empty() {
                return Err(TaskLoomErrors::EmptyThread(thread_name.clone()));
            }
            if records.len() > MAX_TASKS_PER_THREAD {
                return Err(TaskLoomErrors::TooManyTasks(
                    thread_name.clone(),
                    records.len(),
                    MAX_TASKS_PER_THREAD,
                ));
            }
            for record in records {
                check_name("task", &record.task)?;
                if let Some(wait) = &record.wait {
                    WaitRef::parse(wait)?;
                }
            }
        }

        Ok(())
    }
}
