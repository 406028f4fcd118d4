use std::sync::Arc;
use taskloom::errors::TaskLoomErrors;
use taskloom::registry::TaskRegistry;
use taskloom::schedule::document::{MAX_TASKS_PER_THREAD, MAX_THREADS};
use taskloom::schedule::{ScheduleDocument, ScheduleLoader, TaskRecord};

fn noop_registry(names: &[&str]) -> Arc<TaskRegistry> {
    let registry = Arc::new(TaskRegistry::new());
    for name in names {
        registry.register(*name, |_| None);
    }
    registry
}

fn loader(names: &[&str]) -> ScheduleLoader {
    ScheduleLoader::builder().registry(noop_registry(names)).build()
}

#[test]
fn unresolved_task_fails_the_build() {
    let result = loader(&[]).load_json_str(
        r#"{ "name": "missing", "threads": { "t": [ { "task": "nowhere" } ] } }"#,
    );

    assert!(
        matches!(result, Err(TaskLoomErrors::UnresolvedTask(name)) if name == "nowhere"),
        "an unregistered task name must fail the build and produce no schedule"
    );
}

#[test]
fn wait_on_unknown_thread_fails_the_build() {
    let result = loader(&["a", "b"]).load_json_str(
        r#"{
            "name": "bad wait",
            "threads": {
                "t": [ { "task": "a" } ],
                "u": [ { "task": "b", "wait": "ghost:a" } ]
            }
        }"#,
    );

    assert!(
        matches!(result, Err(TaskLoomErrors::UnknownWaitThread(_, _, thread)) if thread == "ghost"),
        "a wait naming an undeclared thread must fail the build"
    );
}

#[test]
fn wait_on_unknown_task_fails_the_build() {
    let result = loader(&["a", "b"]).load_json_str(
        r#"{
            "name": "bad wait",
            "threads": {
                "t": [ { "task": "a" } ],
                "u": [ { "task": "b", "wait": "t:ghost" } ]
            }
        }"#,
    );

    assert!(
        matches!(result, Err(TaskLoomErrors::UnknownWaitTask(_, _, _, task)) if task == "ghost"),
        "a wait naming a task its thread never declares must fail the build"
    );
}

#[test]
fn malformed_wait_fails_the_build() {
    let result = loader(&["a", "b"]).load_json_str(
        r#"{
            "name": "bad wait",
            "threads": {
                "t": [ { "task": "a" } ],
                "u": [ { "task": "b", "wait": "t a" } ]
            }
        }"#,
    );

    assert!(
        matches!(result, Err(TaskLoomErrors::MalformedWait(_))),
        "a wait without the `:` delimiter must fail the build"
    );
}

#[test]
fn self_dependence_fails_the_build() {
    let result = loader(&["a"]).load_json_str(
        r#"{
            "name": "selfish",
            "threads": { "t": [ { "task": "a", "wait": "t:a" } ] }
        }"#,
    );

    assert!(
        matches!(result, Err(TaskLoomErrors::DependencyCycle(_, _))),
        "a task waiting on itself must be rejected as a cycle"
    );
}

#[test]
fn cross_thread_cycle_fails_the_build() {
    let result = loader(&["a", "b"]).load_json_str(
        r#"{
            "name": "cyclic",
            "threads": {
                "t": [ { "task": "a", "wait": "u:b" } ],
                "u": [ { "task": "b", "wait": "t:a" } ]
            }
        }"#,
    );

    assert!(
        matches!(result, Err(TaskLoomErrors::DependencyCycle(_, _))),
        "mutually waiting threads must be rejected as a cycle"
    );
}

#[test]
fn waiting_on_a_later_task_of_the_same_thread_fails_the_build() {
    // Declaration order forces `early` before `late`, while the wait demands
    // the opposite; at run time this deadlocks, so the build must refuse it.
    let result = loader(&["early", "late"]).load_json_str(
        r#"{
            "name": "forward wait",
            "threads": {
                "t": [
                    { "task": "early", "wait": "t:late" },
                    { "task": "late" }
                ]
            }
        }"#,
    );

    assert!(
        matches!(result, Err(TaskLoomErrors::DependencyCycle(_, _))),
        "a same-thread forward wait must be rejected as a cycle"
    );
}

#[test]
fn waiting_on_an_earlier_task_of_the_same_thread_is_allowed() {
    let result = loader(&["early", "late"]).load_json_str(
        r#"{
            "name": "backward wait",
            "threads": {
                "t": [
                    { "task": "early" },
                    { "task": "late", "wait": "t:early" }
                ]
            }
        }"#,
    );

    let schedule = result.expect("a same-thread backward wait is consistent with array order");
    schedule.start(None).expect("backward-wait schedule should start");
    schedule.wait_idle();
    schedule.stop();
}

#[test]
fn duplicate_task_names_within_a_thread_fail_the_build() {
    let result = loader(&["a"]).load_json_str(
        r#"{
            "name": "twins",
            "threads": { "t": [ { "task": "a" }, { "task": "a" } ] }
        }"#,
    );

    assert!(
        matches!(result, Err(TaskLoomErrors::DuplicateTask(_, name)) if name == "a"),
        "duplicate task names make wait resolution ambiguous and must be rejected"
    );
}

#[test]
fn unknown_main_thread_fails_the_build() {
    let result = loader(&["a"]).load_json_str(
        r#"{
            "name": "headless",
            "main_thread": "ghost",
            "threads": { "t": [ { "task": "a" } ] }
        }"#,
    );

    assert!(
        matches!(result, Err(TaskLoomErrors::UnknownMainThread(name)) if name == "ghost"),
        "main_thread must name a declared thread"
    );
}

/// Builds a document with ``thread_count`` threads of ``task_count`` tasks each,
/// every task resolving to the same registered function.
fn sized_document(thread_count: usize, task_count: usize) -> ScheduleDocument {
    let threads = (0..thread_count)
        .map(|thread_index| {
            let records = (0..task_count)
                .map(|task_index| TaskRecord {
                    task: format!("job_{task_index}"),
                    wait: None,
                })
                .collect();
            (format!("thread_{thread_index}"), records)
        })
        .collect();

    ScheduleDocument {
        name: "sized".to_owned(),
        main_thread: None,
        repeat: false,
        threads,
    }
}

#[test]
fn full_sized_schedule_builds() {
    let names: Vec<String> = (0..MAX_TASKS_PER_THREAD).map(|i| format!("job_{i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();

    let document = sized_document(MAX_THREADS, MAX_TASKS_PER_THREAD);
    let schedule = loader(&name_refs)
        .build(document)
        .expect("64 threads x 256 tasks must construct");

    assert_eq!(schedule.task_count(), MAX_THREADS * MAX_TASKS_PER_THREAD);
}

#[test]
fn one_thread_too_many_fails_the_build() {
    let document = sized_document(MAX_THREADS + 1, 1);
    assert!(
        matches!(
            loader(&["job_0"]).build(document),
            Err(TaskLoomErrors::TooManyThreads(_, _))
        ),
        "65 threads must fail the build"
    );
}

#[test]
fn one_task_too_many_fails_the_build() {
    let names: Vec<String> = (0..=MAX_TASKS_PER_THREAD).map(|i| format!("job_{i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();

    let document = sized_document(1, MAX_TASKS_PER_THREAD + 1);
    assert!(
        matches!(
            loader(&name_refs).build(document),
            Err(TaskLoomErrors::TooManyTasks(_, _, _))
        ),
        "257 tasks on one thread must fail the build"
    );
}

#[test]
fn descriptor_flags_reflect_the_graph() {
    let schedule = loader(&["tell", "laugh", "gasp"])
        .load_json_str(
            r#"{
                "name": "flags",
                "threads": {
                    "S": [ { "task": "tell" } ],
                    "L": [
                        { "task": "laugh", "wait": "S:tell" },
                        { "task": "gasp",  "wait": "S:tell" }
                    ]
                }
            }"#,
        )
        .expect("flag schedule should build");

    let stage = schedule.thread("S").expect("thread S should exist");
    let tell = &stage.tasks()[0];
    assert!(tell.is_dependency(), "tell has dependents");
    assert!(!tell.is_dependent(), "tell waits on nothing");
    assert_eq!(tell.dependents(), 2, "both laugh and gasp target tell");

    let listeners = schedule.thread("L").expect("thread L should exist");
    let laugh = &listeners.tasks()[0];
    assert!(laugh.is_dependent(), "laugh declares a wait");
    assert_eq!(laugh.wait(), Some(("S", "tell")));
}
