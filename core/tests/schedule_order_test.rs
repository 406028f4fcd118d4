use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskloom::registry::TaskRegistry;
use taskloom::schedule::ScheduleLoader;

/// A registry whose tasks append their name to a shared journal, so tests can
/// assert on execution order after the run.
fn journaling_registry(names: &[&str], journal: &Arc<Mutex<Vec<String>>>) -> Arc<TaskRegistry> {
    let registry = Arc::new(TaskRegistry::new());
    for name in names {
        let journal = journal.clone();
        let entry = (*name).to_owned();
        registry.register(*name, move |_| {
            journal.lock().expect("journal lock poisoned").push(entry.clone());
            None
        });
    }
    registry
}

fn position(journal: &[String], name: &str) -> usize {
    journal
        .iter()
        .position(|entry| entry == name)
        .unwrap_or_else(|| panic!("`{name}` never ran, journal: {journal:?}"))
}

#[test]
fn single_chain_runs_in_array_order() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let registry = journaling_registry(&["a", "b", "c"], &journal);

    let schedule = ScheduleLoader::builder()
        .registry(registry)
        .build()
        .load_json_str(
            r#"{
                "name": "chain",
                "threads": { "T1": [ { "task": "a" }, { "task": "b" }, { "task": "c" } ] }
            }"#,
        )
        .expect("chain schedule should build");

    schedule.start(None).expect("chain schedule should start");
    schedule.wait_idle();
    schedule.stop();

    assert_eq!(
        *journal.lock().expect("journal lock poisoned"),
        vec!["a", "b", "c"],
        "Should run each task exactly once, in array order"
    );
}

#[test]
fn cross_thread_dependency_orders_tell_before_laugh() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let registry = journaling_registry(&["tell", "laugh"], &journal);

    let schedule = ScheduleLoader::builder()
        .registry(registry)
        .build()
        .load_json_str(
            r#"{
                "name": "two threads",
                "threads": {
                    "S": [ { "task": "tell" } ],
                    "L": [ { "task": "laugh", "wait": "S:tell" } ]
                }
            }"#,
        )
        .expect("two-thread schedule should build");

    schedule.start(None).expect("two-thread schedule should start");
    schedule.wait_idle();
    schedule.stop();

    let journal = journal.lock().expect("journal lock poisoned");
    assert!(
        position(&journal, "tell") < position(&journal, "laugh"),
        "laugh should only run after tell has returned, journal: {journal:?}"
    );
}

#[test]
fn dependent_observes_upstream_side_effects() {
    let registry = Arc::new(TaskRegistry::new());
    let value = Arc::new(Mutex::new(0u32));
    let observed = Arc::new(Mutex::new(0u32));

    {
        let value = value.clone();
        registry.register("produce", move |_| {
            *value.lock().expect("value lock poisoned") = 42;
            std::thread::sleep(Duration::from_millis(30));
            None
        });
    }
    {
        let value = value.clone();
        let observed = observed.clone();
        registry.register("consume", move |_| {
            *observed.lock().expect("observed lock poisoned") =
                *value.lock().expect("value lock poisoned");
            None
        });
    }

    let schedule = ScheduleLoader::builder()
        .registry(registry)
        .build()
        .load_json_str(
            r#"{
                "name": "happens before",
                "threads": {
                    "producer": [ { "task": "produce" } ],
                    "consumer": [ { "task": "consume", "wait": "producer:produce" } ]
                }
            }"#,
        )
        .expect("happens-before schedule should build");

    schedule.start(None).expect("happens-before schedule should start");
    schedule.wait_idle();
    schedule.stop();

    assert_eq!(
        *observed.lock().expect("observed lock poisoned"),
        42,
        "The dependent must observe the side effects of its upstream task"
    );
}

#[test]
fn joke_scenario_each_laugh_follows_its_punchline() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let registry = journaling_registry(
        &[
            "alice_joke",
            "bob_joke",
            "charlie_joke",
            "laugh_at_alice",
            "laugh_at_bob",
            "laugh_at_charlie",
        ],
        &journal,
    );

    let schedule = ScheduleLoader::builder()
        .registry(registry)
        .build()
        .load_json_str(
            r#"{
                "name": "open mic",
                "threads": {
                    "Alice":   [ { "task": "alice_joke" } ],
                    "Bob":     [ { "task": "bob_joke" } ],
                    "Charlie": [ { "task": "charlie_joke" } ],
                    "Listeners": [
                        { "task": "laugh_at_alice",   "wait": "Alice:alice_joke" },
                        { "task": "laugh_at_bob",     "wait": "Bob:bob_joke" },
                        { "task": "laugh_at_charlie", "wait": "Charlie:charlie_joke" }
                    ]
                }
            }"#,
        )
        .expect("open mic schedule should build");

    schedule.start(None).expect("open mic schedule should start");
    schedule.wait_idle();
    schedule.stop();

    let journal = journal.lock().expect("journal lock poisoned");
    assert_eq!(journal.len(), 6, "every teller and every laugh should run once");
    for comedian in ["alice", "bob", "charlie"] {
        assert!(
            position(&journal, &format!("{comedian}_joke"))
                < position(&journal, &format!("laugh_at_{comedian}")),
            "each laugh must follow its own punchline, journal: {journal:?}"
        );
    }
}

#[test]
fn no_running_flag_survives_wait_idle() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let registry = journaling_registry(&["a", "b"], &journal);

    let schedule = ScheduleLoader::builder()
        .registry(registry)
        .build()
        .load_json_str(
            r#"{
                "name": "flags",
                "threads": {
                    "one": [ { "task": "a" } ],
                    "two": [ { "task": "b" } ]
                }
            }"#,
        )
        .expect("flag schedule should build");

    schedule.start(None).expect("flag schedule should start");
    schedule.wait_idle();

    for thread in schedule.threads() {
        assert!(
            !thread.is_running(),
            "thread `{}` should not be running after wait_idle",
            thread.name()
        );
    }
    schedule.stop();
}

#[test]
fn stop_is_idempotent() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let registry = journaling_registry(&["a"], &journal);

    let schedule = ScheduleLoader::builder()
        .registry(registry)
        .build()
        .load_json_str(
            r#"{ "name": "idempotent", "threads": { "t": [ { "task": "a" } ] } }"#,
        )
        .expect("schedule should build");

    schedule.start(None).expect("schedule should start");
    schedule.wait_idle();
    schedule.stop();
    schedule.stop();

    assert_eq!(
        journal.lock().expect("journal lock poisoned").len(),
        1,
        "stopping twice must be equivalent to stopping once"
    );
}

#[test]
fn a_stopped_schedule_can_start_again() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let registry = journaling_registry(&["tell", "laugh"], &journal);

    let schedule = ScheduleLoader::builder()
        .registry(registry)
        .build()
        .load_json_str(
            r#"{
                "name": "rerun",
                "threads": {
                    "S": [ { "task": "tell" } ],
                    "L": [ { "task": "laugh", "wait": "S:tell" } ]
                }
            }"#,
        )
        .expect("rerun schedule should build");

    for _ in 0..2 {
        schedule.start(None).expect("rerun schedule should start");
        schedule.wait_idle();
        schedule.stop();
    }

    let journal = journal.lock().expect("journal lock poisoned");
    assert_eq!(
        journal.len(),
        4,
        "both runs should execute both tasks, journal: {journal:?}"
    );
}

#[test]
fn starting_twice_without_stop_is_an_error() {
    let registry = Arc::new(TaskRegistry::new());
    registry.register("linger", |_| {
        std::thread::sleep(Duration::from_millis(100));
        None
    });

    let schedule = ScheduleLoader::builder()
        .registry(registry)
        .build()
        .load_json_str(
            r#"{ "name": "double", "threads": { "t": [ { "task": "linger" } ] } }"#,
        )
        .expect("schedule should build");

    schedule.start(None).expect("first start should succeed");
    assert!(
        schedule.start(None).is_err(),
        "a second start before stop must be rejected"
    );
    schedule.wait_idle();
    schedule.stop();
}

#[test]
fn dependency_edges_round_trip_through_to_document() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let registry = journaling_registry(&["tell", "laugh", "applaud"], &journal);

    let schedule = ScheduleLoader::builder()
        .registry(registry)
        .build()
        .load_json_str(
            r#"{
                "name": "round trip",
                "main_thread": "S",
                "threads": {
                    "S": [ { "task": "tell" } ],
                    "L": [
                        { "task": "laugh",   "wait": "S:tell" },
                        { "task": "applaud" }
                    ]
                }
            }"#,
        )
        .expect("round-trip schedule should build");

    let document = schedule.to_document();
    assert_eq!(document.name, "round trip");
    assert_eq!(document.main_thread.as_deref(), Some("S"));
    assert_eq!(
        document.threads["L"][0].wait.as_deref(),
        Some("S:tell"),
        "the dependency edge must survive the round trip"
    );
    assert_eq!(document.threads["L"][1].wait, None);
    assert_eq!(document.threads["S"][0].task, "tell");

    // And the re-exported document is loadable JSON again.
    let text = serde_json::to_string(&document).expect("document should serialize");
    let reparsed = taskloom::schedule::ScheduleDocument::from_json_str(&text)
        .expect("re-exported document should parse");
    assert_eq!(reparsed, document);
}

#[test]
fn main_thread_runs_on_the_callers_context() {
    let registry = Arc::new(TaskRegistry::new());
    let caller = std::thread::current().id();
    let ran_on = Arc::new(Mutex::new(None));

    {
        let ran_on = ran_on.clone();
        registry.register("probe", move |_| {
            *ran_on.lock().expect("ran_on lock poisoned") =
                Some(std::thread::current().id());
            None
        });
    }

    let schedule = ScheduleLoader::builder()
        .registry(registry)
        .build()
        .load_json_str(
            r#"{
                "name": "main thread",
                "main_thread": "m",
                "threads": { "m": [ { "task": "probe" } ] }
            }"#,
        )
        .expect("main-thread schedule should build");

    schedule.start(None).expect("main-thread schedule should start");
    schedule.wait_idle();
    schedule.stop();

    assert_eq!(
        *ran_on.lock().expect("ran_on lock poisoned"),
        Some(caller),
        "the declared main thread must run on the caller's context"
    );
}

#[test]
fn start_parameter_reaches_every_task() {
    let registry = Arc::new(TaskRegistry::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second"] {
        let seen = seen.clone();
        registry.register(name, move |parameter| {
            let value = parameter
                .and_then(|parameter| parameter.downcast_ref::<String>())
                .cloned()
                .unwrap_or_else(|| "<missing>".to_owned());
            seen.lock().expect("seen lock poisoned").push(value);
            None
        });
    }

    let schedule = ScheduleLoader::builder()
        .registry(registry)
        .build()
        .load_json_str(
            r#"{
                "name": "parameter",
                "threads": { "t": [ { "task": "first" }, { "task": "second" } ] }
            }"#,
        )
        .expect("parameter schedule should build");

    schedule
        .start(Some(Arc::new(String::from("shared payload"))))
        .expect("parameter schedule should start");
    schedule.wait_idle();
    schedule.stop();

    assert_eq!(
        *seen.lock().expect("seen lock poisoned"),
        vec!["shared payload", "shared payload"],
        "every task must receive the parameter supplied to start"
    );
}
