use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskloom::prelude::*;
use tracing_subscriber::EnvFilter;

/// The open-mic schedule: three tellers deliver their jokes on their own threads
/// while the listeners thread laughs at each punchline only once it has landed.
const OPEN_MIC: &str = r#"{
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
}"#;

fn tell(comedian: &str, joke: &str) {
    println!("{comedian}: {joke}");
    std::io::stdout().flush().ok();
    std::thread::sleep(Duration::from_millis(150));
}

fn main() -> Result<(), TaskLoomErrors> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    taskloom::init();

    register_task("alice_joke", |_| {
        tell("Alice", "Why do programmers prefer dark mode? Light attracts bugs.");
        None
    });
    register_task("bob_joke", |_| {
        tell("Bob", "I would tell you a UDP joke, but you might not get it.");
        None
    });
    register_task("charlie_joke", |_| {
        tell("Charlie", "There are two hard problems: cache invalidation and off-by-one errors.");
        None
    });
    register_task("laugh_at_alice", |_| {
        println!("Listeners: ha! (at Alice)");
        None
    });
    register_task("laugh_at_bob", |_| {
        println!("Listeners: ha! (at Bob)");
        None
    });
    register_task("laugh_at_charlie", |_| {
        println!("Listeners: ha! (at Charlie)");
        None
    });

    let schedule = Schedule::from_json_str(OPEN_MIC)?;
    schedule.start(None)?;
    schedule.wait_idle();
    schedule.stop();

    // The same laughter, dispatched as loose jobs instead of a schedule.
    let applause = Arc::new(Mutex::new(0u32));
    let pool = ThreadPool::construct(4)?;
    for _ in 0..8 {
        let applause = applause.clone();
        pool.execute(
            move |_| {
                *applause.lock().expect("applause lock poisoned") += 1;
                None
            },
            None,
        )?;
    }
    pool.wait_idle();
    println!("applause count: {}", applause.lock().expect("applause lock poisoned"));

    taskloom::quit();
    Ok(())
}
