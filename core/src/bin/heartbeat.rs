use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskloom::prelude::*;
use tracing_subscriber::EnvFilter;

/// A repeating two-thread schedule: the sensor thread takes a reading every
/// iteration, the reporter thread prints it only once a fresh reading exists.
/// After a short while the program pauses the schedule and lets the workers
/// finish their iteration naturally.
const HEARTBEAT: &str = r#"{
    "name": "heartbeat",
    "repeat": true,
    "threads": {
        "sensor":   [ { "task": "read_sensor" } ],
        "reporter": [ { "task": "report", "wait": "sensor:read_sensor" } ]
    }
}"#;

fn main() -> Result<(), TaskLoomErrors> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    taskloom::init();

    let reading = Arc::new(Mutex::new(0u64));
    let beats = Arc::new(AtomicUsize::new(0));

    {
        let reading = reading.clone();
        register_task("read_sensor", move |_| {
            let mut reading = reading.lock().expect("reading lock poisoned");
            *reading = reading.wrapping_add(7) % 100;
            std::thread::sleep(Duration::from_millis(50));
            None
        });
    }
    {
        let reading = reading.clone();
        let beats = beats.clone();
        register_task("report", move |_| {
            let value = *reading.lock().expect("reading lock poisoned");
            let beat = beats.fetch_add(1, Ordering::SeqCst) + 1;
            println!("beat {beat}: sensor reads {value}");
            None
        });
    }

    let schedule = Schedule::from_json_str(HEARTBEAT)?;
    schedule.start(None)?;

    std::thread::sleep(Duration::from_millis(400));
    schedule.pause();
    schedule.wait_idle();
    schedule.stop();

    println!("paused after {} beat(s)", beats.load(Ordering::SeqCst));

    taskloom::quit();
    Ok(())
}
