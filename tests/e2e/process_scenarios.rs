//! Process supervision scenarios against real shell commands

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sandbox_core::{ProcessError, ProcessStatus};
use sandbox_process::{ProcessSupervisor, SpawnOptions};

use crate::with_timeout;

#[tokio::test]
async fn test_output_is_split_per_stream() {
    let dir = tempfile::tempdir().unwrap();
    let process = ProcessSupervisor::new()
        .spawn(SpawnOptions::new(
            "echo hi && sleep 1 && echo bye 1>&2",
            dir.path(),
        ))
        .unwrap();

    let status = process.wait(None).await.unwrap();

    assert_eq!(status, ProcessStatus::Finished { code: 0 });
    assert_eq!(process.accumulated_stdout(), "hi");
    assert_eq!(process.accumulated_stderr(), "bye");
    assert_eq!(process.exit_code(), Some(0));
    assert!(!process.running());
}

#[tokio::test]
async fn test_wait_timeout_kills_process() {
    let dir = tempfile::tempdir().unwrap();
    let process = ProcessSupervisor::new()
        .spawn(SpawnOptions::new("sleep 5", dir.path()))
        .unwrap();

    let result = process.wait(Some(Duration::from_millis(2000))).await;
    assert_eq!(
        result,
        Err(ProcessError::Timeout {
            timeout: Duration::from_millis(2000)
        })
    );

    let status = with_timeout(2000, process.wait(None))
        .await
        .expect("process should be gone shortly after the timeout");
    assert!(matches!(status, Ok(ProcessStatus::Killed { .. })));
    assert!(!process.running());
}

#[tokio::test]
async fn test_callbacks_see_every_chunk_once() {
    let dir = tempfile::tempdir().unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);

    let process = ProcessSupervisor::new()
        .spawn(
            SpawnOptions::new("for i in 1 2 3 4 5; do echo line-$i; done", dir.path())
                .on_stdout(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .unwrap();
    process.wait(None).await.unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 5);
    assert_eq!(
        process.snapshot().stdout,
        vec!["line-1", "line-2", "line-3", "line-4", "line-5"]
    );
}

#[tokio::test]
async fn test_wait_for_event_settles_once() {
    let dir = tempfile::tempdir().unwrap();
    let process = ProcessSupervisor::new()
        .spawn(SpawnOptions::new(
            "echo boot; sleep 0.2; echo ready; sleep 5",
            dir.path(),
        ))
        .unwrap();

    let line = process
        .wait_for_event(|line: &str| line == "ready", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(line, "ready");

    let missing = process
        .wait_for_event(|line: &str| line == "never", Duration::from_millis(200))
        .await;
    assert!(matches!(missing, Err(ProcessError::Timeout { .. })));
    assert!(process.running());

    process.terminate(Duration::from_secs(1)).await;
    assert!(!process.running());
}
