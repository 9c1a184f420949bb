//! Application supervisor lifecycle against a scripted dev server

use std::time::{Duration, Instant};

use sandbox_app::WaitOptions;
use sandbox_core::{AppOperation, AppStatus, Error, ProcessError};
use sandbox_process::test_utils::FakeDevServer;
use serde_json::Value;

use crate::{drain_messages, test_app_id, test_supervisor};

const READY_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_reload_targets_reported_app_id() {
    let dir = tempfile::tempdir().unwrap();
    let app_id = test_app_id();
    let (mut app, _rx) = test_supervisor(FakeDevServer::new(&app_id).script(), dir.path());

    app.start(WaitOptions::wait(READY_TIMEOUT)).await.unwrap();
    assert_eq!(app.app_id().as_deref(), Some(app_id.as_str()));

    app.reload(WaitOptions::wait(READY_TIMEOUT)).await.unwrap();
    let output = app.stop(WaitOptions::wait(READY_TIMEOUT)).await.unwrap();

    let expected = format!(r#""appId":"{}""#, app_id);
    assert!(
        output
            .stdout
            .iter()
            .any(|line| line.starts_with("recv:") && line.contains("app.restart") && line.contains(&expected)),
        "restart request not echoed: {:?}",
        output.stdout
    );
}

#[tokio::test]
async fn test_stop_escalates_when_app_ignores_it() {
    let dir = tempfile::tempdir().unwrap();
    let server = FakeDevServer::new(&test_app_id()).ignore_stop();
    let (mut app, _rx) = test_supervisor(server.script(), dir.path());
    app.start(WaitOptions::wait(READY_TIMEOUT)).await.unwrap();

    let started = Instant::now();
    let err = app
        .stop(WaitOptions::wait(Duration::from_millis(100)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::AppOperation {
            operation: AppOperation::Stop,
            source: ProcessError::Timeout { .. }
        }
    ));
    assert_eq!(err.status_code(), 504);
    assert_eq!(err.error_code(), "APP_TIMEOUT_ERROR");
    // 100ms wait + 500ms grace + reaping
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(app.status(), AppStatus::Stopped);
}

#[tokio::test]
async fn test_start_timeout_leaves_no_process_running() {
    let dir = tempfile::tempdir().unwrap();
    let server = FakeDevServer::new(&test_app_id()).never_ready();
    let (mut app, _rx) = test_supervisor(server.script(), dir.path());

    let err = app
        .start(WaitOptions::wait(Duration::from_millis(300)))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.timeout(), Some(Duration::from_millis(300)));
    assert_eq!(app.status(), AppStatus::Stopped);
    assert!(app.output().is_some_and(|output| output.finished));
}

#[tokio::test]
async fn test_operations_respect_app_state() {
    let dir = tempfile::tempdir().unwrap();
    let (mut app, _rx) = test_supervisor(FakeDevServer::new(&test_app_id()).script(), dir.path());
    assert_eq!(app.status(), AppStatus::Idle);

    let err = app.stop(WaitOptions::no_wait()).await.unwrap_err();
    assert_eq!(err.status_code(), 400);

    app.start(WaitOptions::wait(READY_TIMEOUT)).await.unwrap();
    let err = app.start(WaitOptions::no_wait()).await.unwrap_err();
    assert_eq!(err.error_code(), "APP_ALREADY_RUNNING");
    assert_eq!(app.status(), AppStatus::Running);

    app.stop(WaitOptions::wait(READY_TIMEOUT)).await.unwrap();
    let err = app.reload(WaitOptions::no_wait()).await.unwrap_err();
    assert_eq!(err.error_code(), "APP_NOT_RUNNING");
}

#[tokio::test]
async fn test_stderr_is_debounced_into_one_error() {
    let dir = tempfile::tempdir().unwrap();
    let server = FakeDevServer::new(&test_app_id())
        .stderr_line("first warning")
        .stderr_line("second warning");
    let (mut app, mut rx) = test_supervisor(server.script(), dir.path());

    app.start(WaitOptions::wait(READY_TIMEOUT)).await.unwrap();
    app.stop(WaitOptions::wait(READY_TIMEOUT)).await.unwrap();

    let messages = drain_messages(&mut rx);
    let errors: Vec<&Value> = messages
        .iter()
        .filter(|message| message["event"] == "app:error")
        .collect();
    let joined: Vec<&str> = errors
        .iter()
        .filter_map(|message| message["params"]["error"].as_str())
        .collect();
    assert_eq!(joined.join("\n"), "first warning\nsecond warning");

    let exit = messages.last().unwrap();
    assert_eq!(exit["event"], "app:exit");
    assert_eq!(exit["params"]["code"], 0);
}
