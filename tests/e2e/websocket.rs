//! App events reaching a WebSocket client end to end

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use sandbox_app::{AppConfig, ApplicationSupervisor, Broadcaster, WaitOptions};
use sandbox_process::test_utils::FakeDevServer;
use sandbox_server::transport::{WsServer, WELCOME_MESSAGE};
use serde_json::Value;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

use crate::{test_app_id, with_timeout};

#[tokio::test]
async fn test_client_follows_app_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let broadcaster = Arc::new(Broadcaster::default());
    let server = WsServer::bind("127.0.0.1:0", Arc::clone(&broadcaster))
        .await
        .unwrap();
    let address = server.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = server.spawn(shutdown_rx);

    let (mut client, _) = connect_async(format!("ws://{}", address)).await.unwrap();
    match client.next().await {
        Some(Ok(WsMessage::Text(text))) => assert_eq!(text.as_str(), WELCOME_MESSAGE),
        other => panic!("expected welcome, got {:?}", other),
    }
    with_timeout(2000, async {
        while broadcaster.subscriber_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let app_id = test_app_id();
    let config = AppConfig::new(Some(FakeDevServer::new(&app_id).script()), dir.path())
        .with_stop_grace(Duration::from_millis(500));
    let mut app = ApplicationSupervisor::new(config, Arc::clone(&broadcaster));
    app.start(WaitOptions::wait(Duration::from_secs(10)))
        .await
        .unwrap();
    app.stop(WaitOptions::wait(Duration::from_secs(10)))
        .await
        .unwrap();

    let mut events = Vec::new();
    let collected = with_timeout(5000, async {
        while let Some(Ok(frame)) = client.next().await {
            if let WsMessage::Text(text) = frame {
                let batch: Vec<Value> = serde_json::from_str(text.as_str()).unwrap();
                let done = batch.iter().any(|message| message["event"] == "app:exit");
                events.extend(batch);
                if done {
                    break;
                }
            }
        }
    })
    .await;
    assert!(collected.is_ok(), "app:exit never arrived: {:?}", events);

    let started = events
        .iter()
        .find(|message| message["params"]["event"] == "app.started")
        .expect("app.started should be forwarded");
    assert_eq!(started["event"], "app:info");
    assert_eq!(started["params"]["appId"], app_id.as_str());

    shutdown_tx.send(true).unwrap();
    server_task.await.unwrap();
}
