// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the Studio sync channel over a loopback WebSocket
//!
//! A local `tokio_tungstenite` server plays the Studio side of the protocol.

use std::sync::Arc;
use std::time::Duration;

use aether_core::application::entity_store::{EntityStore, SharedEntityStore};
use aether_core::application::patch_engine::PatchEngine;
use aether_core::domain::agent::AgentStatus;
use aether_core::domain::catalog::Catalog;
use aether_core::domain::console_config::{StoreConfig, SyncConfig};
use aether_core::domain::message::LogLevel;
use aether_core::infrastructure::event_bus::EventBus;
use aether_core::infrastructure::sync_channel::{ConnectionStatus, SyncChannel};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    channel: SyncChannel,
    patches: Arc<PatchEngine>,
    store: SharedEntityStore,
    catalog: Arc<Catalog>,
}

fn harness(url: String, auto_sync: bool) -> Harness {
    let catalog = Arc::new(Catalog::builtin().unwrap());
    let store = EntityStore::new(catalog.clone(), &StoreConfig::default()).into_shared();
    let event_bus = EventBus::new(256);
    let patches = Arc::new(PatchEngine::new(store.clone(), event_bus.clone()));
    let config = SyncConfig {
        studio_url: url,
        auto_sync,
        reconnect_delay_ms: 50,
    };
    let channel = SyncChannel::new(&config, store.clone(), patches.clone(), event_bus);
    Harness {
        channel,
        patches,
        store,
        catalog,
    }
}

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/api/ws", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (tcp, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("no client connected")
        .unwrap();
    tokio_tungstenite::accept_async(tcp).await.unwrap()
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("no frame received")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Connect the channel and return the server side after the opening SYNC_REQUEST.
async fn connected(h: &Harness, listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let channel = h.channel.clone();
    let client = tokio::spawn(async move { channel.connect().await });
    let mut ws = accept(listener).await;
    client.await.unwrap().unwrap();

    assert_eq!(next_json(&mut ws).await, json!({"type": "SYNC_REQUEST"}));
    ws
}

#[tokio::test]
async fn test_connect_sends_sync_request() {
    let (listener, url) = listener().await;
    let h = harness(url, false);
    let _ws = connected(&h, &listener).await;

    let state = h.channel.state();
    assert_eq!(state.status, ConnectionStatus::Connected);
    assert_eq!(state.last_error, None);

    let log = h.store.lock().recent_logs(1)[0].clone();
    assert_eq!(log.level, LogLevel::Success);
    assert_eq!(log.message, "Connected to Spec-Flow Studio");
}

#[tokio::test]
async fn test_patch_created_is_applied_as_remote() {
    let (listener, url) = listener().await;
    let h = harness(url, false);
    let mut ws = connected(&h, &listener).await;

    send_json(
        &mut ws,
        json!({
            "type": "PATCH_CREATED",
            "patch": {
                "id": "studio-42",
                "name": "Wake planner",
                "diffs": [{
                    "agentName": "planner",
                    "operation": "modify",
                    "path": "state.status",
                    "before": "offline",
                    "after": "active",
                    "impact": "high"
                }]
            }
        }),
    )
    .await;

    eventually("remote patch", || h.patches.is_applied("studio-42")).await;
    assert_eq!(
        h.store.lock().get_agent("planner").unwrap().status(),
        AgentStatus::Active
    );

    let messages: Vec<_> = h.store.lock().logs().map(|l| l.message.clone()).collect();
    assert!(messages.contains(&"Event received: PATCH_CREATED".to_string()));
    assert!(messages.contains(&"Patch received from Studio: Wake planner".to_string()));
}

#[tokio::test]
async fn test_sync_response_stamps_last_sync_time() {
    let (listener, url) = listener().await;
    let h = harness(url, false);
    let mut ws = connected(&h, &listener).await;
    assert!(h.channel.state().last_sync_time.is_none());

    send_json(&mut ws, json!({"type": "SYNC_RESPONSE", "agents": [], "patches": []})).await;
    eventually("sync time", || h.channel.state().last_sync_time.is_some()).await;
}

#[tokio::test]
async fn test_forwarder_reports_local_patches() {
    let (listener, url) = listener().await;
    let h = harness(url, false);
    let _forwarder = h.channel.spawn_forwarder();
    let mut ws = connected(&h, &listener).await;

    assert!(h.patches.apply(h.catalog.patch("patch-003").unwrap()));
    let applied = next_json(&mut ws).await;
    assert_eq!(applied["type"], "PATCH_APPLIED");
    assert_eq!(applied["patch"]["id"], "patch-003");
    assert_eq!(applied["patch"]["diffs"][0]["after"], "active");
    assert!(applied["patch"]["appliedAt"].is_string());

    assert!(h.patches.revert("patch-003"));
    assert_eq!(
        next_json(&mut ws).await,
        json!({"type": "PATCH_REVERTED", "patchId": "patch-003"})
    );
}

#[tokio::test]
async fn test_send_requires_connection() {
    let (_listener, url) = listener().await;
    let h = harness(url, false);
    assert!(h.channel.request_sync().is_err());
}

#[tokio::test]
async fn test_unexpected_close_reconnects_once() {
    let (listener, url) = listener().await;
    let h = harness(url, true);
    let mut ws = connected(&h, &listener).await;

    ws.close(None).await.unwrap();

    // Reconnect arrives on its own and opens with a fresh SYNC_REQUEST.
    let mut second = accept(&listener).await;
    assert_eq!(next_json(&mut second).await, json!({"type": "SYNC_REQUEST"}));
    eventually("reconnected", || {
        h.channel.state().status == ConnectionStatus::Connected
    })
    .await;

    let warned = h
        .store
        .lock()
        .logs()
        .any(|l| l.level == LogLevel::Warning && l.message.starts_with("Connection closed"));
    assert!(warned);

    // Studio goes away for good: one more attempt fails and nothing retries.
    drop(listener);
    second.close(None).await.unwrap();
    eventually("failed reconnect", || {
        h.channel.state().status == ConnectionStatus::Error && !h.channel.has_pending_reconnect()
    })
    .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.channel.state().status, ConnectionStatus::Error);
    assert!(!h.channel.has_pending_reconnect());
}

#[tokio::test]
async fn test_explicit_disconnect_never_retries() {
    let (listener, url) = listener().await;
    let h = harness(url, true);
    let mut ws = connected(&h, &listener).await;

    h.channel.disconnect();
    assert_eq!(h.channel.state().status, ConnectionStatus::Disconnected);

    // The server observes the close, then no new connection shows up.
    loop {
        match tokio::time::timeout(WAIT, ws.next()).await.unwrap() {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
            Some(Ok(_)) => {}
        }
    }
    let retry = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
    assert!(retry.is_err(), "client reconnected after explicit disconnect");
    assert!(!h.channel.has_pending_reconnect());
    assert_eq!(h.channel.state().status, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_failed_connect_does_not_retry() {
    let (listener, url) = listener().await;
    drop(listener);
    let h = harness(url, true);

    assert!(h.channel.connect().await.is_err());

    let state = h.channel.state();
    assert_eq!(state.status, ConnectionStatus::Error);
    assert!(state.last_error.is_some());
    assert!(!h.channel.has_pending_reconnect());

    let log = h.store.lock().recent_logs(1)[0].clone();
    assert_eq!(log.level, LogLevel::Error);
    assert_eq!(log.message, "Connection error");
}
