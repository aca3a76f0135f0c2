// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Remote Sync Channel - WebSocket link to the external spec editor (Studio)
//!
//! Inbound frames are logged to the entity store and dispatched: a created patch
//! goes straight to [`PatchEngine::apply_from_remote`], a sync response stamps
//! `last_sync_time`, everything else is re-published on the event bus. Local
//! patch applications and reverts are forwarded while connected.
//!
//! Reconnect policy: an unexpected close schedules exactly one reconnect after
//! `reconnect_delay` when auto-sync is on. A failed handshake does not retry and
//! an explicit [`SyncChannel::disconnect`] cancels any pending reconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::application::entity_store::SharedEntityStore;
use crate::application::patch_engine::PatchEngine;
use crate::domain::console_config::SyncConfig;
use crate::domain::events::{PatchEvent, SyncEvent};
use crate::domain::message::NewLogEntry;
use crate::domain::spec_diff::PatchOrigin;
use crate::domain::sync::{InboundSyncEvent, OutboundSyncEvent, RemotePatch};
use crate::infrastructure::event_bus::{DomainEvent, EventBus, EventBusError};

const LOG_SOURCE: &str = "Studio";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub studio_url: String,
    pub auto_sync: bool,
    pub last_error: Option<String>,
    pub last_sync_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Not connected to Studio")]
    NotConnected,

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Failed to encode sync event: {0}")]
    Serialization(#[from] serde_json::Error),
}

struct SyncInner {
    state: Mutex<ConnectionState>,
    store: SharedEntityStore,
    patches: Arc<PatchEngine>,
    event_bus: EventBus,
    reconnect_delay: Duration,
    outbound: Mutex<Option<mpsc::UnboundedSender<OutboundSyncEvent>>>,
    reconnect: Mutex<Option<JoinHandle<()>>>,
    // Bumped by every explicit disconnect; sessions from an older generation
    // never schedule a reconnect.
    generation: AtomicU64,
}

impl SyncInner {
    fn log(&self, entry: NewLogEntry) {
        self.store.lock().append_log(entry);
    }

    fn send(&self, event: OutboundSyncEvent) -> Result<(), SyncError> {
        let outbound = self.outbound.lock();
        let sender = outbound.as_ref().ok_or(SyncError::NotConnected)?;
        sender.send(event).map_err(|_| SyncError::NotConnected)
    }

    fn handle_event(&self, event: InboundSyncEvent) {
        self.log(NewLogEntry::info(
            LOG_SOURCE,
            format!("Event received: {}", event.type_name()),
        ));

        match event {
            InboundSyncEvent::SpecUpdated { agents } => {
                debug!(agents = agents.len(), "Spec updated by Studio");
                self.event_bus.publish_sync_event(SyncEvent::SpecUpdated {
                    agents,
                    received_at: Utc::now(),
                });
            }
            InboundSyncEvent::PatchCreated { patch } => {
                self.patches.apply_from_remote(patch.into_predefined());
            }
            InboundSyncEvent::ScenarioCreated { scenario } => {
                self.event_bus.publish_sync_event(SyncEvent::ScenarioReceived {
                    scenario,
                    received_at: Utc::now(),
                });
            }
            InboundSyncEvent::SyncResponse { .. } => {
                let synced_at = Utc::now();
                self.state.lock().last_sync_time = Some(synced_at);
                self.event_bus
                    .publish_sync_event(SyncEvent::SyncCompleted { synced_at });
            }
        }
    }
}

/// Owned connection to the Studio editor. Cheap to clone.
#[derive(Clone)]
pub struct SyncChannel {
    inner: Arc<SyncInner>,
}

impl SyncChannel {
    pub fn new(
        config: &SyncConfig,
        store: SharedEntityStore,
        patches: Arc<PatchEngine>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                state: Mutex::new(ConnectionState {
                    status: ConnectionStatus::Disconnected,
                    studio_url: config.studio_url.clone(),
                    auto_sync: config.auto_sync,
                    last_error: None,
                    last_sync_time: None,
                }),
                store,
                patches,
                event_bus,
                reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
                outbound: Mutex::new(None),
                reconnect: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().clone()
    }

    pub fn set_studio_url(&self, url: impl Into<String>) {
        self.inner.state.lock().studio_url = url.into();
    }

    pub fn set_auto_sync(&self, enabled: bool) {
        self.inner.state.lock().auto_sync = enabled;
    }

    /// Open the socket and start the session. No-op while connecting or connected.
    pub async fn connect(&self) -> Result<(), SyncError> {
        connect_session(Arc::clone(&self.inner)).await
    }

    /// Close the socket and cancel any pending reconnect. Never retries.
    pub fn disconnect(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.inner.reconnect.lock().take() {
            handle.abort();
        }
        let was_open = self.inner.outbound.lock().take().is_some();

        let mut state = self.inner.state.lock();
        state.status = ConnectionStatus::Disconnected;
        drop(state);

        if was_open {
            info!("Disconnected from Studio");
            self.inner.event_bus.publish_sync_event(SyncEvent::Disconnected {
                reason: "disconnected by user".to_string(),
                disconnected_at: Utc::now(),
            });
        }
    }

    pub fn send(&self, event: OutboundSyncEvent) -> Result<(), SyncError> {
        self.inner.send(event)
    }

    pub fn request_sync(&self) -> Result<(), SyncError> {
        self.send(OutboundSyncEvent::SyncRequest)
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.inner
            .reconnect
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Forward local patch applications and reverts to Studio while connected.
    ///
    /// Subscribes before returning, so patches applied after this call are seen.
    pub fn spawn_forwarder(&self) -> JoinHandle<()> {
        let mut receiver = self.inner.event_bus.subscribe();
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            loop {
                let event = match receiver.recv().await {
                    Ok(event) => event,
                    Err(EventBusError::Lagged(_)) => continue,
                    Err(_) => return,
                };
                let outbound = match event {
                    DomainEvent::Patch(PatchEvent::PatchApplied {
                        patch_id,
                        origin: PatchOrigin::Local,
                        applied_at,
                        ..
                    }) => inner.patches.applied_record(&patch_id).map(|record| {
                        OutboundSyncEvent::PatchApplied {
                            patch: RemotePatch::from_applied(&record.patch, applied_at),
                        }
                    }),
                    DomainEvent::Patch(PatchEvent::PatchReverted {
                        patch_id,
                        origin: PatchOrigin::Local,
                        ..
                    }) => Some(OutboundSyncEvent::PatchReverted { patch_id }),
                    _ => None,
                };

                if let Some(outbound) = outbound {
                    if let Err(e) = inner.send(outbound) {
                        debug!("Patch notification not forwarded: {}", e);
                    }
                }
            }
        })
    }
}

fn connect_session(inner: Arc<SyncInner>) -> BoxFuture<'static, Result<(), SyncError>> {
    async move {
        let (url, generation) = {
            let mut state = inner.state.lock();
            if matches!(
                state.status,
                ConnectionStatus::Connecting | ConnectionStatus::Connected
            ) {
                debug!("Already connected or connecting");
                return Ok(());
            }
            state.status = ConnectionStatus::Connecting;
            state.last_error = None;
            (state.studio_url.clone(), inner.generation.load(Ordering::SeqCst))
        };

        info!(url = %url, "Connecting to Studio");
        let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                let message = e.to_string();
                {
                    let mut state = inner.state.lock();
                    state.status = ConnectionStatus::Error;
                    state.last_error = Some(message.clone());
                }
                warn!(url = %url, "Studio connection failed: {}", message);
                inner.log(NewLogEntry::error(LOG_SOURCE, "Connection error"));
                return Err(SyncError::WebSocket(message));
            }
        };

        if inner.generation.load(Ordering::SeqCst) != generation {
            debug!("Disconnected during handshake; dropping new socket");
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *inner.outbound.lock() = Some(tx);
        inner.state.lock().status = ConnectionStatus::Connected;

        inner.log(NewLogEntry::success(LOG_SOURCE, "Connected to Spec-Flow Studio"));
        inner.event_bus.publish_sync_event(SyncEvent::Connected {
            studio_url: url,
            connected_at: Utc::now(),
        });
        inner.send(OutboundSyncEvent::SyncRequest)?;

        tokio::spawn(run_session(Arc::clone(&inner), stream, rx, generation));
        Ok(())
    }
    .boxed()
}

async fn run_session<S>(
    inner: Arc<SyncInner>,
    stream: tokio_tungstenite::WebSocketStream<S>,
    mut outbound: mpsc::UnboundedReceiver<OutboundSyncEvent>,
    generation: u64,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, mut read) = stream.split();
    let mut close_code: Option<u16> = None;

    loop {
        tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else {
                    // Sender dropped by disconnect()
                    let _ = write.send(Message::Close(None)).await;
                    return;
                };
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            warn!("Failed to send sync event: {}", e);
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to encode sync event: {}", e),
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<InboundSyncEvent>(&text) {
                            Ok(event) => inner.handle_event(event),
                            Err(e) => warn!("Failed to parse Studio message: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        close_code = frame.map(|f| u16::from(f.code));
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Studio socket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    on_unexpected_close(&inner, generation, close_code);
}

fn on_unexpected_close(inner: &Arc<SyncInner>, generation: u64, close_code: Option<u16>) {
    if inner.generation.load(Ordering::SeqCst) != generation {
        return;
    }

    *inner.outbound.lock() = None;
    let auto_sync = {
        let mut state = inner.state.lock();
        state.status = ConnectionStatus::Disconnected;
        state.auto_sync
    };

    let code = close_code.map_or_else(|| "none".to_string(), |c| c.to_string());
    warn!(code = %code, "Studio connection closed");
    inner.log(NewLogEntry::warning(
        LOG_SOURCE,
        format!("Connection closed (code: {})", code),
    ));
    inner.event_bus.publish_sync_event(SyncEvent::Disconnected {
        reason: format!("connection closed (code: {})", code),
        disconnected_at: Utc::now(),
    });

    if !auto_sync {
        return;
    }

    let mut slot = inner.reconnect.lock();
    if slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
        return;
    }
    let delay = inner.reconnect_delay;
    let task_inner = Arc::clone(inner);
    info!(delay_ms = delay.as_millis() as u64, "Scheduling Studio reconnect");
    *slot = Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if task_inner.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        if let Err(e) = connect_session(Arc::clone(&task_inner)).await {
            debug!("Reconnect attempt failed: {}", e);
        }
    }));
}
