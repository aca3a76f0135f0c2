// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Scenario Playback Engine
//!
//! [`Playback`] is the deterministic state machine over
//! `idle -> playing <-> paused -> completed`. It owns the virtual clock and the
//! fired-step bookkeeping and is advanced only by explicit [`Playback::tick`]
//! calls, which makes it directly testable without a runtime.
//!
//! [`ScenarioPlayer`] wraps a `Playback` with one tokio interval task. Each
//! started timer captures the current epoch; `pause`/`reset`/a new `play` bump
//! the epoch under the playback lock, so a superseded timer's next tick is inert
//! even if it was already scheduled.
//!
//! Lock order: playback state, then the entity store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::entity_store::{EntityStore, SharedEntityStore};
use crate::domain::events::PlaybackEvent;
use crate::domain::message::{NewLogEntry, NewMessage};
use crate::domain::scenario::{PlaybackStatus, Scenario, ScenarioStep};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Error, PartialEq)]
pub enum PlaybackError {
    #[error("speed must be a positive finite multiplier, got {0}")]
    InvalidSpeed(f64),
}

/// Point-in-time view of the playback engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub status: PlaybackStatus,
    pub current_time: f64,
    pub duration: u64,
    pub speed: f64,
    pub scenario: Option<String>,
    pub fired_count: usize,
    pub step_count: usize,
}

impl PlaybackSnapshot {
    /// Fraction of the scenario elapsed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.duration == 0 {
            return 0.0;
        }
        (self.current_time / self.duration as f64).clamp(0.0, 1.0)
    }
}

pub struct Playback {
    scenario: Option<Scenario>,
    status: PlaybackStatus,
    current_time: f64,
    speed: f64,
    tick_interval_ms: u64,
    fired: Vec<bool>,
}

impl Playback {
    pub fn new(tick_interval_ms: u64, speed: f64) -> Self {
        Self {
            scenario: None,
            status: PlaybackStatus::Idle,
            current_time: 0.0,
            speed: if speed.is_finite() && speed > 0.0 { speed } else { 1.0 },
            tick_interval_ms: tick_interval_ms.max(1),
            fired: Vec::new(),
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    pub fn scenario(&self) -> Option<&Scenario> {
        self.scenario.as_ref()
    }

    pub fn fired_count(&self) -> usize {
        self.fired.iter().filter(|f| **f).count()
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            status: self.status,
            current_time: self.current_time,
            duration: self.scenario.as_ref().map(|s| s.duration).unwrap_or(0),
            speed: self.speed,
            scenario: self.scenario.as_ref().map(|s| s.name.clone()),
            fired_count: self.fired_count(),
            step_count: self.fired.len(),
        }
    }

    /// Install `scenario` at virtual time 0 and reset the store to its baseline.
    pub fn load(&mut self, scenario: Scenario, store: &mut EntityStore) -> Vec<PlaybackEvent> {
        let unreachable = scenario.unreachable_steps();
        if !unreachable.is_empty() {
            warn!(
                scenario = %scenario.name,
                steps = ?unreachable,
                "Scenario has steps past its duration; they will never fire"
            );
        }

        let event = PlaybackEvent::ScenarioLoaded {
            scenario: scenario.name.clone(),
            duration: scenario.duration,
            step_count: scenario.steps.len(),
            loaded_at: Utc::now(),
        };
        info!(scenario = %scenario.name, steps = scenario.steps.len(), "Scenario loaded");

        self.fired = vec![false; scenario.steps.len()];
        self.scenario = Some(scenario);
        self.status = PlaybackStatus::Idle;
        self.current_time = 0.0;
        store.reset_baseline();

        vec![event]
    }

    /// Enter `playing`. Returns the emitted events; an empty result from `idle`
    /// means nothing is loaded.
    ///
    /// From `paused` this is a resume; from `completed` it is a no-op.
    pub fn play(&mut self) -> Vec<PlaybackEvent> {
        let Some(scenario) = &self.scenario else {
            debug!("play() ignored: no scenario loaded");
            return Vec::new();
        };
        match self.status {
            PlaybackStatus::Idle => {
                self.status = PlaybackStatus::Playing;
                vec![PlaybackEvent::PlaybackStarted {
                    scenario: scenario.name.clone(),
                    speed: self.speed,
                    started_at: Utc::now(),
                }]
            }
            PlaybackStatus::Paused => self.resume(),
            PlaybackStatus::Playing | PlaybackStatus::Completed => Vec::new(),
        }
    }

    pub fn pause(&mut self) -> Vec<PlaybackEvent> {
        if self.status != PlaybackStatus::Playing {
            return Vec::new();
        }
        self.status = PlaybackStatus::Paused;
        vec![PlaybackEvent::PlaybackPaused {
            scenario: self.scenario_name(),
            virtual_time: self.current_time,
            paused_at: Utc::now(),
        }]
    }

    pub fn resume(&mut self) -> Vec<PlaybackEvent> {
        if self.status != PlaybackStatus::Paused {
            return Vec::new();
        }
        self.status = PlaybackStatus::Playing;
        vec![PlaybackEvent::PlaybackResumed {
            scenario: self.scenario_name(),
            virtual_time: self.current_time,
            resumed_at: Utc::now(),
        }]
    }

    /// Back to `idle` at time 0 with nothing fired; the store is reset too.
    /// Safe in every state, including before anything was loaded.
    pub fn reset(&mut self, store: &mut EntityStore) -> Vec<PlaybackEvent> {
        self.status = PlaybackStatus::Idle;
        self.current_time = 0.0;
        self.fired.iter_mut().for_each(|f| *f = false);
        store.reset_baseline();

        vec![PlaybackEvent::PlaybackReset {
            scenario: self.scenario.as_ref().map(|s| s.name.clone()),
            reset_at: Utc::now(),
        }]
    }

    /// Takes effect on the next tick.
    pub fn set_speed(&mut self, speed: f64) -> Result<Vec<PlaybackEvent>, PlaybackError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(PlaybackError::InvalidSpeed(speed));
        }
        self.speed = speed;
        Ok(vec![PlaybackEvent::SpeedChanged {
            speed,
            changed_at: Utc::now(),
        }])
    }

    /// Advance virtual time by one tick and dispatch every newly due step.
    ///
    /// Steps fire in array order, each at most once; completion clamps the clock
    /// to the scenario duration. Does nothing unless `playing`.
    pub fn tick(&mut self, store: &mut EntityStore) -> Vec<PlaybackEvent> {
        if self.status != PlaybackStatus::Playing {
            return Vec::new();
        }
        let Self {
            scenario,
            status,
            current_time,
            speed,
            tick_interval_ms,
            fired,
        } = self;
        let Some(scenario) = &*scenario else {
            return Vec::new();
        };

        *current_time += *tick_interval_ms as f64 * *speed;
        // Steps past the duration stay unfired even when the last tick overshoots.
        let due = current_time.min(scenario.duration as f64);
        let mut events = Vec::new();

        for (index, step) in scenario.steps.iter().enumerate() {
            if fired[index] || step.time() as f64 > due {
                continue;
            }
            dispatch(step, store);
            fired[index] = true;
            events.push(PlaybackEvent::StepFired {
                scenario: scenario.name.clone(),
                index,
                kind: step.kind().to_string(),
                step_time: step.time(),
                virtual_time: *current_time,
            });
        }

        if *current_time >= scenario.duration as f64 {
            *current_time = scenario.duration as f64;
            *status = PlaybackStatus::Completed;
            let fired_steps = fired.iter().filter(|f| **f).count();
            info!(scenario = %scenario.name, fired_steps, "Scenario playback completed");
            events.push(PlaybackEvent::PlaybackCompleted {
                scenario: scenario.name.clone(),
                fired_steps,
                completed_at: Utc::now(),
            });
        }

        events
    }

    fn scenario_name(&self) -> String {
        self.scenario
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }
}

fn dispatch(step: &ScenarioStep, store: &mut EntityStore) {
    match step {
        ScenarioStep::SetState { agent, state, .. } => {
            store.update_agent_state(agent, state);
        }
        ScenarioStep::SendMessage {
            from, to, message, ..
        } => {
            store.append_message(NewMessage {
                from: from.clone(),
                to: to.clone(),
                message_type: message.message_type.clone(),
                priority: message.priority.unwrap_or_default(),
                content: message.content.clone(),
            });
        }
        ScenarioStep::ConsoleLog {
            level,
            source,
            message,
            ..
        } => {
            store.append_log(NewLogEntry::new(
                level.unwrap_or_default(),
                source.as_deref(),
                message.clone(),
            ));
        }
    }
}

struct PlayerInner {
    playback: Mutex<Playback>,
    store: SharedEntityStore,
    event_bus: EventBus,
    epoch: AtomicU64,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl PlayerInner {
    fn publish(&self, events: Vec<PlaybackEvent>) {
        for event in events {
            self.event_bus.publish_playback_event(event);
        }
    }

    // Caller holds the playback lock.
    fn stop_timer(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }
}

/// Timer-driven playback. Owns at most one live tick task.
pub struct ScenarioPlayer {
    inner: Arc<PlayerInner>,
}

impl ScenarioPlayer {
    pub fn new(playback: Playback, store: SharedEntityStore, event_bus: EventBus) -> Self {
        Self {
            inner: Arc::new(PlayerInner {
                playback: Mutex::new(playback),
                store,
                event_bus,
                epoch: AtomicU64::new(0),
                timer: Mutex::new(None),
            }),
        }
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.inner.playback.lock().snapshot()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.inner.playback.lock().status()
    }

    pub fn has_live_timer(&self) -> bool {
        self.inner
            .timer
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    pub fn load(&self, scenario: Scenario) {
        let events = {
            let mut playback = self.inner.playback.lock();
            self.inner.stop_timer();
            let mut store = self.inner.store.lock();
            playback.load(scenario, &mut store)
        };
        self.inner.publish(events);
    }

    /// Must be called from within a tokio runtime.
    pub fn play(&self) {
        let events = {
            let mut playback = self.inner.playback.lock();
            let events = playback.play();
            if playback.status() == PlaybackStatus::Playing {
                self.start_timer(playback.tick_interval_ms());
            }
            events
        };
        self.inner.publish(events);
    }

    pub fn pause(&self) {
        let events = {
            let mut playback = self.inner.playback.lock();
            let events = playback.pause();
            if playback.status() != PlaybackStatus::Playing {
                self.inner.stop_timer();
            }
            events
        };
        self.inner.publish(events);
    }

    pub fn resume(&self) {
        let events = {
            let mut playback = self.inner.playback.lock();
            let events = playback.resume();
            if !events.is_empty() {
                self.start_timer(playback.tick_interval_ms());
            }
            events
        };
        self.inner.publish(events);
    }

    pub fn reset(&self) {
        let events = {
            let mut playback = self.inner.playback.lock();
            self.inner.stop_timer();
            let mut store = self.inner.store.lock();
            playback.reset(&mut store)
        };
        self.inner.publish(events);
    }

    pub fn set_speed(&self, speed: f64) -> Result<(), PlaybackError> {
        let events = self.inner.playback.lock().set_speed(speed)?;
        self.inner.publish(events);
        Ok(())
    }

    // Caller holds the playback lock, so the epoch cannot move under us.
    fn start_timer(&self, tick_interval_ms: u64) {
        self.inner.stop_timer();
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let period = Duration::from_millis(tick_interval_ms);

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;
                let (events, finished) = {
                    let mut playback = inner.playback.lock();
                    if inner.epoch.load(Ordering::SeqCst) != epoch {
                        debug!("Superseded playback timer exiting");
                        return;
                    }
                    let mut store = inner.store.lock();
                    let events = playback.tick(&mut store);
                    (events, playback.status() != PlaybackStatus::Playing)
                };
                inner.publish(events);
                if finished {
                    return;
                }
            }
        });

        *self.inner.timer.lock() = Some(handle);
    }
}

impl Drop for ScenarioPlayer {
    fn drop(&mut self) {
        let _playback = self.inner.playback.lock();
        self.inner.stop_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentStatus;
    use crate::domain::catalog::Catalog;
    use crate::domain::console_config::StoreConfig;

    fn store() -> EntityStore {
        EntityStore::new(Arc::new(Catalog::builtin().unwrap()), &StoreConfig::default())
    }

    fn scenario() -> Scenario {
        Scenario::from_yaml_str(
            r#"
name: tiny
duration: 1000
steps:
  - { time: 0, action: console-log, message: start }
  - { time: 500, action: set-state, agent: analyzer, state: { status: active } }
  - { time: 300, action: console-log, level: warning, message: late-in-array }
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_play_without_scenario_is_noop() {
        let mut playback = Playback::new(100, 1.0);
        assert!(playback.play().is_empty());
        assert_eq!(playback.status(), PlaybackStatus::Idle);

        let mut store = store();
        assert!(playback.tick(&mut store).is_empty());
        assert_eq!(playback.current_time(), 0.0);
    }

    #[test]
    fn test_pause_and_reset_before_play_are_safe() {
        let mut playback = Playback::new(100, 1.0);
        let mut store = store();
        assert!(playback.pause().is_empty());
        assert!(playback.resume().is_empty());
        playback.reset(&mut store);
        assert_eq!(playback.status(), PlaybackStatus::Idle);
    }

    #[test]
    fn test_array_order_wins_over_time_order() {
        let mut playback = Playback::new(600, 1.0);
        let mut store = store();
        playback.load(scenario(), &mut store);
        playback.play();

        let events = playback.tick(&mut store);
        let fired: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::StepFired { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(fired, vec![0, 1, 2]);

        let logs: Vec<_> = store.logs().map(|l| l.message.clone()).collect();
        assert_eq!(logs, vec!["start", "late-in-array"]);
        assert_eq!(store.get_agent("analyzer").unwrap().status(), AgentStatus::Active);
    }

    #[test]
    fn test_completion_clamps_and_stops() {
        let mut playback = Playback::new(700, 1.0);
        let mut store = store();
        playback.load(scenario(), &mut store);
        playback.play();
        playback.tick(&mut store);
        let events = playback.tick(&mut store);

        assert!(matches!(events.last(), Some(PlaybackEvent::PlaybackCompleted { fired_steps: 3, .. })));
        assert_eq!(playback.status(), PlaybackStatus::Completed);
        assert_eq!(playback.current_time(), 1000.0);

        assert!(playback.play().is_empty());
        assert!(playback.tick(&mut store).is_empty());
    }

    #[test]
    fn test_speed_scales_ticks() {
        let mut playback = Playback::new(100, 1.0);
        let mut store = store();
        playback.load(scenario(), &mut store);
        playback.set_speed(2.5).unwrap();
        playback.play();
        playback.tick(&mut store);
        assert_eq!(playback.current_time(), 250.0);

        assert_eq!(
            playback.set_speed(0.0).unwrap_err(),
            PlaybackError::InvalidSpeed(0.0)
        );
        assert!(playback.set_speed(f64::INFINITY).is_err());
        assert_eq!(playback.speed(), 2.5);
    }

    #[test]
    fn test_play_from_paused_resumes() {
        let mut playback = Playback::new(100, 1.0);
        let mut store = store();
        playback.load(scenario(), &mut store);
        playback.play();
        playback.tick(&mut store);
        playback.pause();

        let events = playback.play();
        assert!(matches!(events[0], PlaybackEvent::PlaybackResumed { .. }));
        assert_eq!(playback.status(), PlaybackStatus::Playing);
        assert_eq!(playback.current_time(), 100.0);
    }

    #[test]
    fn test_snapshot_progress() {
        let mut playback = Playback::new(250, 1.0);
        let mut store = store();
        playback.load(scenario(), &mut store);
        playback.play();
        playback.tick(&mut store);

        let snapshot = playback.snapshot();
        assert_eq!(snapshot.scenario.as_deref(), Some("tiny"));
        assert_eq!(snapshot.step_count, 3);
        assert_eq!(snapshot.fired_count, 1);
        assert_eq!(snapshot.progress(), 0.25);
    }
}
