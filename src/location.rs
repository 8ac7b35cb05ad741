// src/location.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::config::TrackerConfig;
use crate::error::LocationError;
use crate::geo::{round_coordinate, Coordinate};

/// Identifies one registered platform watch.
pub type WatchId = u64;

/// Failure codes a platform location service reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationErrorCode {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

/// One position report from the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub coordinate: Coordinate,
    pub timestamp: DateTime<Utc>,
}

impl PositionFix {
    pub fn new(coordinate: Coordinate, timestamp: DateTime<Utc>) -> Self {
        PositionFix {
            coordinate,
            timestamp,
        }
    }

    /// A fix stamped with the current time.
    pub fn now(coordinate: Coordinate) -> Self {
        PositionFix::new(coordinate, Utc::now())
    }
}

/// Options handed to the platform when a watch is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub enable_high_accuracy: bool,
    pub maximum_age: Duration,
    pub timeout: Duration,
}

pub type FixCallback = Arc<dyn Fn(PositionFix) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(LocationErrorCode) + Send + Sync>;

/// A continuous position capability, such as a device geolocation service.
///
/// Implementations must not invoke callbacks of a watch after `clear_watch` for it has
/// returned. They may invoke callbacks from any thread, including synchronously from
/// inside `watch`.
pub trait LocationSource: Send + Sync {
    /// Whether the platform has a location capability at all.
    fn is_supported(&self) -> bool;

    fn watch(&self, on_fix: FixCallback, on_error: ErrorCallback, options: &WatchOptions)
        -> WatchId;

    fn clear_watch(&self, id: WatchId);
}

impl<S: LocationSource> LocationSource for Arc<S> {
    fn is_supported(&self) -> bool {
        (**self).is_supported()
    }

    fn watch(
        &self,
        on_fix: FixCallback,
        on_error: ErrorCallback,
        options: &WatchOptions,
    ) -> WatchId {
        (**self).watch(on_fix, on_error, options)
    }

    fn clear_watch(&self, id: WatchId) {
        (**self).clear_watch(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationStatus {
    #[default]
    Idle,
    Requesting,
    Granted,
    Denied,
    Error,
    Unsupported,
}

/// Everything the tracker exposes at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocationSnapshot {
    pub status: LocationStatus,
    /// Exact device position. For local distance computation only; never send it anywhere.
    pub exact: Option<Coordinate>,
    /// Privacy-rounded position, safe to persist or transmit.
    pub approx: Option<Coordinate>,
    pub last_fix_at: Option<DateTime<Utc>>,
    pub last_error: Option<LocationError>,
}

struct TrackerState {
    snapshot: LocationSnapshot,
    watch_id: Option<WatchId>,
    // Bumped by start() and stop(); callbacks carry the value they were registered under.
    generation: u64,
    // Cleared by a terminal error so later callbacks of the same watch are ignored.
    accepting: bool,
}

struct Shared {
    state: Mutex<TrackerState>,
    updates: watch::Sender<LocationSnapshot>,
    approx_decimals: u32,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, snapshot: LocationSnapshot) {
        self.updates.send_replace(snapshot);
    }

    fn apply_fix(&self, generation: u64, fix: PositionFix) {
        let mut state = self.lock();
        if state.generation != generation || !state.accepting {
            return;
        }
        if state.snapshot.status == LocationStatus::Requesting {
            log::debug!("Location granted, first fix at {}", fix.timestamp);
        }
        state.snapshot = LocationSnapshot {
            status: LocationStatus::Granted,
            exact: Some(fix.coordinate),
            approx: Some(round_coordinate(fix.coordinate, self.approx_decimals)),
            last_fix_at: Some(fix.timestamp),
            last_error: None,
        };
        self.publish(state.snapshot);
    }

    fn apply_error(&self, generation: u64, code: LocationErrorCode) {
        let mut state = self.lock();
        if state.generation != generation || !state.accepting {
            return;
        }
        let error = LocationError::from(code);
        let status = match error {
            LocationError::PermissionDenied => LocationStatus::Denied,
            _ => LocationStatus::Error,
        };
        log::warn!(
            "Location watch failed while {:?}: {}",
            state.snapshot.status,
            error
        );
        state.accepting = false;
        state.snapshot = LocationSnapshot {
            status,
            last_error: Some(error),
            ..LocationSnapshot::default()
        };
        self.publish(state.snapshot);
    }
}

/// Observes the device position while started and exposes exact and privacy-rounded
/// coordinates together with a [`LocationStatus`].
///
/// At most one platform watch is registered per tracker. It is released by [`stop`](Self::stop)
/// and when the tracker is dropped.
///
/// ```rust
/// use member_pins::location::{DeviceLocationTracker, LocationStatus, ManualLocationSource, PositionFix};
/// use member_pins::{Coordinate, TrackerConfig};
/// use std::sync::Arc;
///
/// let source = Arc::new(ManualLocationSource::new());
/// let tracker = DeviceLocationTracker::new(source.clone(), TrackerConfig::default());
///
/// tracker.start();
/// source.push_fix(PositionFix::now(Coordinate::new(-13.26871234, -39.66441234)));
///
/// assert_eq!(tracker.status(), LocationStatus::Granted);
/// assert_eq!(tracker.approx(), Some(Coordinate::new(-13.27, -39.66)));
/// ```
pub struct DeviceLocationTracker<S: LocationSource> {
    source: S,
    shared: Arc<Shared>,
    config: TrackerConfig,
}

impl<S: LocationSource> DeviceLocationTracker<S> {
    pub fn new(source: S, config: TrackerConfig) -> Self {
        let (updates, _) = watch::channel(LocationSnapshot::default());
        DeviceLocationTracker {
            source,
            shared: Arc::new(Shared {
                state: Mutex::new(TrackerState {
                    snapshot: LocationSnapshot::default(),
                    watch_id: None,
                    generation: 0,
                    accepting: false,
                }),
                updates,
                approx_decimals: config.approx_decimals,
            }),
            config,
        }
    }

    /// Begins observing the device position.
    ///
    /// A no-op while `Requesting` or `Granted`, and forever after `Unsupported`. From `Idle`,
    /// `Denied` or `Error` it makes a fresh attempt with a new platform watch.
    /// Returns the status after the call.
    pub fn start(&self) -> LocationStatus {
        let (generation, stale_watch) = {
            let mut state = self.shared.lock();
            match state.snapshot.status {
                LocationStatus::Requesting
                | LocationStatus::Granted
                | LocationStatus::Unsupported => return state.snapshot.status,
                LocationStatus::Idle | LocationStatus::Denied | LocationStatus::Error => {}
            }

            if !self.source.is_supported() {
                log::warn!("Location capability unsupported; tracker stays inert");
                state.snapshot = LocationSnapshot {
                    status: LocationStatus::Unsupported,
                    last_error: Some(LocationError::Unsupported),
                    ..LocationSnapshot::default()
                };
                self.shared.publish(state.snapshot);
                return LocationStatus::Unsupported;
            }

            state.generation += 1;
            state.accepting = true;
            state.snapshot = LocationSnapshot {
                status: LocationStatus::Requesting,
                ..LocationSnapshot::default()
            };
            self.shared.publish(state.snapshot);
            (state.generation, state.watch_id.take())
        };

        // A watch left over from a denied or failed attempt.
        if let Some(id) = stale_watch {
            self.source.clear_watch(id);
        }

        let on_fix: FixCallback = {
            let shared = Arc::downgrade(&self.shared);
            Arc::new(move |fix: PositionFix| {
                if let Some(shared) = Weak::upgrade(&shared) {
                    shared.apply_fix(generation, fix);
                }
            })
        };
        let on_error: ErrorCallback = {
            let shared = Arc::downgrade(&self.shared);
            Arc::new(move |code: LocationErrorCode| {
                if let Some(shared) = Weak::upgrade(&shared) {
                    shared.apply_error(generation, code);
                }
            })
        };

        log::debug!("Registering location watch (attempt {})", generation);
        let id = self
            .source
            .watch(on_fix, on_error, &self.config.watch_options());

        let mut state = self.shared.lock();
        if state.generation == generation {
            state.watch_id = Some(id);
            state.snapshot.status
        } else {
            // stop() ran while the watch was being registered.
            let status = state.snapshot.status;
            drop(state);
            self.source.clear_watch(id);
            status
        }
    }

    /// Stops observing: releases the platform watch, clears both coordinates and returns to
    /// `Idle`. No position callback is applied after this returns.
    ///
    /// `Unsupported` is permanent and is left as is.
    pub fn stop(&self) {
        let released = {
            let mut state = self.shared.lock();
            if state.snapshot.status == LocationStatus::Unsupported {
                return;
            }
            state.generation += 1;
            state.accepting = false;
            if state.snapshot.status != LocationStatus::Idle {
                log::debug!("Location tracking stopped from {:?}", state.snapshot.status);
            }
            state.snapshot = LocationSnapshot::default();
            self.shared.publish(state.snapshot);
            state.watch_id.take()
        };
        if let Some(id) = released {
            self.source.clear_watch(id);
        }
    }

    pub fn status(&self) -> LocationStatus {
        self.shared.lock().snapshot.status
    }

    pub fn exact(&self) -> Option<Coordinate> {
        self.shared.lock().snapshot.exact
    }

    pub fn approx(&self) -> Option<Coordinate> {
        self.shared.lock().snapshot.approx
    }

    pub fn snapshot(&self) -> LocationSnapshot {
        self.shared.lock().snapshot
    }

    /// A receiver that sees every status or coordinate change.
    pub fn subscribe(&self) -> watch::Receiver<LocationSnapshot> {
        self.shared.updates.subscribe()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}

impl<S: LocationSource> Drop for DeviceLocationTracker<S> {
    fn drop(&mut self) {
        let released = {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.accepting = false;
            state.watch_id.take()
        };
        if let Some(id) = released {
            self.source.clear_watch(id);
        }
    }
}

struct RegisteredWatch {
    on_fix: FixCallback,
    on_error: ErrorCallback,
    options: WatchOptions,
}

#[derive(Default)]
struct ManualSourceState {
    next_id: WatchId,
    registrations: usize,
    watches: HashMap<WatchId, RegisteredWatch>,
}

/// A [`LocationSource`] fed by the embedding application.
///
/// Useful when positions come from somewhere the crate cannot reach directly (a GPS daemon,
/// a mobile bridge, a replayed track): the application pushes fixes and errors, and they are
/// delivered to every active watch.
pub struct ManualLocationSource {
    supported: bool,
    state: Mutex<ManualSourceState>,
}

impl Default for ManualLocationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualLocationSource {
    pub fn new() -> Self {
        ManualLocationSource {
            supported: true,
            state: Mutex::new(ManualSourceState::default()),
        }
    }

    /// A source reporting no location capability.
    pub fn unsupported() -> Self {
        ManualLocationSource {
            supported: false,
            state: Mutex::new(ManualSourceState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualSourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers `fix` to every active watch.
    pub fn push_fix(&self, fix: PositionFix) {
        let callbacks: Vec<FixCallback> = self
            .lock()
            .watches
            .values()
            .map(|w| w.on_fix.clone())
            .collect();
        for callback in callbacks {
            callback(fix);
        }
    }

    /// Delivers `code` to every active watch.
    pub fn push_error(&self, code: LocationErrorCode) {
        let callbacks: Vec<ErrorCallback> = self
            .lock()
            .watches
            .values()
            .map(|w| w.on_error.clone())
            .collect();
        for callback in callbacks {
            callback(code);
        }
    }

    /// Number of watches currently registered.
    pub fn active_watches(&self) -> usize {
        self.lock().watches.len()
    }

    /// Number of `watch` calls ever made.
    pub fn registrations(&self) -> usize {
        self.lock().registrations
    }

    /// Options of the most recently registered active watch.
    pub fn last_options(&self) -> Option<WatchOptions> {
        let state = self.lock();
        state
            .watches
            .iter()
            .max_by_key(|(id, _)| **id)
            .map(|(_, w)| w.options)
    }
}

impl LocationSource for ManualLocationSource {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn watch(
        &self,
        on_fix: FixCallback,
        on_error: ErrorCallback,
        options: &WatchOptions,
    ) -> WatchId {
        let mut state = self.lock();
        state.next_id += 1;
        state.registrations += 1;
        let id = state.next_id;
        state.watches.insert(
            id,
            RegisteredWatch {
                on_fix,
                on_error,
                options: *options,
            },
        );
        id
    }

    fn clear_watch(&self, id: WatchId) {
        self.lock().watches.remove(&id);
    }
}
