// src/feed.rs

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};

use crate::config::{FeedConfig, ResponseOrdering};
use crate::error::PinsError;
use crate::geo::Coordinate;
use crate::location::{LocationSnapshot, LocationStatus};
use crate::pins::{ApprovedPinsParams, NearbyPinsParams, Pin, PinSource};

/// The parameters that fully determine a nearby-pins fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityQuery {
    pub enabled: bool,
    pub origin: Option<Coordinate>,
    pub radius_km: f64,
    pub limit: u32,
}

impl ProximityQuery {
    pub fn new(origin: Coordinate, radius_km: f64, limit: u32) -> Self {
        ProximityQuery {
            enabled: true,
            origin: Some(origin),
            radius_km,
            limit,
        }
    }

    pub fn disabled() -> Self {
        ProximityQuery {
            enabled: false,
            origin: None,
            radius_km: 0.0,
            limit: 0,
        }
    }

    /// Query around the tracker's approximate position. Enabled only while location is granted.
    pub fn around(snapshot: &LocationSnapshot, radius_km: f64, limit: u32) -> Self {
        ProximityQuery {
            enabled: snapshot.status == LocationStatus::Granted,
            origin: snapshot.approx,
            radius_km,
            limit,
        }
    }

    /// The backend arguments, or `None` when this query must not reach the backend.
    pub fn params(&self) -> Option<NearbyPinsParams> {
        match (self.enabled, self.origin) {
            (true, Some(origin)) => Some(NearbyPinsParams::new(origin, self.radius_km, self.limit)),
            _ => None,
        }
    }

    fn key(&self) -> QueryKey {
        QueryKey {
            enabled: self.enabled,
            origin: self.origin.map(|c| (c.lat.to_bits(), c.lng.to_bits())),
            radius_km: self.radius_km.to_bits(),
            limit: self.limit,
        }
    }
}

// Bitwise so that a NaN component still compares equal to itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueryKey {
    enabled: bool,
    origin: Option<(u64, u64)>,
    radius_km: u64,
    limit: u32,
}

/// Events broadcast by a feed for whoever renders it.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedNotice {
    /// The held list was replaced by a response of `count` pins.
    PinsUpdated { count: usize },
    /// The held list was emptied because the query was disabled.
    Cleared,
    /// A query failed. The held list is unchanged.
    QueryFailed { message: String },
}

#[derive(Default)]
struct ListState {
    pins: Vec<Pin>,
    in_flight: usize,
    latest_seq: u64,
}

/// A pin list replaced whole by backend responses, with in-flight and ordering bookkeeping.
struct PinList {
    state: Mutex<ListState>,
    notices: broadcast::Sender<FeedNotice>,
    ordering: ResponseOrdering,
}

// Keeps `in_flight` honest even if the awaiting future is dropped.
struct InFlight<'a> {
    list: &'a PinList,
    seq: u64,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let mut state = self.list.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }
}

impl PinList {
    fn new(config: &FeedConfig) -> Self {
        let (notices, _) = broadcast::channel(config.notice_capacity.max(1));
        PinList {
            state: Mutex::new(ListState::default()),
            notices,
            ordering: config.ordering,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notice: FeedNotice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    fn begin(&self) -> InFlight<'_> {
        let mut state = self.lock();
        state.latest_seq += 1;
        state.in_flight += 1;
        InFlight {
            list: self,
            seq: state.latest_seq,
            settled: false,
        }
    }

    fn clear(&self) {
        {
            let mut state = self.lock();
            // Responses to anything issued before the clear are stale now.
            state.latest_seq += 1;
            state.pins.clear();
        }
        self.notify(FeedNotice::Cleared);
    }

    fn settle(
        &self,
        mut ticket: InFlight<'_>,
        result: Result<Vec<Pin>, PinsError>,
    ) -> Result<Vec<Pin>, PinsError> {
        let seq = ticket.seq;
        let current = {
            let mut state = self.lock();
            // Released under the lock that replaces the list.
            state.in_flight = state.in_flight.saturating_sub(1);
            ticket.settled = true;

            let current =
                self.ordering == ResponseOrdering::LatestResolution || seq == state.latest_seq;
            if current {
                if let Ok(pins) = &result {
                    state.pins = pins.clone();
                }
            }
            current
        };

        match result {
            Ok(pins) if !current => {
                log::debug!("Discarding stale pin response #{}", seq);
                Ok(pins)
            }
            Ok(pins) => {
                log::debug!("Pin list replaced with {} pins (response #{})", pins.len(), seq);
                self.notify(FeedNotice::PinsUpdated { count: pins.len() });
                Ok(pins)
            }
            Err(e) if !current => {
                // A newer request owns the list; only the caller of this one hears about it.
                log::debug!("Stale pin query #{} failed: {}", seq, e);
                Err(e.into_query_failure())
            }
            Err(e) => {
                log::warn!("Pin query #{} failed, keeping previous pins: {}", seq, e);
                self.notify(FeedNotice::QueryFailed {
                    message: e.to_string(),
                });
                Err(e.into_query_failure())
            }
        }
    }

    fn pins(&self) -> Vec<Pin> {
        self.lock().pins.clone()
    }

    fn loading(&self) -> bool {
        self.lock().in_flight > 0
    }
}

/// Nearby member pins for a moving origin.
///
/// The feed holds the last successfully fetched list. [`refresh`](Self::refresh) always asks the
/// backend (when the query allows it); [`update`](Self::update) only does so when the query
/// differs from the previous one. Backend failures never clear the list.
///
/// All methods take `&self`, so a feed can sit in an `Arc` and be refreshed from several tasks.
/// When refreshes overlap, [`ResponseOrdering`] decides which response is kept.
pub struct ProximityPinFeed<S: PinSource> {
    source: S,
    list: PinList,
    last_key: Mutex<Option<QueryKey>>,
    config: FeedConfig,
}

impl<S: PinSource> ProximityPinFeed<S> {
    pub fn new(source: S, config: FeedConfig) -> Self {
        ProximityPinFeed {
            source,
            list: PinList::new(&config),
            last_key: Mutex::new(None),
            config,
        }
    }

    /// Fetches the pins for `query` and replaces the held list with the response.
    ///
    /// A disabled query or one without origin empties the list and makes no backend call.
    ///
    /// # Errors
    ///
    /// `PinsError::BackendQueryFailed` wrapping the cause. The held list is left as it was and a
    /// [`FeedNotice::QueryFailed`] is broadcast.
    pub async fn refresh(&self, query: &ProximityQuery) -> Result<Vec<Pin>, PinsError> {
        self.remember(query.key());
        let Some(params) = query.params() else {
            self.list.clear();
            return Ok(Vec::new());
        };

        let ticket = self.list.begin();
        log::debug!(
            "Fetching nearby pins #{}: radius {} km, limit {}",
            ticket.seq,
            params.radius_km,
            params.limit
        );
        let result = self.source.nearby_pins(params).await;
        self.list.settle(ticket, result)
    }

    /// Refreshes only if `query` differs from the previous call's query.
    ///
    /// Returns `None` when nothing changed and no fetch was made.
    pub async fn update(&self, query: &ProximityQuery) -> Option<Result<Vec<Pin>, PinsError>> {
        let key = query.key();
        if self.remember(key) == Some(key) {
            return None;
        }
        Some(self.refresh(query).await)
    }

    // Records `key` as the latest query and returns the one it replaced.
    fn remember(&self, key: QueryKey) -> Option<QueryKey> {
        self.last_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(key)
    }

    /// Keeps the feed in step with a location tracker until the tracker goes away.
    ///
    /// Each change of the tracker's snapshot becomes a [`ProximityQuery::around`] update, so the
    /// backend only ever sees the approximate position and only when it actually moved.
    pub async fn follow(
        &self,
        mut updates: watch::Receiver<LocationSnapshot>,
        radius_km: f64,
        limit: u32,
    ) {
        loop {
            let snapshot = *updates.borrow_and_update();
            let query = ProximityQuery::around(&snapshot, radius_km, limit);
            // Failures are already logged and broadcast; the next change retries.
            let _ = self.update(&query).await;
            if updates.changed().await.is_err() {
                log::debug!("Location tracker dropped; nearby feed stops following");
                break;
            }
        }
    }

    /// Follows a tracker using the configured default radius and limit.
    pub async fn follow_with_defaults(&self, updates: watch::Receiver<LocationSnapshot>) {
        self.follow(updates, self.config.default_radius_km, self.config.default_limit)
            .await
    }

    pub fn pins(&self) -> Vec<Pin> {
        self.list.pins()
    }

    /// True while at least one request is outstanding.
    pub fn loading(&self) -> bool {
        self.list.loading()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedNotice> {
        self.list.notices.subscribe()
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }
}

/// Approved member pins for the global map, independent of device location.
pub struct ApprovedPinFeed<S: PinSource> {
    source: S,
    list: PinList,
}

impl<S: PinSource> ApprovedPinFeed<S> {
    pub fn new(source: S, config: FeedConfig) -> Self {
        ApprovedPinFeed {
            source,
            list: PinList::new(&config),
        }
    }

    /// Fetches up to `limit` approved pins and replaces the held list.
    ///
    /// Same failure behaviour as [`ProximityPinFeed::refresh`].
    pub async fn load(&self, limit: u32) -> Result<Vec<Pin>, PinsError> {
        let ticket = self.list.begin();
        log::debug!("Fetching approved pins #{}: limit {}", ticket.seq, limit);
        let result = self.source.approved_pins(ApprovedPinsParams { limit }).await;
        self.list.settle(ticket, result)
    }

    pub fn pins(&self) -> Vec<Pin> {
        self.list.pins()
    }

    pub fn loading(&self) -> bool {
        self.list.loading()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedNotice> {
        self.list.notices.subscribe()
    }
}
