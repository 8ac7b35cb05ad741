use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::PinsError;
use crate::geo::Coordinate;
use crate::location::{LocationSnapshot, LocationStatus};
use crate::pins::PinsHandle;

/// Database function storing a member's approximate position on their profile.
pub const UPDATE_LOCATION_FUNCTION: &str = "update_member_location";

/// Somewhere to send the member's approximate position.
pub trait LocationPublisher: Send + Sync + 'static {
    fn publish(&self, approx: Coordinate) -> impl Future<Output = Result<(), PinsError>> + Send;
}

#[derive(Serialize)]
struct UpdateLocationParams {
    lat: f64,
    lng: f64,
}

impl LocationPublisher for PinsHandle {
    async fn publish(&self, approx: Coordinate) -> Result<(), PinsError> {
        let _: Value = self
            .client()
            .rpc()
            .call(
                UPDATE_LOCATION_FUNCTION,
                &UpdateLocationParams {
                    lat: approx.lat,
                    lng: approx.lng,
                },
            )
            .await?;
        Ok(())
    }
}

/// A background task that periodically publishes the approximate position while location is
/// granted.
///
/// The task lives exactly as long as this value: [`stop`](Self::stop) or dropping it aborts the
/// task, and it also ends on its own when the tracker it follows is dropped. Only
/// [`LocationSnapshot::approx`] is ever published.
pub struct PresenceHeartbeat {
    task: Option<JoinHandle<()>>,
}

impl PresenceHeartbeat {
    /// Spawns the heartbeat on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `interval` is zero.
    pub fn start<P: LocationPublisher>(
        publisher: P,
        mut updates: watch::Receiver<LocationSnapshot>,
        interval: Duration,
    ) -> Result<Self, PinsError> {
        if interval.is_zero() {
            return Err(PinsError::InvalidInput(
                "presence heartbeat interval must be greater than zero".to_string(),
            ));
        }

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let tick = tokio::select! {
                    _ = ticker.tick() => true,
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        false
                    }
                };
                if !tick {
                    continue;
                }
                let snapshot = *updates.borrow();
                if let (LocationStatus::Granted, Some(approx)) = (snapshot.status, snapshot.approx)
                {
                    match publisher.publish(approx).await {
                        Ok(()) => log::debug!("Presence heartbeat published"),
                        Err(e) => log::warn!("Presence heartbeat failed: {}", e),
                    }
                }
            }
            log::debug!("Presence heartbeat finished: location tracker dropped");
        });

        Ok(PresenceHeartbeat { task: Some(task) })
    }

    /// Aborts the background task. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for PresenceHeartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}
