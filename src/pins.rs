// src/pins.rs

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client::Backend;
use crate::error::PinsError;
use crate::geo::Coordinate;

/// Database function returning approved members near a point, with `distance_km`.
pub const NEARBY_PINS_FUNCTION: &str = "get_nearby_member_pins";
/// Database function returning approved members for the global map.
pub const APPROVED_PINS_FUNCTION: &str = "get_approved_member_pins";

/// A map marker for one directory member, as returned by the backend.
///
/// Pins are snapshots. Feeds replace their whole list on refresh and never edit a pin.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Pin {
    #[serde(rename = "user_id")]
    pub owner_id: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Server-computed distance from the query origin. Only set by the nearby query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl Pin {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

/// Arguments of the nearby-pins function.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct NearbyPinsParams {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: f64,
    pub limit: u32,
}

impl NearbyPinsParams {
    pub fn new(origin: Coordinate, radius_km: f64, limit: u32) -> Self {
        NearbyPinsParams {
            lat: origin.lat,
            lng: origin.lng,
            radius_km,
            limit,
        }
    }
}

/// Arguments of the approved-pins function.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ApprovedPinsParams {
    pub limit: u32,
}

/// Anything that can answer pin queries. Implemented by [`PinsHandle`] for the real backend.
pub trait PinSource: Send + Sync {
    fn nearby_pins(
        &self,
        params: NearbyPinsParams,
    ) -> impl Future<Output = Result<Vec<Pin>, PinsError>> + Send;

    fn approved_pins(
        &self,
        params: ApprovedPinsParams,
    ) -> impl Future<Output = Result<Vec<Pin>, PinsError>> + Send;
}

impl<S: PinSource> PinSource for Arc<S> {
    fn nearby_pins(
        &self,
        params: NearbyPinsParams,
    ) -> impl Future<Output = Result<Vec<Pin>, PinsError>> + Send {
        (**self).nearby_pins(params)
    }

    fn approved_pins(
        &self,
        params: ApprovedPinsParams,
    ) -> impl Future<Output = Result<Vec<Pin>, PinsError>> + Send {
        (**self).approved_pins(params)
    }
}

/// Member map queries against the backend. Obtained from [`Backend::pins`].
///
/// The handle owns a clone of the client (cheap, the HTTP pool is shared) so it can be
/// moved into a [`ProximityPinFeed`](crate::feed::ProximityPinFeed).
#[derive(Debug, Clone)]
pub struct PinsHandle {
    client: Backend,
}

impl PinsHandle {
    pub(crate) fn new(client: Backend) -> Self {
        PinsHandle { client }
    }

    pub(crate) fn client(&self) -> &Backend {
        &self.client
    }

    /// Approved members within `radius_km` of `origin`, at most `limit` of them.
    pub async fn nearby(
        &self,
        origin: Coordinate,
        radius_km: f64,
        limit: u32,
    ) -> Result<Vec<Pin>, PinsError> {
        self.nearby_pins(NearbyPinsParams::new(origin, radius_km, limit))
            .await
    }

    /// Approved members for the global map, at most `limit` of them.
    pub async fn approved(&self, limit: u32) -> Result<Vec<Pin>, PinsError> {
        self.approved_pins(ApprovedPinsParams { limit }).await
    }
}

impl PinSource for PinsHandle {
    async fn nearby_pins(&self, params: NearbyPinsParams) -> Result<Vec<Pin>, PinsError> {
        if !(params.radius_km.is_finite() && params.radius_km >= 0.0) {
            return Err(PinsError::InvalidInput(format!(
                "radius_km must be a non-negative number, got {}",
                params.radius_km
            )));
        }
        self.client
            .rpc()
            .call(NEARBY_PINS_FUNCTION, &params)
            .await
    }

    async fn approved_pins(&self, params: ApprovedPinsParams) -> Result<Vec<Pin>, PinsError> {
        self.client
            .rpc()
            .call(APPROVED_PINS_FUNCTION, &params)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_nearby_pin() {
        let pin: Pin = serde_json::from_value(json!({
            "user_id": "4f1c",
            "city": "Itacaré",
            "state": "BA",
            "lat": -13.27,
            "lng": -39.66,
            "avatar_url": null,
            "display_name": "Ana",
            "distance_km": 1.84,
            "approved": true
        }))
        .unwrap();
        assert_eq!(pin.owner_id, "4f1c");
        assert_eq!(pin.state.as_deref(), Some("BA"));
        assert_eq!(pin.avatar_url, None);
        assert_eq!(pin.distance_km, Some(1.84));
        assert_eq!(pin.coordinate(), Coordinate::new(-13.27, -39.66));
    }

    #[test]
    fn approved_pin_has_no_distance() {
        let pin: Pin = serde_json::from_value(json!({
            "user_id": "9a",
            "lat": 1.0,
            "lng": 2.0,
            "display_name": "Bo"
        }))
        .unwrap();
        assert_eq!(pin.distance_km, None);
        assert_eq!(pin.city, None);
    }

    #[test]
    fn nearby_params_wire_shape() {
        let params = NearbyPinsParams::new(Coordinate::new(-13.2687, -39.6644), 50.0, 200);
        assert_eq!(
            serde_json::to_value(params).unwrap(),
            json!({"lat": -13.2687, "lng": -39.6644, "radius_km": 50.0, "limit": 200})
        );
    }
}
