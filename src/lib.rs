pub mod client;
pub mod config;
pub mod error;
pub mod feed;
pub mod geo;
pub mod location;
pub mod pins;
pub mod presence;
mod requests;
pub mod roles;
pub mod rpc;

pub use client::Backend;
pub use config::{BackendConfig, FeedConfig, ResponseOrdering, TrackerConfig};
pub use error::{LocationError, PinsError};
pub use feed::{ApprovedPinFeed, FeedNotice, ProximityPinFeed, ProximityQuery};
pub use geo::{distance_km, round_coordinate, Coordinate};
pub use location::{DeviceLocationTracker, LocationSnapshot, LocationSource, LocationStatus};
pub use pins::{Pin, PinSource};
pub use presence::PresenceHeartbeat;
pub use roles::MemberRole;
