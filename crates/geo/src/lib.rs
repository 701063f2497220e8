pub mod config;
pub mod distance;
pub mod position_cache;
pub mod traffic;
pub mod zone_service;

pub use config::{GeoConfig, TrafficBuckets};
pub use distance::{bounding_box, haversine_km, BoundingBox};
pub use position_cache::PositionCache;
pub use traffic::{TrafficEstimate, TrafficLevel};
pub use zone_service::{GeoZoneService, NearbyCourier, ZoneStats, ZoneTransition};
