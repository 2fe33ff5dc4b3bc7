//! HTTP API layer for the tally engine.

pub mod extractors;
pub mod geo;
pub mod response;
pub mod routes;
pub mod state;

pub use geo::{GeoConfig, GeoResolver};
pub use routes::router;
pub use state::AppState;
