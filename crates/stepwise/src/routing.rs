//! Request-text routing: maps a clause to candidate tools.

pub mod metadata;
pub mod router;

pub use metadata::RoutingMetadata;
pub use router::{RouteCandidate, Router, RoutingResult};
