//! Shared service helpers such as API key caching, abuse tracking, event
//! seams and telemetry wiring.

pub mod abuse;
pub mod cache;
pub mod events;
pub mod telemetry;

pub use abuse::*;
pub use cache::*;
pub use events::*;
pub use telemetry::*;
