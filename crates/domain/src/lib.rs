//! Domain-level building blocks shared across the API and watcher crates:
//! environment configuration, invoice/service models and their validation,
//! storage traits, caches and telemetry wiring.

pub mod config;
pub mod model;
pub mod services;
pub mod storage;

pub use model::*;
pub use services::cache::{ApiKeyCache, TaggedCache};
pub use services::events::{InvoiceEventSink, PayAddressError, PayAddressSource};
pub use storage::*;
