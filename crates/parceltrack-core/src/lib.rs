//! Core types: delivery status, tracking history, timestamps

pub mod shipment;
pub mod status;
pub mod time;
pub mod tracing;

pub use shipment::{HistoryEntry, Shipment};
pub use status::{DeliveryStatus, classify_event_code, classify_last_entry};
pub use time::{EventTimestamp, local_offset, offset_for_abbreviation};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
