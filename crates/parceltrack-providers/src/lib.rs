//! ShipmentProvider trait and carrier adapters.
//!
//! This crate provides the abstraction layer for shipment tracking backends:
//!
//! - [`ShipmentProvider`] - The core trait that all carrier adapters implement
//! - [`TrackingBatch`] - Lazy pull-based enumeration for batch lookups
//! - [`AuthOptions`] - Opaque per-carrier credential record
//! - [`Transport`] - The single-outbound-call collaborator adapters are built on
//! - [`ProviderError`] - Error types for configuration and internal faults
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────┐  ┌───────────┐  ┌────────────┐
//! │ Canada Post  │  │   UPS    │  │   USPS    │  │    DHL     │
//! │  (XML/REST)  │  │ (JSON)   │  │ (free txt)│  │   (SOAP)   │
//! └──────┬───────┘  └────┬─────┘  └─────┬─────┘  └─────┬──────┘
//!        │               │              │              │
//!        │          ShipmentProvider / TrackingBatch   │
//!        └───────────────┴──────┬───────┴──────────────┘
//!                               │
//!                               ▼
//!                        ┌────────────┐
//!                        │  Shipment  │  (status + chronological history)
//!                        └────────────┘
//! ```
//!
//! Every adapter turns its carrier's native payload into the same
//! [`Shipment`](parceltrack_core::Shipment) shape: lookup failures are
//! values, history is oldest-first, and the delivery status comes from the
//! most recent event.
//!
//! # Example
//!
//! ```ignore
//! use parceltrack_providers::{AuthOptions, CanadaPost, ShipmentProvider};
//!
//! let provider = CanadaPost::new()?;
//! let auth = AuthOptions::new()
//!     .with("username", "...")
//!     .with("password", "...");
//!
//! let shipment = provider.track("1371134583769923", &auth).await?;
//! if shipment.is_delivered() {
//!     println!("delivered: {:?}", shipment.latest_event());
//! }
//! ```

pub mod auth;
pub mod canada_post;
pub mod dhl;
pub mod error;
pub mod provider;
pub mod transport;
pub mod ups;
pub mod usps;

mod xml;

// Re-export main types at crate root
pub use auth::AuthOptions;
pub use canada_post::CanadaPost;
pub use dhl::Dhl;
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use provider::{BatchItem, BoxFuture, ShipmentProvider, TrackingBatch};
pub use transport::{
    HttpTransport, Transport, TransportError, TransportRequest, TransportResponse,
};
pub use ups::Ups;
pub use usps::Usps;
