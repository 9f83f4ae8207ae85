//! Tracking for UPS shipments.
//!
//! UPS exposes tracking as JSON over REST, with the credentials nested inside
//! the request body. The `auth` options must carry `username`, `password`,
//! and `access_key` keys.

use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate, NaiveTime};
use serde_json::{Value, json};
use tracing::debug;

use parceltrack_core::{
    EventTimestamp, HistoryEntry, Shipment, classify_last_entry, local_offset,
};

use crate::auth::AuthOptions;
use crate::error::ProviderResult;
use crate::provider::{BoxFuture, ShipmentProvider};
use crate::transport::{HttpTransport, Transport, TransportRequest};

const TRACK_URL: &str = "https://onlinetools.ups.com/rest/Track";

// From the carrier's tracking status descriptions; UPS does not publish a
// code table alongside them, these are the delivered codes seen on the wire.

const SUCCESSFUL_DELIVERY_EVENT_IDENTIFIERS: &[&str] = &[
    "KB", // Delivered
    "FS", // Delivered
    "F4", // Delivered
    "KM", // Delivered
    "2W", // Customer has picked up package at UPS Access Point
];

// No terminal failure codes are documented for the Track API; anything not
// delivered falls through to in-progress.
const FAILED_DELIVERY_EVENT_IDENTIFIERS: &[&str] = &[];

/// UPS tracking adapter.
pub struct Ups {
    transport: Arc<dyn Transport>,
}

impl Ups {
    /// Creates an adapter backed by the production HTTP transport.
    pub fn new() -> ProviderResult<Self> {
        Ok(Self {
            transport: Arc::new(HttpTransport::new()?),
        })
    }

    /// Creates an adapter over a custom transport.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn track_single(
        &self,
        tracking_code: &str,
        auth: &AuthOptions,
    ) -> ProviderResult<Shipment> {
        let username = auth.require("username")?;
        let password = auth.require("password")?;
        let access_key = auth.require("access_key")?;

        let request = TransportRequest::post(TRACK_URL)
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json")
            .with_body(request_body(tracking_code, username, password, access_key));

        debug!(tracking_code, "requesting UPS tracking");

        match self.transport.execute(request).await {
            Ok(response) => Ok(parse_response(&response.body)),
            Err(err) => {
                let reason = err
                    .body()
                    .and_then(|body| serde_json::from_str::<Value>(body).ok())
                    .and_then(|doc| error_text(&doc))
                    .unwrap_or_else(|| err.to_string());
                Ok(Shipment::lookup_failure(reason))
            }
        }
    }
}

impl ShipmentProvider for Ups {
    fn name(&self) -> &str {
        "ups"
    }

    fn track<'a>(
        &'a self,
        tracking_code: &'a str,
        auth: &'a AuthOptions,
    ) -> BoxFuture<'a, ProviderResult<Shipment>> {
        Box::pin(self.track_single(tracking_code, auth))
    }
}

fn request_body(tracking_code: &str, username: &str, password: &str, access_key: &str) -> String {
    json!({
        "UPSSecurity": {
            "UsernameToken": {
                "Username": username,
                "Password": password
            },
            "ServiceAccessToken": {
                "AccessLicenseNumber": access_key
            }
        },
        "TrackRequest": {
            "Request": {
                "RequestOption": "1",
                "TransactionReference": {
                    "CustomerContext": "Shipment status inquiry"
                }
            },
            "InquiryNumber": tracking_code
        }
    })
    .to_string()
}

fn parse_response(text: &str) -> Shipment {
    let doc: Value = match serde_json::from_str(text) {
        Ok(doc) => doc,
        Err(err) => {
            return Shipment::lookup_failure(format!("unparseable tracking response: {err}"));
        }
    };

    if let Some(failure_message) = error_text(&doc) {
        return Shipment::lookup_failure(failure_message);
    }

    // Usually one package, but can be multiple. Just pick the first one.
    let package = match doc.pointer("/TrackResponse/Shipment/Package") {
        Some(Value::Array(packages)) => packages.first().cloned().unwrap_or(Value::Null),
        Some(package) => package.clone(),
        None => Value::Null,
    };

    // UPS puts the most recent first. A single activity arrives as a bare
    // object rather than a one-element array.
    let mut activities: Vec<Value> = match package.get("Activity") {
        Some(Value::Array(items)) => items.clone(),
        Some(item) => vec![item.clone()],
        None => Vec::new(),
    };
    activities.reverse();

    // Date and time are "local time" with no zone attached; assume that
    // means the querying process's zone.
    let offset = local_offset();
    let history: Vec<HistoryEntry> = activities
        .iter()
        .map(|activity| {
            let timestamp = parse_timestamp(
                activity.get("Date").and_then(Value::as_str),
                activity.get("Time").and_then(Value::as_str),
                offset,
            );
            let code = activity
                .pointer("/Status/Code")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let description = activity
                .pointer("/Status/Description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            HistoryEntry::new(timestamp, code, description)
        })
        .collect();

    let delivery_status = classify_last_entry(
        &history,
        SUCCESSFUL_DELIVERY_EVENT_IDENTIFIERS,
        FAILED_DELIVERY_EVENT_IDENTIFIERS,
    );

    Shipment::lookup_success(history, delivery_status)
}

fn error_text(doc: &Value) -> Option<String> {
    if doc.get("Fault").is_some() {
        return Some(
            doc.pointer("/Fault/detail/Errors/ErrorDetail/PrimaryErrorCode/Description")
                .and_then(Value::as_str)
                .unwrap_or("carrier reported an unspecified fault")
                .to_string(),
        );
    }

    match doc.pointer("/TrackResponse/Response/ResponseStatus") {
        None => Some("unrecognized tracking response".to_string()),
        Some(status) => {
            if status.get("Code").and_then(Value::as_str) == Some("1") {
                None
            } else {
                Some(
                    status
                        .get("Description")
                        .and_then(Value::as_str)
                        .unwrap_or("carrier rejected the inquiry")
                        .to_string(),
                )
            }
        }
    }
}

fn parse_timestamp(
    date: Option<&str>,
    time: Option<&str>,
    offset: FixedOffset,
) -> Option<EventTimestamp> {
    let date = NaiveDate::parse_from_str(date?, "%Y%m%d").ok()?;
    match time.filter(|t| !t.is_empty()) {
        Some(time_text) => {
            let time = NaiveTime::parse_from_str(time_text, "%H%M%S").ok()?;
            Some(EventTimestamp::from_local(date.and_time(time), offset))
        }
        None => Some(EventTimestamp::from_date(date)),
    }
}
