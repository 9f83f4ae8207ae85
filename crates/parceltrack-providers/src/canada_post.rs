//! Tracking for Canada Post shipments.
//!
//! Canada Post exposes tracking as XML over REST. The `auth` options must
//! carry `username` and `password` keys, which are issued in the Canada Post
//! developer account under the "API Keys" section.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use quick_xml::events::Event;
use tracing::debug;

use parceltrack_core::{
    EventTimestamp, HistoryEntry, Shipment, classify_last_entry, local_offset,
    offset_for_abbreviation,
};

use crate::auth::AuthOptions;
use crate::error::ProviderResult;
use crate::provider::{BoxFuture, ShipmentProvider};
use crate::transport::{HttpTransport, Transport, TransportRequest, basic_auth_header};
use crate::xml::{first_text, local_name, nested_text};

/// Lookup failure text when the transport produced no response body at all.
const NO_RESPONSE: &str = "No response";

// https://www.canadapost.ca/cpo/mc/business/productsservices/developers/messagescodetables.jsf

const SUCCESSFUL_DELIVERY_EVENT_IDENTIFIERS: &[&str] = &[
    "1408", // Item successfully delivered. Contact customer service for copy of signature.
    "1409", // Item successfully delivered. Contact customer service for copy of signature.
    "1421", // Item successfully delivered to recipient's front door
    "1422", // Item successfully delivered to recipient's side door
    "1423", // Item successfully delivered to recipient's back door
    "1424", // Item successfully delivered at or in recipient's garage
    "1425", // Item successfully delivered to building superintendent or security agent
    "1426", // Item successfully delivered to recipient's parcel box
    "1427", // Item successfully delivered to recipient's safe drop location
    "1428", // Item successfully delivered to recipient's front door
    "1429", // Item successfully delivered to recipient's side door
    "1430", // Item successfully delivered to recipient's back door
    "1431", // Item successfully delivered at or in recipient's garage
    "1432", // Item successfully delivered to building superintendent or security agent
    "1433", // Item successfully delivered to recipient's parcel box
    "1434", // Item successfully delivered to recipient's safe drop location
    "1441", // Item delivered to recipient's community mailbox.
    "1442", // Item delivered to recipient's community mailbox.
    "1496", // Item successfully delivered
    "1497", // Item successfully delivered to recipient's safe drop location
    "1498", // Item successfully delivered
    "1499", // Item successfully delivered to recipient's safe drop location
    "5300", // Item successfully delivered to recipient's parcel box
];

const FAILED_DELIVERY_EVENT_IDENTIFIERS: &[&str] = &[
    "167",  // International item being returned to sender. Insufficient international postage.
    "168",  // International item being returned to sender. Does not meet product requirements.
    "169",  // International item being returned to sender. Incorrect or missing shipping label
    "1100", // Refused by Customs. Unacceptable sender info. Item being returned to sender
    "1415", // Item being returned to Sender. Incomplete address.
    "1416", // Recipient not located at address provided. Item being returned to sender.
    "1417", // Item refused by recipient. Item being returned to sender.
    "1418", // Item being returned to Sender. Valid proof of age identification not provided.
    "1419", // Item was unclaimed by recipient. Item being returned to sender.
    "1420", // Item being returned to sender
    "1450", // Item arrived at the Undeliverable Mail Office. Please contact Cust Service
    "1481", // Item refused by recipient. Item being returned to sender.
    "1482", // Item refused or unclaimed by recipient. Item being returned to sender.
    "1483", // Item cannot be delivered as addressed; sent to the Undeliverable Mail Office
    "1491", // Item refused by recipient. Item being returned to sender.
    "1492", // Item refused or unclaimed by recipient. Item being returned to sender.
    "1493", // Item cannot be delivered as addressed; sent to the Undeliverable Mail Office
    "2600", // Item has been returned and is enroute to the Sender
    "3001", // Item being returned to sender
    "3002", // Authorized Return
];

/// Canada Post tracking adapter.
pub struct CanadaPost {
    transport: Arc<dyn Transport>,
}

impl CanadaPost {
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

        let request = TransportRequest::get(format!(
            "https://soa-gw.canadapost.ca/vis/track/pin/{tracking_code}/detail"
        ))
        .with_header("Authorization", basic_auth_header(username, password))
        .with_header("Accept", "text/xml");

        debug!(tracking_code, "requesting Canada Post tracking detail");

        match self.transport.execute(request).await {
            Ok(response) => Ok(parse_response(&response.body)),
            Err(err) => Ok(Shipment::lookup_failure(
                err.body()
                    .and_then(error_text)
                    .unwrap_or_else(|| NO_RESPONSE.to_string()),
            )),
        }
    }
}

impl ShipmentProvider for CanadaPost {
    fn name(&self) -> &str {
        "canada_post"
    }

    fn track<'a>(
        &'a self,
        tracking_code: &'a str,
        auth: &'a AuthOptions,
    ) -> BoxFuture<'a, ProviderResult<Shipment>> {
        Box::pin(self.track_single(tracking_code, auth))
    }
}

fn parse_response(text: &str) -> Shipment {
    if let Some(failure_message) = error_text(text) {
        return Shipment::lookup_failure(failure_message);
    }

    let expected_delivery_date =
        first_text(text, "expected-delivery-date").and_then(|s| parse_date(&s));

    // Canada Post puts the most recent first.
    let mut occurrences = parse_occurrences(text);
    occurrences.reverse();

    // The per-event time zone is not reliably present. Assume the last known
    // zone still applies when an event does not carry one, and the local zone
    // before the first known value, so times are not silently read as GMT.
    let mut last_zone = local_offset();
    let history: Vec<HistoryEntry> = occurrences
        .into_iter()
        .map(|occurrence| {
            let timestamp = occurrence.date.map(|date| match occurrence.time {
                Some(time) => {
                    if let Some(zone) = occurrence
                        .zone
                        .as_deref()
                        .and_then(offset_for_abbreviation)
                    {
                        last_zone = zone;
                    }
                    EventTimestamp::from_local(date.and_time(time), last_zone)
                }
                None => EventTimestamp::from_date(date),
            });
            HistoryEntry::new(timestamp, occurrence.code, occurrence.description)
        })
        .collect();

    let delivery_status = classify_last_entry(
        &history,
        SUCCESSFUL_DELIVERY_EVENT_IDENTIFIERS,
        FAILED_DELIVERY_EVENT_IDENTIFIERS,
    );

    let mut shipment = Shipment::lookup_success(history, delivery_status);
    if let Some(date) = expected_delivery_date {
        shipment = shipment.with_expected_delivery_date(date);
    }
    shipment
}

fn error_text(text: &str) -> Option<String> {
    nested_text(text, "message", "description")
}

#[derive(Debug, Default)]
struct Occurrence {
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
    zone: Option<String>,
    code: String,
    description: String,
}

/// Collects the significant-event occurrences in document order.
fn parse_occurrences(xml: &str) -> Vec<Occurrence> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut occurrences = Vec::new();
    let mut current: Option<Occurrence> = None;
    let mut current_element: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let local = local_name(&name);
                if local == "occurrence" {
                    current = Some(Occurrence::default());
                } else if current.is_some() {
                    current_element = Some(local.to_string());
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if local_name(&name) == "occurrence" {
                    if let Some(occurrence) = current.take() {
                        occurrences.push(occurrence);
                    }
                }
                current_element = None;
            }
            Ok(Event::Text(e)) => {
                if let (Some(occurrence), Some(element)) = (&mut current, &current_element) {
                    let text = e.unescape().unwrap_or_default().to_string();
                    match element.as_str() {
                        "event-date" => occurrence.date = parse_date(&text),
                        "event-time" => occurrence.time = parse_time(&text),
                        "event-time-zone" => occurrence.zone = Some(text),
                        "event-identifier" => occurrence.code = text,
                        "event-description" => occurrence.description = text,
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    occurrences
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M:%S").ok()
}
