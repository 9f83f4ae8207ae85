//! Tracking for USPS shipments.
//!
//! The Track/Confirm API takes an inline XML query parameter and answers with
//! free-text summary and detail lines; there are no structured status or
//! event-code fields, so classification, the terminal delivery event, and
//! detail timestamps are all recovered heuristically from the text. The
//! `auth` options must carry a `username` key (the shippingapis.com user id).

use std::sync::{Arc, LazyLock};

use chrono::{FixedOffset, NaiveDateTime};
use regex::Regex;
use tracing::{debug, warn};

use parceltrack_core::{DeliveryStatus, EventTimestamp, HistoryEntry, Shipment};

use crate::auth::AuthOptions;
use crate::error::ProviderResult;
use crate::provider::{BoxFuture, ShipmentProvider};
use crate::transport::{HttpTransport, Transport, TransportRequest};
use crate::xml::{collect_texts, first_text, nested_text};

const API_URL: &str = "http://production.shippingapis.com/ShippingAPI.dll";

/// The summary phrase that signals the carrier could not resolve the code.
const LOCATE_FAILURE_PHRASE: &str = "The Postal Service could not locate";

/// Summary phrasings that mean the item reached the recipient.
const DELIVERED_PHRASES: &[&str] = &[
    "Your item was delivered",
    "Your item was picked up",
    "Your item has been delivered",
];

const MONTH_NAMES: &[&str] = &[
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Recovers the time, then the date, from the delivered/picked-up summary
/// phrasings so a terminal history entry can be synthesized when the detail
/// list is missing one.
static TERMINAL_EVENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:Your item was delivered in or at the mailbox at|Your item was picked up at the post office at|Your item has been delivered and is available at a PO Box at) (.*?) on (.*?) in",
    )
    .expect("invalid terminal event regex")
});

/// The summary and detail text carry no zone at all; assume Central time.
fn fallback_offset() -> FixedOffset {
    FixedOffset::west_opt(5 * 3600).expect("valid offset")
}

/// USPS tracking adapter.
pub struct Usps {
    transport: Arc<dyn Transport>,
}

impl Usps {
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

        let query = format!(
            r#"<TrackRequest USERID="{username}"><TrackID ID="{tracking_code}"></TrackID></TrackRequest>"#
        );
        let request = TransportRequest::get(format!(
            "{API_URL}?API=TrackV2&XML={}",
            urlencoding::encode(&query)
        ));

        debug!(tracking_code, "requesting USPS track/confirm");

        match self.transport.execute(request).await {
            Ok(response) => Ok(parse_response(&response.body)),
            Err(err) => Ok(Shipment::lookup_failure(err.to_string())),
        }
    }
}

impl ShipmentProvider for Usps {
    fn name(&self) -> &str {
        "usps"
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
    if let Some(failure_message) = nested_text(text, "Error", "Description") {
        return Shipment::lookup_failure(failure_message);
    }

    let Some(summary) = first_text(text, "TrackSummary") else {
        return Shipment::lookup_failure("unrecognized tracking response");
    };

    // A structural success can still be a textual failure.
    if summary.contains(LOCATE_FAILURE_PHRASE) {
        return Shipment::lookup_failure(summary);
    }

    let mut synthesized = Vec::new();
    let status = if DELIVERED_PHRASES
        .iter()
        .any(|phrase| summary.contains(phrase))
    {
        // The terminal delivery event is for some reason not always present
        // as a detail entry. See if we can make one up from the summary; a
        // partial extraction synthesizes nothing.
        if let Some(timestamp) = datetime_from_summary(&summary) {
            synthesized.push(HistoryEntry::new(
                Some(timestamp),
                "Your item was picked up",
                summary.clone(),
            ));
        }
        DeliveryStatus::Complete
    } else {
        DeliveryStatus::InProgress
    };

    // Details come most recent first; the synthesized terminal event is newer
    // than all of them and belongs at the end after the reversal.
    let mut details = collect_texts(text, "TrackDetail");
    details.reverse();
    let mut history: Vec<HistoryEntry> = details
        .iter()
        .map(|line| detail_entry_from_line(line))
        .collect();
    history.append(&mut synthesized);

    Shipment::lookup_success(history, Some(status))
}

/// Recovers the terminal event timestamp from the summary text, when the
/// summary matches one of the known delivered/picked-up phrasings.
fn datetime_from_summary(summary: &str) -> Option<EventTimestamp> {
    let captures = TERMINAL_EVENT_REGEX.captures(summary)?;
    let time_text = captures.get(1)?.as_str();
    let date_text = captures.get(2)?.as_str();
    parse_heuristic_datetime(&format!("{date_text} {time_text}"), "%B %e, %Y %l:%M %P")
}

/// Parses one comma-delimited detail line into a history entry.
///
/// The leading segment is the event phrase and the rest may or may not
/// contain a date. The phrase can itself contain commas ("Moved, left no
/// address"), so the date is found by scanning for the segment that starts
/// with a month name rather than assuming a position.
fn detail_entry_from_line(line: &str) -> HistoryEntry {
    let parts: Vec<&str> = line.split(", ").collect();
    let code = parts.first().copied().unwrap_or(line);

    let mut timestamp = None;
    if parts.len() >= 4 {
        let date_start = parts.iter().position(|part| {
            MONTH_NAMES
                .iter()
                .any(|month| part.starts_with(month))
        });
        if let Some(start) = date_start {
            let end = usize::min(start + 2, parts.len() - 1);
            let text = parts[start..=end].join(" ");
            timestamp = parse_heuristic_datetime(&text, "%B %e %Y %l:%M %P");
            if timestamp.is_none() {
                // Lines like "Rescheduled to Next Delivery Day, October 3,
                // 2017, DULUTH, MN 55802" carry no time at all.
                warn!(line, "could not parse date for tracking detail");
            }
        }
    }

    HistoryEntry::new(timestamp, code, line)
}

/// Pure text-to-timestamp helper for the free-text heuristics; a miss is a
/// normal absent outcome.
fn parse_heuristic_datetime(text: &str, format: &str) -> Option<EventTimestamp> {
    let naive = NaiveDateTime::parse_from_str(text, format).ok()?;
    Some(EventTimestamp::from_local(naive, fallback_offset()))
}
