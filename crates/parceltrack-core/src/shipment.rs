//! Shipment lookup results and tracking history.
//!
//! [`Shipment`] is the uniform answer every carrier adapter produces,
//! whatever protocol or vocabulary the carrier itself uses. [`HistoryEntry`]
//! is one normalized tracking event; carriers variously call these
//! occurrences, activities, or details.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::status::DeliveryStatus;
use crate::time::EventTimestamp;

/// One normalized tracking event.
///
/// Entries are plain values with no identity beyond their fields; two entries
/// with the same fields are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the event happened, if the carrier supplied a parseable date.
    pub timestamp: Option<EventTimestamp>,
    /// Carrier-specific event identifier, or a descriptive phrase for
    /// carriers with no code vocabulary.
    pub code: String,
    /// Human-readable event text.
    pub description: String,
}

impl HistoryEntry {
    /// Creates a new history entry.
    pub fn new(
        timestamp: Option<EventTimestamp>,
        code: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            code: code.into(),
            description: description.into(),
        }
    }
}

/// The unified result of one tracking lookup.
///
/// A lookup that the carrier rejected (or that never reached the carrier) is
/// still a `Shipment`, with `lookup_succeeded` false and the explanation in
/// `lookup_result`; callers never see a raised error for carrier or transport
/// failures.
///
/// Invariants:
/// - `lookup_result` is populated exactly when the lookup failed.
/// - `history` is in chronological ascending order, oldest event first,
///   regardless of the order the carrier returned it in.
/// - `delivery_status` is derived from the most recent history entry and is
///   absent when the history is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    /// Did the carrier accept and resolve the tracking code.
    pub lookup_succeeded: bool,
    /// Free text explaining the failure; `None` on success.
    pub lookup_result: Option<String>,
    /// Tri-state classification of the most recent event.
    pub delivery_status: Option<DeliveryStatus>,
    /// Carrier's expected delivery date, where supplied.
    pub expected_delivery_date: Option<NaiveDate>,
    /// Tracking events, oldest first.
    pub history: Vec<HistoryEntry>,
}

impl Shipment {
    /// A failed lookup carrying the carrier's (or transport's) explanation.
    pub fn lookup_failure(reason: impl Into<String>) -> Self {
        Self {
            lookup_succeeded: false,
            lookup_result: Some(reason.into()),
            delivery_status: None,
            expected_delivery_date: None,
            history: Vec::new(),
        }
    }

    /// A successful lookup with chronological history and its derived status.
    pub fn lookup_success(
        history: Vec<HistoryEntry>,
        delivery_status: Option<DeliveryStatus>,
    ) -> Self {
        Self {
            lookup_succeeded: true,
            lookup_result: None,
            delivery_status,
            expected_delivery_date: None,
            history,
        }
    }

    /// Builder method to set the expected delivery date.
    pub fn with_expected_delivery_date(mut self, date: NaiveDate) -> Self {
        self.expected_delivery_date = Some(date);
        self
    }

    /// Returns the most recent tracking event, if any.
    pub fn latest_event(&self) -> Option<&HistoryEntry> {
        self.history.last()
    }

    /// Returns `true` if the shipment has been confirmed delivered.
    pub fn is_delivered(&self) -> bool {
        self.delivery_status == Some(DeliveryStatus::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_history() -> Vec<HistoryEntry> {
        vec![
            HistoryEntry::new(None, "0100", "Item accepted at origin"),
            HistoryEntry::new(None, "1421", "Delivered to front door"),
        ]
    }

    #[test]
    fn failure_carries_reason() {
        let shipment = Shipment::lookup_failure("No Pin History");

        assert!(!shipment.lookup_succeeded);
        assert_eq!(shipment.lookup_result.as_deref(), Some("No Pin History"));
        assert!(shipment.delivery_status.is_none());
        assert!(shipment.history.is_empty());
    }

    #[test]
    fn success_has_no_failure_text() {
        let shipment =
            Shipment::lookup_success(sample_history(), Some(DeliveryStatus::Complete));

        assert!(shipment.lookup_succeeded);
        assert!(shipment.lookup_result.is_none());
        assert!(shipment.is_delivered());
        assert_eq!(shipment.latest_event().unwrap().code, "1421");
    }

    #[test]
    fn expected_delivery_date_builder() {
        let date = NaiveDate::from_ymd_opt(2017, 9, 5).unwrap();
        let shipment = Shipment::lookup_success(Vec::new(), None)
            .with_expected_delivery_date(date);

        assert_eq!(shipment.expected_delivery_date, Some(date));
    }

    #[test]
    fn entries_compare_by_fields() {
        let a = HistoryEntry::new(None, "KB", "Delivered");
        let b = HistoryEntry::new(None, "KB", "Delivered");
        assert_eq!(a, b);
    }

    #[test]
    fn serde_roundtrip() {
        let shipment = Shipment::lookup_success(sample_history(), Some(DeliveryStatus::Complete))
            .with_expected_delivery_date(NaiveDate::from_ymd_opt(2017, 9, 5).unwrap());

        let json = serde_json::to_string(&shipment).unwrap();
        let parsed: Shipment = serde_json::from_str(&json).unwrap();
        assert_eq!(shipment, parsed);
    }
}
