//! Delivery status classification.
//!
//! Carriers describe shipment progress through dozens of event codes; callers
//! only care about three outcomes. Each adapter owns two closed tables of
//! carrier-documented codes (successful delivery and failed delivery), and the
//! most recent tracking event decides the status of the whole shipment.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shipment::HistoryEntry;

/// The normalized delivery state of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// The shipment is still moving, or its latest event code is not in
    /// either terminal table.
    InProgress,
    /// Confirmed delivered or picked up.
    Complete,
    /// Returned to sender, refused, undeliverable, or lost.
    Failed,
}

impl DeliveryStatus {
    /// Returns a stable lowercase name for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` if the shipment is done moving, for better or worse.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classifies one carrier event code against a carrier's terminal code tables.
///
/// A code in neither table means the shipment is still in transit as far as
/// the carrier has said, so the fall-through is [`DeliveryStatus::InProgress`].
pub fn classify_event_code(
    code: &str,
    success_codes: &[&str],
    failed_codes: &[&str],
) -> DeliveryStatus {
    if success_codes.contains(&code) {
        DeliveryStatus::Complete
    } else if failed_codes.contains(&code) {
        DeliveryStatus::Failed
    } else {
        DeliveryStatus::InProgress
    }
}

/// Derives a shipment's status from the most recent entry of its history.
///
/// The history must already be in chronological ascending order; only the last
/// entry is consulted. Returns `None` for an empty history: with no events
/// there is nothing to derive a status from.
pub fn classify_last_entry(
    history: &[HistoryEntry],
    success_codes: &[&str],
    failed_codes: &[&str],
) -> Option<DeliveryStatus> {
    history
        .last()
        .map(|entry| classify_event_code(&entry.code, success_codes, failed_codes))
}
