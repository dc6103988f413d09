//! Reservation requests, outcomes and the booking workflow.

use crate::config::TimeoutConfig;
use crate::site::SiteProfile;
use crate::slots::SlotDescriptor;
use crate::time_parser::TimeOfDay;
use crate::workflow::WorkflowError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

mod reservation_validation;
mod reservation_workflow;

pub use reservation_validation::*;
pub use reservation_workflow::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub restaurant_id: String,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub party_size: u32,
    pub contact: Contact,
    pub special_requests: Option<String>,
}

/// How far a run goes once a slot is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingMode {
    /// Report availability without clicking anything
    CheckOnly,
    /// Book only the exact requested time
    Book,
    /// Book the exact time, or else the closest alternative
    BookNearest,
    /// Skip slot search and open the checkout page for the requested time directly
    Checkout,
}

impl Default for BookingMode {
    fn default() -> Self {
        BookingMode::CheckOnly
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReservationConfig {
    pub mode: BookingMode,
    pub timeouts: TimeoutConfig,
    pub profile: SiteProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReservationOutcome {
    Booked { confirmation_url: String },
    /// The exact time is bookable; only produced in check-only mode
    Available { slot: SlotDescriptor },
    SlotUnavailable { alternatives: (Option<SlotDescriptor>, Option<SlotDescriptor>) },
    ConstraintViolation { reason: String },
    ValidationFailed { reason: String },
    Failed { reason: String },
}

impl ReservationOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        ReservationOutcome::Failed { reason: reason.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ReservationOutcome::Booked { .. } | ReservationOutcome::Available { .. })
    }

    /// Human-readable list of alternatives, e.g. "10 PM or 11:30 PM"
    pub fn alternatives_summary(&self) -> Option<String> {
        let ReservationOutcome::SlotUnavailable { alternatives: (left, right) } = self else {
            return None;
        };
        let labels: Vec<String> = [left, right]
            .into_iter()
            .flatten()
            .map(|slot| match slot.time {
                Some(time) => time.to_short_label(),
                None => slot.label.to_uppercase(),
            })
            .collect();

        if labels.is_empty() {
            Some("No alternative times available".to_string())
        } else {
            Some(labels.join(" or "))
        }
    }
}

impl From<WorkflowError> for ReservationOutcome {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::ConstraintViolation(reason) => {
                ReservationOutcome::ConstraintViolation { reason }
            }
            e @ WorkflowError::ValidationFailed(_) => {
                ReservationOutcome::ValidationFailed { reason: e.to_string() }
            }
            other => ReservationOutcome::failed(other.to_string()),
        }
    }
}
