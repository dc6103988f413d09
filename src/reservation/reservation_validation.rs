//! Checks run on a reservation request before and while the page is open.

use super::ReservationRequest;
use crate::site::{render_template, SiteProfile};
use crate::workflow::WorkflowError;
use chrono::{Datelike, NaiveDateTime};
use log::{error, info};
use regex::Regex;
use url::Url;

/// Reject requests that can never succeed, before any browser work
pub fn validate_request(request: &ReservationRequest, now: NaiveDateTime) -> Result<(), WorkflowError> {
    if request.restaurant_id.trim().is_empty() {
        return Err(WorkflowError::ConstraintViolation("Restaurant id cannot be empty".to_string()));
    }

    if request.party_size == 0 {
        error!("Party size is invalid.");
        return Err(WorkflowError::ConstraintViolation(
            "Party size is not in allowed range.".to_string(),
        ));
    }

    let requested = request.date.and_time(request.time.into());
    if requested <= now {
        error!("Invalid reservation: {} is not in the future.", requested);
        return Err(WorkflowError::ConstraintViolation(
            "Invalid reservation: Date and time is in the past.".to_string(),
        ));
    }

    info!("Valid reservation date and time.");
    Ok(())
}

/// The date as the date picker shows it, e.g. "May 23"
pub fn displayed_date_label(date: chrono::NaiveDate) -> String {
    format!("{} {}", date.format("%b"), date.day())
}

/// Whether the date picker's value shows `date`
pub fn date_matches(picker_value: &str, date: chrono::NaiveDate) -> bool {
    let pattern = format!(r"\b{}\b", regex::escape(&displayed_date_label(date)));
    Regex::new(&pattern).map(|re| re.is_match(picker_value)).unwrap_or(false)
}

pub fn availability_url(
    profile: &SiteProfile,
    request: &ReservationRequest,
) -> Result<Url, WorkflowError> {
    build_url(&profile.availability_url, request)
}

pub fn checkout_url(profile: &SiteProfile, request: &ReservationRequest) -> Result<Url, WorkflowError> {
    build_url(&profile.checkout_url, request)
}

fn build_url(template: &str, request: &ReservationRequest) -> Result<Url, WorkflowError> {
    let date = request.date.format("%Y-%m-%d").to_string();
    let party = request.party_size.to_string();
    let rendered = render_template(
        template,
        &[
            ("restaurant", request.restaurant_id.as_str()),
            ("date", &date),
            ("time", &request.time.to_hhmm()),
            ("party", &party),
        ],
    );
    Url::parse(&rendered)
        .map_err(|e| WorkflowError::Navigation(format!("Invalid reservation URL '{}': {}", rendered, e)))
}
