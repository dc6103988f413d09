//! End-to-end booking against a `PageDriver`.
//
// Init -> PageLoaded -> ConstraintsValidated -> SlotResolved -> FormFilled -> Submitted.
// Each step either advances or stops the run with a `WorkflowError`; the session is closed
// on every path by `supervise`.

use super::{
    availability_url, checkout_url, date_matches, displayed_date_label, validate_request,
    BookingMode, ReservationConfig, ReservationOutcome, ReservationRequest,
};
use crate::driver::{supervise, DriverError, ElementRef, PageDriver, SessionFactory};
use crate::slots::{select_slot, SlotDescriptor, SlotSelection};
use crate::workflow::{on_timeout, RunLog, StageTracker, WorkflowError};
use chrono::{Local, NaiveDateTime};
use log::{error, info, warn};
use scopeguard::defer;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStage {
    Init,
    PageLoaded,
    ConstraintsValidated,
    SlotResolved,
    FormFilled,
    Submitted,
}

/// What slot resolution decided
enum Resolution {
    Book(SlotDescriptor),
    Done(ReservationOutcome),
}

pub struct ReservationWorkflow {
    config: ReservationConfig,
}

impl ReservationWorkflow {
    pub fn new(config: ReservationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReservationConfig {
        &self.config
    }

    pub async fn run<F: SessionFactory>(
        &self,
        sessions: &F,
        request: &ReservationRequest,
    ) -> ReservationOutcome {
        self.run_at(sessions, request, Local::now().naive_local()).await
    }

    /// Like `run`, validating the request against `now` instead of the wall clock
    pub async fn run_at<F: SessionFactory>(
        &self,
        sessions: &F,
        request: &ReservationRequest,
        now: NaiveDateTime,
    ) -> ReservationOutcome {
        let run = RunLog::new("reserve");
        defer! {
            info!("[{}] Total reservation process time: {:.4} seconds", run.id(), run.elapsed_secs());
        }

        if let Err(e) = validate_request(request, now) {
            warn!("[{}] Request rejected: {}", run.id(), e);
            return e.into();
        }

        info!(
            "[{}] Attempting reservation at {}: date {}, time {}, party of {}, mode {:?}",
            run.id(),
            request.restaurant_id,
            request.date,
            request.time,
            request.party_size,
            self.config.mode
        );

        let driver = match sessions.open().await {
            Ok(driver) => driver,
            Err(e) => {
                error!("[{}] WebDriver initialization failed: {:#}", run.id(), e);
                return ReservationOutcome::failed(format!("WebDriver error: {:#}", e));
            }
        };

        match supervise(&driver, run.id(), self.drive(&driver, request, &run)).await {
            Ok(outcome) => outcome,
            Err(panic) => {
                error!("[{}] Reservation aborted: {}", run.id(), panic);
                WorkflowError::Unexpected(panic).into()
            }
        }
    }

    async fn drive<D: PageDriver>(
        &self,
        driver: &D,
        request: &ReservationRequest,
        run: &RunLog,
    ) -> ReservationOutcome {
        let mut progress = StageTracker::new(run, ReservationStage::Init);
        match self.steps(driver, request, run, &mut progress).await {
            Ok(outcome) => {
                info!("[{}] Reservation finished: {:?}", run.id(), outcome);
                outcome
            }
            Err(e) => {
                error!("[{}] Reservation stopped after {:?}: {}", run.id(), progress.stage(), e);
                e.into()
            }
        }
    }

    async fn steps<D: PageDriver>(
        &self,
        driver: &D,
        request: &ReservationRequest,
        run: &RunLog,
        progress: &mut StageTracker<ReservationStage>,
    ) -> Result<ReservationOutcome, WorkflowError> {
        if self.config.mode == BookingMode::Checkout {
            self.load_checkout_page(driver, request, run).await?;
            progress.advance(ReservationStage::PageLoaded);
            progress.advance(ReservationStage::SlotResolved);
            return self.complete_booking(driver, request, run, progress).await;
        }

        self.load_availability_page(driver, request, run).await?;
        progress.advance(ReservationStage::PageLoaded);

        self.validate_constraints(driver, request, run).await?;
        progress.advance(ReservationStage::ConstraintsValidated);

        let slot = match self.resolve_slot(driver, request, run).await? {
            Resolution::Book(slot) => slot,
            Resolution::Done(outcome) => return Ok(outcome),
        };
        progress.advance(ReservationStage::SlotResolved);

        let element = slot.element.clone().ok_or_else(|| {
            WorkflowError::Unexpected(format!("Slot '{}' has no element to click", slot.label))
        })?;
        let start = Instant::now();
        driver.click(&element).await?;
        info!(
            "[{}] Clicked time button '{}' in {:.4} seconds",
            run.id(),
            slot.label,
            start.elapsed().as_secs_f64()
        );

        self.complete_booking(driver, request, run, progress).await
    }

    async fn load_availability_page<D: PageDriver>(
        &self,
        driver: &D,
        request: &ReservationRequest,
        run: &RunLog,
    ) -> Result<(), WorkflowError> {
        let profile = &self.config.profile;
        let url = availability_url(profile, request)?;
        info!("[{}] Navigating to reservation link: {}", run.id(), url);

        let start = Instant::now();
        driver
            .navigate(url.as_str())
            .await
            .map_err(|e| WorkflowError::Navigation(format!("WebDriver error: {}", e)))?;

        let found = driver
            .wait_for_any(
                &[profile.date_input.as_str(), profile.error_banner.as_str()],
                self.config.timeouts.page_load(),
            )
            .await
            .map_err(|e| navigation_timeout(e, "Reservation page did not load properly."))?;
        info!("[{}] Reservation page loaded in {:.4} seconds", run.id(), start.elapsed().as_secs_f64());

        if found == 1 {
            return Err(WorkflowError::Rejected(self.banner_text(driver).await?));
        }
        Ok(())
    }

    async fn load_checkout_page<D: PageDriver>(
        &self,
        driver: &D,
        request: &ReservationRequest,
        run: &RunLog,
    ) -> Result<(), WorkflowError> {
        let profile = &self.config.profile;
        let url = checkout_url(profile, request)?;
        info!("[{}] Navigating to checkout URL: {}", run.id(), url);

        let start = Instant::now();
        driver
            .navigate(url.as_str())
            .await
            .map_err(|e| WorkflowError::Navigation(format!("WebDriver error: {}", e)))?;

        let found = driver
            .wait_for_any(
                &[profile.error_banner.as_str(), profile.checkout_heading.as_str()],
                self.config.timeouts.page_load(),
            )
            .await
            .map_err(|e| navigation_timeout(e, "Checkout page did not load properly."))?;
        info!("[{}] Checkout page loaded in {:.4} seconds", run.id(), start.elapsed().as_secs_f64());

        if found == 0 {
            let text = self.banner_text(driver).await?;
            error!("[{}] Checkout error detected: {}", run.id(), text);
            return Err(WorkflowError::Rejected(text));
        }
        Ok(())
    }

    async fn validate_constraints<D: PageDriver>(
        &self,
        driver: &D,
        request: &ReservationRequest,
        run: &RunLog,
    ) -> Result<(), WorkflowError> {
        let profile = &self.config.profile;

        let date_input = driver
            .wait_until_present(&profile.date_input, self.config.timeouts.element())
            .await
            .map_err(on_timeout("Timeout: Date input field was not found within the given time."))?;
        let shown = driver.attribute(&date_input, "value").await?.unwrap_or_default();
        let expected = displayed_date_label(request.date);
        if !date_matches(&shown, request.date) {
            error!("[{}] Reservation date {} is not in allowed range (page shows '{}').", run.id(), expected, shown);
            return Err(WorkflowError::ConstraintViolation(format!(
                "Reservation date {} is not in allowed range.",
                expected
            )));
        }
        info!("[{}] Reservation date {} is in allowed range.", run.id(), expected);

        let option = profile.party_option_for(request.party_size);
        if driver.find_all(&option).await?.is_empty() {
            error!("[{}] The party size {} is bigger than maximum.", run.id(), request.party_size);
            return Err(WorkflowError::ConstraintViolation(
                "The party size is bigger than maximum.".to_string(),
            ));
        }
        info!("[{}] The party size {} is in allowed range.", run.id(), request.party_size);

        Ok(())
    }

    async fn resolve_slot<D: PageDriver>(
        &self,
        driver: &D,
        request: &ReservationRequest,
        run: &RunLog,
    ) -> Result<Resolution, WorkflowError> {
        let profile = &self.config.profile;

        let start = Instant::now();
        let found = driver
            .wait_for_any(
                &[profile.slot_buttons.as_str(), profile.no_availability.as_str()],
                self.config.timeouts.element(),
            )
            .await
            .map_err(on_timeout("Time slot elements did not appear."))?;
        if found == 1 {
            info!("[{}] Page reports no availability.", run.id());
            return Err(WorkflowError::NoAvailability);
        }
        info!("[{}] Time slot elements became visible in {:.4} seconds", run.id(), start.elapsed().as_secs_f64());

        let slots = self.snapshot_slots(driver, run).await?;
        let selection = select_slot(&slots, request.time, profile.pivot_index);
        let nearest = match self.config.mode {
            BookingMode::BookNearest => selection.closest_alternative(request.time).cloned(),
            _ => None,
        };

        match selection {
            SlotSelection::Exact(slot) if self.config.mode == BookingMode::CheckOnly => {
                info!("[{}] Exact time {} available; not booking in check-only mode.", run.id(), slot.label);
                Ok(Resolution::Done(ReservationOutcome::Available { slot }))
            }
            SlotSelection::Exact(slot) => Ok(Resolution::Book(slot)),
            SlotSelection::Alternatives { left, right } if nearest.is_none() => {
                let outcome = ReservationOutcome::SlotUnavailable { alternatives: (left, right) };
                info!(
                    "[{}] Alternative times: {}",
                    run.id(),
                    outcome.alternatives_summary().unwrap_or_default()
                );
                Ok(Resolution::Done(outcome))
            }
            SlotSelection::Alternatives { .. } => {
                let slot = nearest.ok_or(WorkflowError::NoAvailability)?;
                info!("[{}] Booking nearest alternative {} instead of {}", run.id(), slot.label, request.time);
                Ok(Resolution::Book(slot))
            }
            SlotSelection::NoAvailability => Err(WorkflowError::NoAvailability),
        }
    }

    async fn snapshot_slots<D: PageDriver>(
        &self,
        driver: &D,
        run: &RunLog,
    ) -> Result<Vec<SlotDescriptor>, WorkflowError> {
        let buttons = driver.find_all(&self.config.profile.slot_buttons).await?;
        let mut slots = Vec::with_capacity(buttons.len());
        for (index, button) in buttons.into_iter().enumerate() {
            let text = driver.text(&button).await?;
            let available = !driver.is_disabled(&button).await?;
            info!("[{}] Button {}: time_text='{}', available={}", run.id(), index + 1, text.trim(), available);
            slots.push(SlotDescriptor::new(text.trim(), available, index).with_element(button));
        }
        Ok(slots)
    }

    async fn complete_booking<D: PageDriver>(
        &self,
        driver: &D,
        request: &ReservationRequest,
        run: &RunLog,
        progress: &mut StageTracker<ReservationStage>,
    ) -> Result<ReservationOutcome, WorkflowError> {
        let profile = &self.config.profile;
        let timeouts = &self.config.timeouts;

        let start = Instant::now();
        driver
            .wait_until_present(&profile.form_heading, timeouts.element())
            .await
            .map_err(on_timeout("Reservation form did not load in time."))?;
        info!("[{}] Reservation form loaded in {:.4} seconds", run.id(), start.elapsed().as_secs_f64());

        let mut errors = self.fill_contact_form(driver, request, run).await?;
        errors.extend(self.collect_field_errors(driver, run).await?);
        if !errors.is_empty() {
            return Err(WorkflowError::ValidationFailed(errors));
        }

        if let Some(text) = &request.special_requests {
            match driver.find_all(&profile.fields.special_requests).await?.first() {
                Some(field) => {
                    if let Err(e) = driver.type_text(field, text).await {
                        warn!("[{}] Could not fill special requests: {}", run.id(), e);
                    }
                }
                None => warn!("[{}] Special requests field not found; skipping.", run.id()),
            }
        }
        progress.advance(ReservationStage::FormFilled);

        let confirm = driver
            .wait_until_clickable(&profile.confirm_button, timeouts.element())
            .await
            .map_err(on_timeout("Confirm button not clickable in time."))?;
        driver.click(&confirm).await?;
        progress.advance(ReservationStage::Submitted);

        let start = Instant::now();
        driver
            .wait_for_any(
                &[profile.cancel_affordance.as_str(), profile.error_banner.as_str()],
                timeouts.confirmation(),
            )
            .await
            .map_err(on_timeout("timeout waiting for confirmation"))?;
        info!(
            "[{}] Detected confirmation elements (Cancel button or Error) in {:.4} seconds",
            run.id(),
            start.elapsed().as_secs_f64()
        );

        if !driver.find_all(&profile.cancel_affordance).await?.is_empty() {
            let confirmation_url = driver.current_url().await?;
            info!("[{}] Reservation created successfully. Confirmation URL: {}", run.id(), confirmation_url);
            return Ok(ReservationOutcome::Booked { confirmation_url });
        }

        let text = self.banner_text(driver).await?;
        error!("[{}] Error creating reservation: {}", run.id(), text);
        Err(WorkflowError::Rejected(text))
    }

    /// Fill the contact fields; returns the fields that could not be filled.
    ///
    /// With `strict_fields` the first failure stops the run instead.
    async fn fill_contact_form<D: PageDriver>(
        &self,
        driver: &D,
        request: &ReservationRequest,
        run: &RunLog,
    ) -> Result<Vec<String>, WorkflowError> {
        let fields = &self.config.profile.fields;
        let contact = &request.contact;
        let entries = [
            ("first_name", &fields.first_name, &contact.first_name),
            ("last_name", &fields.last_name, &contact.last_name),
            ("mobile_number", &fields.phone, &contact.phone),
            ("email", &fields.email, &contact.email),
        ];

        let mut errors = Vec::new();
        for (name, selector, value) in entries {
            match fill_field(driver, selector, value).await {
                Ok(()) => info!("[{}] Successfully filled {} field.", run.id(), name),
                Err(e) => {
                    let message = match e {
                        DriverError::InvalidState(_) => format!("{} field cannot be modified.", name),
                        DriverError::NotFound(_) => format!("{} field not found.", name),
                        other => format!("Unexpected error in {}: {}", name, other),
                    };
                    error!("[{}] {}", run.id(), message);
                    if self.config.profile.strict_fields {
                        return Err(WorkflowError::ValidationFailed(vec![message]));
                    }
                    errors.push(message);
                }
            }
        }
        Ok(errors)
    }

    /// Validation messages the page shows after the fields were filled
    async fn collect_field_errors<D: PageDriver>(
        &self,
        driver: &D,
        run: &RunLog,
    ) -> Result<Vec<String>, WorkflowError> {
        let mut errors = Vec::new();
        for probe in &self.config.profile.field_errors {
            match driver.wait_until_present(&probe.selector, self.config.timeouts.validation_probe()).await {
                Ok(_) => {
                    for element in driver.find_all(&probe.selector).await? {
                        let text = driver.text(&element).await?;
                        error!("[{}] Validation error for {}: {}", run.id(), probe.field, text.trim());
                        errors.push(format!("{}: {}", probe.field, text.trim()));
                    }
                }
                Err(e) if e.is_timeout() => {}
                Err(e) => warn!("[{}] Could not check validation for {}: {}", run.id(), probe.field, e),
            }
        }
        Ok(errors)
    }

    async fn banner_text<D: PageDriver>(&self, driver: &D) -> Result<String, WorkflowError> {
        let banners = driver.find_all(&self.config.profile.error_banner).await?;
        match banners.first() {
            Some(banner) => Ok(driver.text(banner).await?.trim().to_string()),
            None => Ok("Unknown error occurred.".to_string()),
        }
    }
}

async fn fill_field<D: PageDriver>(driver: &D, selector: &str, value: &str) -> Result<(), DriverError> {
    let field: ElementRef = driver
        .find_all(selector)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| DriverError::NotFound(selector.to_string()))?;
    driver.type_text(&field, value).await
}

fn navigation_timeout(e: DriverError, reason: &str) -> WorkflowError {
    if e.is_timeout() {
        WorkflowError::Navigation(reason.to_string())
    } else {
        WorkflowError::from(e)
    }
}
