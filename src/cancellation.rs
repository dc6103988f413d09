//! Cancel an existing reservation from its confirmation page.

use crate::config::{Config, TimeoutConfig};
use crate::driver::{supervise, PageDriver, SessionFactory};
use crate::site::CancellationProfile;
use crate::workflow::{on_timeout, RunLog, StageTracker, WorkflowError};
use log::{error, info};
use scopeguard::defer;
use serde::Serialize;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CancellationOutcome {
    Cancelled,
    Failed { reason: String },
}

impl CancellationOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        CancellationOutcome::Failed { reason: reason.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CancellationOutcome::Cancelled)
    }
}

impl From<WorkflowError> for CancellationOutcome {
    fn from(e: WorkflowError) -> Self {
        CancellationOutcome::failed(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationStage {
    Init,
    PageLoaded,
    /// Number of confirm buttons clicked so far
    ConfirmClicked(usize),
    Cancelled,
}

pub struct CancellationWorkflow {
    profile: CancellationProfile,
    timeouts: TimeoutConfig,
}

impl CancellationWorkflow {
    pub fn new(profile: CancellationProfile, timeouts: TimeoutConfig) -> Self {
        Self { profile, timeouts }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.sites.cancellation.cancellation_profile(), config.timeouts.clone())
    }

    pub async fn run<F: SessionFactory>(&self, sessions: &F, reservation_url: &str) -> CancellationOutcome {
        let run = RunLog::new("cancel");
        defer! {
            info!("[{}] Total cancellation process time: {:.4} seconds", run.id(), run.elapsed_secs());
        }

        let url = match Url::parse(reservation_url) {
            Ok(url) => url,
            Err(e) => {
                error!("[{}] Invalid reservation URL '{}': {}", run.id(), reservation_url, e);
                return CancellationOutcome::failed(format!("Invalid reservation URL: {}", e));
            }
        };

        let driver = match sessions.open().await {
            Ok(driver) => driver,
            Err(e) => {
                error!("[{}] WebDriver initialization failed: {:#}", run.id(), e);
                return CancellationOutcome::failed(format!("WebDriver error: {:#}", e));
            }
        };

        match supervise(&driver, run.id(), self.drive(&driver, &url, &run)).await {
            Ok(outcome) => outcome,
            Err(panic) => {
                error!("[{}] Cancellation aborted: {}", run.id(), panic);
                WorkflowError::Unexpected(panic).into()
            }
        }
    }

    async fn drive<D: PageDriver>(&self, driver: &D, url: &Url, run: &RunLog) -> CancellationOutcome {
        let mut progress = StageTracker::new(run, CancellationStage::Init);
        match self.steps(driver, url, run, &mut progress).await {
            Ok(()) => {
                info!("[{}] Reservation canceled successfully.", run.id());
                CancellationOutcome::Cancelled
            }
            Err(e) => {
                error!("[{}] Cancellation stopped after {:?}: {}", run.id(), progress.stage(), e);
                e.into()
            }
        }
    }

    async fn steps<D: PageDriver>(
        &self,
        driver: &D,
        url: &Url,
        run: &RunLog,
        progress: &mut StageTracker<CancellationStage>,
    ) -> Result<(), WorkflowError> {
        info!("[{}] Navigating to reservation: {}", run.id(), url);
        driver
            .navigate(url.as_str())
            .await
            .map_err(|e| WorkflowError::Navigation(format!("WebDriver error: {}", e)))?;
        progress.advance(CancellationStage::PageLoaded);

        for (clicked, step) in self.profile.steps.iter().enumerate() {
            let button = driver
                .wait_until_clickable(&step.selector, self.timeouts.element())
                .await
                .map_err(on_timeout(&step.missing_reason))?;
            driver.click(&button).await?;
            progress.advance(CancellationStage::ConfirmClicked(clicked + 1));
        }

        driver
            .wait_until_present(&self.profile.confirmation, self.timeouts.confirmation())
            .await
            .map_err(on_timeout(&self.profile.missing_confirmation_reason))?;
        progress.advance(CancellationStage::Cancelled);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fixture::{DriverCall, FixtureDriver, FixtureNode, FixtureSessions};
    use crate::site::Site;
    use pretty_assertions::assert_eq;

    const URL: &str = "https://www.yelp.com/reservations/mikiya/confirmed/abc123";

    fn yelp_page() -> FixtureDriver {
        let profile = CancellationProfile::yelp();
        let confirm = FixtureNode::new("Cancel reservation")
            .reveals(&profile.confirmation, FixtureNode::new("Your reservation has been canceled!"));
        FixtureDriver::new().with(
            &profile.steps[0].selector,
            FixtureNode::new("Cancel").reveals(&profile.steps[1].selector, confirm),
        )
    }

    fn workflow(site: Site) -> CancellationWorkflow {
        CancellationWorkflow::new(site.cancellation_profile(), TimeoutConfig::default())
    }

    #[tokio::test]
    async fn test_yelp_cancellation_clicks_both_confirmations() {
        let sessions = FixtureSessions::new(yelp_page);
        let outcome = workflow(Site::Yelp).run(&sessions, URL).await;

        assert_eq!(outcome, CancellationOutcome::Cancelled);
        let page = &sessions.opened()[0];
        assert_eq!(page.clicks().len(), 2);
        assert_eq!(page.calls().first(), Some(&DriverCall::Navigate(URL.to_string())));
        assert!(page.is_closed());
    }

    #[tokio::test]
    async fn test_missing_cancel_button() {
        let sessions = FixtureSessions::new(FixtureDriver::new);
        let outcome = workflow(Site::Yelp).run(&sessions, URL).await;

        assert_eq!(outcome, CancellationOutcome::failed("Cancel button did not appear."));
        assert!(sessions.opened()[0].is_closed());
    }

    #[tokio::test]
    async fn test_missing_confirmation_message() {
        let profile = CancellationProfile::yelp();
        let sessions = FixtureSessions::new(move || {
            FixtureDriver::new().with(
                &profile.steps[0].selector,
                FixtureNode::new("Cancel")
                    .reveals(&profile.steps[1].selector, FixtureNode::new("Cancel reservation")),
            )
        });
        let outcome = workflow(Site::Yelp).run(&sessions, URL).await;

        assert_eq!(outcome, CancellationOutcome::failed("Cancel reservation message did not appear."));
    }

    #[tokio::test]
    async fn test_opentable_single_step() {
        let profile = CancellationProfile::opentable();
        let page = FixtureDriver::new().with(
            &profile.steps[0].selector,
            FixtureNode::new("Cancel reservation")
                .reveals(&profile.confirmation, FixtureNode::new("Noodle Bar has canceled your reservation")),
        );
        let sessions = FixtureSessions::shared(page.clone());
        let outcome = workflow(Site::OpenTable)
            .run(&sessions, "https://www.opentable.com/book/view?rid=1&confnumber=2")
            .await;

        assert!(outcome.is_success());
        assert_eq!(page.clicks().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_url_never_opens_a_session() {
        let sessions = FixtureSessions::new(FixtureDriver::new);
        let outcome = workflow(Site::Yelp).run(&sessions, "not a url").await;

        assert!(matches!(outcome, CancellationOutcome::Failed { .. }));
        assert!(sessions.opened().is_empty());
    }

    #[tokio::test]
    async fn test_session_start_failure() {
        let sessions = FixtureSessions::failing("chrome not installed");
        let outcome = workflow(Site::Yelp).run(&sessions, URL).await;

        assert_eq!(outcome, CancellationOutcome::failed("WebDriver error: chrome not installed"));
    }
}
