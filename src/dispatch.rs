//! Run several reservation requests with bounded concurrency.

use crate::driver::SessionFactory;
use crate::reservation::{ReservationOutcome, ReservationRequest, ReservationWorkflow};
use futures::stream::{self, StreamExt};
use log::info;

/// Outcomes come back in request order. Each request gets its own browser session.
pub async fn reserve_all<F: SessionFactory>(
    workflow: &ReservationWorkflow,
    sessions: &F,
    requests: &[ReservationRequest],
    concurrency: usize,
) -> Vec<ReservationOutcome> {
    let limit = concurrency.max(1);
    info!("Dispatching {} reservation requests, {} at a time", requests.len(), limit);

    stream::iter(requests)
        .map(|request| workflow.run(sessions, request))
        .buffered(limit)
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fixture::{FixtureDriver, FixtureSessions};
    use crate::reservation::{Contact, ReservationConfig};
    use crate::time_parser;
    use chrono::NaiveDate;

    fn request(restaurant_id: &str, party_size: u32) -> ReservationRequest {
        ReservationRequest {
            restaurant_id: restaurant_id.to_string(),
            date: NaiveDate::from_ymd_opt(2099, 5, 23).unwrap(),
            time: time_parser::parse("7:00 pm").unwrap(),
            party_size,
            contact: Contact {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                phone: "5551234567".to_string(),
                email: "ada@example.com".to_string(),
            },
            special_requests: None,
        }
    }

    #[tokio::test]
    async fn test_outcomes_keep_request_order() {
        let workflow = ReservationWorkflow::new(ReservationConfig::default());
        let sessions = FixtureSessions::new(FixtureDriver::new);
        let requests = vec![request("a", 2), request("b", 0), request("c", 4)];

        let outcomes = reserve_all(&workflow, &sessions, &requests, 2).await;

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], ReservationOutcome::Failed { .. }));
        assert_eq!(
            outcomes[1],
            ReservationOutcome::ConstraintViolation {
                reason: "Party size is not in allowed range.".to_string()
            }
        );
        assert!(matches!(outcomes[2], ReservationOutcome::Failed { .. }));
        // the invalid request never opens a session
        assert_eq!(sessions.opened().len(), 2);
        assert!(sessions.opened().iter().all(FixtureDriver::is_closed));
    }
}
