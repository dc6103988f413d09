pub mod cancellation;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod reservation;
pub mod site;
pub mod slots;
pub mod time_parser;
pub mod workflow;

use anyhow::{anyhow, Result};
use chrono::{Local, Utc};
use chrono_tz::Tz;
use config::LoggingConfig;
use env_logger::Env;
use std::io::Write;

/// Install the global logger. `RUST_LOG` wins over the configured level.
pub fn init_logger(logging: &LoggingConfig) -> Result<()> {
    let zone = log_timezone(logging)?;
    env_logger::Builder::from_env(Env::default().default_filter_or(logging.level.as_str()))
        .format(move |buf, record| {
            let stamp = match zone {
                Some(tz) => Utc::now().with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string(),
                None => Local::now().format("%Y-%m-%d %H:%M:%S %Z").to_string(),
            };
            writeln!(buf, "{} {}: {}", stamp, record.level(), record.args())
        })
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))
}

fn log_timezone(logging: &LoggingConfig) -> Result<Option<Tz>> {
    match logging.timezone.as_deref() {
        None => Ok(None),
        Some(name) => name
            .parse::<Tz>()
            .map(Some)
            .map_err(|e| anyhow!("Unknown log timezone '{}': {}", name, e)),
    }
}

// Re-export commonly used types
pub use cancellation::{CancellationOutcome, CancellationWorkflow};
pub use config::Config;
pub use dispatch::reserve_all;
pub use driver::{ElementRef, PageDriver, SessionFactory};
pub use reservation::{
    BookingMode, Contact, ReservationConfig, ReservationOutcome, ReservationRequest,
    ReservationWorkflow,
};
pub use site::{Site, SiteProfile};
pub use time_parser::TimeOfDay;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_timezone() {
        let mut logging = LoggingConfig::default();
        assert_eq!(log_timezone(&logging).unwrap(), None);

        logging.timezone = Some("America/Mexico_City".to_string());
        assert_eq!(log_timezone(&logging).unwrap(), Some(chrono_tz::America::Mexico_City));

        logging.timezone = Some("Mars/Olympus_Mons".to_string());
        assert!(log_timezone(&logging).is_err());
    }
}
