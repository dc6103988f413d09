use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, NaiveTime};
use log::info;
use reservist::config::Config;
use reservist::driver::chrome::ChromeSessions;
use reservist::site::Site;
use reservist::time_parser::{self, TimeOfDay};
use reservist::{
    BookingMode, CancellationWorkflow, Contact, ReservationConfig, ReservationRequest,
    ReservationWorkflow,
};
use std::collections::HashMap;
use std::path::Path;

/// Command line arguments structure
#[derive(Debug)]
struct CommandArgs {
    command: String,
    args: Vec<String>,
    flags: HashMap<String, Option<String>>,
}

impl CommandArgs {
    fn parse(mut parts: Vec<String>) -> Result<Self> {
        if parts.is_empty() {
            return Err(anyhow!("No command provided"));
        }

        let command = parts.remove(0);
        let mut args = Vec::new();
        let mut flags = HashMap::new();
        let mut i = 0;

        while i < parts.len() {
            if parts[i].starts_with("--") {
                let flag = parts[i].clone();
                if i + 1 < parts.len() && !parts[i + 1].starts_with("--") {
                    flags.insert(flag, Some(parts[i + 1].clone()));
                    i += 1;
                } else {
                    flags.insert(flag, None);
                }
            } else {
                args.push(parts[i].clone());
            }
            i += 1;
        }

        Ok(CommandArgs { command, args, flags })
    }

    fn flag(&self, name: &str) -> Option<&str> {
        self.flags.get(name).and_then(|v| v.as_deref())
    }

    fn required_flag(&self, name: &str) -> Result<String> {
        self.flag(name).map(str::to_string).ok_or_else(|| anyhow!("Missing required flag {}", name))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = CommandArgs::parse(std::env::args().skip(1).collect())?;
    if args.command == "help" {
        print_help();
        return Ok(());
    }

    let mut config = match args.flag("--config") {
        Some(path) => Config::load_from(Path::new(path))?,
        None => Config::load()?,
    };
    config.apply_env_overrides();
    reservist::init_logger(&config.logging)?;
    info!("Starting reservist {}", env!("CARGO_PKG_VERSION"));

    let success = match args.command.as_str() {
        "reserve" => reserve(&config, &args).await?,
        "cancel" => cancel(&config, &args).await?,
        other => {
            print_help();
            bail!("Unknown command '{}'", other);
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

async fn reserve(config: &Config, args: &CommandArgs) -> Result<bool> {
    let [restaurant_id, date, time, party] = args.args.as_slice() else {
        bail!("Usage: reserve <restaurant> <YYYY-MM-DD> <time> <party-size> --first <name> --last <name> --phone <number> --email <address>");
    };

    let request = ReservationRequest {
        restaurant_id: restaurant_id.clone(),
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", date))?,
        time: parse_time(time)?,
        party_size: party.parse().with_context(|| format!("Invalid party size '{}'", party))?,
        contact: Contact {
            first_name: args.required_flag("--first")?,
            last_name: args.required_flag("--last")?,
            phone: args.required_flag("--phone")?,
            email: args.required_flag("--email")?,
        },
        special_requests: args.flag("--requests").map(str::to_string),
    };

    let mode = match args.flag("--mode").unwrap_or("check") {
        "check" => BookingMode::CheckOnly,
        "book" => BookingMode::Book,
        "nearest" => BookingMode::BookNearest,
        "checkout" => BookingMode::Checkout,
        other => bail!("Unknown mode '{}', expected check, book, nearest or checkout", other),
    };

    let workflow = ReservationWorkflow::new(ReservationConfig {
        mode,
        timeouts: config.timeouts.clone(),
        profile: config.sites.reservation.clone(),
    });
    let outcome = workflow.run(&ChromeSessions::new(config), &request).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if let Some(summary) = outcome.alternatives_summary() {
        println!("Alternatives: {}", summary);
    }
    Ok(outcome.is_success())
}

async fn cancel(config: &Config, args: &CommandArgs) -> Result<bool> {
    let [url] = args.args.as_slice() else {
        bail!("Usage: cancel <reservation-url> [--site yelp|opentable]");
    };

    let site = match args.flag("--site") {
        None => config.sites.cancellation,
        Some("yelp") => Site::Yelp,
        Some("opentable") => Site::OpenTable,
        Some(other) => bail!("Unknown site '{}', expected yelp or opentable", other),
    };

    let workflow = CancellationWorkflow::new(site.cancellation_profile(), config.timeouts.clone());
    let outcome = workflow.run(&ChromeSessions::new(config), url).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome.is_success())
}

/// Accepts "7:30 pm" as well as 24-hour "19:30"
fn parse_time(input: &str) -> Result<TimeOfDay> {
    if let Ok(time) = time_parser::parse(input) {
        return Ok(time);
    }
    NaiveTime::parse_from_str(input, "%H:%M")
        .map(TimeOfDay::from)
        .with_context(|| format!("Invalid time '{}', expected e.g. 19:30 or '7:30 pm'", input))
}

fn print_help() {
    println!("Available commands:");
    println!("  reserve <restaurant> <YYYY-MM-DD> <time> <party-size> --first <name> --last <name>");
    println!("          --phone <number> --email <address> [--requests <text>]");
    println!("          [--mode check|book|nearest|checkout] - Check or book a table");
    println!("  cancel <reservation-url> [--site yelp|opentable] - Cancel a reservation");
    println!("  help - Show this help");
    println!();
    println!("Global flags:");
    println!("  --config <path> - Use a config file instead of the default location");
}
