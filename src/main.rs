use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use roombook_booking::{BookingsRepo, OutlookBookings, RoomsRegistry};
use roombook_core::{Config, EwsConfig, TimePeriod, TimeStamp};
use roombook_ews::{
    AccessType, AccountFactory, CalendarAccount, Credentials, EwsAccountFactory, EwsClient,
    EwsConfiguration, RetryConfig,
};

/// Usage: `roombook [YYYY-MM-DD] [owner-email]`
///
/// Prints the bookings of one day (today by default) as JSON lines.
fn main() -> Result<()> {
    roombook_core::init()?;

    let (config, _) = Config::load_validated()?;
    let mut args = std::env::args().skip(1);
    let day = match args.next() {
        Some(day) => NaiveDate::parse_from_str(&day, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", day))?,
        None => Utc::now().date_naive(),
    };
    let owner = args.next();

    // The blocking HTTP client must be built outside the async runtime.
    let client = Arc::new(EwsClient::new(ews_configuration(&config.ews)?).context("Failed to build EWS client")?);
    let primary: Arc<dyn CalendarAccount> =
        Arc::new(client.account(&config.ews.primary_smtp_address, AccessType::Delegate));
    let factory: Arc<dyn AccountFactory> = Arc::new(EwsAccountFactory::new(Arc::clone(&client)));
    let registry = Arc::new(RoomsRegistry::new(config.rooms()));
    let bookings = OutlookBookings::new(primary, factory, registry, &config.booking)
        .context("Failed to start worker pool")?;

    tracing::info!("Roombook started for {}", config.ews.primary_smtp_address);

    let period = day_period(day)?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let found = runtime
        .block_on(bookings.get_bookings_in_period(period, None, owner))
        .context("Failed to list bookings")?;

    for booking in &found {
        println!("{}", serde_json::to_string(booking)?);
    }
    tracing::info!("Listed {} bookings for {}", found.len(), day);

    Ok(())
}

fn ews_configuration(ews: &EwsConfig) -> Result<EwsConfiguration> {
    let credentials = match (ews.access_token(), ews.password()) {
        (Some(token), _) => Credentials::Bearer(token),
        (None, Some(password)) => Credentials::Basic {
            username: ews.username.clone(),
            password,
        },
        (None, None) => anyhow::bail!(
            "No EWS credentials: set ews.password or ews.access_token (or {} / {})",
            roombook_core::config::PASSWORD_ENV,
            roombook_core::config::ACCESS_TOKEN_ENV
        ),
    };

    let mut configuration = EwsConfiguration::new(ews.server_url.clone(), credentials);
    configuration.timeout = Duration::from_secs(ews.timeout_secs);
    configuration.retry = RetryConfig {
        max_retries: ews.max_retries,
        ..RetryConfig::default()
    };
    Ok(configuration)
}

fn day_period(day: NaiveDate) -> Result<TimePeriod> {
    let start = day
        .and_hms_opt(0, 0, 0)
        .context("Invalid start of day")?;
    let start = TimeStamp::from_naive(start);
    Ok(TimePeriod::new(start, start + chrono::Duration::days(1))?)
}
