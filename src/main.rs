use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crm_lead_allocator::config::Config;
use crm_lead_allocator::crm_client::{self, CrmClient};
use crm_lead_allocator::poller::{PollSettings, Poller};
use crm_lead_allocator::shutdown::Shutdown;

const BANNER_WIDTH: usize = 60;

/// Main entry point for the allocator.
///
/// This function:
/// - Initializes logging and tracing.
/// - Installs the SIGINT/SIGTERM handlers before any network call.
/// - Loads configuration and resolves the session cookie (configured or via login).
/// - Primes the seen-set with the leads currently listed.
/// - Runs the poll loop until stopped.
///
/// Exits with code 0 when stopped by the operator at any point, and with code 1
/// when no session cookie is available or startup fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crm_lead_allocator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut shutdown = Shutdown::install();

    println!("\n{}", "=".repeat(BANNER_WIDTH));
    println!("   🚀 AUTO LEAD ALLOCATOR STARTED");
    println!("{}\n", "=".repeat(BANNER_WIDTH));

    let config = Config::from_env()?;

    let cookie = match (&config.session_cookie, config.credentials()) {
        (Some(cookie), _) => cookie.clone(),
        (None, Some((username, password))) => {
            match shutdown
                .guard(crm_client::login(&config, username, password))
                .await
            {
                Some(Ok(cookie)) => cookie,
                Some(Err(e)) => {
                    tracing::error!("Login error: {}", e);
                    std::process::exit(1);
                }
                None => {
                    stopped_during_startup();
                    return Ok(());
                }
            }
        }
        (None, None) => {
            tracing::error!("No session cookie provided. Please login first.");
            tracing::info!("You need to either:");
            tracing::info!("1. Set CRM_SESSION_COOKIE with your session cookie");
            tracing::info!("2. Or set CRM_USERNAME and CRM_PASSWORD to login at startup");
            std::process::exit(1);
        }
    };

    let client = CrmClient::new(&config, config.session(cookie))?;
    let poller = Arc::new(Poller::new(client, PollSettings::from(&config))?);

    match shutdown.guard(poller.prime()).await {
        Some(Ok(_)) => {}
        Some(Err(e)) => tracing::error!("{}", e),
        None => {
            stopped_during_startup();
            return Ok(());
        }
    }

    let settings = poller.settings();
    tracing::info!(
        "Auto-allocate: {}",
        if settings.auto_allocate {
            "ENABLED ✓"
        } else {
            "DISABLED ✗"
        }
    );
    if settings.retry_failed_allocations {
        tracing::info!("Failed allocations will be retried on the next check");
    }
    tracing::info!(
        "Check interval: {} seconds",
        config.check_interval_ms as f64 / 1000.0
    );
    tracing::info!("Starting periodic checks... Press Ctrl+C to stop");

    Arc::clone(&poller)
        .run_until(config.check_interval(), shutdown.recv())
        .await;

    println!("\n{}", "=".repeat(BANNER_WIDTH));
    tracing::warn!(
        "Auto Lead Allocator stopped by user after {} check(s)",
        poller.checks()
    );
    println!("{}\n", "=".repeat(BANNER_WIDTH));

    Ok(())
}

fn stopped_during_startup() {
    tracing::warn!("Auto Lead Allocator stopped by user before polling started");
}
