use anyhow::{Context, Result};
use calendar_cron::calendar::{CalendarProvider, GoogleCalendar, MockCalendar};
use calendar_cron::datastore::PgDatastore;
use calendar_cron::lock::PgLock;
use calendar_cron::scheduler::log_cycle_result;
use calendar_cron::{db, CalendarCron, CronConfig, CronScheduler};
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "calendar-cron")]
#[command(about = "Books calendar events for users whose hosts fail compliance policies")]
struct Cli {
    /// Calendar backend used to create and delete events
    #[arg(long, value_enum, env = "CALENDAR_PROVIDER", default_value = "google")]
    provider: Provider,

    /// Database connection pool size
    #[arg(long, env = "DATABASE_POOL_SIZE", default_value_t = 16)]
    pool_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a cycle every CALENDAR_CRON_PERIODICITY_SECS until interrupted
    Run,
    /// Run a single cycle and exit
    Once,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Provider {
    Google,
    /// In-memory calendar, nothing is sent anywhere
    Mock,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "calendar_cron=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = CronConfig::from_env().context("Invalid calendar cron configuration")?;
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = db::establish_connection_pool(&database_url, cli.pool_size)
        .context("Failed to create database pool")?;

    let calendar: Arc<dyn CalendarProvider> = match cli.provider {
        Provider::Google => Arc::new(GoogleCalendar::new()),
        Provider::Mock => {
            tracing::warn!("Using the mock calendar provider, no real events will be created");
            Arc::new(MockCalendar::new())
        }
    };

    let cron = Arc::new(CalendarCron::new(
        Arc::new(PgDatastore::new(pool.clone())),
        calendar,
        Arc::new(PgLock::new(pool)),
        config.clone(),
    ));

    tracing::info!(
        "Calendar cron instance {} (periodicity {}s, deadline {}s)",
        config.instance_id,
        config.periodicity.as_secs(),
        config.cycle_deadline.as_secs()
    );

    match cli.command {
        Commands::Once => {
            let result = cron.run_cycle().await;
            log_cycle_result(&result);
            result?;
        }
        Commands::Run => {
            let mut scheduler = CronScheduler::new(cron, config.periodicity)
                .with_stop_timeout(config.cycle_deadline);
            scheduler.start()?;

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutdown signal received");

            scheduler.stop().await?;
        }
    }

    Ok(())
}
