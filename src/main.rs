use std::sync::Arc;

use taskbell::{
    appsettings::AppSettings,
    clock::SystemClock,
    dispatch::{DispatchExecutor, LogDeliveryChannel, RetryPolicy},
    scheduling::ReminderScheduler,
    storage::SqliteReminderStorage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let settings = AppSettings::load()?;
    log::info!("Opening reminder store at {}", settings.storage.database_url);
    let storage = SqliteReminderStorage::connect(&settings.storage.database_url).await?;

    let executor = DispatchExecutor::new(
        Arc::new(LogDeliveryChannel),
        RetryPolicy::from(&settings.dispatch),
    );
    let scheduler = ReminderScheduler::new(
        Arc::new(storage),
        executor,
        Arc::new(SystemClock),
        settings.scheduler.clone(),
    );

    if let Err(error) = scheduler.reconcile_on_startup().await {
        log::error!("Startup reconciliation failed, the sweep will retry: {error}");
    }

    log::info!("Waiting for reminders. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;

    scheduler.shutdown().await;
    Ok(())
}
