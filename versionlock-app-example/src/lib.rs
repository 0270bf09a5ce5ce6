pub mod config;

use tracing::{info, warn};
use versionlock::{Adjust, Committed, Coordinator, Layout, StoreExt, UpdateError, UpdateIntent};

use crate::config::Config;

fn report(client: &str, change: i64, result: &Result<Committed, UpdateError>) {
    match result {
        Ok(committed) => info!(
            client,
            change,
            stock = committed.record.payload,
            version = committed.record.version,
            attempts = committed.attempts,
            "stock updated"
        ),
        Err(err) => warn!(client, change, error = %err, "failed to update stock"),
    }
}

/// Seeds the inventory record, then lets two clients that read the same
/// version update it one after the other.
pub async fn run(config: Config) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let client = redis::Client::open(config.redis_url.as_str())?;

    // Every store call shows up in the logs at debug level.
    let store = versionlock_redis::Builder::new(client)
        .build_store()
        .await?
        .with_tracing();

    let coordinator = Coordinator::<_, i64>::with_layout(store, Layout::new("stock")?)
        .retry_policy(config.retry_policy()?);

    let accessor = coordinator.accessor();
    let id = config.record_id.as_str();

    accessor.create(id, config.initial_stock).await?;
    info!(id, stock = config.initial_stock, "record seeded");

    // Both clients read the record before either of them writes.
    let client_1 = accessor.fetch(id).await?;
    let client_2 = accessor.fetch(id).await?;

    let result = coordinator
        .update(UpdateIntent::new(client_1, Adjust(config.client_1_change)))
        .await;
    report("client #1", config.client_1_change, &result);

    let result = coordinator
        .update(UpdateIntent::new(client_2, Adjust(config.client_2_change)))
        .await;
    report("client #2", config.client_2_change, &result);

    let record = accessor.fetch(id).await?;
    println!("{}", serde_json::to_string(&record)?);

    Ok(())
}
