#![allow(missing_docs)]

use envconfig::Envconfig;

use versionlock_app_example::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init()?;
    versionlock_app_example::run(config).await
}
