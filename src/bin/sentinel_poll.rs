//! Reads `cur_time` from the Sentinel-managed master once a second, forever.

use templates::cache::{Poller, RetryPolicy, SentinelSource};
use templates::settings::Settings;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("sentinel-poll stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> templates::Result<()> {
    let settings = Settings::from_env()?;
    let sentinel = &settings.sentinel;
    log::info!(
        "Polling `{}` on service `{}` via {} sentinels",
        sentinel.key,
        sentinel.service_name,
        sentinel.nodes.len()
    );

    let source = SentinelSource::new(sentinel)?;
    let mut poller = Poller::new(
        source,
        sentinel.key.clone(),
        RetryPolicy::unbounded(sentinel.poll_interval),
    );
    poller.run(|report| println!("{}\n", report)).await
}
