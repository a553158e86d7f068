//! Runs the ORM walkthrough scenarios against a SQLite database.

use clap::Parser;
use std::sync::Arc;
use templates::demo::{run_scenario, Scenario, DEFAULT_SCENARIOS};
use templates::orm::Db;
use templates::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "orm-demo", about = "Walk through ORM scenarios on a SQLite file")]
struct Cli {
    /// Scenarios to run in order; defaults to `create-tables empty-field`
    #[arg(value_enum)]
    scenarios: Vec<Scenario>,

    /// Database URL, overriding TEMPLATES_DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,

    /// Do not log every SQL statement
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        log::error!("orm-demo failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> templates::Result<()> {
    let mut settings = Settings::from_env()?;
    if let Some(url) = cli.database_url {
        settings.database.url = url;
    }
    if cli.quiet {
        settings.database.echo = false;
    }

    let scenarios = if cli.scenarios.is_empty() {
        DEFAULT_SCENARIOS.to_vec()
    } else {
        cli.scenarios
    };

    let db = Arc::new(Db::open(&settings.database).await?);
    for scenario in scenarios {
        run_scenario(db.clone(), scenario).await?;
    }
    Ok(())
}
