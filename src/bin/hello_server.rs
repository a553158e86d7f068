//! Serves `Hello, <name>!` for `GET /<name>`.

use templates::greeting;
use templates::settings::Settings;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let result = match Settings::from_env() {
        Ok(settings) => greeting::app().run(&settings.http.addr()).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        log::error!("hello-server stopped: {}", e);
        std::process::exit(1);
    }
}
