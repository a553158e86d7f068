//! Hello world over HTTP: `GET /<name>` greets `<name>`, `GET /` greets the world.

use crate::route;
use crate::router::{Response, Router};
use std::collections::HashMap;

pub fn greet(name: &str) -> String {
    let name = if name.is_empty() { "World" } else { name };
    format!("Hello, {}!", name)
}

pub async fn hello(params: HashMap<String, String>) -> Response {
    let name = params.get("name").map(String::as_str).unwrap_or_default();
    Response::ok(greet(name))
}

/// A router with the single catch-all greeting route.
pub fn app() -> Router {
    let mut router = Router::new();
    route!(router, GET "/*name" => hello);
    router
}
