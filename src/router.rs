//! HTTP routing for the templates' web handlers.
//!
//! Routes pair a method with a path pattern:
//!
//! - `:name` captures one path segment
//! - a trailing `*name` captures every remaining segment (possibly none)
//!
//! Path segments are percent-decoded before matching, so captures hold the
//! decoded text. Leading and trailing slashes are ignored.
//!
//! A path that matches some route but none for the request's method gets a
//! 405 with an `Allow` header; a path matching nothing gets a 404. Serving is
//! delegated to axum, which hands every request to [`Router::dispatch`].
use crate::error::Result;
pub use axum::http::Method;
use axum::http::{HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::IntoResponse;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpListener;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Represents the outcome of an HTTP handler.
pub struct Response {
    pub status_code: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

impl Response {
    fn text(status_code: u16, body: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), TEXT_PLAIN.to_string());
        Response {
            status_code,
            body: body.into(),
            headers,
        }
    }

    /// Construct a new HTTP 200 response with a plain-text body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::text(200, body)
    }

    /// Construct a new HTTP 404 "not found" response.
    pub fn not_found() -> Self {
        Self::text(404, "404 Not Found")
    }

    /// Construct a new HTTP 405 response listing the methods the path accepts.
    pub fn method_not_allowed(allowed: &[Method]) -> Self {
        let mut response = Self::text(405, "405 Method Not Allowed");
        let allow: Vec<&str> = allowed.iter().map(Method::as_str).collect();
        response
            .headers
            .insert("Allow".to_string(), allow.join(", "));
        response
    }
}

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, self.body).into_response();
        for (key, value) in self.headers {
            match (HeaderName::try_from(key), HeaderValue::try_from(value)) {
                (Ok(name), Ok(value)) => {
                    response.headers_mut().insert(name, value);
                }
                _ => log::warn!("Dropping invalid response header"),
            }
        }
        response
    }
}

/// Maps status codes to HTTP status text for responses.
pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Unknown",
    }
}

/// Type alias for async handler functions for HTTP routes.
/// Accepts a map of extracted parameters and returns a Response.
pub type Handler = Arc<
    dyn Fn(HashMap<String, String>) -> Pin<Box<dyn Future<Output = Response> + Send>>
        + Send
        + Sync,
>;

/// Wrap an async function of the extracted parameters as a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(HashMap<String, String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(
        move |params| -> Pin<Box<dyn Future<Output = Response> + Send>> { Box::pin(f(params)) },
    )
}

/// Represents a registered HTTP route and its associated handler.
#[derive(Clone)]
pub struct Route {
    pub method: Method,
    pub path_pattern: String,
    pub handler: Handler,
}

/// The application router: an ordered list of routes, first match wins.
#[derive(Clone, Default)]
pub struct Router {
    pub routes: Vec<Route>,
}

impl Router {
    /// Create a new, empty application router.
    pub fn new() -> Self {
        Router { routes: Vec::new() }
    }

    /// Register an HTTP route with method, path pattern and handler.
    pub fn add_route(&mut self, method: Method, path_pattern: &str, handler: Handler) {
        self.routes.push(Route {
            method,
            path_pattern: path_pattern.to_string(),
            handler,
        });
    }

    /// Run the first route matching both `method` and `path`.
    pub async fn dispatch(&self, method: &Method, path: &str) -> Response {
        let mut allowed = Vec::new();
        for route in &self.routes {
            if let Some(params) = match_path(&route.path_pattern, path) {
                if route.method == *method {
                    return (route.handler)(params).await;
                }
                if !allowed.contains(&route.method) {
                    allowed.push(route.method.clone());
                }
            }
        }

        if allowed.is_empty() {
            log::debug!("No route for {} {}", method, path);
            Response::not_found()
        } else {
            log::debug!("{} not allowed on {}", method, path);
            Response::method_not_allowed(&allowed)
        }
    }

    /// An axum router that sends every request through [`Router::dispatch`].
    pub fn into_axum(self) -> axum::Router {
        let router = Arc::new(self);
        axum::Router::new().fallback(move |method: Method, uri: Uri| {
            let router = router.clone();
            async move {
                let response = router.dispatch(&method, uri.path()).await;
                log::info!(
                    "{} {} -> {} {}",
                    method,
                    uri.path(),
                    response.status_code,
                    status_text(response.status_code)
                );
                response
            }
        })
    }

    /// Bind `addr` and serve until the process stops.
    pub async fn run(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        log::info!("HTTP Server running on http://{}", addr);
        axum::serve(listener, self.into_axum()).await?;
        Ok(())
    }
}

#[macro_export]
macro_rules! route {
    ($router:expr, $( $method:ident $path:expr => $handler:expr ),* $(,)?) => {
        $(
            $router.add_route(
                $crate::router::Method::$method,
                $path,
                $crate::router::handler($handler),
            );
        )*
    };
}

/// Matches a path pattern (e.g. `/foo/:id` or `/files/*rest`) against a real path,
/// extracting parameters into a HashMap if matched, or None if not.
pub fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let path_parts: Vec<String> = path
        .trim_matches('/')
        .split('/')
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .collect();

    let mut params = HashMap::new();

    for (i, p) in pattern_parts.iter().enumerate() {
        if let Some(name) = p.strip_prefix('*') {
            let rest = path_parts.get(i..).map(|rest| rest.join("/"));
            params.insert(name.to_string(), rest.unwrap_or_default());
            return Some(params);
        }
        let a = path_parts.get(i)?;
        if let Some(name) = p.strip_prefix(':') {
            params.insert(name.to_string(), a.clone());
        } else if *p != a.as_str() {
            return None;
        }
    }

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    Some(params)
}
