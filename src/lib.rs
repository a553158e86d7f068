pub mod cache;
pub mod demo;
pub mod error;
pub mod greeting;
pub mod models;
pub mod orm;
pub mod router;
pub mod settings;

pub use error::{Error, Result};

inventory::collect!(crate::orm::Migration);
