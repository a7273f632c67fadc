pub mod api;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod model;
pub mod server;
pub mod shutdown;
pub mod storage;

pub use error::{ReviewError, Result};
