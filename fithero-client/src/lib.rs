//! FitHero Client
//!
//! Configuration, the REST backend and terminal rendering behind the
//! `fithero` command-line tool.

pub mod api_client;
pub mod config;
pub mod error;
pub mod logging;
pub mod render;

pub use api_client::RestClient;
pub use config::{ClientConfig, ConfigError, LogConfig, LogFormat};
pub use error::{ClientError, ClientResult};
