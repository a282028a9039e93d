pub mod config;
pub mod error;

pub use config::{BackgroundConfig, Config};
pub use error::*;
