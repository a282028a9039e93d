use thiserror::Error;

#[derive(Error, Debug)]
pub enum WaymarkError {
    #[error("Environment file error: {0}")]
    Env(String),

    #[error("Invalid setting {key}={value}: {reason}")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, WaymarkError>;
