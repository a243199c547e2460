use crate::error::{DictError, Result};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| DictError::InvalidArgument(format!("Invalid log level: {e}")))?,
        )
        .with_target(true)
        .try_init()
        .map_err(|_| DictError::InvalidArgument("Logging already initialized".into()))
}
