use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::path::ACME_SOLVER_LISTEN_PORT;

pub const DEFAULT_GENERATE_NAME_PREFIX: &str = "cm-acme-http-solver-";
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone, Debug, TypedBuilder, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SolverConfiguration {
    #[builder(default = ACME_SOLVER_LISTEN_PORT)]
    pub listen_port: i32,
    #[builder(default = DEFAULT_GENERATE_NAME_PREFIX.to_owned())]
    pub generate_name_prefix: String,
    /// Extra fetch-merge-update attempts after a conflicting write to a shared ingress.
    #[builder(default = DEFAULT_CONFLICT_RETRIES)]
    pub conflict_retries: u32,
    #[builder(default = DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,
}

impl Default for SolverConfiguration {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("listen port {0} is out of range")]
    ListenPort(i32),
    #[error("generate name prefix must be not empty")]
    GenerateNamePrefix,
    #[error("request timeout must be greater than zero")]
    RequestTimeout,
}

impl SolverConfiguration {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(1..=i32::from(u16::MAX)).contains(&self.listen_port) {
            return Err(ConfigurationError::ListenPort(self.listen_port));
        }
        if self.generate_name_prefix.is_empty() {
            return Err(ConfigurationError::GenerateNamePrefix);
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigurationError::RequestTimeout);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
