//! App-level error surface. Integration errors collapse into configuration
//! failures on their way to `main`.

use omis_config::ConfigError;
use omis_core::CoreError;
use omis_mail::MailBackendError;
use omis_notify::NotifyError;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct AppError(#[from] CoreError);

impl AppError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self(CoreError::Configuration(message.into()))
    }

    pub fn dependency_unavailable(message: impl Into<String>) -> Self {
        Self(CoreError::DependencyUnavailable(message.into()))
    }

    pub fn as_core(&self) -> &CoreError {
        &self.0
    }

    pub fn into_core(self) -> CoreError {
        self.0
    }

    pub fn configuration_message(&self) -> Option<&str> {
        match self.as_core() {
            CoreError::Configuration(message) => Some(message.as_str()),
            _ => None,
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::configuration(value.to_string())
    }
}

impl From<MailBackendError> for AppError {
    fn from(value: MailBackendError) -> Self {
        Self::configuration(value.to_string())
    }
}

impl From<NotifyError> for AppError {
    fn from(value: NotifyError) -> Self {
        Self::configuration(value.to_string())
    }
}
