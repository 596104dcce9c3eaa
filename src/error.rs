use thiserror::Error;

/// Errors raised by the fitting library.
///
/// Optimizer non-convergence is deliberately absent: it is reported through
/// [`crate::domain::FitDiagnostics`] and left for the caller to interpret.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResonatorError {
    /// Data or errors were supplied without an imaginary part.
    #[error("resonator {0} must be complex")]
    NotComplex(&'static str),
    /// Arrays are empty, mismatched, or contain values that cannot be fit.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A lookup named a parameter the fit does not have.
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),
    /// The parameter exists but the optimizer produced no standard error for it.
    #[error("no standard error computed for parameter '{0}'")]
    MissingStderr(String),
    /// The model in use does not provide the requested capability.
    #[error("{model} does not support {operation}")]
    Unsupported {
        model: &'static str,
        operation: &'static str,
    },
    /// Background and foreground declare the same parameter name.
    #[error("parameter '{0}' is declared by both the background and the foreground model")]
    ParameterCollision(String),
    /// The optimizer could not be started.
    #[error("optimizer error: {0}")]
    Optimizer(String),
}

/// Error surfaced by the `resfit` binary, carrying its process exit code.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<ResonatorError> for AppError {
    fn from(err: ResonatorError) -> Self {
        let exit_code = match &err {
            ResonatorError::NotComplex(_)
            | ResonatorError::InvalidInput(_)
            | ResonatorError::ParameterCollision(_) => 2,
            ResonatorError::Unsupported { .. } => 3,
            ResonatorError::UnknownParameter(_)
            | ResonatorError::MissingStderr(_)
            | ResonatorError::Optimizer(_) => 4,
        };
        AppError::new(exit_code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resonator_errors_map_to_exit_codes() {
        let usage: AppError = ResonatorError::NotComplex("data").into();
        assert_eq!(usage.exit_code(), 2);
        assert_eq!(usage.to_string(), "resonator data must be complex");

        let unsupported: AppError = ResonatorError::Unsupported {
            model: "Custom",
            operation: "invert",
        }
        .into();
        assert_eq!(unsupported.exit_code(), 3);
    }
}
