use thiserror::Error;

/// Typed error hierarchy for paneguard.
///
/// Use at module boundaries (enqueue, schedule, persistence, resets).
/// Internal/leaf functions can continue using `anyhow::Result` — the `Internal`
/// variant allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum PaneguardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Delivery error: {target}: {message}")]
    Delivery { target: String, message: String },

    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using PaneguardError.
pub type PaneguardResult<T> = std::result::Result<T, PaneguardError>;

impl PaneguardError {
    /// Whether this error is retryable (transient delivery or persistence trouble).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaneguardError::Delivery { .. } | PaneguardError::Persistence(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_error_display() {
        let err = PaneguardError::Capacity("queue full (100)".into());
        assert_eq!(err.to_string(), "Capacity exceeded: queue full (100)");
        assert!(!err.is_retryable());
    }

    #[test]
    fn delivery_error_retryable() {
        let err = PaneguardError::Delivery {
            target: "pane:0".into(),
            message: "send returned false".into(),
        };
        assert_eq!(err.to_string(), "Delivery error: pane:0: send returned false");
        assert!(err.is_retryable());
    }

    #[test]
    fn confirmation_required_not_retryable() {
        let err = PaneguardError::ConfirmationRequired("reset all".into());
        assert!(!err.is_retryable());
    }

    #[test]
    fn internal_from_anyhow() {
        let anyhow_err = anyhow::anyhow!("something broke");
        let err: PaneguardError = anyhow_err.into();
        assert!(matches!(err, PaneguardError::Internal(_)));
        assert!(!err.is_retryable());
    }
}
