//! Error type for controller operations.

use thiserror::Error;

/// Error types for controller operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HalError {
    /// Card setup failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// PROM model word did not identify a Hy8601
    #[error("PROM model mismatch: expected {expected:#06x}, found {found:#06x}")]
    PromMismatch {
        /// Model the driver supports
        expected: u16,
        /// Model read from the card
        found: u16,
    },

    /// Carrier or window access error
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),

    /// No carrier registered under the requested name
    #[error("Carrier not found: {0}")]
    CarrierNotFound(String),

    /// Command issued to a controller whose setup failed
    #[error("Controller not operational: {0}")]
    NotOperational(String),

    /// Axis index outside the configured axes
    #[error("Axis {axis} out of range (controller has {count} axes)")]
    AxisOutOfRange {
        /// Requested axis
        axis: usize,
        /// Configured axis count
        count: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = HalError::PromMismatch {
            expected: 0x8601,
            found: 0x8401,
        };
        assert_eq!(
            err.to_string(),
            "PROM model mismatch: expected 0x8601, found 0x8401"
        );

        let err = HalError::AxisOutOfRange { axis: 5, count: 4 };
        assert!(err.to_string().contains("Axis 5"));
    }
}
