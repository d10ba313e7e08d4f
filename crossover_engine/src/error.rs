/// error.rs — Error taxonomy shared by every component
///
/// ┌──────────────────────┬───────────────────────────┬────────────┐
/// │ Variant              │ Raised by                 │ Live loop  │
/// ├──────────────────────┼───────────────────────────┼────────────┤
/// │ MissingEnv / Config  │ config.rs, SignalEngine   │ Fatal      │
/// │ Unauthorized         │ live.rs (401, 403 on GET) │ Fatal      │
/// │ DataFetch            │ data.rs, live.rs queries  │ Continue   │
/// │ OrderSubmission      │ live.rs order POST (+403) │ Continue   │
/// │ Computation          │ models.rs, backtest.rs    │ Continue   │
/// └──────────────────────┴───────────────────────────┴────────────┘

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraderError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{source_name} request failed: {reason}")]
    DataFetch {
        source_name: &'static str,
        reason:      String,
    },

    #[error("order submission failed: {0}")]
    OrderSubmission(String),

    #[error("broker rejected credentials: {0}")]
    Unauthorized(String),

    #[error("malformed price data: {0}")]
    Computation(String),
}

/// What the live loop does after an iteration failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Log, cool down, try again next iteration.
    Continue,
    /// Stop the loop and surface the error to the caller.
    Fatal,
}

impl TraderError {
    pub fn data_fetch(source_name: &'static str, reason: impl ToString) -> Self {
        Self::DataFetch { source_name, reason: reason.to_string() }
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            Self::MissingEnv(_) | Self::Config(_) | Self::Unauthorized(_) => Disposition::Fatal,
            Self::DataFetch { .. } | Self::OrderSubmission(_) | Self::Computation(_) => {
                Disposition::Continue
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TraderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_are_fatal() {
        assert_eq!(TraderError::MissingEnv("API_KEY").disposition(), Disposition::Fatal);
        assert_eq!(TraderError::Config("x".into()).disposition(), Disposition::Fatal);
        assert_eq!(TraderError::Unauthorized("401".into()).disposition(), Disposition::Fatal);
    }

    #[test]
    fn runtime_errors_are_retried() {
        assert_eq!(
            TraderError::data_fetch("alpaca clock", "timeout").disposition(),
            Disposition::Continue
        );
        assert_eq!(TraderError::OrderSubmission("rejected".into()).disposition(), Disposition::Continue);
        assert_eq!(TraderError::Computation("empty".into()).disposition(), Disposition::Continue);
    }

    #[test]
    fn data_fetch_message_names_the_source() {
        let e = TraderError::data_fetch("yahoo chart", "HTTP 404");
        assert_eq!(e.to_string(), "yahoo chart request failed: HTTP 404");
    }
}
