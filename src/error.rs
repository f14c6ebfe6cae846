//! Error types, reconnect policy and error reporting
//!
//! REST calls surface a typed [`PortalError`] so callers can tell transport
//! failures from rejected requests. Realtime operations never return network
//! errors; the only policy they carry is how the WebSocket provider reconnects.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure of a single REST call against the portal backend.
///
/// Calls are attempted once and never retried here.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("request to portal failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("portal responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("portal rejected the request: {0}")]
    Rejected(String),

    #[error("portal response carried no data")]
    MissingData,

    #[error("no conversation selected")]
    NoConversation,

    #[error("invalid portal url: {0}")]
    Url(#[from] url::ParseError),
}

/// Reconnect policy for the WebSocket channel provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Maximum consecutive failed attempts before giving up (0 = never give up)
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    pub initial_delay_ms: u64,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,

    /// Upper bound for a single delay, in milliseconds
    pub max_delay_ms: u64,

    /// Fraction of the delay randomized in either direction (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 250,
            backoff_multiplier: 2.0,
            max_delay_ms: 10_000,
            jitter: 0.2,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that makes a single connection attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Whether another attempt is allowed after `failures` consecutive failures
    pub fn allows(&self, failures: u32) -> bool {
        self.max_attempts == 0 || failures < self.max_attempts
    }

    /// Backoff delay before retry number `attempt` (1-based), without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(millis.min(self.max_delay_ms as f64) as u64)
    }

    /// Backoff delay with jitter applied
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter.is_nan() || self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let jitter = self.jitter.min(1.0);
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        base.mul_f64(factor)
    }
}

/// Categorized error kinds for the CLI error report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Portal or relay unreachable
    Network,

    /// The portal answered but refused the request
    Rejected,

    /// Bad configuration file or environment
    Configuration,

    /// Invalid command input
    Validation,

    Unknown,
}

/// Categorize an error, preferring typed causes over message text
pub fn categorize_error(error: &anyhow::Error) -> ErrorCategory {
    if let Some(portal) = error.chain().find_map(|e| e.downcast_ref::<PortalError>()) {
        return match portal {
            PortalError::Transport(_) => ErrorCategory::Network,
            PortalError::Status { .. } | PortalError::Rejected(_) | PortalError::MissingData => {
                ErrorCategory::Rejected
            }
            PortalError::NoConversation => ErrorCategory::Validation,
            PortalError::Url(_) => ErrorCategory::Configuration,
        };
    }
    if error.chain().any(|e| e.is::<toml::de::Error>()) {
        return ErrorCategory::Configuration;
    }

    let text = error.to_string().to_lowercase();
    if text.contains("connection") || text.contains("network") || text.contains("timed out") {
        ErrorCategory::Network
    } else if text.contains("config") {
        ErrorCategory::Configuration
    } else if text.contains("invalid") || text.contains("unknown") {
        ErrorCategory::Validation
    } else {
        ErrorCategory::Unknown
    }
}

/// Error with category and suggestions, printed by the CLI
#[derive(Debug)]
pub struct ErrorReport {
    pub error: anyhow::Error,
    pub category: ErrorCategory,
    pub suggestions: Vec<&'static str>,
}

impl ErrorReport {
    pub fn new(error: anyhow::Error) -> Self {
        let category = categorize_error(&error);
        let suggestions = match category {
            ErrorCategory::Network => vec![
                "Check that the portal API and relay URLs are reachable",
                "Verify BEAM_API_URL / BEAM_REALTIME_URL",
            ],
            ErrorCategory::Rejected => vec![
                "Check the API token (BEAM_API_TOKEN)",
                "Confirm the referenced conversation, task or member exists",
            ],
            ErrorCategory::Configuration => vec![
                "Review beam.toml or the file named by BEAM_CONFIG",
            ],
            ErrorCategory::Validation => vec!["Run with --help to see valid arguments"],
            ErrorCategory::Unknown => vec!["Re-run with RUST_LOG=debug for details"],
        };

        Self {
            error,
            category,
            suggestions,
        }
    }

    /// Render the report for the terminal
    pub fn display(&self) -> String {
        let mut output = format!("Error: {:#}\n", self.error);
        if !self.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in &self.suggestions {
                output.push_str(&format!("   • {}\n", suggestion));
            }
        }
        output
    }
}
