//! Fallback engine errors.

use aegis_core::ErrorKind;
use thiserror::Error;

/// Why one strategy did not produce a response. The engine moves on to the
/// next strategy in the chain either way.
#[derive(Debug, Clone, Error)]
pub enum StrategyError {
    /// The strategy's precondition did not hold at execution time.
    #[error("strategy declined: {0}")]
    Declined(String),

    /// The strategy tried and failed.
    #[error("strategy failed: {0}")]
    Failed(String),
}

/// Every configured strategy declined or failed.
#[derive(Debug, Clone, Error)]
#[error("no fallback available for {target} ({kind})")]
pub struct NoFallback {
    /// The failing target.
    pub target: String,
    /// The error kind that was being substituted for.
    pub kind: ErrorKind,
}
