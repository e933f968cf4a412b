//! Error types for provisioning operations

use thiserror::Error;

/// Errors that can occur while constructing or executing a provisioning run
///
/// The taxonomy separates construction-time failures (configuration,
/// duplicate names, dependency cycles) from execution-time failures
/// (provider calls, certificate validation). Execution failures are
/// attributed to the resource that caused them; resources downstream of a
/// failure report [`ProvisionError::Upstream`] naming the dependency that
/// failed first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    /// Invalid or missing configuration, reported before any provisioning
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An external provider call failed
    #[error("provider call for '{resource}' failed: {message}")]
    Provider { resource: String, message: String },

    /// A dependency of this resource failed, so it was never materialized
    #[error("'{resource}' not materialized: upstream dependency '{via}' failed")]
    Upstream { resource: String, via: String },

    /// No hosted zone owns the registered domain
    #[error("no hosted zone found for '{0}'")]
    ZoneNotFound(String),

    /// More than one hosted zone matched; the orchestrator does not disambiguate
    #[error("{matches} hosted zones match '{domain}'")]
    AmbiguousZone { domain: String, matches: usize },

    /// The provider did not confirm the validation record in time
    #[error("certificate validation for '{0}' timed out")]
    ValidationTimeout(String),

    /// The certificate authority rejected validation
    #[error("certificate validation for '{domain}' rejected: {reason}")]
    ValidationRejected { domain: String, reason: String },

    /// The declared resources form a dependency cycle
    #[error("dependency cycle through: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    /// The same (kind, logical name) pair was declared twice in one run
    #[error("duplicate {kind} resource '{logical_name}' in one run")]
    DuplicateResource { kind: String, logical_name: String },

    /// The run was cancelled by the overall deadline or an explicit abort
    #[error("run cancelled before completion")]
    Cancelled,

    /// An output handle was dropped without ever being fulfilled
    #[error("output '{0}' was never produced")]
    OutputDropped(String),

    /// A workflow state machine was driven through an invalid transition
    #[error("invalid state transition: {0}")]
    Transition(String),
}

/// Result type for provisioning operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;

impl From<crate::state_machine::TransitionError> for ProvisionError {
    fn from(err: crate::state_machine::TransitionError) -> Self {
        ProvisionError::Transition(err.to_string())
    }
}

impl ProvisionError {
    /// True for failures attributable to a dependency rather than the
    /// resource itself.
    pub fn is_upstream(&self) -> bool {
        matches!(self, ProvisionError::Upstream { .. })
    }
}
