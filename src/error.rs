//! Error types for the cluster lifecycle controller
//!
//! Every failure that originates at the provisioning service is wrapped in a
//! variant naming the operation that failed, with the provider's error kept as
//! the source. Nothing here is retried automatically; [`Error::is_retryable`]
//! tells the caller whether repeating the call is safe.

use thiserror::Error;

use crate::client::ProviderError;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for controller operations
#[derive(Debug, Error)]
pub enum Error {
    /// Identity resolution failed
    #[error("credential error for profile '{profile}': {message}")]
    Credential {
        /// Profile (or identity source) that could not be resolved
        profile: String,
        /// Description of what failed
        message: String,
    },

    /// A provisioning client could not be built for the given credentials and region
    #[error("client init error for region {region}: {message}")]
    ClientInit {
        /// Region the client was to be bound to
        region: String,
        /// Description of what failed
        message: String,
    },

    /// The caller violated a precondition
    #[error("validation error for {cluster}: {message}")]
    Validation {
        /// Name of the cluster with invalid configuration
        cluster: String,
        /// Description of what's invalid
        message: String,
        /// The offending field (e.g., "node_groups")
        field: Option<String>,
    },

    /// The operation is not valid in the controller's current local state
    #[error("state error for {cluster}: {message}")]
    State {
        /// Name of the cluster
        cluster: String,
        /// Description of the conflicting state
        message: String,
    },

    /// The create-cluster request was rejected or failed
    #[error("launch of {cluster} in {region} failed")]
    LaunchFailed {
        /// Name of the cluster being launched
        cluster: String,
        /// Region the launch targeted
        region: String,
        /// Provider-side cause
        #[source]
        source: ProviderError,
    },

    /// The add-steps request was rejected or failed
    #[error("submission of step '{step}' to {cluster} failed")]
    SubmissionFailed {
        /// Name of the cluster
        cluster: String,
        /// Name of the step that was not accepted
        step: String,
        /// Provider-side cause
        #[source]
        source: ProviderError,
    },

    /// A describe or list call failed
    #[error("status of {cluster} unavailable")]
    StatusUnavailable {
        /// Name of the cluster (or name pattern for fleet queries)
        cluster: String,
        /// Provider-side cause
        #[source]
        source: ProviderError,
    },

    /// Configuration could not be read or parsed
    #[error("configuration error: {message}")]
    Config {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a credential error for the given profile
    pub fn credential(profile: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Credential {
            profile: profile.into(),
            message: msg.into(),
        }
    }

    /// Create a client initialisation error for the given region
    pub fn client_init(region: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ClientInit {
            region: region.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error with cluster context
    pub fn validation_for(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with cluster context and field
    pub fn validation_for_field(
        cluster: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a state error with cluster context
    pub fn state(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::State {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether repeating the failed call (possibly after correcting input) is safe
    ///
    /// Remote failures leave no partial state behind, so they are retryable.
    /// Construction and precondition failures will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LaunchFailed { .. } | Self::SubmissionFailed { .. } | Self::StatusUnavailable { .. }
        )
    }

    /// The provider-side cause, if this error originated at the provisioning service
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::LaunchFailed { source, .. }
            | Self::SubmissionFailed { source, .. }
            | Self::StatusUnavailable { source, .. } => Some(source),
            _ => None,
        }
    }
}
