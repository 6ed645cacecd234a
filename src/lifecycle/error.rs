use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::lifecycle::collaborators::CollaboratorError;
use crate::net::ListenerError;
use crate::routing::RouteError;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Fatal: the process never reaches Serving.
    #[error("configuration load failed: {0}")]
    ConfigLoad(#[from] ConfigError),

    #[error("required collaborator '{name}' failed to initialize: {source}")]
    CollaboratorFailed {
        name: &'static str,
        #[source]
        source: CollaboratorError,
    },

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("route table rejected: {0}")]
    Routes(#[from] RouteError),

    /// Logged, not fatal: the orchestrator still reaches Terminated.
    #[error("drain window of {timeout:?} elapsed with {in_flight} request(s) in flight")]
    DrainTimeout { in_flight: u64, timeout: Duration },
}

impl LifecycleError {
    /// Process exit status for a failure that stops the service.
    pub fn exit_code(&self) -> u8 {
        match self {
            LifecycleError::ConfigLoad(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn config_failure_is_the_distinct_fatal_code() {
        let err = LifecycleError::from(
            crate::config::load_config(Path::new("/no/such/config.yaml")).unwrap_err(),
        );
        assert!(matches!(err, LifecycleError::ConfigLoad(_)));
        assert_eq!(err.exit_code(), 2);

        let drain = LifecycleError::DrainTimeout {
            in_flight: 1,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(drain.exit_code(), 1);
    }
}
