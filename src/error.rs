/// Errors surfaced by the achievement engine.
///
/// Every fallible operation in the crate returns one of these five kinds;
/// callers branch on the variant to pick the user-visible treatment
/// (sign-in prompt, 404, locked-title message, form error, retry state).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A mutating command arrived without a resolvable caller identity.
    #[error("not authenticated")]
    Unauthorized,

    /// Unknown title code, or unknown target user.
    #[error("{0} not found")]
    NotFound(String),

    /// A selection was attempted on a title whose condition is not met.
    #[error("title {0} is not unlocked")]
    Forbidden(String),

    /// The request itself is malformed (e.g. showcase over capacity).
    #[error("invalid request: {0}")]
    Validation(String),

    /// The relational store is unreachable, errored, or timed out.
    /// Retries, if any, belong to the store client, not the engine.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Unavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlx_errors_map_to_unavailable() {
        let err: EngineError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, EngineError::Unavailable(_)));
    }

    #[test]
    fn display_names_the_offending_code() {
        let err = EngineError::Forbidden("TEN_STEPS".into());
        assert_eq!(err.to_string(), "title TEN_STEPS is not unlocked");
    }
}
