use async_trait::async_trait;

/// Seam to the application's identity layer.
///
/// The engine never authenticates anyone itself; it only asks "who is the
/// caller right now". `None` means an unauthenticated visitor; reads
/// degrade to "no data", mutations are rejected before any validation.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user_id(&self) -> Option<String>;
}

/// Fixed identity, for tests and single-user embeddings.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<String>);

impl StaticIdentity {
    pub fn user(id: impl Into<String>) -> Self {
        Self(Some(id.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user_id(&self) -> Option<String> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_identity_round_trips() {
        assert_eq!(
            StaticIdentity::user("u1").current_user_id().await.as_deref(),
            Some("u1")
        );
        assert_eq!(StaticIdentity::anonymous().current_user_id().await, None);
    }
}
