use super::{AuthOutcome, IdentityProvider, SecurityRequest};
use std::sync::Arc;

/// Tries providers in order; the first one that sees a credential decides.
///
/// A provider answering `Anonymous` passes the request on to the next one.
#[derive(Default)]
pub struct ChainProvider {
    providers: Vec<Arc<dyn IdentityProvider>>,
}

impl ChainProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl IdentityProvider for ChainProvider {
    fn identify(&self, req: &SecurityRequest) -> AuthOutcome {
        self.providers
            .iter()
            .map(|p| p.identify(req))
            .find(|o| *o != AuthOutcome::Anonymous)
            .unwrap_or(AuthOutcome::Anonymous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{HeaderVec, ParamVec};
    use crate::security::{ApiKeyProvider, BearerTokenProvider, NoAuthProvider};
    use std::collections::HashMap;

    #[test]
    fn test_first_credential_decides() {
        let chain = ChainProvider::new()
            .with(Arc::new(NoAuthProvider))
            .with(Arc::new(BearerTokenProvider::new("sig")))
            .with(Arc::new(ApiKeyProvider::new(HashMap::new()).with_key("k", "carol")));
        let mut headers = HeaderVec::new();
        headers.push((Arc::from("x-api-key"), "k".to_string()));
        let query = ParamVec::new();
        let cookies = HeaderVec::new();
        let req = SecurityRequest {
            headers: &headers,
            query: &query,
            cookies: &cookies,
        };
        assert_eq!(chain.identify(&req), AuthOutcome::Authenticated("carol".into()));
        assert_eq!(ChainProvider::new().identify(&req), AuthOutcome::Anonymous);
    }
}
