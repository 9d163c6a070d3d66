use super::{AuthOutcome, IdentityProvider, SecurityRequest};
use std::collections::HashMap;
use tracing::debug;

/// Static API keys mapped to user ids.
///
/// Reads the key from `X-API-Key` (header name configurable) or from
/// `Authorization: Api-Key <key>`. A key that is present but unknown is
/// rejected; no key at all is anonymous.
pub struct ApiKeyProvider {
    header_name: String,
    keys: HashMap<String, String>,
}

impl ApiKeyProvider {
    #[must_use]
    pub fn new(keys: HashMap<String, String>) -> Self {
        Self {
            header_name: "x-api-key".to_string(),
            keys,
        }
    }

    /// Configure the header the key is read from
    #[must_use]
    pub fn header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }

    /// Builder: add a key
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>, user: impl Into<String>) -> Self {
        self.keys.insert(key.into(), user.into());
        self
    }

    fn extract_key<'a>(&self, req: &SecurityRequest<'a>) -> Option<&'a str> {
        if let Some(k) = req.get_header(&self.header_name) {
            return Some(k.trim());
        }
        req.get_header("authorization")
            .and_then(|h| h.strip_prefix("Api-Key "))
            .map(str::trim)
    }
}

impl IdentityProvider for ApiKeyProvider {
    fn identify(&self, req: &SecurityRequest) -> AuthOutcome {
        let Some(key) = self.extract_key(req) else {
            return AuthOutcome::Anonymous;
        };
        match self.keys.get(key) {
            Some(user) => AuthOutcome::Authenticated(user.clone()),
            None => {
                debug!("ApiKey validation failed: unknown key");
                AuthOutcome::Rejected("unknown API key".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{HeaderVec, ParamVec};
    use std::sync::Arc;

    fn outcome(provider: &ApiKeyProvider, name: &str, value: &str) -> AuthOutcome {
        let mut headers = HeaderVec::new();
        headers.push((Arc::from(name), value.to_string()));
        let query = ParamVec::new();
        let cookies = HeaderVec::new();
        provider.identify(&SecurityRequest {
            headers: &headers,
            query: &query,
            cookies: &cookies,
        })
    }

    #[test]
    fn test_api_key_sources() {
        let p = ApiKeyProvider::new(HashMap::new()).with_key("k1", "alice");
        assert_eq!(
            outcome(&p, "X-API-Key", "k1"),
            AuthOutcome::Authenticated("alice".into())
        );
        assert_eq!(
            outcome(&p, "Authorization", "Api-Key k1"),
            AuthOutcome::Authenticated("alice".into())
        );
        assert!(matches!(outcome(&p, "X-API-Key", "nope"), AuthOutcome::Rejected(_)));
        assert_eq!(outcome(&p, "Accept", "*/*"), AuthOutcome::Anonymous);
    }
}
