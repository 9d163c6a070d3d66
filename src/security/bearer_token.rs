use super::{AuthOutcome, IdentityProvider, SecurityRequest};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::debug;

/// Claims the provider reads; everything else in the token is ignored
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// Bearer provider for HS256 JWTs signed with a shared secret.
///
/// The `sub` claim becomes the user id. `exp` is optional but enforced when
/// present, with no leeway.
pub struct BearerTokenProvider {
    key: DecodingKey,
    validation: Validation,
    cookie_name: Option<String>,
}

impl BearerTokenProvider {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["sub"]);
        validation.leeway = 0;
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
            cookie_name: None,
        }
    }

    /// Configure a cookie the token may also be read from
    #[must_use]
    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = Some(name.into());
        self
    }

    fn extract_token<'a>(&self, req: &SecurityRequest<'a>) -> Option<&'a str> {
        if let Some(t) = req
            .get_header("authorization")
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            return Some(t.trim());
        }
        self.cookie_name
            .as_deref()
            .and_then(|name| req.get_cookie(name))
    }

    pub(crate) fn validate_token(&self, token: &str) -> Result<String, String> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| e.to_string())?;
        if data.claims.sub.is_empty() {
            return Err("empty sub claim".to_string());
        }
        Ok(data.claims.sub)
    }
}

impl IdentityProvider for BearerTokenProvider {
    fn identify(&self, req: &SecurityRequest) -> AuthOutcome {
        let Some(token) = self.extract_token(req) else {
            return AuthOutcome::Anonymous;
        };
        match self.validate_token(token) {
            Ok(user) => {
                debug!(user = %user, "Bearer token accepted");
                AuthOutcome::Authenticated(user)
            }
            Err(reason) => {
                debug!(reason = %reason, "Bearer token validation failed");
                AuthOutcome::Rejected(reason)
            }
        }
    }
}
