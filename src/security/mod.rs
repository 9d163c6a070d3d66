//! # Security Module
//!
//! Identity providers decide who is calling. They never decide whether the
//! caller may proceed: the dispatcher combines the [`AuthOutcome`] with the
//! endpoint's `auth_required` flag.
//!
//! | outcome | `auth_required: true` | `auth_required: false` |
//! |---|---|---|
//! | `Anonymous` | 401 | continue as anon |
//! | `Authenticated(user)` | continue as user | continue as user |
//! | `Rejected` | 403 | continue as anon |
//!
//! ## Providers
//!
//! - [`ApiKeyProvider`] - static keys in `X-API-Key` or `Authorization: Api-Key <key>`
//! - [`BearerTokenProvider`] - HS256 JWTs signed with a shared secret
//! - [`ChainProvider`] - tries several providers in order
//! - [`NoAuthProvider`] - everybody is anonymous

use crate::dispatcher::{HeaderVec, ParamVec};

/// Request context for identity providers.
///
/// Borrows the request's headers, query and cookies without copying them.
pub struct SecurityRequest<'a> {
    pub headers: &'a HeaderVec,
    pub query: &'a ParamVec,
    pub cookies: &'a HeaderVec,
}

impl<'a> SecurityRequest<'a> {
    /// Get a header by name (case-insensitive)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&'a str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get a query parameter by name
    #[inline]
    #[must_use]
    pub fn get_query(&self, name: &str) -> Option<&'a str> {
        self.query
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get a cookie by name
    #[inline]
    #[must_use]
    pub fn get_cookie(&self, name: &str) -> Option<&'a str> {
        self.cookies
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// What a provider concluded about the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// No credential presented
    Anonymous,
    /// Valid credential for this user id
    Authenticated(String),
    /// A credential was presented and refused
    Rejected(String),
}

/// Trait for identity providers.
pub trait IdentityProvider: Send + Sync {
    fn identify(&self, req: &SecurityRequest) -> AuthOutcome;
}

/// Treats every caller as anonymous
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthProvider;

impl IdentityProvider for NoAuthProvider {
    fn identify(&self, _req: &SecurityRequest) -> AuthOutcome {
        AuthOutcome::Anonymous
    }
}

mod api_key;
mod bearer_token;
mod chain;

pub use api_key::ApiKeyProvider;
pub use bearer_token::BearerTokenProvider;
pub use chain::ChainProvider;
