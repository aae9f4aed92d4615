//! Request-context collaborator.
//!
//! Authentication itself is external; the server only needs the two
//! facts a request context can supply: who the user is, and where their
//! storage tree is rooted.

use std::collections::HashMap;
use std::path::PathBuf;

use axum::http::HeaderMap;

/// The authenticated user behind a request.
#[derive(Debug, Clone)]
pub struct RequestUser {
    pub id: u64,
    /// Root of this user's permanent storage tree.
    pub root: PathBuf,
}

/// Resolves the user behind a request. `None` yields a 401 response.
pub trait RequestContext: Send + Sync + 'static {
    fn resolve(&self, headers: &HeaderMap) -> Option<RequestUser>;
}

/// Single-user context: every request maps to the same user and root.
pub struct StaticContext {
    pub user_id: u64,
    pub root: PathBuf,
}

impl RequestContext for StaticContext {
    fn resolve(&self, _headers: &HeaderMap) -> Option<RequestUser> {
        Some(RequestUser {
            id: self.user_id,
            root: self.root.clone(),
        })
    }
}

/// Token-table context: maps the `X-Auth` header value to a user.
#[derive(Default)]
pub struct TokenTable {
    tokens: HashMap<String, RequestUser>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, user: RequestUser) {
        self.tokens.insert(token.into(), user);
    }
}

impl RequestContext for TokenTable {
    fn resolve(&self, headers: &HeaderMap) -> Option<RequestUser> {
        let token = headers.get("x-auth")?.to_str().ok()?;
        self.tokens.get(token).cloned()
    }
}
