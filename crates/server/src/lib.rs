//! HTTP front end for resumable uploads.
//!
//! Exposes the upload store at a fixed base path: `POST` creates a
//! session, `HEAD` queries its offset, `PATCH` appends a chunk, and any
//! other method is refused. Everything interesting (completion handling,
//! overwrite policy, atomic commit) happens behind the scenes in the
//! per-user consumer owned by the handler registry.

pub mod config;
pub mod context;
pub mod headers;
pub mod routes;

pub use config::Config;
pub use context::{RequestContext, RequestUser, StaticContext, TokenTable};
pub use routes::{AppState, router};

/// Base path the upload endpoints are mounted at.
pub const BASE_PATH: &str = "/api/uploads";
