//! Immutable routing table from (path, method) to a resolved endpoint.
//!
//! Paths may contain whole-segment parameters (`/items/{id}`); literal paths
//! always win over templates, and among templates the one with fewer
//! parameters is tried first.

mod core;

pub use core::{RegisteredEndpoint, Registry, RegistryError, RouteMatch};
