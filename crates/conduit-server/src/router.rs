//! The action route table.
//!
//! Every action is served as `POST {path}` where the path is fully known at
//! build time, so matching is an exact lookup. Routes keep their
//! registration order for logging.
//!
//! # Example
//!
//! ```rust
//! use conduit_server::RouteTable;
//!
//! let table = RouteTable::new();
//! assert!(table.get("/v1/demo/sum").is_none());
//! assert!(table.is_empty());
//! ```

use conduit_core::{Action, BuildError, Tier};
use indexmap::IndexMap;
use std::sync::Arc;

/// A bound action with the version it was mounted under.
#[derive(Debug, Clone)]
pub struct Route {
    path: String,
    major: u32,
    tier: Tier,
    action: Arc<Action>,
}

impl Route {
    /// Creates a route.
    #[must_use]
    pub fn new(path: impl Into<String>, major: u32, tier: Tier, action: Action) -> Self {
        Self {
            path: path.into(),
            major,
            tier,
            action: Arc::new(action),
        }
    }

    /// Returns the full request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the major version.
    #[must_use]
    pub fn major(&self) -> u32 {
        self.major
    }

    /// Returns the tier.
    #[must_use]
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Returns the action served at this path.
    #[must_use]
    pub fn action(&self) -> &Arc<Action> {
        &self.action
    }
}

/// Exact-path lookup table of action routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: IndexMap<String, Route>,
}

impl RouteTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::RouteCollision`] when the path is already bound.
    pub fn insert(&mut self, route: Route) -> Result<(), BuildError> {
        if let Some(existing) = self.routes.get(route.path()) {
            return Err(BuildError::RouteCollision {
                path: route.path,
                first: existing.action.service().to_string(),
                second: route.action.service().to_string(),
            });
        }
        self.routes.insert(route.path.clone(), route);
        Ok(())
    }

    /// Looks up the route bound to `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Route> {
        self.routes.get(path)
    }

    /// Iterates routes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    /// Returns all bound paths in registration order.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    /// Returns the number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no route is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
