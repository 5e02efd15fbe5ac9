//! Version groups.
//!
//! A [`VersionGroup`] maps one major API version to the services exposed at
//! each maturity tier. Routes are prefixed `/v{major}`, `/v{major}beta` and
//! `/v{major}alpha`.
//!
//! ```
//! use conduit_core::{ActionSet, Service, Tier, VersionGroup, VersionGroups};
//! use std::sync::Arc;
//!
//! struct OrderService;
//!
//! impl Service for OrderService {
//!     fn actions(_set: &mut ActionSet<Self>) {}
//! }
//!
//! fn new_order_service() -> Arc<OrderService> {
//!     Arc::new(OrderService)
//! }
//!
//! let mut groups = VersionGroups::new();
//! groups.insert(VersionGroup::new(1).stable(new_order_service));
//!
//! assert_eq!(Tier::Beta.prefix(1), "/v1beta");
//! assert_eq!(groups.len(), 1);
//! ```

use crate::action::{discover, Action};
use crate::error::BuildError;
use crate::naming::Naming;
use crate::resolver::{Constructor, Resolver};
use crate::Service;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

type Mount = Arc<dyn Fn(&Resolver, &Naming) -> Result<Vec<Action>, BuildError> + Send + Sync>;

/// Maturity tier of a group of services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// `/v{N}`
    Stable,
    /// `/v{N}beta`
    Beta,
    /// `/v{N}alpha`
    Alpha,
}

impl Tier {
    /// All tiers, in mount order.
    pub const ALL: [Self; 3] = [Self::Stable, Self::Beta, Self::Alpha];

    /// Returns the route prefix for `major` at this tier.
    #[must_use]
    pub fn prefix(self, major: u32) -> String {
        match self {
            Self::Stable => format!("/v{major}"),
            Self::Beta => format!("/v{major}beta"),
            Self::Alpha => format!("/v{major}alpha"),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stable => f.write_str("stable"),
            Self::Beta => f.write_str("beta"),
            Self::Alpha => f.write_str("alpha"),
        }
    }
}

/// A service constructor waiting to be resolved and discovered.
#[derive(Clone)]
pub struct ServiceEntry {
    type_name: &'static str,
    mount: Mount,
}

impl ServiceEntry {
    /// Wraps a constructor whose output is a service.
    pub fn new<C, Deps, S>(constructor: C) -> Self
    where
        C: Constructor<Deps, Output = S>,
        Deps: 'static,
        S: Service,
    {
        let mount: Mount = Arc::new(move |resolver, naming| {
            let service = resolver.invoke::<C, Deps>(&constructor)?;
            Ok(discover(service, naming)?)
        });
        Self {
            type_name: S::type_name(),
            mount,
        }
    }

    /// Returns the service type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Builds the service with dependencies from `resolver` and discovers
    /// its actions.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Resolve`] or [`BuildError::Discovery`].
    pub fn mount(&self, resolver: &Resolver, naming: &Naming) -> Result<Vec<Action>, BuildError> {
        (self.mount)(resolver, naming)
    }
}

impl fmt::Debug for ServiceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEntry")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// The services of one major version, by tier.
#[derive(Debug, Clone)]
pub struct VersionGroup {
    major: u32,
    stable: Vec<ServiceEntry>,
    beta: Vec<ServiceEntry>,
    alpha: Vec<ServiceEntry>,
}

impl VersionGroup {
    /// Creates an empty group for `major`.
    ///
    /// # Panics
    ///
    /// Panics if `major` is zero.
    #[must_use]
    pub fn new(major: u32) -> Self {
        assert!(major >= 1, "major version must be at least 1");
        Self {
            major,
            stable: Vec::new(),
            beta: Vec::new(),
            alpha: Vec::new(),
        }
    }

    /// Returns the major version.
    #[must_use]
    pub const fn major(&self) -> u32 {
        self.major
    }

    /// Adds a service at `tier`.
    #[must_use]
    pub fn service<C, Deps, S>(mut self, tier: Tier, constructor: C) -> Self
    where
        C: Constructor<Deps, Output = S>,
        Deps: 'static,
        S: Service,
    {
        let entry = ServiceEntry::new(constructor);
        match tier {
            Tier::Stable => self.stable.push(entry),
            Tier::Beta => self.beta.push(entry),
            Tier::Alpha => self.alpha.push(entry),
        }
        self
    }

    /// Adds a stable service.
    #[must_use]
    pub fn stable<C, Deps, S>(self, constructor: C) -> Self
    where
        C: Constructor<Deps, Output = S>,
        Deps: 'static,
        S: Service,
    {
        self.service(Tier::Stable, constructor)
    }

    /// Adds a beta service.
    #[must_use]
    pub fn beta<C, Deps, S>(self, constructor: C) -> Self
    where
        C: Constructor<Deps, Output = S>,
        Deps: 'static,
        S: Service,
    {
        self.service(Tier::Beta, constructor)
    }

    /// Adds an alpha service.
    #[must_use]
    pub fn alpha<C, Deps, S>(self, constructor: C) -> Self
    where
        C: Constructor<Deps, Output = S>,
        Deps: 'static,
        S: Service,
    {
        self.service(Tier::Alpha, constructor)
    }

    /// Returns the services at `tier`, in insertion order.
    #[must_use]
    pub fn entries(&self, tier: Tier) -> &[ServiceEntry] {
        match tier {
            Tier::Stable => &self.stable,
            Tier::Beta => &self.beta,
            Tier::Alpha => &self.alpha,
        }
    }

    /// Returns the total number of services across tiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stable.len() + self.beta.len() + self.alpha.len()
    }

    /// Returns `true` if no service was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A major version was mapped twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("duplicated major version: v{major}")]
pub struct DuplicateVersion {
    /// The repeated major version.
    pub major: u32,
}

/// Version groups keyed by major version.
#[derive(Debug, Clone, Default)]
pub struct VersionGroups {
    groups: BTreeMap<u32, VersionGroup>,
}

impl VersionGroups {
    /// Creates an empty set of groups.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a group.
    ///
    /// # Panics
    ///
    /// Panics with "duplicated major version" when the major version is
    /// already mapped.
    pub fn insert(&mut self, group: VersionGroup) {
        if let Err(err) = self.try_insert(group) {
            panic!("{err}");
        }
    }

    /// Adds a group, failing on a repeated major version.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateVersion`] when the major version is already mapped.
    pub fn try_insert(&mut self, group: VersionGroup) -> Result<(), DuplicateVersion> {
        let major = group.major;
        if self.groups.contains_key(&major) {
            return Err(DuplicateVersion { major });
        }
        self.groups.insert(major, group);
        Ok(())
    }

    /// Returns the group for `major`.
    #[must_use]
    pub fn get(&self, major: u32) -> Option<&VersionGroup> {
        self.groups.get(&major)
    }

    /// Iterates the groups in ascending major order.
    pub fn iter(&self) -> impl Iterator<Item = &VersionGroup> {
        self.groups.values()
    }

    /// Returns the number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns `true` if no group is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionSet;
    use crate::context::Context;
    use crate::error::ActionError;
    use crate::request::Request;
    use crate::response::JsonResponse;
    use crate::resolver::ResolveError;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Empty {}

    impl Request for Empty {}

    #[derive(Serialize)]
    struct Pong {
        ok: bool,
    }

    impl JsonResponse for Pong {}

    struct Clock;

    struct PingService {
        _clock: Arc<Clock>,
    }

    impl PingService {
        async fn ping(self: Arc<Self>, _ctx: Context, _req: Empty) -> Result<Option<Pong>, ActionError> {
            Ok(Some(Pong { ok: true }))
        }
    }

    impl Service for PingService {
        fn actions(set: &mut ActionSet<Self>) {
            set.action("Ping", Self::ping);
        }
    }

    fn new_ping_service(clock: Arc<Clock>) -> Arc<PingService> {
        Arc::new(PingService { _clock: clock })
    }

    #[test]
    fn test_tier_prefixes() {
        assert_eq!(Tier::Stable.prefix(1), "/v1");
        assert_eq!(Tier::Beta.prefix(2), "/v2beta");
        assert_eq!(Tier::Alpha.prefix(3), "/v3alpha");
        assert_eq!(Tier::Beta.to_string(), "beta");
    }

    #[test]
    #[should_panic(expected = "major version must be at least 1")]
    fn test_zero_major_panics() {
        let _ = VersionGroup::new(0);
    }

    #[test]
    fn test_group_entries_by_tier() {
        let group = VersionGroup::new(1)
            .stable(new_ping_service)
            .alpha(new_ping_service);

        assert_eq!(group.len(), 2);
        assert_eq!(group.entries(Tier::Stable).len(), 1);
        assert!(group.entries(Tier::Beta).is_empty());
        assert_eq!(group.entries(Tier::Alpha)[0].type_name(), "PingService");
    }

    #[test]
    fn test_mount_resolves_dependencies() {
        let mut resolver = Resolver::new();
        resolver.provide(|| Arc::new(Clock)).unwrap();

        let entry = ServiceEntry::new(new_ping_service);
        let actions = entry.mount(&resolver, &Naming::default()).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].relative_path(), "/ping/ping");
    }

    #[test]
    fn test_mount_missing_dependency() {
        let resolver = Resolver::new();
        let entry = ServiceEntry::new(new_ping_service);
        let err = entry.mount(&resolver, &Naming::default()).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Resolve(ResolveError::MissingProvider { .. })
        ));
    }

    #[test]
    fn test_groups_sorted_by_major() {
        let mut groups = VersionGroups::new();
        groups.insert(VersionGroup::new(2));
        groups.insert(VersionGroup::new(1));

        let majors: Vec<u32> = groups.iter().map(VersionGroup::major).collect();
        assert_eq!(majors, vec![1, 2]);
        assert!(groups.get(2).is_some());
    }

    #[test]
    fn test_try_insert_duplicate() {
        let mut groups = VersionGroups::new();
        groups.try_insert(VersionGroup::new(1)).unwrap();
        let err = groups.try_insert(VersionGroup::new(1)).unwrap_err();
        assert_eq!(err, DuplicateVersion { major: 1 });
        assert_eq!(groups.len(), 1);
    }

    #[test]
    #[should_panic(expected = "duplicated major version")]
    fn test_insert_duplicate_panics() {
        let mut groups = VersionGroups::new();
        groups.insert(VersionGroup::new(1));
        groups.insert(VersionGroup::new(1));
    }
}
