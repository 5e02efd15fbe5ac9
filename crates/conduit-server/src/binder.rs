//! Turns version groups into routes.
//!
//! For every group and tier the binder resolves each service constructor
//! once, discovers its actions and mounts them under
//! `{base_url}/v{major}{tier}`:
//!
//! ```text
//! base "/api", v1 stable, DemoService.sum     → POST /api/v1/demo/sum
//! base "",     v2 beta,   omitted HealthService.ping → POST /v2beta/ping
//! ```

use crate::router::{Route, RouteTable};
use conduit_core::{BuildError, Naming, Resolver, Tier, VersionGroups};

/// Returns the route prefix for a tier of a major version.
///
/// `base_url` must already be normalized.
#[must_use]
pub fn prefix(base_url: &str, tier: Tier, major: u32) -> String {
    format!("{base_url}{}", tier.prefix(major))
}

/// Resolves, discovers and mounts every service of every group.
///
/// # Errors
///
/// Returns the first resolution, discovery or route collision error.
pub fn bind(
    groups: &VersionGroups,
    resolver: &Resolver,
    naming: &Naming,
    base_url: &str,
) -> Result<RouteTable, BuildError> {
    if groups.is_empty() {
        return Err(BuildError::NoGroups);
    }

    let mut table = RouteTable::new();
    for group in groups.iter() {
        for tier in Tier::ALL {
            let prefix = prefix(base_url, tier, group.major());
            for entry in group.entries(tier) {
                let actions = entry.mount(resolver, naming)?;
                for action in actions {
                    let path = format!("{prefix}{}", action.relative_path());
                    tracing::info!(
                        path = %path,
                        service = entry.type_name(),
                        kind = %action.kind(),
                        anonymous = action.is_anonymous(),
                        "registered action"
                    );
                    table.insert(Route::new(path, group.major(), tier, action))?;
                }
            }
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::{ActionSet, Context, JsonResponse, Request, Service, VersionGroup};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Deserialize)]
    struct Empty {}

    impl Request for Empty {}

    #[derive(Serialize)]
    struct Done {}

    impl JsonResponse for Done {}

    async fn done<S>(_s: Arc<S>, _ctx: Context, _req: Empty) -> anyhow::Result<Option<Done>> {
        Ok(Some(Done {}))
    }

    struct DemoService;

    impl Service for DemoService {
        fn actions(set: &mut ActionSet<Self>) {
            set.action("Sum", done).action("GetFile", done);
        }
    }

    struct HealthService;

    impl Service for HealthService {
        fn omitted(&self) -> bool {
            true
        }

        fn anonymous(&self) -> bool {
            true
        }

        fn actions(set: &mut ActionSet<Self>) {
            set.action("Ping", done);
        }
    }

    struct DemoHandler;

    impl Service for DemoHandler {
        fn actions(set: &mut ActionSet<Self>) {
            set.action("Sum", done);
        }
    }

    struct Demo;

    impl Service for Demo {
        fn actions(set: &mut ActionSet<Self>) {
            set.action("Sum", done);
        }
    }

    static BUILT: AtomicUsize = AtomicUsize::new(0);

    struct CountedService;

    impl Service for CountedService {
        fn actions(set: &mut ActionSet<Self>) {
            set.action("A", done).action("B", done);
        }
    }

    fn new_counted() -> Arc<CountedService> {
        BUILT.fetch_add(1, Ordering::SeqCst);
        Arc::new(CountedService)
    }

    fn groups(group: VersionGroup) -> VersionGroups {
        let mut groups = VersionGroups::new();
        groups.insert(group);
        groups
    }

    #[test]
    fn test_prefix() {
        assert_eq!(prefix("", Tier::Stable, 1), "/v1");
        assert_eq!(prefix("/api", Tier::Beta, 2), "/api/v2beta");
        assert_eq!(prefix("/api", Tier::Alpha, 3), "/api/v3alpha");
    }

    #[test]
    fn test_binds_every_tier() {
        let group = VersionGroup::new(1)
            .stable(|| Arc::new(DemoService))
            .beta(|| Arc::new(HealthService))
            .alpha(|| Arc::new(DemoService));

        let table = bind(&groups(group), &Resolver::new(), &Naming::default(), "/api").unwrap();

        assert_eq!(
            table.paths(),
            vec![
                "/api/v1/demo/sum",
                "/api/v1/demo/get_file",
                "/api/v1beta/ping",
                "/api/v1alpha/demo/sum",
                "/api/v1alpha/demo/get_file",
            ]
        );
        assert!(table.get("/api/v1beta/ping").unwrap().action().is_anonymous());
        assert_eq!(table.get("/api/v1alpha/demo/sum").unwrap().tier(), Tier::Alpha);
    }

    #[test]
    fn test_constructor_runs_once_per_entry() {
        BUILT.store(0, Ordering::SeqCst);
        let table = bind(
            &groups(VersionGroup::new(1).stable(new_counted)),
            &Resolver::new(),
            &Naming::default(),
            "",
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_collision_across_suffixes() {
        let group = VersionGroup::new(1)
            .stable(|| Arc::new(DemoService))
            .stable(|| Arc::new(DemoHandler));

        let err = bind(&groups(group), &Resolver::new(), &Naming::default(), "").unwrap_err();
        assert!(matches!(err, BuildError::RouteCollision { ref path, .. } if path == "/v1/demo/sum"));
    }

    #[test]
    fn test_missing_suffix_fails() {
        let group = VersionGroup::new(1).stable(|| Arc::new(Demo));
        let err = bind(&groups(group), &Resolver::new(), &Naming::default(), "").unwrap_err();
        assert!(matches!(err, BuildError::Discovery(_)));
    }

    #[test]
    fn test_no_groups() {
        let err = bind(&VersionGroups::new(), &Resolver::new(), &Naming::default(), "").unwrap_err();
        assert!(matches!(err, BuildError::NoGroups));
    }
}
