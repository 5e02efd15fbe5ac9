//! Dependency resolution for service constructors.
//!
//! Constructors are plain functions whose parameters are their dependencies
//! and whose single return value is the provided instance:
//!
//! ```rust
//! use conduit_core::resolver::Resolver;
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserRepository {
//!     db: Arc<Database>,
//! }
//!
//! fn new_database() -> Arc<Database> {
//!     Arc::new(Database { url: "postgres://localhost/app".to_string() })
//! }
//!
//! fn new_user_repository(db: Arc<Database>) -> Arc<UserRepository> {
//!     Arc::new(UserRepository { db })
//! }
//!
//! let mut resolver = Resolver::new();
//! resolver.provide(new_database).unwrap();
//! resolver.provide(new_user_repository).unwrap();
//!
//! let repo: Arc<UserRepository> = resolver.resolve().unwrap();
//! assert_eq!(repo.db.url, "postgres://localhost/app");
//! ```
//!
//! The return value is always an `Arc<T>`: either a concrete type or a trait
//! object (`Arc<dyn Trait>`). Variadic or multi-return constructors cannot be
//! expressed, so the only failures left for runtime are graph failures:
//! duplicate providers, missing providers and cycles.
//!
//! Every provided type is constructed at most once. Later resolutions share
//! the cached instance.

use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Box<dyn Fn(&Resolver) -> Result<Instance, ResolveError> + Send + Sync>;

/// Error raised while registering or resolving constructors.
///
/// All variants are configuration faults. They surface while the
/// application is being built, never while serving requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A second constructor was provided for an already provided type.
    #[error("a constructor for `{type_name}` is already provided")]
    DuplicateProvider {
        /// The provided type.
        type_name: &'static str,
    },

    /// A dependency has no registered constructor.
    #[error("no constructor provided for `{type_name}`{}", required_by_suffix(.required_by))]
    MissingProvider {
        /// The type that could not be resolved.
        type_name: &'static str,
        /// The type whose constructor asked for it, if any.
        required_by: Option<&'static str>,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected: {path}")]
    Cycle {
        /// The cycle, rendered as `A -> B -> A`.
        path: String,
    },
}

fn required_by_suffix(required_by: &Option<&'static str>) -> String {
    required_by
        .map(|name| format!(" (required by `{name}`)"))
        .unwrap_or_default()
}

/// Identity of a type taking part in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dependency {
    id: TypeId,
    name: &'static str,
}

impl Dependency {
    /// Returns the dependency describing `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Returns the full type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.name
    }
}

/// A function that builds one instance from resolved dependencies.
///
/// Implemented for every `Fn(Arc<A1>, .., Arc<An>) -> Arc<T>` with up to
/// eight parameters. `Deps` is the tuple of parameter types (`(Arc<A1>, ..)`)
/// and only serves to keep the implementations apart; keying it on the
/// `Arc`s keeps the tuple sized when a dependency is a trait object.
pub trait Constructor<Deps>: Send + Sync + 'static {
    /// The type this constructor provides.
    type Output: ?Sized + Send + Sync + 'static;

    /// The declared dependencies, in parameter order.
    fn dependencies() -> Vec<Dependency>;

    /// Resolves every dependency through `resolver` and invokes the constructor.
    fn construct(&self, resolver: &Resolver) -> Result<Arc<Self::Output>, ResolveError>;
}

macro_rules! impl_constructor {
    ($($dep:ident),*) => {
        impl<F, T, $($dep,)*> Constructor<($(Arc<$dep>,)*)> for F
        where
            F: Fn($(Arc<$dep>),*) -> Arc<T> + Send + Sync + 'static,
            T: ?Sized + Send + Sync + 'static,
            $($dep: ?Sized + Send + Sync + 'static,)*
        {
            type Output = T;

            fn dependencies() -> Vec<Dependency> {
                vec![$(Dependency::of::<$dep>()),*]
            }

            #[allow(non_snake_case, unused_variables)]
            fn construct(&self, resolver: &Resolver) -> Result<Arc<T>, ResolveError> {
                $(let $dep = resolver.resolve::<$dep>()?;)*
                Ok(self($($dep),*))
            }
        }
    };
}

impl_constructor!();
impl_constructor!(A1);
impl_constructor!(A1, A2);
impl_constructor!(A1, A2, A3);
impl_constructor!(A1, A2, A3, A4);
impl_constructor!(A1, A2, A3, A4, A5);
impl_constructor!(A1, A2, A3, A4, A5, A6);
impl_constructor!(A1, A2, A3, A4, A5, A6, A7);
impl_constructor!(A1, A2, A3, A4, A5, A6, A7, A8);

struct Provider {
    provides: Dependency,
    requires: Vec<Dependency>,
    factory: Factory,
}

/// The dependency graph of an application.
///
/// # Thread Safety
///
/// `Resolver` is `Send + Sync`. Resolution is expected to happen while the
/// application is built; the in-progress stack used for cycle detection is
/// shared, so concurrent resolutions of unrelated types may report a
/// spurious cycle.
#[derive(Default)]
pub struct Resolver {
    providers: HashMap<TypeId, Provider>,
    instances: Mutex<HashMap<TypeId, Instance>>,
    resolving: Mutex<Vec<Dependency>>,
}

impl Resolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor for its output type.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::DuplicateProvider`] when the output type is
    /// already provided, and [`ResolveError::Cycle`] when the constructor
    /// depends on its own output.
    pub fn provide<C, Deps>(&mut self, constructor: C) -> Result<(), ResolveError>
    where
        C: Constructor<Deps>,
        Deps: 'static,
    {
        let provides = Dependency::of::<C::Output>();
        if self.providers.contains_key(&provides.id) {
            return Err(ResolveError::DuplicateProvider {
                type_name: provides.name,
            });
        }

        let requires = C::dependencies();
        if requires.contains(&provides) {
            return Err(ResolveError::Cycle {
                path: format!("{} -> {}", provides.name, provides.name),
            });
        }

        tracing::debug!(
            provides = provides.name,
            dependencies = requires.len(),
            "registered constructor"
        );

        let factory: Factory = Box::new(move |resolver| {
            let instance = constructor.construct(resolver)?;
            Ok(Arc::new(instance) as Instance)
        });

        self.providers.insert(
            provides.id,
            Provider {
                provides,
                requires,
                factory,
            },
        );
        Ok(())
    }

    /// Resolves a provided type, constructing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::MissingProvider`] when `T` (or one of its
    /// transitive dependencies) has no constructor, and
    /// [`ResolveError::Cycle`] when resolution re-enters a type that is
    /// still being constructed.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveError> {
        let wanted = Dependency::of::<T>();

        if let Some(instance) = self.instances.lock().get(&wanted.id) {
            return downcast::<T>(instance);
        }

        let provider = self.providers.get(&wanted.id).ok_or_else(|| {
            ResolveError::MissingProvider {
                type_name: wanted.name,
                required_by: self.resolving.lock().last().map(|d| d.name),
            }
        })?;

        {
            let mut stack = self.resolving.lock();
            if let Some(start) = stack.iter().position(|d| d.id == wanted.id) {
                let path = stack[start..]
                    .iter()
                    .chain(std::iter::once(&wanted))
                    .map(|d| d.name)
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(ResolveError::Cycle { path });
            }
            stack.push(wanted);
        }

        let built = {
            let _guard = ResolvingGuard(&self.resolving);
            (provider.factory)(self)
        };

        let instance = built?;
        // First writer wins so every consumer shares one instance.
        let instance = Arc::clone(
            self.instances
                .lock()
                .entry(wanted.id)
                .or_insert(instance),
        );
        downcast::<T>(&instance)
    }

    /// Invokes a constructor with dependencies taken from the graph.
    ///
    /// The constructor itself does not have to be provided; its result is
    /// not cached.
    ///
    /// # Errors
    ///
    /// Fails like [`Resolver::resolve`] for any dependency that cannot be
    /// resolved.
    pub fn invoke<C, Deps>(&self, constructor: &C) -> Result<Arc<C::Output>, ResolveError>
    where
        C: Constructor<Deps>,
    {
        constructor.construct(self)
    }

    /// Checks the declared graph for missing providers and cycles without
    /// constructing anything.
    ///
    /// Providers are visited in type-name order so the reported error is
    /// stable across runs.
    ///
    /// # Errors
    ///
    /// Returns the first [`ResolveError::MissingProvider`] or
    /// [`ResolveError::Cycle`] found.
    pub fn verify(&self) -> Result<(), ResolveError> {
        let mut roots: Vec<&Provider> = self.providers.values().collect();
        roots.sort_by_key(|p| p.provides.name);

        let mut done = HashSet::new();
        for root in roots {
            let mut path = Vec::new();
            self.visit(root, &mut path, &mut done)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        provider: &Provider,
        path: &mut Vec<Dependency>,
        done: &mut HashSet<TypeId>,
    ) -> Result<(), ResolveError> {
        if done.contains(&provider.provides.id) {
            return Ok(());
        }
        if let Some(start) = path.iter().position(|d| d.id == provider.provides.id) {
            let cycle = path[start..]
                .iter()
                .chain(std::iter::once(&provider.provides))
                .map(|d| d.name)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(ResolveError::Cycle { path: cycle });
        }

        path.push(provider.provides);
        for dependency in &provider.requires {
            let next = self.providers.get(&dependency.id).ok_or(
                ResolveError::MissingProvider {
                    type_name: dependency.name,
                    required_by: Some(provider.provides.name),
                },
            )?;
            self.visit(next, path, done)?;
        }
        path.pop();

        done.insert(provider.provides.id);
        Ok(())
    }

    /// Returns `true` if a constructor for `T` is provided.
    #[must_use]
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.providers.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of provided types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if nothing is provided.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Pops the in-progress entry even when a constructor panics.
struct ResolvingGuard<'a>(&'a Mutex<Vec<Dependency>>);

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().pop();
    }
}

fn downcast<T: ?Sized + Send + Sync + 'static>(instance: &Instance) -> Result<Arc<T>, ResolveError> {
    instance
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or(ResolveError::MissingProvider {
            type_name: std::any::type_name::<T>(),
            required_by: None,
        })
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("provider_count", &self.providers.len())
            .field("instance_count", &self.instances.lock().len())
            .finish()
    }
}
