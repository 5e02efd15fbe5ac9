//! # Conduit Core
//!
//! Core types and traits for the Conduit toolkit.
//!
//! This crate turns plain service types into HTTP actions:
//!
//! - [`Resolver`] - Dependency graph built from constructor functions
//! - [`Service`] / [`ActionSet`] - Explicit registration of action methods
//! - [`Action`] - A discovered action, bindable to a route
//! - [`VersionGroup`] - Services grouped by major version and [`Tier`]
//! - [`Context`] - Per-call context with request ID and deadline
//! - [`KnownError`] / [`ActionError`] - Errors actions return

#![doc(html_root_url = "https://docs.rs/conduit-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod action;
mod context;
mod error;
mod group;
pub mod naming;
mod request;
pub mod resolver;
mod response;

pub use action::{discover, Action, ActionSet, BindError, BoxFuture, DiscoveryError, PreparedCall, Service};
pub use context::{Context, RequestId};
pub use error::{ActionError, BuildError, KnownError};
pub use group::{DuplicateVersion, ServiceEntry, Tier, VersionGroup, VersionGroups};
pub use naming::Naming;
pub use request::{Request, ValidationError};
pub use resolver::{Constructor, ResolveError, Resolver};
pub use response::{FileStream, JsonResponse, Payload, Response, ResponseKind};
