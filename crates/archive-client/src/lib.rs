//! Blocking client for the altimetry granule archive.
//!
//! Composes the request-formatting layer from `archive-protocol` with the
//! stateful pieces of a data order: product reference data, the granule
//! catalog (search / order / download), the subsettable-variable catalog,
//! and the [`Query`] object that drives them through the lifecycle
//! Initialized → Parameterized → Searched → Ordered → Downloaded.
//!
//! All remote interaction goes through collaborator traits
//! ([`CatalogApi`], [`OrderApi`], [`CapabilitiesApi`], [`Authenticator`]);
//! [`HttpArchiveClient`] implements them over blocking HTTP.

pub mod api;
pub mod auth;
pub mod capabilities;
pub mod errors;
pub mod granules;
pub mod product;
pub mod query;
pub mod variables;

pub use api::{
    ArchiveEndpoints, CapabilitiesApi, CatalogApi, GranuleEntry, HttpArchiveClient, OrderApi,
    OrderFile, OrderState, OrderStatus,
};
pub use auth::{Authenticator, CloudCredentials, Session, UserProfile};
pub use capabilities::CustomOptions;
pub use errors::ClientError;
pub use granules::{GranuleLists, GranuleSummary, Granules};
pub use product::{ProductSummary, PRODUCTS};
pub use query::{AvailOptions, AvailOutput, LoginOptions, Query, QueryOptions, QueryState};
pub use variables::{VarSource, Variables};
