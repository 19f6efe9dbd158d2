//! Quest: multi-source spatio-temporal query coordination.
//!
//! One shared spatial/temporal filter fans out across heterogeneous data
//! sources (the altimetry granule archive, the ocean-profile float
//! archive), each registered by name behind the uniform
//! [`DataSource`] `{search_data, download}` capability interface. Fan-out
//! is best-effort: per-source failures are reported without stopping the
//! sweep.
//!
//! # Example
//!
//! ```rust,no_run
//! use archive_protocol::{SpatialExtent, TemporalExtent};
//! use quest::{ArgovisClient, Quest};
//!
//! let spatial = SpatialExtent::bounding_box(&[-150.0, 30.0, -120.0, 60.0], false)?;
//! let temporal = TemporalExtent::from_date_range(["2022-06-07", "2022-06-14"], None, None)?;
//! let mut quest = Quest::new(spatial, temporal);
//!
//! let floats = ArgovisClient::new("https://argovis-api.colorado.edu/argo", "my-key")?;
//! quest.add_argo("floats", Box::new(floats), &["temperature"], None)?;
//!
//! for outcome in quest.search_all() {
//!     println!("{}: {:?}", outcome.name, outcome.result);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod altimetry;
pub mod argo;
pub mod coordinator;

pub use altimetry::AltimetrySource;
pub use argo::{Argo, ArgovisClient, FloatApi, FloatProfileSummary, ProfileRecord};
pub use coordinator::{DataSource, Quest, SourceOutcome};
