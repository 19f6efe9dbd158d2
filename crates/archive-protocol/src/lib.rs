//! Request formatting layer for the altimetry granule archive.
//!
//! This crate holds everything that can be validated and formatted without
//! touching the network: spatial extents (bounding boxes, polygons, polygon
//! files), temporal extents, orbital cycle/track filters, and the three
//! parameter sets submitted to the archive. Those are discovery (the
//! search/metadata endpoint), required (paging and request bookkeeping),
//! and subsetting (server-side reduction of granules before download).
//!
//! The discovery and subsetting services expect *different* serializations
//! of the same geometry and time window; both encodings live here so they
//! cannot drift apart.
//!
//! # Example
//!
//! ```rust
//! use archive_protocol::{SpatialExtent, TemporalExtent};
//!
//! let extent = SpatialExtent::bounding_box(&[-55.0, 68.0, -48.0, 71.0], false).unwrap();
//! let window = TemporalExtent::from_date_range(["2019-02-20", "2019-02-28"], None, None).unwrap();
//!
//! assert_eq!(extent.fmt_for_discovery().1, "-55,68,-48,71");
//! assert_eq!(window.discovery_window(), "2019-02-20T00:00:00Z,2019-02-28T23:59:59Z");
//! ```

pub mod errors;
pub mod extent_file;
pub mod orbit;
pub mod params;
pub mod spatial;
pub mod temporal;

pub use errors::ProtocolError;
pub use orbit::{fmt_readable_granules, validate_cycles, validate_tracks};
pub use params::{
    fmt_var_subset_list, query_pairs, DiscoveryInputs, DiscoveryParams, ParamValue, RequestKind,
    RequiredParams, SubsetInputs, SubsetParams,
};
pub use spatial::{ExtentType, SpatialExtent};
pub use temporal::TemporalExtent;

/// Client identifier tag sent with download-mode required parameters.
pub const CLIENT_STRING: &str = "altimetry-quest";

/// Number of granule entries requested per discovery page.
pub const PAGE_SIZE: u32 = 2000;
