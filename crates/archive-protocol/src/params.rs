//! The three request parameter sets submitted to the archive.
//!
//! Discovery parameters drive the search/metadata endpoint, required
//! parameters carry paging and request bookkeeping, and subsetting
//! parameters instruct the server-side subsetter. Each set is built
//! deterministically from the validated extents plus caller overrides,
//! memoized after the first build, and only rebuilt on explicit request.
//! Rebuilds are additive: a build never drops a key that an earlier build
//! set, it only overwrites per key.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::ProtocolError;
use crate::spatial::SpatialExtent;
use crate::temporal::TemporalExtent;
use crate::{CLIENT_STRING, PAGE_SIZE};

/// Subsetting pass-through keys accepted from callers.
pub const SUBSET_KEY_ALLOW_LIST: &[&str] =
    &["format", "projection", "projection_parameters", "Coverage"];

/// A formatted parameter value.
///
/// List values expand to one repeated key per entry when the request is
/// serialized into query pairs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    Int(u64),
    List(Vec<String>),
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::Int(v as u64)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(v: Vec<String>) -> Self {
        ParamValue::List(v)
    }
}

impl ParamValue {
    fn render(&self) -> Vec<String> {
        match self {
            ParamValue::Str(s) => vec![s.clone()],
            ParamValue::Int(i) => vec![i.to_string()],
            ParamValue::List(items) => items.clone(),
        }
    }
}

/// Expand a parameter map into HTTP query pairs, repeating list keys.
pub fn query_pairs(keys: &BTreeMap<String, ParamValue>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in keys {
        for rendered in value.render() {
            pairs.push((key.clone(), rendered));
        }
    }
    pairs
}

/// Whether a request is still exploratory or has moved to ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Search,
    Download,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Search => "search",
            RequestKind::Download => "download",
        }
    }
}

/// Inputs from which discovery parameters are derived.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryInputs<'a> {
    pub product: &'a str,
    pub version: &'a str,
    pub spatial: &'a SpatialExtent,
    pub temporal: Option<&'a TemporalExtent>,
    /// Granule-name patterns from cycle/track or explicit name filters.
    pub readable_granules: Option<&'a [String]>,
}

/// Memoized discovery (search endpoint) parameter set.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryParams {
    built: bool,
    keys: BTreeMap<String, ParamValue>,
}

impl DiscoveryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn keys(&self) -> &BTreeMap<String, ParamValue> {
        &self.keys
    }

    /// Build the parameter map, returning the cached map when one exists.
    pub fn build(&mut self, inputs: &DiscoveryInputs<'_>) -> &BTreeMap<String, ParamValue> {
        if self.built {
            return &self.keys;
        }
        self.rebuild(inputs)
    }

    /// Derive the keys again, overwriting per key without clearing.
    pub fn rebuild(&mut self, inputs: &DiscoveryInputs<'_>) -> &BTreeMap<String, ParamValue> {
        self.keys
            .insert("short_name".to_string(), inputs.product.into());
        self.keys.insert("version".to_string(), inputs.version.into());

        let (extent_key, extent_value) = inputs.spatial.fmt_for_discovery();
        self.keys.insert(extent_key.to_string(), extent_value.into());

        if let Some(temporal) = inputs.temporal {
            self.keys
                .insert("temporal".to_string(), temporal.discovery_window().into());
        }

        if let Some(patterns) = inputs.readable_granules {
            if !patterns.is_empty() {
                self.keys.insert(
                    "readable_granule_name[]".to_string(),
                    ParamValue::List(patterns.to_vec()),
                );
                self.keys.insert(
                    "options[readable_granule_name][pattern]".to_string(),
                    "true".into(),
                );
                self.keys
                    .insert("options[spatial][or]".to_string(), "true".into());
            }
        }

        self.built = true;
        &self.keys
    }

    /// Drop the cached map so the next build re-derives it.
    pub fn invalidate(&mut self) {
        self.built = false;
        self.keys.clear();
    }

    /// Granule-name patterns currently in the map, if any.
    pub fn granule_patterns(&self) -> Option<Vec<String>> {
        match self.keys.get("readable_granule_name[]") {
            Some(ParamValue::List(patterns)) => Some(patterns.clone()),
            Some(ParamValue::Str(pattern)) => Some(vec![pattern.clone()]),
            _ => None,
        }
    }

    /// Copy of this map with the granule-name filter pinned to one name.
    ///
    /// The ordering service accepts a single named granule per order, so
    /// multi-pattern maps are narrowed one pattern at a time.
    pub fn with_single_granule(&self, name: &str) -> BTreeMap<String, ParamValue> {
        let mut keys = self.keys.clone();
        keys.insert("readable_granule_name[]".to_string(), name.into());
        keys
    }
}

/// Memoized required parameter set (paging and request bookkeeping).
#[derive(Debug, Clone)]
pub struct RequiredParams {
    kind: RequestKind,
    built: bool,
    keys: BTreeMap<String, ParamValue>,
}

impl Default for RequiredParams {
    fn default() -> Self {
        Self {
            kind: RequestKind::Search,
            built: false,
            keys: BTreeMap::new(),
        }
    }
}

impl RequiredParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn keys(&self) -> &BTreeMap<String, ParamValue> {
        &self.keys
    }

    /// One-way transition from search to download, triggered by the first
    /// order placement. Invalidates the cached map so the next build adds
    /// the download-mode keys.
    pub fn switch_to_download(&mut self) {
        if self.kind == RequestKind::Search {
            self.kind = RequestKind::Download;
            self.built = false;
        }
    }

    /// Build the map for the current request kind.
    ///
    /// Search requests carry only the fetch page size. Download requests add
    /// pagination, asynchronous request mode, metadata inclusion, the client
    /// identifier tag, and an optional notification email.
    pub fn build(&mut self, email: Option<&str>) -> &BTreeMap<String, ParamValue> {
        if self.built && email.is_none() {
            return &self.keys;
        }

        self.keys.insert("page_size".to_string(), PAGE_SIZE.into());

        if self.kind == RequestKind::Download {
            self.keys.insert("page_num".to_string(), ParamValue::Int(1));
            self.keys
                .insert("request_mode".to_string(), "async".into());
            self.keys.insert("include_meta".to_string(), "Y".into());
            self.keys
                .insert("client_string".to_string(), CLIENT_STRING.into());
            if let Some(address) = email {
                self.keys.insert("email".to_string(), address.into());
            }
        }

        self.built = true;
        &self.keys
    }
}

/// Inputs from which subsetting parameters are derived.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubsetInputs<'a> {
    pub spatial: Option<&'a SpatialExtent>,
    pub temporal: Option<&'a TemporalExtent>,
    /// Wanted variable paths for the Coverage key.
    pub coverage: Option<&'a [String]>,
}

/// Subsetting parameter set.
///
/// Three explicit states: never built, disabled by the caller (builds are
/// no-ops yielding an empty map until re-enabled), or built.
#[derive(Debug, Clone, Default)]
pub enum SubsetParams {
    #[default]
    Unbuilt,
    Disabled,
    Built(BTreeMap<String, ParamValue>),
}

impl SubsetParams {
    pub fn new() -> Self {
        SubsetParams::Unbuilt
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, SubsetParams::Disabled)
    }

    /// Turn subsetting off; any built map is discarded.
    pub fn disable(&mut self) {
        *self = SubsetParams::Disabled;
    }

    /// Clear the disabled state so the next build derives a map again.
    pub fn enable(&mut self) {
        if matches!(self, SubsetParams::Disabled) {
            *self = SubsetParams::Unbuilt;
        }
    }

    /// The built map, when one exists.
    pub fn keys(&self) -> Option<&BTreeMap<String, ParamValue>> {
        match self {
            SubsetParams::Built(keys) => Some(keys),
            _ => None,
        }
    }

    /// Build (or extend) the subsetting map.
    ///
    /// Returns an empty map while disabled. Caller-supplied pass-through
    /// keys are restricted to [`SUBSET_KEY_ALLOW_LIST`]. Repeated builds
    /// overwrite per key and keep everything else that was already set.
    pub fn build(
        &mut self,
        inputs: &SubsetInputs<'_>,
        extra: &[(String, String)],
    ) -> Result<BTreeMap<String, ParamValue>, ProtocolError> {
        if let SubsetParams::Disabled = self {
            return Ok(BTreeMap::new());
        }

        for (key, _) in extra {
            if !SUBSET_KEY_ALLOW_LIST.contains(&key.as_str()) {
                return Err(ProtocolError::Validation(format!(
                    "subsetting key '{}' not accepted (allowed: {})",
                    key,
                    SUBSET_KEY_ALLOW_LIST.join(", ")
                )));
            }
        }

        let mut keys = match std::mem::take(self) {
            SubsetParams::Built(keys) => keys,
            _ => BTreeMap::new(),
        };

        if let Some(temporal) = inputs.temporal {
            keys.insert("time".to_string(), temporal.subset_window().into());
        }
        if let Some(spatial) = inputs.spatial {
            let (extent_key, extent_value) = spatial.fmt_for_subsetting();
            keys.insert(extent_key.to_string(), extent_value.into());
        }
        if let Some(paths) = inputs.coverage {
            if !paths.is_empty() {
                keys.insert("Coverage".to_string(), fmt_var_subset_list(paths).into());
            }
        }
        for (key, value) in extra {
            keys.insert(key.clone(), value.as_str().into());
        }

        *self = SubsetParams::Built(keys.clone());
        Ok(keys)
    }
}

/// Encode wanted variable paths for the subsetter's Coverage key.
pub fn fmt_var_subset_list(paths: &[String]) -> String {
    paths
        .iter()
        .map(|p| format!("/{}", p.trim_start_matches('/')))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent() -> SpatialExtent {
        SpatialExtent::bounding_box(&[-55.0, 68.0, -48.0, 71.0], false).unwrap()
    }

    fn window() -> TemporalExtent {
        TemporalExtent::from_date_range(["2019-02-20", "2019-02-28"], None, None).unwrap()
    }

    #[test]
    fn test_discovery_build() {
        let extent = extent();
        let window = window();
        let mut params = DiscoveryParams::new();

        let keys = params.build(&DiscoveryInputs {
            product: "ATL06",
            version: "005",
            spatial: &extent,
            temporal: Some(&window),
            readable_granules: None,
        });

        assert_eq!(keys.get("short_name"), Some(&"ATL06".into()));
        assert_eq!(keys.get("version"), Some(&"005".into()));
        assert_eq!(keys.get("bounding_box"), Some(&"-55,68,-48,71".into()));
        assert_eq!(
            keys.get("temporal"),
            Some(&"2019-02-20T00:00:00Z,2019-02-28T23:59:59Z".into())
        );
    }

    #[test]
    fn test_discovery_build_is_idempotent() {
        let extent = extent();
        let window = window();
        let mut params = DiscoveryParams::new();
        let inputs = DiscoveryInputs {
            product: "ATL06",
            version: "005",
            spatial: &extent,
            temporal: Some(&window),
            readable_granules: None,
        };

        let first = params.build(&inputs).clone();
        let second = params.build(&inputs).clone();
        assert_eq!(first, second);

        // An invalidated set re-derives the same mapping.
        params.invalidate();
        assert!(!params.is_built());
        assert_eq!(params.build(&inputs), &first);
    }

    #[test]
    fn test_discovery_granule_patterns() {
        let extent = extent();
        let mut params = DiscoveryParams::new();
        let patterns = vec![
            "ATL06_??????????????_084903??_*".to_string(),
            "ATL06_??????????????_090203??_*".to_string(),
        ];

        let keys = params.build(&DiscoveryInputs {
            product: "ATL06",
            version: "005",
            spatial: &extent,
            temporal: None,
            readable_granules: Some(&patterns),
        });

        assert_eq!(
            keys.get("options[readable_granule_name][pattern]"),
            Some(&"true".into())
        );
        assert_eq!(keys.get("options[spatial][or]"), Some(&"true".into()));
        assert_eq!(params.granule_patterns(), Some(patterns.clone()));

        let narrowed = params.with_single_granule(&patterns[0]);
        assert_eq!(
            narrowed.get("readable_granule_name[]"),
            Some(&patterns[0].as_str().into())
        );
    }

    #[test]
    fn test_required_search_then_download() {
        let mut params = RequiredParams::new();

        let keys = params.build(None);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys.get("page_size"), Some(&ParamValue::Int(2000)));

        params.switch_to_download();
        let keys = params.build(None);
        assert_eq!(keys.get("page_size"), Some(&ParamValue::Int(2000)));
        assert_eq!(keys.get("request_mode"), Some(&"async".into()));
        assert_eq!(keys.get("include_meta"), Some(&"Y".into()));
        assert_eq!(keys.get("client_string"), Some(&CLIENT_STRING.into()));

        // The transition is one-way.
        params.switch_to_download();
        assert_eq!(params.kind(), RequestKind::Download);
    }

    #[test]
    fn test_required_email_threading() {
        let mut params = RequiredParams::new();
        params.switch_to_download();
        let keys = params.build(Some("user@example.com"));
        assert_eq!(keys.get("email"), Some(&"user@example.com".into()));
    }

    #[test]
    fn test_subset_tri_state() {
        let extent = extent();
        let window = window();
        let mut params = SubsetParams::new();
        let inputs = SubsetInputs {
            spatial: Some(&extent),
            temporal: Some(&window),
            coverage: None,
        };

        let keys = params.build(&inputs, &[]).unwrap();
        assert_eq!(
            keys.get("time"),
            Some(&"2019-02-20T00:00:00,2019-02-28T23:59:59".into())
        );
        assert_eq!(keys.get("bbox"), Some(&"-55,68,-48,71".into()));

        params.disable();
        assert!(params.build(&inputs, &[]).unwrap().is_empty());
        assert!(params.keys().is_none());

        params.enable();
        assert!(!params.build(&inputs, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_subset_key_allow_list() {
        let mut params = SubsetParams::new();
        let inputs = SubsetInputs::default();

        let err = params
            .build(&inputs, &[("page_size".to_string(), "10".to_string())])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Validation(_)));

        let keys = params
            .build(&inputs, &[("format".to_string(), "NetCDF4-CF".to_string())])
            .unwrap();
        assert_eq!(keys.get("format"), Some(&"NetCDF4-CF".into()));
    }

    #[test]
    fn test_subset_rebuild_is_additive() {
        let extent = extent();
        let mut params = SubsetParams::new();

        params
            .build(
                &SubsetInputs {
                    spatial: Some(&extent),
                    ..Default::default()
                },
                &[("format".to_string(), "NetCDF4-CF".to_string())],
            )
            .unwrap();

        // A later build without the format key keeps it.
        let keys = params
            .build(
                &SubsetInputs {
                    spatial: Some(&extent),
                    ..Default::default()
                },
                &[],
            )
            .unwrap();
        assert_eq!(keys.get("format"), Some(&"NetCDF4-CF".into()));
    }

    #[test]
    fn test_coverage_formatting() {
        let paths = vec![
            "gt1l/land_ice_segments/h_li".to_string(),
            "gt1r/land_ice_segments/h_li".to_string(),
        ];
        assert_eq!(
            fmt_var_subset_list(&paths),
            "/gt1l/land_ice_segments/h_li,/gt1r/land_ice_segments/h_li"
        );
    }

    #[test]
    fn test_query_pair_expansion() {
        let mut keys = BTreeMap::new();
        keys.insert("page_size".to_string(), ParamValue::Int(2000));
        keys.insert(
            "readable_granule_name[]".to_string(),
            ParamValue::List(vec!["a".to_string(), "b".to_string()]),
        );

        let pairs = query_pairs(&keys);
        assert_eq!(
            pairs,
            vec![
                ("page_size".to_string(), "2000".to_string()),
                ("readable_granule_name[]".to_string(), "a".to_string()),
                ("readable_granule_name[]".to_string(), "b".to_string()),
            ]
        );
    }
}
