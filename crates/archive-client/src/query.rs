//! Stateful granule query orchestration.
//!
//! A [`Query`] ties one product + spatial/temporal filter to the parameter
//! sets, granule catalog, and variable catalog that serve it, and drives
//! the implicit lifecycle Initialized → Parameterized → Searched → Ordered
//! → Downloaded. Parameter sets and catalogs are materialized on first
//! access and memoized; collaborators are passed into each operation, and
//! the authenticated session is created once via [`Query::login`] and
//! shared read-only afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use archive_protocol::{
    fmt_readable_granules, validate_cycles, validate_tracks, DiscoveryInputs, DiscoveryParams,
    ParamValue, RequiredParams, SpatialExtent, SubsetInputs, SubsetParams, TemporalExtent,
};

use crate::api::{CapabilitiesApi, CatalogApi, OrderApi};
use crate::auth::{Authenticator, CloudCredentials, Session};
use crate::capabilities::CustomOptions;
use crate::errors::ClientError;
use crate::granules::{GranuleLists, GranuleSummary, Granules};
use crate::product::{
    normalize_version, temporal_required, validate_product, CollectionFeed, ProductSummary,
};
use crate::variables::{VarSource, Variables};

/// Optional query construction inputs.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// `[start, end]` dates, `YYYY-MM-DD`.
    pub date_range: Option<[String; 2]>,
    /// Start time of day, `HH:MM:SS`; defaults to midnight.
    pub start_time: Option<String>,
    /// End time of day, `HH:MM:SS`; defaults to end of day.
    pub end_time: Option<String>,
    /// Product version; defaults to the latest release.
    pub version: Option<String>,
    /// Orbital cycle filter.
    pub cycles: Vec<String>,
    /// Reference ground track filter.
    pub tracks: Vec<String>,
}

/// Login inputs for the authentication collaborator.
#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    /// Pass-through options for the underlying credential strategy.
    pub credentials: BTreeMap<String, String>,
    /// Deprecated; ignored.
    pub uid: Option<String>,
    /// Deprecated; ignored.
    pub email: Option<String>,
    /// Also retrieve object-store credentials for cloud-hosted holdings.
    pub s3token: bool,
}

/// Observable lifecycle position of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Initialized,
    Parameterized,
    Searched,
    Ordered,
    Downloaded,
}

/// Which fields `avail_granules` should return raw lists for.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvailOptions {
    pub ids: bool,
    pub cycles: bool,
    pub tracks: bool,
    pub cloud: bool,
}

/// Result of an availability query: a statistics summary by default, raw
/// parallel lists when any list flag was set.
#[derive(Debug, Clone)]
pub enum AvailOutput {
    Summary(GranuleSummary),
    Lists(GranuleLists),
}

/// Query object for one product over one spatio-temporal filter.
#[derive(Debug)]
pub struct Query {
    product: String,
    version: String,
    spatial: SpatialExtent,
    temporal: Option<TemporalExtent>,
    cycles: Vec<String>,
    tracks: Vec<String>,
    readable_granules: Vec<String>,
    metadata: CollectionFeed,
    discovery: DiscoveryParams,
    required: RequiredParams,
    subset: SubsetParams,
    granules: Option<Granules>,
    order_vars: Option<Variables>,
    custom_options: Option<CustomOptions>,
    session: Option<Session>,
    cloud_credentials: Option<CloudCredentials>,
}

impl Query {
    /// Validate inputs and create a query.
    ///
    /// Fetches collection metadata through the catalog collaborator to
    /// resolve the product version. Products that require a temporal
    /// constraint reject construction with neither a date range nor an
    /// orbital filter.
    pub fn new(
        catalog: &dyn CatalogApi,
        product: &str,
        spatial: SpatialExtent,
        options: QueryOptions,
    ) -> Result<Self, ClientError> {
        let product = validate_product(product)?;

        let temporal = match &options.date_range {
            Some([start, end]) => Some(TemporalExtent::from_date_range(
                [start.as_str(), end.as_str()],
                options.start_time.as_deref(),
                options.end_time.as_deref(),
            )?),
            None => None,
        };

        if temporal.is_none()
            && options.cycles.is_empty()
            && options.tracks.is_empty()
            && temporal_required(&product)
        {
            return Err(ClientError::Protocol(
                archive_protocol::ProtocolError::Validation(format!(
                    "product {} requires a date range or a cycle/track filter",
                    product
                )),
            ));
        }

        let cycles = validate_cycles(&options.cycles)?;
        let tracks = validate_tracks(&options.tracks)?;
        let readable_granules = fmt_readable_granules(&product, &cycles, &tracks);

        let metadata = catalog.collection_metadata(&product)?;
        let latest = metadata.latest_version().ok_or_else(|| {
            ClientError::BadResponse(format!("no versions listed for product {}", product))
        })?;
        let version = normalize_version(&latest, options.version.as_deref())?;

        Ok(Self {
            product,
            version,
            spatial,
            temporal,
            cycles,
            tracks,
            readable_granules,
            metadata,
            discovery: DiscoveryParams::new(),
            required: RequiredParams::new(),
            subset: SubsetParams::new(),
            granules: None,
            order_vars: None,
            custom_options: None,
            session: None,
            cloud_credentials: None,
        })
    }

    // ------------------------------------------------------------------
    // Introspection

    pub fn product(&self) -> &str {
        &self.product
    }

    /// Deprecated name for [`Query::product`].
    pub fn dataset(&self) -> &str {
        warn!("'dataset' is deprecated; use 'product'");
        &self.product
    }

    pub fn product_version(&self) -> &str {
        &self.version
    }

    pub fn spatial(&self) -> &SpatialExtent {
        &self.spatial
    }

    /// Canonical `(extent_type, coordinates)` pair.
    pub fn spatial_extent(&self) -> (&'static str, &[f64]) {
        self.spatial.extent()
    }

    pub fn temporal(&self) -> Option<&TemporalExtent> {
        self.temporal.as_ref()
    }

    /// Start/end dates as `YYYY-MM-DD` strings, when a range was set.
    pub fn dates(&self) -> Option<[String; 2]> {
        self.temporal.as_ref().map(|t| t.dates())
    }

    pub fn start_time(&self) -> Option<String> {
        self.temporal.as_ref().map(|t| t.start_time())
    }

    pub fn end_time(&self) -> Option<String> {
        self.temporal.as_ref().map(|t| t.end_time())
    }

    /// Unique requested cycles, sorted.
    pub fn cycles(&self) -> Vec<String> {
        let mut cycles = self.cycles.clone();
        cycles.sort();
        cycles.dedup();
        cycles
    }

    /// Unique requested tracks, sorted.
    pub fn tracks(&self) -> Vec<String> {
        let mut tracks = self.tracks.clone();
        tracks.sort();
        tracks.dedup();
        tracks
    }

    /// Latest version the archive lists for this product.
    pub fn latest_version(&self) -> Option<String> {
        self.metadata.latest_version()
    }

    /// Selected collection metadata for display.
    pub fn product_summary(&self) -> Option<ProductSummary> {
        self.metadata.latest_entry().map(ProductSummary::from)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn cloud_credentials(&self) -> Option<&CloudCredentials> {
        self.cloud_credentials.as_ref()
    }

    /// Current lifecycle position, derived from what has happened so far.
    pub fn state(&self) -> QueryState {
        if let Some(granules) = &self.granules {
            if granules.fully_downloaded() {
                return QueryState::Downloaded;
            }
            if !granules.order_ids().is_empty() {
                return QueryState::Ordered;
            }
            if granules.searched() {
                return QueryState::Searched;
            }
        }
        if self.discovery.is_built() {
            QueryState::Parameterized
        } else {
            QueryState::Initialized
        }
    }

    // ------------------------------------------------------------------
    // Parameter sets

    /// Discovery parameters, built on first access and cached.
    pub fn discovery_params(&mut self) -> &BTreeMap<String, ParamValue> {
        self.build_discovery();
        self.discovery.keys()
    }

    /// Required parameters for the current request kind.
    pub fn required_params(&mut self) -> &BTreeMap<String, ParamValue> {
        self.required.build(None)
    }

    /// Subsetting parameters; empty once subsetting has been disabled.
    pub fn subset_params(
        &mut self,
        extra: &[(String, String)],
    ) -> Result<BTreeMap<String, ParamValue>, ClientError> {
        self.build_subset(extra)
    }

    fn build_discovery(&mut self) {
        let inputs = DiscoveryInputs {
            product: &self.product,
            version: &self.version,
            spatial: &self.spatial,
            temporal: self.temporal.as_ref(),
            readable_granules: if self.readable_granules.is_empty() {
                None
            } else {
                Some(&self.readable_granules)
            },
        };
        self.discovery.build(&inputs);
    }

    fn build_subset(
        &mut self,
        extra: &[(String, String)],
    ) -> Result<BTreeMap<String, ParamValue>, ClientError> {
        let coverage: Option<Vec<String>> = self
            .order_vars
            .as_ref()
            .map(|v| v.wanted().to_vec())
            .filter(|wanted| !wanted.is_empty());
        let inputs = SubsetInputs {
            spatial: Some(&self.spatial),
            temporal: self.temporal.as_ref(),
            coverage: coverage.as_deref(),
        };
        self.subset.build(&inputs, extra).map_err(Into::into)
    }

    // ------------------------------------------------------------------
    // Authentication

    /// Create the authenticated session through the external collaborator.
    ///
    /// The profile email is attached to the session when available so order
    /// notifications can use it later. With `s3token` set, object-store
    /// credentials are retrieved as well.
    pub fn login(
        &mut self,
        auth: &dyn Authenticator,
        options: &LoginOptions,
    ) -> Result<(), ClientError> {
        if options.uid.is_some() || options.email.is_some() {
            warn!("the uid and email login options are deprecated and no longer required");
        }

        let session = auth.login(&options.credentials)?;
        let session = match auth.user_profile() {
            Ok(profile) => session.with_email(profile.email_address),
            Err(e) => {
                warn!(error = %e, "no user profile available; order notifications disabled");
                session
            }
        };

        if options.s3token {
            self.cloud_credentials = Some(auth.cloud_credentials()?);
        }

        self.session = Some(session);
        info!("authenticated session created");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Variables and customization options

    /// Customization options for this product version, fetched once.
    pub fn custom_options(
        &mut self,
        caps: &dyn CapabilitiesApi,
    ) -> Result<&CustomOptions, ClientError> {
        if self.custom_options.is_none() {
            let session = self.session.as_ref().ok_or_else(|| {
                ClientError::AuthRequired("log in before fetching customization options".into())
            })?;
            let options = caps.custom_options(session, &self.product, &self.version)?;
            self.custom_options = Some(options);
        }
        Ok(self.custom_options.as_ref().unwrap())
    }

    /// Variable catalog used to build order subsetting, populated from the
    /// customization options on first access.
    pub fn order_vars(&mut self, caps: &dyn CapabilitiesApi) -> Result<&mut Variables, ClientError> {
        if self.order_vars.is_none() {
            let variables = self.custom_options(caps)?.variables.clone();
            let mut vars = Variables::new(VarSource::Order, self.product.clone());
            vars.set_avail(variables);
            self.order_vars = Some(vars);
        }
        Ok(self.order_vars.as_mut().unwrap())
    }

    // ------------------------------------------------------------------
    // Granule operations

    /// Search the archive for matching granules.
    ///
    /// The catalog is populated once per parameter set; repeat calls after
    /// ordering are legal and do not regress the lifecycle. Returns a
    /// zero-count summary (not an error) when nothing matches.
    pub fn avail_granules(
        &mut self,
        catalog: &dyn CatalogApi,
        options: AvailOptions,
    ) -> Result<AvailOutput, ClientError> {
        self.build_discovery();
        let discovery = self.discovery.keys().clone();
        let required = self.required.build(None).clone();

        let granules = self.granules.get_or_insert_with(Granules::new);
        if !granules.searched() {
            granules.get_avail(catalog, &discovery, &required, options.cloud)?;
        }

        if options.ids || options.cycles || options.tracks || options.cloud {
            Ok(AvailOutput::Lists(granules.gran_ids(
                options.ids,
                options.cycles,
                options.tracks,
                options.cloud,
            )))
        } else {
            Ok(AvailOutput::Summary(granules.info()))
        }
    }

    /// Place order(s) for the matched granules.
    ///
    /// Moves the required parameters into download mode (one-way), toggles
    /// the subsetting state per `subset`, and asks for notification emails
    /// when `email` is set (requires a profile email on the session).
    pub fn order_granules(
        &mut self,
        orders: &dyn OrderApi,
        verbose: bool,
        subset: bool,
        email: bool,
        extra: &[(String, String)],
    ) -> Result<Vec<String>, ClientError> {
        let session = self
            .session
            .clone()
            .ok_or_else(|| ClientError::AuthRequired("log in before ordering".into()))?;

        self.build_discovery();
        self.required.switch_to_download();

        let email_address = if email {
            match session.email() {
                Some(address) => Some(address.to_string()),
                None => {
                    return Err(ClientError::AuthRequired(
                        "session has no profile email for order notifications".into(),
                    ))
                }
            }
        } else {
            None
        };
        let required = self.required.build(email_address.as_deref()).clone();

        if subset {
            self.subset.enable();
        } else {
            self.subset.disable();
        }
        let subset_map = self.build_subset(extra)?;

        let source_file = self.spatial.source_file().map(Path::to_path_buf);
        let granules = self.granules.get_or_insert_with(Granules::new);
        let ids = granules.place_order(
            orders,
            &self.discovery,
            &required,
            &subset_map,
            verbose,
            &session,
            source_file.as_deref(),
        )?;
        Ok(ids.to_vec())
    }

    /// Download ordered granules into `path`.
    ///
    /// Ordering is triggered implicitly when nothing has been ordered yet
    /// and `restart` is not set; with `restart`, the last known order state
    /// is resumed without re-ordering.
    pub fn download_granules(
        &mut self,
        orders: &dyn OrderApi,
        path: &Path,
        verbose: bool,
        subset: bool,
        restart: bool,
        extra: &[(String, String)],
    ) -> Result<Vec<PathBuf>, ClientError> {
        let session = self
            .session
            .clone()
            .ok_or_else(|| ClientError::AuthRequired("log in before downloading".into()))?;

        if !restart {
            let needs_order = self
                .granules
                .as_ref()
                .map(|g| g.order_ids().is_empty())
                .unwrap_or(true);
            if needs_order {
                self.order_granules(orders, verbose, subset, false, extra)?;
            }
        }

        let granules = self.granules.get_or_insert_with(Granules::new);
        granules.download(orders, verbose, path, &session, restart)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (extent_type, coordinates) = self.spatial.extent();
        write!(
            f,
            "Product {} v{}\n('{}', {:?})\nDate range {:?}",
            self.product,
            self.version,
            extent_type,
            coordinates,
            self.dates().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::GranuleEntry;
    use crate::product::CollectionFeed;

    struct FakeCatalog;

    impl CatalogApi for FakeCatalog {
        fn search_granules(
            &self,
            _params: &[(String, String)],
        ) -> Result<Vec<GranuleEntry>, ClientError> {
            Ok(Vec::new())
        }

        fn collection_metadata(&self, short_name: &str) -> Result<CollectionFeed, ClientError> {
            Ok(serde_json::from_value(serde_json::json!({
                "feed": {"entry": [
                    {"version_id": "004", "short_name": short_name},
                    {"version_id": "005", "short_name": short_name,
                     "title": "Land Ice Height V005"}
                ]}
            }))
            .unwrap())
        }
    }

    fn bbox() -> SpatialExtent {
        SpatialExtent::bounding_box(&[-55.0, 68.0, -48.0, 71.0], false).unwrap()
    }

    fn date_options() -> QueryOptions {
        QueryOptions {
            date_range: Some(["2019-02-20".to_string(), "2019-02-28".to_string()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_construction_resolves_version() {
        let query = Query::new(&FakeCatalog, "atl06", bbox(), date_options()).unwrap();
        assert_eq!(query.product(), "ATL06");
        assert_eq!(query.product_version(), "005");
        assert_eq!(query.latest_version(), Some("005".to_string()));
        assert_eq!(query.state(), QueryState::Initialized);
    }

    #[test]
    fn test_requested_version_is_normalized() {
        let options = QueryOptions {
            version: Some("4".to_string()),
            ..date_options()
        };
        let query = Query::new(&FakeCatalog, "ATL06", bbox(), options).unwrap();
        assert_eq!(query.product_version(), "004");
    }

    #[test]
    fn test_temporal_requirement_enforced() {
        // No date range, no orbital filter: rejected for along-track products.
        let err = Query::new(&FakeCatalog, "ATL06", bbox(), QueryOptions::default()).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));

        // A cycle/track filter satisfies the requirement.
        let options = QueryOptions {
            cycles: vec!["03".to_string()],
            tracks: vec!["0849".to_string()],
            ..Default::default()
        };
        let query = Query::new(&FakeCatalog, "ATL06", bbox(), options).unwrap();
        assert_eq!(query.cycles(), vec!["03"]);
        assert_eq!(query.tracks(), vec!["0849"]);

        // Gridded products can be queried by extent alone.
        assert!(Query::new(&FakeCatalog, "ATL14", bbox(), QueryOptions::default()).is_ok());
    }

    #[test]
    fn test_lazy_parameterization() {
        let mut query = Query::new(&FakeCatalog, "ATL06", bbox(), date_options()).unwrap();
        assert_eq!(query.state(), QueryState::Initialized);

        let params = query.discovery_params().clone();
        assert_eq!(query.state(), QueryState::Parameterized);
        assert_eq!(params.get("short_name"), Some(&"ATL06".into()));
        assert_eq!(params.get("version"), Some(&"005".into()));
        assert_eq!(params.get("bounding_box"), Some(&"-55,68,-48,71".into()));

        // Second access returns the identical cached mapping.
        assert_eq!(query.discovery_params(), &params);
    }

    #[test]
    fn test_search_with_zero_matches_is_soft() {
        let mut query = Query::new(&FakeCatalog, "ATL06", bbox(), date_options()).unwrap();
        let output = query
            .avail_granules(&FakeCatalog, AvailOptions::default())
            .unwrap();

        match output {
            AvailOutput::Summary(summary) => assert_eq!(summary.count, 0),
            AvailOutput::Lists(_) => panic!("expected a summary"),
        }
        assert_eq!(query.state(), QueryState::Searched);
    }

    #[test]
    fn test_ordering_requires_session() {
        struct NoOrders;
        impl OrderApi for NoOrders {
            fn submit_order(
                &self,
                _session: &Session,
                _params: &[(String, String)],
            ) -> Result<String, ClientError> {
                unreachable!("must fail before submission")
            }
            fn order_status(
                &self,
                _session: &Session,
                _order_id: &str,
            ) -> Result<crate::api::OrderStatus, ClientError> {
                unreachable!()
            }
            fn fetch_order(
                &self,
                _session: &Session,
                _status: &crate::api::OrderStatus,
            ) -> Result<Vec<crate::api::OrderFile>, ClientError> {
                unreachable!()
            }
        }

        let mut query = Query::new(&FakeCatalog, "ATL06", bbox(), date_options()).unwrap();
        let err = query
            .order_granules(&NoOrders, false, true, false, &[])
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthRequired(_)));
    }
}
