//! Ocean-profile float archive connector.
//!
//! Queries physical ocean float profiles under the coordinator's shared
//! spatio-temporal filter. The float archive takes a different wire format
//! than the granule archive: RFC3339 timestamps with fractional seconds,
//! and the polygon as a JSON `[[lon,lat],...]` ring. Only the
//! parameter-building contract lives here; transport is behind the
//! [`FloatApi`] collaborator.

use std::fs;
use std::path::Path;

use anyhow::{bail, ensure, Context};
use serde::Deserialize;
use tracing::{debug, info, warn};

use archive_protocol::{ExtentType, SpatialExtent, TemporalExtent};

use crate::coordinator::{DataSource, Quest};

/// Measurement parameters the float archive serves, plus the `all` sentinel.
pub const VALID_PARAMS: &[&str] = &[
    "doxy",
    "doxy_argoqc",
    "pressure",
    "pressure_argoqc",
    "salinity",
    "salinity_argoqc",
    "salinity_sfile",
    "salinity_sfile_argoqc",
    "temperature",
    "temperature_argoqc",
    "temperature_sfile",
    "temperature_sfile_argoqc",
    "all",
];

/// One profile hit from a float search.
#[derive(Debug, Clone)]
pub struct FloatProfileSummary {
    pub id: String,
    /// Measurements this profile actually carries.
    pub available: Vec<String>,
}

/// One downloaded profile.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRecord {
    pub id: String,
    pub lon: f64,
    pub lat: f64,
    pub timestamp: String,
    /// Measurement arrays as returned by the archive.
    pub data: serde_json::Value,
}

/// Float archive collaborator.
pub trait FloatApi {
    /// Search profile metadata matching the query payload.
    fn search_profiles(
        &self,
        params: &[(String, String)],
    ) -> anyhow::Result<Vec<FloatProfileSummary>>;

    /// Fetch one profile's measurement data.
    fn fetch_profile(&self, id: &str, measurements: &[String]) -> anyhow::Result<ProfileRecord>;
}

/// Float-profile data source.
pub struct Argo {
    spatial: SpatialExtent,
    temporal: TemporalExtent,
    api: Box<dyn FloatApi>,
    params: Vec<String>,
    pres_range: Option<(f64, f64)>,
    prof_ids: Vec<String>,
    profiles: Vec<ProfileRecord>,
}

impl Argo {
    /// The float archive only accepts bounding-box extents.
    pub fn new(
        spatial: SpatialExtent,
        temporal: TemporalExtent,
        api: Box<dyn FloatApi>,
    ) -> anyhow::Result<Self> {
        if spatial.extent_type() != ExtentType::BoundingBox {
            bail!("the float archive requires a bounding-box spatial extent");
        }
        Ok(Self {
            spatial,
            temporal,
            api,
            params: vec!["all".to_string()],
            pres_range: None,
            prof_ids: Vec::new(),
            profiles: Vec::new(),
        })
    }

    /// Restrict the query to specific measurement parameters.
    ///
    /// `all` collapses the list to the sentinel alone; anything outside
    /// [`VALID_PARAMS`] is rejected.
    pub fn set_params<S: AsRef<str>>(&mut self, params: &[S]) -> anyhow::Result<()> {
        if params.iter().any(|p| p.as_ref() == "all") {
            self.params = vec!["all".to_string()];
            return Ok(());
        }

        let mut validated = Vec::with_capacity(params.len());
        for param in params {
            let param = param.as_ref();
            ensure!(
                VALID_PARAMS.contains(&param),
                "parameter '{}' is not valid; valid parameters are {:?}",
                param,
                VALID_PARAMS
            );
            validated.push(param.to_string());
        }
        self.params = validated;
        Ok(())
    }

    /// Restrict the query to a pressure (depth) range in dbar.
    pub fn set_pres_range(&mut self, range: Option<(f64, f64)>) {
        self.pres_range = range;
    }

    pub fn profile_ids(&self) -> &[String] {
        &self.prof_ids
    }

    pub fn profiles(&self) -> &[ProfileRecord] {
        &self.profiles
    }

    /// Spatial extent in the float archive's `[[lon,lat],...]` encoding.
    pub fn fmt_coordinates(&self) -> String {
        let ring: Vec<String> = self
            .spatial
            .ring()
            .iter()
            .map(|(lon, lat)| format!("[{},{}]", lon, lat))
            .collect();
        format!("[{}]", ring.join(","))
    }

    fn search_payload(&self) -> Vec<(String, String)> {
        let mut payload = vec![
            (
                "startDate".to_string(),
                self.temporal
                    .start()
                    .format("%Y-%m-%dT%H:%M:%S%.6fZ")
                    .to_string(),
            ),
            (
                "endDate".to_string(),
                self.temporal
                    .end()
                    .format("%Y-%m-%dT%H:%M:%S%.6fZ")
                    .to_string(),
            ),
            ("polygon".to_string(), self.fmt_coordinates()),
        ];
        if let Some((min, max)) = self.pres_range {
            payload.push(("presRange".to_string(), format!("{},{}", min, max)));
        }
        payload
    }

    /// Search for profiles under the shared filter.
    ///
    /// A query matching no profiles is a soft outcome, not an error. When
    /// specific measurements were requested, only profiles carrying every
    /// one of them are kept.
    pub fn search_data(&mut self) -> anyhow::Result<String> {
        let payload = self.search_payload();
        debug!(?payload, "searching float profiles");
        let summaries = self.api.search_profiles(&payload)?;

        if summaries.is_empty() {
            self.prof_ids.clear();
            let msg = "query returned no profiles; try different search parameters".to_string();
            warn!("{}", msg);
            return Ok(msg);
        }

        let want_all = self.params.iter().any(|p| p == "all");
        self.prof_ids = summaries
            .iter()
            .filter(|summary| {
                want_all
                    || self
                        .params
                        .iter()
                        .all(|param| summary.available.iter().any(|a| a == param))
            })
            .map(|summary| summary.id.clone())
            .collect();

        let msg = format!("{} valid profiles have been identified", self.prof_ids.len());
        info!("{}", msg);
        Ok(msg)
    }

    /// Fetch every identified profile's measurement data.
    pub fn download_profiles(&mut self) -> anyhow::Result<usize> {
        let measurements: Vec<String> = self
            .params
            .iter()
            .filter(|p| p.as_str() != "all")
            .cloned()
            .collect();

        for id in self.prof_ids.clone() {
            debug!(profile = %id, "fetching profile");
            let record = self
                .api
                .fetch_profile(&id, &measurements)
                .with_context(|| format!("fetching profile {} failed", id))?;
            self.profiles.retain(|p| p.id != record.id);
            self.profiles.push(record);
        }
        Ok(self.profiles.len())
    }
}

impl DataSource for Argo {
    fn kind(&self) -> &'static str {
        "argo"
    }

    fn search_data(&mut self) -> anyhow::Result<String> {
        Argo::search_data(self)
    }

    fn download(&mut self, path: &Path) -> anyhow::Result<String> {
        if self.prof_ids.is_empty() {
            Argo::search_data(self)?;
        }
        let count = self.download_profiles()?;

        fs::create_dir_all(path)?;
        for record in &self.profiles {
            let target = path.join(format!("{}.json", record.id));
            let body = serde_json::json!({
                "id": record.id,
                "lon": record.lon,
                "lat": record.lat,
                "timestamp": record.timestamp,
                "data": record.data,
            });
            fs::write(&target, serde_json::to_string_pretty(&body)?)?;
        }
        Ok(format!("{} profiles written", count))
    }
}

impl Quest {
    /// Register a float-profile source under this coordinator's filter.
    pub fn add_argo<S: AsRef<str>>(
        &mut self,
        name: impl Into<String>,
        api: Box<dyn FloatApi>,
        params: &[S],
        pres_range: Option<(f64, f64)>,
    ) -> anyhow::Result<()> {
        let mut argo = Argo::new(self.spatial().clone(), self.temporal().clone(), api)?;
        argo.set_params(params)?;
        argo.set_pres_range(pres_range);
        self.add_source(name, Box::new(argo));
        Ok(())
    }
}

/// Blocking HTTP implementation of [`FloatApi`].
pub struct ArgovisClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl ArgovisClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("building the float archive HTTP client failed")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }
}

impl FloatApi for ArgovisClient {
    fn search_profiles(
        &self,
        params: &[(String, String)],
    ) -> anyhow::Result<Vec<FloatProfileSummary>> {
        let response = self
            .http
            .get(&self.base_url)
            .header("x-argokey", &self.api_key)
            .query(params)
            .send()
            .context("float archive search request failed")?;
        ensure!(
            response.status().is_success(),
            "unexpected float archive response: {}",
            response.status()
        );

        let raw: Vec<serde_json::Value> = response.json()?;
        Ok(raw
            .iter()
            .map(|profile| FloatProfileSummary {
                id: profile["_id"].as_str().unwrap_or_default().to_string(),
                available: profile["data_info"][0]
                    .as_array()
                    .map(|names| {
                        names
                            .iter()
                            .filter_map(|n| n.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect())
    }

    fn fetch_profile(&self, id: &str, measurements: &[String]) -> anyhow::Result<ProfileRecord> {
        let mut params = vec![("id".to_string(), id.to_string())];
        for measurement in measurements {
            params.push(("data".to_string(), measurement.clone()));
        }

        let response = self
            .http
            .get(&self.base_url)
            .header("x-argokey", &self.api_key)
            .query(&params)
            .send()
            .context("float archive profile request failed")?;
        ensure!(
            response.status().is_success(),
            "unexpected float archive response: {}",
            response.status()
        );

        let raw: Vec<serde_json::Value> = response.json()?;
        let profile = raw
            .first()
            .with_context(|| format!("profile {} not found", id))?;

        let coordinates = &profile["geolocation"]["coordinates"];
        Ok(ProfileRecord {
            id: profile["_id"].as_str().unwrap_or(id).to_string(),
            lon: coordinates[0].as_f64().unwrap_or_default(),
            lat: coordinates[1].as_f64().unwrap_or_default(),
            timestamp: profile["timestamp"].as_str().unwrap_or_default().to_string(),
            data: profile["data"].clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct FakeFloats {
        profiles: Vec<FloatProfileSummary>,
        fetched: RefCell<Vec<String>>,
    }

    impl FloatApi for FakeFloats {
        fn search_profiles(
            &self,
            _params: &[(String, String)],
        ) -> anyhow::Result<Vec<FloatProfileSummary>> {
            Ok(self.profiles.clone())
        }

        fn fetch_profile(
            &self,
            id: &str,
            _measurements: &[String],
        ) -> anyhow::Result<ProfileRecord> {
            self.fetched.borrow_mut().push(id.to_string());
            Ok(ProfileRecord {
                id: id.to_string(),
                lon: -150.0,
                lat: 33.4,
                timestamp: "2022-04-12T10:00:00Z".to_string(),
                data: serde_json::json!([[3.9, 5.7], [18.6, 18.5]]),
            })
        }
    }

    fn bbox() -> SpatialExtent {
        SpatialExtent::bounding_box(&[-154.0, 30.0, -143.0, 37.0], false).unwrap()
    }

    fn window() -> TemporalExtent {
        TemporalExtent::from_date_range(["2022-04-12", "2022-04-26"], None, None).unwrap()
    }

    fn floats(profiles: Vec<FloatProfileSummary>) -> Box<FakeFloats> {
        Box::new(FakeFloats {
            profiles,
            fetched: RefCell::new(Vec::new()),
        })
    }

    fn summary(id: &str, available: &[&str]) -> FloatProfileSummary {
        FloatProfileSummary {
            id: id.to_string(),
            available: available.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_polygon_extent_rejected() {
        let polygon = SpatialExtent::polygon(
            &[-154.0, 30.0, -143.0, 30.0, -143.0, 37.0, -154.0, 30.0],
            false,
        )
        .unwrap();
        assert!(Argo::new(polygon, window(), floats(Vec::new())).is_err());
    }

    #[test]
    fn test_param_validation() {
        let mut argo = Argo::new(bbox(), window(), floats(Vec::new())).unwrap();

        argo.set_params(&["temperature", "salinity_argoqc"]).unwrap();
        assert_eq!(argo.params, vec!["temperature", "salinity_argoqc"]);

        // "all" collapses the list.
        argo.set_params(&["temperature", "all"]).unwrap();
        assert_eq!(argo.params, vec!["all"]);

        assert!(argo.set_params(&["chlorophyll"]).is_err());
    }

    #[test]
    fn test_coordinate_and_time_encoding() {
        let argo = Argo::new(bbox(), window(), floats(Vec::new())).unwrap();

        assert_eq!(
            argo.fmt_coordinates(),
            "[[-154,30],[-143,30],[-143,37],[-154,37],[-154,30]]"
        );

        let payload = argo.search_payload();
        assert_eq!(
            payload[0],
            (
                "startDate".to_string(),
                "2022-04-12T00:00:00.000000Z".to_string()
            )
        );
        assert_eq!(
            payload[1],
            (
                "endDate".to_string(),
                "2022-04-26T23:59:59.000000Z".to_string()
            )
        );
    }

    #[test]
    fn test_pressure_range_payload() {
        let mut argo = Argo::new(bbox(), window(), floats(Vec::new())).unwrap();
        argo.set_pres_range(Some((0.0, 500.0)));
        let payload = argo.search_payload();
        assert!(payload.contains(&("presRange".to_string(), "0,500".to_string())));
    }

    #[test]
    fn test_search_filters_by_requested_measurements() {
        let mut argo = Argo::new(
            bbox(),
            window(),
            floats(vec![
                summary("4902911_1", &["pressure", "temperature", "salinity"]),
                summary("4902911_2", &["pressure"]),
            ]),
        )
        .unwrap();
        argo.set_params(&["temperature"]).unwrap();

        let msg = argo.search_data().unwrap();
        assert_eq!(argo.profile_ids(), &["4902911_1".to_string()]);
        assert!(msg.contains("1 valid profiles"));
    }

    #[test]
    fn test_empty_search_is_soft() {
        let mut argo = Argo::new(bbox(), window(), floats(Vec::new())).unwrap();
        let msg = argo.search_data().unwrap();
        assert!(msg.contains("no profiles"));
        assert!(argo.profile_ids().is_empty());
    }

    #[test]
    fn test_download_writes_profile_files() {
        let mut argo = Argo::new(
            bbox(),
            window(),
            floats(vec![summary("4902911_1", &["temperature"])]),
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let msg = DataSource::download(&mut argo, dir.path()).unwrap();
        assert!(msg.contains("1 profiles"));
        assert!(dir.path().join("4902911_1.json").exists());
        assert_eq!(argo.profiles().len(), 1);
    }
}
