//! External archive collaborators: trait boundary and blocking HTTP
//! implementation.
//!
//! The query core talks to three remote surfaces: the discovery/search
//! endpoint, the ordering/subsetting service, and its capabilities
//! documents. Each is modeled as a trait so tests (and alternative
//! archives) can stand in without network access; [`HttpArchiveClient`]
//! is the production implementation over `reqwest`'s blocking client.

use std::time::Duration;

use bytes::Bytes;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, instrument};

use crate::auth::Session;
use crate::capabilities::{parse_capabilities, CustomOptions};
use crate::errors::ClientError;
use crate::product::CollectionFeed;

/// Discovery provider for on-premises holdings.
pub const PROVIDER_ON_PREM: &str = "NSIDC_ECS";
/// Discovery provider for cloud-hosted holdings.
pub const PROVIDER_CLOUD: &str = "NSIDC_CPRD";

/// One granule descriptor from the discovery feed.
#[derive(Debug, Clone, Deserialize)]
pub struct GranuleEntry {
    pub producer_granule_id: String,
    #[serde(default, deserialize_with = "de_size")]
    pub granule_size: Option<f64>,
    #[serde(default)]
    pub links: Vec<GranuleLink>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GranuleLink {
    #[serde(default)]
    pub href: String,
}

impl GranuleEntry {
    /// Granule size in MB, zero when the feed omitted it.
    pub fn size_mb(&self) -> f64 {
        self.granule_size.unwrap_or(0.0)
    }

    /// The 8-digit orbit group of the granule name: 4-digit track, 2-digit
    /// cycle, 2-digit region segment.
    fn orbit_group(&self) -> Option<&str> {
        let group = self.producer_granule_id.split('_').nth(2)?;
        if group.len() == 8 && group.bytes().all(|b| b.is_ascii_digit()) {
            Some(group)
        } else {
            None
        }
    }

    /// Orbital repeat cycle parsed from the granule name.
    pub fn cycle(&self) -> Option<String> {
        self.orbit_group().map(|g| g[4..6].to_string())
    }

    /// Reference ground track parsed from the granule name.
    pub fn track(&self) -> Option<String> {
        self.orbit_group().map(|g| g[0..4].to_string())
    }

    /// Object-store URLs for cloud-hosted copies of this granule.
    pub fn cloud_urls(&self) -> Vec<String> {
        self.links
            .iter()
            .filter(|l| l.href.starts_with("s3://"))
            .map(|l| l.href.clone())
            .collect()
    }
}

// The feed serializes sizes as strings; accept numbers too.
fn de_size<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Str(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Num(n)) => Some(n),
        Some(Raw::Str(s)) => s.parse().ok(),
        None => None,
    })
}

#[derive(Debug, Deserialize)]
struct GranuleFeed {
    feed: GranuleFeedEntries,
}

#[derive(Debug, Deserialize)]
struct GranuleFeedEntries {
    #[serde(default)]
    entry: Vec<GranuleEntry>,
}

/// Remote order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Pending,
    Processing,
    Complete,
    CompleteWithErrors,
    Failed,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderState::Pending | OrderState::Processing)
    }

    fn from_status_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "pending" => OrderState::Pending,
            "processing" | "in progress" => OrderState::Processing,
            "complete" => OrderState::Complete,
            "complete_with_errors" => OrderState::CompleteWithErrors,
            _ => OrderState::Failed,
        }
    }
}

/// Status snapshot for one order.
#[derive(Debug, Clone)]
pub struct OrderStatus {
    pub state: OrderState,
    /// Messages surfaced by the subsetter (e.g. empty-subset warnings).
    pub messages: Vec<String>,
    /// Output file URLs, populated once the order completes.
    pub file_urls: Vec<String>,
}

/// One file of a completed order's output.
#[derive(Debug, Clone)]
pub struct OrderFile {
    pub name: String,
    pub bytes: Bytes,
}

/// Discovery/search endpoint collaborator.
pub trait CatalogApi {
    /// Run one page of a granule search.
    fn search_granules(&self, params: &[(String, String)])
        -> Result<Vec<GranuleEntry>, ClientError>;

    /// Collection metadata for a product short name.
    fn collection_metadata(&self, short_name: &str) -> Result<CollectionFeed, ClientError>;
}

/// Ordering/subsetting service collaborator.
pub trait OrderApi {
    /// Submit one order, returning its order id.
    fn submit_order(
        &self,
        session: &Session,
        params: &[(String, String)],
    ) -> Result<String, ClientError>;

    /// Poll an order's status.
    fn order_status(&self, session: &Session, order_id: &str) -> Result<OrderStatus, ClientError>;

    /// Fetch the output files of a completed order.
    fn fetch_order(
        &self,
        session: &Session,
        status: &OrderStatus,
    ) -> Result<Vec<OrderFile>, ClientError>;
}

/// Capabilities document collaborator.
pub trait CapabilitiesApi {
    fn custom_options(
        &self,
        session: &Session,
        product: &str,
        version: &str,
    ) -> Result<CustomOptions, ClientError>;
}

/// Remote endpoint layout.
#[derive(Debug, Clone)]
pub struct ArchiveEndpoints {
    /// Granule discovery endpoint (JSON feed).
    pub granule_search_url: String,
    /// Collection metadata endpoint (JSON feed).
    pub collection_search_url: String,
    /// Ordering/subsetting request endpoint.
    pub order_url: String,
    /// Capabilities template; `{product}` and `{version}` are substituted.
    pub capabilities_url: String,
}

impl Default for ArchiveEndpoints {
    fn default() -> Self {
        Self {
            granule_search_url: "https://cmr.earthdata.nasa.gov/search/granules.json".to_string(),
            collection_search_url: "https://cmr.earthdata.nasa.gov/search/collections.json"
                .to_string(),
            order_url: "https://n5eil02u.ecs.nsidc.org/egi/request".to_string(),
            capabilities_url:
                "https://n5eil02u.ecs.nsidc.org/egi/capabilities/{product}.{version}.xml"
                    .to_string(),
        }
    }
}

/// Blocking HTTP implementation of the archive collaborators.
pub struct HttpArchiveClient {
    http: reqwest::blocking::Client,
    endpoints: ArchiveEndpoints,
}

impl HttpArchiveClient {
    pub fn new(endpoints: ArchiveEndpoints) -> Result<Self, ClientError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(600))
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http, endpoints })
    }

    pub fn with_default_endpoints() -> Result<Self, ClientError> {
        Self::new(ArchiveEndpoints::default())
    }

    fn check_status(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, ClientError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http(format!(
                "{} from {}",
                status,
                response.url()
            )));
        }
        Ok(response)
    }
}

impl CatalogApi for HttpArchiveClient {
    #[instrument(skip(self, params))]
    fn search_granules(
        &self,
        params: &[(String, String)],
    ) -> Result<Vec<GranuleEntry>, ClientError> {
        let response = self
            .http
            .get(&self.endpoints.granule_search_url)
            .query(params)
            .send()?;
        let feed: GranuleFeed = Self::check_status(response)?
            .json()
            .map_err(|e| ClientError::BadResponse(e.to_string()))?;

        debug!(count = feed.feed.entry.len(), "discovery page fetched");
        Ok(feed.feed.entry)
    }

    #[instrument(skip(self))]
    fn collection_metadata(&self, short_name: &str) -> Result<CollectionFeed, ClientError> {
        let response = self
            .http
            .get(&self.endpoints.collection_search_url)
            .query(&[("short_name", short_name)])
            .send()?;
        Self::check_status(response)?
            .json()
            .map_err(|e| ClientError::BadResponse(e.to_string()))
    }
}

impl OrderApi for HttpArchiveClient {
    #[instrument(skip(self, session, params))]
    fn submit_order(
        &self,
        session: &Session,
        params: &[(String, String)],
    ) -> Result<String, ClientError> {
        let response = self
            .http
            .get(&self.endpoints.order_url)
            .bearer_auth(session.token())
            .query(params)
            .send()?;
        let body = Self::check_status(response)?.text()?;

        let order_id = first_element_text(&body, b"orderId")
            .ok_or_else(|| ClientError::Order(format!("no order id in response: {}", body)))?;
        info!(order_id = %order_id, "order submitted");
        Ok(order_id)
    }

    #[instrument(skip(self, session))]
    fn order_status(&self, session: &Session, order_id: &str) -> Result<OrderStatus, ClientError> {
        let url = format!("{}/{}", self.endpoints.order_url, order_id);
        let response = self.http.get(&url).bearer_auth(session.token()).send()?;
        let body = Self::check_status(response)?.text()?;

        let state = first_element_text(&body, b"status")
            .map(|s| OrderState::from_status_str(&s))
            .ok_or_else(|| ClientError::Order(format!("no status in response for {}", order_id)))?;

        Ok(OrderStatus {
            state,
            messages: element_texts(&body, b"message"),
            file_urls: element_texts(&body, b"downloadUrl"),
        })
    }

    #[instrument(skip(self, session, status))]
    fn fetch_order(
        &self,
        session: &Session,
        status: &OrderStatus,
    ) -> Result<Vec<OrderFile>, ClientError> {
        let mut files = Vec::with_capacity(status.file_urls.len());
        for url in &status.file_urls {
            let response = self.http.get(url).bearer_auth(session.token()).send()?;
            let response = Self::check_status(response)?;
            let name = url
                .rsplit('/')
                .next()
                .unwrap_or("granule.bin")
                .to_string();
            let bytes = response.bytes()?;
            debug!(name = %name, size = bytes.len(), "order file fetched");
            files.push(OrderFile { name, bytes });
        }
        Ok(files)
    }
}

impl CapabilitiesApi for HttpArchiveClient {
    #[instrument(skip(self, session))]
    fn custom_options(
        &self,
        session: &Session,
        product: &str,
        version: &str,
    ) -> Result<CustomOptions, ClientError> {
        let url = self
            .endpoints
            .capabilities_url
            .replace("{product}", product)
            .replace("{version}", version);
        let response = self.http.get(&url).bearer_auth(session.token()).send()?;
        let body = Self::check_status(response)?.text()?;
        parse_capabilities(&body)
    }
}

/// Text of the first occurrence of `name` in an XML document.
fn first_element_text(xml: &str, name: &[u8]) -> Option<String> {
    element_texts_limit(xml, name, 1).into_iter().next()
}

/// Texts of every occurrence of `name` in an XML document.
fn element_texts(xml: &str, name: &[u8]) -> Vec<String> {
    element_texts_limit(xml, name, usize::MAX)
}

fn element_texts_limit(xml: &str, name: &[u8], limit: usize) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut texts = Vec::new();
    let mut inside = false;

    while texts.len() < limit {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == name => inside = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == name => inside = false,
            Ok(Event::Text(t)) if inside => {
                if let Ok(text) = t.unescape() {
                    texts.push(text.into_owned());
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            Ok(_) => {}
        }
    }

    texts
}
