//! Granule catalog: search, ordering, and download state.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use archive_protocol::{query_pairs, DiscoveryParams, ParamValue, PAGE_SIZE};

use crate::api::{CatalogApi, GranuleEntry, OrderApi, OrderState, PROVIDER_CLOUD, PROVIDER_ON_PREM};
use crate::auth::Session;
use crate::errors::ClientError;

/// Wait between order status polls.
const ORDER_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Statistics summary of a granule search.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GranuleSummary {
    pub count: usize,
    pub avg_size_mb: f64,
    pub total_size_mb: f64,
}

/// Raw id/cycle/track/cloud lists, one sub-list per discovery page.
#[derive(Debug, Clone, Default)]
pub struct GranuleLists {
    pub ids: Option<Vec<Vec<String>>>,
    pub cycles: Option<Vec<Vec<String>>>,
    pub tracks: Option<Vec<Vec<String>>>,
    pub cloud_urls: Option<Vec<Vec<String>>>,
}

/// The set of remote granules matching a query, plus order/download state.
///
/// Created once per query and mutated by search, order, and download; never
/// recreated within the query's lifetime.
#[derive(Debug, Default)]
pub struct Granules {
    avail: Vec<GranuleEntry>,
    /// Entries per discovery page, in fetch order.
    batches: Vec<usize>,
    searched: bool,
    order_ids: Vec<String>,
    downloaded: BTreeSet<String>,
}

impl Granules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn avail(&self) -> &[GranuleEntry] {
        &self.avail
    }

    pub fn searched(&self) -> bool {
        self.searched
    }

    pub fn order_ids(&self) -> &[String] {
        &self.order_ids
    }

    /// True once every placed order has been fetched to disk.
    pub fn fully_downloaded(&self) -> bool {
        !self.order_ids.is_empty()
            && self.order_ids.iter().all(|id| self.downloaded.contains(id))
    }

    /// Run the discovery search and store the matched granule descriptors.
    ///
    /// Pages through the feed until a short page arrives. A search that
    /// matches nothing is not an error: the catalog is left empty and
    /// [`Granules::info`] reports a zero summary.
    pub fn get_avail(
        &mut self,
        catalog: &dyn CatalogApi,
        discovery: &BTreeMap<String, ParamValue>,
        required: &BTreeMap<String, ParamValue>,
        cloud: bool,
    ) -> Result<(), ClientError> {
        self.avail.clear();
        self.batches.clear();

        let page_size = match required.get("page_size") {
            Some(ParamValue::Int(n)) => *n as usize,
            _ => PAGE_SIZE as usize,
        };

        let provider = if cloud { PROVIDER_CLOUD } else { PROVIDER_ON_PREM };

        let mut page_num = 1u32;
        loop {
            let mut pairs = query_pairs(discovery);
            pairs.extend(
                query_pairs(required)
                    .into_iter()
                    .filter(|(k, _)| k != "page_num"),
            );
            pairs.push(("page_num".to_string(), page_num.to_string()));
            pairs.push(("provider".to_string(), provider.to_string()));

            let entries = catalog.search_granules(&pairs)?;
            let fetched = entries.len();
            debug!(page = page_num, fetched, "discovery page");

            if fetched > 0 {
                self.batches.push(fetched);
                self.avail.extend(entries);
            }
            if fetched < page_size {
                break;
            }
            page_num += 1;
        }

        self.searched = true;
        info!(count = self.avail.len(), "granule search complete");
        Ok(())
    }

    /// Drop search results so the next search re-runs discovery.
    pub fn invalidate_search(&mut self) {
        self.avail.clear();
        self.batches.clear();
        self.searched = false;
    }

    /// Count/size statistics over the stored granule descriptors.
    pub fn info(&self) -> GranuleSummary {
        let count = self.avail.len();
        if count == 0 {
            return GranuleSummary::default();
        }
        let total_size_mb: f64 = self.avail.iter().map(|g| g.size_mb()).sum();
        GranuleSummary {
            count,
            avg_size_mb: total_size_mb / count as f64,
            total_size_mb,
        }
    }

    /// Raw parallel lists of the requested granule fields, preserving
    /// insertion order within each discovery page.
    pub fn gran_ids(&self, ids: bool, cycles: bool, tracks: bool, cloud: bool) -> GranuleLists {
        let mut lists = GranuleLists::default();

        if ids {
            lists.ids = Some(self.by_batch(|g| Some(g.producer_granule_id.clone())));
        }
        if cycles {
            lists.cycles = Some(self.by_batch(|g| g.cycle()));
        }
        if tracks {
            lists.tracks = Some(self.by_batch(|g| g.track()));
        }
        if cloud {
            lists.cloud_urls = Some(
                self.batched_entries()
                    .map(|batch| batch.iter().flat_map(|g| g.cloud_urls()).collect())
                    .collect(),
            );
        }

        lists
    }

    fn by_batch<F>(&self, f: F) -> Vec<Vec<String>>
    where
        F: Fn(&GranuleEntry) -> Option<String>,
    {
        self.batched_entries()
            .map(|batch| batch.iter().filter_map(&f).collect())
            .collect()
    }

    fn batched_entries(&self) -> impl Iterator<Item = &[GranuleEntry]> {
        let mut start = 0;
        self.batches.iter().map(move |len| {
            let batch = &self.avail[start..start + len];
            start += len;
            batch
        })
    }

    /// Submit order(s) for the matched granules.
    ///
    /// The ordering service accepts a single named granule per order, so a
    /// discovery map carrying more than one granule-name pattern is split
    /// into one order per name. A submission failure is fatal to that
    /// sub-order only; siblings still go out. Fails when nothing matched
    /// and no explicit granule-name filter narrows the order.
    pub fn place_order(
        &mut self,
        orders: &dyn OrderApi,
        discovery: &DiscoveryParams,
        required: &BTreeMap<String, ParamValue>,
        subset: &BTreeMap<String, ParamValue>,
        verbose: bool,
        session: &Session,
        geom_file: Option<&Path>,
    ) -> Result<&[String], ClientError> {
        let patterns = discovery.granule_patterns().unwrap_or_default();

        if self.avail.is_empty() && patterns.is_empty() {
            return Err(ClientError::Order(
                "nothing to order: run a search that matches granules or set a granule-name filter"
                    .to_string(),
            ));
        }

        if let Some(file) = geom_file {
            debug!(file = %file.display(), "ordering with file-based extent");
        }

        let narrowed_maps: Vec<BTreeMap<String, ParamValue>> = if patterns.len() > 1 {
            info!(
                orders = patterns.len(),
                "the archive accepts one named granule per order; placing one order per name"
            );
            patterns
                .iter()
                .map(|name| discovery.with_single_granule(name))
                .collect()
        } else {
            vec![discovery.keys().clone()]
        };

        let mut submitted = 0usize;
        for map in &narrowed_maps {
            let mut pairs = query_pairs(map);
            pairs.extend(query_pairs(required));
            pairs.extend(query_pairs(subset));

            match orders.submit_order(session, &pairs) {
                Ok(order_id) => {
                    info!(order_id = %order_id, "order placed");
                    if verbose {
                        match orders.order_status(session, &order_id) {
                            Ok(status) => {
                                for message in &status.messages {
                                    info!(order_id = %order_id, message = %message, "order message");
                                }
                            }
                            Err(e) => warn!(order_id = %order_id, error = %e, "status check failed"),
                        }
                    }
                    self.order_ids.push(order_id);
                    submitted += 1;
                }
                Err(e) => {
                    error!(error = %e, "order submission failed; continuing with remaining orders");
                }
            }
        }

        if submitted == 0 {
            return Err(ClientError::Order(format!(
                "all {} order submission(s) failed",
                narrowed_maps.len()
            )));
        }

        Ok(&self.order_ids)
    }

    /// Poll each order to completion and write its files into `path`.
    ///
    /// With `restart` set, previously fetched orders are skipped and an
    /// empty order list resumes as a no-op instead of failing; ordering is
    /// never re-triggered from here.
    pub fn download(
        &mut self,
        orders: &dyn OrderApi,
        verbose: bool,
        path: &Path,
        session: &Session,
        restart: bool,
    ) -> Result<Vec<PathBuf>, ClientError> {
        if self.order_ids.is_empty() {
            if restart {
                info!("no orders recorded; nothing to resume");
                return Ok(Vec::new());
            }
            return Err(ClientError::Order(
                "no order has been placed for this query".to_string(),
            ));
        }

        fs::create_dir_all(path)?;

        let pending: Vec<String> = self
            .order_ids
            .iter()
            .filter(|id| !self.downloaded.contains(*id))
            .cloned()
            .collect();

        let mut written = Vec::new();
        for order_id in pending {
            let status = loop {
                let status = orders.order_status(session, &order_id)?;
                if status.state.is_terminal() {
                    break status;
                }
                info!(order_id = %order_id, "order still processing; waiting");
                std::thread::sleep(ORDER_POLL_INTERVAL);
            };

            match status.state {
                OrderState::Failed => {
                    error!(order_id = %order_id, "order failed; skipping its output");
                    continue;
                }
                OrderState::CompleteWithErrors => {
                    warn!(order_id = %order_id, "order completed with errors");
                    if verbose {
                        for message in &status.messages {
                            warn!(order_id = %order_id, message = %message, "subsetter message");
                        }
                    }
                }
                _ => {}
            }

            let files = orders.fetch_order(session, &status)?;
            for file in files {
                let target = path.join(&file.name);
                fs::write(&target, &file.bytes)?;
                debug!(file = %target.display(), "wrote order file");
                written.push(target);
            }
            self.downloaded.insert(order_id);
        }

        info!(files = written.len(), path = %path.display(), "download complete");
        Ok(written)
    }
}
