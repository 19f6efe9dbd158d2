//! Altimetry archive adapter for the coordinator.

use std::path::Path;

use anyhow::Context;

use archive_client::{AvailOptions, AvailOutput, CatalogApi, OrderApi, Query, QueryOptions};

use crate::coordinator::{DataSource, Quest};

/// Wraps an archive [`Query`] in the coordinator's capability interface.
///
/// The adapter owns its collaborators so the coordinator can drive every
/// source uniformly without knowing which remote services back it.
pub struct AltimetrySource {
    query: Query,
    catalog: Box<dyn CatalogApi>,
    orders: Box<dyn OrderApi>,
}

impl AltimetrySource {
    pub fn new(query: Query, catalog: Box<dyn CatalogApi>, orders: Box<dyn OrderApi>) -> Self {
        Self {
            query,
            catalog,
            orders,
        }
    }

    /// The wrapped query, e.g. for logging in before a coordinated download.
    pub fn query_mut(&mut self) -> &mut Query {
        &mut self.query
    }

    pub fn query(&self) -> &Query {
        &self.query
    }
}

impl DataSource for AltimetrySource {
    fn kind(&self) -> &'static str {
        "altimetry"
    }

    fn search_data(&mut self) -> anyhow::Result<String> {
        let output = self
            .query
            .avail_granules(self.catalog.as_ref(), AvailOptions::default())
            .context("granule search failed")?;

        Ok(match output {
            AvailOutput::Summary(summary) => format!(
                "{} granules matched ({:.1} MB total)",
                summary.count, summary.total_size_mb
            ),
            AvailOutput::Lists(_) => "granule lists fetched".to_string(),
        })
    }

    fn download(&mut self, path: &Path) -> anyhow::Result<String> {
        let files = self
            .query
            .download_granules(self.orders.as_ref(), path, false, true, false, &[])
            .context("granule download failed")?;
        Ok(format!("{} files written", files.len()))
    }
}

impl Quest {
    /// Build an archive query under this coordinator's shared filter and
    /// register it as a source.
    pub fn add_altimetry(
        &mut self,
        name: impl Into<String>,
        catalog: Box<dyn CatalogApi>,
        orders: Box<dyn OrderApi>,
        product: &str,
        mut options: QueryOptions,
    ) -> anyhow::Result<()> {
        if options.date_range.is_none() {
            options.date_range = Some(self.temporal().dates());
        }

        let query = Query::new(catalog.as_ref(), product, self.spatial().clone(), options)
            .context("building the altimetry query failed")?;

        self.add_source(name, Box::new(AltimetrySource::new(query, catalog, orders)));
        Ok(())
    }
}
