//! Multi-source coordinator.
//!
//! A [`Quest`] holds one shared spatial/temporal filter and a named,
//! insertion-ordered collection of data sources, each implementing the
//! uniform [`DataSource`] capability interface. Fan-out operations are
//! best-effort: one source failing is reported and does not stop the sweep
//! over the remaining sources.

use std::fmt;
use std::path::Path;

use tracing::{error, info};

use archive_protocol::{SpatialExtent, TemporalExtent};

/// Uniform capability interface every coordinated source implements.
pub trait DataSource {
    /// Short tag naming the kind of source ("altimetry", "argo", ...).
    fn kind(&self) -> &'static str;

    /// Run the source's search under the shared filter, returning a short
    /// human-readable outcome.
    fn search_data(&mut self) -> anyhow::Result<String>;

    /// Download the source's data into `path`.
    fn download(&mut self, path: &Path) -> anyhow::Result<String>;
}

/// Per-source result of a fan-out call.
pub struct SourceOutcome {
    pub name: String,
    pub kind: &'static str,
    pub result: anyhow::Result<String>,
}

/// Coordinator over heterogeneous data sources sharing one filter.
pub struct Quest {
    spatial: SpatialExtent,
    temporal: TemporalExtent,
    sources: Vec<(String, Box<dyn DataSource>)>,
}

impl Quest {
    pub fn new(spatial: SpatialExtent, temporal: TemporalExtent) -> Self {
        Self {
            spatial,
            temporal,
            sources: Vec::new(),
        }
    }

    /// The shared spatial filter every source queries under.
    pub fn spatial(&self) -> &SpatialExtent {
        &self.spatial
    }

    /// The shared temporal filter every source queries under.
    pub fn temporal(&self) -> &TemporalExtent {
        &self.temporal
    }

    /// Register a source under `name`, keeping insertion order. Re-using a
    /// name replaces that source in place.
    pub fn add_source(&mut self, name: impl Into<String>, source: Box<dyn DataSource>) {
        let name = name.into();
        if let Some(slot) = self.sources.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = source;
        } else {
            self.sources.push((name, source));
        }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn source(&mut self, name: &str) -> Option<&mut (dyn DataSource + 'static)> {
        self.sources
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(move |(_, s)| s.as_mut())
    }

    /// Search every source in registration order.
    ///
    /// Failures are logged and collected; they never abort the remaining
    /// sources.
    pub fn search_all(&mut self) -> Vec<SourceOutcome> {
        info!(sources = self.sources.len(), "searching all data sources");
        self.fan_out(|source| source.search_data())
    }

    /// Download every source's data into `path`, in registration order.
    pub fn download_all(&mut self, path: &Path) -> Vec<SourceOutcome> {
        info!(sources = self.sources.len(), path = %path.display(), "downloading all data sources");
        self.fan_out(|source| source.download(path))
    }

    fn fan_out<F>(&mut self, mut op: F) -> Vec<SourceOutcome>
    where
        F: FnMut(&mut dyn DataSource) -> anyhow::Result<String>,
    {
        let mut outcomes = Vec::with_capacity(self.sources.len());
        for (name, source) in &mut self.sources {
            let kind = source.kind();
            let result = op(source.as_mut());
            match &result {
                Ok(message) => info!(source = %name, kind, message = %message, "source ok"),
                Err(e) => {
                    error!(source = %name, kind, error = %e, "source failed; continuing")
                }
            }
            outcomes.push(SourceOutcome {
                name: name.clone(),
                kind,
                result,
            });
        }
        outcomes
    }
}

impl fmt::Display for Quest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (extent_type, coordinates) = self.spatial.extent();
        write!(
            f,
            "Extent type: {}\nCoordinates: {:?}\nDate range: ({}, {})\nData sets: ",
            extent_type,
            coordinates,
            self.temporal.start(),
            self.temporal.end()
        )?;
        if self.sources.is_empty() {
            write!(f, "None")
        } else {
            write!(f, "{}", self.source_names().join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct ScriptedSource {
        kind: &'static str,
        fail: bool,
        searches: usize,
    }

    impl DataSource for ScriptedSource {
        fn kind(&self) -> &'static str {
            self.kind
        }

        fn search_data(&mut self) -> anyhow::Result<String> {
            self.searches += 1;
            if self.fail {
                Err(anyhow!("remote archive unreachable"))
            } else {
                Ok(format!("search #{} ok", self.searches))
            }
        }

        fn download(&mut self, _path: &Path) -> anyhow::Result<String> {
            if self.fail {
                Err(anyhow!("download refused"))
            } else {
                Ok("downloaded".to_string())
            }
        }
    }

    fn quest() -> Quest {
        let spatial = SpatialExtent::bounding_box(&[-150.0, 30.0, -120.0, 60.0], false).unwrap();
        let temporal =
            TemporalExtent::from_date_range(["2022-06-07", "2022-06-14"], None, None).unwrap();
        Quest::new(spatial, temporal)
    }

    #[test]
    fn test_failure_does_not_stop_the_sweep() {
        let mut quest = quest();
        quest.add_source(
            "floats",
            Box::new(ScriptedSource {
                kind: "argo",
                fail: true,
                searches: 0,
            }),
        );
        quest.add_source(
            "ice-height",
            Box::new(ScriptedSource {
                kind: "altimetry",
                fail: false,
                searches: 0,
            }),
        );

        let outcomes = quest.search_all();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].name, "floats");
        assert!(outcomes[0].result.is_err());
        assert_eq!(outcomes[1].name, "ice-height");
        assert!(outcomes[1].result.is_ok());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut quest = quest();
        for name in ["c", "a", "b"] {
            quest.add_source(
                name,
                Box::new(ScriptedSource {
                    kind: "argo",
                    fail: false,
                    searches: 0,
                }),
            );
        }
        assert_eq!(quest.source_names(), vec!["c", "a", "b"]);

        let outcomes = quest.download_all(Path::new("/tmp/unused"));
        let order: Vec<&str> = outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_reusing_a_name_replaces_in_place() {
        let mut quest = quest();
        quest.add_source(
            "floats",
            Box::new(ScriptedSource {
                kind: "argo",
                fail: true,
                searches: 0,
            }),
        );
        quest.add_source(
            "floats",
            Box::new(ScriptedSource {
                kind: "argo",
                fail: false,
                searches: 0,
            }),
        );

        assert_eq!(quest.source_names(), vec!["floats"]);
        let outcomes = quest.search_all();
        assert!(outcomes[0].result.is_ok());
    }

    #[test]
    fn test_display_lists_sources() {
        let mut quest = quest();
        assert!(quest.to_string().ends_with("Data sets: None"));

        quest.add_source(
            "floats",
            Box::new(ScriptedSource {
                kind: "argo",
                fail: false,
                searches: 0,
            }),
        );
        assert!(quest.to_string().ends_with("Data sets: floats"));
    }
}
