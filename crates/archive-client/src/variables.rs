//! Variable catalog for subsetting.
//!
//! Products expose their science variables as slash-delimited paths rooted
//! in per-beam groups (e.g. `gt1l/land_ice_segments/h_li`). The same leaf
//! variable legitimately appears under several beam groups; that
//! multiplicity is part of the product layout, not an error. The `wanted`
//! selection feeds the subsetter's Coverage key.

use std::collections::BTreeMap;

use tracing::warn;

use archive_protocol::ProtocolError;

/// Where this catalog's variable list comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarSource {
    /// Populated from the archive's customization capabilities.
    Order,
    /// Populated from a local data file's layout.
    File,
}

/// Available and selected subsettable variables for one product.
#[derive(Debug, Clone)]
pub struct Variables {
    source: VarSource,
    product: String,
    avail: Option<Vec<String>>,
    wanted: Vec<String>,
}

impl Variables {
    pub fn new(source: VarSource, product: impl Into<String>) -> Self {
        Self {
            source,
            product: product.into(),
            avail: None,
            wanted: Vec::new(),
        }
    }

    pub fn source(&self) -> VarSource {
        self.source
    }

    /// Known variable paths, once populated.
    pub fn avail(&self) -> Option<&[String]> {
        self.avail.as_deref()
    }

    pub fn set_avail(&mut self, paths: Vec<String>) {
        self.avail = Some(paths);
    }

    /// The caller's current selection.
    pub fn wanted(&self) -> &[String] {
        &self.wanted
    }

    /// Decompose slash-delimited paths into a leaf-variable to group-prefix
    /// mapping plus the untouched path list.
    ///
    /// A leaf that appears under several groups collects every prefix.
    pub fn parse_var_list(paths: &[String]) -> (BTreeMap<String, Vec<String>>, Vec<String>) {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for path in paths {
            let (prefix, leaf) = match path.rsplit_once('/') {
                Some((prefix, leaf)) => (prefix.to_string(), leaf.to_string()),
                None => (String::new(), path.clone()),
            };
            groups.entry(leaf).or_default().push(prefix);
        }

        (groups, paths.to_vec())
    }

    /// Add paths to the wanted set.
    ///
    /// Every path must exist in the known catalog; on failure nothing is
    /// added. Paths already wanted are skipped silently.
    pub fn append<S: AsRef<str>>(&mut self, paths: &[S]) -> Result<(), ProtocolError> {
        let avail = self.avail.as_deref().ok_or_else(|| {
            ProtocolError::InvalidVariable(
                "variable catalog has not been populated yet".to_string(),
            )
        })?;

        for path in paths {
            let path = path.as_ref();
            if !avail.iter().any(|a| a == path) {
                return Err(ProtocolError::InvalidVariable(path.to_string()));
            }
        }

        for path in paths {
            let path = path.as_ref();
            if !self.wanted.iter().any(|w| w == path) {
                self.wanted.push(path.to_string());
            }
        }
        Ok(())
    }

    /// Remove paths from the wanted set.
    ///
    /// Every path must currently be wanted; on failure nothing is removed.
    pub fn remove<S: AsRef<str>>(&mut self, paths: &[S]) -> Result<(), ProtocolError> {
        for path in paths {
            let path = path.as_ref();
            if !self.wanted.iter().any(|w| w == path) {
                return Err(ProtocolError::InvalidVariable(path.to_string()));
            }
        }

        for path in paths {
            let path = path.as_ref();
            self.wanted.retain(|w| w != path);
        }
        Ok(())
    }

    /// Select the product's default variable list, restricted to paths the
    /// catalog actually knows.
    pub fn append_defaults(&mut self) -> Result<(), ProtocolError> {
        let avail = self.avail.as_deref().ok_or_else(|| {
            ProtocolError::InvalidVariable(
                "variable catalog has not been populated yet".to_string(),
            )
        })?;

        let defaults = default_varlist(&self.product);
        let matching: Vec<String> = avail
            .iter()
            .filter(|path| {
                let leaf = path.rsplit('/').next().unwrap_or(path);
                defaults.iter().any(|d| *d == leaf)
            })
            .cloned()
            .collect();

        for path in matching {
            if !self.wanted.contains(&path) {
                self.wanted.push(path);
            }
        }
        Ok(())
    }
}

/// Default leaf variables to request for a product.
pub fn default_varlist(product: &str) -> Vec<&'static str> {
    let mut list = vec!["delta_time", "latitude", "longitude"];

    match product {
        "ATL06" => list.extend([
            "h_li",
            "h_li_sigma",
            "atl06_quality_summary",
            "segment_id",
            "sigma_geo_h",
            "x_atc",
            "y_atc",
            "seg_azimuth",
            "dh_fit_dx",
            "dh_fit_dy",
            "h_mean",
            "h_rms_misfit",
            "h_robust_sprd",
            "n_fit_photons",
            "signal_selection_source",
            "snr_significance",
            "w_surface_window_final",
            "bsnow_conf",
            "bsnow_h",
            "cloud_flg_asr",
            "cloud_flg_atm",
            "r_eff",
            "tide_ocean",
        ]),
        "ATL07" => list.extend([
            "seg_dist_x",
            "height_segment_height",
            "height_segment_length_seg",
            "height_segment_ssh_flag",
            "height_segment_type",
            "height_segment_quality",
            "height_segment_confidence",
        ]),
        "ATL09" => list.extend([
            "bsnow_h",
            "bsnow_dens",
            "bsnow_con",
            "bsnow_psc",
            "bsnow_od",
            "cloud_flag_asr",
            "cloud_fold_flag",
            "cloud_flag_atm",
            "column_od_asr",
            "column_od_asr_qf",
            "layer_attr",
            "layer_bot",
            "layer_top",
            "layer_flag",
            "layer_dens",
            "layer_ib",
            "msw_flag",
            "prof_dist_x",
            "prof_dist_y",
            "apparent_surf_reflec",
        ]),
        "ATL10" => list.extend([
            "seg_dist_x",
            "lead_height",
            "lead_length",
            "beam_fb_height",
            "beam_fb_length",
            "beam_fb_confidence",
            "beam_fb_quality_flag",
            "height_segment_height",
            "height_segment_length_seg",
            "height_segment_ssh_flag",
            "height_segment_type",
            "height_segment_confidence",
        ]),
        "ATL11" => list.extend([
            "h_corr",
            "h_corr_sigma",
            "h_corr_sigma_systematic",
            "quality_summary",
        ]),
        _ => {
            warn!(
                product,
                "no default variable list for this product; using the common core only"
            );
        }
    }

    list
}
