//! Orbital cycle/track filters and granule-name pattern formatting.
//!
//! Granule file names embed the orbit in an 8-digit group: a 4-digit
//! reference ground track, a 2-digit repeat cycle, and a 2-digit region
//! segment. Cycle/track filters are turned into discovery-side name
//! patterns with `?` wildcards in the unconstrained fields.

use crate::errors::ProtocolError;

/// Highest repeat cycle the archive can serve.
pub const MAX_CYCLE: u32 = 99;

/// Number of reference ground tracks in one repeat cycle.
pub const MAX_TRACK: u32 = 1387;

/// Validate requested cycles and normalize them to 2-digit strings.
pub fn validate_cycles<S: AsRef<str>>(cycles: &[S]) -> Result<Vec<String>, ProtocolError> {
    cycles
        .iter()
        .map(|c| {
            let raw = c.as_ref();
            let value: u32 = raw.parse().map_err(|_| {
                ProtocolError::InvalidOrbitParameter(format!("cycle '{}' is not numeric", raw))
            })?;
            if value == 0 || value > MAX_CYCLE {
                return Err(ProtocolError::InvalidOrbitParameter(format!(
                    "cycle {} outside 1..={}",
                    value, MAX_CYCLE
                )));
            }
            Ok(format!("{:02}", value))
        })
        .collect()
}

/// Validate requested reference ground tracks and normalize them to 4-digit
/// strings.
pub fn validate_tracks<S: AsRef<str>>(tracks: &[S]) -> Result<Vec<String>, ProtocolError> {
    tracks
        .iter()
        .map(|t| {
            let raw = t.as_ref();
            let value: u32 = raw.parse().map_err(|_| {
                ProtocolError::InvalidOrbitParameter(format!("track '{}' is not numeric", raw))
            })?;
            if value == 0 || value > MAX_TRACK {
                return Err(ProtocolError::InvalidOrbitParameter(format!(
                    "track {} outside 1..={}",
                    value, MAX_TRACK
                )));
            }
            Ok(format!("{:04}", value))
        })
        .collect()
}

/// Build granule-name patterns for the given cycle/track filters.
///
/// Cycles and tracks are combined as a cross product; an empty filter on
/// either axis leaves that field wildcarded. The 14-character production
/// timestamp and the trailing version/revision fields are always wildcarded.
pub fn fmt_readable_granules(
    product: &str,
    cycles: &[String],
    tracks: &[String],
) -> Vec<String> {
    let mut patterns = Vec::new();

    match (cycles.is_empty(), tracks.is_empty()) {
        (false, false) => {
            for cycle in cycles {
                for track in tracks {
                    patterns.push(format!("{}_??????????????_{}{}??_*", product, track, cycle));
                }
            }
        }
        (false, true) => {
            for cycle in cycles {
                patterns.push(format!("{}_??????????????_????{}??_*", product, cycle));
            }
        }
        (true, false) => {
            for track in tracks {
                patterns.push(format!("{}_??????????????_{}????_*", product, track));
            }
        }
        (true, true) => {}
    }

    patterns
}
