//! Spatial extent validation and encoding.
//!
//! A [`SpatialExtent`] normalizes one of three user inputs (a 4-element
//! bounding box, a closed polygon vertex list, or a single-feature polygon
//! file) into a canonical `(extent_type, coordinates)` pair. Longitudes are
//! reported in the -180..180 convention; the `cross_dateline` flag only
//! shifts longitudes internally when constructing the geometry ring so that
//! antimeridian-crossing extents stay valid.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::errors::ProtocolError;
use crate::extent_file;

/// Which form of spatial extent is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtentType {
    BoundingBox,
    Polygon,
}

impl ExtentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtentType::BoundingBox => "bounding_box",
            ExtentType::Polygon => "polygon",
        }
    }
}

/// A validated spatial extent in the archive's coordinate conventions.
///
/// Immutable once constructed. Bounding boxes store
/// `[west, south, east, north]`; polygons store a flattened closed ring
/// `[lon1, lat1, ..., lonN, latN]` with the first and last vertex equal.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialExtent {
    extent_type: ExtentType,
    coordinates: Vec<f64>,
    source_file: Option<PathBuf>,
    cross_dateline: bool,
}

impl SpatialExtent {
    /// Build a bounding-box extent from `[west, south, east, north]`.
    ///
    /// With `cross_dateline` set, `west > east` is accepted and the box is
    /// interpreted as spanning the antimeridian.
    pub fn bounding_box(coords: &[f64], cross_dateline: bool) -> Result<Self, ProtocolError> {
        if coords.len() != 4 {
            return Err(ProtocolError::Validation(format!(
                "bounding box needs 4 coordinates, got {}",
                coords.len()
            )));
        }

        let (west, south, east, north) = (coords[0], coords[1], coords[2], coords[3]);
        check_lon(west)?;
        check_lon(east)?;
        check_lat(south)?;
        check_lat(north)?;

        if south >= north {
            return Err(ProtocolError::Validation(format!(
                "bounding box latitudes inverted: south {} >= north {}",
                south, north
            )));
        }
        if !cross_dateline && west >= east {
            return Err(ProtocolError::Validation(format!(
                "bounding box longitudes inverted: west {} >= east {}",
                west, east
            )));
        }

        Ok(Self {
            extent_type: ExtentType::BoundingBox,
            coordinates: vec![west, south, east, north],
            source_file: None,
            cross_dateline,
        })
    }

    /// Build a polygon extent from a flattened `[lon1, lat1, ...]` list.
    ///
    /// The ring must contain at least four vertices and be closed (first
    /// vertex equal to the last). Vertex order is preserved exactly as
    /// given: an antimeridian-crossing polygon whose vertices are listed in
    /// the wrong order is accepted here and may still describe an invalid
    /// geometry; `cross_dateline` does not reorder vertices.
    pub fn polygon(coords: &[f64], cross_dateline: bool) -> Result<Self, ProtocolError> {
        if coords.len() % 2 != 0 {
            return Err(ProtocolError::Validation(format!(
                "polygon coordinate list has odd length {}",
                coords.len()
            )));
        }

        let n_points = coords.len() / 2;
        if n_points < 4 {
            return Err(ProtocolError::Validation(format!(
                "polygon needs at least 4 vertices, got {}",
                n_points
            )));
        }
        if coords[0] != coords[coords.len() - 2] || coords[1] != coords[coords.len() - 1] {
            return Err(ProtocolError::Validation(
                "polygon ring is not closed: first and last vertex differ".to_string(),
            ));
        }

        for pair in coords.chunks_exact(2) {
            check_lon(pair[0])?;
            check_lat(pair[1])?;
        }

        Ok(Self {
            extent_type: ExtentType::Polygon,
            coordinates: coords.to_vec(),
            source_file: None,
            cross_dateline,
        })
    }

    /// Build a polygon extent from `(lon, lat)` vertex pairs.
    pub fn from_pairs(pairs: &[(f64, f64)], cross_dateline: bool) -> Result<Self, ProtocolError> {
        let mut flat = Vec::with_capacity(pairs.len() * 2);
        for (lon, lat) in pairs {
            flat.push(*lon);
            flat.push(*lat);
        }
        Self::polygon(&flat, cross_dateline)
    }

    /// Build a polygon extent from a geospatial vector file.
    ///
    /// Supported formats: GeoJSON (`.geojson`, `.json`) and KML (`.kml`).
    /// The file must contain exactly one polygon feature.
    pub fn from_file(path: impl AsRef<Path>, cross_dateline: bool) -> Result<Self, ProtocolError> {
        let path = path.as_ref();
        let ring = extent_file::read_polygon_file(path)?;

        let mut flat = Vec::with_capacity(ring.len() * 2);
        for (lon, lat) in &ring {
            flat.push(*lon);
            flat.push(*lat);
        }

        let mut extent = Self::polygon(&flat, cross_dateline)?;
        extent.source_file = Some(path.to_path_buf());
        Ok(extent)
    }

    pub fn extent_type(&self) -> ExtentType {
        self.extent_type
    }

    /// Canonical `(extent_type, coordinates)` view in the external
    /// -180..180 longitude convention.
    pub fn extent(&self) -> (&'static str, &[f64]) {
        (self.extent_type.as_str(), &self.coordinates)
    }

    pub fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }

    /// Path of the vector file this extent was loaded from, if any.
    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    pub fn cross_dateline(&self) -> bool {
        self.cross_dateline
    }

    /// Closed vertex ring for geometry construction and visualization.
    ///
    /// Bounding boxes are expanded counter-clockwise from the lower-left
    /// corner. When `cross_dateline` is set, negative longitudes are shifted
    /// into 0..360 so the ring is a valid geometry; the stored coordinate
    /// list is not affected.
    pub fn ring(&self) -> Vec<(f64, f64)> {
        let mut ring: Vec<(f64, f64)> = match self.extent_type {
            ExtentType::BoundingBox => {
                let (w, s, e, n) = (
                    self.coordinates[0],
                    self.coordinates[1],
                    self.coordinates[2],
                    self.coordinates[3],
                );
                vec![(w, s), (e, s), (e, n), (w, n), (w, s)]
            }
            ExtentType::Polygon => self
                .coordinates
                .chunks_exact(2)
                .map(|p| (p[0], p[1]))
                .collect(),
        };

        if self.cross_dateline {
            for point in &mut ring {
                if point.0 < 0.0 {
                    point.0 += 360.0;
                }
            }
        }

        ring
    }

    /// Key/value encoding for the discovery (search) endpoint.
    ///
    /// Bounding boxes use the `bounding_box` key, polygons the `polygon`
    /// key; both values are the comma-joined coordinate list.
    pub fn fmt_for_discovery(&self) -> (&'static str, String) {
        let value = join_coords(&self.coordinates);
        match self.extent_type {
            ExtentType::BoundingBox => ("bounding_box", value),
            ExtentType::Polygon => ("polygon", value),
        }
    }

    /// Key/value encoding for the subsetting endpoint.
    ///
    /// The subsetter takes a different serialization than discovery:
    /// bounding boxes use the `bbox` key with the comma-joined list, while
    /// polygons use the `Boundingshape` key carrying a GeoJSON polygon built
    /// from the (dateline-shifted) geometry ring.
    pub fn fmt_for_subsetting(&self) -> (&'static str, String) {
        match self.extent_type {
            ExtentType::BoundingBox => ("bbox", join_coords(&self.coordinates)),
            ExtentType::Polygon => {
                let ring: Vec<[f64; 2]> = self.ring().iter().map(|&(x, y)| [x, y]).collect();
                let shape = serde_json::json!({
                    "type": "Polygon",
                    "coordinates": [ring],
                });
                ("Boundingshape", shape.to_string())
            }
        }
    }
}

fn check_lon(lon: f64) -> Result<(), ProtocolError> {
    if !(-180.0..=180.0).contains(&lon) {
        return Err(ProtocolError::Validation(format!(
            "longitude {} outside -180..180",
            lon
        )));
    }
    Ok(())
}

fn check_lat(lat: f64) -> Result<(), ProtocolError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(ProtocolError::Validation(format!(
            "latitude {} outside -90..90",
            lat
        )));
    }
    Ok(())
}

fn join_coords(coords: &[f64]) -> String {
    coords
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_roundtrip() {
        let extent = SpatialExtent::bounding_box(&[-55.0, 68.0, -48.0, 71.0], false).unwrap();
        assert_eq!(
            extent.extent(),
            ("bounding_box", &[-55.0, 68.0, -48.0, 71.0][..])
        );
    }

    #[test]
    fn test_bbox_arity_and_ordering() {
        assert!(SpatialExtent::bounding_box(&[-55.0, 68.0, -48.0], false).is_err());
        // west >= east
        assert!(SpatialExtent::bounding_box(&[-48.0, 68.0, -55.0, 71.0], false).is_err());
        // south >= north
        assert!(SpatialExtent::bounding_box(&[-55.0, 71.0, -48.0, 68.0], false).is_err());
        // out of range
        assert!(SpatialExtent::bounding_box(&[-185.0, 68.0, -48.0, 71.0], false).is_err());
    }

    #[test]
    fn test_bbox_across_dateline() {
        // Rejected without the flag, accepted with it.
        assert!(SpatialExtent::bounding_box(&[170.0, 50.0, -170.0, 60.0], false).is_err());
        let extent = SpatialExtent::bounding_box(&[170.0, 50.0, -170.0, 60.0], true).unwrap();

        // Stored coordinates keep the -180..180 convention.
        assert_eq!(extent.coordinates(), &[170.0, 50.0, -170.0, 60.0]);

        // The geometry ring shifts into 0..360.
        let ring = extent.ring();
        assert_eq!(ring[1], (190.0, 50.0));
    }

    #[test]
    fn test_polygon_preserves_order() {
        let pairs = [
            (-55.0, 68.0),
            (-55.0, 71.0),
            (-48.0, 71.0),
            (-48.0, 68.0),
            (-55.0, 68.0),
        ];
        let extent = SpatialExtent::from_pairs(&pairs, false).unwrap();
        assert_eq!(
            extent.extent(),
            (
                "polygon",
                &[-55.0, 68.0, -55.0, 71.0, -48.0, 71.0, -48.0, 68.0, -55.0, 68.0][..]
            )
        );
    }

    #[test]
    fn test_polygon_must_be_closed() {
        let open = [-55.0, 68.0, -55.0, 71.0, -48.0, 71.0, -48.0, 68.0];
        assert!(SpatialExtent::polygon(&open, false).is_err());
    }

    #[test]
    fn test_polygon_minimum_vertices() {
        let closed_triangle = [-55.0, 68.0, -55.0, 71.0, -55.0, 68.0];
        assert!(SpatialExtent::polygon(&closed_triangle, false).is_err());
    }

    #[test]
    fn test_misordered_dateline_polygon_is_accepted() {
        // Vertices listed in an order that produces a degenerate shape when
        // crossing the antimeridian. The flag shifts longitudes but does not
        // reorder input, so this stays accepted as-is.
        let pairs = [
            (170.0, 50.0),
            (-170.0, 60.0),
            (170.0, 60.0),
            (-170.0, 50.0),
            (170.0, 50.0),
        ];
        assert!(SpatialExtent::from_pairs(&pairs, true).is_ok());
    }

    #[test]
    fn test_discovery_vs_subsetting_encoding() {
        let bbox = SpatialExtent::bounding_box(&[-55.0, 68.0, -48.0, 71.0], false).unwrap();
        assert_eq!(
            bbox.fmt_for_discovery(),
            ("bounding_box", "-55,68,-48,71".to_string())
        );
        assert_eq!(bbox.fmt_for_subsetting(), ("bbox", "-55,68,-48,71".to_string()));

        let poly = SpatialExtent::polygon(
            &[-55.0, 68.0, -55.0, 71.0, -48.0, 71.0, -55.0, 68.0],
            false,
        )
        .unwrap();
        let (key, value) = poly.fmt_for_subsetting();
        assert_eq!(key, "Boundingshape");
        assert!(value.contains("\"type\":\"Polygon\""));
        assert_eq!(poly.fmt_for_discovery().0, "polygon");
    }
}
