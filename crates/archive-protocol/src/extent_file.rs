//! Polygon extent file readers.
//!
//! The archive accepts an area of interest loaded from a geospatial vector
//! file, restricted to a fixed allow-list of formats and to files containing
//! exactly one polygon feature. GeoJSON files are deserialized with serde;
//! KML files are walked with a streaming XML reader.

use std::fs;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::Deserialize;

use crate::errors::ProtocolError;

/// File extensions accepted as extent files.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["geojson", "json", "kml"];

/// Read the exterior ring of the single polygon feature in `path`.
///
/// Fails when the extension is outside [`SUPPORTED_EXTENSIONS`] or the file
/// holds zero or more than one polygon.
pub fn read_polygon_file(path: &Path) -> Result<Vec<(f64, f64)>, ProtocolError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| ProtocolError::UnsupportedExtentFile(path.display().to_string()))?;

    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ProtocolError::UnsupportedExtentFile(format!(
            "{} (supported: {})",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }

    let content = fs::read_to_string(path).map_err(|e| {
        ProtocolError::Validation(format!("cannot read extent file {}: {}", path.display(), e))
    })?;

    match ext.as_str() {
        "kml" => ring_from_kml(&content, path),
        _ => ring_from_geojson(&content, path),
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJsonDocument {
    FeatureCollection { features: Vec<Feature> },
    Feature { geometry: Geometry },
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    #[serde(other)]
    Other,
}

fn ring_from_geojson(content: &str, path: &Path) -> Result<Vec<(f64, f64)>, ProtocolError> {
    let doc: GeoJsonDocument = serde_json::from_str(content).map_err(|e| {
        ProtocolError::Validation(format!("invalid GeoJSON in {}: {}", path.display(), e))
    })?;

    let coordinates = match doc {
        GeoJsonDocument::Polygon { coordinates } => coordinates,
        GeoJsonDocument::Feature { geometry } => polygon_coords(geometry, path)?,
        GeoJsonDocument::FeatureCollection { mut features } => {
            if features.len() != 1 {
                return Err(ProtocolError::BadExtentFeatureCount(format!(
                    "{} has {} features",
                    path.display(),
                    features.len()
                )));
            }
            polygon_coords(features.remove(0).geometry, path)?
        }
    };

    let exterior = coordinates.first().ok_or_else(|| {
        ProtocolError::Validation(format!("empty polygon in {}", path.display()))
    })?;

    exterior
        .iter()
        .map(|position| {
            if position.len() < 2 {
                Err(ProtocolError::Validation(format!(
                    "short coordinate tuple in {}",
                    path.display()
                )))
            } else {
                Ok((position[0], position[1]))
            }
        })
        .collect()
}

fn polygon_coords(geometry: Geometry, path: &Path) -> Result<Vec<Vec<Vec<f64>>>, ProtocolError> {
    match geometry {
        Geometry::Polygon { coordinates } => Ok(coordinates),
        Geometry::Other => Err(ProtocolError::BadExtentFeatureCount(format!(
            "{} feature is not a polygon",
            path.display()
        ))),
    }
}

/// Extract the outer ring of the single `<Polygon>` in a KML document.
fn ring_from_kml(content: &str, path: &Path) -> Result<Vec<(f64, f64)>, ProtocolError> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut polygon_count = 0usize;
    let mut in_outer = false;
    let mut in_coordinates = false;
    let mut coordinate_text: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"Polygon" => polygon_count += 1,
                b"outerBoundaryIs" => in_outer = true,
                b"coordinates" if in_outer => in_coordinates = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"outerBoundaryIs" => in_outer = false,
                b"coordinates" => in_coordinates = false,
                _ => {}
            },
            Ok(Event::Text(t)) if in_coordinates && coordinate_text.is_none() => {
                let text = t.unescape().map_err(|e| {
                    ProtocolError::Validation(format!(
                        "invalid KML text in {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                coordinate_text = Some(text.into_owned());
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ProtocolError::Validation(format!(
                    "invalid KML in {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }

    if polygon_count != 1 {
        return Err(ProtocolError::BadExtentFeatureCount(format!(
            "{} has {} polygons",
            path.display(),
            polygon_count
        )));
    }

    let text = coordinate_text.ok_or_else(|| {
        ProtocolError::Validation(format!("no outer ring coordinates in {}", path.display()))
    })?;

    // KML coordinate tuples are "lon,lat[,alt]" separated by whitespace.
    text.split_whitespace()
        .map(|tuple| {
            let mut parts = tuple.split(',');
            let lon = parts
                .next()
                .and_then(|p| p.parse::<f64>().ok())
                .ok_or_else(|| {
                    ProtocolError::Validation(format!("bad KML coordinate '{}'", tuple))
                })?;
            let lat = parts
                .next()
                .and_then(|p| p.parse::<f64>().ok())
                .ok_or_else(|| {
                    ProtocolError::Validation(format!("bad KML coordinate '{}'", tuple))
                })?;
            Ok((lon, lat))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    const SIMPLE_GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[-55.0, 68.0], [-55.0, 71.0], [-48.0, 71.0], [-55.0, 68.0]]]
            }
        }]
    }"#;

    #[test]
    fn test_geojson_single_feature() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "aoi.geojson", SIMPLE_GEOJSON);

        let ring = read_polygon_file(&path).unwrap();
        assert_eq!(ring.len(), 4);
        assert_eq!(ring[0], (-55.0, 68.0));
        assert_eq!(ring[2], (-48.0, 71.0));
    }

    #[test]
    fn test_geojson_two_features_rejected() {
        let two = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Polygon", "coordinates": [[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,0.0]]]}},
                {"type": "Feature", "geometry": {"type": "Polygon", "coordinates": [[[0.0,0.0],[2.0,0.0],[2.0,2.0],[0.0,0.0]]]}}
            ]
        }"#;
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "two.geojson", two);

        assert!(matches!(
            read_polygon_file(&path),
            Err(ProtocolError::BadExtentFeatureCount(_))
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "aoi.shp", "not a shapefile");

        assert!(matches!(
            read_polygon_file(&path),
            Err(ProtocolError::UnsupportedExtentFile(_))
        ));
    }

    #[test]
    fn test_kml_outer_ring() {
        let kml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <kml xmlns="http://www.opengis.net/kml/2.2">
          <Placemark>
            <Polygon>
              <outerBoundaryIs>
                <LinearRing>
                  <coordinates>
                    -55.0,68.0,0 -55.0,71.0,0 -48.0,71.0,0 -55.0,68.0,0
                  </coordinates>
                </LinearRing>
              </outerBoundaryIs>
            </Polygon>
          </Placemark>
        </kml>"#;
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "aoi.kml", kml);

        let ring = read_polygon_file(&path).unwrap();
        assert_eq!(ring.len(), 4);
        assert_eq!(ring[1], (-55.0, 71.0));
    }

    #[test]
    fn test_kml_two_polygons_rejected() {
        let kml = r#"<kml><Placemark><Polygon><outerBoundaryIs><LinearRing>
            <coordinates>0,0 1,0 1,1 0,0</coordinates>
            </LinearRing></outerBoundaryIs></Polygon>
            <Polygon><outerBoundaryIs><LinearRing>
            <coordinates>0,0 2,0 2,2 0,0</coordinates>
            </LinearRing></outerBoundaryIs></Polygon></Placemark></kml>"#;
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "two.kml", kml);

        assert!(matches!(
            read_polygon_file(&path),
            Err(ProtocolError::BadExtentFeatureCount(_))
        ));
    }
}
