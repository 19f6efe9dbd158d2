//! Customization-options (capabilities) document parsing.
//!
//! The ordering service publishes a per-product XML capabilities document
//! describing what its subsetter can do: subset-agent limits, output file
//! formats, reprojection options, and the full list of subsettable variable
//! paths. The document is walked with a streaming XML reader; only the
//! element kinds below are interpreted.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::errors::ClientError;

/// Parsed customization options for one product version.
#[derive(Debug, Clone, Default)]
pub struct CustomOptions {
    /// Subset-agent attribute maps (request limits, supported subset kinds).
    pub agents: Vec<BTreeMap<String, String>>,
    /// Output file formats the subsetter can produce.
    pub formats: Vec<String>,
    /// Reprojection targets.
    pub reprojections: Vec<String>,
    /// Formats that cannot be combined with reprojection.
    pub no_reprojection_formats: Vec<String>,
    /// Formats that support reprojection.
    pub reprojection_formats: Vec<String>,
    /// Subsettable variable paths, slash-delimited.
    pub variables: Vec<String>,
}

/// Parse a capabilities XML document.
pub fn parse_capabilities(xml: &str) -> Result<CustomOptions, ClientError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut options = CustomOptions::default();
    let mut exclude_formats: Vec<String> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ClientError::Capabilities(format!("invalid capabilities XML: {}", e)))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"SubsetAgent" => options.agents.push(attributes_map(e)?),
                b"Format" => {
                    if let Some(value) = attribute(e, b"value")? {
                        if !value.is_empty() {
                            options.formats.push(value);
                        }
                    }
                }
                b"Projection" => {
                    if let Some(value) = attribute(e, b"value")? {
                        if value != "NO_CHANGE" {
                            options.reprojections.push(value);
                        }
                    }
                    if let Some(excluded) = attribute(e, b"excludeFormat")? {
                        exclude_formats
                            .extend(excluded.split(',').map(|f| f.trim().to_string()));
                    }
                }
                b"SubsetVariable" => {
                    if let Some(value) = attribute(e, b"value")? {
                        options.variables.push(normalize_variable_path(&value));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    exclude_formats.sort();
    exclude_formats.dedup();
    options.no_reprojection_formats = exclude_formats;
    options.reprojection_formats = options
        .formats
        .iter()
        .filter(|f| !options.no_reprojection_formats.contains(f))
        .cloned()
        .collect();

    Ok(options)
}

/// Variable paths arrive colon-delimited; normalize to slash-delimited with
/// no leading separator.
fn normalize_variable_path(raw: &str) -> String {
    raw.trim_start_matches('/')
        .replace(':', "/")
        .trim_start_matches('/')
        .to_string()
}

fn attributes_map(element: &BytesStart<'_>) -> Result<BTreeMap<String, String>, ClientError> {
    let mut map = BTreeMap::new();
    for attr in element.attributes() {
        let attr =
            attr.map_err(|e| ClientError::Capabilities(format!("bad XML attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ClientError::Capabilities(format!("bad XML attribute value: {}", e)))?
            .into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, ClientError> {
    for attr in element.attributes() {
        let attr =
            attr.map_err(|e| ClientError::Capabilities(format!("bad XML attribute: {}", e)))?;
        if attr.key.local_name().as_ref() == name {
            let value = attr
                .unescape_value()
                .map_err(|e| ClientError::Capabilities(format!("bad XML attribute value: {}", e)))?
                .into_owned();
            return Ok(Some(value));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPABILITIES: &str = r#"<?xml version="1.0"?>
    <Capabilities>
      <SubsetAgent id="ALTIMETRY" maxGransAsyncRequest="2000" spatialSubsetting="true" temporalSubsetting="true"/>
      <Format value=""/>
      <Format value="TABULAR_ASCII"/>
      <Format value="NetCDF4-CF"/>
      <Format value="Shapefile"/>
      <Projection value="NO_CHANGE"/>
      <Projection value="POLAR_STEREOGRAPHIC" excludeFormat="TABULAR_ASCII,Shapefile"/>
      <SubsetVariables>
        <SubsetVariable value="/gt1l:land_ice_segments:h_li"/>
        <SubsetVariable value="gt1r:land_ice_segments:h_li"/>
        <SubsetVariable value="/ancillary_data:atlas_sdp_gps_epoch"/>
      </SubsetVariables>
    </Capabilities>"#;

    #[test]
    fn test_parse_capabilities() {
        let options = parse_capabilities(CAPABILITIES).unwrap();

        assert_eq!(options.agents.len(), 1);
        assert_eq!(
            options.agents[0].get("maxGransAsyncRequest"),
            Some(&"2000".to_string())
        );

        // Empty format value filtered out.
        assert_eq!(
            options.formats,
            vec!["TABULAR_ASCII", "NetCDF4-CF", "Shapefile"]
        );

        // NO_CHANGE filtered out of reprojection targets.
        assert_eq!(options.reprojections, vec!["POLAR_STEREOGRAPHIC"]);
        assert_eq!(
            options.no_reprojection_formats,
            vec!["Shapefile", "TABULAR_ASCII"]
        );
        assert_eq!(options.reprojection_formats, vec!["NetCDF4-CF"]);
    }

    #[test]
    fn test_variable_path_normalization() {
        let options = parse_capabilities(CAPABILITIES).unwrap();
        assert_eq!(
            options.variables,
            vec![
                "gt1l/land_ice_segments/h_li",
                "gt1r/land_ice_segments/h_li",
                "ancillary_data/atlas_sdp_gps_epoch",
            ]
        );
    }

    #[test]
    fn test_malformed_document() {
        assert!(parse_capabilities("<Capabilities><Format").is_err());
    }
}
