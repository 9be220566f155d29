//! Administrative boundary loading.
//!
//! Reads a `GeoJSON` `FeatureCollection` of district (or finer) polygons in
//! the projected CRS and turns each usable feature into a [`Region`] keyed
//! by its canonical AGS. Boundary files name the identifier property
//! differently depending on where they came from, so the field is either
//! configured or picked from [`ID_FIELD_CANDIDATES`].

use std::collections::BTreeSet;
use std::path::Path;

use commute_air_geography_models::ags::AgsNormalizer;
use geo::MultiPolygon;
use geojson::GeoJson;
use serde::{Deserialize, Serialize};

use crate::parsing::property_to_string;
use crate::{GeoError, Region};

const INPUT: &str = "boundaries";

/// Identifier properties tried in order when none is configured.
pub const ID_FIELD_CANDIDATES: &[&str] = &["AGS5", "ags", "rs", "AGS", "KREISE", "KREIS", "RS"];

/// Property describing the administrative level of a feature.
pub const DEFAULT_LEVEL_FIELD: &str = "art";

/// Level values that denote a district (Kreis) rather than a municipality.
pub const KREIS_LEVEL_VALUES: &[&str] = &[
    "Kreis / kreisfreie Stadt",
    "Kreis",
    "Landkreis",
    "Kreisfreie Stadt",
    "Stadtkreis",
];

/// Options for reading boundary features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryOptions {
    /// Identifier property; detected from [`ID_FIELD_CANDIDATES`] if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,
    /// Property holding the administrative level.
    pub level_field: String,
    /// Level values kept when the level property is present.
    pub level_values: Vec<String>,
    /// Keep only regions whose canonical code starts with this prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl Default for BoundaryOptions {
    fn default() -> Self {
        Self {
            id_field: None,
            level_field: DEFAULT_LEVEL_FIELD.to_string(),
            level_values: KREIS_LEVEL_VALUES.iter().map(ToString::to_string).collect(),
            prefix: Some("09".to_string()),
        }
    }
}

/// Regions read from a boundary file plus what was dropped on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryLoad {
    /// Regions with unique canonical identifiers, in file order.
    pub regions: Vec<Region>,
    /// The identifier property that was used.
    pub id_field: String,
    /// Features whose identifier could not be normalized.
    pub rejected_ids: usize,
    /// Features dropped because an earlier one had the same canonical code.
    pub duplicates: usize,
    /// Features without a polygon geometry.
    pub invalid_geometries: usize,
    /// Features outside the configured prefix.
    pub outside_prefix: usize,
    /// Features dropped by the level filter.
    pub level_filtered: usize,
}

/// Loads regions from a `GeoJSON` file.
///
/// # Errors
///
/// * [`GeoError::Io`] if the file cannot be read
/// * see [`parse_regions`]
pub fn load_regions(
    path: &Path,
    options: &BoundaryOptions,
    normalizer: &AgsNormalizer,
) -> Result<BoundaryLoad, GeoError> {
    let contents = std::fs::read_to_string(path)?;
    let load = parse_regions(&contents, options, normalizer)?;
    log::info!(
        "Loaded {} regions from {} (identifier field '{}')",
        load.regions.len(),
        path.display(),
        load.id_field
    );
    Ok(load)
}

/// Parses regions from `GeoJSON` text.
///
/// # Errors
///
/// * [`GeoError::GeoJson`] if the text is not valid `GeoJSON`
/// * [`GeoError::Conversion`] if it is not a `FeatureCollection`
/// * [`GeoError::EmptyInput`] if it has no features
/// * [`GeoError::AmbiguousSchema`] if no identifier property can be found
#[allow(clippy::too_many_lines)]
pub fn parse_regions(
    geojson_str: &str,
    options: &BoundaryOptions,
    normalizer: &AgsNormalizer,
) -> Result<BoundaryLoad, GeoError> {
    let GeoJson::FeatureCollection(collection) = geojson_str.parse::<GeoJson>()? else {
        return Err(GeoError::Conversion {
            message: "boundary file is not a GeoJSON FeatureCollection".to_string(),
        });
    };

    if collection.features.is_empty() {
        return Err(GeoError::EmptyInput {
            input: INPUT.to_string(),
        });
    }

    let available: BTreeSet<&str> = collection
        .features
        .iter()
        .filter_map(|f| f.properties.as_ref())
        .flat_map(|props| props.keys().map(String::as_str))
        .collect();

    let id_field = resolve_id_field(options, &available)?;

    let level_active = available.contains(options.level_field.as_str())
        && collection.features.iter().any(|f| {
            f.properties
                .as_ref()
                .and_then(|p| p.get(&options.level_field))
                .and_then(serde_json::Value::as_str)
                .is_some_and(|level| options.level_values.iter().any(|v| v == level))
        });
    if level_active {
        log::info!(
            "Filtering boundaries to district-level units via '{}'",
            options.level_field
        );
    } else {
        log::debug!("No district-level marker found; collapsing finer units per canonical code");
    }

    let mut load = BoundaryLoad {
        regions: Vec::new(),
        id_field: id_field.clone(),
        rejected_ids: 0,
        duplicates: 0,
        invalid_geometries: 0,
        outside_prefix: 0,
        level_filtered: 0,
    };
    let mut seen = BTreeSet::new();

    for feature in collection.features {
        let properties = feature.properties.unwrap_or_default();

        if level_active {
            let level = properties
                .get(&options.level_field)
                .and_then(serde_json::Value::as_str);
            if !level.is_some_and(|level| options.level_values.iter().any(|v| v == level)) {
                load.level_filtered += 1;
                continue;
            }
        }

        let raw_id = properties.get(&id_field).and_then(property_to_string);
        let ags = match raw_id.as_deref().map(|raw| normalizer.normalize(raw)) {
            Some(Ok(ags)) => ags,
            Some(Err(e)) => {
                log::debug!("Skipping boundary feature: {e}");
                load.rejected_ids += 1;
                continue;
            }
            None => {
                log::debug!("Skipping boundary feature without '{id_field}'");
                load.rejected_ids += 1;
                continue;
            }
        };

        if options
            .prefix
            .as_ref()
            .is_some_and(|prefix| !ags.starts_with(prefix.as_str()))
        {
            load.outside_prefix += 1;
            continue;
        }

        let Some(geometry) = feature.geometry.and_then(to_multipolygon) else {
            log::warn!("Boundary {ags} has no polygon geometry");
            load.invalid_geometries += 1;
            continue;
        };

        if !seen.insert(ags.clone()) {
            load.duplicates += 1;
            continue;
        }

        load.regions.push(Region::new(ags, geometry, properties));
    }

    if load.duplicates > 0 {
        log::info!(
            "Collapsed {} boundary features sharing a canonical code",
            load.duplicates
        );
    }
    if load.rejected_ids > 0 {
        log::warn!(
            "{} boundary features had unusable identifiers",
            load.rejected_ids
        );
    }

    Ok(load)
}

fn resolve_id_field(
    options: &BoundaryOptions,
    available: &BTreeSet<&str>,
) -> Result<String, GeoError> {
    let found = options.id_field.as_ref().map_or_else(
        || {
            ID_FIELD_CANDIDATES
                .iter()
                .find(|c| available.contains(*c))
                .map(ToString::to_string)
        },
        |field| available.contains(field.as_str()).then(|| field.clone()),
    );

    found.ok_or_else(|| GeoError::AmbiguousSchema {
        input: INPUT.to_string(),
        available: available.iter().map(ToString::to_string).collect(),
    })
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) if !mp.0.is_empty() => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(props: &serde_json::Value, x0: f64) -> serde_json::Value {
        serde_json::json!({
            "type": "Feature",
            "properties": props,
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[x0, 0.0], [x0 + 10.0, 0.0], [x0 + 10.0, 10.0], [x0, 10.0], [x0, 0.0]]]
            }
        })
    }

    fn collection(features: Vec<serde_json::Value>) -> String {
        serde_json::json!({ "type": "FeatureCollection", "features": features }).to_string()
    }

    fn parse(text: &str) -> Result<BoundaryLoad, GeoError> {
        parse_regions(text, &BoundaryOptions::default(), &AgsNormalizer::default())
    }

    #[test]
    fn reads_regions_with_detected_id_field() {
        let text = collection(vec![
            feature(&serde_json::json!({ "ags": "09161000", "name": "Ingolstadt" }), 0.0),
            feature(&serde_json::json!({ "ags": "09362000", "name": "Regensburg" }), 10.0),
        ]);

        let load = parse(&text).unwrap();

        assert_eq!(load.id_field, "ags");
        let codes: Vec<&str> = load.regions.iter().map(Region::ags).collect();
        assert_eq!(codes, vec!["09161", "09362"]);
        assert_eq!(
            load.regions[0].attributes.get("name"),
            Some(&serde_json::json!("Ingolstadt"))
        );
    }

    #[test]
    fn prefers_earlier_candidates() {
        let text = collection(vec![feature(
            &serde_json::json!({ "RS": "091610000000", "AGS5": "09162" }),
            0.0,
        )]);
        let load = parse(&text).unwrap();
        assert_eq!(load.id_field, "AGS5");
        assert_eq!(load.regions[0].ags(), "09162");
    }

    #[test]
    fn numeric_identifiers_are_normalized() {
        let text = collection(vec![feature(
            &serde_json::json!({ "AGS": 9_161_000.0 }),
            0.0,
        )]);
        let load = parse(&text).unwrap();
        assert_eq!(load.regions[0].ags(), "09161");
    }

    #[test]
    fn unknown_schema_reports_available_columns() {
        let text = collection(vec![feature(
            &serde_json::json!({ "gen": "Ingolstadt", "bez": "Stadt" }),
            0.0,
        )]);

        let Err(GeoError::AmbiguousSchema { available, .. }) = parse(&text) else {
            panic!("expected ambiguous schema");
        };
        assert_eq!(available, vec!["bez".to_string(), "gen".to_string()]);
    }

    #[test]
    fn configured_id_field_must_exist() {
        let text = collection(vec![feature(&serde_json::json!({ "ags": "09161" }), 0.0)]);
        let options = BoundaryOptions {
            id_field: Some("schluessel".to_string()),
            ..BoundaryOptions::default()
        };
        let result = parse_regions(&text, &options, &AgsNormalizer::default());
        assert!(matches!(result, Err(GeoError::AmbiguousSchema { .. })));
    }

    #[test]
    fn filters_to_district_level_when_marked() {
        let text = collection(vec![
            feature(&serde_json::json!({ "ags": "09161000", "art": "Kreisfreie Stadt" }), 0.0),
            feature(&serde_json::json!({ "ags": "09161000", "art": "Gemeinde" }), 10.0),
            feature(&serde_json::json!({ "ags": "09186113", "art": "Gemeinde" }), 20.0),
            feature(&serde_json::json!({ "ags": "09186000", "art": "Landkreis" }), 30.0),
        ]);

        let load = parse(&text).unwrap();

        let codes: Vec<&str> = load.regions.iter().map(Region::ags).collect();
        assert_eq!(codes, vec!["09161", "09186"]);
        assert_eq!(load.level_filtered, 2);
        assert_eq!(load.duplicates, 0);
    }

    #[test]
    fn collapses_municipalities_keep_first() {
        let text = collection(vec![
            feature(&serde_json::json!({ "ags": "09186113", "art": "Gemeinde" }), 0.0),
            feature(&serde_json::json!({ "ags": "09186122", "art": "Gemeinde" }), 10.0),
            feature(&serde_json::json!({ "ags": "09187118", "art": "Gemeinde" }), 20.0),
        ]);

        let load = parse(&text).unwrap();

        assert_eq!(load.regions.len(), 2);
        assert_eq!(load.duplicates, 1);
        assert_eq!(
            load.regions[0].attributes.get("ags"),
            Some(&serde_json::json!("09186113"))
        );
    }

    #[test]
    fn drops_regions_outside_prefix_and_bad_ids() {
        let text = collection(vec![
            feature(&serde_json::json!({ "ags": "08111000" }), 0.0),
            feature(&serde_json::json!({ "ags": "n/a" }), 10.0),
            feature(&serde_json::json!({ "ags": null }), 20.0),
            feature(&serde_json::json!({ "ags": "09161000" }), 30.0),
        ]);

        let load = parse(&text).unwrap();

        assert_eq!(load.regions.len(), 1);
        assert_eq!(load.outside_prefix, 1);
        assert_eq!(load.rejected_ids, 2);
    }

    #[test]
    fn skips_non_polygon_geometry() {
        let text = collection(vec![serde_json::json!({
            "type": "Feature",
            "properties": { "ags": "09161" },
            "geometry": { "type": "Point", "coordinates": [1.0, 2.0] }
        })]);
        let load = parse(&text).unwrap();
        assert!(load.regions.is_empty());
        assert_eq!(load.invalid_geometries, 1);
    }

    #[test]
    fn rejects_non_collections_and_empty_input() {
        let geometry = r#"{"type":"Point","coordinates":[1.0,2.0]}"#;
        assert!(matches!(parse(geometry), Err(GeoError::Conversion { .. })));
        assert!(matches!(
            parse(&collection(vec![])),
            Err(GeoError::EmptyInput { .. })
        ));
    }
}
