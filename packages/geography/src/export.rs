//! `GeoJSON` export of classified regions.

use std::path::Path;

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};

use crate::{GeoError, IndicatorValue, Region};

/// Property holding the canonical code. None of the boundary identifier
/// candidates use this name, so source attributes are never overwritten.
pub const CANONICAL_ID_PROPERTY: &str = "ags_canonical";

/// Layer-level metadata written alongside the features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerInfo<'a> {
    /// Layer name, stored as the collection's `name` member.
    pub name: &'a str,
    /// EPSG code of the projected CRS the geometries are in.
    pub epsg: u32,
    /// Label of the air pollutant (e.g. `NO2`).
    pub pollutant: &'a str,
}

/// Builds a feature collection with one feature per region.
#[must_use]
pub fn to_feature_collection(regions: &[&Region], layer: &LayerInfo<'_>) -> FeatureCollection {
    let features = regions
        .iter()
        .map(|region| to_feature(region, layer.pollutant))
        .collect();

    let mut members = JsonObject::new();
    members.insert("name".to_string(), JsonValue::from(layer.name));
    members.insert(
        "crs".to_string(),
        serde_json::json!({
            "type": "name",
            "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", layer.epsg) }
        }),
    );

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(members),
    }
}

fn to_feature(region: &Region, pollutant: &str) -> Feature {
    let mut properties = region.attributes.clone();
    properties.insert(
        CANONICAL_ID_PROPERTY.to_string(),
        JsonValue::from(region.ags()),
    );
    insert_indicator(&mut properties, "commute", region.commute);
    insert_indicator(&mut properties, "air", region.air);
    properties.insert("pollutant".to_string(), JsonValue::from(pollutant));
    properties.insert(
        "commute_bin".to_string(),
        region
            .commute_bin
            .map_or(JsonValue::Null, |b| JsonValue::from(b.value())),
    );
    properties.insert(
        "air_bin".to_string(),
        region
            .air_bin
            .map_or(JsonValue::Null, |b| JsonValue::from(b.value())),
    );
    properties.insert(
        "group".to_string(),
        region
            .category
            .map_or(JsonValue::Null, |c| JsonValue::from(c.key())),
    );

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::from(&region.geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn insert_indicator(properties: &mut JsonObject, field: &str, indicator: Option<IndicatorValue>) {
    let (value, provenance) = indicator.map_or((JsonValue::Null, JsonValue::Null), |v| {
        (
            JsonValue::from(v.value),
            JsonValue::from(v.provenance.as_ref()),
        )
    });
    properties.insert(format!("{field}_value"), value);
    properties.insert(format!("{field}_provenance"), provenance);
}

/// Writes regions to a `GeoJSON` file, creating parent directories.
/// An empty region list still produces a valid, empty collection.
///
/// # Errors
///
/// * [`GeoError::Io`] if the file or its directory cannot be written
/// * [`GeoError::Json`] if serialization fails
pub fn write_layer(path: &Path, regions: &[&Region], layer: &LayerInfo<'_>) -> Result<(), GeoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let collection = to_feature_collection(regions, layer);
    std::fs::write(path, serde_json::to_string(&collection)?)?;

    if regions.is_empty() {
        log::warn!("Layer '{}' is empty; wrote {}", layer.name, path.display());
    } else {
        log::info!(
            "Wrote {} regions to {}",
            regions.len(),
            path.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use commute_air_geography_models::{JointCategory, Tertile};
    use geo::{Coord, MultiPolygon, Rect};
    use geojson::GeoJson;

    use super::*;

    const LAYER: LayerInfo<'static> = LayerInfo {
        name: "bayern",
        epsg: 25_832,
        pollutant: "NO2",
    };

    fn region(ags: &str) -> Region {
        let geometry = MultiPolygon(vec![
            Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 10.0, y: 10.0 }).to_polygon(),
        ]);
        let mut attributes = JsonObject::new();
        attributes.insert("gen".to_string(), JsonValue::from("Ingolstadt"));
        Region::new(ags, geometry, attributes)
    }

    #[test]
    fn writes_indicator_properties() {
        let mut classified = region("09161");
        classified.commute = Some(IndicatorValue::measured(12.5));
        classified.air = Some(IndicatorValue::interpolated(30.0));
        classified.commute_bin = Some(Tertile::High);
        classified.air_bin = Some(Tertile::Low);
        classified.category = Some(JointCategory {
            commute: Tertile::High,
            air: Tertile::Low,
        });
        let bare = region("09162");

        let collection = to_feature_collection(&[&classified, &bare], &LAYER);

        assert_eq!(collection.features.len(), 2);
        let props = collection.features[0].properties.as_ref().unwrap();
        assert_eq!(props["gen"], "Ingolstadt");
        assert_eq!(props[CANONICAL_ID_PROPERTY], "09161");
        assert_eq!(props["commute_value"], 12.5);
        assert_eq!(props["commute_provenance"], "measured");
        assert_eq!(props["air_provenance"], "interpolated");
        assert_eq!(props["commute_bin"], 3);
        assert_eq!(props["air_bin"], 1);
        assert_eq!(props["group"], "3-1");
        assert_eq!(props["pollutant"], "NO2");

        let props = collection.features[1].properties.as_ref().unwrap();
        assert_eq!(props["air_value"], JsonValue::Null);
        assert_eq!(props["group"], JsonValue::Null);
    }

    #[test]
    fn source_identifier_survives_export() {
        let mut alkis = region("09161");
        alkis
            .attributes
            .insert("ags".to_string(), JsonValue::from("09161000"));

        let collection = to_feature_collection(&[&alkis], &LAYER);

        let props = collection.features[0].properties.as_ref().unwrap();
        assert_eq!(props["ags"], "09161000");
        assert_eq!(props[CANONICAL_ID_PROPERTY], "09161");
    }

    #[test]
    fn collection_names_projected_crs() {
        let collection = to_feature_collection(&[], &LAYER);
        let members = collection.foreign_members.as_ref().unwrap();
        assert_eq!(members["name"], "bayern");
        assert_eq!(
            members["crs"]["properties"]["name"],
            "urn:ogc:def:crs:EPSG::25832"
        );
    }

    #[test]
    fn written_file_parses_back() {
        let dir = std::env::temp_dir().join(format!("commute_air_export_{}", std::process::id()));
        let path = dir.join("nested").join("bayern_bivariate.geojson");

        write_layer(&path, &[&region("09161")], &LAYER).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let GeoJson::FeatureCollection(collection) = text.parse::<GeoJson>().unwrap() else {
            panic!("expected feature collection");
        };
        assert_eq!(collection.features.len(), 1);

        write_layer(&path, &[], &LAYER).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let GeoJson::FeatureCollection(collection) = text.parse::<GeoJson>().unwrap() else {
            panic!("expected feature collection");
        };
        assert!(collection.features.is_empty());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
