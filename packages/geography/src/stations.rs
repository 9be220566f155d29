//! Air-quality station loading.
//!
//! Reads station coordinates and annual mean concentrations from CSV and
//! projects them into the metric CRS of the boundaries. Station exports
//! differ in how they name their columns (`longitude`, `station longitude`,
//! `lon`, ...), so unless configured the columns are detected by name.

use std::io::Read;
use std::path::Path;

use commute_air_spatial::ObservationPoint;
use commute_air_spatial::projection::Utm;
use serde::{Deserialize, Serialize};

use crate::GeoError;
use crate::parsing::{clean_cell, find_column, parse_decimal};

const INPUT: &str = "air stations";

const LON_NAMES: &[&str] = &["longitude", "lon", "lng"];
const LAT_NAMES: &[&str] = &["latitude", "lat"];
const VALUE_NAMES: &[&str] = &["value", "mean", "concentration"];
const NETWORK_NAMES: &[&str] = &["network code", "network_code"];

/// Options for reading station measurements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationOptions {
    /// Field delimiter.
    pub delimiter: char,
    /// Longitude column; detected if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon_column: Option<String>,
    /// Latitude column; detected if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat_column: Option<String>,
    /// Concentration column; detected if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_column: Option<String>,
    /// Monitoring network column; detected if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_column: Option<String>,
    /// Keep only stations of this network (e.g. `BY`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

impl Default for StationOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            lon_column: None,
            lat_column: None,
            value_column: None,
            network_column: None,
            network: None,
        }
    }
}

/// Observations read from a station file.
#[derive(Debug, Clone, PartialEq)]
pub struct StationLoad {
    /// Projected observations, including those without a value.
    pub observations: Vec<ObservationPoint>,
    /// Rows dropped for missing or unprojectable coordinates.
    pub invalid_coordinates: usize,
    /// Rows dropped by the network filter.
    pub filtered_network: usize,
    /// Kept rows whose value is empty or unparseable.
    pub null_values: usize,
}

/// Loads station observations from a CSV file.
///
/// # Errors
///
/// * [`GeoError::Io`] if the file cannot be opened
/// * see [`parse_observations`]
pub fn load_observations(
    path: &Path,
    options: &StationOptions,
    projection: &Utm,
) -> Result<StationLoad, GeoError> {
    let file = std::fs::File::open(path)?;
    let load = parse_observations(file, options, projection)?;
    log::info!(
        "Loaded {} stations from {} ({} without a value, {} with invalid coordinates)",
        load.observations.len(),
        path.display(),
        load.null_values,
        load.invalid_coordinates
    );
    Ok(load)
}

/// Parses station observations from any CSV source and projects them.
///
/// # Errors
///
/// * [`GeoError::Csv`] on malformed CSV
/// * [`GeoError::Conversion`] if the delimiter is not ASCII
/// * [`GeoError::AmbiguousSchema`] if a coordinate or value column cannot be
///   found
/// * [`GeoError::EmptyInput`] if there is no header or no data row
pub fn parse_observations(
    reader: impl Read,
    options: &StationOptions,
    projection: &Utm,
) -> Result<StationLoad, GeoError> {
    let delimiter = u8::try_from(options.delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| GeoError::Conversion {
            message: format!(
                "delimiter {:?} is not a single ASCII character",
                options.delimiter
            ),
        })?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| clean_cell(h).to_string())
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(GeoError::EmptyInput {
            input: INPUT.to_string(),
        });
    }

    let ambiguous = || GeoError::AmbiguousSchema {
        input: INPUT.to_string(),
        available: headers.clone(),
    };
    let lon_idx = detect_column(&headers, options.lon_column.as_deref(), LON_NAMES)
        .ok_or_else(ambiguous)?;
    let lat_idx = detect_column(&headers, options.lat_column.as_deref(), LAT_NAMES)
        .ok_or_else(ambiguous)?;
    let value_idx = detect_column(&headers, options.value_column.as_deref(), VALUE_NAMES)
        .ok_or_else(ambiguous)?;
    let network_idx = detect_column(&headers, options.network_column.as_deref(), NETWORK_NAMES);

    let network_filter = options.network.as_deref().and_then(|network| {
        if network_idx.is_none() {
            log::warn!("No network column found; keeping stations of every network");
        }
        network_idx.map(|idx| (idx, network))
    });

    let mut load = StationLoad {
        observations: Vec::new(),
        invalid_coordinates: 0,
        filtered_network: 0,
        null_values: 0,
    };
    let mut rows = 0_usize;

    for row in csv_reader.records() {
        let row = row?;
        rows += 1;

        if let Some((idx, network)) = network_filter {
            let code = row.get(idx).map(clean_cell).unwrap_or_default();
            if !code.eq_ignore_ascii_case(network) {
                load.filtered_network += 1;
                continue;
            }
        }

        let lon = row.get(lon_idx).and_then(parse_decimal);
        let lat = row.get(lat_idx).and_then(parse_decimal);
        let location = match lon.zip(lat).map(|(lon, lat)| projection.project(lon, lat)) {
            Some(Ok(location)) => location,
            Some(Err(e)) => {
                log::trace!("Dropping station row {rows}: {e}");
                load.invalid_coordinates += 1;
                continue;
            }
            None => {
                log::trace!("Dropping station row {rows}: missing coordinates");
                load.invalid_coordinates += 1;
                continue;
            }
        };

        let value = row.get(value_idx).and_then(parse_decimal);
        if value.is_none() {
            load.null_values += 1;
        }

        load.observations.push(ObservationPoint {
            location,
            value,
        });
    }

    if rows == 0 {
        return Err(GeoError::EmptyInput {
            input: INPUT.to_string(),
        });
    }
    if load.filtered_network > 0 {
        log::info!(
            "Kept {} stations of network {}, dropped {}",
            load.observations.len(),
            options.network.as_deref().unwrap_or_default(),
            load.filtered_network
        );
    }

    Ok(load)
}

/// Finds a column by its configured name, or by the first matching known
/// name, or by a header containing a known name (`station longitude`).
fn detect_column(headers: &[String], configured: Option<&str>, names: &[&str]) -> Option<usize> {
    if let Some(name) = configured {
        return find_column(headers, name);
    }

    names
        .iter()
        .find_map(|name| find_column(headers, name))
        .or_else(|| {
            headers.iter().position(|header| {
                let header = header.to_ascii_lowercase();
                names
                    .iter()
                    .filter(|name| name.len() > 3)
                    .any(|name| header.contains(name))
            })
        })
}
