#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Administrative regions and the files they are built from.
//!
//! Loads district boundaries from `GeoJSON`, commuting statistics from CSV
//! and air-quality stations from CSV, normalizing every identifier to the
//! canonical AGS key on the way in. Enriched regions are written back out as
//! `GeoJSON` feature collections.

pub mod boundaries;
pub mod export;
pub mod indicator;
pub mod parsing;
pub mod stations;

use commute_air_geography_models::{JointCategory, Provenance, Tertile};
use geo::MultiPolygon;
use thiserror::Error;

/// Errors that can occur while loading or exporting geographic data.
#[derive(Debug, Error)]
pub enum GeoError {
    /// File could not be read or written.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Expected columns are absent and no fallback matched.
    #[error("Could not identify required columns in {input}. Available columns: {available:?}")]
    AmbiguousSchema {
        /// Which input was being read.
        input: String,
        /// Columns that were present.
        available: Vec<String>,
    },

    /// The input held no usable rows or features.
    #[error("{input} contains no records")]
    EmptyInput {
        /// Which input was being read.
        input: String,
    },

    /// Data conversion error.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// An indicator value together with where it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorValue {
    /// The value.
    pub value: f64,
    /// How it was obtained.
    pub provenance: Provenance,
}

impl IndicatorValue {
    /// A directly observed value.
    #[must_use]
    pub const fn measured(value: f64) -> Self {
        Self {
            value,
            provenance: Provenance::Measured,
        }
    }

    /// An IDW estimate.
    #[must_use]
    pub const fn interpolated(value: f64) -> Self {
        Self {
            value,
            provenance: Provenance::Interpolated,
        }
    }

    /// A placeholder for an unavailable source.
    #[must_use]
    pub const fn synthetic(value: f64) -> Self {
        Self {
            value,
            provenance: Provenance::Synthetic,
        }
    }
}

/// An administrative region and its indicators.
///
/// The canonical identifier is fixed at construction. Each indicator field
/// is written by exactly one pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    ags: String,
    /// Boundary in the projected CRS.
    pub geometry: MultiPolygon<f64>,
    /// Attributes carried over from the boundary file.
    pub attributes: serde_json::Map<String, serde_json::Value>,
    /// Commuting intensity.
    pub commute: Option<IndicatorValue>,
    /// Air pollutant concentration.
    pub air: Option<IndicatorValue>,
    /// Commuting tertile.
    pub commute_bin: Option<Tertile>,
    /// Air tertile.
    pub air_bin: Option<Tertile>,
    /// Joint bivariate category.
    pub category: Option<JointCategory>,
}

impl Region {
    /// Creates a region with no indicators.
    #[must_use]
    pub fn new(
        ags: impl Into<String>,
        geometry: MultiPolygon<f64>,
        attributes: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            ags: ags.into(),
            geometry,
            attributes,
            commute: None,
            air: None,
            commute_bin: None,
            air_bin: None,
            category: None,
        }
    }

    /// Canonical AGS code.
    #[must_use]
    pub fn ags(&self) -> &str {
        &self.ags
    }

    /// Commuting value, if any.
    #[must_use]
    pub fn commute_value(&self) -> Option<f64> {
        self.commute.map(|v| v.value)
    }

    /// Air value, if any.
    #[must_use]
    pub fn air_value(&self) -> Option<f64> {
        self.air.map(|v| v.value)
    }
}
