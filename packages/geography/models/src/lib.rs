#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Administrative identifier and bivariate indicator types.
//!
//! These types describe what the pipeline knows about a region's two
//! indicators (commuting intensity and air pollution): where each value came
//! from, which tertile it falls into, and the joint 3×3 category.

pub mod ags;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Where a region's indicator value came from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provenance {
    /// Directly observed: tabular records for the region, or measurement
    /// points inside its polygon.
    Measured,
    /// Estimated by inverse-distance weighting from nearby points.
    Interpolated,
    /// Placeholder generated because the source was unavailable.
    Synthetic,
}

/// One of three equal-frequency classes of an indicator.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Tertile {
    /// At or below the 1/3 quantile.
    Low = 1,
    /// Above the 1/3 quantile, at or below the 2/3 quantile.
    Mid = 2,
    /// Above the 2/3 quantile.
    High = 3,
}

impl Tertile {
    /// Returns the bin number (1–3).
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }
}

/// A cell in the 3×3 bivariate grid.
///
/// The commuting bin is the Y axis and the air-quality bin the X axis, so
/// the rendered key reads `"{commute}-{air}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JointCategory {
    /// Commuting-intensity tertile (Y axis).
    pub commute: Tertile,
    /// Air-pollution tertile (X axis).
    pub air: Tertile,
}

impl JointCategory {
    /// Returns the composite key used in exported attribute tables.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for JointCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.commute.value(), self.air.value())
    }
}

/// A tabular indicator row before identifier normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRecord {
    /// Identifier exactly as it appeared in the source.
    pub raw_id: String,
    /// Parsed value, absent if the cell was empty or unparseable.
    pub value: Option<f64>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn joint_category_key_puts_commute_first() {
        let category = JointCategory {
            commute: Tertile::High,
            air: Tertile::Low,
        };
        assert_eq!(category.key(), "3-1");
    }

    #[test]
    fn tertile_values() {
        assert_eq!(Tertile::Low.value(), 1);
        assert_eq!(Tertile::Mid.value(), 2);
        assert_eq!(Tertile::High.value(), 3);
    }

    #[test]
    fn provenance_string_roundtrip() {
        for provenance in [
            Provenance::Measured,
            Provenance::Interpolated,
            Provenance::Synthetic,
        ] {
            let s = provenance.to_string();
            assert_eq!(Provenance::from_str(&s).unwrap(), provenance);
        }
        assert_eq!(Provenance::Interpolated.as_ref(), "interpolated");
    }

    #[test]
    fn provenance_serializes_snake_case() {
        let json = serde_json::to_string(&Provenance::Synthetic).unwrap();
        assert_eq!(json, "\"synthetic\"");
    }
}
