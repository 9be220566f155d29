#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bivariate tertile classification.
//!
//! Splits each of two indicators into tertiles using breakpoints computed
//! over the whole dataset, then pairs the bins into one of nine joint
//! categories. Breakpoints are global statistics, so classification is only
//! offered for a complete dataset at once; there is no per-record entry
//! point.

use commute_air_geography_models::{JointCategory, Tertile};
use serde::{Deserialize, Serialize};

/// Quantile of ascending `sorted` values at `p` (0..=1), linearly
/// interpolated between order statistics (`h = (n - 1) * p`).
///
/// Returns `None` for an empty slice or `p` outside 0..=1.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn quantile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }

    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let fraction = h - lo as f64;

    Some(fraction.mul_add(sorted[hi] - sorted[lo], sorted[lo]))
}

/// Tertile breakpoints of one indicator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breaks {
    /// Smallest value (0 quantile).
    pub min: f64,
    /// Upper edge of the low bin (1/3 quantile).
    pub lower: f64,
    /// Upper edge of the middle bin (2/3 quantile).
    pub upper: f64,
    /// Largest value (1 quantile).
    pub max: f64,
}

impl Breaks {
    /// Computes breakpoints from the present, finite values.
    ///
    /// Returns `None` if there are none.
    #[must_use]
    pub fn from_values(values: impl IntoIterator<Item = Option<f64>>) -> Option<Self> {
        let mut sorted: Vec<f64> = values
            .into_iter()
            .flatten()
            .filter(|v| v.is_finite())
            .collect();
        sorted.sort_by(f64::total_cmp);

        Some(Self {
            min: quantile(&sorted, 0.0)?,
            lower: quantile(&sorted, 1.0 / 3.0)?,
            upper: quantile(&sorted, 2.0 / 3.0)?,
            max: quantile(&sorted, 1.0)?,
        })
    }

    /// Bins a value. A value equal to a breakpoint falls into the lower bin.
    ///
    /// Returns `None` for non-finite values.
    #[must_use]
    pub fn bin(&self, value: f64) -> Option<Tertile> {
        if !value.is_finite() {
            return None;
        }
        Some(if value <= self.lower {
            Tertile::Low
        } else if value <= self.upper {
            Tertile::Mid
        } else {
            Tertile::High
        })
    }
}

/// The two indicator values of one region.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IndicatorPair {
    /// Commuting intensity (Y axis).
    pub commute: Option<f64>,
    /// Air pollution (X axis).
    pub air: Option<f64>,
}

/// Bins and joint category of one region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BivariateClass {
    /// Commuting tertile, if the region has a commuting value.
    pub commute_bin: Option<Tertile>,
    /// Air tertile, if the region has an air value.
    pub air_bin: Option<Tertile>,
    /// Joint category, present only when both bins are.
    pub category: Option<JointCategory>,
}

/// Classification of a complete dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Commuting breakpoints, absent if no region has a commuting value.
    pub commute_breaks: Option<Breaks>,
    /// Air breakpoints, absent if no region has an air value.
    pub air_breaks: Option<Breaks>,
    /// One entry per input pair, in input order.
    pub classes: Vec<BivariateClass>,
}

impl Classification {
    /// Number of regions that received a joint category.
    #[must_use]
    pub fn classified_count(&self) -> usize {
        self.classes.iter().filter(|c| c.category.is_some()).count()
    }
}

/// Classifies every region of a dataset in one pass.
#[must_use]
pub fn classify(pairs: &[IndicatorPair]) -> Classification {
    let commute_breaks = Breaks::from_values(pairs.iter().map(|p| p.commute));
    let air_breaks = Breaks::from_values(pairs.iter().map(|p| p.air));

    let classes = pairs
        .iter()
        .map(|pair| {
            let commute_bin = commute_breaks
                .as_ref()
                .zip(pair.commute)
                .and_then(|(breaks, v)| breaks.bin(v));
            let air_bin = air_breaks
                .as_ref()
                .zip(pair.air)
                .and_then(|(breaks, v)| breaks.bin(v));
            let category = commute_bin
                .zip(air_bin)
                .map(|(commute, air)| JointCategory { commute, air });

            BivariateClass {
                commute_bin,
                air_bin,
                category,
            }
        })
        .collect();

    let classification = Classification {
        commute_breaks,
        air_breaks,
        classes,
    };

    log::debug!(
        "Classified {}/{} regions (commute breaks {:?}, air breaks {:?})",
        classification.classified_count(),
        pairs.len(),
        classification.commute_breaks,
        classification.air_breaks,
    );

    classification
}
