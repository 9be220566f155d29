//! Inverse-distance-weighted interpolation from point observations.
//!
//! Estimates a value at a target location as the weighted mean of the `k`
//! nearest reference observations within a search radius, each weighted by
//! `1 / max(distance, min_distance_m)`. The floor keeps a reference that
//! coincides with the target from producing an infinite weight.

use geo::Point;
use rstar::RTree;
use rstar::primitives::GeomWithData;

use crate::{ObservationPoint, SpatialError};

/// Default number of nearest references used per estimate.
pub const DEFAULT_K: usize = 5;

/// Default search radius in kilometres.
pub const DEFAULT_MAX_KM: f64 = 80.0;

/// Default distance floor in metres.
pub const DEFAULT_MIN_DISTANCE_M: f64 = 1.0;

/// IDW search parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdwParams {
    /// Maximum number of nearest references to use.
    pub k: usize,
    /// References farther than this (in km) are ignored.
    pub max_km: f64,
    /// Distances below this (in metres) are clamped up to it.
    pub min_distance_m: f64,
}

impl Default for IdwParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            max_km: DEFAULT_MAX_KM,
            min_distance_m: DEFAULT_MIN_DISTANCE_M,
        }
    }
}

impl IdwParams {
    /// Checks that the parameters can produce an estimate.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidParams`] if `k` is zero or either
    /// distance is not a positive finite number.
    pub fn validate(&self) -> Result<(), SpatialError> {
        if self.k == 0 {
            return Err(invalid("k must be at least 1"));
        }
        if !(self.max_km.is_finite() && self.max_km > 0.0) {
            return Err(invalid(format!(
                "max_km must be positive, got {}",
                self.max_km
            )));
        }
        if !(self.min_distance_m.is_finite() && self.min_distance_m > 0.0) {
            return Err(invalid(format!(
                "min_distance_m must be positive, got {}",
                self.min_distance_m
            )));
        }
        Ok(())
    }

    /// Search radius in metres.
    #[must_use]
    pub fn max_distance_m(&self) -> f64 {
        self.max_km * 1000.0
    }
}

fn invalid(message: impl Into<String>) -> SpatialError {
    SpatialError::InvalidParams {
        message: message.into(),
    }
}

type Reference = GeomWithData<[f64; 2], f64>;

/// IDW interpolator over an immutable set of reference observations.
///
/// Estimates only read the reference tree, so one interpolator serves every
/// target independently.
pub struct IdwInterpolator {
    references: RTree<Reference>,
    params: IdwParams,
}

impl IdwInterpolator {
    /// Builds an interpolator from the observations that carry a value.
    /// Null observations are not references.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidParams`] if `params` fail validation.
    pub fn new(observations: &[ObservationPoint], params: IdwParams) -> Result<Self, SpatialError> {
        params.validate()?;

        let references: Vec<Reference> = observations
            .iter()
            .filter_map(|o| {
                o.observed_value()
                    .map(|v| GeomWithData::new([o.location.x(), o.location.y()], v))
            })
            .collect();

        Ok(Self {
            references: RTree::bulk_load(references),
            params,
        })
    }

    /// Number of usable reference observations.
    #[must_use]
    pub fn reference_count(&self) -> usize {
        self.references.size()
    }

    /// The search parameters.
    #[must_use]
    pub const fn params(&self) -> &IdwParams {
        &self.params
    }

    /// Estimates the value at `target`.
    ///
    /// Returns `None` if no reference lies within the search radius.
    #[must_use]
    pub fn estimate(&self, target: Point<f64>) -> Option<f64> {
        let max_distance_2 = self.params.max_distance_m().powi(2);

        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;
        let mut used = 0_usize;

        for (reference, distance_2) in self
            .references
            .nearest_neighbor_iter_with_distance_2(&[target.x(), target.y()])
            .take_while(|(_, distance_2)| *distance_2 <= max_distance_2)
            .take(self.params.k)
        {
            let weight = 1.0 / distance_2.sqrt().max(self.params.min_distance_m);
            weighted_sum += weight * reference.data;
            weight_sum += weight;
            used += 1;
        }

        if used == 0 || weight_sum <= 0.0 {
            return None;
        }

        Some(weighted_sum / weight_sum)
    }
}

/// One-off IDW estimate at `target` from `observations`.
///
/// Builds a throwaway [`IdwInterpolator`]; prefer constructing one when
/// estimating many targets.
///
/// # Errors
///
/// Returns [`SpatialError::InvalidParams`] if `params` fail validation.
pub fn idw_value(
    target: Point<f64>,
    observations: &[ObservationPoint],
    params: IdwParams,
) -> Result<Option<f64>, SpatialError> {
    Ok(IdwInterpolator::new(observations, params)?.estimate(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(x: f64, y: f64, value: f64) -> ObservationPoint {
        ObservationPoint::new(x, y, Some(value))
    }

    #[test]
    fn single_reference_returns_its_value() {
        let refs = [obs(5_000.0, 0.0, 30.0)];
        let value = idw_value(Point::new(0.0, 0.0), &refs, IdwParams::default()).unwrap();
        assert!((value.unwrap() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn no_reference_in_radius_gives_no_estimate() {
        let refs = [obs(100_000.0, 0.0, 30.0)];
        let value = idw_value(Point::new(0.0, 0.0), &refs, IdwParams::default()).unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn radius_is_inclusive() {
        let refs = [obs(80_000.0, 0.0, 12.0)];
        let value = idw_value(Point::new(0.0, 0.0), &refs, IdwParams::default()).unwrap();
        assert_eq!(value, Some(12.0));
    }

    #[test]
    fn empty_reference_set_gives_no_estimate() {
        let value = idw_value(Point::new(0.0, 0.0), &[], IdwParams::default()).unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn null_references_are_ignored() {
        let refs = [
            ObservationPoint::new(10.0, 0.0, None),
            ObservationPoint::new(20.0, 0.0, Some(f64::INFINITY)),
            obs(1_000.0, 0.0, 7.0),
        ];
        let interpolator = IdwInterpolator::new(&refs, IdwParams::default()).unwrap();
        assert_eq!(interpolator.reference_count(), 1);
        assert_eq!(interpolator.estimate(Point::new(0.0, 0.0)), Some(7.0));
    }

    #[test]
    fn weights_by_inverse_distance() {
        // Weights 1/1000 and 1/3000 -> (10*3 + 20*1) / 4 = 12.5
        let refs = [obs(1_000.0, 0.0, 10.0), obs(-3_000.0, 0.0, 20.0)];
        let value = idw_value(Point::new(0.0, 0.0), &refs, IdwParams::default())
            .unwrap()
            .unwrap();
        assert!((value - 12.5).abs() < 1e-9, "got {value}");
    }

    #[test]
    fn uses_only_k_nearest() {
        let refs = [
            obs(1_000.0, 0.0, 10.0),
            obs(2_000.0, 0.0, 10.0),
            obs(3_000.0, 0.0, 1_000.0),
        ];
        let params = IdwParams {
            k: 2,
            ..IdwParams::default()
        };
        let value = idw_value(Point::new(0.0, 0.0), &refs, params).unwrap();
        assert_eq!(value, Some(10.0));
    }

    #[test]
    fn fewer_than_k_uses_all_qualifying() {
        let refs = [obs(1_000.0, 0.0, 10.0), obs(0.0, 1_000.0, 20.0)];
        let value = idw_value(Point::new(0.0, 0.0), &refs, IdwParams::default())
            .unwrap()
            .unwrap();
        assert!((value - 15.0).abs() < 1e-9);
    }

    #[test]
    fn coincident_reference_dominates() {
        let refs = [
            obs(0.0, 0.0, 42.0),
            obs(20_000.0, 0.0, 10.0),
            obs(0.0, 30_000.0, 90.0),
        ];
        let value = idw_value(Point::new(0.0, 0.0), &refs, IdwParams::default())
            .unwrap()
            .unwrap();
        // 1 m floor vs. tens of kilometres: the far references contribute
        // well under a tenth of a unit.
        assert!((value - 42.0).abs() < 0.1, "got {value}");
        assert!(value.is_finite());
    }

    #[test]
    fn coincident_reference_alone_is_exact() {
        let refs = [obs(250.0, 250.0, 17.5)];
        let value = idw_value(Point::new(250.0, 250.0), &refs, IdwParams::default()).unwrap();
        assert_eq!(value, Some(17.5));
    }

    #[test]
    fn larger_radius_never_loses_estimates() {
        let refs = [
            obs(0.0, 0.0, 1.0),
            obs(50_000.0, 50_000.0, 2.0),
            obs(200_000.0, 0.0, 3.0),
        ];
        let targets: Vec<Point<f64>> = (0..40)
            .map(|i| Point::new(f64::from(i) * 10_000.0, f64::from(i % 5) * 25_000.0))
            .collect();

        let mut previous = 0;
        for max_km in [1.0, 10.0, 40.0, 80.0, 120.0, 500.0] {
            let interpolator = IdwInterpolator::new(
                &refs,
                IdwParams {
                    max_km,
                    ..IdwParams::default()
                },
            )
            .unwrap();
            let estimated = targets
                .iter()
                .filter(|t| interpolator.estimate(**t).is_some())
                .count();
            assert!(
                estimated >= previous,
                "max_km={max_km}: {estimated} < {previous}"
            );
            previous = estimated;
        }
        assert_eq!(previous, targets.len());
    }

    #[test]
    fn rejects_invalid_params() {
        let zero_k = IdwParams {
            k: 0,
            ..IdwParams::default()
        };
        assert!(matches!(
            IdwInterpolator::new(&[], zero_k),
            Err(SpatialError::InvalidParams { .. })
        ));

        let negative_radius = IdwParams {
            max_km: -1.0,
            ..IdwParams::default()
        };
        assert!(negative_radius.validate().is_err());

        let nan_floor = IdwParams {
            min_distance_m: f64::NAN,
            ..IdwParams::default()
        };
        assert!(nan_floor.validate().is_err());
    }
}
