#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial aggregation of point observations to region polygons.
//!
//! Builds an R-tree over region polygons and assigns each observation point
//! to the region whose interior contains it, then averages the assigned
//! values per region. Regions without a direct value are filled later by
//! [`idw::IdwInterpolator`]. All coordinates are projected and in metres;
//! see [`projection`] for bringing WGS84 input into that space.

pub mod idw;
pub mod projection;

use geo::{BoundingRect, Contains, InteriorPoint, MultiPolygon, Point};
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;

/// Errors raised by spatial operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpatialError {
    /// Interpolation parameters are unusable.
    #[error("Invalid interpolation parameters: {message}")]
    InvalidParams {
        /// Description of what went wrong.
        message: String,
    },

    /// Coordinate that cannot be projected (non-finite, or latitude
    /// outside -80..=84 degrees).
    #[error("Coordinate ({lon}, {lat}) cannot be projected to UTM")]
    InvalidCoordinate {
        /// The rejected longitude.
        lon: f64,
        /// The rejected latitude.
        lat: f64,
    },

    /// UTM zone number outside 1..=60.
    #[error("Invalid UTM zone {zone}")]
    InvalidZone {
        /// The rejected zone.
        zone: u8,
    },
}

/// A point measurement in projected coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationPoint {
    /// Location in metres.
    pub location: Point<f64>,
    /// Measured value; `None` if the source had no usable reading.
    pub value: Option<f64>,
}

impl ObservationPoint {
    /// Creates an observation at `(x, y)`.
    #[must_use]
    pub fn new(x: f64, y: f64, value: Option<f64>) -> Self {
        Self {
            location: Point::new(x, y),
            value,
        }
    }

    /// Returns the value if it is present and finite.
    #[must_use]
    pub fn observed_value(&self) -> Option<f64> {
        self.value.filter(|v| v.is_finite())
    }
}

/// A region polygon stored in the R-tree with its input position.
struct RegionEntry<'a> {
    index: usize,
    envelope: AABB<[f64; 2]>,
    polygon: &'a MultiPolygon<f64>,
}

impl RTreeObject for RegionEntry<'_> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over region polygons for point-in-polygon lookups.
///
/// Region identity is the position in the slice the index was built from.
pub struct RegionIndex<'a> {
    tree: RTree<RegionEntry<'a>>,
    len: usize,
}

impl<'a> RegionIndex<'a> {
    /// Builds the index. Polygons without a bounding box (empty geometries)
    /// are left out and can never contain a point.
    #[must_use]
    pub fn new(polygons: &[&'a MultiPolygon<f64>]) -> Self {
        let entries: Vec<RegionEntry<'a>> = polygons
            .iter()
            .enumerate()
            .filter_map(|(index, polygon)| {
                compute_envelope(polygon).map(|envelope| RegionEntry {
                    index,
                    envelope,
                    polygon: *polygon,
                })
            })
            .collect();

        if entries.len() < polygons.len() {
            log::warn!(
                "{} region geometries are empty and excluded from the spatial index",
                polygons.len() - entries.len()
            );
        }

        Self {
            tree: RTree::bulk_load(entries),
            len: polygons.len(),
        }
    }

    /// Number of regions the index was built from.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the index was built from no regions.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All regions whose interior contains `point`, in input order.
    ///
    /// Points on a polygon boundary are not contained.
    #[must_use]
    pub fn containing(&self, point: Point<f64>) -> Vec<usize> {
        let query_env = AABB::from_point([point.x(), point.y()]);
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.contains(&point))
            .map(|entry| entry.index)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// The region a point is assigned to.
    ///
    /// Regions are expected not to overlap. If they do, the lowest index
    /// wins so the assignment stays a partition.
    #[must_use]
    pub fn locate(&self, point: Point<f64>) -> Option<usize> {
        self.containing(point).first().copied()
    }
}

/// Result of averaging observations per region.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// Mean of the contained non-null values, per region.
    pub means: Vec<Option<f64>>,
    /// Number of non-null observations assigned, per region.
    pub counts: Vec<usize>,
    /// Observations skipped because their value was null.
    pub null_points: usize,
    /// Non-null observations inside no region.
    pub outside_points: usize,
    /// Non-null observations inside more than one region.
    pub overlapping_points: usize,
}

impl Aggregation {
    /// Number of regions that received a direct value.
    #[must_use]
    pub fn observed_regions(&self) -> usize {
        self.means.iter().filter(|m| m.is_some()).count()
    }

    /// Number of observations counted into some region.
    #[must_use]
    pub fn assigned_points(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Averages the non-null observation values contained in each region.
///
/// Regions with no contained non-null value get `None`, not zero.
#[must_use]
pub fn aggregate_means(index: &RegionIndex<'_>, observations: &[ObservationPoint]) -> Aggregation {
    let mut sums = vec![0.0_f64; index.len()];
    let mut counts = vec![0_usize; index.len()];
    let mut null_points = 0;
    let mut outside_points = 0;
    let mut overlapping_points = 0;

    for observation in observations {
        let Some(value) = observation.observed_value() else {
            null_points += 1;
            continue;
        };

        let hits = index.containing(observation.location);
        let Some(&region) = hits.first() else {
            outside_points += 1;
            continue;
        };
        if hits.len() > 1 {
            overlapping_points += 1;
        }

        sums[region] += value;
        counts[region] += 1;
    }

    if overlapping_points > 0 {
        log::warn!(
            "{overlapping_points} observations fall inside overlapping regions; \
             each was assigned to the first region only"
        );
    }

    #[allow(clippy::cast_precision_loss)]
    let means = sums
        .iter()
        .zip(&counts)
        .map(|(&sum, &count)| (count > 0).then(|| sum / count as f64))
        .collect();

    Aggregation {
        means,
        counts,
        null_points,
        outside_points,
        overlapping_points,
    }
}

/// A point guaranteed to lie inside the polygon, unlike the centroid of a
/// non-convex shape.
#[must_use]
pub fn representative_point(polygon: &MultiPolygon<f64>) -> Option<Point<f64>> {
    polygon.interior_point()
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    mp.bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}


#[cfg(test)]
mod tests {
    use geo::{Centroid as _, Contains as _};

    use super::test_support::{square, u_shape};
    use super::*;

    fn grid() -> Vec<MultiPolygon<f64>> {
        // 3x3 grid of 10 km squares.
        let mut cells = Vec::new();
        for row in 0..3 {
            for col in 0..3 {
                cells.push(square(
                    f64::from(col) * 10_000.0,
                    f64::from(row) * 10_000.0,
                    10_000.0,
                ));
            }
        }
        cells
    }

    #[test]
    fn locates_point_in_region() {
        let cells = grid();
        let refs: Vec<&MultiPolygon<f64>> = cells.iter().collect();
        let index = RegionIndex::new(&refs);
        assert_eq!(index.len(), 9);
        assert_eq!(index.locate(Point::new(15_000.0, 25_000.0)), Some(7));
        assert_eq!(index.locate(Point::new(-5.0, 5.0)), None);
    }

    #[test]
    fn boundary_points_are_not_contained() {
        let cells = vec![square(0.0, 0.0, 10.0)];
        let refs: Vec<&MultiPolygon<f64>> = cells.iter().collect();
        let index = RegionIndex::new(&refs);
        assert_eq!(index.locate(Point::new(10.0, 5.0)), None);
        assert_eq!(index.locate(Point::new(0.0, 0.0)), None);
        assert_eq!(index.locate(Point::new(9.999, 5.0)), Some(0));
    }

    #[test]
    fn averages_contained_values() {
        let cells = vec![square(0.0, 0.0, 10.0), square(10.0, 0.0, 10.0)];
        let refs: Vec<&MultiPolygon<f64>> = cells.iter().collect();
        let index = RegionIndex::new(&refs);
        let observations = [
            ObservationPoint::new(2.0, 2.0, Some(10.0)),
            ObservationPoint::new(8.0, 8.0, Some(20.0)),
            ObservationPoint::new(5.0, 5.0, None),
            ObservationPoint::new(5.0, 6.0, Some(f64::NAN)),
        ];

        let aggregation = aggregate_means(&index, &observations);

        assert_eq!(aggregation.means, vec![Some(15.0), None]);
        assert_eq!(aggregation.counts, vec![2, 0]);
        assert_eq!(aggregation.null_points, 2);
        assert_eq!(aggregation.outside_points, 0);
        assert_eq!(aggregation.observed_regions(), 1);
    }

    #[test]
    fn unmatched_regions_stay_absent() {
        let cells = vec![square(0.0, 0.0, 10.0)];
        let refs: Vec<&MultiPolygon<f64>> = cells.iter().collect();
        let index = RegionIndex::new(&refs);
        let observations = [ObservationPoint::new(50.0, 50.0, Some(3.0))];

        let aggregation = aggregate_means(&index, &observations);

        assert_eq!(aggregation.means, vec![None]);
        assert_eq!(aggregation.outside_points, 1);
    }

    #[test]
    fn every_point_counted_exactly_once_over_a_tiling() {
        let cells = grid();
        let refs: Vec<&MultiPolygon<f64>> = cells.iter().collect();
        let index = RegionIndex::new(&refs);

        let mut observations = Vec::new();
        for i in 0..30 {
            for j in 0..30 {
                let x = f64::from(i).mul_add(1_000.0, 500.0);
                let y = f64::from(j).mul_add(1_000.0, 500.0);
                let value = if (i + j) % 7 == 0 { None } else { Some(f64::from(i)) };
                observations.push(ObservationPoint::new(x, y, value));
            }
        }
        let non_null = observations.iter().filter(|o| o.value.is_some()).count();

        let aggregation = aggregate_means(&index, &observations);

        assert_eq!(aggregation.assigned_points(), non_null);
        assert_eq!(aggregation.outside_points, 0);
        assert_eq!(aggregation.overlapping_points, 0);
        assert_eq!(aggregation.null_points, observations.len() - non_null);
        assert!(aggregation.counts.iter().all(|&c| c > 0));
    }

    #[test]
    fn overlapping_regions_assign_to_first() {
        let cells = vec![square(0.0, 0.0, 10.0), square(5.0, 0.0, 10.0)];
        let refs: Vec<&MultiPolygon<f64>> = cells.iter().collect();
        let index = RegionIndex::new(&refs);
        let observations = [ObservationPoint::new(7.0, 5.0, Some(4.0))];

        assert_eq!(index.containing(Point::new(7.0, 5.0)), vec![0, 1]);

        let aggregation = aggregate_means(&index, &observations);

        assert_eq!(aggregation.means, vec![Some(4.0), None]);
        assert_eq!(aggregation.overlapping_points, 1);
        assert_eq!(aggregation.assigned_points(), 1);
    }

    #[test]
    fn empty_geometry_is_never_matched() {
        let cells = vec![MultiPolygon::<f64>(vec![]), square(0.0, 0.0, 10.0)];
        let refs: Vec<&MultiPolygon<f64>> = cells.iter().collect();
        let index = RegionIndex::new(&refs);
        assert_eq!(index.len(), 2);
        assert_eq!(index.locate(Point::new(5.0, 5.0)), Some(1));
    }

    #[test]
    fn representative_point_lies_inside_non_convex_polygon() {
        let shape = u_shape();
        let centroid = shape.centroid().unwrap();
        assert!(!shape.contains(&centroid));

        let interior = representative_point(&shape).unwrap();
        assert!(shape.contains(&interior));
    }
}
