//! Forward UTM projection for bringing WGS84 coordinates into metres.
//!
//! Station coordinates arrive as longitude/latitude while boundaries are in
//! ETRS89 / UTM (EPSG:258xx). Distances and containment must never be
//! evaluated on angular coordinates, so points are projected with the Krüger
//! series for the transverse Mercator on the GRS80 ellipsoid. WGS84 and
//! ETRS89 differ by well under a metre across Europe, far below station
//! spacing.

use geo::Point;

use crate::SpatialError;

/// GRS80 semi-major axis in metres.
const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
/// GRS80 flattening.
const FLATTENING: f64 = 1.0 / 298.257_222_101;
/// UTM central meridian scale factor.
const SCALE_FACTOR: f64 = 0.9996;
/// UTM false easting in metres.
const FALSE_EASTING: f64 = 500_000.0;

/// UTM zone used by the Bavarian boundary data (EPSG:25832).
pub const DEFAULT_ZONE: u8 = 32;

/// A northern-hemisphere UTM zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utm {
    zone: u8,
    central_meridian: f64,
    rectifying_radius: f64,
    alpha: [f64; 3],
}

impl Utm {
    /// Creates the projection for `zone` (1–60).
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidZone`] for zones outside 1–60.
    pub fn zone(zone: u8) -> Result<Self, SpatialError> {
        if !(1..=60).contains(&zone) {
            return Err(SpatialError::InvalidZone { zone });
        }

        let n = FLATTENING / (2.0 - FLATTENING);
        let n2 = n * n;
        let n3 = n2 * n;

        Ok(Self {
            zone,
            central_meridian: f64::from(zone).mul_add(6.0, -183.0).to_radians(),
            rectifying_radius: SEMI_MAJOR_AXIS / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0),
            alpha: [
                n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
                13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
                61.0 * n3 / 240.0,
            ],
        })
    }

    /// The zone number.
    #[must_use]
    pub const fn zone_number(&self) -> u8 {
        self.zone
    }

    /// EPSG code of the matching ETRS89 / UTM CRS.
    #[must_use]
    pub fn epsg(&self) -> u32 {
        25_800 + u32::from(self.zone)
    }

    /// Projects a WGS84 longitude/latitude (degrees) to easting/northing.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidCoordinate`] for latitudes outside
    /// -80..=84 degrees or non-finite input.
    pub fn project(&self, lon: f64, lat: f64) -> Result<Point<f64>, SpatialError> {
        if !lon.is_finite() || !lat.is_finite() || !(-80.0..=84.0).contains(&lat) {
            return Err(SpatialError::InvalidCoordinate { lon, lat });
        }

        let n = FLATTENING / (2.0 - FLATTENING);
        let e = 2.0 * n.sqrt() / (1.0 + n);

        let phi = lat.to_radians();
        let lambda = lon.to_radians() - self.central_meridian;

        let t = (phi.sin().atanh() - e * (e * phi.sin()).atanh()).sinh();
        let xi = t.atan2(lambda.cos());
        let eta = (lambda.sin() / t.mul_add(t, 1.0).sqrt()).atanh();

        let mut easting = eta;
        let mut northing = xi;
        for (j, alpha) in self.alpha.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let k = 2.0 * (j + 1) as f64;
            easting += alpha * (k * xi).cos() * (k * eta).sinh();
            northing += alpha * (k * xi).sin() * (k * eta).cosh();
        }

        let scale = SCALE_FACTOR * self.rectifying_radius;
        Ok(Point::new(
            scale.mul_add(easting, FALSE_EASTING),
            scale * northing,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone32() -> Utm {
        Utm::zone(DEFAULT_ZONE).unwrap()
    }

    #[test]
    fn equator_on_central_meridian_is_origin() {
        let p = zone32().project(9.0, 0.0).unwrap();
        assert!((p.x() - 500_000.0).abs() < 1e-6);
        assert!(p.y().abs() < 1e-6);
    }

    #[test]
    fn central_meridian_northing_matches_meridian_arc() {
        let p = zone32().project(9.0, 48.0).unwrap();
        assert!((p.x() - 500_000.0).abs() < 1e-6);
        assert!((p.y() - 5_316_300.224).abs() < 0.01, "got {}", p.y());
    }

    #[test]
    fn projects_munich() {
        let p = zone32().project(11.576_124, 48.137_154).unwrap();
        assert!((p.x() - 691_650.37).abs() < 0.05, "got {}", p.x());
        assert!((p.y() - 5_334_754.25).abs() < 0.05, "got {}", p.y());
    }

    #[test]
    fn symmetric_about_central_meridian() {
        let utm = zone32();
        let west = utm.project(8.0, 48.0).unwrap();
        let east = utm.project(10.0, 48.0).unwrap();
        assert!((west.x() + east.x() - 1_000_000.0).abs() < 1e-6);
        assert!((west.y() - east.y()).abs() < 1e-6);
    }

    #[test]
    fn epsg_code_for_zone() {
        assert_eq!(zone32().epsg(), 25_832);
        assert_eq!(Utm::zone(33).unwrap().epsg(), 25_833);
    }

    #[test]
    fn rejects_invalid_input() {
        assert_eq!(Utm::zone(0), Err(SpatialError::InvalidZone { zone: 0 }));
        assert_eq!(Utm::zone(61), Err(SpatialError::InvalidZone { zone: 61 }));
        assert!(zone32().project(9.0, 85.0).is_err());
        assert!(zone32().project(f64::NAN, 48.0).is_err());
    }
}
