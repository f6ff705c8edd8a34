//! Geodetic math for the visibility rule.
//!
//! Positions travel on the wire as earth-centered cartesian
//! coordinates in meters. The hub only ever needs two things from
//! them: the straight-line distance between two aircraft in nautical
//! miles, and a geodetic (lat/lon/alt) rendition for bookkeeping and
//! operator output.

/// WGS84 polar/equatorial radius ratio.
const SQUASH: f64 = 0.9966471893352525192801545;
const STRETCH: f64 = 1.0033640898209764189003079;
/// WGS84 polar radius in meters.
const POLRAD: f64 = 6356752.3142451794975639668;
/// WGS84 equatorial radius in meters.
const EQURAD: f64 = 6378137.0;

const NM_TO_METER: f64 = 1852.0;
const METER_TO_FEET: f64 = 3.28083989501312335958;

/// First eccentricity squared and friends, derived from SQUASH.
const E2: f64 = 1.0 - SQUASH * SQUASH;
const E4: f64 = E2 * E2;
const RA2: f64 = 1.0 / (EQURAD * EQURAD);

/// An earth-centered cartesian position, meters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// True if any component is exactly zero. Clients send all-zero or
    /// partially-zero positions while their simulation is settling;
    /// such positions are not usable for range checks.
    pub fn is_unsettled(&self) -> bool {
        self.x == 0.0 || self.y == 0.0 || self.z == 0.0
    }
}

/// A geodetic position: degrees latitude/longitude, altitude in feet.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Geodetic {
    pub lat_deg: f64,
    pub lon_deg: f64,
    pub alt_ft: f64,
}

/// Straight-line distance between two cartesian positions in
/// nautical miles.
pub fn distance_nm(a: Vec3, b: Vec3) -> f64 {
    let d = Vec3::new(a.x - b.x, a.y - b.y, a.z - b.z);
    d.length() / NM_TO_METER
}

/// Cartesian to geodetic conversion.
///
/// Closed-form transformation after H. Vermeille, "Direct
/// transformation from geocentric to geodetic coordinates", Journal of
/// Geodesy (2002) 76:451-454. Degenerate at the exact earth center;
/// callers must not pass unsettled positions.
pub fn cart_to_geod(cart: Vec3) -> Geodetic {
    let (x, y, z) = (cart.x, cart.y, cart.z);
    let xx_p_yy = x * x + y * y;
    let sqrt_xx_p_yy = xx_p_yy.sqrt();
    let p = xx_p_yy * RA2;
    let q = z * z * (1.0 - E2) * RA2;
    let r = (p + q - E4) / 6.0;
    let s = E4 * p * q / (4.0 * r * r * r);
    let t = (1.0 + s + (s * (2.0 + s)).sqrt()).powf(1.0 / 3.0);
    let u = r * (1.0 + t + 1.0 / t);
    let v = (u * u + E4 * q).sqrt();
    let w = E2 * (u + v - q) / (2.0 * v);
    let k = (u + v + w * w).sqrt() - w;
    let d = k * sqrt_xx_p_yy / (k + E2);
    let sqrt_dd_p_zz = (d * d + z * z).sqrt();

    Geodetic {
        lon_deg: (2.0 * y.atan2(x + sqrt_xx_p_yy)).to_degrees(),
        lat_deg: (2.0 * z.atan2(d + sqrt_dd_p_zz)).to_degrees(),
        alt_ft: ((k + E2 - 1.0) * sqrt_dd_p_zz / k) * METER_TO_FEET,
    }
}

/// Geodetic to cartesian conversion. Latitude and longitude in
/// radians, altitude in meters.
pub fn geod_to_cart(lat_rad: f64, lon_rad: f64, alt_m: f64) -> Vec3 {
    // Convert the geodetic "up" unit vector into cylindrical surface
    // coordinates, then add the altitude along that same vector.
    let upr = lat_rad.cos();
    let upz = lat_rad.sin();

    // Pick a coefficient c such that the stretched point lies on the
    // ellipsoid surface: (c*r*SQUASH)^2 + (c*z)^2 = POLRAD^2.
    let big_r = upr * STRETCH;
    let big_z = upz * SQUASH;
    let sr = big_r * SQUASH;
    let c = POLRAD / (sr * sr + big_z * big_z).sqrt();

    let r = big_r * c + upr * alt_m;
    let z = big_z * c + upz * alt_m;

    Vec3::new(r * lon_rad.cos(), r * lon_rad.sin(), z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_along_one_axis() {
        let a = Vec3::new(0.0, 0.0, 1852.0);
        let b = Vec3::new(1852.0 * 10.0, 0.0, 1852.0);
        let d = distance_nm(a, b);
        assert!((d - 10.0).abs() < 1e-9, "expected 10 NM, got {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Vec3::new(4_000_000.0, 100_000.0, 4_900_000.0);
        let b = Vec3::new(4_000_900.0, 101_000.0, 4_900_500.0);
        assert_eq!(distance_nm(a, b), distance_nm(b, a));
    }

    #[test]
    fn equator_point_converts_to_zero_lat() {
        let geod = cart_to_geod(Vec3::new(EQURAD, 0.0, 0.0));
        assert!(geod.lat_deg.abs() < 1e-9);
        assert!(geod.lon_deg.abs() < 1e-9);
        assert!(geod.alt_ft.abs() < 1e-3);
    }

    #[test]
    fn north_pole_converts_to_ninety_lat() {
        let geod = cart_to_geod(Vec3::new(0.0, EQURAD * 0.001, POLRAD));
        assert!((geod.lat_deg - 90.0).abs() < 0.1);
    }

    #[test]
    fn geod_cart_round_trip() {
        let lat = 48.5_f64.to_radians();
        let lon = 11.3_f64.to_radians();
        let alt = 1200.0;
        let cart = geod_to_cart(lat, lon, alt);
        let geod = cart_to_geod(cart);
        assert!((geod.lat_deg - 48.5).abs() < 1e-6);
        assert!((geod.lon_deg - 11.3).abs() < 1e-6);
        assert!((geod.alt_ft - alt * METER_TO_FEET).abs() < 0.1);
    }

    #[test]
    fn unsettled_positions_detected() {
        assert!(Vec3::new(0.0, 1.0, 2.0).is_unsettled());
        assert!(Vec3::new(1.0, 0.0, 2.0).is_unsettled());
        assert!(Vec3::new(1.0, 2.0, 0.0).is_unsettled());
        assert!(!Vec3::new(1.0, 2.0, 3.0).is_unsettled());
    }
}
