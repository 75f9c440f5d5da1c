use crate::position::ObserverLocation;

pub const EARTH_ROTATION_RAD_S: f64 = 7.292_115e-5;
pub const EARTH_MEAN_RADIUS_KM: f64 = 6371.0;

// WGS-84
const WGS84_A_KM: f64 = 6378.137;
const WGS84_E2: f64 = 0.00669437999014;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geodetic {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
}

/// Approximate look angles from a ground observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativePosition {
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
    pub range_km: f64,
}

pub fn geodetic_to_ecef_km(latitude_deg: f64, longitude_deg: f64, altitude_km: f64) -> [f64; 3] {
    let lat = latitude_deg.to_radians();
    let lon = longitude_deg.to_radians();
    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let n = WGS84_A_KM / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    let x = (n + altitude_km) * cos_lat * lon.cos();
    let y = (n + altitude_km) * cos_lat * lon.sin();
    let z = (n * (1.0 - WGS84_E2) + altitude_km) * sin_lat;
    [x, y, z]
}

pub fn ecef_to_geodetic(pos: [f64; 3]) -> Geodetic {
    let [x, y, z] = pos;
    let p = x.hypot(y);
    let longitude = y.atan2(x);

    let mut latitude = z.atan2(p * (1.0 - WGS84_E2));
    for _ in 0..5 {
        let sin_lat = latitude.sin();
        let n = WGS84_A_KM / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        latitude = (z + WGS84_E2 * n * sin_lat).atan2(p);
    }

    let sin_lat = latitude.sin();
    let altitude = p * latitude.cos() + z * sin_lat
        - WGS84_A_KM * (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();

    Geodetic {
        latitude_deg: latitude.to_degrees(),
        longitude_deg: longitude.to_degrees(),
        altitude_km: altitude,
    }
}

pub fn observer_ecef_km(observer: &ObserverLocation) -> [f64; 3] {
    geodetic_to_ecef_km(
        observer.latitude_deg,
        observer.longitude_deg,
        observer.altitude_km(),
    )
}

pub fn teme_to_ecef_position(pos_teme: [f64; 3], gmst: f64) -> [f64; 3] {
    let cos_gmst = gmst.cos();
    let sin_gmst = gmst.sin();
    [
        pos_teme[0] * cos_gmst + pos_teme[1] * sin_gmst,
        -pos_teme[0] * sin_gmst + pos_teme[1] * cos_gmst,
        pos_teme[2],
    ]
}

pub fn teme_to_ecef_velocity(pos_teme: [f64; 3], vel_teme: [f64; 3], gmst: f64) -> [f64; 3] {
    let cos_gmst = gmst.cos();
    let sin_gmst = gmst.sin();
    let pos = teme_to_ecef_position(pos_teme, gmst);
    let rotated = [
        vel_teme[0] * cos_gmst + vel_teme[1] * sin_gmst,
        -vel_teme[0] * sin_gmst + vel_teme[1] * cos_gmst,
        vel_teme[2],
    ];
    [
        rotated[0] + EARTH_ROTATION_RAD_S * pos[1],
        rotated[1] - EARTH_ROTATION_RAD_S * pos[0],
        rotated[2],
    ]
}

pub fn ecef_to_enu(dr: [f64; 3], lat_rad: f64, lon_rad: f64) -> (f64, f64, f64) {
    let sin_lat = lat_rad.sin();
    let cos_lat = lat_rad.cos();
    let sin_lon = lon_rad.sin();
    let cos_lon = lon_rad.cos();

    let east = -sin_lon * dr[0] + cos_lon * dr[1];
    let north = -sin_lat * cos_lon * dr[0] - sin_lat * sin_lon * dr[1] + cos_lat * dr[2];
    let up = cos_lat * cos_lon * dr[0] + cos_lat * sin_lon * dr[1] + sin_lat * dr[2];
    (east, north, up)
}

/// Precise look angles of an ECEF point from the observer.
pub fn look_angles(observer: &ObserverLocation, sat_ecef: [f64; 3]) -> RelativePosition {
    let sta = observer_ecef_km(observer);
    let dr = [sat_ecef[0] - sta[0], sat_ecef[1] - sta[1], sat_ecef[2] - sta[2]];
    let range_km = (dr[0] * dr[0] + dr[1] * dr[1] + dr[2] * dr[2]).sqrt();

    let (east, north, up) = ecef_to_enu(
        dr,
        observer.latitude_deg.to_radians(),
        observer.longitude_deg.to_radians(),
    );
    let azimuth_deg = east.atan2(north).to_degrees().rem_euclid(360.0);
    let elevation_deg = if range_km > 0.0 {
        (up / range_km).asin().to_degrees()
    } else {
        0.0
    };

    RelativePosition {
        elevation_deg,
        azimuth_deg,
        range_km,
    }
}

/// Haversine distance on a spherical Earth.
pub fn great_circle_distance_km(lat1_deg: f64, lon1_deg: f64, lat2_deg: f64, lon2_deg: f64) -> f64 {
    let lat1 = lat1_deg.to_radians();
    let lat2 = lat2_deg.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (lon2_deg - lon1_deg).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_MEAN_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Initial great-circle bearing from point 1 to point 2, in [0, 360).
pub fn initial_bearing_deg(lat1_deg: f64, lon1_deg: f64, lat2_deg: f64, lon2_deg: f64) -> f64 {
    let lat1 = lat1_deg.to_radians();
    let lat2 = lat2_deg.to_radians();
    let dlon = (lon2_deg - lon1_deg).to_radians();
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Flat-earth approximation of look angles to a sub-satellite point at
/// `altitude_km`. Cheap enough for linear scans.
pub fn relative_position(
    observer: &ObserverLocation,
    latitude_deg: f64,
    longitude_deg: f64,
    altitude_km: f64,
) -> RelativePosition {
    let ground_km = great_circle_distance_km(
        observer.latitude_deg,
        observer.longitude_deg,
        latitude_deg,
        longitude_deg,
    );
    let height_km = altitude_km - observer.altitude_km();

    RelativePosition {
        elevation_deg: height_km.atan2(ground_km).to_degrees(),
        azimuth_deg: initial_bearing_deg(
            observer.latitude_deg,
            observer.longitude_deg,
            latitude_deg,
            longitude_deg,
        ),
        range_km: ground_km.hypot(height_km),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn one_degree_of_longitude_at_equator() {
        let d = great_circle_distance_km(0.0, 0.0, 0.0, 1.0);
        assert!(close(d, 111.19, 0.01), "got {d}");
        assert_eq!(great_circle_distance_km(10.0, 20.0, 10.0, 20.0), 0.0);
    }

    #[test]
    fn geodetic_round_trip() {
        let ecef = geodetic_to_ecef_km(48.1, 11.6, 0.52);
        let geo = ecef_to_geodetic(ecef);
        assert!(close(geo.latitude_deg, 48.1, 1e-6));
        assert!(close(geo.longitude_deg, 11.6, 1e-9));
        assert!(close(geo.altitude_km, 0.52, 1e-6));
    }

    #[test]
    fn bearings() {
        assert!(close(initial_bearing_deg(0.0, 0.0, 0.0, 1.0), 90.0, 1e-9));
        assert!(close(initial_bearing_deg(0.0, 0.0, 1.0, 0.0), 0.0, 1e-9));
        assert!(close(initial_bearing_deg(0.0, 0.0, -1.0, 0.0), 180.0, 1e-9));
    }

    #[test]
    fn overhead_satellite_is_at_zenith() {
        let observer = ObserverLocation::new(35.0, 139.0, None).unwrap();
        let rel = relative_position(&observer, 35.0, 139.0, 550.0);
        assert!(close(rel.elevation_deg, 90.0, 1e-9));
        assert!(close(rel.range_km, 550.0, 1e-9));

        let sat = geodetic_to_ecef_km(35.0, 139.0, 550.0);
        let precise = look_angles(&observer, sat);
        assert!(close(precise.elevation_deg, 90.0, 1e-3));
        assert!(close(precise.range_km, 550.0, 1e-6));
    }

    #[test]
    fn far_side_satellite_is_below_horizon() {
        let observer = ObserverLocation::new(0.0, 0.0, None).unwrap();
        let sat = geodetic_to_ecef_km(0.0, 180.0, 550.0);
        assert!(look_angles(&observer, sat).elevation_deg < 0.0);
    }
}
