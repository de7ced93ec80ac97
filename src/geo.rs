use crate::error::{Result, SpeedError};
use crate::types::Point;

const EARTH_RADIUS_KM: f64 = 6371.0;

fn validate(p: Point) -> Result<()> {
    let lat_ok = p.lat.is_finite() && (-90.0..=90.0).contains(&p.lat);
    let lon_ok = p.lon.is_finite() && (-180.0..=180.0).contains(&p.lon);
    if lat_ok && lon_ok {
        Ok(())
    } else {
        Err(SpeedError::InvalidCoordinate {
            lat: p.lat,
            lon: p.lon,
        })
    }
}

/// 计算两点之间的大圆距离 (km), 使用 haversine 公式
///
/// 坐标越界或为 NaN 时返回 `InvalidCoordinate`, 不做截断
pub fn distance(a: Point, b: Point) -> Result<f64> {
    validate(a)?;
    validate(b)?;
    // fixed argument order keeps the result bit-for-bit symmetric
    let (a, b) = if (a.lat, a.lon) <= (b.lat, b.lon) { (a, b) } else { (b, a) };

    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // rounding can push h a hair above 1.0 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();
    Ok(EARTH_RADIUS_KM * c)
}
