//! Open Location Code ("plus code") encoding.
//!
//! Produces the standard 10-digit code (8 digits, a `+` separator, then
//! 2 digits), which identifies a cell of roughly 14 x 14 meters. No
//! crate in our dependency tree covers this, so the pair-digit encoding
//! is implemented here against the published algorithm.

/// The 20 valid plus-code digits.
const ALPHABET: &[u8; 20] = b"23456789CFGHJMPQRVWX";

/// Degrees of latitude/longitude covered by one final-precision cell.
const FINAL_CELL_DEG: f64 = 0.000125;

/// Latitude cells from pole to pole (180 / `FINAL_CELL_DEG`).
const LAT_CELLS: i64 = 1_440_000;

/// Longitude cells around the globe (360 / `FINAL_CELL_DEG`).
const LON_CELLS: i64 = 2_880_000;

/// Encodes a coordinate as a 10-digit plus code (e.g. `8FVC2222+22`).
///
/// Latitude is clipped to [-90, 90]; longitude is normalized into
/// [-180, 180).
#[must_use]
pub fn encode(lat: f64, lon: f64) -> String {
    let lat = lat.clamp(-90.0, 90.0);
    let mut lon = lon;
    while lon < -180.0 {
        lon += 360.0;
    }
    while lon >= 180.0 {
        lon -= 360.0;
    }

    #[allow(clippy::cast_possible_truncation)]
    let lat_units = (((lat + 90.0) / FINAL_CELL_DEG).floor() as i64).clamp(0, LAT_CELLS - 1);
    #[allow(clippy::cast_possible_truncation)]
    let lon_units = (((lon + 180.0) / FINAL_CELL_DEG).floor() as i64).clamp(0, LON_CELLS - 1);

    let mut code = String::with_capacity(11);
    let mut divisor = 20_i64.pow(4);
    for pair in 0..5 {
        #[allow(clippy::cast_sign_loss)]
        let lat_digit = ((lat_units / divisor) % 20) as usize;
        #[allow(clippy::cast_sign_loss)]
        let lon_digit = ((lon_units / divisor) % 20) as usize;
        code.push(char::from(ALPHABET[lat_digit]));
        code.push(char::from(ALPHABET[lon_digit]));
        if pair == 3 {
            code.push('+');
        }
        divisor /= 20;
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_vectors() {
        assert_eq!(encode(47.000_062_5, 8.000_062_5), "8FVC2222+22");
        assert_eq!(encode(0.0, 0.0), "6FG22222+22");
    }

    #[test]
    fn poles_and_antimeridian_stay_in_range() {
        for code in [
            encode(90.0, 0.0),
            encode(-90.0, 0.0),
            encode(0.0, 180.0),
            encode(0.0, -180.0),
            encode(45.0, 540.0),
        ] {
            assert_eq!(code.len(), 11);
            assert_eq!(code.as_bytes()[8], b'+');
            assert!(code
                .bytes()
                .all(|b| b == b'+' || ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn nearby_points_share_a_prefix() {
        let a = encode(12.3456, -1.2345);
        let b = encode(12.3457, -1.2346);
        assert_eq!(a[..6], b[..6]);
    }
}
