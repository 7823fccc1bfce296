use crate::image::Rgb;

/// First hue of the marker ramp (red), on the 8-bit 0..180 hue scale.
pub const START_HUE: u8 = 0;
/// Last hue of the marker ramp (purple), on the 8-bit 0..180 hue scale.
pub const END_HUE: u8 = 140;

/// Marker color for manually saved pairs.
pub const MANUAL_PAIR_COLOR: Rgb = [0, 255, 0];
/// Marker color for a click that has not been saved yet.
pub const PENDING_POINT_COLOR: Rgb = [255, 0, 0];

/// Color for element `index` of `total`, ramping from red to purple.
///
/// The ramp covers `[0, total - 1]` inclusively; `total <= 1` yields the
/// start hue and indices past the end are clamped.
pub fn rainbow(index: usize, total: usize) -> Rgb {
    if total <= 1 {
        return hsv8_to_rgb(START_HUE, 255, 255);
    }
    let last = total - 1;
    let index = index.min(last);
    let span = (END_HUE - START_HUE) as f64;
    let hue = START_HUE as f64 + span * index as f64 / last as f64;
    hsv8_to_rgb(hue as u8, 255, 255)
}

/// 8-bit HSV to RGB, with hue on the half-degree scale (0..180 ⇒ 0..360°).
pub fn hsv8_to_rgb(h: u8, s: u8, v: u8) -> Rgb {
    let s = s as f64 / 255.0;
    let v = v as f64 / 255.0;
    let mut h = (h as f64 * 6.0 / 180.0) % 6.0;
    let sector = h.floor();
    h -= sector;

    let p = v * (1.0 - s);
    let q = v * (1.0 - s * h);
    let t = v * (1.0 - s * (1.0 - h));

    let (r, g, b) = match sector as u8 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    let to_u8 = |c: f64| (c * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_u8(r), to_u8(g), to_u8(b)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_endpoints_are_red_and_purple() {
        for total in [2, 3, 49, 100] {
            assert_eq!(rainbow(0, total), [255, 0, 0], "total={total}");
            assert_eq!(rainbow(total - 1, total), [170, 0, 255], "total={total}");
        }
    }

    #[test]
    fn single_element_uses_start_hue() {
        assert_eq!(rainbow(0, 1), [255, 0, 0]);
        assert_eq!(rainbow(7, 0), [255, 0, 0]);
    }

    #[test]
    fn midpoint_of_seven_by_seven_grid_is_green_cyan() {
        // index 24 of 49 → hue trunc(140 * 24 / 48) = 70 → 140°.
        assert_eq!(rainbow(24, 49), hsv8_to_rgb(70, 255, 255));
        assert_eq!(hsv8_to_rgb(60, 255, 255), [0, 255, 0]);
    }

    #[test]
    fn is_deterministic() {
        assert_eq!(rainbow(11, 49), rainbow(11, 49));
    }
}
