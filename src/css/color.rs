//! CSS `<color>` parsing and perceptual distance (CIE ΔE2000).
//!
//! Parsing is a thin wrapper over `csscolorparser`; the CIEDE2000 distance
//! and CIELAB conversion below are used by the consensus clustering pass
//! (spec §4.4) and the version diff's color-equality rule (spec §4.6).

use csscolorparser::Color;

/// 8-bit RGBA channels.
pub type Rgba8 = (u8, u8, u8, u8);

/// Parses any CSS `<color>` (named, hex, `rgb()`/`hsl()`/etc.) to RGBA8.
pub fn parse_css_color(input: &str) -> Option<Rgba8> {
    let parsed: Color = input.trim().parse().ok()?;
    let [r, g, b, a] = parsed.to_rgba8();
    Some((r, g, b, a))
}

/// A color in CIELAB space plus its original alpha, used for clustering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
    pub alpha: f64,
}

fn srgb_to_linear(c: f64) -> f64 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// D65 reference white.
const WHITE_X: f64 = 0.95047;
const WHITE_Y: f64 = 1.0;
const WHITE_Z: f64 = 1.08883;

fn lab_f(t: f64) -> f64 {
    const DELTA: f64 = 6.0 / 29.0;
    if t > DELTA.powi(3) {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

/// Converts RGBA8 to CIELAB, linearizing sRGB first (spec §4.4: "normalize
/// to sRGB linear").
pub fn rgba8_to_lab((r, g, b, a): Rgba8) -> Lab {
    let (rl, gl, bl) = (
        srgb_to_linear(r as f64 / 255.0),
        srgb_to_linear(g as f64 / 255.0),
        srgb_to_linear(b as f64 / 255.0),
    );

    let x = rl * 0.4124564 + gl * 0.3575761 + bl * 0.1804375;
    let y = rl * 0.2126729 + gl * 0.7151522 + bl * 0.0721750;
    let z = rl * 0.0193339 + gl * 0.1191920 + bl * 0.9503041;

    let fx = lab_f(x / WHITE_X);
    let fy = lab_f(y / WHITE_Y);
    let fz = lab_f(z / WHITE_Z);

    Lab {
        l: 116.0 * fy - 16.0,
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
        alpha: a as f64 / 255.0,
    }
}

/// CIEDE2000 perceptual color difference between two CIELAB colors. Alpha is
/// not part of the CIEDE2000 formula; callers that need alpha-awareness
/// (spec §4.6 color equality) should compare `.alpha` separately.
pub fn delta_e_2000(c1: Lab, c2: Lab) -> f64 {
    let (l1, a1, b1) = (c1.l, c1.a, c1.b);
    let (l2, a2, b2) = (c2.l, c2.a, c2.b);

    let c_bar = ((a1 * a1 + b1 * b1).sqrt() + (a2 * a2 + b2 * b2).sqrt()) / 2.0;
    let c_bar7 = c_bar.powi(7);
    let g = 0.5 * (1.0 - (c_bar7 / (c_bar7 + 25f64.powi(7))).sqrt());

    let a1p = a1 * (1.0 + g);
    let a2p = a2 * (1.0 + g);

    let c1p = (a1p * a1p + b1 * b1).sqrt();
    let c2p = (a2p * a2p + b2 * b2).sqrt();

    let h1p = if a1p == 0.0 && b1 == 0.0 { 0.0 } else { b1.atan2(a1p).to_degrees().rem_euclid(360.0) };
    let h2p = if a2p == 0.0 && b2 == 0.0 { 0.0 } else { b2.atan2(a2p).to_degrees().rem_euclid(360.0) };

    let delta_lp = l2 - l1;
    let delta_cp = c2p - c1p;

    let delta_hp = if c1p * c2p == 0.0 {
        0.0
    } else {
        let diff = h2p - h1p;
        if diff.abs() <= 180.0 {
            diff
        } else if diff > 180.0 {
            diff - 360.0
        } else {
            diff + 360.0
        }
    };
    let delta_hp_big = 2.0 * (c1p * c2p).sqrt() * (delta_hp.to_radians() / 2.0).sin();

    let l_bar_p = (l1 + l2) / 2.0;
    let c_bar_p = (c1p + c2p) / 2.0;

    let h_bar_p = if c1p * c2p == 0.0 {
        h1p + h2p
    } else if (h1p - h2p).abs() <= 180.0 {
        (h1p + h2p) / 2.0
    } else if h1p + h2p < 360.0 {
        (h1p + h2p + 360.0) / 2.0
    } else {
        (h1p + h2p - 360.0) / 2.0
    };

    let t = 1.0 - 0.17 * (h_bar_p - 30.0).to_radians().cos()
        + 0.24 * (2.0 * h_bar_p).to_radians().cos()
        + 0.32 * (3.0 * h_bar_p + 6.0).to_radians().cos()
        - 0.20 * (4.0 * h_bar_p - 63.0).to_radians().cos();

    let delta_theta = 30.0 * (-((h_bar_p - 275.0) / 25.0).powi(2)).exp();
    let c_bar_p7 = c_bar_p.powi(7);
    let r_c = 2.0 * (c_bar_p7 / (c_bar_p7 + 25f64.powi(7))).sqrt();
    let s_l = 1.0 + (0.015 * (l_bar_p - 50.0).powi(2)) / (20.0 + (l_bar_p - 50.0).powi(2)).sqrt();
    let s_c = 1.0 + 0.045 * c_bar_p;
    let s_h = 1.0 + 0.015 * c_bar_p * t;
    let r_t = -r_c * (2.0 * delta_theta.to_radians()).sin();

    let kl = 1.0;
    let kc = 1.0;
    let kh = 1.0;

    ((delta_lp / (kl * s_l)).powi(2)
        + (delta_cp / (kc * s_c)).powi(2)
        + (delta_hp_big / (kh * s_h)).powi(2)
        + r_t * (delta_cp / (kc * s_c)) * (delta_hp_big / (kh * s_h)))
        .sqrt()
}
