use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use vek::Vec3;

use crate::support::saturate;

// ---- Spherical Harmonics ----

#[allow(clippy::excessive_precision)]
pub const SH_C0: f32 = 0.282_094_791_773_878_14;

/// Number of `f_rest_*` scalars stored for degree 3 spherical harmonics.
pub const REST_SCALAR_COUNT: usize = 45;
/// `f_rest_*` scalars grouped in consecutive triples.
pub const REST_TRIPLE_COUNT: usize = REST_SCALAR_COUNT / 3;

pub fn rest_property_name(scalar_index: usize) -> String {
    format!("f_rest_{}", scalar_index)
}

/// Parses the scalar index out of an `f_rest_<n>` property name.
pub fn rest_scalar_index(name: &str) -> Option<usize> {
    name.strip_prefix("f_rest_")?
        .parse()
        .ok()
        .filter(|&i| i < REST_SCALAR_COUNT)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    /// 32 bit float triples in `[0, 1]`.
    Precision,
    /// 8 bit triples, consumers rescale them back to `[0, 1]`.
    Compact,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColorColumn {
    Precision(Vec<Vec3<f32>>),
    Compact(Vec<Vec3<u8>>),
}

impl ColorColumn {
    pub fn len(&self) -> usize {
        match self {
            ColorColumn::Precision(colors) => colors.len(),
            ColorColumn::Compact(colors) => colors.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Diffuse color for the zeroth order coefficient, clamped to `[0, 1]`.
pub fn sh0_to_color(sh0: Vec3<f32>) -> Vec3<f32> {
    saturate(Vec3::broadcast(0.5) + sh0 * SH_C0)
}

/// Truncates to 8 bits, `0.5` maps to `127`.
pub fn quantize_color(color: Vec3<f32>) -> Vec3<u8> {
    color.map(|c| (c * 255.0) as u8)
}

pub fn compact_colors(sh0: &[Vec3<f32>]) -> Vec<Vec3<u8>> {
    sh0.par_iter()
        .map(|&v| quantize_color(sh0_to_color(v)))
        .collect()
}

pub fn compute_colors(sh0: &[Vec3<f32>], mode: ColorMode) -> ColorColumn {
    match mode {
        ColorMode::Precision => {
            ColorColumn::Precision(sh0.par_iter().map(|&v| sh0_to_color(v)).collect())
        }
        ColorMode::Compact => ColorColumn::Compact(compact_colors(sh0)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_zero_coefficient_is_mid_grey() {
        assert_eq!(sh0_to_color(Vec3::zero()), Vec3::broadcast(0.5));
        assert_eq!(
            compute_colors(&[Vec3::zero()], ColorMode::Compact),
            ColorColumn::Compact(vec![Vec3::broadcast(127)])
        );
    }

    #[test]
    fn test_truncating_quantization() {
        // 0.999 * 255 = 254.745, rounding would give 255
        assert_eq!(quantize_color(Vec3::broadcast(0.999)), Vec3::broadcast(254));
        assert_eq!(quantize_color(Vec3::one()), Vec3::broadcast(255));
        assert_eq!(quantize_color(Vec3::zero()), Vec3::broadcast(0));
    }

    #[test]
    fn test_clamping() {
        let color = sh0_to_color(Vec3::new(10.0, -10.0, 1.0));
        assert_eq!(color.x, 1.0);
        assert_eq!(color.y, 0.0);
        assert_relative_eq!(color.z, 0.782_094_8, epsilon = 1e-6);
    }

    #[test]
    fn test_rest_names() {
        assert_eq!(rest_property_name(7), "f_rest_7");
        assert_eq!(rest_scalar_index("f_rest_44"), Some(44));
        assert_eq!(rest_scalar_index("f_rest_45"), None);
        assert_eq!(rest_scalar_index("f_dc_0"), None);
        assert_eq!(rest_scalar_index("f_rest_x"), None);
    }

    proptest! {
        #[test]
        fn precision_colors_stay_in_unit_range(r in -1e6f32..1e6, g in -1e6f32..1e6, b in -1e6f32..1e6) {
            let color = sh0_to_color(Vec3::new(r, g, b));
            for c in color.iter() {
                prop_assert!((0.0..=1.0).contains(c));
            }
        }

        #[test]
        fn compact_colors_match_truncated_precision(r in -5f32..5.0, g in -5f32..5.0, b in -5f32..5.0) {
            let sh0 = [Vec3::new(r, g, b)];
            let precise = sh0_to_color(sh0[0]);
            let compact = compact_colors(&sh0)[0];
            prop_assert_eq!(compact, precise.map(|c| (c * 255.0).floor() as u8));
        }
    }
}
