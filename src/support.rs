use vek::Vec3;

use crate::error::{ConvertError, Result};

pub(crate) fn saturate(v: Vec3<f32>) -> Vec3<f32> {
    v.map(|c| c.clamp(0.0, 1.0))
}

/// Picks `kept` rows out of `values`. Indices must already be validated.
pub(crate) fn gather<T: Copy>(values: &[T], kept: &[usize]) -> Vec<T> {
    kept.iter().map(|&i| values[i]).collect()
}

/// Checks that a filter result is ascending, unique and within `[0, len)`.
pub(crate) fn validate_kept_indices(kept: &[usize], len: usize) -> Result<()> {
    if let Some(&last) = kept.last() {
        if last >= len {
            return Err(ConvertError::Filter(format!(
                "index {} out of range for {} points",
                last, len
            )));
        }
    }
    if kept.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ConvertError::Filter(
            "kept indices must be strictly ascending".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn pad_to_multiple(len: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        return 0;
    }
    (alignment - len % alignment) % alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_kept_indices() {
        assert!(validate_kept_indices(&[], 0).is_ok());
        assert!(validate_kept_indices(&[0, 2], 3).is_ok());
        assert!(validate_kept_indices(&[0, 3], 3).is_err());
        assert!(validate_kept_indices(&[2, 0], 3).is_err());
        assert!(validate_kept_indices(&[1, 1], 3).is_err());
    }

    #[test]
    fn test_padding() {
        assert_eq!(pad_to_multiple(12, 4), 0);
        assert_eq!(pad_to_multiple(13, 4), 3);
        assert_eq!(pad_to_multiple(15, 4), 1);
        assert_eq!(pad_to_multiple(13, 1), 0);
    }
}
