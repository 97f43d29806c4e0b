use vek::{Vec3, Vec4};

use crate::error::{ConvertError, Result};
use crate::spherical_harmonics::REST_TRIPLE_COUNT;
use crate::support::{gather, validate_kept_indices};

/// The columns every splat table must carry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequiredColumns {
    pub positions: Vec<Vec3<f32>>,
    /// Zeroth order spherical harmonics (`f_dc_0..2`).
    pub sh_dc: Vec<Vec3<f32>>,
    pub opacity: Vec<f32>,
    pub scales: Vec<Vec3<f32>>,
    /// `rot_0..3` in file order.
    pub rotations: Vec<Vec4<f32>>,
}

impl RequiredColumns {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            sh_dc: Vec::with_capacity(capacity),
            opacity: Vec::with_capacity(capacity),
            scales: Vec::with_capacity(capacity),
            rotations: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn select(&self, kept: &[usize]) -> Self {
        Self {
            positions: gather(&self.positions, kept),
            sh_dc: gather(&self.sh_dc, kept),
            opacity: gather(&self.opacity, kept),
            scales: gather(&self.scales, kept),
            rotations: gather(&self.rotations, kept),
        }
    }

    fn column_lengths(&self) -> [(&'static str, usize); 5] {
        [
            ("position", self.positions.len()),
            ("f_dc", self.sh_dc.len()),
            ("opacity", self.opacity.len()),
            ("scale", self.scales.len()),
            ("rotation", self.rotations.len()),
        ]
    }
}

/// Higher order spherical harmonics, `f_rest_0..44` grouped as 15 triples.
/// Triple `i` holds `f_rest_{3i}`, `f_rest_{3i+1}` and `f_rest_{3i+2}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedColumns {
    pub rest: [Vec<Vec3<f32>>; REST_TRIPLE_COUNT],
}

impl ExtendedColumns {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rest: std::array::from_fn(|_| Vec::with_capacity(capacity)),
        }
    }

    /// Appends the 45 coefficients of one point.
    pub fn push_scalars(&mut self, scalars: &[f32]) {
        for (column, triple) in self.rest.iter_mut().zip(scalars.chunks_exact(3)) {
            column.push(Vec3::new(triple[0], triple[1], triple[2]));
        }
    }

    /// One column per `f_rest_<n>` property, in property order.
    pub fn to_scalar_columns(&self) -> Vec<Vec<f32>> {
        self.rest
            .iter()
            .flat_map(|column| {
                (0..3).map(move |k| column.iter().map(|v| v[k]).collect::<Vec<f32>>())
            })
            .collect()
    }

    fn select(&self, kept: &[usize]) -> Self {
        Self {
            rest: std::array::from_fn(|i| gather(&self.rest[i], kept)),
        }
    }
}

/// A splat table with a fixed schema: the required group plus, optionally,
/// the complete higher order spherical harmonics group.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    pub required: RequiredColumns,
    pub extended: Option<ExtendedColumns>,
}

impl PointSet {
    /// Fails when the set is empty or columns disagree on length.
    pub fn new(required: RequiredColumns, extended: Option<ExtendedColumns>) -> Result<Self> {
        let count = required.len();
        if count == 0 {
            return Err(ConvertError::Schema("point table has no points".to_string()));
        }
        for (name, len) in required.column_lengths() {
            if len != count {
                return Err(ConvertError::Schema(format!(
                    "column `{}` has {} entries, expected {}",
                    name, len, count
                )));
            }
        }
        if let Some(extended) = &extended {
            if let Some((i, column)) = extended
                .rest
                .iter()
                .enumerate()
                .find(|(_, column)| column.len() != count)
            {
                return Err(ConvertError::Schema(format!(
                    "f_rest triple {} has {} entries, expected {}",
                    i,
                    column.len(),
                    count
                )));
            }
        }
        Ok(Self { required, extended })
    }

    pub fn len(&self) -> usize {
        self.required.len()
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    pub fn positions(&self) -> &[Vec3<f32>] {
        &self.required.positions
    }

    /// Returns a new set holding only the `kept` rows, in the given order.
    pub fn select(&self, kept: &[usize]) -> Result<Self> {
        validate_kept_indices(kept, self.len())?;
        Ok(Self {
            required: self.required.select(kept),
            extended: self.extended.as_ref().map(|e| e.select(kept)),
        })
    }
}
