use vek::{Vec3, Vec4};

use crate::spherical_harmonics::ColorColumn;

pub const COMPONENT_TYPE_UNSIGNED_BYTE: u32 = 5121;
pub const COMPONENT_TYPE_FLOAT: u32 = 5126;

/// Semantic role of a packed column. Decides the binding key and the vector arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Semantic {
    Position,
    Color,
    Opacity,
    Scale,
    Rotation,
    /// Higher order spherical harmonics triple `0..15`.
    Rest(usize),
}

impl Semantic {
    pub fn key(&self) -> String {
        match self {
            Semantic::Position => "POSITION".to_string(),
            Semantic::Color => "COLOR_0".to_string(),
            Semantic::Opacity => "_OPACITY".to_string(),
            Semantic::Scale => "_SCALE".to_string(),
            Semantic::Rotation => "_ROTATION".to_string(),
            Semantic::Rest(i) => format!("_FREST{}", i),
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Semantic::Opacity => 1,
            Semantic::Rotation => 4,
            Semantic::Position | Semantic::Color | Semantic::Scale | Semantic::Rest(_) => 3,
        }
    }
}

/// Wire representation of one column element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    F32(usize),
    U8(usize),
}

impl ComponentKind {
    pub fn arity(&self) -> usize {
        match *self {
            ComponentKind::F32(arity) | ComponentKind::U8(arity) => arity,
        }
    }

    pub fn component_size(&self) -> usize {
        match self {
            ComponentKind::F32(_) => std::mem::size_of::<f32>(),
            ComponentKind::U8(_) => std::mem::size_of::<u8>(),
        }
    }

    pub fn element_size(&self) -> usize {
        self.arity() * self.component_size()
    }

    pub fn component_type(&self) -> u32 {
        match self {
            ComponentKind::F32(_) => COMPONENT_TYPE_FLOAT,
            ComponentKind::U8(_) => COMPONENT_TYPE_UNSIGNED_BYTE,
        }
    }

    pub fn accessor_type(&self) -> &'static str {
        match self.arity() {
            1 => "SCALAR",
            2 => "VEC2",
            3 => "VEC3",
            _ => "VEC4",
        }
    }
}

/// Flattened, row-major column values.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    F32(Vec<f32>),
    U8(Vec<u8>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::F32(values) => values.len(),
            ColumnData::U8(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Little endian bytes, exactly `len() * component size` long.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            ColumnData::F32(values) => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            ColumnData::U8(values) => values.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeColumn {
    pub semantic: Semantic,
    pub data: ColumnData,
}

impl AttributeColumn {
    pub fn new(semantic: Semantic, data: ColumnData) -> Self {
        Self { semantic, data }
    }

    pub fn from_scalars(semantic: Semantic, values: &[f32]) -> Self {
        Self::new(semantic, ColumnData::F32(values.to_vec()))
    }

    pub fn from_vec3(semantic: Semantic, values: &[Vec3<f32>]) -> Self {
        let data = values.iter().flat_map(|v| v.into_array()).collect();
        Self::new(semantic, ColumnData::F32(data))
    }

    pub fn from_vec4(semantic: Semantic, values: &[Vec4<f32>]) -> Self {
        let data = values.iter().flat_map(|v| v.into_array()).collect();
        Self::new(semantic, ColumnData::F32(data))
    }

    pub fn from_colors(colors: &ColorColumn) -> Self {
        match colors {
            ColorColumn::Precision(colors) => Self::from_vec3(Semantic::Color, colors),
            ColorColumn::Compact(colors) => {
                let data = colors.iter().flat_map(|v| v.into_array()).collect();
                Self::new(Semantic::Color, ColumnData::U8(data))
            }
        }
    }

    pub fn kind(&self) -> ComponentKind {
        let arity = self.semantic.arity();
        match self.data {
            ColumnData::F32(_) => ComponentKind::F32(arity),
            ColumnData::U8(_) => ComponentKind::U8(arity),
        }
    }

    /// Only 8 bit colors are stored normalized.
    pub fn normalized(&self) -> bool {
        self.semantic == Semantic::Color && matches!(self.data, ColumnData::U8(_))
    }

    /// Number of points, rounded down when the data is ragged.
    pub fn count(&self) -> usize {
        self.data.len() / self.semantic.arity()
    }

    pub fn byte_length(&self) -> usize {
        self.data.len() * self.kind().component_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semantic_keys() {
        assert_eq!(Semantic::Position.key(), "POSITION");
        assert_eq!(Semantic::Color.key(), "COLOR_0");
        assert_eq!(Semantic::Opacity.key(), "_OPACITY");
        assert_eq!(Semantic::Scale.key(), "_SCALE");
        assert_eq!(Semantic::Rotation.key(), "_ROTATION");
        assert_eq!(Semantic::Rest(14).key(), "_FREST14");
    }

    #[test]
    fn test_component_kind() {
        let kind = ComponentKind::U8(3);
        assert_eq!(kind.element_size(), 3);
        assert_eq!(kind.component_type(), COMPONENT_TYPE_UNSIGNED_BYTE);
        assert_eq!(kind.accessor_type(), "VEC3");
        let kind = ComponentKind::F32(4);
        assert_eq!(kind.element_size(), 16);
        assert_eq!(kind.component_type(), COMPONENT_TYPE_FLOAT);
        assert_eq!(kind.accessor_type(), "VEC4");
        assert_eq!(ComponentKind::F32(1).accessor_type(), "SCALAR");
    }

    #[test]
    fn test_columns() {
        let rotation = AttributeColumn::from_vec4(
            Semantic::Rotation,
            &[Vec4::new(1.0, 2.0, 3.0, 4.0), Vec4::new(5.0, 6.0, 7.0, 8.0)],
        );
        assert_eq!(rotation.kind(), ComponentKind::F32(4));
        assert_eq!(rotation.count(), 2);
        assert_eq!(rotation.byte_length(), 32);
        assert!(!rotation.normalized());

        let colors = AttributeColumn::from_colors(&ColorColumn::Compact(vec![
            Vec3::new(1, 2, 3),
            Vec3::new(4, 5, 6),
        ]));
        assert_eq!(colors.data, ColumnData::U8(vec![1, 2, 3, 4, 5, 6]));
        assert_eq!(colors.kind(), ComponentKind::U8(3));
        assert!(colors.normalized());
        assert_eq!(colors.byte_length(), 6);
    }

    #[test]
    fn test_little_endian_bytes() {
        let data = ColumnData::F32(vec![1.0, -2.5]);
        let bytes = data.to_le_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(-2.5f32).to_le_bytes());
    }
}
