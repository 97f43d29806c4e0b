//! Buffer / buffer view / accessor graph describing a [`PackedBuffer`].
//!
//! The graph is a pure description. [`crate::glb_format`] wraps it into a
//! scene and writes the binary container.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;

use crate::attribute::{AttributeColumn, ColumnData};
use crate::error::{ConvertError, Result};
use crate::packer::PackedBuffer;

#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferDescriptor {
    pub byte_length: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferViewDescriptor {
    pub buffer: usize,
    pub byte_offset: usize,
    pub byte_length: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessorDescriptor {
    pub buffer_view: usize,
    pub byte_offset: usize,
    pub component_type: u32,
    pub count: usize,
    #[serde(rename = "type")]
    pub accessor_type: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub normalized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Vec<f64>>,
}

/// Semantic key to accessor index, kept in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeBindings(Vec<(String, usize)>);

impl AttributeBindings {
    pub fn insert(&mut self, key: String, accessor: usize) -> Result<()> {
        if self.get(&key).is_some() {
            return Err(ConvertError::Layout(format!(
                "attribute `{}` bound twice",
                key
            )));
        }
        self.0.push((key, accessor));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<usize> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, accessor)| *accessor)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for AttributeBindings {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, accessor) in &self.0 {
            map.serialize_entry(key, accessor)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerGraph {
    pub buffer: BufferDescriptor,
    pub buffer_views: Vec<BufferViewDescriptor>,
    pub accessors: Vec<AccessorDescriptor>,
    pub attributes: AttributeBindings,
}

/// Per-component minimum and maximum over all points. `None` when a bound is
/// not finite, which JSON cannot represent.
fn bounds(values: &[f32], arity: usize) -> Option<(Vec<f64>, Vec<f64>)> {
    let mut min = vec![f32::INFINITY; arity];
    let mut max = vec![f32::NEG_INFINITY; arity];
    for element in values.chunks_exact(arity) {
        for (k, &v) in element.iter().enumerate() {
            min[k] = min[k].min(v);
            max[k] = max[k].max(v);
        }
    }
    if min.iter().chain(&max).any(|v| !v.is_finite()) {
        return None;
    }
    Some((
        min.into_iter().map(f64::from).collect(),
        max.into_iter().map(f64::from).collect(),
    ))
}

fn layout_error(column: &AttributeColumn, message: String) -> ConvertError {
    ConvertError::Layout(format!("attribute `{}`: {}", column.semantic.key(), message))
}

pub fn build_container_graph(
    packed: &PackedBuffer,
    columns: &[AttributeColumn],
) -> Result<ContainerGraph> {
    let ranges = packed.ranges();
    if ranges.len() != columns.len() {
        return Err(ConvertError::Layout(format!(
            "{} byte ranges for {} attributes",
            ranges.len(),
            columns.len()
        )));
    }
    let point_count = columns.first().map(|c| c.count()).unwrap_or(0);

    let mut buffer_views = Vec::with_capacity(columns.len());
    let mut accessors = Vec::with_capacity(columns.len());
    let mut attributes = AttributeBindings::default();

    for (index, (column, range)) in columns.iter().zip(ranges).enumerate() {
        let kind = column.kind();
        let arity = kind.arity();
        if column.data.len() % arity != 0 {
            return Err(layout_error(
                column,
                format!("{} values do not form {}-wide elements", column.data.len(), arity),
            ));
        }
        if matches!(column.data, ColumnData::U8(_)) && !column.normalized() {
            return Err(layout_error(column, "8 bit data is only allowed for colors".into()));
        }
        let count = column.count();
        if count != point_count {
            return Err(layout_error(
                column,
                format!("{} points, expected {}", count, point_count),
            ));
        }
        let expected = count * kind.element_size();
        if range.length != expected {
            return Err(layout_error(
                column,
                format!(
                    "byte range is {} bytes, expected {} ({} x {} x {})",
                    range.length,
                    expected,
                    count,
                    arity,
                    kind.component_size()
                ),
            ));
        }
        if range.end() > packed.len() {
            return Err(layout_error(
                column,
                format!("byte range ends at {}, buffer is {} bytes", range.end(), packed.len()),
            ));
        }

        buffer_views.push(BufferViewDescriptor {
            buffer: 0,
            byte_offset: range.offset,
            byte_length: range.length,
        });

        let normalized = column.normalized();
        // normalized colors carry no bounds
        let (min, max) = match &column.data {
            ColumnData::F32(values) if !normalized => {
                let (min, max) = bounds(values, arity).ok_or_else(|| {
                    layout_error(column, "bounds are not finite".to_string())
                })?;
                (Some(min), Some(max))
            }
            _ => (None, None),
        };
        accessors.push(AccessorDescriptor {
            buffer_view: index,
            byte_offset: 0,
            component_type: kind.component_type(),
            count,
            accessor_type: kind.accessor_type().to_string(),
            normalized,
            min,
            max,
        });
        attributes.insert(column.semantic.key(), index)?;
    }

    Ok(ContainerGraph {
        buffer: BufferDescriptor {
            byte_length: packed.len(),
        },
        buffer_views,
        accessors,
        attributes,
    })
}
