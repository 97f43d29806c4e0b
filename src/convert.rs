use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::attribute::{AttributeColumn, Semantic};
use crate::error::Result;
use crate::glb_format::GlbDocument;
use crate::gltf_graph::build_container_graph;
use crate::outlier_filter::PointFilter;
use crate::packer::pack_attributes;
use crate::ply_format::{load_point_set, write_vertex_table, OutputTable};
use crate::point_set::PointSet;
use crate::spherical_harmonics::{compact_colors, compute_colors, ColorColumn, ColorMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Include scale, rotation and the higher order spherical harmonics.
    pub extended_attributes: bool,
    /// Quantize colors to 8 bits and mark them normalized.
    pub compact_color: bool,
    pub denoise: bool,
    pub neighbor_count: usize,
    pub std_ratio: f32,
    /// Start every buffer view on a 4 byte boundary.
    pub align_buffer_views: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            extended_attributes: false,
            compact_color: false,
            denoise: false,
            neighbor_count: 200,
            std_ratio: 2.0,
            align_buffer_views: true,
        }
    }
}

impl ConvertOptions {
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn color_mode(&self) -> ColorMode {
        if self.compact_color {
            ColorMode::Compact
        } else {
            ColorMode::Precision
        }
    }

    fn alignment(&self) -> usize {
        if self.align_buffer_views {
            4
        } else {
            1
        }
    }
}

/// Applies the optional point filter to every column.
pub fn filter_points(
    points: &PointSet,
    options: &ConvertOptions,
    filter: Option<&dyn PointFilter>,
) -> Result<PointSet> {
    match filter {
        Some(filter) if options.denoise => {
            let kept = filter.filter(points.positions(), options.neighbor_count, options.std_ratio)?;
            info!("Denoising kept {} of {} points", kept.len(), points.len());
            points.select(&kept)
        }
        None if options.denoise => {
            warn!("Denoising requested without a point filter, keeping all points");
            Ok(points.clone())
        }
        _ => Ok(points.clone()),
    }
}

/// Columns in container order: position, color, opacity, then optionally
/// scale, rotation and the 15 `f_rest` triples.
pub fn attribute_columns(
    points: &PointSet,
    colors: &ColorColumn,
    extended_attributes: bool,
) -> Vec<AttributeColumn> {
    let required = &points.required;
    let mut columns = vec![
        AttributeColumn::from_vec3(Semantic::Position, &required.positions),
        AttributeColumn::from_colors(colors),
        AttributeColumn::from_scalars(Semantic::Opacity, &required.opacity),
    ];
    if extended_attributes {
        columns.push(AttributeColumn::from_vec3(Semantic::Scale, &required.scales));
        columns.push(AttributeColumn::from_vec4(
            Semantic::Rotation,
            &required.rotations,
        ));
        match &points.extended {
            Some(extended) => {
                for (i, triple) in extended.rest.iter().enumerate() {
                    columns.push(AttributeColumn::from_vec3(Semantic::Rest(i), triple));
                }
            }
            None => warn!("No f_rest coefficients in input, writing scale and rotation only"),
        }
    }
    columns
}

pub fn convert_to_glb(
    points: &PointSet,
    options: &ConvertOptions,
    filter: Option<&dyn PointFilter>,
) -> Result<GlbDocument> {
    let points = filter_points(points, options, filter)?;
    let colors = compute_colors(&points.required.sh_dc, options.color_mode());
    let columns = attribute_columns(&points, &colors, options.extended_attributes);
    let packed = pack_attributes(&columns, options.alignment())?;
    let graph = build_container_graph(&packed, &columns)?;
    info!(
        "Packed {} points into {} accessors ({} bytes)",
        points.len(),
        graph.accessors.len(),
        packed.len()
    );
    GlbDocument::new(graph, packed)
}

/// The reduced table always carries 8 bit colors. `f_rest` is kept only with
/// `extended_attributes` and when the input has it.
pub fn convert_to_ply(
    points: &PointSet,
    options: &ConvertOptions,
    filter: Option<&dyn PointFilter>,
) -> Result<OutputTable> {
    let points = filter_points(points, options, filter)?;
    let colors = compact_colors(&points.required.sh_dc);
    let rest = if options.extended_attributes {
        points.extended.as_ref().map(|e| e.to_scalar_columns())
    } else {
        None
    };
    let required = points.required;
    Ok(OutputTable {
        positions: required.positions,
        colors,
        opacity: required.opacity,
        scales: required.scales,
        rotations: required.rotations,
        rest,
    })
}

pub fn convert_to_glb_file(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
    filter: Option<&dyn PointFilter>,
) -> Result<()> {
    let points = load_point_set(input)?;
    info!("Read {} points from {}", points.len(), input.display());
    let glb = convert_to_glb(&points, options, filter)?.to_glb()?;
    std::fs::write(output, &glb)?;
    info!("Wrote {} bytes to {}", glb.len(), output.display());
    Ok(())
}

pub fn convert_to_ply_file(
    input: &Path,
    output: &Path,
    options: &ConvertOptions,
    filter: Option<&dyn PointFilter>,
) -> Result<()> {
    let points = load_point_set(input)?;
    info!("Read {} points from {}", points.len(), input.display());
    let table = convert_to_ply(&points, options, filter)?;
    write_vertex_table(&table, output)?;
    info!("Wrote {} points to {}", table.len(), output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{ColumnData, ComponentKind, COMPONENT_TYPE_UNSIGNED_BYTE};
    use crate::error::ConvertError;
    use crate::glb_format::read_glb;
    use crate::packer::unpack_range;
    use crate::packer::ByteRange;
    use crate::ply_format::load_point_set_stream;
    use crate::point_set::tests::sample_point_set;
    use vek::Vec3;

    /// Keeps a fixed index set regardless of the coordinates.
    struct FixedFilter(Vec<usize>);

    impl PointFilter for FixedFilter {
        fn filter(&self, _: &[Vec3<f32>], _: usize, _: f32) -> Result<Vec<usize>> {
            Ok(self.0.clone())
        }
    }

    const FOUR_POINTS: &str = r#"ply
format ascii 1.0
element vertex 4
property float x
property float y
property float z
property float f_dc_0
property float f_dc_1
property float f_dc_2
property float opacity
property float scale_0
property float scale_1
property float scale_2
property float rot_0
property float rot_1
property float rot_2
property float rot_3
end_header
0 0 0 0 0 0 0.1 -1 -1 -1 1 0 0 0
1 0 0 0 0 0 0.2 -2 -2 -2 1 0 0 0
0 1 0 0 0 0 0.3 -3 -3 -3 1 0 0 0
0 0 1 0 0 0 0.4 -4 -4 -4 1 0 0 0
"#;

    fn view_range(json: &serde_json::Value, accessor: usize) -> ByteRange {
        let view = &json["bufferViews"][json["accessors"][accessor]["bufferView"]
            .as_u64()
            .unwrap() as usize];
        ByteRange {
            offset: view["byteOffset"].as_u64().unwrap() as usize,
            length: view["byteLength"].as_u64().unwrap() as usize,
        }
    }

    #[test]
    fn test_four_point_compact_scene() {
        let points = load_point_set_stream(&mut FOUR_POINTS.as_bytes()).unwrap();
        let options = ConvertOptions {
            extended_attributes: false,
            compact_color: true,
            ..ConvertOptions::default()
        };
        let glb = convert_to_glb(&points, &options, None)
            .unwrap()
            .to_glb()
            .unwrap();
        let container = read_glb(&glb).unwrap();
        let json = &container.json;

        assert_eq!(json["asset"]["version"], "2.0");
        let accessors = json["accessors"].as_array().unwrap();
        assert_eq!(accessors.len(), 3);
        let attributes = json["meshes"][0]["primitives"][0]["attributes"]
            .as_object()
            .unwrap();
        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes["POSITION"], 0);
        assert_eq!(attributes["COLOR_0"], 1);
        assert_eq!(attributes["_OPACITY"], 2);

        let color = &accessors[1];
        assert_eq!(color["componentType"], COMPONENT_TYPE_UNSIGNED_BYTE);
        assert_eq!(color["normalized"], true);
        assert!(color.get("min").is_none() && color.get("max").is_none());

        let colors = unpack_range(&container.binary, view_range(json, 1), ComponentKind::U8(3))
            .unwrap();
        assert_eq!(colors, ColumnData::U8(vec![127; 12]));

        let opacity = unpack_range(&container.binary, view_range(json, 2), ComponentKind::F32(1))
            .unwrap();
        assert_eq!(opacity, ColumnData::F32(vec![0.1, 0.2, 0.3, 0.4]));
        assert_eq!(view_range(json, 2).offset % 4, 0);
    }

    #[test]
    fn test_extended_attribute_order() {
        let points = sample_point_set(3, true);
        let options = ConvertOptions {
            extended_attributes: true,
            ..ConvertOptions::default()
        };
        let document = convert_to_glb(&points, &options, None).unwrap();
        let graph = document.graph();
        assert_eq!(graph.accessors.len(), 5 + 15);
        let keys: Vec<&str> = graph.attributes.keys().collect();
        assert_eq!(&keys[..5], ["POSITION", "COLOR_0", "_OPACITY", "_SCALE", "_ROTATION"]);
        assert_eq!(keys[5], "_FREST0");
        assert_eq!(keys[19], "_FREST14");
        assert_eq!(graph.accessors[4].accessor_type, "VEC4");
        assert_eq!(graph.accessors[1].component_type, 5126);
        for view in graph.buffer_views.windows(2) {
            assert_eq!(view[0].byte_offset + view[0].byte_length, view[1].byte_offset);
        }
    }

    #[test]
    fn test_extended_without_rest_group() {
        let points = sample_point_set(2, false);
        let options = ConvertOptions {
            extended_attributes: true,
            ..ConvertOptions::default()
        };
        let document = convert_to_glb(&points, &options, None).unwrap();
        assert_eq!(document.graph().accessors.len(), 5);
    }

    #[test]
    fn test_deterministic_output() {
        let points = sample_point_set(6, true);
        let options = ConvertOptions {
            extended_attributes: true,
            compact_color: true,
            ..ConvertOptions::default()
        };
        let a = convert_to_glb(&points, &options, None).unwrap();
        let b = convert_to_glb(&points, &options, None).unwrap();
        assert_eq!(a.to_glb().unwrap(), b.to_glb().unwrap());
        assert_eq!(a.graph().accessors, b.graph().accessors);
    }

    #[test]
    fn test_unaligned_layout_is_back_to_back() {
        let points = sample_point_set(5, false);
        let options = ConvertOptions {
            compact_color: true,
            align_buffer_views: false,
            ..ConvertOptions::default()
        };
        let document = convert_to_glb(&points, &options, None).unwrap();
        let views = &document.graph().buffer_views;
        assert_eq!(views[1].byte_offset, 60);
        assert_eq!(views[2].byte_offset, 75);
        assert_eq!(document.binary().len(), 95);
    }

    #[test]
    fn test_filter_subsets_every_column() {
        let points = sample_point_set(3, true);
        let options = ConvertOptions {
            extended_attributes: true,
            denoise: true,
            ..ConvertOptions::default()
        };
        let filter = FixedFilter(vec![0, 2]);
        let table = convert_to_ply(&points, &options, Some(&filter)).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.positions,
            vec![points.required.positions[0], points.required.positions[2]]
        );
        assert_eq!(table.opacity, vec![0.0, 0.5]);
        assert_eq!(
            table.scales,
            vec![points.required.scales[0], points.required.scales[2]]
        );
        assert_eq!(
            table.rotations,
            vec![points.required.rotations[0], points.required.rotations[2]]
        );
        let all_colors = compact_colors(&points.required.sh_dc);
        let expected_colors = vec![all_colors[0], all_colors[2]];
        assert_eq!(table.colors, expected_colors);
        let rest = table.rest.unwrap();
        assert_eq!(rest.len(), 45);
        assert_eq!(rest[3], vec![3.0, 203.0]);

        let document = convert_to_glb(&points, &options, Some(&filter)).unwrap();
        assert!(document.graph().accessors.iter().all(|a| a.count == 2));
    }

    #[test]
    fn test_filter_is_ignored_unless_denoising() {
        let points = sample_point_set(3, false);
        let filter = FixedFilter(vec![1]);
        let table = convert_to_ply(&points, &ConvertOptions::default(), Some(&filter)).unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.rest.is_none());
    }

    #[test]
    fn test_bad_filter_result_is_rejected() {
        let points = sample_point_set(3, false);
        let options = ConvertOptions {
            denoise: true,
            ..ConvertOptions::default()
        };
        let filter = FixedFilter(vec![2, 5]);
        assert!(matches!(
            convert_to_glb(&points, &options, Some(&filter)),
            Err(ConvertError::Filter(_))
        ));
    }

    #[test]
    fn test_filter_removing_everything_is_empty_input() {
        let points = sample_point_set(3, false);
        let options = ConvertOptions {
            denoise: true,
            ..ConvertOptions::default()
        };
        let filter = FixedFilter(Vec::new());
        assert!(matches!(
            convert_to_glb(&points, &options, Some(&filter)),
            Err(ConvertError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_options_from_json() {
        let options: ConvertOptions =
            serde_json::from_str(r#"{"compact_color": true, "neighbor_count": 20}"#).unwrap();
        assert!(options.compact_color);
        assert_eq!(options.neighbor_count, 20);
        assert_eq!(options.std_ratio, 2.0);
        assert!(options.align_buffer_views);
    }

    #[test]
    fn test_failed_conversion_writes_nothing() {
        let dir = std::env::temp_dir().join(format!("splat-glb-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("missing-opacity.ply");
        let output = dir.join("out.glb");
        std::fs::write(&input, FOUR_POINTS.replace("property float opacity\n", "")).unwrap();
        let result = convert_to_glb_file(&input, &output, &ConvertOptions::default(), None);
        assert!(result.is_err());
        assert!(!output.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
