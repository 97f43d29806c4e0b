use itertools::izip;
use log::debug;
use ply_rs::parser;
use ply_rs::ply;
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
    ScalarType,
};
use ply_rs::writer::Writer;
use std::io::{BufRead, Write};
use std::path::Path;
use vek::{Vec3, Vec4};

use crate::error::{ConvertError, Result};
use crate::point_set::{ExtendedColumns, PointSet, RequiredColumns};
use crate::spherical_harmonics::{rest_property_name, rest_scalar_index, REST_SCALAR_COUNT};

/// Properties a splat table must declare, in the order they are stored in [`VertexRecord`].
pub const REQUIRED_PROPERTIES: [&str; 14] = [
    "x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2", "opacity", "scale_0", "scale_1", "scale_2",
    "rot_0", "rot_1", "rot_2", "rot_3",
];

const VERTEX_ELEMENT: &str = "vertex";

/// One parsed vertex with every known property coerced to `f32`.
#[derive(Debug, Clone, Copy)]
pub struct VertexRecord {
    required: [f32; REQUIRED_PROPERTIES.len()],
    rest: [f32; REST_SCALAR_COUNT],
}

fn scalar_as_f32(property: &Property) -> Option<f32> {
    match *property {
        Property::Char(v) => Some(v as f32),
        Property::UChar(v) => Some(v as f32),
        Property::Short(v) => Some(v as f32),
        Property::UShort(v) => Some(v as f32),
        Property::Int(v) => Some(v as f32),
        Property::UInt(v) => Some(v as f32),
        Property::Float(v) => Some(v),
        Property::Double(v) => Some(v as f32),
        _ => None,
    }
}

fn required_slot(name: &str) -> Option<usize> {
    REQUIRED_PROPERTIES.iter().position(|&p| p == name)
}

impl ply::PropertyAccess for VertexRecord {
    fn new() -> Self {
        Self {
            required: [0.0; REQUIRED_PROPERTIES.len()],
            rest: [0.0; REST_SCALAR_COUNT],
        }
    }

    fn set_property(&mut self, property_name: String, property: ply::Property) {
        // lists and unknown scalars (normals, extra channels) are dropped
        let Some(value) = scalar_as_f32(&property) else {
            return;
        };
        if let Some(slot) = required_slot(&property_name) {
            self.required[slot] = value;
        } else if let Some(index) = rest_scalar_index(&property_name) {
            self.rest[index] = value;
        }
    }
}

/// The `vertex` element of a PLY file: its declared schema plus the parsed rows.
#[derive(Debug, Clone)]
pub struct VertexTable {
    pub property_names: Vec<String>,
    pub records: Vec<VertexRecord>,
}

impl VertexTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn declares(&self, name: &str) -> bool {
        self.property_names.iter().any(|p| p == name)
    }

    pub fn required_columns(&self) -> Result<RequiredColumns> {
        let missing: Vec<&str> = REQUIRED_PROPERTIES
            .iter()
            .copied()
            .filter(|name| !self.declares(name))
            .collect();
        if !missing.is_empty() {
            return Err(ConvertError::Schema(format!(
                "missing required properties: {}",
                missing.join(", ")
            )));
        }
        if self.records.is_empty() {
            return Err(ConvertError::Schema("point table has no points".to_string()));
        }

        let mut columns = RequiredColumns::with_capacity(self.records.len());
        for record in &self.records {
            let v = &record.required;
            columns.positions.push(Vec3::new(v[0], v[1], v[2]));
            columns.sh_dc.push(Vec3::new(v[3], v[4], v[5]));
            columns.opacity.push(v[6]);
            columns.scales.push(Vec3::new(v[7], v[8], v[9]));
            columns.rotations.push(Vec4::new(v[10], v[11], v[12], v[13]));
        }
        Ok(columns)
    }

    /// Higher order coefficients. Fails with `AttributeGroupMissing` unless all
    /// 45 `f_rest_*` properties are declared.
    pub fn rest_columns(&self) -> Result<ExtendedColumns> {
        let mut declared = [false; REST_SCALAR_COUNT];
        for index in self.property_names.iter().filter_map(|p| rest_scalar_index(p)) {
            declared[index] = true;
        }
        let found = declared.iter().filter(|&&d| d).count();
        if found != REST_SCALAR_COUNT {
            return Err(ConvertError::AttributeGroupMissing {
                group: "f_rest",
                reason: format!("{} of {} properties declared", found, REST_SCALAR_COUNT),
            });
        }

        let mut columns = ExtendedColumns::with_capacity(self.records.len());
        for record in &self.records {
            columns.push_scalars(&record.rest);
        }
        Ok(columns)
    }
}

pub fn read_vertex_table<T: BufRead>(stream: &mut T) -> Result<VertexTable> {
    let vertex_parser = parser::Parser::<VertexRecord>::new();
    let header = vertex_parser.read_header(stream)?;
    let mut table = None;
    for (_ignore_key, element) in &header.elements {
        match element.name.as_ref() {
            VERTEX_ELEMENT => {
                let records = vertex_parser.read_payload_for_element(stream, element, &header)?;
                // list properties never fill a column, so they do not count as declared
                let property_names = element
                    .properties
                    .values()
                    .filter(|p| matches!(p.data_type, PropertyType::Scalar(_)))
                    .map(|p| p.name.clone())
                    .collect();
                table = Some(VertexTable {
                    property_names,
                    records,
                });
            }
            other => {
                debug!("Skipping element `{}` ({} entries)", other, element.count);
                let skip_parser = parser::Parser::<DefaultElement>::new();
                skip_parser.read_payload_for_element(stream, element, &header)?;
            }
        }
    }
    table.ok_or_else(|| ConvertError::Schema("no `vertex` element".to_string()))
}

pub fn load_point_set_stream<T: BufRead>(stream: &mut T) -> Result<PointSet> {
    let table = read_vertex_table(stream)?;
    let required = table.required_columns()?;
    let extended = match table.rest_columns() {
        Ok(extended) => Some(extended),
        Err(ConvertError::AttributeGroupMissing { group, reason }) => {
            debug!("No higher order spherical harmonics ({}: {})", group, reason);
            None
        }
        Err(e) => return Err(e),
    };
    PointSet::new(required, extended)
}

pub fn load_point_set(path: &Path) -> Result<PointSet> {
    let file = std::fs::File::open(path)?;
    let mut stream = std::io::BufReader::new(file);
    load_point_set_stream(&mut stream)
}

/// Columns of the reduced output table. `rest` holds one column per `f_rest_<n>`
/// property and must contain all 45 of them when present.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutputTable {
    pub positions: Vec<Vec3<f32>>,
    pub colors: Vec<Vec3<u8>>,
    pub opacity: Vec<f32>,
    pub scales: Vec<Vec3<f32>>,
    pub rotations: Vec<Vec4<f32>>,
    pub rest: Option<Vec<Vec<f32>>>,
}

impl OutputTable {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        let count = self.len();
        if count == 0 {
            return Err(ConvertError::Schema("point table has no points".to_string()));
        }
        let lengths = [
            ("color", self.colors.len()),
            ("opacity", self.opacity.len()),
            ("scale", self.scales.len()),
            ("rotation", self.rotations.len()),
        ];
        for (name, len) in lengths {
            if len != count {
                return Err(ConvertError::Schema(format!(
                    "column `{}` has {} entries, expected {}",
                    name, len, count
                )));
            }
        }
        if let Some(rest) = &self.rest {
            if rest.len() != REST_SCALAR_COUNT {
                return Err(ConvertError::Schema(format!(
                    "f_rest group must have {} columns, got {}",
                    REST_SCALAR_COUNT,
                    rest.len()
                )));
            }
            if let Some(i) = rest.iter().position(|column| column.len() != count) {
                return Err(ConvertError::Schema(format!(
                    "column `{}` has {} entries, expected {}",
                    rest_property_name(i),
                    rest[i].len(),
                    count
                )));
            }
        }
        Ok(())
    }
}

const FLOAT_PROPERTIES: [&str; 8] = [
    "opacity", "scale_0", "scale_1", "scale_2", "rot_0", "rot_1", "rot_2", "rot_3",
];
const COLOR_PROPERTIES: [&str; 3] = ["red", "green", "blue"];
const POSITION_PROPERTIES: [&str; 3] = ["x", "y", "z"];

fn scalar_property(name: &str, scalar: ScalarType) -> PropertyDef {
    PropertyDef::new(name.to_string(), PropertyType::Scalar(scalar))
}

pub fn write_vertex_table_stream<W: Write>(table: &OutputTable, stream: &mut W) -> Result<()> {
    table.validate()?;

    let mut ply = {
        let mut ply = Ply::<DefaultElement>::new();
        ply.header.encoding = Encoding::BinaryLittleEndian;

        let mut element = ElementDef::new(VERTEX_ELEMENT.to_string());
        for name in POSITION_PROPERTIES {
            element.properties.add(scalar_property(name, ScalarType::Float));
        }
        for name in COLOR_PROPERTIES {
            element.properties.add(scalar_property(name, ScalarType::UChar));
        }
        for name in FLOAT_PROPERTIES {
            element.properties.add(scalar_property(name, ScalarType::Float));
        }
        let rest_names: Vec<String> = match &table.rest {
            Some(rest) => (0..rest.len()).map(rest_property_name).collect(),
            None => Vec::new(),
        };
        for name in &rest_names {
            element.properties.add(scalar_property(name, ScalarType::Float));
        }
        ply.header.elements.add(element);

        let mut records = Vec::with_capacity(table.len());
        for (row, (position, color, opacity, scale, rotation)) in izip!(
            &table.positions,
            &table.colors,
            &table.opacity,
            &table.scales,
            &table.rotations
        )
        .enumerate()
        {
            let mut record = DefaultElement::new();
            for (name, v) in POSITION_PROPERTIES.iter().zip(position.iter()) {
                record.insert(name.to_string(), Property::Float(*v));
            }
            for (name, v) in COLOR_PROPERTIES.iter().zip(color.iter()) {
                record.insert(name.to_string(), Property::UChar(*v));
            }
            let floats = [
                *opacity, scale.x, scale.y, scale.z, rotation.x, rotation.y, rotation.z,
                rotation.w,
            ];
            for (name, v) in FLOAT_PROPERTIES.iter().zip(floats) {
                record.insert(name.to_string(), Property::Float(v));
            }
            if let Some(rest) = &table.rest {
                for (name, column) in rest_names.iter().zip(rest) {
                    record.insert(name.clone(), Property::Float(column[row]));
                }
            }
            records.push(record);
        }

        ply.payload.insert(VERTEX_ELEMENT.to_string(), records);
        ply
    };

    let w = Writer::new();
    w.write_ply(stream, &mut ply)?;
    Ok(())
}

/// Validates and serializes in memory first, the file is only created on success.
pub fn write_vertex_table(table: &OutputTable, path: &Path) -> Result<()> {
    let mut bytes = Vec::new();
    write_vertex_table_stream(table, &mut bytes)?;
    std::fs::write(path, bytes)?;
    Ok(())
}
