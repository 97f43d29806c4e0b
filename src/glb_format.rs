use bytemuck::{Pod, Zeroable};
use serde::Serialize;

use crate::error::{ConvertError, Result};
use crate::gltf_graph::{
    AccessorDescriptor, AttributeBindings, BufferDescriptor, BufferViewDescriptor, ContainerGraph,
};
use crate::packer::PackedBuffer;
use crate::support::pad_to_multiple;

pub const GLB_MAGIC: u32 = 0x46546C67; // "glTF"
pub const GLB_VERSION: u32 = 2;
pub const GLB_CHUNK_JSON: u32 = 0x4E4F534A; // "JSON"
pub const GLB_CHUNK_BIN: u32 = 0x004E4942; // "BIN\0"
pub const GLTF_ASSET_VERSION: &str = "2.0";
const PRIMITIVE_MODE_POINTS: u32 = 0;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct GlbHeader {
    pub magic: u32,
    pub version: u32,
    pub length: u32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct GlbChunkHeader {
    pub length: u32,
    pub chunk_type: u32,
}

impl GlbHeader {
    pub fn new(length: u32) -> Self {
        Self {
            magic: GLB_MAGIC,
            version: GLB_VERSION,
            length,
        }
    }

    /// Fields are stored little endian on disk.
    fn swap_le(self) -> Self {
        Self {
            magic: self.magic.to_le(),
            version: self.version.to_le(),
            length: self.length.to_le(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == GLB_MAGIC && self.version == GLB_VERSION
    }
}

impl GlbChunkHeader {
    fn swap_le(self) -> Self {
        Self {
            length: self.length.to_le(),
            chunk_type: self.chunk_type.to_le(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Asset {
    version: &'static str,
    generator: &'static str,
}

#[derive(Debug, Serialize)]
struct SceneOut {
    nodes: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct NodeOut {
    mesh: usize,
}

#[derive(Debug, Serialize)]
struct PrimitiveOut<'a> {
    attributes: &'a AttributeBindings,
    mode: u32,
}

#[derive(Debug, Serialize)]
struct MeshOut<'a> {
    primitives: Vec<PrimitiveOut<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GltfRoot<'a> {
    asset: Asset,
    scene: usize,
    scenes: Vec<SceneOut>,
    nodes: Vec<NodeOut>,
    meshes: Vec<MeshOut<'a>>,
    buffers: Vec<&'a BufferDescriptor>,
    buffer_views: &'a [BufferViewDescriptor],
    accessors: &'a [AccessorDescriptor],
}

/// A container graph together with the bytes it describes, wrapped in a single
/// point primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct GlbDocument {
    graph: ContainerGraph,
    binary: Vec<u8>,
}

impl GlbDocument {
    pub fn new(graph: ContainerGraph, packed: PackedBuffer) -> Result<Self> {
        if graph.buffer.byte_length != packed.len() {
            return Err(ConvertError::Layout(format!(
                "graph describes {} bytes, packed buffer has {}",
                graph.buffer.byte_length,
                packed.len()
            )));
        }
        Ok(Self {
            graph,
            binary: packed.into_bytes(),
        })
    }

    pub fn graph(&self) -> &ContainerGraph {
        &self.graph
    }

    pub fn binary(&self) -> &[u8] {
        &self.binary
    }

    pub fn to_json(&self) -> Result<String> {
        let root = GltfRoot {
            asset: Asset {
                version: GLTF_ASSET_VERSION,
                generator: concat!("splat-glb ", env!("CARGO_PKG_VERSION")),
            },
            scene: 0,
            scenes: vec![SceneOut { nodes: vec![0] }],
            nodes: vec![NodeOut { mesh: 0 }],
            meshes: vec![MeshOut {
                primitives: vec![PrimitiveOut {
                    attributes: &self.graph.attributes,
                    mode: PRIMITIVE_MODE_POINTS,
                }],
            }],
            buffers: vec![&self.graph.buffer],
            buffer_views: &self.graph.buffer_views,
            accessors: &self.graph.accessors,
        };
        Ok(serde_json::to_string(&root)?)
    }

    pub fn to_glb(&self) -> Result<Vec<u8>> {
        let json = self.to_json()?;
        let json_bytes = json.as_bytes();

        let json_padding = pad_to_multiple(json_bytes.len(), 4);
        let padded_json_len = json_bytes.len() + json_padding;
        let bin_padding = pad_to_multiple(self.binary.len(), 4);
        let padded_bin_len = self.binary.len() + bin_padding;

        let header_size = std::mem::size_of::<GlbHeader>();
        let chunk_header_size = std::mem::size_of::<GlbChunkHeader>();
        let total_len =
            header_size + chunk_header_size + padded_json_len + chunk_header_size + padded_bin_len;
        let total_len_u32 = u32::try_from(total_len).map_err(|_| {
            ConvertError::Container(format!("{} bytes exceed the GLB size limit", total_len))
        })?;

        let mut output = Vec::with_capacity(total_len);
        output.extend_from_slice(bytemuck::bytes_of(&GlbHeader::new(total_len_u32).swap_le()));

        let json_chunk = GlbChunkHeader {
            length: padded_json_len as u32,
            chunk_type: GLB_CHUNK_JSON,
        };
        output.extend_from_slice(bytemuck::bytes_of(&json_chunk.swap_le()));
        output.extend_from_slice(json_bytes);
        output.resize(output.len() + json_padding, b' ');

        let bin_chunk = GlbChunkHeader {
            length: padded_bin_len as u32,
            chunk_type: GLB_CHUNK_BIN,
        };
        output.extend_from_slice(bytemuck::bytes_of(&bin_chunk.swap_le()));
        output.extend_from_slice(&self.binary);
        output.resize(output.len() + bin_padding, 0);

        debug_assert_eq!(output.len(), total_len);
        Ok(output)
    }
}

/// The two chunks of a parsed GLB file.
#[derive(Debug, Clone, PartialEq)]
pub struct GlbContainer {
    pub header: GlbHeader,
    pub json: serde_json::Value,
    pub binary: Vec<u8>,
}

fn read_chunk(bytes: &[u8], offset: usize, expected_type: u32) -> Result<(&[u8], usize)> {
    let header_size = std::mem::size_of::<GlbChunkHeader>();
    let header_bytes = bytes
        .get(offset..offset + header_size)
        .ok_or_else(|| ConvertError::Container("truncated chunk header".to_string()))?;
    let header = bytemuck::pod_read_unaligned::<GlbChunkHeader>(header_bytes).swap_le();
    if header.chunk_type != expected_type {
        return Err(ConvertError::Container(format!(
            "unexpected chunk type {:#010x}",
            header.chunk_type
        )));
    }
    let start = offset + header_size;
    let end = start + header.length as usize;
    let data = bytes
        .get(start..end)
        .ok_or_else(|| ConvertError::Container("truncated chunk data".to_string()))?;
    Ok((data, end))
}

pub fn read_glb(bytes: &[u8]) -> Result<GlbContainer> {
    let header_size = std::mem::size_of::<GlbHeader>();
    let header_bytes = bytes
        .get(..header_size)
        .ok_or_else(|| ConvertError::Container("truncated header".to_string()))?;
    let header = bytemuck::pod_read_unaligned::<GlbHeader>(header_bytes).swap_le();
    if !header.is_valid() {
        return Err(ConvertError::Container("invalid GLB header".to_string()));
    }
    if header.length as usize != bytes.len() {
        return Err(ConvertError::Container(format!(
            "header declares {} bytes, got {}",
            header.length,
            bytes.len()
        )));
    }

    let (json, next) = read_chunk(bytes, header_size, GLB_CHUNK_JSON)?;
    let json: serde_json::Value = serde_json::from_slice(json)?;
    let binary = if next < bytes.len() {
        read_chunk(bytes, next, GLB_CHUNK_BIN)?.0.to_vec()
    } else {
        Vec::new()
    };

    Ok(GlbContainer {
        header,
        json,
        binary,
    })
}
