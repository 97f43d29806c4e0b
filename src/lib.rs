pub mod attribute;
pub mod convert;
pub mod error;
pub mod glb_format;
pub mod gltf_graph;
pub mod outlier_filter;
pub mod packer;
pub mod ply_format;
pub mod point_set;
pub mod spherical_harmonics;
mod support;

pub use error::{ConvertError, Result};
