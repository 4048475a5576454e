pub mod dtype;
pub mod fix_plan;
pub mod graph;
pub mod linkage;
pub mod model;
pub mod onnx {
    include!(concat!(env!("OUT_DIR"), "/onnx.rs"));
}
pub mod onnx_helpers;
pub mod shape_check;
pub mod shape_fixer;

pub use graph::{Attribute, AttributeValue, Dimension, Graph, Node, NodeId, ValueInfo};
pub use linkage::{NodeLinkage, compute_linkage};
pub use model::{Model, ModelError};
pub use shape_check::{ShapeReport, check_shapes, is_fixed_size};
pub use shape_fixer::{ShapeFixError, fix_input_shape, fix_output_shapes, fix_symbolic_dimension};
