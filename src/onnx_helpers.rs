//! Small constructors for ONNX protos, for building models by hand.

use crate::dtype::DType;
use crate::onnx;
use crate::onnx::attribute_proto::AttributeType;

/// One dimension of a declared tensor shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DimSpec<'a> {
    Fixed(i64),
    Param(&'a str),
    Unknown,
}

impl From<DimSpec<'_>> for onnx::tensor_shape_proto::Dimension {
    fn from(value: DimSpec<'_>) -> Self {
        Self {
            denotation: String::new(),
            value: match value {
                DimSpec::Fixed(x) => Some(onnx::tensor_shape_proto::dimension::Value::DimValue(x)),
                DimSpec::Param(x) => Some(onnx::tensor_shape_proto::dimension::Value::DimParam(
                    x.to_string(),
                )),
                DimSpec::Unknown => None,
            },
        }
    }
}

pub fn make_node(op_type: &str, inputs: &[&str], outputs: &[&str], name: &str) -> onnx::NodeProto {
    make_node_with_attributes(op_type, inputs, outputs, name, vec![])
}

pub fn make_node_with_attributes(
    op_type: &str,
    inputs: &[&str],
    outputs: &[&str],
    name: &str,
    attributes: Vec<onnx::AttributeProto>,
) -> onnx::NodeProto {
    onnx::NodeProto {
        input: inputs.iter().map(|x| x.to_string()).collect(),
        output: outputs.iter().map(|x| x.to_string()).collect(),
        name: name.to_string(),
        op_type: op_type.to_string(),
        attribute: attributes,
        ..Default::default()
    }
}

pub fn make_graph(
    nodes: Vec<onnx::NodeProto>,
    name: &str,
    inputs: Vec<onnx::ValueInfoProto>,
    outputs: Vec<onnx::ValueInfoProto>,
    initializers: Vec<onnx::TensorProto>,
) -> onnx::GraphProto {
    onnx::GraphProto {
        node: nodes,
        name: name.to_string(),
        initializer: initializers,
        input: inputs,
        output: outputs,
        ..Default::default()
    }
}

pub fn make_tensor_value_info(name: &str, dtype: DType, shape: &[DimSpec]) -> onnx::ValueInfoProto {
    onnx::ValueInfoProto {
        name: name.to_string(),
        r#type: Some(onnx::TypeProto {
            value: Some(onnx::type_proto::Value::TensorType(onnx::type_proto::Tensor {
                elem_type: onnx::tensor_proto::DataType::from(dtype) as i32,
                shape: Some(onnx::TensorShapeProto {
                    dim: shape.iter().map(|x| (*x).into()).collect(),
                }),
            })),
            denotation: String::new(),
        }),
        ..Default::default()
    }
}

/// A tensor value info with no shape at all, not even a rank.
pub fn make_unshaped_value_info(name: &str, dtype: DType) -> onnx::ValueInfoProto {
    onnx::ValueInfoProto {
        name: name.to_string(),
        r#type: Some(onnx::TypeProto {
            value: Some(onnx::type_proto::Value::TensorType(onnx::type_proto::Tensor {
                elem_type: onnx::tensor_proto::DataType::from(dtype) as i32,
                shape: None,
            })),
            denotation: String::new(),
        }),
        ..Default::default()
    }
}

pub fn make_float_tensor(name: &str, dims: &[i64], values: &[f32]) -> onnx::TensorProto {
    onnx::TensorProto {
        dims: dims.to_vec(),
        data_type: onnx::tensor_proto::DataType::Float as i32,
        name: name.to_string(),
        float_data: values.to_vec(),
        ..Default::default()
    }
}

pub fn make_int64_tensor(name: &str, dims: &[i64], values: &[i64]) -> onnx::TensorProto {
    onnx::TensorProto {
        dims: dims.to_vec(),
        data_type: onnx::tensor_proto::DataType::Int64 as i32,
        name: name.to_string(),
        int64_data: values.to_vec(),
        ..Default::default()
    }
}

pub fn make_bool_tensor(name: &str, dims: &[i64], values: &[bool]) -> onnx::TensorProto {
    onnx::TensorProto {
        dims: dims.to_vec(),
        data_type: onnx::tensor_proto::DataType::Bool as i32,
        name: name.to_string(),
        int32_data: values.iter().map(|x| *x as i32).collect(),
        ..Default::default()
    }
}

pub fn make_graph_attribute(name: &str, graph: onnx::GraphProto) -> onnx::AttributeProto {
    onnx::AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Graph as i32,
        g: Some(graph),
        ..Default::default()
    }
}

pub fn make_int_attribute(name: &str, value: i64) -> onnx::AttributeProto {
    onnx::AttributeProto {
        name: name.to_string(),
        r#type: AttributeType::Int as i32,
        i: value,
        ..Default::default()
    }
}

pub fn make_opsetid(domain: &str, version: i64) -> onnx::OperatorSetIdProto {
    onnx::OperatorSetIdProto {
        domain: domain.to_string(),
        version,
    }
}

pub fn make_model(
    graph: onnx::GraphProto,
    opset_imports: Vec<onnx::OperatorSetIdProto>,
) -> onnx::ModelProto {
    onnx::ModelProto {
        ir_version: onnx::Version::IrVersion2024325 as i64,
        opset_import: opset_imports,
        producer_name: env!("CARGO_PKG_NAME").to_string(),
        producer_version: env!("CARGO_PKG_VERSION").to_string(),
        graph: Some(graph),
        ..Default::default()
    }
}
