use crate::dtype::{DType, DTypeError};
use crate::onnx;
use crate::onnx::attribute_proto::AttributeType;

#[derive(Debug, thiserror::Error)]
pub enum ONNXDecodingError {
    #[error("Missing field \"{0}\"")]
    MissingField(&'static str),
    #[error("Negative dimension {1} in value \"{0}\"")]
    NegativeDimensionError(String, i64),
    #[error("Unknown attribute type {1} for attribute \"{0}\"")]
    UnknownAttributeType(String, i32),
}

/// Identifier handed out to every node while a model is decoded. Unique across the
/// main graph and all of its nested subgraphs.
pub type NodeId = usize;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Dimension {
    Fixed(u64),
    Symbolic(String),
    Unknown,
}

impl Dimension {
    pub fn fixed_value(&self) -> Option<u64> {
        if let Dimension::Fixed(x) = self {
            Some(*x)
        } else {
            None
        }
    }

    pub fn symbolic_name(&self) -> Option<&str> {
        if let Dimension::Symbolic(x) = self {
            Some(x)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dimension::Fixed(x) => write!(f, "{x}"),
            Dimension::Symbolic(x) => write!(f, "{x}"),
            Dimension::Unknown => write!(f, "?"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TensorType {
    /// Raw ONNX `elem_type`; see [`TensorType::dtype`].
    pub elem_type: i32,
    pub shape: Option<Vec<Dimension>>,
    /// Per-dimension denotations, parallel to `shape`. Empty when none were declared.
    pub dim_denotations: Vec<String>,
    pub denotation: String,
}

impl TensorType {
    pub fn dtype(&self) -> Result<DType, DTypeError> {
        DType::from_onnx_i32(self.elem_type)
    }

    fn from_onnx(
        value_name: &str,
        tensor: onnx::type_proto::Tensor,
        denotation: String,
    ) -> Result<Self, ONNXDecodingError> {
        let (shape, dim_denotations) = match tensor.shape {
            Some(onnx_shape) => {
                let mut dimensions = Vec::with_capacity(onnx_shape.dim.len());
                let mut dim_denotations = Vec::with_capacity(onnx_shape.dim.len());
                for dim in onnx_shape.dim {
                    dimensions.push(match dim.value {
                        Some(onnx::tensor_shape_proto::dimension::Value::DimValue(x)) => {
                            if x < 0 {
                                return Err(ONNXDecodingError::NegativeDimensionError(
                                    value_name.to_string(),
                                    x,
                                ));
                            }
                            Dimension::Fixed(x as u64)
                        }
                        Some(onnx::tensor_shape_proto::dimension::Value::DimParam(x)) => {
                            Dimension::Symbolic(x)
                        }
                        None => Dimension::Unknown,
                    });
                    dim_denotations.push(dim.denotation);
                }
                if dim_denotations.iter().all(|x| x.is_empty()) {
                    dim_denotations.clear();
                }
                (Some(dimensions), dim_denotations)
            }
            None => (None, vec![]),
        };
        Ok(Self {
            elem_type: tensor.elem_type,
            shape,
            dim_denotations,
            denotation,
        })
    }

    fn to_onnx(&self) -> onnx::TypeProto {
        let shape = self.shape.as_ref().map(|dims| onnx::TensorShapeProto {
            dim: dims
                .iter()
                .enumerate()
                .map(|(i, dim)| onnx::tensor_shape_proto::Dimension {
                    denotation: self.dim_denotations.get(i).cloned().unwrap_or_default(),
                    value: match dim {
                        Dimension::Fixed(x) => {
                            Some(onnx::tensor_shape_proto::dimension::Value::DimValue(*x as i64))
                        }
                        Dimension::Symbolic(x) => Some(
                            onnx::tensor_shape_proto::dimension::Value::DimParam(x.clone()),
                        ),
                        Dimension::Unknown => None,
                    },
                })
                .collect(),
        });
        onnx::TypeProto {
            denotation: self.denotation.clone(),
            value: Some(onnx::type_proto::Value::TensorType(
                onnx::type_proto::Tensor {
                    elem_type: self.elem_type,
                    shape,
                },
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueType {
    Tensor(TensorType),
    /// Sequence, map, optional and sparse types are carried through untouched.
    Other(onnx::TypeProto),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValueInfo {
    pub name: String,
    pub value_type: Option<ValueType>,
    pub doc_string: String,
    pub metadata_props: Vec<onnx::StringStringEntryProto>,
}

impl ValueInfo {
    pub fn tensor_type(&self) -> Option<&TensorType> {
        if let Some(ValueType::Tensor(x)) = &self.value_type {
            Some(x)
        } else {
            None
        }
    }

    pub fn tensor_type_mut(&mut self) -> Option<&mut TensorType> {
        if let Some(ValueType::Tensor(x)) = &mut self.value_type {
            Some(x)
        } else {
            None
        }
    }

    pub fn shape(&self) -> Option<&[Dimension]> {
        self.tensor_type().and_then(|x| x.shape.as_deref())
    }

    pub fn shape_mut(&mut self) -> Option<&mut Vec<Dimension>> {
        self.tensor_type_mut().and_then(|x| x.shape.as_mut())
    }

    pub fn from_onnx(value_info: onnx::ValueInfoProto) -> Result<Self, ONNXDecodingError> {
        let value_type = match value_info.r#type {
            Some(onnx::TypeProto {
                denotation,
                value: Some(onnx::type_proto::Value::TensorType(tensor)),
            }) => Some(ValueType::Tensor(TensorType::from_onnx(
                &value_info.name,
                tensor,
                denotation,
            )?)),
            Some(other) => Some(ValueType::Other(other)),
            None => None,
        };
        Ok(Self {
            name: value_info.name,
            value_type,
            doc_string: value_info.doc_string,
            metadata_props: value_info.metadata_props,
        })
    }

    pub fn to_onnx(&self) -> onnx::ValueInfoProto {
        onnx::ValueInfoProto {
            name: self.name.clone(),
            r#type: match &self.value_type {
                Some(ValueType::Tensor(x)) => Some(x.to_onnx()),
                Some(ValueType::Other(x)) => Some(x.clone()),
                None => None,
            },
            doc_string: self.doc_string.clone(),
            metadata_props: self.metadata_props.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Undefined,
    Float(f32),
    Int(i64),
    String(Vec<u8>),
    Tensor(onnx::TensorProto),
    Graph(Graph),
    SparseTensor(onnx::SparseTensorProto),
    TypeProto(onnx::TypeProto),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<Vec<u8>>),
    Tensors(Vec<onnx::TensorProto>),
    Graphs(Vec<Graph>),
    SparseTensors(Vec<onnx::SparseTensorProto>),
    TypeProtos(Vec<onnx::TypeProto>),
}

impl AttributeValue {
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            AttributeValue::Undefined => AttributeType::Undefined,
            AttributeValue::Float(_) => AttributeType::Float,
            AttributeValue::Int(_) => AttributeType::Int,
            AttributeValue::String(_) => AttributeType::String,
            AttributeValue::Tensor(_) => AttributeType::Tensor,
            AttributeValue::Graph(_) => AttributeType::Graph,
            AttributeValue::SparseTensor(_) => AttributeType::SparseTensor,
            AttributeValue::TypeProto(_) => AttributeType::TypeProto,
            AttributeValue::Floats(_) => AttributeType::Floats,
            AttributeValue::Ints(_) => AttributeType::Ints,
            AttributeValue::Strings(_) => AttributeType::Strings,
            AttributeValue::Tensors(_) => AttributeType::Tensors,
            AttributeValue::Graphs(_) => AttributeType::Graphs,
            AttributeValue::SparseTensors(_) => AttributeType::SparseTensors,
            AttributeValue::TypeProtos(_) => AttributeType::TypeProtos,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
    pub ref_attr_name: String,
    pub doc_string: String,
}

impl Attribute {
    pub fn subgraphs(&self) -> &[Graph] {
        match &self.value {
            AttributeValue::Graph(x) => std::slice::from_ref(x),
            AttributeValue::Graphs(x) => x.as_slice(),
            _ => &[],
        }
    }

    pub fn subgraphs_mut(&mut self) -> &mut [Graph] {
        match &mut self.value {
            AttributeValue::Graph(x) => std::slice::from_mut(x),
            AttributeValue::Graphs(x) => x.as_mut_slice(),
            _ => &mut [],
        }
    }

    pub fn to_onnx(&self) -> onnx::AttributeProto {
        let mut out = onnx::AttributeProto {
            name: self.name.clone(),
            ref_attr_name: self.ref_attr_name.clone(),
            doc_string: self.doc_string.clone(),
            r#type: self.value.attribute_type() as i32,
            ..Default::default()
        };
        match &self.value {
            AttributeValue::Undefined => {}
            AttributeValue::Float(x) => out.f = *x,
            AttributeValue::Int(x) => out.i = *x,
            AttributeValue::String(x) => out.s = x.clone(),
            AttributeValue::Tensor(x) => out.t = Some(x.clone()),
            AttributeValue::Graph(x) => out.g = Some(x.to_onnx()),
            AttributeValue::SparseTensor(x) => out.sparse_tensor = Some(x.clone()),
            AttributeValue::TypeProto(x) => out.tp = Some(x.clone()),
            AttributeValue::Floats(x) => out.floats = x.clone(),
            AttributeValue::Ints(x) => out.ints = x.clone(),
            AttributeValue::Strings(x) => out.strings = x.clone(),
            AttributeValue::Tensors(x) => out.tensors = x.clone(),
            AttributeValue::Graphs(x) => out.graphs = x.iter().map(|g| g.to_onnx()).collect(),
            AttributeValue::SparseTensors(x) => out.sparse_tensors = x.clone(),
            AttributeValue::TypeProtos(x) => out.type_protos = x.clone(),
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub op_type: String,
    pub domain: String,
    pub overload: String,
    /// Value names consumed by this node. An empty name marks an omitted optional input.
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attributes: Vec<Attribute>,
    pub doc_string: String,
    pub metadata_props: Vec<onnx::StringStringEntryProto>,
}

impl Node {
    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|x| x.name == name)
    }

    /// Every graph nested directly in one of this node's attributes.
    pub fn subgraphs(&self) -> impl Iterator<Item = &Graph> {
        self.attributes.iter().flat_map(|x| x.subgraphs())
    }

    pub fn subgraphs_mut(&mut self) -> impl Iterator<Item = &mut Graph> {
        self.attributes.iter_mut().flat_map(|x| x.subgraphs_mut())
    }

    pub fn has_subgraphs(&self) -> bool {
        self.subgraphs().next().is_some()
    }

    pub fn to_onnx(&self) -> onnx::NodeProto {
        onnx::NodeProto {
            input: self.inputs.clone(),
            output: self.outputs.clone(),
            name: self.name.clone(),
            op_type: self.op_type.clone(),
            domain: self.domain.clone(),
            overload: self.overload.clone(),
            attribute: self.attributes.iter().map(|x| x.to_onnx()).collect(),
            doc_string: self.doc_string.clone(),
            metadata_props: self.metadata_props.clone(),
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.op_type)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Graph {
    pub name: String,
    pub doc_string: String,
    pub nodes: Vec<Node>,
    pub inputs: Vec<ValueInfo>,
    pub outputs: Vec<ValueInfo>,
    pub value_info: Vec<ValueInfo>,
    pub initializers: Vec<onnx::TensorProto>,
    pub sparse_initializers: Vec<onnx::SparseTensorProto>,
    pub quantization_annotation: Vec<onnx::TensorAnnotation>,
    pub metadata_props: Vec<onnx::StringStringEntryProto>,
}

impl Graph {
    /// Decodes a standalone graph, numbering its nodes from zero.
    pub fn from_onnx(onnx_graph: onnx::GraphProto) -> Result<Self, ONNXDecodingError> {
        GraphDecoder::new().decode_graph(onnx_graph)
    }

    pub fn find_input(&self, name: &str) -> Option<&ValueInfo> {
        self.inputs.iter().find(|x| x.name == name)
    }

    pub fn find_input_mut(&mut self, name: &str) -> Option<&mut ValueInfo> {
        self.inputs.iter_mut().find(|x| x.name == name)
    }

    pub fn find_output(&self, name: &str) -> Option<&ValueInfo> {
        self.outputs.iter().find(|x| x.name == name)
    }

    pub fn find_value_info(&self, name: &str) -> Option<&ValueInfo> {
        self.value_info.iter().find(|x| x.name == name)
    }

    pub fn initializer_names(&self) -> impl Iterator<Item = &str> {
        self.initializers
            .iter()
            .map(|x| x.name.as_str())
            .chain(
                self.sparse_initializers
                    .iter()
                    .filter_map(|x| x.values.as_ref().map(|v| v.name.as_str())),
            )
    }

    /// Inputs, outputs and value_info of this graph, not of its subgraphs.
    pub fn declared_values_mut(&mut self) -> impl Iterator<Item = &mut ValueInfo> {
        self.inputs
            .iter_mut()
            .chain(self.outputs.iter_mut())
            .chain(self.value_info.iter_mut())
    }

    /// Graphs nested directly in attributes of this graph's nodes.
    pub fn subgraphs(&self) -> impl Iterator<Item = &Graph> {
        self.nodes.iter().flat_map(|x| x.subgraphs())
    }

    pub fn subgraphs_mut(&mut self) -> impl Iterator<Item = &mut Graph> {
        self.nodes.iter_mut().flat_map(|x| x.subgraphs_mut())
    }

    /// Calls `f` for every node of this graph and every nested subgraph. A node is visited
    /// before the nodes of its subgraphs; `f` also receives the graph owning the node.
    pub fn visit_nodes<'a>(&'a self, f: &mut impl FnMut(&'a Graph, &'a Node)) {
        for node in &self.nodes {
            f(self, node);
            for subgraph in node.subgraphs() {
                subgraph.visit_nodes(f);
            }
        }
    }

    pub fn node_by_id(&self, id: NodeId) -> Option<&Node> {
        for node in &self.nodes {
            if node.id == id {
                return Some(node);
            }
            for subgraph in node.subgraphs() {
                if let Some(x) = subgraph.node_by_id(id) {
                    return Some(x);
                }
            }
        }
        None
    }

    pub fn node_count_recursive(&self) -> usize {
        let mut count = 0;
        self.visit_nodes(&mut |_, _| count += 1);
        count
    }

    pub fn to_onnx(&self) -> onnx::GraphProto {
        onnx::GraphProto {
            node: self.nodes.iter().map(|x| x.to_onnx()).collect(),
            name: self.name.clone(),
            initializer: self.initializers.clone(),
            sparse_initializer: self.sparse_initializers.clone(),
            doc_string: self.doc_string.clone(),
            input: self.inputs.iter().map(|x| x.to_onnx()).collect(),
            output: self.outputs.iter().map(|x| x.to_onnx()).collect(),
            value_info: self.value_info.iter().map(|x| x.to_onnx()).collect(),
            quantization_annotation: self.quantization_annotation.clone(),
            metadata_props: self.metadata_props.clone(),
        }
    }
}

/// Turns ONNX graph protos into [`Graph`]s, numbering nodes depth-first in document order.
/// One decoder should be used for a whole model so ids stay unique across subgraphs.
pub struct GraphDecoder {
    next_node_id: NodeId,
}

impl GraphDecoder {
    pub fn new() -> Self {
        Self { next_node_id: 0 }
    }

    pub fn decode_graph(
        &mut self,
        onnx_graph: onnx::GraphProto,
    ) -> Result<Graph, ONNXDecodingError> {
        let mut nodes = Vec::with_capacity(onnx_graph.node.len());
        for node in onnx_graph.node {
            nodes.push(self.decode_node(node)?);
        }
        let decode_values = |values: Vec<onnx::ValueInfoProto>| {
            values
                .into_iter()
                .map(ValueInfo::from_onnx)
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Graph {
            name: onnx_graph.name,
            doc_string: onnx_graph.doc_string,
            nodes,
            inputs: decode_values(onnx_graph.input)?,
            outputs: decode_values(onnx_graph.output)?,
            value_info: decode_values(onnx_graph.value_info)?,
            initializers: onnx_graph.initializer,
            sparse_initializers: onnx_graph.sparse_initializer,
            quantization_annotation: onnx_graph.quantization_annotation,
            metadata_props: onnx_graph.metadata_props,
        })
    }

    fn decode_node(&mut self, onnx_node: onnx::NodeProto) -> Result<Node, ONNXDecodingError> {
        let id = self.next_node_id;
        self.next_node_id += 1;

        let mut attributes = Vec::with_capacity(onnx_node.attribute.len());
        for attr in onnx_node.attribute {
            attributes.push(self.decode_attribute(attr)?);
        }

        Ok(Node {
            id,
            name: onnx_node.name,
            op_type: onnx_node.op_type,
            domain: onnx_node.domain,
            overload: onnx_node.overload,
            inputs: onnx_node.input,
            outputs: onnx_node.output,
            attributes,
            doc_string: onnx_node.doc_string,
            metadata_props: onnx_node.metadata_props,
        })
    }

    fn decode_attribute(
        &mut self,
        attr: onnx::AttributeProto,
    ) -> Result<Attribute, ONNXDecodingError> {
        let attribute_type = match AttributeType::try_from(attr.r#type) {
            Ok(AttributeType::Undefined) => infer_attribute_type(&attr),
            Ok(x) => x,
            Err(_) => {
                return Err(ONNXDecodingError::UnknownAttributeType(
                    attr.name.clone(),
                    attr.r#type,
                ));
            }
        };

        let value = match attribute_type {
            AttributeType::Undefined => AttributeValue::Undefined,
            AttributeType::Float => AttributeValue::Float(attr.f),
            AttributeType::Int => AttributeValue::Int(attr.i),
            AttributeType::String => AttributeValue::String(attr.s),
            AttributeType::Tensor => AttributeValue::Tensor(
                attr.t.ok_or(ONNXDecodingError::MissingField("attribute.t"))?,
            ),
            AttributeType::Graph => {
                let g = attr.g.ok_or(ONNXDecodingError::MissingField("attribute.g"))?;
                AttributeValue::Graph(self.decode_graph(g)?)
            }
            AttributeType::SparseTensor => AttributeValue::SparseTensor(
                attr.sparse_tensor
                    .ok_or(ONNXDecodingError::MissingField("attribute.sparse_tensor"))?,
            ),
            AttributeType::TypeProto => AttributeValue::TypeProto(
                attr.tp.ok_or(ONNXDecodingError::MissingField("attribute.tp"))?,
            ),
            AttributeType::Floats => AttributeValue::Floats(attr.floats),
            AttributeType::Ints => AttributeValue::Ints(attr.ints),
            AttributeType::Strings => AttributeValue::Strings(attr.strings),
            AttributeType::Tensors => AttributeValue::Tensors(attr.tensors),
            AttributeType::Graphs => {
                let mut graphs = Vec::with_capacity(attr.graphs.len());
                for g in attr.graphs {
                    graphs.push(self.decode_graph(g)?);
                }
                AttributeValue::Graphs(graphs)
            }
            AttributeType::SparseTensors => AttributeValue::SparseTensors(attr.sparse_tensors),
            AttributeType::TypeProtos => AttributeValue::TypeProtos(attr.type_protos),
        };

        Ok(Attribute {
            name: attr.name,
            value,
            ref_attr_name: attr.ref_attr_name,
            doc_string: attr.doc_string,
        })
    }
}

impl Default for GraphDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// Very old exporters leave `type` unset; fall back to whichever payload field is populated.
fn infer_attribute_type(attr: &onnx::AttributeProto) -> AttributeType {
    if attr.g.is_some() {
        AttributeType::Graph
    } else if !attr.graphs.is_empty() {
        AttributeType::Graphs
    } else if attr.t.is_some() {
        AttributeType::Tensor
    } else if !attr.tensors.is_empty() {
        AttributeType::Tensors
    } else if attr.sparse_tensor.is_some() {
        AttributeType::SparseTensor
    } else if !attr.sparse_tensors.is_empty() {
        AttributeType::SparseTensors
    } else if attr.tp.is_some() {
        AttributeType::TypeProto
    } else if !attr.type_protos.is_empty() {
        AttributeType::TypeProtos
    } else if !attr.floats.is_empty() {
        AttributeType::Floats
    } else if !attr.ints.is_empty() {
        AttributeType::Ints
    } else if !attr.strings.is_empty() {
        AttributeType::Strings
    } else if !attr.s.is_empty() {
        AttributeType::String
    } else if attr.f != 0.0 {
        AttributeType::Float
    } else if attr.i != 0 {
        AttributeType::Int
    } else {
        AttributeType::Undefined
    }
}
