use std::collections::HashMap;
use std::path::Path;

use prost::{DecodeError, EncodeError, Message};

use crate::graph::{Graph, GraphDecoder, ONNXDecodingError};
use crate::onnx::{self, ModelProto, StringStringEntryProto};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error(transparent)]
    ONNXDecodingError(#[from] ONNXDecodingError),
    #[error(transparent)]
    DecodeError(#[from] DecodeError),
    #[error(transparent)]
    EncodeError(#[from] EncodeError),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// A decoded ONNX model. The main graph is converted to a [`Graph`]; everything else in
/// the model proto is carried along unchanged so the model can be written back out.
#[derive(Clone, Debug)]
pub struct Model {
    graph: Graph,
    /// The decoded proto minus its graph.
    proto: ModelProto,
}

impl Model {
    pub fn from_onnx_bytes(onnx_data: &[u8]) -> Result<Self, ModelError> {
        let model_proto = ModelProto::decode(onnx_data)?;
        Ok(Self::from_onnx_model_proto(model_proto)?)
    }

    pub fn from_onnx_model_proto(mut model_proto: ModelProto) -> Result<Self, ONNXDecodingError> {
        let onnx_graph = model_proto
            .graph
            .take()
            .ok_or(ONNXDecodingError::MissingField("graph"))?;
        let graph = GraphDecoder::new().decode_graph(onnx_graph)?;
        log::debug!(
            "Decoded model \"{}\" with {} nodes",
            graph.name,
            graph.node_count_recursive()
        );
        Ok(Self {
            graph,
            proto: model_proto,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        log::info!("Loading model from {}", path.display());
        let onnx_data = std::fs::read(path)?;
        Self::from_onnx_bytes(&onnx_data)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        log::info!("Writing model to {}", path.display());
        std::fs::write(path, self.to_onnx_bytes()?)?;
        Ok(())
    }

    pub fn to_onnx_proto(&self) -> ModelProto {
        ModelProto {
            graph: Some(self.graph.to_onnx()),
            ..self.proto.clone()
        }
    }

    pub fn to_onnx_bytes(&self) -> Result<Vec<u8>, ModelError> {
        let proto = self.to_onnx_proto();
        let mut buf = Vec::with_capacity(proto.encoded_len());
        proto.encode(&mut buf)?;
        Ok(buf)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn ir_version(&self) -> i64 {
        self.proto.ir_version
    }

    pub fn producer_name(&self) -> &str {
        &self.proto.producer_name
    }

    pub fn opset_imports(&self) -> &[onnx::OperatorSetIdProto] {
        &self.proto.opset_import
    }

    /// Opset version of the default ("" or "ai.onnx") domain, if the model imports it.
    pub fn core_opset_version(&self) -> Option<i64> {
        self.proto
            .opset_import
            .iter()
            .find(|x| x.domain.is_empty() || x.domain == "ai.onnx")
            .map(|x| x.version)
    }

    pub fn metadata(&self) -> HashMap<String, String> {
        let mut out = HashMap::new();
        for StringStringEntryProto { key, value } in &self.proto.metadata_props {
            out.insert(key.clone(), value.clone());
        }
        out
    }
}
