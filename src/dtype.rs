use crate::onnx;

#[derive(Debug, thiserror::Error)]
pub enum DTypeError {
    #[error("The onnx dtype {0:?} is not supported")]
    UnsupportedONNXDtype(onnx::tensor_proto::DataType),
    #[error("Unknown onnx dtype value {0}")]
    UnknownONNXDtype(i32),
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, PartialOrd)]
pub enum DType {
    F64,
    F32,
    BF16,
    F16,
    U64,
    I64,
    U32,
    I32,
    U16,
    I16,
    U8,
    I8,
    BOOL,
    STRING,
}

impl DType {
    /// Decodes the raw `elem_type`/`data_type` field of an ONNX message.
    pub fn from_onnx_i32(value: i32) -> Result<Self, DTypeError> {
        let onnx_dtype = onnx::tensor_proto::DataType::try_from(value)
            .map_err(|_| DTypeError::UnknownONNXDtype(value))?;
        Self::try_from(onnx_dtype)
    }
}

impl TryFrom<onnx::tensor_proto::DataType> for DType {
    type Error = DTypeError;
    fn try_from(onnx_dtype: onnx::tensor_proto::DataType) -> Result<Self, DTypeError> {
        Ok(match onnx_dtype {
            onnx::tensor_proto::DataType::Double => DType::F64,
            onnx::tensor_proto::DataType::Float => DType::F32,
            onnx::tensor_proto::DataType::Bfloat16 => DType::BF16,
            onnx::tensor_proto::DataType::Float16 => DType::F16,
            onnx::tensor_proto::DataType::Int64 => DType::I64,
            onnx::tensor_proto::DataType::Int32 => DType::I32,
            onnx::tensor_proto::DataType::Uint64 => DType::U64,
            onnx::tensor_proto::DataType::Uint32 => DType::U32,
            onnx::tensor_proto::DataType::Uint16 => DType::U16,
            onnx::tensor_proto::DataType::Int16 => DType::I16,
            onnx::tensor_proto::DataType::Uint8 => DType::U8,
            onnx::tensor_proto::DataType::Int8 => DType::I8,
            onnx::tensor_proto::DataType::Bool => DType::BOOL,
            onnx::tensor_proto::DataType::String => DType::STRING,
            _ => Err(DTypeError::UnsupportedONNXDtype(onnx_dtype))?,
        })
    }
}

impl From<DType> for onnx::tensor_proto::DataType {
    fn from(dtype: DType) -> Self {
        match dtype {
            DType::F64 => onnx::tensor_proto::DataType::Double,
            DType::F32 => onnx::tensor_proto::DataType::Float,
            DType::BF16 => onnx::tensor_proto::DataType::Bfloat16,
            DType::F16 => onnx::tensor_proto::DataType::Float16,
            DType::I64 => onnx::tensor_proto::DataType::Int64,
            DType::I32 => onnx::tensor_proto::DataType::Int32,
            DType::U64 => onnx::tensor_proto::DataType::Uint64,
            DType::U32 => onnx::tensor_proto::DataType::Uint32,
            DType::U16 => onnx::tensor_proto::DataType::Uint16,
            DType::I16 => onnx::tensor_proto::DataType::Int16,
            DType::U8 => onnx::tensor_proto::DataType::Uint8,
            DType::I8 => onnx::tensor_proto::DataType::Int8,
            DType::BOOL => onnx::tensor_proto::DataType::Bool,
            DType::STRING => onnx::tensor_proto::DataType::String,
        }
    }
}
