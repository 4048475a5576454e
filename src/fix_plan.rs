use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::graph::Graph;
use crate::shape_fixer::{ShapeFixError, fix_input_shape, fix_symbolic_dimension};

#[derive(Debug, thiserror::Error)]
pub enum FixPlanError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    ShapeFix(#[from] ShapeFixError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimParamFix {
    pub name: String,
    pub value: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShapeFix {
    pub name: String,
    pub shape: Vec<u64>,
}

/// A batch of shape edits, typically read from a JSON file such as
///
/// ```json
/// { "dim_params": [{"name": "batch", "value": 1}],
///   "input_shapes": [{"name": "X1", "shape": [2, 2, 4]}] }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeFixPlan {
    #[serde(default)]
    pub dim_params: Vec<DimParamFix>,
    #[serde(default)]
    pub input_shapes: Vec<InputShapeFix>,
}

impl ShapeFixPlan {
    pub fn from_json_str(json: &str) -> Result<Self, FixPlanError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, FixPlanError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn is_empty(&self) -> bool {
        self.dim_params.is_empty() && self.input_shapes.is_empty()
    }

    /// Applies the symbolic dimension fixes, then the input shapes, in order. Stops at the
    /// first failing fix; edits made before it are kept.
    pub fn apply(&self, graph: &mut Graph) -> Result<(), FixPlanError> {
        for fix in &self.dim_params {
            fix_symbolic_dimension(graph, &fix.name, fix.value)?;
        }
        for fix in &self.input_shapes {
            fix_input_shape(graph, &fix.name, &fix.shape)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::graph::Dimension;
    use crate::onnx_helpers::*;

    fn graph() -> Graph {
        Graph::from_onnx(make_graph(
            vec![make_node("Add", &["a", "b"], &["c"], "Add")],
            "main",
            vec![
                make_tensor_value_info(
                    "a",
                    DType::F32,
                    &[DimSpec::Param("batch"), DimSpec::Fixed(3)],
                ),
                make_tensor_value_info("b", DType::F32, &[DimSpec::Unknown, DimSpec::Fixed(3)]),
            ],
            vec![make_tensor_value_info(
                "c",
                DType::F32,
                &[DimSpec::Param("batch"), DimSpec::Fixed(3)],
            )],
            vec![],
        ))
        .unwrap()
    }

    #[test]
    fn parses_partial_plans() {
        let plan =
            ShapeFixPlan::from_json_str(r#"{"dim_params": [{"name": "batch", "value": 2}]}"#)
                .unwrap();
        assert_eq!(
            plan.dim_params,
            vec![DimParamFix {
                name: "batch".to_string(),
                value: 2
            }]
        );
        assert!(plan.input_shapes.is_empty());
        assert!(ShapeFixPlan::from_json_str("{}").unwrap().is_empty());
        assert!(matches!(
            ShapeFixPlan::from_json_str("{\"dim_params\": 3}"),
            Err(FixPlanError::Json(_))
        ));
    }

    #[test]
    fn applies_in_order() {
        let plan = ShapeFixPlan::from_json_str(
            r#"{
                "dim_params": [{"name": "batch", "value": 2}],
                "input_shapes": [{"name": "b", "shape": [2, 3]}]
            }"#,
        )
        .unwrap();
        let mut graph = graph();
        plan.apply(&mut graph).unwrap();
        for name in ["a", "b"] {
            assert_eq!(
                graph.find_input(name).unwrap().shape().unwrap(),
                &[Dimension::Fixed(2), Dimension::Fixed(3)]
            );
        }
        assert_eq!(
            graph.find_output("c").unwrap().shape().unwrap(),
            &[Dimension::Fixed(2), Dimension::Fixed(3)]
        );
    }

    #[test]
    fn stops_at_first_failure() {
        let plan = ShapeFixPlan {
            dim_params: vec![],
            input_shapes: vec![
                InputShapeFix {
                    name: "b".to_string(),
                    shape: vec![5, 3],
                },
                InputShapeFix {
                    name: "missing".to_string(),
                    shape: vec![1],
                },
                InputShapeFix {
                    name: "a".to_string(),
                    shape: vec![5, 3],
                },
            ],
        };
        let mut graph = graph();
        let err = plan.apply(&mut graph).unwrap_err();
        assert!(
            matches!(err, FixPlanError::ShapeFix(ShapeFixError::NotFound(ref x)) if x == "missing")
        );
        assert_eq!(
            graph.find_input("b").unwrap().shape().unwrap(),
            &[Dimension::Fixed(5), Dimension::Fixed(3)]
        );
        assert_eq!(
            graph.find_input("a").unwrap().shape().unwrap()[0],
            Dimension::Symbolic("batch".to_string())
        );
    }

    #[test]
    fn zero_sized_dim_param_is_rejected() {
        let plan = ShapeFixPlan::from_json_str(r#"{"dim_params": [{"name": "batch", "value": 0}]}"#)
            .unwrap();
        let mut graph = graph();
        let before = graph.clone();
        assert!(matches!(
            plan.apply(&mut graph),
            Err(FixPlanError::ShapeFix(ShapeFixError::InvalidDimension { value: 0, .. }))
        ));
        assert_eq!(graph, before);
    }

    #[test]
    fn reads_plan_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        let plan = ShapeFixPlan {
            dim_params: vec![DimParamFix {
                name: "batch".to_string(),
                value: 1,
            }],
            input_shapes: vec![],
        };
        std::fs::write(&path, serde_json::to_string(&plan).unwrap()).unwrap();
        assert_eq!(ShapeFixPlan::from_json_file(&path).unwrap(), plan);
        assert!(matches!(
            ShapeFixPlan::from_json_file(dir.path().join("missing.json")),
            Err(FixPlanError::Io(_))
        ));
    }
}
