use std::collections::HashMap;

use crate::graph::{Dimension, Graph};
use crate::shape_check::is_fixed_size;

/// Largest size an ONNX `dim_value` (int64) can hold.
pub const MAX_DIMENSION: u64 = i64::MAX as u64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeFixError {
    #[error("Input {0} was not found in graph inputs.")]
    NotFound(String),
    #[error("Input {0} is not a tensor with a declared shape.")]
    NotATensor(String),
    #[error("Rank mismatch. Existing:{existing} Replacement:{replacement}")]
    RankMismatch {
        input: String,
        existing: usize,
        replacement: usize,
    },
    #[error(
        "Can't replace existing fixed size of {existing} with {replacement} for dimension {dimension}"
    )]
    DimensionConflict {
        input: String,
        existing: u64,
        replacement: u64,
        /// 1-based position of the dimension within the input's shape.
        dimension: usize,
    },
    #[error(
        "Invalid size {value} for {name}. Fixed sizes must be between 1 and {max}",
        max = MAX_DIMENSION
    )]
    InvalidDimension { name: String, value: u64 },
}

fn is_valid_size(value: u64) -> bool {
    (1..=MAX_DIMENSION).contains(&value)
}

/// Replaces every dimension named `symbolic_name` with the fixed size `value`.
///
/// Graph inputs, outputs and value_info are all updated, in this graph and every nested
/// subgraph, so no occurrence of the name is left behind. Returns the number of
/// dimensions replaced; a name that occurs nowhere is not an error. `value` must fit an
/// ONNX dimension (`1..=MAX_DIMENSION`), otherwise nothing is changed.
pub fn fix_symbolic_dimension(
    graph: &mut Graph,
    symbolic_name: &str,
    value: u64,
) -> Result<usize, ShapeFixError> {
    if !is_valid_size(value) {
        return Err(ShapeFixError::InvalidDimension {
            name: symbolic_name.to_string(),
            value,
        });
    }
    let replaced = replace_symbolic_dimension(graph, symbolic_name, value);
    if replaced == 0 {
        log::debug!(
            "Symbolic dimension \"{symbolic_name}\" not found in graph \"{}\"",
            graph.name
        );
    } else {
        log::info!(
            "Replaced {replaced} occurrences of symbolic dimension \"{symbolic_name}\" with {value}"
        );
    }
    Ok(replaced)
}

fn replace_symbolic_dimension(graph: &mut Graph, symbolic_name: &str, value: u64) -> usize {
    let mut replaced = 0;
    for value_info in graph.declared_values_mut() {
        if let Some(shape) = value_info.shape_mut() {
            for dim in shape.iter_mut() {
                if dim.symbolic_name() == Some(symbolic_name) {
                    *dim = Dimension::Fixed(value);
                    replaced += 1;
                }
            }
        }
    }
    for subgraph in graph.subgraphs_mut() {
        replaced += replace_symbolic_dimension(subgraph, symbolic_name, value);
    }
    replaced
}

/// Sets the complete shape of the graph input `input_name` to `new_shape`.
///
/// The replacement must have the input's rank, and dimensions that are already fixed may
/// only be "replaced" by the same size. Every new size must be in `1..=MAX_DIMENSION`.
/// Every check runs before anything is written, so a
/// failed call leaves the graph untouched. Symbolic dimensions of the input are fixed
/// throughout the whole graph, keeping other values that share the same name consistent.
pub fn fix_input_shape(
    graph: &mut Graph,
    input_name: &str,
    new_shape: &[u64],
) -> Result<(), ShapeFixError> {
    let input = graph
        .find_input(input_name)
        .ok_or_else(|| ShapeFixError::NotFound(input_name.to_string()))?;
    let shape = input
        .shape()
        .ok_or_else(|| ShapeFixError::NotATensor(input_name.to_string()))?;

    if shape.len() != new_shape.len() {
        return Err(ShapeFixError::RankMismatch {
            input: input_name.to_string(),
            existing: shape.len(),
            replacement: new_shape.len(),
        });
    }

    let mut symbolic_values: HashMap<String, Option<u64>> = HashMap::new();
    for (idx, (dim, new_value)) in shape.iter().zip(new_shape).enumerate() {
        if !is_valid_size(*new_value) {
            return Err(ShapeFixError::InvalidDimension {
                name: format!("dimension {} of input {input_name}", idx + 1),
                value: *new_value,
            });
        }
        match dim {
            Dimension::Fixed(existing) if existing != new_value => {
                return Err(ShapeFixError::DimensionConflict {
                    input: input_name.to_string(),
                    existing: *existing,
                    replacement: *new_value,
                    dimension: idx + 1,
                });
            }
            Dimension::Symbolic(name) => {
                // A name asked to take two different sizes is only fixed on this input.
                symbolic_values
                    .entry(name.clone())
                    .and_modify(|x| {
                        if *x != Some(*new_value) {
                            *x = None
                        }
                    })
                    .or_insert(Some(*new_value));
            }
            _ => {}
        }
    }

    if let Some(shape) = graph
        .find_input_mut(input_name)
        .and_then(|x| x.shape_mut())
    {
        for (dim, new_value) in shape.iter_mut().zip(new_shape) {
            *dim = Dimension::Fixed(*new_value);
        }
    }
    log::info!("Input {input_name} shape fixed to {new_shape:?}");

    for (name, value) in symbolic_values {
        match value {
            Some(value) => {
                fix_symbolic_dimension(graph, &name, value)?;
            }
            None => log::warn!(
                "Symbolic dimension \"{name}\" of input {input_name} has conflicting sizes"
            ),
        }
    }

    Ok(())
}

/// Copies fully fixed shapes from `value_info` onto graph outputs that are not fixed yet.
///
/// Meant to run after shape inference has populated `value_info` for a graph whose inputs
/// were made fixed. Returns the number of outputs updated.
pub fn fix_output_shapes(graph: &mut Graph) -> usize {
    let mut replacements = vec![];
    for (idx, output) in graph.outputs.iter().enumerate() {
        if is_fixed_size(output) || output.tensor_type().is_none() {
            continue;
        }
        if let Some(inferred) = graph.find_value_info(&output.name)
            && is_fixed_size(inferred)
            && let Some(shape) = inferred.shape()
        {
            replacements.push((idx, shape.to_vec()));
        }
    }

    let updated = replacements.len();
    for (idx, shape) in replacements {
        let output = &mut graph.outputs[idx];
        log::info!("Output {} shape fixed from value_info", output.name);
        if let Some(tensor_type) = output.tensor_type_mut() {
            if tensor_type.shape.as_ref().is_some_and(|x| x.len() != shape.len()) {
                tensor_type.dim_denotations.clear();
            }
            tensor_type.shape = Some(shape);
        }
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::onnx_helpers::*;

    fn graph_with_input(shape: &[DimSpec]) -> Graph {
        Graph::from_onnx(make_graph(
            vec![make_node("Relu", &["input"], &["output"], "Relu")],
            "main",
            vec![make_tensor_value_info("input", DType::F32, shape)],
            vec![make_tensor_value_info("output", DType::F32, shape)],
            vec![],
        ))
        .unwrap()
    }

    fn input_shape(graph: &Graph) -> Vec<Dimension> {
        graph.find_input("input").unwrap().shape().unwrap().to_vec()
    }

    #[test]
    fn symbolic_dimension_replaced_everywhere() {
        let mut graph = graph_with_input(&[DimSpec::Param("batch"), DimSpec::Param("seq")]);
        assert_eq!(fix_symbolic_dimension(&mut graph, "batch", 4), Ok(2));
        assert_eq!(
            input_shape(&graph),
            vec![Dimension::Fixed(4), Dimension::Symbolic("seq".to_string())]
        );
        assert_eq!(
            graph.find_output("output").unwrap().shape().unwrap()[0],
            Dimension::Fixed(4)
        );
    }

    #[test]
    fn symbolic_dimension_fix_is_idempotent() {
        let mut graph = graph_with_input(&[DimSpec::Param("batch"), DimSpec::Fixed(3)]);
        fix_symbolic_dimension(&mut graph, "batch", 4).unwrap();
        let once = graph.clone();
        assert_eq!(fix_symbolic_dimension(&mut graph, "batch", 4), Ok(0));
        assert_eq!(graph, once);
    }

    #[test]
    fn missing_symbolic_dimension_is_a_no_op() {
        let mut graph = graph_with_input(&[DimSpec::Param("batch")]);
        let before = graph.clone();
        assert_eq!(fix_symbolic_dimension(&mut graph, "nope", 1), Ok(0));
        assert_eq!(graph, before);
    }

    #[test]
    fn symbolic_dimension_out_of_range_is_rejected() {
        let mut graph = graph_with_input(&[DimSpec::Param("batch"), DimSpec::Fixed(3)]);
        let before = graph.clone();
        for value in [0, MAX_DIMENSION + 1, u64::MAX] {
            assert_eq!(
                fix_symbolic_dimension(&mut graph, "batch", value),
                Err(ShapeFixError::InvalidDimension {
                    name: "batch".to_string(),
                    value
                })
            );
        }
        assert_eq!(graph, before);

        assert_eq!(
            fix_symbolic_dimension(&mut graph, "batch", MAX_DIMENSION),
            Ok(2)
        );
        let reencoded = Graph::from_onnx(graph.to_onnx()).unwrap();
        assert_eq!(
            reencoded.find_input("input").unwrap().shape().unwrap()[0],
            Dimension::Fixed(MAX_DIMENSION)
        );
    }

    #[test]
    fn input_shape_out_of_range_is_rejected() {
        let mut graph = graph_with_input(&[DimSpec::Param("n"), DimSpec::Unknown]);
        let before = graph.clone();

        let err = fix_input_shape(&mut graph, "input", &[2, u64::MAX]).unwrap_err();
        assert_eq!(
            err,
            ShapeFixError::InvalidDimension {
                name: "dimension 2 of input input".to_string(),
                value: u64::MAX
            }
        );
        assert!(matches!(
            fix_input_shape(&mut graph, "input", &[0, 2]),
            Err(ShapeFixError::InvalidDimension { value: 0, .. })
        ));
        assert_eq!(graph, before);

        // The largest accepted size survives an encode/decode cycle.
        fix_input_shape(&mut graph, "input", &[MAX_DIMENSION, 1]).unwrap();
        let reencoded = Graph::from_onnx(graph.to_onnx()).unwrap();
        assert_eq!(
            reencoded.find_input("input").unwrap().shape().unwrap(),
            &[Dimension::Fixed(MAX_DIMENSION), Dimension::Fixed(1)]
        );
    }

    #[test]
    fn input_shape_replaces_unknown_and_symbolic() {
        let mut graph =
            graph_with_input(&[DimSpec::Unknown, DimSpec::Param("n"), DimSpec::Fixed(4)]);
        fix_input_shape(&mut graph, "input", &[2, 2, 4]).unwrap();
        assert_eq!(
            input_shape(&graph),
            vec![Dimension::Fixed(2), Dimension::Fixed(2), Dimension::Fixed(4)]
        );
        // "n" was propagated to the output, the unnamed dimension was not.
        assert_eq!(
            graph.find_output("output").unwrap().shape().unwrap(),
            &[Dimension::Unknown, Dimension::Fixed(2), Dimension::Fixed(4)]
        );
    }

    #[test]
    fn rank_mismatch() {
        let mut graph = graph_with_input(&[DimSpec::Param("n"), DimSpec::Fixed(2)]);
        let err = fix_input_shape(&mut graph, "input", &[1, 2, 3]).unwrap_err();
        assert_eq!(err.to_string(), "Rank mismatch. Existing:2 Replacement:3");
    }

    #[test]
    fn conflicting_fixed_dimension_leaves_graph_untouched() {
        let mut graph = graph_with_input(&[DimSpec::Param("n"), DimSpec::Fixed(2)]);
        let before = graph.clone();
        let err = fix_input_shape(&mut graph, "input", &[4, 3]).unwrap_err();
        assert_eq!(
            err,
            ShapeFixError::DimensionConflict {
                input: "input".to_string(),
                existing: 2,
                replacement: 3,
                dimension: 2
            }
        );
        assert_eq!(
            err.to_string(),
            "Can't replace existing fixed size of 2 with 3 for dimension 2"
        );
        assert_eq!(graph, before);
    }

    #[test]
    fn same_fixed_value_is_accepted() {
        let mut graph = graph_with_input(&[DimSpec::Param("n"), DimSpec::Fixed(2)]);
        fix_input_shape(&mut graph, "input", &[4, 2]).unwrap();
        assert_eq!(
            input_shape(&graph),
            vec![Dimension::Fixed(4), Dimension::Fixed(2)]
        );
    }

    #[test]
    fn unknown_input_name() {
        let mut graph = graph_with_input(&[DimSpec::Fixed(2)]);
        let err = fix_input_shape(&mut graph, "X1", &[2]).unwrap_err();
        assert_eq!(err.to_string(), "Input X1 was not found in graph inputs.");
    }

    #[test]
    fn unshaped_input_is_rejected() {
        let mut graph = Graph::from_onnx(make_graph(
            vec![],
            "main",
            vec![make_unshaped_value_info("input", DType::F32)],
            vec![],
            vec![],
        ))
        .unwrap();
        assert_eq!(
            fix_input_shape(&mut graph, "input", &[1]),
            Err(ShapeFixError::NotATensor("input".to_string()))
        );
    }

    #[test]
    fn conflicting_sizes_for_one_name_stay_local() {
        let mut graph = graph_with_input(&[DimSpec::Param("n"), DimSpec::Param("n")]);
        fix_input_shape(&mut graph, "input", &[2, 3]).unwrap();
        assert_eq!(
            input_shape(&graph),
            vec![Dimension::Fixed(2), Dimension::Fixed(3)]
        );
        assert_eq!(
            graph.find_output("output").unwrap().shape().unwrap(),
            &[
                Dimension::Symbolic("n".to_string()),
                Dimension::Symbolic("n".to_string())
            ]
        );
    }

    #[test]
    fn output_shapes_taken_from_value_info() {
        let mut proto = make_graph(
            vec![make_node("Relu", &["input"], &["output"], "Relu")],
            "main",
            vec![make_tensor_value_info("input", DType::F32, &[DimSpec::Fixed(2)])],
            vec![make_tensor_value_info("output", DType::F32, &[DimSpec::Unknown])],
            vec![],
        );
        proto.value_info = vec![make_tensor_value_info("output", DType::F32, &[DimSpec::Fixed(2)])];
        let mut graph = Graph::from_onnx(proto).unwrap();

        assert_eq!(fix_output_shapes(&mut graph), 1);
        assert_eq!(
            graph.find_output("output").unwrap().shape().unwrap(),
            &[Dimension::Fixed(2)]
        );
        assert_eq!(fix_output_shapes(&mut graph), 0);
    }
}
