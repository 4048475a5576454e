use crate::graph::{Graph, ValueInfo};

/// Summary of the values in a graph whose shapes are not fully known.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShapeReport {
    /// Names of graph inputs that are not fixed size, in declaration order.
    pub dynamic_inputs: Vec<String>,
    /// Number of value_info entries and graph outputs that are not fixed size.
    pub num_dynamic_values: usize,
}

impl ShapeReport {
    pub fn is_fully_fixed(&self) -> bool {
        self.dynamic_inputs.is_empty() && self.num_dynamic_values == 0
    }
}

/// A value is fixed size when it is a tensor with a declared shape and every dimension
/// is a positive fixed size.
pub fn is_fixed_size(value: &ValueInfo) -> bool {
    match value.shape() {
        Some(shape) => shape
            .iter()
            .all(|dim| dim.fixed_value().is_some_and(|x| x > 0)),
        None => false,
    }
}

/// Checks the top level graph's inputs, value_info and outputs for dynamic shapes.
pub fn check_shapes(graph: &Graph) -> ShapeReport {
    let mut report = ShapeReport::default();

    for input in &graph.inputs {
        if !is_fixed_size(input) {
            log::info!("Input is not a fixed size tensor: {}", describe(input));
            report.dynamic_inputs.push(input.name.clone());
        }
    }

    for value in graph.value_info.iter().chain(graph.outputs.iter()) {
        if !is_fixed_size(value) {
            log::debug!("Value is not a fixed size tensor: {}", describe(value));
            report.num_dynamic_values += 1;
        }
    }

    if report.num_dynamic_values > 0 {
        log::info!(
            "Graph \"{}\" has {} dynamic inputs and {} dynamic values",
            graph.name,
            report.dynamic_inputs.len(),
            report.num_dynamic_values
        );
    }

    report
}

fn describe(value: &ValueInfo) -> String {
    match value.shape() {
        Some(shape) => format!(
            "{}[{}]",
            value.name,
            shape
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join(",")
        ),
        None => format!("{} (no shape)", value.name),
    }
}
