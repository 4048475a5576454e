use std::collections::{BTreeSet, HashMap, HashSet};

use crate::graph::{Graph, NodeId};

#[derive(Debug, thiserror::Error)]
pub enum LinkageError {
    #[error("This appears to be an invalid model with missing inputs of {0}")]
    MissingInputs(String),
}

/// Where a value name is declared within one scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    Node(NodeId),
    GraphInput,
    Initializer,
}

/// Producer/consumer adjacency between the nodes of a graph and all of its subgraphs.
#[derive(Clone, Debug, Default)]
pub struct NodeLinkage {
    pub producers: HashMap<NodeId, HashSet<NodeId>>,
    pub consumers: HashMap<NodeId, HashSet<NodeId>>,
    /// Input names that no enclosing scope declares.
    pub unresolved_inputs: BTreeSet<String>,
}

impl NodeLinkage {
    pub fn producers_of(&self, node: NodeId) -> Option<&HashSet<NodeId>> {
        self.producers.get(&node)
    }

    pub fn consumers_of(&self, node: NodeId) -> Option<&HashSet<NodeId>> {
        self.consumers.get(&node)
    }

    /// True if `producer` feeds `consumer`. Both maps are kept in sync, so checking one
    /// direction is enough.
    pub fn is_linked(&self, producer: NodeId, consumer: NodeId) -> bool {
        self.producers
            .get(&consumer)
            .is_some_and(|x| x.contains(&producer))
    }

    pub fn num_links(&self) -> usize {
        self.producers.values().map(|x| x.len()).sum()
    }

    /// Fails if any consumed value was declared nowhere, which only happens for a
    /// malformed model.
    pub fn check_complete(&self) -> Result<(), LinkageError> {
        if self.unresolved_inputs.is_empty() {
            Ok(())
        } else {
            Err(LinkageError::MissingInputs(
                self.unresolved_inputs
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(","),
            ))
        }
    }

    fn add_link(&mut self, producer: NodeId, consumer: NodeId) {
        self.producers.entry(consumer).or_default().insert(producer);
        self.consumers.entry(producer).or_default().insert(consumer);
    }
}

/// Builds the producer and consumer maps for every node of `graph` and its nested
/// subgraphs.
///
/// Value names are resolved lexically: the consuming node's own graph first, then each
/// enclosing graph outwards, so a name redeclared in a subgraph hides the outer one.
/// Values that resolve to a graph input or initializer have no producer node and yield
/// no link. When a subgraph consumes a value produced by a node in an enclosing graph,
/// the control-flow node owning that subgraph (and any control-flow node in between)
/// is also recorded as a consumer of that producer.
pub fn compute_linkage(graph: &Graph) -> NodeLinkage {
    let mut linker = Linker {
        scopes: vec![],
        owners: vec![],
        linkage: NodeLinkage::default(),
    };
    linker.link_graph(graph);
    log::debug!(
        "Linked {} nodes with {} producer/consumer pairs",
        graph.node_count_recursive(),
        linker.linkage.num_links()
    );
    linker.linkage
}

struct Linker<'a> {
    /// One map per graph on the path from the main graph to the graph being linked.
    scopes: Vec<HashMap<&'a str, Origin>>,
    /// `owners[i]` is the node in `scopes[i]` whose attribute holds `scopes[i + 1]`.
    owners: Vec<NodeId>,
    linkage: NodeLinkage,
}

impl<'a> Linker<'a> {
    fn link_graph(&mut self, graph: &'a Graph) {
        let depth = self.scopes.len();
        self.scopes.push(local_scope(graph));

        for node in &graph.nodes {
            for input in &node.inputs {
                // Empty names are omitted optional inputs.
                if !input.is_empty() {
                    self.link_input(input, node.id, depth);
                }
            }
            self.owners.push(node.id);
            for subgraph in node.subgraphs() {
                self.link_graph(subgraph);
            }
            self.owners.pop();
        }

        self.scopes.pop();
    }

    fn link_input(&mut self, name: &str, consumer: NodeId, depth: usize) {
        match self.resolve(name) {
            Some((found_depth, Origin::Node(producer))) => {
                self.linkage.add_link(producer, consumer);
                for owner in &self.owners[found_depth..depth] {
                    self.linkage.add_link(producer, *owner);
                }
            }
            Some((_, Origin::GraphInput | Origin::Initializer)) => {}
            None => {
                log::warn!("Value \"{name}\" consumed by node {consumer} is not declared");
                self.linkage.unresolved_inputs.insert(name.to_string());
            }
        }
    }

    fn resolve(&self, name: &str) -> Option<(usize, Origin)> {
        self.scopes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(depth, scope)| scope.get(name).map(|origin| (depth, *origin)))
    }
}

fn local_scope(graph: &Graph) -> HashMap<&str, Origin> {
    let mut scope = HashMap::new();
    for input in &graph.inputs {
        scope.insert(input.name.as_str(), Origin::GraphInput);
    }
    for name in graph.initializer_names() {
        scope.insert(name, Origin::Initializer);
    }
    for node in &graph.nodes {
        for output in &node.outputs {
            if !output.is_empty() {
                scope.insert(output.as_str(), Origin::Node(node.id));
            }
        }
    }
    scope
}
