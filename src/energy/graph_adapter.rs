use log::debug;
use petgraph::{
    graph::{DiGraph, EdgeIndex, NodeIndex},
    visit::EdgeRef,
};

use crate::error::ModelError;

use super::energy_function::{check_edge, check_label, check_node, EnergyFunction};

pub type AdapterGraph<N, E> = DiGraph<N, E, usize>;

/// Problem-specific source of labels and potentials for the nodes and edges of a graph.
pub trait PotentialFunction<N, E>: Sync {
    type Label: PartialEq + Sync;

    // Candidate labels of a node; the order fixes the label indices used by the solver
    fn labels(&self, graph: &AdapterGraph<N, E>, node: NodeIndex<usize>) -> Vec<Self::Label>;

    // `assigned` is the label previously assigned to the node, if any
    fn unary_potential(
        &self,
        graph: &AdapterGraph<N, E>,
        node: NodeIndex<usize>,
        label: &Self::Label,
        assigned: Option<&Self::Label>,
    ) -> f64;

    fn pairwise_potential(
        &self,
        graph: &AdapterGraph<N, E>,
        edge: EdgeIndex<usize>,
        source_label: &Self::Label,
        target_label: &Self::Label,
    ) -> f64;
}

/// Presents a directed graph and a [`PotentialFunction`] as an [`EnergyFunction`].
///
/// Label sets and edge endpoints are computed once at construction,
/// so the solver never walks the graph itself.
pub struct GraphAdapter<N, E, P>
where
    P: PotentialFunction<N, E>,
{
    graph: AdapterGraph<N, E>,
    potentials: P,
    labels: Vec<Vec<P::Label>>,
    edges: Vec<(EdgeIndex<usize>, usize, usize)>, // petgraph edge, source node, target node
    assigned: Vec<Option<usize>>,                 // index of the assigned label per node
}

impl<N, E, P> GraphAdapter<N, E, P>
where
    P: PotentialFunction<N, E>,
{
    pub fn new(graph: AdapterGraph<N, E>, potentials: P) -> Result<Self, ModelError> {
        debug!(
            "Constructing graph adapter for {} nodes and {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        let mut labels = Vec::with_capacity(graph.node_count());
        for node in graph.node_indices() {
            let node_labels = potentials.labels(&graph, node);
            if node_labels.is_empty() {
                return Err(ModelError::EmptyLabelSet { node: node.index() });
            }
            labels.push(node_labels);
        }

        let edges = graph
            .edge_references()
            .map(|edge| (edge.id(), edge.source().index(), edge.target().index()))
            .collect();
        let assigned = vec![None; graph.node_count()];

        Ok(GraphAdapter {
            graph,
            potentials,
            labels,
            edges,
            assigned,
        })
    }

    pub fn graph(&self) -> &AdapterGraph<N, E> {
        &self.graph
    }

    // Assigns a label to a node; the label must belong to the node's label set
    pub fn set_label(&mut self, node: usize, label: &P::Label) -> Result<(), ModelError> {
        check_node(node, self.labels.len())?;
        let index = self.labels[node]
            .iter()
            .position(|candidate| candidate == label)
            .ok_or(ModelError::UnknownLabel { node })?;
        self.assigned[node] = Some(index);
        Ok(())
    }

    pub fn unset_label(&mut self, node: usize) -> Result<(), ModelError> {
        check_node(node, self.labels.len())?;
        self.assigned[node] = None;
        Ok(())
    }

    // Forgets every assigned label
    pub fn clear_labels(&mut self) {
        self.assigned.iter_mut().for_each(|label| *label = None);
    }

    pub fn assigned_label(&self, node: usize) -> Result<Option<&P::Label>, ModelError> {
        check_node(node, self.labels.len())?;
        Ok(self.assigned[node].map(|index| &self.labels[node][index]))
    }
}

fn checked_potential(value: f64) -> Result<f64, ModelError> {
    match value.is_finite() && value >= 0. {
        true => Ok(value),
        false => Err(ModelError::InvalidPotential { value }),
    }
}

impl<N, E, P> EnergyFunction for GraphAdapter<N, E, P>
where
    N: Sync,
    E: Sync,
    P: PotentialFunction<N, E>,
{
    type Label = P::Label;

    fn node_count(&self) -> usize {
        self.labels.len()
    }

    fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn labels(&self, node: usize) -> Result<&[P::Label], ModelError> {
        check_node(node, self.labels.len())?;
        Ok(&self.labels[node])
    }

    fn endpoints(&self, edge: usize) -> Result<(usize, usize), ModelError> {
        check_edge(edge, self.edges.len())?;
        let (_, source, target) = self.edges[edge];
        Ok((source, target))
    }

    fn unary_potential(&self, node: usize, label: usize) -> Result<f64, ModelError> {
        check_node(node, self.labels.len())?;
        check_label(node, label, self.labels[node].len())?;
        let assigned = self.assigned[node].map(|index| &self.labels[node][index]);
        checked_potential(self.potentials.unary_potential(
            &self.graph,
            NodeIndex::new(node),
            &self.labels[node][label],
            assigned,
        ))
    }

    fn pairwise_potential(
        &self,
        edge: usize,
        label_i: usize,
        label_j: usize,
    ) -> Result<f64, ModelError> {
        check_edge(edge, self.edges.len())?;
        let (edge_index, source, target) = self.edges[edge];
        check_label(source, label_i, self.labels[source].len())?;
        check_label(target, label_j, self.labels[target].len())?;
        checked_potential(self.potentials.pairwise_potential(
            &self.graph,
            edge_index,
            &self.labels[source][label_i],
            &self.labels[target][label_j],
        ))
    }
}
