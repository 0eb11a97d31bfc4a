use std::collections::HashMap;

use bitvec::vec::BitVec;
use log::debug;

use crate::{data_structures::jagged_arrays::JaggedArray2, error::ModelError};

use super::energy_function::{check_edge, check_label, EnergyFunction};

// Unordered pair of endpoints, stored as (smaller index, larger index)
type CanonicalKey = (usize, usize);

fn canonical_key(source: usize, target: usize) -> (CanonicalKey, bool) {
    match source > target {
        true => ((target, source), true),
        false => ((source, target), false),
    }
}

/// Groups original edges by their canonical key.
/// Edges can only be appended; `freeze()` turns the groups into the read-only table used for lookups.
pub struct CollapseBuilder {
    key_index: HashMap<CanonicalKey, usize>,
    keys: Vec<CanonicalKey>,
    groups: Vec<Vec<usize>>,
    flipped: BitVec,
}

impl CollapseBuilder {
    pub fn with_capacity(edge_capacity: usize) -> Self {
        CollapseBuilder {
            key_index: HashMap::with_capacity(edge_capacity),
            keys: Vec::with_capacity(edge_capacity),
            groups: Vec::with_capacity(edge_capacity),
            flipped: BitVec::with_capacity(edge_capacity),
        }
    }

    // Appends the next original edge; edges must be added in index order
    pub fn add(&mut self, source: usize, target: usize) -> &mut Self {
        let edge = self.flipped.len();
        let (key, is_flipped) = canonical_key(source, target);
        let next_index = self.keys.len();
        let index = *self.key_index.entry(key).or_insert(next_index);
        if index == next_index {
            self.keys.push(key);
            self.groups.push(Vec::new());
        }
        self.groups[index].push(edge);
        self.flipped.push(is_flipped);
        self
    }

    pub fn freeze(self) -> CanonicalEdges {
        CanonicalEdges {
            keys: self.keys,
            groups: self.groups.into(),
            flipped: self.flipped,
        }
    }
}

/// Read-only mapping from canonical edges to the original edges they represent.
#[derive(Debug, Clone)]
pub struct CanonicalEdges {
    keys: Vec<CanonicalKey>,
    groups: JaggedArray2<usize>, // original edges of every canonical edge
    flipped: BitVec,             // indexed by original edge, set if it points from the larger to the smaller endpoint
}

impl CanonicalEdges {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn endpoints(&self, edge: usize) -> (usize, usize) {
        self.keys[edge]
    }

    pub fn originals(&self, edge: usize) -> &[usize] {
        self.groups.inner(edge)
    }

    pub fn is_flipped(&self, original: usize) -> bool {
        self.flipped[original]
    }
}

/// Presents every set of parallel edges of a model as a single undirected edge.
///
/// The canonical edge between `i < j` has endpoints `(i, j)`.
/// Its potential is the product of the potentials of all original edges between `i` and `j`,
/// where edges originally directed from `j` to `i` are evaluated with swapped labels.
/// Products saturate at `f64::MAX`, so the collapsed cost stays finite.
pub struct EdgeCollapser<M> {
    inner: M,
    edges: CanonicalEdges,
}

impl<M: EnergyFunction> EdgeCollapser<M> {
    pub fn new(inner: M) -> Result<Self, ModelError> {
        let mut builder = CollapseBuilder::with_capacity(inner.edge_count());
        for edge in 0..inner.edge_count() {
            let (source, target) = inner.endpoints(edge)?;
            builder.add(source, target);
        }
        let edges = builder.freeze();

        debug!(
            "Collapsed {} edges into {} canonical edges",
            inner.edge_count(),
            edges.len()
        );

        Ok(EdgeCollapser { inner, edges })
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut M {
        &mut self.inner
    }

    pub fn canonical_edges(&self) -> &CanonicalEdges {
        &self.edges
    }
}

impl<M: EnergyFunction> EnergyFunction for EdgeCollapser<M> {
    type Label = M::Label;

    fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn labels(&self, node: usize) -> Result<&[M::Label], ModelError> {
        self.inner.labels(node)
    }

    fn label_count(&self, node: usize) -> Result<usize, ModelError> {
        self.inner.label_count(node)
    }

    fn endpoints(&self, edge: usize) -> Result<(usize, usize), ModelError> {
        check_edge(edge, self.edges.len())?;
        Ok(self.edges.endpoints(edge))
    }

    fn unary_potential(&self, node: usize, label: usize) -> Result<f64, ModelError> {
        self.inner.unary_potential(node, label)
    }

    fn pairwise_potential(
        &self,
        edge: usize,
        label_i: usize,
        label_j: usize,
    ) -> Result<f64, ModelError> {
        check_edge(edge, self.edges.len())?;
        let (i, j) = self.edges.endpoints(edge);
        check_label(i, label_i, self.inner.label_count(i)?)?;
        check_label(j, label_j, self.inner.label_count(j)?)?;

        let mut product: f64 = 1.;
        for &original in self.edges.originals(edge) {
            let potential = match self.edges.is_flipped(original) {
                true => self.inner.pairwise_potential(original, label_j, label_i)?,
                false => self.inner.pairwise_potential(original, label_i, label_j)?,
            };
            product *= potential;
            if product == f64::INFINITY && potential.is_finite() {
                product = f64::MAX;
            }
        }
        Ok(product)
    }

    fn unary_cost(&self, node: usize, label: usize) -> Result<f64, ModelError> {
        self.inner.unary_cost(node, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::{energy_function::INFINITE_COST, table::TableEnergyFunction};

    // Two parallel edges in opposite directions: (0, 1) with potential 1 everywhere
    // and (1, 0) with potential 0.5 everywhere, plus an unrelated edge (1, 2)
    fn construct_collapse_example_1() -> TableEnergyFunction {
        let mut model = TableEnergyFunction::from_domain_sizes(&[2, 3, 2]).unwrap();
        model.add_pairwise_from_vec(0, 1, vec![1.; 6]).unwrap();
        model.add_pairwise_from_vec(1, 0, vec![0.5; 6]).unwrap();
        model.add_pairwise_from_vec(1, 2, vec![2.; 6]).unwrap();
        model
    }

    #[test]
    fn builder_groups_by_canonical_key() {
        let mut builder = CollapseBuilder::with_capacity(4);
        builder.add(3, 1).add(1, 3).add(0, 2).add(1, 3);
        let edges = builder.freeze();

        assert_eq!(edges.len(), 2);
        assert_eq!(edges.endpoints(0), (1, 3));
        assert_eq!(edges.originals(0), &[0, 1, 3]);
        assert_eq!(edges.originals(1), &[2]);
        assert!(edges.is_flipped(0));
        assert!(!edges.is_flipped(1));
        assert!(!edges.is_flipped(3));
    }

    #[test]
    fn edge_count_is_number_of_distinct_pairs() {
        let collapser = EdgeCollapser::new(construct_collapse_example_1()).unwrap();
        assert_eq!(collapser.edge_count(), 2);
        assert_eq!(collapser.endpoints(0).unwrap(), (0, 1));
        assert_eq!(collapser.endpoints(1).unwrap(), (1, 2));
        assert!(matches!(
            collapser.endpoints(2),
            Err(ModelError::EdgeOutOfRange { .. })
        ));
    }

    #[test]
    fn collapsed_potential_is_product() {
        let collapser = EdgeCollapser::new(construct_collapse_example_1()).unwrap();
        for x in 0..2 {
            for y in 0..3 {
                assert_eq!(collapser.pairwise_potential(0, x, y).unwrap(), 0.5);
            }
        }
        assert_eq!(collapser.pairwise_potential(1, 2, 1).unwrap(), 2.);
    }

    #[test]
    fn flipped_edges_swap_labels() {
        let mut model = TableEnergyFunction::from_domain_sizes(&[2, 2]).unwrap();
        model.add_pairwise_from_vec(0, 1, vec![1., 2., 3., 4.]).unwrap();
        model.add_pairwise_from_vec(1, 0, vec![10., 20., 30., 40.]).unwrap();
        let collapser = EdgeCollapser::new(model).unwrap();

        // P1(x, y) * P2(y, x)
        assert_eq!(collapser.pairwise_potential(0, 0, 1).unwrap(), 2. * 30.);
        assert_eq!(collapser.pairwise_potential(0, 1, 0).unwrap(), 3. * 20.);
    }

    #[test]
    fn zero_potential_in_any_original_edge_gives_sentinel_cost() {
        let mut model = TableEnergyFunction::from_domain_sizes(&[2, 2]).unwrap();
        model.add_pairwise_from_vec(0, 1, vec![1e300; 4]).unwrap();
        model.add_pairwise_from_vec(1, 0, vec![0., 1., 1., 1.]).unwrap();
        let collapser = EdgeCollapser::new(model).unwrap();

        assert_eq!(collapser.pairwise_cost(0, 0, 0).unwrap(), INFINITE_COST);
        assert!((collapser.pairwise_cost(0, 1, 1).unwrap() + 1e300f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn huge_parallel_potentials_saturate() {
        let mut model = TableEnergyFunction::from_domain_sizes(&[2, 2]).unwrap();
        model.add_pairwise_from_vec(0, 1, vec![1e200; 4]).unwrap();
        model.add_pairwise_from_vec(0, 1, vec![1e200; 4]).unwrap();
        model.add_pairwise_from_vec(1, 0, vec![0., 1., 1., 1.]).unwrap();
        let collapser = EdgeCollapser::new(model).unwrap();

        assert_eq!(collapser.pairwise_potential(0, 0, 1).unwrap(), f64::MAX);
        assert_eq!(collapser.pairwise_cost(0, 0, 1).unwrap(), -f64::MAX.ln());
        assert_eq!(collapser.pairwise_cost(0, 0, 0).unwrap(), INFINITE_COST);
    }

    #[test]
    fn unary_and_labels_pass_through() {
        let mut model = construct_collapse_example_1();
        model.set_unary(2, vec![0.2, 0.8]).unwrap();
        let collapser = EdgeCollapser::new(model).unwrap();
        assert_eq!(collapser.unary_potential(2, 1).unwrap(), 0.8);
        assert_eq!(collapser.labels(1).unwrap(), &[0, 1, 2]);
        assert!(matches!(
            collapser.unary_potential(3, 0),
            Err(ModelError::NodeOutOfRange { .. })
        ));
    }
}
