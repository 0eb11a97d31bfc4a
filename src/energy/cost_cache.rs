use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::{data_structures::jagged_arrays::JaggedArray2, error::ModelError};

use super::energy_function::{check_edge, check_label, check_node, EnergyFunction};

// Bit pattern of an empty slot: a NaN payload that no cost can take
const UNSET: u64 = 0x7ff8_0000_dead_beef;

fn new_slot() -> AtomicU64 {
    AtomicU64::new(UNSET)
}

// Returns the cached value of a slot, computing and publishing it on a miss
fn cached(
    slot: &AtomicU64,
    compute: impl FnOnce() -> Result<f64, ModelError>,
) -> Result<f64, ModelError> {
    let bits = slot.load(Ordering::Acquire);
    if bits != UNSET {
        return Ok(f64::from_bits(bits));
    }
    let cost = compute()?;
    slot.store(cost.to_bits(), Ordering::Release);
    Ok(cost)
}

/// Memoizes the unary and pairwise costs of a model.
///
/// Slots are allocated once: one per node label and one per label pair of every edge.
/// Concurrent readers may race on an empty slot;
/// they compute the same cost and publish identical bits.
/// Potentials are not cached.
pub struct CostCache<M> {
    inner: M,
    unary: JaggedArray2<AtomicU64>,    // indexed by [node, label]
    pairwise: JaggedArray2<AtomicU64>, // indexed by [edge, label_i * label_count_j + label_j]
    pairwise_shape: Vec<(usize, usize)>,
}

impl<M: EnergyFunction> CostCache<M> {
    pub fn new(inner: M) -> Result<Self, ModelError> {
        let label_counts = (0..inner.node_count())
            .map(|node| inner.label_count(node))
            .collect::<Result<Vec<_>, _>>()?;
        let pairwise_shape = (0..inner.edge_count())
            .map(|edge| {
                let (i, j) = inner.endpoints(edge)?;
                check_node(i, label_counts.len())?;
                check_node(j, label_counts.len())?;
                Ok((label_counts[i], label_counts[j]))
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        let unary = JaggedArray2::from_lengths(label_counts.iter().copied(), new_slot);
        let pairwise = JaggedArray2::from_lengths(
            pairwise_shape.iter().map(|(rows, cols)| rows * cols),
            new_slot,
        );
        debug!(
            "Allocated cost cache with {} unary and {} pairwise slots",
            unary.iter().len(),
            pairwise.iter().len()
        );

        Ok(CostCache {
            inner,
            unary,
            pairwise,
            pairwise_shape,
        })
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    // Gives mutable access to the wrapped model; the cache is cleared since potentials may change
    pub fn inner_mut(&mut self) -> &mut M {
        self.clear_cache();
        &mut self.inner
    }

    // Marks every slot as empty without reallocating
    pub fn clear_cache(&mut self) {
        for slot in self.unary.iter_mut().chain(self.pairwise.iter_mut()) {
            *slot.get_mut() = UNSET;
        }
    }
}

impl<M: EnergyFunction> EnergyFunction for CostCache<M> {
    type Label = M::Label;

    fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    fn labels(&self, node: usize) -> Result<&[M::Label], ModelError> {
        self.inner.labels(node)
    }

    fn label_count(&self, node: usize) -> Result<usize, ModelError> {
        self.inner.label_count(node)
    }

    fn endpoints(&self, edge: usize) -> Result<(usize, usize), ModelError> {
        self.inner.endpoints(edge)
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
        self.inner.pairwise_potential(edge, label_i, label_j)
    }

    fn unary_cost(&self, node: usize, label: usize) -> Result<f64, ModelError> {
        check_node(node, self.unary.len())?;
        check_label(node, label, self.unary.inner_len(node))?;
        cached(self.unary.get([node, label]), || {
            self.inner.unary_cost(node, label)
        })
    }

    fn pairwise_cost(
        &self,
        edge: usize,
        label_i: usize,
        label_j: usize,
    ) -> Result<f64, ModelError> {
        check_edge(edge, self.pairwise_shape.len())?;
        let (rows, cols) = self.pairwise_shape[edge];
        let (i, j) = self.inner.endpoints(edge)?;
        check_label(i, label_i, rows)?;
        check_label(j, label_j, cols)?;
        cached(self.pairwise.get([edge, label_i * cols + label_j]), || {
            self.inner.pairwise_cost(edge, label_i, label_j)
        })
    }
}
