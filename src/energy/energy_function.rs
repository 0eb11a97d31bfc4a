use crate::error::ModelError;

/// Cost reported for a zero potential.
/// Large enough to exclude a labeling, small enough that sums of many such costs stay finite.
pub const INFINITE_COST: f64 = 1e30;

/// Interface of a pairwise energy function over a graph with discrete labels.
///
/// Nodes are indexed by `0..node_count()`, edges by `0..edge_count()`.
/// Labels of a node are referred to by their position in `labels(node)`.
/// Every index argument is checked; out-of-range indices produce a `ModelError`.
///
/// The cost of a potential `p` is `-ln(p)`, with `p == 0` mapped to [`INFINITE_COST`].
pub trait EnergyFunction: Sync {
    type Label;

    fn node_count(&self) -> usize;
    fn edge_count(&self) -> usize;

    fn labels(&self, node: usize) -> Result<&[Self::Label], ModelError>;

    fn label_count(&self, node: usize) -> Result<usize, ModelError> {
        self.labels(node).map(|labels| labels.len())
    }

    // Returns the (i, j) pair of node indices connected by an edge
    fn endpoints(&self, edge: usize) -> Result<(usize, usize), ModelError>;

    fn unary_potential(&self, node: usize, label: usize) -> Result<f64, ModelError>;

    // `label_i` belongs to the first endpoint of the edge, `label_j` to the second one
    fn pairwise_potential(
        &self,
        edge: usize,
        label_i: usize,
        label_j: usize,
    ) -> Result<f64, ModelError>;

    fn unary_cost(&self, node: usize, label: usize) -> Result<f64, ModelError> {
        potential_to_cost(self.unary_potential(node, label)?)
    }

    fn pairwise_cost(
        &self,
        edge: usize,
        label_i: usize,
        label_j: usize,
    ) -> Result<f64, ModelError> {
        potential_to_cost(self.pairwise_potential(edge, label_i, label_j)?)
    }
}

// Converts a potential into a cost
pub fn potential_to_cost(potential: f64) -> Result<f64, ModelError> {
    if !potential.is_finite() || potential < 0. {
        return Err(ModelError::InvalidPotential { value: potential });
    }
    if potential == 0. {
        Ok(INFINITE_COST)
    } else {
        Ok(-potential.ln())
    }
}

pub fn check_node(node: usize, node_count: usize) -> Result<(), ModelError> {
    match node < node_count {
        true => Ok(()),
        false => Err(ModelError::NodeOutOfRange { node, node_count }),
    }
}

pub fn check_edge(edge: usize, edge_count: usize) -> Result<(), ModelError> {
    match edge < edge_count {
        true => Ok(()),
        false => Err(ModelError::EdgeOutOfRange { edge, edge_count }),
    }
}

pub fn check_label(node: usize, label: usize, label_count: usize) -> Result<(), ModelError> {
    match label < label_count {
        true => Ok(()),
        false => Err(ModelError::LabelOutOfRange {
            node,
            label,
            label_count,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_is_negative_log_of_potential() {
        assert_eq!(potential_to_cost(1.).unwrap(), 0.);
        assert!((potential_to_cost(0.5).unwrap() - 2f64.ln()).abs() < 1e-12);
        assert!((potential_to_cost(std::f64::consts::E).unwrap() + 1.).abs() < 1e-12);
    }

    #[test]
    fn zero_potential_maps_to_sentinel() {
        assert_eq!(potential_to_cost(0.).unwrap(), INFINITE_COST);
    }

    #[test]
    fn invalid_potentials_are_rejected() {
        assert!(matches!(
            potential_to_cost(-1.),
            Err(ModelError::InvalidPotential { .. })
        ));
        assert!(potential_to_cost(f64::NAN).is_err());
        assert!(potential_to_cost(f64::INFINITY).is_err());
    }

    #[test]
    fn bounds_checks() {
        assert!(check_node(2, 3).is_ok());
        assert_eq!(
            check_node(3, 3),
            Err(ModelError::NodeOutOfRange {
                node: 3,
                node_count: 3
            })
        );
        assert!(check_edge(0, 0).is_err());
        assert_eq!(
            check_label(1, 4, 4),
            Err(ModelError::LabelOutOfRange {
                node: 1,
                label: 4,
                label_count: 4
            })
        );
    }
}
