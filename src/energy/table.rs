use log::debug;
use ndarray::{Array1, Array2};

use crate::error::ModelError;

use super::energy_function::{check_edge, check_label, check_node, EnergyFunction};

// Stores the potentials of a pairwise term together with the nodes it connects
#[derive(Debug, Clone)]
struct PairwiseTable {
    endpoints: (usize, usize),
    potentials: Array2<f64>, // indexed by (label of first endpoint, label of second endpoint)
}

/// Energy function with explicitly tabulated potentials.
///
/// Labels of node `i` are the integers `0..domain_size(i)`.
/// Nodes without an explicit unary table have potential 1 for every label.
#[derive(Debug, Clone)]
pub struct TableEnergyFunction {
    labels: Vec<Vec<usize>>,
    unary: Vec<Array1<f64>>,
    pairwise: Vec<PairwiseTable>,
}

impl TableEnergyFunction {
    // Creates an energy function without edges and with neutral unary potentials
    pub fn from_domain_sizes(domain_sizes: &[usize]) -> Result<Self, ModelError> {
        if let Some(node) = domain_sizes.iter().position(|size| *size == 0) {
            return Err(ModelError::EmptyLabelSet { node });
        }
        Ok(TableEnergyFunction {
            labels: domain_sizes
                .iter()
                .map(|domain_size| (0..*domain_size).collect())
                .collect(),
            unary: domain_sizes
                .iter()
                .map(|domain_size| Array1::ones(*domain_size))
                .collect(),
            pairwise: Vec::new(),
        })
    }

    // Reserves capacity for at least `additional` more pairwise tables
    pub fn reserve(&mut self, additional: usize) -> &mut Self {
        self.pairwise.reserve(additional);
        self
    }

    pub fn domain_size(&self, node: usize) -> Result<usize, ModelError> {
        check_node(node, self.labels.len())?;
        Ok(self.labels[node].len())
    }

    // Overwrites the unary potentials of a node
    pub fn set_unary(
        &mut self,
        node: usize,
        potentials: Vec<f64>,
    ) -> Result<&mut Self, ModelError> {
        let domain_size = self.domain_size(node)?;
        if potentials.len() != domain_size {
            return Err(ModelError::LabelOutOfRange {
                node,
                label: potentials.len(),
                label_count: domain_size,
            });
        }
        check_potentials(potentials.iter())?;
        self.unary[node] = potentials.into();
        Ok(self)
    }

    // Adds a pairwise table between nodes `i` and `j` and returns the index of the new edge
    pub fn add_pairwise(
        &mut self,
        i: usize,
        j: usize,
        potentials: Array2<f64>,
    ) -> Result<usize, ModelError> {
        let expected = (self.domain_size(i)?, self.domain_size(j)?);
        let edge = self.pairwise.len();
        if potentials.dim() != expected {
            return Err(ModelError::TableShape {
                edge,
                expected,
                found: potentials.dim(),
            });
        }
        check_potentials(potentials.iter())?;

        debug!("Adding pairwise table {} between nodes {} and {}", edge, i, j);
        self.pairwise.push(PairwiseTable {
            endpoints: (i, j),
            potentials,
        });
        Ok(edge)
    }

    // Adds a pairwise table given in row-major order (labels of `j` vary fastest)
    pub fn add_pairwise_from_vec(
        &mut self,
        i: usize,
        j: usize,
        potentials: Vec<f64>,
    ) -> Result<usize, ModelError> {
        let shape = (self.domain_size(i)?, self.domain_size(j)?);
        let found = potentials.len();
        let table = Array2::from_shape_vec(shape, potentials).map_err(|_| {
            ModelError::TableShape {
                edge: self.pairwise.len(),
                expected: shape,
                found: (found, 1),
            }
        })?;
        self.add_pairwise(i, j, table)
    }
}

fn check_potentials<'a>(mut potentials: impl Iterator<Item = &'a f64>) -> Result<(), ModelError> {
    match potentials.find(|value| !value.is_finite() || **value < 0.) {
        Some(value) => Err(ModelError::InvalidPotential { value: *value }),
        None => Ok(()),
    }
}

impl EnergyFunction for TableEnergyFunction {
    type Label = usize;

    fn node_count(&self) -> usize {
        self.labels.len()
    }

    fn edge_count(&self) -> usize {
        self.pairwise.len()
    }

    fn labels(&self, node: usize) -> Result<&[usize], ModelError> {
        check_node(node, self.labels.len())?;
        Ok(&self.labels[node])
    }

    fn endpoints(&self, edge: usize) -> Result<(usize, usize), ModelError> {
        check_edge(edge, self.pairwise.len())?;
        Ok(self.pairwise[edge].endpoints)
    }

    fn unary_potential(&self, node: usize, label: usize) -> Result<f64, ModelError> {
        check_node(node, self.labels.len())?;
        check_label(node, label, self.unary[node].len())?;
        Ok(self.unary[node][label])
    }

    fn pairwise_potential(
        &self,
        edge: usize,
        label_i: usize,
        label_j: usize,
    ) -> Result<f64, ModelError> {
        check_edge(edge, self.pairwise.len())?;
        let table = &self.pairwise[edge];
        let (rows, cols) = table.potentials.dim();
        check_label(table.endpoints.0, label_i, rows)?;
        check_label(table.endpoints.1, label_j, cols)?;
        Ok(table.potentials[[label_i, label_j]])
    }
}
