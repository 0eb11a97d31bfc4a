use std::{ops::Range, time::Instant};

use log::{debug, info};
use ndarray::{Array1, Array2};

use crate::{
    data_structures::{
        jagged_arrays::JaggedArray2,
        partition::{partition, split_mut},
    },
    energy::energy_function::{check_node, EnergyFunction},
    error::{InferenceError, ModelError},
    message::node::Node,
};

use super::{
    options::SolverOptions,
    strategy::PropagationKind,
    worker_pool::{CancelHandle, WorkerPool},
};

// Chunks per worker in every phase
const CHUNKS_PER_WORKER: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initialized,
    Iterating,
    Converged,
    BudgetExhausted,
    BeliefsComputed,
}

// A message wired along an edge
#[derive(Debug, Clone)]
struct Link {
    source: usize,
    target: usize,
    slot: usize,                 // slot of the message in the target node
    reverse_slot: Option<usize>, // slot of the message from target in the source node, if any
    swap: bool,
}

/// Sum-product belief propagation over an [`EnergyFunction`].
///
/// `init` wires the messages of a model, `solve` iterates until the largest message change
/// drops below `eps` or the iteration budget is spent, then computes beliefs.
/// Every iteration runs two barrier-separated phases on the worker pool:
/// edges compute working messages from the committed values of the previous iteration,
/// then nodes normalize and commit their inbound messages.
pub struct PropagationEngine {
    kind: PropagationKind,
    options: SolverOptions,
    pool: WorkerPool,
    cancel: CancelHandle,
    nodes: Vec<Node>,
    links: JaggedArray2<Link>, // links of every edge
    edge_chunks: Vec<Range<usize>>,
    node_chunks: Vec<Range<usize>>,
    edge_count: usize,
    state: EngineState,
    converged: bool,
    iterations: usize,
    last_delta: f64,
}

impl PropagationEngine {
    pub fn new(kind: PropagationKind, options: SolverOptions) -> Result<Self, InferenceError> {
        options.validate()?;
        let pool = WorkerPool::new(options.worker_count())?;
        Ok(PropagationEngine {
            kind,
            options,
            pool,
            cancel: CancelHandle::default(),
            nodes: Vec::new(),
            links: JaggedArray2::from(Vec::new()),
            edge_chunks: Vec::new(),
            node_chunks: Vec::new(),
            edge_count: 0,
            state: EngineState::Uninitialized,
            converged: false,
            iterations: 0,
            last_delta: f64::INFINITY,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    // Largest message change of the last iteration
    pub fn last_delta(&self) -> f64 {
        self.last_delta
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Allocates nodes and messages for a model and partitions its edges and nodes into chunks.
    ///
    /// Fails if two messages would enter the same node from the same source,
    /// which happens for parallel edges that were not collapsed.
    pub fn init<M: EnergyFunction>(&mut self, model: &M) -> Result<(), InferenceError> {
        self.state = EngineState::Uninitialized;
        let node_count = model.node_count();
        let edge_count = model.edge_count();

        let mut nodes = Vec::with_capacity(node_count);
        for node in 0..node_count {
            let label_count = model.label_count(node)?;
            if label_count == 0 {
                return Err(ModelError::EmptyLabelSet { node }.into());
            }
            nodes.push(Node::new(node, label_count));
        }

        let mut links = Vec::with_capacity(edge_count);
        for edge in 0..edge_count {
            let endpoints = model.endpoints(edge)?;
            check_node(endpoints.0, node_count)?;
            check_node(endpoints.1, node_count)?;

            let mut edge_links = Vec::with_capacity(2);
            for direction in self.kind.directions(endpoints) {
                let slot = nodes[direction.target].add_message(direction.source)?;
                edge_links.push(Link {
                    source: direction.source,
                    target: direction.target,
                    slot,
                    reverse_slot: None,
                    swap: direction.swap,
                });
            }
            links.push(edge_links);
        }
        for link in links.iter_mut().flatten() {
            link.reverse_slot = nodes[link.source].message_slot(link.target);
        }

        let chunk_count = CHUNKS_PER_WORKER * self.options.worker_count();
        self.edge_chunks = partition(edge_count, chunk_count);
        self.node_chunks = partition(node_count, chunk_count);
        self.nodes = nodes;
        self.links = links.into();
        self.edge_count = edge_count;
        self.converged = false;
        self.iterations = 0;
        self.last_delta = f64::INFINITY;
        self.state = EngineState::Initialized;

        debug!(
            "Initialized {:?} propagation with {} nodes, {} edges, {} messages in {} edge chunks and {} node chunks",
            self.kind,
            node_count,
            edge_count,
            self.nodes.iter().map(|node| node.messages().len()).sum::<usize>(),
            self.edge_chunks.len(),
            self.node_chunks.len()
        );
        Ok(())
    }

    /// Runs propagation from neutral messages and computes beliefs.
    ///
    /// Returns whether the messages converged; beliefs are computed in either case.
    /// On error or cancellation the engine returns to the initialized state and no beliefs are available.
    pub fn solve<M: EnergyFunction>(&mut self, model: &M) -> Result<bool, InferenceError> {
        if self.state == EngineState::Uninitialized {
            return Err(InferenceError::NotInitialized);
        }
        self.check_shape(model)?;

        let start = Instant::now();
        self.nodes.iter_mut().for_each(Node::reset_messages);
        self.converged = false;
        self.iterations = 0;
        self.last_delta = f64::INFINITY;
        self.state = EngineState::Iterating;

        match self.run(model) {
            Ok(converged) => {
                match converged {
                    true => info!(
                        "Converged after {} iterations in {:?}",
                        self.iterations,
                        start.elapsed()
                    ),
                    false => info!(
                        "Stopped after {} iterations in {:?} with max delta {:.3e}",
                        self.iterations,
                        start.elapsed(),
                        self.last_delta
                    ),
                }
                Ok(converged)
            }
            Err(error) => {
                self.state = EngineState::Initialized;
                Err(error)
            }
        }
    }

    fn check_shape<M: EnergyFunction>(&self, model: &M) -> Result<(), InferenceError> {
        if model.node_count() != self.nodes.len() || model.edge_count() != self.edge_count {
            return Err(InferenceError::ShapeMismatch {
                expected_nodes: self.nodes.len(),
                expected_edges: self.edge_count,
                nodes: model.node_count(),
                edges: model.edge_count(),
            });
        }
        for node in &self.nodes {
            let found = model.label_count(node.id())?;
            if found != node.label_count() {
                return Err(InferenceError::LabelCountMismatch {
                    node: node.id(),
                    expected: node.label_count(),
                    found,
                });
            }
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), InferenceError> {
        match self.cancel.is_cancelled() {
            true => Err(InferenceError::Cancelled),
            false => Ok(()),
        }
    }

    fn run<M: EnergyFunction>(&mut self, model: &M) -> Result<bool, InferenceError> {
        while self.iterations < self.options.max_iterations() {
            self.check_cancelled()?;
            self.message_phase(model)?;
            self.check_cancelled()?;
            let delta = self.update_phase()?;

            self.iterations += 1;
            self.last_delta = delta;
            debug!("Iteration {}: max delta {:.3e}", self.iterations, delta);

            if delta < self.options.eps() {
                self.converged = true;
                break;
            }
        }
        self.state = match self.converged {
            true => EngineState::Converged,
            false => EngineState::BudgetExhausted,
        };

        self.check_cancelled()?;
        self.belief_phase(model)?;
        self.state = EngineState::BeliefsComputed;
        Ok(self.converged)
    }

    // Computes the working values of every message from the committed values of the previous iteration
    fn message_phase<M: EnergyFunction>(&self, model: &M) -> Result<(), InferenceError> {
        let (nodes, links) = (&self.nodes, &self.links);
        self.pool.dispatch(self.edge_chunks.clone(), |edges: Range<usize>| {
            for edge in edges {
                for link in links.inner(edge) {
                    compute_message(model, nodes, edge, link)?;
                }
            }
            Ok(0.)
        })?;
        Ok(())
    }

    // Normalizes and commits all messages, returns the largest change
    fn update_phase(&mut self) -> Result<f64, InferenceError> {
        let chunks = split_mut(&mut self.nodes, &self.node_chunks);
        self.pool.dispatch(chunks, |chunk: &mut [Node]| {
            Ok(chunk.iter_mut().map(Node::update).fold(0., f64::max))
        })
    }

    fn belief_phase<M: EnergyFunction>(&mut self, model: &M) -> Result<(), InferenceError> {
        let chunks = split_mut(&mut self.nodes, &self.node_chunks);
        self.pool.dispatch(chunks, |chunk: &mut [Node]| {
            for node in chunk.iter_mut() {
                let id = node.id();
                node.compute_beliefs(|label| model.unary_cost(id, label))?;
            }
            Ok(0.)
        })?;
        Ok(())
    }

    pub fn beliefs(&self, node: usize) -> Result<&Array1<f64>, InferenceError> {
        if self.state != EngineState::BeliefsComputed {
            return Err(InferenceError::BeliefsUnavailable);
        }
        check_node(node, self.nodes.len())?;
        Ok(self.nodes[node].beliefs())
    }

    // Label index with the largest belief for every node
    pub fn max_belief_labels(&self) -> Result<Vec<usize>, InferenceError> {
        if self.state != EngineState::BeliefsComputed {
            return Err(InferenceError::BeliefsUnavailable);
        }
        Ok(self.nodes.iter().map(Node::max_belief_label).collect())
    }
}

/// Computes the working values of the message sent along `link`.
///
/// For every target label `y`, sums over source labels `x` the exponent of
/// `-unary_cost(source, x) - pairwise_cost(x, y) + logs of all messages into source except the one from target`,
/// shifted by the largest exponent over all `(x, y)` pairs.
fn compute_message<M: EnergyFunction>(
    model: &M,
    nodes: &[Node],
    edge: usize,
    link: &Link,
) -> Result<(), InferenceError> {
    let source = &nodes[link.source];
    let target = &nodes[link.target];

    let mut exponents = Array2::zeros((source.label_count(), target.label_count()));
    for x in 0..source.label_count() {
        let incoming =
            source.log_sum_excluding(x, link.reverse_slot) - model.unary_cost(link.source, x)?;
        for y in 0..target.label_count() {
            let pairwise = match link.swap {
                true => model.pairwise_cost(edge, y, x)?,
                false => model.pairwise_cost(edge, x, y)?,
            };
            exponents[[x, y]] = incoming - pairwise;
        }
    }
    let max = exponents.fold(f64::NEG_INFINITY, |max: f64, value| max.max(*value));

    let mut working = target.message(link.slot).working();
    working.fill(0.);
    for ((_, y), exponent) in exponents.indexed_iter() {
        working[y] += (exponent - max).exp();
    }
    Ok(())
}
