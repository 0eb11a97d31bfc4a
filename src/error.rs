use std::io;

use thiserror::Error;

/// Contract violations detected at the boundary of an energy function.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("node {node} is out of range for a model with {node_count} nodes")]
    NodeOutOfRange { node: usize, node_count: usize },

    #[error("edge {edge} is out of range for a model with {edge_count} edges")]
    EdgeOutOfRange { edge: usize, edge_count: usize },

    #[error("label {label} is out of range for node {node} with {label_count} labels")]
    LabelOutOfRange {
        node: usize,
        label: usize,
        label_count: usize,
    },

    #[error("assigned label is not in the label set of node {node}")]
    UnknownLabel { node: usize },

    #[error("node {node} has an empty label set")]
    EmptyLabelSet { node: usize },

    #[error("table for edge {edge} has shape {found:?}, expected {expected:?}")]
    TableShape {
        edge: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("potential {value} is negative or not finite")]
    InvalidPotential { value: f64 },

    #[error("more than one node is named {0}")]
    DuplicateName(String),

    #[error("no node is named {0:?}")]
    UnknownName(String),
}

/// Errors raised by the propagation engine.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("node {receiver} already has an inbound message from node {sender}; collapse parallel edges first")]
    DuplicateMessage { sender: usize, receiver: usize },

    #[error("solve() was called before init()")]
    NotInitialized,

    #[error("model shape changed since init(): expected {expected_nodes} nodes and {expected_edges} edges, found {nodes} and {edges}")]
    ShapeMismatch {
        expected_nodes: usize,
        expected_edges: usize,
        nodes: usize,
        edges: usize,
    },

    #[error("node {node} had {expected} labels at init() but has {found} now")]
    LabelCountMismatch {
        node: usize,
        expected: usize,
        found: usize,
    },

    #[error("beliefs are only available after solve() has finished")]
    BeliefsUnavailable,

    #[error("invalid solver options: {0}")]
    InvalidOptions(String),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),

    #[error("propagation was cancelled")]
    Cancelled,
}

/// Errors raised while reading UAI model files.
#[derive(Debug, Error)]
pub enum UaiError {
    #[error("failed to read UAI file: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("only MARKOV models are supported, found {0:?}")]
    UnsupportedModelType(String),

    #[error("function {function} has arity {arity}; only unary and pairwise functions are supported")]
    UnsupportedArity { function: usize, arity: usize },

    #[error("unexpected end of file while reading {0}")]
    UnexpectedEof(&'static str),

    #[error(transparent)]
    Model(#[from] ModelError),
}
