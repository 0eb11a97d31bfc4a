pub mod error;

pub mod data_structures {
    pub mod jagged_arrays;
    pub mod partition;
}

pub mod energy {
    pub mod cost_cache;
    pub mod edge_collapser;
    pub mod energy_function;
    pub mod graph_adapter;
    pub mod table;
    pub mod uai;
}

pub mod message {
    pub mod inbound;
    pub mod node;
}

pub mod alg {
    pub mod options;
    pub mod propagation;
    pub mod strategy;
    pub mod worker_pool;
}

pub mod inference {
    pub mod labeled;
}
