use std::{collections::HashMap, fmt::Debug, hash::Hash};

use log::debug;

use crate::{
    alg::{
        options::SolverOptions,
        propagation::PropagationEngine,
        strategy::PropagationKind,
        worker_pool::CancelHandle,
    },
    energy::{
        cost_cache::CostCache,
        edge_collapser::EdgeCollapser,
        energy_function::EnergyFunction,
        graph_adapter::{AdapterGraph, GraphAdapter, PotentialFunction},
    },
    error::{InferenceError, ModelError},
};

type Pipeline<N, E, P> = CostCache<EdgeCollapser<GraphAdapter<N, E, P>>>;

/// Belief propagation over a graph whose nodes are identified by name.
///
/// Node weights of the graph serve as names and must be unique.
/// Parallel edges are collapsed and costs are cached; the cache is cleared whenever evidence changes.
pub struct LabeledInference<N, E, P>
where
    P: PotentialFunction<N, E>,
{
    model: Pipeline<N, E, P>,
    engine: PropagationEngine,
    names: HashMap<N, usize>,
}

impl<N, E, P> LabeledInference<N, E, P>
where
    N: Hash + Eq + Clone + Debug + Sync,
    E: Sync,
    P: PotentialFunction<N, E>,
{
    pub fn new(
        graph: AdapterGraph<N, E>,
        potentials: P,
        options: SolverOptions,
    ) -> Result<Self, InferenceError> {
        let mut names = HashMap::with_capacity(graph.node_count());
        for node in graph.node_indices() {
            if names.insert(graph[node].clone(), node.index()).is_some() {
                return Err(ModelError::DuplicateName(format!("{:?}", graph[node])).into());
            }
        }

        let model = CostCache::new(EdgeCollapser::new(GraphAdapter::new(graph, potentials)?)?)?;
        let mut engine = PropagationEngine::new(PropagationKind::Undirected, options)?;
        engine.init(&model)?;
        debug!("Prepared labeled inference for {} named nodes", names.len());

        Ok(LabeledInference {
            model,
            engine,
            names,
        })
    }

    pub fn graph(&self) -> &AdapterGraph<N, E> {
        self.model.inner().inner().graph()
    }

    pub fn engine(&self) -> &PropagationEngine {
        &self.engine
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.engine.cancel_handle()
    }

    fn node(&self, name: &N) -> Result<usize, ModelError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::UnknownName(format!("{:?}", name)))
    }

    fn adapter_mut(&mut self) -> &mut GraphAdapter<N, E, P> {
        self.model.inner_mut().inner_mut()
    }

    // Records evidence for a node; takes effect on the next run
    pub fn set_label(&mut self, name: &N, label: &P::Label) -> Result<(), InferenceError> {
        let node = self.node(name)?;
        self.adapter_mut().set_label(node, label)?;
        Ok(())
    }

    pub fn unset_label(&mut self, name: &N) -> Result<(), InferenceError> {
        let node = self.node(name)?;
        self.adapter_mut().unset_label(node)?;
        Ok(())
    }

    pub fn clear_labels(&mut self) {
        self.adapter_mut().clear_labels();
    }

    // Runs propagation with the current evidence and returns whether it converged
    pub fn run(&mut self) -> Result<bool, InferenceError> {
        self.engine.solve(&self.model)
    }

    /// Beliefs of the named node from the last run, paired with their labels in label order.
    pub fn get_beliefs(&self, name: &N) -> Result<Vec<(&P::Label, f64)>, InferenceError> {
        let node = self.node(name)?;
        let beliefs = self.engine.beliefs(node)?;
        let labels = self.model.labels(node)?;
        Ok(labels.iter().zip(beliefs.iter().copied()).collect())
    }

    pub fn most_likely_label(&self, name: &N) -> Result<&P::Label, InferenceError> {
        let node = self.node(name)?;
        let labels = self.engine.max_belief_labels()?;
        Ok(&self.model.labels(node)?[labels[node]])
    }
}

#[cfg(test)]
mod tests {
    use petgraph::graph::{EdgeIndex, NodeIndex};

    use super::*;

    // Nodes are documents, edges carry how strongly two documents agree
    struct Agreement;

    impl PotentialFunction<&'static str, f64> for Agreement {
        type Label = &'static str;

        fn labels(
            &self,
            _graph: &AdapterGraph<&'static str, f64>,
            _node: NodeIndex<usize>,
        ) -> Vec<&'static str> {
            vec!["spam", "ham"]
        }

        fn unary_potential(
            &self,
            _graph: &AdapterGraph<&'static str, f64>,
            _node: NodeIndex<usize>,
            label: &&'static str,
            assigned: Option<&&'static str>,
        ) -> f64 {
            match assigned {
                Some(assigned) => (assigned == label) as usize as f64,
                None => 0.5,
            }
        }

        fn pairwise_potential(
            &self,
            graph: &AdapterGraph<&'static str, f64>,
            edge: EdgeIndex<usize>,
            source_label: &&'static str,
            target_label: &&'static str,
        ) -> f64 {
            match source_label == target_label {
                true => graph[edge],
                false => 1.,
            }
        }
    }

    fn construct_inference_example_1() -> LabeledInference<&'static str, f64, Agreement> {
        let mut graph = AdapterGraph::default();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");
        graph.add_edge(a, b, 2.);
        graph.add_edge(b, a, 3.);
        graph.add_edge(b, c, 4.);
        LabeledInference::new(graph, Agreement, SolverOptions::default()).unwrap()
    }

    #[test]
    fn no_evidence_gives_uniform_beliefs() {
        let mut inference = construct_inference_example_1();
        assert!(inference.run().unwrap());
        for name in ["a", "b", "c"] {
            for (_, belief) in inference.get_beliefs(&name).unwrap() {
                assert!((belief - 0.5).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn evidence_spreads_through_collapsed_edges() {
        let mut inference = construct_inference_example_1();
        inference.set_label(&"a", &"spam").unwrap();
        assert!(inference.run().unwrap());

        let a = inference.get_beliefs(&"a").unwrap();
        assert_eq!(a, vec![(&"spam", 1.), (&"ham", 0.)]);

        // Parallel edges multiply: agreeing labels have potential 2 * 3 against 1
        let b = inference.get_beliefs(&"b").unwrap();
        assert_eq!(b[0].0, &"spam");
        assert!((b[0].1 - 6. / 7.).abs() < 1e-9);
        assert_eq!(inference.most_likely_label(&"c").unwrap(), &"spam");
    }

    #[test]
    fn clearing_evidence_invalidates_cached_costs() {
        let mut inference = construct_inference_example_1();
        inference.set_label(&"c", &"ham").unwrap();
        inference.run().unwrap();
        assert_eq!(inference.most_likely_label(&"a").unwrap(), &"ham");

        inference.clear_labels();
        inference.run().unwrap();
        let beliefs = inference.get_beliefs(&"c").unwrap();
        assert!((beliefs[1].1 - 0.5).abs() < 1e-12);

        inference.set_label(&"c", &"spam").unwrap();
        inference.unset_label(&"c").unwrap();
        inference.run().unwrap();
        assert!((inference.get_beliefs(&"a").unwrap()[0].1 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn names_and_labels_are_checked() {
        let mut inference = construct_inference_example_1();
        assert!(matches!(
            inference.set_label(&"d", &"spam"),
            Err(InferenceError::Model(ModelError::UnknownName(_)))
        ));
        assert!(matches!(
            inference.set_label(&"a", &"eggs"),
            Err(InferenceError::Model(ModelError::UnknownLabel { node: 0 }))
        ));
        assert!(matches!(
            inference.get_beliefs(&"a"),
            Err(InferenceError::BeliefsUnavailable)
        ));
        assert_eq!(inference.graph().node_count(), 3);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut graph: AdapterGraph<&'static str, f64> = AdapterGraph::default();
        graph.add_node("a");
        graph.add_node("a");
        assert!(matches!(
            LabeledInference::new(graph, Agreement, SolverOptions::default()),
            Err(InferenceError::Model(ModelError::DuplicateName(_)))
        ));
    }
}
