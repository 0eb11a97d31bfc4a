use std::collections::{hash_map::Entry, HashMap};

use ndarray::Array1;

use crate::error::{InferenceError, ModelError};

use super::inbound::Message;

/// Per-node state of a propagation run: inbound messages and, once computed, the beliefs.
#[derive(Debug)]
pub struct Node {
    id: usize,
    label_count: usize,
    beliefs: Array1<f64>,
    messages: Vec<Message>,
    slots: HashMap<usize, usize>, // source node to message slot
}

impl Node {
    pub fn new(id: usize, label_count: usize) -> Self {
        Node {
            id,
            label_count,
            beliefs: Array1::zeros(label_count),
            messages: Vec::new(),
            slots: HashMap::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn label_count(&self) -> usize {
        self.label_count
    }

    pub fn beliefs(&self) -> &Array1<f64> {
        &self.beliefs
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, slot: usize) -> &Message {
        &self.messages[slot]
    }

    // Creates an inbound message from `source` and returns its slot; a node accepts one message per source
    pub fn add_message(&mut self, source: usize) -> Result<usize, InferenceError> {
        match self.slots.entry(source) {
            Entry::Occupied(_) => Err(InferenceError::DuplicateMessage {
                sender: source,
                receiver: self.id,
            }),
            Entry::Vacant(entry) => {
                let slot = self.messages.len();
                entry.insert(slot);
                self.messages.push(Message::new(source, self.label_count));
                Ok(slot)
            }
        }
    }

    pub fn message_slot(&self, source: usize) -> Option<usize> {
        self.slots.get(&source).copied()
    }

    pub fn reset_messages(&mut self) {
        self.messages.iter_mut().for_each(Message::reset);
        self.beliefs.fill(0.);
    }

    // Sum of the logs of all inbound messages for a label, skipping the message in slot `excluded`
    pub fn log_sum_excluding(&self, label: usize, excluded: Option<usize>) -> f64 {
        self.messages
            .iter()
            .enumerate()
            .filter(|(slot, _)| Some(*slot) != excluded)
            .map(|(_, message)| message.logs()[label])
            .sum()
    }

    // Normalizes and commits every inbound message, returns the largest change among them
    pub fn update(&mut self) -> f64 {
        self.messages
            .iter_mut()
            .map(|message| {
                message.normalize_working();
                message.commit()
            })
            .fold(0., f64::max)
    }

    /// Computes the normalized beliefs of the node from its unary costs and all inbound messages.
    ///
    /// The exponent of every label is shifted by the largest exponent before `exp`,
    /// so the most likely label contributes exactly 1 to the normalizing sum.
    pub fn compute_beliefs(
        &mut self,
        unary_cost: impl Fn(usize) -> Result<f64, ModelError>,
    ) -> Result<(), ModelError> {
        let mut exponents = Array1::zeros(self.label_count);
        for (label, exponent) in exponents.iter_mut().enumerate() {
            *exponent = self.log_sum_excluding(label, None) - unary_cost(label)?;
        }
        let max = exponents.fold(f64::NEG_INFINITY, |max: f64, value| max.max(*value));

        self.beliefs = exponents.mapv(|exponent| (exponent - max).exp());
        let sum = self.beliefs.sum();
        self.beliefs /= sum;
        Ok(())
    }

    // Index of the label with the largest belief, ties go to the smaller index
    pub fn max_belief_label(&self) -> usize {
        let mut best = 0;
        for (label, belief) in self.beliefs.iter().enumerate() {
            if *belief > self.beliefs[best] {
                best = label;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn construct_node_example_1() -> Node {
        let mut node = Node::new(2, 2);
        node.add_message(0).unwrap();
        node.add_message(5).unwrap();
        node
    }

    #[test]
    fn duplicate_sources_are_rejected() {
        let mut node = construct_node_example_1();
        assert_eq!(node.message_slot(5), Some(1));
        assert_eq!(node.message_slot(1), None);
        assert!(matches!(
            node.add_message(0),
            Err(InferenceError::DuplicateMessage {
                sender: 0,
                receiver: 2
            })
        ));
    }

    #[test]
    fn slots_follow_insertion_order_for_many_sources() {
        let mut node = Node::new(0, 2);
        for source in (1..=20_000).rev() {
            node.add_message(source).unwrap();
        }
        assert_eq!(node.messages().len(), 20_000);
        assert_eq!(node.message_slot(20_000), Some(0));
        assert_eq!(node.message_slot(1), Some(19_999));
        assert_eq!(node.message(node.message_slot(7).unwrap()).source(), 7);
        assert!(node.add_message(5_000).is_err());
        assert_eq!(node.messages().len(), 20_000);
    }

    #[test]
    fn update_commits_all_messages() {
        let mut node = construct_node_example_1();
        node.message(0).working().assign(&array![3., 1.]);
        node.message(1).working().assign(&array![1., 1.]);

        assert_eq!(node.update(), 0.75);
        assert_eq!(node.message(0).committed(), &array![0.75, 0.25]);
        assert_eq!(node.message(1).committed(), &array![0.5, 0.5]);
        assert!((node.log_sum_excluding(0, None) - (0.75f64.ln() + 0.5f64.ln())).abs() < 1e-15);
        assert!((node.log_sum_excluding(0, Some(1)) - 0.75f64.ln()).abs() < 1e-15);
    }

    #[test]
    fn beliefs_combine_unary_costs_and_messages() {
        let mut node = construct_node_example_1();
        node.message(0).working().assign(&array![3., 1.]);
        node.update();
        node.compute_beliefs(|label| Ok([0., 2f64.ln()][label])).unwrap();

        // 0.75 * 1 against 0.25 * 0.5
        let beliefs = node.beliefs();
        assert!((beliefs[0] - 6. / 7.).abs() < 1e-12);
        assert!((beliefs[1] - 1. / 7.).abs() < 1e-12);
        assert_eq!(node.max_belief_label(), 0);
    }

    #[test]
    fn beliefs_survive_huge_costs() {
        let mut node = Node::new(0, 3);
        node.compute_beliefs(|label| Ok([1e30, 1e30 + 1e15, 1e30][label]))
            .unwrap();
        assert_eq!(node.beliefs(), &array![0.5, 0., 0.5]);
    }

    #[test]
    fn model_errors_are_propagated() {
        let mut node = Node::new(0, 2);
        let result = node.compute_beliefs(|label| {
            Err(ModelError::LabelOutOfRange {
                node: 0,
                label,
                label_count: 0,
            })
        });
        assert!(result.is_err());
    }
}
