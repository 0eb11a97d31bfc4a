use ndarray::Array1;
use parking_lot::{Mutex, MutexGuard};

/// Smallest value a committed message entry can take, keeps logs finite.
pub const MIN_BELIEF: f64 = 1e-6;

/// Message sent to a node by one of its neighbours, indexed by the labels of the receiving node.
///
/// `committed` and `logs` hold the values of the previous iteration and are only changed by [`Message::commit`].
/// `working` receives the values computed during the current iteration.
/// It is written by exactly one edge computation per iteration, the lock only makes that write visible to shared readers.
#[derive(Debug)]
pub struct Message {
    source: usize,
    committed: Array1<f64>,
    logs: Array1<f64>, // ln(committed), elementwise
    working: Mutex<Array1<f64>>,
}

impl Message {
    pub fn new(source: usize, label_count: usize) -> Self {
        Message {
            source,
            committed: Array1::ones(label_count),
            logs: Array1::zeros(label_count),
            working: Mutex::new(Array1::ones(label_count)),
        }
    }

    pub fn source(&self) -> usize {
        self.source
    }

    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    pub fn committed(&self) -> &Array1<f64> {
        &self.committed
    }

    pub fn logs(&self) -> &Array1<f64> {
        &self.logs
    }

    pub fn working(&self) -> MutexGuard<'_, Array1<f64>> {
        self.working.lock()
    }

    // Restores the neutral message: every committed value 1, every log 0
    pub fn reset(&mut self) {
        self.committed.fill(1.);
        self.logs.fill(0.);
        self.working.get_mut().fill(1.);
    }

    // Scales the working values to sum to 1; a zero sum is left untouched
    pub fn normalize_working(&mut self) {
        let working = self.working.get_mut();
        let sum = working.sum();
        if sum > 0. {
            *working /= sum;
        }
    }

    /// Moves the working values into the committed ones and returns the largest absolute change.
    ///
    /// Committed values are floored at [`MIN_BELIEF`] and their logs are refreshed.
    pub fn commit(&mut self) -> f64 {
        let working = self.working.get_mut();
        let mut delta: f64 = 0.;
        for ((committed, log), value) in self
            .committed
            .iter_mut()
            .zip(self.logs.iter_mut())
            .zip(working.iter())
        {
            delta = delta.max((*committed - value).abs());
            *committed = value.max(MIN_BELIEF);
            *log = committed.ln();
        }
        delta
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn new_message_is_neutral() {
        let message = Message::new(3, 2);
        assert_eq!(message.source(), 3);
        assert_eq!(message.len(), 2);
        assert_eq!(message.committed(), &array![1., 1.]);
        assert_eq!(message.logs(), &array![0., 0.]);
    }

    #[test]
    fn commit_reports_largest_change() {
        let mut message = Message::new(0, 3);
        message.working().assign(&array![2., 1., 1.]);
        message.normalize_working();
        assert_eq!(*message.working(), array![0.5, 0.25, 0.25]);

        let delta = message.commit();
        assert_eq!(delta, 0.75);
        assert_eq!(message.committed(), &array![0.5, 0.25, 0.25]);
        assert!((message.logs()[0] - 0.5f64.ln()).abs() < 1e-15);

        // Committing the same values again changes nothing
        assert_eq!(message.commit(), 0.);
    }

    #[test]
    fn committed_values_are_floored() {
        let mut message = Message::new(0, 2);
        message.working().assign(&array![1., 0.]);
        message.commit();
        assert_eq!(message.committed()[1], MIN_BELIEF);
        assert_eq!(message.logs()[1], MIN_BELIEF.ln());
        assert!(message.logs().iter().all(|log| log.is_finite()));
    }

    #[test]
    fn zero_sum_is_not_normalized() {
        let mut message = Message::new(0, 2);
        message.working().fill(0.);
        message.normalize_working();
        assert_eq!(*message.working(), array![0., 0.]);
    }

    #[test]
    fn reset_restores_neutral_values() {
        let mut message = Message::new(0, 2);
        message.working().assign(&array![0.9, 0.1]);
        message.commit();
        message.reset();
        assert_eq!(message.committed(), &array![1., 1.]);
        assert_eq!(message.logs(), &array![0., 0.]);
        assert_eq!(*message.working(), array![1., 1.]);
    }
}
