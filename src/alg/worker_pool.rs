use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crossbeam_channel::unbounded;
use log::trace;
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::InferenceError;

/// Shared flag for stopping a running solve between phases.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    // Clears a previous cancellation so the next solve can run
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Fixed-size pool of worker threads executing one phase at a time.
///
/// Every call to [`WorkerPool::dispatch`] is a barrier: it returns only after all chunks of the phase
/// are processed or a task has failed and all workers have stopped.
pub struct WorkerPool {
    pool: ThreadPool,
    worker_count: usize,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Result<Self, InferenceError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|index| format!("bp-worker-{}", index))
            .build()
            .map_err(|error| InferenceError::WorkerPool(error.to_string()))?;
        Ok(WorkerPool { pool, worker_count })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Runs `task` on every chunk and returns the largest value any task returned (0 for no chunks).
    ///
    /// Workers claim chunks from a shared queue one at a time until it is drained.
    /// The first error stops all workers from claiming further chunks and is returned after the barrier.
    pub fn dispatch<T, F>(&self, chunks: Vec<T>, task: F) -> Result<f64, InferenceError>
    where
        T: Send,
        F: Fn(T) -> Result<f64, InferenceError> + Sync,
    {
        let chunk_count = chunks.len();
        let (sender, receiver) = unbounded();
        for chunk in chunks {
            sender
                .send(chunk)
                .map_err(|_| InferenceError::WorkerPool("work queue disconnected".to_string()))?;
        }
        drop(sender);

        let stop = AtomicBool::new(false);
        let failure: Mutex<Option<InferenceError>> = Mutex::new(None);
        let maxima = Mutex::new(Vec::with_capacity(self.worker_count));

        self.pool.scope(|scope| {
            for _ in 0..self.worker_count {
                let receiver = receiver.clone();
                let (stop, failure, maxima, task) = (&stop, &failure, &maxima, &task);
                scope.spawn(move |_| {
                    let mut local_max: f64 = 0.;
                    while !stop.load(Ordering::Acquire) {
                        let Ok(chunk) = receiver.recv() else {
                            break;
                        };
                        match task(chunk) {
                            Ok(value) => local_max = local_max.max(value),
                            Err(error) => {
                                stop.store(true, Ordering::Release);
                                let mut failure = failure.lock();
                                if failure.is_none() {
                                    *failure = Some(error);
                                }
                                break;
                            }
                        }
                    }
                    maxima.lock().push(local_max);
                });
            }
        });

        if let Some(error) = failure.into_inner() {
            return Err(error);
        }
        trace!("Dispatched {} chunks to {} workers", chunk_count, self.worker_count);
        Ok(maxima.into_inner().into_iter().fold(0., f64::max))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::data_structures::partition::{partition, split_mut};

    #[test]
    fn every_chunk_is_processed_once() {
        let pool = WorkerPool::new(4).unwrap();
        let processed = AtomicUsize::new(0);
        let max = pool
            .dispatch(partition(1000, 40), |range| {
                processed.fetch_add(range.len(), Ordering::SeqCst);
                Ok(range.end as f64)
            })
            .unwrap();
        assert_eq!(processed.load(Ordering::SeqCst), 1000);
        assert_eq!(max, 1000.);
    }

    #[test]
    fn empty_phase_returns_zero() {
        let pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.dispatch(Vec::<usize>::new(), |_| Ok(1.)).unwrap(), 0.);
    }

    #[test]
    fn mutable_chunks_are_disjoint() {
        let pool = WorkerPool::new(3).unwrap();
        let mut values = vec![1usize; 100];
        let ranges = partition(values.len(), 30);
        pool.dispatch(split_mut(&mut values, &ranges), |chunk| {
            chunk.iter_mut().for_each(|value| *value += 1);
            Ok(0.)
        })
        .unwrap();
        assert!(values.iter().all(|value| *value == 2));
    }

    #[test]
    fn first_error_aborts_the_phase() {
        let pool = WorkerPool::new(4).unwrap();
        let result = pool.dispatch((0..100).collect(), |chunk: usize| match chunk {
            17 => Err(InferenceError::Cancelled),
            _ => Ok(chunk as f64),
        });
        assert!(matches!(result, Err(InferenceError::Cancelled)));

        // The pool stays usable after a failed phase
        assert_eq!(pool.dispatch(vec![3usize], |chunk| Ok(chunk as f64)).unwrap(), 3.);
    }

    #[test]
    fn cancel_handle_is_shared() {
        let handle = CancelHandle::default();
        let clone = handle.clone();
        assert!(!handle.is_cancelled());
        clone.cancel();
        assert!(handle.is_cancelled());
        handle.reset();
        assert!(!clone.is_cancelled());
    }
}
