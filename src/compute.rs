//! Heavy compute worker: repeatedly snapshots the shared order book, builds
//! a matrix from it, and inverts it outside the lock.

use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::book::OrderBook;
use crate::matrix::Matrix;
use crate::state::RunState;

/// CPU-bound worker solving A·X = E against successive book snapshots
pub struct InversionWorker {
    book: Arc<Mutex<OrderBook>>,
    state: Arc<RunState>,
    dim: usize,
    tolerance: f64,
}

impl InversionWorker {
    pub fn new(
        book: Arc<Mutex<OrderBook>>,
        state: Arc<RunState>,
        dim: usize,
        tolerance: f64,
    ) -> Self {
        Self {
            book,
            state,
            dim,
            tolerance,
        }
    }

    /// Loop until the stop flag is set.
    ///
    /// The flag is checked once per iteration: an in-flight inversion always
    /// runs to completion (or is abandoned on a numeric failure), never torn
    /// mid-computation.
    pub fn run(&self) {
        while !self.state.is_stopped() {
            self.run_once();
        }
        debug!(
            completed = self.state.inversions_completed(),
            "compute worker stopped"
        );
    }

    /// One iteration: copy the book under the lock, do the O(n^3) work
    /// outside it.
    fn run_once(&self) {
        let snapshot = match self.book.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let a = Matrix::from_book(&snapshot, self.dim);
        match a.invert_checked(self.tolerance) {
            Ok(result) => {
                self.state.inc_inversions();
                debug!(residual = result.residual, "inversion completed");
            }
            Err(e) => warn!("abandoning inversion: {e}"),
        }
    }
}
