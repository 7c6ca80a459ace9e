//! Worker group and lock-step collectives.
//!
//! A run is executed by a fixed group of workers, each owning one slab of
//! the grid. Workers only exchange data through the collectives below.
//! Every collective blocks until all workers of the group have entered it,
//! so every worker must issue the same sequence of collective calls. A
//! worker that skips or reorders one stalls the others; a worker that
//! panics aborts the whole group.
//!
//! [`ThreadComm`] runs the workers as threads of one process
//! ([`run_workers`]). [`SerialComm`] is the single-worker case.

use std::any::Any;
use std::sync::Arc;

use num_complex::Complex64;
use parking_lot::{Condvar, Mutex};

const GROUP_ABORTED: &str = "worker group aborted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Max,
    Sum,
}

impl ReduceOp {
    fn apply(self, acc: f64, value: f64) -> f64 {
        match self {
            ReduceOp::Max => acc.max(value),
            ReduceOp::Sum => acc + value,
        }
    }

    fn identity(self) -> f64 {
        match self {
            ReduceOp::Max => f64::NEG_INFINITY,
            ReduceOp::Sum => 0.0,
        }
    }
}

pub trait Communicator: Send {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn barrier(&self);

    /// Reduce one value per worker; every worker receives the result.
    ///
    /// Contributions are combined in rank order, so the result does not
    /// depend on arrival order.
    fn all_reduce(&self, value: f64, op: ReduceOp) -> f64;

    /// Personalised exchange: `outgoing[dst]` is delivered to worker `dst`.
    /// Returns the received blocks indexed by source rank.
    fn all_to_all(&self, outgoing: Vec<Vec<Complex64>>) -> Vec<Vec<Complex64>>;

    /// Collect one block per worker on rank 0, in rank order.
    fn gather(&self, local: Vec<f64>) -> Option<Vec<Vec<f64>>>;

    fn is_root(&self) -> bool {
        self.rank() == 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn all_reduce(&self, value: f64, _op: ReduceOp) -> f64 {
        value
    }

    fn all_to_all(&self, outgoing: Vec<Vec<Complex64>>) -> Vec<Vec<Complex64>> {
        assert_eq!(outgoing.len(), 1, "all_to_all needs one block per worker");
        outgoing
    }

    fn gather(&self, local: Vec<f64>) -> Option<Vec<Vec<f64>>> {
        Some(vec![local])
    }
}

// ============================================================================
// Thread-backed group
// ============================================================================

#[derive(Debug)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    aborted: bool,
}

/// Reusable barrier that can be torn down when a worker dies.
#[derive(Debug)]
struct GroupBarrier {
    size: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl GroupBarrier {
    fn new(size: usize) -> Self {
        Self {
            size,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
                aborted: false,
            }),
            cvar: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut state = self.state.lock();
        if state.aborted {
            drop(state);
            panic!("{GROUP_ABORTED}");
        }
        state.arrived += 1;
        if state.arrived == self.size {
            state.arrived = 0;
            state.generation += 1;
            self.cvar.notify_all();
            return;
        }
        let generation = state.generation;
        while state.generation == generation && !state.aborted {
            self.cvar.wait(&mut state);
        }
        if state.generation == generation {
            drop(state);
            panic!("{GROUP_ABORTED}");
        }
    }

    fn abort(&self) {
        let mut state = self.state.lock();
        state.aborted = true;
        self.cvar.notify_all();
    }
}

#[derive(Debug)]
struct Exchange {
    size: usize,
    barrier: GroupBarrier,
    scalars: Mutex<Vec<f64>>,
    // [dst][src]
    mailboxes: Mutex<Vec<Vec<Vec<Complex64>>>>,
    gathered: Mutex<Vec<Vec<f64>>>,
}

impl Exchange {
    fn new(size: usize) -> Self {
        Self {
            size,
            barrier: GroupBarrier::new(size),
            scalars: Mutex::new(vec![0.0; size]),
            mailboxes: Mutex::new(vec![vec![Vec::new(); size]; size]),
            gathered: Mutex::new(vec![Vec::new(); size]),
        }
    }
}

/// Handle of one worker in a thread-backed group.
#[derive(Debug, Clone)]
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Exchange>,
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn all_reduce(&self, value: f64, op: ReduceOp) -> f64 {
        self.shared.scalars.lock()[self.rank] = value;
        self.barrier();
        let reduced = self
            .shared
            .scalars
            .lock()
            .iter()
            .fold(op.identity(), |acc, &v| op.apply(acc, v));
        // Nobody may overwrite a slot before everyone has read it.
        self.barrier();
        reduced
    }

    fn all_to_all(&self, outgoing: Vec<Vec<Complex64>>) -> Vec<Vec<Complex64>> {
        assert_eq!(
            outgoing.len(),
            self.size(),
            "all_to_all needs one block per worker"
        );
        {
            let mut boxes = self.shared.mailboxes.lock();
            for (dst, block) in outgoing.into_iter().enumerate() {
                boxes[dst][self.rank] = block;
            }
        }
        self.barrier();
        let incoming = {
            let mut boxes = self.shared.mailboxes.lock();
            std::mem::replace(&mut boxes[self.rank], vec![Vec::new(); self.size()])
        };
        self.barrier();
        incoming
    }

    fn gather(&self, local: Vec<f64>) -> Option<Vec<Vec<f64>>> {
        self.shared.gathered.lock()[self.rank] = local;
        self.barrier();
        let collected = if self.is_root() {
            let mut slots = self.shared.gathered.lock();
            Some(std::mem::replace(&mut *slots, vec![Vec::new(); self.size()]))
        } else {
            None
        };
        self.barrier();
        collected
    }
}

struct AbortOnPanic(Arc<Exchange>);

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.barrier.abort();
        }
    }
}

/// Run `worker` on `size` threads, one per rank, and return the results in
/// rank order.
///
/// If any worker panics, the others are released from their collectives and
/// the original panic is re-raised here.
pub fn run_workers<T, F>(size: usize, worker: F) -> Vec<T>
where
    T: Send,
    F: Fn(ThreadComm) -> T + Sync,
{
    assert!(size > 0, "worker group needs at least one worker");
    let shared = Arc::new(Exchange::new(size));
    let worker = &worker;

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..size)
            .map(|rank| {
                let comm = ThreadComm {
                    rank,
                    shared: Arc::clone(&shared),
                };
                std::thread::Builder::new()
                    .name(format!("worker-{rank}"))
                    .spawn_scoped(scope, move || {
                        let _guard = AbortOnPanic(Arc::clone(&comm.shared));
                        worker(comm)
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        let mut results = Vec::with_capacity(size);
        let mut panics = Vec::new();
        for handle in handles {
            match handle.join() {
                Ok(value) => results.push(value),
                Err(payload) => panics.push(payload),
            }
        }
        if !panics.is_empty() {
            let root_cause = panics
                .iter()
                .position(|p| !is_group_abort(p.as_ref()))
                .unwrap_or(0);
            std::panic::resume_unwind(panics.swap_remove(root_cause));
        }
        results
    })
}

fn is_group_abort(payload: &(dyn Any + Send)) -> bool {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .is_some_and(|msg| msg == GROUP_ABORTED)
}
