//! Synchronization for one parallel call site.
//!
//! A parallel call spawns one real OS thread per argument split (see
//! [`crate::call`]) and gives each worker a [`Scope`](crate::scope::Scope)
//! pinned to a [`ThreadManager`]. Inside the callee body, `barrier "name"`
//! rendezvous every worker at that name, and `mutex "name"` serializes
//! access to it in a direction-aware turn order: forward runs hand the
//! mutex off thread 0, 1, 2, ...; a call site running backward (because an
//! enclosing scope uncalled it) hands it off in the reverse order, so that
//! undoing a parallel call retraces the exact same interleaving it took
//! going forward.
//!
//! No module in the teacher codebase spawns real OS threads — it evaluates
//! a single-threaded bytecode VM — so this file is grounded on the general
//! `std::thread`/`Condvar` worker-pool idiom (panic flag shared through an
//! `AtomicBool`, barrier-style rendezvous) rather than on a specific teacher
//! source file.

use std::{
    collections::HashMap,
    sync::{Arc, Barrier, Condvar, Mutex},
};

use crate::error::{ErrorKind, RunError, RunResult};

/// Shared synchronization context for the workers of one parallel call.
pub struct ThreadManager {
    num_threads: usize,
    barriers: Mutex<HashMap<String, Arc<Barrier>>>,
    mutexes: Mutex<HashMap<String, Arc<MutexInstance>>>,
    panicked: Arc<std::sync::atomic::AtomicBool>,
}

impl ThreadManager {
    #[must_use]
    pub fn new(num_threads: usize) -> Arc<Self> {
        Arc::new(Self {
            num_threads,
            barriers: Mutex::new(HashMap::new()),
            mutexes: Mutex::new(HashMap::new()),
            panicked: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        })
    }

    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Marks the parallel call as failed, so sibling workers blocked on a
    /// barrier or mutex wake up with [`ErrorKind::SympatheticError`] instead
    /// of hanging forever.
    pub fn mark_panicked(&self) {
        self.panicked.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_panicked(&self) -> bool {
        self.panicked.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn barrier(&self, name: &str) -> Arc<Barrier> {
        let mut barriers = self.barriers.lock().expect("barrier map poisoned");
        Arc::clone(
            barriers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Barrier::new(self.num_threads))),
        )
    }

    /// Blocks the calling worker until all `num_threads` workers have
    /// reached the barrier named `name`.
    ///
    /// # Errors
    /// Returns [`ErrorKind::SympatheticError`] if a sibling worker already
    /// panicked, since the barrier can then never complete.
    pub fn wait_barrier(&self, name: &str) -> RunResult<()> {
        if self.is_panicked() {
            return Err(RunError::new(ErrorKind::SympatheticError, "a sibling thread panicked"));
        }
        self.barrier(name).wait();
        if self.is_panicked() {
            return Err(RunError::new(ErrorKind::SympatheticError, "a sibling thread panicked"));
        }
        Ok(())
    }

    fn mutex(&self, name: &str) -> Arc<MutexInstance> {
        let num_threads = self.num_threads;
        let mut mutexes = self.mutexes.lock().expect("mutex map poisoned");
        Arc::clone(
            mutexes
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MutexInstance::new(num_threads))),
        )
    }

    /// Blocks `thread_num` until it is its turn to hold the mutex named
    /// `name`, per `forward`'s turn order.
    ///
    /// # Errors
    /// Returns [`ErrorKind::SympatheticError`] if a sibling worker already
    /// panicked while holding the mutex.
    pub fn acquire_mutex(&self, name: &str, thread_num: usize, forward: bool) -> RunResult<()> {
        self.mutex(name).acquire(thread_num, forward, &self.panicked)
    }

    /// Releases the mutex named `name`, letting the next thread in turn
    /// order proceed.
    pub fn release_mutex(&self, name: &str, thread_num: usize, forward: bool) {
        self.mutex(name).release(thread_num, forward);
    }
}

/// A direction-aware mutex: at most one thread holds it at a time, and the
/// order threads may acquire it in is `0, 1, ..., n-1` running forward or
/// `n-1, ..., 0` running backward. Turns cycle modulo `num_threads` so the
/// same named mutex can be acquired and released repeatedly within a loop.
struct MutexInstance {
    num_threads: usize,
    state: Mutex<MutexState>,
    condvar: Condvar,
}

struct MutexState {
    /// Monotonically increasing turn counter; `turn % num_threads` combined
    /// with the current direction picks the one thread allowed to acquire.
    turn: usize,
    held: bool,
}

impl MutexInstance {
    fn new(num_threads: usize) -> Self {
        Self {
            num_threads,
            state: Mutex::new(MutexState { turn: 0, held: false }),
            condvar: Condvar::new(),
        }
    }

    fn expected_thread(&self, turn: usize, forward: bool) -> usize {
        let position = turn % self.num_threads;
        if forward {
            position
        } else {
            self.num_threads - 1 - position
        }
    }

    fn acquire(
        &self,
        thread_num: usize,
        forward: bool,
        panicked: &std::sync::atomic::AtomicBool,
    ) -> RunResult<()> {
        let mut guard = self.state.lock().expect("mutex state poisoned");
        loop {
            if panicked.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(RunError::new(ErrorKind::SympatheticError, "a sibling thread panicked"));
            }
            if !guard.held && self.expected_thread(guard.turn, forward) == thread_num {
                guard.held = true;
                return Ok(());
            }
            guard = self
                .condvar
                .wait_timeout(guard, std::time::Duration::from_millis(50))
                .expect("mutex condvar poisoned")
                .0;
        }
    }

    fn release(&self, thread_num: usize, forward: bool) {
        let mut guard = self.state.lock().expect("mutex state poisoned");
        debug_assert_eq!(self.expected_thread(guard.turn, forward), thread_num);
        guard.held = false;
        guard.turn += 1;
        self.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barrier_releases_after_all_threads_arrive() {
        let manager = ThreadManager::new(2);
        std::thread::scope(|scope| {
            let m1 = Arc::clone(&manager);
            let m2 = Arc::clone(&manager);
            let h1 = scope.spawn(move || m1.wait_barrier("sync"));
            let h2 = scope.spawn(move || m2.wait_barrier("sync"));
            assert!(h1.join().unwrap().is_ok());
            assert!(h2.join().unwrap().is_ok());
        });
    }

    #[test]
    fn panicked_call_unblocks_waiting_barrier() {
        let manager = ThreadManager::new(2);
        manager.mark_panicked();
        assert_eq!(manager.wait_barrier("sync").unwrap_err().kind, ErrorKind::SympatheticError);
    }

    #[test]
    fn mutex_acquire_release_round_trips() {
        let manager = ThreadManager::new(1);
        manager.acquire_mutex("m", 0, true).unwrap();
        manager.release_mutex("m", 0, true);
        manager.acquire_mutex("m", 0, true).unwrap();
        manager.release_mutex("m", 0, true);
    }

    #[test]
    fn mutex_enforces_direction_aware_turn_order() {
        let manager = ThreadManager::new(3);
        let order = Mutex::new(Vec::new());
        std::thread::scope(|scope| {
            for thread_num in 0..3usize {
                let manager = &manager;
                let order = &order;
                scope.spawn(move || {
                    manager.acquire_mutex("m", thread_num, false).unwrap();
                    order.lock().unwrap().push(thread_num);
                    manager.release_mutex("m", thread_num, false);
                });
            }
        });
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }
}
