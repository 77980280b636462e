use super::{ExecState, TestStatus};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

/// Admits at most one test at a time.
#[derive(Clone, Default)]
pub struct RunGuard {
    executing: Arc<AtomicBool>,
    completed: Arc<AtomicU64>,
}

impl RunGuard {
    /// Claim the guard, or return `None` if a test is already executing.
    pub fn try_acquire(&self) -> Option<Run> {
        self.executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Run {
            executing: self.executing.clone(),
            completed: self.completed.clone(),
        })
    }

    pub fn status(&self) -> TestStatus {
        let state = if self.executing.load(Ordering::Acquire) {
            ExecState::Executing
        } else {
            ExecState::Idle
        };
        TestStatus {
            state,
            tests_completed: self.completed.load(Ordering::Acquire),
        }
    }
}

/// A claimed [RunGuard], released on drop.
pub struct Run {
    executing: Arc<AtomicBool>,
    completed: Arc<AtomicU64>,
}

impl Run {
    /// Count the test as completed and release the guard.
    pub fn complete(self) {
        self.completed.fetch_add(1, Ordering::AcqRel);
    }
}

impl Drop for Run {
    fn drop(&mut self) {
        self.executing.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive() {
        let guard = RunGuard::default();
        let run = guard.try_acquire().unwrap();
        assert!(guard.try_acquire().is_none());
        assert_eq!(guard.status().state, ExecState::Executing);
        run.complete();
        assert_eq!(
            guard.status(),
            TestStatus {
                state: ExecState::Idle,
                tests_completed: 1
            }
        );

        // Dropping without completing releases but does not count
        let run = guard.try_acquire().unwrap();
        drop(run);
        assert_eq!(guard.status().tests_completed, 1);
        assert!(guard.try_acquire().is_some());
    }
}
