//! The task-scheduling collaborator.
//!
//! Promises never run a continuation on the caller's stack. Every reaction
//! is handed to a [`Scheduler`] as a [`Job`] and runs on a later turn.

use std::cell::RefCell;
use std::collections::VecDeque;

/// A unit of work handed to the scheduler.
pub type Job = Box<dyn FnOnce()>;

/// Runs jobs later, in the order they were scheduled.
///
/// `schedule` must never run the job before returning.
pub trait Scheduler {
    fn schedule(&self, job: Job);

    /// Runs the oldest pending job. Returns `false` when there was none.
    fn run_next(&self) -> bool;

    fn is_idle(&self) -> bool;
}

/// Single-threaded FIFO queue of jobs.
#[derive(Default)]
pub struct MicrotaskQueue {
    jobs: RefCell<VecDeque<Job>>,
}

impl MicrotaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.borrow().is_empty()
    }
}

impl Scheduler for MicrotaskQueue {
    fn schedule(&self, job: Job) {
        self.jobs.borrow_mut().push_back(job);
    }

    fn run_next(&self) -> bool {
        // The queue must not stay borrowed while the job runs: jobs schedule more jobs.
        let job = self.jobs.borrow_mut().pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    fn is_idle(&self) -> bool {
        self.is_empty()
    }
}
