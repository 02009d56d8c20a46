use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use batchdag::dag::BoxFuture;
use batchdag::errors::{BatchdagError, Result};
use batchdag::submit::JobSubmitter;
use batchdag::task::Job;

/// Something the fake backend observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    /// A batch was submitted under this name with these jobs.
    Submitted { dagname: String, jobs: Vec<String> },
    /// `is_complete` answered `true` for this job for the first time.
    Completed(String),
}

#[derive(Debug, Default)]
struct State {
    events: Vec<FakeEvent>,
    polls: HashMap<String, usize>,
    completed: HashSet<String>,
    failing: HashSet<String>,
}

/// A fake backend that:
/// - records every submitted batch;
/// - reports a job complete once it has been polled `polls_to_complete`
///   times (0 = complete on the first poll).
///
/// Clones share state, so a test can keep a handle while the scheduler owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct FakeSubmitter {
    state: Arc<Mutex<State>>,
    polls_to_complete: usize,
}

impl FakeSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep each job running for `polls` extra poll rounds.
    pub fn completing_after(polls: usize) -> Self {
        Self {
            polls_to_complete: polls,
            ..Self::default()
        }
    }

    /// Make `submit` fail for the batch named `dagname`.
    pub fn fail_batch(&self, dagname: &str) {
        self.lock().failing.insert(dagname.to_string());
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.lock().events.clone()
    }

    /// Batch names in submission order.
    pub fn submitted_batches(&self) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                FakeEvent::Submitted { dagname, .. } => Some(dagname.clone()),
                FakeEvent::Completed(_) => None,
            })
            .collect()
    }

    /// Job names whose completion was reported, in order.
    pub fn completed_jobs(&self) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                FakeEvent::Completed(job) => Some(job.clone()),
                FakeEvent::Submitted { .. } => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl JobSubmitter for FakeSubmitter {
    fn submit<'a>(
        &'a mut self,
        jobs: &'a mut [Job],
        dagname: Option<&'a str>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let dagname = dagname.unwrap_or("unnamed").to_string();
            let mut state = self.lock();
            if state.failing.contains(&dagname) {
                return Err(BatchdagError::CommandFailed {
                    program: "fake-submit".to_string(),
                    code: Some(1),
                    stderr: format!("refusing batch {dagname}"),
                });
            }
            if jobs.is_empty() {
                return Ok(());
            }
            let names: Vec<String> = jobs.iter().map(|j| j.name().to_string()).collect();
            for name in &names {
                state.polls.insert(name.clone(), 0);
            }
            state.events.push(FakeEvent::Submitted {
                dagname,
                jobs: names,
            });
            Ok(())
        })
    }

    fn is_complete<'a>(&'a mut self, job: &'a mut Job) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let name = job.name().to_string();
            let threshold = self.polls_to_complete;
            let mut state = self.lock();
            if state.completed.contains(&name) {
                return Ok(true);
            }
            let Some(polls) = state.polls.get_mut(&name) else {
                return Err(BatchdagError::NotSubmitted(name));
            };
            if *polls < threshold {
                *polls += 1;
                return Ok(false);
            }
            state.completed.insert(name.clone());
            state.events.push(FakeEvent::Completed(name));
            Ok(true)
        })
    }
}
