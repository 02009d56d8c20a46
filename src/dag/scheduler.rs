// src/dag/scheduler.rs

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::graph::{DagGraph, DagNode};
use crate::dag::scheduler_step::{RoundReport, ScheduleReport};
use crate::dag::state::RunState;
use crate::errors::{BatchdagError, Result};

/// Boxed future returned by the scheduling hooks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default pause between two poll rounds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Hooks that give the generic loop its meaning.
///
/// The scheduler decides *when* a node may be submitted; the policy decides
/// what submitting means, how completion is observed and when the run is over.
pub trait SchedulePolicy<N>: Send {
    /// Start `node`. Called exactly once per node, only after all of its
    /// prerequisites have been observed complete.
    fn submit<'a>(&'a mut self, node: &'a mut N) -> BoxFuture<'a, Result<()>>;

    /// Whether a submitted node has finished. Must not change backend state.
    fn is_complete<'a>(&'a mut self, node: &'a mut N) -> BoxFuture<'a, Result<bool>>;

    /// Checked before every round; the main loop stops once this holds.
    fn is_finished(&self, state: &RunState) -> bool;

    /// Keep polling nodes that are still running after the main loop ended.
    fn drain_running(&self) -> bool {
        false
    }
}

/// Knobs for one scheduling run.
#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    /// Upper bound on nodes in flight; `None` means unbounded.
    pub max_concurrent: Option<usize>,
    /// Pause between poll rounds.
    pub poll_interval: Duration,
    /// Abort with [`BatchdagError::DeadlineExceeded`] once this instant passes.
    pub deadline: Option<Instant>,
    /// Abort with [`BatchdagError::Cancelled`] once this token fires.
    pub cancel: CancellationToken,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            max_concurrent: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl ScheduleOptions {
    pub fn with_max_concurrent(mut self, max: Option<usize>) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Deadline `timeout` from now. A timeout too large to represent means
    /// no deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Generic DAG executor driven by polling.
///
/// Each round:
/// 1. scan `to_run` in worklist order and pick every node whose
///    prerequisites are all completed, as long as the concurrency bound
///    allows (nodes picked earlier in the same round count against it);
/// 2. submit the picked nodes and move them to `running`;
/// 3. poll every running node and move finished ones to `completed`;
/// 4. sleep for the poll interval.
///
/// The loop is a single logical thread of control: submits and polls are
/// awaited one after the other, never concurrently.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    options: ScheduleOptions,
}

impl Scheduler {
    pub fn new(options: ScheduleOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ScheduleOptions {
        &self.options
    }

    /// Drive `nodes` to completion under `policy`.
    ///
    /// Fails before submitting anything if the nodes do not form a DAG.
    /// Any hook error aborts the run immediately; nodes already submitted
    /// keep running on their backend.
    pub async fn schedule<N, P>(&self, nodes: &mut [N], policy: &mut P) -> Result<ScheduleReport>
    where
        N: DagNode + Send,
        P: SchedulePolicy<N> + ?Sized,
    {
        let graph = DagGraph::build(&*nodes)?;
        let order = graph.topological_order()?;
        let mut state = RunState::new(order);
        let mut report = ScheduleReport::default();

        info!(
            nodes = nodes.len(),
            max_concurrent = ?self.options.max_concurrent,
            "scheduling started"
        );

        while !policy.is_finished(&state) {
            self.check_interrupted()?;

            let round = report.rounds.len() + 1;
            let running_before = state.running().len();
            let scheduled = self.collect_schedulable(&*nodes, &state);

            if scheduled.is_empty() && state.running().is_empty() && !state.to_run().is_empty() {
                return Err(BatchdagError::ConfigError(format!(
                    "no node can start (max_concurrent = {:?}, {} waiting)",
                    self.options.max_concurrent,
                    state.to_run().len()
                )));
            }

            for &idx in &scheduled {
                debug!(round, node = %nodes[idx].name(), "submitting node");
                policy.submit(&mut nodes[idx]).await?;
            }
            for &idx in &scheduled {
                state.start(idx);
            }

            let newly_completed = poll_running(nodes, &mut state, policy).await?;
            self.record_round(
                &mut report,
                RoundReport {
                    round,
                    running_before,
                    scheduled: scheduled.iter().map(|&i| nodes[i].name().to_string()).collect(),
                    newly_completed,
                },
                &state,
            );

            if policy.is_finished(&state) {
                break;
            }
            self.pause().await?;
        }

        if policy.drain_running() {
            while !state.running().is_empty() {
                self.pause().await?;
                self.check_interrupted()?;

                let round = report.rounds.len() + 1;
                let running_before = state.running().len();
                let newly_completed = poll_running(nodes, &mut state, policy).await?;
                self.record_round(
                    &mut report,
                    RoundReport {
                        round,
                        running_before,
                        scheduled: Vec::new(),
                        newly_completed,
                    },
                    &state,
                );
            }
        }

        info!(
            rounds = report.rounds.len(),
            completed = state.completed().len(),
            still_running = state.running().len(),
            "scheduling finished"
        );
        Ok(report)
    }

    fn collect_schedulable<N: DagNode>(&self, nodes: &[N], state: &RunState) -> Vec<usize> {
        let completed: HashSet<&str> = state
            .completed()
            .iter()
            .map(|&i| nodes[i].name())
            .collect();

        let mut scheduled = Vec::new();
        for &idx in state.to_run() {
            let has_capacity = match self.options.max_concurrent {
                None => true,
                Some(max) => state.running().len() + scheduled.len() < max,
            };
            if has_capacity && nodes[idx].can_start(&completed) {
                scheduled.push(idx);
            }
        }
        scheduled
    }

    fn record_round(&self, report: &mut ScheduleReport, round: RoundReport, state: &RunState) {
        if !round.scheduled.is_empty() || !round.newly_completed.is_empty() {
            info!(
                round = round.round,
                scheduled = ?round.scheduled,
                completed = ?round.newly_completed,
                waiting = state.to_run().len(),
                running = state.running().len(),
                "poll round"
            );
        }
        report
            .completion_order
            .extend(round.newly_completed.iter().cloned());
        report.rounds.push(round);
    }

    fn check_interrupted(&self) -> Result<()> {
        if self.options.cancel.is_cancelled() {
            warn!("scheduling cancelled");
            return Err(BatchdagError::Cancelled);
        }
        if let Some(deadline) = self.options.deadline {
            if Instant::now() >= deadline {
                warn!("scheduling deadline exceeded");
                return Err(BatchdagError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Sleep for the poll interval unless cancelled or out of time first.
    async fn pause(&self) -> Result<()> {
        let deadline = async {
            match self.options.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(self.options.poll_interval) => Ok(()),
            _ = self.options.cancel.cancelled() => Err(BatchdagError::Cancelled),
            _ = deadline => Err(BatchdagError::DeadlineExceeded),
        }
    }
}

async fn poll_running<N, P>(nodes: &mut [N], state: &mut RunState, policy: &mut P) -> Result<Vec<String>>
where
    N: DagNode + Send,
    P: SchedulePolicy<N> + ?Sized,
{
    let mut newly_completed = Vec::new();
    for idx in state.running().to_vec() {
        if policy.is_complete(&mut nodes[idx]).await? {
            state.complete(idx);
            debug!(node = %nodes[idx].name(), "node completed");
            newly_completed.push(nodes[idx].name().to_string());
        }
    }
    Ok(newly_completed)
}
