// src/dag/state.rs

//! Three-way partition of the node set for one scheduling run.

use tracing::warn;

/// Where a node currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Not yet submitted.
    ToRun,
    /// Submitted; completion not yet observed.
    Running,
    /// Completion observed.
    Completed,
}

/// `to_run`, `running` and `completed` are disjoint and together cover every
/// node exactly once. Nodes only ever move forward:
/// `ToRun -> Running -> Completed`.
#[derive(Debug, Clone)]
pub struct RunState {
    to_run: Vec<usize>,
    running: Vec<usize>,
    completed: Vec<usize>,
    states: Vec<NodeState>,
}

impl RunState {
    /// Seed every node into `to_run`, in the given worklist order.
    pub fn new(order: Vec<usize>) -> Self {
        let states = vec![NodeState::ToRun; order.len()];
        Self {
            to_run: order,
            running: Vec::new(),
            completed: Vec::new(),
            states,
        }
    }

    pub fn to_run(&self) -> &[usize] {
        &self.to_run
    }

    pub fn running(&self) -> &[usize] {
        &self.running
    }

    /// Completed nodes, in the order their completion was observed.
    pub fn completed(&self) -> &[usize] {
        &self.completed
    }

    pub fn state_of(&self, idx: usize) -> NodeState {
        self.states[idx]
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Move `idx` from `to_run` to `running`. Returns false (and changes
    /// nothing) if the node was not in `to_run`.
    pub fn start(&mut self, idx: usize) -> bool {
        if self.states[idx] != NodeState::ToRun {
            warn!(node = idx, state = ?self.states[idx], "refusing to start node twice");
            return false;
        }
        self.to_run.retain(|&i| i != idx);
        self.running.push(idx);
        self.states[idx] = NodeState::Running;
        true
    }

    /// Move `idx` from `running` to `completed`. Returns false (and changes
    /// nothing) if the node was not running.
    pub fn complete(&mut self, idx: usize) -> bool {
        if self.states[idx] != NodeState::Running {
            warn!(node = idx, state = ?self.states[idx], "refusing to complete node that is not running");
            return false;
        }
        self.running.retain(|&i| i != idx);
        self.completed.push(idx);
        self.states[idx] = NodeState::Completed;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_only_move_forward() {
        let mut state = RunState::new(vec![2, 0, 1]);
        assert_eq!(state.to_run(), &[2, 0, 1]);

        assert!(!state.complete(0), "cannot skip running");
        assert!(state.start(0));
        assert!(!state.start(0), "cannot start twice");
        assert!(state.complete(0));
        assert!(!state.complete(0));

        assert_eq!(state.to_run(), &[2, 1]);
        assert!(state.running().is_empty());
        assert_eq!(state.completed(), &[0]);
        assert_eq!(state.state_of(0), NodeState::Completed);
        assert_eq!(state.len(), 3);
    }
}
