// src/dag/scheduler_step.rs

/// What happened in one poll round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// 1-based round number.
    pub round: usize,
    /// Nodes already running when the round started.
    pub running_before: usize,
    /// Nodes submitted in this round, in submission order.
    pub scheduled: Vec<String>,
    /// Nodes whose completion was observed in this round.
    pub newly_completed: Vec<String>,
}

impl RoundReport {
    /// Nodes in flight right after this round's submissions.
    pub fn in_flight(&self) -> usize {
        self.running_before + self.scheduled.len()
    }
}

/// Summary of a finished `schedule` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    pub rounds: Vec<RoundReport>,
    /// Node names in the order their completion was observed.
    pub completion_order: Vec<String>,
}

impl ScheduleReport {
    /// Names in the order they were submitted.
    pub fn submission_order(&self) -> Vec<&str> {
        self.rounds
            .iter()
            .flat_map(|r| r.scheduled.iter().map(String::as_str))
            .collect()
    }

    /// Largest number of nodes in flight at any point of the run.
    pub fn max_in_flight(&self) -> usize {
        self.rounds.iter().map(RoundReport::in_flight).max().unwrap_or(0)
    }
}
