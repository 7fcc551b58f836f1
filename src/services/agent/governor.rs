//! Iteration Governor
//!
//! Soft cap on planner turns. Past the cap the loop asks the operator
//! whether to continue; yes extends the cap by a fixed increment, anything
//! else stops the task.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::settings::GovernorSettings;
use crate::models::task::TaskState;

/// Where a turn leaves the loop. Completion and aborts are reported through
/// the task status instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernorState {
    Running,
    AwaitingConfirmation,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct IterationGovernor {
    cap_increment: u32,
}

impl IterationGovernor {
    pub fn new(cap_increment: u32) -> Self {
        Self { cap_increment }
    }

    pub fn from_settings(settings: &GovernorSettings) -> Self {
        Self::new(settings.cap_increment)
    }

    pub fn cap_increment(&self) -> u32 {
        self.cap_increment
    }

    /// Count a new turn. Returns `AwaitingConfirmation` once the count
    /// passes the cap.
    pub fn begin_turn(&self, state: &mut TaskState) -> GovernorState {
        state.iteration_count += 1;
        if state.iteration_count > state.iteration_cap {
            GovernorState::AwaitingConfirmation
        } else {
            GovernorState::Running
        }
    }

    /// Apply the operator's decision.
    pub fn resolve(&self, state: &mut TaskState, proceed: bool) -> GovernorState {
        if !proceed {
            info!(
                task_id = %state.task_id,
                iteration_count = state.iteration_count,
                "operator declined to continue"
            );
            return GovernorState::Stopped;
        }
        state.iteration_cap = state.iteration_cap.saturating_add(self.cap_increment);
        info!(
            task_id = %state.task_id,
            iteration_cap = state.iteration_cap,
            "iteration cap extended"
        );
        GovernorState::Running
    }

    /// Message shown to the operator when the cap is reached.
    pub fn confirmation_message(state: &TaskState) -> String {
        format!(
            "The agent has used {} of {} allowed turns. Continue?",
            state.iteration_count.saturating_sub(1),
            state.iteration_cap
        )
    }
}

impl Default for IterationGovernor {
    fn default() -> Self {
        Self::from_settings(&GovernorSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_turns(governor: &IterationGovernor, state: &mut TaskState, turns: u32) -> GovernorState {
        let mut last = GovernorState::Running;
        for _ in 0..turns {
            last = governor.begin_turn(state);
        }
        last
    }

    #[test]
    fn test_sixth_turn_awaits_confirmation() {
        let governor = IterationGovernor::new(10);
        let mut state = TaskState::new(5);
        assert_eq!(run_turns(&governor, &mut state, 5), GovernorState::Running);
        assert_eq!(governor.begin_turn(&mut state), GovernorState::AwaitingConfirmation);
        assert_eq!(state.iteration_count, 6);
    }

    #[test]
    fn test_continue_extends_cap() {
        let governor = IterationGovernor::new(10);
        let mut state = TaskState::new(5);
        run_turns(&governor, &mut state, 6);
        assert_eq!(governor.resolve(&mut state, true), GovernorState::Running);
        assert_eq!(state.iteration_cap, 15);
        assert_eq!(run_turns(&governor, &mut state, 9), GovernorState::Running);
        assert_eq!(governor.begin_turn(&mut state), GovernorState::AwaitingConfirmation);
    }

    #[test]
    fn test_stop_keeps_count_and_cap() {
        let governor = IterationGovernor::new(10);
        let mut state = TaskState::new(5);
        run_turns(&governor, &mut state, 6);
        let next = governor.resolve(&mut state, false);
        assert_eq!(next, GovernorState::Stopped);
        assert_eq!(state.iteration_count, 6);
        assert_eq!(state.iteration_cap, 5);
    }

    #[test]
    fn test_confirmation_message() {
        let mut state = TaskState::new(5);
        state.iteration_count = 6;
        assert_eq!(
            IterationGovernor::confirmation_message(&state),
            "The agent has used 5 of 5 allowed turns. Continue?"
        );
    }
}
