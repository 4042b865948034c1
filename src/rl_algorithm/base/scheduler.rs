use serde::{Deserialize, Serialize};

/// What the countdown counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateMode {
    TimeSteps,
    Episodes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Collecting,
    Updating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    Continue,
    Update,
}

/// Fires an update cycle once every `update_interval` counted events.
#[derive(Debug, Clone)]
pub struct UpdateScheduler {
    mode: UpdateMode,
    update_interval: usize,
    do_updates: bool,
    countdown: usize,
    state: SchedulerState,
    cycles_fired: usize,
}

impl UpdateScheduler {
    pub fn new(mode: UpdateMode, update_interval: usize, do_updates: bool) -> Self {
        let update_interval = update_interval.max(1);
        Self {
            mode,
            update_interval,
            do_updates,
            countdown: update_interval,
            state: SchedulerState::Collecting,
            cycles_fired: 0,
        }
    }

    /// Called once per environment step. On `Update` the scheduler is in
    /// `Updating` until `finish_update` is called.
    pub fn on_step(&mut self, terminal: bool) -> ScheduleDecision {
        let counts = match self.mode {
            UpdateMode::TimeSteps => true,
            UpdateMode::Episodes => terminal,
        };
        if !counts {
            return ScheduleDecision::Continue;
        }
        self.countdown -= 1;
        if self.countdown > 0 {
            return ScheduleDecision::Continue;
        }
        self.countdown = self.update_interval;
        if !self.do_updates {
            return ScheduleDecision::Continue;
        }
        self.state = SchedulerState::Updating;
        self.cycles_fired += 1;
        ScheduleDecision::Update
    }

    pub fn finish_update(&mut self) {
        self.state = SchedulerState::Collecting;
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn countdown(&self) -> usize {
        self.countdown
    }

    pub fn cycles_fired(&self) -> usize {
        self.cycles_fired
    }
}
