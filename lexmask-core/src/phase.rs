use std::time::Duration;

/// Defines experiment phases and their ordering
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + std::fmt::Debug + Default {
    fn allows_input(&self) -> bool;
    fn next(&self) -> Option<Self>;

    fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

/// Trial state machine.
///
/// Fixation, Stimulus, Mask and Feedback advance only on elapsed time.
/// ResponseWindow advances only on a decision or a timeout.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialPhase {
    #[default]
    Fixation,
    Stimulus,
    Mask,
    ResponseWindow,
    Feedback,
    Done,
}

/// Inputs to [`TrialPhase::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// A refresh was observed `elapsed` after phase onset; the phase asked for `minimum`.
    Elapsed { elapsed: Duration, minimum: Duration },
    Decision,
    Timeout,
}

impl Phase for TrialPhase {
    fn allows_input(&self) -> bool {
        matches!(self, Self::ResponseWindow)
    }

    fn next(&self) -> Option<Self> {
        use TrialPhase::*;
        Some(match self {
            Fixation => Stimulus,
            Stimulus => Mask,
            Mask => ResponseWindow,
            ResponseWindow => Feedback,
            Feedback => Done,
            Done => return None,
        })
    }
}

impl TrialPhase {
    /// Pure transition function. Returns `self` when the event does not
    /// resolve the current phase.
    pub fn transition(self, event: PhaseEvent) -> Self {
        let advanced = match (self, event) {
            (Self::Done, _) => None,
            (Self::ResponseWindow, PhaseEvent::Decision | PhaseEvent::Timeout) => self.next(),
            (Self::ResponseWindow, PhaseEvent::Elapsed { .. }) => None,
            (_, PhaseEvent::Elapsed { elapsed, minimum }) if elapsed >= minimum => self.next(),
            _ => None,
        };
        advanced.unwrap_or(self)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Fixation => "fixation",
            Self::Stimulus => "stimulus",
            Self::Mask => "mask",
            Self::ResponseWindow => "response",
            Self::Feedback => "feedback",
            Self::Done => "done",
        }
    }
}

/// Session-level stages, in the order the controller walks them.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionStage {
    #[default]
    Instructions,
    Practice,
    Main,
    Break,
    Debrief,
}

impl Phase for SessionStage {
    fn allows_input(&self) -> bool {
        !matches!(self, Self::Debrief)
    }

    fn next(&self) -> Option<Self> {
        use SessionStage::*;
        Some(match self {
            Instructions => Practice,
            Practice => Main,
            Main => Break,
            Break => Main,
            Debrief => return None,
        })
    }
}
