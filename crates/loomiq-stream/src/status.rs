use std::fmt;

/// Overall lifecycle of one task stream.
///
/// Transitions only move forward: `Connecting -> Running -> Done | Failed`,
/// or straight from `Connecting` to a terminal state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    #[default]
    Connecting,
    Running,
    Done,
    Failed,
}

/// What an event asks of the status, before monotonicity is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusEffect {
    None,
    Running,
    Done,
    Failed,
}

impl StreamStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Applies `effect` and returns the resulting status.
    ///
    /// Terminal states absorb every effect and `Running` is only entered from
    /// `Connecting`.
    pub fn apply(self, effect: StatusEffect) -> StreamStatus {
        if self.is_terminal() {
            return self;
        }
        match effect {
            StatusEffect::None => self,
            StatusEffect::Running => Self::Running,
            StatusEffect::Done => Self::Done,
            StatusEffect::Failed => Self::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
