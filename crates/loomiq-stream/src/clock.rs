use tokio::time::Instant;

/// Whole seconds elapsed since a stream was opened.
///
/// Recomputed from the start instant on every tick rather than counted, so a
/// late or skipped tick never drifts. Once frozen the value never changes.
#[derive(Clone, Debug)]
pub struct ElapsedClock {
    started: Instant,
    elapsed_secs: u64,
    frozen: bool,
}

impl ElapsedClock {
    pub fn start() -> Self {
        Self::start_at(Instant::now())
    }

    pub fn start_at(started: Instant) -> Self {
        Self {
            started,
            elapsed_secs: 0,
            frozen: false,
        }
    }

    /// Recomputes the elapsed value. Returns true when it changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.frozen {
            return false;
        }
        let secs = now.saturating_duration_since(self.started).as_secs();
        let changed = secs != self.elapsed_secs;
        self.elapsed_secs = secs;
        changed
    }

    /// Takes a final reading and stops the clock.
    pub fn freeze(&mut self, now: Instant) {
        self.tick(now);
        self.frozen = true;
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}
