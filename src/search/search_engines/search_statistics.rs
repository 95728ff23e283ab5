use tracing::info;

/// Expansion and generation counters, reported by the scheduler for the
/// winning engine.
#[derive(Debug, Default, Clone)]
pub struct SearchStatistics {
    pub expanded_states: usize,
    pub generated_states: usize,
}

impl SearchStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_expanded(&mut self) {
        self.expanded_states += 1;
    }

    pub fn increment_generated(&mut self, count: usize) {
        self.generated_states += count;
    }

    pub fn log(&self) {
        info!(
            expanded = self.expanded_states,
            generated = self.generated_states,
            "search statistics"
        );
    }
}
