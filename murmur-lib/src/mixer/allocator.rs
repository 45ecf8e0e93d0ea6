//! Voice budget policy.

/// Decides whether another voice may start playing.
///
/// Purely advisory: the mixer checks and claims under its registry lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceAllocator {
    voice_budget: usize,
}

impl VoiceAllocator {
    pub fn new(voice_budget: usize) -> Self {
        Self { voice_budget }
    }

    pub fn voice_budget(&self) -> usize {
        self.voice_budget
    }

    /// True iff `playing_count` is below the budget.
    pub fn can_start(&self, playing_count: usize) -> bool {
        playing_count < self.voice_budget
    }
}
