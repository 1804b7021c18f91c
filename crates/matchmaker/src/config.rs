use std::time::Duration;

use crate::error::MatchmakerError;

/// Tunables for [`crate::find_match`] and the background matchmaker loop.
#[derive(Debug, Clone)]
pub struct MatchmakerConfig {
    /// `mmBorrowStride`: lobbies pulled from the queue per borrow.
    pub borrow_stride: usize,
    /// `mmPlayerPerTeam`: target sum for one side of a match.
    pub player_per_team: usize,
    /// `mmTotalPlayerSize`: total players across both sides.
    pub total_player_size: usize,
    /// Whether the loop's sleep between `find_match` calls scales with
    /// queue depth (`waitTimeDuration`) or is always `fixed_wait`.
    pub adaptive: bool,
    pub fixed_wait: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for MatchmakerConfig {
    fn default() -> Self {
        Self {
            borrow_stride: 10,
            player_per_team: 5,
            total_player_size: 10,
            adaptive: false,
            fixed_wait: Duration::from_secs(1),
            min_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(5),
        }
    }
}

impl MatchmakerConfig {
    pub fn validate(&self) -> Result<(), MatchmakerError> {
        if self.borrow_stride == 0 {
            return Err(MatchmakerError::InvalidBorrowStride);
        }
        if self.player_per_team == 0 {
            return Err(MatchmakerError::InvalidPlayerPerTeam);
        }
        Ok(())
    }

    /// The minimum queue length below which `find_match` re-borrows
    /// instead of attempting another match against what's already held.
    pub(crate) fn min_continue_without_reborrow(&self) -> usize {
        self.player_per_team.saturating_sub(1)
    }

    /// `waitTimeDuration(n)`: `max_wait` at or below 10 queued lobbies,
    /// `min_wait` at or above 50, linear in between. Returns `fixed_wait`
    /// unconditionally when `adaptive` is `false`.
    pub fn wait_time(&self, queue_len: usize) -> Duration {
        if !self.adaptive {
            return self.fixed_wait;
        }
        if queue_len <= 10 {
            return self.max_wait;
        }
        if queue_len >= 50 {
            return self.min_wait;
        }
        let t = (queue_len - 10) as f64 / (50 - 10) as f64;
        let secs =
            self.max_wait.as_secs_f64() + t * (self.min_wait.as_secs_f64() - self.max_wait.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}
