use std::time::Instant;

/// Which side of the match a player was assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Team {
    Sun,
    Moon,
}

/// A single player's assignment within a [`MatchConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerConfig {
    pub sidx: u32,
    pub team: Team,
}

/// A fully formed 5-vs-5 match, emitted by the matchmaker and consumed by
/// whatever starts the actual gameplay session.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    pub mode: u8,
    pub id: u32,
    pub sun_side_skin_id: u32,
    pub moon_side_skin_id: u32,
    /// Always exactly 10 entries: 5 `Team::Sun`, 5 `Team::Moon`.
    pub player_configs: Vec<PlayerConfig>,
    pub begin: Instant,
    pub end: Option<Instant>,
}

impl MatchConfig {
    pub fn sun_side(&self) -> impl Iterator<Item = &PlayerConfig> {
        self.player_configs.iter().filter(|p| p.team == Team::Sun)
    }

    pub fn moon_side(&self) -> impl Iterator<Item = &PlayerConfig> {
        self.player_configs.iter().filter(|p| p.team == Team::Moon)
    }
}
