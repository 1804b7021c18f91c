//! Concurrent lobby queue and combinatorial 5-vs-5 match search.

mod config;
mod error;
mod find_match;
mod lobby;
mod match_config;
mod runner;

pub use config::MatchmakerConfig;
pub use error::MatchmakerError;
pub use find_match::find_match;
pub use lobby::{Lobby, LobbyGuest};
pub use match_config::{MatchConfig, PlayerConfig, Team};
pub use runner::run;
