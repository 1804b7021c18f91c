use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatchmakerError {
    #[error("mmBorrowStride must be at least 1")]
    InvalidBorrowStride,
    #[error("mmPlayerPerTeam must be at least 1")]
    InvalidPlayerPerTeam,
}
