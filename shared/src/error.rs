use thiserror::Error;

/// A queue entry that cannot be turned into a [`crate::models::VoteEvent`].
/// Counted and skipped by the consumer; never affects connection state.
#[derive(Debug, Error)]
pub enum MalformedEvent {
    #[error("invalid vote payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("vote payload has an empty voter id")]
    EmptyVoterId,
}
