//! Ledger error types.

use crate::room::{RoomId, UserId};
use thiserror::Error;

/// Errors raised by ledger, settlement and room lifecycle operations.
///
/// Every domain variant is recoverable and carries enough context for the
/// caller to react (for example the current pot).
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Payload or description could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Amount must be positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Malformed targeted bet
    #[error("Invalid bet: {0}")]
    InvalidBet(String),

    /// User holds no open membership in the room
    #[error("User {user_id} is not a member of room {room_id}")]
    NotAMember { room_id: RoomId, user_id: UserId },

    /// Nothing in the pot
    #[error("The pot is empty")]
    PotEmpty,

    /// Requested withdrawal is larger than the pot
    #[error("Requested {requested} chips but the pot only holds {available}")]
    ExceedsPot { requested: i64, available: i64 },

    /// A member cannot kick themselves
    #[error("User {0} cannot kick themselves, leave the room instead")]
    SelfKick(UserId),

    /// Settlement needs an empty pot
    #[error("The pot still holds {pot} chips, settle it first")]
    PotNotZero { pot: i64 },

    /// Room not found
    #[error("Room {0} not found")]
    RoomNotFound(RoomId),

    /// No active room uses this code
    #[error("No active room with code {0}")]
    RoomCodeNotFound(String),

    /// Room has been dissolved
    #[error("Room {0} has been dissolved")]
    RoomDissolved(RoomId),

    /// Could not find an unused room code
    #[error("Could not allocate a free room code after {0} attempts")]
    RoomCodeExhausted(u32),
}

impl LedgerError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Database(_) => "internal",
            LedgerError::Serialization(_) => "internal",
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::InvalidBet(_) => "invalid_bet",
            LedgerError::NotAMember { .. } => "not_a_member",
            LedgerError::PotEmpty => "pot_empty",
            LedgerError::ExceedsPot { .. } => "exceeds_pot",
            LedgerError::PotNotZero { .. } => "pot_not_zero",
            LedgerError::SelfKick(_) => "invalid_target",
            LedgerError::RoomNotFound(_) | LedgerError::RoomCodeNotFound(_) => "room_not_found",
            LedgerError::RoomDissolved(_) => "room_dissolved",
            LedgerError::RoomCodeExhausted(_) => "room_code_exhausted",
        }
    }

    /// Get a client-safe error message that doesn't leak internals
    ///
    /// Database and serialization errors are collapsed into a generic message,
    /// user ids are redacted from membership errors.
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::Database(_) | LedgerError::Serialization(_) => {
                "Internal server error".to_string()
            }
            LedgerError::NotAMember { .. } => "You are not a member of this room".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_hides_database_details() {
        let err = LedgerError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.client_message(), "Internal server error");
        assert_eq!(err.code(), "internal");
    }

    #[test]
    fn test_pot_not_zero_carries_pot() {
        let err = LedgerError::PotNotZero { pot: 150 };
        assert!(err.client_message().contains("150"));
        assert_eq!(err.code(), "pot_not_zero");
    }

    #[test]
    fn test_not_a_member_is_redacted() {
        let err = LedgerError::NotAMember {
            room_id: 7,
            user_id: 42,
        };
        assert!(err.to_string().contains("42"));
        assert!(!err.client_message().contains("42"));
    }

    #[test]
    fn test_self_kick_code() {
        let err = LedgerError::SelfKick(3);
        assert_eq!(err.code(), "invalid_target");
        assert!(err.client_message().contains("leave the room"));
    }
}
