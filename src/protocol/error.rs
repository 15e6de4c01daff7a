//! Error taxonomy shared by every protocol handler. Client faults live in
//! the 4xxx range, server faults in 5xxx, with the two JSON-RPC framing
//! codes kept at their standard negative values.

use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

/// Numeric error codes carried in JSON-RPC error objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    ProtocolVersionMismatch,
    MissingRequiredField,
    UnknownMessageType,
    InvalidUuid,
    InvalidSender,
    InvalidTimestamp,
    InvalidToken,
    AuthSenderMismatch,
    DuplicateRegistration,
    RegistrationClosed,
    PreconditionFailed,
    DuplicateResult,
    ValidationError,
    InternalError,
    DatabaseError,
    TransportTimeout,
    RefereeUnavailable,
    UnsupportedGameType,
    MatchExecutionFailed,
}

impl ErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::ProtocolVersionMismatch => 4001,
            Self::MissingRequiredField => 4002,
            Self::UnknownMessageType => 4003,
            Self::InvalidUuid => 4004,
            Self::InvalidSender => 4005,
            Self::InvalidTimestamp => 4006,
            Self::InvalidToken => 4010,
            Self::AuthSenderMismatch => 4011,
            Self::DuplicateRegistration => 4020,
            Self::RegistrationClosed => 4021,
            Self::PreconditionFailed => 4022,
            Self::DuplicateResult => 4030,
            Self::ValidationError => 4031,
            Self::InternalError => 5000,
            Self::DatabaseError => 5001,
            Self::TransportTimeout => 5002,
            Self::RefereeUnavailable => 5003,
            Self::UnsupportedGameType => 5004,
            Self::MatchExecutionFailed => 5005,
        }
    }

}

/// Typed errors raised by message handlers. The transport converts these
/// into JSON-RPC error objects; unknown failures degrade to INTERNAL_ERROR
/// so peers never see internal detail.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unsupported protocol version: {got}")]
    VersionMismatch { got: String },

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("unknown message type: {got}")]
    UnknownMessageType { got: String },

    #[error("field {field} is not a valid UUID")]
    InvalidUuid { field: String },

    #[error("invalid sender: {got}")]
    InvalidSender { got: String },

    #[error("invalid timestamp: {got}")]
    InvalidTimestamp { got: String },

    #[error("invalid or unknown auth token")]
    InvalidToken,

    #[error("token identity does not match envelope sender")]
    SenderMismatch,

    #[error("agent {agent_id} is already registered")]
    DuplicateRegistration { agent_id: String },

    #[error("registration is closed")]
    RegistrationClosed,

    #[error("precondition failed: {reason}")]
    PreconditionFailed { reason: String },

    #[error("result already recorded for this match")]
    DuplicateResult,

    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error("internal server error")]
    Internal { reason: String },

    #[error("database error")]
    Database(#[from] DbErr),

    #[error("request timed out")]
    Timeout,

    #[error("no referee available")]
    RefereeUnavailable,

    #[error("unsupported game type: {game_type}")]
    UnsupportedGameType { game_type: String },

    #[error("match execution failed: {reason}")]
    MatchExecutionFailed { reason: String },
}

impl ServerError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::VersionMismatch { .. } => ErrorCode::ProtocolVersionMismatch,
            Self::MissingField { .. } => ErrorCode::MissingRequiredField,
            Self::UnknownMessageType { .. } => ErrorCode::UnknownMessageType,
            Self::InvalidUuid { .. } => ErrorCode::InvalidUuid,
            Self::InvalidSender { .. } => ErrorCode::InvalidSender,
            Self::InvalidTimestamp { .. } => ErrorCode::InvalidTimestamp,
            Self::InvalidToken => ErrorCode::InvalidToken,
            Self::SenderMismatch => ErrorCode::AuthSenderMismatch,
            Self::DuplicateRegistration { .. } => ErrorCode::DuplicateRegistration,
            Self::RegistrationClosed => ErrorCode::RegistrationClosed,
            Self::PreconditionFailed { .. } => ErrorCode::PreconditionFailed,
            Self::DuplicateResult => ErrorCode::DuplicateResult,
            Self::Validation { .. } => ErrorCode::ValidationError,
            Self::Internal { .. } => ErrorCode::InternalError,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Timeout => ErrorCode::TransportTimeout,
            Self::RefereeUnavailable => ErrorCode::RefereeUnavailable,
            Self::UnsupportedGameType { .. } => ErrorCode::UnsupportedGameType,
            Self::MatchExecutionFailed { .. } => ErrorCode::MatchExecutionFailed,
        }
    }

    /// Builds the wire error object. Internal and database failures are
    /// replaced with a generic message so details stay in the server log.
    pub fn to_rpc_error(&self, context: Option<Value>) -> RpcError {
        let code = self.error_code();
        let message = match self {
            Self::Internal { .. } | Self::Database(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        RpcError {
            code: code.code(),
            message,
            data: context,
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Attaches correlation fields so peers can line errors up with their
    /// audit records
    pub fn with_context(
        mut self,
        conversation_id: Option<&str>,
        message_type: Option<&str>,
    ) -> Self {
        let mut data = match self.data.take() {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        if let Some(conversation_id) = conversation_id {
            data.insert("conversation_id".into(), json!(conversation_id));
        }
        if let Some(message_type) = message_type {
            data.insert("message_type".into(), json!(message_type));
        }
        self.data = Some(Value::Object(data));
        self
    }
}

#[cfg(test)]
mod test {
    use super::{ErrorCode, ServerError};

    #[test]
    fn test_client_errors_are_4xxx() {
        let errors = [
            ServerError::InvalidToken,
            ServerError::SenderMismatch,
            ServerError::RegistrationClosed,
            ServerError::DuplicateResult,
        ];
        for error in errors {
            let code = error.error_code().code();
            assert!((4000..5000).contains(&code), "{code} outside 4xxx");
        }
    }

    #[test]
    fn test_internal_error_is_masked() {
        let error = ServerError::Internal {
            reason: "stack trace details".to_string(),
        };
        let rpc = error.to_rpc_error(None);
        assert_eq!(rpc.code, ErrorCode::InternalError.code());
        assert!(!rpc.message.contains("stack trace"));
    }
}
