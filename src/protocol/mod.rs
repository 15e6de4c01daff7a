//! Wire protocol: envelope model, JSON-RPC codec and the error taxonomy

pub mod codec;
pub mod envelope;
pub mod error;
pub mod messages;

pub use codec::{JsonRpcRequest, JsonRpcResponse, ResponseBody, ValidatedRequest};
pub use envelope::{ContextField, Envelope, MessageType, Sender, PROTOCOL_VERSION, RPC_METHOD};
pub use error::{ErrorCode, RpcError, ServerError, ServerResult};
