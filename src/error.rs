use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use alloy_transport::{TransportError, TransportErrorKind};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use thiserror::Error;

pub const INVALID_NODE_ADDRESS: &str = "invalid-node-address";
pub const INVALID_MINIPOOL_ADDRESS: &str = "invalid-minipool-address";

/// JSON-RPC code nodes use for a reverted `eth_call`.
const EXECUTION_REVERTED: i64 = 3;

/// Returned in place of node data when the submitted address is not a valid
/// chain address, so the page can show a message instead of empty fields.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct InvalidNodeAddress {
    pub address: String,
    pub message: String,
}

impl InvalidNodeAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            message: INVALID_NODE_ADDRESS.to_string(),
        }
    }
}

impl fmt::Display for InvalidNodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid node address {}", self.address)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("rpc transport failed: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("abi error: {0}")]
    Abi(#[from] alloy_dyn_abi::Error),

    #[error("invalid abi json: {0}")]
    AbiJson(#[from] serde_json::Error),

    #[error("explorer error: {0}")]
    Explorer(String),

    #[error("contract has no function named {0}")]
    MissingFunction(String),

    #[error("unexpected value: {0}")]
    Decode(String),

    #[error("{0}")]
    InvalidNodeAddress(InvalidNodeAddress),

    #[error("invalid minipool address {0}")]
    InvalidMinipoolAddress(String),

    #[error("missing query parameter {0}")]
    MissingParameter(&'static str),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status(status)
        } else {
            FetchError::Http(err)
        }
    }
}

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ErrorResp(payload) => FetchError::Rpc {
                code: payload.code,
                message: payload.message.to_string(),
            },
            TransportError::Transport(TransportErrorKind::HttpError(http)) => FetchError::Status(
                reqwest::StatusCode::from_u16(http.status).unwrap_or(reqwest::StatusCode::BAD_GATEWAY),
            ),
            TransportError::Transport(TransportErrorKind::Custom(source))
                if source.downcast_ref::<reqwest::Error>().is_some_and(|e| e.is_timeout()) =>
            {
                FetchError::Timeout
            }
            TransportError::Transport(kind) => FetchError::Transport(kind.to_string()),
            other => FetchError::Decode(other.to_string()),
        }
    }
}

impl From<alloy_contract::Error> for FetchError {
    fn from(err: alloy_contract::Error) -> Self {
        match err {
            alloy_contract::Error::UnknownFunction(name) => FetchError::MissingFunction(name),
            alloy_contract::Error::AbiError(e) => FetchError::Abi(e),
            alloy_contract::Error::TransportError(e) => e.into(),
            other => FetchError::Decode(other.to_string()),
        }
    }
}

impl FetchError {
    /// Whether trying the same request again could succeed. A revert is
    /// deterministic for the block it ran against.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Rpc { code, message } => {
                *code != EXECUTION_REVERTED && !message.contains("execution reverted")
            }
            FetchError::Http(_)
            | FetchError::Timeout
            | FetchError::Status(_)
            | FetchError::Transport(_)
            | FetchError::Explorer(_) => true,
            _ => false,
        }
    }
}

impl ResponseError for FetchError {
    fn status_code(&self) -> StatusCode {
        match self {
            FetchError::InvalidNodeAddress(_)
            | FetchError::InvalidMinipoolAddress(_)
            | FetchError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            FetchError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            FetchError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut response = HttpResponse::build(self.status_code());
        match self {
            FetchError::InvalidNodeAddress(sentinel) => response.json(sentinel),
            FetchError::InvalidMinipoolAddress(address) => response.json(json!({
                "address": address,
                "message": INVALID_MINIPOOL_ADDRESS,
            })),
            other => response.json(json!({ "error": other.to_string() })),
        }
    }
}
