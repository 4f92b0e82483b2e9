use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use signet_core::{
    AccountLinkError, ProviderErrorKind, RefreshTokenError, StateError, TokenValidationError,
};

use crate::{
    account::RecoveryError,
    flow::FlowError,
    rate_limit::RateLimitError,
    refresh::RotationError,
    storage::StoreError,
    tokens::{IssueError, PairError},
};

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<FlowError> for AppError {
    fn from(value: FlowError) -> Self {
        let status = match &value {
            FlowError::UnknownProvider(_) => StatusCode::NOT_FOUND,
            FlowError::State(StateError::InvalidOrExpired) => StatusCode::BAD_REQUEST,
            FlowError::Provider(err) => match err.kind() {
                ProviderErrorKind::Authorization => StatusCode::UNAUTHORIZED,
                ProviderErrorKind::Configuration => StatusCode::BAD_REQUEST,
                ProviderErrorKind::Transport
                | ProviderErrorKind::InvalidResponse
                | ProviderErrorKind::Other => StatusCode::BAD_GATEWAY,
            },
            FlowError::Link(AccountLinkError::UserNotFound) => StatusCode::NOT_FOUND,
            FlowError::Link(AccountLinkError::UnverifiedEmail(_)) => StatusCode::CONFLICT,
            FlowError::Store(_) | FlowError::Password(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, value.to_string())
    }
}

impl From<RotationError> for AppError {
    fn from(value: RotationError) -> Self {
        match value {
            RotationError::Token(RefreshTokenError::Invalid)
            | RotationError::Token(RefreshTokenError::Expired) => {
                AppError::unauthorized(value.to_string())
            }
            RotationError::Store(err) => AppError::internal(err.to_string()),
        }
    }
}

impl From<TokenValidationError> for AppError {
    fn from(value: TokenValidationError) -> Self {
        AppError::unauthorized(value.to_string())
    }
}

impl From<RecoveryError> for AppError {
    fn from(value: RecoveryError) -> Self {
        match value {
            RecoveryError::Token(err) => AppError::bad_request(err.to_string()),
            RecoveryError::Store(err) => AppError::internal(err.to_string()),
            RecoveryError::Issue(err) => AppError::internal(err.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        AppError::internal(value.to_string())
    }
}

impl From<IssueError> for AppError {
    fn from(value: IssueError) -> Self {
        AppError::internal(value.to_string())
    }
}

impl From<PairError> for AppError {
    fn from(value: PairError) -> Self {
        match value {
            PairError::Issue(err) => AppError::internal(err.to_string()),
            PairError::Store(err) => AppError::internal(err.to_string()),
        }
    }
}

impl From<RateLimitError> for AppError {
    fn from(_: RateLimitError) -> Self {
        AppError::new(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded")
    }
}

impl From<url::ParseError> for AppError {
    fn from(value: url::ParseError) -> Self {
        AppError::bad_request(value.to_string())
    }
}
