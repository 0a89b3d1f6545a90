use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use jukebox_collab::RoomError;
use jukebox_core::InvalidRoomId;
use log::error;
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.as_status_code();

        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        (status, self.to_string()).into_response()
    }
}

impl From<RoomError> for ServerError {
    fn from(value: RoomError) -> Self {
        match value {
            RoomError::NotFound(id) => Self::NotFound {
                resource: "room",
                identifier: id.to_string(),
            },
            RoomError::ItemNotFound(key) => Self::NotFound {
                resource: "queue item",
                identifier: key.to_string(),
            },
            RoomError::Conflict(id) => Self::Conflict {
                resource: "room",
                field: "id",
                value: id.to_string(),
            },
            RoomError::StoreUnavailable(reason) => Self::Unavailable(reason),
            RoomError::NotAllowed(e) => Self::Forbidden(e.to_string()),
            RoomError::NotAMember(member) => {
                Self::Forbidden(format!("{member} is not a member of this room"))
            }
            e @ (RoomError::InvalidJoinPayload(_)
            | RoomError::InvalidRoomId(_)
            | RoomError::InvalidName) => Self::BadRequest(e.to_string()),
            RoomError::Internal(e) => Self::Unknown(e),
        }
    }
}

impl From<InvalidRoomId> for ServerError {
    fn from(value: InvalidRoomId) -> Self {
        Self::BadRequest(value.to_string())
    }
}
