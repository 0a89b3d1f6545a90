use async_trait::async_trait;
use jukebox_core::{MemberId, Room, RoomId, RoomUpdate, Timestamp};
use log::debug;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{IntoStoreError, Result, RoomStore, StoreError};

/// An action sent to `POST /v1/rooms/:id/actions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum RoomAction {
    JoinRoom(JoinRoom),
    GetRoom,
    UpdateRoom(RoomUpdate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRoom {
    pub member_id: MemberId,
    pub display_name: String,
    /// An encoded invite, used to recreate the room if it no longer exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEnvelope {
    pub room: Room,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRoomRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RoomId>,
    pub name: String,
    pub creator: MemberId,
}

/// A store that talks to a jukebox server. It cannot push, so subscribers poll it.
pub struct HttpStore {
    client: Client,
    base: Url,
}

impl HttpStore {
    pub fn new(base: Url) -> Self {
        Self {
            client: Client::new(),
            base,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| StoreError::Internal(Box::new(e)))
    }

    /// The member id is a single escaped path segment.
    fn member_rooms_url(&self, member: &MemberId) -> Result<Url> {
        let mut url = self.endpoint("v1/members/")?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Internal("base url cannot have a path".into()))?
            .pop_if_empty()
            .push(member)
            .push("rooms");

        Ok(url)
    }

    /// Sends an action for a room and returns the resulting room.
    pub async fn act(&self, id: &RoomId, action: &RoomAction) -> Result<Room> {
        let url = self.endpoint(&format!("v1/rooms/{id}/actions"))?;
        debug!("POST {} {:?}", url, action);

        let response = self
            .client
            .post(url)
            .json(action)
            .send()
            .await
            .map_err(|e| e.any())?;

        let envelope: RoomEnvelope = checked(response, id)
            .await?
            .json()
            .await
            .map_err(|e| e.any())?;

        Ok(envelope.room)
    }
}

async fn checked(response: Response, id: &RoomId) -> Result<Response> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    match status_error(status, id) {
        Some(error) => Err(error),
        None => {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::Internal(
                format!("server responded with {status}: {body}").into(),
            ))
        }
    }
}

/// Maps the failure statuses the store understands. Anything else is [None].
fn status_error(status: StatusCode, id: &RoomId) -> Option<StoreError> {
    match status {
        StatusCode::NOT_FOUND => Some(StoreError::NotFound(id.clone())),
        StatusCode::CONFLICT => Some(StoreError::Conflict(id.clone())),
        status if status.is_server_error() => Some(StoreError::Unavailable(format!(
            "server responded with {status}"
        ))),
        _ => None,
    }
}

#[async_trait]
impl RoomStore for HttpStore {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn create(&self, room: Room) -> Result<Room> {
        let url = self.endpoint("v1/rooms")?;

        let body = NewRoomRequest {
            id: Some(room.id.clone()),
            name: room.name.clone(),
            creator: room.creator.clone(),
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.any())?;

        checked(response, &room.id)
            .await?
            .json()
            .await
            .map_err(|e| e.any())
    }

    async fn get(&self, id: &RoomId) -> Result<Room> {
        self.act(id, &RoomAction::GetRoom).await
    }

    async fn update(&self, id: &RoomId, update: &RoomUpdate) -> Result<Room> {
        self.act(id, &RoomAction::UpdateRoom(update.clone())).await
    }

    async fn delete(&self, id: &RoomId) -> Result<()> {
        let url = self.endpoint(&format!("v1/rooms/{id}"))?;

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| e.any())?;

        checked(response, id).await.map(|_| ())
    }

    async fn rooms_for_member(&self, member: &MemberId) -> Result<Vec<Room>> {
        let url = self.member_rooms_url(member)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.any())?;

        if !response.status().is_success() {
            return Err(StoreError::Unavailable(format!(
                "server responded with {}",
                response.status()
            )));
        }

        response.json().await.map_err(|e| e.any())
    }

    // The server sweeps its own rooms
    async fn delete_inactive(&self, _cutoff: Timestamp) -> Result<Vec<RoomId>> {
        Ok(vec![])
    }
}

impl IntoStoreError for reqwest::Error {
    fn any(self) -> StoreError {
        if self.is_connect() || self.is_timeout() || self.is_request() {
            StoreError::Unavailable(self.to_string())
        } else {
            StoreError::Internal(Box::new(self))
        }
    }

    fn not_found_or(self, id: &RoomId) -> StoreError {
        match self.status() {
            Some(StatusCode::NOT_FOUND) => StoreError::NotFound(id.clone()),
            _ => self.any(),
        }
    }
}
