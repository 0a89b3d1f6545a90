use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;

use crate::{rooms, schemas, serialized, sse};

#[derive(OpenApi)]
#[openapi(
    paths(
        rooms::create_room,
        rooms::perform_room_action,
        rooms::delete_room,
        rooms::member_rooms,
        sse::room_events,
    ),
    components(schemas(
        schemas::NewRoomSchema,
        schemas::JoinRoomSchema,
        schemas::RoomActionSchema,
        schemas::RoomPatch,
        serialized::Room,
        serialized::QueueItem,
        serialized::Video,
        serialized::RoomEnvelope,
    )),
    tags(
        (name = "rooms", description = "Room actions and change streams"),
        (name = "members", description = "Rooms by member")
    ),
    info(
        description = "jukebox-server exposes the room actions of a jukebox instance"
    )
)]
pub struct ApiDoc;

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use utoipa::OpenApi;

    use super::ApiDoc;

    #[test]
    fn documents_every_route() {
        let api = ApiDoc::openapi();
        let paths: Vec<_> = api.paths.paths.keys().cloned().collect();

        for path in [
            "/v1/rooms",
            "/v1/rooms/{id}",
            "/v1/rooms/{id}/actions",
            "/v1/rooms/{id}/events",
            "/v1/members/{id}/rooms",
        ] {
            assert!(paths.iter().any(|p| p == path), "{path} is not documented");
        }
    }
}
