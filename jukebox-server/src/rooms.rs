use axum::{
    extract::Path,
    routing::{delete, get, post},
    Json,
};
use jukebox_core::RoomId;

use crate::{
    context::ServerContext,
    errors::ServerResult,
    schemas::{NewRoomSchema, RoomActionSchema, ValidatedJson},
    serialized::{Room, RoomEnvelope, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/v1/rooms",
    tag = "rooms",
    request_body = NewRoomSchema,
    responses(
        (status = 200, body = Room),
        (status = 409, description = "A room with the given id already exists"),
        (status = 422, description = "The body failed validation")
    )
)]
async fn create_room(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<Json<Room>> {
    let id = body.id.as_deref().map(RoomId::parse).transpose()?;

    let room = context
        .collab
        .rooms
        .create_room(id, &body.name, &body.creator)
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/actions",
    tag = "rooms",
    request_body = RoomActionSchema,
    params(("id" = String, Path, description = "The room code, in any case")),
    responses(
        (status = 200, body = RoomEnvelope),
        (status = 403, description = "The member may not perform this action"),
        (status = 404, description = "The room does not exist"),
        (status = 422, description = "The body failed validation"),
        (status = 503, description = "The store is unavailable")
    )
)]
async fn perform_room_action(
    context: ServerContext,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<RoomActionSchema>,
) -> ServerResult<Json<RoomEnvelope>> {
    let id = RoomId::parse(&id)?;
    let rooms = &context.collab.rooms;

    let room = match body {
        RoomActionSchema::JoinRoom(join) => {
            rooms
                .join_room(&id, &join.member_id, &join.display_name, join.invite.as_deref())
                .await?
        }
        RoomActionSchema::GetRoom => rooms.get_room(&id).await?,
        RoomActionSchema::UpdateRoom(patch) => rooms.update_room(&id, patch.0).await?,
    };

    Ok(Json(RoomEnvelope {
        room: room.to_serialized(),
    }))
}

#[utoipa::path(
    delete,
    path = "/v1/rooms/{id}",
    tag = "rooms",
    params(("id" = String, Path, description = "The room code, in any case")),
    responses(
        (status = 200, description = "The room was deleted"),
        (status = 404, description = "The room does not exist")
    )
)]
async fn delete_room(context: ServerContext, Path(id): Path<String>) -> ServerResult<()> {
    let id = RoomId::parse(&id)?;
    context.collab.rooms.delete_room(&id).await?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/v1/members/{id}/rooms",
    tag = "members",
    params(("id" = String, Path, description = "The member id")),
    responses(
        (status = 200, body = Vec<Room>)
    )
)]
async fn member_rooms(
    context: ServerContext,
    Path(member_id): Path<String>,
) -> ServerResult<Json<Vec<Room>>> {
    let rooms = context.collab.rooms.rooms_for_member(&member_id).await?;

    Ok(Json(rooms.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_room))
        .route("/:id", delete(delete_room))
        .route("/:id/actions", post(perform_room_action))
}

pub fn member_router() -> Router {
    Router::new().route("/:id/rooms", get(member_rooms))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::Path, http::StatusCode, response::IntoResponse, Json};
    use jukebox_collab::{BroadcastRegistry, Collab, LocalCache, MemoryStore};
    use jukebox_core::{Config, RoomUpdate};
    use serde_json::Value;

    use super::{create_room, delete_room, member_rooms, perform_room_action};
    use crate::{
        context::ServerContext,
        schemas::{JoinRoomSchema, NewRoomSchema, RoomActionSchema, RoomPatch, ValidatedJson},
    };

    fn mock_context(dir: &tempfile::TempDir) -> ServerContext {
        let collab = Collab::new(
            Arc::new(MemoryStore::default()),
            LocalCache::new(dir.path()).unwrap(),
            BroadcastRegistry::new(),
            Config::default(),
        );

        ServerContext::new(Arc::new(collab))
    }

    async fn create(context: &ServerContext, id: Option<&str>) -> Value {
        let body = NewRoomSchema {
            id: id.map(str::to_string),
            name: "Party".to_string(),
            creator: "u1".to_string(),
        };

        let Json(room) = create_room(context.clone(), ValidatedJson(body))
            .await
            .unwrap();

        serde_json::to_value(room).unwrap()
    }

    async fn act(context: &ServerContext, id: &str, action: RoomActionSchema) -> Value {
        let Json(envelope) =
            perform_room_action(context.clone(), Path(id.to_string()), ValidatedJson(action))
                .await
                .unwrap();

        serde_json::to_value(envelope).unwrap()
    }

    #[tokio::test]
    async fn actions_are_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let context = mock_context(&dir);

        let room = create(&context, Some("ab12cd")).await;
        assert_eq!(room["id"], "AB12CD");

        let join = RoomActionSchema::JoinRoom(JoinRoomSchema {
            member_id: "u2".to_string(),
            display_name: "Guest".to_string(),
            invite: None,
        });
        let joined = act(&context, "ab12cd", join).await;
        assert_eq!(joined["room"]["members"], serde_json::json!(["u1", "u2"]));

        let patch = RoomPatch(RoomUpdate {
            is_playing: Some(true),
            ..Default::default()
        });
        act(&context, "AB12CD", RoomActionSchema::UpdateRoom(patch)).await;

        let fetched = act(&context, "Ab12Cd", RoomActionSchema::GetRoom).await;
        assert_eq!(fetched["room"]["is_playing"], true);
        assert_eq!(fetched["room"]["name"], "Party");

        let Json(rooms) = member_rooms(context.clone(), Path("u2".to_string()))
            .await
            .unwrap();
        assert_eq!(rooms.len(), 1);
    }

    #[tokio::test]
    async fn errors_carry_status_codes() {
        let dir = tempfile::tempdir().unwrap();
        let context = mock_context(&dir);

        create(&context, Some("AB12CD")).await;

        let body = NewRoomSchema {
            id: Some("AB12CD".to_string()),
            name: "Again".to_string(),
            creator: "u9".to_string(),
        };
        let conflict = create_room(context.clone(), ValidatedJson(body)).await;
        assert_eq!(
            conflict.unwrap_err().into_response().status(),
            StatusCode::CONFLICT
        );

        let missing = perform_room_action(
            context.clone(),
            Path("ZZZZZZ".to_string()),
            ValidatedJson(RoomActionSchema::GetRoom),
        )
        .await;
        assert_eq!(
            missing.unwrap_err().into_response().status(),
            StatusCode::NOT_FOUND
        );

        let invalid = delete_room(context.clone(), Path("bad id".to_string())).await;
        assert_eq!(
            invalid.unwrap_err().into_response().status(),
            StatusCode::BAD_REQUEST
        );

        delete_room(context.clone(), Path("ab12cd".to_string()))
            .await
            .unwrap();

        let deleted = delete_room(context, Path("AB12CD".to_string())).await;
        assert_eq!(
            deleted.unwrap_err().into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
