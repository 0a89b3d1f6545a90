use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    Json,
};
use jukebox_core::RoomUpdate;
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewRoomSchema {
    /// A 6 character room code. One is generated if omitted.
    #[validate(length(equal = 6))]
    pub id: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(length(min = 1, max = 128))]
    pub creator: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinRoomSchema {
    #[validate(length(min = 1, max = 128))]
    pub member_id: String,
    #[validate(length(max = 128))]
    pub display_name: String,
    /// An encoded invite, used to recreate the room if it expired
    pub invite: Option<String>,
}

#[derive(Debug, ToSchema, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum RoomActionSchema {
    JoinRoom(JoinRoomSchema),
    GetRoom,
    UpdateRoom(RoomPatch),
}

/// Any subset of the room fields. Supplied fields overwrite the stored ones,
/// and `null` clears `current_song` or `sync_leader`.
#[derive(Debug, ToSchema, Deserialize)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct RoomPatch(pub RoomUpdate);

impl Validate for RoomActionSchema {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            Self::JoinRoom(join) => join.validate(),
            _ => Ok(()),
        }
    }
}

/// A JSON body that passed its [Validate] rules.
/// Rejections carry the reason, so clients can tell parse and validation failures apart.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = (StatusCode, String);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(body) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| (rejection.status(), rejection.body_text()))?;

        body.validate()
            .map_err(|errors| (StatusCode::UNPROCESSABLE_ENTITY, invalid_body(&errors)))?;

        Ok(Self(body))
    }
}

fn invalid_body(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors
        .field_errors()
        .into_keys()
        .map(|field| field.to_string())
        .collect();
    fields.sort_unstable();

    format!("Invalid fields: {}", fields.join(", "))
}
