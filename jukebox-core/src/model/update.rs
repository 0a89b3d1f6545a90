use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{MemberId, QueueItem, Timestamp};

/// A partial set of room fields. Only supplied fields are written.
///
/// Nullable fields use a nested option, so that "not supplied" (`None`)
/// and "set to null" (`Some(None)`) stay distinguishable on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<Vec<QueueItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<MemberId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_play: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_update: Option<Timestamp>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable"
    )]
    pub current_song: Option<Option<QueueItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_playing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_sync_states: Option<IndexMap<MemberId, bool>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable"
    )]
    pub sync_leader: Option<Option<MemberId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<Timestamp>,
}

impl RoomUpdate {
    /// Whether the update supplies no field at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Stamps the update with the time of the mutation.
    pub fn stamped(mut self, now: Timestamp) -> Self {
        self.last_activity = Some(now);
        self
    }

    /// Names of the supplied fields, for logging.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = vec![];

        macro_rules! check {
            ($($field:ident),*) => {
                $(if self.$field.is_some() {
                    fields.push(stringify!($field));
                })*
            };
        }

        check!(
            name,
            queue,
            members,
            sync_play,
            synced_time,
            last_sync_update,
            current_song,
            is_playing,
            member_sync_states,
            sync_leader,
            last_activity
        );

        fields
    }
}

// A present field, even if null, is always Some
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
