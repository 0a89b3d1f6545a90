//! The vote ordered queue.
//!
//! Every operation reads the current [Room] and returns the [RoomUpdate] that performs it,
//! so the same patch can be applied locally and persisted.

use thiserror::Error;

use crate::{QueueItem, QueueItemKey, Room, RoomUpdate, Timestamp, VoteDirection};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue item {0} does not exist")]
    ItemNotFound(QueueItemKey),
}

/// Sorts the queue by descending score.
/// The sort is stable, so items with equal scores keep their relative order.
pub fn sort_by_votes(queue: &mut [QueueItem]) {
    queue.sort_by(|a, b| b.score().cmp(&a.score()));
}

/// Appends an item with no votes.
///
/// If nothing is playing and the queue is empty, the item is promoted to the current song right away.
pub fn add_item(room: &Room, mut item: QueueItem, now: Timestamp) -> RoomUpdate {
    item.upvoters.clear();
    item.downvoters.clear();
    item.votes = 0;

    if room.current_song.is_none() && room.queue.is_empty() {
        return RoomUpdate {
            queue: Some(vec![]),
            current_song: Some(Some(item)),
            is_playing: Some(true),
            synced_time: Some(0.),
            last_sync_update: Some(now),
            ..Default::default()
        };
    }

    let mut queue = room.queue.clone();
    queue.push(item);
    sort_by_votes(&mut queue);

    RoomUpdate {
        queue: Some(queue),
        ..Default::default()
    }
}

/// Toggles a member's vote on an item and reorders the queue.
pub fn vote(
    room: &Room,
    key: &QueueItemKey,
    member: &str,
    direction: VoteDirection,
) -> Result<RoomUpdate, QueueError> {
    let mut queue = room.queue.clone();

    let item = queue
        .iter_mut()
        .find(|i| i.key() == *key)
        .ok_or_else(|| QueueError::ItemNotFound(key.clone()))?;

    item.toggle_vote(member, direction);
    sort_by_votes(&mut queue);

    Ok(RoomUpdate {
        queue: Some(queue),
        ..Default::default()
    })
}

/// Pops the head of the queue into the current song, or clears it if the queue is empty.
pub fn advance(room: &Room, now: Timestamp) -> RoomUpdate {
    let mut queue = room.queue.clone();
    let next = (!queue.is_empty()).then(|| queue.remove(0));

    RoomUpdate {
        is_playing: Some(next.is_some()),
        current_song: Some(next),
        queue: Some(queue),
        synced_time: Some(0.),
        last_sync_update: Some(now),
        ..Default::default()
    }
}

/// Removes an item from the queue without playing it.
pub fn remove_item(room: &Room, key: &QueueItemKey) -> Result<RoomUpdate, QueueError> {
    if !room.queue.iter().any(|i| i.key() == *key) {
        return Err(QueueError::ItemNotFound(key.clone()));
    }

    let queue = room
        .queue
        .iter()
        .filter(|i| i.key() != *key)
        .cloned()
        .collect();

    Ok(RoomUpdate {
        queue: Some(queue),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::{add_item, advance, remove_item, vote};
    use super::QueueError;
    use crate::{mock_item, mock_room, VoteDirection};

    fn titles(room: &crate::Room) -> Vec<String> {
        room.queue.iter().map(|i| i.video.id.clone()).collect()
    }

    #[test]
    fn first_item_starts_playing() {
        let mut room = mock_room();
        let track = mock_item("trackX", 10);

        room.apply(&add_item(&room, track.clone(), 20));

        assert_eq!(room.current_song, Some(track));
        assert!(room.is_playing);
        assert_eq!(room.synced_time, 0.);
        assert_eq!(room.last_sync_update, 20);
        assert!(room.queue.is_empty());
    }

    #[test]
    fn later_items_are_queued() {
        let mut room = mock_room();

        room.apply(&add_item(&room, mock_item("a", 1), 1));
        room.apply(&add_item(&room, mock_item("b", 2), 2));
        room.apply(&add_item(&room, mock_item("c", 3), 3));

        assert_eq!(room.current_song.as_ref().unwrap().video.id, "a");
        assert_eq!(titles(&room), vec!["b", "c"]);
    }

    #[test]
    fn votes_reorder_queue() {
        let mut room = mock_room();
        room.current_song = Some(mock_item("playing", 0));

        let item1 = mock_item("item1", 1);
        let item2 = mock_item("item2", 2);

        room.apply(&add_item(&room, item1.clone(), 1));
        room.apply(&add_item(&room, item2.clone(), 2));

        room.apply(&vote(&room, &item1.key(), "u2", VoteDirection::Up).unwrap());
        room.apply(&vote(&room, &item2.key(), "u3", VoteDirection::Up).unwrap());
        room.apply(&vote(&room, &item2.key(), "u4", VoteDirection::Up).unwrap());

        assert_eq!(titles(&room), vec!["item2", "item1"]);
        assert_eq!(room.queue[0].votes, 2);
        assert_eq!(room.queue[1].votes, 1);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut room = mock_room();
        room.current_song = Some(mock_item("playing", 0));

        for (index, id) in ["a", "b", "c", "d"].iter().enumerate() {
            room.apply(&add_item(&room, mock_item(id, index as i64), 0));
        }

        let key = |id: &str| room.queue.iter().find(|i| i.video.id == id).unwrap().key();
        let (b, d) = (key("b"), key("d"));

        // b and d end up tied at 1, but d was voted first
        room.apply(&vote(&room, &d, "u2", VoteDirection::Up).unwrap());
        room.apply(&vote(&room, &b, "u2", VoteDirection::Up).unwrap());
        assert_eq!(titles(&room), vec!["d", "b", "a", "c"]);

        // d drops back to 0 and falls behind b, but stays ahead of a and c
        room.apply(&vote(&room, &d, "u2", VoteDirection::Up).unwrap());
        assert_eq!(titles(&room), vec!["b", "d", "a", "c"]);

        // All tied again, order from the previous sort is kept
        room.apply(&vote(&room, &b, "u2", VoteDirection::Up).unwrap());
        assert_eq!(titles(&room), vec!["b", "d", "a", "c"]);

        room.apply(&vote(&room, &a_key(&room), "u3", VoteDirection::Down).unwrap());
        assert_eq!(titles(&room), vec!["b", "d", "c", "a"]);
    }

    fn a_key(room: &crate::Room) -> crate::QueueItemKey {
        room.queue.iter().find(|i| i.video.id == "a").unwrap().key()
    }

    #[test]
    fn unknown_item_is_an_error() {
        let room = mock_room();
        let key = mock_item("ghost", 1).key();

        assert_eq!(
            vote(&room, &key, "u1", VoteDirection::Up),
            Err(QueueError::ItemNotFound(key.clone()))
        );
        assert!(remove_item(&room, &key).is_err());
    }

    #[test]
    fn same_track_queued_twice_is_distinct() {
        let mut room = mock_room();
        room.current_song = Some(mock_item("playing", 0));

        room.apply(&add_item(&room, mock_item("song", 1), 1));
        room.apply(&add_item(&room, mock_item("song", 2), 2));

        let second = room.queue[1].key();
        room.apply(&vote(&room, &second, "u2", VoteDirection::Up).unwrap());

        assert_eq!(room.queue[0].added_at, 2);
        assert_eq!(room.queue[0].votes, 1);
        assert_eq!(room.queue[1].votes, 0);
    }

    #[test]
    fn advance_pops_head() {
        let mut room = mock_room();
        room.current_song = Some(mock_item("playing", 0));
        room.synced_time = 93.;

        room.apply(&add_item(&room, mock_item("next", 1), 1));
        room.apply(&advance(&room, 50));

        assert_eq!(room.current_song.as_ref().unwrap().video.id, "next");
        assert!(room.queue.is_empty());
        assert!(room.is_playing);
        assert_eq!(room.synced_time, 0.);

        room.apply(&advance(&room, 60));

        assert!(room.current_song.is_none());
        assert!(!room.is_playing);
    }

    #[test]
    fn remove_keeps_order() {
        let mut room = mock_room();
        room.current_song = Some(mock_item("playing", 0));

        for (index, id) in ["a", "b", "c"].iter().enumerate() {
            room.apply(&add_item(&room, mock_item(id, index as i64), 0));
        }

        let b = room.queue[1].key();
        room.apply(&remove_item(&room, &b).unwrap());

        assert_eq!(titles(&room), vec!["a", "c"]);
    }
}
