use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{MemberId, Timestamp};

/// An external media reference. Opaque to the engine besides its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRef {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub channel_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// A track in a room queue, along with its votes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub video: VideoRef,
    pub added_by: MemberId,
    pub added_at: Timestamp,
    #[serde(default)]
    pub upvoters: Vec<MemberId>,
    #[serde(default)]
    pub downvoters: Vec<MemberId>,
    /// Cached net score, kept for readers of the record.
    /// The vote sets are authoritative.
    #[serde(default)]
    pub votes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

/// Identifies a queue item. The same video can be queued twice at different times.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueItemKey {
    pub video_id: String,
    pub added_at: Timestamp,
}

impl QueueItem {
    pub fn new(video: VideoRef, added_by: impl Into<MemberId>, added_at: Timestamp) -> Self {
        Self {
            video,
            added_by: added_by.into(),
            added_at,
            upvoters: vec![],
            downvoters: vec![],
            votes: 0,
        }
    }

    pub fn key(&self) -> QueueItemKey {
        QueueItemKey {
            video_id: self.video.id.clone(),
            added_at: self.added_at,
        }
    }

    /// The net score derived from the vote sets.
    pub fn score(&self) -> i64 {
        self.upvoters.len() as i64 - self.downvoters.len() as i64
    }

    /// Returns the contribution of a member to the score: -1, 0 or 1.
    pub fn vote_of(&self, member: &str) -> i64 {
        let up = self.upvoters.iter().any(|m| m == member);
        let down = self.downvoters.iter().any(|m| m == member);

        up as i64 - down as i64
    }

    /// Voting the same direction twice removes the vote,
    /// voting the other direction moves it.
    pub fn toggle_vote(&mut self, member: &str, direction: VoteDirection) {
        let (same, opposite) = match direction {
            VoteDirection::Up => (&mut self.upvoters, &mut self.downvoters),
            VoteDirection::Down => (&mut self.downvoters, &mut self.upvoters),
        };

        if same.iter().any(|m| m == member) {
            same.retain(|m| m != member);
        } else {
            same.push(member.to_string());
            opposite.retain(|m| m != member);
        }

        self.votes = self.score();
    }
}

impl Display for QueueItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.video_id, self.added_at)
    }
}

impl FromStr for QueueItemKey {
    type Err = String;

    // Video ids may contain dashes themselves, so split from the right
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (video_id, added_at) = s
            .rsplit_once('-')
            .ok_or_else(|| format!("{s:?} is not a queue item key"))?;

        let added_at = added_at
            .parse()
            .map_err(|_| format!("{s:?} has an invalid timestamp"))?;

        if video_id.is_empty() {
            return Err(format!("{s:?} has no video id"));
        }

        Ok(Self {
            video_id: video_id.to_string(),
            added_at,
        })
    }
}

#[cfg(test)]
pub(crate) fn mock_item(video_id: &str, added_at: Timestamp) -> QueueItem {
    QueueItem::new(
        VideoRef {
            id: video_id.to_string(),
            title: format!("Track {video_id}"),
            channel_title: "Channel".to_string(),
            thumbnail_url: None,
        },
        "u1",
        added_at,
    )
}
