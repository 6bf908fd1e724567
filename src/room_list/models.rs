//! Core data model for the room-list ordering engine.
//!
//! Rooms themselves are owned by the client's room store; this engine only
//! holds shared [`RoomEntry`] handles and never mutates a room.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// A room's stable identifier, e.g. `!abcdef:example.org`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        RoomId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        RoomId(s.to_owned())
    }
}

/// A tag (category bucket) that a room can belong to.
///
/// A fixed set of well-known tags exists (see the associated constructors);
/// arbitrary user-defined tag strings are also legal. A room may appear in
/// multiple tags, but at most once within a given tag's ordered list.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TagId(String);

impl TagId {
    /// The reserved namespace prefix for client-derived (non-account-data) tags.
    const FAKE_PREFIX: &'static str = "im.vector.fake.";

    pub fn new(tag: impl Into<String>) -> Self {
        TagId(tag.into())
    }

    /// Rooms the user has marked as favourite (account data).
    pub fn favourite() -> Self {
        TagId("m.favourite".into())
    }

    /// Rooms the user has marked as low priority (account data).
    pub fn low_priority() -> Self {
        TagId("m.lowpriority".into())
    }

    /// Server notice rooms (account data, set by the homeserver).
    pub fn server_notice() -> Self {
        TagId("m.server_notice".into())
    }

    /// Rooms suggested to the user, e.g. by a space.
    pub fn suggested() -> Self {
        TagId("m.suggested".into())
    }

    /// Rooms the user has been invited to but not yet joined.
    pub fn invite() -> Self {
        TagId(format!("{}invite", Self::FAKE_PREFIX))
    }

    /// Joined rooms with no other tag.
    pub fn untagged() -> Self {
        TagId(format!("{}recent", Self::FAKE_PREFIX))
    }

    /// Rooms the user has left or been banned from.
    pub fn archived() -> Self {
        TagId(format!("{}archived", Self::FAKE_PREFIX))
    }

    /// Direct-message rooms.
    pub fn dm() -> Self {
        TagId(format!("{}direct", Self::FAKE_PREFIX))
    }

    /// Whether this tag is one of the reserved system tags rather than an
    /// arbitrary user-defined tag.
    pub fn is_system(&self) -> bool {
        self.0.starts_with(Self::FAKE_PREFIX)
            || matches!(
                self.0.as_str(),
                "m.favourite" | "m.lowpriority" | "m.server_notice" | "m.suggested"
            )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TagId {
    fn from(s: &str) -> Self {
        TagId(s.to_owned())
    }
}

/// A room's membership state, reduced to the states the list engine cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Membership {
    Join,
    Invite,
    Leave,
    Ban,
}

/// The unread/notification level of a room, in increasing order of importance.
///
/// Drives the category partitioning of the Importance list algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NotificationLevel {
    /// Nothing unread.
    #[default]
    None,
    /// Unread messages that should not be counted (bolded room only).
    Bold,
    /// Unread notified messages.
    Grey,
    /// Unread highlights (mentions, keywords).
    Red,
}

/// Which tag-sorting function orders a tag's rooms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortAlgorithm {
    /// By the user-defined per-tag `order` value from account data.
    Manual,
    /// Case-insensitively by display name.
    Alphabetic,
    /// By most recent activity, newest first.
    Recent,
}

/// Which ordering algorithm manages a tag's incremental state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListAlgorithm {
    /// Flat ordering with muted rooms optionally sunk to the bottom.
    Natural,
    /// Partitioned by notification level, most important categories first.
    Importance,
}

/// The reason a particular room's position may need re-evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomUpdateCause {
    /// New activity in the room's timeline.
    Timeline,
    /// The room's account-data tags may have changed.
    PossibleTagChange,
    /// The room's mute/notification rules may have changed.
    PossibleMuteChange,
    /// Our own read receipt moved.
    ReadReceipt,
    /// The room is newly relevant to the list (joined, invited).
    NewRoom,
    /// The room is no longer relevant to the list.
    RoomRemoved,
}

/// A millisecond timestamp, as found on timeline events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ts(pub u64);

impl Ts {
    /// The sentinel used for rooms with no loaded timeline at all:
    /// they sort as if they were the newest possible room.
    pub const MAX: Ts = Ts(u64::MAX);
}

/// The opaque conversation-entry collaborator.
///
/// Implemented by the client's own room type; the ordering engine only reads
/// through this interface and holds non-owning [`RoomHandle`] references.
pub trait RoomEntry: Send + Sync {
    fn room_id(&self) -> &RoomId;

    /// The room's displayable name, if it has one.
    fn display_name(&self) -> Option<String>;

    fn membership(&self) -> Membership;

    /// Whether the room is muted by the user's push rules.
    fn is_muted(&self) -> bool;

    /// Whether this room is a direct-message room.
    fn is_direct(&self) -> bool;

    /// Timestamp of the most recent message on the room's main timeline,
    /// or `None` if no timeline events are loaded.
    fn last_message_ts(&self) -> Option<Ts>;

    /// Timestamp of the most recent reply across all of the room's threads,
    /// or `None` if there are none.
    fn latest_thread_reply_ts(&self) -> Option<Ts>;

    fn notification_level(&self) -> NotificationLevel;

    /// The user's account-data tags on this room.
    fn user_tags(&self) -> Vec<TagId>;

    /// The manual `order` value stored in account data for (room, tag),
    /// a float in `[0, 1]`.
    fn tag_order(&self, tag: &TagId) -> Option<f64>;
}

/// A shared, non-owning handle to a room entry.
pub type RoomHandle = Arc<dyn RoomEntry>;

/// The timestamp a room sorts by under the Recent algorithm: the most recent
/// of its last main-timeline message and its latest thread reply.
///
/// A room with no timeline activity at all yields [`Ts::MAX`], sorting it to
/// the top as the "newest" entry rather than erroring.
pub fn recency_ts(room: &dyn RoomEntry) -> Ts {
    match (room.last_message_ts(), room.latest_thread_reply_ts()) {
        (Some(main), Some(thread)) => main.max(thread),
        (Some(main), None) => main,
        (None, Some(thread)) => thread,
        (None, None) => Ts::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room_list::test_support::TestRoom;

    #[test]
    fn recency_prefers_thread_reply_when_newer() {
        let room = TestRoom::new("!a:x").with_last_message_ts(5).with_thread_reply_ts(50);
        assert_eq!(recency_ts(&room), Ts(50));
    }

    #[test]
    fn recency_falls_back_to_main_timeline() {
        let room = TestRoom::new("!a:x").with_last_message_ts(14);
        assert_eq!(recency_ts(&room), Ts(14));
    }

    #[test]
    fn room_without_any_timeline_sorts_as_newest() {
        let room = TestRoom::new("!empty:x");
        assert_eq!(recency_ts(&room), Ts::MAX);
    }

    #[test]
    fn system_tags_are_recognized() {
        assert!(TagId::favourite().is_system());
        assert!(TagId::invite().is_system());
        assert!(TagId::dm().is_system());
        assert!(!TagId::new("u.work").is_system());
    }
}
