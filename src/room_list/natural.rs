//! The Natural list algorithm: a flat ordering per tag, with muted rooms
//! optionally sunk below all default-priority rooms.

use imbl::Vector;
use tracing::warn;

use crate::room_list::algorithm::{OrderingAlgorithm, RoomListError, position_of};
use crate::room_list::models::{RoomHandle, RoomUpdateCause, SortAlgorithm, TagId};
use crate::room_list::tag_sorting::sort_rooms;

/// Maintains two sub-lists (default-priority and muted) whose concatenation,
/// default first, forms the published order for the tag.
///
/// Muted rooms always sort after every default-priority room regardless of
/// their own recency, so muted noise never out-competes active conversations.
pub struct NaturalAlgorithm {
    tag: TagId,
    sort: SortAlgorithm,
    muted_to_bottom: bool,
    default_rooms: Vec<RoomHandle>,
    muted_rooms: Vec<RoomHandle>,
    ordered: Vector<RoomHandle>,
}

impl NaturalAlgorithm {
    pub fn new(tag: TagId, sort: SortAlgorithm, muted_to_bottom: bool) -> Self {
        NaturalAlgorithm {
            tag,
            sort,
            muted_to_bottom,
            default_rooms: Vec::new(),
            muted_rooms: Vec::new(),
            ordered: Vector::new(),
        }
    }

    /// Mute partitioning only applies under Recent sort: a manually or
    /// alphabetically ordered tag keeps muted rooms in place.
    fn mute_partition_active(&self) -> bool {
        self.muted_to_bottom && self.sort == SortAlgorithm::Recent
    }

    fn is_muted_here(&self, room: &RoomHandle) -> bool {
        self.mute_partition_active() && room.is_muted()
    }

    fn rebuild_ordered(&mut self) {
        self.ordered = self
            .default_rooms
            .iter()
            .chain(self.muted_rooms.iter())
            .cloned()
            .collect();
    }

    fn resort_default(&mut self) {
        self.default_rooms = sort_rooms(&self.default_rooms, &self.tag, self.sort);
    }

    fn resort_muted(&mut self) {
        self.muted_rooms = sort_rooms(&self.muted_rooms, &self.tag, self.sort);
    }

    fn insert_into_sublist(&mut self, room: RoomHandle) {
        if self.is_muted_here(&room) {
            self.muted_rooms.push(room);
            self.resort_muted();
        } else {
            self.default_rooms.push(room);
            self.resort_default();
        }
    }
}

impl OrderingAlgorithm for NaturalAlgorithm {
    fn set_rooms(&mut self, rooms: Vec<RoomHandle>) {
        let (muted, default): (Vec<_>, Vec<_>) =
            rooms.into_iter().partition(|r| self.is_muted_here(r));
        self.default_rooms = sort_rooms(&default, &self.tag, self.sort);
        self.muted_rooms = sort_rooms(&muted, &self.tag, self.sort);
        self.rebuild_ordered();
    }

    fn handle_room_update(
        &mut self,
        room: RoomHandle,
        cause: RoomUpdateCause,
    ) -> Result<bool, RoomListError> {
        let changed = match cause {
            RoomUpdateCause::NewRoom => {
                self.insert_into_sublist(room);
                true
            }
            RoomUpdateCause::RoomRemoved => {
                let id = room.room_id().clone();
                if let Some(idx) = position_of(&self.default_rooms, &id) {
                    self.default_rooms.remove(idx);
                    true
                } else if let Some(idx) = position_of(&self.muted_rooms, &id) {
                    self.muted_rooms.remove(idx);
                    true
                } else {
                    warn!("Tried to remove unknown room from {}: {id}", self.tag);
                    false
                }
            }
            RoomUpdateCause::PossibleMuteChange => {
                if !self.mute_partition_active() {
                    false
                } else {
                    let id = room.room_id().clone();
                    let now_muted = room.is_muted();
                    let in_default = position_of(&self.default_rooms, &id);
                    let in_muted = position_of(&self.muted_rooms, &id);
                    match (in_default, in_muted) {
                        (Some(idx), _) if now_muted => {
                            let moved = self.default_rooms.remove(idx);
                            self.muted_rooms.push(moved);
                            self.resort_muted();
                            true
                        }
                        (_, Some(idx)) if !now_muted => {
                            let moved = self.muted_rooms.remove(idx);
                            self.default_rooms.push(moved);
                            self.resort_default();
                            true
                        }
                        (None, None) => {
                            warn!("Mute change for room not in {}: {id}", self.tag);
                            false
                        }
                        // still in the right sub-list
                        _ => false,
                    }
                }
            }
            RoomUpdateCause::Timeline | RoomUpdateCause::ReadReceipt => {
                // Deliberately conservative: resort the whole containing
                // sub-list rather than attempting a cheaper targeted move.
                let id = room.room_id().clone();
                if position_of(&self.default_rooms, &id).is_some() {
                    self.resort_default();
                    true
                } else if position_of(&self.muted_rooms, &id).is_some() {
                    self.resort_muted();
                    true
                } else {
                    warn!("Room {id} has no index in {}", self.tag);
                    false
                }
            }
            RoomUpdateCause::PossibleTagChange => {
                return Err(RoomListError::UnsupportedCause {
                    room: room.room_id().clone(),
                    tag: self.tag.clone(),
                    cause,
                });
            }
        };

        if changed {
            self.rebuild_ordered();
        }
        Ok(changed)
    }

    fn ordered_rooms(&self) -> &Vector<RoomHandle> {
        &self.ordered
    }
}
