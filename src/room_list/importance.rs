//! The Importance list algorithm: rooms partitioned into notification-level
//! categories, most important first, each category sorted independently.

use imbl::Vector;
use tracing::warn;

use crate::room_list::algorithm::{OrderingAlgorithm, RoomListError, position_of};
use crate::room_list::models::{
    NotificationLevel, RoomHandle, RoomId, RoomUpdateCause, SortAlgorithm, TagId,
};
use crate::room_list::tag_sorting::sort_rooms;

/// The categories, in published order. With Recent sort and muted-to-bottom
/// active, muted rooms form a trailing fifth category below all of these.
const CATEGORY_ORDER: [NotificationLevel; 4] = [
    NotificationLevel::Red,
    NotificationLevel::Grey,
    NotificationLevel::Bold,
    NotificationLevel::None,
];

const MUTED_CATEGORY: usize = CATEGORY_ORDER.len();

/// Category-partitioned ordering.
///
/// Manual sort is the exception: manually ordered tags are not categorized at
/// all (the user's explicit order wins), and activity updates are no-ops.
pub struct ImportanceAlgorithm {
    tag: TagId,
    sort: SortAlgorithm,
    muted_to_bottom: bool,
    /// One bucket per entry of [`CATEGORY_ORDER`], plus the trailing muted
    /// bucket. Under Manual sort only the first bucket is used.
    buckets: Vec<Vec<RoomHandle>>,
    ordered: Vector<RoomHandle>,
}

impl ImportanceAlgorithm {
    pub fn new(tag: TagId, sort: SortAlgorithm, muted_to_bottom: bool) -> Self {
        ImportanceAlgorithm {
            tag,
            sort,
            muted_to_bottom,
            buckets: (0..=MUTED_CATEGORY).map(|_| Vec::new()).collect(),
            ordered: Vector::new(),
        }
    }

    fn mute_partition_active(&self) -> bool {
        self.muted_to_bottom && self.sort == SortAlgorithm::Recent
    }

    /// Which bucket the room belongs in right now.
    fn category_of(&self, room: &RoomHandle) -> usize {
        if self.sort == SortAlgorithm::Manual {
            return 0;
        }
        if self.mute_partition_active() && room.is_muted() {
            return MUTED_CATEGORY;
        }
        CATEGORY_ORDER
            .iter()
            .position(|&level| level == room.notification_level())
            .unwrap_or(CATEGORY_ORDER.len() - 1)
    }

    /// Which bucket currently holds the room, if any.
    fn bucket_holding(&self, id: &RoomId) -> Option<usize> {
        self.buckets.iter().position(|b| position_of(b, id).is_some())
    }

    fn resort_bucket(&mut self, idx: usize) {
        self.buckets[idx] = sort_rooms(&self.buckets[idx], &self.tag, self.sort);
    }

    fn rebuild_ordered(&mut self) {
        self.ordered = self.buckets.iter().flatten().cloned().collect();
    }

    /// Moves the room into its correct bucket (resorting the destination), or
    /// resorts its current bucket in place when the category is unchanged.
    fn reslot(&mut self, room: RoomHandle, cause: RoomUpdateCause) -> bool {
        let id = room.room_id().clone();
        let target = self.category_of(&room);
        match self.bucket_holding(&id) {
            Some(current) if current == target => {
                self.resort_bucket(current);
                true
            }
            Some(current) => {
                let idx = position_of(&self.buckets[current], &id)
                    .expect("BUG: bucket_holding returned a bucket without the room");
                let moved = self.buckets[current].remove(idx);
                self.buckets[target].push(moved);
                self.resort_bucket(target);
                true
            }
            None => {
                warn!("Room {id} has no index in {} for {cause:?}", self.tag);
                false
            }
        }
    }
}

impl OrderingAlgorithm for ImportanceAlgorithm {
    fn set_rooms(&mut self, rooms: Vec<RoomHandle>) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        for room in rooms {
            let idx = self.category_of(&room);
            self.buckets[idx].push(room);
        }
        for idx in 0..self.buckets.len() {
            self.resort_bucket(idx);
        }
        self.rebuild_ordered();
    }

    fn handle_room_update(
        &mut self,
        room: RoomHandle,
        cause: RoomUpdateCause,
    ) -> Result<bool, RoomListError> {
        let changed = match cause {
            RoomUpdateCause::NewRoom => {
                let idx = self.category_of(&room);
                self.buckets[idx].push(room);
                self.resort_bucket(idx);
                true
            }
            RoomUpdateCause::RoomRemoved => {
                let id = room.room_id().clone();
                match self.bucket_holding(&id) {
                    Some(bucket) => {
                        let idx = position_of(&self.buckets[bucket], &id)
                            .expect("BUG: bucket_holding returned a bucket without the room");
                        // removal keeps relative order; no resort needed
                        self.buckets[bucket].remove(idx);
                        true
                    }
                    None => {
                        warn!("Tried to remove unknown room from {}: {id}", self.tag);
                        false
                    }
                }
            }
            RoomUpdateCause::PossibleMuteChange => {
                if !self.mute_partition_active() {
                    false
                } else {
                    self.reslot(room, cause)
                }
            }
            RoomUpdateCause::Timeline | RoomUpdateCause::ReadReceipt => {
                if self.sort == SortAlgorithm::Manual {
                    // manual order is unaffected by activity
                    false
                } else {
                    self.reslot(room, cause)
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
