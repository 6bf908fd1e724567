//! The abstract ordering-algorithm contract shared by the Natural and
//! Importance variants.

use imbl::Vector;
use thiserror::Error;

use crate::room_list::importance::ImportanceAlgorithm;
use crate::room_list::models::{
    ListAlgorithm, RoomHandle, RoomId, RoomUpdateCause, SortAlgorithm, TagId,
};
use crate::room_list::natural::NaturalAlgorithm;

/// Errors from an ordering algorithm.
///
/// These indicate programmer errors (bad routing of update causes), not bad
/// data: an algorithm never errors for a room it cannot find, it logs and
/// reports "no change" instead.
#[derive(Debug, Error)]
pub enum RoomListError {
    /// The caller routed an update cause that ordering algorithms do not
    /// handle (tag changes are resolved by the store before dispatch).
    #[error("unsupported update cause {cause:?} for room {room} in {tag}")]
    UnsupportedCause {
        room: RoomId,
        tag: TagId,
        cause: RoomUpdateCause,
    },
}

/// Maintains the cached ordered room list for a single tag and updates it
/// incrementally in response to discrete room-update events.
pub trait OrderingAlgorithm: Send {
    /// Replaces the algorithm's entire managed room set. This is a total
    /// replacement, not an incremental update.
    fn set_rooms(&mut self, rooms: Vec<RoomHandle>);

    /// Incorporates one room mutation, returning whether the published order
    /// changed as a result.
    fn handle_room_update(
        &mut self,
        room: RoomHandle,
        cause: RoomUpdateCause,
    ) -> Result<bool, RoomListError>;

    /// The current published order. Recomputed after every mutating call;
    /// cheap to clone into a snapshot thanks to structural sharing.
    fn ordered_rooms(&self) -> &Vector<RoomHandle>;
}

/// Instantiates the ordering algorithm configured for a tag.
///
/// The set of list algorithms is a closed enum, so an invalid selection is
/// unrepresentable rather than a runtime error.
pub fn new_list_algorithm(
    kind: ListAlgorithm,
    tag: TagId,
    sort: SortAlgorithm,
    muted_to_bottom: bool,
) -> Box<dyn OrderingAlgorithm> {
    match kind {
        ListAlgorithm::Natural => Box::new(NaturalAlgorithm::new(tag, sort, muted_to_bottom)),
        ListAlgorithm::Importance => {
            Box::new(ImportanceAlgorithm::new(tag, sort, muted_to_bottom))
        }
    }
}

/// Index of a room within a cached sub-list, by id.
pub(crate) fn position_of(rooms: &[RoomHandle], id: &RoomId) -> Option<usize> {
    rooms.iter().position(|r| r.room_id() == id)
}
