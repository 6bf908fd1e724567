//! Pure tag-sorting functions.
//!
//! Each function takes a set of room handles and returns a freshly ordered
//! copy; inputs are never mutated, so the same sorter can be shared by every
//! ordering algorithm. Sorting is deterministic: every comparator breaks ties
//! on the room id, and sorting an already-sorted list yields an equal order.

use std::cmp::Ordering;

use crate::room_list::models::{RoomHandle, SortAlgorithm, TagId, recency_ts};

/// Sorts `rooms` within `tag` according to the selected algorithm,
/// returning a new ordered list containing exactly the same entries.
pub fn sort_rooms(rooms: &[RoomHandle], tag: &TagId, algorithm: SortAlgorithm) -> Vec<RoomHandle> {
    let mut sorted = rooms.to_vec();
    match algorithm {
        SortAlgorithm::Manual => sorted.sort_by(|a, b| compare_manual(a, b, tag)),
        SortAlgorithm::Alphabetic => sorted.sort_by(|a, b| compare_alphabetic(a, b)),
        SortAlgorithm::Recent => sorted.sort_by(|a, b| compare_recent(a, b)),
    }
    sorted
}

/// Most recent activity first. Rooms with no loaded timeline report
/// [`Ts::MAX`](crate::room_list::models::Ts::MAX) and therefore sort to the top.
fn compare_recent(a: &RoomHandle, b: &RoomHandle) -> Ordering {
    recency_ts(b.as_ref())
        .cmp(&recency_ts(a.as_ref()))
        .then_with(|| a.room_id().cmp(b.room_id()))
}

/// Case-insensitive by display name; nameless rooms sort last.
fn compare_alphabetic(a: &RoomHandle, b: &RoomHandle) -> Ordering {
    let name_a = a.display_name().map(|n| n.to_lowercase());
    let name_b = b.display_name().map(|n| n.to_lowercase());
    match (name_a, name_b) {
        (Some(na), Some(nb)) => na.cmp(&nb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.room_id().cmp(b.room_id()))
}

/// Ascending by the account-data `order` float for this tag; rooms without an
/// order value sort after all ordered rooms.
fn compare_manual(a: &RoomHandle, b: &RoomHandle, tag: &TagId) -> Ordering {
    let order_a = a.tag_order(tag);
    let order_b = b.tag_order(tag);
    match (order_a, order_b) {
        (Some(oa), Some(ob)) => oa.partial_cmp(&ob).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.room_id().cmp(b.room_id()))
}

/// Computes the `order` value for a room being manually inserted between two
/// neighbours, as the midpoint of their order values.
///
/// `before` is the order of the entry immediately above the insertion point
/// (sentinel 0.0 when inserting at the very start) and `after` the one
/// immediately below it (sentinel 1.0 when inserting at the very end).
///
/// Repeated insertion between the same two neighbours converges towards
/// indistinguishable floats; the values are not renormalized.
pub fn manual_insertion_order(before: Option<f64>, after: Option<f64>) -> f64 {
    let lo = before.unwrap_or(0.0);
    let hi = after.unwrap_or(1.0);
    (lo + hi) / 2.0
}
