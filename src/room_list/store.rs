//! The room-list store: owns one ordering algorithm per tag, routes room
//! updates to the right algorithms, and publishes coalesced snapshots.

use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender};
use imbl::Vector;
use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::room_list::algorithm::{OrderingAlgorithm, RoomListError, new_list_algorithm};
use crate::room_list::models::{
    ListAlgorithm, Membership, RoomHandle, RoomId, RoomUpdateCause, SortAlgorithm, TagId,
};
use crate::room_list::tag_sorting::manual_insertion_order;

/// Per-tag configuration fallback for tags with no explicit configuration.
pub const DEFAULT_SORT: SortAlgorithm = SortAlgorithm::Recent;
pub const DEFAULT_LIST_ALGORITHM: ListAlgorithm = ListAlgorithm::Importance;

/// Store-wide configuration, injected at construction.
#[derive(Clone, Debug)]
pub struct RoomListConfig {
    /// Whether muted rooms sink below all default-priority rooms.
    pub muted_to_bottom: bool,
}

impl Default for RoomListConfig {
    fn default() -> Self {
        RoomListConfig { muted_to_bottom: true }
    }
}

/// One aggregated "lists updated" notification, coalescing every per-tag
/// change triggered by a single external event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomListUpdate {
    /// The tags whose ordered lists changed.
    pub changed_tags: Vec<TagId>,
}

/// The tags shown by default, in their display order.
pub fn ordered_default_tags() -> Vec<TagId> {
    vec![
        TagId::invite(),
        TagId::favourite(),
        TagId::dm(),
        TagId::untagged(),
        TagId::low_priority(),
        TagId::server_notice(),
        TagId::archived(),
    ]
}

/// Coordinates the per-tag ordering algorithms.
///
/// Explicitly constructed and passed to whatever needs it; there is no global
/// instance, so stores in tests are fully independent.
pub struct RoomListStore {
    config: RoomListConfig,
    tag_sorting: IndexMap<TagId, SortAlgorithm>,
    list_orders: IndexMap<TagId, ListAlgorithm>,
    algorithms: IndexMap<TagId, Box<dyn OrderingAlgorithm>>,
    /// The tag set each known room was last routed to, used to diff on
    /// `PossibleTagChange` and to route removals.
    room_tags: HashMap<RoomId, Vec<TagId>>,
    subscribers: Vec<Sender<RoomListUpdate>>,
}

impl RoomListStore {
    pub fn new(config: RoomListConfig) -> Self {
        let mut store = RoomListStore {
            config,
            tag_sorting: IndexMap::new(),
            list_orders: IndexMap::new(),
            algorithms: IndexMap::new(),
            room_tags: HashMap::new(),
            subscribers: Vec::new(),
        };
        for tag in ordered_default_tags() {
            store.ensure_algorithm(&tag);
        }
        store
    }

    /// Registers a subscriber. Every coalesced publication sends one
    /// [`RoomListUpdate`] on the returned channel.
    pub fn subscribe(&mut self) -> Receiver<RoomListUpdate> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.subscribers.push(sender);
        receiver
    }

    /// The configured sort for a tag, falling back to [`DEFAULT_SORT`].
    pub fn tag_sorting(&self, tag: &TagId) -> SortAlgorithm {
        self.tag_sorting.get(tag).copied().unwrap_or(DEFAULT_SORT)
    }

    /// The configured list algorithm for a tag, falling back to
    /// [`DEFAULT_LIST_ALGORITHM`].
    pub fn list_order(&self, tag: &TagId) -> ListAlgorithm {
        self.list_orders.get(tag).copied().unwrap_or(DEFAULT_LIST_ALGORITHM)
    }

    /// Reconfigures a tag's sort algorithm, rebuilding its ordering from the
    /// currently known rooms.
    pub fn set_tag_sorting(&mut self, tag: &TagId, sort: SortAlgorithm) {
        self.tag_sorting.insert(tag.clone(), sort);
        self.rebuild_tag(tag);
        self.publish(vec![tag.clone()]);
    }

    /// Reconfigures a tag's list algorithm, rebuilding its ordering from the
    /// currently known rooms.
    pub fn set_list_order(&mut self, tag: &TagId, order: ListAlgorithm) {
        self.list_orders.insert(tag.clone(), order);
        self.rebuild_tag(tag);
        self.publish(vec![tag.clone()]);
    }

    /// The current snapshot: tag → ordered room list.
    ///
    /// The returned vectors share structure with the store's internal state
    /// and must be treated as immutable by subscribers.
    pub fn ordered_lists(&self) -> IndexMap<TagId, Vector<RoomHandle>> {
        self.algorithms
            .iter()
            .map(|(tag, alg)| (tag.clone(), alg.ordered_rooms().clone()))
            .collect()
    }

    /// The ordered rooms of one tag, if the tag is known.
    pub fn ordered_rooms(&self, tag: &TagId) -> Option<Vector<RoomHandle>> {
        self.algorithms.get(tag).map(|alg| alg.ordered_rooms().clone())
    }

    /// The set of tags a room currently belongs to: account-data user tags
    /// plus system-derived memberships, with `untagged` as the final
    /// fallback. Never empty.
    pub fn tags_for_room(&self, room: &RoomHandle) -> Vec<TagId> {
        match room.membership() {
            Membership::Invite => return vec![TagId::invite()],
            Membership::Leave | Membership::Ban => return vec![TagId::archived()],
            Membership::Join => {}
        }
        let mut tags = room.user_tags();
        if tags.is_empty() {
            tags.push(if room.is_direct() { TagId::dm() } else { TagId::untagged() });
        }
        tags
    }

    /// Replaces the entire known room set, regenerating every tag's list.
    pub fn set_known_rooms(&mut self, rooms: Vec<RoomHandle>) {
        debug!("Regenerating all room lists from {} known rooms", rooms.len());
        let mut per_tag: IndexMap<TagId, Vec<RoomHandle>> = IndexMap::new();
        for tag in self.algorithms.keys() {
            per_tag.insert(tag.clone(), Vec::new());
        }

        self.room_tags.clear();
        for room in rooms {
            let tags = self.tags_for_room(&room);
            self.room_tags.insert(room.room_id().clone(), tags.clone());
            for tag in tags {
                per_tag.entry(tag).or_default().push(room.clone());
            }
        }

        let changed: Vec<TagId> = per_tag.keys().cloned().collect();
        for (tag, tag_rooms) in per_tag {
            self.ensure_algorithm(&tag);
            if let Some(alg) = self.algorithms.get_mut(&tag) {
                alg.set_rooms(tag_rooms);
            }
        }
        self.publish(changed);
    }

    /// Routes one room mutation to the ordering algorithm of every tag the
    /// room belongs to, then publishes a single coalesced notification if
    /// anything changed.
    pub fn handle_room_update(
        &mut self,
        room: RoomHandle,
        cause: RoomUpdateCause,
    ) -> Result<(), RoomListError> {
        trace!("Room update: {} cause {cause:?}", room.room_id());
        let changed = match cause {
            RoomUpdateCause::PossibleTagChange => self.handle_possible_tag_change(&room)?,
            RoomUpdateCause::NewRoom => {
                let tags = self.tags_for_room(&room);
                self.room_tags.insert(room.room_id().clone(), tags.clone());
                let mut changed = Vec::new();
                for tag in tags {
                    self.ensure_algorithm(&tag);
                    if self.dispatch(&tag, room.clone(), RoomUpdateCause::NewRoom)? {
                        changed.push(tag);
                    }
                }
                changed
            }
            RoomUpdateCause::RoomRemoved => {
                let tags = self.room_tags.remove(room.room_id()).unwrap_or_default();
                let mut changed = Vec::new();
                for tag in tags {
                    if self.dispatch(&tag, room.clone(), RoomUpdateCause::RoomRemoved)? {
                        changed.push(tag);
                    }
                }
                changed
            }
            RoomUpdateCause::Timeline
            | RoomUpdateCause::ReadReceipt
            | RoomUpdateCause::PossibleMuteChange => {
                let tags = self.room_tags.get(room.room_id()).cloned().unwrap_or_default();
                let mut changed = Vec::new();
                for tag in tags {
                    if self.dispatch(&tag, room.clone(), cause)? {
                        changed.push(tag);
                    }
                }
                changed
            }
        };

        if !changed.is_empty() {
            self.publish(changed);
        }
        Ok(())
    }

    /// Computes the manual `order` value for inserting a room at `index`
    /// within a tag's current ordering, as the midpoint of its prospective
    /// neighbours' order values (sentinels 0 and 1 at the edges).
    pub fn manual_order_for_index(&self, tag: &TagId, index: usize) -> f64 {
        let rooms = self
            .algorithms
            .get(tag)
            .map(|alg| alg.ordered_rooms().clone())
            .unwrap_or_default();
        let before = index.checked_sub(1).and_then(|i| rooms.get(i)).and_then(|r| r.tag_order(tag));
        let after = rooms.get(index).and_then(|r| r.tag_order(tag));
        manual_insertion_order(before, after)
    }

    fn handle_possible_tag_change(
        &mut self,
        room: &RoomHandle,
    ) -> Result<Vec<TagId>, RoomListError> {
        let id = room.room_id().clone();
        let old_tags = self.room_tags.get(&id).cloned().unwrap_or_default();
        let new_tags = self.tags_for_room(room);
        let mut changed = Vec::new();

        for tag in &old_tags {
            if !new_tags.contains(tag)
                && self.dispatch(tag, room.clone(), RoomUpdateCause::RoomRemoved)?
            {
                changed.push(tag.clone());
            }
        }
        for tag in &new_tags {
            if !old_tags.contains(tag) {
                self.ensure_algorithm(tag);
                if self.dispatch(tag, room.clone(), RoomUpdateCause::NewRoom)? {
                    changed.push(tag.clone());
                }
            }
        }

        self.room_tags.insert(id, new_tags);
        Ok(changed)
    }

    fn dispatch(
        &mut self,
        tag: &TagId,
        room: RoomHandle,
        cause: RoomUpdateCause,
    ) -> Result<bool, RoomListError> {
        match self.algorithms.get_mut(tag) {
            Some(alg) => alg.handle_room_update(room, cause),
            None => Ok(false),
        }
    }

    fn ensure_algorithm(&mut self, tag: &TagId) {
        if !self.algorithms.contains_key(tag) {
            let alg = new_list_algorithm(
                self.list_order(tag),
                tag.clone(),
                self.tag_sorting(tag),
                self.config.muted_to_bottom,
            );
            self.algorithms.insert(tag.clone(), alg);
        }
    }

    /// Tears down and recreates one tag's algorithm with the current
    /// configuration, re-seeding it from the rooms known to belong there.
    fn rebuild_tag(&mut self, tag: &TagId) {
        let rooms: Vec<RoomHandle> = self
            .algorithms
            .get(tag)
            .map(|alg| alg.ordered_rooms().iter().cloned().collect())
            .unwrap_or_default();
        let mut alg = new_list_algorithm(
            self.list_order(tag),
            tag.clone(),
            self.tag_sorting(tag),
            self.config.muted_to_bottom,
        );
        alg.set_rooms(rooms);
        self.algorithms.insert(tag.clone(), alg);
    }

    fn publish(&mut self, changed_tags: Vec<TagId>) {
        let update = RoomListUpdate { changed_tags };
        self.subscribers.retain(|sender| sender.send(update.clone()).is_ok());
    }
}
