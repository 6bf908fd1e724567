//! Test-only fixtures for the room-list modules.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::room_list::models::{Membership, NotificationLevel, RoomEntry, RoomId, TagId, Ts};

/// An in-memory room whose fields can be mutated mid-test through a shared
/// handle, mimicking a live room changing underneath the algorithms.
pub(crate) struct TestRoom {
    id: RoomId,
    inner: Mutex<Inner>,
    muted: AtomicBool,
    direct: AtomicBool,
}

#[derive(Default)]
struct Inner {
    name: Option<String>,
    membership: Option<Membership>,
    last_message_ts: Option<Ts>,
    thread_reply_ts: Option<Ts>,
    notification_level: NotificationLevel,
    user_tags: Vec<TagId>,
    tag_orders: HashMap<TagId, f64>,
}

impl TestRoom {
    pub fn new(id: impl Into<String>) -> Self {
        TestRoom {
            id: RoomId::new(id),
            inner: Mutex::new(Inner::default()),
            muted: AtomicBool::new(false),
            direct: AtomicBool::new(false),
        }
    }

    pub fn with_name(self, name: &str) -> Self {
        self.inner.lock().unwrap().name = Some(name.to_owned());
        self
    }

    pub fn with_membership(self, membership: Membership) -> Self {
        self.inner.lock().unwrap().membership = Some(membership);
        self
    }

    pub fn with_last_message_ts(self, ts: u64) -> Self {
        self.inner.lock().unwrap().last_message_ts = Some(Ts(ts));
        self
    }

    pub fn with_thread_reply_ts(self, ts: u64) -> Self {
        self.inner.lock().unwrap().thread_reply_ts = Some(Ts(ts));
        self
    }

    pub fn with_notification_level(self, level: NotificationLevel) -> Self {
        self.inner.lock().unwrap().notification_level = level;
        self
    }

    pub fn with_user_tags(self, tags: Vec<TagId>) -> Self {
        self.inner.lock().unwrap().user_tags = tags;
        self
    }

    pub fn with_tag_order(self, tag: &TagId, order: f64) -> Self {
        self.inner.lock().unwrap().tag_orders.insert(tag.clone(), order);
        self
    }

    pub fn muted(self) -> Self {
        self.muted.store(true, Ordering::Relaxed);
        self
    }

    pub fn direct(self) -> Self {
        self.direct.store(true, Ordering::Relaxed);
        self
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn set_last_message_ts(&self, ts: u64) {
        self.inner.lock().unwrap().last_message_ts = Some(Ts(ts));
    }

    pub fn set_thread_reply_ts(&self, ts: u64) {
        self.inner.lock().unwrap().thread_reply_ts = Some(Ts(ts));
    }

    pub fn set_notification_level(&self, level: NotificationLevel) {
        self.inner.lock().unwrap().notification_level = level;
    }

    pub fn set_user_tags(&self, tags: Vec<TagId>) {
        self.inner.lock().unwrap().user_tags = tags;
    }
}

impl RoomEntry for TestRoom {
    fn room_id(&self) -> &RoomId {
        &self.id
    }

    fn display_name(&self) -> Option<String> {
        self.inner.lock().unwrap().name.clone()
    }

    fn membership(&self) -> Membership {
        self.inner.lock().unwrap().membership.unwrap_or(Membership::Join)
    }

    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    fn is_direct(&self) -> bool {
        self.direct.load(Ordering::Relaxed)
    }

    fn last_message_ts(&self) -> Option<Ts> {
        self.inner.lock().unwrap().last_message_ts
    }

    fn latest_thread_reply_ts(&self) -> Option<Ts> {
        self.inner.lock().unwrap().thread_reply_ts
    }

    fn notification_level(&self) -> NotificationLevel {
        self.inner.lock().unwrap().notification_level
    }

    fn user_tags(&self) -> Vec<TagId> {
        self.inner.lock().unwrap().user_tags.clone()
    }

    fn tag_order(&self, tag: &TagId) -> Option<f64> {
        self.inner.lock().unwrap().tag_orders.get(tag).copied()
    }
}
