//! Incremental, tag-partitioned room-list ordering.
//!
//! The [`store::RoomListStore`] is the entry point: it owns one ordering
//! algorithm per tag, routes room updates to the affected tags, and notifies
//! subscribers with one coalesced update per external event.

pub mod algorithm;
pub mod importance;
pub mod models;
pub mod natural;
pub mod store;
pub mod tag_sorting;

#[cfg(test)]
pub(crate) mod test_support;
