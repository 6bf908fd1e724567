//! Roomflow: the engine-room pieces of a Matrix-style chat client's UI layer.
//!
//! Two independent subsystems, both headless:
//! * [`room_list`]: incremental, tag-partitioned room-list ordering with
//!   pluggable sorting and list algorithms, coordinated by a store that
//!   publishes immutable ordered snapshots.
//! * [`auth`]: the user-interactive authentication (UIA) state machine,
//!   including SSO/fallback popup coordination and out-of-band polling.
//!
//! The crate never talks HTTP or draws UI itself; rooms, transports, prompts,
//! and popups are all collaborators injected behind traits.

/// User-interactive authentication.
pub mod auth;
/// Room-list ordering: models, sorting, algorithms, and the store.
pub mod room_list;

pub use auth::interactive_auth::{AuthInputs, InteractiveAuth, StageDecision, StagePrompter};
pub use auth::types::{AuthDict, AuthFlow, AuthType, UiaError, UiaInfo};
pub use room_list::models::{
    ListAlgorithm, RoomEntry, RoomHandle, RoomId, RoomUpdateCause, SortAlgorithm, TagId,
};
pub use room_list::store::{RoomListConfig, RoomListStore, RoomListUpdate};
