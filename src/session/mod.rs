//! Durable session state: the record schema, the crash-safe store, and the
//! pure phase detector shared by the loop and the monitor.

pub mod phase;
pub mod record;
pub mod store;

pub use phase::{Phase, detect, judge_scratch_file};
pub use record::SessionRecord;
pub use store::{
    CANCEL_SENTINEL, LoopKind, STATE_FILE, SessionState, SessionStore, Terminal, find_active,
    latest_session,
};
