mod accumulator;
mod storage;
mod types;

pub use accumulator::{CONTINUATION_NOTE, ConversationAccumulator, Dispatch, Exchange};
pub use storage::{ConversationStore, SessionStore};
pub use types::*;
