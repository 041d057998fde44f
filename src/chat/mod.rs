//! Conversation core: the append-only store, the input router and the session
//! that runs each routed flow against the backend.

pub mod router;
pub mod session;
pub mod store;

pub use router::{DispatchError, Flow, Route};
pub use session::{ChatSession, PendingFlow};
pub use store::{ConversationSnapshot, ConversationStore};
