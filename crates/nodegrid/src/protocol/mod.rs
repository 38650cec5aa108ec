//! Wire protocol shared by routers, connections and handlers.
//!
//! Messages are JSON envelopes framed one per line. A request-response
//! envelope is answered by exactly one [`Response`] carrying the same
//! `session_id` and `sequence`; a one-way envelope is never answered.

mod envelope;
mod errors;
mod response;
mod session;

pub use self::envelope::{Conversation, MessageEnvelope, OperationRequest, RESULT_SLOT_PREFIX};
pub use self::errors::DispatchError;
pub use self::response::{Failure, FailureClass, Outcome, Response};
pub use self::session::MessageSession;
