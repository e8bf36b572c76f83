//! Share repositories.

pub mod incoming;
pub mod outgoing;

pub use incoming::{IncomingShare, IncomingShareRepo, InMemoryIncomingShareRepo, ShareStatus};
pub use outgoing::{InMemoryOutgoingShareRepo, OutgoingShare, OutgoingShareRepo, OutgoingShareStatus};
