pub mod factory;
pub mod gmail;
pub mod provider;

pub use factory::ClientFactory;
pub use provider::{ClientSource, MailboxProvider, MarkReadOutcome};
