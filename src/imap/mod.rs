// IMAP connection, mailbox session and message parsing
pub mod conn;
pub mod parse;
pub mod session;

pub use session::{Arrival, ImapConnector, MailboxConnector, MailboxSession, MessageRef};
