//! Candidate sources: tenant mailboxes and supplier catalogs.

pub mod email;
pub mod supplier;

pub use email::{is_sds_attachment, monitor_mailbox};
pub use supplier::poll_suppliers;
