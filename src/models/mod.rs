//! Wire schema of the notification envelope.
//!
//! An [`Event`] is what the receiver accepts: an [`EventMeta`] header plus a
//! [`Data`] body that either embeds the serialized resources or points at the
//! blob holding them.

mod envelope;
mod subject;
mod types;

pub use envelope::*;
pub use subject::*;
pub use types::*;

#[cfg(test)]
mod subject_test;
