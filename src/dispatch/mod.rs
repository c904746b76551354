//! Hand-off queue, sender loop and the two-phase send protocol.

mod dispatcher;
mod protocol;
mod sender;

pub(crate) use dispatcher::*;
pub(crate) use protocol::*;
pub(crate) use sender::*;
