//! Session layer
//!
//! Live client streams: the frame protocol spoken on them and the registry
//! that owns every session.

mod frames;
mod registry;

pub use frames::{ClientFrame, ServerFrame};
pub use registry::{
    SendOutcome, Session, SessionId, SessionRegistry, SessionState, TransportKind,
};
