//! Conversational-voice wire protocol
//!
//! - `messages`: serde types for both wire styles
//! - `control`: the control-channel interpreter
//! - `close`: closure-code classification

pub mod close;
pub mod control;
pub mod messages;

pub use close::{CloseCategory, CloseInfo};
pub use control::{Directive, Interpreter};
pub use messages::{ClientMessage, ServerMessage, WireStyle};
