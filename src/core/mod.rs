//! Core infrastructure shared by the LIR and the SSA passes.
//!
//! - [`session`]: arena-backed compilation session and lowering statistics
//! - [`error`]: the fatal error type raised by verification and lowering

pub mod error;
pub mod session;

pub use error::{LowerError, LowerResult};
pub use session::{CompilationSession, SessionStats};
