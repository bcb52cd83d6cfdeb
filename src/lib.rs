//! TPDE SSA - verification and merge lowering for the block-structured LIR.
//!
//! The backend hands this crate functions whose merge blocks carry phi
//! bindings: a `label` at the head of the merge and a positionally aligned
//! `jump` in every predecessor. The crate checks the single-assignment
//! invariant and replaces every phi with ordinary moves on the incoming
//! edges, breaking copy cycles with one temporary per edge.
//!
//! # Primary Usage
//!
//! ```
//! use bumpalo::Bump;
//! use tpde_ssa::core::CompilationSession;
//! use tpde_ssa::lir::parse_function;
//! use tpde_ssa::ssa::{lower_function, verify};
//!
//! let mut func = parse_function(
//!     "func f {
//!      entry:
//!        %a:i32 = param
//!        jump ^m [%a]
//!      m:
//!        label [%x:i32]
//!        ret %x
//!      }",
//! )?;
//! verify(&func)?;
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! lower_function(&session, &mut func)?;
//! verify(&func)?;
//! # Ok::<(), tpde_ssa::core::LowerError>(())
//! ```
//!
//! # Architecture
//!
//! - [`lir`] - IR model, CFG analysis, text parser and printer
//! - [`ssa`] - verifier, edge table, move resolver and lowering driver
//! - [`core`] - session, statistics and errors
//! - [`driver`] - the verify-lower-verify pipeline used by `lirlower`

pub mod core;
pub mod driver;
pub mod lir;
pub mod ssa;

pub use core::{CompilationSession, LowerError, LowerResult, SessionStats};
pub use lir::{BlockId, Function, Inst, Value, ValueKind, Variable};
pub use ssa::{lower_function, schedule_moves, verify, verify_or_panic};
