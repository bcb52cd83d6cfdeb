// This module defines the error type shared by the SSA verifier, the phi edge table, the
// merge lowering driver and the LIR parser. Every variant is an invariant violation that
// points at a bug in an earlier compiler phase: the current compilation unit is abandoned
// and nothing is retried. Each variant carries enough context (function, block,
// instruction index and rendering, value, and for redefinitions the earlier definition
// site) for a human to find the offending IR without re-running with extra flags.

//! Error types for SSA verification and merge lowering.
//!
//! Using thiserror for idiomatic error handling.

use thiserror::Error;

/// Fatal error raised while checking or lowering a function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LowerError {
    #[error("{func}: use of undefined value {value} in block {block} at instruction {index} `{inst}`")]
    UseBeforeDef {
        func: String,
        block: String,
        index: usize,
        inst: String,
        value: String,
    },

    #[error(
        "{func}: value {value} used in block {block} at instruction {index} `{inst}` \
         is defined in block {def_block}, which does not dominate the use"
    )]
    NotDominated {
        func: String,
        block: String,
        index: usize,
        inst: String,
        value: String,
        def_block: String,
    },

    #[error(
        "{func}: value {value} redefined in block {block} at instruction {index} `{inst}`; \
         first defined in block {prior_block} at {prior_site}"
    )]
    Redefinition {
        func: String,
        block: String,
        index: usize,
        inst: String,
        value: String,
        prior_block: String,
        prior_site: String,
    },

    #[error(
        "{func}: merge value {value} of block {merge} is read in block {block} at instruction \
         {index} `{inst}` after an edge move overwrote it"
    )]
    ClobberedMergeValue {
        func: String,
        block: String,
        index: usize,
        inst: String,
        value: String,
        merge: String,
    },

    #[error(
        "{func}: merge value {value} of block {merge} is assigned in block {block} at \
         instruction {index} `{inst}`, which is not a single move on an edge into {merge}"
    )]
    MisplacedMergeMove {
        func: String,
        block: String,
        index: usize,
        inst: String,
        value: String,
        merge: String,
    },

    #[error(
        "{func}: phi arity mismatch on edge {pred} -> {merge}: \
         jump passes {outgoing} values, label declares {incoming}"
    )]
    PhiArityMismatch {
        func: String,
        pred: String,
        merge: String,
        outgoing: usize,
        incoming: usize,
    },

    #[error(
        "{func}: phi kind mismatch on edge {pred} -> {merge} at position {position}: \
         {outgoing} ({outgoing_kind}) cannot flow into {incoming} ({incoming_kind})"
    )]
    PhiKindMismatch {
        func: String,
        pred: String,
        merge: String,
        position: usize,
        outgoing: String,
        outgoing_kind: String,
        incoming: String,
        incoming_kind: String,
    },

    #[error("{func}: label of block {block} declares {value} more than once")]
    DuplicatePhi {
        func: String,
        block: String,
        value: String,
    },

    #[error(
        "{func}: critical edge {pred} -> {merge}: {pred} ends in a branch \
         but {merge} expects phi values"
    )]
    CriticalEdge {
        func: String,
        pred: String,
        merge: String,
    },

    #[error("{func}: jump from {pred} passes phi values but block {merge} has no label")]
    MissingLabel {
        func: String,
        pred: String,
        merge: String,
    },

    #[error("{func}: label in block {block} at instruction {index} is not the first instruction")]
    MisplacedLabel {
        func: String,
        block: String,
        index: usize,
    },

    #[error("{func}: block {block} does not end in a terminator")]
    MissingTerminator { func: String, block: String },

    #[error("{func}: terminator in block {block} at instruction {index} is not the last instruction")]
    MisplacedTerminator {
        func: String,
        block: String,
        index: usize,
    },

    #[error("{func}: block {block} refers to unknown block #{target}")]
    UnknownBlock {
        func: String,
        block: String,
        target: u32,
    },

    #[error("{func}: no control-flow edge {pred} -> {merge}")]
    UnknownEdge {
        func: String,
        pred: String,
        merge: String,
    },

    #[error("parse error at {line}:{column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },
}

/// Result type alias for verification and lowering operations.
pub type LowerResult<T> = Result<T, LowerError>;
