// This module provides the per-compilation-unit session used while lowering merges. The
// session owns a reference to the bumpalo arena that backs the move resolver's scratch
// vectors and records statistics about the lowering: functions and edges lowered, phi
// moves pruned because their destination is never read, moves emitted, cycles broken and
// temporaries introduced. A session is tied to one worker thread; it uses RefCell for its
// counters and is therefore not Sync, which keeps concurrently running compilations from
// ever sharing lowering state.

//! Arena-based compilation session management.
//!
//! All scratch allocations made while lowering one compilation unit live in
//! the session arena and are released together when the arena is dropped.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for resolver scratch space.
    arena: &'arena Bump,

    /// Session statistics for debugging.
    stats: RefCell<SessionStats>,

    /// Function currently being lowered, for log messages.
    current_function: RefCell<Option<String>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            current_function: RefCell::new(None),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Set current function being lowered.
    pub fn set_current_function(&self, name: &str) {
        *self.current_function.borrow_mut() = Some(name.to_string());
    }

    /// Name of the function being lowered, if any.
    pub fn current_function(&self) -> Option<String> {
        self.current_function.borrow().clone()
    }

    /// Record that all merges of a function were lowered.
    pub fn record_function_lowered(&self, name: &str, edges: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_lowered += 1;
        *stats.edges_per_function.entry(name.to_string()).or_insert(0) += edges;
        *self.current_function.borrow_mut() = None;
    }

    /// Record one lowered control-flow edge.
    pub fn record_edge_lowered(&self, moves: usize, pruned: usize, used_temp: bool) {
        let mut stats = self.stats.borrow_mut();
        stats.edges_lowered += 1;
        stats.moves_emitted += moves;
        stats.phi_moves_pruned += pruned;
        if used_temp {
            stats.temporaries_introduced += 1;
        }
    }

    /// Record a cycle broken through the edge temporary.
    pub fn record_cycle_broken(&self) {
        self.stats.borrow_mut().cycles_broken += 1;
    }

    /// Get lowering statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Merge lowering statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of functions lowered.
    pub functions_lowered: usize,

    /// Number of predecessor edges lowered.
    pub edges_lowered: usize,

    /// Number of move instructions emitted, temporary moves included.
    pub moves_emitted: usize,

    /// Phi moves dropped because the phi is never read.
    pub phi_moves_pruned: usize,

    /// Cycles broken with a temporary.
    pub cycles_broken: usize,

    /// Edges that needed a temporary.
    pub temporaries_introduced: usize,

    /// Lowered edges per function.
    pub edges_per_function: HashMap<String, usize>,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Merge Lowering Statistics:")?;
        writeln!(f, "  Functions lowered: {}", self.functions_lowered)?;
        writeln!(f, "  Edges lowered: {}", self.edges_lowered)?;
        writeln!(f, "  Moves emitted: {}", self.moves_emitted)?;
        writeln!(f, "  Phi moves pruned: {}", self.phi_moves_pruned)?;
        writeln!(f, "  Cycles broken: {}", self.cycles_broken)?;
        writeln!(f, "  Temporaries introduced: {}", self.temporaries_introduced)?;

        if !self.edges_per_function.is_empty() {
            writeln!(f, "  Edges per function:")?;
            let mut sorted: Vec<_> = self.edges_per_function.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

            for (name, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", name, count)?;
            }
        }

        Ok(())
    }
}
