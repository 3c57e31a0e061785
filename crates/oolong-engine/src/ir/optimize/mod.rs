//! IR Optimization Passes
//!
//! Provides basic optimizations on method bodies before code generation.

mod constant_fold;
mod dce;

pub use constant_fold::ConstantFolder;
pub use dce::DeadCodeEliminator;

use crate::ir::Program;
use serde::Deserialize;

/// Optimization level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptLevel {
    /// No optimizations
    None,
    /// Constant folding and dead code elimination, once
    #[default]
    Basic,
    /// Basic passes repeated until nothing changes
    Full,
}

/// Optimizer that runs multiple passes over a program
pub struct Optimizer {
    level: OptLevel,
}

impl Optimizer {
    /// Create a new optimizer with the given level
    pub fn new(level: OptLevel) -> Self {
        Self { level }
    }

    /// Create an optimizer with basic optimizations
    pub fn basic() -> Self {
        Self::new(OptLevel::Basic)
    }

    /// Create an optimizer with no optimizations
    pub fn none() -> Self {
        Self::new(OptLevel::None)
    }

    /// Level the pipeline was built for
    pub fn level(&self) -> OptLevel {
        self.level
    }

    /// Run all optimization passes on the program
    pub fn optimize(&self, program: &mut Program) -> OptStats {
        let mut stats = OptStats::default();
        if self.level == OptLevel::None {
            return stats;
        }

        let folder = ConstantFolder::new();
        let dce = DeadCodeEliminator::new();
        loop {
            let folded = folder.fold(program);
            let (instructions, blocks) = dce.eliminate(program);
            stats.constants_folded += folded;
            stats.dead_instructions_removed += instructions;
            stats.unreachable_blocks_removed += blocks;

            // Folding may expose more dead code and vice versa
            if self.level != OptLevel::Full || folded + instructions + blocks == 0 {
                break;
            }
        }
        stats
    }
}

/// Statistics about optimizations performed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptStats {
    /// Number of constants folded
    pub constants_folded: usize,
    /// Number of dead instructions eliminated
    pub dead_instructions_removed: usize,
    /// Number of unreachable blocks removed
    pub unreachable_blocks_removed: usize,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::basic()
    }
}
