//! Dead Code Elimination (DCE)
//!
//! Removes side-effect-free instructions and phis whose results are never used, then
//! drops blocks that can no longer be reached.

use crate::ir::{Program, VariableId};
use rustc_hash::FxHashSet;

/// Dead code eliminator
pub struct DeadCodeEliminator;

impl DeadCodeEliminator {
    /// Create a new DCE pass
    pub fn new() -> Self {
        Self
    }

    /// Eliminate dead code, returning the number of instructions (including phis) and
    /// blocks removed
    pub fn eliminate(&self, program: &mut Program) -> (usize, usize) {
        let mut removed = 0;
        // Removing one definition can make its operands dead
        loop {
            let used = self.collect_used_variables(program);
            let count = self.remove_dead_instructions(program, &used);
            if count == 0 {
                break;
            }
            removed += count;
        }
        let blocks = program.pack();
        (removed, blocks)
    }

    /// Collect all variables read anywhere in the program
    fn collect_used_variables(&self, program: &Program) -> FxHashSet<VariableId> {
        let mut used = FxHashSet::default();
        for block in program.blocks() {
            for phi in &block.phis {
                used.extend(phi.incomings.iter().map(|i| i.value));
            }
            for instruction in &block.instructions {
                used.extend(instruction.uses());
            }
        }
        used
    }

    fn remove_dead_instructions(&self, program: &mut Program, used: &FxHashSet<VariableId>) -> usize {
        let mut removed = 0;
        for block in program.blocks_mut() {
            let before = block.instructions.len() + block.phis.len();

            block.instructions.retain(|instruction| {
                if !instruction.kind.is_pure() {
                    return true;
                }
                match instruction.receiver() {
                    Some(receiver) => used.contains(&receiver),
                    // nop
                    None => false,
                }
            });
            block.phis.retain(|phi| used.contains(&phi.receiver));

            removed += before - block.instructions.len() - block.phis.len();
        }
        removed
    }
}

impl Default for DeadCodeEliminator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::listing::{parse, print};

    fn eliminate(source: &str) -> (String, usize, usize) {
        let mut program = parse(source).expect("valid listing");
        let (instructions, blocks) = DeadCodeEliminator::new().eliminate(&mut program);
        (print(&program), instructions, blocks)
    }

    #[test]
    fn test_transitive_elimination() {
        let (text, removed, _) =
            eliminate("$0\n    %a := 10\n    %b := 20\n    %c := %a + %b as int\n    return\n");
        assert_eq!(removed, 3);
        assert_eq!(text, "var %a\nvar %b\nvar %c\n$0\n    return\n");
    }

    #[test]
    fn test_keep_side_effects() {
        let source = "$0\n    %a := 1\n    %b := 0\n    %c := %a / %b as int\n    invokeStatic `Foo.run()V`\n    return\n";
        let (text, removed, _) = eliminate(source);
        assert_eq!(removed, 0);
        assert_eq!(text, source);
    }

    #[test]
    fn test_unused_phi_and_unreachable_block() {
        let source = "\
$0
    %a := 1
    goto $2
$1
    goto $2
$2
    %b := phi %a from $0, %a from $1
    return
";
        let (text, removed, blocks) = eliminate(source);
        assert_eq!(removed, 2);
        assert_eq!(blocks, 1);
        assert_eq!(text, "var %a\nvar %b\n$0\n    goto $1\n$1\n    return\n");
    }

    #[test]
    fn test_nop_removed() {
        let (text, removed, _) = eliminate("$0\n    nop\n    return\n");
        assert_eq!(removed, 1);
        assert_eq!(text, "$0\n    return\n");
    }
}
