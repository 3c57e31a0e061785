//! Programs and variables
//!
//! A [`Program`] is one method body: a dense array of variables and an ordered list of
//! blocks, block 0 being the entry. For instance methods variable 0 is `this`; for static
//! methods it is reserved. Parameters occupy variables `1..=n`.

use super::block::{BasicBlock, BlockId};
use std::fmt;
use thiserror::Error;

/// Variable identifier (index into the program's variable array)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub u32);

impl VariableId {
    /// Id from a raw index
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw index
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Position in the program's variable list
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A value slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Position in the variable list
    pub id: VariableId,
    /// Listing label, if different from the index
    pub label: Option<String>,
    /// Name of the source-level variable
    pub debug_name: Option<String>,
}

/// Structural problems found by [`Program::validate`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    /// An instruction or phi uses a variable the program does not declare
    #[error("Block {block} refers to undefined variable {variable}")]
    UnknownVariable { block: BlockId, variable: VariableId },

    /// A control transfer or handler targets a missing block
    #[error("Block {block} refers to undefined block {target}")]
    UnknownBlock { block: BlockId, target: BlockId },

    /// A block does not end with a control transfer
    #[error("Block {0} does not end with a control transfer")]
    MissingTerminator(BlockId),

    /// A control transfer appears before the last instruction
    #[error("Block {block} has a control transfer at position {index} before its end")]
    TerminatorNotLast { block: BlockId, index: usize },

    /// A phi lists a block that does not jump to it
    #[error("Phi in block {block} has an incoming value from {source_block}, which is not a predecessor")]
    PhiSourceNotPredecessor { block: BlockId, source_block: BlockId },

    /// Something jumps to the entry block
    #[error("Entry block has predecessors")]
    EntryHasPredecessors,
}

/// A method body
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    variables: Vec<Variable>,
    blocks: Vec<BasicBlock>,
}

impl Program {
    /// Create an empty program
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Variables =====

    /// Allocate the next variable
    pub fn create_variable(&mut self) -> VariableId {
        let id = VariableId::new(self.variables.len() as u32);
        self.variables.push(Variable {
            id,
            label: None,
            debug_name: None,
        });
        id
    }

    /// Variable by id.
    ///
    /// # Panics
    ///
    /// If the id is out of range.
    pub fn variable(&self, id: VariableId) -> &Variable {
        self.variables
            .get(id.index())
            .unwrap_or_else(|| panic!("variable {} does not exist", id))
    }

    /// Mutable variable by id
    pub fn variable_mut(&mut self, id: VariableId) -> &mut Variable {
        self.variables
            .get_mut(id.index())
            .unwrap_or_else(|| panic!("variable {} does not exist", id))
    }

    /// All variables in index order
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Number of variables
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    // ===== Blocks =====

    /// Append a new empty block
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id));
        id
    }

    /// Block by id.
    ///
    /// # Panics
    ///
    /// If the id is out of range.
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks
            .get(id.index())
            .unwrap_or_else(|| panic!("block {} does not exist", id))
    }

    /// Mutable block by id
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks
            .get_mut(id.index())
            .unwrap_or_else(|| panic!("block {} does not exist", id))
    }

    /// All blocks in index order
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Mutable access to all blocks
    pub fn blocks_mut(&mut self) -> &mut [BasicBlock] {
        &mut self.blocks
    }

    /// Number of blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Whether `id` names an existing block
    pub fn has_block(&self, id: BlockId) -> bool {
        id.index() < self.blocks.len()
    }

    // ===== Analysis =====

    /// Predecessors of every block, including exceptional edges to handlers
    pub fn predecessors(&self) -> Vec<Vec<BlockId>> {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for block in &self.blocks {
            for succ in block.successors().into_iter().chain(block.handlers()) {
                if let Some(list) = preds.get_mut(succ.index()) {
                    if !list.contains(&block.id) {
                        list.push(block.id);
                    }
                }
            }
        }
        preds
    }

    /// Blocks reachable from the entry, as a mask indexed by block
    pub fn reachable_blocks(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.blocks.len()];
        if self.blocks.is_empty() {
            return reachable;
        }
        let mut stack = vec![BlockId::new(0)];
        reachable[0] = true;
        while let Some(id) = stack.pop() {
            let block = self.block(id);
            for succ in block.successors().into_iter().chain(block.handlers()) {
                if self.has_block(succ) && !reachable[succ.index()] {
                    reachable[succ.index()] = true;
                    stack.push(succ);
                }
            }
        }
        reachable
    }

    /// Check structural invariants
    pub fn validate(&self) -> Result<(), ProgramError> {
        let var_count = self.variables.len();
        let check_var = |block: BlockId, variable: VariableId| {
            if variable.index() < var_count {
                Ok(())
            } else {
                Err(ProgramError::UnknownVariable { block, variable })
            }
        };
        let check_block = |block: BlockId, target: BlockId| {
            if self.has_block(target) {
                Ok(())
            } else {
                Err(ProgramError::UnknownBlock { block, target })
            }
        };

        for block in &self.blocks {
            if let Some(var) = block.exception_variable {
                check_var(block.id, var)?;
            }
            for phi in &block.phis {
                check_var(block.id, phi.receiver)?;
                for incoming in &phi.incomings {
                    check_var(block.id, incoming.value)?;
                    check_block(block.id, incoming.source)?;
                }
            }
            for (index, instr) in block.instructions.iter().enumerate() {
                for var in instr.receiver().into_iter().chain(instr.uses()) {
                    check_var(block.id, var)?;
                }
                for target in instr.kind.successors() {
                    check_block(block.id, target)?;
                }
                if instr.kind.is_terminator() && index + 1 != block.instructions.len() {
                    return Err(ProgramError::TerminatorNotLast { block: block.id, index });
                }
            }
            for tc in &block.try_catches {
                check_block(block.id, tc.handler)?;
            }
        }

        let preds = self.predecessors();
        if preds.first().is_some_and(|p| !p.is_empty()) {
            return Err(ProgramError::EntryHasPredecessors);
        }

        let reachable = self.reachable_blocks();
        for block in &self.blocks {
            if reachable[block.id.index()] && block.terminator().is_none() {
                return Err(ProgramError::MissingTerminator(block.id));
            }
            for phi in &block.phis {
                for incoming in &phi.incomings {
                    if !preds[block.id.index()].contains(&incoming.source) {
                        return Err(ProgramError::PhiSourceNotPredecessor {
                            block: block.id,
                            source_block: incoming.source,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Drop blocks unreachable from the entry and renumber the rest, keeping their
    /// relative order. Returns the number of blocks removed.
    pub fn pack(&mut self) -> usize {
        let reachable = self.reachable_blocks();
        let mut mapping: Vec<Option<BlockId>> = Vec::with_capacity(self.blocks.len());
        let mut next = 0u32;
        for &live in &reachable {
            if live {
                mapping.push(Some(BlockId::new(next)));
                next += 1;
            } else {
                mapping.push(None);
            }
        }
        let removed = self.blocks.len() - next as usize;
        if removed == 0 {
            return 0;
        }

        let remap = |id: BlockId| mapping[id.index()].unwrap_or(id);
        let old_blocks = std::mem::take(&mut self.blocks);
        for mut block in old_blocks.into_iter().filter(|b| reachable[b.id.index()]) {
            block.id = remap(block.id);
            for phi in &mut block.phis {
                phi.incomings.retain(|i| mapping[i.source.index()].is_some());
                for incoming in &mut phi.incomings {
                    incoming.source = remap(incoming.source);
                }
            }
            for instr in &mut block.instructions {
                instr.kind.map_targets(remap);
            }
            for tc in &mut block.try_catches {
                tc.handler = remap(tc.handler);
            }
            self.blocks.push(block);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::block::{Incoming, Phi};
    use crate::ir::instr::{BranchCondition, InstructionKind};

    fn diamond() -> Program {
        let mut program = Program::new();
        let cond = program.create_variable();
        let a = program.create_variable();
        let b = program.create_variable();
        let r = program.create_variable();
        let entry = program.create_block();
        let left = program.create_block();
        let right = program.create_block();
        let join = program.create_block();

        program.block_mut(entry).push(InstructionKind::Branch {
            condition: BranchCondition::Equal,
            operand: cond,
            consequent: left,
            alternative: right,
        });
        program.block_mut(left).push(InstructionKind::IntConstant { receiver: a, value: 1 });
        program.block_mut(left).push(InstructionKind::Jump { target: join });
        program.block_mut(right).push(InstructionKind::IntConstant { receiver: b, value: 2 });
        program.block_mut(right).push(InstructionKind::Jump { target: join });
        program.block_mut(join).phis.push(Phi {
            receiver: r,
            incomings: vec![Incoming { source: left, value: a }, Incoming { source: right, value: b }],
        });
        program.block_mut(join).push(InstructionKind::Exit { value: Some(r) });
        program
    }

    #[test]
    fn test_valid_diamond() {
        let program = diamond();
        assert_eq!(program.validate(), Ok(()));
        let preds = program.predecessors();
        assert_eq!(preds[3], vec![BlockId::new(1), BlockId::new(2)]);
    }

    #[test]
    fn test_validate_detects_bad_phi_source() {
        let mut program = diamond();
        program.block_mut(BlockId::new(3)).phis[0].incomings[0].source = BlockId::new(0);
        assert_eq!(
            program.validate(),
            Err(ProgramError::PhiSourceNotPredecessor {
                block: BlockId::new(3),
                source_block: BlockId::new(0)
            })
        );
    }

    #[test]
    fn test_validate_detects_missing_terminator() {
        let mut program = diamond();
        program.block_mut(BlockId::new(3)).instructions.clear();
        assert_eq!(program.validate(), Err(ProgramError::MissingTerminator(BlockId::new(3))));
    }

    #[test]
    fn test_validate_detects_unknown_variable() {
        let mut program = diamond();
        program.block_mut(BlockId::new(1)).instructions[0].kind = InstructionKind::IntConstant {
            receiver: VariableId::new(42),
            value: 0,
        };
        assert!(matches!(program.validate(), Err(ProgramError::UnknownVariable { .. })));
    }

    #[test]
    fn test_pack_removes_unreachable_blocks() {
        let mut program = Program::new();
        let entry = program.create_block();
        let dead = program.create_block();
        let exit = program.create_block();
        program.block_mut(entry).push(InstructionKind::Jump { target: exit });
        program.block_mut(dead).push(InstructionKind::Jump { target: exit });
        program.block_mut(exit).push(InstructionKind::Exit { value: None });

        assert_eq!(program.pack(), 1);
        assert_eq!(program.block_count(), 2);
        assert_eq!(program.block(BlockId::new(0)).successors(), vec![BlockId::new(1)]);
        assert_eq!(program.block(BlockId::new(1)).id, BlockId::new(1));
        assert_eq!(program.validate(), Ok(()));
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn test_missing_block_panics() {
        let program = Program::new();
        program.block(BlockId::new(0));
    }
}
