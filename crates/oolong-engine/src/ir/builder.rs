//! Program builder helpers
//!
//! Utilities for constructing method bodies without spelling out every
//! [`InstructionKind`] by hand.

use super::block::{BlockId, Incoming, Phi, TryCatch};
use super::instr::{BinaryOp, BranchCondition, Instruction, InstructionKind, InvocationKind, NumericType, TextLocation};
use super::program::{Program, VariableId};
use super::types::{FieldReference, MethodReference, ValueType};

/// Builder that appends instructions to a current block
pub struct ProgramBuilder {
    program: Program,
    current_block: Option<BlockId>,
    location: Option<TextLocation>,
}

impl ProgramBuilder {
    /// Start an empty program
    pub fn new() -> Self {
        Self {
            program: Program::new(),
            current_block: None,
            location: None,
        }
    }

    /// Start a method body with `this` (or a reserved slot) and `parameters` parameter
    /// variables, plus an entry block that becomes current
    pub fn for_method(parameters: usize) -> Self {
        let mut builder = Self::new();
        for _ in 0..=parameters {
            builder.program.create_variable();
        }
        let entry = builder.create_block();
        builder.switch_to_block(entry);
        builder
    }

    /// Allocate a new variable
    pub fn var(&mut self) -> VariableId {
        self.program.create_variable()
    }

    /// Create a new basic block
    pub fn create_block(&mut self) -> BlockId {
        self.program.create_block()
    }

    /// Switch to emitting into a different block
    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current_block = Some(block);
    }

    /// Get the current block ID
    pub fn current_block(&self) -> Option<BlockId> {
        self.current_block
    }

    /// Source location attached to subsequent instructions
    pub fn set_location(&mut self, location: Option<TextLocation>) {
        self.location = location;
    }

    /// Emit an instruction into the current block.
    ///
    /// # Panics
    ///
    /// If no block has been selected.
    pub fn emit(&mut self, kind: InstructionKind) {
        let block = self
            .current_block
            .unwrap_or_else(|| panic!("no current block to emit {} into", kind.name()));
        let instruction = Instruction::at(kind, self.location.clone());
        self.program.block_mut(block).instructions.push(instruction);
    }

    // ===== Values =====

    /// Emit an `int` constant and return its variable
    pub fn int_constant(&mut self, value: i32) -> VariableId {
        let receiver = self.var();
        self.emit(InstructionKind::IntConstant { receiver, value });
        receiver
    }

    /// Emit a `long` constant and return its variable
    pub fn long_constant(&mut self, value: i64) -> VariableId {
        let receiver = self.var();
        self.emit(InstructionKind::LongConstant { receiver, value });
        receiver
    }

    /// Emit a string constant and return its variable
    pub fn string_constant(&mut self, value: impl Into<String>) -> VariableId {
        let receiver = self.var();
        self.emit(InstructionKind::StringConstant {
            receiver,
            value: value.into(),
        });
        receiver
    }

    /// Emit `null` and return its variable
    pub fn null_constant(&mut self) -> VariableId {
        let receiver = self.var();
        self.emit(InstructionKind::NullConstant { receiver });
        receiver
    }

    /// Emit `first op second` and return the result variable
    pub fn binary(&mut self, op: BinaryOp, operand_type: NumericType, first: VariableId, second: VariableId) -> VariableId {
        let receiver = self.var();
        self.emit(InstructionKind::Binary {
            receiver,
            op,
            operand_type,
            first,
            second,
        });
        receiver
    }

    /// Copy `value` into `receiver`
    pub fn assign(&mut self, receiver: VariableId, value: VariableId) {
        self.emit(InstructionKind::Assign {
            receiver,
            assignee: value,
        });
    }

    /// Allocate an instance of `class` (without calling a constructor)
    pub fn construct(&mut self, class: impl Into<String>) -> VariableId {
        let receiver = self.var();
        self.emit(InstructionKind::Construct {
            receiver,
            class: class.into(),
        });
        receiver
    }

    /// Allocate an array of `size` items of `item_type`
    pub fn construct_array(&mut self, item_type: ValueType, size: VariableId) -> VariableId {
        let receiver = self.var();
        self.emit(InstructionKind::ConstructArray {
            receiver,
            item_type,
            size,
        });
        receiver
    }

    /// Read a field; `instance` is `None` for static fields
    pub fn get_field(&mut self, instance: Option<VariableId>, field: FieldReference, field_type: ValueType) -> VariableId {
        let receiver = self.var();
        self.emit(InstructionKind::GetField {
            receiver,
            instance,
            field,
            field_type,
        });
        receiver
    }

    /// Write a field; `instance` is `None` for static fields
    pub fn put_field(&mut self, instance: Option<VariableId>, field: FieldReference, value: VariableId, field_type: ValueType) {
        self.emit(InstructionKind::PutField {
            instance,
            field,
            value,
            field_type,
        });
    }

    /// Emit a call. A receiver variable is allocated unless the method returns void.
    pub fn invoke(
        &mut self,
        kind: InvocationKind,
        method: MethodReference,
        instance: Option<VariableId>,
        arguments: Vec<VariableId>,
    ) -> Option<VariableId> {
        let receiver = (method.descriptor.result != ValueType::Void).then(|| self.var());
        self.emit(InstructionKind::Invoke {
            receiver,
            instance,
            method,
            arguments,
            kind,
        });
        receiver
    }

    // ===== Control flow =====

    /// Jump to `target`
    pub fn jump(&mut self, target: BlockId) {
        self.emit(InstructionKind::Jump { target });
    }

    /// Branch on `operand` compared against zero or null
    pub fn branch(&mut self, condition: BranchCondition, operand: VariableId, consequent: BlockId, alternative: BlockId) {
        self.emit(InstructionKind::Branch {
            condition,
            operand,
            consequent,
            alternative,
        });
    }

    /// Return from the method
    pub fn exit(&mut self, value: Option<VariableId>) {
        self.emit(InstructionKind::Exit { value });
    }

    /// Throw `exception`
    pub fn raise(&mut self, exception: VariableId) {
        self.emit(InstructionKind::Raise { exception });
    }

    /// Add a phi to the current block
    pub fn phi(&mut self, incomings: &[(BlockId, VariableId)]) -> VariableId {
        let receiver = self.var();
        let block = self.expect_block();
        self.program.block_mut(block).phis.push(Phi {
            receiver,
            incomings: incomings
                .iter()
                .map(|&(source, value)| Incoming { source, value })
                .collect(),
        });
        receiver
    }

    /// Route exceptions of the current block to `handler`
    pub fn try_catch(&mut self, exception_type: Option<&str>, handler: BlockId) {
        let block = self.expect_block();
        self.program.block_mut(block).try_catches.push(TryCatch {
            exception_type: exception_type.map(str::to_string),
            handler,
        });
    }

    /// Bind the caught exception of the current (handler) block
    pub fn catch_exception(&mut self) -> VariableId {
        let receiver = self.var();
        let block = self.expect_block();
        self.program.block_mut(block).exception_variable = Some(receiver);
        receiver
    }

    fn expect_block(&self) -> BlockId {
        self.current_block
            .unwrap_or_else(|| panic!("no current block selected"))
    }

    /// Access the program under construction
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Finish building
    pub fn build(self) -> Program {
        self.program
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_counted_loop() {
        let mut b = ProgramBuilder::for_method(1);
        let entry = b.current_block().expect("entry block");
        let header = b.create_block();
        let body = b.create_block();
        let exit = b.create_block();

        let zero = b.int_constant(0);
        b.jump(header);

        b.switch_to_block(header);
        let i = b.phi(&[(entry, zero)]);
        b.branch(BranchCondition::Less, i, body, exit);

        b.switch_to_block(body);
        let one = b.int_constant(1);
        let next = b.binary(BinaryOp::Add, NumericType::Int, i, one);
        b.jump(header);

        b.switch_to_block(exit);
        b.exit(Some(i));

        let mut program = b.build();
        program.block_mut(header).phis[0].incomings.push(Incoming { source: body, value: next });

        assert_eq!(program.block_count(), 4);
        assert_eq!(program.variable_count(), 6);
        assert_eq!(program.validate(), Ok(()));
    }

    #[test]
    fn test_void_invoke_has_no_receiver() {
        let mut b = ProgramBuilder::for_method(0);
        let method: MethodReference = "Foo.run()V".parse().expect("valid reference");
        assert_eq!(b.invoke(InvocationKind::Static, method, None, vec![]), None);
        let method: MethodReference = "Foo.get()I".parse().expect("valid reference");
        assert!(b.invoke(InvocationKind::Static, method, None, vec![]).is_some());
    }

    #[test]
    fn test_locations_apply_to_following_instructions() {
        let mut b = ProgramBuilder::for_method(0);
        b.int_constant(1);
        b.set_location(Some(TextLocation::new("A.java", 7)));
        b.exit(None);
        let program = b.build();
        let block = program.block(BlockId::new(0));
        assert_eq!(block.instructions[0].location, None);
        assert_eq!(block.instructions[1].location, Some(TextLocation::new("A.java", 7)));
    }

    #[test]
    #[should_panic(expected = "no current block")]
    fn test_emit_without_block_panics() {
        let mut b = ProgramBuilder::new();
        b.exit(None);
    }
}
