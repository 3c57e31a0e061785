//! Listing parser
//!
//! Blocks are declared by a `$label` at the start of a line and numbered in declaration
//! order, so forward references resolve. Variables are numbered by the optional `var`
//! prologue, or else in order of first appearance.

use super::lexer::{tokenize, Token};
use super::ListingParseError;
use crate::ir::block::{BlockId, Incoming, Phi, TryCatch};
use crate::ir::instr::{
    ArrayElementType, BinaryBranchCondition, BinaryOp, BranchCondition, Instruction, InstructionKind,
    IntegerSubtype, InvocationKind, NumericType, SwitchEntry, TextLocation,
};
use crate::ir::program::{Program, VariableId};
use crate::ir::types::{FieldReference, MethodReference, TypeParseError, ValueType};
use rustc_hash::FxHashMap;
use std::ops::Range;

type ParseResult<T> = Result<T, ListingParseError>;

/// Parse a listing into a program
pub fn parse(source: &str) -> Result<Program, ListingParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        program: Program::new(),
        variables: FxHashMap::default(),
        blocks: FxHashMap::default(),
        current: None,
        location: None,
    };
    parser.declare_blocks()?;
    parser.parse_lines()?;
    Ok(parser.program)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
    program: Program,
    variables: FxHashMap<String, VariableId>,
    blocks: FxHashMap<String, BlockId>,
    current: Option<BlockId>,
    location: Option<TextLocation>,
}

impl<'a> Parser<'a> {
    // ===== Top level =====

    fn declare_blocks(&mut self) -> ParseResult<()> {
        let mut line_start = true;
        for (token, span) in &self.tokens {
            if line_start {
                if let Token::Label(name) = token {
                    if self.blocks.contains_key(name) {
                        return Err(ListingParseError::new(format!("Duplicate block ${}", name), span.start));
                    }
                    let id = self.program.create_block();
                    if *name != id.as_u32().to_string() {
                        self.program.block_mut(id).label = Some(name.clone());
                    }
                    self.blocks.insert(name.clone(), id);
                }
            }
            line_start = *token == Token::Eol;
        }
        Ok(())
    }

    fn parse_lines(&mut self) -> ParseResult<()> {
        while let Some(token) = self.peek().cloned() {
            match token {
                Token::Eol => {
                    self.pos += 1;
                    continue;
                }
                Token::Identifier(ref word) if word == "var" => {
                    if self.current.is_some() {
                        return self.error("Variable declarations must precede the first block");
                    }
                    self.pos += 1;
                    self.parse_declaration()?;
                }
                Token::Label(name) => {
                    self.pos += 1;
                    self.current = self.blocks.get(&name).copied();
                    self.location = None;
                }
                _ => {
                    let Some(block) = self.current else {
                        return self.error("Instruction outside of a block");
                    };
                    self.parse_statement(block)?;
                }
            }
            self.expect_eol()?;
        }
        Ok(())
    }

    fn parse_declaration(&mut self) -> ParseResult<()> {
        let offset = self.offset();
        let name = match self.advance() {
            Some(Token::Variable(name)) => name,
            _ => {
                self.pos -= 1;
                return self.expected("variable");
            }
        };
        if self.variables.contains_key(&name) {
            return Err(ListingParseError::new(format!("Duplicate variable %{}", name), offset));
        }
        let id = self.define_variable(name);
        if self.eat_keyword("as") {
            let debug_name = self.expect_identifier()?;
            self.program.variable_mut(id).debug_name = Some(debug_name);
        }
        Ok(())
    }

    fn parse_statement(&mut self, block: BlockId) -> ParseResult<()> {
        match (self.peek().cloned(), self.peek_at(1).cloned()) {
            (Some(Token::Identifier(word)), _) if word == "at" => {
                self.pos += 1;
                self.parse_location()
            }
            (Some(Token::Identifier(word)), _) if word == "catch" => {
                self.pos += 1;
                let typed = matches!(self.peek(), Some(Token::Identifier(word)) if word != "goto");
                let exception_type = if typed { Some(self.expect_identifier()?) } else { None };
                self.expect_keyword("goto")?;
                let handler = self.expect_label()?;
                self.program.block_mut(block).try_catches.push(TryCatch {
                    exception_type,
                    handler,
                });
                Ok(())
            }
            (Some(Token::Variable(_)), Some(Token::Assign)) => {
                let receiver = self.expect_variable()?;
                self.pos += 1;
                if self.eat_keyword("exception") {
                    self.program.block_mut(block).exception_variable = Some(receiver);
                    Ok(())
                } else if self.eat_keyword("phi") {
                    let phi = self.parse_phi(receiver)?;
                    self.program.block_mut(block).phis.push(phi);
                    Ok(())
                } else {
                    let kind = self.parse_assignment(receiver)?;
                    self.push(block, kind);
                    Ok(())
                }
            }
            (Some(Token::Variable(_)), Some(Token::LeftBracket)) => {
                let array = self.expect_variable()?;
                let index = self.parse_index()?;
                self.expect(Token::Assign, "':='")?;
                let value = self.expect_variable()?;
                self.expect_keyword("as")?;
                let element_type = self.element_type()?;
                self.push(
                    block,
                    InstructionKind::PutElement {
                        array,
                        index,
                        value,
                        element_type,
                    },
                );
                Ok(())
            }
            _ => {
                let kind = self.parse_effect()?;
                self.push(block, kind);
                Ok(())
            }
        }
    }

    fn push(&mut self, block: BlockId, kind: InstructionKind) {
        let instruction = Instruction::at(kind, self.location.clone());
        self.program.block_mut(block).instructions.push(instruction);
    }

    fn parse_location(&mut self) -> ParseResult<()> {
        if self.eat_keyword("unknown") {
            self.expect_keyword("location")?;
            self.location = None;
            return Ok(());
        }
        let file = match self.advance() {
            Some(Token::String(file)) => file,
            _ => {
                self.pos -= 1;
                return self.expected("file name or 'unknown location'");
            }
        };
        let line = self.expect_integer()?;
        let line = u32::try_from(line).or_else(|_| self.error("Line number must not be negative"))?;
        self.location = Some(TextLocation::new(file, line));
        Ok(())
    }

    fn parse_phi(&mut self, receiver: VariableId) -> ParseResult<Phi> {
        let mut incomings = Vec::new();
        loop {
            let value = self.expect_variable()?;
            self.expect_keyword("from")?;
            let source = self.expect_label()?;
            incomings.push(Incoming { source, value });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(Phi { receiver, incomings })
    }

    // ===== Instructions =====

    /// Right-hand side of `%r := ...`
    fn parse_assignment(&mut self, receiver: VariableId) -> ParseResult<InstructionKind> {
        let Some(token) = self.advance() else {
            return self.expected("expression");
        };
        let kind = match token {
            Token::Integer(value) => InstructionKind::IntConstant { receiver, value },
            Token::Long(value) => InstructionKind::LongConstant { receiver, value },
            Token::Float(value) => InstructionKind::FloatConstant { receiver, value },
            Token::Double(value) => InstructionKind::DoubleConstant { receiver, value },
            Token::String(value) => InstructionKind::StringConstant { receiver, value },
            Token::Minus => match self.peek().cloned() {
                Some(Token::Identifier(word)) if word == "Infinity" => {
                    self.pos += 1;
                    InstructionKind::DoubleConstant {
                        receiver,
                        value: f64::NEG_INFINITY,
                    }
                }
                Some(Token::Identifier(word)) if word == "InfinityF" => {
                    self.pos += 1;
                    InstructionKind::FloatConstant {
                        receiver,
                        value: f32::NEG_INFINITY,
                    }
                }
                _ => {
                    let operand = self.expect_variable()?;
                    self.expect_keyword("as")?;
                    let operand_type = self.numeric_type()?;
                    InstructionKind::Negate {
                        receiver,
                        operand_type,
                        operand,
                    }
                }
            },
            Token::Variable(name) => {
                let first = self.resolve_variable(name);
                self.parse_variable_expression(receiver, first)?
            }
            Token::Identifier(word) => match word.as_str() {
                "null" => InstructionKind::NullConstant { receiver },
                "NaN" => InstructionKind::DoubleConstant { receiver, value: f64::NAN },
                "Infinity" => InstructionKind::DoubleConstant {
                    receiver,
                    value: f64::INFINITY,
                },
                "NaNF" => InstructionKind::FloatConstant { receiver, value: f32::NAN },
                "InfinityF" => InstructionKind::FloatConstant {
                    receiver,
                    value: f32::INFINITY,
                },
                "classOf" => InstructionKind::ClassConstant {
                    receiver,
                    value: self.value_type()?,
                },
                "cast" => self.parse_cast(receiver)?,
                "new" => InstructionKind::Construct {
                    receiver,
                    class: self.expect_identifier()?,
                },
                "newArray" => {
                    let item_type = self.value_type()?;
                    let size = self.parse_index()?;
                    InstructionKind::ConstructArray {
                        receiver,
                        item_type,
                        size,
                    }
                }
                "field" => {
                    let field = self.field_reference()?;
                    let instance = self.optional_variable()?;
                    self.expect_keyword("as")?;
                    let field_type = self.value_type()?;
                    InstructionKind::GetField {
                        receiver,
                        instance,
                        field,
                        field_type,
                    }
                }
                "lengthOf" => InstructionKind::ArrayLength {
                    receiver,
                    array: self.expect_variable()?,
                },
                "clone" => InstructionKind::CloneArray {
                    receiver,
                    array: self.expect_variable()?,
                },
                "data" => {
                    let array = self.expect_variable()?;
                    self.expect_keyword("as")?;
                    InstructionKind::UnwrapArray {
                        receiver,
                        array,
                        element_type: self.element_type()?,
                    }
                }
                "nullCheck" => InstructionKind::NullCheck {
                    receiver,
                    value: self.expect_variable()?,
                },
                "invoke" | "invokeStatic" | "invokeVirtual" => self.parse_invoke(&word, Some(receiver))?,
                _ => {
                    self.pos -= 1;
                    return self.expected("expression");
                }
            },
            _ => {
                self.pos -= 1;
                return self.expected("expression");
            }
        };
        Ok(kind)
    }

    /// `%r := %a ...` forms: assignment, binary operation, element read, instanceOf
    fn parse_variable_expression(&mut self, receiver: VariableId, first: VariableId) -> ParseResult<InstructionKind> {
        if self.at_line_end() {
            return Ok(InstructionKind::Assign {
                receiver,
                assignee: first,
            });
        }
        if self.peek() == Some(&Token::LeftBracket) {
            let index = self.parse_index()?;
            self.expect_keyword("as")?;
            return Ok(InstructionKind::GetElement {
                receiver,
                array: first,
                index,
                element_type: self.element_type()?,
            });
        }
        if self.eat_keyword("instanceOf") {
            return Ok(InstructionKind::IsInstance {
                receiver,
                value: first,
                target: self.value_type()?,
            });
        }
        let Some(op) = self.peek().and_then(binary_op) else {
            return self.expected("operator");
        };
        self.pos += 1;
        let second = self.expect_variable()?;
        self.expect_keyword("as")?;
        let operand_type = self.numeric_type()?;
        Ok(InstructionKind::Binary {
            receiver,
            op,
            operand_type,
            first,
            second,
        })
    }

    fn parse_cast(&mut self, receiver: VariableId) -> ParseResult<InstructionKind> {
        let value = self.expect_variable()?;
        if self.eat_keyword("from") {
            let from = self.numeric_type()?;
            self.expect_keyword("to")?;
            let to = self.numeric_type()?;
            return Ok(InstructionKind::NumericCast { receiver, value, from, to });
        }
        self.expect_keyword("to")?;
        if let Some(Token::Identifier(word)) = self.peek() {
            if let Some(target) = IntegerSubtype::from_name(word) {
                self.pos += 1;
                return Ok(InstructionKind::IntegerCast { receiver, value, target });
            }
        }
        Ok(InstructionKind::Cast {
            receiver,
            value,
            target: self.value_type()?,
        })
    }

    fn parse_invoke(&mut self, keyword: &str, receiver: Option<VariableId>) -> ParseResult<InstructionKind> {
        let kind = match keyword {
            "invokeStatic" => InvocationKind::Static,
            "invokeVirtual" => InvocationKind::Virtual,
            _ => InvocationKind::Special,
        };
        let offset = self.offset();
        let text = self.expect_identifier()?;
        let method: MethodReference = text
            .parse()
            .map_err(|e: TypeParseError| ListingParseError::new(e.to_string(), offset))?;

        let mut operands = Vec::new();
        if !self.at_line_end() {
            operands.push(self.expect_variable()?);
            while self.eat(&Token::Comma) {
                operands.push(self.expect_variable()?);
            }
        }
        let instance = if kind == InvocationKind::Static {
            None
        } else if operands.is_empty() {
            return self.error("Instance expected");
        } else {
            Some(operands.remove(0))
        };
        Ok(InstructionKind::Invoke {
            receiver,
            instance,
            method,
            arguments: operands,
            kind,
        })
    }

    /// Statements without a receiver
    fn parse_effect(&mut self) -> ParseResult<InstructionKind> {
        let offset = self.offset();
        let word = match self.advance() {
            Some(Token::Identifier(word)) => word,
            _ => {
                self.pos -= 1;
                return self.expected("instruction");
            }
        };
        let kind = match word.as_str() {
            "nop" => InstructionKind::Nop,
            "goto" => InstructionKind::Jump {
                target: self.expect_label()?,
            },
            "if" => self.parse_branch()?,
            "switch" => self.parse_switch()?,
            "return" => InstructionKind::Exit {
                value: self.optional_variable()?,
            },
            "throw" => InstructionKind::Raise {
                exception: self.expect_variable()?,
            },
            "field" => {
                let field = self.field_reference()?;
                let instance = self.optional_variable()?;
                self.expect(Token::Assign, "':='")?;
                let value = self.expect_variable()?;
                self.expect_keyword("as")?;
                let field_type = self.value_type()?;
                InstructionKind::PutField {
                    instance,
                    field,
                    value,
                    field_type,
                }
            }
            "initClass" => InstructionKind::InitClass {
                class: self.expect_identifier()?,
            },
            "monitorEnter" => InstructionKind::MonitorEnter {
                object: self.expect_variable()?,
            },
            "monitorExit" => InstructionKind::MonitorExit {
                object: self.expect_variable()?,
            },
            "invoke" | "invokeStatic" | "invokeVirtual" => self.parse_invoke(&word, None)?,
            _ => {
                return Err(ListingParseError::new(format!("Unknown instruction '{}'", word), offset));
            }
        };
        Ok(kind)
    }

    fn parse_branch(&mut self) -> ParseResult<InstructionKind> {
        let first = self.expect_variable()?;
        let Some(token) = self.advance() else {
            return self.expected("comparison");
        };
        let operand = self.advance();
        let kind = match (token, operand) {
            (Token::ReferenceEqual, Some(Token::Identifier(word))) if word == "null" => {
                Branching::Zero(BranchCondition::Null)
            }
            (Token::ReferenceNotEqual, Some(Token::Identifier(word))) if word == "null" => {
                Branching::Zero(BranchCondition::NotNull)
            }
            (token, Some(Token::Integer(0))) => match token {
                Token::Equal => Branching::Zero(BranchCondition::Equal),
                Token::NotEqual => Branching::Zero(BranchCondition::NotEqual),
                Token::Less => Branching::Zero(BranchCondition::Less),
                Token::LessOrEqual => Branching::Zero(BranchCondition::LessOrEqual),
                Token::Greater => Branching::Zero(BranchCondition::Greater),
                Token::GreaterOrEqual => Branching::Zero(BranchCondition::GreaterOrEqual),
                _ => {
                    self.pos -= 2;
                    return self.expected("comparison");
                }
            },
            (token, Some(Token::Variable(name))) => {
                let condition = match token {
                    Token::Equal => BinaryBranchCondition::Equal,
                    Token::NotEqual => BinaryBranchCondition::NotEqual,
                    Token::ReferenceEqual => BinaryBranchCondition::ReferenceEqual,
                    Token::ReferenceNotEqual => BinaryBranchCondition::ReferenceNotEqual,
                    _ => {
                        self.pos -= 2;
                        return self.expected("'==', '!=', '===' or '!=='");
                    }
                };
                Branching::Binary(condition, self.resolve_variable(name))
            }
            _ => {
                self.pos -= 1;
                return self.expected("0, null or variable");
            }
        };
        self.expect_keyword("then")?;
        self.expect_keyword("goto")?;
        let consequent = self.expect_label()?;
        self.expect_keyword("else")?;
        self.expect_keyword("goto")?;
        let alternative = self.expect_label()?;
        Ok(match kind {
            Branching::Zero(condition) => InstructionKind::Branch {
                condition,
                operand: first,
                consequent,
                alternative,
            },
            Branching::Binary(condition, second) => InstructionKind::BinaryBranch {
                condition,
                first,
                second,
                consequent,
                alternative,
            },
        })
    }

    fn parse_switch(&mut self) -> ParseResult<InstructionKind> {
        let condition = self.expect_variable()?;
        let mut entries = Vec::new();
        while self.eat_keyword("case") {
            let value = self.expect_integer()?;
            self.expect_keyword("goto")?;
            let target = self.expect_label()?;
            entries.push(SwitchEntry {
                condition: value,
                target,
            });
        }
        self.expect_keyword("else")?;
        self.expect_keyword("goto")?;
        let default = self.expect_label()?;
        Ok(InstructionKind::Switch {
            condition,
            entries,
            default,
        })
    }

    /// `[%i]`
    fn parse_index(&mut self) -> ParseResult<VariableId> {
        self.expect(Token::LeftBracket, "'['")?;
        let index = self.expect_variable()?;
        self.expect(Token::RightBracket, "']'")?;
        Ok(index)
    }

    // ===== Operands =====

    fn define_variable(&mut self, name: String) -> VariableId {
        let id = self.program.create_variable();
        if name != id.as_u32().to_string() {
            self.program.variable_mut(id).label = Some(name.clone());
        }
        self.variables.insert(name, id);
        id
    }

    fn resolve_variable(&mut self, name: String) -> VariableId {
        match self.variables.get(&name) {
            Some(&id) => id,
            None => self.define_variable(name),
        }
    }

    fn expect_variable(&mut self) -> ParseResult<VariableId> {
        match self.advance() {
            Some(Token::Variable(name)) => Ok(self.resolve_variable(name)),
            _ => {
                self.pos -= 1;
                self.expected("variable")
            }
        }
    }

    fn optional_variable(&mut self) -> ParseResult<Option<VariableId>> {
        match self.peek() {
            Some(Token::Variable(_)) => self.expect_variable().map(Some),
            _ => Ok(None),
        }
    }

    fn expect_label(&mut self) -> ParseResult<BlockId> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::Label(name)) => match self.blocks.get(&name) {
                Some(&id) => Ok(id),
                None => Err(ListingParseError::new(format!("Block not defined: ${}", name), offset)),
            },
            _ => {
                self.pos -= 1;
                self.expected("block label")
            }
        }
    }

    fn expect_integer(&mut self) -> ParseResult<i32> {
        match self.advance() {
            Some(Token::Integer(value)) => Ok(value),
            _ => {
                self.pos -= 1;
                self.expected("integer")
            }
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        match self.advance() {
            Some(Token::Identifier(name)) => Ok(name),
            _ => {
                self.pos -= 1;
                self.expected("identifier")
            }
        }
    }

    fn value_type(&mut self) -> ParseResult<ValueType> {
        let offset = self.offset();
        let text = self.expect_identifier()?;
        text.parse()
            .map_err(|e: TypeParseError| ListingParseError::new(e.to_string(), offset))
    }

    fn field_reference(&mut self) -> ParseResult<FieldReference> {
        let offset = self.offset();
        let text = self.expect_identifier()?;
        text.parse()
            .map_err(|e: TypeParseError| ListingParseError::new(e.to_string(), offset))
    }

    fn numeric_type(&mut self) -> ParseResult<NumericType> {
        if let Some(Token::Identifier(name)) = self.peek() {
            if let Some(ty) = NumericType::from_name(name) {
                self.pos += 1;
                return Ok(ty);
            }
        }
        self.expected("int, long, float or double")
    }

    fn element_type(&mut self) -> ParseResult<ArrayElementType> {
        if let Some(Token::Identifier(name)) = self.peek() {
            if let Some(ty) = ArrayElementType::from_name(name) {
                self.pos += 1;
                return Ok(ty);
            }
        }
        self.expected("array element type")
    }

    // ===== Token stream =====

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(t, _)| t)
    }

    /// Take the next token. Always moves forward, so callers may step back by one.
    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.start)
            .unwrap_or(self.source.len())
    }

    fn at_line_end(&self) -> bool {
        matches!(self.peek(), None | Some(Token::Eol))
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Identifier(word)) if word == keyword => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> ParseResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            self.expected(what)
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            self.expected(&format!("'{}'", keyword))
        }
    }

    fn expect_eol(&mut self) -> ParseResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(Token::Eol) => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => self.expected("end of line"),
        }
    }

    fn error<T>(&self, message: &str) -> ParseResult<T> {
        Err(ListingParseError::new(message, self.offset()))
    }

    fn expected<T>(&self, what: &str) -> ParseResult<T> {
        let found = self
            .peek()
            .map(|t| t.describe())
            .unwrap_or_else(|| "end of input".to_string());
        Err(ListingParseError::new(
            format!("Expected {}, found {}", what, found),
            self.offset(),
        ))
    }
}

enum Branching {
    Zero(BranchCondition),
    Binary(BinaryBranchCondition, VariableId),
}

fn binary_op(token: &Token) -> Option<BinaryOp> {
    let op = match token {
        Token::Plus => BinaryOp::Add,
        Token::Minus => BinaryOp::Subtract,
        Token::Star => BinaryOp::Multiply,
        Token::Slash => BinaryOp::Divide,
        Token::Percent => BinaryOp::Modulo,
        Token::Ampersand => BinaryOp::And,
        Token::Pipe => BinaryOp::Or,
        Token::Caret => BinaryOp::Xor,
        Token::ShiftLeft => BinaryOp::ShiftLeft,
        Token::ShiftRight => BinaryOp::ShiftRight,
        Token::ShiftRightUnsigned => BinaryOp::ShiftRightUnsigned,
        Token::Identifier(word) if word == "compareTo" => BinaryOp::Compare,
        _ => return None,
    };
    Some(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::listing::print;

    fn roundtrip(source: &str) -> Program {
        let program = parse(source).unwrap_or_else(|e| panic!("{} in:\n{}", e, source));
        let printed = print(&program);
        assert_eq!(printed, source);
        program
    }

    #[test]
    fn test_parse_constant_add() {
        let program = roundtrip("$0\n    %a := 3\n    %b := 2\n    %c := %a + %b as int\n    return %c\n");
        assert_eq!(program.block_count(), 1);
        assert_eq!(program.variable_count(), 3);
        assert_eq!(program.variable(VariableId::new(2)).label.as_deref(), Some("c"));
        assert_eq!(program.validate(), Ok(()));
    }

    #[test]
    fn test_forward_block_references() {
        let source = "\
$0
    if %0 == 0 then goto $exit else goto $loop
$loop
    %1 := 1
    goto $exit
$exit
    %2 := phi %0 from $0, %1 from $loop
    return %2
";
        let program = roundtrip(source);
        assert_eq!(program.block(BlockId::new(1)).label.as_deref(), Some("loop"));
        assert_eq!(program.block(BlockId::new(0)).label, None);
        assert_eq!(program.validate(), Ok(()));
    }

    #[test]
    fn test_every_instruction_form() {
        let source = "\
var %0
var %1
var %2
var %3
var %4
var %5
var %6
var %7
var %8
var %9
var %10 as result
$0
    nop
    %1 := null
    %2 := 12L
    %3 := 1.5F
    %4 := 2.0
    %5 := 'text\\n'
    %6 := classOf `[I`
    %7 := - %2 as long
    %8 := cast %2 from long to int
    %9 := cast %8 to byte
    %1 := cast %1 to `Ljava/lang/String;`
    %9 := %1 instanceOf `Ljava/lang/String;`
    %10 := %2 compareTo %2 as long
    %1 := new java.util.ArrayList
    %6 := newArray I[%8]
    %8 := lengthOf %6
    %6 := clone %6
    %9 := data %6 as int
    %9 := %6[%8] as int
    %6[%8] := %9 as int
    %9 := field Foo.count %1 as I
    field Foo.count %1 := %9 as I
    field Foo.total := %9 as I
    %9 := field Foo.total as I
    initClass Foo
    %1 := nullCheck %1
    monitorEnter %1
    monitorExit %1
    %9 := invokeVirtual `java.lang.Object.hashCode()I` %1
    invoke `java.util.ArrayList.<init>()V` %1
    invokeStatic `Foo.run(II)V` %8, %9
    if %1 === null then goto $1 else goto $2
$1
    %0 := exception
    switch %9 case 1 goto $2 case 5 goto $1 else goto $2
    catch java.lang.Throwable goto $1
    catch goto $2
$2
    if %8 !== %9 then goto $1 else goto $3
$3
    throw %1
";
        let program = roundtrip(source);
        assert_eq!(program.block_count(), 4);
        assert_eq!(program.block(BlockId::new(1)).try_catches.len(), 2);
        assert_eq!(
            program.variable(VariableId::new(10)).debug_name.as_deref(),
            Some("result")
        );
    }

    #[test]
    fn test_special_float_values() {
        let program = roundtrip("$0\n    %0 := NaN\n    %1 := -Infinity\n    %2 := InfinityF\n    return\n");
        let block = program.block(BlockId::new(0));
        assert!(matches!(
            block.instructions[1].kind,
            InstructionKind::DoubleConstant { value, .. } if value == f64::NEG_INFINITY
        ));
    }

    #[test]
    fn test_locations() {
        let program = roundtrip(
            "$0\n    at 'Foo.java' 3\n    %0 := 1\n    %1 := 2\n    at unknown location\n    return %0\n",
        );
        let block = program.block(BlockId::new(0));
        assert_eq!(block.instructions[1].location, Some(TextLocation::new("Foo.java", 3)));
        assert_eq!(block.instructions[2].location, None);
    }

    #[test]
    fn test_undefined_block() {
        let source = "$0\n    goto $nowhere\n";
        let err = parse(source).expect_err("undefined block");
        assert_eq!(err.message, "Block not defined: $nowhere");
        assert_eq!(err.position_in(source), (2, 10));
    }

    #[test]
    fn test_unknown_instruction() {
        let err = parse("$0\n    frobnicate %1\n").expect_err("unknown instruction");
        assert_eq!(err.message, "Unknown instruction 'frobnicate'");
        assert_eq!(err.offset, 7);
    }

    #[test]
    fn test_instruction_outside_block() {
        let err = parse("nop\n").expect_err("no block");
        assert_eq!(err.message, "Instruction outside of a block");
    }

    #[test]
    fn test_trailing_garbage() {
        let err = parse("$0\n    return %1 %2\n").expect_err("extra operand");
        assert!(err.message.starts_with("Expected end of line"));
    }

    #[test]
    fn test_empty_listing() {
        let program = parse("// nothing here\n\n").expect("empty listing parses");
        assert_eq!(program.block_count(), 0);
    }
}
