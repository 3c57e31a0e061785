//! Binary encoding of a [`WasmModule`]
//!
//! Everything is written into one [`Blob`]. Section and function body sizes are not
//! known up front, so each size is reserved as a five-byte padded LEB and backpatched
//! through a [`Marker`] once the contents are written. Because the reservation has a
//! fixed width, byte offsets recorded for the source map never shift.

use super::model::{LabelId, WasmExpression, WasmFunction, WasmModule, WasmSignature, WasmType};
use crate::blob::{Blob, Marker};
use crate::error::CodegenError;
use crate::sourcemap::{GeneratedPosition, SourceMap, SourceMapBuilder};
use rustc_hash::FxHashMap;

const MAGIC: &[u8] = b"\0asm";
const VERSION: i32 = 1;

const SECTION_TYPE: u8 = 1;
const SECTION_IMPORT: u8 = 2;
const SECTION_FUNCTION: u8 = 3;
const SECTION_TABLE: u8 = 4;
const SECTION_MEMORY: u8 = 5;
const SECTION_GLOBAL: u8 = 6;
const SECTION_EXPORT: u8 = 7;
const SECTION_ELEMENT: u8 = 9;
const SECTION_CODE: u8 = 10;
const SECTION_DATA: u8 = 11;

const EMPTY_BLOCK: u8 = 0x40;
const END: u8 = 0x0B;

/// Encoded module
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedModule {
    /// Module binary
    pub binary: Vec<u8>,
    /// Mappings from code offsets to source lines
    pub source_map: Option<SourceMap>,
}

/// Encode `module`, recording code offsets when `source_maps` is set
pub fn render(module: &WasmModule, source_maps: bool) -> Result<RenderedModule, CodegenError> {
    let mut renderer = WasmRenderer::new(module);
    if source_maps {
        renderer.source_map = Some(SourceMapBuilder::new().with_file("classes.wasm"));
    }
    renderer.render()
}

/// Writes a [`WasmModule`] in the binary format
pub struct WasmRenderer<'m> {
    module: &'m WasmModule,
    blob: Blob,
    functions: FxHashMap<&'m str, u32>,
    globals: FxHashMap<&'m str, u32>,
    source_map: Option<SourceMapBuilder>,
    /// Enclosing structured blocks, innermost last; `if` frames have no label
    labels: Vec<Option<LabelId>>,
}

impl<'m> WasmRenderer<'m> {
    /// Renderer for `module` without source maps
    pub fn new(module: &'m WasmModule) -> Self {
        let globals = module
            .globals
            .iter()
            .enumerate()
            .map(|(index, global)| (global.name.as_str(), index as u32))
            .collect();
        Self {
            module,
            blob: Blob::new(),
            functions: module.function_indices(),
            globals,
            source_map: None,
            labels: Vec::new(),
        }
    }

    /// Encode all sections
    pub fn render(mut self) -> Result<RenderedModule, CodegenError> {
        self.blob.write(MAGIC);
        self.blob.write_int(VERSION);

        self.section(SECTION_TYPE, |r| {
            let types = r.module.types();
            r.blob.write_leb(types.len() as u32);
            for signature in types {
                r.write_signature(signature);
            }
            Ok(())
        })?;
        if !self.module.imports.is_empty() {
            self.section(SECTION_IMPORT, |r| {
                r.blob.write_leb(r.module.imports.len() as u32);
                for import in &r.module.imports {
                    r.blob.write_name(&import.module);
                    r.blob.write_name(&import.field);
                    r.blob.write_byte(0x00);
                    let index = r.type_index(&import.signature, &import.name)?;
                    r.blob.write_leb(index);
                }
                Ok(())
            })?;
        }
        self.section(SECTION_FUNCTION, |r| {
            r.blob.write_leb(r.module.functions.len() as u32);
            for function in &r.module.functions {
                let index = r.type_index(&function.signature(), &function.name)?;
                r.blob.write_leb(index);
            }
            Ok(())
        })?;
        if !self.module.table.is_empty() {
            self.section(SECTION_TABLE, |r| {
                r.blob.write_leb(1);
                r.blob.write_byte(0x70);
                r.blob.write_byte(0x00);
                r.blob.write_leb(r.module.table.len() as u32);
                Ok(())
            })?;
        }
        self.section(SECTION_MEMORY, |r| {
            r.blob.write_leb(1);
            r.blob.write_byte(0x00);
            r.blob.write_leb(r.module.memory_pages);
            Ok(())
        })?;
        if !self.module.globals.is_empty() {
            self.section(SECTION_GLOBAL, |r| {
                r.blob.write_leb(r.module.globals.len() as u32);
                for global in &r.module.globals {
                    r.blob.write_byte(global.ty.code());
                    r.blob.write_byte(u8::from(global.mutable));
                    r.expression(&global.initial)?;
                    r.blob.write_byte(END);
                }
                Ok(())
            })?;
        }
        self.section(SECTION_EXPORT, |r| {
            let exported: Vec<(&str, u32)> = r
                .module
                .functions
                .iter()
                .filter_map(|function| {
                    let name = function.export_name.as_deref()?;
                    Some((name, r.functions[function.name.as_str()]))
                })
                .collect();
            let memory = u32::from(r.module.export_memory);
            r.blob.write_leb(exported.len() as u32 + memory);
            for (name, index) in exported {
                r.blob.write_name(name);
                r.blob.write_byte(0x00);
                r.blob.write_leb(index);
            }
            if r.module.export_memory {
                r.blob.write_name("memory");
                r.blob.write_byte(0x02);
                r.blob.write_leb(0);
            }
            Ok(())
        })?;
        if !self.module.table.is_empty() {
            self.section(SECTION_ELEMENT, |r| {
                r.blob.write_leb(1);
                r.blob.write_leb(0);
                r.expression(&WasmExpression::I32Const(0))?;
                r.blob.write_byte(END);
                r.blob.write_leb(r.module.table.len() as u32);
                for name in &r.module.table {
                    let index = r.function_index(name)?;
                    r.blob.write_leb(index);
                }
                Ok(())
            })?;
        }
        self.section(SECTION_CODE, |r| {
            r.blob.write_leb(r.module.functions.len() as u32);
            for function in &r.module.functions {
                r.function_body(function)?;
            }
            Ok(())
        })?;
        if !self.module.data.is_empty() {
            self.section(SECTION_DATA, |r| {
                r.blob.write_leb(r.module.data.len() as u32);
                for segment in &r.module.data {
                    r.blob.write_leb(0);
                    r.expression(&WasmExpression::I32Const(segment.offset as i32))?;
                    r.blob.write_byte(END);
                    r.blob.write_leb(segment.data.len() as u32);
                    r.blob.write(&segment.data);
                }
                Ok(())
            })?;
        }

        Ok(RenderedModule {
            binary: self.blob.to_vec(),
            source_map: self.source_map.map(|builder| builder.build()),
        })
    }

    // ===== Framing =====

    fn section(
        &mut self,
        id: u8,
        write: impl FnOnce(&mut Self) -> Result<(), CodegenError>,
    ) -> Result<(), CodegenError> {
        self.blob.write_byte(id);
        self.sized(write)
    }

    /// Write a padded size placeholder, then the contents, then patch the size
    fn sized(&mut self, write: impl FnOnce(&mut Self) -> Result<(), CodegenError>) -> Result<(), CodegenError> {
        let marker: Marker = self.blob.marker();
        self.blob.write_padded_leb(0);
        let start = self.blob.position();
        write(self)?;
        let size = self.blob.position() - start;
        marker.rewind(&mut self.blob);
        self.blob.write_padded_leb(size as u32);
        self.blob.seek_end();
        Ok(())
    }

    fn write_signature(&mut self, signature: &WasmSignature) {
        self.blob.write_byte(0x60);
        self.blob.write_leb(signature.params.len() as u32);
        for param in &signature.params {
            self.blob.write_byte(param.code());
        }
        match signature.result {
            Some(result) => {
                self.blob.write_leb(1);
                self.blob.write_byte(result.code());
            }
            None => self.blob.write_leb(0),
        }
    }

    fn type_index(&self, signature: &WasmSignature, owner: &str) -> Result<u32, CodegenError> {
        self.module
            .type_of(signature)
            .ok_or_else(|| CodegenError::UnknownFunction(owner.to_string()))
    }

    fn function_index(&self, name: &str) -> Result<u32, CodegenError> {
        self.functions
            .get(name)
            .copied()
            .ok_or_else(|| CodegenError::UnknownFunction(name.to_string()))
    }

    fn function_body(&mut self, function: &'m WasmFunction) -> Result<(), CodegenError> {
        if let (Some(builder), Some(method)) = (&mut self.source_map, &function.method) {
            builder.start(method.as_str());
            builder.empty_location();
        }
        self.sized(|r| {
            let groups = local_groups(&function.locals);
            r.blob.write_leb(groups.len() as u32);
            for (count, ty) in groups {
                r.blob.write_leb(count);
                r.blob.write_byte(ty.code());
            }
            r.labels.clear();
            for expression in &function.body {
                r.expression(expression)?;
            }
            r.blob.write_byte(END);
            Ok(())
        })?;
        if let (Some(builder), Some(_)) = (&mut self.source_map, &function.method) {
            builder.end();
        }
        Ok(())
    }

    fn depth(&self, target: LabelId) -> Result<u32, CodegenError> {
        self.labels
            .iter()
            .rev()
            .position(|label| *label == Some(target))
            .map(|depth| depth as u32)
            .ok_or(CodegenError::UnknownLabel(target.0))
    }

    // ===== Expressions =====

    fn expression(&mut self, expression: &WasmExpression) -> Result<(), CodegenError> {
        use WasmExpression::*;
        if let Some(builder) = &mut self.source_map {
            builder.advance(GeneratedPosition::offset(self.blob.position() as u32));
        }
        match expression {
            I32Const(value) => {
                self.blob.write_byte(0x41);
                self.blob.write_sleb(*value);
            }
            I64Const(value) => {
                self.blob.write_byte(0x42);
                self.blob.write_sleb64(*value);
            }
            F32Const(value) => {
                self.blob.write_byte(0x43);
                self.blob.write_f32(*value);
            }
            F64Const(value) => {
                self.blob.write_byte(0x44);
                self.blob.write_f64(*value);
            }
            GetLocal(index) => {
                self.blob.write_byte(0x20);
                self.blob.write_leb(*index);
            }
            SetLocal(index, value) => {
                self.expression(value)?;
                self.blob.write_byte(0x21);
                self.blob.write_leb(*index);
            }
            TeeLocal(index, value) => {
                self.expression(value)?;
                self.blob.write_byte(0x22);
                self.blob.write_leb(*index);
            }
            GetGlobal(name) => {
                let index = self.global_index(name)?;
                self.blob.write_byte(0x23);
                self.blob.write_leb(index);
            }
            SetGlobal(name, value) => {
                self.expression(value)?;
                let index = self.global_index(name)?;
                self.blob.write_byte(0x24);
                self.blob.write_leb(index);
            }
            IntBinary { op, ty, first, second } => {
                self.expression(first)?;
                self.expression(second)?;
                self.blob.write_byte(op.opcode(*ty));
            }
            FloatBinary { op, ty, first, second } => {
                self.expression(first)?;
                self.expression(second)?;
                self.blob.write_byte(op.opcode(*ty));
            }
            IntUnary { op, ty, operand } => {
                self.expression(operand)?;
                self.blob.write_byte(op.opcode(*ty));
            }
            FloatUnary { op, ty, operand } => {
                self.expression(operand)?;
                self.blob.write_byte(op.opcode(*ty));
            }
            Convert { conversion, operand } => {
                self.expression(operand)?;
                let (prefix, opcode) = conversion.encoding();
                if let Some(prefix) = prefix {
                    self.blob.write_byte(prefix);
                    self.blob.write_leb(u32::from(opcode));
                } else {
                    self.blob.write_byte(opcode);
                }
            }
            Load { memory, offset, address } => {
                self.expression(address)?;
                self.blob.write_byte(memory.load_opcode());
                self.blob.write_leb(memory.alignment());
                self.blob.write_leb(*offset);
            }
            Store {
                memory,
                offset,
                address,
                value,
            } => {
                self.expression(address)?;
                self.expression(value)?;
                self.blob.write_byte(memory.store_opcode());
                self.blob.write_leb(memory.alignment());
                self.blob.write_leb(*offset);
            }
            Call { function, arguments } => {
                for argument in arguments {
                    self.expression(argument)?;
                }
                let index = self.function_index(function)?;
                self.blob.write_byte(0x10);
                self.blob.write_leb(index);
            }
            CallIndirect {
                type_index,
                index,
                arguments,
            } => {
                for argument in arguments {
                    self.expression(argument)?;
                }
                self.expression(index)?;
                self.blob.write_byte(0x11);
                self.blob.write_leb(*type_index);
                self.blob.write_byte(0x00);
            }
            Block {
                label,
                is_loop,
                result,
                body,
            } => {
                self.blob.write_byte(if *is_loop { 0x03 } else { 0x02 });
                self.block_type(*result);
                self.labels.push(Some(*label));
                for expression in body {
                    self.expression(expression)?;
                }
                self.labels.pop();
                self.blob.write_byte(END);
            }
            Branch { target, condition } => {
                match condition {
                    Some(condition) => {
                        self.expression(condition)?;
                        self.blob.write_byte(0x0D);
                    }
                    None => self.blob.write_byte(0x0C),
                }
                let depth = self.depth(*target)?;
                self.blob.write_leb(depth);
            }
            Switch {
                selector,
                targets,
                default,
            } => {
                self.expression(selector)?;
                let depths = targets
                    .iter()
                    .map(|target| self.depth(*target))
                    .collect::<Result<Vec<_>, _>>()?;
                let default = self.depth(*default)?;
                self.blob.write_byte(0x0E);
                self.blob.write_leb(depths.len() as u32);
                for depth in depths {
                    self.blob.write_leb(depth);
                }
                self.blob.write_leb(default);
            }
            Conditional {
                condition,
                result,
                then_branch,
                else_branch,
            } => {
                self.expression(condition)?;
                self.blob.write_byte(0x04);
                self.block_type(*result);
                self.labels.push(None);
                for expression in then_branch {
                    self.expression(expression)?;
                }
                if !else_branch.is_empty() {
                    self.blob.write_byte(0x05);
                    for expression in else_branch {
                        self.expression(expression)?;
                    }
                }
                self.labels.pop();
                self.blob.write_byte(END);
            }
            Return(value) => {
                if let Some(value) = value {
                    self.expression(value)?;
                }
                self.blob.write_byte(0x0F);
            }
            Drop(value) => {
                self.expression(value)?;
                self.blob.write_byte(0x1A);
            }
            Unreachable => self.blob.write_byte(0x00),
            Located(location, inner) => {
                if let Some(builder) = &mut self.source_map {
                    builder.location(&location.file, location.line);
                }
                self.expression(inner)?;
                if let Some(builder) = &mut self.source_map {
                    builder.empty_location();
                }
            }
            ParallelCopy(copies) => {
                for &(_, source) in copies {
                    self.blob.write_byte(0x20);
                    self.blob.write_leb(source);
                }
                for &(target, _) in copies.iter().rev() {
                    self.blob.write_byte(0x21);
                    self.blob.write_leb(target);
                }
            }
        }
        Ok(())
    }

    fn block_type(&mut self, result: Option<WasmType>) {
        self.blob.write_byte(result.map_or(EMPTY_BLOCK, WasmType::code));
    }

    fn global_index(&self, name: &str) -> Result<u32, CodegenError> {
        self.globals
            .get(name)
            .copied()
            .ok_or_else(|| CodegenError::UnknownGlobal(name.to_string()))
    }
}

/// Run-length groups of consecutive locals with the same type
fn local_groups(locals: &[WasmType]) -> Vec<(u32, WasmType)> {
    let mut groups: Vec<(u32, WasmType)> = Vec::new();
    for &ty in locals {
        match groups.last_mut() {
            Some((count, last)) if *last == ty => *count += 1,
            _ => groups.push((1, ty)),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::super::model::{IntBinaryOp, WasmImport};
    use super::*;
    use crate::blob::leb::decode_u32;
    use crate::ir::TextLocation;

    fn sections(binary: &[u8]) -> Vec<(u8, usize)> {
        assert_eq!(&binary[..4], MAGIC);
        assert_eq!(&binary[4..8], &[1, 0, 0, 0]);
        let mut position = 8;
        let mut out = Vec::new();
        while position < binary.len() {
            let id = binary[position];
            let (size, read) = decode_u32(&binary[position + 1..]).expect("section size");
            assert_eq!(read, 5, "section sizes are padded");
            out.push((id, size as usize));
            position += 1 + read + size as usize;
        }
        assert_eq!(position, binary.len());
        out
    }

    fn add_module() -> WasmModule {
        let mut module = WasmModule::new(1, true);
        let mut add = WasmFunction::new("add", vec![WasmType::I32, WasmType::I32], Some(WasmType::I32));
        add.body.push(WasmExpression::Located(
            TextLocation::new("Add.java", 3),
            Box::new(WasmExpression::Return(Some(Box::new(WasmExpression::int(
                IntBinaryOp::Add,
                WasmExpression::get_local(0),
                WasmExpression::get_local(1),
            ))))),
        ));
        add.export_name = Some("add".into());
        add.method = Some("Add.add(II)I".into());
        module.add_function(add);
        module
    }

    #[test]
    fn test_minimal_module_layout() {
        let rendered = render(&add_module(), false).expect("renders");
        let ids: Vec<u8> = sections(&rendered.binary).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![SECTION_TYPE, SECTION_FUNCTION, SECTION_MEMORY, SECTION_EXPORT, SECTION_CODE]);
        // Padded body size, no locals, get 0, get 1, add, return, end
        assert!(rendered
            .binary
            .ends_with(&[0x88, 0x80, 0x80, 0x80, 0x00, 0x00, 0x20, 0x00, 0x20, 0x01, 0x6A, 0x0F, END]));
        assert!(rendered.source_map.is_none());
    }

    #[test]
    fn test_branch_depth_counts_enclosing_blocks() {
        let mut module = WasmModule::new(1, false);
        let mut function = WasmFunction::new("loop", Vec::new(), None);
        let outer = LabelId(0);
        let inner = LabelId(1);
        function.body.push(WasmExpression::block(
            outer,
            vec![WasmExpression::Block {
                label: inner,
                is_loop: true,
                result: None,
                body: vec![
                    WasmExpression::when(WasmExpression::I32Const(1), vec![WasmExpression::branch(outer)]),
                    WasmExpression::branch(inner),
                ],
            }],
        ));
        module.add_function(function);
        let binary = render(&module, false).expect("renders").binary;
        // block, loop, i32.const 1, if, br 2, end, br 0, end, end, end
        let expected = [
            0x02, 0x40, 0x03, 0x40, 0x41, 0x01, 0x04, 0x40, 0x0C, 0x02, 0x0B, 0x0C, 0x00, 0x0B, 0x0B, 0x0B,
        ];
        assert!(binary.windows(expected.len()).any(|window| window == expected));
    }

    #[test]
    fn test_unknown_names_are_errors() {
        let mut module = WasmModule::new(1, false);
        let mut function = WasmFunction::new("f", Vec::new(), None);
        function.body.push(WasmExpression::call("missing", Vec::new()));
        module.add_function(function);
        assert_eq!(render(&module, false), Err(CodegenError::UnknownFunction("missing".into())));

        let mut module = WasmModule::new(1, false);
        let mut function = WasmFunction::new("f", Vec::new(), None);
        function.body.push(WasmExpression::branch(LabelId(7)));
        module.add_function(function);
        assert_eq!(render(&module, false), Err(CodegenError::UnknownLabel(7)));
    }

    #[test]
    fn test_imports_tables_and_data() {
        let mut module = add_module();
        module.add_import(WasmImport {
            name: "alloc".into(),
            module: "oolong".into(),
            field: "allocate".into(),
            signature: WasmSignature::new(vec![WasmType::I32, WasmType::I32], Some(WasmType::I32)),
        });
        module.table.push("add".into());
        module.add_global("heap", WasmType::I32, WasmExpression::I32Const(1024));
        module.data.push(super::super::model::WasmDataSegment {
            offset: 8,
            data: vec![1, 2, 3],
        });
        let binary = render(&module, false).expect("renders").binary;
        let ids: Vec<u8> = sections(&binary).into_iter().map(|(id, _)| id).collect();
        assert_eq!(
            ids,
            vec![
                SECTION_TYPE,
                SECTION_IMPORT,
                SECTION_FUNCTION,
                SECTION_TABLE,
                SECTION_MEMORY,
                SECTION_GLOBAL,
                SECTION_EXPORT,
                SECTION_ELEMENT,
                SECTION_CODE,
                SECTION_DATA
            ]
        );
        assert!(binary.ends_with(&[0x03, 1, 2, 3]));
    }

    #[test]
    fn test_source_map_records_byte_offsets() {
        let rendered = render(&add_module(), true).expect("renders");
        let map = rendered.source_map.expect("enabled");
        let entries = map.entries().expect("valid mappings");
        let located: Vec<_> = entries.iter().filter(|(_, source)| source.is_some()).collect();
        assert_eq!(located.len(), 1);
        let (position, source) = located[0];
        assert_eq!(position.line, 0);
        assert_eq!(source.as_ref().map(|(_, line)| *line), Some(3));
        // The mapped offset is inside the code section
        assert!((position.column as usize) < rendered.binary.len());
        assert_eq!(rendered.binary[position.column as usize], 0x20);
    }

    #[test]
    fn test_local_groups() {
        let groups = local_groups(&[WasmType::I32, WasmType::I32, WasmType::I64, WasmType::I32]);
        assert_eq!(groups, vec![(2, WasmType::I32), (1, WasmType::I64), (1, WasmType::I32)]);
    }
}
