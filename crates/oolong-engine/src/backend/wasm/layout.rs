//! Linear memory layout
//!
//! Address 0 is null. Static fields come first, then one class struct per linked class,
//! then the heap managed by the host's allocator.
//!
//! # Objects
//!
//! ```text
//! 0: class pointer   4: identity hash   8: fields...
//! ```
//!
//! Arrays keep their length at 8 and their data from 12, rounded up to the element
//! width.
//!
//! # Class structs
//!
//! ```text
//! 0: instance size (element width for arrays)
//! 4: flags          8: class id        12: item class (arrays)
//! 16: superclass    20: virtual table, one table index per slot
//! ```
//!
//! Primitive classes carry [`FLAG_PRIMITIVE`] and their primitive tag in the flags at
//! [`PRIMITIVE_SHIFT`].

use crate::backend::common::PrimitiveInfo;
use crate::backend::CodegenInput;
use crate::dependency::{ClassHierarchy, OBJECT_CLASS};
use crate::error::CodegenError;
use crate::ir::{ArrayElementType, FieldReference, MethodDescriptor, MethodReference, PrimitiveType, ValueType};
use rustc_hash::FxHashMap;

use super::model::{MemoryType, WasmDataSegment};

/// Object header: class pointer
pub const CLASS_OFFSET: u32 = 0;
/// Object header: identity hash, 0 until first requested
pub const HASH_OFFSET: u32 = 4;
/// Array length
pub const ARRAY_LENGTH_OFFSET: u32 = 8;
const FIRST_FIELD_OFFSET: u32 = 8;

/// Class struct: instance size, or element width for arrays
pub const CLASS_SIZE_OFFSET: u32 = 0;
/// Class struct: `FLAG_*` bits and primitive tag
pub const CLASS_FLAGS_OFFSET: u32 = 4;
/// Class struct: class id
pub const CLASS_ID_OFFSET: u32 = 8;
/// Class struct: item class of array classes
pub const CLASS_ITEM_OFFSET: u32 = 12;
/// Class struct: superclass
pub const CLASS_PARENT_OFFSET: u32 = 16;
/// Class struct: start of the virtual table
pub const CLASS_VTABLE_OFFSET: u32 = 20;

/// Class of a primitive type
pub const FLAG_PRIMITIVE: u32 = 1;
/// Interface
pub const FLAG_INTERFACE: u32 = 2;
/// Array class
pub const FLAG_ARRAY: u32 = 4;
/// Position of the primitive tag in the flags
pub const PRIMITIVE_SHIFT: u32 = 3;
/// Mask of the primitive tag after shifting
pub const PRIMITIVE_MASK: u32 = 15;

/// First byte usable for static data; keeps null distinct from every address
const DATA_START: u32 = 8;

/// Offset of array data for elements of `width` bytes
pub fn array_data_offset(width: u32) -> u32 {
    align(ARRAY_LENGTH_OFFSET + 4, width)
}

/// Round `value` up to a multiple of `alignment`
pub fn align(value: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

/// Memory access for a value of type `ty`
pub fn memory_type(ty: &ValueType) -> MemoryType {
    match ty {
        ValueType::Primitive(p) => match p {
            PrimitiveType::Boolean | PrimitiveType::Byte => MemoryType::Int8,
            PrimitiveType::Short => MemoryType::Int16,
            PrimitiveType::Char => MemoryType::Uint16,
            PrimitiveType::Int => MemoryType::Int32,
            PrimitiveType::Long => MemoryType::Int64,
            PrimitiveType::Float => MemoryType::Float32,
            PrimitiveType::Double => MemoryType::Float64,
        },
        _ => MemoryType::Int32,
    }
}

/// Memory access and log2 width of an array element
pub fn element_access(element: ArrayElementType) -> (MemoryType, u32) {
    match element {
        ArrayElementType::Byte => (MemoryType::Int8, 0),
        ArrayElementType::Short => (MemoryType::Int16, 1),
        ArrayElementType::Char => (MemoryType::Uint16, 1),
        ArrayElementType::Int | ArrayElementType::Object => (MemoryType::Int32, 2),
        ArrayElementType::Float => (MemoryType::Float32, 2),
        ArrayElementType::Long => (MemoryType::Int64, 3),
        ArrayElementType::Double => (MemoryType::Float64, 3),
    }
}

/// Size in bytes of a field or element of type `ty`
pub fn value_width(ty: &ValueType) -> u32 {
    match ty {
        ValueType::Primitive(p) => PrimitiveInfo::of(*p).width,
        _ => 4,
    }
}

#[derive(Debug, Clone)]
struct ClassStruct {
    address: u32,
    size: u32,
    flags: u32,
    id: u32,
    item: Option<String>,
    parent: Option<String>,
    vtable: Vec<Option<MethodReference>>,
}

/// Addresses of static fields and class structs, field offsets and virtual slots
#[derive(Debug)]
pub struct Layout {
    slots: FxHashMap<MethodDescriptor, u32>,
    slot_count: u32,
    classes: Vec<ClassStruct>,
    class_index: FxHashMap<String, usize>,
    fields: FxHashMap<FieldReference, u32>,
    instance_sizes: FxHashMap<String, u32>,
    statics: FxHashMap<FieldReference, u32>,
    next: u32,
}

impl Layout {
    /// Lay out every class linked by the analysis. Array and primitive classes are added
    /// on first use through [`class_address`](Self::class_address).
    pub fn new(input: &CodegenInput<'_>, hierarchy: &ClassHierarchy<'_>) -> Result<Self, CodegenError> {
        let slots: FxHashMap<MethodDescriptor, u32> = input
            .dependencies
            .virtual_calls()
            .iter()
            .enumerate()
            .map(|(slot, descriptor)| (descriptor.clone(), slot as u32))
            .collect();
        let mut layout = Self {
            slot_count: slots.len() as u32,
            slots,
            classes: Vec::new(),
            class_index: FxHashMap::default(),
            fields: FxHashMap::default(),
            instance_sizes: FxHashMap::default(),
            statics: FxHashMap::default(),
            next: DATA_START,
        };

        let classes: Vec<&str> = input.reachable_classes().collect();
        for class in &classes {
            layout.lay_out_fields(input, class)?;
        }
        layout.next = align(layout.next, 8);
        for class in &classes {
            let holder = input.class(class)?;
            let mut vtable = vec![None; layout.slot_count as usize];
            if !holder.is_interface && !holder.is_abstract {
                for (descriptor, &slot) in &layout.slots {
                    let implementation = hierarchy
                        .resolve_implementation(class, descriptor)
                        .filter(|method| input.is_reachable(method) && input.body(method).is_some());
                    vtable[slot as usize] = implementation;
                }
            }
            let flags = if holder.is_interface { FLAG_INTERFACE } else { 0 };
            let size = layout.instance_sizes.get(*class).copied().unwrap_or(FIRST_FIELD_OFFSET);
            let parent = holder.parent.clone();
            layout.add_class(class, size, flags, None, parent, vtable);
        }
        Ok(layout)
    }

    fn lay_out_fields(&mut self, input: &CodegenInput<'_>, class: &str) -> Result<u32, CodegenError> {
        if let Some(&size) = self.instance_sizes.get(class) {
            return Ok(size);
        }
        let holder = input.class(class)?;
        let mut offset = match &holder.parent {
            Some(parent) if input.classes.get(parent).is_some() => self.lay_out_fields(input, parent)?,
            _ => FIRST_FIELD_OFFSET,
        };
        for field in &holder.fields {
            let reference = FieldReference::new(class, field.name.as_str());
            let width = value_width(&field.field_type);
            if field.is_static {
                self.next = align(self.next, width);
                self.statics.insert(reference, self.next);
                self.next += width;
            } else {
                offset = align(offset, width);
                self.fields.insert(reference, offset);
                offset += width;
            }
        }
        let size = align(offset, 4);
        self.instance_sizes.insert(class.to_string(), size);
        Ok(size)
    }

    fn add_class(
        &mut self,
        key: &str,
        size: u32,
        flags: u32,
        item: Option<String>,
        parent: Option<String>,
        vtable: Vec<Option<MethodReference>>,
    ) -> u32 {
        let address = self.next;
        self.next += CLASS_VTABLE_OFFSET + 4 * self.slot_count;
        self.class_index.insert(key.to_string(), self.classes.len());
        self.classes.push(ClassStruct {
            address,
            size,
            flags,
            id: self.classes.len() as u32 + 1,
            item,
            parent,
            vtable,
        });
        address
    }

    // ===== Queries =====

    /// Struct address of the class of values of type `ty`
    pub fn class_address(&mut self, ty: &ValueType) -> u32 {
        let key = ty.class_name();
        if let Some(&index) = self.class_index.get(&key) {
            return self.classes[index].address;
        }
        match ty {
            ValueType::Primitive(p) => {
                let info = PrimitiveInfo::of(*p);
                let flags = FLAG_PRIMITIVE | (info.tag & PRIMITIVE_MASK) << PRIMITIVE_SHIFT;
                self.add_class(&key, info.width, flags, None, None, vec![None; self.slot_count as usize])
            }
            ValueType::Array(item) => {
                self.class_address(item);
                let object = ValueType::object(OBJECT_CLASS);
                let vtable = self
                    .class_index
                    .get(OBJECT_CLASS)
                    .map(|&index| self.classes[index].vtable.clone())
                    .unwrap_or_else(|| vec![None; self.slot_count as usize]);
                let parent = self.class_index.contains_key(OBJECT_CLASS).then(|| object.class_name());
                self.add_class(&key, value_width(item), FLAG_ARRAY, Some(item.class_name()), parent, vtable)
            }
            // Classes outside the analysis get an empty struct so references stay valid
            ValueType::Object(_) | ValueType::Void => {
                self.add_class(&key, FIRST_FIELD_OFFSET, 0, None, None, vec![None; self.slot_count as usize])
            }
        }
    }

    /// Virtual table slot of a called descriptor
    pub fn slot(&self, descriptor: &MethodDescriptor) -> Option<u32> {
        self.slots.get(descriptor).copied()
    }

    /// Offset of an instance field inside objects
    pub fn field_offset(&self, field: &FieldReference) -> Option<u32> {
        self.fields.get(field).copied()
    }

    /// Address of a static field
    pub fn static_address(&self, field: &FieldReference) -> Option<u32> {
        self.statics.get(field).copied()
    }

    /// Bytes to allocate for an instance of `class`, header included
    pub fn instance_size(&self, class: &str) -> u32 {
        self.instance_sizes.get(class).copied().unwrap_or(FIRST_FIELD_OFFSET)
    }

    /// Methods referenced from any virtual table
    pub fn virtual_targets(&self) -> impl Iterator<Item = &MethodReference> {
        self.classes.iter().flat_map(|class| class.vtable.iter().flatten())
    }

    /// First free byte after all static data
    pub fn heap_base(&self) -> u32 {
        align(self.next, 8)
    }

    /// Encode the class structs. `table_index` maps a method to its function table slot.
    pub fn data(&self, mut table_index: impl FnMut(&MethodReference) -> u32) -> Vec<WasmDataSegment> {
        let Some(first) = self.classes.first() else {
            return Vec::new();
        };
        let start = first.address;
        let mut bytes = Vec::with_capacity((self.next - start) as usize);
        for class in &self.classes {
            let pointer = |name: &Option<String>| {
                name.as_ref()
                    .and_then(|name| self.class_index.get(name))
                    .map_or(0, |&index| self.classes[index].address)
            };
            bytes.extend_from_slice(&class.size.to_le_bytes());
            bytes.extend_from_slice(&class.flags.to_le_bytes());
            bytes.extend_from_slice(&class.id.to_le_bytes());
            bytes.extend_from_slice(&pointer(&class.item).to_le_bytes());
            bytes.extend_from_slice(&pointer(&class.parent).to_le_bytes());
            for entry in &class.vtable {
                let index = entry.as_ref().map_or(0, &mut table_index);
                bytes.extend_from_slice(&index.to_le_bytes());
            }
        }
        vec![WasmDataSegment {
            offset: start,
            data: bytes,
        }]
    }
}
