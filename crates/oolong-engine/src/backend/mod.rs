//! Code generation backends
//!
//! Both backends consume the same [`CodegenInput`]: the class oracle, the results of
//! dependency analysis and the optimized bodies of reachable methods. Only reachable
//! methods and linked classes are emitted.
//!
//! # Structure
//!
//! - `common`: intrinsic registry and the primitive dispatch table
//! - `js`: JavaScript text with optional source map
//! - `wasm`: WebAssembly binary module with optional source map

pub mod common;
pub mod js;
pub mod wasm;

use crate::dependency::{ClassHolder, ClassSource, DependencyInfo, MethodHolder};
use crate::error::CodegenError;
use crate::ir::{MethodDescriptor, MethodReference, Program, ValueType};
use rustc_hash::FxHashMap;

/// Everything a backend reads
#[derive(Clone, Copy)]
pub struct CodegenInput<'a> {
    /// Class oracle
    pub classes: &'a dyn ClassSource,
    /// Analysis results
    pub dependencies: &'a DependencyInfo,
    /// Bodies to emit, overriding the ones held by `classes`
    pub bodies: &'a FxHashMap<MethodReference, Program>,
    /// Static method the program starts from
    pub entry: &'a MethodReference,
}

impl<'a> CodegenInput<'a> {
    /// Class by name, or an error if it is not available
    pub fn class(&self, name: &str) -> Result<&'a ClassHolder, CodegenError> {
        self.classes
            .get(name)
            .ok_or_else(|| CodegenError::MissingClass(name.to_string()))
    }

    /// Declaration of `method`, if its class provides one
    pub fn method(&self, method: &MethodReference) -> Option<&'a MethodHolder> {
        self.classes.get(&method.class)?.method(&method.descriptor)
    }

    /// Body to emit for `method`
    pub fn body(&self, method: &MethodReference) -> Option<&'a Program> {
        self.bodies
            .get(method)
            .or_else(|| self.method(method).and_then(|holder| holder.program.as_ref()))
    }

    /// Whether analysis reached `method`
    pub fn is_reachable(&self, method: &MethodReference) -> bool {
        self.dependencies.is_reachable(method)
    }

    /// Linked classes in link order, without array types
    pub fn reachable_classes(&self) -> impl Iterator<Item = &'a str> {
        self.dependencies
            .classes()
            .iter()
            .map(String::as_str)
            .filter(|name| !name.starts_with('['))
    }

    /// Whether touching `class` must run an initializer, its own or an ancestor's
    pub fn needs_initialization(&self, class: &str) -> bool {
        let clinit = MethodDescriptor::new("<clinit>", Vec::new(), ValueType::Void);
        let mut current = Some(class);
        while let Some(name) = current {
            if self.is_reachable(&MethodReference::new(name, clinit.clone())) {
                return true;
            }
            current = self.classes.get(name).and_then(|holder| holder.parent.as_deref());
        }
        false
    }

    /// Entry method, which must be static
    pub fn entry_method(&self) -> Result<&'a MethodHolder, CodegenError> {
        let holder = self
            .method(self.entry)
            .ok_or_else(|| CodegenError::MissingBody(self.entry.clone()))?;
        if holder.is_static {
            Ok(holder)
        } else {
            Err(CodegenError::InstanceEntry(self.entry.clone()))
        }
    }
}
