//! Intrinsic registration
//!
//! A backend keeps an [`IntrinsicRegistry`] of generators keyed by method matchers and
//! consults it before emitting an ordinary call. The first matching entry wins, so
//! specific matchers should be registered before broad ones.

use crate::error::CodegenError;
use crate::ir::{MethodReference, TextLocation, VariableId};
use std::fmt;

/// Selects the methods an intrinsic handles
pub enum MethodMatcher {
    /// One method
    Exact(MethodReference),
    /// Every method of a class
    Class(String),
    /// Methods accepted by a custom test
    Predicate(Box<dyn Fn(&MethodReference) -> bool>),
}

impl MethodMatcher {
    /// Match one method given as `Class.name(desc)ret`.
    ///
    /// # Panics
    ///
    /// If `reference` is not a valid method reference.
    pub fn exact(reference: &str) -> Self {
        match reference.parse() {
            Ok(method) => MethodMatcher::Exact(method),
            Err(err) => panic!("invalid intrinsic reference: {}", err),
        }
    }

    /// Every method of `name`
    pub fn class(name: impl Into<String>) -> Self {
        MethodMatcher::Class(name.into())
    }

    /// Methods accepted by `f`
    pub fn predicate(f: impl Fn(&MethodReference) -> bool + 'static) -> Self {
        MethodMatcher::Predicate(Box::new(f))
    }

    /// Any overload of `class.name`
    pub fn named(class: &'static str, name: &'static str) -> Self {
        Self::predicate(move |method| method.class == class && method.name() == name)
    }

    /// Whether `method` is handled
    pub fn matches(&self, method: &MethodReference) -> bool {
        match self {
            MethodMatcher::Exact(expected) => expected == method,
            MethodMatcher::Class(class) => &method.class == class,
            MethodMatcher::Predicate(f) => f(method),
        }
    }
}

impl fmt::Debug for MethodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodMatcher::Exact(method) => write!(f, "Exact({})", method),
            MethodMatcher::Class(class) => write!(f, "Class({})", class),
            MethodMatcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Ordered (matcher, generator) table
pub struct IntrinsicRegistry<G> {
    entries: Vec<(MethodMatcher, G)>,
}

impl<G> IntrinsicRegistry<G> {
    /// Empty registry
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Append an entry; earlier entries take precedence
    pub fn register(&mut self, matcher: MethodMatcher, generator: G) -> &mut Self {
        self.entries.push((matcher, generator));
        self
    }

    /// Generator of the first entry matching `method`
    pub fn find(&self, method: &MethodReference) -> Option<&G> {
        self.entries
            .iter()
            .find(|(matcher, _)| matcher.matches(method))
            .map(|(_, generator)| generator)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<G> Default for IntrinsicRegistry<G> {
    fn default() -> Self {
        Self::new()
    }
}

/// A call site handed to an intrinsic generator
#[derive(Debug, Clone, Copy)]
pub struct IntrinsicCall<'c> {
    /// Called method
    pub method: &'c MethodReference,
    /// Variable receiving the result
    pub receiver: Option<VariableId>,
    /// Instance for virtual and special calls
    pub instance: Option<VariableId>,
    /// Arguments, without the instance
    pub arguments: &'c [VariableId],
    /// Location of the call
    pub location: Option<&'c TextLocation>,
}

impl<'c> IntrinsicCall<'c> {
    /// Fail unless the call passes exactly `expected` arguments
    pub fn expect_arity(&self, expected: usize) -> Result<(), CodegenError> {
        if self.arguments.len() == expected {
            Ok(())
        } else {
            Err(CodegenError::IntrinsicArity {
                method: self.method.clone(),
                expected,
                actual: self.arguments.len(),
            })
        }
    }

    /// Check the descriptor's `(params)result` part
    pub fn expect_signature(&self, expected: &str) -> Result<(), CodegenError> {
        let actual = self.method.descriptor.signature();
        if actual == expected {
            Ok(())
        } else {
            Err(CodegenError::IntrinsicMismatch {
                method: self.method.clone(),
                message: format!("expected signature {}, found {}", expected, actual),
            })
        }
    }

    /// Argument at `index`; callers check the arity first
    pub fn argument(&self, index: usize) -> VariableId {
        self.arguments[index]
    }
}
