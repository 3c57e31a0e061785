//! Value types and member references
//!
//! Types use JVM descriptor syntax (`I`, `Ljava/lang/String;`, `[J`). Class names are kept in
//! dotted form (`java.lang.String`) everywhere else.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error produced when a descriptor or reference string is malformed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind} '{text}'")]
pub struct TypeParseError {
    /// What was being parsed
    pub kind: &'static str,
    /// The offending text
    pub text: String,
}

impl TypeParseError {
    fn new(kind: &'static str, text: &str) -> Self {
        Self {
            kind,
            text: text.to_string(),
        }
    }
}

/// Primitive value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveType {
    /// `Z`
    Boolean,
    /// `B`
    Byte,
    /// `S`
    Short,
    /// `C`
    Char,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `F`
    Float,
    /// `D`
    Double,
}

impl PrimitiveType {
    /// All primitive types
    pub const ALL: [PrimitiveType; 8] = [
        PrimitiveType::Boolean,
        PrimitiveType::Byte,
        PrimitiveType::Short,
        PrimitiveType::Char,
        PrimitiveType::Int,
        PrimitiveType::Long,
        PrimitiveType::Float,
        PrimitiveType::Double,
    ];

    /// Descriptor character
    pub fn descriptor(self) -> char {
        match self {
            PrimitiveType::Boolean => 'Z',
            PrimitiveType::Byte => 'B',
            PrimitiveType::Short => 'S',
            PrimitiveType::Char => 'C',
            PrimitiveType::Int => 'I',
            PrimitiveType::Long => 'J',
            PrimitiveType::Float => 'F',
            PrimitiveType::Double => 'D',
        }
    }

    /// Look up a primitive by descriptor character
    pub fn from_descriptor(c: char) -> Option<Self> {
        PrimitiveType::ALL.into_iter().find(|p| p.descriptor() == c)
    }

    /// Java keyword for the type
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Short => "short",
            PrimitiveType::Char => "char",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
        }
    }
}

/// Type of a value, field, parameter, or method result
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    /// Primitive value
    Primitive(PrimitiveType),
    /// Class instance, by dotted class name
    Object(String),
    /// Array of the given item type
    Array(Box<ValueType>),
    /// Method result of void methods
    Void,
}

impl ValueType {
    /// Instance of `class`
    pub fn object(class: impl Into<String>) -> Self {
        ValueType::Object(class.into())
    }

    /// Array of `item`
    pub fn array(item: ValueType) -> Self {
        ValueType::Array(Box::new(item))
    }

    /// `int`
    pub const INT: ValueType = ValueType::Primitive(PrimitiveType::Int);

    /// Whether values of this type are references
    pub fn is_reference(&self) -> bool {
        matches!(self, ValueType::Object(_) | ValueType::Array(_))
    }

    /// Array item type, if this is an array
    pub fn item_type(&self) -> Option<&ValueType> {
        match self {
            ValueType::Array(item) => Some(item),
            _ => None,
        }
    }

    /// Name under which the analysis and backends track this type: the dotted class name
    /// for objects, the descriptor for arrays and primitives.
    pub fn class_name(&self) -> String {
        match self {
            ValueType::Object(name) => name.clone(),
            other => other.to_string(),
        }
    }

    /// Inverse of [`class_name`](Self::class_name)
    pub fn from_class_name(name: &str) -> Result<Self, TypeParseError> {
        if name.starts_with('[') {
            name.parse()
        } else {
            Ok(ValueType::Object(name.to_string()))
        }
    }

    /// Parse one type from the start of `text`, returning it and the rest
    fn parse_prefix(text: &str) -> Option<(ValueType, &str)> {
        let mut chars = text.chars();
        let first = chars.next()?;
        match first {
            'V' => Some((ValueType::Void, &text[1..])),
            '[' => {
                let (item, rest) = Self::parse_prefix(&text[1..])?;
                Some((ValueType::array(item), rest))
            }
            'L' => {
                let end = text.find(';')?;
                let name = &text[1..end];
                if name.is_empty() {
                    return None;
                }
                Some((ValueType::Object(name.replace('/', ".")), &text[end + 1..]))
            }
            c => PrimitiveType::from_descriptor(c).map(|p| (ValueType::Primitive(p), &text[1..])),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Primitive(p) => write!(f, "{}", p.descriptor()),
            ValueType::Object(name) => write!(f, "L{};", name.replace('.', "/")),
            ValueType::Array(item) => write!(f, "[{}", item),
            ValueType::Void => write!(f, "V"),
        }
    }
}

impl FromStr for ValueType {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match ValueType::parse_prefix(s) {
            Some((ty, "")) => Ok(ty),
            _ => Err(TypeParseError::new("type descriptor", s)),
        }
    }
}

/// Method name plus signature, e.g. `foo(ILjava/lang/String;)V`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodDescriptor {
    /// Simple name
    pub name: String,
    /// Parameter types, without `this`
    pub parameters: Vec<ValueType>,
    /// Result type
    pub result: ValueType,
}

impl MethodDescriptor {
    /// Create a descriptor
    pub fn new(name: impl Into<String>, parameters: Vec<ValueType>, result: ValueType) -> Self {
        Self {
            name: name.into(),
            parameters,
            result,
        }
    }

    /// Number of declared parameters (excluding `this`)
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Signature part only, e.g. `(I)V`
    pub fn signature(&self) -> String {
        let mut out = String::from("(");
        for p in &self.parameters {
            out.push_str(&p.to_string());
        }
        out.push(')');
        out.push_str(&self.result.to_string());
        out
    }

    /// Whether this is a constructor
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    /// Whether this is a class initializer
    pub fn is_class_initializer(&self) -> bool {
        self.name == "<clinit>"
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.signature())
    }
}

impl FromStr for MethodDescriptor {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || TypeParseError::new("method descriptor", s);
        let open = s.find('(').ok_or_else(err)?;
        let name = &s[..open];
        if name.is_empty() {
            return Err(err());
        }
        let mut rest = &s[open + 1..];
        let mut parameters = Vec::new();
        loop {
            if let Some(after) = rest.strip_prefix(')') {
                rest = after;
                break;
            }
            let (ty, after) = ValueType::parse_prefix(rest).ok_or_else(err)?;
            if ty == ValueType::Void {
                return Err(err());
            }
            parameters.push(ty);
            rest = after;
        }
        let result = rest.parse::<ValueType>().map_err(|_| err())?;
        Ok(MethodDescriptor::new(name, parameters, result))
    }
}

/// Fully qualified method, e.g. `java.lang.Object.hashCode()I`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodReference {
    /// Dotted class name
    pub class: String,
    /// Name and signature
    pub descriptor: MethodDescriptor,
}

impl MethodReference {
    /// Create a reference
    pub fn new(class: impl Into<String>, descriptor: MethodDescriptor) -> Self {
        Self {
            class: class.into(),
            descriptor,
        }
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Same descriptor on a different class
    pub fn with_class(&self, class: impl Into<String>) -> Self {
        Self::new(class, self.descriptor.clone())
    }
}

impl fmt::Display for MethodReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.descriptor)
    }
}

impl FromStr for MethodReference {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || TypeParseError::new("method reference", s);
        let open = s.find('(').ok_or_else(err)?;
        let dot = s[..open].rfind('.').ok_or_else(err)?;
        let class = &s[..dot];
        if class.is_empty() {
            return Err(err());
        }
        let descriptor = s[dot + 1..].parse().map_err(|_| err())?;
        Ok(MethodReference::new(class, descriptor))
    }
}

/// Fully qualified field, e.g. `java.lang.System.out`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldReference {
    /// Dotted name of the declaring class
    pub class: String,
    /// Simple name
    pub name: String,
}

impl FieldReference {
    /// Create a reference
    pub fn new(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FieldReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.name)
    }
}

impl FromStr for FieldReference {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('.') {
            Some((class, name)) if !class.is_empty() && !name.is_empty() => Ok(FieldReference::new(class, name)),
            _ => Err(TypeParseError::new("field reference", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_descriptors() {
        assert_eq!(ValueType::INT.to_string(), "I");
        assert_eq!(ValueType::object("java.lang.String").to_string(), "Ljava/lang/String;");
        assert_eq!(ValueType::array(ValueType::array(ValueType::INT)).to_string(), "[[I");
        assert_eq!("[Ljava/lang/Object;".parse::<ValueType>(), Ok(ValueType::array(ValueType::object("java.lang.Object"))));
        assert!("Q".parse::<ValueType>().is_err());
        assert!("L;".parse::<ValueType>().is_err());
        assert!("II".parse::<ValueType>().is_err());
    }

    #[test]
    fn test_class_names() {
        assert_eq!(ValueType::object("Foo").class_name(), "Foo");
        assert_eq!(ValueType::array(ValueType::INT).class_name(), "[I");
        assert_eq!(ValueType::from_class_name("[LFoo;"), Ok(ValueType::array(ValueType::object("Foo"))));
        assert_eq!(ValueType::from_class_name("a.B"), Ok(ValueType::object("a.B")));
    }

    #[test]
    fn test_method_reference_roundtrip() {
        let text = "java.lang.String.valueOf(ILjava/lang/Object;)Ljava/lang/String;";
        let method: MethodReference = text.parse().expect("valid reference");
        assert_eq!(method.class, "java.lang.String");
        assert_eq!(method.name(), "valueOf");
        assert_eq!(method.descriptor.parameters.len(), 2);
        assert_eq!(method.to_string(), text);
        assert_eq!(method.descriptor.signature(), "(ILjava/lang/Object;)Ljava/lang/String;");
    }

    #[test]
    fn test_constructor_reference() {
        let method: MethodReference = "Foo.<init>()V".parse().expect("valid reference");
        assert!(method.descriptor.is_constructor());
        assert!(!method.descriptor.is_class_initializer());
    }

    #[test]
    fn test_malformed_references() {
        assert!("foo()V".parse::<MethodReference>().is_err());
        assert!("Foo.foo(V)V".parse::<MethodReference>().is_err());
        assert!("Foo.foo(I".parse::<MethodReference>().is_err());
        assert!("Foo".parse::<FieldReference>().is_err());
        assert_eq!("a.b.C.x".parse::<FieldReference>(), Ok(FieldReference::new("a.b.C", "x")));
    }
}
