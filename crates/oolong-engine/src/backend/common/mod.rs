//! Pieces shared by all backends

pub mod intrinsics;
pub mod primitives;

pub use intrinsics::{IntrinsicCall, IntrinsicRegistry, MethodMatcher};
pub use primitives::{PrimitiveInfo, MAX_PRIMITIVE_TAG, PRIMITIVES};

/// Reflective array access
pub const ARRAY_CLASS: &str = "java.lang.reflect.Array";
/// Identity hash codes
pub const SYSTEM_CLASS: &str = "java.lang.System";

// Signatures the intrinsics accept; a call with another signature is rejected
/// `Array.get`
pub const ARRAY_GET_SIGNATURE: &str = "(Ljava/lang/Object;I)Ljava/lang/Object;";
/// `Array.set`
pub const ARRAY_SET_SIGNATURE: &str = "(Ljava/lang/Object;ILjava/lang/Object;)V";
/// `Array.getLength`
pub const ARRAY_LENGTH_SIGNATURE: &str = "(Ljava/lang/Object;)I";
/// `System.identityHashCode`
pub const IDENTITY_HASH_CODE_SIGNATURE: &str = "(Ljava/lang/Object;)I";
