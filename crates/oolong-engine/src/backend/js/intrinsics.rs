//! Intrinsic generators for the JavaScript backend

use super::{JsIntrinsic, MethodContext};
use crate::backend::common::{
    IntrinsicCall, IntrinsicRegistry, MethodMatcher, ARRAY_CLASS, ARRAY_GET_SIGNATURE, ARRAY_LENGTH_SIGNATURE,
    ARRAY_SET_SIGNATURE, IDENTITY_HASH_CODE_SIGNATURE, PRIMITIVES, SYSTEM_CLASS,
};
use crate::error::CodegenError;

pub(super) fn registry() -> IntrinsicRegistry<JsIntrinsic> {
    let mut registry: IntrinsicRegistry<JsIntrinsic> = IntrinsicRegistry::new();
    registry
        .register(MethodMatcher::named(ARRAY_CLASS, "getImpl"), array_get)
        .register(MethodMatcher::named(ARRAY_CLASS, "setImpl"), array_set)
        .register(MethodMatcher::named(ARRAY_CLASS, "getLength"), array_length)
        .register(MethodMatcher::named(SYSTEM_CLASS, "identityHashCode"), identity_hash_code);
    registry
}

/// Item class of an array, as set up by the runtime's array constructors
fn item_class(array: &str) -> String {
    format!("{}.constructor.$meta.item", array)
}

/// Read an element, boxing primitives through the wrapper's `valueOf` when it is reachable
fn array_get(context: &mut MethodContext<'_, '_>, call: &IntrinsicCall<'_>) -> Result<(), CodegenError> {
    call.expect_signature(ARRAY_GET_SIGNATURE)?;
    call.expect_arity(2)?;
    let array = context.var(call.argument(0));
    let index = context.var(call.argument(1));
    let Some(receiver) = call.receiver else {
        return Ok(());
    };
    let receiver = context.var(receiver);
    let item = context.temp();
    let line = format!("var {} = {};", item, item_class(&array));
    context.statement(&line);

    let mut first = true;
    for primitive in PRIMITIVES.iter() {
        let boxing = primitive.box_method();
        if !context.is_reachable(&boxing) {
            continue;
        }
        let class = context.type_ref(&primitive.value_type());
        let function = context.function_name(&boxing);
        let test = format!("if ({} === {})", item, class);
        if first {
            context.writer().open(&test);
            first = false;
        } else {
            context.writer().outdent().append("} else ").append(&test).append(" {").newline().indent();
        }
        let line = format!("{} = {}({}.data[{}]);", receiver, function, array, index);
        context.statement(&line);
    }
    let plain = format!("{} = {}.data[{}];", receiver, array, index);
    if first {
        context.statement(&plain);
    } else {
        context.writer().outdent().line("} else {").indent();
        context.statement(&plain);
        context.writer().close("");
    }
    Ok(())
}

/// Store an element, unboxing into primitive arrays
fn array_set(context: &mut MethodContext<'_, '_>, call: &IntrinsicCall<'_>) -> Result<(), CodegenError> {
    call.expect_signature(ARRAY_SET_SIGNATURE)?;
    call.expect_arity(3)?;
    let array = context.var(call.argument(0));
    let index = context.var(call.argument(1));
    let value = context.var(call.argument(2));
    let item = context.temp();
    let line = format!("var {} = {};", item, item_class(&array));
    context.statement(&line);

    let mut first = true;
    for primitive in PRIMITIVES.iter() {
        let unboxing = primitive.unbox_method();
        if !context.is_reachable(&unboxing) {
            continue;
        }
        let class = context.type_ref(&primitive.value_type());
        let function = context.function_name(&unboxing);
        let test = format!("if ({} === {})", item, class);
        if first {
            context.writer().open(&test);
            first = false;
        } else {
            context.writer().outdent().append("} else ").append(&test).append(" {").newline().indent();
        }
        let line = format!("{}.data[{}] = {}({});", array, index, function, value);
        context.statement(&line);
    }
    let plain = format!("{}.data[{}] = {};", array, index, value);
    if first {
        context.statement(&plain);
    } else {
        context.writer().outdent().line("} else {").indent();
        context.statement(&plain);
        context.writer().close("");
    }
    Ok(())
}

fn array_length(context: &mut MethodContext<'_, '_>, call: &IntrinsicCall<'_>) -> Result<(), CodegenError> {
    call.expect_signature(ARRAY_LENGTH_SIGNATURE)?;
    call.expect_arity(1)?;
    if let Some(receiver) = call.receiver {
        let line = format!("{} = {}.data.length;", context.var(receiver), context.var(call.argument(0)));
        context.statement(&line);
    }
    Ok(())
}

/// Lazily assigned id stored on the object itself
fn identity_hash_code(context: &mut MethodContext<'_, '_>, call: &IntrinsicCall<'_>) -> Result<(), CodegenError> {
    call.expect_signature(IDENTITY_HASH_CODE_SIGNATURE)?;
    call.expect_arity(1)?;
    let object = context.var(call.argument(0));
    let expression = format!("{0}.$id$ || ({0}.$id$ = $rt_nextId())", object);
    match call.receiver {
        Some(receiver) => {
            let line = format!("{} = {};", context.var(receiver), expression);
            context.statement(&line);
        }
        None => context.statement(&format!("{};", expression)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::js::generate;
    use crate::backend::CodegenInput;
    use crate::dependency::{ClassHolder, DependencyAnalyzer, MemoryClassSource, MethodHolder};
    use crate::ir::listing::parse;
    use crate::ir::MethodReference;
    use crate::options::JsOptions;
    use rustc_hash::FxHashMap;

    fn generate_main(main: &str, array: ClassHolder) -> Result<String, CodegenError> {
        let integer = ClassHolder::new("java.lang.Integer").with_method(MethodHolder::new(
            "valueOf(I)Ljava/lang/Integer;".parse().expect("descriptor"),
            true,
            parse("var %0\nvar %1\nvar %2\n$0\n    %2 := new java.lang.Integer\n    return %2\n").expect("listing"),
        ));
        let source = MemoryClassSource::new()
            .with(ClassHolder::new("java.lang.Object"))
            .with(integer)
            .with(array)
            .with(ClassHolder::new("Main").with_method(MethodHolder::new(
                "main()V".parse().expect("descriptor"),
                true,
                parse(main).expect("listing"),
            )));
        let entry: MethodReference = "Main.main()V".parse().expect("reference");
        let mut analyzer = DependencyAnalyzer::new(&source);
        analyzer.add_entry_point(&entry);
        let info = analyzer.finish();
        let bodies = FxHashMap::default();
        let input = CodegenInput {
            classes: &source,
            dependencies: &info,
            bodies: &bodies,
            entry: &entry,
        };
        generate(input, &JsOptions::default(), false).map(|output| output.code)
    }

    fn array_class() -> ClassHolder {
        ClassHolder::new(ARRAY_CLASS)
            .with_method(MethodHolder::native(
                format!("getImpl{}", ARRAY_GET_SIGNATURE).parse().expect("descriptor"),
                true,
            ))
            .with_method(MethodHolder::native(
                format!("getLength{}", ARRAY_LENGTH_SIGNATURE).parse().expect("descriptor"),
                true,
            ))
    }

    #[test]
    fn test_array_get_boxes_reachable_wrappers() {
        let code = generate_main(
            "\
var %0
var %1
var %2
var %3
var %4
var %5
$0
    %1 := 3
    %2 := newArray I[%1]
    %3 := 0
    %4 := invokeStatic `java.lang.reflect.Array.getImpl(Ljava/lang/Object;I)Ljava/lang/Object;` %2, %3
    %5 := invokeStatic `java.lang.Integer.valueOf(I)Ljava/lang/Integer;` %3
    return
",
            array_class(),
        )
        .expect("generates");
        assert!(code.contains("var $t0 = $2.constructor.$meta.item;"), "{}", code);
        assert!(code.contains("if ($t0 === $rt_intcls()) {"), "{}", code);
        assert!(code.contains("$4 = jl_Integer_valueOf($2.data[$3]);"), "{}", code);
        assert!(code.contains("$4 = $2.data[$3];"), "{}", code);
        // Intrinsics are never emitted as functions
        assert!(!code.contains("function jlr_Array_getImpl"));
    }

    #[test]
    fn test_signature_mismatch_is_reported() {
        let array = ClassHolder::new(ARRAY_CLASS).with_method(MethodHolder::native(
            "getLength(I)I".parse().expect("descriptor"),
            true,
        ));
        let result = generate_main(
            "\
var %0
var %1
var %2
$0
    %1 := 3
    %2 := invokeStatic `java.lang.reflect.Array.getLength(I)I` %1
    return
",
            array,
        );
        assert!(matches!(result, Err(CodegenError::IntrinsicMismatch { .. })), "{:?}", result);
    }

    #[test]
    fn test_registry_matches_by_name() {
        let registry = registry();
        assert_eq!(registry.len(), 4);
        let hash: MethodReference = "java.lang.System.identityHashCode(Ljava/lang/Object;)I"
            .parse()
            .expect("reference");
        assert!(registry.find(&hash).is_some());
        let other: MethodReference = "java.lang.System.nanoTime()J".parse().expect("reference");
        assert!(registry.find(&other).is_none());
    }
}
