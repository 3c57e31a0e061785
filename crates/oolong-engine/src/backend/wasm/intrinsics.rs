//! Intrinsic generators for the WebAssembly backend
//!
//! Reflective array access reads the item class out of the array's class struct and
//! dispatches on its primitive tag with a `br_table`.

use super::layout::{
    array_data_offset, memory_type, ARRAY_LENGTH_OFFSET, CLASS_FLAGS_OFFSET, CLASS_ITEM_OFFSET, CLASS_OFFSET,
    FLAG_PRIMITIVE, HASH_OFFSET, PRIMITIVE_MASK, PRIMITIVE_SHIFT,
};
use super::model::{IntBinaryOp, IntType, IntUnaryOp, LabelId, MemoryType, WasmExpression, WasmType};
use super::{function_name, WasmIntrinsic, WasmMethodContext, HASH_COUNTER_GLOBAL};
use crate::backend::common::{
    IntrinsicCall, IntrinsicRegistry, MethodMatcher, PrimitiveInfo, ARRAY_CLASS, ARRAY_GET_SIGNATURE,
    ARRAY_LENGTH_SIGNATURE, ARRAY_SET_SIGNATURE, IDENTITY_HASH_CODE_SIGNATURE, MAX_PRIMITIVE_TAG, SYSTEM_CLASS,
};
use crate::error::CodegenError;
use crate::ir::VariableId;

pub(super) fn registry() -> IntrinsicRegistry<WasmIntrinsic> {
    let mut registry: IntrinsicRegistry<WasmIntrinsic> = IntrinsicRegistry::new();
    registry
        .register(MethodMatcher::named(ARRAY_CLASS, "getImpl"), array_get)
        .register(MethodMatcher::named(ARRAY_CLASS, "setImpl"), array_set)
        .register(MethodMatcher::named(ARRAY_CLASS, "getLength"), array_length)
        .register(MethodMatcher::named(SYSTEM_CLASS, "identityHashCode"), identity_hash_code);
    registry
}

/// `base + (index << shift)`
fn element_address(context: &WasmMethodContext<'_, '_>, array: VariableId, index: VariableId, shift: u32) -> WasmExpression {
    let index = match shift {
        0 => context.get(index),
        _ => WasmExpression::int(IntBinaryOp::Shl, context.get(index), WasmExpression::I32Const(shift as i32)),
    };
    WasmExpression::int(IntBinaryOp::Add, context.get(array), index)
}

/// Loads the item class flags of `array` into a fresh local
fn item_flags(context: &mut WasmMethodContext<'_, '_>, array: VariableId) -> u32 {
    let flags = context.temp(WasmType::I32);
    let class = WasmExpression::load(MemoryType::Int32, CLASS_OFFSET, context.get(array));
    let item = WasmExpression::load(MemoryType::Int32, CLASS_ITEM_OFFSET, class);
    context.emit(WasmExpression::set_local(
        flags,
        WasmExpression::load(MemoryType::Int32, CLASS_FLAGS_OFFSET, item),
    ));
    flags
}

/// Code for each primitive tag, dispatched on the tag held in `flags`:
///
/// ```text
/// block $done
///   block $t7 ... block $t0
///     br_table $t0 .. $t7 $done
///   end
///   ;; tag 0
///   br $done
///   ...
/// end
/// ```
fn dispatch_on_tag(
    context: &mut WasmMethodContext<'_, '_>,
    flags: u32,
    mut arm: impl FnMut(&mut WasmMethodContext<'_, '_>, &PrimitiveInfo) -> Vec<WasmExpression>,
) -> WasmExpression {
    let done = context.label();
    let labels: Vec<LabelId> = (0..=MAX_PRIMITIVE_TAG).map(|_| context.label()).collect();
    let tag = WasmExpression::int(
        IntBinaryOp::And,
        WasmExpression::int(
            IntBinaryOp::ShrUnsigned,
            WasmExpression::get_local(flags),
            WasmExpression::I32Const(PRIMITIVE_SHIFT as i32),
        ),
        WasmExpression::I32Const(PRIMITIVE_MASK as i32),
    );
    let mut nested = vec![WasmExpression::Switch {
        selector: Box::new(tag),
        targets: labels.clone(),
        default: done,
    }];
    for (tag, label) in labels.into_iter().enumerate() {
        nested = vec![WasmExpression::block(label, nested)];
        match PrimitiveInfo::by_tag(tag as u32) {
            Some(info) => nested.extend(arm(context, info)),
            None => nested.push(WasmExpression::Unreachable),
        }
        nested.push(WasmExpression::branch(done));
    }
    WasmExpression::block(done, nested)
}

fn is_primitive(flags: u32) -> WasmExpression {
    WasmExpression::int(
        IntBinaryOp::And,
        WasmExpression::get_local(flags),
        WasmExpression::I32Const(FLAG_PRIMITIVE as i32),
    )
}

/// Read an element, boxing primitives through the wrapper's `valueOf` when it is reachable
fn array_get(context: &mut WasmMethodContext<'_, '_>, call: &IntrinsicCall<'_>) -> Result<(), CodegenError> {
    call.expect_signature(ARRAY_GET_SIGNATURE)?;
    call.expect_arity(2)?;
    let (array, index) = (call.argument(0), call.argument(1));
    let Some(receiver) = call.receiver else {
        return Ok(());
    };
    let target = context.local(receiver);
    let flags = item_flags(context, array);

    let primitive = dispatch_on_tag(context, flags, |context, info| {
        let boxing = info.box_method();
        if !context.is_reachable(&boxing) {
            return vec![WasmExpression::Unreachable];
        }
        let value = WasmExpression::load(
            memory_type(&info.value_type()),
            array_data_offset(info.width),
            element_address(context, array, index, info.shift),
        );
        vec![WasmExpression::set_local(
            target,
            WasmExpression::call(function_name(&boxing), vec![value]),
        )]
    });
    let reference = WasmExpression::set_local(
        target,
        WasmExpression::load(MemoryType::Int32, array_data_offset(4), element_address(context, array, index, 2)),
    );
    context.emit(WasmExpression::Conditional {
        condition: Box::new(is_primitive(flags)),
        result: None,
        then_branch: vec![primitive],
        else_branch: vec![reference],
    });
    Ok(())
}

/// Store an element, unboxing into primitive arrays
fn array_set(context: &mut WasmMethodContext<'_, '_>, call: &IntrinsicCall<'_>) -> Result<(), CodegenError> {
    call.expect_signature(ARRAY_SET_SIGNATURE)?;
    call.expect_arity(3)?;
    let (array, index, value) = (call.argument(0), call.argument(1), call.argument(2));
    let flags = item_flags(context, array);

    let primitive = dispatch_on_tag(context, flags, |context, info| {
        let unboxing = info.unbox_method();
        if !context.is_reachable(&unboxing) {
            return vec![WasmExpression::Unreachable];
        }
        let unboxed = WasmExpression::call(function_name(&unboxing), vec![context.get(value)]);
        vec![WasmExpression::store(
            memory_type(&info.value_type()),
            array_data_offset(info.width),
            element_address(context, array, index, info.shift),
            unboxed,
        )]
    });
    let reference = WasmExpression::store(
        MemoryType::Int32,
        array_data_offset(4),
        element_address(context, array, index, 2),
        context.get(value),
    );
    context.emit(WasmExpression::Conditional {
        condition: Box::new(is_primitive(flags)),
        result: None,
        then_branch: vec![primitive],
        else_branch: vec![reference],
    });
    Ok(())
}

fn array_length(context: &mut WasmMethodContext<'_, '_>, call: &IntrinsicCall<'_>) -> Result<(), CodegenError> {
    call.expect_signature(ARRAY_LENGTH_SIGNATURE)?;
    call.expect_arity(1)?;
    if let Some(receiver) = call.receiver {
        let length = WasmExpression::load(MemoryType::Int32, ARRAY_LENGTH_OFFSET, context.get(call.argument(0)));
        context.assign(receiver, length);
    }
    Ok(())
}

/// Hash stored in the object header, drawn from a counter on first request
fn identity_hash_code(context: &mut WasmMethodContext<'_, '_>, call: &IntrinsicCall<'_>) -> Result<(), CodegenError> {
    call.expect_signature(IDENTITY_HASH_CODE_SIGNATURE)?;
    call.expect_arity(1)?;
    let object = call.argument(0);
    let hash = context.temp(WasmType::I32);
    context.emit(WasmExpression::set_local(
        hash,
        WasmExpression::load(MemoryType::Int32, HASH_OFFSET, context.get(object)),
    ));
    let missing = WasmExpression::IntUnary {
        op: IntUnaryOp::Eqz,
        ty: IntType::I32,
        operand: Box::new(WasmExpression::get_local(hash)),
    };
    let next = WasmExpression::int(
        IntBinaryOp::Add,
        WasmExpression::GetGlobal(HASH_COUNTER_GLOBAL.into()),
        WasmExpression::I32Const(1),
    );
    let assign = vec![
        WasmExpression::SetGlobal(HASH_COUNTER_GLOBAL.into(), Box::new(next)),
        WasmExpression::set_local(hash, WasmExpression::GetGlobal(HASH_COUNTER_GLOBAL.into())),
        WasmExpression::store(
            MemoryType::Int32,
            HASH_OFFSET,
            context.get(object),
            WasmExpression::get_local(hash),
        ),
    ];
    context.emit(WasmExpression::when(missing, assign));
    if let Some(receiver) = call.receiver {
        context.assign(receiver, WasmExpression::get_local(hash));
    }
    Ok(())
}
