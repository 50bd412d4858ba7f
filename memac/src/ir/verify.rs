//! Structural checks run over every module the pass hands back.

use std::collections::HashMap;

use super::function::Function;
use super::inst::InstKind;
use super::module::Module;
use super::types::{BlockId, InstId, Type, Value};
use crate::error::PassError;

/// Checks every defined function of `module`.
pub fn verify(module: &Module) -> Result<(), PassError> {
    for (_, func) in module.functions() {
        verify_function(module, func)?;
    }
    Ok(())
}

pub fn verify_function(module: &Module, func: &Function) -> Result<(), PassError> {
    let fail = |reason: String| PassError::Verification {
        function: func.name().to_string(),
        reason,
    };

    let mut placement: HashMap<InstId, (BlockId, usize)> = HashMap::new();
    for (block, id, _) in func.instructions() {
        let position = placement.len();
        if placement.insert(id, (block, position)).is_some() {
            return Err(fail(format!("{id} is placed more than once")));
        }
    }

    for block in func.blocks() {
        let insts = func.block(block);
        let Some((&last, body)) = insts.split_last() else {
            return Err(fail(format!("{block} is empty")));
        };
        if !func.inst(last).is_terminator() {
            return Err(fail(format!("{block} does not end with a terminator")));
        }
        if let Some(id) = body.iter().find(|&&id| func.inst(id).is_terminator()) {
            return Err(fail(format!("terminator {id} in the middle of {block}")));
        }
    }

    for (block, id, kind) in func.instructions() {
        let (_, use_position) = placement[&id];
        for operand in kind.operands() {
            match operand {
                Value::Inst(def) => {
                    let Some(&(def_block, def_position)) = placement.get(def) else {
                        return Err(fail(format!("{id} uses {def}, which is not placed")));
                    };
                    if def_block == block && def_position >= use_position {
                        return Err(fail(format!("{id} uses {def} before its definition")));
                    }
                    if func.result_type(*def) == Type::Void {
                        return Err(fail(format!("{id} uses {def}, which has no value")));
                    }
                }
                Value::Arg(n) if *n as usize >= func.signature().params.len() => {
                    return Err(fail(format!("{id} uses missing argument {n}")));
                }
                _ => {}
            }
        }
        for dest in kind.successors() {
            if !func.has_block(dest) {
                return Err(fail(format!("{id} branches to missing {dest}")));
            }
        }
        check_types(module, func, id, kind).map_err(fail)?;
    }
    Ok(())
}

fn check_types(module: &Module, func: &Function, id: InstId, kind: &InstKind) -> Result<(), String> {
    match kind {
        InstKind::Load { ptr, .. } | InstKind::Store { ptr, .. } => {
            if !func.type_of(ptr).is_pointer() {
                return Err(format!("{id} accesses memory through a non-pointer"));
            }
        }
        InstKind::PtrToInt { value, to } => {
            if !func.type_of(value).is_pointer() || !to.is_integer() {
                return Err(format!("{id} is not a pointer to integer conversion"));
            }
            let pointer_bits = module.data_layout().pointer_bits;
            if let Type::Int(bits) = to {
                if *bits < pointer_bits {
                    return Err(format!("{id} truncates a {pointer_bits}-bit pointer to {to}"));
                }
            }
        }
        InstKind::Call { callee, ret, args } => {
            let Some(target) = module.get_function(*callee) else {
                return Err(format!("{id} calls a function outside the module"));
            };
            let sig = target.signature();
            let arg_types: Vec<Type> = args.iter().map(|arg| func.type_of(arg)).collect();
            if sig.params != arg_types || sig.ret != *ret {
                return Err(format!(
                    "{id} calls @{} ({sig}) with mismatched types",
                    target.name()
                ));
            }
        }
        InstKind::Ret { value } => {
            let found = value.as_ref().map_or(Type::Void, |v| func.type_of(v));
            if found != func.signature().ret {
                return Err(format!("{id} returns {found}"));
            }
        }
        _ => {}
    }
    Ok(())
}
