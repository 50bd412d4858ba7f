//! This module applies memory-access instrumentation to WebAssembly (Wasm) modules.
//!
//! Every load and store in the module reports its effective address to the
//! access hooks before it executes. This is achieved by:
//! 1.  Importing the read and write hooks (`env.__libafl_hook_read` and
//!     `env.__libafl_hook_write`, both `(i64) -> ()`), or reusing existing imports.
//! 2.  Injecting small probe functions. A probe takes the operands of an access plus
//!     the static offset of its `memarg`, calls the hook with `zext(addr) + offset`
//!     and hands the operands back unchanged.
//! 3.  Rewriting every function body so each load and store is directly preceded by
//!     `i64.const <offset>` and a call to the matching probe.
//!
//! The embedder provides the hook imports, usually by forwarding them to
//! `memac_runtime`'s access-count map.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use memac_runtime::AccessKind;
use memac_runtime::abi::HOOK_IMPORT_MODULE;
use slog::info;
use wirm::ir::function::FunctionBuilder;
use wirm::ir::id::{FunctionID, LocalID};
use wirm::ir::module::module_functions::FuncKind;
use wirm::ir::types::Instructions;
use wirm::wasmparser::{MemArg, Operator, Validator};
use wirm::{DataType, Module, Opcode};

use crate::config::InstrumentationConfig;

/// The value type a store writes, which decides the write probe's signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum StoredType {
    I32,
    I64,
    F32,
    F64,
    V128,
}

impl StoredType {
    fn data_type(self) -> DataType {
        match self {
            StoredType::I32 => DataType::I32,
            StoredType::I64 => DataType::I64,
            StoredType::F32 => DataType::F32,
            StoredType::F64 => DataType::F64,
            StoredType::V128 => DataType::V128,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Probe {
    Load,
    Store(StoredType),
}

/// Classifies `op` as a memory access the probes understand.
fn memory_access(op: &Operator) -> Option<(Probe, MemArg)> {
    let access = match *op {
        Operator::I32Load { memarg }
        | Operator::I64Load { memarg }
        | Operator::F32Load { memarg }
        | Operator::F64Load { memarg }
        | Operator::I32Load8S { memarg }
        | Operator::I32Load8U { memarg }
        | Operator::I32Load16S { memarg }
        | Operator::I32Load16U { memarg }
        | Operator::I64Load8S { memarg }
        | Operator::I64Load8U { memarg }
        | Operator::I64Load16S { memarg }
        | Operator::I64Load16U { memarg }
        | Operator::I64Load32S { memarg }
        | Operator::I64Load32U { memarg }
        | Operator::V128Load { memarg }
        | Operator::V128Load8x8S { memarg }
        | Operator::V128Load8x8U { memarg }
        | Operator::V128Load16x4S { memarg }
        | Operator::V128Load16x4U { memarg }
        | Operator::V128Load32x2S { memarg }
        | Operator::V128Load32x2U { memarg }
        | Operator::V128Load8Splat { memarg }
        | Operator::V128Load16Splat { memarg }
        | Operator::V128Load32Splat { memarg }
        | Operator::V128Load64Splat { memarg }
        | Operator::V128Load32Zero { memarg }
        | Operator::V128Load64Zero { memarg } => (Probe::Load, memarg),
        Operator::I32Store { memarg }
        | Operator::I32Store8 { memarg }
        | Operator::I32Store16 { memarg } => (Probe::Store(StoredType::I32), memarg),
        Operator::I64Store { memarg }
        | Operator::I64Store8 { memarg }
        | Operator::I64Store16 { memarg }
        | Operator::I64Store32 { memarg } => (Probe::Store(StoredType::I64), memarg),
        Operator::F32Store { memarg } => (Probe::Store(StoredType::F32), memarg),
        Operator::F64Store { memarg } => (Probe::Store(StoredType::F64), memarg),
        Operator::V128Store { memarg } => (Probe::Store(StoredType::V128), memarg),
        _ => return None,
    };
    Some(access)
}

/// Instruments the given Wasm bytes so every load and store calls the access hooks.
///
/// The resulting Wasm is validated before being returned. Only 32-bit memories
/// are supported.
///
/// # Arguments
///
/// * `wasm_bytes` - The raw Wasm module to instrument.
/// * `config` - Logger and hook wiring. Function filters do not apply to Wasm,
///   whose function names are optional.
pub fn instrument_wasm_for_memac(
    wasm_bytes: &[u8],
    config: &InstrumentationConfig,
) -> Result<Vec<u8>> {
    let logger = config.logger();
    let mut module = Module::parse(wasm_bytes, false, false)
        .map_err(|e| anyhow!("Failed to parse module with wirm: {e:?}"))?;

    let (read_hook, write_hook) = ensure_hook_imports(&mut module, config);
    info!(logger, "hook imports ready";
        "read" => read_hook.0, "write" => write_hook.0);

    let probes = inject_probes(&mut module, read_hook, write_hook);
    info!(logger, "injected access probes"; "count" => probes.len());

    let (loads, stores) = instrument_accesses(&mut module, &probes);
    info!(logger, "instrumented memory accesses"; "loads" => loads, "stores" => stores);

    let instrumented_wasm = module.encode();
    validate_wasm(&instrumented_wasm)?;
    info!(logger, "validation of instrumented Wasm successful");

    Ok(instrumented_wasm)
}

/// Ensures the read and write hooks are imported and returns their function ids.
///
/// Existing imports with the hook names are reused as they are. One with the
/// wrong signature makes the final validation fail. When both kinds share one
/// hook symbol, the write hook is the read hook's id.
fn ensure_hook_imports(
    module: &mut Module<'_>,
    config: &InstrumentationConfig,
) -> (FunctionID, FunctionID) {
    let read_symbol = config.hook_symbol(AccessKind::Read);
    let write_symbol = config.hook_symbol(AccessKind::Write);

    let read =
        imported_hook(module, read_symbol).unwrap_or_else(|| import_hook(module, read_symbol));
    if write_symbol == read_symbol {
        return (read, read);
    }
    let write =
        imported_hook(module, write_symbol).unwrap_or_else(|| import_hook(module, write_symbol));
    (read, write)
}

/// Finds an imported function `env.<name>` in the function index space.
///
/// Positions in the import section also count memory, table and global
/// imports, so they are not function ids.
fn imported_hook(module: &Module<'_>, name: &str) -> Option<FunctionID> {
    module
        .functions
        .iter()
        .enumerate()
        .find_map(|(index, function)| match function.kind() {
            FuncKind::Import(imported) => {
                let import = module.imports.get(imported.import_id);
                (import.module == HOOK_IMPORT_MODULE && import.name == name)
                    .then_some(FunctionID(index as u32))
            }
            FuncKind::Local(_) => None,
        })
}

fn import_hook(module: &mut Module<'_>, name: &str) -> FunctionID {
    let type_id = module.types.add_func_type(&[DataType::I64], &[]);
    let (func_index, _) =
        module.add_import_func(HOOK_IMPORT_MODULE.to_string(), name.to_string(), type_id);
    func_index
}

/// Collects the probes the module's accesses need, in a stable order.
fn needed_probes(module: &mut Module<'_>) -> Vec<Probe> {
    let mut needed = Vec::new();
    for function in module.functions.iter_mut() {
        if !matches!(function.kind(), FuncKind::Local(_)) {
            continue;
        }
        let local_function = function.unwrap_local_mut();
        for instruction in local_function.body.instructions.get_ops() {
            if let Some((probe, _)) = memory_access(instruction) {
                if !needed.contains(&probe) {
                    needed.push(probe);
                }
            }
        }
    }
    needed.sort();
    needed
}

/// Creates one probe function per access shape used in the module.
///
/// ```text
///   load probe  (addr i32, offset i64) -> i32
///   store probe (addr i32, value T, offset i64) -> (i32, T)
///
///   hook(i64.extend_i32_u(addr) + offset)
///   return operands unchanged
/// ```
fn inject_probes(
    module: &mut Module<'_>,
    read_hook: FunctionID,
    write_hook: FunctionID,
) -> BTreeMap<Probe, FunctionID> {
    let mut probes = BTreeMap::new();
    for probe in needed_probes(module) {
        let id = match probe {
            Probe::Load => {
                let mut func_builder =
                    FunctionBuilder::new(&[DataType::I32, DataType::I64], &[DataType::I32]);
                func_builder
                    .local_get(LocalID(0))
                    .i64_extend_i32u()
                    .local_get(LocalID(1))
                    .i64_add()
                    .call(read_hook)
                    .local_get(LocalID(0));
                func_builder.finish_module(module)
            }
            Probe::Store(stored) => {
                let value = stored.data_type();
                let mut func_builder = FunctionBuilder::new(
                    &[DataType::I32, value, DataType::I64],
                    &[DataType::I32, value],
                );
                func_builder
                    .local_get(LocalID(0))
                    .i64_extend_i32u()
                    .local_get(LocalID(2))
                    .i64_add()
                    .call(write_hook)
                    .local_get(LocalID(0))
                    .local_get(LocalID(1));
                func_builder.finish_module(module)
            }
        };
        probes.insert(probe, id);
    }
    probes
}

/// Rewrites every local function except the probes so that each access is
/// preceded by `i64.const <offset>; call <probe>`. Returns the number of
/// instrumented loads and stores.
fn instrument_accesses(
    module: &mut Module<'_>,
    probes: &BTreeMap<Probe, FunctionID>,
) -> (usize, usize) {
    let (mut loads, mut stores) = (0, 0);

    for (function_index, function) in module.functions.iter_mut().enumerate() {
        let function_id = FunctionID(function_index as u32);
        if !matches!(function.kind(), FuncKind::Local(_))
            || probes.values().any(|&probe| probe == function_id)
        {
            continue;
        }

        let local_function = function.unwrap_local_mut();
        let mut new_instructions = Vec::with_capacity(local_function.body.num_instructions * 2);

        for instruction in local_function.body.instructions.get_ops() {
            if let Some((probe, memarg)) = memory_access(instruction) {
                match probe {
                    Probe::Load => loads += 1,
                    Probe::Store(_) => stores += 1,
                }
                new_instructions.push(Operator::I64Const {
                    value: memarg.offset as i64,
                });
                new_instructions.push(Operator::Call {
                    function_index: probes[&probe].0,
                });
            }
            new_instructions.push(instruction.clone());
        }
        let new_instructions = new_instructions.into_iter().map(|op| (op, 0)).collect();
        local_function.body.instructions = Instructions::new(new_instructions, 0, false);
    }

    (loads, stores)
}

/// Validates the instrumented Wasm module.
///
/// Uses `wasmparser::Validator` to ensure that the transformations have resulted in a valid Wasm module.
fn validate_wasm(wasm_bytes: &[u8]) -> Result<()> {
    let mut validator = Validator::new();
    validator.validate_all(wasm_bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memarg(offset: u64) -> MemArg {
        MemArg {
            align: 2,
            max_align: 2,
            offset,
            memory: 0,
        }
    }

    #[test]
    fn classifies_loads_and_stores() {
        let m = memarg(16);
        assert_eq!(
            memory_access(&Operator::I32Load { memarg: m }).map(|(p, a)| (p, a.offset)),
            Some((Probe::Load, 16))
        );
        assert_eq!(
            memory_access(&Operator::I64Store32 { memarg: m }).map(|(p, _)| p),
            Some(Probe::Store(StoredType::I64))
        );
        assert_eq!(
            memory_access(&Operator::F64Store { memarg: m }).map(|(p, _)| p),
            Some(Probe::Store(StoredType::F64))
        );
        assert_eq!(memory_access(&Operator::I32Add), None);
        assert_eq!(memory_access(&Operator::Drop), None);
    }
}
