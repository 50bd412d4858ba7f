//! The memory-access instrumentation pass over [`crate::ir`].
//!
//! Every load and store of every instrumented function gets a hook call spliced
//! in right in front of it:
//!
//! ```text
//!   %a = ptrtoint ptr %p to i64
//!   call void @__libafl_hook_read(i64 %a)
//!   %v = load i32, ptr %p
//! ```
//!
//! Declarations and functions rejected by the configured
//! [`FunctionFilter`](crate::filter::FunctionFilter) are left untouched. The pass
//! is not idempotent: running it over its own output instruments the original
//! accesses a second time.

use memac_runtime::AccessKind;
use slog::{debug, info};

use crate::config::InstrumentationConfig;
use crate::error::PassError;
use crate::ir::{self, BlockId, FuncId, Function, InstId, InstKind, Module, Signature, Type, Value};

/// Counters reported by one run of the pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    pub functions_instrumented: usize,
    pub functions_skipped: usize,
    pub loads: usize,
    pub stores: usize,
}

/// A load or store to be preceded by a hook call.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InstrumentationSite {
    block: BlockId,
    /// Position of the access in its block before any splicing.
    position: usize,
    kind: AccessKind,
    address: Value,
}

#[derive(Debug, Clone, Copy)]
struct Hooks {
    read: FuncId,
    write: FuncId,
}

impl Hooks {
    fn for_kind(&self, kind: AccessKind) -> FuncId {
        match kind {
            AccessKind::Read => self.read,
            AccessKind::Write => self.write,
        }
    }
}

pub struct MemAccessPass {
    config: InstrumentationConfig,
}

impl MemAccessPass {
    pub fn new(config: InstrumentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InstrumentationConfig {
        &self.config
    }

    /// Instruments `module` in place and verifies the result.
    ///
    /// A malformed access aborts the run before the function holding it is
    /// touched. Functions instrumented earlier in the run keep their hooks, so
    /// the module must be discarded on error.
    pub fn run(&self, module: &mut Module) -> Result<PassStats, PassError> {
        let logger = self.config.logger();
        let hooks = self.declare_hooks(module)?;
        let mut stats = PassStats::default();

        for id in module.func_ids().collect::<Vec<_>>() {
            let func = module.function_mut(id);
            if func.is_declaration() || self.config.filter().is_ignored(func.name()) {
                debug!(logger, "skipping function"; "name" => func.name());
                stats.functions_skipped += 1;
                continue;
            }

            let sites = collect_sites(func)?;
            for site in &sites {
                match site.kind {
                    AccessKind::Read => stats.loads += 1,
                    AccessKind::Write => stats.stores += 1,
                }
            }
            insert_hook_calls(func, &sites, hooks);
            stats.functions_instrumented += 1;
        }

        ir::verify(module)?;
        info!(logger, "instrumented memory accesses";
            "module" => module.name(),
            "pointer_bits" => module.data_layout().pointer_bits,
            "functions" => stats.functions_instrumented,
            "skipped" => stats.functions_skipped,
            "loads" => stats.loads,
            "stores" => stats.stores
        );
        Ok(stats)
    }

    fn declare_hooks(&self, module: &mut Module) -> Result<Hooks, PassError> {
        let signature = Signature::new(&[Type::I64], Type::Void);
        let read = module
            .get_or_insert_function(self.config.hook_symbol(AccessKind::Read), signature.clone())?;
        let write =
            module.get_or_insert_function(self.config.hook_symbol(AccessKind::Write), signature)?;
        Ok(Hooks { read, write })
    }
}

/// Finds every access of `func` in program order, checking each address operand.
fn collect_sites(func: &Function) -> Result<Vec<InstrumentationSite>, PassError> {
    let mut sites = Vec::new();
    for block in func.blocks() {
        for (position, &id) in func.block(block).iter().enumerate() {
            let Some((kind, address)) = func.inst(id).memory_access() else {
                continue;
            };
            let found = func.type_of(address);
            if !found.is_pointer() {
                return Err(PassError::NotAPointer {
                    function: func.name().to_string(),
                    inst: id,
                    found,
                });
            }
            sites.push(InstrumentationSite {
                block,
                position,
                kind,
                address: address.clone(),
            });
        }
    }
    Ok(sites)
}

/// Splices `ptrtoint` + hook call in front of every site. `sites` must be in
/// program order.
fn insert_hook_calls(func: &mut Function, sites: &[InstrumentationSite], hooks: Hooks) {
    let mut current: Option<BlockId> = None;
    let mut inserted = 0;
    for site in sites {
        if current != Some(site.block) {
            current = Some(site.block);
            inserted = 0;
        }
        let at = site.position + inserted;
        let address: InstId = func.insert_before(
            site.block,
            at,
            InstKind::PtrToInt {
                value: site.address.clone(),
                to: Type::I64,
            },
        );
        func.insert_before(
            site.block,
            at + 1,
            InstKind::Call {
                callee: hooks.for_kind(site.kind),
                ret: Type::Void,
                args: vec![address.into()],
            },
        );
        inserted += 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::NoFilter;
    use crate::ir::DataLayout;
    use assert_matches::assert_matches;
    use memac_runtime::abi::{READ_HOOK_SYMBOL, WRITE_HOOK_SYMBOL};

    /// `void copy(ptr %arg0)`: loads an i32 from %arg0 and stores it back.
    fn load_store_fn(name: &str) -> Function {
        let mut f = Function::new(name, Signature::new(&[Type::Ptr], Type::Void));
        let entry = f.add_block();
        let v = f.append(
            entry,
            InstKind::Load {
                ty: Type::I32,
                ptr: Value::Arg(0),
            },
        );
        f.append(
            entry,
            InstKind::Store {
                value: v.into(),
                ptr: Value::Arg(0),
            },
        );
        f.append(entry, InstKind::Ret { value: None });
        f
    }

    fn callee_name<'m>(module: &'m Module, kind: &InstKind) -> Option<&'m str> {
        match kind {
            InstKind::Call { callee, .. } => Some(module.function(*callee).name()),
            _ => None,
        }
    }

    #[test]
    fn load_then_store_gets_one_hook_each() {
        let mut module = Module::new("m", DataLayout::default());
        let id = module.add_function(load_store_fn("copy")).unwrap();

        let stats = MemAccessPass::new(InstrumentationConfig::new())
            .run(&mut module)
            .unwrap();
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.stores, 1);
        assert_eq!(stats.functions_instrumented, 1);

        let f = module.function(id);
        let body: Vec<&InstKind> = f.block(BlockId(0)).iter().map(|&i| f.inst(i)).collect();
        assert_eq!(body.len(), 7);
        assert_matches!(body[0], InstKind::PtrToInt { value: Value::Arg(0), to: Type::I64 });
        assert_eq!(callee_name(&module, body[1]), Some(READ_HOOK_SYMBOL));
        assert_matches!(body[2], InstKind::Load { .. });
        assert_matches!(body[3], InstKind::PtrToInt { value: Value::Arg(0), to: Type::I64 });
        assert_eq!(callee_name(&module, body[4]), Some(WRITE_HOOK_SYMBOL));
        assert_matches!(body[5], InstKind::Store { .. });
        assert_matches!(body[6], InstKind::Ret { value: None });
    }

    #[test]
    fn hook_receives_the_cast_of_the_access_address() {
        let mut module = Module::new("m", DataLayout::default());
        let mut f = Function::new("f", Signature::new(&[], Type::Void));
        let entry = f.add_block();
        let slot = f.append(entry, InstKind::Alloca { ty: Type::I64 });
        let field = f.append(
            entry,
            InstKind::GetElementPtr {
                base: slot.into(),
                offset: Value::i64(4),
            },
        );
        f.append(
            entry,
            InstKind::Store {
                value: Value::i32(7),
                ptr: field.into(),
            },
        );
        f.append(entry, InstKind::Ret { value: None });
        let id = module.add_function(f).unwrap();

        MemAccessPass::new(InstrumentationConfig::new())
            .run(&mut module)
            .unwrap();

        let f = module.function(id);
        let body = f.block(BlockId(0));
        let InstKind::Call { args, .. } = f.inst(body[3]) else {
            panic!("expected a hook call, found {:?}", f.inst(body[3]));
        };
        let Value::Inst(cast) = &args[0] else {
            panic!("hook argument is not an instruction");
        };
        assert_eq!(*cast, body[2]);
        assert_eq!(
            f.inst(*cast),
            &InstKind::PtrToInt {
                value: field.into(),
                to: Type::I64
            }
        );
    }

    #[test]
    fn every_access_in_every_block_is_preceded_by_a_hook() {
        let mut module = Module::new("m", DataLayout { pointer_bits: 32 });
        let mut f = Function::new("loop", Signature::new(&[Type::Ptr, Type::Ptr], Type::I32));
        let entry = f.add_block();
        let body = f.add_block();
        let exit = f.add_block();
        let a = f.append(
            entry,
            InstKind::Load {
                ty: Type::I32,
                ptr: Value::Arg(0),
            },
        );
        let b = f.append(
            entry,
            InstKind::Load {
                ty: Type::I32,
                ptr: Value::Arg(1),
            },
        );
        let cond = f.append(
            entry,
            InstKind::ICmp {
                pred: crate::ir::IntPredicate::Ult,
                lhs: a.into(),
                rhs: b.into(),
            },
        );
        f.append(
            entry,
            InstKind::CondBr {
                cond: cond.into(),
                then_dest: body,
                else_dest: exit,
            },
        );
        f.append(
            body,
            InstKind::Store {
                value: b.into(),
                ptr: Value::Arg(0),
            },
        );
        f.append(body, InstKind::Br { dest: exit });
        let r = f.append(
            exit,
            InstKind::Load {
                ty: Type::I32,
                ptr: Value::Arg(0),
            },
        );
        f.append(exit, InstKind::Ret { value: Some(r.into()) });
        let original = f.clone();
        let id = module.add_function(f).unwrap();

        let stats = MemAccessPass::new(InstrumentationConfig::new())
            .run(&mut module)
            .unwrap();
        assert_eq!((stats.loads, stats.stores), (3, 1));

        let f = module.function(id);
        for block in f.blocks() {
            let insts = f.block(block);
            for (i, &inst) in insts.iter().enumerate() {
                if let Some((kind, _)) = f.inst(inst).memory_access() {
                    let hook = callee_name(&module, f.inst(insts[i - 1]));
                    assert_eq!(hook, Some(kind.hook_symbol()));
                }
            }
            // original instructions keep their relative order
            let kept: Vec<InstId> = insts
                .iter()
                .copied()
                .filter(|&inst| inst.0 < original.num_insts() as u32)
                .collect();
            assert_eq!(kept, original.block(block));
        }
    }

    #[test]
    fn declarations_and_ignored_functions_are_untouched() {
        let mut module = Module::new("m", DataLayout::default());
        module
            .add_function(Function::new("extern_fn", Signature::new(&[Type::Ptr], Type::Void)))
            .unwrap();
        let asan = module.add_function(load_store_fn("__asan_load4")).unwrap();
        let before = module.function(asan).clone();

        let stats = MemAccessPass::new(InstrumentationConfig::new())
            .run(&mut module)
            .unwrap();

        assert_eq!(module.function(asan), &before);
        assert_eq!(stats.functions_instrumented, 0);
        // extern_fn, __asan_load4 and the two hook declarations
        assert_eq!(stats.functions_skipped, 4);
    }

    #[test]
    fn custom_filter_decides_what_is_skipped() {
        let mut module = Module::new("m", DataLayout::default());
        let kept = module.add_function(load_store_fn("__asan_load4")).unwrap();
        let skipped = module.add_function(load_store_fn("cold_path")).unwrap();
        let before = module.function(skipped).clone();

        let config = InstrumentationConfig::new().with_filter(|name: &str| name.starts_with("cold"));
        MemAccessPass::new(config).run(&mut module).unwrap();

        assert_eq!(module.function(kept).block(BlockId(0)).len(), 7);
        assert_eq!(module.function(skipped), &before);

        let mut module = Module::new("m", DataLayout::default());
        let id = module.add_function(load_store_fn("llvm.memcpy.wrapper")).unwrap();
        MemAccessPass::new(InstrumentationConfig::new().with_filter(NoFilter))
            .run(&mut module)
            .unwrap();
        assert_eq!(module.function(id).block(BlockId(0)).len(), 7);
    }

    #[test]
    fn existing_hook_declarations_are_reused() {
        let mut module = Module::new("m", DataLayout::default());
        let read = module
            .add_function(Function::new(READ_HOOK_SYMBOL, Signature::new(&[Type::I64], Type::Void)))
            .unwrap();
        module.add_function(load_store_fn("copy")).unwrap();

        MemAccessPass::new(InstrumentationConfig::new())
            .run(&mut module)
            .unwrap();

        assert_eq!(module.function_by_name(READ_HOOK_SYMBOL), Some(read));
        assert_eq!(module.num_functions(), 3);
    }

    #[test]
    fn incompatible_hook_declaration_is_fatal() {
        let mut module = Module::new("m", DataLayout::default());
        module
            .add_function(Function::new(WRITE_HOOK_SYMBOL, Signature::new(&[Type::Ptr], Type::Void)))
            .unwrap();
        module.add_function(load_store_fn("copy")).unwrap();

        let result = MemAccessPass::new(InstrumentationConfig::new()).run(&mut module);
        assert_matches!(result, Err(PassError::HookSignatureMismatch { name, .. }) if name == WRITE_HOOK_SYMBOL);
    }

    #[test]
    fn non_pointer_address_is_fatal_and_leaves_function_untouched() {
        let mut module = Module::new("m", DataLayout::default());
        let mut f = Function::new("bad", Signature::new(&[Type::Ptr, Type::I64], Type::Void));
        let entry = f.add_block();
        f.append(
            entry,
            InstKind::Load {
                ty: Type::I8,
                ptr: Value::Arg(0),
            },
        );
        let bad = f.append(
            entry,
            InstKind::Load {
                ty: Type::I8,
                ptr: Value::Arg(1),
            },
        );
        f.append(entry, InstKind::Ret { value: None });
        let before = f.clone();
        let id = module.add_function(f).unwrap();

        let result = MemAccessPass::new(InstrumentationConfig::new()).run(&mut module);
        assert_eq!(
            result,
            Err(PassError::NotAPointer {
                function: "bad".to_string(),
                inst: bad,
                found: Type::I64,
            })
        );
        assert_eq!(module.function(id), &before);
    }

    #[test]
    fn legacy_mode_sends_writes_to_the_read_hook() {
        let mut module = Module::new("m", DataLayout::default());
        let id = module.add_function(load_store_fn("copy")).unwrap();

        MemAccessPass::new(InstrumentationConfig::new().legacy_shared_hook(true))
            .run(&mut module)
            .unwrap();

        assert_eq!(module.function_by_name(WRITE_HOOK_SYMBOL), None);
        let f = module.function(id);
        let body = f.block(BlockId(0));
        assert_eq!(callee_name(&module, f.inst(body[1])), Some(READ_HOOK_SYMBOL));
        assert_eq!(callee_name(&module, f.inst(body[4])), Some(READ_HOOK_SYMBOL));
    }

    #[test]
    fn second_run_instruments_again() {
        let mut module = Module::new("m", DataLayout::default());
        let id = module.add_function(load_store_fn("copy")).unwrap();
        let pass = MemAccessPass::new(InstrumentationConfig::new());

        pass.run(&mut module).unwrap();
        let stats = pass.run(&mut module).unwrap();

        assert_eq!((stats.loads, stats.stores), (1, 1));
        assert_eq!(module.function(id).block(BlockId(0)).len(), 11);
    }
}
