//! Compile-time half of the memory-access ("memac") instrumentation.
//!
//! The pass rewrites a program so that every memory load and store first calls a
//! hook with the accessed address. At run time the hooks, provided by
//! `memac_runtime`, count accesses per address bucket in a shared map that a
//! fuzzer uses as feedback next to classic edge coverage.
//!
//! Two front ends share one [`InstrumentationConfig`]:
//!
//! - [`pass::MemAccessPass`] works on the arena-based compiler IR in [`ir`].
//! - [`instrumentation::instrument_wasm_for_memac`] rewrites real Wasm modules.
//!
//! ```
//! use memac::ir::{DataLayout, Function, InstKind, Module, Signature, Type, Value};
//! use memac::{InstrumentationConfig, MemAccessPass};
//!
//! let mut module = Module::new("demo", DataLayout::default());
//! let mut f = Function::new("get", Signature::new(&[Type::Ptr], Type::I32));
//! let entry = f.add_block();
//! let v = f.append(entry, InstKind::Load { ty: Type::I32, ptr: Value::Arg(0) });
//! f.append(entry, InstKind::Ret { value: Some(v.into()) });
//! module.add_function(f).unwrap();
//!
//! let stats = MemAccessPass::new(InstrumentationConfig::new())
//!     .run(&mut module)
//!     .unwrap();
//! assert_eq!(stats.loads, 1);
//! println!("{module}");
//! ```
pub mod filter;
pub mod instrumentation;
pub mod ir;
pub mod pass;

mod config;
mod error;

pub use config::InstrumentationConfig;
pub use error::PassError;
pub use instrumentation::instrument_wasm_for_memac;
pub use pass::{MemAccessPass, PassStats};

// re-export the runtime ABI the instrumented code links against
pub use memac_runtime::abi;
