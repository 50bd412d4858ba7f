//! A small, arena-based compiler IR.
//!
//! A [`Module`] owns [`Function`]s. A function owns an instruction arena and the
//! ordered instruction lists of its basic blocks. Every entity is addressed by a
//! stable id ([`FuncId`], [`BlockId`], [`InstId`]), so a pass can collect the
//! sites it wants to rewrite first and splice new instructions in afterwards,
//! without holding iterators across the mutation.

mod display;
mod function;
mod inst;
mod module;
mod types;
mod verify;

pub use function::Function;
pub use inst::{BinOp, InstKind, IntPredicate};
pub use module::Module;
pub use types::{BlockId, DataLayout, FuncId, InstId, Signature, Type, Value};
pub use verify::{verify, verify_function};
