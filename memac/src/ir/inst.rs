use memac_runtime::AccessKind;

use super::types::{BlockId, FuncId, Type, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    LShr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntPredicate {
    Eq,
    Ne,
    Ult,
    Ule,
    Slt,
    Sle,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstKind {
    Alloca {
        ty: Type,
    },
    Load {
        ty: Type,
        ptr: Value,
    },
    Store {
        value: Value,
        ptr: Value,
    },
    /// `ret` repeats the callee's return type so a function can type its own
    /// values without looking at the module.
    Call {
        callee: FuncId,
        ret: Type,
        args: Vec<Value>,
    },
    PtrToInt {
        value: Value,
        to: Type,
    },
    BinOp {
        op: BinOp,
        lhs: Value,
        rhs: Value,
    },
    ICmp {
        pred: IntPredicate,
        lhs: Value,
        rhs: Value,
    },
    /// Byte-offset pointer arithmetic.
    GetElementPtr {
        base: Value,
        offset: Value,
    },
    Br {
        dest: BlockId,
    },
    CondBr {
        cond: Value,
        then_dest: BlockId,
        else_dest: BlockId,
    },
    Ret {
        value: Option<Value>,
    },
    Unreachable,
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::Ret { .. }
                | InstKind::Unreachable
        )
    }

    /// The memory access this instruction performs and its address operand.
    pub fn memory_access(&self) -> Option<(AccessKind, &Value)> {
        match self {
            InstKind::Load { ptr, .. } => Some((AccessKind::Read, ptr)),
            InstKind::Store { ptr, .. } => Some((AccessKind::Write, ptr)),
            _ => None,
        }
    }

    pub fn operands(&self) -> Vec<&Value> {
        match self {
            InstKind::Alloca { .. } | InstKind::Br { .. } | InstKind::Unreachable => vec![],
            InstKind::Load { ptr, .. } => vec![ptr],
            InstKind::Store { value, ptr } => vec![value, ptr],
            InstKind::Call { args, .. } => args.iter().collect(),
            InstKind::PtrToInt { value, .. } => vec![value],
            InstKind::BinOp { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::GetElementPtr { base, offset } => vec![base, offset],
            InstKind::CondBr { cond, .. } => vec![cond],
            InstKind::Ret { value } => value.iter().collect(),
        }
    }

    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            InstKind::Br { dest } => vec![*dest],
            InstKind::CondBr {
                then_dest,
                else_dest,
                ..
            } => vec![*then_dest, *else_dest],
            _ => vec![],
        }
    }
}
