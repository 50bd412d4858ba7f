//! Ids, types and operand values of the IR.

/// Index of a function in its [`Module`](super::Module).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

/// Index of a basic block in its [`Function`](super::Function).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Index of an instruction in its function's instruction arena. Ids never move,
/// even when instructions are spliced in front of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Int(u32),
    Float,
    Double,
    Ptr,
}

impl Type {
    pub const I1: Type = Type::Int(1);
    pub const I8: Type = Type::Int(8);
    pub const I32: Type = Type::Int(32);
    pub const I64: Type = Type::Int(64);

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int(_))
    }
}

/// An instruction operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// The result of another instruction in the same function.
    Inst(InstId),
    /// The n-th function parameter.
    Arg(u32),
    ConstInt { ty: Type, value: i64 },
    /// The null pointer.
    Null,
    /// Address of a module-level global.
    Global(String),
    Undef(Type),
}

impl Value {
    pub fn i32(value: i32) -> Self {
        Value::ConstInt {
            ty: Type::I32,
            value: i64::from(value),
        }
    }

    pub fn i64(value: i64) -> Self {
        Value::ConstInt {
            ty: Type::I64,
            value,
        }
    }

    pub fn global(name: impl Into<String>) -> Self {
        Value::Global(name.into())
    }
}

impl From<InstId> for Value {
    fn from(id: InstId) -> Self {
        Value::Inst(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl Signature {
    pub fn new(params: &[Type], ret: Type) -> Self {
        Self {
            params: params.to_vec(),
            ret,
        }
    }
}

/// Target properties the IR depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLayout {
    /// Pointer width in bits, 32 or 64.
    pub pointer_bits: u32,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self { pointer_bits: 64 }
    }
}
