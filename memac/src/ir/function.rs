use super::inst::InstKind;
use super::types::{BlockId, InstId, Signature, Type, Value};

/// A function: a signature plus, for definitions, an instruction arena and the
/// basic blocks laid out in program order.
///
/// Instructions live in the arena and blocks only hold ordered lists of
/// [`InstId`]s. Inserting an instruction is a splice into one of those lists and
/// never renumbers existing instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    name: String,
    signature: Signature,
    insts: Vec<InstKind>,
    blocks: Vec<Vec<InstId>>,
}

impl Function {
    /// A function without a body. Add blocks to turn it into a definition.
    pub fn new(name: impl Into<String>, signature: Signature) -> Self {
        Self {
            name: name.into(),
            signature,
            insts: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn add_block(&mut self) -> BlockId {
        self.blocks.push(Vec::new());
        BlockId(self.blocks.len() as u32 - 1)
    }

    pub fn blocks(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    pub fn has_block(&self, block: BlockId) -> bool {
        (block.0 as usize) < self.blocks.len()
    }

    /// The instructions of `block`, in order.
    ///
    /// # Panics
    ///
    /// Panics if `block` does not belong to this function.
    pub fn block(&self, block: BlockId) -> &[InstId] {
        &self.blocks[block.0 as usize]
    }

    pub fn inst(&self, id: InstId) -> &InstKind {
        &self.insts[id.0 as usize]
    }

    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    /// Every placed instruction in layout order, with its block.
    pub fn instructions(&self) -> impl Iterator<Item = (BlockId, InstId, &InstKind)> {
        self.blocks.iter().enumerate().flat_map(move |(b, ids)| {
            ids.iter()
                .map(move |&id| (BlockId(b as u32), id, &self.insts[id.0 as usize]))
        })
    }

    fn alloc(&mut self, kind: InstKind) -> InstId {
        self.insts.push(kind);
        InstId(self.insts.len() as u32 - 1)
    }

    /// Appends `kind` at the end of `block`.
    pub fn append(&mut self, block: BlockId, kind: InstKind) -> InstId {
        let id = self.alloc(kind);
        self.blocks[block.0 as usize].push(id);
        id
    }

    /// Splices `kind` into `block` so that it ends up at `position`, in front of
    /// whatever instruction was there.
    ///
    /// # Panics
    ///
    /// Panics if `position` is past the end of the block.
    pub fn insert_before(&mut self, block: BlockId, position: usize, kind: InstKind) -> InstId {
        let id = self.alloc(kind);
        self.blocks[block.0 as usize].insert(position, id);
        id
    }

    /// Type of the value an instruction produces, `Void` for none.
    pub fn result_type(&self, id: InstId) -> Type {
        match self.inst(id) {
            InstKind::Alloca { .. } | InstKind::GetElementPtr { .. } => Type::Ptr,
            InstKind::Load { ty, .. } => *ty,
            InstKind::Call { ret, .. } => *ret,
            InstKind::PtrToInt { to, .. } => *to,
            InstKind::BinOp { lhs, .. } => self.type_of(lhs),
            InstKind::ICmp { .. } => Type::I1,
            InstKind::Store { .. }
            | InstKind::Br { .. }
            | InstKind::CondBr { .. }
            | InstKind::Ret { .. }
            | InstKind::Unreachable => Type::Void,
        }
    }

    pub fn type_of(&self, value: &Value) -> Type {
        match value {
            Value::Inst(id) => self.result_type(*id),
            Value::Arg(n) => self
                .signature
                .params
                .get(*n as usize)
                .copied()
                .unwrap_or(Type::Void),
            Value::ConstInt { ty, .. } | Value::Undef(ty) => *ty,
            Value::Null | Value::Global(_) => Type::Ptr,
        }
    }
}
