//! LLVM-flavoured textual form of the IR, for logs and test failures.

use std::fmt::{self, Display, Formatter};

use super::function::Function;
use super::inst::{BinOp, InstKind, IntPredicate};
use super::module::Module;
use super::types::{BlockId, InstId, Signature, Type, Value};

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Float => write!(f, "float"),
            Type::Double => write!(f, "double"),
            Type::Ptr => write!(f, "ptr"),
        }
    }
}

impl Display for InstId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Inst(id) => write!(f, "{id}"),
            Value::Arg(n) => write!(f, "%arg{n}"),
            Value::ConstInt { value, .. } => write!(f, "{value}"),
            Value::Null => write!(f, "null"),
            Value::Global(name) => write!(f, "@{name}"),
            Value::Undef(_) => write!(f, "undef"),
        }
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
        };
        f.write_str(name)
    }
}

impl Display for IntPredicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::Ult => "ult",
            IntPredicate::Ule => "ule",
            IntPredicate::Slt => "slt",
            IntPredicate::Sle => "sle",
        };
        f.write_str(name)
    }
}

struct Typed<'a>(&'a Function, &'a Value);

impl Display for Typed<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0.type_of(self.1), self.1)
    }
}

fn write_inst(f: &mut Formatter<'_>, module: &Module, func: &Function, id: InstId) -> fmt::Result {
    let kind = func.inst(id);
    if func.result_type(id) != Type::Void {
        write!(f, "{id} = ")?;
    }
    match kind {
        InstKind::Alloca { ty } => write!(f, "alloca {ty}"),
        InstKind::Load { ty, ptr } => write!(f, "load {ty}, {}", Typed(func, ptr)),
        InstKind::Store { value, ptr } => {
            write!(f, "store {}, {}", Typed(func, value), Typed(func, ptr))
        }
        InstKind::Call { callee, ret, args } => {
            let name = module
                .get_function(*callee)
                .map_or("<unknown>", |callee| callee.name());
            write!(f, "call {ret} @{name}(")?;
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", Typed(func, arg))?;
            }
            write!(f, ")")
        }
        InstKind::PtrToInt { value, to } => write!(f, "ptrtoint {} to {to}", Typed(func, value)),
        InstKind::BinOp { op, lhs, rhs } => write!(f, "{op} {}, {rhs}", Typed(func, lhs)),
        InstKind::ICmp { pred, lhs, rhs } => {
            write!(f, "icmp {pred} {}, {rhs}", Typed(func, lhs))
        }
        InstKind::GetElementPtr { base, offset } => write!(
            f,
            "getelementptr i8, {}, {}",
            Typed(func, base),
            Typed(func, offset)
        ),
        InstKind::Br { dest } => write!(f, "br label %{dest}"),
        InstKind::CondBr {
            cond,
            then_dest,
            else_dest,
        } => write!(
            f,
            "br {}, label %{then_dest}, label %{else_dest}",
            Typed(func, cond)
        ),
        InstKind::Ret { value: Some(value) } => write!(f, "ret {}", Typed(func, value)),
        InstKind::Ret { value: None } => write!(f, "ret void"),
        InstKind::Unreachable => write!(f, "unreachable"),
    }
}

fn write_function(f: &mut Formatter<'_>, module: &Module, func: &Function) -> fmt::Result {
    let sig = func.signature();
    let keyword = if func.is_declaration() {
        "declare"
    } else {
        "define"
    };
    write!(f, "{keyword} {} @{}(", sig.ret, func.name())?;
    for (i, param) in sig.params.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        if func.is_declaration() {
            write!(f, "{param}")?;
        } else {
            write!(f, "{param} %arg{i}")?;
        }
    }
    write!(f, ")")?;
    if func.is_declaration() {
        return writeln!(f);
    }
    writeln!(f, " {{")?;
    for block in func.blocks() {
        writeln!(f, "{block}:")?;
        for &id in func.block(block) {
            write!(f, "  ")?;
            write_inst(f, module, func, id)?;
            writeln!(f)?;
        }
    }
    writeln!(f, "}}")
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name())?;
        let bits = self.data_layout().pointer_bits;
        writeln!(f, "target datalayout = \"p:{bits}:{bits}\"")?;
        for (_, func) in self.functions() {
            writeln!(f)?;
            write_function(f, self, func)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{DataLayout, Function, InstKind, Module, Signature, Type, Value};

    #[test]
    fn prints_declarations_and_bodies() {
        let mut module = Module::new("demo", DataLayout { pointer_bits: 32 });
        let hook = module
            .get_or_insert_function("hook", Signature::new(&[Type::I64], Type::Void))
            .unwrap();
        let mut f = Function::new("f", Signature::new(&[Type::Ptr], Type::I32));
        let entry = f.add_block();
        let cast = f.append(
            entry,
            InstKind::PtrToInt {
                value: Value::Arg(0),
                to: Type::I64,
            },
        );
        f.append(
            entry,
            InstKind::Call {
                callee: hook,
                ret: Type::Void,
                args: vec![cast.into()],
            },
        );
        let load = f.append(
            entry,
            InstKind::Load {
                ty: Type::I32,
                ptr: Value::Arg(0),
            },
        );
        f.append(
            entry,
            InstKind::Ret {
                value: Some(load.into()),
            },
        );
        module.add_function(f).unwrap();

        let text = module.to_string();
        let expected = "; ModuleID = 'demo'
target datalayout = \"p:32:32\"

declare void @hook(i64)

define i32 @f(ptr %arg0) {
bb0:
  %0 = ptrtoint ptr %arg0 to i64
  call void @hook(i64 %0)
  %2 = load i32, ptr %arg0
  ret i32 %2
}
";
        assert_eq!(text, expected);
    }
}
