//! Textual rendering of synthesized state machines.
//!
//! ```text
//! machine numbers (enumerator)
//! fields:
//!   #0 state
//!   ...
//! advance(0):
//!   if (self.state == -2) goto L0
//!   try {
//!     switch self.state { -4 => L3 }
//!   ...
//! ```

use std::fmt::{self, Write};

use crate::lowered::{Constant, LExpr, LPlace, LStmt, Receiver, Region};
use crate::machine::{FieldDecl, FieldId, MethodBody, StateMachineType};

/// Renders lowered code, resolving field ids through the owning type.
pub struct Printer<'a> {
    fields: &'a [FieldDecl],
}

impl<'a> Printer<'a> {
    pub fn new(fields: &'a [FieldDecl]) -> Self {
        Self { fields }
    }

    pub fn print_machine(machine: &StateMachineType) -> String {
        let mut out = String::new();
        Printer::new(&machine.fields)
            .write_machine(&mut out, machine)
            .expect("writing to a String cannot fail");
        out
    }

    pub fn print_region(&self, region: &Region) -> String {
        let mut out = String::new();
        self.write_region(&mut out, region, 0)
            .expect("writing to a String cannot fail");
        out
    }

    fn write_machine(&self, out: &mut String, machine: &StateMachineType) -> fmt::Result {
        writeln!(out, "machine {} ({})", machine.name, machine.flavor)?;
        writeln!(out, "fields:")?;
        for field in &machine.fields {
            writeln!(out, "  {} {}", field.id, field.name)?;
        }
        if !machine.states.is_empty() {
            writeln!(out, "states:")?;
            for (state, entry) in machine.states.iter() {
                writeln!(out, "  {} {} @ {}", state, entry.kind, entry.span)?;
            }
        }
        self.write_method(out, "kickoff", &machine.kickoff)?;
        self.write_method(out, "advance", &machine.advance)?;
        self.write_method(out, "current", &machine.current)?;
        self.write_method(out, "request_dispose", &machine.request_dispose)?;
        if let Some(get_enumerator) = &machine.get_enumerator {
            self.write_method(out, "get_enumerator", get_enumerator)?;
        }
        Ok(())
    }

    fn write_method(&self, out: &mut String, name: &str, method: &MethodBody) -> fmt::Result {
        writeln!(out, "{name}({}):", method.arity)?;
        self.write_region(out, &method.body, 1)
    }

    fn write_region(&self, out: &mut String, region: &Region, depth: usize) -> fmt::Result {
        for stmt in &region.stmts {
            self.write_stmt(out, stmt, depth)?;
        }
        Ok(())
    }

    fn write_stmt(&self, out: &mut String, stmt: &LStmt, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match stmt {
            // Labels hang one level out so jump targets stand out.
            LStmt::Label(label) => {
                writeln!(out, "{}{label}:", "  ".repeat(depth.saturating_sub(1)))
            }
            LStmt::Goto(label) => writeln!(out, "{indent}goto {label}"),
            LStmt::GotoIf { cond, target } => {
                writeln!(out, "{indent}if {} goto {target}", self.expr(cond))
            }
            LStmt::Dispatch { on, cases } => {
                let cases = cases
                    .iter()
                    .map(|(state, label)| format!("{state} => {label}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(out, "{indent}switch {} {{ {cases} }}", self.expr(on))
            }
            LStmt::Assign { place, value } => {
                writeln!(out, "{indent}{} = {}", self.place(place), self.expr(value))
            }
            LStmt::Eval(expr) => writeln!(out, "{indent}{}", self.expr(expr)),
            LStmt::Try(region) => {
                writeln!(out, "{indent}try {{")?;
                self.write_region(out, &region.body, depth + 1)?;
                if let Some(catch) = &region.catch {
                    match catch.binding {
                        Some(temp) => writeln!(out, "{indent}}} catch {temp} {{")?,
                        None => writeln!(out, "{indent}}} catch {{")?,
                    }
                    self.write_region(out, &catch.body, depth + 1)?;
                }
                if let Some(finally) = &region.finally {
                    writeln!(out, "{indent}}} finally {{")?;
                    self.write_region(out, finally, depth + 1)?;
                }
                writeln!(out, "{indent}}}")
            }
            LStmt::Throw(expr) => writeln!(out, "{indent}throw {}", self.expr(expr)),
            LStmt::Return(outcome) => writeln!(out, "{indent}return {outcome}"),
            LStmt::ReturnValue(expr) => writeln!(out, "{indent}return {}", self.expr(expr)),
            LStmt::Drive(expr) => writeln!(out, "{indent}drive {}", self.expr(expr)),
            LStmt::Fail(fault) => writeln!(out, "{indent}fail {fault:?}"),
        }
    }

    fn field_name(&self, field: FieldId) -> String {
        self.fields
            .get(field.0 as usize)
            .map(|decl| decl.name.clone())
            .unwrap_or_else(|| field.to_string())
    }

    fn place(&self, place: &LPlace) -> String {
        match place {
            LPlace::Temp(temp) => temp.to_string(),
            LPlace::Field { receiver, field } => self.field_access(*receiver, *field),
        }
    }

    fn field_access(&self, receiver: Receiver, field: FieldId) -> String {
        match receiver {
            Receiver::This => format!("self.{}", self.field_name(field)),
            Receiver::Temp(temp) => format!("{temp}.{}", self.field_name(field)),
        }
    }

    pub fn expr(&self, expr: &LExpr) -> String {
        match expr {
            LExpr::Const(Constant::Null) => "null".to_string(),
            LExpr::Const(Constant::Int(value)) => value.to_string(),
            LExpr::Const(Constant::Bool(value)) => value.to_string(),
            LExpr::Const(Constant::Str(value)) => format!("{value:?}"),
            LExpr::Temp(temp) => temp.to_string(),
            LExpr::Field { receiver, field } => self.field_access(*receiver, *field),
            LExpr::Arg(index) => format!("arg{index}"),
            LExpr::This => "self".to_string(),
            LExpr::NewInstance => "new".to_string(),
            LExpr::Unary { op, operand } => format!("{op}{}", self.expr(operand)),
            LExpr::Binary { op, lhs, rhs } => {
                format!("({} {op} {})", self.expr(lhs), self.expr(rhs))
            }
            LExpr::Call { callee, args } => format!("{callee}({})", self.exprs(args)),
            LExpr::List(items) => format!("[{}]", self.exprs(items)),
            LExpr::Awaiter(operand) => format!("awaiter({})", self.expr(operand)),
            LExpr::IsCompleted(awaiter) => format!("completed({})", self.expr(awaiter)),
            LExpr::AwaitResult(awaiter) => format!("result({})", self.expr(awaiter)),
            LExpr::LinkTokens(first, second) => {
                format!("link({}, {})", self.expr(first), self.expr(second))
            }
            LExpr::SourceToken(source) => format!("token({})", self.expr(source)),
            LExpr::DisposeSource(source) => format!("dispose({})", self.expr(source)),
        }
    }

    fn exprs(&self, exprs: &[LExpr]) -> String {
        exprs
            .iter()
            .map(|expr| self.expr(expr))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for StateMachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Printer::print_machine(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bound::BinaryOp;
    use crate::lowered::{CatchRegion, LabelId, TempId, TryRegion};
    use crate::machine::FieldKind;
    use insta::assert_snapshot;

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl {
                id: FieldId(0),
                name: "state".to_string(),
                kind: FieldKind::State,
            },
            FieldDecl {
                id: FieldId(1),
                name: "dispose_mode".to_string(),
                kind: FieldKind::DisposeMode,
            },
        ]
    }

    #[test]
    fn test_print_nested_try() {
        let fields = fields();
        let region = Region::new(vec![
            LStmt::Label(LabelId(0)),
            LStmt::Try(Box::new(TryRegion {
                body: Region::new(vec![
                    LStmt::goto_if(LExpr::this_field(FieldId(1)), LabelId(1)),
                    LStmt::Throw(LExpr::Const(Constant::Str("boom".to_string()))),
                ]),
                catch: Some(CatchRegion {
                    binding: Some(TempId(0)),
                    body: Region::new(vec![LStmt::assign(
                        LPlace::this_field(FieldId(0)),
                        LExpr::binary(BinaryOp::Sub, LExpr::int(0), LExpr::int(2)),
                    )]),
                }),
                finally: None,
            })),
            LStmt::Label(LabelId(1)),
            LStmt::Fail(crate::lowered::RuntimeFault::RemovedState),
        ]);

        assert_snapshot!(Printer::new(&fields).print_region(&region), @r#"
        L0:
        try {
          if self.dispose_mode goto L1
          throw "boom"
        } catch t0 {
          self.state = (0 - 2)
        }
        L1:
        fail RemovedState
        "#);
    }
}
