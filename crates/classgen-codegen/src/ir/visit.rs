//! Field reference traversal
//!
//! Visits field accesses in occurrence order: subexpressions left to right,
//! an access's target before the access itself, and an assignment's target
//! before its value. The callback receives `true` for store sites.

use super::expr::{CallTarget, Expr};
use super::stmt::Stmt;

pub fn visit_field_refs<F, E>(stmts: &mut [Stmt], f: &mut F) -> Result<(), E>
where
    F: FnMut(&mut Expr, bool) -> Result<(), E>,
{
    for stmt in stmts {
        visit_stmt(stmt, f)?;
    }
    Ok(())
}

fn visit_stmt<F, E>(stmt: &mut Stmt, f: &mut F) -> Result<(), E>
where
    F: FnMut(&mut Expr, bool) -> Result<(), E>,
{
    match stmt {
        Stmt::Expr(e) | Stmt::Throw(e) => visit_expr(e, f),
        Stmt::Return(value) => match value {
            Some(e) => visit_expr(e, f),
            None => Ok(()),
        },
        Stmt::Define { value, .. } => visit_expr(value, f),
        Stmt::Assign { target, value } => {
            if let Expr::Field { target: inner, .. } = target {
                visit_expr(inner, f)?;
            }
            if is_field_ref(target) {
                f(target, true)?;
            }
            visit_expr(value, f)
        }
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => {
            visit_expr(cond, f)?;
            visit_field_refs(then_branch, f)?;
            visit_field_refs(else_branch, f)
        }
        Stmt::TryCatch { body, catches } => {
            visit_field_refs(body, f)?;
            for clause in catches {
                visit_field_refs(&mut clause.body, f)?;
            }
            Ok(())
        }
        Stmt::Block(stmts) => visit_field_refs(stmts, f),
    }
}

fn visit_expr<F, E>(expr: &mut Expr, f: &mut F) -> Result<(), E>
where
    F: FnMut(&mut Expr, bool) -> Result<(), E>,
{
    match expr {
        Expr::Field { target, .. } => visit_expr(target, f)?,
        Expr::Call { target, args, .. } => {
            if let CallTarget::Instance(receiver) = target {
                visit_expr(receiver, f)?;
            }
            for arg in args {
                visit_expr(arg, f)?;
            }
        }
        Expr::New { args, .. } => {
            for arg in args {
                visit_expr(arg, f)?;
            }
        }
        Expr::Binary { lhs, rhs, .. } => {
            visit_expr(lhs, f)?;
            visit_expr(rhs, f)?;
        }
        Expr::Not(operand) => visit_expr(operand, f)?,
        Expr::Constant { .. } | Expr::Var(_) | Expr::StaticField { .. } | Expr::This => {}
    }
    if is_field_ref(expr) {
        f(expr, false)?;
    }
    Ok(())
}

fn is_field_ref(expr: &Expr) -> bool {
    matches!(expr, Expr::Field { .. } | Expr::StaticField { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRef;

    fn describe(expr: &Expr) -> String {
        match expr {
            Expr::Field { name, .. } => name.clone(),
            Expr::StaticField { name, .. } => format!("static {}", name),
            _ => "?".to_string(),
        }
    }

    #[test]
    fn test_occurrence_order() {
        // this.a.b = this.c + Flow.d; this.trace(this.e)
        let mut body = vec![
            Stmt::Assign {
                target: Expr::field(Expr::field(Expr::This, "a"), "b"),
                value: Expr::binary(
                    crate::ir::BinaryOp::Add,
                    Expr::field(Expr::This, "c"),
                    Expr::static_field(TypeRef::named_unchecked("demo.Flow"), "d"),
                ),
            },
            Stmt::Expr(Expr::call(
                Expr::This,
                "trace",
                vec![Expr::field(Expr::This, "e")],
            )),
        ];

        let mut seen = Vec::new();
        visit_field_refs(&mut body, &mut |expr: &mut Expr, store: bool| {
            seen.push((describe(expr), store));
            Ok::<(), ()>(())
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![
                ("a".to_string(), false),
                ("b".to_string(), true),
                ("c".to_string(), false),
                ("static d".to_string(), false),
                ("e".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_replaced_node_not_rescanned() {
        let mut body = vec![Stmt::Expr(Expr::call(
            Expr::This,
            "trace",
            vec![Expr::field(Expr::This, "x")],
        ))];

        let mut visits = 0;
        visit_field_refs(&mut body, &mut |expr: &mut Expr, _store: bool| {
            visits += 1;
            *expr = Expr::field(Expr::field(Expr::This, "inner"), "outer");
            Ok::<(), ()>(())
        })
        .unwrap();

        assert_eq!(visits, 1);
    }

    #[test]
    fn test_error_stops_traversal() {
        let mut body = vec![
            Stmt::Expr(Expr::call(Expr::field(Expr::This, "a"), "run", vec![])),
            Stmt::Expr(Expr::call(Expr::field(Expr::This, "b"), "run", vec![])),
        ];
        let mut seen = 0;
        let result = visit_field_refs(&mut body, &mut |_: &mut Expr, _: bool| {
            seen += 1;
            Err("stop")
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(seen, 1);
    }
}
