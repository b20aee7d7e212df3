//! Statements

use super::expr::Expr;
use crate::types::TypeRef;

/// One `catch (Type var) { body }` clause
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub ty: TypeRef,
    pub var: String,
    pub body: Vec<Stmt>,
}

/// Statement node
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Expression evaluated for its effect
    Expr(Expr),
    /// Store into an existing variable or field
    Assign { target: Expr, value: Expr },
    /// Declare and initialize a local variable
    Define {
        ty: TypeRef,
        name: String,
        value: Expr,
    },
    Return(Option<Expr>),
    Throw(Expr),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    TryCatch {
        body: Vec<Stmt>,
        catches: Vec<CatchClause>,
    },
    Block(Vec<Stmt>),
}

impl Stmt {
    /// Whether control can reach the end of this statement
    pub fn can_complete(&self) -> bool {
        match self {
            Stmt::Return(_) | Stmt::Throw(_) => false,
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => can_complete(then_branch) || can_complete(else_branch),
            Stmt::TryCatch { body, catches } => {
                can_complete(body) || catches.iter().any(|c| can_complete(&c.body))
            }
            Stmt::Block(stmts) => can_complete(stmts),
            Stmt::Expr(_) | Stmt::Assign { .. } | Stmt::Define { .. } => true,
        }
    }
}

/// Whether control can reach the end of a statement sequence
pub fn can_complete(stmts: &[Stmt]) -> bool {
    stmts.iter().all(Stmt::can_complete)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion() {
        let ret = Stmt::Return(None);
        let call = Stmt::Expr(Expr::call(Expr::This, "trace", vec![Expr::int(1)]));

        assert!(can_complete(&[]));
        assert!(!can_complete(&[call.clone(), ret.clone()]));

        let one_armed = Stmt::If {
            cond: Expr::bool(true),
            then_branch: vec![ret.clone()],
            else_branch: vec![],
        };
        assert!(one_armed.can_complete());

        let both = Stmt::If {
            cond: Expr::bool(true),
            then_branch: vec![ret.clone()],
            else_branch: vec![Stmt::Throw(Expr::null())],
        };
        assert!(!both.can_complete());

        let guarded = Stmt::TryCatch {
            body: vec![ret.clone()],
            catches: vec![CatchClause {
                ty: TypeRef::object(),
                var: "e".to_string(),
                body: vec![call],
            }],
        };
        assert!(guarded.can_complete());
    }
}
