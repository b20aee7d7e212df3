//! Expressions

use crate::types::TypeRef;
use std::fmt;

/// Literal constant value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Short-circuit `&&`
    And,
    /// Short-circuit `||`
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Receiver of a method call
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    Instance(Box<Expr>),
    Static(TypeRef),
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant { value: Literal, ty: TypeRef },
    Var(String),
    Field { target: Box<Expr>, name: String },
    StaticField { owner: TypeRef, name: String },
    Call {
        target: CallTarget,
        name: String,
        args: Vec<Expr>,
    },
    New { ty: TypeRef, args: Vec<Expr> },
    This,
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
}

impl Expr {
    pub fn null() -> Self {
        Self::Constant {
            value: Literal::Null,
            ty: TypeRef::object(),
        }
    }

    pub fn bool(value: bool) -> Self {
        Self::Constant {
            value: Literal::Bool(value),
            ty: TypeRef::boolean(),
        }
    }

    pub fn int(value: i32) -> Self {
        Self::Constant {
            value: Literal::Int(value),
            ty: TypeRef::int(),
        }
    }

    pub fn long(value: i64) -> Self {
        Self::Constant {
            value: Literal::Long(value),
            ty: TypeRef::long(),
        }
    }

    pub fn double(value: f64) -> Self {
        Self::Constant {
            value: Literal::Double(value),
            ty: TypeRef::double(),
        }
    }

    pub fn str(value: impl Into<String>) -> Self {
        Self::Constant {
            value: Literal::Str(value.into()),
            ty: TypeRef::string(),
        }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    pub fn this() -> Self {
        Self::This
    }

    /// `target.name`
    pub fn field(target: Expr, name: impl Into<String>) -> Self {
        Self::Field {
            target: Box::new(target),
            name: name.into(),
        }
    }

    /// `Owner.name`
    pub fn static_field(owner: TypeRef, name: impl Into<String>) -> Self {
        Self::StaticField {
            owner,
            name: name.into(),
        }
    }

    /// `target.name(args)`
    pub fn call(target: Expr, name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            target: CallTarget::Instance(Box::new(target)),
            name: name.into(),
            args,
        }
    }

    /// `Owner.name(args)`
    pub fn call_static(owner: TypeRef, name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            target: CallTarget::Static(owner),
            name: name.into(),
            args,
        }
    }

    /// `new Type(args)`
    pub fn new_instance(ty: TypeRef, args: Vec<Expr>) -> Self {
        Self::New { ty, args }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::And, lhs, rhs)
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Or, lhs, rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(operand: Expr) -> Self {
        Self::Not(Box::new(operand))
    }

    /// Whether this expression can be the target of an assignment
    pub fn is_assignable(&self) -> bool {
        matches!(self, Self::Var(_) | Self::Field { .. } | Self::StaticField { .. })
    }

    /// Whether this expression may stand alone as a statement
    pub fn is_statement_expression(&self) -> bool {
        matches!(self, Self::Call { .. } | Self::New { .. })
    }
}
