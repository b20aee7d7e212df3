//! Class, field and method declarations

use super::expr::Expr;
use super::stmt::Stmt;
use crate::types::{ImportScope, TypeRef};
use classgen_bytecode::{descriptor, AccessFlags};

/// Modifier set of classes and members
pub type Modifiers = AccessFlags;

/// Method or constructor parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeRef,
    pub modifiers: Modifiers,
    pub init: Option<Expr>,
}

impl FieldDecl {
    pub fn new(modifiers: Modifiers, ty: TypeRef, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty,
            modifiers,
            init: None,
        }
    }

    pub fn with_init(mut self, init: Expr) -> Self {
        self.init = Some(init);
        self
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.is_static()
    }
}

/// Method or constructor
///
/// Constructors have no name; void methods and constructors have no return
/// type. `body` is `None` only for abstract methods.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: Option<String>,
    pub return_type: Option<TypeRef>,
    pub params: Vec<Param>,
    pub modifiers: Modifiers,
    pub body: Option<Vec<Stmt>>,
}

impl MethodDecl {
    pub fn method(modifiers: Modifiers, return_type: Option<TypeRef>, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            return_type: return_type.filter(|ty| !ty.is_void()),
            params: Vec::new(),
            modifiers,
            body: None,
        }
    }

    pub fn constructor(modifiers: Modifiers) -> Self {
        Self {
            name: None,
            return_type: None,
            params: Vec::new(),
            modifiers,
            body: None,
        }
    }

    pub fn param(mut self, ty: TypeRef, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn body(mut self, body: Vec<Stmt>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_constructor(&self) -> bool {
        self.name.is_none()
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.is_static()
    }

    pub fn is_abstract(&self) -> bool {
        self.modifiers.is_abstract()
    }

    /// Name in the method table (`<init>` for constructors)
    pub fn table_name(&self) -> &str {
        self.name
            .as_deref()
            .unwrap_or(classgen_bytecode::CONSTRUCTOR_NAME)
    }

    /// Descriptor such as `(int,boolean)void`
    pub fn descriptor(&self) -> String {
        descriptor(
            self.params.iter().map(|p| p.ty.name()),
            self.return_type.as_ref().map(TypeRef::name),
        )
    }

    /// Human-readable name used in diagnostics
    pub fn display_name(&self) -> String {
        format!("{}{}", self.table_name(), self.descriptor())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Field(FieldDecl),
    Method(MethodDecl),
}

/// A class under construction or ready for emission
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub ty: TypeRef,
    pub superclass: TypeRef,
    pub modifiers: Modifiers,
    pub scope: ImportScope,
    pub members: Vec<Member>,
    pub static_init: Vec<Stmt>,
}

impl ClassDecl {
    pub fn new(modifiers: Modifiers, ty: TypeRef, superclass: TypeRef, scope: ImportScope) -> Self {
        Self {
            ty,
            superclass,
            modifiers,
            scope,
            members: Vec::new(),
            static_init: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.ty.name()
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Field(f) => Some(f),
            Member::Method(_) => None,
        })
    }

    /// Methods and constructors in declaration order
    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Method(m) => Some(m),
            Member::Field(_) => None,
        })
    }

    pub fn methods_mut(&mut self) -> impl Iterator<Item = &mut MethodDecl> {
        self.members.iter_mut().filter_map(|m| match m {
            Member::Method(m) => Some(m),
            Member::Field(_) => None,
        })
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields().find(|f| f.name == name)
    }

    pub fn has_constructor(&self) -> bool {
        self.methods().any(MethodDecl::is_constructor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_descriptor() {
        let m = MethodDecl::method(Modifiers::PUBLIC, Some(TypeRef::boolean()), "branch")
            .param(TypeRef::int(), "x")
            .param(TypeRef::string(), "label");
        assert_eq!(m.descriptor(), "(int,java.lang.String)boolean");
        assert_eq!(m.display_name(), "branch(int,java.lang.String)boolean");

        let ctor = MethodDecl::constructor(Modifiers::PUBLIC);
        assert!(ctor.is_constructor());
        assert_eq!(ctor.display_name(), "<init>()void");

        let void = MethodDecl::method(Modifiers::PUBLIC, Some(TypeRef::void()), "run");
        assert_eq!(void.return_type, None);
    }

    #[test]
    fn test_member_iteration_keeps_order() {
        let mut class = ClassDecl::new(
            Modifiers::PUBLIC,
            TypeRef::named_unchecked("demo.Flow"),
            TypeRef::object(),
            ImportScope::default(),
        );
        class
            .members
            .push(Member::Method(MethodDecl::method(Modifiers::PUBLIC, None, "b")));
        class.members.push(Member::Field(FieldDecl::new(
            Modifiers::PRIVATE,
            TypeRef::int(),
            "count",
        )));
        class
            .members
            .push(Member::Method(MethodDecl::method(Modifiers::PUBLIC, None, "a")));

        let names: Vec<&str> = class.methods().map(MethodDecl::table_name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(class.field("count").is_some());
        assert!(!class.has_constructor());
    }
}
