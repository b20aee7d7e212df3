//! Interceptor pipeline
//!
//! Third-party hooks that observe and extend a finished class before any
//! backend renders it. A class runs through the pipeline exactly once:
//!
//! 1. every registered `on_class` hook, in registration order
//! 2. for each method in member order (members added in step 1 included),
//!    every `on_method` hook, then every `on_field_reference` hook for each
//!    field reference of that method's body in occurrence order
//!
//! All field references of one method are handled before the next method's
//! `on_method` hook runs.

use crate::error::{CodegenError, CodegenResult, HookError, HookResult, InterceptionPoint};
use crate::ir::{visit, ClassDecl, Expr, FieldDecl, Member, MethodDecl, Modifiers, Param, Stmt};
use crate::types::{is_identifier, TypeRef, TypeRegistry};
use crate::validate::check_new_field;
use log::{debug, trace};

// ===== Hook traits =====

/// Extension point invoked once per class
pub trait ClassInterceptor {
    fn on_class(&mut self, class: &mut ClassView<'_>) -> HookResult;
}

/// Extension point invoked once per method and constructor
pub trait MethodInterceptor {
    fn on_method(&mut self, method: &mut MethodView<'_>) -> HookResult;
}

/// Extension point invoked once per field reference in a method body
pub trait FieldReferenceInterceptor {
    fn on_field_reference(&mut self, field: &mut FieldRefView<'_>) -> HookResult;
}

impl<F> ClassInterceptor for F
where
    F: FnMut(&mut ClassView<'_>) -> HookResult,
{
    fn on_class(&mut self, class: &mut ClassView<'_>) -> HookResult {
        self(class)
    }
}

impl<F> MethodInterceptor for F
where
    F: FnMut(&mut MethodView<'_>) -> HookResult,
{
    fn on_method(&mut self, method: &mut MethodView<'_>) -> HookResult {
        self(method)
    }
}

impl<F> FieldReferenceInterceptor for F
where
    F: FnMut(&mut FieldRefView<'_>) -> HookResult,
{
    fn on_field_reference(&mut self, field: &mut FieldRefView<'_>) -> HookResult {
        self(field)
    }
}

// ===== Registration =====

/// A set of hooks registered under one name
///
/// ```ignore
/// codegen.register(
///     "counter",
///     Interceptor::new()
///         .on_class(|class| class.add_field(Modifiers::PRIVATE, TypeRef::int(), "count").map(drop))
///         .on_method(|method| { println!("{}", method.name()); Ok(()) }),
/// );
/// ```
#[derive(Default)]
pub struct Interceptor {
    class: Option<Box<dyn ClassInterceptor>>,
    method: Option<Box<dyn MethodInterceptor>>,
    field_ref: Option<Box<dyn FieldReferenceInterceptor>>,
}

impl Interceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the class hook from a closure
    pub fn on_class<F>(self, hook: F) -> Self
    where
        F: FnMut(&mut ClassView<'_>) -> HookResult + 'static,
    {
        self.with_class(hook)
    }

    /// Set the method hook from a closure
    pub fn on_method<F>(self, hook: F) -> Self
    where
        F: FnMut(&mut MethodView<'_>) -> HookResult + 'static,
    {
        self.with_method(hook)
    }

    /// Set the field reference hook from a closure
    pub fn on_field_reference<F>(self, hook: F) -> Self
    where
        F: FnMut(&mut FieldRefView<'_>) -> HookResult + 'static,
    {
        self.with_field_reference(hook)
    }

    pub fn with_class(mut self, hook: impl ClassInterceptor + 'static) -> Self {
        self.class = Some(Box::new(hook));
        self
    }

    pub fn with_method(mut self, hook: impl MethodInterceptor + 'static) -> Self {
        self.method = Some(Box::new(hook));
        self
    }

    pub fn with_field_reference(mut self, hook: impl FieldReferenceInterceptor + 'static) -> Self {
        self.field_ref = Some(Box::new(hook));
        self
    }

    /// Interception points this interceptor takes part in
    pub fn points(&self) -> Vec<InterceptionPoint> {
        let mut points = Vec::new();
        if self.class.is_some() {
            points.push(InterceptionPoint::Class);
        }
        if self.method.is_some() {
            points.push(InterceptionPoint::Method);
        }
        if self.field_ref.is_some() {
            points.push(InterceptionPoint::FieldReference);
        }
        points
    }
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("points", &self.points())
            .finish()
    }
}

// ===== Views =====

/// Mutable view of a finished class handed to `on_class`
pub struct ClassView<'a> {
    class: &'a mut ClassDecl,
    registry: &'a mut TypeRegistry,
    instance_init: &'a mut Vec<Stmt>,
}

impl<'a> ClassView<'a> {
    pub fn name(&self) -> &str {
        self.class.name()
    }

    pub fn class_type(&self) -> &TypeRef {
        &self.class.ty
    }

    pub fn superclass(&self) -> &TypeRef {
        &self.class.superclass
    }

    pub fn modifiers(&self) -> Modifiers {
        self.class.modifiers
    }

    pub fn members(&self) -> &[Member] {
        &self.class.members
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.class.field(name)
    }

    /// Type registry of the owning context, for resolving new types
    pub fn registry(&mut self) -> &mut TypeRegistry {
        self.registry
    }

    /// Append a field and return an expression referring to it
    pub fn add_field(
        &mut self,
        modifiers: Modifiers,
        ty: TypeRef,
        name: &str,
    ) -> Result<Expr, HookError> {
        self.push_field(FieldDecl::new(modifiers, ty, name))
    }

    /// Append a field with an initializer
    pub fn add_field_init(
        &mut self,
        modifiers: Modifiers,
        ty: TypeRef,
        name: &str,
        init: Expr,
    ) -> Result<Expr, HookError> {
        self.push_field(FieldDecl::new(modifiers, ty, name).with_init(init))
    }

    fn push_field(&mut self, field: FieldDecl) -> Result<Expr, HookError> {
        check_new_field(self.class, &field.name).map_err(|e| HookError::new(e.to_string()))?;
        let ty = self.registry.canonical(&field.ty);
        let reference = field_reference(&self.class.ty, &field);
        trace!("interceptor added field {}.{}", self.class.name(), field.name);
        self.class.members.push(Member::Field(FieldDecl { ty, ..field }));
        Ok(reference)
    }

    /// Append a method; it is visited by `on_method` hooks like any other
    pub fn add_method(&mut self, method: MethodDecl) -> Result<(), HookError> {
        if method.is_constructor() {
            return Err(HookError::new("add_method given a constructor"));
        }
        trace!("interceptor added method {}.{}", self.class.name(), method.display_name());
        self.class.members.push(Member::Method(method));
        Ok(())
    }

    /// Append a constructor
    pub fn add_constructor(&mut self, constructor: MethodDecl) -> Result<(), HookError> {
        if !constructor.is_constructor() {
            return Err(HookError::new("add_constructor given a named method"));
        }
        self.class.members.push(Member::Method(constructor));
        Ok(())
    }

    /// Append statements to the static initializer
    pub fn extend_static_init(&mut self, stmts: impl IntoIterator<Item = Stmt>) {
        self.class.static_init.extend(stmts);
    }

    /// Append statements to the instance initializer
    ///
    /// They run at the start of every constructor, after the field
    /// initializers. A class without constructors gets a public no-argument one.
    pub fn extend_instance_init(&mut self, stmts: impl IntoIterator<Item = Stmt>) {
        self.instance_init.extend(stmts);
    }
}

/// Prefix every constructor body with the instance initializer statements
fn merge_instance_init(class: &mut ClassDecl, init: Vec<Stmt>) {
    if init.is_empty() {
        return;
    }
    if !class.has_constructor() {
        class.members.push(Member::Method(
            MethodDecl::constructor(Modifiers::PUBLIC).body(Vec::new()),
        ));
    }
    for method in class.methods_mut().filter(|m| m.is_constructor()) {
        if let Some(body) = method.body.as_mut() {
            let tail = std::mem::take(body);
            body.extend(init.iter().cloned());
            body.extend(tail);
        }
    }
}

/// Reference to a field declared by `class`: `this.name` or `Owner.name`
pub(crate) fn field_reference(class: &TypeRef, field: &FieldDecl) -> Expr {
    if field.is_static() {
        Expr::static_field(class.clone(), field.name.clone())
    } else {
        Expr::field(Expr::This, field.name.clone())
    }
}

/// Mutable view of one method handed to `on_method`
pub struct MethodView<'a> {
    class: &'a TypeRef,
    fields: &'a [FieldDecl],
    method: &'a mut MethodDecl,
}

impl<'a> MethodView<'a> {
    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    /// Fields of the class, including those added by `on_class` hooks
    pub fn fields(&self) -> &[FieldDecl] {
        self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Method name, `<init>` for constructors
    pub fn name(&self) -> &str {
        self.method.table_name()
    }

    pub fn is_constructor(&self) -> bool {
        self.method.is_constructor()
    }

    pub fn descriptor(&self) -> String {
        self.method.descriptor()
    }

    pub fn params(&self) -> &[Param] {
        &self.method.params
    }

    pub fn return_type(&self) -> Option<&TypeRef> {
        self.method.return_type.as_ref()
    }

    pub fn modifiers(&self) -> Modifiers {
        self.method.modifiers
    }

    /// Body statements, `None` for abstract methods
    pub fn body(&self) -> Option<&[Stmt]> {
        self.method.body.as_deref()
    }

    pub fn body_mut(&mut self) -> Option<&mut Vec<Stmt>> {
        self.method.body.as_mut()
    }

    /// Insert statements before the existing body
    pub fn prepend(&mut self, stmts: impl IntoIterator<Item = Stmt>) -> HookResult {
        let body = self.require_body()?;
        let tail = std::mem::take(body);
        body.extend(stmts);
        body.extend(tail);
        Ok(())
    }

    /// Insert statements after the existing body
    pub fn append(&mut self, stmts: impl IntoIterator<Item = Stmt>) -> HookResult {
        self.require_body()?.extend(stmts);
        Ok(())
    }

    fn require_body(&mut self) -> Result<&mut Vec<Stmt>, HookError> {
        let name = self.method.display_name();
        self.method
            .body
            .as_mut()
            .ok_or_else(|| HookError::new(format!("abstract method {} has no body", name)))
    }
}

/// Mutable view of one field access handed to `on_field_reference`
pub struct FieldRefView<'a> {
    expr: &'a mut Expr,
    is_store: bool,
    method: &'a str,
}

impl<'a> FieldRefView<'a> {
    /// Name of the accessed field, `None` once replaced by a non-field expression
    pub fn name(&self) -> Option<&str> {
        match &*self.expr {
            Expr::Field { name, .. } | Expr::StaticField { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Whether the access is the target of an assignment
    pub fn is_store(&self) -> bool {
        self.is_store
    }

    pub fn is_static(&self) -> bool {
        matches!(self.expr, Expr::StaticField { .. })
    }

    /// Owner type of a static access
    pub fn owner(&self) -> Option<&TypeRef> {
        match &*self.expr {
            Expr::StaticField { owner, .. } => Some(owner),
            _ => None,
        }
    }

    /// Object expression of an instance access
    pub fn target(&self) -> Option<&Expr> {
        match &*self.expr {
            Expr::Field { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn expr(&self) -> &Expr {
        self.expr
    }

    /// Display name of the method containing the access
    pub fn method(&self) -> &str {
        self.method
    }

    /// Point the access at another field of the same object
    pub fn redirect(&mut self, name: &str) -> HookResult {
        if !is_identifier(name) {
            return Err(HookError::new(format!("`{}` is not a valid field name", name)));
        }
        match self.expr {
            Expr::Field { name: field, .. } | Expr::StaticField { name: field, .. } => {
                *field = name.to_string();
                Ok(())
            }
            _ => Err(HookError::new("access was already replaced")),
        }
    }

    /// Replace the whole access; a store site must stay assignable
    pub fn replace(&mut self, expr: Expr) -> HookResult {
        if self.is_store && !expr.is_assignable() {
            return Err(HookError::new("replacement for a store site is not assignable"));
        }
        *self.expr = expr;
        Ok(())
    }
}

// ===== Pipeline =====

/// Run every registered interceptor over `class`
pub(crate) fn run_pipeline(
    class: &mut ClassDecl,
    registry: &mut TypeRegistry,
    interceptors: &mut [(String, Interceptor)],
) -> CodegenResult<()> {
    if interceptors.is_empty() {
        return Ok(());
    }
    debug!(
        "running {} interceptor(s) over {}",
        interceptors.len(),
        class.name()
    );

    let mut instance_init = Vec::new();
    for (name, interceptor) in interceptors.iter_mut() {
        if let Some(hook) = interceptor.class.as_mut() {
            trace!("{} on_class {}", name, class.name());
            let target = class.name().to_string();
            let mut view = ClassView {
                class: &mut *class,
                registry: &mut *registry,
                instance_init: &mut instance_init,
            };
            hook.on_class(&mut view)
                .map_err(|source| failure(InterceptionPoint::Class, target, name, source))?;
        }
    }
    merge_instance_init(class, instance_init);

    // method hooks cannot add fields, so one snapshot serves every method
    let fields: Vec<FieldDecl> = class.fields().cloned().collect();
    let ClassDecl { ty, members, .. } = class;
    for member in members.iter_mut() {
        let Member::Method(method) = member else {
            continue;
        };
        let target = format!("{}.{}", ty.name(), method.display_name());

        for (name, interceptor) in interceptors.iter_mut() {
            if let Some(hook) = interceptor.method.as_mut() {
                trace!("{} on_method {}", name, target);
                let mut view = MethodView {
                    class: &*ty,
                    fields: &fields,
                    method: &mut *method,
                };
                hook.on_method(&mut view).map_err(|source| {
                    failure(InterceptionPoint::Method, target.clone(), name, source)
                })?;
            }
        }

        let Some(body) = method.body.as_mut() else {
            continue;
        };
        visit::visit_field_refs(body, &mut |expr: &mut Expr, is_store: bool| -> CodegenResult<()> {
            for (name, interceptor) in interceptors.iter_mut() {
                if !matches!(expr, Expr::Field { .. } | Expr::StaticField { .. }) {
                    break;
                }
                let Some(hook) = interceptor.field_ref.as_mut() else {
                    continue;
                };
                let mut view = FieldRefView {
                    expr: &mut *expr,
                    is_store,
                    method: &target,
                };
                let field = view.name().unwrap_or_default().to_string();
                trace!("{} on_field_reference {} in {}", name, field, target);
                hook.on_field_reference(&mut view).map_err(|source| {
                    failure(
                        InterceptionPoint::FieldReference,
                        format!("{} in {}", field, target),
                        name,
                        source,
                    )
                })?;
            }
            Ok(())
        })?;
    }
    Ok(())
}

fn failure(
    point: InterceptionPoint,
    target: String,
    interceptor: &str,
    source: HookError,
) -> CodegenError {
    CodegenError::InterceptorFailure {
        point,
        target,
        interceptor: interceptor.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImportScope;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn sample_class() -> ClassDecl {
        let mut class = ClassDecl::new(
            Modifiers::PUBLIC,
            TypeRef::named_unchecked("demo.Flow"),
            TypeRef::object(),
            ImportScope::default(),
        );
        class.members.push(Member::Field(FieldDecl::new(
            Modifiers::PRIVATE,
            TypeRef::int(),
            "x",
        )));
        class.members.push(Member::Method(
            MethodDecl::method(Modifiers::PUBLIC, None, "first").body(vec![Stmt::Assign {
                target: Expr::field(Expr::This, "x"),
                value: Expr::field(Expr::This, "x"),
            }]),
        ));
        class.members.push(Member::Method(
            MethodDecl::method(Modifiers::PUBLIC, None, "second").body(vec![]),
        ));
        class
    }

    #[test]
    fn test_ordering() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
        let mut interceptors = vec![(
            "order".to_string(),
            Interceptor::new()
                .on_class(move |c| {
                    l1.borrow_mut().push(format!("class {}", c.name()));
                    Ok(())
                })
                .on_method(move |m| {
                    l2.borrow_mut().push(format!("method {}", m.name()));
                    Ok(())
                })
                .on_field_reference(move |f| {
                    l3.borrow_mut()
                        .push(format!("field {} store={}", f.name().unwrap_or("?"), f.is_store()));
                    Ok(())
                }),
        )];

        let mut class = sample_class();
        run_pipeline(&mut class, &mut TypeRegistry::new(), &mut interceptors).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                "class demo.Flow",
                "method first",
                "field x store=true",
                "field x store=false",
                "method second",
            ]
        );
    }

    #[test]
    fn test_added_members_visible_to_method_hooks() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut interceptors = vec![(
            "counter".to_string(),
            Interceptor::new()
                .on_class(|c| {
                    let count = c.add_field(Modifiers::PRIVATE, TypeRef::int(), "count")?;
                    c.add_method(
                        MethodDecl::method(Modifiers::PUBLIC, Some(TypeRef::int()), "getCount")
                            .body(vec![Stmt::Return(Some(count))]),
                    )
                })
                .on_method(move |m| {
                    if m.field("count").is_some() {
                        sink.borrow_mut().push(m.name().to_string());
                    }
                    Ok(())
                }),
        )];

        let mut class = sample_class();
        run_pipeline(&mut class, &mut TypeRegistry::new(), &mut interceptors).unwrap();
        assert!(class.field("count").is_some());
        assert_eq!(*seen.borrow(), vec!["first", "second", "getCount"]);
    }

    #[test]
    fn test_instance_init_prefixes_constructors() {
        let mark = |n: i32| Stmt::Expr(Expr::call(Expr::This, "mark", vec![Expr::int(n)]));
        let mut interceptors: Vec<(String, Interceptor)> = [1, 2]
            .into_iter()
            .map(|n| {
                (
                    format!("init{}", n),
                    Interceptor::new().on_class(move |c| {
                        c.extend_instance_init(vec![mark(n)]);
                        Ok(())
                    }),
                )
            })
            .collect();

        let mut class = sample_class();
        class.members.push(Member::Method(
            MethodDecl::constructor(Modifiers::PUBLIC)
                .param(TypeRef::int(), "x")
                .body(vec![mark(3)]),
        ));
        run_pipeline(&mut class, &mut TypeRegistry::new(), &mut interceptors).unwrap();

        let constructors: Vec<&MethodDecl> =
            class.methods().filter(|m| m.is_constructor()).collect();
        assert_eq!(constructors.len(), 1);
        assert_eq!(
            constructors[0].body.as_deref(),
            Some(&[mark(1), mark(2), mark(3)][..])
        );
    }

    #[test]
    fn test_failure_names_interceptor() {
        let mut interceptors = vec![
            ("quiet".to_string(), Interceptor::new().on_method(|_| Ok(()))),
            (
                "loud".to_string(),
                Interceptor::new().on_method(|m| {
                    if m.name() == "second" {
                        Err(HookError::new("refused"))
                    } else {
                        Ok(())
                    }
                }),
            ),
        ];
        let mut class = sample_class();
        match run_pipeline(&mut class, &mut TypeRegistry::new(), &mut interceptors) {
            Err(CodegenError::InterceptorFailure {
                point,
                target,
                interceptor,
                source,
            }) => {
                assert_eq!(point, InterceptionPoint::Method);
                assert_eq!(target, "demo.Flow.second()void");
                assert_eq!(interceptor, "loud");
                assert_eq!(source.message(), "refused");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_store_site_must_stay_assignable() {
        let mut interceptors = vec![(
            "bad".to_string(),
            Interceptor::new().on_field_reference(|f| {
                if f.is_store() {
                    f.replace(Expr::int(1))
                } else {
                    Ok(())
                }
            }),
        )];
        let mut class = sample_class();
        assert!(run_pipeline(&mut class, &mut TypeRegistry::new(), &mut interceptors).is_err());
    }

    #[test]
    fn test_replaced_access_skips_later_interceptors() {
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        let mut interceptors = vec![
            (
                "inline".to_string(),
                Interceptor::new().on_field_reference(|f| {
                    if f.is_store() {
                        Ok(())
                    } else {
                        f.replace(Expr::int(7))
                    }
                }),
            ),
            (
                "count".to_string(),
                Interceptor::new().on_field_reference(move |_| {
                    *counter.borrow_mut() += 1;
                    Ok(())
                }),
            ),
        ];
        let mut class = sample_class();
        run_pipeline(&mut class, &mut TypeRegistry::new(), &mut interceptors).unwrap();
        // only the store site reaches the second interceptor
        assert_eq!(*calls.borrow(), 1);
        let body = class.methods().next().and_then(|m| m.body.clone()).unwrap();
        assert_eq!(
            body[0],
            Stmt::Assign {
                target: Expr::field(Expr::This, "x"),
                value: Expr::int(7),
            }
        );
    }

    #[test]
    fn test_redirect_and_prepend() {
        struct Rename;
        impl FieldReferenceInterceptor for Rename {
            fn on_field_reference(&mut self, field: &mut FieldRefView<'_>) -> HookResult {
                field.redirect("y")
            }
        }
        struct Prologue;
        impl MethodInterceptor for Prologue {
            fn on_method(&mut self, method: &mut MethodView<'_>) -> HookResult {
                method.prepend(vec![Stmt::Expr(Expr::call(Expr::This, "enter", vec![]))])
            }
        }

        let mut interceptors = vec![(
            "rewrite".to_string(),
            Interceptor::new()
                .with_method(Prologue)
                .with_field_reference(Rename),
        )];
        let mut class = sample_class();
        run_pipeline(&mut class, &mut TypeRegistry::new(), &mut interceptors).unwrap();
        let body = class.methods().next().and_then(|m| m.body.clone()).unwrap();
        assert_eq!(body.len(), 2);
        assert_eq!(
            body[1],
            Stmt::Assign {
                target: Expr::field(Expr::This, "y"),
                value: Expr::field(Expr::This, "y"),
            }
        );
    }
}
