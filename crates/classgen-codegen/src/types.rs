//! Type Registry
//!
//! Every type the builder refers to is a [`TypeRef`]. The registry hands out
//! one canonical instance per (name, kind) and owns the import context used
//! to compute the short names the source emitter prints.

use crate::error::TypeResolutionError;
use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// The primitive type names
pub const PRIMITIVES: [&str; 8] = [
    "boolean", "byte", "char", "short", "int", "long", "float", "double",
];

/// `java.lang` classes referred to by their simple name
pub const JAVA_LANG_TYPES: [&str; 12] = [
    "Object",
    "String",
    "Throwable",
    "Exception",
    "RuntimeException",
    "IllegalStateException",
    "IllegalArgumentException",
    "NullPointerException",
    "Integer",
    "Long",
    "Boolean",
    "Double",
];

const RESERVED_WORDS: [&str; 53] = [
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "final", "finally", "float",
    "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long",
    "native", "new", "package", "private", "protected", "public", "return", "short", "static",
    "strictfp", "super", "switch", "synchronized", "this", "throw", "throws", "transient", "try",
    "void", "volatile", "while", "true", "false", "null",
];

/// Whether `word` is a reserved word of the emitted language
pub fn is_reserved_word(word: &str) -> bool {
    RESERVED_WORDS.contains(&word)
}

/// Whether `name` is a valid (non-reserved) identifier
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') && !is_reserved_word(name)
}

/// Requested kind of a non-array type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Primitive,
    Named,
    Void,
}

/// Kind of a resolved type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Primitive,
    Named,
    Array(TypeRef),
    Void,
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct TypeData {
    name: String,
    kind: TypeKind,
}

/// Reference to a type: fully-qualified name plus kind
///
/// Cheap to clone. Two references with equal name and kind compare equal no
/// matter which registry produced them.
#[derive(Clone)]
pub struct TypeRef(Rc<TypeData>);

impl TypeRef {
    fn make(name: impl Into<String>, kind: TypeKind) -> Self {
        Self(Rc::new(TypeData {
            name: name.into(),
            kind,
        }))
    }

    pub(crate) fn named_unchecked(name: &str) -> Self {
        Self::make(name, TypeKind::Named)
    }

    pub fn int() -> Self {
        Self::make("int", TypeKind::Primitive)
    }

    pub fn boolean() -> Self {
        Self::make("boolean", TypeKind::Primitive)
    }

    pub fn long() -> Self {
        Self::make("long", TypeKind::Primitive)
    }

    pub fn double() -> Self {
        Self::make("double", TypeKind::Primitive)
    }

    pub fn void() -> Self {
        Self::make("void", TypeKind::Void)
    }

    pub fn object() -> Self {
        Self::named_unchecked("java.lang.Object")
    }

    pub fn string() -> Self {
        Self::named_unchecked("java.lang.String")
    }

    /// Fully-qualified name; arrays end in `[]`
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> &TypeKind {
        &self.0.kind
    }

    pub fn is_primitive(&self) -> bool {
        self.0.kind == TypeKind::Primitive
    }

    pub fn is_void(&self) -> bool {
        self.0.kind == TypeKind::Void
    }

    pub fn is_array(&self) -> bool {
        matches!(self.0.kind, TypeKind::Array(_))
    }

    /// Element type of an array
    pub fn element(&self) -> Option<&TypeRef> {
        match &self.0.kind {
            TypeKind::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Last segment of a named type's name
    pub fn simple_name(&self) -> &str {
        match self.0.name.rfind('.') {
            Some(dot) => &self.0.name[dot + 1..],
            None => &self.0.name,
        }
    }

    /// Package of a named type, if it has one
    pub fn package(&self) -> Option<&str> {
        if self.0.kind != TypeKind::Named {
            return None;
        }
        self.0.name.rfind('.').map(|dot| &self.0.name[..dot])
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for TypeRef {}

impl Hash for TypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.0.name)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// Package and imports of the compilation unit being built
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportScope {
    pub package: Option<String>,
    pub imports: Vec<TypeRef>,
}

impl ImportScope {
    /// Short name under which `ty` can be written in this unit
    pub fn alias(&self, ty: &TypeRef) -> String {
        match ty.kind() {
            TypeKind::Primitive | TypeKind::Void => ty.name().to_string(),
            TypeKind::Array(element) => format!("{}[]", self.alias(element)),
            TypeKind::Named => {
                let simple = ty.simple_name();
                let package = ty.package();
                if package.is_none() {
                    return simple.to_string();
                }
                let conflicting_import = self
                    .imports
                    .iter()
                    .any(|imp| imp.simple_name() == simple && imp != ty);
                if conflicting_import {
                    return ty.name().to_string();
                }
                if self.imports.contains(ty) {
                    return simple.to_string();
                }
                if package == Some("java.lang") && JAVA_LANG_TYPES.contains(&simple) {
                    return simple.to_string();
                }
                if package == self.package.as_deref() && !JAVA_LANG_TYPES.contains(&simple) {
                    return simple.to_string();
                }
                ty.name().to_string()
            }
        }
    }

    /// Resolve a simple name the way [`ImportScope::alias`] produced it
    pub fn qualify(&self, simple: &str) -> String {
        if let Some(imp) = self.imports.iter().find(|imp| imp.simple_name() == simple) {
            return imp.name().to_string();
        }
        if JAVA_LANG_TYPES.contains(&simple) {
            return format!("java.lang.{}", simple);
        }
        match &self.package {
            Some(package) => format!("{}.{}", package, simple),
            None => simple.to_string(),
        }
    }
}

/// Canonical store of type references
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: FxHashMap<String, TypeRef>,
    scope: ImportScope,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `name` as a type of the given kind
    ///
    /// Idempotent: resolving the same (name, kind) twice yields equal references
    /// backed by the same allocation.
    pub fn resolve(&mut self, name: &str, kind: RefKind) -> Result<TypeRef, TypeResolutionError> {
        check_name(name)?;
        let is_primitive = PRIMITIVES.contains(&name);
        match kind {
            RefKind::Primitive if !is_primitive => {
                return Err(TypeResolutionError::new(name, "not a primitive type"));
            }
            RefKind::Named if is_primitive || name == "void" => {
                return Err(TypeResolutionError::new(
                    name,
                    "primitive name used as a named type",
                ));
            }
            RefKind::Void if name != "void" => {
                return Err(TypeResolutionError::new(name, "void type must be named `void`"));
            }
            _ => {}
        }
        if kind == RefKind::Named {
            if let Some(segment) = name.split('.').find(|s| is_reserved_word(s)) {
                return Err(TypeResolutionError::new(
                    name,
                    format!("reserved word `{}` in type name", segment),
                ));
            }
        }

        if let Some(existing) = self.types.get(name) {
            return Ok(existing.clone());
        }
        let ty = TypeRef::make(
            name,
            match kind {
                RefKind::Primitive => TypeKind::Primitive,
                RefKind::Named => TypeKind::Named,
                RefKind::Void => TypeKind::Void,
            },
        );
        self.types.insert(name.to_string(), ty.clone());
        Ok(ty)
    }

    /// Resolve a type written in source form: `void`, a primitive, a named type
    /// or any of these followed by `[]` suffixes
    pub fn type_named(&mut self, name: &str) -> Result<TypeRef, TypeResolutionError> {
        if let Some(element) = name.strip_suffix("[]") {
            let element = self.type_named(element.trim_end())?;
            return self.array_of(&element);
        }
        let kind = if name == "void" {
            RefKind::Void
        } else if PRIMITIVES.contains(&name) {
            RefKind::Primitive
        } else {
            RefKind::Named
        };
        self.resolve(name, kind)
    }

    /// Array type with element `element`
    pub fn array_of(&mut self, element: &TypeRef) -> Result<TypeRef, TypeResolutionError> {
        if element.is_void() {
            return Err(TypeResolutionError::new(
                format!("{}[]", element.name()),
                "array of void",
            ));
        }
        let name = format!("{}[]", element.name());
        if let Some(existing) = self.types.get(&name) {
            return Ok(existing.clone());
        }
        let ty = TypeRef::make(name.clone(), TypeKind::Array(self.canonical(element)));
        self.types.insert(name, ty.clone());
        Ok(ty)
    }

    /// Canonical instance equal to `ty`, registering it if unknown
    pub fn canonical(&mut self, ty: &TypeRef) -> TypeRef {
        self.types
            .entry(ty.name().to_string())
            .or_insert_with(|| ty.clone())
            .clone()
    }

    /// Record an import of `name` into the current unit
    pub fn import(&mut self, name: &str) -> Result<TypeRef, TypeResolutionError> {
        let ty = self.resolve(name, RefKind::Named)?;
        if !self.scope.imports.contains(&ty) {
            self.scope.imports.push(ty.clone());
        }
        Ok(ty)
    }

    /// Set the package of the current unit
    pub fn set_package(&mut self, package: Option<&str>) -> Result<(), TypeResolutionError> {
        if let Some(package) = package {
            check_name(package)?;
            if let Some(segment) = package.split('.').find(|s| is_reserved_word(s)) {
                return Err(TypeResolutionError::new(
                    package,
                    format!("reserved word `{}` in package name", segment),
                ));
            }
        }
        self.scope.package = package.map(str::to_string);
        Ok(())
    }

    /// Forget the package and imports of the previous unit
    pub fn reset_scope(&mut self) {
        self.scope = ImportScope::default();
    }

    pub fn scope(&self) -> &ImportScope {
        &self.scope
    }

    /// Short name for `ty` in the current unit
    pub fn import_alias(&self, ty: &TypeRef) -> String {
        self.scope.alias(ty)
    }

    /// Number of distinct types registered
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    // ===== Convenience constructors =====

    fn builtin(&mut self, ty: TypeRef) -> TypeRef {
        self.canonical(&ty)
    }

    pub fn int(&mut self) -> TypeRef {
        self.builtin(TypeRef::int())
    }

    pub fn boolean(&mut self) -> TypeRef {
        self.builtin(TypeRef::boolean())
    }

    pub fn long(&mut self) -> TypeRef {
        self.builtin(TypeRef::long())
    }

    pub fn double(&mut self) -> TypeRef {
        self.builtin(TypeRef::double())
    }

    pub fn void(&mut self) -> TypeRef {
        self.builtin(TypeRef::void())
    }

    pub fn object(&mut self) -> TypeRef {
        self.builtin(TypeRef::object())
    }

    pub fn string(&mut self) -> TypeRef {
        self.builtin(TypeRef::string())
    }
}

fn check_name(name: &str) -> Result<(), TypeResolutionError> {
    if name.is_empty() {
        return Err(TypeResolutionError::new(name, "empty name"));
    }
    for segment in name.split('.') {
        if segment.is_empty() {
            return Err(TypeResolutionError::new(name, "empty segment"));
        }
        let mut chars = segment.chars();
        let head_ok = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
            .unwrap_or(false);
        if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
            return Err(TypeResolutionError::new(
                name,
                format!("`{}` is not an identifier", segment),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_idempotent() {
        let mut registry = TypeRegistry::new();
        let a = registry.resolve("demo.Flow", RefKind::Named).unwrap();
        let b = registry.resolve("demo.Flow", RefKind::Named).unwrap();
        assert_eq!(a, b);
        assert!(Rc::ptr_eq(&a.0, &b.0));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_equal_refs_from_different_registries() {
        let mut r1 = TypeRegistry::new();
        let mut r2 = TypeRegistry::new();
        assert_eq!(r1.int(), r2.int());
        assert_eq!(
            r1.resolve("a.B", RefKind::Named).unwrap(),
            r2.resolve("a.B", RefKind::Named).unwrap()
        );
        assert_eq!(r1.int(), TypeRef::int());
    }

    #[test]
    fn test_malformed_names() {
        let mut registry = TypeRegistry::new();
        for bad in ["", "a..b", ".a", "a.", "1abc", "a.b-c", "a.class.B", "int.x"] {
            let err = registry.resolve(bad, RefKind::Named).unwrap_err();
            assert_eq!(err.name, bad);
        }
    }

    #[test]
    fn test_kind_mismatch() {
        let mut registry = TypeRegistry::new();
        assert!(registry.resolve("String", RefKind::Primitive).is_err());
        assert!(registry.resolve("int", RefKind::Named).is_err());
        assert!(registry.resolve("void", RefKind::Named).is_err());
        assert!(registry.resolve("int", RefKind::Void).is_err());
        assert!(registry.resolve("void", RefKind::Void).unwrap().is_void());
        assert!(registry.resolve("long", RefKind::Primitive).unwrap().is_primitive());
    }

    #[test]
    fn test_arrays() {
        let mut registry = TypeRegistry::new();
        let int = registry.int();
        let ints = registry.array_of(&int).unwrap();
        assert_eq!(ints.name(), "int[]");
        assert_eq!(ints.element(), Some(&int));
        assert_eq!(registry.array_of(&int).unwrap(), ints);

        let matrix = registry.type_named("int[][]").unwrap();
        assert_eq!(matrix.element(), Some(&ints));

        let void = registry.void();
        assert!(registry.array_of(&void).is_err());
    }

    #[test]
    fn test_type_named_infers_kind() {
        let mut registry = TypeRegistry::new();
        assert!(registry.type_named("boolean").unwrap().is_primitive());
        assert!(registry.type_named("void").unwrap().is_void());
        let named = registry.type_named("java.util.List").unwrap();
        assert_eq!(named.kind(), &TypeKind::Named);
        assert_eq!(named.simple_name(), "List");
        assert_eq!(named.package(), Some("java.util"));
    }

    #[test]
    fn test_import_alias() {
        let mut registry = TypeRegistry::new();
        registry.set_package(Some("demo")).unwrap();
        let list = registry.import("java.util.List").unwrap();
        let local = registry.resolve("demo.Flow", RefKind::Named).unwrap();
        let string = registry.string();
        let other = registry.resolve("other.Thing", RefKind::Named).unwrap();
        let int = registry.int();
        let lists = registry.array_of(&list).unwrap();

        assert_eq!(registry.import_alias(&list), "List");
        assert_eq!(registry.import_alias(&local), "Flow");
        assert_eq!(registry.import_alias(&string), "String");
        assert_eq!(registry.import_alias(&other), "other.Thing");
        assert_eq!(registry.import_alias(&int), "int");
        assert_eq!(registry.import_alias(&lists), "List[]");
    }

    #[test]
    fn test_ambiguous_imports_use_full_names() {
        let mut registry = TypeRegistry::new();
        let a = registry.import("java.util.List").unwrap();
        let b = registry.import("java.awt.List").unwrap();
        assert_eq!(registry.import_alias(&a), "java.util.List");
        assert_eq!(registry.import_alias(&b), "java.awt.List");
    }

    #[test]
    fn test_qualify_inverts_alias() {
        let mut registry = TypeRegistry::new();
        registry.set_package(Some("demo")).unwrap();
        registry.import("java.util.List").unwrap();
        let scope = registry.scope().clone();
        assert_eq!(scope.qualify("List"), "java.util.List");
        assert_eq!(scope.qualify("RuntimeException"), "java.lang.RuntimeException");
        assert_eq!(scope.qualify("Flow"), "demo.Flow");
    }

    #[test]
    fn test_reset_scope() {
        let mut registry = TypeRegistry::new();
        registry.set_package(Some("demo")).unwrap();
        let list = registry.import("java.util.List").unwrap();
        registry.reset_scope();
        assert_eq!(registry.import_alias(&list), "java.util.List");
        assert!(registry.scope().package.is_none());
        // Types survive a scope reset
        assert!(registry.len() > 0);
    }
}
