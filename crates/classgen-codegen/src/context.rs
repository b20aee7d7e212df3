//! Code generation context

use crate::config::CodegenOptions;
use crate::intercept::Interceptor;
use crate::session::Session;
use crate::types::TypeRegistry;
use log::debug;

/// Owns the type registry, the registered interceptors and the options
///
/// Classes are built through a [`Session`], which borrows the context
/// mutably; only one session can be active at a time.
#[derive(Debug, Default)]
pub struct Codegen {
    pub(crate) registry: TypeRegistry,
    pub(crate) interceptors: Vec<(String, Interceptor)>,
    pub(crate) options: CodegenOptions,
}

impl Codegen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CodegenOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: CodegenOptions) {
        self.options = options;
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    /// Register an interceptor; interceptors run in registration order
    pub fn register(&mut self, name: impl Into<String>, interceptor: impl Into<Interceptor>) {
        let name = name.into();
        let interceptor = interceptor.into();
        debug!("registered interceptor `{}` at {:?}", name, interceptor.points());
        self.interceptors.push((name, interceptor));
    }

    /// Names of the registered interceptors, in invocation order
    pub fn interceptor_names(&self) -> impl Iterator<Item = &str> {
        self.interceptors.iter().map(|(name, _)| name.as_str())
    }

    /// Start building one class
    pub fn session(&mut self) -> Session<'_> {
        self.registry.reset_scope();
        Session::new(self)
    }
}
