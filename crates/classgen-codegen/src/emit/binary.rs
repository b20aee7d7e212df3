//! Binary emitter
//!
//! Lowers a finished [`ClassDecl`] into a [`ClassFile`]. Structured control
//! flow becomes forward jumps with patched relative offsets and `try`/`catch`
//! becomes exception table ranges, innermost first.

use crate::config::CodegenOptions;
use crate::error::{CodegenError, CodegenResult};
use crate::ir::{can_complete, BinaryOp, CallTarget, ClassDecl, Expr, Literal, MethodDecl, Stmt};
use classgen_bytecode::classfile::flags;
use classgen_bytecode::constants::MAX_POOL_ENTRIES;
use classgen_bytecode::{
    verify_class, AccessFlags, BytecodeWriter, ClassFile, ConstantPool, ExceptionEntry, FieldInfo,
    MethodInfo, Opcode, CONSTRUCTOR_NAME, STATIC_INIT_NAME,
};
use log::{debug, trace};

/// Lower `class` into a class file, verifying it when `options.verify` is set
pub fn emit_class_file(class: &ClassDecl, options: &CodegenOptions) -> CodegenResult<ClassFile> {
    let mut file = ClassFile::new(class.name(), class.superclass.name());
    file.access = class.modifiers;
    if options.emit_debug_names {
        file.flags |= flags::HAS_DEBUG_INFO;
    }
    file.metadata.source_file = options.source_file.clone();

    file.fields = class
        .fields()
        .map(|field| FieldInfo {
            name: field.name.clone(),
            type_name: field.ty.name().to_string(),
            access: field.modifiers,
        })
        .collect();

    if !class.has_constructor() {
        let implicit = MethodDecl::constructor(AccessFlags::PUBLIC).body(Vec::new());
        let info = lower_method(class, &mut file.constants, &implicit)?;
        file.methods.push(info);
    }
    for method in class.methods() {
        let info = lower_method(class, &mut file.constants, method)?;
        file.methods.push(info);
    }
    if let Some(info) = lower_static_init(class, &mut file.constants)? {
        file.methods.push(info);
    }

    debug!(
        "emitted {}: {} method(s), {} constant(s)",
        file.this_class,
        file.methods.len(),
        file.constants.len()
    );
    if options.verify {
        verify_class(&file)?;
    }
    Ok(file)
}

fn lower_method(
    class: &ClassDecl,
    pool: &mut ConstantPool,
    method: &MethodDecl,
) -> CodegenResult<MethodInfo> {
    let param_count = u16::try_from(method.params.len()).map_err(|_| {
        CodegenError::LimitExceeded {
            what: "parameters",
            limit: u16::MAX as usize,
        }
    })?;
    let mut emitter = MethodEmitter::new(class, pool);
    if !method.is_static() {
        emitter.declare("this")?;
    }
    for param in &method.params {
        emitter.declare(&param.name)?;
    }

    if let Some(body) = &method.body {
        trace!("lowering {}.{}", class.name(), method.display_name());
        if method.is_constructor() {
            emitter.constructor_prologue()?;
        }
        emitter.block(body)?;
        if can_complete(body) {
            emitter.writer.emit_return_void();
        }
    }

    emitter.finish(
        method.table_name(),
        method.descriptor(),
        method.modifiers,
        param_count,
    )
}

/// `<clinit>`: static field initializers then the static initializer body
fn lower_static_init(
    class: &ClassDecl,
    pool: &mut ConstantPool,
) -> CodegenResult<Option<MethodInfo>> {
    let has_field_inits = class
        .fields()
        .any(|field| field.is_static() && field.init.is_some());
    if !has_field_inits && class.static_init.is_empty() {
        return Ok(None);
    }

    let mut emitter = MethodEmitter::new(class, pool);
    let class_index = emitter.intern(class.name())?;
    for field in class.fields().filter(|field| field.is_static()) {
        if let Some(init) = &field.init {
            emitter.expr(init)?;
            let name = emitter.intern(&field.name)?;
            emitter.writer.emit_store_static(class_index, name);
        }
    }
    emitter.block(&class.static_init)?;
    if can_complete(&class.static_init) {
        emitter.writer.emit_return_void();
    }

    let info = emitter.finish(
        STATIC_INIT_NAME,
        classgen_bytecode::descriptor(std::iter::empty(), None),
        AccessFlags::STATIC,
        0,
    )?;
    Ok(Some(info))
}

struct MethodEmitter<'a> {
    class: &'a ClassDecl,
    pool: &'a mut ConstantPool,
    writer: BytecodeWriter,
    /// Visible locals, innermost last
    locals: Vec<(String, u16)>,
    /// Length of `locals` at each open scope
    marks: Vec<usize>,
    /// Slot names, indexed by slot
    slot_names: Vec<String>,
    exception_table: Vec<ExceptionEntry>,
}

impl<'a> MethodEmitter<'a> {
    fn new(class: &'a ClassDecl, pool: &'a mut ConstantPool) -> Self {
        Self {
            class,
            pool,
            writer: BytecodeWriter::new(),
            locals: Vec::new(),
            marks: Vec::new(),
            slot_names: Vec::new(),
            exception_table: Vec::new(),
        }
    }

    fn finish(
        self,
        name: &str,
        descriptor: String,
        access: AccessFlags,
        param_count: u16,
    ) -> CodegenResult<MethodInfo> {
        let max_locals = u16::try_from(self.slot_names.len()).map_err(|_| {
            CodegenError::LimitExceeded {
                what: "local variable slots",
                limit: u16::MAX as usize,
            }
        })?;
        Ok(MethodInfo {
            name: name.to_string(),
            descriptor,
            access,
            param_count,
            max_locals,
            code: self.writer.into_bytes(),
            exception_table: self.exception_table,
            local_names: self.slot_names,
        })
    }

    fn intern(&mut self, s: &str) -> CodegenResult<u32> {
        self.pool.intern(s).ok_or(CodegenError::LimitExceeded {
            what: "constant pool entries",
            limit: MAX_POOL_ENTRIES,
        })
    }

    // ===== Locals =====

    fn declare(&mut self, name: &str) -> CodegenResult<u16> {
        let slot = u16::try_from(self.slot_names.len()).map_err(|_| CodegenError::LimitExceeded {
            what: "local variable slots",
            limit: u16::MAX as usize,
        })?;
        self.slot_names.push(name.to_string());
        self.locals.push((name.to_string(), slot));
        Ok(slot)
    }

    fn lookup(&self, name: &str) -> CodegenResult<u16> {
        self.locals
            .iter()
            .rev()
            .find(|(local, _)| local == name)
            .map(|&(_, slot)| slot)
            .ok_or_else(|| {
                CodegenError::malformed(self.class.name(), format!("undefined variable `{}`", name))
            })
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> CodegenResult<T>) -> CodegenResult<T> {
        self.marks.push(self.locals.len());
        let result = f(self);
        if let Some(mark) = self.marks.pop() {
            self.locals.truncate(mark);
        }
        result
    }

    // ===== Statements =====

    fn constructor_prologue(&mut self) -> CodegenResult<()> {
        let class = self.class;
        let superclass = self.intern(class.superclass.name())?;
        let init = self.intern(CONSTRUCTOR_NAME)?;
        self.writer.emit_load_local(0);
        self.writer.emit_call_special(superclass, init, 0);
        self.writer.emit_pop();

        for field in class.fields().filter(|field| !field.is_static()) {
            if let Some(init) = &field.init {
                self.writer.emit_load_local(0);
                self.expr(init)?;
                let name = self.intern(&field.name)?;
                self.writer.emit_store_field(name);
            }
        }
        Ok(())
    }

    /// Statements up to the first one that cannot complete; the rest is unreachable
    fn block(&mut self, stmts: &[Stmt]) -> CodegenResult<()> {
        self.scoped(|this| {
            for stmt in stmts {
                this.stmt(stmt)?;
                if !stmt.can_complete() {
                    break;
                }
            }
            Ok(())
        })
    }

    fn stmt(&mut self, stmt: &Stmt) -> CodegenResult<()> {
        match stmt {
            Stmt::Expr(e) => {
                self.expr(e)?;
                self.writer.emit_pop();
            }
            Stmt::Assign { target, value } => self.store(target, value)?,
            Stmt::Define { name, value, .. } => {
                self.expr(value)?;
                let slot = self.declare(name)?;
                self.writer.emit_store_local(slot);
            }
            Stmt::Return(Some(value)) => {
                self.expr(value)?;
                self.writer.emit_return();
            }
            Stmt::Return(None) => self.writer.emit_return_void(),
            Stmt::Throw(value) => {
                self.expr(value)?;
                self.writer.emit_throw();
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expr(cond)?;
                let to_else = self.writer.emit_jump_placeholder(Opcode::JmpIfFalse);
                self.block(then_branch)?;
                if else_branch.is_empty() {
                    self.writer.patch_jump_here(to_else);
                } else {
                    let to_end = can_complete(then_branch)
                        .then(|| self.writer.emit_jump_placeholder(Opcode::Jmp));
                    self.writer.patch_jump_here(to_else);
                    self.block(else_branch)?;
                    if let Some(patch) = to_end {
                        self.writer.patch_jump_here(patch);
                    }
                }
            }
            Stmt::TryCatch { body, catches } => {
                let start = self.writer.offset() as u32;
                self.block(body)?;
                let end = self.writer.offset() as u32;

                let mut to_end = Vec::new();
                if can_complete(body) {
                    to_end.push(self.writer.emit_jump_placeholder(Opcode::Jmp));
                }
                for (index, clause) in catches.iter().enumerate() {
                    let handler = self.writer.offset() as u32;
                    if start < end {
                        self.exception_table.push(ExceptionEntry {
                            start,
                            end,
                            handler,
                            catch_type: Some(clause.ty.name().to_string()),
                        });
                    }
                    self.scoped(|this| {
                        let slot = this.declare(&clause.var)?;
                        this.writer.emit_store_local(slot);
                        this.block(&clause.body)
                    })?;
                    if index + 1 < catches.len() && can_complete(&clause.body) {
                        to_end.push(self.writer.emit_jump_placeholder(Opcode::Jmp));
                    }
                }
                for patch in to_end {
                    self.writer.patch_jump_here(patch);
                }
            }
            Stmt::Block(stmts) => self.block(stmts)?,
        }
        Ok(())
    }

    fn store(&mut self, target: &Expr, value: &Expr) -> CodegenResult<()> {
        match target {
            Expr::Var(name) => {
                let slot = self.lookup(name)?;
                self.expr(value)?;
                self.writer.emit_store_local(slot);
            }
            Expr::Field { target, name } => {
                self.expr(target)?;
                self.expr(value)?;
                let name = self.intern(name)?;
                self.writer.emit_store_field(name);
            }
            Expr::StaticField { owner, name } => {
                self.expr(value)?;
                let class = self.intern(owner.name())?;
                let name = self.intern(name)?;
                self.writer.emit_store_static(class, name);
            }
            _ => {
                return Err(CodegenError::malformed(
                    self.class.name(),
                    "assignment target is not a variable or field",
                ))
            }
        }
        Ok(())
    }

    // ===== Expressions =====

    fn expr(&mut self, expr: &Expr) -> CodegenResult<()> {
        match expr {
            Expr::Constant { value, .. } => match value {
                Literal::Null => self.writer.emit_const_null(),
                Literal::Bool(b) => self.writer.emit_const_bool(*b),
                Literal::Int(i) => self.writer.emit_const_i32(*i),
                Literal::Long(l) => self.writer.emit_const_i64(*l),
                Literal::Double(d) => self.writer.emit_const_f64(*d),
                Literal::Str(s) => {
                    let index = self.intern(s)?;
                    self.writer.emit_const_str(index);
                }
            },
            Expr::Var(name) => {
                let slot = self.lookup(name)?;
                self.writer.emit_load_local(slot);
            }
            Expr::This => self.writer.emit_load_local(0),
            Expr::Field { target, name } => {
                self.expr(target)?;
                let name = self.intern(name)?;
                self.writer.emit_load_field(name);
            }
            Expr::StaticField { owner, name } => {
                let class = self.intern(owner.name())?;
                let name = self.intern(name)?;
                self.writer.emit_load_static(class, name);
            }
            Expr::Call { target, name, args } => {
                let argc = arg_count(args)?;
                match target {
                    CallTarget::Instance(receiver) => {
                        self.expr(receiver)?;
                        self.args(args)?;
                        let name = self.intern(name)?;
                        self.writer.emit_call_virtual(name, argc);
                    }
                    CallTarget::Static(owner) => {
                        self.args(args)?;
                        let class = self.intern(owner.name())?;
                        let name = self.intern(name)?;
                        self.writer.emit_call_static(class, name, argc);
                    }
                }
            }
            Expr::New { ty, args } => {
                let argc = arg_count(args)?;
                self.args(args)?;
                let class = self.intern(ty.name())?;
                self.writer.emit_new(class, argc);
            }
            Expr::Binary { op, lhs, rhs } if op.is_logical() => {
                // lhs decides the result unless it is true for && (false for ||)
                self.expr(lhs)?;
                self.writer.emit_dup();
                let jump = if *op == BinaryOp::And {
                    Opcode::JmpIfFalse
                } else {
                    Opcode::JmpIfTrue
                };
                let to_end = self.writer.emit_jump_placeholder(jump);
                self.writer.emit_pop();
                self.expr(rhs)?;
                self.writer.patch_jump_here(to_end);
            }
            Expr::Binary { op, lhs, rhs } => {
                self.expr(lhs)?;
                self.expr(rhs)?;
                self.writer.emit_opcode(arithmetic_opcode(*op));
            }
            Expr::Not(operand) => {
                self.expr(operand)?;
                self.writer.emit_opcode(Opcode::Not);
            }
        }
        Ok(())
    }

    fn args(&mut self, args: &[Expr]) -> CodegenResult<()> {
        args.iter().try_for_each(|arg| self.expr(arg))
    }
}

fn arg_count(args: &[Expr]) -> CodegenResult<u16> {
    u16::try_from(args.len()).map_err(|_| CodegenError::LimitExceeded {
        what: "call arguments",
        limit: u16::MAX as usize,
    })
}

fn arithmetic_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Nadd,
        BinaryOp::Sub => Opcode::Nsub,
        BinaryOp::Mul => Opcode::Nmul,
        BinaryOp::Eq => Opcode::Eq,
        BinaryOp::Ne => Opcode::Ne,
        BinaryOp::Lt => Opcode::Lt,
        BinaryOp::Le => Opcode::Le,
        BinaryOp::Gt => Opcode::Gt,
        BinaryOp::Ge => Opcode::Ge,
        // short-circuit operators are lowered to jumps
        BinaryOp::And | BinaryOp::Or => Opcode::Nop,
    }
}
