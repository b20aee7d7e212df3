//! Human-readable listing of class files

use crate::classfile::{ClassFile, MethodInfo};
use crate::constants::ConstantPool;
use crate::encoder::{BytecodeReader, Instruction, Operands};

/// Trait for pretty-printing class file constructs
pub trait PrettyPrint {
    /// Render as a multi-line listing
    fn pretty_print(&self) -> String;
}

impl PrettyPrint for ClassFile {
    fn pretty_print(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "; class {} extends {} [{}]\n",
            self.this_class, self.super_class, self.access
        ));
        if let Some(source) = &self.metadata.source_file {
            output.push_str(&format!("; source {}\n", source));
        }
        output.push_str(&format!("; constants: {}\n", self.constants.len()));

        for field in &self.fields {
            output.push_str(&format!(
                "field {}: {} [{}]\n",
                field.name, field.type_name, field.access
            ));
        }
        for method in &self.methods {
            output.push('\n');
            output.push_str(&disassemble_method(method, &self.constants));
        }
        output
    }
}

/// Disassemble one method against its class's constant pool
pub fn disassemble_method(method: &MethodInfo, pool: &ConstantPool) -> String {
    let mut output = format!(
        "method {}{} [{}] params={} locals={}\n",
        method.name, method.descriptor, method.access, method.param_count, method.max_locals
    );
    if !method.local_names.is_empty() {
        output.push_str(&format!("  ; locals: {}\n", method.local_names.join(", ")));
    }

    let mut reader = BytecodeReader::new(&method.code);
    while reader.has_more() {
        match reader.read_instruction() {
            Ok(instr) => {
                output.push_str(&format!("  {:04}: {}\n", instr.offset, render(&instr, pool)));
            }
            Err(e) => {
                output.push_str(&format!("  <{}>\n", e));
                break;
            }
        }
    }

    for entry in &method.exception_table {
        output.push_str(&format!(
            "  catch [{:04}, {:04}) -> {:04} {}\n",
            entry.start,
            entry.end,
            entry.handler,
            entry.catch_type.as_deref().unwrap_or("*")
        ));
    }
    output
}

fn render(instr: &Instruction, pool: &ConstantPool) -> String {
    let name = instr.opcode.name();
    let s = |index: u32| match pool.get_string(index) {
        Some(value) => value.to_string(),
        None => format!("#{}?", index),
    };
    match instr.operands {
        Operands::None => name.to_string(),
        Operands::I32(value) => format!("{} {}", name, value),
        Operands::I64(value) => format!("{} {}", name, value),
        Operands::F64(value) => format!("{} {:?}", name, value),
        Operands::Local(index) => format!("{} {}", name, index),
        Operands::Jump(target) => format!("{} -> {:04}", name, target),
        Operands::Pool(index) => format!("{} #{} {:?}", name, index, s(index)),
        Operands::Virtual { name: n, argc } => format!("{} {}/{}", name, s(n), argc),
        Operands::Qualified {
            class,
            name: n,
            argc,
        } => format!("{} {}.{}/{}", name, s(class), s(n), argc),
        Operands::New { class, argc } => format!("{} {}/{}", name, s(class), argc),
        Operands::Static { class, name: n } => format!("{} {}.{}", name, s(class), s(n)),
    }
}
