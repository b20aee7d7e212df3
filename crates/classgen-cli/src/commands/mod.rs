pub mod disasm;
pub mod emit;
pub mod flow;
pub mod render;
