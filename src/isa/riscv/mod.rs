pub mod catalog;
mod cpu_tester;
pub mod decoder;
pub mod disasm;
pub mod executor;
pub mod instruction;

pub use catalog::Catalog;
pub use decoder::{DecodeError, DecodedInstr, decode};
pub use disasm::disassemble;
pub use executor::{RV32CPU, RuntimeError};
