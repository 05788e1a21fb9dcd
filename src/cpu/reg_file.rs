use std::{
    fmt::Debug,
    ops::{Index, IndexMut},
};

use crate::{
    config::arch_config::{REGFILE_CNT, SignedWordType, WordType},
    isa::riscv::catalog::Catalog,
};

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RegFile {
    data: [WordType; REGFILE_CNT],
}

impl Index<usize> for RegFile {
    type Output = WordType;

    fn index(&self, index: usize) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<usize> for RegFile {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl Debug for RegFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex_width = size_of::<WordType>() * 2;
        let catalog = Catalog::global();

        writeln!(f, "reg_file {{")?;
        for (i, val) in self.data.iter().enumerate() {
            // 4 per row
            if i % 4 == 0 {
                write!(f, "  ")?;
            }

            write!(
                f,
                "{:>6}: 0x{:0width$x}  ",
                catalog.int_reg_name(i as u8),
                val,
                width = hex_width
            )?;

            if i % 4 == 3 {
                writeln!(f)?;
            }
        }

        write!(f, "}}")
    }
}

impl RegFile {
    pub fn new() -> Self {
        Self {
            data: [0; REGFILE_CNT],
        }
    }

    pub fn read(&self, id1: u8, id2: u8) -> (WordType, WordType) {
        (self.data[id1 as usize], self.data[id2 as usize])
    }

    pub fn read_signed(&self, id: u8) -> SignedWordType {
        self.data[id as usize].cast_signed()
    }

    /// id == 0 will be ignored, if an instruction do not need to WriteBack, set id = 0.
    pub fn write(&mut self, id: u8, data: WordType) {
        if id == 0u8 {
            return;
        }

        self.data[id as usize] = data
    }

    pub fn as_slice(&self) -> &[WordType; REGFILE_CNT] {
        &self.data
    }
}
