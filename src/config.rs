#![allow(unused)]

pub mod ram_config {
    use crate::config::arch_config::WordType;

    pub const DATA_BASE: WordType = 0x1001_0000;
    pub const TEXT_BASE: WordType = 0x0040_0000;
    /// One past the highest stack byte. The stack region grows down from here.
    pub const STACK_TOP: WordType = 0x7fff_effc;

    pub const DEFAULT_PC_VALUE: WordType = TEXT_BASE;

    /// Capacity of the data and text segments.
    pub const SEGMENT_SIZE: usize = 1 << 22;
    pub const DEFAULT_STACK_SIZE: usize = 1 << 16;
}

pub mod arch_config {
    /// Register storage. Registers are 64 bits wide even though the memory map fits in 32 bits.
    pub type WordType = u64;
    pub type SignedWordType = i64;

    /// Addresses produced by the assembler and its relocations.
    pub type AddrType = u32;

    pub const XLEN: usize = 64;
    pub const REGFILE_CNT: usize = 32;

    /// `a0`, first argument and syscall payload.
    pub const REG_A0: u8 = 10;
    /// `a7`, syscall number.
    pub const REG_A7: u8 = 17;
    pub const REG_SP: u8 = 2;
    pub const REG_RA: u8 = 1;
}

pub mod history_config {
    pub const DEFAULT_CAPACITY: usize = 1000;
    pub const DEFAULT_BURST_STEPS: usize = 10_000;
}

use crate::config::{history_config::*, ram_config::*};

/// Host-side knobs of an [`Emulator`](crate::Emulator). The memory map itself is fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorConfig {
    pub(crate) stack_size: usize,
    pub(crate) history_capacity: usize,
    pub(crate) burst_steps: usize,
    pub(crate) init_stack_pointer: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            history_capacity: DEFAULT_CAPACITY,
            burst_steps: DEFAULT_BURST_STEPS,
            init_stack_pointer: true,
        }
    }
}

impl EmulatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stack is rounded up to a multiple of 4 and capped at [`SEGMENT_SIZE`].
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size.next_multiple_of(4).min(SEGMENT_SIZE);
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn burst_steps(mut self, steps: usize) -> Self {
        self.burst_steps = steps.max(1);
        self
    }

    pub fn init_stack_pointer(mut self, enable: bool) -> Self {
        self.init_stack_pointer = enable;
        self
    }

    pub fn get_stack_size(&self) -> usize {
        self.stack_size
    }

    pub fn get_history_capacity(&self) -> usize {
        self.history_capacity
    }

    pub fn get_burst_steps(&self) -> usize {
        self.burst_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = EmulatorConfig::new()
            .stack_size(1001)
            .history_capacity(10)
            .burst_steps(0);

        assert_eq!(config.get_stack_size(), 1004);
        assert_eq!(config.get_history_capacity(), 10);
        assert_eq!(config.get_burst_steps(), 1);
        assert!(config.init_stack_pointer);
    }

    #[test]
    fn test_memory_map_disjoint() {
        let text_end = TEXT_BASE + SEGMENT_SIZE as u64;
        let data_end = DATA_BASE + SEGMENT_SIZE as u64;
        assert!(text_end <= DATA_BASE);
        assert!(data_end <= STACK_TOP - SEGMENT_SIZE as u64);
    }
}
