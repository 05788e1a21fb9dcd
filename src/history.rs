//! Bounded step-back history.

use std::collections::VecDeque;

use crate::{
    config::arch_config::WordType,
    cpu::{FloatRegFile, RegFile},
    isa::riscv::RV32CPU,
    ram::CompactRam,
};

/// Compact copy of everything a step can change.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pc: WordType,
    reg_file: RegFile,
    float_reg_file: FloatRegFile,
    memory: CompactRam,
    done: bool,
}

impl Snapshot {
    pub fn capture(cpu: &RV32CPU) -> Self {
        Self {
            pc: cpu.pc,
            reg_file: cpu.reg_file,
            float_reg_file: cpu.float_reg_file,
            memory: cpu.memory.compact(),
            done: cpu.done,
        }
    }

    pub fn restore(&self) -> RV32CPU {
        RV32CPU {
            reg_file: self.reg_file,
            float_reg_file: self.float_reg_file,
            memory: self.memory.to_ram(),
            pc: self.pc,
            done: self.done,
        }
    }

    pub fn pc(&self) -> WordType {
        self.pc
    }
}

/// Most recent snapshots first out. Once full, pushing drops the oldest one.
#[derive(Debug, Clone)]
pub struct SnapshotRing {
    buf: VecDeque<Snapshot>,
    capacity: usize,
}

impl SnapshotRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        if self.capacity == 0 {
            return;
        }
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(snapshot);
    }

    pub fn pop(&mut self) -> Option<Snapshot> {
        self.buf.pop_back()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
