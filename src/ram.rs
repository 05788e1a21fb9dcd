use std::fmt::Debug;

use crate::{
    config::{
        arch_config::WordType,
        ram_config::{DATA_BASE, DEFAULT_STACK_SIZE, SEGMENT_SIZE, STACK_TOP, TEXT_BASE},
    },
    utils::MemValue,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MemError {
    #[error("out of bounds read at 0x{0:08x}")]
    OutOfBoundsRead(WordType),
    #[error("out of bounds write at 0x{0:08x}")]
    OutOfBoundsWrite(WordType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Data,
    Text,
    Stack,
}

#[derive(Clone, PartialEq, Eq)]
struct Region {
    base: WordType,
    bytes: Box<[u8]>,
    /// Data and text: end offset of the furthest write.
    /// Stack: number of bytes in use below [`STACK_TOP`].
    highwater: usize,
    grows_down: bool,
}

impl Region {
    fn new(base: WordType, size: usize, grows_down: bool) -> Self {
        Self {
            base,
            bytes: vec![0u8; size].into_boxed_slice(),
            highwater: 0,
            grows_down,
        }
    }

    fn contains(&self, addr: WordType) -> bool {
        addr >= self.base && addr - self.base < self.bytes.len() as WordType
    }

    fn offset_of(&self, addr: WordType, size: usize) -> Option<usize> {
        if !self.contains(addr) {
            return None;
        }
        let offset = (addr - self.base) as usize;
        (offset + size <= self.bytes.len()).then_some(offset)
    }

    fn mark_written(&mut self, offset: usize, size: usize) {
        let mark = if self.grows_down {
            self.bytes.len() - offset
        } else {
            offset + size
        };
        self.highwater = self.highwater.max(mark);
    }

    fn compact(&self) -> Box<[u8]> {
        let keep = self.highwater.next_multiple_of(4).min(self.bytes.len());
        if self.grows_down {
            self.bytes[self.bytes.len() - keep..].into()
        } else {
            self.bytes[..keep].into()
        }
    }

    fn uncompact(base: WordType, size: usize, grows_down: bool, trimmed: &[u8], highwater: usize) -> Self {
        let mut region = Self::new(base, size, grows_down);
        if grows_down {
            region.bytes[size - trimmed.len()..].copy_from_slice(trimmed);
        } else {
            region.bytes[..trimmed.len()].copy_from_slice(trimmed);
        }
        region.highwater = highwater;
        region
    }
}

fn stack_region(stack_size: usize) -> Region {
    let size = stack_size.min(SEGMENT_SIZE);
    Region::new(STACK_TOP - size as WordType, size, true)
}

/// The emulated address space: data, text and stack regions at fixed addresses.
#[derive(Clone, PartialEq, Eq)]
pub struct Ram {
    data: Region,
    text: Region,
    stack: Region,
}

impl Debug for Ram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ram")
            .field("data_highwater", &self.data.highwater)
            .field("text_highwater", &self.text.highwater)
            .field("stack_highwater", &self.stack.highwater)
            .field("stack_size", &self.stack.bytes.len())
            .finish()
    }
}

impl Ram {
    pub fn new() -> Self {
        Self::with_stack_size(DEFAULT_STACK_SIZE)
    }

    /// `stack_size` is capped at [`SEGMENT_SIZE`], which keeps the stack clear of the data
    /// segment.
    pub fn with_stack_size(stack_size: usize) -> Self {
        Self {
            data: Region::new(DATA_BASE, SEGMENT_SIZE, false),
            text: Region::new(TEXT_BASE, SEGMENT_SIZE, false),
            stack: stack_region(stack_size),
        }
    }

    pub fn stack_size(&self) -> usize {
        self.stack.bytes.len()
    }

    /// Replaces the stack with a zeroed one of `stack_size` bytes, capped like
    /// [`with_stack_size`](Self::with_stack_size).
    pub fn with_stack(mut self, stack_size: usize) -> Self {
        if stack_size.min(SEGMENT_SIZE) != self.stack_size() {
            self.stack = stack_region(stack_size);
        }
        self
    }

    /// Pure range test, no side effect.
    pub fn region_of(&self, addr: WordType) -> Option<RegionKind> {
        if self.data.contains(addr) {
            Some(RegionKind::Data)
        } else if self.text.contains(addr) {
            Some(RegionKind::Text)
        } else if self.stack.contains(addr) {
            Some(RegionKind::Stack)
        } else {
            None
        }
    }

    fn region(&self, kind: RegionKind) -> &Region {
        match kind {
            RegionKind::Data => &self.data,
            RegionKind::Text => &self.text,
            RegionKind::Stack => &self.stack,
        }
    }

    fn region_mut(&mut self, kind: RegionKind) -> &mut Region {
        match kind {
            RegionKind::Data => &mut self.data,
            RegionKind::Text => &mut self.text,
            RegionKind::Stack => &mut self.stack,
        }
    }

    fn locate(&self, addr: WordType, size: usize) -> Option<(RegionKind, usize)> {
        let kind = self.region_of(addr)?;
        let offset = self.region(kind).offset_of(addr, size)?;
        Some((kind, offset))
    }

    pub fn highwater(&self, kind: RegionKind) -> usize {
        self.region(kind).highwater
    }

    pub fn read<T: MemValue>(&self, addr: WordType) -> Result<T, MemError> {
        let (kind, offset) = self
            .locate(addr, T::SIZE)
            .ok_or(MemError::OutOfBoundsRead(addr))?;
        Ok(T::from_le_slice(&self.region(kind).bytes[offset..]))
    }

    pub fn write<T: MemValue>(&mut self, addr: WordType, data: T) -> Result<(), MemError> {
        let (kind, offset) = self
            .locate(addr, T::SIZE)
            .ok_or(MemError::OutOfBoundsWrite(addr))?;
        let region = self.region_mut(kind);
        data.write_le_slice(&mut region.bytes[offset..]);
        region.mark_written(offset, T::SIZE);
        Ok(())
    }

    pub fn insert_section(&mut self, section: &[u8], start_addr: WordType) -> Result<(), MemError> {
        let (kind, offset) = self
            .locate(start_addr, section.len())
            .ok_or(MemError::OutOfBoundsWrite(start_addr))?;
        let region = self.region_mut(kind);
        region.bytes[offset..offset + section.len()].copy_from_slice(section);
        region.mark_written(offset, section.len());
        Ok(())
    }

    /// Bytes from `addr` up to (not including) the first NUL.
    pub fn read_c_string(&self, addr: WordType) -> Result<Vec<u8>, MemError> {
        let mut bytes = Vec::new();
        let mut curr = addr;
        loop {
            let byte = self.read::<u8>(curr)?;
            if byte == 0 {
                return Ok(bytes);
            }
            bytes.push(byte);
            curr = curr.wrapping_add(1);
        }
    }

    /// Trimmed copy of every region, cut at its highwater mark rounded up to 4 bytes.
    pub fn compact(&self) -> CompactRam {
        CompactRam {
            data: self.data.compact(),
            text: self.text.compact(),
            stack: self.stack.compact(),
            highwater: [self.data.highwater, self.text.highwater, self.stack.highwater],
            stack_size: self.stack.bytes.len(),
        }
    }
}

/// Snapshot form of [`Ram`]. Zero-extended back to full capacity by [`CompactRam::to_ram`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactRam {
    data: Box<[u8]>,
    text: Box<[u8]>,
    stack: Box<[u8]>,
    highwater: [usize; 3],
    stack_size: usize,
}

impl CompactRam {
    pub fn to_ram(&self) -> Ram {
        let [data_mark, text_mark, stack_mark] = self.highwater;
        Ram {
            data: Region::uncompact(DATA_BASE, SEGMENT_SIZE, false, &self.data, data_mark),
            text: Region::uncompact(TEXT_BASE, SEGMENT_SIZE, false, &self.text, text_mark),
            stack: Region::uncompact(
                STACK_TOP - self.stack_size as WordType,
                self.stack_size,
                true,
                &self.stack,
                stack_mark,
            ),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.data.len() + self.text.len() + self.stack.len()
    }
}
