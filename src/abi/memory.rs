//! Simulated linear memory with allocation tracking.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::CanonicalAbiError;
use super::buffer::{align_to, read_array, read_slice, write_slice};

/// A live allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Allocation {
    size: usize,
    align: usize,
    seq: u64,
}

/// Allocation counters, for leak and double-free checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub allocations: u64,
    pub frees: u64,
    pub bytes_allocated: u64,
    pub bytes_freed: u64,
}

impl MemoryStats {
    pub fn live_bytes(&self) -> u64 {
        self.bytes_allocated - self.bytes_freed
    }
}

/// Position in the allocation sequence, see [`LinearMemory::release_since`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AllocationMark(u64);

/// Simulated linear memory for strings, lists, spilled parameters and
/// return areas.
///
/// Allocation is a bump allocator over a growing byte vector. Freed memory is
/// never reused, which keeps every pointer unique so that a double free or a
/// free of an unknown pointer is always detected.
///
/// Zero-sized requests do not allocate: they return a dangling pointer equal
/// to the alignment, and freeing such a pointer with size zero is a no-op.
///
/// # Example
///
/// ```
/// use wit_canon::abi::LinearMemory;
///
/// let mut mem = LinearMemory::new();
/// let ptr = mem.alloc(5, 1);
/// mem.write(ptr, b"hello").unwrap();
/// assert_eq!(mem.read(ptr, 5).unwrap(), b"hello");
/// mem.free(ptr, 5, 1).unwrap();
/// assert!(mem.live_allocations().is_empty());
/// ```
#[derive(Default, Clone, Debug)]
pub struct LinearMemory {
    data: Vec<u8>,
    live: BTreeMap<u32, Allocation>,
    freed: BTreeSet<u32>,
    stats: MemoryStats,
    next_seq: u64,
}

impl LinearMemory {
    /// Create a new empty linear memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a linear memory from existing bytes, with no tracked allocations.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Allocate space in linear memory and return the pointer (offset).
    /// Aligns the allocation to the specified alignment.
    pub fn alloc(&mut self, size: usize, align: usize) -> u32 {
        let align = align.max(1);
        if size == 0 {
            return align as u32;
        }
        // Never hand out pointer 0, so it can stay a null sentinel.
        let current_len = self.data.len().max(1);
        let aligned_offset = align_to(current_len, align);

        let ptr = aligned_offset as u32;
        self.data.resize(aligned_offset + size, 0);
        self.live.insert(
            ptr,
            Allocation {
                size,
                align,
                seq: self.next_seq,
            },
        );
        self.next_seq += 1;
        self.stats.allocations += 1;
        self.stats.bytes_allocated += size as u64;
        ptr
    }

    /// Release an allocation. `size` and `align` must match the allocation.
    pub fn free(&mut self, ptr: u32, size: usize, align: usize) -> Result<(), CanonicalAbiError> {
        let align = align.max(1);
        if size == 0 {
            return Ok(());
        }
        let allocation = match self.live.get(&ptr) {
            Some(allocation) => *allocation,
            None if self.freed.contains(&ptr) => return Err(CanonicalAbiError::DoubleFree(ptr)),
            None => return Err(CanonicalAbiError::UnknownAllocation(ptr)),
        };
        if allocation.size != size || allocation.align != align {
            return Err(CanonicalAbiError::AllocationMismatch {
                ptr,
                size,
                align,
                expected_size: allocation.size,
                expected_align: allocation.align,
            });
        }
        self.release(ptr, allocation);
        Ok(())
    }

    fn release(&mut self, ptr: u32, allocation: Allocation) {
        self.live.remove(&ptr);
        self.freed.insert(ptr);
        self.stats.frees += 1;
        self.stats.bytes_freed += allocation.size as u64;
    }

    /// Current position in the allocation sequence.
    pub fn mark(&self) -> AllocationMark {
        AllocationMark(self.next_seq)
    }

    /// Free every live allocation made after `mark`. Returns how many were freed.
    pub fn release_since(&mut self, mark: AllocationMark) -> usize {
        let doomed: Vec<(u32, Allocation)> = self
            .live
            .iter()
            .filter(|(_, allocation)| allocation.seq >= mark.0)
            .map(|(ptr, allocation)| (*ptr, *allocation))
            .collect();
        for (ptr, allocation) in &doomed {
            self.release(*ptr, *allocation);
        }
        doomed.len()
    }

    /// Pointers of allocations that have not been freed, in address order.
    pub fn live_allocations(&self) -> Vec<(u32, usize)> {
        self.live
            .iter()
            .map(|(ptr, allocation)| (*ptr, allocation.size))
            .collect()
    }

    pub fn stats(&self) -> MemoryStats {
        self.stats
    }

    /// Write bytes at a specific offset in memory.
    pub fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), CanonicalAbiError> {
        if bytes.is_empty() {
            return Ok(());
        }
        write_slice(&mut self.data, offset as usize, bytes).map_err(|_| {
            CanonicalAbiError::InvalidMemoryPointer {
                ptr: offset,
                len: bytes.len() as u32,
                memory_size: self.data.len(),
            }
        })
    }

    /// Read bytes from a specific offset in memory.
    pub fn read(&self, offset: u32, len: u32) -> Result<&[u8], CanonicalAbiError> {
        if len == 0 {
            return Ok(&[]);
        }
        read_slice(&self.data, offset as usize, len as usize).map_err(|_| {
            CanonicalAbiError::InvalidMemoryPointer {
                ptr: offset,
                len,
                memory_size: self.data.len(),
            }
        })
    }

    pub(crate) fn read_bytes<const N: usize>(&self, offset: u32) -> Result<[u8; N], CanonicalAbiError> {
        read_array(&self.data, offset as usize).map_err(|_| CanonicalAbiError::InvalidMemoryPointer {
            ptr: offset,
            len: N as u32,
            memory_size: self.data.len(),
        })
    }

    /// Get the raw bytes of the linear memory.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Check if the memory is empty (no allocations made).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the length of the memory in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }
}

impl AsRef<[u8]> for LinearMemory {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
