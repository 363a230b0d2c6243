//! Fixed pool allocator
//!
//! The pool starts out entirely uncarved. Allocation first searches the free
//! list, and only when nothing fits does it carve a fresh block from the
//! untouched end of the buffer. Carved blocks enter the free list through the
//! same insertion path as freed blocks, so the pool is never shrunk back.
//!
//! ```text
//!   0                                    carved               capacity
//!   ┌──────┬──────────┬────┬─────────────┬──────────────────────┐
//!   │ used │   free   │used│    free     │       uncarved       │
//!   └──────┴──────────┴────┴─────────────┴──────────────────────┘
//! ```
use core::fmt;
use core::num::NonZeroU32;

use log::{debug, error, trace, warn};

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::freelist::{FreeBlocks, FreeList};
use crate::header::{self, BlockRef, HEADER_SIZE};
use crate::utils::{payload_capacity, quanta_for, quanta_to_bytes};

/// Handle to a live allocation
///
/// Handles are plain indices into the pool that issued them: using one with
/// another pool, after it was freed, or after a reset is a logic error. The
/// pool detects such misuse when it can, but never in a memory-unsafe way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Allocation(NonZeroU32);

impl Allocation {
    #[inline]
    fn from_block(block: BlockRef) -> Option<Self> {
        block.to_non_zero().map(Self)
    }

    #[inline]
    const fn block(self) -> BlockRef {
        BlockRef::from_index(self.0.get())
    }

    /// Offset of the payload in the pool buffer.
    #[must_use]
    #[inline]
    pub const fn offset(self) -> usize {
        self.block().payload_offset()
    }
}

/// A free-list allocator working inside a caller-supplied buffer
///
/// The buffer can be anything that exposes a mutable byte slice: an owned
/// array, a `&mut [u8]` borrowed from a `static`, a vector...
pub struct Pool<B> {
    buffer: B,
    config: PoolConfig,
    /// Bytes formatted into blocks so far, always a multiple of the quantum
    carved: usize,
    free: FreeList,
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Pool<B> {
    /// Create a pool over `buffer` with the default configuration
    ///
    /// # Errors
    ///
    /// - `PoolError::PoolTooLarge` if the buffer cannot be addressed with
    ///   32-bit quantum indices
    pub fn new(buffer: B) -> Result<Self> {
        Self::with_config(buffer, PoolConfig::default())
    }

    /// Create a pool over `buffer`
    ///
    /// # Errors
    ///
    /// - `PoolError::PoolTooLarge` if the buffer cannot be addressed with
    ///   32-bit quantum indices
    pub fn with_config(buffer: B, config: PoolConfig) -> Result<Self> {
        if buffer.as_ref().len() / HEADER_SIZE >= u32::MAX as usize {
            return Err(PoolError::PoolTooLarge);
        }
        Ok(Self {
            buffer,
            config,
            carved: 0,
            free: FreeList::new(),
        })
    }

    /// Discard every allocation and return to the freshly created state.
    ///
    /// All outstanding handles become invalid.
    pub fn reset(&mut self) {
        self.carved = 0;
        self.free = FreeList::new();
        debug!("Pool reset, {} bytes available", self.capacity());
    }

    /// Give the backing buffer back to the caller.
    #[must_use]
    pub fn into_inner(self) -> B {
        self.buffer
    }

    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.as_ref().len()
    }

    /// Bytes formatted into blocks so far. This never decreases until reset.
    #[must_use]
    #[inline]
    pub const fn carved_bytes(&self) -> usize {
        self.carved
    }

    #[must_use]
    #[inline]
    pub fn remaining_bytes(&self) -> usize {
        self.capacity() - self.carved
    }

    #[must_use]
    #[inline]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Free blocks in ascending address order
    #[must_use]
    pub fn free_blocks(&self) -> FreeBlocks<'_> {
        self.free.iter(self.buffer.as_ref())
    }

    /// Allocate a block with room for `size` bytes
    ///
    /// A zero-sized request is valid and yields an empty payload.
    ///
    /// # Errors
    ///
    /// - `PoolError::OutOfMemory` if no free block fits and the uncarved part
    ///   of the pool is too small. The pool is left unchanged.
    pub fn allocate(&mut self, size: usize) -> Result<Allocation> {
        self.allocate_quanta(size).inspect_err(|err| {
            warn!("Allocation of {size} bytes failed: {err}");
        })
    }

    fn allocate_quanta(&mut self, size: usize) -> Result<Allocation> {
        let quanta = quanta_for(size).ok_or(PoolError::OutOfMemory)?;

        if let Some(allocation) = self
            .free
            .take(self.buffer.as_mut(), quanta)
            .and_then(Allocation::from_block)
        {
            return Ok(allocation);
        }

        // A successful carve always links a block of at least `quanta` quanta
        self.carve(quanta)?;
        self.free
            .take(self.buffer.as_mut(), quanta)
            .and_then(Allocation::from_block)
            .ok_or(PoolError::OutOfMemory)
    }

    /// Format a block of at least `quanta` quanta from the uncarved part of
    /// the pool and hand it to the free list.
    fn carve(&mut self, quanta: u32) -> Result<()> {
        let quanta = quanta.max(self.config.min_carve_quanta());
        let bytes = quanta_to_bytes(quanta).ok_or(PoolError::OutOfMemory)?;
        let end = self
            .carved
            .checked_add(bytes)
            .filter(|&end| end <= self.capacity())
            .ok_or(PoolError::OutOfMemory)?;

        let block = BlockRef::from_byte_offset(self.carved);
        let arena = self.buffer.as_mut();
        header::write_size(arena, block, quanta);
        self.free.insert(arena, block)?;
        self.carved = end;

        trace!(
            "Carved {bytes} bytes at {:#x}, {} bytes left",
            block.header_offset(),
            self.remaining_bytes()
        );
        Ok(())
    }

    /// Return a block to the pool. `None` is a no-op.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidPointer` if the handle does not designate a block
    ///   of this pool
    /// - `PoolError::DoubleFree` if the block is already free
    pub fn deallocate(&mut self, allocation: Option<Allocation>) -> Result<()> {
        let Some(allocation) = allocation else {
            return Ok(());
        };

        self.locate(allocation)
            .and_then(|(block, _)| self.free.insert(self.buffer.as_mut(), block))
            .inspect_err(|err| {
                error!("Rejected free of {:#x}: {err}", allocation.offset());
            })
    }

    /// Resize an allocation, moving it if needed
    ///
    /// - `None` behaves like [`allocate`](Self::allocate).
    /// - A zero `size` behaves like [`deallocate`](Self::deallocate) and
    ///   returns `Ok(None)`.
    /// - If the block already has room for `size` bytes, or if the free block
    ///   right after it can supply the missing quanta, the handle is kept.
    /// - Otherwise a new block is allocated, the payload copied over and the
    ///   old block freed.
    ///
    /// # Errors
    ///
    /// - `PoolError::OutOfMemory` if no block of the new size can be found.
    ///   The original block and its content are left untouched.
    /// - `PoolError::InvalidPointer` or `PoolError::DoubleFree`, see
    ///   [`deallocate`](Self::deallocate)
    pub fn reallocate(
        &mut self,
        allocation: Option<Allocation>,
        size: usize,
    ) -> Result<Option<Allocation>> {
        let Some(allocation) = allocation else {
            return self.allocate(size).map(Some);
        };
        if size == 0 {
            self.deallocate(Some(allocation))?;
            return Ok(None);
        }

        let (block, current) = self.locate(allocation)?;
        let quanta = quanta_for(size).ok_or(PoolError::OutOfMemory)?;

        if quanta <= current {
            return Ok(Some(allocation));
        }
        if self
            .free
            .extend(self.buffer.as_mut(), block, current, quanta - current)
        {
            trace!(
                "Grew block at {:#x} in place to {quanta} quanta",
                block.header_offset()
            );
            return Ok(Some(allocation));
        }

        let moved = self.allocate(size)?;
        let len = payload_capacity(current).min(size);
        let src = block.payload_offset();
        self.buffer
            .as_mut()
            .copy_within(src..src + len, moved.offset());

        if let Err(err) = self.deallocate(Some(allocation)) {
            self.deallocate(Some(moved))?;
            return Err(err);
        }
        Ok(Some(moved))
    }

    /// Payload of a live allocation
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidPointer` if the handle does not designate a block
    ///   of this pool
    /// - `PoolError::DoubleFree` if the block has been freed
    pub fn payload(&self, allocation: Allocation) -> Result<&[u8]> {
        let (block, size) = self.locate(allocation)?;
        let start = block.payload_offset();
        Ok(&self.buffer.as_ref()[start..start + payload_capacity(size)])
    }

    /// Mutable payload of a live allocation
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidPointer` if the handle does not designate a block
    ///   of this pool
    /// - `PoolError::DoubleFree` if the block has been freed
    pub fn payload_mut(&mut self, allocation: Allocation) -> Result<&mut [u8]> {
        let (block, size) = self.locate(allocation)?;
        let start = block.payload_offset();
        Ok(&mut self.buffer.as_mut()[start..start + payload_capacity(size)])
    }

    /// Number of payload bytes reserved for an allocation
    ///
    /// This is the requested size rounded up to the quantum.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidPointer` if the handle does not designate a block
    ///   of this pool
    /// - `PoolError::DoubleFree` if the block has been freed
    pub fn capacity_of(&self, allocation: Allocation) -> Result<usize> {
        self.locate(allocation)
            .map(|(_, size)| payload_capacity(size))
    }

    /// Recover the header of an allocation and check that the block lies in
    /// the carved region and is not free.
    fn locate(&self, allocation: Allocation) -> Result<(BlockRef, u32)> {
        let block = allocation.block();
        let index = block.index() as usize;
        // Index right after the last carved quantum
        let carved_end = self.carved / HEADER_SIZE + 1;

        if index >= carved_end {
            return Err(PoolError::InvalidPointer);
        }
        let size = header::read_size(self.buffer.as_ref(), block);
        if size == 0 || size as usize > carved_end - index {
            return Err(PoolError::InvalidPointer);
        }
        if self.free.overlaps(self.buffer.as_ref(), block, size) {
            return Err(PoolError::DoubleFree);
        }
        Ok((block, size))
    }
}

impl<B: AsRef<[u8]>> fmt::Debug for Pool<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("capacity", &self.buffer.as_ref().len())
            .field("carved", &self.carved)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
