//! Intrusive block header
//!
//! Every block, free or allocated, starts with a header of one quantum:
//!
//! ```text
//!   ┌──────────────┬──────────────┬──────────────────────────────┐
//!   │  next (u32)  │  size (u32)  │  payload ((size - 1) quanta) │
//!   └──────────────┴──────────────┴──────────────────────────────┘
//!   ▲                             ▲
//!   header                        payload = header + 1 quantum
//! ```
//!
//! `next` is only meaningful while the block is linked in the free list.
//! Both fields are quantum indices/counts stored in native endianness.
use core::num::NonZeroU32;

/// Size of a block header, which is also the allocation quantum
pub const HEADER_SIZE: usize = 8;
const _: () = assert!(HEADER_SIZE == 2 * size_of::<u32>());

const NEXT_FIELD: usize = 0;
const SIZE_FIELD: usize = size_of::<u32>();

/// Position of a block header, expressed as a quantum index.
///
/// Index 0 is the free-list sentinel, which lives outside the arena and
/// orders before every real block. Index `k >= 1` is the header starting at
/// arena byte `(k - 1) * HEADER_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockRef(u32);

impl BlockRef {
    pub const SENTINEL: Self = Self(0);

    #[must_use]
    #[inline]
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Block whose header starts at `offset` bytes into the arena.
    ///
    /// `offset` must be quantum-aligned and addressable with a `u32` index.
    #[must_use]
    #[inline]
    // `Pool::with_config` rejects buffers whose quantum count does not fit in a `u32`
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_byte_offset(offset: usize) -> Self {
        debug_assert!(offset % HEADER_SIZE == 0);
        Self((offset / HEADER_SIZE) as u32 + 1)
    }

    #[must_use]
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }

    #[must_use]
    #[inline]
    pub const fn is_sentinel(self) -> bool {
        self.0 == 0
    }

    /// Byte offset of the header in the arena.
    #[must_use]
    #[inline]
    pub const fn header_offset(self) -> usize {
        debug_assert!(!self.is_sentinel());
        (self.0 as usize - 1) * HEADER_SIZE
    }

    /// Byte offset of the payload in the arena.
    #[must_use]
    #[inline]
    pub const fn payload_offset(self) -> usize {
        self.0 as usize * HEADER_SIZE
    }

    /// The block starting `quanta` quanta after this one.
    #[must_use]
    #[inline]
    pub const fn advance(self, quanta: u32) -> Self {
        Self(self.0 + quanta)
    }

    #[must_use]
    #[inline]
    pub const fn to_non_zero(self) -> Option<NonZeroU32> {
        NonZeroU32::new(self.0)
    }
}

/// Decoded block header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Next free block, if the block is linked
    pub next: BlockRef,
    /// Size of the block in quanta, header included
    pub size: u32,
}

impl Header {
    #[must_use]
    pub fn read(arena: &[u8], at: BlockRef) -> Self {
        let offset = at.header_offset();
        Self {
            next: BlockRef(read_u32(arena, offset + NEXT_FIELD)),
            size: read_u32(arena, offset + SIZE_FIELD),
        }
    }

    pub fn write(self, arena: &mut [u8], at: BlockRef) {
        let offset = at.header_offset();
        write_u32(arena, offset + NEXT_FIELD, self.next.0);
        write_u32(arena, offset + SIZE_FIELD, self.size);
    }
}

#[must_use]
#[inline]
pub fn read_size(arena: &[u8], at: BlockRef) -> u32 {
    read_u32(arena, at.header_offset() + SIZE_FIELD)
}

#[inline]
pub fn write_size(arena: &mut [u8], at: BlockRef, size: u32) {
    write_u32(arena, at.header_offset() + SIZE_FIELD, size);
}

#[must_use]
#[inline]
pub fn read_next(arena: &[u8], at: BlockRef) -> BlockRef {
    BlockRef(read_u32(arena, at.header_offset() + NEXT_FIELD))
}

#[inline]
pub fn write_next(arena: &mut [u8], at: BlockRef, next: BlockRef) {
    write_u32(arena, at.header_offset() + NEXT_FIELD, next.0);
}

#[inline]
fn read_u32(arena: &[u8], offset: usize) -> u32 {
    let mut raw = [0; size_of::<u32>()];
    raw.copy_from_slice(&arena[offset..offset + size_of::<u32>()]);
    u32::from_ne_bytes(raw)
}

#[inline]
fn write_u32(arena: &mut [u8], offset: usize, value: u32) {
    arena[offset..offset + size_of::<u32>()].copy_from_slice(&value.to_ne_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_ref_offsets() {
        let block = BlockRef::from_byte_offset(0);
        assert_eq!(block.index(), 1);
        assert_eq!(block.header_offset(), 0);
        assert_eq!(block.payload_offset(), HEADER_SIZE);

        let block = BlockRef::from_byte_offset(128);
        assert_eq!(block.index(), 17);
        assert_eq!(block.advance(3).header_offset(), 128 + 3 * HEADER_SIZE);
    }

    #[test]
    fn test_sentinel_orders_first() {
        assert!(BlockRef::SENTINEL.is_sentinel());
        assert!(BlockRef::SENTINEL < BlockRef::from_byte_offset(0));
        assert!(BlockRef::SENTINEL.to_non_zero().is_none());
    }

    #[test]
    fn test_header_read_write() {
        let mut arena = [0u8; 32];
        let block = BlockRef::from_index(2);
        let header = Header {
            next: BlockRef::from_index(4),
            size: 3,
        };
        header.write(&mut arena, block);

        assert_eq!(Header::read(&arena, block), header);
        assert_eq!(read_size(&arena, block), 3);
        assert_eq!(read_next(&arena, block), BlockRef::from_index(4));

        write_size(&mut arena, block, 7);
        write_next(&mut arena, block, BlockRef::SENTINEL);
        assert_eq!(
            Header::read(&arena, block),
            Header {
                next: BlockRef::SENTINEL,
                size: 7
            }
        );
        // Other quanta are untouched
        assert!(arena[..HEADER_SIZE].iter().all(|&b| b == 0));
        assert!(arena[2 * HEADER_SIZE..].iter().all(|&b| b == 0));
    }
}
