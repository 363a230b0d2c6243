//! Address-ordered circular free list
//!
//! Free blocks are threaded through their headers into a singly linked ring
//! sorted by ascending address. The ring is anchored by a zero-sized
//! sentinel that orders before every real block, so the only place where
//! address order wraps is the link from the highest free block back to the
//! sentinel.
//!
//! A roving cursor remembers where the last search or insertion ended.
//! Allocation searches start right after it, which keeps steady-state
//! workloads with similar-sized requests close to O(1).
use log::trace;

use crate::error::{PoolError, Result};
use crate::header::{self, BlockRef, HEADER_SIZE, Header};

pub struct FreeList {
    /// Link stored in the sentinel's header
    sentinel_next: BlockRef,
    /// `None` until the ring is bootstrapped by the first search or insertion
    cursor: Option<BlockRef>,
}

impl FreeList {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            sentinel_next: BlockRef::SENTINEL,
            cursor: None,
        }
    }

    /// Return the cursor, turning the empty list into a ring made of the
    /// sentinel pointing to itself if needed.
    fn bootstrap(&mut self) -> BlockRef {
        if let Some(cursor) = self.cursor {
            return cursor;
        }
        self.sentinel_next = BlockRef::SENTINEL;
        self.cursor = Some(BlockRef::SENTINEL);
        BlockRef::SENTINEL
    }

    #[inline]
    fn next(&self, arena: &[u8], at: BlockRef) -> BlockRef {
        if at.is_sentinel() {
            self.sentinel_next
        } else {
            header::read_next(arena, at)
        }
    }

    #[inline]
    fn size(&self, arena: &[u8], at: BlockRef) -> u32 {
        if at.is_sentinel() {
            0
        } else {
            header::read_size(arena, at)
        }
    }

    #[inline]
    fn link(&mut self, arena: &mut [u8], at: BlockRef, next: BlockRef) {
        if at.is_sentinel() {
            self.sentinel_next = next;
        } else {
            header::write_next(arena, at, next);
        }
    }

    /// End of a block, i.e. the position right after its last quantum.
    #[inline]
    fn end_of(&self, arena: &[u8], at: BlockRef) -> BlockRef {
        at.advance(self.size(arena, at))
    }

    /// First-fit search for a block of exactly `quanta` quanta, starting
    /// right after the cursor and making at most one lap of the ring.
    ///
    /// A block of the exact size is unlinked. A larger block is split and its
    /// tail is handed out, so the remainder keeps its position in the ring.
    pub fn take(&mut self, arena: &mut [u8], quanta: u32) -> Option<BlockRef> {
        debug_assert!(quanta > 0);

        let start = self.bootstrap();
        let mut prev = start;
        loop {
            let current = self.next(arena, prev);
            let size = self.size(arena, current);

            if size >= quanta {
                let block = if size == quanta {
                    let after = self.next(arena, current);
                    self.link(arena, prev, after);
                    current
                } else {
                    let remaining = size - quanta;
                    header::write_size(arena, current, remaining);
                    let tail = current.advance(remaining);
                    header::write_size(arena, tail, quanta);
                    tail
                };
                self.cursor = Some(prev);
                return Some(block);
            }

            if current == start {
                return None;
            }
            prev = current;
        }
    }

    /// Insert a block into the ring at its address-ordered position and merge
    /// it with whichever neighbors are adjacent in memory.
    ///
    /// The block header must carry a valid size. Nothing is modified when an
    /// error is returned.
    ///
    /// # Errors
    ///
    /// - `PoolError::DoubleFree` if the block overlaps a free block
    /// - `PoolError::InvalidPointer` if no insertion point exists in the ring
    pub fn insert(&mut self, arena: &mut [u8], block: BlockRef) -> Result<()> {
        debug_assert!(!block.is_sentinel());

        let start = self.bootstrap();
        let size = header::read_size(arena, block);

        let mut prev = start;
        loop {
            if prev == block {
                return Err(PoolError::DoubleFree);
            }
            let next = self.next(arena, prev);
            if block > prev && block < next {
                break;
            }
            // The single link where a higher block points to a lower one
            if prev >= next && (block > prev || block < next) {
                break;
            }
            prev = next;
            if prev == start {
                return Err(PoolError::InvalidPointer);
            }
        }

        let next = self.next(arena, prev);
        let end = block.advance(size);
        if !prev.is_sentinel() && self.end_of(arena, prev) > block {
            return Err(PoolError::DoubleFree);
        }
        if block < next && end > next {
            return Err(PoolError::DoubleFree);
        }

        if end == next {
            let merged = Header {
                next: self.next(arena, next),
                size: size + self.size(arena, next),
            };
            merged.write(arena, block);
            trace!(
                "Coalesced block at {:#x} with following block at {:#x}",
                block.header_offset(),
                next.header_offset()
            );
        } else {
            header::write_next(arena, block, next);
        }

        if !prev.is_sentinel() && self.end_of(arena, prev) == block {
            let merged = Header {
                next: header::read_next(arena, block),
                size: self.size(arena, prev) + header::read_size(arena, block),
            };
            merged.write(arena, prev);
            trace!(
                "Coalesced block at {:#x} into preceding block at {:#x}",
                block.header_offset(),
                prev.header_offset()
            );
        } else {
            self.link(arena, prev, block);
        }

        self.cursor = Some(prev);
        Ok(())
    }

    /// Grow `block`, currently `size` quanta long, by `extra` quanta taken
    /// from the head of the free block that immediately follows it.
    ///
    /// Returns `false`, leaving everything untouched, if there is no such
    /// free block or if it is too small.
    pub fn extend(&mut self, arena: &mut [u8], block: BlockRef, size: u32, extra: u32) -> bool {
        let Some(start) = self.cursor else {
            return false;
        };
        let end = block.advance(size);

        let mut prev = start;
        loop {
            let current = self.next(arena, prev);
            if current == end {
                let available = self.size(arena, current);
                if available < extra {
                    return false;
                }
                let after = self.next(arena, current);
                if available == extra {
                    self.link(arena, prev, after);
                } else {
                    let rest = current.advance(extra);
                    Header {
                        next: after,
                        size: available - extra,
                    }
                    .write(arena, rest);
                    self.link(arena, prev, rest);
                }
                header::write_size(arena, block, size + extra);
                self.cursor = Some(prev);
                return true;
            }
            if current == start {
                return false;
            }
            prev = current;
        }
    }

    /// Whether the `size` quanta starting at `block` overlap a free block.
    #[must_use]
    pub fn overlaps(&self, arena: &[u8], block: BlockRef, size: u32) -> bool {
        let start = block.header_offset();
        let end = start + size as usize * HEADER_SIZE;
        self.iter(arena)
            .take_while(|free| free.offset < end)
            .any(|free| free.offset + free.len > start)
    }

    /// Iterate over the free blocks in ascending address order.
    #[must_use]
    pub fn iter<'a>(&'a self, arena: &'a [u8]) -> FreeBlocks<'a> {
        FreeBlocks {
            list: self,
            arena,
            current: if self.cursor.is_some() {
                self.sentinel_next
            } else {
                BlockRef::SENTINEL
            },
        }
    }
}

/// A free block, as seen from outside the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    /// Offset of the block header in the pool buffer
    pub offset: usize,
    /// Length of the block in bytes, header included
    pub len: usize,
}

/// Iterator over the free blocks of a pool, see [`Pool::free_blocks`](crate::Pool::free_blocks)
pub struct FreeBlocks<'a> {
    list: &'a FreeList,
    arena: &'a [u8],
    current: BlockRef,
}

impl Iterator for FreeBlocks<'_> {
    type Item = FreeBlock;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_sentinel() {
            return None;
        }
        let block = self.current;
        let header = Header::read(self.arena, block);
        self.current = self.list.next(self.arena, block);
        Some(FreeBlock {
            offset: block.header_offset(),
            len: header.size as usize * HEADER_SIZE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate alloc;
    use alloc::vec::Vec;

    /// Format `sizes` as consecutive blocks at the start of `arena`.
    fn format(arena: &mut [u8], sizes: &[u32]) -> Vec<BlockRef> {
        let mut blocks = Vec::new();
        let mut at = BlockRef::from_index(1);
        for &size in sizes {
            header::write_size(arena, at, size);
            blocks.push(at);
            at = at.advance(size);
        }
        blocks
    }

    fn collect(list: &FreeList, arena: &[u8]) -> Vec<(usize, usize)> {
        list.iter(arena).map(|b| (b.offset, b.len)).collect()
    }

    #[test]
    fn test_empty_list() {
        let mut arena = [0u8; 64];
        let mut list = FreeList::new();
        assert_eq!(list.iter(&arena).count(), 0);
        assert_eq!(list.take(&mut arena, 1), None);
        assert_eq!(list.cursor, Some(BlockRef::SENTINEL));
    }

    #[test]
    fn test_insert_keeps_address_order() {
        let mut arena = [0u8; 256];
        let mut list = FreeList::new();
        let blocks = format(&mut arena, &[2, 2, 2, 2, 2]);

        list.insert(&mut arena, blocks[3]).unwrap();
        list.insert(&mut arena, blocks[1]).unwrap();
        list.insert(&mut arena, blocks[4]).unwrap();

        // blocks[3] and blocks[4] are adjacent and merge
        assert_eq!(collect(&list, &arena), [(16, 16), (48, 32)]);
    }

    #[test]
    fn test_insert_merges_both_sides() {
        let mut arena = [0u8; 256];
        let mut list = FreeList::new();
        let blocks = format(&mut arena, &[2, 3, 4]);

        list.insert(&mut arena, blocks[0]).unwrap();
        list.insert(&mut arena, blocks[2]).unwrap();
        assert_eq!(list.iter(&arena).count(), 2);

        list.insert(&mut arena, blocks[1]).unwrap();
        assert_eq!(collect(&list, &arena), [(0, 72)]);
        assert_eq!(list.cursor, Some(blocks[0]));
    }

    #[test]
    fn test_insert_rejects_double_free() {
        let mut arena = [0u8; 256];
        let mut list = FreeList::new();
        let blocks = format(&mut arena, &[4, 4]);

        list.insert(&mut arena, blocks[0]).unwrap();
        assert_eq!(list.insert(&mut arena, blocks[0]), Err(PoolError::DoubleFree));

        // A block starting inside an existing free block
        let inner = blocks[0].advance(1);
        header::write_size(&mut arena, inner, 2);
        assert_eq!(list.insert(&mut arena, inner), Err(PoolError::DoubleFree));

        assert_eq!(collect(&list, &arena), [(0, 32)]);
    }

    #[test]
    fn test_take_exact_unlinks() {
        let mut arena = [0u8; 256];
        let mut list = FreeList::new();
        let blocks = format(&mut arena, &[3, 1, 5]);
        list.insert(&mut arena, blocks[0]).unwrap();
        list.insert(&mut arena, blocks[2]).unwrap();

        assert_eq!(list.take(&mut arena, 5), Some(blocks[2]));
        assert_eq!(collect(&list, &arena), [(0, 24)]);
    }

    #[test]
    fn test_take_splits_tail() {
        let mut arena = [0u8; 256];
        let mut list = FreeList::new();
        let blocks = format(&mut arena, &[10]);
        list.insert(&mut arena, blocks[0]).unwrap();

        let taken = list.take(&mut arena, 4).unwrap();
        assert_eq!(taken, blocks[0].advance(6));
        assert_eq!(header::read_size(&arena, taken), 4);
        assert_eq!(collect(&list, &arena), [(0, 48)]);
    }

    #[test]
    fn test_take_too_large() {
        let mut arena = [0u8; 256];
        let mut list = FreeList::new();
        let blocks = format(&mut arena, &[3, 1, 3]);
        list.insert(&mut arena, blocks[0]).unwrap();
        list.insert(&mut arena, blocks[2]).unwrap();

        assert_eq!(list.take(&mut arena, 4), None);
        assert_eq!(list.iter(&arena).count(), 2);
    }

    #[test]
    fn test_take_starts_after_cursor() {
        let mut arena = [0u8; 256];
        let mut list = FreeList::new();
        let blocks = format(&mut arena, &[4, 1, 4, 1, 4]);
        for &block in &[blocks[0], blocks[2], blocks[4]] {
            list.insert(&mut arena, block).unwrap();
        }
        // The last insertion left the cursor on blocks[2]
        assert_eq!(list.take(&mut arena, 4), Some(blocks[4]));
        assert_eq!(list.take(&mut arena, 4), Some(blocks[0]));
    }

    #[test]
    fn test_overlaps() {
        let mut arena = [0u8; 256];
        let mut list = FreeList::new();
        let blocks = format(&mut arena, &[2, 4, 2, 3]);
        assert!(!list.overlaps(&arena, blocks[1], 4));

        list.insert(&mut arena, blocks[1]).unwrap();
        assert!(list.overlaps(&arena, blocks[1], 4));
        assert!(list.overlaps(&arena, blocks[1].advance(2), 1));
        assert!(list.overlaps(&arena, blocks[0], 3));
        assert!(!list.overlaps(&arena, blocks[0], 2));
        assert!(!list.overlaps(&arena, blocks[2], 2));
        assert!(!list.overlaps(&arena, blocks[3], 3));
    }

    #[test]
    fn test_extend() {
        let mut arena = [0u8; 256];
        let mut list = FreeList::new();
        let blocks = format(&mut arena, &[2, 6, 2]);
        list.insert(&mut arena, blocks[1]).unwrap();

        assert!(!list.extend(&mut arena, blocks[0], 2, 7));
        assert!(list.extend(&mut arena, blocks[0], 2, 4));
        assert_eq!(header::read_size(&arena, blocks[0]), 6);
        assert_eq!(collect(&list, &arena), [(48, 16)]);

        assert!(list.extend(&mut arena, blocks[0], 6, 2));
        assert_eq!(header::read_size(&arena, blocks[0]), 8);
        assert_eq!(list.iter(&arena).count(), 0);

        // Nothing free follows the last block
        assert!(!list.extend(&mut arena, blocks[2], 2, 1));
    }
}
