//! # Quantalloc: Deterministic Fixed-Pool Allocator
//!
//! Quantalloc provides `malloc`/`free`/`realloc` semantics inside a byte buffer
//! supplied by the caller. It never asks the platform for memory, which makes
//! it suitable for `no_std` targets without a heap, or wherever a dedicated and
//! predictable allocator is preferred.
//!
//! ## Architecture
//!
//! - **Quanta**: all sizes are counted in quanta of 8 bytes, the size of a
//!   block header. A block of `n` quanta holds `n - 1` quanta of payload.
//! - **Free list**: free blocks form a circular, address-ordered list threaded
//!   through their own headers. Allocation is first-fit, starting where the
//!   previous search stopped, and splits oversized blocks from their tail.
//!   Deallocation coalesces the block with both address neighbors.
//! - **Carving**: the pool is formatted lazily. When no free block fits, a new
//!   block of at least [`DEFAULT_MIN_CARVE_QUANTA`] quanta is carved from the
//!   untouched end of the buffer.
//!
//! Blocks are addressed by [`Allocation`] handles, which are offsets into the
//! pool rather than raw pointers, so the crate contains no `unsafe` code.
//!
//! The allocator is not thread safe. Callers sharing a pool across threads or
//! interrupt handlers must serialize access themselves.
//!
//! ## Usage
//!
//! ```rust
//! use quantalloc::Pool;
//!
//! let mut buffer = [0u8; 4096];
//! let mut pool = Pool::new(&mut buffer[..]).unwrap();
//!
//! let a = pool.allocate(100).unwrap();
//! pool.payload_mut(a).unwrap()[..5].copy_from_slice(b"hello");
//!
//! let a = pool.reallocate(Some(a), 300).unwrap().unwrap();
//! assert_eq!(&pool.payload(a).unwrap()[..5], b"hello");
//!
//! pool.deallocate(Some(a)).unwrap();
//! ```
#![warn(clippy::pedantic, clippy::nursery)]
#![forbid(unsafe_code)]
#![no_std]

mod config;
mod error;
mod freelist;
mod header;
mod pool;
mod utils;

pub use config::{DEFAULT_MIN_CARVE_QUANTA, PoolConfig};
pub use error::{PoolError, Result};
pub use freelist::{FreeBlock, FreeBlocks};
pub use header::HEADER_SIZE;
pub use pool::{Allocation, Pool};
