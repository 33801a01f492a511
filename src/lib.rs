//! # freelist-arena - A Fixed-Arena Free-List Allocator
//!
//! This crate provides a general purpose **first-fit free-list allocator**
//! that lives entirely inside one block of memory handed to it by the caller.
//! It never asks the system for more memory: when the arena is full,
//! allocation fails.
//!
//! ## Overview
//!
//! Free regions are chained together in address order. Each free region
//! starts with a small node holding the link and the region size; each live
//! region starts with a header that remembers how to rebuild the node:
//!
//! ```text
//!   Arena after a few allocations and frees:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │ ┌────────┬──────┬────────┬─────────┬──────┬────────────────────────┐ │
//!   │ │ A (hdr │ free │ B (hdr │ C (pad, │ free │        free            │ │
//!   │ │ + data)│      │ + data)│ hdr,dat)│      │                        │ │
//!   │ └────────┴──────┴────────┴─────────┴──────┴────────────────────────┘ │
//!   │            ▲                         ▲      ▲                        │
//!   │  free_list ┘ ───── next ────────────►┘      │                        │
//!   │                                             └ merged on free         │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - `alloc` walks the list and takes the first region that fits, splitting
//!   off the tail when it is big enough to be useful.
//! - `free` puts the region back at its address-ordered position and merges
//!   it with the neighbours it touches.
//! - `realloc` shrinks in place or moves to a fresh region when growing.
//!
//! ## Crate Structure
//!
//! ```text
//!   freelist_arena
//!   ├── align      - Alignment helpers (align_to!, checked_align_up)
//!   ├── block      - Free node / allocation header layout and size floors
//!   ├── free_list  - FreeListAllocator over a borrowed arena
//!   ├── arena      - HeapArena / HeapFreeList (libc provisioned arena)
//!   ├── inspect    - Free list iteration for diagnostics
//!   ├── adapter    - ArenaAlloc, an allocator_api2 Allocator for containers
//!   └── error      - InitError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use freelist_arena::HeapFreeList;
//!
//! let mut heap = HeapFreeList::init(4096).unwrap();
//!
//! let ptr = heap.alloc(64, 16).unwrap();
//! assert_eq!(ptr.as_ptr() as usize % 16, 0);
//!
//! unsafe {
//!   ptr.as_ptr().write_bytes(0xAB, 64);
//!   let ptr = heap.realloc(Some(ptr), 256).unwrap();
//!   assert_eq!(*ptr.as_ptr().add(63), 0xAB);
//!   heap.free(ptr);
//! }
//!
//! assert_eq!(heap.free_blocks().count(), 1);
//! heap.destroy();
//! ```
//!
//! Containers can be hosted on the arena through [`ArenaAlloc`]:
//!
//! ```rust
//! use std::cell::RefCell;
//!
//! use allocator_api2::vec::Vec;
//! use freelist_arena::{ArenaAlloc, HeapFreeList};
//!
//! let heap = RefCell::new(HeapFreeList::init(4096).unwrap());
//! let mut values = Vec::new_in(ArenaAlloc::new(&heap));
//! values.extend(0..100u32);
//! assert_eq!(values.iter().sum::<u32>(), 4950);
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no internal locking, wrap it in a `Mutex` to
//!   share it
//! - **Fixed size**: the arena never grows
//! - **First fit**: O(n) in the number of free regions
//!
//! ## Safety
//!
//! `alloc` is safe. `free` and `realloc` are `unsafe`: the pointer must be a
//! live allocation of the same allocator. Double frees and foreign pointers
//! are not detected in release builds.

pub mod align;
mod adapter;
mod arena;
pub mod block;
mod error;
mod free_list;
mod inspect;

pub use adapter::{ArenaAlloc, RawHeap};
pub use arena::{HeapArena, HeapFreeList};
pub use block::{MIN_ALIGNMENT, MIN_ALLOC_SIZE, MIN_SPLIT_SIZE};
pub use error::InitError;
pub use free_list::FreeListAllocator;
pub use inspect::{FreeBlock, FreeBlocks};
