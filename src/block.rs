//! In-arena record shapes and the size/alignment floors derived from them.
//!
//! ```text
//!   Free region:                     Live region:
//!   ┌──────────┬─────────────────┐   ┌─────────┬──────────┬───────────┬───────┐
//!   │ FreeNode │  block_size     │   │ padding │  Header  │  payload  │ slack │
//!   │ next,size│  bytes          │   │ (front) │ size,pad │           │       │
//!   └──────────┴─────────────────┘   └─────────┴──────────┴───────────┴───────┘
//!   ▲                                ▲                    ▲
//!   block start                      block start          pointer returned
//! ```

use std::{mem, ptr};

/// Link record written at the start of every free region.
#[derive(Debug)]
#[repr(C)]
pub struct FreeNode {
  pub next: *mut FreeNode,
  /// Usable bytes after the node itself.
  pub block_size: usize,
}

/// Bookkeeping written immediately before every payload.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct AllocationHeader {
  /// Requested size plus trailing slack.
  pub block_size: usize,
  /// Distance from the physical block start to this header.
  pub padding: usize,
}

pub const NODE_SIZE: usize = mem::size_of::<FreeNode>();
pub const HEADER_SIZE: usize = mem::size_of::<AllocationHeader>();

/// Every block boundary must be able to host a [`FreeNode`].
pub const MIN_ALIGNMENT: usize = mem::align_of::<FreeNode>();

/// Smallest payload handed out, so a freed block can always hold a node.
pub const MIN_ALLOC_SIZE: usize = NODE_SIZE;

/// Smallest leftover worth turning into its own free node.
pub const MIN_SPLIT_SIZE: usize = NODE_SIZE + MIN_ALLOC_SIZE;

/// Smallest aligned arena able to serve one minimum allocation.
pub const MIN_ARENA_SIZE: usize = NODE_SIZE + HEADER_SIZE;

const _: () = assert!(HEADER_SIZE % MIN_ALIGNMENT == 0);
const _: () = assert!(mem::align_of::<AllocationHeader>() <= MIN_ALIGNMENT);
const _: () = assert!(HEADER_SIZE + MIN_ALLOC_SIZE >= NODE_SIZE);

impl FreeNode {
  /// Writes a node at `addr` and returns it.
  ///
  /// # Safety
  ///
  /// `addr` must be aligned to [`MIN_ALIGNMENT`] and `NODE_SIZE + block_size`
  /// bytes from it must be writable and unused.
  pub unsafe fn write(
    addr: *mut u8,
    block_size: usize,
    next: *mut FreeNode,
  ) -> *mut FreeNode {
    let node = addr.cast::<FreeNode>();
    debug_assert!(node.is_aligned());
    unsafe { node.write(FreeNode { next, block_size }) };
    node
  }

  /// One past the last byte covered by `node`.
  ///
  /// # Safety
  ///
  /// `node` must point to an initialized node.
  pub unsafe fn end(node: *const FreeNode) -> *mut u8 {
    unsafe { (node as *mut u8).add(NODE_SIZE + (*node).block_size) }
  }
}

impl AllocationHeader {
  /// Header sitting in front of `payload`.
  ///
  /// # Safety
  ///
  /// `payload` must have been produced by this crate's allocator.
  pub unsafe fn of(payload: *mut u8) -> *mut AllocationHeader {
    unsafe { payload.sub(HEADER_SIZE) }.cast()
  }

  /// Writes a header ending exactly at `payload`.
  ///
  /// # Safety
  ///
  /// The `HEADER_SIZE` bytes before `payload` must be writable, and `payload`
  /// must be aligned to [`MIN_ALIGNMENT`].
  pub unsafe fn write(
    payload: *mut u8,
    block_size: usize,
    padding: usize,
  ) {
    unsafe {
      ptr::write(
        Self::of(payload),
        AllocationHeader {
          block_size,
          padding,
        },
      );
    }
  }

  /// Total bytes of the physical block described by this header.
  pub fn physical_size(&self) -> usize {
    self.block_size + self.padding + HEADER_SIZE
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_floors() {
    assert!(MIN_ALLOC_SIZE >= NODE_SIZE);
    assert!(MIN_SPLIT_SIZE > NODE_SIZE);
    assert!(MIN_ALIGNMENT.is_power_of_two());
    assert_eq!(MIN_ALIGNMENT, mem::align_of::<usize>());
    assert_eq!(NODE_SIZE, 2 * mem::size_of::<usize>());
    assert_eq!(HEADER_SIZE, 2 * mem::size_of::<usize>());
  }

  #[test]
  fn test_node_and_header_share_memory() {
    let mut buf = [0usize; 8];
    let base = buf.as_mut_ptr().cast::<u8>();

    unsafe {
      let node = FreeNode::write(base, 3 * mem::size_of::<usize>(), ptr::null_mut());
      assert_eq!(FreeNode::end(node), base.add(NODE_SIZE + 3 * mem::size_of::<usize>()));

      let payload = base.add(HEADER_SIZE + MIN_ALIGNMENT);
      AllocationHeader::write(payload, 24, MIN_ALIGNMENT);
      let header = *AllocationHeader::of(payload);
      assert_eq!(header.block_size, 24);
      assert_eq!(header.padding, MIN_ALIGNMENT);
      assert_eq!(header.physical_size(), 24 + MIN_ALIGNMENT + HEADER_SIZE);
      assert_eq!(AllocationHeader::of(payload).cast::<u8>().sub(header.padding), base);
    }
  }
}
