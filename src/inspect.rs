//! Read-only views over the free list.

use std::marker::PhantomData;

use crate::block::{FreeNode, NODE_SIZE};

/// One free region, relative to the start of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
  /// Offset of the free node from the arena start.
  pub offset: usize,
  /// Bytes usable after the node.
  pub size: usize,
}

impl FreeBlock {
  /// Offset one past the last byte of the region.
  pub fn end(&self) -> usize {
    self.offset + NODE_SIZE + self.size
  }
}

/// Iterator over the free list, see
/// [`FreeListAllocator::free_blocks`](crate::FreeListAllocator::free_blocks).
///
/// Borrowing the allocator keeps the list from changing while it is walked.
pub struct FreeBlocks<'l> {
  base: usize,
  current: *const FreeNode,
  _list: PhantomData<&'l FreeNode>,
}

impl FreeBlocks<'_> {
  pub(crate) fn new(
    base: *const u8,
    head: *const FreeNode,
  ) -> Self {
    Self {
      base: base as usize,
      current: head,
      _list: PhantomData,
    }
  }
}

impl Iterator for FreeBlocks<'_> {
  type Item = FreeBlock;

  fn next(&mut self) -> Option<Self::Item> {
    if self.current.is_null() {
      return None;
    }

    // SAFETY: nodes reachable from the head are initialized and the list
    // cannot be mutated while `'l` is alive.
    let node = unsafe { &*self.current };
    let block = FreeBlock {
      offset: self.current as usize - self.base,
      size: node.block_size,
    };
    self.current = node.next;
    Some(block)
  }
}
