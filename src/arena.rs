//! Heap-provisioned arenas.
//!
//! ```text
//!   HeapFreeList::init(capacity)
//!        │
//!        ├── libc::malloc(capacity) ──► HeapArena ─┐
//!        │                                         │ same bytes
//!        └── FreeListAllocator::from_raw_parts ◄───┘
//!
//!   destroy() / drop: allocator first, then libc::free
//! ```

use std::ptr::NonNull;

use libc::{c_void, free, malloc};

use crate::{
  block::MIN_ARENA_SIZE,
  error::InitError,
  free_list::FreeListAllocator,
  inspect::FreeBlocks,
};

/// Raw bytes obtained from the C heap and released on drop.
#[derive(Debug)]
pub struct HeapArena {
  memory: NonNull<u8>,
  capacity: usize,
}

// Plain owned bytes.
unsafe impl Send for HeapArena {}

impl HeapArena {
  pub fn new(capacity: usize) -> Result<Self, InitError> {
    if capacity < MIN_ARENA_SIZE {
      return Err(InitError::TooSmall {
        capacity,
        required: MIN_ARENA_SIZE,
      });
    }

    let raw = unsafe { malloc(capacity) };
    let memory = NonNull::new(raw.cast::<u8>()).ok_or_else(|| {
      log::warn!("malloc({}) failed", capacity);
      InitError::ProvisionFailed { capacity }
    })?;

    log::debug!("provisioned {} byte arena at {:?}", capacity, memory);
    Ok(Self { memory, capacity })
  }

  pub fn as_mut_ptr(&self) -> *mut u8 {
    self.memory.as_ptr()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }
}

impl Drop for HeapArena {
  fn drop(&mut self) {
    log::debug!("releasing {} byte arena at {:?}", self.capacity, self.memory);
    unsafe { free(self.memory.as_ptr().cast::<c_void>()) };
  }
}

/// A [`FreeListAllocator`] that owns its arena.
///
/// Dropping it (or calling [`destroy`](Self::destroy)) releases the arena, so
/// every pointer it handed out becomes dangling.
pub struct HeapFreeList {
  // declared first: dropped before the bytes it points into
  allocator: FreeListAllocator<'static>,
  arena: HeapArena,
}

impl HeapFreeList {
  /// Provisions `capacity` bytes and builds an allocator over them.
  pub fn init(capacity: usize) -> Result<Self, InitError> {
    let arena = HeapArena::new(capacity)?;
    // SAFETY: the arena is exclusively ours and outlives the allocator.
    let allocator =
      unsafe { FreeListAllocator::from_raw_parts(arena.as_mut_ptr(), arena.capacity())? };

    Ok(Self { allocator, arena })
  }

  /// Tears the allocator down and gives the arena back to the C heap.
  ///
  /// Consumes `self`; the arena is released by [`HeapArena`]'s `Drop` when
  /// `self` goes out of scope at the end of this call.
  pub fn destroy(self) {
    log::trace!("destroying allocator over {:?}", self.arena.as_mut_ptr());
  }

  /// Read-only access to the underlying allocator.
  pub fn allocator(&self) -> &FreeListAllocator<'static> {
    &self.allocator
  }

  pub fn capacity(&self) -> usize {
    self.allocator.capacity()
  }

  pub fn init_overhead(&self) -> usize {
    self.allocator.init_overhead()
  }

  pub fn available(&self) -> usize {
    self.allocator.available()
  }

  pub fn free_blocks(&self) -> FreeBlocks<'_> {
    self.allocator.free_blocks()
  }

  pub fn print_free_list(&self) {
    self.allocator.print_free_list()
  }

  /// See [`FreeListAllocator::alloc`].
  pub fn alloc(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Option<NonNull<u8>> {
    self.allocator.alloc(size, alignment)
  }

  /// See [`FreeListAllocator::free`].
  ///
  /// # Safety
  ///
  /// `ptr` must be a live allocation of this instance.
  pub unsafe fn free(
    &mut self,
    ptr: NonNull<u8>,
  ) {
    unsafe { self.allocator.free(ptr) }
  }

  /// See [`FreeListAllocator::realloc`].
  ///
  /// # Safety
  ///
  /// `ptr`, when present, must be a live allocation of this instance.
  pub unsafe fn realloc(
    &mut self,
    ptr: Option<NonNull<u8>>,
    new_size: usize,
  ) -> Option<NonNull<u8>> {
    unsafe { self.allocator.realloc(ptr, new_size) }
  }

  /// See [`FreeListAllocator::usable_size`].
  ///
  /// # Safety
  ///
  /// `ptr` must be a live allocation of this instance.
  pub unsafe fn usable_size(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    unsafe { self.allocator.usable_size(ptr) }
  }

  /// See [`FreeListAllocator::footprint`].
  ///
  /// # Safety
  ///
  /// `ptr` must be a live allocation of this instance.
  pub unsafe fn footprint(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    unsafe { self.allocator.footprint(ptr) }
  }
}

impl std::fmt::Debug for HeapFreeList {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> std::fmt::Result {
    f.debug_struct("HeapFreeList")
      .field("arena", &self.arena)
      .field("allocator", &self.allocator)
      .finish()
  }
}
