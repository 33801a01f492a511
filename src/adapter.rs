//! Lets container libraries keep their storage inside an arena.
//!
//! [`ArenaAlloc`] implements the [`allocator_api2`] `Allocator` trait, so
//! `allocator_api2::vec::Vec`, `allocator_api2::boxed::Box` and `hashbrown`
//! maps can be built with `new_in(ArenaAlloc::new(&cell))`.

use std::{
  alloc::Layout,
  cell::RefCell,
  fmt, mem,
  ptr::{self, NonNull},
};

use allocator_api2::alloc::{AllocError, Allocator};

use crate::{arena::HeapFreeList, block::MIN_ALIGNMENT, free_list::FreeListAllocator};

/// Byte-level allocation surface consumed by [`ArenaAlloc`].
///
/// # Safety
///
/// [`ArenaAlloc`] hands the returned blocks straight to containers, so an
/// implementation must guarantee that every pointer returned by `alloc` or
/// `realloc` is valid for reads and writes of at least the requested size,
/// aligned to the requested alignment (`MIN_ALIGNMENT` for `realloc`), and
/// disjoint from every other live block until it is freed. `realloc` must
/// keep the first `min(old, new)` bytes.
///
/// Implementing the trait therefore takes `unsafe`:
///
/// ```compile_fail
/// use std::ptr::NonNull;
///
/// use freelist_arena::RawHeap;
///
/// struct Dangling;
///
/// impl RawHeap for Dangling {
///   fn alloc(
///     &mut self,
///     _size: usize,
///     _alignment: usize,
///   ) -> Option<NonNull<u8>> {
///     Some(NonNull::dangling())
///   }
///
///   unsafe fn free(
///     &mut self,
///     _ptr: NonNull<u8>,
///   ) {
///   }
///
///   unsafe fn realloc(
///     &mut self,
///     _ptr: Option<NonNull<u8>>,
///     _new_size: usize,
///   ) -> Option<NonNull<u8>> {
///     None
///   }
/// }
/// ```
pub unsafe trait RawHeap {
  fn alloc(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Option<NonNull<u8>>;

  /// # Safety
  ///
  /// `ptr` must be a live allocation of this heap.
  unsafe fn free(
    &mut self,
    ptr: NonNull<u8>,
  );

  /// # Safety
  ///
  /// `ptr`, when present, must be a live allocation of this heap.
  unsafe fn realloc(
    &mut self,
    ptr: Option<NonNull<u8>>,
    new_size: usize,
  ) -> Option<NonNull<u8>>;
}

// SAFETY: blocks are carved from disjoint regions of the arena at the
// requested alignment, and growth copies the old prefix.
unsafe impl RawHeap for FreeListAllocator<'_> {
  fn alloc(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Option<NonNull<u8>> {
    FreeListAllocator::alloc(self, size, alignment)
  }

  unsafe fn free(
    &mut self,
    ptr: NonNull<u8>,
  ) {
    unsafe { FreeListAllocator::free(self, ptr) }
  }

  unsafe fn realloc(
    &mut self,
    ptr: Option<NonNull<u8>>,
    new_size: usize,
  ) -> Option<NonNull<u8>> {
    unsafe { FreeListAllocator::realloc(self, ptr, new_size) }
  }
}

// SAFETY: forwards to the `FreeListAllocator` it owns.
unsafe impl RawHeap for HeapFreeList {
  fn alloc(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Option<NonNull<u8>> {
    HeapFreeList::alloc(self, size, alignment)
  }

  unsafe fn free(
    &mut self,
    ptr: NonNull<u8>,
  ) {
    unsafe { HeapFreeList::free(self, ptr) }
  }

  unsafe fn realloc(
    &mut self,
    ptr: Option<NonNull<u8>>,
    new_size: usize,
  ) -> Option<NonNull<u8>> {
    unsafe { HeapFreeList::realloc(self, ptr, new_size) }
  }
}

/// Stateful handle drawing memory from one shared heap.
///
/// Two handles compare equal only when they refer to the same heap, which is
/// what lets a container free through one handle what it allocated through a
/// copy of another.
pub struct ArenaAlloc<'h, H> {
  heap: &'h RefCell<H>,
}

impl<'h, H: RawHeap> ArenaAlloc<'h, H> {
  pub fn new(heap: &'h RefCell<H>) -> Self {
    Self { heap }
  }

  /// Room for `count` values of `T`. Fails on byte-count overflow or when the
  /// heap is exhausted.
  pub fn allocate_array<T>(
    &self,
    count: usize,
  ) -> Result<NonNull<T>, AllocError> {
    let bytes = count.checked_mul(mem::size_of::<T>()).ok_or(AllocError)?;
    self.raw_alloc(bytes, mem::align_of::<T>()).map(NonNull::cast)
  }

  /// Returns storage obtained from [`allocate_array`](Self::allocate_array).
  ///
  /// # Safety
  ///
  /// `ptr` must come from `allocate_array` on a handle equal to this one and
  /// must not be used afterwards.
  pub unsafe fn deallocate_array<T>(
    &self,
    ptr: NonNull<T>,
    _count: usize,
  ) {
    unsafe { self.raw_free(ptr.cast()) }
  }

  fn raw_alloc(
    &self,
    size: usize,
    alignment: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let mut heap = self.heap.try_borrow_mut().map_err(|_| AllocError)?;
    heap.alloc(size, alignment).ok_or(AllocError)
  }

  unsafe fn raw_free(
    &self,
    ptr: NonNull<u8>,
  ) {
    match self.heap.try_borrow_mut() {
      Ok(mut heap) => unsafe { heap.free(ptr) },
      // only reachable through re-entrancy, leaking is the safe option
      Err(_) => log::warn!("heap busy, leaking {:?}", ptr),
    }
  }

  unsafe fn raw_realloc(
    &self,
    ptr: NonNull<u8>,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let mut heap = self.heap.try_borrow_mut().map_err(|_| AllocError)?;
    unsafe { heap.realloc(Some(ptr), new_size.max(1)) }.ok_or(AllocError)
  }
}

impl<H> Clone for ArenaAlloc<'_, H> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<H> Copy for ArenaAlloc<'_, H> {}

impl<H> PartialEq for ArenaAlloc<'_, H> {
  fn eq(
    &self,
    other: &Self,
  ) -> bool {
    ptr::eq(self.heap, other.heap)
  }
}

impl<H> Eq for ArenaAlloc<'_, H> {}

impl<H> fmt::Debug for ArenaAlloc<'_, H> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("ArenaAlloc")
      .field("heap", &(self.heap as *const RefCell<H>))
      .finish()
  }
}

unsafe impl<H: RawHeap> Allocator for ArenaAlloc<'_, H> {
  fn allocate(
    &self,
    layout: Layout,
  ) -> Result<NonNull<[u8]>, AllocError> {
    let ptr = self.raw_alloc(layout.size(), layout.align())?;
    Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
  }

  unsafe fn deallocate(
    &self,
    ptr: NonNull<u8>,
    _layout: Layout,
  ) {
    unsafe { self.raw_free(ptr) }
  }

  unsafe fn grow(
    &self,
    ptr: NonNull<u8>,
    old_layout: Layout,
    new_layout: Layout,
  ) -> Result<NonNull<[u8]>, AllocError> {
    debug_assert!(new_layout.size() >= old_layout.size());

    // realloc moves data to MIN_ALIGNMENT blocks only
    let moved = if new_layout.align() <= MIN_ALIGNMENT {
      unsafe { self.raw_realloc(ptr, new_layout.size())? }
    } else {
      let moved = self.raw_alloc(new_layout.size(), new_layout.align())?;
      unsafe {
        ptr::copy_nonoverlapping(ptr.as_ptr(), moved.as_ptr(), old_layout.size());
        self.raw_free(ptr);
      }
      moved
    };

    Ok(NonNull::slice_from_raw_parts(moved, new_layout.size()))
  }

  unsafe fn shrink(
    &self,
    ptr: NonNull<u8>,
    old_layout: Layout,
    new_layout: Layout,
  ) -> Result<NonNull<[u8]>, AllocError> {
    debug_assert!(new_layout.size() <= old_layout.size());

    if ptr.as_ptr() as usize % new_layout.align() == 0 {
      let kept = unsafe { self.raw_realloc(ptr, new_layout.size())? };
      return Ok(NonNull::slice_from_raw_parts(kept, new_layout.size()));
    }

    let moved = self.raw_alloc(new_layout.size(), new_layout.align())?;
    unsafe {
      ptr::copy_nonoverlapping(ptr.as_ptr(), moved.as_ptr(), new_layout.size());
      self.raw_free(ptr);
    }
    Ok(NonNull::slice_from_raw_parts(moved, new_layout.size()))
  }
}

#[cfg(test)]
mod tests {
  use allocator_api2::{boxed::Box, vec::Vec};

  use super::*;
  use crate::block::NODE_SIZE;
  use crate::test_utils::{AlignedArena, init_logging};

  #[test]
  fn test_equality_is_identity() {
    let first = RefCell::new(HeapFreeList::init(256).unwrap());
    let second = RefCell::new(HeapFreeList::init(256).unwrap());

    let a = ArenaAlloc::new(&first);
    let b = a;
    let c = ArenaAlloc::new(&first);
    let d = ArenaAlloc::new(&second);

    assert_eq!(a, b);
    assert_eq!(a, c);
    assert_ne!(a, d);
  }

  #[test]
  fn test_allocate_array() {
    init_logging();
    let heap = RefCell::new(HeapFreeList::init(1024).unwrap());
    let alloc = ArenaAlloc::new(&heap);

    let values = alloc.allocate_array::<u64>(16).unwrap();
    assert_eq!(values.as_ptr() as usize % mem::align_of::<u64>(), 0);
    unsafe {
      for i in 0..16 {
        values.as_ptr().add(i).write(i as u64 * 3);
      }
      assert_eq!(values.as_ptr().add(15).read(), 45);
      alloc.deallocate_array(values, 16);
    }

    assert_eq!(heap.borrow().available(), 1024 - NODE_SIZE);
  }

  #[test]
  fn test_allocate_array_failures() {
    init_logging();
    let heap = RefCell::new(HeapFreeList::init(256).unwrap());
    let alloc = ArenaAlloc::new(&heap);

    assert_eq!(alloc.allocate_array::<u64>(usize::MAX / 4), Err(AllocError));
    assert_eq!(alloc.allocate_array::<u8>(4096), Err(AllocError));

    let _busy = heap.borrow_mut();
    assert_eq!(alloc.allocate_array::<u8>(8), Err(AllocError));
  }

  #[test]
  fn test_box_and_vec() {
    init_logging();
    let mut arena = AlignedArena::<4096>::new();
    let heap = RefCell::new(FreeListAllocator::new(arena.bytes()).unwrap());
    let alloc = ArenaAlloc::new(&heap);

    let a = Box::new_in(5u32, alloc);
    {
      let b = Box::new_in([6u8; 40], alloc);
      let mut v: Vec<u32, _> = Vec::new_in(alloc);
      for i in 0..256 {
        v.push(i);
      }
      for (i, val) in v.iter().copied().enumerate() {
        assert_eq!(i as u32, val);
      }
      assert_eq!(b[39], 6);
    }
    assert_eq!(*a, 5);
    drop(a);

    assert_eq!(heap.borrow().free_blocks().count(), 1);
  }

  #[test]
  fn test_over_aligned_growth() {
    init_logging();
    #[derive(Clone, Copy)]
    #[repr(align(64))]
    struct Line([u8; 64]);

    let heap = RefCell::new(HeapFreeList::init(16 * 1024).unwrap());
    let alloc = ArenaAlloc::new(&heap);

    let mut lines: Vec<Line, _> = Vec::new_in(alloc);
    for i in 0..40 {
      lines.push(Line([i as u8; 64]));
      assert_eq!(lines.as_ptr() as usize % 64, 0);
    }
    assert!(lines.iter().enumerate().all(|(i, line)| line.0[63] == i as u8));

    lines.truncate(3);
    lines.shrink_to_fit();
    assert_eq!(lines.as_ptr() as usize % 64, 0);
    assert_eq!(lines[2].0[0], 2);
  }

  #[test]
  fn test_shrink_keeps_pointer() {
    init_logging();
    let heap = RefCell::new(HeapFreeList::init(4096).unwrap());
    let alloc = ArenaAlloc::new(&heap);

    let mut v: Vec<u64, _> = Vec::with_capacity_in(64, alloc);
    v.extend(0..8u64);
    let before = v.as_ptr();
    let free_before = heap.borrow().available();

    v.shrink_to_fit();
    assert_eq!(v.as_ptr(), before);
    assert!(heap.borrow().available() > free_before);
    assert_eq!(v.as_slice(), &[0, 1, 2, 3, 4, 5, 6, 7]);
  }

  /// Wraps a heap and counts the blocks handed out through it.
  struct Counting<'a> {
    inner: FreeListAllocator<'a>,
    live: usize,
  }

  // SAFETY: every block comes from `inner` unchanged.
  unsafe impl RawHeap for Counting<'_> {
    fn alloc(
      &mut self,
      size: usize,
      alignment: usize,
    ) -> Option<NonNull<u8>> {
      let ptr = self.inner.alloc(size, alignment)?;
      self.live += 1;
      Some(ptr)
    }

    unsafe fn free(
      &mut self,
      ptr: NonNull<u8>,
    ) {
      self.live -= 1;
      unsafe { self.inner.free(ptr) }
    }

    unsafe fn realloc(
      &mut self,
      ptr: Option<NonNull<u8>>,
      new_size: usize,
    ) -> Option<NonNull<u8>> {
      unsafe { self.inner.realloc(ptr, new_size) }
    }
  }

  #[test]
  fn test_custom_heap_behind_the_adapter() {
    init_logging();
    let mut arena = AlignedArena::<1024>::new();
    let heap = RefCell::new(Counting {
      inner: FreeListAllocator::new(arena.bytes()).unwrap(),
      live: 0,
    });

    {
      let alloc = ArenaAlloc::new(&heap);
      let boxed = Box::new_in([7u8; 256], alloc);
      let mut words: Vec<u32, _> = Vec::new_in(alloc);
      words.extend(0..32u32);

      assert_eq!(heap.borrow().live, 2);
      assert!(boxed.iter().all(|&byte| byte == 7));
      assert_eq!(words[31], 31);
    }

    let heap = heap.into_inner();
    assert_eq!(heap.live, 0);
    assert_eq!(heap.inner.free_blocks().count(), 1);
  }
}
