//! First-fit allocator over a fixed arena with an address-ordered free list.

use std::{marker::PhantomData, ptr, ptr::NonNull};

use crate::{
  align::{checked_align_up, padding_for},
  align_to,
  block::{
    AllocationHeader, FreeNode, HEADER_SIZE, MIN_ALIGNMENT, MIN_ALLOC_SIZE, MIN_ARENA_SIZE,
    MIN_SPLIT_SIZE, NODE_SIZE,
  },
  error::InitError,
  inspect::FreeBlocks,
};

/// Where a request lands inside one candidate free node.
#[derive(Debug, Clone, Copy)]
struct Fit {
  padding: usize,
  required: usize,
  slack: usize,
  leftover: usize,
}

/// General purpose allocator managing a borrowed byte range.
///
/// The allocator never touches memory outside the arena it was built over and
/// never asks the system for more. It is not synchronized: share it between
/// threads only behind a lock.
pub struct FreeListAllocator<'a> {
  memory: *mut u8,
  capacity: usize,
  free_list: *mut FreeNode,
  _arena: PhantomData<&'a mut [u8]>,
}

// The allocator exclusively owns its arena for `'a`.
unsafe impl Send for FreeListAllocator<'_> {}

impl<'a> FreeListAllocator<'a> {
  /// Builds an allocator over `arena`.
  pub fn new(arena: &'a mut [u8]) -> Result<Self, InitError> {
    unsafe { Self::from_raw_parts(arena.as_mut_ptr(), arena.len()) }
  }

  /// Builds an allocator over `capacity` bytes starting at `memory`.
  ///
  /// # Safety
  ///
  /// `[memory, memory + capacity)` must be valid for reads and writes and must
  /// not be accessed by anything else while the allocator (or any pointer it
  /// handed out) is alive.
  pub unsafe fn from_raw_parts(
    memory: *mut u8,
    capacity: usize,
  ) -> Result<Self, InitError> {
    if memory.is_null() {
      log::warn!("refusing to initialize over a null arena");
      return Err(InitError::NullArena);
    }

    let adjustment = padding_for(memory as usize, MIN_ALIGNMENT).ok_or(InitError::TooSmall {
      capacity,
      required: MIN_ARENA_SIZE,
    })?;
    let required = adjustment + MIN_ARENA_SIZE;

    if capacity < required {
      log::warn!(
        "arena of {} bytes at {:?} is too small, need {}",
        capacity,
        memory,
        required
      );
      return Err(InitError::TooSmall { capacity, required });
    }

    let head = unsafe {
      FreeNode::write(
        memory.add(adjustment),
        capacity - adjustment - NODE_SIZE,
        ptr::null_mut(),
      )
    };

    log::debug!(
      "initialized arena {:?}, capacity = {}, usable = {}",
      memory,
      capacity,
      capacity - adjustment - NODE_SIZE
    );

    Ok(Self {
      memory,
      capacity,
      free_list: head,
      _arena: PhantomData,
    })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Start of the arena; [`FreeBlock`](crate::FreeBlock) offsets count from here.
  pub fn as_ptr(&self) -> *const u8 {
    self.memory
  }

  /// Bytes lost to start alignment and the first free node.
  pub fn init_overhead(&self) -> usize {
    align_to!(self.memory as usize, MIN_ALIGNMENT) - self.memory as usize + NODE_SIZE
  }

  /// Whether `ptr` points inside the arena.
  pub fn contains(
    &self,
    ptr: *const u8,
  ) -> bool {
    let addr = ptr as usize;
    let start = self.memory as usize;
    addr >= start && addr - start < self.capacity
  }

  /// Sum of the usable sizes of every free node.
  pub fn available(&self) -> usize {
    self.free_blocks().map(|block| block.size).sum()
  }

  /// Lazily walks the free list in address order.
  pub fn free_blocks(&self) -> FreeBlocks<'_> {
    FreeBlocks::new(self.memory, self.free_list)
  }

  /// Dumps the free list to stdout.
  pub fn print_free_list(&self) {
    println!("free list:");

    let mut count = 0;
    for (index, block) in self.free_blocks().enumerate() {
      println!(
        "block: {}, size = {} at offset {} ({:?})",
        index,
        block.size,
        block.offset,
        self.memory.wrapping_add(block.offset)
      );
      count += 1;
    }

    if count == 0 {
      println!("empty!");
    }
    println!("-------------------------------------");
  }

  /// Allocates `size` bytes aligned to `alignment`.
  ///
  /// Sizes and alignments under [`MIN_ALLOC_SIZE`] / [`MIN_ALIGNMENT`] are
  /// raised to those floors. Returns `None` when no free region fits, or when
  /// `alignment` is not a power of two.
  pub fn alloc(
    &mut self,
    size: usize,
    alignment: usize,
  ) -> Option<NonNull<u8>> {
    if !alignment.is_power_of_two() {
      log::warn!("alloc({}, {}) rejected: alignment is not a power of two", size, alignment);
      return None;
    }

    let size = size.max(MIN_ALLOC_SIZE);
    let alignment = alignment.max(MIN_ALIGNMENT);

    let mut prev: *mut FreeNode = ptr::null_mut();
    let mut curr = self.free_list;

    unsafe {
      while !curr.is_null() {
        if let Some(fit) = Self::fit(curr, size, alignment) {
          let payload = self.carve(prev, curr, size, fit);
          log::trace!("alloc({}, {}) -> {:?}", size, alignment, payload);
          return NonNull::new(payload);
        }

        prev = curr;
        curr = (*curr).next;
      }
    }

    log::debug!("alloc({}, {}) -> out of memory", size, alignment);
    None
  }

  /// Returns the block behind `ptr` to the free list, merging it with
  /// address-adjacent free neighbours.
  ///
  /// # Safety
  ///
  /// `ptr` must come from [`alloc`](Self::alloc) or
  /// [`realloc`](Self::realloc) on this allocator and must not have been freed
  /// since.
  pub unsafe fn free(
    &mut self,
    ptr: NonNull<u8>,
  ) {
    unsafe {
      let header_ptr = AllocationHeader::of(ptr.as_ptr());
      let header = header_ptr.read();
      let start = header_ptr.cast::<u8>().sub(header.padding);

      debug_assert!(self.contains(start));
      debug_assert!(header.physical_size() >= NODE_SIZE);

      let node = FreeNode::write(start, header.physical_size() - NODE_SIZE, ptr::null_mut());
      log::trace!("free({:?}) -> {} bytes at {:?}", ptr, header.physical_size(), start);

      self.insert(node);
    }
  }

  /// Resizes the allocation behind `ptr`.
  ///
  /// - `None` behaves like `alloc(new_size, MIN_ALIGNMENT)`.
  /// - `new_size == 0` frees `ptr` and returns `None`.
  /// - Shrinking releases the tail in place when it is large enough to stand
  ///   as its own free block.
  /// - Growing past the usable size moves the data to a fresh
  ///   [`MIN_ALIGNMENT`] block; on failure `None` is returned and `ptr` is
  ///   left untouched.
  ///
  /// # Safety
  ///
  /// Same requirements on `ptr` as [`free`](Self::free).
  pub unsafe fn realloc(
    &mut self,
    ptr: Option<NonNull<u8>>,
    new_size: usize,
  ) -> Option<NonNull<u8>> {
    let Some(ptr) = ptr else {
      return self.alloc(new_size, MIN_ALIGNMENT);
    };

    if new_size == 0 {
      unsafe { self.free(ptr) };
      return None;
    }

    unsafe {
      let header = AllocationHeader::of(ptr.as_ptr());
      let old_size = (*header).block_size;
      let new_size = new_size.max(MIN_ALLOC_SIZE);

      // ptr is node aligned, so rounding the size keeps the split point aligned
      let aligned_new_size = checked_align_up(new_size, MIN_ALIGNMENT).unwrap_or(usize::MAX);

      if aligned_new_size < old_size && old_size - aligned_new_size >= MIN_SPLIT_SIZE {
        let tail = ptr.as_ptr().add(aligned_new_size + HEADER_SIZE);
        AllocationHeader::write(tail, old_size - aligned_new_size - HEADER_SIZE, 0);
        self.free(NonNull::new_unchecked(tail));

        (*header).block_size = aligned_new_size;
        log::trace!("realloc({:?}) shrank {} -> {} in place", ptr, old_size, aligned_new_size);
        return Some(ptr);
      }

      if new_size > old_size {
        let Some(moved) = self.alloc(new_size, MIN_ALIGNMENT) else {
          log::debug!("realloc({:?}, {}) -> out of memory", ptr, new_size);
          return None;
        };
        ptr::copy_nonoverlapping(ptr.as_ptr(), moved.as_ptr(), old_size.min(new_size));
        self.free(ptr);

        log::trace!("realloc({:?}) grew {} -> {}, moved to {:?}", ptr, old_size, new_size, moved);
        return Some(moved);
      }
    }

    Some(ptr)
  }

  /// Usable bytes behind a live allocation.
  ///
  /// # Safety
  ///
  /// Same requirements on `ptr` as [`free`](Self::free).
  pub unsafe fn usable_size(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    unsafe { (*AllocationHeader::of(ptr.as_ptr())).block_size }
  }

  /// Arena bytes a live allocation occupies, front padding and header
  /// included.
  ///
  /// # Safety
  ///
  /// Same requirements on `ptr` as [`free`](Self::free).
  pub unsafe fn footprint(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    unsafe { (*AllocationHeader::of(ptr.as_ptr())).physical_size() }
  }

  unsafe fn fit(
    node: *mut FreeNode,
    size: usize,
    alignment: usize,
  ) -> Option<Fit> {
    let raw_payload = (node as usize).checked_add(HEADER_SIZE)?;
    let padding = padding_for(raw_payload, alignment)?;

    let unaligned = HEADER_SIZE.checked_add(padding)?.checked_add(size)?;
    let required = checked_align_up(unaligned, MIN_ALIGNMENT)?;
    let total = unsafe { (*node).block_size } + NODE_SIZE;

    if total < required {
      return None;
    }

    Some(Fit {
      padding,
      required,
      slack: required - unaligned,
      leftover: total - required,
    })
  }

  /// Hands out the front of `curr` and unlinks it, splitting off the tail
  /// when it is big enough.
  unsafe fn carve(
    &mut self,
    prev: *mut FreeNode,
    curr: *mut FreeNode,
    size: usize,
    fit: Fit,
  ) -> *mut u8 {
    unsafe {
      let start = curr.cast::<u8>();
      let mut slack = fit.slack;
      let mut replacement = (*curr).next;

      if fit.leftover >= MIN_SPLIT_SIZE {
        replacement = FreeNode::write(
          start.add(fit.required),
          fit.leftover - NODE_SIZE,
          replacement,
        );
        log::debug!(
          "split {:?}: {} used, {} left at {:?}",
          start,
          fit.required,
          fit.leftover,
          replacement
        );
      } else {
        slack += fit.leftover;
        log::debug!("no split at {:?}: {} bytes folded into slack", start, fit.leftover);
      }

      if prev.is_null() {
        self.free_list = replacement;
      } else {
        (*prev).next = replacement;
      }

      let payload = start.add(HEADER_SIZE + fit.padding);
      AllocationHeader::write(payload, size + slack, fit.padding);
      payload
    }
  }

  /// Links `node` at its address-ordered position and coalesces it.
  unsafe fn insert(
    &mut self,
    node: *mut FreeNode,
  ) {
    unsafe {
      let mut prev: *mut FreeNode = ptr::null_mut();
      let mut curr = self.free_list;

      while !curr.is_null() && curr < node {
        prev = curr;
        curr = (*curr).next;
      }
      debug_assert!(curr != node, "double free of {:?}", node);

      (*node).next = curr;
      if prev.is_null() {
        self.free_list = node;
      } else {
        (*prev).next = node;
      }

      if !curr.is_null() && FreeNode::end(node) == curr.cast::<u8>() {
        (*node).block_size += NODE_SIZE + (*curr).block_size;
        (*node).next = (*curr).next;
        log::debug!("coalesced {:?} with next {:?}", node, curr);
      }

      if !prev.is_null() && FreeNode::end(prev) == node.cast::<u8>() {
        (*prev).block_size += NODE_SIZE + (*node).block_size;
        (*prev).next = (*node).next;
        log::debug!("coalesced {:?} into prev {:?}", node, prev);
      }
    }
  }
}

impl std::fmt::Debug for FreeListAllocator<'_> {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>,
  ) -> std::fmt::Result {
    f.debug_struct("FreeListAllocator")
      .field("memory", &self.memory)
      .field("capacity", &self.capacity)
      .field("free_blocks", &self.free_blocks().count())
      .field("available", &self.available())
      .finish()
  }
}
