use std::{cell::RefCell, ptr::NonNull};

use allocator_api2::vec::Vec as ArenaVec;
use freelist_arena::{ArenaAlloc, HeapFreeList, MIN_ALIGNMENT};
use hashbrown::{DefaultHashBuilder, HashMap};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Random alloc/free traffic over a 10 KiB arena.
///
/// Every block is filled with 0xAA when allocated and checked before it is
/// freed, so a split or merge that lands on live data shows up here.
fn stress(seed: u64) {
  println!("starting stress test (seed = {:#x})...", seed);

  let mut heap = HeapFreeList::init(10 * 1024).expect("10 KiB arena");
  let mut rng = StdRng::seed_from_u64(seed);
  let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();
  let mut failures = 0;

  for _ in 0..1000 {
    if rng.random_range(0..10) < 7 {
      let size = rng.random_range(1..=100);
      match heap.alloc(size, MIN_ALIGNMENT) {
        Some(ptr) => {
          unsafe { ptr.as_ptr().write_bytes(0xAA, size) };
          live.push((ptr, size));
        }
        None => failures += 1,
      }
    } else if !live.is_empty() {
      let (ptr, size) = live.swap_remove(rng.random_range(0..live.len()));
      unsafe {
        assert!((0..size).all(|i| *ptr.as_ptr().add(i) == 0xAA), "memory corrupted!");
        heap.free(ptr);
      }
    }
  }

  println!(
    "freeing {} remaining allocations ({} requests did not fit)...",
    live.len(),
    failures
  );
  for (ptr, _) in live {
    unsafe { heap.free(ptr) };
  }

  println!("final state should be one block");
  heap.print_free_list();
  heap.destroy();
}

/// A map of string lists whose every byte comes from the arena.
fn containers() {
  println!("starting container test...");

  let heap = RefCell::new(HeapFreeList::init(1024 * 1024).expect("1 MiB arena"));
  {
    let alloc = ArenaAlloc::new(&heap);
    let mut map = HashMap::with_hasher_in(DefaultHashBuilder::default(), alloc);

    for i in 0..50 {
      let mut key = ArenaVec::new_in(alloc);
      key.extend_from_slice(format!("key_{}", i).as_bytes());

      let mut values = ArenaVec::new_in(alloc);
      for value in ["value_a", "value_b", "value_c"] {
        let mut bytes = ArenaVec::new_in(alloc);
        bytes.extend_from_slice(value.as_bytes());
        values.push(bytes);
      }
      map.insert(key, values);
    }
    println!("map populated with {} items", map.len());

    let mut lookup = ArenaVec::new_in(alloc);
    lookup.extend_from_slice(b"key_10");
    assert_eq!(&map[&lookup][1][..], b"value_b");
    println!("data verification successful");

    heap.borrow().print_free_list();
  }

  println!("after the map is dropped:");
  heap.borrow().print_free_list();
  println!("container test passed!");
}

fn main() {
  env_logger::init();

  let seed = std::env::args()
    .nth(1)
    .and_then(|arg| arg.parse().ok())
    .unwrap_or(0x5EED);

  stress(seed);
  println!("-------------------");
  containers();
}
