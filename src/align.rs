/// Rounds `value` up to the next multiple of `align`.
///
/// `align` must be a power of two and the addition must not overflow; use
/// [`checked_align_up`] when `value` comes from a caller.
///
/// # Examples
///
/// ```rust
/// use freelist_arena::align_to;
///
/// assert_eq!(align_to!(13, 8), 16);
/// assert_eq!(align_to!(16, 8), 16);
/// assert_eq!(align_to!(1, 64), 64);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Rounds `value` up to a multiple of `align`, or `None` on overflow.
#[inline]
pub const fn checked_align_up(
  value: usize,
  align: usize,
) -> Option<usize> {
  debug_assert!(align.is_power_of_two());

  match value.checked_add(align - 1) {
    Some(bumped) => Some(bumped & !(align - 1)),
    None => None,
  }
}

/// Bytes needed to move `addr` forward to the next multiple of `align`.
#[inline]
pub const fn padding_for(
  addr: usize,
  align: usize,
) -> Option<usize> {
  match checked_align_up(addr, align) {
    Some(aligned) => Some(aligned - addr),
    None => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align_to() {
    for align in [1usize, 2, 4, 8, 16, 64, 4096] {
      let mut alignments = Vec::new();

      for i in 0..10 {
        let values = (align * i + 1)..=(align * (i + 1));
        alignments.push((values, align * (i + 1)));
      }

      for (values, expected) in alignments {
        for value in values {
          assert_eq!(expected, align_to!(value, align));
          assert_eq!(Some(expected), checked_align_up(value, align));
        }
      }
    }
  }

  #[test]
  fn test_checked_align_up_overflow() {
    assert_eq!(checked_align_up(usize::MAX, 8), None);
    assert_eq!(checked_align_up(usize::MAX - 3, 8), None);
    assert_eq!(checked_align_up(usize::MAX, 1), Some(usize::MAX));
  }

  #[test]
  fn test_padding_for() {
    assert_eq!(padding_for(0, 8), Some(0));
    assert_eq!(padding_for(17, 8), Some(7));
    assert_eq!(padding_for(48, 64), Some(16));
    assert_eq!(padding_for(usize::MAX, 16), None);
  }
}
