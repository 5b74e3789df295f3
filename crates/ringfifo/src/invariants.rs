//! Debug assertion macros for queue invariants.
//!
//! Only active in debug builds (`debug_assert!`), so release builds pay
//! nothing for them.

// =============================================================================
// Bounded count: 0 ≤ write - read ≤ capacity
// =============================================================================

/// Assert that the number of live elements does not exceed capacity.
///
/// Used in: `Shared::push()` after computing the new write cursor
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "bounded count violated: {} live elements in {} slots",
            $count,
            $capacity
        )
    };
}

/// Assert that the read cursor does not pass the write cursor.
///
/// Used in: `Shared::pop()` and batch consumption before storing read
macro_rules! debug_assert_read_not_past_write {
    ($new_read:expr, $write:expr) => {
        debug_assert!(
            $new_read <= $write,
            "read cursor {} advanced beyond write cursor {}",
            $new_read,
            $write
        )
    };
}

// =============================================================================
// Monotonic cursors (between resizes)
// =============================================================================

/// Assert that a cursor only moves forward.
///
/// A resize deliberately rebases both cursors and is exempt.
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new > $old,
            "{} cursor did not advance: {} -> {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// Initialized range: slot(seq) is live ⟺ read ≤ seq < write
// =============================================================================

/// Assert that a slot being read lies inside the live range.
macro_rules! debug_assert_initialized_read {
    ($pos:expr, $read:expr, $write:expr) => {
        debug_assert!(
            $pos >= $read && $pos < $write,
            "reading slot at seq {} outside live range [{}, {})",
            $pos,
            $read,
            $write
        )
    };
}

// =============================================================================
// Resize preserves content
// =============================================================================

/// Assert that a resize kept every live element and actually grew.
macro_rules! debug_assert_resize_preserves {
    ($moved:expr, $count:expr, $old_capacity:expr, $new_capacity:expr) => {
        debug_assert!(
            $moved == $count && $new_capacity > $old_capacity,
            "resize moved {} of {} elements ({} -> {} slots)",
            $moved,
            $count,
            $old_capacity,
            $new_capacity
        )
    };
}

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_initialized_read;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_read_not_past_write;
pub(crate) use debug_assert_resize_preserves;
