//! Ring scan behind round-robin selection.
//!
//! The scan starts at a cursor position and walks the ring once, returning the
//! first slot the predicate accepts. It never loops past a full revolution,
//! so the worst case is `len` predicate calls.

/// Outcome of a successful scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Index of the accepted slot.
    pub index: usize,
    /// How many rejected slots were stepped over before the hit.
    pub skipped: usize,
}

/// Walk a ring of `len` slots starting at `cursor mod len` and return the
/// first slot for which `accept` holds.
///
/// Returns `None` when `len` is zero or no slot is accepted. The reduction
/// happens before the offset is added, so any `u64` cursor (including values
/// next to `u64::MAX`) maps onto the ring without overflow.
pub fn scan<F>(len: usize, cursor: u64, mut accept: F) -> Option<Hit>
where
    F: FnMut(usize) -> bool,
{
    if len == 0 {
        return None;
    }

    let base = (cursor % len as u64) as usize;
    (0..len)
        .map(|skipped| Hit {
            index: (base + skipped) % len,
            skipped,
        })
        .find(|hit| accept(hit.index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_ring_has_no_hit() {
        assert_eq!(scan(0, 7, |_| true), None);
    }

    #[test]
    fn first_slot_wins_when_accepted() {
        assert_eq!(scan(3, 4, |_| true), Some(Hit { index: 1, skipped: 0 }));
    }

    #[test]
    fn skips_rejected_slots_and_wraps() {
        let alive = [true, false, false];
        let hit = scan(3, 1, |i| alive[i]).unwrap();
        assert_eq!(hit, Hit { index: 0, skipped: 2 });
    }

    #[test]
    fn cursor_near_max_stays_on_ring() {
        let hit = scan(3, u64::MAX, |_| true).unwrap();
        assert_eq!(hit.index, (u64::MAX % 3) as usize);

        let alive = [false, true, false];
        let hit = scan(3, u64::MAX, |i| alive[i]).unwrap();
        assert_eq!(hit.index, 1);
    }

    proptest! {
        #[test]
        fn hit_is_accepted_and_nearest(
            alive in prop::collection::vec(any::<bool>(), 1..32),
            cursor in any::<u64>(),
        ) {
            let len = alive.len();
            let mut calls = 0usize;
            let result = scan(len, cursor, |i| { calls += 1; alive[i] });

            prop_assert!(calls <= len);
            match result {
                None => prop_assert!(alive.iter().all(|a| !a)),
                Some(hit) => {
                    prop_assert!(alive[hit.index]);
                    let base = (cursor % len as u64) as usize;
                    prop_assert_eq!(hit.index, (base + hit.skipped) % len);
                    for step in 0..hit.skipped {
                        prop_assert!(!alive[(base + step) % len]);
                    }
                }
            }
        }
    }
}
