// Copyright 2025 the Taproot Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-place spatial ordering of items by box centroid.

/// Reorder `items` so that slice neighbours are spatial neighbours.
///
/// Recursive median split over the centroid coordinates, alternating the
/// split axis, exactly the ordering an AABB-tree bulk build would impose on
/// its input. Consumers cut the resulting slice into fixed-size buckets to
/// obtain spatially coherent work units.
///
/// `key` returns `(cx, cy, tiebreak)` for an item. The `tiebreak` must be
/// unique per item (typically the item's original index); it makes the
/// ordering a strict total order and therefore deterministic, independent of
/// the unstable sorting underneath.
pub fn partition_by_centroid<T>(items: &mut [T], key: &impl Fn(&T) -> (i64, i64, u64)) {
    split(items, key, 0);
}

fn split<T>(items: &mut [T], key: &impl Fn(&T) -> (i64, i64, u64), axis: usize) {
    if items.len() <= 2 {
        if items.len() == 2 {
            let (a, b) = (cmp_key(&key(&items[0]), axis), cmp_key(&key(&items[1]), axis));
            if a > b {
                items.swap(0, 1);
            }
        }
        return;
    }
    let mid = items.len() / 2;
    items.select_nth_unstable_by(mid, |a, b| {
        cmp_key(&key(a), axis).cmp(&cmp_key(&key(b), axis))
    });
    let (lo, hi) = items.split_at_mut(mid);
    split(lo, key, axis ^ 1);
    split(hi, key, axis ^ 1);
}

#[inline]
fn cmp_key(k: &(i64, i64, u64), axis: usize) -> (i64, i64, u64) {
    if axis == 0 { (k.0, k.1, k.2) } else { (k.1, k.0, k.2) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn ordering_is_deterministic() {
        let make = || -> Vec<(i64, i64, u64)> {
            [(5, 5), (0, 0), (9, 1), (1, 9), (5, 5), (3, 7), (7, 3)]
                .iter()
                .enumerate()
                .map(|(i, &(x, y))| (x, y, i as u64))
                .collect()
        };
        let mut a = make();
        let mut b = make();
        partition_by_centroid(&mut a, &|it| *it);
        partition_by_centroid(&mut b, &|it| *it);
        assert_eq!(a, b);
    }

    #[test]
    fn neighbours_are_near() {
        // Two well-separated clusters must end up in contiguous halves.
        let mut items: Vec<(i64, i64, u64)> = (0..8)
            .map(|i| {
                let cluster = if i % 2 == 0 { 0 } else { 1000 };
                (cluster + i, i, i as u64)
            })
            .collect();
        partition_by_centroid(&mut items, &|it| *it);
        let (lo, hi) = items.split_at(4);
        assert!(lo.iter().all(|it| it.0 < 500));
        assert!(hi.iter().all(|it| it.0 >= 500));
    }
}
