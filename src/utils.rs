use std::cmp::Ordering::{Equal, Greater, Less};

/// Counts the elements two ascending sequences have in common with a zipper
/// merge, in `O(a.len() + b.len())`.
///
/// Both inputs must be sorted. Duplicates pair up one to one, so `[1, 1]`
/// and `[1]` intersect in a single element.
pub fn sorted_intersection_count<T>(a: &[T], b: &[T]) -> usize
where
    T: Ord,
{
    let (mut i, mut j) = (0, 0);
    let mut count = 0;

    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Less => i += 1,
            Greater => j += 1,
            Equal => {
                count += 1;
                i += 1;
                j += 1;
            }
        }
    }

    count
}
