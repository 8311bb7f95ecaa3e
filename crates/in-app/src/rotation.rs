//! Rotation policy: which item of a campaign to offer next.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::eligibility::SkipReason;

/// A fresh random permutation of `0..len`. The caller's item order is never
/// touched.
pub fn shuffled_order<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    order
}

/// Pick an item index.
///
/// Random mode scans a shuffled order for the first ready item. Sequential
/// mode looks only at `cursor`; it does not skip ahead to a later ready item.
pub fn pick<T, R>(
    items: &[T],
    random_order: bool,
    cursor: usize,
    ready: impl Fn(&T) -> Result<(), SkipReason>,
    rng: &mut R,
) -> Result<usize, SkipReason>
where
    R: Rng + ?Sized,
{
    if random_order {
        let mut first_miss = None;
        for index in shuffled_order(items.len(), rng) {
            match ready(&items[index]) {
                Ok(()) => return Ok(index),
                Err(SkipReason::NotDownloaded) => first_miss = Some(SkipReason::NotDownloaded),
                Err(other) => {
                    first_miss.get_or_insert(other);
                }
            }
        }
        return Err(first_miss.unwrap_or(SkipReason::NotDownloaded));
    }

    let index = if cursor < items.len() { cursor } else { 0 };
    let item = items.get(index).ok_or(SkipReason::NotDownloaded)?;
    ready(item).map(|()| index)
}
