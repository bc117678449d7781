use std::ops::Range;

/// Split `[0, total)` into `workers` contiguous, disjoint ranges whose
/// sizes differ by at most one. The first `total % workers` ranges get the
/// extra index. When `workers > total` the tail ranges are empty.
pub fn partition_ranges(total: u32, workers: usize) -> Vec<Range<u32>> {
    let workers = workers.max(1) as u32;
    let base = total / workers;
    let remainder = total % workers;

    let mut ranges = Vec::with_capacity(workers as usize);
    let mut start = 0u32;
    for i in 0..workers {
        let mut end = start + base;
        if i < remainder {
            end += 1;
        }
        ranges.push(start..end);
        start = end;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_chunks_three_workers() {
        assert_eq!(partition_ranges(7, 3), vec![0..3, 3..5, 5..7]);
    }

    #[test]
    fn covers_exactly_and_balances() {
        for total in 0..40u32 {
            for workers in 1..12usize {
                let ranges = partition_ranges(total, workers);
                assert_eq!(ranges.len(), workers);
                let mut next = 0;
                for r in &ranges {
                    assert_eq!(r.start, next, "gap or overlap at {total}/{workers}");
                    next = r.end;
                }
                assert_eq!(next, total);
                let sizes: Vec<u32> = ranges.iter().map(|r| r.end - r.start).collect();
                let max = *sizes.iter().max().unwrap();
                let min = *sizes.iter().min().unwrap();
                assert!(max - min <= 1);
            }
        }
    }

    #[test]
    fn zero_workers_treated_as_one() {
        assert_eq!(partition_ranges(5, 0), vec![0..5]);
    }
}
