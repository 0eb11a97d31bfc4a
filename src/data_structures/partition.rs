use std::ops::Range;

/// Splits `0..len` into at most `chunk_count` contiguous ranges of near-equal size.
///
/// Every range but the last one has `len / chunk_count` elements; the last one absorbs the remainder.
/// When there are fewer elements than chunks, every element gets a range of its own.
/// An empty input produces no ranges.
pub fn partition(len: usize, chunk_count: usize) -> Vec<Range<usize>> {
    let chunk_count = chunk_count.max(1).min(len);
    if chunk_count == 0 {
        return Vec::new();
    }

    let chunk_size = len / chunk_count;
    (0..chunk_count)
        .map(|chunk| {
            let start = chunk * chunk_size;
            let end = match chunk + 1 == chunk_count {
                true => len,
                false => start + chunk_size,
            };
            start..end
        })
        .collect()
}

/// Splits a slice into disjoint mutable sub-slices along ranges produced by [`partition`].
pub fn split_mut<'a, T>(mut items: &'a mut [T], ranges: &[Range<usize>]) -> Vec<&'a mut [T]> {
    let mut chunks = Vec::with_capacity(ranges.len());
    let mut offset = 0;
    for range in ranges {
        assert_eq!(range.start, offset, "Ranges must be contiguous and ordered.");
        let (head, tail) = std::mem::take(&mut items).split_at_mut(range.len());
        chunks.push(head);
        items = tail;
        offset = range.end;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_chunk_absorbs_remainder() {
        assert_eq!(partition(10, 3), vec![0..3, 3..6, 6..10]);
        assert_eq!(partition(9, 3), vec![0..3, 3..6, 6..9]);
    }

    #[test]
    fn fewer_elements_than_chunks() {
        assert_eq!(partition(3, 40), vec![0..1, 1..2, 2..3]);
        assert_eq!(partition(0, 40), Vec::<Range<usize>>::new());
    }

    #[test]
    fn chunks_cover_everything_once() {
        for len in [1, 7, 40, 41, 399, 1000] {
            let chunks = partition(len, 40);
            let covered: Vec<usize> = chunks.iter().cloned().flatten().collect();
            assert_eq!(covered, (0..len).collect::<Vec<_>>());
        }
    }

    #[test]
    fn split_follows_ranges() {
        let mut items: Vec<usize> = (0..7).collect();
        let ranges = partition(items.len(), 3);
        let chunks = split_mut(&mut items, &ranges);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], &[0, 1]);
        assert_eq!(chunks[2], &[4, 5, 6]);
    }
}
