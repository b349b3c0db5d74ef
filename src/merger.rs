//! K-way mergers.
//!
//! Both mergers take sorted inputs and yield a single sorted stream. When several inputs present
//! equal items the input with the lowest index wins, so both produce exactly the same output.
//! An input that fails to read is not read again.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::error::Error;

/// Binary heap merger implementation.
/// Merges multiple sorted inputs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of items,
/// *n* is the number of chunks (inputs).
pub struct BinaryHeapMerger<T, E, C>
where
    T: Ord,
    E: Error,
    C: IntoIterator<Item = Result<T, E>>,
{
    // binary heap is max-heap by default so we reverse it to convert it to min-heap
    items: BinaryHeap<Reverse<(T, usize)>>,
    chunks: Vec<C::IntoIter>,
    initiated: bool,
}

impl<T, E, C> BinaryHeapMerger<T, E, C>
where
    T: Ord,
    E: Error,
    C: IntoIterator<Item = Result<T, E>>,
{
    /// Creates an instance of a binary heap merger using chunks as inputs.
    /// Chunk items should be sorted in ascending order otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `chunks` - Chunks to be merged in a single sorted one
    pub fn new<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
    {
        let chunks = Vec::from_iter(chunks.into_iter().map(|c| c.into_iter()));
        let items = BinaryHeap::with_capacity(chunks.len());

        return BinaryHeapMerger {
            chunks,
            items,
            initiated: false,
        };
    }
}

impl<T, E, C> Iterator for BinaryHeapMerger<T, E, C>
where
    T: Ord,
    E: Error,
    C: IntoIterator<Item = Result<T, E>>,
{
    type Item = Result<T, E>;

    /// Returns the next item from the inputs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if !self.initiated {
            self.initiated = true;
            let mut failure = None;
            for (idx, chunk) in self.chunks.iter_mut().enumerate() {
                if let Some(item) = chunk.next() {
                    match item {
                        Ok(item) => self.items.push(Reverse((item, idx))),
                        Err(err) => {
                            failure.get_or_insert(err);
                        }
                    }
                }
            }
            if let Some(err) = failure {
                return Some(Err(err));
            }
        }

        let Reverse((result, idx)) = self.items.pop()?;
        if let Some(item) = self.chunks[idx].next() {
            match item {
                Ok(item) => self.items.push(Reverse((item, idx))),
                Err(err) => return Some(Err(err)),
            }
        }

        return Some(Ok(result));
    }
}

/// Linear scan merger implementation.
/// Every step scans the current item of all live inputs and takes the smallest one.
/// Time complexity is *m* \* *n* where *m* is the number of items, *n* is the number of chunks.
pub struct LinearScanMerger<T, E, C>
where
    T: Ord,
    E: Error,
    C: IntoIterator<Item = Result<T, E>>,
{
    // current item of every input, `None` once the input is exhausted
    heads: Vec<Option<T>>,
    chunks: Vec<C::IntoIter>,
    initiated: bool,
}

impl<T, E, C> LinearScanMerger<T, E, C>
where
    T: Ord,
    E: Error,
    C: IntoIterator<Item = Result<T, E>>,
{
    /// Creates an instance of a linear scan merger using chunks as inputs.
    /// Chunk items should be sorted in ascending order otherwise the result is undefined.
    pub fn new<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
    {
        let chunks = Vec::from_iter(chunks.into_iter().map(|c| c.into_iter()));
        let heads = Vec::with_capacity(chunks.len());

        return LinearScanMerger {
            heads,
            chunks,
            initiated: false,
        };
    }

    fn smallest(&self) -> Option<usize> {
        let mut smallest: Option<(usize, &T)> = None;
        for (idx, head) in self.heads.iter().enumerate() {
            if let Some(item) = head {
                match smallest {
                    Some((_, current)) if item >= current => {}
                    _ => smallest = Some((idx, item)),
                }
            }
        }
        smallest.map(|(idx, _)| idx)
    }
}

impl<T, E, C> Iterator for LinearScanMerger<T, E, C>
where
    T: Ord,
    E: Error,
    C: IntoIterator<Item = Result<T, E>>,
{
    type Item = Result<T, E>;

    /// Returns the next item from the inputs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if !self.initiated {
            self.initiated = true;
            let mut failure = None;
            for chunk in self.chunks.iter_mut() {
                match chunk.next() {
                    Some(Ok(item)) => self.heads.push(Some(item)),
                    Some(Err(err)) => {
                        self.heads.push(None);
                        failure.get_or_insert(err);
                    }
                    None => self.heads.push(None),
                }
            }
            if let Some(err) = failure {
                return Some(Err(err));
            }
        }

        let idx = self.smallest()?;
        let result = self.heads[idx].take()?;
        match self.chunks[idx].next() {
            Some(Ok(item)) => self.heads[idx] = Some(item),
            Some(Err(err)) => return Some(Err(err)),
            None => {}
        }

        return Some(Ok(result));
    }
}

#[cfg(test)]
mod test {
    use rand::Rng;
    use rstest::*;
    use std::error::Error;
    use std::io::{self, ErrorKind};

    use super::{BinaryHeapMerger, LinearScanMerger};

    #[rstest]
    #[case(
        vec![],
        vec![],
    )]
    #[case(
        vec![
            vec![],
            vec![]
        ],
        vec![],
    )]
    #[case(
        vec![
            vec![Ok(4), Ok(5), Ok(7)],
            vec![Ok(1), Ok(6)],
            vec![Ok(3)],
            vec![],
        ],
        vec![Ok(1), Ok(3), Ok(4), Ok(5), Ok(6), Ok(7)],
    )]
    #[case(
        vec![
            vec![Result::Err(io::Error::new(ErrorKind::Other, "test error"))]
        ],
        vec![
            Result::Err(io::Error::new(ErrorKind::Other, "test error"))
        ],
    )]
    #[case(
        vec![
            vec![Ok(3), Result::Err(io::Error::new(ErrorKind::Other, "test error"))],
            vec![Ok(1), Ok(2)],
        ],
        vec![
            Ok(1),
            Ok(2),
            Result::Err(io::Error::new(ErrorKind::Other, "test error")),
        ],
    )]
    #[case(
        vec![
            vec![Ok(1), Ok(3), Ok(5)],
            vec![Result::Err(io::Error::new(ErrorKind::Other, "test error")), Ok(4)],
            vec![Ok(2)],
        ],
        vec![
            Result::Err(io::Error::new(ErrorKind::Other, "test error")),
            Ok(1),
            Ok(2),
            Ok(3),
            Ok(5),
        ],
    )]
    fn test_merger(
        #[case] chunks: Vec<Vec<Result<i32, io::Error>>>,
        #[case] expected_result: Vec<Result<i32, io::Error>>,
        #[values(false, true)] linear: bool,
    ) {
        let actual_result: Vec<Result<i32, io::Error>> = if linear {
            LinearScanMerger::new(chunks).collect()
        } else {
            BinaryHeapMerger::new(chunks).collect()
        };
        assert!(
            compare_vectors_of_result::<_, io::Error>(&actual_result, &expected_result),
            "actual={:?}, expected={:?}",
            actual_result,
            expected_result
        );
    }

    #[rstest]
    fn test_merger_of_words(#[values(false, true)] linear: bool) {
        let chunks: Vec<Vec<Result<&str, io::Error>>> = vec![
            vec![Ok("banana"), Ok("zebra")],
            vec![Ok("apple"), Ok("cherry")],
            vec![Ok("date")],
        ];
        let actual_result: Result<Vec<&str>, io::Error> = if linear {
            LinearScanMerger::new(chunks).collect()
        } else {
            BinaryHeapMerger::new(chunks).collect()
        };
        assert_eq!(actual_result.unwrap(), vec!["apple", "banana", "cherry", "date", "zebra"]);
    }

    // Items are (key, chunk) pairs compared by key only, so the output exposes which chunk won a tie.
    #[derive(Debug)]
    struct Tagged(u8, usize);

    impl PartialEq for Tagged {
        fn eq(&self, other: &Self) -> bool {
            self.0 == other.0
        }
    }

    impl Eq for Tagged {}

    impl PartialOrd for Tagged {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }

    impl Ord for Tagged {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            self.0.cmp(&other.0)
        }
    }

    #[rstest]
    fn test_merger_ties_go_to_lowest_chunk(#[values(false, true)] linear: bool) {
        let chunks: Vec<Vec<Result<Tagged, io::Error>>> = (0..3)
            .map(|chunk| vec![Ok(Tagged(1, chunk)), Ok(Tagged(2, chunk))])
            .collect();
        let actual_result: Result<Vec<Tagged>, io::Error> = if linear {
            LinearScanMerger::new(chunks).collect()
        } else {
            BinaryHeapMerger::new(chunks).collect()
        };
        let tags: Vec<(u8, usize)> = actual_result.unwrap().into_iter().map(|t| (t.0, t.1)).collect();
        assert_eq!(tags, vec![(1, 0), (1, 1), (1, 2), (2, 0), (2, 1), (2, 2)]);
    }

    #[test]
    fn test_mergers_agree_on_random_chunks() {
        let mut rng = rand::thread_rng();
        let chunks: Vec<Vec<u16>> = (0..17)
            .map(|_| {
                let len = rng.gen_range(0..40);
                let mut chunk: Vec<u16> = (0..len).map(|_| rng.gen_range(0..64)).collect();
                chunk.sort();
                chunk
            })
            .collect();
        let as_input = |chunks: &Vec<Vec<u16>>| -> Vec<Vec<Result<u16, io::Error>>> {
            chunks.iter().map(|c| c.iter().map(|&v| Ok(v)).collect()).collect()
        };

        let heap: Result<Vec<u16>, io::Error> = BinaryHeapMerger::new(as_input(&chunks)).collect();
        let linear: Result<Vec<u16>, io::Error> = LinearScanMerger::new(as_input(&chunks)).collect();
        let heap = heap.unwrap();

        let mut expected: Vec<u16> = chunks.into_iter().flatten().collect();
        expected.sort();
        assert_eq!(heap, expected);
        assert_eq!(linear.unwrap(), heap);
    }

    fn compare_vectors_of_result<T: PartialEq, E: Error + 'static>(
        actual: &Vec<Result<T, E>>,
        expected: &Vec<Result<T, E>>,
    ) -> bool {
        actual.len() == expected.len()
            && actual
                .into_iter()
                .zip(expected)
                .all(
                    |(actual_result, expected_result)| match (actual_result, expected_result) {
                        (Ok(actual_result), Ok(expected_result)) if actual_result == expected_result => true,
                        (Err(actual_err), Err(expected_err)) => actual_err.to_string() == expected_err.to_string(),
                        _ => false,
                    },
                )
    }
}
