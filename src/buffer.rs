//! Record-count limited chunk buffer.

/// Chunk buffer builder.
#[derive(Clone)]
pub struct LimitedBufferBuilder {
    buffer_limit: usize,
    preallocate: bool,
}

impl LimitedBufferBuilder {
    pub fn new(buffer_limit: usize, preallocate: bool) -> Self {
        LimitedBufferBuilder {
            buffer_limit,
            preallocate,
        }
    }

    /// Creates a new empty buffer.
    pub fn build<T: Ord>(&self) -> LimitedBuffer<T> {
        if self.preallocate {
            LimitedBuffer::with_capacity(self.buffer_limit)
        } else {
            LimitedBuffer::new(self.buffer_limit)
        }
    }

    /// Returns the number of items a buffer accepts before it is full.
    pub fn limit(&self) -> usize {
        self.buffer_limit
    }
}

/// Buffer limited by elements count.
pub struct LimitedBuffer<T> {
    limit: usize,
    inner: Vec<T>,
}

impl<T: Ord> LimitedBuffer<T> {
    pub fn new(limit: usize) -> Self {
        LimitedBuffer {
            limit,
            inner: Vec::new(),
        }
    }

    pub fn with_capacity(limit: usize) -> Self {
        LimitedBuffer {
            limit,
            inner: Vec::with_capacity(limit),
        }
    }

    /// Adds a new element to the buffer.
    pub fn push(&mut self, item: T) {
        self.inner.push(item);
    }

    /// Returns buffer length
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.limit
    }

    /// Sorts buffered items in ascending order. Equal items keep no particular order.
    pub fn sort(&mut self) {
        self.inner.sort_unstable();
    }
}

impl<T> IntoIterator for LimitedBuffer<T> {
    type Item = T;
    type IntoIter = <Vec<T> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

#[cfg(test)]
mod test {
    use super::{LimitedBuffer, LimitedBufferBuilder};

    #[test]
    fn test_limited_buffer() {
        let builder = LimitedBufferBuilder::new(2, true);
        let mut buffer = builder.build();

        buffer.push(1);
        assert_eq!(buffer.is_full(), false);
        buffer.push(0);
        assert_eq!(buffer.is_full(), true);

        buffer.sort();
        let data = Vec::from_iter(buffer);
        assert_eq!(data, vec![0, 1]);
    }

    #[test]
    fn test_limited_buffer_sorts_bytes_lexicographically() {
        let mut buffer: LimitedBuffer<Vec<u8>> = LimitedBuffer::new(8);
        for item in ["b", "ab", "", "B", "a", "\u{e9}"] {
            buffer.push(item.as_bytes().to_vec());
        }
        assert_eq!(buffer.len(), 6);

        buffer.sort();
        let data: Vec<Vec<u8>> = Vec::from_iter(buffer);
        let expected: Vec<Vec<u8>> = ["", "B", "a", "ab", "b", "\u{e9}"]
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .collect();
        assert_eq!(data, expected);
    }
}
