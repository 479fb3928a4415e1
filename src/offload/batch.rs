//! Fixed-capacity point batching.

use crate::point::Point;

/// Points per flushed batch
pub const BATCH_CAPACITY: usize = 128;

/// Accumulates points and cuts them into full batches.
#[derive(Debug)]
pub struct BatchBuffer {
    capacity: usize,
    residual: Vec<Point>,
}

impl BatchBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            residual: Vec::with_capacity(capacity),
        }
    }

    /// Append `points` and return every batch that filled up, in order.
    /// Whatever does not fill a batch is carried as the residual.
    pub fn push(&mut self, points: Vec<Point>) -> Vec<Vec<Point>> {
        let mut full = Vec::new();
        for point in points {
            self.residual.push(point);
            if self.residual.len() == self.capacity {
                full.push(std::mem::replace(
                    &mut self.residual,
                    Vec::with_capacity(self.capacity),
                ));
            }
        }
        full
    }

    /// Take the residual, if any
    pub fn take(&mut self) -> Option<Vec<Point>> {
        if self.residual.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.residual))
        }
    }

    pub fn len(&self) -> usize {
        self.residual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residual.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BatchBuffer {
    fn default() -> Self {
        Self::new(BATCH_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;

    fn points(n: usize) -> Vec<Point> {
        (0..n)
            .map(|i| Point::new(format!("p{}", i), Category::Logging))
            .collect()
    }

    #[test]
    fn test_exact_fill_flushes_once() {
        let mut buf = BatchBuffer::default();
        let full = buf.push(points(128));
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].len(), 128);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_overflow_keeps_residual() {
        let mut buf = BatchBuffer::default();
        let full = buf.push(points(129));
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].len(), 128);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.take().map(|b| b.len()), Some(1));
        assert!(buf.take().is_none());
    }

    #[test]
    fn test_large_input_cuts_several_batches() {
        let mut buf = BatchBuffer::new(10);
        assert!(buf.push(points(7)).is_empty());
        let full = buf.push(points(25));
        assert_eq!(full.iter().map(Vec::len).collect::<Vec<_>>(), vec![10, 10, 10]);
        assert_eq!(full[0][0].name(), "p0");
        assert_eq!(buf.len(), 2);
    }
}
