//! Fixed-capacity priority list for collecting the k best matches.

/// A capacity-bounded list of `(element, priority)` pairs kept sorted by
/// ascending priority.
///
/// Storage is two parallel contiguous vectors rather than a heap: k is
/// small in practice, and a binary-searched insert into a contiguous array
/// stays cache-friendly.
///
/// Once the list is full, an insert succeeds only when its priority is
/// strictly smaller than the current maximum, which it evicts. On equal
/// priorities the new pair is inserted at the first equal position.
#[derive(Debug, Clone)]
pub struct BoundedPriorityList<E> {
    capacity: usize,
    elements: Vec<E>,
    priorities: Vec<f64>,
}

impl<E: Copy> BoundedPriorityList<E> {
    /// Create an empty list that will hold at most `capacity` pairs.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            capacity,
            elements: Vec::with_capacity(capacity.min(1024)),
            priorities: Vec::with_capacity(capacity.min(1024)),
        }
    }

    /// Insert a pair, keeping the list sorted and bounded.
    pub fn add(&mut self, element: E, priority: f64) {
        if self.elements.len() >= self.capacity {
            match self.priorities.last() {
                Some(&worst) if priority < worst => {
                    self.priorities.pop();
                    self.elements.pop();
                }
                _ => return,
            }
        }
        let at = self.priorities.partition_point(|&p| p < priority);
        self.priorities.insert(at, priority);
        self.elements.insert(at, element);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.elements.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Smallest priority currently held.
    pub fn min_priority(&self) -> Option<f64> {
        self.priorities.first().copied()
    }

    /// Largest priority currently held (the eviction candidate).
    pub fn max_priority(&self) -> Option<f64> {
        self.priorities.last().copied()
    }

    /// The pair at sorted position `i`.
    pub fn get(&self, i: usize) -> Option<(E, f64)> {
        Some((*self.elements.get(i)?, *self.priorities.get(i)?))
    }

    /// Iterate pairs in ascending priority order.
    pub fn iter(&self) -> impl Iterator<Item = (E, f64)> + '_ {
        self.elements
            .iter()
            .copied()
            .zip(self.priorities.iter().copied())
    }
}
