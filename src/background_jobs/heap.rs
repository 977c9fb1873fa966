//! Binary heap ordered by an injected comparator.
//!
//! Unlike `std::collections::BinaryHeap` this supports removing an arbitrary
//! element, which the dispatcher needs to purge an expired job from the middle
//! of the scheduled-time queue.

use std::fmt;

type Comparator<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Min-heap where "min" is whatever `comes_before` says goes first.
///
/// Invariant: for every node, neither child comes before it.
pub struct PriorityQueue<T> {
    nodes: Vec<T>,
    comes_before: Comparator<T>,
}

impl<T> PriorityQueue<T> {
    pub fn new<F>(comes_before: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self::with_capacity(0, comes_before)
    }

    pub fn with_capacity<F>(capacity: usize, comes_before: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self {
            nodes: Vec::with_capacity(capacity),
            comes_before: Box::new(comes_before),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The element that comes first, without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.nodes.first()
    }

    /// Read-only traversal in storage order (not sorted).
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.nodes.iter()
    }

    pub fn push(&mut self, value: T) {
        self.nodes.push(value);
        self.sift_up(self.nodes.len() - 1);
    }

    /// Remove and return the element that comes first.
    pub fn pop(&mut self) -> Option<T> {
        self.remove_at(0)
    }

    /// Remove the first element (in storage order) matching `predicate`.
    pub fn remove_where<P>(&mut self, predicate: P) -> Option<T>
    where
        P: FnMut(&T) -> bool,
    {
        let index = self.nodes.iter().position(predicate)?;
        self.remove_at(index)
    }

    pub fn remove(&mut self, value: &T) -> Option<T>
    where
        T: PartialEq,
    {
        self.remove_where(|node| node == value)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Drain into a vector ordered by the comparator.
    pub fn into_sorted_vec(mut self) -> Vec<T> {
        let mut sorted = Vec::with_capacity(self.nodes.len());
        while let Some(node) = self.pop() {
            sorted.push(node);
        }
        sorted
    }

    fn before(&self, a: usize, b: usize) -> bool {
        (self.comes_before)(&self.nodes[a], &self.nodes[b])
    }

    fn remove_at(&mut self, index: usize) -> Option<T> {
        if index >= self.nodes.len() {
            return None;
        }

        let removed = self.nodes.swap_remove(index);

        // The former last node now sits at `index` and may belong above or below it.
        if index < self.nodes.len() {
            if index > 0 && self.before(index, parent(index)) {
                self.sift_up(index);
            } else {
                self.sift_down(index);
            }
        }

        Some(removed)
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = parent(index);
            if !self.before(index, parent) {
                break;
            }
            self.nodes.swap(index, parent);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.nodes.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut first = index;

            if left < len && self.before(left, first) {
                first = left;
            }
            if right < len && self.before(right, first) {
                first = right;
            }
            if first == index {
                break;
            }

            self.nodes.swap(index, first);
            index = first;
        }
    }

    #[cfg(test)]
    fn is_heap_ordered(&self) -> bool {
        (1..self.nodes.len()).all(|child| !self.before(child, parent(child)))
    }
}

fn parent(index: usize) -> usize {
    (index - 1) / 2
}

impl<T: fmt::Debug> fmt::Debug for PriorityQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("nodes", &self.nodes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn min_heap() -> PriorityQueue<i64> {
        PriorityQueue::new(|a: &i64, b: &i64| a < b)
    }

    /// Deterministic scrambled sequence with duplicates.
    fn scrambled(n: i64) -> Vec<i64> {
        (0..n).map(|i| (i * 37 + 11) % 23).collect()
    }

    #[test]
    fn test_empty_queue() {
        let mut heap = min_heap();
        assert!(heap.is_empty());
        assert_eq!(heap.len(), 0);
        assert!(heap.peek().is_none());
        assert!(heap.pop().is_none());
        assert!(heap.remove(&3).is_none());
    }

    #[test]
    fn test_pops_in_comparator_order() {
        let mut heap = min_heap();
        let values = scrambled(50);
        for value in &values {
            heap.push(*value);
            assert!(heap.is_heap_ordered());
        }
        assert_eq!(heap.len(), values.len());

        let mut expected = values.clone();
        expected.sort();

        let mut popped = Vec::new();
        while let Some(value) = heap.pop() {
            assert!(heap.is_heap_ordered());
            popped.push(value);
        }
        assert_eq!(popped, expected);
        assert!(heap.is_empty());
    }

    #[test]
    fn test_comparator_decides_order() {
        let mut heap = PriorityQueue::new(|a: &i64, b: &i64| a > b);
        for value in [4, 9, 1, 7] {
            heap.push(value);
        }
        assert_eq!(heap.into_sorted_vec(), vec![9, 7, 4, 1]);
    }

    #[test]
    fn test_peek_does_not_mutate() {
        let mut heap = min_heap();
        heap.push(5);
        heap.push(2);
        heap.push(8);

        assert_eq!(heap.peek(), Some(&2));
        assert_eq!(heap.peek(), Some(&2));
        assert_eq!(heap.len(), 3);
    }

    #[test]
    fn test_remove_interior_nodes_keeps_heap_order() {
        let mut heap = min_heap();
        for value in 0..40 {
            heap.push(value);
        }

        for victim in [17, 3, 39, 22, 0, 31, 8] {
            assert_eq!(heap.remove(&victim), Some(victim));
            assert!(heap.is_heap_ordered(), "heap broken after removing {victim}");
        }
        assert_eq!(heap.len(), 33);

        let sorted = heap.into_sorted_vec();
        assert!(sorted.windows(2).all(|w| w[0] <= w[1]));
        assert!(!sorted.contains(&17));
        assert!(!sorted.contains(&0));
    }

    #[test]
    fn test_remove_moves_swapped_node_up() {
        // Removing 90 pulls the last node (3) into a subtree whose parent is larger.
        let mut heap = min_heap();
        for value in [1, 50, 2, 60, 90, 4, 5, 70, 80, 95, 99, 6, 7, 8, 3] {
            heap.push(value);
        }
        assert!(heap.is_heap_ordered());

        heap.remove(&90);
        assert!(heap.is_heap_ordered());
        assert_eq!(heap.len(), 14);
    }

    #[test]
    fn test_remove_where_and_missing() {
        let mut heap = min_heap();
        for value in scrambled(20) {
            heap.push(value);
        }
        let before = heap.len();

        assert!(heap.remove_where(|v| *v > 1000).is_none());
        assert_eq!(heap.len(), before);

        let removed = heap.remove_where(|v| *v % 2 == 1).unwrap();
        assert_eq!(removed % 2, 1);
        assert_eq!(heap.len(), before - 1);
        assert!(heap.is_heap_ordered());
    }

    #[test]
    fn test_iter_visits_every_node() {
        let mut heap = min_heap();
        for value in [3, 1, 2] {
            heap.push(value);
        }
        let mut seen: Vec<i64> = heap.iter().copied().collect();
        seen.sort();
        assert_eq!(seen, vec![1, 2, 3]);

        heap.clear();
        assert!(heap.is_empty());
    }
}
