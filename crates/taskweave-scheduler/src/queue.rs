//! Stable priority queue.

use std::collections::VecDeque;

/// Queue ordered by descending priority, FIFO among equal priorities.
///
/// Insertion scans for the first entry with a strictly lower priority and
/// inserts before it, so ties land behind everything already queued at the
/// same priority.
#[derive(Debug)]
pub struct PriorityQueue<T> {
  entries: VecDeque<(i32, T)>,
}

impl<T> Default for PriorityQueue<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> PriorityQueue<T> {
  pub fn new() -> Self {
    Self {
      entries: VecDeque::new(),
    }
  }

  pub fn push(&mut self, priority: i32, item: T) {
    let position = self
      .entries
      .iter()
      .position(|(p, _)| *p < priority)
      .unwrap_or(self.entries.len());
    self.entries.insert(position, (priority, item));
  }

  /// Remove and return the highest-priority entry.
  pub fn pop(&mut self) -> Option<T> {
    self.entries.pop_front().map(|(_, item)| item)
  }

  pub fn peek_priority(&self) -> Option<i32> {
    self.entries.front().map(|(p, _)| *p)
  }

  /// Remove every entry matching `predicate`, preserving the order of the rest.
  pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<T>
  where
    F: FnMut(&T) -> bool,
  {
    let mut removed = Vec::new();
    let mut kept = VecDeque::with_capacity(self.entries.len());
    for (priority, item) in self.entries.drain(..) {
      if predicate(&item) {
        removed.push(item);
      } else {
        kept.push_back((priority, item));
      }
    }
    self.entries = kept;
    removed
  }

  pub fn iter(&self) -> impl Iterator<Item = &T> {
    self.entries.iter().map(|(_, item)| item)
  }

  /// Remove every entry in dequeue order.
  pub fn drain(&mut self) -> Vec<T> {
    self.entries.drain(..).map(|(_, item)| item).collect()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}
