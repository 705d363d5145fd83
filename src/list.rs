//! Arena-backed recency list.
//!
//! One list per shard, most-recently-used at the head. Nodes live in a
//! slot vector and link to each other by `u32` index, with freed slots
//! chained through their `next` field for reuse. Indices sidestep the
//! ownership cycle a pointer-linked doubly-linked list would need.

use crate::entry::{CacheEntry, NIL};

use std::sync::Arc;

struct Node<K, V> {
  prev: u32,
  next: u32,
  entry: Option<Arc<CacheEntry<K, V>>>,
}

pub(crate) struct RecencyList<K, V> {
  slots: Vec<Node<K, V>>,
  free_head: u32,
  head: u32,
  tail: u32,
  len: usize,
}

impl<K, V> RecencyList<K, V> {
  pub(crate) fn new() -> Self {
    Self {
      slots: Vec::new(),
      free_head: NIL,
      head: NIL,
      tail: NIL,
      len: 0,
    }
  }

  fn alloc(&mut self, entry: Arc<CacheEntry<K, V>>) -> u32 {
    if self.free_head != NIL {
      let idx = self.free_head;
      let slot = &mut self.slots[idx as usize];
      self.free_head = slot.next;
      slot.prev = NIL;
      slot.next = NIL;
      slot.entry = Some(entry);
      idx
    } else {
      self.slots.push(Node {
        prev: NIL,
        next: NIL,
        entry: Some(entry),
      });
      (self.slots.len() - 1) as u32
    }
  }

  fn free(&mut self, idx: u32) {
    let slot = &mut self.slots[idx as usize];
    slot.entry = None;
    slot.prev = NIL;
    slot.next = self.free_head;
    self.free_head = idx;
  }

  /// Unhooks `idx` from the chain, fixing head/tail. The slot itself is
  /// left allocated.
  fn detach(&mut self, idx: u32) {
    let (prev, next) = {
      let slot = &self.slots[idx as usize];
      (slot.prev, slot.next)
    };
    if prev != NIL {
      self.slots[prev as usize].next = next;
    } else {
      self.head = next;
    }
    if next != NIL {
      self.slots[next as usize].prev = prev;
    } else {
      self.tail = prev;
    }
  }

  /// Aborts on slot/entry disagreement. Promoting or removing through a
  /// slot that holds a different entry means the caller went through the
  /// wrong shard, and the list is no longer trustworthy.
  fn check_slot(&self, idx: u32, entry: &Arc<CacheEntry<K, V>>) {
    let held = self
      .slots
      .get(idx as usize)
      .and_then(|slot| slot.entry.as_ref());
    match held {
      Some(current) if Arc::ptr_eq(current, entry) => {}
      _ => panic!("recency list corruption: slot {idx} does not hold the expected entry"),
    }
  }

  /// Links a new entry at the head and returns its slot.
  pub(crate) fn push_head(&mut self, entry: Arc<CacheEntry<K, V>>) -> u32 {
    let idx = self.alloc(entry);
    self.slots[idx as usize].next = self.head;
    if self.head != NIL {
      self.slots[self.head as usize].prev = idx;
    }
    self.head = idx;
    if self.tail == NIL {
      self.tail = idx;
    }
    self.len += 1;
    idx
  }

  /// Moves an already-linked slot to the head.
  pub(crate) fn move_to_head(&mut self, idx: u32, entry: &Arc<CacheEntry<K, V>>) {
    self.check_slot(idx, entry);
    if self.head == idx {
      return;
    }
    self.detach(idx);
    let old_head = self.head;
    {
      let slot = &mut self.slots[idx as usize];
      slot.prev = NIL;
      slot.next = old_head;
    }
    if old_head != NIL {
      self.slots[old_head as usize].prev = idx;
    }
    self.head = idx;
    if self.tail == NIL {
      self.tail = idx;
    }
  }

  /// Unlinks `idx` and recycles the slot.
  pub(crate) fn unlink(&mut self, idx: u32, entry: &Arc<CacheEntry<K, V>>) {
    self.check_slot(idx, entry);
    self.detach(idx);
    self.free(idx);
    self.len -= 1;
  }

  /// The least-recently-used entry, if any.
  pub(crate) fn tail_entry(&self) -> Option<Arc<CacheEntry<K, V>>> {
    if self.tail == NIL {
      return None;
    }
    match self.slots[self.tail as usize].entry.as_ref() {
      Some(entry) => Some(entry.clone()),
      None => panic!("recency list corruption: tail slot {} is vacant", self.tail),
    }
  }

  #[inline]
  pub(crate) fn head(&self) -> u32 {
    self.head
  }

  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.len
  }

  /// Empties the list, returning the entries in head-to-tail order.
  pub(crate) fn drain(&mut self) -> Vec<Arc<CacheEntry<K, V>>> {
    let mut drained = Vec::with_capacity(self.len);
    let mut cursor = self.head;
    while cursor != NIL {
      let slot = &mut self.slots[cursor as usize];
      if let Some(entry) = slot.entry.take() {
        drained.push(entry);
      }
      cursor = slot.next;
    }
    self.slots.clear();
    self.free_head = NIL;
    self.head = NIL;
    self.tail = NIL;
    self.len = 0;
    drained
  }

  /// Entries in recency order, for tests and invariant checks.
  #[cfg(test)]
  pub(crate) fn iter_entries(&self) -> Vec<Arc<CacheEntry<K, V>>> {
    let mut entries = Vec::with_capacity(self.len);
    let mut cursor = self.head;
    while cursor != NIL {
      let slot = &self.slots[cursor as usize];
      if let Some(entry) = slot.entry.as_ref() {
        entries.push(entry.clone());
      }
      cursor = slot.next;
    }
    entries
  }
}
