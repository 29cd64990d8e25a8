//! Concurrent skip list backing the MemTable.
//!
//! Nodes live in an arena and link to each other by index, so splicing and
//! unlinking are plain index rewrites. Slot 0 is the header sentinel; it has
//! the maximum height and is never removed. Freed slots are recycled.
//!
//! ```text
//! Level 2:  HEAD ────────────────► 30 ─────────────────► NIL
//! Level 1:  HEAD ──────► 10 ──────► 30 ──────► 50 ─────► NIL
//! Level 0:  HEAD ──► 5 ─► 10 ─► 20 ─► 30 ─► 40 ─► 50 ───► NIL
//! ```
//!
//! Node heights are random: every extra level is an independent trial that
//! succeeds with probability `p`, giving expected O(log n) search, insert and
//! remove.
//!
//! A single `RwLock` guards the whole list. Mutations take it exclusively,
//! lookups share it.

use crate::config::SkipListOptions;
use crate::error::Result;
use parking_lot::RwLock;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::borrow::Borrow;
use std::cmp::Ordering;

/// Arena index of the header sentinel.
const HEAD: usize = 0;

/// A key/value pair copied out of the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<K, V> {
    key: K,
    value: V,
}

impl<K, V> Entry<K, V> {
    /// Returns the key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns the value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Splits the entry into its key and value.
    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }
}

struct Node<K, V> {
    /// `None` for the header and for freed slots.
    entry: Option<(K, V)>,
    /// Forward links, one per level the node participates in.
    next: Vec<Option<usize>>,
}

struct Inner<K, V> {
    nodes: Vec<Node<K, V>>,
    free: Vec<usize>,
    len: usize,
    max_height: usize,
    /// `prob_table[i]` is `p^i`; a node reaches height `i + 1` when the draw is below it.
    prob_table: Vec<f64>,
    rng: SmallRng,
    /// Predecessor at each level from the last traversal.
    prevs: Vec<usize>,
}

impl<K: Ord, V> Inner<K, V> {
    fn new(options: &SkipListOptions, rng: SmallRng) -> Self {
        let max_height = options.max_height;
        let prob_table = (0..max_height).map(|i| options.probability.powi(i as i32)).collect();
        let head = Node { entry: None, next: vec![None; max_height] };

        Self {
            nodes: vec![head],
            free: Vec::new(),
            len: 0,
            max_height,
            prob_table,
            rng,
            prevs: vec![HEAD; max_height],
        }
    }

    fn key(&self, idx: usize) -> &K {
        match &self.nodes[idx].entry {
            Some((key, _)) => key,
            None => panic!("skip list node {} is linked but holds no entry", idx),
        }
    }

    fn entry(&self, idx: usize) -> (&K, &V) {
        match &self.nodes[idx].entry {
            Some((key, value)) => (key, value),
            None => panic!("skip list node {} is linked but holds no entry", idx),
        }
    }

    /// Read-only descent; returns the node holding `key`.
    fn find<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut current = HEAD;
        for level in (0..self.max_height).rev() {
            while let Some(next) = self.nodes[current].next[level] {
                let next_key: &Q = self.key(next).borrow();
                match next_key.cmp(key) {
                    Ordering::Less => current = next,
                    Ordering::Equal => return Some(next),
                    Ordering::Greater => break,
                }
            }
        }
        None
    }

    /// Descends from the top level recording the last node before `key` at
    /// every level. Returns the level-0 successor of that predecessor.
    fn find_predecessors<Q>(&mut self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut current = HEAD;
        for level in (0..self.max_height).rev() {
            while let Some(next) = self.nodes[current].next[level] {
                let next_key: &Q = self.key(next).borrow();
                if next_key < key {
                    current = next;
                } else {
                    break;
                }
            }
            self.prevs[level] = current;
        }
        self.nodes[current].next[0]
    }

    fn random_height(&mut self) -> usize {
        let draw: f64 = self.rng.random();
        let mut height = 1;
        while height < self.max_height && draw < self.prob_table[height] {
            height += 1;
        }
        height
    }

    fn alloc(&mut self, node: Node<K, V>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn set(&mut self, key: K, value: V) -> usize {
        if let Some(candidate) = self.find_predecessors(&key) {
            if let Some((existing, slot)) = &mut self.nodes[candidate].entry {
                if *existing == key {
                    *slot = value;
                    return candidate;
                }
            }
        }

        let height = self.random_height();
        let next = (0..height).map(|level| self.nodes[self.prevs[level]].next[level]).collect();
        let idx = self.alloc(Node { entry: Some((key, value)), next });

        for level in 0..height {
            let prev = self.prevs[level];
            self.nodes[prev].next[level] = Some(idx);
        }
        self.len += 1;
        idx
    }

    fn remove<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let target = self.find_predecessors(key)?;
        let found: &Q = self.key(target).borrow();
        if found != key {
            return None;
        }

        for level in 0..self.nodes[target].next.len() {
            let prev = self.prevs[level];
            assert_eq!(
                self.nodes[prev].next[level],
                Some(target),
                "skip list predecessor at level {} does not link to the node being removed",
                level
            );
            let successor = self.nodes[target].next[level];
            self.nodes[prev].next[level] = successor;
        }

        let node = &mut self.nodes[target];
        node.next.clear();
        let entry = node.entry.take();
        self.free.push(target);
        self.len -= 1;
        entry
    }

    /// Walks one level from the header.
    fn level_iter(&self, level: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.nodes[HEAD].next[level], move |&idx| self.nodes[idx].next[level])
    }
}

/// A sorted map with probabilistic balancing, safe to share across threads.
///
/// # Example
///
/// ```rust
/// use lsmcore::config::SkipListOptions;
/// use lsmcore::memtable::SkipList;
///
/// # fn main() -> Result<(), lsmcore::Error> {
/// let list = SkipList::new(SkipListOptions::default())?;
/// list.set(3, "c");
/// list.set(1, "a");
///
/// assert_eq!(list.front().map(|e| *e.key()), Some(1));
/// assert_eq!(list.get(&3).map(|e| *e.value()), Some("c"));
/// assert_eq!(list.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct SkipList<K, V> {
    inner: RwLock<Inner<K, V>>,
    options: SkipListOptions,
}

impl<K: Ord + Clone, V: Clone> SkipList<K, V> {
    /// Creates an empty list seeded from the operating system.
    ///
    /// Fails with a configuration error when `max_height` is outside `[1, 64]`
    /// or `probability` is outside `(0, 1)`.
    pub fn new(options: SkipListOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(options, SmallRng::from_os_rng()))
    }

    /// Creates an empty list whose node heights are reproducible.
    pub fn with_seed(options: SkipListOptions, seed: u64) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(options, SmallRng::seed_from_u64(seed)))
    }

    fn build(options: SkipListOptions, rng: SmallRng) -> Self {
        Self { inner: RwLock::new(Inner::new(&options, rng)), options }
    }

    /// Inserts `key` or overwrites its value in place, returning the stored entry.
    pub fn set(&self, key: K, value: V) -> Entry<K, V> {
        let mut inner = self.inner.write();
        let idx = inner.set(key, value);
        let (key, value) = inner.entry(idx);
        Entry { key: key.clone(), value: value.clone() }
    }

    /// Looks up `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let inner = self.inner.read();
        inner.find(key).map(|idx| {
            let (key, value) = inner.entry(idx);
            Entry { key: key.clone(), value: value.clone() }
        })
    }

    /// Returns `true` if `key` has a live entry.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.inner.read().find(key).is_some()
    }

    /// Unlinks `key` from every level and returns what it held.
    pub fn remove<Q>(&self, key: &Q) -> Option<Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.inner.write().remove(key).map(|(key, value)| Entry { key, value })
    }

    /// Returns the entry with the smallest key.
    pub fn front(&self) -> Option<Entry<K, V>> {
        let inner = self.inner.read();
        inner.nodes[HEAD].next[0].map(|idx| {
            let (key, value) = inner.entry(idx);
            Entry { key: key.clone(), value: value.clone() }
        })
    }

    /// Copies every entry out in ascending key order.
    pub fn entries(&self) -> Vec<Entry<K, V>> {
        let inner = self.inner.read();
        let mut out = Vec::with_capacity(inner.len);
        for idx in inner.level_iter(0) {
            let (key, value) = inner.entry(idx);
            out.push(Entry { key: key.clone(), value: value.clone() });
        }
        out
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.read().len
    }

    /// Returns `true` if the list holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum height any node may reach.
    pub fn max_height(&self) -> usize {
        self.options.max_height
    }

    /// Per-level promotion probability.
    pub fn probability(&self) -> f64 {
        self.options.probability
    }
}

#[cfg(test)]
impl<K: Ord + Clone + std::fmt::Debug, V: Clone> SkipList<K, V> {
    /// Panics unless every level is strictly ascending and contained in the
    /// level below it.
    pub(crate) fn assert_invariants(&self) {
        let inner = self.inner.read();
        let mut below: Option<Vec<usize>> = None;
        for level in 0..inner.max_height {
            let indices: Vec<usize> = inner.level_iter(level).collect();
            for pair in indices.windows(2) {
                assert!(
                    inner.key(pair[0]) < inner.key(pair[1]),
                    "level {} out of order: {:?} >= {:?}",
                    level,
                    inner.key(pair[0]),
                    inner.key(pair[1])
                );
            }
            for &idx in &indices {
                assert!(inner.nodes[idx].next.len() > level, "node {} linked above its height", idx);
            }
            if let Some(lower) = &below {
                assert!(indices.iter().all(|idx| lower.contains(idx)));
            } else {
                assert_eq!(indices.len(), inner.len);
            }
            below = Some(indices);
        }
    }

    pub(crate) fn node_heights(&self) -> Vec<usize> {
        let inner = self.inner.read();
        inner.level_iter(0).map(|idx| inner.nodes[idx].next.len()).collect()
    }
}
