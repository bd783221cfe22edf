//! Arena of generated placements with a duplicate index and a bucketed open
//! list threaded through the nodes themselves.

use std::hash::Hasher;

use log::debug;
use rustc_hash::FxHasher;

use crate::board::Cell;
use crate::error::SolveError;
use crate::state::Placement;

/// Stable position of a node in the arena.
pub type Index = u32;

/// Missing link.
pub const NIL: Index = Index::MAX;

/// Upper limit on the number of open-list buckets.
pub const MAX_BUCKETS: usize = 1 << 26;

/// Search bookkeeping of one placement. Queue links are private to the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Node {
    pub parent: Index,
    prev: Index,
    next: Index,
    pub tie: u32,
    pub g: u8,
    pub h: u8,
    /// Standard heuristic on its own, kept for delta updates.
    pub std_h: u8,
    /// Lowest f among successors not yet released (partial expansion only).
    pub pea_f: u8,
    open: bool,
}

impl Node {
    pub fn new(parent: Index, g: u8, h: u8, std_h: u8, tie: u32) -> Self {
        Node {
            parent,
            prev: NIL,
            next: NIL,
            tie,
            g,
            h,
            std_h,
            pea_f: 0,
            open: false,
        }
    }

    #[inline(always)]
    pub fn f(&self) -> u8 {
        self.g.saturating_add(self.h).max(self.pea_f)
    }

    #[inline(always)]
    pub fn is_open(&self) -> bool {
        self.open
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableCounters {
    pub finds: u64,
    pub probes: u64,
    pub reopened: u64,
}

pub struct StatesTable {
    atoms: usize,
    capacity: usize,
    nodes: Vec<Node>,
    positions: Vec<Cell>,
    // Slot holds `index + 1`; zero marks an empty slot.
    slots: Vec<u32>,
    heads: Vec<Index>,
    max_f: u8,
    max_tie: u32,
    cursor: usize,
    counters: TableCounters,
}

impl StatesTable {
    /// Bytes one stored state costs, hash slots included.
    pub fn bytes_per_state(atoms: usize, load_factor: f64) -> f64 {
        (std::mem::size_of::<Node>() + atoms * std::mem::size_of::<Cell>()) as f64
            + std::mem::size_of::<u32>() as f64 * load_factor.max(1.0)
    }

    fn slot_count(capacity: usize, load_factor: f64) -> usize {
        ((capacity as f64 * load_factor.max(1.0)) as usize).max(capacity + 1)
    }

    /// Heap bytes of a full table; everything is allocated up front.
    fn footprint(atoms: usize, capacity: usize, load_factor: f64, buckets: usize) -> usize {
        capacity * (std::mem::size_of::<Node>() + atoms * std::mem::size_of::<Cell>())
            + Self::slot_count(capacity, load_factor) * std::mem::size_of::<u32>()
            + buckets * std::mem::size_of::<Index>()
    }

    /// Largest table whose arena, hash slots and buckets fit `budget_bytes`.
    pub fn with_budget(
        atoms: usize,
        budget_bytes: usize,
        load_factor: f64,
        max_f: u8,
        max_tie: u32,
    ) -> Result<Self, SolveError> {
        let buckets = ((max_f as u64 + 1) * (max_tie as u64 + 1)).min(MAX_BUCKETS as u64) as usize;
        let free = budget_bytes.saturating_sub(buckets * std::mem::size_of::<Index>());
        let mut capacity = ((free as f64 / Self::bytes_per_state(atoms, load_factor)) as usize).min(NIL as usize - 1);
        // Float rounding of the slot count can leave a few bytes over.
        while capacity > 0 && Self::footprint(atoms, capacity, load_factor, buckets) > budget_bytes {
            capacity -= 1;
        }
        Self::with_capacity(atoms, capacity, load_factor, max_f, max_tie)
    }

    pub fn with_capacity(
        atoms: usize,
        capacity: usize,
        load_factor: f64,
        max_f: u8,
        max_tie: u32,
    ) -> Result<Self, SolveError> {
        let buckets = (max_f as u64 + 1) * (max_tie as u64 + 1);
        if buckets > MAX_BUCKETS as u64 {
            return Err(SolveError::ConfigurationOverflow {
                what: "open list buckets",
                value: buckets,
                limit: MAX_BUCKETS as u64,
            });
        }
        let capacity = capacity.min(NIL as usize - 1);
        let slot_count = Self::slot_count(capacity, load_factor);
        debug!(
            "states table: capacity {} states, {} hash slots, {} buckets",
            capacity, slot_count, buckets
        );
        Ok(StatesTable {
            atoms,
            capacity,
            nodes: Vec::with_capacity(capacity),
            positions: Vec::with_capacity(capacity * atoms),
            slots: vec![0; slot_count],
            heads: vec![NIL; buckets as usize],
            max_f,
            max_tie,
            cursor: buckets as usize,
            counters: TableCounters::default(),
        })
    }

    /// Forgets every node; counters keep accumulating.
    pub fn reset(&mut self) {
        if self.nodes.len() * 4 < self.slots.len() {
            // Sparse table: clear only the occupied slots so a large arena
            // is not swept on every bound.
            for i in 0..self.nodes.len() as Index {
                let mut slot = self.slot_of(self.positions(i));
                while self.slots[slot] != i + 1 {
                    slot += 1;
                    if slot == self.slots.len() {
                        slot = 0;
                    }
                }
                self.slots[slot] = 0;
            }
        } else {
            self.slots.iter_mut().for_each(|s| *s = 0);
        }
        self.nodes.clear();
        self.positions.clear();
        self.heads.iter_mut().for_each(|h| *h = NIL);
        self.cursor = self.heads.len();
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest f the open list has a bucket for.
    pub fn max_f(&self) -> u8 {
        self.max_f
    }

    pub fn max_tie(&self) -> u32 {
        self.max_tie
    }

    pub fn counters(&self) -> TableCounters {
        self.counters
    }

    pub fn memory_bytes(&self) -> usize {
        self.nodes.capacity() * std::mem::size_of::<Node>()
            + self.positions.capacity() * std::mem::size_of::<Cell>()
            + self.slots.len() * std::mem::size_of::<u32>()
            + self.heads.len() * std::mem::size_of::<Index>()
    }

    #[inline(always)]
    pub fn node(&self, i: Index) -> &Node {
        &self.nodes[i as usize]
    }

    #[inline(always)]
    pub fn positions(&self, i: Index) -> &[Cell] {
        let start = i as usize * self.atoms;
        &self.positions[start..start + self.atoms]
    }

    #[inline(always)]
    fn slot_of(&self, positions: &[Cell]) -> usize {
        let mut hasher = FxHasher::default();
        for &p in positions {
            hasher.write_u16(p);
        }
        (hasher.finish() % self.slots.len() as u64) as usize
    }

    /// Arena index of the node stored with exactly these positions.
    pub fn find(&mut self, positions: &[Cell]) -> Option<Index> {
        self.counters.finds += 1;
        let mut slot = self.slot_of(positions);
        loop {
            self.counters.probes += 1;
            let entry = self.slots[slot];
            if entry == 0 {
                return None;
            }
            if self.positions(entry - 1) == positions {
                return Some(entry - 1);
            }
            slot += 1;
            if slot == self.slots.len() {
                slot = 0;
            }
        }
    }

    /// Stores a new node. Inserting positions that are already present returns
    /// the existing index and leaves it untouched.
    pub fn insert(&mut self, positions: &[Cell], node: Node) -> Result<Index, SolveError> {
        debug_assert_eq!(positions.len(), self.atoms);
        let mut slot = self.slot_of(positions);
        while self.slots[slot] != 0 {
            let existing = self.slots[slot] - 1;
            if self.positions(existing) == positions {
                return Ok(existing);
            }
            slot += 1;
            if slot == self.slots.len() {
                slot = 0;
            }
        }
        if self.nodes.len() >= self.capacity {
            return Err(SolveError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let index = self.nodes.len() as Index;
        self.nodes.push(Node {
            prev: NIL,
            next: NIL,
            open: false,
            ..node
        });
        self.positions.extend_from_slice(positions);
        self.slots[slot] = index + 1;
        Ok(index)
    }

    #[inline(always)]
    fn key(&self, node: &Node) -> usize {
        debug_assert!(node.tie <= self.max_tie);
        node.f() as usize * (self.max_tie as usize + 1) + (self.max_tie - node.tie) as usize
    }

    #[inline(always)]
    pub fn f_value(&self, i: Index) -> u8 {
        self.nodes[i as usize].f()
    }

    /// Puts a node that is not queued at the front of its bucket.
    pub fn push(&mut self, i: Index) {
        let key = self.key(&self.nodes[i as usize]);
        let head = self.heads[key];
        {
            let node = &mut self.nodes[i as usize];
            debug_assert!(!node.open);
            node.prev = NIL;
            node.next = head;
            node.open = true;
        }
        if head != NIL {
            self.nodes[head as usize].prev = i;
        }
        self.heads[key] = i;
        self.cursor = self.cursor.min(key);
    }

    fn unlink(&mut self, i: Index) {
        let key = self.key(&self.nodes[i as usize]);
        let Node { prev, next, .. } = self.nodes[i as usize];
        if prev == NIL {
            self.heads[key] = next;
        } else {
            self.nodes[prev as usize].next = next;
        }
        if next != NIL {
            self.nodes[next as usize].prev = prev;
        }
        let node = &mut self.nodes[i as usize];
        node.prev = NIL;
        node.next = NIL;
        node.open = false;
    }

    /// Removes and returns the queued node with the smallest f, highest tie
    /// score first among equal f.
    pub fn pop(&mut self) -> Option<Index> {
        while self.cursor < self.heads.len() {
            let head = self.heads[self.cursor];
            if head != NIL {
                self.unlink(head);
                return Some(head);
            }
            self.cursor += 1;
        }
        None
    }

    /// Records a cheaper path to node `i` and (re)queues it under its new key.
    pub fn reopen(&mut self, i: Index, g: u8, tie: u32, parent: Index) {
        if self.nodes[i as usize].open {
            self.unlink(i);
        } else {
            self.counters.reopened += 1;
        }
        let node = &mut self.nodes[i as usize];
        node.g = g;
        node.tie = tie;
        node.parent = parent;
        node.pea_f = 0;
        self.push(i);
    }

    /// Requeues an expanded node whose remaining successors have f >= `pea_f`.
    pub fn defer(&mut self, i: Index, pea_f: u8) {
        if self.nodes[i as usize].open {
            self.unlink(i);
        }
        self.nodes[i as usize].pea_f = pea_f;
        self.push(i);
    }

    /// Placements from the root to `i`, both included.
    pub fn path(&self, mut i: Index) -> Vec<Placement> {
        let mut path = Vec::new();
        while i != NIL {
            path.push(Placement::from_slice(self.positions(i)));
            i = self.nodes[i as usize].parent;
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn table(capacity: usize, max_f: u8, max_tie: u32) -> StatesTable {
        StatesTable::with_capacity(2, capacity, 2.5, max_f, max_tie).unwrap()
    }

    #[test]
    fn test_insert_is_idempotent_and_find_locates_duplicates() {
        let mut t = table(16, 10, 0);
        let a = t.insert(&[3, 7], Node::new(NIL, 0, 4, 4, 0)).unwrap();
        let b = t.insert(&[7, 3], Node::new(a, 1, 3, 3, 0)).unwrap();
        assert_ne!(a, b);

        let again = t.insert(&[3, 7], Node::new(b, 5, 1, 1, 0)).unwrap();
        assert_eq!(again, a);
        assert_eq!(t.len(), 2);
        assert_eq!(t.node(a).g, 0);

        assert_eq!(t.find(&[7, 3]), Some(b));
        assert_eq!(t.find(&[7, 4]), None);
        assert!(t.counters().probes >= t.counters().finds);
    }

    #[test]
    fn test_no_duplicates_under_random_inserts() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut t = table(400, 10, 0);
        let mut stored = Vec::new();
        for _ in 0..400 {
            let p = [rng.gen_range(0..20u16), rng.gen_range(0..20u16)];
            let i = t.insert(&p, Node::new(NIL, 0, 0, 0, 0)).unwrap();
            stored.push((p, i));
        }
        for (p, i) in stored {
            assert_eq!(t.find(&p), Some(i));
            assert_eq!(t.positions(i), &p);
        }
        let mut seen = rustc_hash::FxHashSet::default();
        for i in 0..t.len() as Index {
            assert!(seen.insert(t.positions(i).to_vec()));
        }
    }

    #[test]
    fn test_capacity_exceeded_is_reported() {
        let mut t = table(2, 10, 0);
        t.insert(&[1, 2], Node::new(NIL, 0, 0, 0, 0)).unwrap();
        t.insert(&[1, 3], Node::new(NIL, 0, 0, 0, 0)).unwrap();
        assert_eq!(t.insert(&[1, 2], Node::new(NIL, 0, 0, 0, 0)), Ok(0));
        assert_eq!(
            t.insert(&[1, 4], Node::new(NIL, 0, 0, 0, 0)),
            Err(SolveError::CapacityExceeded { capacity: 2 })
        );
    }

    #[test]
    fn test_pop_is_monotone_in_f_then_tie() {
        let mut rng = SmallRng::seed_from_u64(11);
        let max_tie = 5;
        let mut t = table(300, 40, max_tie);
        for k in 0..300u16 {
            let g = rng.gen_range(0..20u8);
            let h = rng.gen_range(0..20u8);
            let tie = rng.gen_range(0..=max_tie);
            let i = t.insert(&[k, k + 1], Node::new(NIL, g, h, h, tie)).unwrap();
            t.push(i);
        }
        let mut last = (0u8, i64::MIN);
        let mut popped = 0;
        while let Some(i) = t.pop() {
            let key = (t.f_value(i), -(t.node(i).tie as i64));
            assert!(key >= last);
            assert!(!t.node(i).is_open());
            last = key;
            popped += 1;
        }
        assert_eq!(popped, 300);
    }

    #[test]
    fn test_bucket_is_lifo() {
        let mut t = table(8, 10, 0);
        let a = t.insert(&[0, 1], Node::new(NIL, 1, 1, 1, 0)).unwrap();
        let b = t.insert(&[0, 2], Node::new(NIL, 1, 1, 1, 0)).unwrap();
        t.push(a);
        t.push(b);
        assert_eq!(t.pop(), Some(b));
        assert_eq!(t.pop(), Some(a));
        assert_eq!(t.pop(), None);
    }

    #[test]
    fn test_reopen_relinks_open_and_counts_closed_nodes() {
        let mut t = table(8, 20, 0);
        let root = t.insert(&[0, 1], Node::new(NIL, 0, 2, 2, 0)).unwrap();
        let a = t.insert(&[0, 2], Node::new(root, 6, 2, 2, 0)).unwrap();
        let b = t.insert(&[0, 3], Node::new(root, 5, 2, 2, 0)).unwrap();
        let c = t.insert(&[0, 4], Node::new(root, 6, 2, 2, 0)).unwrap();
        t.push(a);
        t.push(b);
        t.push(c);

        // a sits in the middle of its bucket behind c.
        t.reopen(a, 1, 0, root);
        assert_eq!(t.counters().reopened, 0);
        assert_eq!(t.pop(), Some(a));
        assert_eq!(t.pop(), Some(b));
        assert_eq!(t.pop(), Some(c));

        t.reopen(b, 2, 0, a);
        assert_eq!(t.counters().reopened, 1);
        assert_eq!(t.node(b).parent, a);
        assert_eq!(t.pop(), Some(b));
        assert_eq!(t.path(b).len(), 3);
    }

    #[test]
    fn test_defer_raises_queue_key_only() {
        let mut t = table(8, 20, 0);
        let a = t.insert(&[0, 1], Node::new(NIL, 2, 3, 3, 0)).unwrap();
        let b = t.insert(&[0, 2], Node::new(NIL, 2, 4, 4, 0)).unwrap();
        t.push(a);
        t.push(b);
        assert_eq!(t.pop(), Some(a));
        t.defer(a, 9);
        assert_eq!(t.node(a).h, 3);
        assert_eq!(t.f_value(a), 9);
        assert_eq!(t.pop(), Some(b));
        assert_eq!(t.pop(), Some(a));
    }

    #[test]
    fn test_reset_empties_everything() {
        let mut t = table(8, 10, 0);
        let a = t.insert(&[0, 1], Node::new(NIL, 0, 1, 1, 0)).unwrap();
        t.push(a);
        t.reset();
        assert!(t.is_empty());
        assert_eq!(t.find(&[0, 1]), None);
        assert_eq!(t.pop(), None);
    }

    #[test]
    fn test_full_table_stays_within_its_budget() {
        let budget = 1_000_000;
        let mut t = StatesTable::with_budget(8, budget, 2.0, 100, 0).unwrap();
        let capacity = t.capacity();
        assert!(capacity > 10_000);
        for k in 0..capacity as u32 {
            let p: [Cell; 8] = [(k >> 16) as Cell, k as Cell, 0, 1, 2, 3, 4, 5];
            t.insert(&p, Node::new(NIL, 0, 0, 0, 0)).unwrap();
        }
        assert_eq!(t.len(), capacity);
        assert!(t.memory_bytes() <= budget, "{} > {}", t.memory_bytes(), budget);
        assert!(matches!(
            t.insert(&[9, 9, 9, 9, 9, 9, 9, 9], Node::new(NIL, 0, 0, 0, 0)),
            Err(SolveError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_bucket_ceiling_is_checked() {
        assert!(matches!(
            StatesTable::with_capacity(2, 4, 2.5, 254, u32::MAX / 2),
            Err(SolveError::ConfigurationOverflow { .. })
        ));
    }
}
