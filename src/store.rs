//! AVL-indexed record store.
//!
//! Nodes live in an arena (`Vec`) and link to their children by index. The
//! arena is only ever appended to, so its order is the load order and doubles
//! as the enumeration index used by `show` and by the snapshot writer.
//!
//! The tree is built once at startup. After that only record quantities
//! change, behind each record's lock; the shape is frozen, so concurrent
//! [`Store::search`] calls need no synchronization.

use crate::errors::StoreError;
use crate::record::Record;
use crate::record_lock::{ReaderPreferring, RecordLock};

use std::cmp::Ordering;

#[derive(Debug)]
struct Node<L> {
    record: Record<L>,
    left: Option<usize>,
    right: Option<usize>,
    height: i32,
}

/// Ledger of stock records keyed by id.
#[derive(Debug)]
pub struct Store<L = ReaderPreferring> {
    nodes: Vec<Node<L>>,
    root: Option<usize>,
}

impl<L: RecordLock> Store<L> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
        }
    }

    /// Builds a store from `(id, quantity, price)` triples in the given order.
    pub fn from_records<I>(records: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (i64, i64, i64)>,
    {
        let mut store = Self::new();
        for (id, quantity, price) in records {
            store.insert(id, quantity, price)?;
        }
        Ok(store)
    }

    /// Inserts a new record and rebalances the path back to the root.
    ///
    /// Only used while loading. A repeated id leaves the store untouched and
    /// returns [`StoreError::DuplicateId`].
    pub fn insert(&mut self, id: i64, quantity: i64, price: i64) -> Result<(), StoreError> {
        let root = self.insert_at(self.root, Record::new(id, quantity, price))?;
        self.root = Some(root);
        Ok(())
    }

    /// Looks a record up by id.
    pub fn search(&self, id: i64) -> Option<&Record<L>> {
        let mut cursor = self.root;
        while let Some(idx) = cursor {
            let node = &self.nodes[idx];
            cursor = match id.cmp(&node.record.id()) {
                Ordering::Equal => return Some(&node.record),
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
            };
        }
        None
    }

    /// Every record exactly once, in load order.
    pub fn enumerate(&self) -> impl Iterator<Item = &Record<L>> + '_ {
        self.nodes.iter().map(|node| &node.record)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` if nothing was loaded.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Height of the tree; `-1` when empty.
    pub fn height(&self) -> i32 {
        self.height_of(self.root)
    }

    fn insert_at(&mut self, at: Option<usize>, record: Record<L>) -> Result<usize, StoreError> {
        let Some(mut idx) = at else {
            self.nodes.push(Node {
                record,
                left: None,
                right: None,
                height: 0,
            });
            return Ok(self.nodes.len() - 1);
        };

        let id = record.id();
        match id.cmp(&self.nodes[idx].record.id()) {
            Ordering::Greater => {
                let right = self.insert_at(self.nodes[idx].right, record)?;
                self.nodes[idx].right = Some(right);
                if self.height_of(Some(right)) - self.height_of(self.nodes[idx].left) == 2 {
                    idx = if id > self.nodes[right].record.id() {
                        self.rotate_left(idx)
                    } else {
                        self.rotate_right_left(idx)
                    };
                }
            }
            Ordering::Less => {
                let left = self.insert_at(self.nodes[idx].left, record)?;
                self.nodes[idx].left = Some(left);
                if self.height_of(Some(left)) - self.height_of(self.nodes[idx].right) == 2 {
                    idx = if id < self.nodes[left].record.id() {
                        self.rotate_right(idx)
                    } else {
                        self.rotate_left_right(idx)
                    };
                }
            }
            Ordering::Equal => return Err(StoreError::DuplicateId(id)),
        }

        self.update_height(idx);
        Ok(idx)
    }

    fn height_of(&self, idx: Option<usize>) -> i32 {
        idx.map_or(-1, |i| self.nodes[i].height)
    }

    fn update_height(&mut self, idx: usize) {
        let left = self.height_of(self.nodes[idx].left);
        let right = self.height_of(self.nodes[idx].right);
        self.nodes[idx].height = left.max(right) + 1;
    }

    /// Right child becomes the subtree root.
    fn rotate_left(&mut self, idx: usize) -> usize {
        let Some(pivot) = self.nodes[idx].right else {
            return idx;
        };
        self.nodes[idx].right = self.nodes[pivot].left;
        self.nodes[pivot].left = Some(idx);
        self.update_height(idx);
        self.update_height(pivot);
        pivot
    }

    /// Left child becomes the subtree root.
    fn rotate_right(&mut self, idx: usize) -> usize {
        let Some(pivot) = self.nodes[idx].left else {
            return idx;
        };
        self.nodes[idx].left = self.nodes[pivot].right;
        self.nodes[pivot].right = Some(idx);
        self.update_height(idx);
        self.update_height(pivot);
        pivot
    }

    fn rotate_right_left(&mut self, idx: usize) -> usize {
        if let Some(right) = self.nodes[idx].right {
            self.nodes[idx].right = Some(self.rotate_right(right));
        }
        self.rotate_left(idx)
    }

    fn rotate_left_right(&mut self, idx: usize) -> usize {
        if let Some(left) = self.nodes[idx].left {
            self.nodes[idx].left = Some(self.rotate_left(left));
        }
        self.rotate_right(idx)
    }
}

impl<L: RecordLock> Default for Store<L> {
    fn default() -> Self {
        Self::new()
    }
}
