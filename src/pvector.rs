//! Persistent vector used as the snapshot-able bucket array of [`ScopeMap`].
//!
//! Elements below the tail offset live in a 32-way trie, the rest in a small
//! tail buffer. Every update returns a new vector; only the nodes along the
//! path to the touched index are copied, everything else is shared through
//! `Arc` handles with the previous version.
//!
//! [`ScopeMap`]: crate::pscope::ScopeMap

use std::fmt;
use std::sync::Arc;

const SHIFT_SIZE: u32 = 5;
const NODE_SIZE: usize = 32;
const SHIFT_BIT_MASK: usize = 0x1F;

/// Index outside `0..len`. Raised for caller bugs, never for user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("index {index} out of bounds for persistent vector of length {len}")]
pub struct IndexOutOfBounds {
    pub index: usize,
    pub len: usize,
}

enum Node<T> {
    Branch(Arc<Vec<Node<T>>>),
    Leaf(Arc<Vec<T>>),
}

// Manual impl: cloning a node only bumps a reference count, so `T: Clone`
// is not required.
impl<T> Clone for Node<T> {
    fn clone(&self) -> Self {
        match self {
            Node::Branch(children) => Node::Branch(Arc::clone(children)),
            Node::Leaf(items) => Node::Leaf(Arc::clone(items)),
        }
    }
}

impl<T> Node<T> {
    fn empty_branch() -> Self {
        Node::Branch(Arc::new(Vec::new()))
    }
}

/// Wraps `node` in single-child branches until it sits `level` bits below
/// the caller.
fn new_path<T>(level: u32, node: Node<T>) -> Node<T> {
    if level == 0 {
        return node;
    }

    new_path(level - SHIFT_SIZE, Node::Branch(Arc::new(vec![node])))
}

/// Immutable, append-optimized sequence with O(log32 n) indexed update.
pub struct PersistentVector<T> {
    root: Node<T>,
    tail: Arc<Vec<T>>,
    len: usize,
    shift: u32,
}

impl<T> Clone for PersistentVector<T> {
    fn clone(&self) -> Self {
        PersistentVector {
            root: self.root.clone(),
            tail: Arc::clone(&self.tail),
            len: self.len,
            shift: self.shift,
        }
    }
}

impl<T> Default for PersistentVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PersistentVector<T> {
    pub fn new() -> Self {
        PersistentVector {
            root: Node::empty_branch(),
            tail: Arc::new(Vec::new()),
            len: 0,
            shift: SHIFT_SIZE,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn tail_offset(&self) -> usize {
        if self.len < NODE_SIZE {
            return 0;
        }

        ((self.len - 1) >> SHIFT_SIZE) << SHIFT_SIZE
    }

    fn check_index(&self, index: usize) -> Result<(), IndexOutOfBounds> {
        if index >= self.len {
            return Err(IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        Ok(())
    }

    /// The 32-element block holding `index`, either a trie leaf or the tail.
    fn leaf_for(&self, index: usize) -> &[T] {
        if index >= self.tail_offset() {
            return &self.tail;
        }

        let mut node = &self.root;
        let mut level = self.shift;
        loop {
            match node {
                Node::Branch(children) => {
                    node = &children[(index >> level) & SHIFT_BIT_MASK];
                    level = level.saturating_sub(SHIFT_SIZE);
                }
                Node::Leaf(items) => return items,
            }
        }
    }

    pub fn get(&self, index: usize) -> Result<&T, IndexOutOfBounds> {
        self.check_index(index)?;
        Ok(&self.leaf_for(index)[index & SHIFT_BIT_MASK])
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            vector: self,
            index: 0,
            leaf: &[],
        }
    }

    /// Visits elements in index order until `f` returns `false`.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&T) -> bool,
    {
        for item in self.iter() {
            if !f(item) {
                return;
            }
        }
    }

    /// Hangs a full tail block into the trie, growing a level on root
    /// overflow. The returned vector keeps the old `len` and tail; the caller
    /// replaces the tail right after.
    fn push_leaf(&self) -> Self {
        let leaf = Node::Leaf(Arc::clone(&self.tail));

        let (root, shift) = if (self.len >> SHIFT_SIZE) > (1 << self.shift) {
            let path = new_path(self.shift, leaf);
            (
                Node::Branch(Arc::new(vec![self.root.clone(), path])),
                self.shift + SHIFT_SIZE,
            )
        } else {
            (self.push_tail(self.shift, &self.root, leaf), self.shift)
        };

        PersistentVector {
            root,
            tail: Arc::clone(&self.tail),
            len: self.len,
            shift,
        }
    }

    fn push_tail(&self, level: u32, parent: &Node<T>, tail_node: Node<T>) -> Node<T> {
        let sub_index = ((self.len - 1) >> level) & SHIFT_BIT_MASK;
        let Node::Branch(parent_children) = parent else {
            // Leaves only ever sit at level 0, which push_tail never visits.
            unreachable!("push_tail reached a leaf at level {level}");
        };

        let mut children: Vec<Node<T>> =
            parent_children.iter().take(sub_index + 1).cloned().collect();

        let to_insert = if level == SHIFT_SIZE {
            tail_node
        } else if let Some(child) = parent_children.get(sub_index) {
            self.push_tail(level - SHIFT_SIZE, child, tail_node)
        } else {
            new_path(level - SHIFT_SIZE, tail_node)
        };

        if sub_index < children.len() {
            children[sub_index] = to_insert;
        } else {
            children.push(to_insert);
        }

        Node::Branch(Arc::new(children))
    }
}

impl<T: Clone> PersistentVector<T> {
    /// Returns a new vector with `index` replaced by `item`.
    pub fn set(&self, index: usize, item: T) -> Result<Self, IndexOutOfBounds> {
        self.check_index(index)?;

        if index >= self.tail_offset() {
            let mut tail = (*self.tail).clone();
            tail[index & SHIFT_BIT_MASK] = item;
            return Ok(PersistentVector {
                root: self.root.clone(),
                tail: Arc::new(tail),
                len: self.len,
                shift: self.shift,
            });
        }

        Ok(PersistentVector {
            root: do_assoc(self.shift, &self.root, index, item),
            tail: Arc::clone(&self.tail),
            len: self.len,
            shift: self.shift,
        })
    }

    /// Returns a new vector with `items` appended in order.
    pub fn append<I>(&self, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let mut items = items.into_iter().peekable();
        let mut result = self.clone();

        while items.peek().is_some() {
            let mut tail_len = result.len - result.tail_offset();
            if tail_len == NODE_SIZE {
                result = result.push_leaf();
                tail_len = 0;
            }

            let mut tail = Vec::with_capacity(NODE_SIZE);
            if tail_len > 0 {
                tail.extend_from_slice(&result.tail);
            }
            tail.extend(items.by_ref().take(NODE_SIZE - tail_len));

            let added = tail.len() - tail_len;
            result = PersistentVector {
                root: result.root,
                tail: Arc::new(tail),
                len: result.len + added,
                shift: result.shift,
            };
        }

        result
    }
}

fn do_assoc<T: Clone>(level: u32, node: &Node<T>, index: usize, item: T) -> Node<T> {
    match node {
        Node::Leaf(items) => {
            let mut items = (**items).clone();
            items[index & SHIFT_BIT_MASK] = item;
            Node::Leaf(Arc::new(items))
        }
        Node::Branch(children) => {
            let mut children = (**children).clone();
            let sub_index = (index >> level) & SHIFT_BIT_MASK;
            children[sub_index] = do_assoc(level - SHIFT_SIZE, &children[sub_index], index, item);
            Node::Branch(Arc::new(children))
        }
    }
}

impl<T: Clone> FromIterator<T> for PersistentVector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        PersistentVector::new().append(iter)
    }
}

impl<T: fmt::Debug> fmt::Debug for PersistentVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// In-order iterator; fetches one 32-element block at a time.
pub struct Iter<'a, T> {
    vector: &'a PersistentVector<T>,
    index: usize,
    leaf: &'a [T],
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.vector.len {
            return None;
        }

        if self.index & SHIFT_BIT_MASK == 0 {
            self.leaf = self.vector.leaf_for(self.index);
        }

        let item = &self.leaf[self.index & SHIFT_BIT_MASK];
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.vector.len - self.index;
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<'a, T> IntoIterator for &'a PersistentVector<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
