//! A thread-safe intrusive singly-linked list with batch borrow/return.
//!
//! The list backs the matchmaker's lobby queue. It is tuned for one
//! access pattern: many cheap `insert`s from request handlers, and
//! periodic `borrow` of a prefix by a single background loop, which
//! later either `return_chain`s the prefix unchanged or finalizes a
//! subset of it via `take_many`.
//!
//! Nodes live in a [`generational_arena::Arena`] rather than behind raw
//! `next` pointers: an [`Index`] can be handed to callers and compared
//! for identity without any risk of dereferencing freed memory, which
//! is what the original pointer-chasing design relied on unsafe code
//! (and generation counting outside Rust's control) to guarantee.

#![deny(unsafe_code)]

use std::sync::Mutex;

use generational_arena::Arena;

pub use generational_arena::Index as NodeIndex;

struct Node<T> {
    value: T,
    next: Option<NodeIndex>,
}

struct State<T> {
    arena: Arena<Node<T>>,
    head: Option<NodeIndex>,
    tail: Option<NodeIndex>,
    len: usize,
}

/// Thread-safe intrusive list. All structural mutation is serialised by
/// a single mutex; see the module docs for the access pattern this is
/// tuned for.
pub struct IntrusiveList<T> {
    state: Mutex<State<T>>,
}

impl<T> Default for IntrusiveList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IntrusiveList<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                arena: Arena::new(),
                head: None,
                tail: None,
                len: 0,
            }),
        }
    }

    /// Current number of linked nodes. Nodes detached by `borrow` but
    /// not yet `return_chain`-ed or `take_many`-ed do not count.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `value` to the tail in O(1).
    pub fn insert(&self, value: T) {
        let mut s = self.state.lock().unwrap();
        let idx = s.arena.insert(Node { value, next: None });
        match s.tail {
            None => {
                s.head = Some(idx);
                s.tail = Some(idx);
            }
            Some(tail) => {
                s.arena[tail].next = Some(idx);
                s.tail = Some(idx);
            }
        }
        s.len += 1;
    }
}

impl<T: Clone> IntrusiveList<T> {
    /// Detach up to `n` nodes from the head, appending `(index, value)`
    /// pairs to `out` in list order. Returns the number detached, which
    /// is `< n` only when the list held fewer than `n` nodes.
    ///
    /// The detached nodes remain allocated in the arena (so their
    /// `NodeIndex`es stay valid) but are unlinked from the list; the
    /// caller owns their ordering via `out` and must eventually call
    /// [`Self::return_chain`] or [`Self::take_many`] on them.
    pub fn borrow(&self, n: usize, out: &mut Vec<(NodeIndex, T)>) -> usize {
        let mut s = self.state.lock().unwrap();
        let mut count = 0;
        let mut cur = s.head;
        let mut last = None;
        while let Some(idx) = cur {
            if count >= n {
                break;
            }
            let value = s.arena[idx].value.clone();
            out.push((idx, value));
            last = Some(idx);
            cur = s.arena[idx].next;
            count += 1;
        }
        if let Some(last) = last {
            let remaining_head = s.arena[last].next;
            s.arena[last].next = None;
            match remaining_head {
                None => {
                    s.head = None;
                    s.tail = None;
                }
                Some(h) => s.head = Some(h),
            }
            s.len -= count;
        }
        count
    }

    /// Re-attach a previously borrowed chain (whose arena `next` links
    /// run from `head` to `tail`, e.g. via [`Self::relink`]) to the
    /// front of the list, so it is re-examined soon.
    pub fn return_chain(&self, head: NodeIndex, tail: NodeIndex, chain_len: usize) {
        let mut s = self.state.lock().unwrap();
        match s.head {
            None => {
                s.head = Some(head);
                s.tail = Some(tail);
            }
            Some(existing_head) => {
                s.arena[tail].next = Some(existing_head);
                s.head = Some(head);
            }
        }
        s.len += chain_len;
    }

    /// Walk from the head to find the first node for which `pred`
    /// holds, then unlink and return its value.
    pub fn remove<F>(&self, pred: F) -> Option<T>
    where
        F: Fn(&T) -> bool,
    {
        let mut s = self.state.lock().unwrap();
        let mut prev: Option<NodeIndex> = None;
        let mut cur = s.head;
        while let Some(idx) = cur {
            let next = s.arena[idx].next;
            if pred(&s.arena[idx].value) {
                match prev {
                    None => s.head = next,
                    Some(p) => s.arena[p].next = next,
                }
                if s.tail == Some(idx) {
                    s.tail = prev;
                }
                s.len -= 1;
                let node = s.arena.remove(idx).expect("index came from live traversal");
                return Some(node.value);
            }
            prev = cur;
            cur = next;
        }
        None
    }

    /// Rebuild the arena's `next` links across `indices`, in the given
    /// order, and return `(head, tail)`. The indices must all be
    /// currently-detached nodes (e.g. returned by a prior `borrow`).
    ///
    /// # Panics
    /// Panics if `indices` is empty.
    pub fn relink(&self, indices: &[NodeIndex]) -> (NodeIndex, NodeIndex) {
        assert!(!indices.is_empty(), "relink requires at least one index");
        let mut s = self.state.lock().unwrap();
        for pair in indices.windows(2) {
            s.arena[pair[0]].next = Some(pair[1]);
        }
        let tail = *indices.last().unwrap();
        s.arena[tail].next = None;
        (indices[0], tail)
    }

    /// Remove detached nodes outright, returning their owned values in
    /// the order given.
    pub fn take_many(&self, indices: &[NodeIndex]) -> Vec<T> {
        let mut s = self.state.lock().unwrap();
        indices
            .iter()
            .map(|idx| {
                s.arena
                    .remove(*idx)
                    .expect("index came from a prior borrow")
                    .value
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_borrow_all() {
        let list = IntrusiveList::new();
        list.insert(1);
        list.insert(2);
        list.insert(3);
        assert_eq!(list.len(), 3);

        let mut out = Vec::new();
        let n = list.borrow(10, &mut out);
        assert_eq!(n, 3);
        assert_eq!(out.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(list.is_empty());
    }

    #[test]
    fn borrow_returns_fewer_than_requested_when_list_is_short() {
        let list = IntrusiveList::new();
        list.insert('a');
        list.insert('b');

        let mut out = Vec::new();
        let n = list.borrow(10, &mut out);
        assert_eq!(n, 2);
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn borrow_partial_prefix_preserves_remainder_order() {
        let list = IntrusiveList::new();
        for v in 0..5 {
            list.insert(v);
        }
        let mut out = Vec::new();
        let n = list.borrow(2, &mut out);
        assert_eq!(n, 2);
        assert_eq!(list.len(), 3);

        let mut rest = Vec::new();
        list.borrow(10, &mut rest);
        assert_eq!(rest.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn return_chain_restores_original_multiset() {
        let list = IntrusiveList::new();
        for v in 0..5 {
            list.insert(v);
        }
        let mut out = Vec::new();
        list.borrow(5, &mut out);
        assert!(list.is_empty());

        let indices: Vec<_> = out.iter().map(|(i, _)| *i).collect();
        let (head, tail) = list.relink(&indices);
        list.return_chain(head, tail, indices.len());
        assert_eq!(list.len(), 5);

        let mut rest = Vec::new();
        list.borrow(5, &mut rest);
        assert_eq!(rest.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn return_chain_onto_non_empty_list_prepends() {
        let list = IntrusiveList::new();
        list.insert("existing");

        let mut out = Vec::new();
        let other = IntrusiveList::new();
        other.insert("borrowed-a");
        other.insert("borrowed-b");
        other.borrow(2, &mut out);
        let indices: Vec<_> = out.iter().map(|(i, _)| *i).collect();

        // Simulate borrowing from `list` itself by inserting matching
        // values directly so the arena indices belong to `list`.
        let list = IntrusiveList::new();
        list.insert("a");
        list.insert("b");
        list.insert("existing");
        let mut borrowed = Vec::new();
        list.borrow(2, &mut borrowed);
        let idxs: Vec<_> = borrowed.iter().map(|(i, _)| *i).collect();
        let (head, tail) = list.relink(&idxs);
        list.return_chain(head, tail, idxs.len());

        let mut all = Vec::new();
        list.borrow(10, &mut all);
        assert_eq!(
            all.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
            vec!["a", "b", "existing"]
        );
        let _ = indices;
    }

    #[test]
    fn remove_by_predicate_unlinks_single_match() {
        let list = IntrusiveList::new();
        for v in 0..5 {
            list.insert(v);
        }
        let removed = list.remove(|v| *v == 2);
        assert_eq!(removed, Some(2));
        assert_eq!(list.len(), 4);

        let mut out = Vec::new();
        list.borrow(10, &mut out);
        assert_eq!(out.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![0, 1, 3, 4]);
    }

    #[test]
    fn remove_missing_predicate_returns_none() {
        let list = IntrusiveList::new();
        list.insert(1);
        assert_eq!(list.remove(|v| *v == 99), None);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn take_many_removes_detached_nodes_outright() {
        let list = IntrusiveList::new();
        for v in 0..4 {
            list.insert(v);
        }
        let mut out = Vec::new();
        list.borrow(4, &mut out);
        let indices: Vec<_> = out.iter().map(|(i, _)| *i).collect();

        let taken = list.take_many(&indices[1..3]);
        assert_eq!(taken, vec![1, 2]);

        // The remaining detached nodes can still be relinked and returned.
        let remaining = [indices[0], indices[3]];
        let (head, tail) = list.relink(&remaining);
        list.return_chain(head, tail, remaining.len());
        let mut rest = Vec::new();
        list.borrow(10, &mut rest);
        assert_eq!(rest.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![0, 3]);
    }
}
