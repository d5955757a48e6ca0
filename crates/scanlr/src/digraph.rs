//! Set propagation over a relation graph (DeRemer and Pennello).
//!
//! Given initial sets `F0(x)` and a relation `x R y`, computes
//! `F(x) = F0(x) ∪ ⋃ { F(y) | x R y }`, collapsing strongly connected
//! components so every member of a cycle ends up with the same set.

use crate::types::Map;
use indexmap::map::Slice;
use std::{cmp, hash::Hash};

pub trait Set {
    fn union_with(&mut self, other: &Self);
}

impl<T> Set for crate::types::Set<T>
where
    T: Clone + Eq + Hash,
{
    fn union_with(&mut self, other: &Self) {
        self.extend(other.iter().cloned())
    }
}

impl<B> Set for bit_set::BitSet<B>
where
    B: bit_vec::BitBlock,
{
    fn union_with(&mut self, other: &Self) {
        bit_set::BitSet::union_with(self, other)
    }
}

/// Propagate the sets in `sets` along `successors`, in place.
///
/// Successors that are not keys of `sets` are ignored.
pub fn digraph<K, T, I>(sets: &mut Map<K, T>, successors: impl Fn(&K) -> I)
where
    K: Clone + Eq + Hash,
    T: Set,
    I: IntoIterator<Item = K>,
{
    let edges: Vec<Vec<usize>> = sets
        .keys()
        .map(|key| {
            successors(key)
                .into_iter()
                .filter_map(|succ| sets.get_index_of(&succ))
                .collect()
        })
        .collect();

    let mut walker = Walker {
        sets: sets.as_mut_slice(),
        edges: &edges,
        depth: vec![0; edges.len()],
        stack: vec![],
    };
    for x in 0..edges.len() {
        if walker.depth[x] == 0 {
            walker.traverse(x);
        }
    }
}

struct Walker<'a, K, T> {
    sets: &'a mut Slice<K, T>,
    edges: &'a [Vec<usize>],
    depth: Vec<usize>,
    stack: Vec<usize>,
}

impl<K, T> Walker<'_, K, T>
where
    T: Set,
{
    fn traverse(&mut self, x: usize) {
        self.stack.push(x);
        let d = self.stack.len();
        self.depth[x] = d;

        let edges = self.edges;
        for &y in &edges[x] {
            if self.depth[y] == 0 {
                self.traverse(y);
            }
            self.depth[x] = cmp::min(self.depth[x], self.depth[y]);
            if x != y {
                let (fx, fy) = get_two_mut(self.sets, x, y);
                fx.union_with(fy);
            }
        }

        if self.depth[x] != d {
            return;
        }

        // x is the root of a component: every member shares F(x).
        while let Some(s) = self.stack.pop() {
            self.depth[s] = usize::MAX;
            if s == x {
                break;
            }
            let (fs, fx) = get_two_mut(self.sets, s, x);
            fs.union_with(fx);
        }
    }
}

fn get_two_mut<K, V>(slice: &mut Slice<K, V>, x: usize, y: usize) -> (&mut V, &mut V) {
    assert!(x != y && cmp::max(x, y) < slice.len(), "invalid index pair");
    if x < y {
        let (lo, hi) = slice.split_at_mut(y);
        (&mut lo[x], &mut hi[0])
    } else {
        let (lo, hi) = slice.split_at_mut(x);
        (&mut hi[0], &mut lo[y])
    }
}
