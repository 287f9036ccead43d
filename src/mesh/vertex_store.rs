//! Spatially sorted vertex index.
//!
//! Vertices are ordered along a slightly rotated x axis (`x + 0.13y + 0.11z`)
//! with ties broken by x, then y, then z. The rotation keeps axis-aligned grids,
//! which are common in imported CAD data, from piling up on one key. A proximity
//! query then becomes a window scan along that key.

use std::cmp::Ordering;

use nalgebra::Point3;

use super::halfedge::Vertex;
use super::index::{MeshIndex, VertexId};
use super::storage::Slots;
use super::SortOption;
use crate::error::{MeshError, Result};

const KEY_Y: f64 = 0.13;
const KEY_Z: f64 = 0.11;

/// Upper bound on how far the sort key moves per unit of euclidean distance.
fn key_spread() -> f64 {
    (1.0 + KEY_Y * KEY_Y + KEY_Z * KEY_Z).sqrt()
}

/// Maps `-0.0` onto `0.0` so both zeros order equal.
#[inline]
fn canon(v: f64) -> f64 {
    v + 0.0
}

#[inline]
pub(crate) fn sort_key(p: &Point3<f64>) -> f64 {
    canon(p.x + p.y * KEY_Y + p.z * KEY_Z)
}

pub(crate) fn compare_positions(a: &Point3<f64>, b: &Point3<f64>) -> Ordering {
    sort_key(a)
        .total_cmp(&sort_key(b))
        .then_with(|| canon(a.x).total_cmp(&canon(b.x)))
        .then_with(|| canon(a.y).total_cmp(&canon(b.y)))
        .then_with(|| canon(a.z).total_cmp(&canon(b.z)))
}

/// Ordered list of the live vertex handles of a mesh.
#[derive(Debug, Clone)]
pub(crate) struct VertexStore<I: MeshIndex = u32> {
    ids: Vec<VertexId<I>>,
    sorted: bool,
    /// While set, removals only count and leave dead handles in `ids`.
    deferring: bool,
    pending: usize,
}

impl<I: MeshIndex> Default for VertexStore<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: MeshIndex> VertexStore<I> {
    pub fn new() -> Self {
        Self {
            ids: Vec::new(),
            sorted: true,
            deferring: false,
            pending: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            sorted: true,
            deferring: false,
            pending: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len() - self.pending
    }

    #[inline]
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    #[inline]
    pub fn ids(&self) -> &[VertexId<I>] {
        &self.ids
    }

    /// Flag the store as needing a [`sort`](Self::sort), e.g. after positions moved.
    pub fn mark_unsorted(&mut self) {
        if self.ids.len() > 1 {
            self.sorted = false;
        }
    }

    /// Add a vertex, either at its sorted position or appended for a later bulk sort.
    pub fn add(&mut self, v: VertexId<I>, vertices: &Slots<Vertex<I>>, sort: SortOption) {
        if self.sorted && sort == SortOption::SortNow && !self.deferring {
            let p = &vertices[v.index()].position;
            let at = self
                .ids
                .partition_point(|id| compare_positions(&vertices[id.index()].position, p) != Ordering::Greater);
            self.ids.insert(at, v);
        } else {
            self.ids.push(v);
            self.mark_unsorted();
        }
    }

    /// Remove a vertex, returning whether it was present.
    ///
    /// While deferring, the entry stays until [`flush`](Self::flush) and the
    /// vertex slot must be killed right after this call.
    pub fn remove(&mut self, v: VertexId<I>, vertices: &Slots<Vertex<I>>) -> bool {
        if self.deferring {
            self.pending += 1;
            return true;
        }
        match self.index_of(v, vertices) {
            Some(i) => {
                self.ids.remove(i);
                if self.ids.len() <= 1 {
                    self.sorted = true;
                }
                true
            }
            None => false,
        }
    }

    /// Batch removals until [`flush`](Self::flush).
    ///
    /// Lookups (`find`, `index_of`, sorted `add`) must not run in between.
    pub fn defer_removals(&mut self) {
        self.deferring = true;
    }

    /// Drop every entry whose vertex slot is dead, in one pass.
    pub fn flush(&mut self, vertices: &Slots<Vertex<I>>) {
        self.deferring = false;
        if self.pending == 0 {
            return;
        }
        self.ids.retain(|id| vertices.contains(id.index()));
        self.pending = 0;
        if self.ids.len() <= 1 {
            self.sorted = true;
        }
    }

    /// Bulk sort. A no-op when already sorted.
    pub fn sort(&mut self, vertices: &Slots<Vertex<I>>) {
        debug_assert!(!self.deferring, "sort while removals are deferred");
        if self.sorted {
            return;
        }
        self.ids.sort_by(|a, b| {
            compare_positions(&vertices[a.index()].position, &vertices[b.index()].position)
        });
        self.sorted = true;
    }

    /// Position of `v` in the store.
    ///
    /// Several vertices may share a sort key, so a binary-search hit is widened
    /// left and right until the handle itself is found.
    pub fn index_of(&self, v: VertexId<I>, vertices: &Slots<Vertex<I>>) -> Option<usize> {
        debug_assert!(!self.deferring, "lookup while removals are deferred");
        if !self.sorted {
            return self.ids.iter().position(|&id| id == v);
        }
        let target = &vertices.get(v.index())?.position;
        let cmp = |id: &VertexId<I>| compare_positions(&vertices[id.index()].position, target);
        let hit = self.ids.binary_search_by(|id| cmp(id)).ok()?;

        let mut i = hit;
        loop {
            if self.ids[i] == v {
                return Some(i);
            }
            if i == 0 || cmp(&self.ids[i - 1]) != Ordering::Equal {
                break;
            }
            i -= 1;
        }
        let mut i = hit + 1;
        while i < self.ids.len() && cmp(&self.ids[i]) == Ordering::Equal {
            if self.ids[i] == v {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    /// All vertices within `epsilon` of `position`; `epsilon == 0` matches exact positions only.
    pub fn find(
        &self,
        position: &Point3<f64>,
        epsilon: f64,
        vertices: &Slots<Vertex<I>>,
    ) -> Result<Vec<VertexId<I>>> {
        debug_assert!(!self.deferring, "lookup while removals are deferred");
        if !self.sorted {
            return Err(MeshError::VertexStoreUnsorted);
        }
        let epsilon = epsilon.max(0.0);
        let key = sort_key(position);
        let slack = epsilon * key_spread() + 4.0 * f64::EPSILON * key.abs().max(1.0);
        let lo = key - slack;
        let hi = key + slack;

        let start = self
            .ids
            .partition_point(|id| sort_key(&vertices[id.index()].position) < lo);
        let mut found = Vec::new();
        for &id in &self.ids[start..] {
            let p = &vertices[id.index()].position;
            if sort_key(p) > hi {
                break;
            }
            let hit = if epsilon == 0.0 {
                compare_positions(p, position) == Ordering::Equal
            } else {
                (p - position).norm() <= epsilon
            };
            if hit {
                found.push(id);
            }
        }
        Ok(found)
    }

    /// Check that the store is ordered if it claims to be.
    pub fn is_consistent(&self, vertices: &Slots<Vertex<I>>) -> bool {
        !self.sorted
            || self.ids.windows(2).all(|w| {
                compare_positions(&vertices[w[0].index()].position, &vertices[w[1].index()].position)
                    != Ordering::Greater
            })
    }
}
