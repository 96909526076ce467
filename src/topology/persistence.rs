//! Vietoris–Rips persistent homology over Z/2 from a distance matrix.
//!
//! Dimension 0 comes from a union-find pass over the edges. Higher dimensions
//! reduce the coboundary matrix: columns are processed from the latest to the
//! earliest simplex in the filtration and the pivot of a column is its
//! earliest cofacet. Simplices are never materialised; each one is a
//! `(diameter, colex rank)` pair and its vertices are decoded on demand.
//!
//! The filtration stops at the enclosing radius. Past that scale one vertex
//! is within reach of every other, the complex is a cone, and no class of
//! positive dimension survives, so nothing is lost by truncating there.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{ArbError, Result};
use crate::topology::distance::validate_distance_matrix;

/// Upper bound on simplices enumerated as reduction columns in one dimension.
pub const MAX_COLUMNS: usize = 40_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistencePair {
    pub birth: f64,
    /// `f64::INFINITY` for classes that never die.
    pub death: f64,
}

impl PersistencePair {
    pub fn is_finite(&self) -> bool {
        self.death.is_finite()
    }

    pub fn lifetime(&self) -> f64 {
        self.death - self.birth
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceDiagram {
    pub dimension: usize,
    pub pairs: Vec<PersistencePair>,
}

impl PersistenceDiagram {
    pub fn finite_lifetimes(&self) -> Vec<f64> {
        self.pairs
            .iter()
            .filter(|p| p.is_finite())
            .map(PersistencePair::lifetime)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// A simplex of fixed dimension, ordered by diameter then colex rank.
#[derive(Debug, Clone, Copy)]
struct Entry {
    diameter: f64,
    rank: usize,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.diameter
            .total_cmp(&other.diameter)
            .then(self.rank.cmp(&other.rank))
    }
}

/// Working column: a min-heap of cofacets where equal entries cancel mod 2.
type Column = BinaryHeap<Reverse<Entry>>;

/// Diagrams for dimensions `0..=max_dimension`, one per dimension.
pub fn vietoris_rips_persistence(
    dist: &DMatrix<f64>,
    max_dimension: usize,
) -> Result<Vec<PersistenceDiagram>> {
    validate_distance_matrix(dist)?;
    let mut diagrams: Vec<PersistenceDiagram> = (0..=max_dimension)
        .map(|dimension| PersistenceDiagram {
            dimension,
            pairs: Vec::new(),
        })
        .collect();
    let n = dist.nrows();
    if n == 0 {
        return Ok(diagrams);
    }

    let complex = RipsComplex::new(dist, max_dimension);
    let edges = complex.edges();
    let mut paired = complex.zero_dimensional(&edges, &mut diagrams[0].pairs);

    let mut simplices = edges;
    for dim in 1..=max_dimension {
        if dim > 1 {
            simplices = complex.cofacets_of_all(&simplices, dim - 1)?;
        }
        let mut columns: Vec<Entry> = simplices
            .iter()
            .copied()
            .filter(|s| !paired.contains(&s.rank))
            .collect();
        columns.sort_unstable_by(|a, b| b.cmp(a));
        paired = complex.reduce(dim, &columns, &mut diagrams[dim].pairs);
    }

    for diagram in &mut diagrams {
        diagram.pairs.sort_by(|a, b| {
            a.birth
                .total_cmp(&b.birth)
                .then(a.death.total_cmp(&b.death))
        });
    }
    Ok(diagrams)
}

struct RipsComplex<'a> {
    dist: &'a DMatrix<f64>,
    n: usize,
    threshold: f64,
    binom: BinomialTable,
}

impl<'a> RipsComplex<'a> {
    fn new(dist: &'a DMatrix<f64>, max_dimension: usize) -> Self {
        let n = dist.nrows();
        Self {
            dist,
            n,
            threshold: enclosing_radius(dist),
            binom: BinomialTable::new(n, max_dimension + 2),
        }
    }

    /// Edges within the threshold, in filtration order.
    fn edges(&self) -> Vec<Entry> {
        let mut edges = Vec::new();
        for j in 1..self.n {
            for i in 0..j {
                let diameter = self.dist[(i, j)];
                if diameter <= self.threshold {
                    edges.push(Entry {
                        diameter,
                        rank: self.binom.get(j, 2) + i,
                    });
                }
            }
        }
        edges.sort_unstable();
        edges
    }

    /// Single-linkage merges. Returns the ranks of the merging edges, which
    /// are already paired and are skipped as dimension-1 columns.
    fn zero_dimensional(
        &self,
        edges: &[Entry],
        pairs: &mut Vec<PersistencePair>,
    ) -> HashSet<usize> {
        let mut components = UnionFind::new(self.n);
        let mut merged = HashSet::with_capacity(self.n);
        for edge in edges {
            let v = self.vertices(edge.rank, 1);
            if components.union(v[0], v[1]) {
                merged.insert(edge.rank);
                if edge.diameter > 0.0 {
                    pairs.push(PersistencePair {
                        birth: 0.0,
                        death: edge.diameter,
                    });
                }
            }
        }
        let essential = self.n - merged.len();
        pairs.extend((0..essential).map(|_| PersistencePair {
            birth: 0.0,
            death: f64::INFINITY,
        }));
        merged
    }

    /// Every `dim + 1` simplex within the threshold, built by extending each
    /// `dim` simplex with a vertex above its largest one.
    fn cofacets_of_all(&self, simplices: &[Entry], dim: usize) -> Result<Vec<Entry>> {
        let mut out = Vec::new();
        for s in simplices {
            let vertices = self.vertices(s.rank, dim);
            let top = vertices[dim];
            for w in (top + 1)..self.n {
                let diameter = vertices
                    .iter()
                    .fold(s.diameter, |d, &v| d.max(self.dist[(v, w)]));
                if diameter <= self.threshold {
                    out.push(Entry {
                        diameter,
                        rank: s.rank + self.binom.get(w, dim + 2),
                    });
                }
            }
            if out.len() > MAX_COLUMNS {
                return Err(ArbError::numerical(format!(
                    "rips complex on {} points exceeds {} simplices in dimension {}",
                    self.n,
                    MAX_COLUMNS,
                    dim + 1
                )));
            }
        }
        Ok(out)
    }

    /// Reduce the coboundary columns of dimension `dim` (latest first) and
    /// record the finite and essential pairs. Returns the pivot ranks.
    fn reduce(
        &self,
        dim: usize,
        columns: &[Entry],
        pairs: &mut Vec<PersistencePair>,
    ) -> HashSet<usize> {
        let mut pivot_of: HashMap<usize, usize> = HashMap::new();
        // columns added into each reduced column, beyond the column itself
        let mut additions: Vec<Vec<usize>> = vec![Vec::new(); columns.len()];

        for (i, sigma) in columns.iter().enumerate() {
            let Some(first) = self.earliest_cofacet(sigma, dim) else {
                pairs.push(PersistencePair {
                    birth: sigma.diameter,
                    death: f64::INFINITY,
                });
                continue;
            };
            if !pivot_of.contains_key(&first.rank) {
                pivot_of.insert(first.rank, i);
                push_pair(pairs, sigma.diameter, first.diameter);
                continue;
            }

            let mut column = Column::new();
            self.push_coboundary(sigma, dim, &mut column);
            let mut added = Vec::new();
            loop {
                let Some(pivot) = pop_pivot(&mut column) else {
                    pairs.push(PersistencePair {
                        birth: sigma.diameter,
                        death: f64::INFINITY,
                    });
                    break;
                };
                match pivot_of.get(&pivot.rank) {
                    Some(&j) => {
                        column.push(Reverse(pivot));
                        self.push_coboundary(&columns[j], dim, &mut column);
                        for &k in &additions[j] {
                            self.push_coboundary(&columns[k], dim, &mut column);
                        }
                        added.push(j);
                        added.extend_from_slice(&additions[j]);
                    }
                    None => {
                        pivot_of.insert(pivot.rank, i);
                        additions[i] = cancel_pairs(added);
                        push_pair(pairs, sigma.diameter, pivot.diameter);
                        break;
                    }
                }
            }
        }
        pivot_of.into_keys().collect()
    }

    fn earliest_cofacet(&self, sigma: &Entry, dim: usize) -> Option<Entry> {
        let mut first: Option<Entry> = None;
        self.for_each_cofacet(sigma, dim, |c| {
            if first.map_or(true, |f| c < f) {
                first = Some(c);
            }
        });
        first
    }

    fn push_coboundary(&self, sigma: &Entry, dim: usize, column: &mut Column) {
        self.for_each_cofacet(sigma, dim, |c| column.push(Reverse(c)));
    }

    /// Visit each cofacet within the threshold. Adding vertex `w` with `j`
    /// vertices below it puts `w` at position `j` and shifts the vertices
    /// above it up by one, which fixes the new colex rank.
    fn for_each_cofacet(&self, sigma: &Entry, dim: usize, mut visit: impl FnMut(Entry)) {
        let vertices = self.vertices(sigma.rank, dim);
        let mut below = 0usize;
        let mut above: usize = vertices
            .iter()
            .enumerate()
            .map(|(k, &v)| self.binom.get(v, k + 2))
            .sum();
        let mut j = 0;
        for w in 0..self.n {
            if j < vertices.len() && vertices[j] == w {
                above -= self.binom.get(w, j + 2);
                below += self.binom.get(w, j + 1);
                j += 1;
                continue;
            }
            let diameter = vertices
                .iter()
                .fold(sigma.diameter, |d, &v| d.max(self.dist[(v, w)]));
            if diameter <= self.threshold {
                visit(Entry {
                    diameter,
                    rank: below + self.binom.get(w, j + 1) + above,
                });
            }
        }
    }

    /// Ascending vertices of the `dim` simplex with colex rank `rank`.
    fn vertices(&self, mut rank: usize, dim: usize) -> Vec<usize> {
        let mut out = vec![0; dim + 1];
        let mut hi = self.n;
        for k in (1..=dim + 1).rev() {
            // largest v < hi with C(v, k) <= rank
            let (mut lo, mut top) = (k - 1, hi - 1);
            while lo < top {
                let mid = (lo + top + 1) / 2;
                if self.binom.get(mid, k) <= rank {
                    lo = mid;
                } else {
                    top = mid - 1;
                }
            }
            out[k - 1] = lo;
            rank -= self.binom.get(lo, k);
            hi = lo;
        }
        out
    }
}

fn push_pair(pairs: &mut Vec<PersistencePair>, birth: f64, death: f64) {
    if death > birth {
        pairs.push(PersistencePair { birth, death });
    }
}

/// Pop the earliest entry that survives cancellation mod 2.
fn pop_pivot(column: &mut Column) -> Option<Entry> {
    let mut pivot = column.pop()?.0;
    loop {
        match column.peek() {
            Some(Reverse(next)) if *next == pivot => {
                column.pop();
                pivot = column.pop()?.0;
            }
            _ => return Some(pivot),
        }
    }
}

/// Drop indices that occur an even number of times.
fn cancel_pairs(mut indices: Vec<usize>) -> Vec<usize> {
    indices.sort_unstable();
    let mut out: Vec<usize> = Vec::with_capacity(indices.len());
    for idx in indices {
        if out.last() == Some(&idx) {
            out.pop();
        } else {
            out.push(idx);
        }
    }
    out
}

/// Smallest scale at which some point reaches every other point.
fn enclosing_radius(dist: &DMatrix<f64>) -> f64 {
    let n = dist.nrows();
    (0..n)
        .map(|i| (0..n).fold(0.0_f64, |m, j| m.max(dist[(i, j)])))
        .fold(f64::INFINITY, f64::min)
}

struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// `true` when `a` and `b` were in different components.
    fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        true
    }
}

struct BinomialTable {
    table: Vec<Vec<usize>>,
}

impl BinomialTable {
    fn new(n: usize, k_max: usize) -> Self {
        let mut table = vec![vec![0usize; k_max + 1]; n + 1];
        for row in table.iter_mut() {
            row[0] = 1;
        }
        for m in 1..=n {
            for k in 1..=k_max {
                table[m][k] = table[m - 1][k - 1].saturating_add(table[m - 1][k]);
            }
        }
        Self { table }
    }

    fn get(&self, m: usize, k: usize) -> usize {
        if k >= self.table[0].len() || m >= self.table.len() {
            return 0;
        }
        self.table[m][k]
    }
}
