//! # Universe algebra
//!
//! A [`Universe`] is an opaque identity token for a set of row keys.
//! Universes never carry row data; the [`UniverseSolver`] is the only
//! component allowed to reason about how they relate to one another.
//!
//! The solver is a union-find over universe ids, augmented with a set of
//! disjoint pairs and a subset partial order. It is deliberately
//! **conservative**: every `query_*` answer it gives is sound (no false
//! positives), but it may answer "don't know" for facts a caller knows to
//! be true from outside information — that's what `promise_*` is for.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Opaque identity token for a set of row keys.
///
/// `Universe` values are only ever compared through a [`UniverseSolver`];
/// equality on the struct itself is identity equality of the allocation,
/// not of the key-set it represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Universe(u64);

/// Error raised when a `promise_*` call contradicts a fact the solver has
/// already established.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UniverseContradiction {
    #[error("cannot promise {a:?} and {b:?} are equal: they are already known to be disjoint")]
    EqualButDisjoint { a: Universe, b: Universe },
    #[error("cannot promise {a:?} and {b:?} are disjoint: they are already known to be equal")]
    DisjointButEqual { a: Universe, b: Universe },
    #[error("cannot promise {sub:?} is a subset of {sup:?}: they are already known to be disjoint and non-empty")]
    SubsetButDisjoint { sub: Universe, sup: Universe },
}

/// Union-find + disjointness + subset-order reasoner over [`Universe`] ids.
///
/// Owned by the plan builder (see [`crate::parse_graph::GraphBuilder`]); per
/// design note §9, there is no hidden global singleton — every table holds
/// a handle back to the builder that owns its solver.
#[derive(Debug, Default)]
pub struct UniverseSolver {
    next_id: u64,
    /// union-find parent pointers, keyed by raw id
    parent: HashMap<u64, u64>,
    /// union-find rank, keyed by representative id
    rank: HashMap<u64, u32>,
    /// symmetric set of representative pairs known disjoint
    disjoint: HashSet<(u64, u64)>,
    /// sub -> set of representatives sub is known to be a subset of
    subset_of: HashMap<u64, HashSet<u64>>,
    /// representatives known to be the empty universe
    empty: HashSet<u64>,
}

impl UniverseSolver {
    pub fn new() -> Self {
        UniverseSolver::default()
    }

    /// Allocate a brand-new universe, unrelated to every other universe
    /// until proven otherwise.
    pub fn new_universe(&mut self) -> Universe {
        let id = self.next_id;
        self.next_id += 1;
        self.parent.insert(id, id);
        self.rank.insert(id, 0);
        Universe(id)
    }

    fn find(&mut self, id: u64) -> u64 {
        let parent = *self.parent.entry(id).or_insert(id);
        if parent == id {
            return id;
        }
        let root = self.find(parent);
        self.parent.insert(id, root);
        root
    }

    fn union(&mut self, a: u64, b: u64) -> u64 {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return ra;
        }
        let rank_a = *self.rank.get(&ra).unwrap_or(&0);
        let rank_b = *self.rank.get(&rb).unwrap_or(&0);
        let (winner, loser) = if rank_a >= rank_b { (ra, rb) } else { (rb, ra) };
        self.parent.insert(loser, winner);
        if rank_a == rank_b {
            *self.rank.entry(winner).or_insert(0) += 1;
        }
        self.migrate_representative(loser, winner);
        winner
    }

    /// After merging `loser` into `winner`, re-key every fact that referred
    /// to `loser` under its old representative.
    fn migrate_representative(&mut self, loser: u64, winner: u64) {
        let disjoint: Vec<(u64, u64)> = self.disjoint.drain().collect();
        for (x, y) in disjoint {
            let x = if x == loser { winner } else { x };
            let y = if y == loser { winner } else { y };
            self.disjoint.insert(Self::normalize_pair(x, y));
        }
        if let Some(sups) = self.subset_of.remove(&loser) {
            self.subset_of.entry(winner).or_default().extend(sups);
        }
        for sups in self.subset_of.values_mut() {
            if sups.remove(&loser) {
                sups.insert(winner);
            }
        }
        if self.empty.remove(&loser) {
            self.empty.insert(winner);
        }
    }

    fn normalize_pair(a: u64, b: u64) -> (u64, u64) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn rep(&mut self, u: Universe) -> u64 {
        self.find(u.0)
    }

    /// Mark `u` as the empty universe: disjoint from every universe and a
    /// subset of every universe.
    pub fn register_as_empty(&mut self, u: Universe) {
        let r = self.rep(u);
        self.empty.insert(r);
        let others: Vec<u64> = self.parent.keys().copied().collect();
        for o in others {
            let o_rep = self.find(o);
            if o_rep != r {
                self.disjoint.insert(Self::normalize_pair(r, o_rep));
                self.subset_of.entry(r).or_default().insert(o_rep);
            }
        }
    }

    pub fn query_are_equal(&mut self, a: Universe, b: Universe) -> bool {
        self.find(a.0) == self.find(b.0)
    }

    /// True iff every pair among `universes` is proven disjoint (or equal
    /// to the empty universe's representative).
    pub fn query_are_disjoint(&mut self, universes: &[Universe]) -> bool {
        if universes.len() < 2 {
            return true;
        }
        let reps: Vec<u64> = universes.iter().map(|u| self.rep(*u)).collect();
        for i in 0..reps.len() {
            for j in (i + 1)..reps.len() {
                if reps[i] == reps[j] {
                    return false;
                }
                let pair = Self::normalize_pair(reps[i], reps[j]);
                if !self.disjoint.contains(&pair) {
                    return false;
                }
            }
        }
        true
    }

    pub fn query_is_subset(&mut self, u: Universe, v: Universe) -> bool {
        let ru = self.rep(u);
        let rv = self.rep(v);
        if ru == rv {
            return true;
        }
        self.subset_of
            .get(&ru)
            .map(|sups| sups.contains(&rv))
            .unwrap_or(false)
    }

    pub fn query_is_superset(&mut self, u: Universe, v: Universe) -> bool {
        self.query_is_subset(v, u)
    }

    /// Canonical union of `universes`. If all inputs are already equal,
    /// returns that representative; if all pairwise disjoint, allocates and
    /// returns a fresh universe.
    pub fn get_union(&mut self, universes: &[Universe]) -> Universe {
        assert!(!universes.is_empty(), "get_union requires at least one universe");
        if universes.len() == 1 {
            return universes[0];
        }
        if universes.windows(2).all(|w| self.query_are_equal(w[0], w[1])) {
            return universes[0];
        }
        self.new_universe()
    }

    /// Canonical intersection. If one argument is a subset of every other,
    /// it *is* the intersection (no new universe is allocated); otherwise a
    /// fresh universe is allocated as a subset of each input.
    ///
    /// Per the spec's open question: when only *some* (not all) pairwise
    /// subset relations are known, we conservatively take the "fresh
    /// universe" branch rather than guessing which partial order holds.
    pub fn get_intersection(&mut self, universes: &[Universe]) -> Universe {
        assert!(!universes.is_empty(), "get_intersection requires at least one universe");
        for (i, candidate) in universes.iter().enumerate() {
            if universes
                .iter()
                .enumerate()
                .all(|(j, other)| i == j || self.query_is_subset(*candidate, *other))
            {
                return *candidate;
            }
        }
        let fresh = self.new_universe();
        for u in universes {
            let ru = self.rep(*u);
            let rf = self.rep(fresh);
            self.subset_of.entry(rf).or_default().insert(ru);
        }
        fresh
    }

    /// Fresh universe that is a subset of `u` and disjoint from `v`.
    pub fn get_difference(&mut self, u: Universe, v: Universe) -> Universe {
        let fresh = self.new_universe();
        let ru = self.rep(u);
        let rv = self.rep(v);
        let rf = self.rep(fresh);
        self.subset_of.entry(rf).or_default().insert(ru);
        self.disjoint.insert(Self::normalize_pair(rf, rv));
        fresh
    }

    /// Assert `a == b`. Monotone: never retracts a prior fact. Raises
    /// [`UniverseContradiction`] if `a` and `b` are already known disjoint.
    pub fn promise_are_equal(&mut self, a: Universe, b: Universe) -> Result<(), UniverseContradiction> {
        let ra = self.rep(a);
        let rb = self.rep(b);
        if ra == rb {
            return Ok(());
        }
        if self.disjoint.contains(&Self::normalize_pair(ra, rb)) {
            return Err(UniverseContradiction::EqualButDisjoint { a, b });
        }
        self.union(ra, rb);
        Ok(())
    }

    /// Assert `sub ⊆ sup`. Monotone.
    pub fn promise_is_subset_of(&mut self, sub: Universe, sup: Universe) -> Result<(), UniverseContradiction> {
        let rsub = self.rep(sub);
        let rsup = self.rep(sup);
        if rsub == rsup {
            return Ok(());
        }
        if self.disjoint.contains(&Self::normalize_pair(rsub, rsup)) && !self.empty.contains(&rsub) {
            return Err(UniverseContradiction::SubsetButDisjoint { sub, sup });
        }
        self.subset_of.entry(rsub).or_default().insert(rsup);
        Ok(())
    }

    /// Assert every pair of `universes` is disjoint. Monotone.
    pub fn promise_are_pairwise_disjoint(&mut self, universes: &[Universe]) -> Result<(), UniverseContradiction> {
        for i in 0..universes.len() {
            for j in (i + 1)..universes.len() {
                let ri = self.rep(universes[i]);
                let rj = self.rep(universes[j]);
                if ri == rj {
                    return Err(UniverseContradiction::DisjointButEqual {
                        a: universes[i],
                        b: universes[j],
                    });
                }
                self.disjoint.insert(Self::normalize_pair(ri, rj));
            }
        }
        Ok(())
    }
}
