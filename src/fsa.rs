//! Finite-state acceptors.
//!
//! States are dense ids. Acceptors built by [`Fsa::levenshtein`] also carry
//! `(i, j)` coordinates, where `i` counts reference tokens consumed and `j`
//! edits spent; every transition is monotone in both, which is what the
//! pruned intersection relies on.

use crate::symbol::{StateId, Symbol};
use petgraph::algo::dijkstra;
use petgraph::graphmap::DiGraphMap;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

/// Errors raised while building or using an acceptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsaError {
    #[error("transition ({from}, {symbol}, {to}) references a state outside 0..{states}")]
    UnknownState {
        from: StateId,
        symbol: String,
        to: StateId,
        states: usize,
    },
    #[error("state {state} is outside 0..{states}")]
    UnknownEndpoint { state: StateId, states: usize },
    #[error("state {state} has no coordinates; pruned intersection needs a Levenshtein acceptor")]
    MissingCoordinates { state: StateId },
}

pub type FsaResult<T> = Result<T, FsaError>;

/// A nondeterministic finite-state acceptor.
#[derive(Clone, Debug)]
pub struct Fsa {
    coordinates: Vec<Option<(usize, usize)>>,
    transitions: Vec<(StateId, Symbol, StateId)>,
    by_symbol: FxHashMap<Symbol, Vec<(StateId, StateId)>>,
    successors: Vec<Vec<(Symbol, StateId)>>,
    init: BTreeSet<StateId>,
    finals: BTreeSet<StateId>,
    /// distances[p][q] = length of the shortest path, if any
    distances: Vec<Vec<Option<usize>>>,
}

impl Fsa {
    /// An acceptor over states `0..states`.
    pub fn new(
        states: usize,
        transitions: impl IntoIterator<Item = (StateId, Symbol, StateId)>,
        init: impl IntoIterator<Item = StateId>,
        finals: impl IntoIterator<Item = StateId>,
    ) -> FsaResult<Self> {
        Fsa::build(vec![None; states], transitions, init, finals)
    }

    /// An acceptor whose state `q` sits at `coordinates[q]`.
    pub fn with_coordinates(
        coordinates: Vec<(usize, usize)>,
        transitions: impl IntoIterator<Item = (StateId, Symbol, StateId)>,
        init: impl IntoIterator<Item = StateId>,
        finals: impl IntoIterator<Item = StateId>,
    ) -> FsaResult<Self> {
        Fsa::build(coordinates.into_iter().map(Some).collect(), transitions, init, finals)
    }

    fn build(
        coordinates: Vec<Option<(usize, usize)>>,
        transitions: impl IntoIterator<Item = (StateId, Symbol, StateId)>,
        init: impl IntoIterator<Item = StateId>,
        finals: impl IntoIterator<Item = StateId>,
    ) -> FsaResult<Self> {
        let states = coordinates.len();
        let transitions: Vec<(StateId, Symbol, StateId)> = transitions.into_iter().collect();
        if let Some((p, a, q)) = transitions.iter().find(|(p, _, q)| *p >= states || *q >= states) {
            return Err(FsaError::UnknownState {
                from: *p,
                symbol: a.to_string(),
                to: *q,
                states,
            });
        }
        let init: BTreeSet<StateId> = init.into_iter().collect();
        let finals: BTreeSet<StateId> = finals.into_iter().collect();
        if let Some(&state) = init.iter().chain(finals.iter()).find(|&&q| q >= states) {
            return Err(FsaError::UnknownEndpoint { state, states });
        }
        Ok(Fsa::assemble(coordinates, transitions, init, finals))
    }

    /// Index a validated acceptor.
    fn assemble(
        coordinates: Vec<Option<(usize, usize)>>,
        transitions: Vec<(StateId, Symbol, StateId)>,
        init: BTreeSet<StateId>,
        finals: BTreeSet<StateId>,
    ) -> Self {
        let states = coordinates.len();
        let mut by_symbol: FxHashMap<Symbol, Vec<(StateId, StateId)>> = FxHashMap::default();
        let mut successors = vec![Vec::new(); states];
        for (p, a, q) in &transitions {
            by_symbol.entry(a.clone()).or_default().push((*p, *q));
            successors[*p].push((a.clone(), *q));
        }

        let distances = shortest_paths(states, &transitions);
        debug!(states, transitions = transitions.len(), "built acceptor");

        Fsa {
            coordinates,
            transitions,
            by_symbol,
            successors,
            init,
            finals,
            distances,
        }
    }

    /// Acceptor for every token sequence within `radius` edits of `reference`.
    ///
    /// State `(i, j)` has read a prefix aligned with `reference[..i]` using
    /// `j` edits. Transitions:
    /// - match: `(i, j) -ref[i]-> (i+1, j)`
    /// - substitution: `(i, j) -a-> (i+1, j+1)` for `a != ref[i]`
    /// - insertion: `(i, j) -a-> (i, j+1)`
    /// - deletion of `k` tokens then a match: `(i, j) -ref[i+k]-> (i+k+1, j+k)`
    ///
    /// `(i, j)` is final when the rest of the reference can be deleted,
    /// i.e. `n - i <= radius - j`.
    pub fn levenshtein(reference: &[Symbol], radius: usize, alphabet: &BTreeSet<Symbol>) -> Self {
        let n = reference.len();
        let id = |i: usize, j: usize| i * (radius + 1) + j;
        let mut coordinates = Vec::with_capacity((n + 1) * (radius + 1));
        for i in 0..=n {
            for j in 0..=radius {
                coordinates.push((i, j));
            }
        }

        let mut transitions = Vec::new();
        for i in 0..=n {
            for j in 0..=radius {
                if i < n {
                    transitions.push((id(i, j), reference[i].clone(), id(i + 1, j)));
                }
                if j == radius {
                    continue;
                }
                for a in alphabet {
                    if i < n && *a != reference[i] {
                        transitions.push((id(i, j), a.clone(), id(i + 1, j + 1)));
                    }
                    transitions.push((id(i, j), a.clone(), id(i, j + 1)));
                }
                for k in 1..=radius - j {
                    if i + k < n {
                        transitions.push((id(i, j), reference[i + k].clone(), id(i + k + 1, j + k)));
                    }
                }
            }
        }

        let finals = coordinates
            .iter()
            .filter(|&&(i, j)| n - i <= radius - j)
            .map(|&(i, j)| id(i, j))
            .collect();
        let coordinates = coordinates.into_iter().map(Some).collect();
        Fsa::assemble(coordinates, transitions, BTreeSet::from([id(0, 0)]), finals)
    }

    pub fn num_states(&self) -> usize {
        self.coordinates.len()
    }

    pub fn states(&self) -> std::ops::Range<StateId> {
        0..self.num_states()
    }

    pub fn transitions(&self) -> &[(StateId, Symbol, StateId)] {
        &self.transitions
    }

    /// Every `(p, q)` with a transition `p -a-> q`.
    pub fn transitions_on(&self, a: &Symbol) -> &[(StateId, StateId)] {
        self.by_symbol.get(a).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn init(&self) -> &BTreeSet<StateId> {
        &self.init
    }

    pub fn finals(&self) -> &BTreeSet<StateId> {
        &self.finals
    }

    pub fn alphabet(&self) -> BTreeSet<Symbol> {
        self.by_symbol.keys().cloned().collect()
    }

    pub fn coordinate(&self, q: StateId) -> Option<(usize, usize)> {
        self.coordinates.get(q).copied().flatten()
    }

    /// Coordinates of every state, or the first state lacking them.
    pub fn require_coordinates(&self) -> FsaResult<Vec<(usize, usize)>> {
        self.states()
            .map(|q| self.coordinate(q).ok_or(FsaError::MissingCoordinates { state: q }))
            .collect()
    }

    /// Length of the shortest path from `p` to `q`.
    pub fn distance(&self, p: StateId, q: StateId) -> Option<usize> {
        self.distances.get(p).and_then(|row| row.get(q)).copied().flatten()
    }

    /// Length of the longest monotone path from `p` to `q`, when both have
    /// coordinates and `q` dominates `p`.
    pub fn manhattan(&self, p: StateId, q: StateId) -> Option<usize> {
        let (pi, pj) = self.coordinate(p)?;
        let (qi, qj) = self.coordinate(q)?;
        (pi <= qi && pj <= qj).then(|| (qi - pi) + (qj - pj))
    }

    /// Whether the acceptor accepts `tokens`.
    pub fn accepts(&self, tokens: &[Symbol]) -> bool {
        let mut current: BTreeSet<StateId> = self.init.clone();
        for token in tokens {
            current = current
                .iter()
                .flat_map(|&p| self.successors[p].iter())
                .filter(|(a, _)| a == token)
                .map(|&(_, q)| q)
                .collect();
            if current.is_empty() {
                return false;
            }
        }
        current.iter().any(|q| self.finals.contains(q))
    }
}

/// All-pairs shortest path lengths, one unit per transition.
fn shortest_paths(states: usize, transitions: &[(StateId, Symbol, StateId)]) -> Vec<Vec<Option<usize>>> {
    let mut graph: DiGraphMap<StateId, ()> = DiGraphMap::with_capacity(states, transitions.len());
    for q in 0..states {
        graph.add_node(q);
    }
    for &(p, _, q) in transitions {
        graph.add_edge(p, q, ());
    }
    (0..states)
        .map(|p| {
            let reached = dijkstra(&graph, p, None, |_| 1usize);
            (0..states).map(|q| reached.get(&q).copied()).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repair::levenshtein;
    use crate::symbol::tokenize;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s)
    }

    /// a ( + a | + b* )
    fn plus_fsa() -> Fsa {
        Fsa::new(
            5,
            [
                (0, sym("a"), 1),
                (1, sym("+"), 2),
                (2, sym("a"), 3),
                (2, sym("b"), 4),
                (4, sym("b"), 4),
            ],
            [0],
            [2, 3, 4],
        )
        .unwrap()
    }

    #[test]
    fn test_accepts() {
        let fsa = plus_fsa();
        assert!(fsa.accepts(&tokenize("a + a")));
        assert!(fsa.accepts(&tokenize("a +")));
        assert!(fsa.accepts(&tokenize("a + b b b")));
        assert!(!fsa.accepts(&tokenize("a + +")));
        assert!(!fsa.accepts(&tokenize("a")));
        assert!(!fsa.accepts(&tokenize("a + a a")));
    }

    #[test]
    fn test_shortest_paths() {
        let fsa = plus_fsa();
        assert_eq!(fsa.distance(0, 0), Some(0));
        assert_eq!(fsa.distance(0, 4), Some(3));
        assert_eq!(fsa.distance(4, 4), Some(0));
        assert_eq!(fsa.distance(3, 0), None);
        assert_eq!(fsa.manhattan(0, 4), None);
    }

    #[test]
    fn test_unknown_state() {
        let err = Fsa::new(2, [(0, sym("a"), 2)], [0], [1]).unwrap_err();
        assert!(matches!(err, FsaError::UnknownState { to: 2, .. }));
        let err = Fsa::new(2, [(0, sym("a"), 1)], [0], [5]).unwrap_err();
        assert_eq!(err, FsaError::UnknownEndpoint { state: 5, states: 2 });
        assert!(plus_fsa().require_coordinates().is_err());
    }

    #[test]
    fn test_levenshtein_language() {
        let reference = tokenize("a b c");
        let alphabet: BTreeSet<Symbol> = tokenize("a b c").into_iter().collect();
        let fsa = Fsa::levenshtein(&reference, 2, &alphabet);

        assert!(fsa.require_coordinates().is_ok());
        // Every string of length <= 5 over the alphabet
        let mut layer = vec![Vec::new()];
        let mut all = vec![Vec::new()];
        for _ in 0..5 {
            layer = layer
                .iter()
                .flat_map(|w: &Vec<Symbol>| {
                    alphabet.iter().map(move |a| {
                        let mut w = w.clone();
                        w.push(a.clone());
                        w
                    })
                })
                .collect();
            all.extend(layer.iter().cloned());
        }
        for w in all {
            assert_eq!(
                fsa.accepts(&w),
                levenshtein(&w, &reference) <= 2,
                "disagree on {:?}",
                w
            );
        }
    }

    #[test]
    fn test_levenshtein_geometry() {
        let reference = tokenize("x y");
        let alphabet: BTreeSet<Symbol> = reference.iter().cloned().collect();
        let fsa = Fsa::levenshtein(&reference, 1, &alphabet);

        // States (0,0) (0,1) (1,0) (1,1) (2,0) (2,1)
        assert_eq!(fsa.num_states(), 6);
        assert_eq!(fsa.coordinate(5), Some((2, 1)));
        assert_eq!(fsa.distance(0, 4), Some(2));
        assert_eq!(fsa.manhattan(0, 5), Some(3));
        assert_eq!(fsa.manhattan(5, 0), None);
        for &(p, _, q) in fsa.transitions() {
            let (pi, pj) = fsa.coordinate(p).unwrap();
            let (qi, qj) = fsa.coordinate(q).unwrap();
            assert!(pi <= qi && pj <= qj && (pi, pj) != (qi, qj));
        }
    }
}
