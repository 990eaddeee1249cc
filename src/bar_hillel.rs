//! Bar-Hillel intersection of a grammar with a finite-state acceptor.
//!
//! The product grammar has nonterminals `[p, A, q]` deriving exactly the
//! strings that `A` derives and that drive the acceptor from `p` to `q`:
//!
//! - `START -> [p, START, q]` for every initial `p` and final `q`;
//! - `[p, A, q] -> a` for every `A -> a` and transition `p -a-> q`;
//! - `[p, A, r] -> [p, B, q] [q, C, r]` for every `A -> B C` and admissible
//!   triple `(p, q, r)`.
//!
//! [`intersect`] admits every triple along which the acceptor can move and
//! works for any acceptor. [`intersect_levenshtein`] additionally requires
//! the coordinates of consecutive states to be ordered and the Parikh bound
//! of each nonterminal to fit the distance range of its span, which is only
//! sound for monotone acyclic acceptors such as [`Fsa::levenshtein`].

use crate::analysis::{parikh_bounds, ParikhBounds, ParikhConfig};
use crate::compiled::{CompiledGrammar, NtId};
use crate::fsa::{Fsa, FsaResult};
use crate::grammar::{Cfg, Production};
use crate::normalize;
use crate::symbol::{StateId, Symbol};
use rustc_hash::{FxHashMap, FxHashSet};
use std::time::Instant;
use tracing::{debug, info};

/// Configuration for [`intersect_with`].
#[derive(Clone, Debug, Default)]
pub struct IntersectConfig {
    /// Prune triples by coordinates and Parikh bounds.
    pub prune: bool,
    pub parikh: ParikhConfig,
}

impl IntersectConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pruning(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub fn with_parikh(mut self, parikh: ParikhConfig) -> Self {
        self.parikh = parikh;
        self
    }
}

/// Intersect with any acceptor.
pub fn intersect(grammar: &CompiledGrammar, fsa: &Fsa) -> CompiledGrammar {
    let admissible = Admissible::build(grammar, fsa, |_, _, _| true);
    product(grammar, fsa, &admissible, false)
}

/// Intersect with a monotone acyclic acceptor carrying coordinates.
pub fn intersect_levenshtein(grammar: &CompiledGrammar, fsa: &Fsa) -> FsaResult<CompiledGrammar> {
    intersect_with(grammar, fsa, &IntersectConfig::new().with_pruning(true))
}

/// Admissible state pairs `(p, q)` for the span of one nonterminal.
struct Admissible {
    pairs: Vec<FxHashSet<(StateId, StateId)>>,
    /// from[a][p] = [q | (p, q) admissible for a]
    from: Vec<FxHashMap<StateId, Vec<StateId>>>,
}

impl Admissible {
    fn build(grammar: &CompiledGrammar, fsa: &Fsa, allowed: impl Fn(NtId, StateId, StateId) -> bool) -> Self {
        let n = grammar.num_nonterminals();
        let mut pairs = vec![FxHashSet::default(); n];
        let mut from = vec![FxHashMap::default(); n];
        for a in 0..n {
            for p in fsa.states() {
                for q in fsa.states() {
                    if fsa.distance(p, q).is_some() && allowed(a, p, q) {
                        pairs[a].insert((p, q));
                        from[a].entry(p).or_insert_with(Vec::new).push(q);
                    }
                }
            }
        }
        Admissible { pairs, from }
    }

    fn contains(&self, a: NtId, p: StateId, q: StateId) -> bool {
        self.pairs[a].contains(&(p, q))
    }

    fn successors(&self, a: NtId, p: StateId) -> &[StateId] {
        self.from[a].get(&p).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Intersect, pruning as configured.
pub fn intersect_with(
    grammar: &CompiledGrammar,
    fsa: &Fsa,
    config: &IntersectConfig,
) -> FsaResult<CompiledGrammar> {
    let admissible = if config.prune {
        let coords = fsa.require_coordinates()?;
        let bounds: ParikhBounds = parikh_bounds(grammar, &config.parikh);
        Admissible::build(grammar, fsa, |a, p, q| {
            let ((pi, pj), (qi, qj)) = (coords[p], coords[q]);
            if pi > qi || pj > qj {
                return false;
            }
            match (fsa.distance(p, q), fsa.manhattan(p, q)) {
                (Some(lo), Some(hi)) => bounds.compatible(a, lo, hi),
                _ => false,
            }
        })
    } else {
        Admissible::build(grammar, fsa, |_, _, _| true)
    };
    Ok(product(grammar, fsa, &admissible, config.prune))
}

/// Build the product grammar over admissible spans, then reduce and
/// normalize it.
fn product(grammar: &CompiledGrammar, fsa: &Fsa, admissible: &Admissible, pruned: bool) -> CompiledGrammar {
    let clock = Instant::now();
    let bracket = |p: StateId, a: NtId, q: StateId| Symbol::bracketed(p, grammar.symbol(a), q);
    let mut cfg = Cfg::new();
    let start = Symbol::start();

    if let Some(s) = grammar.start() {
        for &p in fsa.init() {
            for &q in fsa.finals() {
                cfg.insert(Production::unit(start.clone(), bracket(p, s, q)));
            }
        }
        if grammar.derives_epsilon() && fsa.init().iter().any(|q| fsa.finals().contains(q)) {
            cfg.insert(Production::unit(start.clone(), Symbol::Epsilon));
        }
    }

    for a in 0..grammar.num_nonterminals() {
        for t in grammar.lexical().terminals(a) {
            for &(p, q) in fsa.transitions_on(t) {
                cfg.insert(Production::unit(bracket(p, a, q), t.clone()));
            }
        }
        for &(b, c) in grammar.binary().children(a) {
            for &(p, q) in &admissible.pairs[b] {
                for &r in admissible.successors(c, q) {
                    if admissible.contains(a, p, r) {
                        cfg.insert(Production::binary(
                            bracket(p, a, r),
                            bracket(p, b, q),
                            bracket(q, c, r),
                        ));
                    }
                }
            }
        }
    }
    info!(
        productions = cfg.len(),
        states = fsa.num_states(),
        pruned,
        elapsed_ms = clock.elapsed().as_millis() as u64,
        "constructed intersection grammar"
    );

    let clock = Instant::now();
    let reduced = drop_vestigial_productions(&cfg).without_stubs();
    let compiled = CompiledGrammar::new(&reduced);
    info!(
        productions = compiled.cfg().len(),
        elapsed_ms = clock.elapsed().as_millis() as u64,
        "post-processed intersection grammar"
    );
    compiled
}

/// Repeatedly drop productions mentioning a bracketed nonterminal without
/// productions, then useless productions, until nothing changes.
pub fn drop_vestigial_productions(cfg: &Cfg) -> Cfg {
    let mut current = cfg.clone();
    loop {
        let defined = current.nonterminals();
        let mut next = current.clone();
        next.retain(|p| !p.rhs.iter().any(|s| s.is_bracketed() && !defined.contains(s)));
        let next = normalize::remove_useless(&next);
        debug!(removed = current.len() - next.len(), "removed vestigial productions");
        if next.len() == current.len() {
            return next;
        }
        current = next;
    }
}
