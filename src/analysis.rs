//! Fixpoint analyses over grammars.

use crate::chart::Chart;
use crate::compiled::{CompiledGrammar, NtId};
use crate::cyk::NonterminalSets;
use crate::grammar::Cfg;
use crate::symbol::Symbol;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::BTreeSet;
use tracing::debug;

/// Nonterminals that derive the empty string.
pub fn nullable(cfg: &Cfg) -> BTreeSet<Symbol> {
    let mut nullable = BTreeSet::new();
    loop {
        let before = nullable.len();
        for p in cfg {
            if !nullable.contains(&p.lhs)
                && p.rhs.iter().all(|s| s.is_epsilon() || nullable.contains(s))
            {
                nullable.insert(p.lhs.clone());
            }
        }
        if nullable.len() == before {
            return nullable;
        }
    }
}

/// Nonterminals that derive some terminal string.
pub fn generating(cfg: &Cfg) -> BTreeSet<Symbol> {
    generating_among(cfg, &cfg.nonterminals())
}

/// [`generating`], where exactly the symbols in `vars` are nonterminals.
pub(crate) fn generating_among(cfg: &Cfg, vars: &BTreeSet<Symbol>) -> BTreeSet<Symbol> {
    let mut generating = BTreeSet::new();
    loop {
        let before = generating.len();
        for p in cfg {
            if !generating.contains(&p.lhs)
                && p.rhs.iter().all(|s| !vars.contains(s) || generating.contains(s))
            {
                generating.insert(p.lhs.clone());
            }
        }
        if generating.len() == before {
            return generating;
        }
    }
}

/// `from` and every nonterminal reachable from it through right-hand sides.
pub fn reachable(cfg: &Cfg, from: impl IntoIterator<Item = Symbol>) -> BTreeSet<Symbol> {
    let nonterminals = cfg.nonterminals();
    let mut seen: BTreeSet<Symbol> = BTreeSet::new();
    let mut stack: Vec<Symbol> = Vec::new();
    for s in from {
        if seen.insert(s.clone()) {
            stack.push(s);
        }
    }
    while let Some(a) = stack.pop() {
        for p in cfg.productions_of(&a) {
            for s in &p.rhs {
                if nonterminals.contains(s) && seen.insert(s.clone()) {
                    stack.push(s.clone());
                }
            }
        }
    }
    seen
}

/// Configuration for [`parikh_bounds`].
#[derive(Clone, Debug)]
pub struct ParikhConfig {
    /// Longest span explored when looking for the shortest derivation.
    pub horizon: usize,
}

impl Default for ParikhConfig {
    fn default() -> Self {
        ParikhConfig { horizon: 20 }
    }
}

impl ParikhConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }
}

/// How many tokens a nonterminal can span.
///
/// `min` is exact up to the horizon and `horizon + 1` past it, so it is
/// always a lower bound. `max` is `None` when the language is infinite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParikhBound {
    pub min: usize,
    pub max: Option<usize>,
}

impl ParikhBound {
    /// Whether some length in `lo..=hi` is within the bound.
    pub fn overlaps(&self, lo: usize, hi: usize) -> bool {
        lo <= hi && self.min <= hi && self.max.map_or(true, |max| lo <= max)
    }
}

/// Parikh bounds per nonterminal id of a compiled grammar.
///
/// Only derivations over real terminals count: `ε` and stubs are ignored,
/// and a nonterminal with no such derivation has no bound.
#[derive(Clone, Debug, Default)]
pub struct ParikhBounds {
    bounds: Vec<Option<ParikhBound>>,
}

impl ParikhBounds {
    pub fn get(&self, nt: NtId) -> Option<ParikhBound> {
        self.bounds.get(nt).copied().flatten()
    }

    /// Whether `nt` can span some length in `lo..=hi`.
    pub fn compatible(&self, nt: NtId, lo: usize, hi: usize) -> bool {
        self.get(nt).map_or(false, |b| b.overlaps(lo, hi))
    }
}

/// Compute span-length bounds for every nonterminal.
///
/// The shortest span is read off a chart over a template of `horizon`
/// wildcard tokens, each derivable by every lexical nonterminal: a
/// nonterminal first appears on the diagonal of its shortest derivation.
/// The longest span is exact for finite languages.
pub fn parikh_bounds(grammar: &CompiledGrammar, config: &ParikhConfig) -> ParikhBounds {
    let n = grammar.num_nonterminals();
    let lexical: BTreeSet<NtId> = (0..n)
        .filter(|&a| {
            grammar
                .lexical()
                .terminals(a)
                .iter()
                .any(|t| !t.is_epsilon() && !t.is_stub())
        })
        .collect();

    let alg = NonterminalSets::new(grammar);
    let chart = Chart::from_seeds(vec![lexical.clone(); config.horizon], &alg).seek_fixpoint(&alg);
    let mut min: Vec<Option<usize>> = vec![None; n];
    for d in 1..=config.horizon {
        // Every cell of a diagonal is identical over a uniform template
        for &a in chart.get(0, d) {
            min[a].get_or_insert(d);
        }
    }

    let generating = generating_ids(grammar, &lexical);
    let max = longest_spans(grammar, &lexical, &generating);

    let bounds = (0..n)
        .map(|a| {
            generating[a].then(|| ParikhBound {
                min: min[a].unwrap_or(config.horizon + 1),
                max: max[a],
            })
        })
        .collect();
    debug!(nonterminals = n, horizon = config.horizon, "computed parikh bounds");
    ParikhBounds { bounds }
}

fn generating_ids(grammar: &CompiledGrammar, lexical: &BTreeSet<NtId>) -> Vec<bool> {
    let n = grammar.num_nonterminals();
    let mut generating = vec![false; n];
    for &a in lexical {
        generating[a] = true;
    }
    loop {
        let mut changed = false;
        for a in 0..n {
            if !generating[a]
                && grammar
                    .binary()
                    .children(a)
                    .iter()
                    .any(|&(l, r)| generating[l] && generating[r])
            {
                generating[a] = true;
                changed = true;
            }
        }
        if !changed {
            return generating;
        }
    }
}

/// Longest derivable span, `None` when unbounded.
///
/// Nonterminals on or above a cycle of the generating binary graph are
/// unbounded. The rest form a DAG whose strongly connected components come
/// out of Tarjan's algorithm children first, so one pass settles them.
fn longest_spans(grammar: &CompiledGrammar, lexical: &BTreeSet<NtId>, generating: &[bool]) -> Vec<Option<usize>> {
    let n = grammar.num_nonterminals();
    let mut graph: DiGraph<NtId, ()> = DiGraph::with_capacity(n, 0);
    for a in 0..n {
        graph.add_node(a);
    }
    for a in 0..n {
        for &(l, r) in grammar.binary().children(a) {
            if generating[l] && generating[r] {
                graph.update_edge(NodeIndex::new(a), NodeIndex::new(l), ());
                graph.update_edge(NodeIndex::new(a), NodeIndex::new(r), ());
            }
        }
    }

    let mut infinite = vec![false; n];
    let mut max: Vec<Option<usize>> = vec![None; n];
    for component in tarjan_scc(&graph) {
        let cyclic = component.len() > 1
            || component
                .first()
                .map_or(false, |&a| graph.find_edge(a, a).is_some());
        for &node in &component {
            let a = node.index();
            infinite[a] = cyclic || graph.neighbors(node).any(|b| infinite[b.index()]);
        }
        if cyclic {
            continue;
        }
        for &node in &component {
            let a = node.index();
            if !generating[a] || infinite[a] {
                continue;
            }
            let lexical_span = lexical.contains(&a).then_some(1);
            max[a] = grammar
                .binary()
                .children(a)
                .iter()
                .filter_map(|&(l, r)| Some(max[l]? + max[r]?))
                .chain(lexical_span)
                .max();
        }
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s)
    }

    #[test]
    fn test_nullable() {
        let cfg = Cfg::parse("S -> A B | c\nA -> ε\nB -> A A | b\nC -> c").unwrap();
        assert_eq!(nullable(&cfg), BTreeSet::from([sym("S"), sym("A"), sym("B")]));
    }

    #[test]
    fn test_generating_and_reachable() {
        let cfg = Cfg::parse("START -> A | B\nA -> a\nB -> B b\nC -> c").unwrap();
        assert_eq!(generating(&cfg), BTreeSet::from([Symbol::start(), sym("A"), sym("C")]));
        assert_eq!(
            reachable(&cfg, [Symbol::start()]),
            BTreeSet::from([Symbol::start(), sym("A"), sym("B")])
        );
        assert_eq!(cfg.reachable_from(&sym("C")), BTreeSet::from([sym("C")]));
    }

    #[test]
    fn test_bound_overlap() {
        let b = ParikhBound { min: 2, max: Some(4) };
        assert!(b.overlaps(0, 2));
        assert!(b.overlaps(3, 3));
        assert!(b.overlaps(4, 9));
        assert!(!b.overlaps(5, 9));
        assert!(!b.overlaps(0, 1));
        // The interval strictly contains the bound
        assert!(b.overlaps(1, 5));
        assert!(ParikhBound { min: 3, max: None }.overlaps(100, 200));
    }

    #[test]
    fn test_parikh_bounds_finite_and_infinite() {
        let g = CompiledGrammar::from_source("START -> A B\nA -> a | a a a\nB -> b B | b").unwrap();
        let bounds = parikh_bounds(&g, &ParikhConfig::default());

        let a = g.id(&sym("A")).unwrap();
        let b = g.id(&sym("B")).unwrap();
        let start = g.start().unwrap();
        assert_eq!(bounds.get(a), Some(ParikhBound { min: 1, max: Some(3) }));
        assert_eq!(bounds.get(b), Some(ParikhBound { min: 1, max: None }));
        assert_eq!(bounds.get(start), Some(ParikhBound { min: 2, max: None }));
    }

    #[test]
    fn test_parikh_max_above_a_cycle() {
        // C is finite but sits below the recursive B, which START reaches
        let g = CompiledGrammar::from_source("START -> A B\nA -> C C\nB -> B C | c\nC -> c c | c").unwrap();
        let bounds = parikh_bounds(&g, &ParikhConfig::default());

        let a = g.id(&sym("A")).unwrap();
        let c = g.id(&sym("C")).unwrap();
        assert_eq!(bounds.get(c).map(|b| b.max), Some(Some(2)));
        assert_eq!(bounds.get(a).map(|b| b.max), Some(Some(4)));
        assert_eq!(bounds.get(g.start().unwrap()).map(|b| b.max), Some(None));
    }

    #[test]
    fn test_parikh_min_past_horizon() {
        let g = CompiledGrammar::from_source("START -> a a a a a").unwrap();
        let bounds = parikh_bounds(&g, &ParikhConfig::new().with_horizon(3));
        let start = g.start().unwrap();

        assert_eq!(bounds.get(start), Some(ParikhBound { min: 4, max: Some(5) }));
        assert!(!bounds.compatible(start, 0, 3));
        assert!(bounds.compatible(start, 5, 5));
    }
}
