//! CYK as a semiring fixpoint.
//!
//! Recognition and parsing run the same [`Chart::seek_fixpoint`] over two
//! grammar algebras:
//!
//! - [`NonterminalSets`]: a cell is the set of nonterminals deriving its span;
//! - [`Forests`]: a cell maps each such nonterminal to one witness tree.
//!
//! Neither algebra has a multiplicative unit; `one` returns the empty cell
//! and is never consulted by the chart.

use crate::chart::Chart;
use crate::compiled::{CompiledGrammar, NtId};
use crate::semiring::Semiring;
use crate::symbol::Symbol;
use crate::tree::{Forest, Tree};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::trace;

/// Sets of nonterminals under union and the binary rewrite join.
#[derive(Clone, Copy, Debug)]
pub struct NonterminalSets<'g> {
    grammar: &'g CompiledGrammar,
}

impl<'g> NonterminalSets<'g> {
    pub fn new(grammar: &'g CompiledGrammar) -> Self {
        NonterminalSets { grammar }
    }

    /// `{A | A -> token}`
    pub fn seed(&self, token: &Symbol) -> BTreeSet<NtId> {
        self.grammar.lexical().lookup(token).iter().copied().collect()
    }
}

impl Semiring for NonterminalSets<'_> {
    type Elem = BTreeSet<NtId>;

    fn zero(&self) -> Self::Elem {
        BTreeSet::new()
    }

    /// No set is a unit under rewriting; this is `zero`.
    fn one(&self) -> Self::Elem {
        BTreeSet::new()
    }

    fn plus(&self, a: &Self::Elem, b: &Self::Elem) -> Self::Elem {
        a.union(b).copied().collect()
    }

    fn times(&self, a: &Self::Elem, b: &Self::Elem) -> Self::Elem {
        let mut out = BTreeSet::new();
        for &l in a {
            for &r in b {
                out.extend(self.grammar.binary().lookup(l, r).iter().copied());
            }
        }
        out
    }

    fn is_zero(&self, a: &Self::Elem) -> bool {
        a.is_empty()
    }
}

/// Witness forests under left-biased union and tree joining.
#[derive(Clone, Copy, Debug)]
pub struct Forests<'g> {
    grammar: &'g CompiledGrammar,
}

impl<'g> Forests<'g> {
    pub fn new(grammar: &'g CompiledGrammar) -> Self {
        Forests { grammar }
    }

    /// One leaf per nonterminal deriving `token` at `position`.
    pub fn seed(&self, token: &Symbol, position: usize) -> Forest {
        self.grammar
            .lexical()
            .lookup(token)
            .iter()
            .map(|&a| {
                let leaf = Tree::leaf(self.grammar.symbol(a).clone(), token.clone(), position);
                (a, Arc::new(leaf))
            })
            .collect()
    }
}

impl Semiring for Forests<'_> {
    type Elem = Forest;

    fn zero(&self) -> Forest {
        Forest::new()
    }

    /// No forest is a unit under tree joining; this is `zero`.
    fn one(&self) -> Forest {
        Forest::new()
    }

    fn plus(&self, a: &Forest, b: &Forest) -> Forest {
        let mut out = a.clone();
        for (&k, tree) in b {
            out.entry(k).or_insert_with(|| tree.clone());
        }
        out
    }

    fn times(&self, a: &Forest, b: &Forest) -> Forest {
        let mut out = Forest::new();
        for (&l, left) in a {
            for (&r, right) in b {
                for &parent in self.grammar.binary().lookup(l, r) {
                    out.entry(parent).or_insert_with(|| {
                        let root = self.grammar.symbol(parent).clone();
                        Arc::new(Tree::node(root, left.clone(), right.clone()))
                    });
                }
            }
        }
        out
    }

    fn is_zero(&self, a: &Forest) -> bool {
        a.is_empty()
    }
}

/// The converged chart of nonterminal sets.
pub fn recognize_table(grammar: &CompiledGrammar, tokens: &[Symbol]) -> Chart<BTreeSet<NtId>> {
    let alg = NonterminalSets::new(grammar);
    let seeds = tokens.iter().map(|t| alg.seed(t)).collect();
    Chart::from_seeds(seeds, &alg).seek_fixpoint(&alg)
}

/// Whether `START` derives `tokens`.
pub fn recognize(grammar: &CompiledGrammar, tokens: &[Symbol]) -> bool {
    let Some(start) = grammar.start() else {
        return false;
    };
    if tokens.is_empty() {
        return grammar.derives_epsilon();
    }
    let chart = recognize_table(grammar, tokens);
    let accepted = chart.top().map_or(false, |cell| cell.contains(&start));
    trace!(tokens = tokens.len(), accepted, "recognized");
    accepted
}

/// The converged chart of witness forests.
pub fn parse_table(grammar: &CompiledGrammar, tokens: &[Symbol]) -> Chart<Forest> {
    let alg = Forests::new(grammar);
    let seeds = tokens
        .iter()
        .enumerate()
        .map(|(i, t)| alg.seed(t, i))
        .collect();
    Chart::from_seeds(seeds, &alg).seek_fixpoint(&alg)
}

/// Witnesses for every nonterminal deriving the whole input.
pub fn parse_forest(grammar: &CompiledGrammar, tokens: &[Symbol]) -> Forest {
    parse_table(grammar, tokens).top().cloned().unwrap_or_default()
}

/// A derivation of `tokens` from `START` in the grammar as written.
pub fn parse(grammar: &CompiledGrammar, tokens: &[Symbol]) -> Option<Tree> {
    let start = grammar.start()?;
    if tokens.is_empty() {
        return grammar.derives_epsilon().then(|| Tree {
            root: grammar.symbol(start).clone(),
            terminal: Some(Symbol::Epsilon),
            span: 0..0,
            children: Vec::new(),
        });
    }
    parse_forest(grammar, tokens)
        .get(&start)
        .map(|tree| tree.denormalize())
}

/// The whole parse if there is one, and every partial derivation of a
/// user nonterminal, longest spans first.
pub fn parse_with_stubs(grammar: &CompiledGrammar, tokens: &[Symbol]) -> (Option<Tree>, Vec<Tree>) {
    let whole = parse(grammar, tokens);
    let chart = parse_table(grammar, tokens);
    let partial = chart
        .diagonals()
        .iter()
        .rev()
        .flatten()
        .flat_map(|forest| forest.values())
        .filter(|tree| !tree.root.is_synthetic())
        .map(|tree| tree.denormalize())
        .collect();
    (whole, partial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Cfg, Production};
    use crate::symbol::tokenize;
    use proptest::prelude::*;

    const ARITH: &str = "START -> E\nE -> E O E | ( E ) | x\nO -> + | *";

    #[test]
    fn test_recognize() {
        let g = CompiledGrammar::from_source(ARITH).unwrap();

        assert!(recognize(&g, &tokenize("x")));
        assert!(recognize(&g, &tokenize("x + ( x * x )")));
        assert!(!recognize(&g, &tokenize("x +")));
        assert!(!recognize(&g, &tokenize("( x")));
        assert!(!recognize(&g, &tokenize("")));
        assert!(!recognize(&g, &tokenize("x - x")));
    }

    #[test]
    fn test_parse_tree_matches_tokens() {
        let g = CompiledGrammar::from_source(ARITH).unwrap();
        let tokens = tokenize("( x + x ) * x");
        let tree = parse(&g, &tokens).unwrap();

        assert_eq!(tree.root, Symbol::start());
        assert_eq!(tree.yield_tokens(), tokens);
        assert_eq!(tree.span, 0..tokens.len());
        fn no_synthetic(t: &Tree) -> bool {
            !t.root.is_synthetic() && t.children.iter().all(|c| no_synthetic(c))
        }
        assert!(no_synthetic(&tree));
    }

    #[test]
    fn test_boolean_and_forest_agree() {
        let g = CompiledGrammar::from_source(
            "START -> N L\nN -> N N | a | b\nO -> * | +\nL -> O N",
        )
        .unwrap();
        for s in ["a + a", "a + +", "a b * b", "a", "+ a", "a a a + b b"] {
            let tokens = tokenize(s);
            assert_eq!(
                recognize(&g, &tokens),
                parse(&g, &tokens).is_some(),
                "disagree on {:?}",
                s
            );
        }
    }

    #[test]
    fn test_single_terminal_grammar() {
        let g = CompiledGrammar::from_source("START -> a").unwrap();
        assert!(recognize(&g, &tokenize("a")));
        assert!(!recognize(&g, &tokenize("a a")));
        assert!(!recognize(&g, &[]));
    }

    #[test]
    fn test_empty_grammar_and_epsilon() {
        let empty = CompiledGrammar::new(&Cfg::new());
        assert!(!recognize(&empty, &tokenize("a")));
        assert!(!recognize(&empty, &[]));

        let g = CompiledGrammar::from_source("START -> a START | ε").unwrap();
        assert!(recognize(&g, &[]));
        assert!(recognize(&g, &tokenize("a a a")));
        assert!(parse(&g, &[]).is_some());
    }

    #[test]
    fn test_parse_with_stubs_partial_trees() {
        let g = CompiledGrammar::from_source(ARITH).unwrap();
        let (whole, partial) = parse_with_stubs(&g, &tokenize("x + x )"));

        assert!(whole.is_none());
        let longest = &partial[0];
        assert_eq!(longest.span.len(), 3);
        assert_eq!(longest.yield_tokens(), tokenize("x + x"));
        assert!(partial.windows(2).all(|w| w[0].span.len() >= w[1].span.len()));
    }

    #[test]
    fn test_grammar_algebras_have_no_unit() {
        let g = CompiledGrammar::from_source(ARITH).unwrap();
        let sets = NonterminalSets::new(&g);
        let x = sets.seed(&Symbol::new("x"));
        assert!(!x.is_empty());
        assert_eq!(sets.one(), sets.zero());
        assert!(sets.times(&sets.one(), &x).is_empty());

        let forests = Forests::new(&g);
        assert!(forests.is_zero(&forests.one()));
    }

    #[test]
    fn test_table_fixpoint() {
        let g = CompiledGrammar::from_source(ARITH).unwrap();
        let alg = NonterminalSets::new(&g);
        let chart = recognize_table(&g, &tokenize("x * x + x"));
        assert!(chart.is_fixpoint(&alg));
        assert_eq!(chart.seek_fixpoint(&alg), chart);
    }

    fn arb_grammar() -> impl Strategy<Value = Cfg> {
        let symbol = prop::sample::select(vec!["START", "A", "B", "a", "b"]);
        let lhs = prop::sample::select(vec!["START", "A", "B"]);
        let production = (lhs, prop::collection::vec(symbol, 1..=3)).prop_map(|(lhs, rhs)| {
            Production::new(Symbol::new(lhs), rhs.into_iter().map(Symbol::new).collect())
        });
        prop::collection::vec(production, 1..8).prop_map(Cfg::from_productions)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_fixpoint_idempotent_and_matches_iteration(
            cfg in arb_grammar(),
            word in prop::collection::vec(prop::sample::select(vec!["a", "b"]), 1..=6),
        ) {
            let g = CompiledGrammar::new(&cfg);
            let tokens: Vec<Symbol> = word.into_iter().map(Symbol::new).collect();
            let alg = NonterminalSets::new(&g);
            let initial = Chart::from_seeds(tokens.iter().map(|t| alg.seed(t)).collect(), &alg);

            let once = initial.seek_fixpoint(&alg);
            prop_assert_eq!(&once.seek_fixpoint(&alg), &once);
            prop_assert!(once.is_fixpoint(&alg));

            // Iterating M = M + M * M from the seeds converges to the same chart
            let mut iterated = initial;
            loop {
                let squared = iterated.square(&alg);
                let next = iterated.map(|(i, j), e| alg.plus(e, squared.get(i, j)));
                if next == iterated {
                    break;
                }
                iterated = next;
            }
            prop_assert_eq!(&iterated, &once);

            let accepted = g
                .start()
                .map_or(false, |start| once.top().map_or(false, |cell| cell.contains(&start)));
            prop_assert_eq!(accepted, recognize(&g, &tokens));
            prop_assert_eq!(accepted, parse(&g, &tokens).is_some());
        }
    }
}
