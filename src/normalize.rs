//! Normalization to almost-Chomsky normal form.
//!
//! After [`normalize`] every production is either `A -> a` for a terminal
//! `a` or `A -> B C` for nonterminals `B`, `C`. The empty string survives
//! only as the terminal `ε`: `START -> ε` when the language contains the
//! empty string, and the escape `START -> START F.ε` so that `ε` tokens can
//! be synthesized after a complete sentence and dropped when printing.
//!
//! Each stage is total and language-preserving, and the pipeline runs them
//! in a fixed order because each assumes the invariants of the previous:
//!
//! 1. [`add_start`]
//! 2. [`expand_alternation`] (applied when a [`Cfg`] is built from source)
//! 3. [`crate::analysis::nullable`]
//! 4. [`eliminate_epsilon`]
//! 5. [`eliminate_units`]
//! 6. [`binarize`]
//! 7. [`isolate_terminals`]
//! 8. [`remove_useless`]

use crate::analysis;
use crate::grammar::{Cfg, Production};
use crate::parser::{SourceRule, SourceSymbol};
use crate::symbol::Symbol;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Run the full pipeline.
pub fn normalize(cfg: &Cfg) -> Cfg {
    let cfg = add_start(cfg);
    // Nonterminals stay nonterminals even if a stage strips all their productions
    let vars = cfg.nonterminals();
    debug!(productions = cfg.len(), nonterminals = vars.len(), "normalizing");

    let cfg = remove_useless_among(&eliminate_epsilon(&cfg), &vars);
    debug!(productions = cfg.len(), "eliminated epsilon productions");

    let cfg = remove_useless_among(&eliminate_units(&cfg), &vars);
    debug!(productions = cfg.len(), "eliminated unit productions");

    let cfg = isolate_terminals(&binarize(&cfg));
    debug!(productions = cfg.len(), "binarized");

    let cfg = remove_useless(&cfg);
    debug!(
        productions = cfg.len(),
        nonterminals = cfg.nonterminals().len(),
        "normalized"
    );
    cfg
}

/// Add `START -> A` for every nonterminal `A` if `START` has no productions.
pub fn add_start(cfg: &Cfg) -> Cfg {
    let start = Symbol::start();
    let nonterminals = cfg.nonterminals();
    if nonterminals.contains(&start) {
        return cfg.clone();
    }
    let mut out = cfg.clone();
    for nt in nonterminals {
        out.insert(Production::unit(start.clone(), nt));
    }
    out
}

/// Split every alternative of every rule into its own production.
pub fn expand_alternation(rules: &[SourceRule]) -> Vec<Production> {
    rules
        .iter()
        .flat_map(|rule| {
            let lhs = Symbol::new(&rule.lhs);
            rule.alternatives.iter().map(move |alt| {
                Production::new(lhs.clone(), alt.iter().map(SourceSymbol::to_symbol).collect())
            })
        })
        .collect()
}

/// Remove `ε` and nullable nonterminals from right-hand sides.
///
/// Every production is replaced by all its variants obtained by dropping
/// any subset of its nullable occurrences, except the empty one.
/// `START -> ε` is kept iff `START` is nullable.
pub fn eliminate_epsilon(cfg: &Cfg) -> Cfg {
    let nullable = analysis::nullable(cfg);
    let start = Symbol::start();
    let mut out = Cfg::new();

    for p in cfg {
        let rhs: Vec<Symbol> = p.rhs.iter().filter(|s| !s.is_epsilon()).cloned().collect();

        // Each nullable occurrence is kept or dropped; equal variants merge
        let mut variants: BTreeSet<Vec<Symbol>> = BTreeSet::from([Vec::new()]);
        for s in &rhs {
            let optional = nullable.contains(s);
            variants = variants
                .into_iter()
                .flat_map(|v| {
                    let mut with = v.clone();
                    with.push(s.clone());
                    if optional {
                        vec![with, v]
                    } else {
                        vec![with]
                    }
                })
                .collect();
        }
        for variant in variants.into_iter().filter(|v| !v.is_empty()) {
            out.insert(Production::new(p.lhs.clone(), variant));
        }
    }

    if nullable.contains(&start) {
        out.insert(Production::unit(start.clone(), Symbol::Epsilon));
    }
    out.insert(Production::binary(start.clone(), start, Symbol::Epsilon));
    out
}

/// Replace unit chains `A -> B` by `B`'s non-unit productions.
pub fn eliminate_units(cfg: &Cfg) -> Cfg {
    let nonterminals = cfg.nonterminals();
    let is_chain = |p: &Production| p.is_unit() && nonterminals.contains(&p.rhs[0]);

    let mut chains: BTreeMap<&Symbol, Vec<&Symbol>> = BTreeMap::new();
    for p in cfg.iter().filter(|p| is_chain(p)) {
        chains.entry(&p.lhs).or_default().push(&p.rhs[0]);
    }

    let mut out = Cfg::new();
    for a in &nonterminals {
        // Every nonterminal reachable from `a` through unit chains
        let mut closure: BTreeSet<&Symbol> = BTreeSet::from([a]);
        let mut stack = vec![a];
        while let Some(b) = stack.pop() {
            for &c in chains.get(b).into_iter().flatten() {
                if closure.insert(c) {
                    stack.push(c);
                }
            }
        }
        for b in closure {
            for p in cfg.productions_of(b).filter(|p| !is_chain(p)) {
                out.insert(Production::new(a.clone(), p.rhs.clone()));
            }
        }
    }
    out
}

/// Split right-hand sides longer than two, right to left.
///
/// `A -> x y z` becomes `A -> x y.z` and `y.z -> y z`; glue nonterminals
/// are named by the pair they derive, so equal suffixes share them.
pub fn binarize(cfg: &Cfg) -> Cfg {
    let mut out = Cfg::new();
    for p in cfg {
        let mut rhs = p.rhs.clone();
        while rhs.len() > 2 {
            let pair = rhs.split_off(rhs.len() - 2);
            let glue = Symbol::glue(&pair[0], &pair[1]);
            out.insert(Production::new(glue.clone(), pair));
            rhs.push(glue);
        }
        out.insert(Production::new(p.lhs.clone(), rhs));
    }
    out
}

/// Replace terminals in binary productions by `F.a -> a` nonterminals.
pub fn isolate_terminals(cfg: &Cfg) -> Cfg {
    let nonterminals = cfg.nonterminals();
    let mut out = Cfg::new();
    for p in cfg {
        if p.is_unit() {
            out.insert(p.clone());
            continue;
        }
        let rhs = p
            .rhs
            .iter()
            .map(|s| {
                if nonterminals.contains(s) {
                    s.clone()
                } else {
                    let isolated = Symbol::isolate(s);
                    out.insert(Production::unit(isolated.clone(), s.clone()));
                    isolated
                }
            })
            .collect();
        out.insert(Production::new(p.lhs.clone(), rhs));
    }
    out
}

/// Drop every production that is unreachable from `START` or cannot
/// derive a terminal string.
pub fn remove_useless(cfg: &Cfg) -> Cfg {
    remove_useless_among(cfg, &cfg.nonterminals())
}

/// [`remove_useless`], treating every symbol in `vars` as a nonterminal even
/// when it has no productions left.
pub(crate) fn remove_useless_among(cfg: &Cfg, vars: &BTreeSet<Symbol>) -> Cfg {
    let start = Symbol::start();
    let mut current = cfg.clone();
    loop {
        let generating = analysis::generating_among(&current, vars);
        let reachable = analysis::reachable(&current, std::iter::once(start.clone()));
        let mut next = current.clone();
        next.retain(|p| {
            generating.contains(&p.lhs)
                && reachable.contains(&p.lhs)
                && p.rhs.iter().all(|s| !vars.contains(s) || generating.contains(s))
        });
        if next == current {
            return current;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled::CompiledGrammar;
    use crate::cyk;
    use crate::symbol::tokenize;
    use proptest::prelude::*;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s)
    }

    fn is_almost_cnf(cfg: &Cfg) -> bool {
        let nts = cfg.nonterminals();
        cfg.iter().all(|p| match p.rhs.as_slice() {
            [t] => !nts.contains(t),
            [b, c] => nts.contains(b) && nts.contains(c),
            _ => false,
        })
    }

    #[test]
    fn test_add_start_only_when_missing() {
        let cfg = Cfg::parse("A -> a\nB -> b").unwrap();
        let started = add_start(&cfg);
        assert!(started.contains(&Production::unit(Symbol::start(), sym("A"))));
        assert!(started.contains(&Production::unit(Symbol::start(), sym("B"))));

        let explicit = Cfg::parse("START -> A\nA -> a\nB -> b").unwrap();
        assert_eq!(add_start(&explicit), explicit);
    }

    #[test]
    fn test_epsilon_power_set() {
        let cfg = Cfg::parse("START -> A x B\nA -> ε | a\nB -> ε | b").unwrap();
        let out = eliminate_epsilon(&cfg);

        for rhs in [vec!["A", "x", "B"], vec!["x", "B"], vec!["A", "x"], vec!["x"]] {
            let p = Production::new(Symbol::start(), rhs.into_iter().map(sym).collect());
            assert!(out.contains(&p), "missing {}", p);
        }
        assert!(!out.iter().any(|p| p.lhs == sym("A") && p.rhs == vec![Symbol::Epsilon]));
        assert!(!out.contains(&Production::unit(Symbol::start(), Symbol::Epsilon)));
        assert!(out.contains(&Production::binary(Symbol::start(), Symbol::start(), Symbol::Epsilon)));
    }

    #[test]
    fn test_epsilon_wide_production() {
        // Seventy nullable occurrences of one symbol give seventy variants
        let rhs = vec!["A"; 70].join(" ");
        let cfg = Cfg::parse(&format!("START -> {}\nA -> ε | a", rhs)).unwrap();
        let out = eliminate_epsilon(&cfg);

        let lengths: BTreeSet<usize> = out
            .productions_of(&Symbol::start())
            .filter(|p| p.rhs.iter().all(|s| *s == sym("A")))
            .map(|p| p.rhs.len())
            .collect();
        assert_eq!(lengths, (1..=70).collect());
        assert!(out.contains(&Production::unit(Symbol::start(), Symbol::Epsilon)));
    }

    #[test]
    fn test_nullable_start_keeps_epsilon() {
        let cfg = Cfg::parse("START -> a START | ε").unwrap();
        let out = normalize(&cfg);
        assert!(out.contains(&Production::unit(Symbol::start(), Symbol::Epsilon)));
    }

    #[test]
    fn test_unit_chains() {
        let cfg = Cfg::parse("START -> A\nA -> B | a\nB -> b | A").unwrap();
        let out = eliminate_units(&cfg);

        assert!(out.contains(&Production::unit(Symbol::start(), sym("a"))));
        assert!(out.contains(&Production::unit(Symbol::start(), sym("b"))));
        assert!(!out.iter().any(|p| p.is_unit() && p.rhs[0] == sym("B")));
    }

    #[test]
    fn test_binarize_shares_suffixes() {
        let cfg = Cfg::parse("S -> a b c d\nT -> x c d").unwrap();
        let out = binarize(&cfg);
        let cd = Symbol::glue(&sym("c"), &sym("d"));

        assert!(out.contains(&Production::binary(cd.clone(), sym("c"), sym("d"))));
        assert!(out.contains(&Production::binary(sym("T"), sym("x"), cd.clone())));
        assert!(out.iter().all(|p| p.len() <= 2));
        assert_eq!(out.productions_of(&cd).count(), 1);
    }

    #[test]
    fn test_isolate_terminals() {
        let cfg = Cfg::parse("S -> a S | b").unwrap();
        let out = isolate_terminals(&cfg);
        let fa = Symbol::isolate(&sym("a"));

        assert!(out.contains(&Production::binary(sym("S"), fa.clone(), sym("S"))));
        assert!(out.contains(&Production::unit(fa, sym("a"))));
        assert!(out.contains(&Production::unit(sym("S"), sym("b"))));
    }

    #[test]
    fn test_remove_useless() {
        let cfg = Cfg::parse("START -> A | B\nA -> a\nB -> B b\nC -> c").unwrap();
        let out = remove_useless(&cfg);

        assert_eq!(out.nonterminals(), BTreeSet::from([Symbol::start(), sym("A")]));
        assert!(!out.terminals().contains(&sym("B")));
    }

    #[test]
    fn test_normal_form_shape() {
        let cfg = Cfg::parse(
            "START -> E\nE -> E O E | ( E ) | x | ε\nO -> + | * | `|`",
        )
        .unwrap();
        let out = normalize(&cfg);
        assert!(is_almost_cnf(&out));
        assert!(out.nonterminals().iter().all(|nt| !nt.is_epsilon()));
        assert_eq!(normalize(&out).nonterminals().len(), out.nonterminals().len());
    }

    #[test]
    fn test_dead_nonterminals_stay_dead() {
        // `A` only derives ε, so after elimination it has no productions
        // and must not be mistaken for a terminal.
        let cfg = Cfg::parse("START -> A b\nA -> ε").unwrap();
        let out = normalize(&cfg);
        assert!(!out.terminals().contains(&sym("A")));
        let g = CompiledGrammar::from_normalized(out);
        assert!(cyk::recognize(&g, &tokenize("b")));
        assert!(!cyk::recognize(&g, &tokenize("A b")));
    }

    /// All strings of length `1..=max_len` derivable in `cfg`, ignoring `ε` tokens.
    fn bounded_language(cfg: &Cfg, max_len: usize) -> (BTreeSet<Vec<Symbol>>, bool) {
        let nts = cfg.nonterminals();
        let mut lang: BTreeMap<Symbol, BTreeSet<Vec<Symbol>>> = BTreeMap::new();
        loop {
            let mut changed = false;
            for p in cfg {
                let mut partial: BTreeSet<Vec<Symbol>> = BTreeSet::from([Vec::new()]);
                for s in &p.rhs {
                    let options: BTreeSet<Vec<Symbol>> = if s.is_epsilon() {
                        BTreeSet::from([Vec::new()])
                    } else if nts.contains(s) {
                        lang.get(s).cloned().unwrap_or_default()
                    } else {
                        BTreeSet::from([vec![s.clone()]])
                    };
                    partial = partial
                        .iter()
                        .flat_map(|pre| {
                            options.iter().filter_map(move |suf| {
                                let mut w = pre.clone();
                                w.extend(suf.iter().cloned());
                                (w.len() <= max_len).then_some(w)
                            })
                        })
                        .collect();
                }
                let entry = lang.entry(p.lhs.clone()).or_default();
                for w in partial {
                    changed |= entry.insert(w);
                }
            }
            if !changed {
                break;
            }
        }
        let mut words = lang.remove(&Symbol::start()).unwrap_or_default();
        let has_empty = words.remove(&Vec::new());
        (words, has_empty)
    }

    fn all_strings(max_len: usize) -> Vec<Vec<Symbol>> {
        let mut out = Vec::new();
        let mut layer = vec![Vec::new()];
        for _ in 0..max_len {
            layer = layer
                .into_iter()
                .flat_map(|w: Vec<Symbol>| {
                    ["a", "b"].into_iter().map(move |t| {
                        let mut w = w.clone();
                        w.push(sym(t));
                        w
                    })
                })
                .collect();
            out.extend(layer.iter().cloned());
        }
        out
    }

    fn arb_grammar() -> impl Strategy<Value = Cfg> {
        let symbol = prop::sample::select(vec!["A", "B", "START", "a", "b", "ε"]);
        let lhs = prop::sample::select(vec!["START", "A", "B"]);
        let production = (lhs, prop::collection::vec(symbol, 0..=3)).prop_map(|(lhs, rhs)| {
            let rhs = if rhs.is_empty() { vec![Symbol::Epsilon] } else { rhs.into_iter().map(sym).collect() };
            Production::new(sym(lhs), rhs)
        });
        prop::collection::vec(production, 1..8).prop_map(Cfg::from_productions)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_normalization_preserves_language(cfg in arb_grammar()) {
            const MAX_LEN: usize = 4;
            let (expected, has_empty) = bounded_language(&add_start(&cfg), MAX_LEN);
            let g = CompiledGrammar::new(&cfg);

            prop_assert_eq!(g.derives_epsilon(), has_empty);
            for w in all_strings(MAX_LEN) {
                prop_assert_eq!(cyk::recognize(&g, &w), expected.contains(&w), "string {:?}", w);
            }
        }

        #[test]
        fn test_normalization_is_idempotent(cfg in arb_grammar()) {
            let once = normalize(&cfg);
            prop_assert!(is_almost_cnf(&once));
            let twice = normalize(&once);
            prop_assert_eq!(once.terminals(), twice.terminals());
        }
    }
}
