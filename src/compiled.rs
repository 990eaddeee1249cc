//! Compiled grammars.
//!
//! A [`CompiledGrammar`] is built once from a [`Cfg`] and carries every
//! derived index the engines need: dense nonterminal ids, the lexical
//! table `terminal -> [A | A -> terminal]`, and the binary table
//! `(B, C) -> [A | A -> B C]` together with its inverse.
//!
//! It is immutable after construction and can be shared across threads.

use crate::grammar::{Cfg, GrammarResult};
use crate::intern::Interner;
use crate::normalize;
use crate::symbol::Symbol;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use tracing::debug;

/// Nonterminal id, dense in `0..num_nonterminals`.
pub type NtId = usize;

/// Rewrite table for binary rules: maps (left, right) -> [parent]
#[derive(Clone, Debug, Default)]
pub struct BinaryRewrites {
    table: FxHashMap<(NtId, NtId), Vec<NtId>>,
    /// by_parent[parent] = [(left, right)]
    by_parent: Vec<Vec<(NtId, NtId)>>,
}

impl BinaryRewrites {
    pub fn new(num_nonterminals: usize) -> Self {
        BinaryRewrites {
            table: FxHashMap::default(),
            by_parent: vec![Vec::new(); num_nonterminals],
        }
    }

    pub fn add(&mut self, parent: NtId, left: NtId, right: NtId) {
        self.table.entry((left, right)).or_default().push(parent);
        self.by_parent[parent].push((left, right));
    }

    #[inline]
    pub fn lookup(&self, left: NtId, right: NtId) -> &[NtId] {
        self.table.get(&(left, right)).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Every `(B, C)` with `parent -> B C`.
    #[inline]
    pub fn children(&self, parent: NtId) -> &[(NtId, NtId)] {
        &self.by_parent[parent]
    }

    pub fn len(&self) -> usize {
        self.by_parent.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Rewrite table for lexical rules: maps terminal -> [parent]
#[derive(Clone, Debug, Default)]
pub struct LexicalRewrites {
    table: FxHashMap<Symbol, Vec<NtId>>,
    by_parent: Vec<Vec<Symbol>>,
}

impl LexicalRewrites {
    pub fn new(num_nonterminals: usize) -> Self {
        LexicalRewrites {
            table: FxHashMap::default(),
            by_parent: vec![Vec::new(); num_nonterminals],
        }
    }

    pub fn add(&mut self, parent: NtId, terminal: &Symbol) {
        self.table.entry(terminal.clone()).or_default().push(parent);
        self.by_parent[parent].push(terminal.clone());
    }

    #[inline]
    pub fn lookup(&self, terminal: &Symbol) -> &[NtId] {
        self.table.get(terminal).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Every terminal `t` with `parent -> t`.
    #[inline]
    pub fn terminals(&self, parent: NtId) -> &[Symbol] {
        &self.by_parent[parent]
    }
}

/// A normalized grammar with its lookup tables.
#[derive(Clone, Debug)]
pub struct CompiledGrammar {
    source: Cfg,
    cfg: Cfg,
    nonterminals: Interner<Symbol>,
    terminals: BTreeSet<Symbol>,
    lexical: LexicalRewrites,
    binary: BinaryRewrites,
    start: Option<NtId>,
    derives_epsilon: bool,
}

impl CompiledGrammar {
    /// Normalize `cfg` and compile it.
    pub fn new(cfg: &Cfg) -> Self {
        let mut compiled = CompiledGrammar::from_normalized(normalize::normalize(cfg));
        compiled.source = cfg.clone();
        compiled
    }

    /// Parse, normalize and compile a grammar source.
    pub fn from_source(source: &str) -> GrammarResult<Self> {
        Ok(CompiledGrammar::new(&Cfg::parse(source)?))
    }

    /// Compile a grammar that is already in normal form.
    pub fn from_normalized(cfg: Cfg) -> Self {
        let nonterminals: Interner<Symbol> = cfg.nonterminals().into_iter().collect();
        let terminals = cfg.terminals();
        let mut lexical = LexicalRewrites::new(nonterminals.len());
        let mut binary = BinaryRewrites::new(nonterminals.len());

        for p in &cfg {
            let Some(parent) = nonterminals.get(&p.lhs) else { continue };
            match p.rhs.as_slice() {
                [t] if !nonterminals.contains(t) => lexical.add(parent, t),
                [l, r] => {
                    if let (Some(l), Some(r)) = (nonterminals.get(l), nonterminals.get(r)) {
                        binary.add(parent, l, r);
                    }
                }
                _ => {}
            }
        }

        let start = nonterminals.get(&Symbol::start());
        let derives_epsilon = start.map_or(false, |s| {
            lexical.terminals(s).iter().any(Symbol::is_epsilon)
        });
        debug!(
            nonterminals = nonterminals.len(),
            terminals = terminals.len(),
            binary = binary.len(),
            "compiled grammar"
        );

        CompiledGrammar {
            source: cfg.clone(),
            cfg,
            nonterminals,
            terminals,
            lexical,
            binary,
            start,
            derives_epsilon,
        }
    }

    /// The grammar as given, before normalization.
    pub fn source(&self) -> &Cfg {
        &self.source
    }

    /// The normalized grammar.
    pub fn cfg(&self) -> &Cfg {
        &self.cfg
    }

    pub fn nonterminals(&self) -> &Interner<Symbol> {
        &self.nonterminals
    }

    pub fn num_nonterminals(&self) -> usize {
        self.nonterminals.len()
    }

    pub fn id(&self, nonterminal: &Symbol) -> Option<NtId> {
        self.nonterminals.get(nonterminal)
    }

    pub fn symbol(&self, id: NtId) -> &Symbol {
        self.nonterminals.resolve(id)
    }

    pub fn terminals(&self) -> &BTreeSet<Symbol> {
        &self.terminals
    }

    pub fn is_terminal(&self, sym: &Symbol) -> bool {
        self.terminals.contains(sym)
    }

    pub fn lexical(&self) -> &LexicalRewrites {
        &self.lexical
    }

    pub fn binary(&self) -> &BinaryRewrites {
        &self.binary
    }

    /// Id of `START`, absent for an empty grammar.
    pub fn start(&self) -> Option<NtId> {
        self.start
    }

    /// Whether the empty string is in the language.
    pub fn derives_epsilon(&self) -> bool {
        self.derives_epsilon
    }

    /// Whether `START -> t` for the terminal `t`.
    pub fn starts_with_unit(&self, terminal: &Symbol) -> bool {
        self.start
            .map_or(false, |s| self.lexical.lookup(terminal).contains(&s))
    }

    /// Nonterminals of the source grammar reachable from `nonterminal`.
    pub fn reachable_from(&self, nonterminal: &Symbol) -> BTreeSet<Symbol> {
        self.source.reachable_from(nonterminal)
    }

    pub fn is_empty(&self) -> bool {
        self.cfg.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_tables() {
        let g = CompiledGrammar::from_source("START -> A B\nA -> a\nB -> b | a").unwrap();
        let start = g.start().unwrap();
        let a = g.id(&Symbol::new("A")).unwrap();
        let b = g.id(&Symbol::new("B")).unwrap();

        assert_eq!(g.binary().lookup(a, b), &[start]);
        assert!(g.binary().lookup(b, a).is_empty());
        // START also carries the escape START -> START F.ε
        let escape = g.id(&Symbol::isolate(&Symbol::Epsilon)).unwrap();
        let mut children = g.binary().children(start).to_vec();
        children.sort();
        let mut expected = vec![(a, b), (start, escape)];
        expected.sort();
        assert_eq!(children, expected);

        let mut parents = g.lexical().lookup(&Symbol::new("a")).to_vec();
        parents.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(parents, expected);
        assert!(g.lexical().lookup(&Symbol::new("z")).is_empty());
    }

    #[test]
    fn test_epsilon_and_start() {
        let g = CompiledGrammar::from_source("START -> a START | ε").unwrap();
        assert!(g.derives_epsilon());
        assert!(g.starts_with_unit(&Symbol::new("a")));

        let g = CompiledGrammar::from_source("START -> a").unwrap();
        assert!(!g.derives_epsilon());
        assert!(g.is_terminal(&Symbol::new("a")));
    }

    #[test]
    fn test_empty_grammar() {
        let g = CompiledGrammar::new(&Cfg::new());
        assert!(g.is_empty());
        assert_eq!(g.start(), None);
        assert!(!g.derives_epsilon());
    }

    #[test]
    fn test_source_is_kept() {
        let g = CompiledGrammar::from_source("START -> S\nS -> a S b | c").unwrap();
        assert_eq!(g.source().len(), 3);
        let reach = g.reachable_from(&Symbol::new("S"));
        assert!(reach.contains(&Symbol::new("S")));
        assert!(!reach.contains(&Symbol::start()));
    }
}
