//! Parse trees and forests.

use crate::compiled::NtId;
use crate::symbol::Symbol;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// A derivation of the tokens in `span` from `root`.
///
/// Leaves carry the terminal they derive; inner nodes of a normalized
/// parse have exactly two children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tree {
    pub root: Symbol,
    pub terminal: Option<Symbol>,
    pub span: Range<usize>,
    pub children: Vec<Arc<Tree>>,
}

/// Witness derivations at one span, one per nonterminal label.
///
/// Keyed by label so that union keeps a single exemplar for each
/// nonterminal instead of every derivation.
pub type Forest = BTreeMap<NtId, Arc<Tree>>;

impl Tree {
    /// `root -> terminal` at token `position`.
    pub fn leaf(root: Symbol, terminal: Symbol, position: usize) -> Self {
        Tree {
            root,
            terminal: Some(terminal),
            span: position..position + 1,
            children: Vec::new(),
        }
    }

    /// `root -> left right`.
    pub fn node(root: Symbol, left: Arc<Tree>, right: Arc<Tree>) -> Self {
        Tree {
            root,
            terminal: None,
            span: left.span.start..right.span.end,
            children: vec![left, right],
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The terminals at the leaves, left to right.
    pub fn yield_tokens(&self) -> Vec<Symbol> {
        let mut out = Vec::new();
        self.collect_terminals(&mut out);
        out
    }

    fn collect_terminals(&self, out: &mut Vec<Symbol>) {
        if let Some(t) = &self.terminal {
            out.push(t.clone());
        }
        for child in &self.children {
            child.collect_terminals(out);
        }
    }

    /// Splice out nonterminals introduced by normalization.
    ///
    /// Glue nodes are replaced by their children and isolated terminals
    /// become bare terminal leaves, so the result is a derivation in the
    /// grammar as written.
    pub fn denormalize(&self) -> Tree {
        let mut spliced = self.splice();
        if spliced.len() == 1 {
            spliced.remove(0)
        } else {
            Tree {
                root: self.root.clone(),
                terminal: None,
                span: self.span.clone(),
                children: spliced.into_iter().map(Arc::new).collect(),
            }
        }
    }

    fn splice(&self) -> Vec<Tree> {
        if self.is_leaf() {
            let leaf = match (&self.root, &self.terminal) {
                (Symbol::Isolate(_), Some(t)) => Tree {
                    root: t.clone(),
                    ..self.clone()
                },
                _ => self.clone(),
            };
            return vec![leaf];
        }
        let children: Vec<Tree> = self.children.iter().flat_map(|c| c.splice()).collect();
        if self.root.is_synthetic() {
            children
        } else {
            vec![Tree {
                root: self.root.clone(),
                terminal: None,
                span: self.span.clone(),
                children: children.into_iter().map(Arc::new).collect(),
            }]
        }
    }

    /// Number of nodes.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(|c| c.size()).sum::<usize>()
    }

    /// Indented multi-line rendering, one node per line.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.pretty_into(&mut out, 0);
        out
    }

    fn pretty_into(&self, out: &mut String, depth: usize) {
        out.push_str(&"  ".repeat(depth));
        match &self.terminal {
            Some(t) if *t != self.root => out.push_str(&format!("{} -> {}", self.root, t)),
            _ => out.push_str(&self.root.to_string()),
        }
        out.push_str(&format!(" [{}..{}]\n", self.span.start, self.span.end));
        for child in &self.children {
            child.pretty_into(out, depth + 1);
        }
    }
}

/// Bracketed form, e.g. `(START (N a) (L (O +) (N a)))`.
impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.terminal, self.is_leaf()) {
            (Some(t), true) if *t == self.root => write!(f, "{}", t),
            (Some(t), true) => write!(f, "({} {})", self.root, t),
            _ => {
                write!(f, "({}", self.root)?;
                for child in &self.children {
                    write!(f, " {}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s)
    }

    fn sample() -> Tree {
        // START -> F.a a.b ; a.b -> F.a F.b  for the source rule START -> a a b
        let fa = Symbol::isolate(&sym("a"));
        let fb = Symbol::isolate(&sym("b"));
        let glue = Symbol::glue(&sym("a"), &sym("b"));
        let right = Tree::node(
            glue,
            Arc::new(Tree::leaf(fa.clone(), sym("a"), 1)),
            Arc::new(Tree::leaf(fb, sym("b"), 2)),
        );
        Tree::node(Symbol::start(), Arc::new(Tree::leaf(fa, sym("a"), 0)), Arc::new(right))
    }

    #[test]
    fn test_yield_and_span() {
        let tree = sample();
        assert_eq!(tree.span, 0..3);
        assert_eq!(tree.yield_tokens(), vec![sym("a"), sym("a"), sym("b")]);
        assert_eq!(tree.size(), 5);
    }

    #[test]
    fn test_denormalize_splices_synthetic_nodes() {
        let tree = sample().denormalize();

        assert_eq!(tree.root, Symbol::start());
        assert_eq!(tree.children.len(), 3);
        assert!(tree.children.iter().all(|c| c.is_leaf() && !c.root.is_synthetic()));
        assert_eq!(tree.yield_tokens(), sample().yield_tokens());
        assert_eq!(tree.to_string(), "(START a a b)");
    }

    #[test]
    fn test_pretty() {
        let tree = Tree::node(
            sym("S"),
            Arc::new(Tree::leaf(sym("A"), sym("x"), 0)),
            Arc::new(Tree::leaf(sym("B"), sym("y"), 1)),
        );
        assert_eq!(tree.pretty(), "S [0..2]\n  A -> x [0..1]\n  B -> y [1..2]\n");
        assert_eq!(tree.to_string(), "(S (A x) (B y))");
    }
}
