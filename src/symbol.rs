//! Grammar symbols.
//!
//! Symbols introduced by normalization and intersection are tagged variants
//! rather than specially-formatted names, so they can never collide with a
//! user symbol and can be recognized structurally when denormalizing.

use std::fmt;
use std::sync::Arc;

/// Index of a state in a finite-state acceptor.
pub type StateId = usize;

/// Name of the designated start symbol.
pub const START: &str = "START";

/// Printed form of the empty string.
pub const EPSILON: &str = "ε";

/// A terminal or nonterminal symbol.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    /// A symbol written by the user.
    Original(Arc<str>),
    /// The empty string, synthesizable but omitted when printing.
    Epsilon,
    /// Fresh nonterminal deriving exactly its two symbols, made by binarization.
    Glue(Arc<Symbol>, Arc<Symbol>),
    /// Fresh nonterminal deriving a single terminal, made by terminal isolation.
    Isolate(Arc<Symbol>),
    /// Placeholder terminal `<A>` standing for any derivation of `A`.
    Stub(Arc<Symbol>),
    /// Product nonterminal `[p, A, q]` of an automaton intersection.
    Bracketed(StateId, Arc<Symbol>, StateId),
}

impl Symbol {
    /// A user symbol; `ε` maps to [`Symbol::Epsilon`].
    pub fn new(name: &str) -> Self {
        if name == EPSILON {
            Symbol::Epsilon
        } else {
            Symbol::Original(name.into())
        }
    }

    pub fn start() -> Self {
        Symbol::Original(START.into())
    }

    pub fn glue(left: &Symbol, right: &Symbol) -> Self {
        Symbol::Glue(Arc::new(left.clone()), Arc::new(right.clone()))
    }

    pub fn isolate(terminal: &Symbol) -> Self {
        Symbol::Isolate(Arc::new(terminal.clone()))
    }

    pub fn stub(nonterminal: &Symbol) -> Self {
        Symbol::Stub(Arc::new(nonterminal.clone()))
    }

    pub fn bracketed(p: StateId, inner: &Symbol, q: StateId) -> Self {
        Symbol::Bracketed(p, Arc::new(inner.clone()), q)
    }

    pub fn is_start(&self) -> bool {
        matches!(self, Symbol::Original(name) if &**name == START)
    }

    pub fn is_epsilon(&self) -> bool {
        matches!(self, Symbol::Epsilon)
    }

    pub fn is_stub(&self) -> bool {
        matches!(self, Symbol::Stub(_))
    }

    pub fn is_bracketed(&self) -> bool {
        matches!(self, Symbol::Bracketed(..))
    }

    /// Whether this symbol was introduced by normalization, looking through
    /// intersection brackets.
    pub fn is_synthetic(&self) -> bool {
        match self {
            Symbol::Glue(..) | Symbol::Isolate(_) => true,
            Symbol::Bracketed(_, inner, _) => inner.is_synthetic(),
            _ => false,
        }
    }

    /// The user-visible name of an original symbol.
    pub fn name(&self) -> Option<&str> {
        match self {
            Symbol::Original(name) => Some(name),
            _ => None,
        }
    }

    /// The symbol wrapped by an intersection bracket, or itself.
    pub fn unbracketed(&self) -> &Symbol {
        match self {
            Symbol::Bracketed(_, inner, _) => inner.unbracketed(),
            other => other,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Original(name) => write!(f, "{}", name),
            Symbol::Epsilon => write!(f, "{}", EPSILON),
            Symbol::Glue(l, r) => write!(f, "{}.{}", l, r),
            Symbol::Isolate(t) => write!(f, "F.{}", t),
            Symbol::Stub(nt) => write!(f, "<{}>", nt),
            Symbol::Bracketed(p, a, q) => write!(f, "[{},{},{}]", p, a, q),
        }
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::new(name)
    }
}

/// Split text on whitespace into terminal symbols.
pub fn tokenize(text: &str) -> Vec<Symbol> {
    text.split_whitespace().map(Symbol::new).collect()
}

/// Join symbols with single spaces, dropping `ε`.
pub fn render(symbols: &[Symbol]) -> String {
    symbols
        .iter()
        .filter(|s| !s.is_epsilon())
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
