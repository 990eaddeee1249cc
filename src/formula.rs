//! Shared Boolean formulas and their CNF encoding.
//!
//! A [`Formula`] is an immutable DAG behind an `Arc`: cloning is cheap and
//! subformulas built once are shared by every formula that mentions them.
//! Constructors simplify constants away, so the chart of a synthesis
//! problem only grows where the grammar actually allows a derivation.
//!
//! [`CnfEncoder`] turns formulas into clauses by Tseitin definitions, one
//! fresh variable per shared subformula.

use crate::sat::{Lit, Var};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, PartialEq, Eq, Hash)]
pub enum Node {
    Const(bool),
    Var(Var),
    Not(Formula),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Iff(Formula, Formula),
}

/// A Boolean formula.
#[derive(Clone, Eq, Hash)]
pub struct Formula(Arc<Node>);

impl PartialEq for Formula {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Formula {
    fn from_node(node: Node) -> Self {
        Formula(Arc::new(node))
    }

    pub fn constant(value: bool) -> Self {
        Formula::from_node(Node::Const(value))
    }

    pub fn tt() -> Self {
        Formula::constant(true)
    }

    pub fn ff() -> Self {
        Formula::constant(false)
    }

    pub fn var(var: Var) -> Self {
        Formula::from_node(Node::Var(var))
    }

    pub fn node(&self) -> &Node {
        &self.0
    }

    pub fn as_const(&self) -> Option<bool> {
        match *self.0 {
            Node::Const(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        self.as_const() == Some(true)
    }

    pub fn is_false(&self) -> bool {
        self.as_const() == Some(false)
    }

    pub fn not(&self) -> Formula {
        match self.node() {
            Node::Const(b) => Formula::constant(!b),
            Node::Not(inner) => inner.clone(),
            _ => Formula::from_node(Node::Not(self.clone())),
        }
    }

    /// Conjunction; `true` when empty.
    pub fn all(items: impl IntoIterator<Item = Formula>) -> Formula {
        let mut kept = Vec::new();
        for f in items {
            match f.as_const() {
                Some(true) => {}
                Some(false) => return Formula::ff(),
                None => kept.push(f),
            }
        }
        match kept.len() {
            0 => Formula::tt(),
            1 => kept.swap_remove(0),
            _ => Formula::from_node(Node::And(kept)),
        }
    }

    /// Disjunction; `false` when empty.
    pub fn any(items: impl IntoIterator<Item = Formula>) -> Formula {
        let mut kept = Vec::new();
        for f in items {
            match f.as_const() {
                Some(false) => {}
                Some(true) => return Formula::tt(),
                None => kept.push(f),
            }
        }
        match kept.len() {
            0 => Formula::ff(),
            1 => kept.swap_remove(0),
            _ => Formula::from_node(Node::Or(kept)),
        }
    }

    pub fn and(&self, other: &Formula) -> Formula {
        Formula::all([self.clone(), other.clone()])
    }

    pub fn or(&self, other: &Formula) -> Formula {
        Formula::any([self.clone(), other.clone()])
    }

    pub fn implies(&self, other: &Formula) -> Formula {
        self.not().or(other)
    }

    pub fn iff(&self, other: &Formula) -> Formula {
        match (self.as_const(), other.as_const()) {
            (Some(a), Some(b)) => Formula::constant(a == b),
            (Some(true), None) => other.clone(),
            (Some(false), None) => other.not(),
            (None, Some(true)) => self.clone(),
            (None, Some(false)) => self.not(),
            (None, None) if self == other => Formula::tt(),
            (None, None) => Formula::from_node(Node::Iff(self.clone(), other.clone())),
        }
    }

    /// Exactly one of `items` holds.
    pub fn exactly_one(items: &[Formula]) -> Formula {
        let at_least = Formula::any(items.iter().cloned());
        let at_most = Formula::all(
            items
                .iter()
                .enumerate()
                .flat_map(|(i, a)| items[i + 1..].iter().map(move |b| a.and(b).not())),
        );
        at_least.and(&at_most)
    }

    /// Evaluate under an assignment of the variables.
    pub fn eval(&self, assignment: &dyn Fn(Var) -> bool) -> bool {
        match self.node() {
            Node::Const(b) => *b,
            Node::Var(v) => assignment(*v),
            Node::Not(f) => !f.eval(assignment),
            Node::And(fs) => fs.iter().all(|f| f.eval(assignment)),
            Node::Or(fs) => fs.iter().any(|f| f.eval(assignment)),
            Node::Iff(a, b) => a.eval(assignment) == b.eval(assignment),
        }
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, op: &str, items: &[Formula]| -> fmt::Result {
            write!(f, "(")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", op)?;
                }
                write!(f, "{}", item)?;
            }
            write!(f, ")")
        };
        match self.node() {
            Node::Const(b) => write!(f, "{}", b),
            Node::Var(v) => write!(f, "x{}", v.0),
            Node::Not(inner) => write!(f, "¬{}", inner),
            Node::And(items) => join(f, "∧", items),
            Node::Or(items) => join(f, "∨", items),
            Node::Iff(a, b) => write!(f, "({} ⇔ {})", a, b),
        }
    }
}

/// Allocator of fresh propositional variables.
#[derive(Clone, Debug, Default)]
pub struct VarPool {
    next: u32,
}

impl VarPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> Var {
        let v = Var(self.next);
        self.next += 1;
        v
    }

    pub fn len(&self) -> usize {
        self.next as usize
    }

    pub fn is_empty(&self) -> bool {
        self.next == 0
    }
}

/// Incremental Tseitin encoder.
///
/// Definitions are memoized by node identity, so a subformula shared
/// across many cells is defined once. Clauses accumulate until
/// [`CnfEncoder::drain`] hands them to a solver.
#[derive(Debug, Default)]
pub struct CnfEncoder {
    pool: VarPool,
    /// Keeps every memoized node alive so its address stays unique.
    memo: FxHashMap<usize, (Formula, Lit)>,
    truth: Option<Lit>,
    pending: Vec<Vec<Lit>>,
    emitted: usize,
}

impl CnfEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue numbering after the variables already taken from `pool`.
    pub fn with_pool(pool: VarPool) -> Self {
        CnfEncoder {
            pool,
            ..Self::default()
        }
    }

    pub fn pool(&self) -> &VarPool {
        &self.pool
    }

    pub fn fresh(&mut self) -> Var {
        self.pool.fresh()
    }

    /// Clauses produced so far, including drained ones.
    pub fn num_clauses(&self) -> usize {
        self.emitted + self.pending.len()
    }

    fn clause(&mut self, lits: Vec<Lit>) {
        self.pending.push(lits);
    }

    fn truth(&mut self) -> Lit {
        if let Some(t) = self.truth {
            return t;
        }
        let t = Lit::positive(self.pool.fresh());
        self.clause(vec![t]);
        self.truth = Some(t);
        t
    }

    /// A literal equivalent to `f`.
    pub fn lit(&mut self, f: &Formula) -> Lit {
        match f.node() {
            Node::Const(true) => return self.truth(),
            Node::Const(false) => return !self.truth(),
            Node::Var(v) => return Lit::positive(*v),
            Node::Not(inner) => return !self.lit(inner),
            _ => {}
        }
        if let Some(&(_, lit)) = self.memo.get(&f.key()) {
            return lit;
        }

        let x = Lit::positive(self.pool.fresh());
        match f.node() {
            Node::And(items) => {
                let lits: Vec<Lit> = items.iter().map(|g| self.lit(g)).collect();
                let mut long = vec![x];
                for &l in &lits {
                    self.clause(vec![!x, l]);
                    long.push(!l);
                }
                self.clause(long);
            }
            Node::Or(items) => {
                let lits: Vec<Lit> = items.iter().map(|g| self.lit(g)).collect();
                let mut long = vec![!x];
                for &l in &lits {
                    self.clause(vec![x, !l]);
                    long.push(l);
                }
                self.clause(long);
            }
            Node::Iff(a, b) => {
                let (a, b) = (self.lit(a), self.lit(b));
                self.clause(vec![!x, !a, b]);
                self.clause(vec![!x, a, !b]);
                self.clause(vec![x, a, b]);
                self.clause(vec![x, !a, !b]);
            }
            Node::Const(_) | Node::Var(_) | Node::Not(_) => {}
        }
        self.memo.insert(f.key(), (f.clone(), x));
        x
    }

    /// Require `f` to hold.
    pub fn assert(&mut self, f: &Formula) {
        match f.node() {
            Node::Const(true) => {}
            Node::Const(false) => self.clause(Vec::new()),
            Node::And(items) => {
                for g in items {
                    self.assert(g);
                }
            }
            Node::Or(items) => {
                let lits = items.iter().map(|g| self.lit(g)).collect();
                self.clause(lits);
            }
            Node::Iff(a, b) => {
                let (a, b) = (self.lit(a), self.lit(b));
                self.clause(vec![!a, b]);
                self.clause(vec![a, !b]);
            }
            _ => {
                let l = self.lit(f);
                self.clause(vec![l]);
            }
        }
    }

    /// Take the clauses produced since the last drain.
    pub fn drain(&mut self) -> Vec<Vec<Lit>> {
        self.emitted += self.pending.len();
        std::mem::take(&mut self.pending)
    }
}
