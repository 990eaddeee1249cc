//! Incremental SAT solving.
//!
//! [`SatBackend`] is the interface the synthesizer drives: add clauses, solve,
//! read the model, add a blocking clause, solve again. [`VarisatBackend`] is
//! the default backend; the `z3` feature adds `Z3Backend`, which can also be
//! interrupted in the middle of a solve.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A propositional variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub u32);

impl Var {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A variable or its negation, packed as `var << 1 | negated`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lit(u32);

impl Lit {
    #[inline]
    pub fn new(var: Var, negated: bool) -> Self {
        Lit(var.0 << 1 | negated as u32)
    }

    #[inline]
    pub fn positive(var: Var) -> Self {
        Lit::new(var, false)
    }

    #[inline]
    pub fn negative(var: Var) -> Self {
        Lit::new(var, true)
    }

    #[inline]
    pub fn var(self) -> Var {
        Var(self.0 >> 1)
    }

    #[inline]
    pub fn is_negated(self) -> bool {
        self.0 & 1 == 1
    }

    /// DIMACS numbering: variable `k` is `k + 1`, negative when negated.
    pub fn to_dimacs(self) -> i64 {
        let v = self.var().0 as i64 + 1;
        if self.is_negated() {
            -v
        } else {
            v
        }
    }
}

impl std::ops::Not for Lit {
    type Output = Lit;

    #[inline]
    fn not(self) -> Lit {
        Lit(self.0 ^ 1)
    }
}

impl fmt::Debug for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negated() {
            write!(f, "¬x{}", self.var().0)
        } else {
            write!(f, "x{}", self.var().0)
        }
    }
}

/// A satisfying assignment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Model {
    values: Vec<bool>,
}

impl Model {
    pub fn new(values: Vec<bool>) -> Self {
        Model { values }
    }

    /// Value of `var`; variables the solver never saw are false.
    pub fn value(&self, var: Var) -> bool {
        self.values.get(var.index()).copied().unwrap_or(false)
    }

    pub fn lit_value(&self, lit: Lit) -> bool {
        self.value(lit.var()) != lit.is_negated()
    }
}

/// Result of a solver call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SolveOutcome {
    Sat(Model),
    Unsat,
    /// Stopped by a [`CancellationToken`].
    Interrupted,
    /// The solver gave up on its own.
    ResourceExhausted,
}

/// Cooperative cancellation shared between a caller, running synthesizers
/// and their solvers.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An incremental SAT solver.
pub trait SatBackend {
    /// Add a clause; it stays for every later call.
    fn add_clause(&mut self, clause: &[Lit]);

    /// Solve under every clause added so far. A backend returns
    /// [`SolveOutcome::Interrupted`] when `cancel` fires before or, if it
    /// can, during the call.
    fn solve(&mut self, cancel: &CancellationToken) -> SolveOutcome;
}

/// [`SatBackend`] over the varisat CDCL solver.
///
/// Clauses go straight into one long-lived solver, so learned clauses
/// carry over between the solves of an enumeration.
pub struct VarisatBackend {
    solver: varisat::Solver<'static>,
    num_vars: usize,
    num_clauses: usize,
    solves: u64,
}

impl Default for VarisatBackend {
    fn default() -> Self {
        VarisatBackend {
            solver: varisat::Solver::new(),
            num_vars: 0,
            num_clauses: 0,
            solves: 0,
        }
    }
}

impl fmt::Debug for VarisatBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VarisatBackend")
            .field("num_vars", &self.num_vars)
            .field("num_clauses", &self.num_clauses)
            .field("solves", &self.solves)
            .finish()
    }
}

impl VarisatBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    pub fn num_clauses(&self) -> usize {
        self.num_clauses
    }

    pub fn solves(&self) -> u64 {
        self.solves
    }
}

fn to_varisat(lit: Lit) -> varisat::Lit {
    varisat::Lit::from_dimacs(lit.to_dimacs() as isize)
}

impl SatBackend for VarisatBackend {
    fn add_clause(&mut self, clause: &[Lit]) {
        use varisat::ExtendFormula;

        for lit in clause {
            self.num_vars = self.num_vars.max(lit.var().index() + 1);
        }
        let lits: Vec<varisat::Lit> = clause.iter().map(|&l| to_varisat(l)).collect();
        self.solver.add_clause(&lits);
        self.num_clauses += 1;
    }

    fn solve(&mut self, cancel: &CancellationToken) -> SolveOutcome {
        if cancel.is_cancelled() {
            return SolveOutcome::Interrupted;
        }
        self.solves += 1;
        let outcome = match self.solver.solve() {
            Ok(true) => match self.solver.model() {
                Some(lits) => {
                    let mut values = vec![false; self.num_vars];
                    for lit in lits {
                        if let Some(slot) = values.get_mut(lit.var().index()) {
                            *slot = lit.is_positive();
                        }
                    }
                    SolveOutcome::Sat(Model::new(values))
                }
                None => SolveOutcome::ResourceExhausted,
            },
            Ok(false) => SolveOutcome::Unsat,
            Err(err) => {
                warn!(error = %err, "varisat gave up");
                SolveOutcome::ResourceExhausted
            }
        };
        debug!(
            vars = self.num_vars,
            clauses = self.num_clauses,
            solves = self.solves,
            sat = matches!(outcome, SolveOutcome::Sat(_)),
            "varisat solve"
        );
        outcome
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn lit(x: i32) -> Lit {
        let v = Var(x.unsigned_abs() - 1);
        Lit::new(v, x < 0)
    }

    fn clause(xs: &[i32]) -> Vec<Lit> {
        xs.iter().map(|&x| lit(x)).collect()
    }

    fn satisfies(model: &Model, clauses: &[Vec<Lit>]) -> bool {
        clauses.iter().all(|c| c.iter().any(|&l| model.lit_value(l)))
    }

    #[test]
    fn test_literals() {
        let v = Var(7);
        assert_eq!(Lit::positive(v).var(), v);
        assert!(Lit::negative(v).is_negated());
        assert_eq!(!Lit::positive(v), Lit::negative(v));
        assert_eq!(format!("{:?}", Lit::negative(v)), "¬x7");
        assert_eq!(Lit::positive(v).to_dimacs(), 8);
        assert_eq!(Lit::negative(Var(0)).to_dimacs(), -1);
    }

    #[test]
    fn test_simple_sat() {
        let clauses = vec![clause(&[1, 2]), clause(&[-1, 3]), clause(&[-3, -2]), clause(&[2, 3])];
        let mut solver = VarisatBackend::new();
        for c in &clauses {
            solver.add_clause(c);
        }
        match solver.solve(&CancellationToken::new()) {
            SolveOutcome::Sat(model) => assert!(satisfies(&model, &clauses)),
            other => panic!("expected sat, got {:?}", other),
        }
        assert_eq!(solver.num_vars(), 3);
        assert_eq!(solver.num_clauses(), 4);
    }

    #[test]
    fn test_unsat_stays_unsat() {
        let mut solver = VarisatBackend::new();
        for c in [clause(&[1, 2]), clause(&[1, -2]), clause(&[-1, 2]), clause(&[-1, -2])] {
            solver.add_clause(&c);
        }
        let never = CancellationToken::new();
        assert_eq!(solver.solve(&never), SolveOutcome::Unsat);
        solver.add_clause(&clause(&[3]));
        assert_eq!(solver.solve(&never), SolveOutcome::Unsat);
    }

    #[test]
    fn test_empty_clause_and_units() {
        let mut solver = VarisatBackend::new();
        let never = CancellationToken::new();
        solver.add_clause(&clause(&[1]));
        solver.add_clause(&clause(&[-1, 2]));
        match solver.solve(&never) {
            SolveOutcome::Sat(model) => {
                assert!(model.value(Var(0)));
                assert!(model.value(Var(1)));
            }
            other => panic!("expected sat, got {:?}", other),
        }
        solver.add_clause(&[]);
        assert_eq!(solver.solve(&never), SolveOutcome::Unsat);
    }

    #[test]
    fn test_pigeonhole_is_unsat() {
        // Four pigeons, three holes: p(i, h) = 3 * i + h + 1
        let p = |i: i32, h: i32| 3 * i + h + 1;
        let mut solver = VarisatBackend::new();
        for i in 0..4 {
            solver.add_clause(&clause(&[p(i, 0), p(i, 1), p(i, 2)]));
        }
        for h in 0..3 {
            for i in 0..4 {
                for j in i + 1..4 {
                    solver.add_clause(&clause(&[-p(i, h), -p(j, h)]));
                }
            }
        }
        assert_eq!(solver.solve(&CancellationToken::new()), SolveOutcome::Unsat);
    }

    #[test]
    fn test_enumerate_with_blocking_clauses() {
        // Exactly one of three
        let mut solver = VarisatBackend::new();
        let never = CancellationToken::new();
        solver.add_clause(&clause(&[1, 2, 3]));
        for (a, b) in [(1, 2), (1, 3), (2, 3)] {
            solver.add_clause(&clause(&[-a, -b]));
        }
        let mut found = Vec::new();
        while let SolveOutcome::Sat(model) = solver.solve(&never) {
            let chosen: Vec<i32> = (1..=3).filter(|&x| model.value(Var(x as u32 - 1))).collect();
            assert_eq!(chosen.len(), 1);
            found.push(chosen[0]);
            solver.add_clause(&clause(&[-chosen[0]]));
        }
        found.sort();
        assert_eq!(found, vec![1, 2, 3]);
        assert_eq!(solver.solves(), 4);
    }

    #[test]
    fn test_cancelled_before_solve() {
        let mut solver = VarisatBackend::new();
        solver.add_clause(&clause(&[1, 2]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(solver.solve(&cancel), SolveOutcome::Interrupted);
        assert_eq!(solver.solves(), 0);
    }

    #[test]
    fn test_random_3sat_models_are_valid() {
        // Deterministic pseudo-random instances below the threshold
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move |m: u64| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed % m
        };
        for _ in 0..20 {
            let vars = 20;
            let clauses: Vec<Vec<Lit>> = (0..60)
                .map(|_| {
                    (0..3)
                        .map(|_| {
                            let v = next(vars) as i32 + 1;
                            if next(2) == 0 { lit(v) } else { lit(-v) }
                        })
                        .collect()
                })
                .collect();
            let mut solver = VarisatBackend::new();
            for c in &clauses {
                solver.add_clause(c);
            }
            if let SolveOutcome::Sat(model) = solver.solve(&CancellationToken::new()) {
                assert!(satisfies(&model, &clauses));
            }
        }
    }
}
