//! [`SatBackend`] over the Z3 solver.
//!
//! One [`Solver`] lives as long as the backend, so clauses added between
//! solves (blocking clauses in particular) extend the same solver state.
//! While a solve runs, a watcher thread polls the cancellation token and
//! interrupts the context through its [`ContextHandle`].

use crate::sat::{CancellationToken, Lit, Model, SatBackend, SolveOutcome, Var};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::debug;
use z3::ast::Bool;
use z3::{Context, ContextHandle, SatResult, Solver};

/// How often the watcher looks at the cancellation token.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

pub struct Z3Backend<'ctx> {
    ctx: &'ctx Context,
    solver: Solver<'ctx>,
    vars: Vec<Bool<'ctx>>,
    num_clauses: usize,
}

impl<'ctx> Z3Backend<'ctx> {
    /// A backend solving in `ctx`, which the caller keeps alive.
    pub fn new(ctx: &'ctx Context) -> Self {
        Z3Backend {
            ctx,
            solver: Solver::new(ctx),
            vars: Vec::new(),
            num_clauses: 0,
        }
    }

    pub fn num_clauses(&self) -> usize {
        self.num_clauses
    }

    fn var(&mut self, var: Var) -> Bool<'ctx> {
        while self.vars.len() <= var.index() {
            let name = format!("x{}", self.vars.len());
            self.vars.push(Bool::new_const(self.ctx, name));
        }
        self.vars[var.index()].clone()
    }

    fn check(&self, cancel: &CancellationToken) -> SatResult {
        let handle: ContextHandle = self.ctx.handle();
        let done = AtomicBool::new(false);
        thread::scope(|scope| {
            scope.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    if cancel.is_cancelled() {
                        handle.interrupt();
                        return;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            });
            let result = self.solver.check();
            done.store(true, Ordering::SeqCst);
            result
        })
    }
}

impl SatBackend for Z3Backend<'_> {
    fn add_clause(&mut self, clause: &[Lit]) {
        let lits: Vec<Bool> = clause
            .iter()
            .map(|&l| {
                let v = self.var(l.var());
                if l.is_negated() {
                    v.not()
                } else {
                    v
                }
            })
            .collect();
        let refs: Vec<&Bool> = lits.iter().collect();
        self.solver.assert(&Bool::or(self.ctx, &refs));
        self.num_clauses += 1;
    }

    fn solve(&mut self, cancel: &CancellationToken) -> SolveOutcome {
        if cancel.is_cancelled() {
            return SolveOutcome::Interrupted;
        }
        let outcome = match self.check(cancel) {
            SatResult::Sat => match self.solver.get_model() {
                Some(model) => {
                    let values = self
                        .vars
                        .iter()
                        .map(|v| model.eval(v, true).and_then(|b| b.as_bool()).unwrap_or(false))
                        .collect();
                    SolveOutcome::Sat(Model::new(values))
                }
                None => SolveOutcome::ResourceExhausted,
            },
            SatResult::Unsat => SolveOutcome::Unsat,
            SatResult::Unknown if cancel.is_cancelled() => SolveOutcome::Interrupted,
            SatResult::Unknown => SolveOutcome::ResourceExhausted,
        };
        debug!(
            clauses = self.num_clauses,
            vars = self.vars.len(),
            sat = matches!(outcome, SolveOutcome::Sat(_)),
            "z3 solve"
        );
        outcome
    }
}
