//! Valiant-CFG: a semiring-generic context-free grammar engine.
//!
//! This crate provides:
//! - Semiring algebras and strictly-upper-triangular charts with the
//!   Valiant fixpoint `M = M + M * M`
//! - Grammar parsing, validation and Chomsky normalization
//! - CYK recognition and parse forests as two instances of one fixpoint
//! - Bar-Hillel intersection with finite-state acceptors, including
//!   Levenshtein automata
//! - Sketch completion and syntax repair over an incremental SAT solver
//!   (varisat by default, Z3 with feature `z3`)
//! - Python bindings via PyO3 (feature `python`)

pub mod analysis;
pub mod bar_hillel;
pub mod chart;
pub mod compiled;
pub mod cyk;
pub mod formula;
pub mod fsa;
pub mod grammar;
pub mod intern;
pub mod matrix;
pub mod normalize;
pub mod parser;
pub mod repair;
pub mod sat;
pub mod semiring;
pub mod symbol;
pub mod synthesis;
pub mod tree;

#[cfg(feature = "python")]
mod python;
#[cfg(feature = "z3")]
pub mod z3_backend;

// Re-exports for convenience
pub use analysis::{parikh_bounds, ParikhBound, ParikhBounds, ParikhConfig};
pub use bar_hillel::{intersect, intersect_levenshtein, intersect_with, IntersectConfig};
pub use chart::Chart;
pub use compiled::{CompiledGrammar, NtId};
pub use cyk::{parse, parse_with_stubs, recognize};
pub use formula::{CnfEncoder, Formula, VarPool};
pub use fsa::{Fsa, FsaError, FsaResult};
pub use grammar::{Cfg, GrammarError, GrammarResult, Production};
pub use matrix::Matrix;
pub use parser::{ParseError, ParseResult};
pub use repair::{levenshtein, repair, repair_within, BigramCache, Mutation, Repair, RepairConfig};
pub use sat::{CancellationToken, Lit, Model, SatBackend, SolveOutcome, Var, VarisatBackend};
pub use semiring::{Boolean, Count, Gf2, Scalar, ScalarSemiring, Semiring};
pub use symbol::{render, tokenize, StateId, Symbol};
pub use synthesis::{
    parse_sketch, SatAlgebra, SketchToken, SynthesisConfig, SynthesisError,
    SynthesisResult, Synthesizer, Termination,
};
pub use tree::{Forest, Tree};
#[cfg(feature = "z3")]
pub use z3_backend::Z3Backend;
