//! Sketch completion by SAT.
//!
//! A sketch is a sequence of concrete terminals, holes `_` and nonterminal
//! stubs `<A>`. Every hole position gets one selector variable per
//! candidate terminal, constrained to exactly one. Running the chart
//! fixpoint over [`SatAlgebra`] turns each cell into a vector of formulas,
//! one per nonterminal, true iff that nonterminal derives the span under
//! the selected terminals. Asserting the `START` entry of the top cell and
//! enumerating models with blocking clauses yields every completion in the
//! language exactly once.
//!
//! Several grammars can be solved together over one sketch: their charts
//! share the selector variables, so a model picks the same terminal at a
//! position for every grammar and the completions lie in the intersection.

use crate::chart::Chart;
use crate::compiled::{CompiledGrammar, NtId};
use crate::formula::{CnfEncoder, Formula};
pub use crate::sat::CancellationToken;
use crate::sat::{Lit, Model, SatBackend, SolveOutcome, Var, VarisatBackend};
use crate::semiring::Semiring;
use crate::symbol::{render, Symbol};
use rustc_hash::FxHashSet;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("Synthesis cancelled")]
    Cancelled,
    #[error("Token '{token}' at position {position} is not a terminal of the grammar")]
    UnknownToken { token: Symbol, position: usize },
    #[error("Sketch length mismatch: expected {expected} tokens, found {found}")]
    LengthMismatch { expected: usize, found: usize },
}

pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// One position of a sketch.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SketchToken {
    Terminal(Symbol),
    Hole,
    /// Any stub `<B>` with `B` reachable from the named nonterminal.
    Stub(Symbol),
}

impl fmt::Display for SketchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SketchToken::Terminal(t) => write!(f, "{}", t),
            SketchToken::Hole => write!(f, "_"),
            SketchToken::Stub(nt) => write!(f, "<{}>", nt),
        }
    }
}

/// Split a sketch on whitespace: `_` is a hole, `<A>` a stub.
pub fn parse_sketch(text: &str) -> Vec<SketchToken> {
    text.split_whitespace()
        .map(|tok| match tok {
            "_" => SketchToken::Hole,
            _ if tok.len() > 2 && tok.starts_with('<') && tok.ends_with('>') => {
                SketchToken::Stub(Symbol::new(&tok[1..tok.len() - 1]))
            }
            _ => SketchToken::Terminal(Symbol::new(tok)),
        })
        .collect()
}

/// Vectors of formulas indexed by nonterminal, under pointwise `or` and
/// the binary rewrite join.
#[derive(Clone, Copy, Debug)]
pub struct SatAlgebra<'g> {
    grammar: &'g CompiledGrammar,
}

impl<'g> SatAlgebra<'g> {
    pub fn new(grammar: &'g CompiledGrammar) -> Self {
        SatAlgebra { grammar }
    }

    /// Entry `A` holds iff some terminal of `A -> t` is selected, where
    /// `selected(t)` is `None` for terminals that cannot appear.
    pub fn seed(&self, selected: impl Fn(&Symbol) -> Option<Formula>) -> Vec<Formula> {
        (0..self.grammar.num_nonterminals())
            .map(|a| {
                Formula::any(
                    self.grammar
                        .lexical()
                        .terminals(a)
                        .iter()
                        .filter_map(|t| selected(t)),
                )
            })
            .collect()
    }
}

impl Semiring for SatAlgebra<'_> {
    type Elem = Vec<Formula>;

    fn zero(&self) -> Vec<Formula> {
        vec![Formula::ff(); self.grammar.num_nonterminals()]
    }

    /// No formula vector is a unit under rewriting; this is `zero`.
    fn one(&self) -> Vec<Formula> {
        self.zero()
    }

    fn plus(&self, a: &Vec<Formula>, b: &Vec<Formula>) -> Vec<Formula> {
        assert_eq!(a.len(), b.len(), "Shape mismatch: formula vectors differ in length");
        a.iter().zip(b).map(|(x, y)| x.or(y)).collect()
    }

    fn times(&self, a: &Vec<Formula>, b: &Vec<Formula>) -> Vec<Formula> {
        assert_eq!(a.len(), b.len(), "Shape mismatch: formula vectors differ in length");
        (0..self.grammar.num_nonterminals())
            .map(|parent: NtId| {
                Formula::any(
                    self.grammar
                        .binary()
                        .children(parent)
                        .iter()
                        .map(|&(l, r)| a[l].and(&b[r])),
                )
            })
            .collect()
    }

    fn is_zero(&self, a: &Vec<Formula>) -> bool {
        a.iter().all(Formula::is_false)
    }
}

/// Whether `START` derives the whole sketch, given one seed vector per
/// position.
pub fn is_in_grammar(grammar: &CompiledGrammar, seeds: Vec<Vec<Formula>>) -> Formula {
    let Some(start) = grammar.start() else {
        return Formula::ff();
    };
    if seeds.is_empty() {
        return Formula::constant(grammar.derives_epsilon());
    }
    let alg = SatAlgebra::new(grammar);
    let chart = Chart::from_seeds(seeds, &alg).seek_fixpoint(&alg);
    chart
        .top()
        .map(|cell| cell[start].clone())
        .unwrap_or_else(Formula::ff)
}

/// Configuration for [`Synthesizer`].
#[derive(Clone, Debug, Default)]
pub struct SynthesisConfig {
    /// Stop after this many completions.
    pub max_results: Option<usize>,
    /// Let holes take stub terminals `<A>`.
    pub allow_stubs: bool,
    /// Let holes take `ε`, which completes shorter strings.
    pub epsilon_holes: bool,
}

impl SynthesisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_stubs(mut self, allow_stubs: bool) -> Self {
        self.allow_stubs = allow_stubs;
        self
    }

    pub fn with_epsilon_holes(mut self, epsilon_holes: bool) -> Self {
        self.epsilon_holes = epsilon_holes;
        self
    }
}

/// Why enumeration stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Every completion has been produced.
    Exhausted,
    /// The solver gave up.
    ResourceExhausted,
    Cancelled,
    /// `max_results` reached.
    Limit,
}

/// A resolved sketch position.
#[derive(Clone, Debug)]
enum Slot {
    Fixed(Symbol),
    Choice(Vec<(Symbol, Var)>),
}

impl Slot {
    fn formula(&self, t: &Symbol) -> Option<Formula> {
        match self {
            Slot::Fixed(s) => (s == t).then(Formula::tt),
            Slot::Choice(options) => options
                .iter()
                .find(|(s, _)| s == t)
                .map(|&(_, v)| Formula::var(v)),
        }
    }

    fn decode(&self, model: &Model) -> Option<(Symbol, Option<Lit>)> {
        match self {
            Slot::Fixed(s) => Some((s.clone(), None)),
            Slot::Choice(options) => options
                .iter()
                .find(|&&(_, v)| model.value(v))
                .map(|(s, v)| (s.clone(), Some(Lit::positive(*v)))),
        }
    }
}

enum Source<B> {
    /// Completions already known, no solver needed.
    Listed(VecDeque<Vec<Symbol>>),
    Solver { backend: B, slots: Vec<Slot> },
}

/// Iterator over the completions of a sketch.
///
/// Yields each completion once. Ends when the completions run out, the
/// solver gives up or `max_results` is reached; cancellation yields one
/// `Err(SynthesisError::Cancelled)` first. [`Synthesizer::termination`]
/// tells which.
pub struct Synthesizer<B: SatBackend = VarisatBackend> {
    source: Source<B>,
    config: SynthesisConfig,
    cancel: CancellationToken,
    seen: FxHashSet<Vec<Symbol>>,
    produced: usize,
    termination: Option<Termination>,
}

impl Synthesizer<VarisatBackend> {
    /// Complete `sketch` in the language of `grammar`.
    pub fn new(
        grammar: &CompiledGrammar,
        sketch: &[SketchToken],
        config: SynthesisConfig,
    ) -> SynthesisResult<Self> {
        let backend = VarisatBackend::new();
        Synthesizer::with_backend(&[grammar], &[sketch], config, backend)
    }

    /// Complete one sketch per grammar, all positions aligned, in the
    /// intersection of the languages.
    pub fn intersecting(
        grammars: &[&CompiledGrammar],
        sketches: &[&[SketchToken]],
        config: SynthesisConfig,
    ) -> SynthesisResult<Self> {
        let backend = VarisatBackend::new();
        Synthesizer::with_backend(grammars, sketches, config, backend)
    }
}

impl<B: SatBackend> Synthesizer<B> {
    pub fn with_backend(
        grammars: &[&CompiledGrammar],
        sketches: &[&[SketchToken]],
        config: SynthesisConfig,
        mut backend: B,
    ) -> SynthesisResult<Self> {
        assert_eq!(
            grammars.len(),
            sketches.len(),
            "Shape mismatch: one sketch per grammar"
        );
        let clock = Instant::now();
        let len = sketches.first().map_or(0, |s| s.len());
        if let Some(bad) = sketches.iter().find(|s| s.len() != len) {
            return Err(SynthesisError::LengthMismatch {
                expected: len,
                found: bad.len(),
            });
        }

        let mut candidates: Vec<Option<BTreeSet<Symbol>>> = vec![None; len];
        for (grammar, sketch) in grammars.iter().zip(sketches) {
            for (position, token) in sketch.iter().enumerate() {
                let allowed = candidates_at(grammar, token, position, &config)?;
                let merged = match candidates[position].take() {
                    None => allowed,
                    Some(prev) => prev.intersection(&allowed).cloned().collect(),
                };
                candidates[position] = Some(merged);
            }
        }
        let candidates: Vec<BTreeSet<Symbol>> =
            candidates.into_iter().map(Option::unwrap_or_default).collect();

        let mut synth = Synthesizer {
            source: Source::Listed(VecDeque::new()),
            config,
            cancel: CancellationToken::new(),
            seen: FxHashSet::default(),
            produced: 0,
            termination: None,
        };

        if grammars.is_empty() || candidates.iter().any(BTreeSet::is_empty) {
            debug!(positions = len, "sketch has a position with no candidate");
            return Ok(synth);
        }
        if len == 0 {
            if grammars.iter().all(|g| g.derives_epsilon()) {
                synth.source = Source::Listed(VecDeque::from([Vec::new()]));
            }
            return Ok(synth);
        }
        if len == 1 {
            let listed = candidates[0]
                .iter()
                .filter(|t| grammars.iter().all(|g| g.starts_with_unit(t)))
                .map(|t| vec![t.clone()])
                .collect();
            synth.source = Source::Listed(listed);
            return Ok(synth);
        }

        let mut encoder = CnfEncoder::new();
        let slots: Vec<Slot> = candidates
            .into_iter()
            .map(|options| {
                if options.len() == 1 {
                    Slot::Fixed(options.into_iter().next().unwrap_or(Symbol::Epsilon))
                } else {
                    Slot::Choice(options.into_iter().map(|t| (t, encoder.fresh())).collect())
                }
            })
            .collect();
        for slot in &slots {
            if let Slot::Choice(options) = slot {
                let vars: Vec<Formula> = options.iter().map(|&(_, v)| Formula::var(v)).collect();
                encoder.assert(&Formula::exactly_one(&vars));
            }
        }
        for grammar in grammars {
            let alg = SatAlgebra::new(grammar);
            let seeds = slots.iter().map(|slot| alg.seed(|t| slot.formula(t))).collect();
            encoder.assert(&is_in_grammar(grammar, seeds));
        }
        let clauses = encoder.drain();
        let num_clauses = clauses.len();
        for clause in &clauses {
            backend.add_clause(clause);
        }
        info!(
            positions = len,
            holes = slots.iter().filter(|s| matches!(s, Slot::Choice(_))).count(),
            grammars = grammars.len(),
            vars = encoder.pool().len(),
            clauses = num_clauses,
            elapsed_ms = clock.elapsed().as_millis() as u64,
            "encoded sketch"
        );

        synth.source = Source::Solver { backend, slots };
        Ok(synth)
    }

    /// Share a cancellation token with the caller.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Why enumeration stopped, once it has.
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    pub fn produced(&self) -> usize {
        self.produced
    }

    fn finish(&mut self, termination: Termination) {
        debug!(produced = self.produced, ?termination, "synthesis finished");
        self.termination = Some(termination);
    }

    /// The next candidate, possibly a duplicate once rendered.
    fn next_candidate(&mut self) -> Result<Vec<Symbol>, Termination> {
        match &mut self.source {
            Source::Listed(queue) => queue.pop_front().ok_or(Termination::Exhausted),
            Source::Solver { backend, slots } => {
                match backend.solve(&self.cancel) {
                    SolveOutcome::Unsat => Err(Termination::Exhausted),
                    SolveOutcome::Interrupted => Err(Termination::Cancelled),
                    SolveOutcome::ResourceExhausted => Err(Termination::ResourceExhausted),
                    SolveOutcome::Sat(model) => {
                        let mut tokens = Vec::with_capacity(slots.len());
                        let mut blocking = Vec::new();
                        for slot in slots.iter() {
                            match slot.decode(&model) {
                                Some((t, lit)) => {
                                    tokens.push(t);
                                    blocking.extend(lit.map(|l| !l));
                                }
                                None => return Err(Termination::ResourceExhausted),
                            }
                        }
                        // With no hole left to vary this clause is empty
                        backend.add_clause(&blocking);
                        Ok(tokens)
                    }
                }
            }
        }
    }
}

impl<B: SatBackend> Iterator for Synthesizer<B> {
    type Item = SynthesisResult<Vec<Symbol>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.termination.is_some() {
                return None;
            }
            if self.config.max_results.map_or(false, |max| self.produced >= max) {
                self.finish(Termination::Limit);
                return None;
            }
            if self.cancel.is_cancelled() {
                self.finish(Termination::Cancelled);
                return Some(Err(SynthesisError::Cancelled));
            }
            match self.next_candidate() {
                Err(Termination::Cancelled) => {
                    self.finish(Termination::Cancelled);
                    return Some(Err(SynthesisError::Cancelled));
                }
                Err(termination) => {
                    self.finish(termination);
                    return None;
                }
                Ok(tokens) => {
                    let visible: Vec<Symbol> =
                        tokens.iter().filter(|t| !t.is_epsilon()).cloned().collect();
                    if self.seen.insert(visible) {
                        self.produced += 1;
                        debug!(completion = %render(&tokens), "synthesized");
                        return Some(Ok(tokens));
                    }
                }
            }
        }
    }
}

/// Terminals `grammar` allows at one sketch position.
fn candidates_at(
    grammar: &CompiledGrammar,
    token: &SketchToken,
    position: usize,
    config: &SynthesisConfig,
) -> SynthesisResult<BTreeSet<Symbol>> {
    match token {
        SketchToken::Terminal(t) => {
            if grammar.is_terminal(t) {
                Ok(BTreeSet::from([t.clone()]))
            } else {
                Err(SynthesisError::UnknownToken {
                    token: t.clone(),
                    position,
                })
            }
        }
        SketchToken::Hole => Ok(grammar
            .terminals()
            .iter()
            .filter(|t| config.allow_stubs || !t.is_stub())
            .filter(|t| config.epsilon_holes || !t.is_epsilon())
            .cloned()
            .collect()),
        SketchToken::Stub(nt) => Ok(grammar
            .reachable_from(nt)
            .iter()
            .map(Symbol::stub)
            .filter(|s| grammar.is_terminal(s))
            .collect()),
    }
}

/// Collect the completions of `sketch`, rendered, in enumeration order.
pub fn complete(
    grammar: &CompiledGrammar,
    sketch: &str,
    config: SynthesisConfig,
) -> SynthesisResult<Vec<String>> {
    Synthesizer::new(grammar, &parse_sketch(sketch), config)?
        .map(|r| r.map(|tokens| render(&tokens)))
        .collect()
}
