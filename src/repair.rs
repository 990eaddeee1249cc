//! Syntax repair by sketch completion.
//!
//! A [`Mutation`] turns a broken prompt into sketches with holes where
//! edits may happen. Each sketch is completed by the [`Synthesizer`], and
//! the completions are ranked by token edit distance to the prompt, then
//! by length. Sketches with an adjacent pair of terminals that never occurs
//! in the language are rejected before reaching the solver.

use crate::bar_hillel::{intersect, intersect_levenshtein};
use crate::compiled::{CompiledGrammar, NtId};
use crate::cyk::recognize;
use crate::fsa::Fsa;
use crate::symbol::{render, Symbol};
use crate::synthesis::{
    CancellationToken, SketchToken, SynthesisConfig, SynthesisError, SynthesisResult, Synthesizer,
};
use priority_queue::PriorityQueue;
use rustc_hash::FxHashSet;
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

/// Token-level edit distance.
pub fn levenshtein(a: &[Symbol], b: &[Symbol]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];
    for (i, x) in a.iter().enumerate() {
        row[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let substitute = prev[j] + usize::from(x != y);
            row[j + 1] = substitute.min(prev[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// A way of turning a prompt into sketches.
pub trait Mutation {
    fn name(&self) -> &'static str;

    fn sketches(&self, prompt: &[Symbol]) -> Vec<Vec<SketchToken>>;
}

/// Up to `edits` holes, each replacing a token or inserted between tokens.
#[derive(Clone, Debug)]
pub struct SubstitutionsAndInsertions {
    pub edits: usize,
}

impl Mutation for SubstitutionsAndInsertions {
    fn name(&self) -> &'static str {
        "substitutions-and-insertions"
    }

    fn sketches(&self, prompt: &[Symbol]) -> Vec<Vec<SketchToken>> {
        let n = prompt.len();
        // Edit sites 2i insert before token i, 2i + 1 substitute token i
        let sites = 2 * n + 1;
        combinations(sites, self.edits)
            .into_iter()
            .map(|chosen| {
                let mut sketch = Vec::with_capacity(n + chosen.len());
                for i in 0..=n {
                    if chosen.contains(&(2 * i)) {
                        sketch.push(SketchToken::Hole);
                    }
                    if i < n {
                        if chosen.contains(&(2 * i + 1)) {
                            sketch.push(SketchToken::Hole);
                        } else {
                            sketch.push(SketchToken::Terminal(prompt[i].clone()));
                        }
                    }
                }
                sketch
            })
            .collect()
    }
}

/// Up to `edits` tokens deleted; the sketches are fully concrete.
#[derive(Clone, Debug)]
pub struct Deletions {
    pub edits: usize,
}

impl Mutation for Deletions {
    fn name(&self) -> &'static str {
        "deletions"
    }

    fn sketches(&self, prompt: &[Symbol]) -> Vec<Vec<SketchToken>> {
        combinations(prompt.len(), self.edits.min(prompt.len().saturating_sub(1)))
            .into_iter()
            .map(|chosen| {
                prompt
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !chosen.contains(i))
                    .map(|(_, t)| SketchToken::Terminal(t.clone()))
                    .collect()
            })
            .collect()
    }
}

/// Non-empty subsets of `0..n` with at most `k` elements, smallest first.
fn combinations(n: usize, k: usize) -> Vec<BTreeSet<usize>> {
    let mut out = Vec::new();
    let mut layer: Vec<BTreeSet<usize>> = vec![BTreeSet::new()];
    for _ in 0..k {
        layer = layer
            .iter()
            .flat_map(|set| {
                let from = set.iter().next_back().map_or(0, |&m| m + 1);
                (from..n).map(move |i| {
                    let mut next = set.clone();
                    next.insert(i);
                    next
                })
            })
            .collect();
        out.extend(layer.iter().cloned());
    }
    out
}

/// Memo of which adjacent terminal pairs occur in some string of one
/// grammar's language.
///
/// Built for one grammar and reused across every sketch of every repair
/// against it.
#[derive(Clone, Debug, Default)]
pub struct BigramCache {
    first: Vec<FxHashSet<Symbol>>,
    last: Vec<FxHashSet<Symbol>>,
    possible: FxHashSet<(Symbol, Symbol)>,
    impossible: FxHashSet<(Symbol, Symbol)>,
}

impl BigramCache {
    pub fn new(grammar: &CompiledGrammar) -> Self {
        let (first, last) = boundary_terminals(grammar);
        BigramCache {
            first,
            last,
            ..Self::default()
        }
    }

    /// Whether `a b` occurs in some string of the language.
    pub fn is_possible(&mut self, grammar: &CompiledGrammar, a: &Symbol, b: &Symbol) -> bool {
        let pair = (a.clone(), b.clone());
        if self.possible.contains(&pair) {
            return true;
        }
        if self.impossible.contains(&pair) {
            return false;
        }
        let found = (0..grammar.num_nonterminals()).any(|parent| {
            grammar
                .binary()
                .children(parent)
                .iter()
                .any(|&(l, r)| self.last[l].contains(a) && self.first[r].contains(b))
        });
        if found {
            self.possible.insert(pair);
        } else {
            self.impossible.insert(pair);
        }
        found
    }

    /// Whether every concrete terminal of `sketch` is in the grammar and no
    /// adjacent concrete pair is impossible.
    pub fn admits(&mut self, grammar: &CompiledGrammar, sketch: &[SketchToken]) -> bool {
        let known = sketch.iter().all(|t| match t {
            SketchToken::Terminal(s) => grammar.is_terminal(s),
            _ => true,
        });
        known
            && sketch.windows(2).all(|w| match (&w[0], &w[1]) {
                (SketchToken::Terminal(a), SketchToken::Terminal(b)) => self.is_possible(grammar, a, b),
                _ => true,
            })
    }

    /// `(possible, impossible)` pairs decided so far.
    pub fn decided(&self) -> (usize, usize) {
        (self.possible.len(), self.impossible.len())
    }
}

/// Terminals that can begin and end a derivation of each nonterminal,
/// ignoring `ε`.
fn boundary_terminals(grammar: &CompiledGrammar) -> (Vec<FxHashSet<Symbol>>, Vec<FxHashSet<Symbol>>) {
    let n = grammar.num_nonterminals();
    let mut nullable = vec![false; n];
    let mut first = vec![FxHashSet::default(); n];
    let mut last = vec![FxHashSet::default(); n];
    for a in 0..n {
        for t in grammar.lexical().terminals(a) {
            if t.is_epsilon() {
                nullable[a] = true;
            } else {
                first[a].insert(t.clone());
                last[a].insert(t.clone());
            }
        }
    }
    loop {
        let mut changed = false;
        for a in 0..n {
            for &(l, r) in grammar.binary().children(a) {
                let mut grow = |sets: &mut Vec<FxHashSet<Symbol>>, from: NtId| {
                    if from != a {
                        let add: Vec<Symbol> =
                            sets[from].iter().filter(|t| !sets[a].contains(*t)).cloned().collect();
                        changed |= !add.is_empty();
                        sets[a].extend(add);
                    }
                };
                grow(&mut first, l);
                if nullable[l] {
                    grow(&mut first, r);
                }
                grow(&mut last, r);
                if nullable[r] {
                    grow(&mut last, l);
                }
                if nullable[l] && nullable[r] && !nullable[a] {
                    nullable[a] = true;
                    changed = true;
                }
            }
        }
        if !changed {
            return (first, last);
        }
    }
}

/// Configuration for [`repair`].
#[derive(Clone, Debug)]
pub struct RepairConfig {
    pub max_results: usize,
    /// Edits per sketch for the default mutations.
    pub edits: usize,
    pub synthesis: SynthesisConfig,
    pub cancel: CancellationToken,
}

impl Default for RepairConfig {
    fn default() -> Self {
        RepairConfig {
            max_results: 10,
            edits: 2,
            synthesis: SynthesisConfig::default(),
            cancel: CancellationToken::new(),
        }
    }
}

impl RepairConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_edits(mut self, edits: usize) -> Self {
        self.edits = edits;
        self
    }

    pub fn with_synthesis(mut self, synthesis: SynthesisConfig) -> Self {
        self.synthesis = synthesis;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Substitutions, insertions and deletions, `edits` at a time.
    pub fn mutations(&self) -> Vec<Box<dyn Mutation>> {
        vec![
            Box::new(SubstitutionsAndInsertions { edits: self.edits }),
            Box::new(Deletions { edits: self.edits }),
        ]
    }
}

/// A repaired string and its distance to the prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Repair {
    pub tokens: Vec<Symbol>,
    pub distance: usize,
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", render(&self.tokens))
    }
}

/// Ranked candidates, closest and shortest first.
struct Ranking {
    prompt: Vec<Symbol>,
    queue: PriorityQueue<Vec<Symbol>, Reverse<(usize, usize, String)>>,
}

impl Ranking {
    fn new(prompt: &[Symbol]) -> Self {
        Ranking {
            prompt: prompt.to_vec(),
            queue: PriorityQueue::new(),
        }
    }

    fn offer(&mut self, tokens: Vec<Symbol>) {
        let visible: Vec<Symbol> = tokens.into_iter().filter(|t| !t.is_epsilon()).collect();
        let distance = levenshtein(&visible, &self.prompt);
        let priority = Reverse((distance, visible.len(), render(&visible)));
        self.queue.push(visible, priority);
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn into_top(mut self, k: usize) -> Vec<Repair> {
        let mut out = Vec::with_capacity(k.min(self.queue.len()));
        while out.len() < k {
            let Some((tokens, Reverse((distance, _, _)))) = self.queue.pop() else {
                break;
            };
            out.push(Repair { tokens, distance });
        }
        out
    }
}

/// Repair `prompt` with the given mutations.
pub fn repair(
    prompt: &[Symbol],
    grammar: &CompiledGrammar,
    mutations: &[&dyn Mutation],
    config: &RepairConfig,
) -> SynthesisResult<Vec<Repair>> {
    let mut cache = BigramCache::new(grammar);
    repair_with_cache(prompt, grammar, mutations, config, &mut cache)
}

/// [`repair`], reusing the bigram decisions of earlier repairs against the
/// same grammar.
pub fn repair_with_cache(
    prompt: &[Symbol],
    grammar: &CompiledGrammar,
    mutations: &[&dyn Mutation],
    config: &RepairConfig,
    cache: &mut BigramCache,
) -> SynthesisResult<Vec<Repair>> {
    let clock = Instant::now();
    let mut ranking = Ranking::new(prompt);
    if recognize(grammar, prompt) {
        ranking.offer(prompt.to_vec());
    }

    let (mut sketches, mut rejected) = (0usize, 0usize);
    for mutation in mutations {
        for sketch in mutation.sketches(prompt) {
            if config.cancel.is_cancelled() {
                return Err(SynthesisError::Cancelled);
            }
            sketches += 1;
            if !cache.admits(grammar, &sketch) {
                rejected += 1;
                continue;
            }
            let synth = Synthesizer::new(grammar, &sketch, config.synthesis.clone())?
                .with_cancellation(config.cancel.clone());
            for completion in synth {
                ranking.offer(completion?);
            }
        }
        debug!(mutation = mutation.name(), candidates = ranking.len(), "applied mutation");
    }

    info!(
        prompt = %render(prompt),
        sketches,
        rejected,
        candidates = ranking.len(),
        elapsed_ms = clock.elapsed().as_millis() as u64,
        "repaired"
    );
    Ok(ranking.into_top(config.max_results))
}

/// Repair within edit distance `radius`, by completing all-hole sketches
/// against the intersection of the grammar with the Levenshtein automaton
/// of the prompt.
pub fn repair_within(
    prompt: &[Symbol],
    grammar: &CompiledGrammar,
    radius: usize,
    config: &RepairConfig,
) -> SynthesisResult<Vec<Repair>> {
    let clock = Instant::now();
    let alphabet: BTreeSet<Symbol> = grammar
        .terminals()
        .iter()
        .filter(|t| !t.is_epsilon() && !t.is_stub())
        .cloned()
        .collect();
    let fsa = Fsa::levenshtein(prompt, radius, &alphabet);
    let product = intersect_levenshtein(grammar, &fsa).unwrap_or_else(|_| intersect(grammar, &fsa));

    let mut ranking = Ranking::new(prompt);
    let n = prompt.len();
    for len in n.saturating_sub(radius)..=n + radius {
        if config.cancel.is_cancelled() {
            return Err(SynthesisError::Cancelled);
        }
        let sketch = vec![SketchToken::Hole; len];
        let synth = Synthesizer::new(&product, &sketch, config.synthesis.clone())?
            .with_cancellation(config.cancel.clone());
        for completion in synth {
            ranking.offer(completion?);
        }
    }
    info!(
        prompt = %render(prompt),
        radius,
        productions = product.cfg().len(),
        candidates = ranking.len(),
        elapsed_ms = clock.elapsed().as_millis() as u64,
        "repaired by intersection"
    );
    Ok(ranking.into_top(config.max_results))
}
