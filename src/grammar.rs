//! Context-free grammars.
//!
//! A [`Cfg`] is an ordered set of [`Production`]s. Symbols that appear on
//! some left-hand side are nonterminals, every other symbol is a terminal.
//! The start symbol is always `START`; normalization adds it when absent.

use crate::analysis;
use crate::compiled::CompiledGrammar;
use crate::cyk;
use crate::normalize;
use crate::parser::{self, ParseError, SourceRule, SourceSymbol, Token};
use crate::symbol::Symbol;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Errors raised while building a grammar from source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GrammarError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("`{symbol}` is used both as an escaped terminal and as a nonterminal in `{production}`")]
    MixedSymbol { symbol: String, production: String },
    #[error("stub `<{stub}>` in `{production}` names an undefined nonterminal")]
    UndefinedStub { stub: String, production: String },
    #[error("START is used in `{production}` but has no productions")]
    NoStartProductions { production: String },
    #[error("line {line}: not a well-formed production: {found}")]
    Malformed { line: usize, found: String },
}

/// Result type for grammar construction.
pub type GrammarResult<T> = Result<T, GrammarError>;

/// A production `lhs -> rhs[0] rhs[1] ...`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Production {
    pub lhs: Symbol,
    pub rhs: Vec<Symbol>,
}

impl Production {
    pub fn new(lhs: Symbol, rhs: Vec<Symbol>) -> Self {
        Production { lhs, rhs }
    }

    /// `lhs -> sym`
    pub fn unit(lhs: Symbol, sym: Symbol) -> Self {
        Production::new(lhs, vec![sym])
    }

    /// `lhs -> left right`
    pub fn binary(lhs: Symbol, left: Symbol, right: Symbol) -> Self {
        Production::new(lhs, vec![left, right])
    }

    pub fn len(&self) -> usize {
        self.rhs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rhs.is_empty()
    }

    pub fn is_unit(&self) -> bool {
        self.rhs.len() == 1
    }
}

impl fmt::Display for Production {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ->", self.lhs)?;
        for s in &self.rhs {
            write!(f, " {}", s)?;
        }
        Ok(())
    }
}

/// A context-free grammar.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cfg {
    productions: BTreeSet<Production>,
}

const META_GRAMMAR: &str = r#"
START -> CFG
CFG -> PRD | CFG NL CFG
PRD -> SYM `->` RHS
RHS -> SYM | RHS RHS | RHS `|` RHS
"#;

impl Cfg {
    /// Create an empty grammar.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_productions(productions: impl IntoIterator<Item = Production>) -> Self {
        Cfg {
            productions: productions.into_iter().collect(),
        }
    }

    /// Parse a grammar source. The result is not normalized.
    pub fn parse(source: &str) -> GrammarResult<Self> {
        let rules = parser::parse_grammar(source)?;
        Cfg::from_rules(&rules)
    }

    /// Check the source against the grammar of grammars, then parse it.
    pub fn parse_validated(source: &str) -> GrammarResult<Self> {
        Cfg::validate(source)?;
        Cfg::parse(source)
    }

    /// Build a grammar from parsed rules, expanding alternatives.
    pub fn from_rules(rules: &[SourceRule]) -> GrammarResult<Self> {
        let cfg = Cfg::from_productions(normalize::expand_alternation(rules));
        let nonterminals = cfg.nonterminals();

        for rule in rules {
            for alt in &rule.alternatives {
                let production = || {
                    Production::new(
                        Symbol::new(&rule.lhs),
                        alt.iter().map(SourceSymbol::to_symbol).collect(),
                    )
                    .to_string()
                };
                for sym in alt {
                    match sym {
                        SourceSymbol::Escaped(name) if nonterminals.contains(&Symbol::new(name)) => {
                            return Err(GrammarError::MixedSymbol {
                                symbol: name.clone(),
                                production: production(),
                            });
                        }
                        SourceSymbol::Stub(name) if !nonterminals.contains(&Symbol::new(name)) => {
                            return Err(GrammarError::UndefinedStub {
                                stub: name.clone(),
                                production: production(),
                            });
                        }
                        SourceSymbol::Name(name)
                            if Symbol::new(name).is_start()
                                && !nonterminals.contains(&Symbol::start()) =>
                        {
                            return Err(GrammarError::NoStartProductions {
                                production: production(),
                            });
                        }
                        _ => {}
                    }
                }
            }
        }

        debug!(rules = rules.len(), productions = cfg.len(), "parsed grammar");
        Ok(cfg)
    }

    /// Recognize the shape of a grammar source with the engine itself.
    ///
    /// Every user symbol is mapped to `SYM` and every line break to `NL`,
    /// then the token sequence is parsed against a grammar of grammars.
    pub fn validate(source: &str) -> GrammarResult<()> {
        let meta = CompiledGrammar::new(&Cfg::parse(META_GRAMMAR)?);

        let mut lines: Vec<(usize, Vec<Symbol>)> = Vec::new();
        let mut current: Option<(usize, Vec<Symbol>)> = None;
        for (line, token) in parser::lex(source)? {
            let sym = match token {
                Token::Newline => {
                    lines.extend(current.take());
                    continue;
                }
                Token::Arrow => Symbol::new("->"),
                Token::Pipe => Symbol::new("|"),
                Token::Word(_) | Token::Escaped(_) => Symbol::new("SYM"),
                Token::Eof => break,
            };
            current.get_or_insert_with(|| (line, Vec::new())).1.push(sym);
        }
        lines.extend(current);

        let newline = Symbol::new("NL");
        let mapped: Vec<Symbol> = lines
            .iter()
            .enumerate()
            .flat_map(|(k, (_, syms))| {
                let sep = (k > 0).then(|| newline.clone());
                sep.into_iter().chain(syms.iter().cloned())
            })
            .collect();

        if mapped.is_empty() || cyk::recognize(&meta, &mapped) {
            return Ok(());
        }

        // Blame the first line that is not a production on its own
        let (line, syms) = lines
            .iter()
            .find(|(_, syms)| !cyk::recognize(&meta, syms))
            .or_else(|| lines.first())
            .cloned()
            .unwrap_or_default();
        Err(GrammarError::Malformed {
            line,
            found: crate::symbol::render(&syms),
        })
    }

    pub fn productions(&self) -> &BTreeSet<Production> {
        &self.productions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Production> {
        self.productions.iter()
    }

    pub fn len(&self) -> usize {
        self.productions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.productions.is_empty()
    }

    pub fn contains(&self, production: &Production) -> bool {
        self.productions.contains(production)
    }

    pub fn insert(&mut self, production: Production) -> bool {
        self.productions.insert(production)
    }

    pub fn remove(&mut self, production: &Production) -> bool {
        self.productions.remove(production)
    }

    /// Keep only the productions matching `keep`.
    pub fn retain(&mut self, keep: impl FnMut(&Production) -> bool) {
        self.productions.retain(keep);
    }

    /// Symbols appearing on some left-hand side.
    pub fn nonterminals(&self) -> BTreeSet<Symbol> {
        self.productions.iter().map(|p| p.lhs.clone()).collect()
    }

    /// All symbols mentioned anywhere.
    pub fn symbols(&self) -> BTreeSet<Symbol> {
        self.productions
            .iter()
            .flat_map(|p| std::iter::once(&p.lhs).chain(p.rhs.iter()))
            .cloned()
            .collect()
    }

    /// Symbols that never appear on a left-hand side.
    pub fn terminals(&self) -> BTreeSet<Symbol> {
        let nts = self.nonterminals();
        self.productions
            .iter()
            .flat_map(|p| p.rhs.iter())
            .filter(|s| !nts.contains(s))
            .cloned()
            .collect()
    }

    /// Productions with the given left-hand side.
    pub fn productions_of<'a>(&'a self, lhs: &'a Symbol) -> impl Iterator<Item = &'a Production> {
        self.productions.iter().filter(move |p| &p.lhs == lhs)
    }

    /// Productions of the form `A -> a`.
    pub fn terminal_unit_productions(&self) -> Vec<&Production> {
        let nts = self.nonterminals();
        self.productions
            .iter()
            .filter(|p| p.is_unit() && !nts.contains(&p.rhs[0]))
            .collect()
    }

    /// Every production that is not a terminal unit production.
    pub fn nonterminal_productions(&self) -> Vec<&Production> {
        let nts = self.nonterminals();
        self.productions
            .iter()
            .filter(|p| !(p.is_unit() && !nts.contains(&p.rhs[0])))
            .collect()
    }

    /// Nonterminals reachable from `from`, including itself.
    pub fn reachable_from(&self, from: &Symbol) -> BTreeSet<Symbol> {
        analysis::reachable(self, std::iter::once(from.clone()))
    }

    /// Add a stub production `A -> <A>` for every user nonterminal `A`.
    pub fn with_stubs(&self) -> Self {
        let stubs: Vec<Production> = self
            .nonterminals()
            .into_iter()
            .filter(|nt| matches!(nt, Symbol::Original(_)))
            .map(|nt| Production::unit(nt.clone(), Symbol::stub(&nt)))
            .collect();
        let mut out = self.clone();
        out.productions.extend(stubs);
        out
    }

    /// Drop every production mentioning a stub.
    pub fn without_stubs(&self) -> Self {
        self.filtered(|p| !p.rhs.iter().any(Symbol::is_stub))
    }

    /// Drop every production mentioning `ε`.
    pub fn without_epsilon(&self) -> Self {
        self.filtered(|p| !p.rhs.iter().any(Symbol::is_epsilon))
    }

    /// The grammar restricted to strings over `terminals`.
    ///
    /// `START` is added first when missing, so every nonterminal stays a
    /// root candidate.
    pub fn subgrammar(&self, terminals: &BTreeSet<Symbol>) -> Self {
        let rooted = normalize::add_start(self);
        let nts = rooted.nonterminals();
        let kept = rooted.filtered(|p| {
            p.rhs
                .iter()
                .all(|s| nts.contains(s) || terminals.contains(s))
        });
        normalize::remove_useless_among(&kept, &nts)
    }

    fn filtered(&self, keep: impl Fn(&Production) -> bool) -> Self {
        Cfg {
            productions: self.productions.iter().filter(|p| keep(p)).cloned().collect(),
        }
    }
}

impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in &self.productions {
            writeln!(f, "{}", p)?;
        }
        Ok(())
    }
}

impl FromIterator<Production> for Cfg {
    fn from_iter<I: IntoIterator<Item = Production>>(iter: I) -> Self {
        Cfg::from_productions(iter)
    }
}

impl<'a> IntoIterator for &'a Cfg {
    type Item = &'a Production;
    type IntoIter = std::collections::btree_set::Iter<'a, Production>;

    fn into_iter(self) -> Self::IntoIter {
        self.productions.iter()
    }
}
