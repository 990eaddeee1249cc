//! Python bindings via PyO3.

use crate::compiled::CompiledGrammar;
use crate::cyk;
use crate::grammar::Cfg;
use crate::repair::{self, Mutation, RepairConfig};
use crate::symbol::{render, tokenize};
use crate::synthesis::{self, SynthesisConfig};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList, PyTuple};
use std::sync::Arc;

/// Python wrapper for a compiled grammar.
#[pyclass(name = "Grammar")]
#[derive(Clone)]
struct PyGrammar {
    inner: Arc<CompiledGrammar>,
}

#[pymethods]
impl PyGrammar {
    /// Parse a grammar source, optionally checking it against the
    /// grammar of grammars first.
    #[new]
    #[pyo3(signature = (source, validate = false))]
    fn new(source: &str, validate: bool) -> PyResult<Self> {
        let cfg = if validate {
            Cfg::parse_validated(source)
        } else {
            Cfg::parse(source)
        }
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(PyGrammar {
            inner: Arc::new(CompiledGrammar::new(&cfg)),
        })
    }

    /// Whether the whitespace-separated `text` is in the language.
    fn recognize(&self, text: &str) -> bool {
        cyk::recognize(&self.inner, &tokenize(text))
    }

    /// The parse tree of `text` as nested `(label, children...)` tuples,
    /// or `None`.
    fn parse(&self, py: Python, text: &str) -> Option<PyObject> {
        cyk::parse(&self.inner, &tokenize(text)).map(|tree| tree_to_py(py, &tree))
    }

    /// The parse tree of `text`, pretty-printed.
    fn parse_tree(&self, text: &str) -> Option<String> {
        cyk::parse(&self.inner, &tokenize(text)).map(|tree| tree.pretty())
    }

    /// Completions of a sketch with `_` holes.
    #[pyo3(signature = (sketch, max_results = None, epsilon_holes = false))]
    fn complete(&self, sketch: &str, max_results: Option<usize>, epsilon_holes: bool) -> PyResult<Vec<String>> {
        let mut config = SynthesisConfig::new().with_epsilon_holes(epsilon_holes);
        config.max_results = max_results;
        synthesis::complete(&self.inner, sketch, config).map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    /// Ranked repairs of `text` as `(repair, distance)` pairs.
    #[pyo3(signature = (text, edits = 2, max_results = 10))]
    fn repair(&self, py: Python, text: &str, edits: usize, max_results: usize) -> PyResult<PyObject> {
        let config = RepairConfig::new().with_edits(edits).with_max_results(max_results);
        let mutations = config.mutations();
        let refs: Vec<&dyn Mutation> = mutations.iter().map(|m| m.as_ref()).collect();
        let repairs = repair::repair(&tokenize(text), &self.inner, &refs, &config)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        let items: Vec<PyObject> = repairs
            .iter()
            .map(|r| PyTuple::new(py, vec![r.to_string().into_py(py), r.distance.into_py(py)]).into_py(py))
            .collect();
        Ok(PyList::new(py, items).into_py(py))
    }

    /// Grammar statistics.
    fn stats(&self, py: Python) -> PyResult<PyObject> {
        let dict = PyDict::new(py);
        dict.set_item("productions", self.inner.source().len())?;
        dict.set_item("normalized_productions", self.inner.cfg().len())?;
        dict.set_item("nonterminals", self.inner.num_nonterminals())?;
        dict.set_item("terminals", self.inner.terminals().len())?;
        Ok(dict.into_py(py))
    }

    fn __repr__(&self) -> String {
        format!("Grammar({} productions)", self.inner.source().len())
    }

    fn __str__(&self) -> String {
        self.inner.source().to_string()
    }
}

fn tree_to_py(py: Python, tree: &crate::tree::Tree) -> PyObject {
    let label = tree.root.to_string().into_py(py);
    let mut items: Vec<PyObject> = vec![label];
    match &tree.terminal {
        Some(t) if tree.is_leaf() => items.push(render(std::slice::from_ref(t)).into_py(py)),
        _ => items.extend(tree.children.iter().map(|c| tree_to_py(py, c))),
    }
    PyTuple::new(py, items).into_py(py)
}

/// Repair `text` under the grammar source `grammar`.
#[pyfunction]
#[pyo3(signature = (text, grammar, edits = 2, max_results = 10))]
fn repair_text(text: &str, grammar: &str, edits: usize, max_results: usize) -> PyResult<Vec<String>> {
    let grammar = CompiledGrammar::from_source(grammar).map_err(|e| PyValueError::new_err(e.to_string()))?;
    let config = RepairConfig::new().with_edits(edits).with_max_results(max_results);
    let mutations = config.mutations();
    let refs: Vec<&dyn Mutation> = mutations.iter().map(|m| m.as_ref()).collect();
    let repairs = repair::repair(&tokenize(text), &grammar, &refs, &config)
        .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
    Ok(repairs.iter().map(|r| r.to_string()).collect())
}

/// Python module definition.
#[pymodule]
fn valiant_cfg(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyGrammar>()?;
    m.add_function(wrap_pyfunction!(repair_text, m)?)?;
    Ok(())
}
