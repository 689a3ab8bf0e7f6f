// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Errors in interpreting solver output.
//!
//! None of these leave the session unusable: they abort only the
//! reconstruction or query in progress.

use smtlib::proc::SolverError;
use thiserror::Error;

/// Failure to turn a solver s-expression back into an [`Expr`](crate::expr::Expr).
#[allow(missing_docs)]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconstructError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("unknown operator: {0}")]
    UnknownOperator(String),
    #[error("bad quantifier syntax: {0}")]
    BadQuantifier(String),
    #[error("bad let syntax: {0}")]
    BadLet(String),
    #[error("bad type: {0}")]
    UnsupportedSort(String),
    #[error("`{op}` expects {expected} arguments but got {got}")]
    Arity {
        op: String,
        expected: usize,
        got: usize,
    },
    #[error("bad expression: `{0}` with no arguments")]
    EmptyFold(String),
    #[error("bad numeral: {0}")]
    BadNumeral(String),
    #[error("expected define-fun but got: {0}")]
    ExpectedDefine(String),
}

/// Failure to interpret a derivation, fixed-point solution, or conjecture.
#[allow(missing_docs)]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    #[error("bad derivation line from prover: {0}")]
    BadLine(String),
    #[error("unknown predicate from prover: {0}")]
    UnknownPredicate(String),
    #[error("unknown reference from prover: {0}")]
    UnknownReference(String),
    #[error("step {0} is defined twice in derivation")]
    DuplicateStep(String),
    #[error("bad references from prover: {0}")]
    BadReferences(String),
    #[error("bad rule name from prover: {0}")]
    BadRule(String),
    #[error("bad labels from prover: {0}")]
    BadLabels(String),
    #[error("bad subst from prover: {0}")]
    BadSubst(String),
    #[error("bad equation from prover: {0}")]
    BadEquation(String),
    #[error("empty derivation from prover: {0}")]
    Empty(String),
    #[error(transparent)]
    Reconstruct(#[from] ReconstructError),
}

/// Errors surfaced by prover session operations.
#[derive(Error, Debug)]
pub enum ProverError {
    /// The solver process could not be used
    #[error(transparent)]
    Solver(#[from] SolverError),
    /// The solver gave no reply (it crashed or was killed)
    #[error("prover did not respond")]
    NoResponse,
    /// The reply did not have the expected shape
    #[error("unexpected prover response: {0}")]
    Unexpected(String),
    /// `get-value` produced something that is not a value
    #[error("could not evaluate expression: {0}")]
    Evaluation(String),
    /// Unsat cores were requested from a session not set up to produce them
    #[error("prover not set up for computing unsat cores")]
    UnsatCoresDisabled,
    /// The conjectures file could not be read or interpreted
    #[error("error in conjecture file from prover: {0}")]
    Conjectures(String),
    #[allow(missing_docs)]
    #[error(transparent)]
    Derivation(#[from] DerivationError),
    #[allow(missing_docs)]
    #[error(transparent)]
    Reconstruct(#[from] ReconstructError),
}
