// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration of a prover session.

use crate::model::{ModelFormat, ModelParser, RawModels};
use serde::Serialize;
use smtlib::conf::{CvcConf, SolverCmd, SolverKind, Z3Conf};
use std::sync::Arc;

/// How polymorphic types are encoded, which determines the background
/// declarations every session starts with.
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
pub enum TypeEncoding {
    #[default]
    Predicates,
    Arguments,
    Monomorphic,
}

/// Options of a [`Session`](crate::session::Session).
#[derive(Debug, Clone)]
pub struct ProverOptions {
    /// Which solver to drive
    pub solver: SolverKind,
    /// Path to the solver binary; defaults to `z3` or `cvc4` on the `PATH`
    pub prover_path: Option<String>,
    /// Extra `set-option`s for the prelude, by name (without the colon)
    pub smt_options: Vec<(String, String)>,
    /// `set-logic` argument
    pub logic: Option<String>,
    /// Per-query time limit
    pub time_limit_ms: Option<usize>,
    /// Random seed passed to the solver
    pub seed: Option<usize>,
    /// Fetch a model for every failing check
    pub expect_model: bool,
    /// Find failing paths with `(labels)` rather than by walking `ControlFlow`
    pub use_labels: bool,
    /// When blocking a failing path, also block its positive labels
    pub multi_traces: bool,
    /// How many counterexamples to look for per check (at least 1)
    pub error_limit: usize,
    /// Restart the solver after every check
    pub restart_per_vc: bool,
    /// Transcript file name; `@PROC@` is replaced by the name of the check
    pub log_filename: Option<String>,
    /// Start a new transcript for every check
    pub separate_log_files: bool,
    /// Declare and assert the `tickleBool` helper
    pub use_tickle_bool: bool,
    /// Enable `(get-unsat-core)`
    pub produce_unsat_cores: bool,
    /// Type encoding used by the translator
    pub type_encoding: TypeEncoding,
    /// Reconstruct fixed-point solutions into the problem's nodes
    pub print_fixed_point: bool,
    /// File (without its `.tmp` suffix) holding conjectures written by the
    /// solver during a fixed-point query
    pub print_conjectures: Option<String>,
    /// Bound on recursion depth for fixed-point queries (0 for none)
    pub recursion_bound: usize,
    /// Stratified inlining level for fixed-point queries (0 for none)
    pub stratified_inlining: usize,
    /// Z3 models are requested in SMT-LIB2 syntax
    pub smt_output_format: bool,
    /// Parses the models returned for failing checks
    pub model_parser: Arc<dyn ModelParser>,
}

impl Default for ProverOptions {
    fn default() -> Self {
        Self {
            solver: SolverKind::Z3,
            prover_path: None,
            smt_options: vec![],
            logic: None,
            time_limit_ms: None,
            seed: None,
            expect_model: false,
            use_labels: true,
            multi_traces: false,
            error_limit: 5,
            restart_per_vc: false,
            log_filename: None,
            separate_log_files: false,
            use_tickle_bool: false,
            produce_unsat_cores: false,
            type_encoding: TypeEncoding::default(),
            print_fixed_point: false,
            print_conjectures: None,
            recursion_bound: 0,
            stratified_inlining: 0,
            smt_output_format: false,
            model_parser: Arc::new(RawModels),
        }
    }
}

impl ProverOptions {
    /// Options for driving `solver` with everything else at its default.
    pub fn new(solver: SolverKind) -> Self {
        Self {
            solver,
            ..Self::default()
        }
    }

    /// Add an SMT option, replacing an earlier value for the same name.
    pub fn smt_option(&mut self, name: &str, value: &str) -> &mut Self {
        self.smt_options.retain(|(n, _)| n != name);
        self.smt_options.push((name.to_string(), value.to_string()));
        return self;
    }

    /// Set the per-query time limit.
    pub fn time_limit_ms(&mut self, ms: Option<usize>) -> &mut Self {
        self.time_limit_ms = ms;
        return self;
    }

    /// Set the transcript file name.
    pub fn log_filename(&mut self, name: &str) -> &mut Self {
        self.log_filename = Some(name.to_string());
        return self;
    }

    /// Whether the prelude turns on model production.
    pub fn produce_models(&self) -> bool {
        self.expect_model || !self.use_labels
    }

    /// The label-blocking budget, never less than one check.
    pub fn error_budget(&self) -> usize {
        self.error_limit.max(1)
    }

    /// The syntax models come back in.
    pub fn model_format(&self) -> ModelFormat {
        match self.solver {
            SolverKind::Z3 if !self.smt_output_format => ModelFormat::Native,
            _ => ModelFormat::SmtLib2,
        }
    }

    /// The command that launches the solver. Its `options` are the full list
    /// of options for the prelude: those implied by the time limit and seed,
    /// then [`ProverOptions::smt_options`].
    pub fn solver_cmd(&self) -> SolverCmd {
        let mut cmd = match self.solver {
            SolverKind::Z3 => {
                let mut conf = Z3Conf::new(self.prover_path.as_deref().unwrap_or("z3"));
                conf.timeout_ms(self.time_limit_ms);
                if let Some(seed) = self.seed {
                    conf.seed(seed);
                }
                conf.done()
            }
            SolverKind::Cvc4 => {
                let mut conf = CvcConf::new_cvc4(self.prover_path.as_deref().unwrap_or("cvc4"));
                if self.time_limit_ms.is_some() {
                    conf.timeout_ms(self.time_limit_ms);
                }
                if let Some(seed) = self.seed {
                    conf.seed(seed);
                }
                conf.done()
            }
        };
        for (name, value) in &self.smt_options {
            cmd.option(name, value);
        }
        cmd
    }
}
