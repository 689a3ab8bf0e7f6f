// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Relational fixed-point queries.
//!
//! The problem is sent as one `(rule ...)` per edge followed by a `(query ...)`
//! that asks the solver's fixed-point engine for a certificate. A failing query
//! is answered with `sat`, a `(derivation ...)` and a `(model ...)`; a
//! successful one with `unsat` and a `(fixedpoint ...)` solution.

use crate::{
    derivation::{build_derivation, Derivation, Rpfp},
    error::ProverError,
    model::{model_document, model_text, Model},
    outcome::{ErrorHandler, Outcome},
    reconstruct::Reconstructor,
    session::Session,
    translate::{quote_id, Polarity, VcTranslator},
};
use smtlib::{
    proc::Launcher,
    sexp::{parse_many, Sexp},
};
use std::fs;

/// The result of a fixed-point query.
#[derive(Debug, Clone)]
pub struct RpfpResult {
    #[allow(missing_docs)]
    pub outcome: Outcome,
    /// The counterexample of an `Invalid` query
    pub cex: Option<Derivation>,
}

impl<L: Launcher, T: VcTranslator> Session<L, T> {
    /// Check the fixed-point problem `rpfp`, named `name`.
    ///
    /// On `Invalid` the result carries the counterexample derivation. On
    /// `Valid` the solution is recorded as the annotation of each node if
    /// [`ProverOptions::print_fixed_point`](crate::options::ProverOptions) is
    /// set. Conjectures are read afterwards if a conjecture file is
    /// configured.
    ///
    /// A reply that cannot be interpreted is recorded in the diagnostics and
    /// returned as an error; the session's scopes are restored either way.
    pub fn check_rpfp(
        &mut self,
        name: &str,
        rpfp: &mut Rpfp,
        handler: &mut dyn ErrorHandler,
    ) -> Result<RpfpResult, ProverError> {
        if self.options.separate_log_files {
            self.close_transcript();
        }
        self.open_transcript(name);
        self.mark_check();

        self.prepare_common();
        self.possibly_restart();

        self.push();
        self.send_local("(fixedpoint-push)");
        for node in &rpfp.nodes {
            self.translator.register_relation(&node.relation);
        }

        let rules = rpfp
            .edges
            .iter()
            .map(|e| format!("(rule {}\n)", self.linearize(&e.rule, Polarity::Positive)))
            .collect::<Vec<_>>();
        let mut query = format!(
            "(query {}\n   :engine duality\n  :print-certificate true\n",
            self.linearize(&rpfp.query, Polarity::Positive)
        );
        if self.options.stratified_inlining != 0 {
            query.push_str("    :stratified-inlining true\n");
        }
        if self.options.recursion_bound > 0 {
            query.push_str(&format!(
                "    :recursion-bound {}\n",
                self.options.recursion_bound
            ));
        }
        query.push(')');
        self.assert_axioms();

        self.send_local(&format!("(set-info :vc-id {})", quote_id(name)));
        for rule in &rules {
            self.send_local(rule);
        }
        self.flush_transcript();

        if self.conn.is_some() {
            // flush any errors
            self.ping_pong();
        }

        self.send_local(&query);
        self.flush_transcript();

        let mut result = RpfpResult {
            outcome: Outcome::Undetermined,
            cex: None,
        };
        let read = if self.conn.is_some() {
            self.read_rpfp_replies(rpfp, &mut result)
        } else {
            Ok(())
        };

        self.send_local("(fixedpoint-pop)");
        self.pop();
        self.axioms_are_setup = false;
        self.flush_warnings(handler);
        read?;

        if let Some(path) = self.options.print_conjectures.clone() {
            self.read_conjectures(rpfp, &path)?;
        }
        log::debug!("fixed-point outcome for {name}: {:?}", result.outcome);
        Ok(result)
    }

    fn read_rpfp_replies(
        &mut self,
        rpfp: &mut Rpfp,
        result: &mut RpfpResult,
    ) -> Result<(), ProverError> {
        let mut replies = self.replies_until_pong().into_iter();
        let first = replies.next();

        let errors = self.diagnostics.errors_since(self.check_mark);
        result.outcome = if !errors.is_empty() {
            if errors.iter().any(|e| e.contains("canceled")) {
                Outcome::TimeOut
            } else {
                Outcome::Undetermined
            }
        } else {
            match first.as_ref().map(|r| r.name()).as_deref() {
                Some("unsat") => Outcome::Valid,
                Some("sat" | "unknown") => Outcome::Invalid,
                // end-of-stream was recorded while reading
                None => Outcome::Undetermined,
                Some(_) => {
                    let err = self.unexpected(first.as_ref());
                    self.protocol_error(&err.to_string());
                    Outcome::Undetermined
                }
            }
        };

        match result.outcome {
            Outcome::Invalid => {
                let resp = replies.next();
                let mut cex = match &resp {
                    Some(r) if r.name() == "derivation" => {
                        build_derivation(rpfp, r).map_err(|e| self.record(e.into()))?
                    }
                    _ => return Err(self.record(self.unexpected(resp.as_ref()))),
                };
                let resp = replies.next();
                match &resp {
                    Some(r) if r.name() == "model" => cex.background_model = self.sexp_to_model(r),
                    _ => {
                        let err = self.unexpected(resp.as_ref());
                        self.protocol_error(&err.to_string());
                    }
                }
                result.cex = Some(cex);
            }
            Outcome::Valid => {
                let resp = replies.next();
                match &resp {
                    Some(r) if r.name() == "fixedpoint" => {
                        if self.options.print_fixed_point {
                            let applied = {
                                let reconstructor =
                                    Reconstructor::new(self.translator.declarations());
                                rpfp.apply_solution(r, &reconstructor)
                            };
                            applied.map_err(|e| self.record(e.into()))?;
                        }
                    }
                    _ => return Err(self.record(self.unexpected(resp.as_ref()))),
                }
            }
            _ => {}
        }
        for extra in replies {
            log::debug!("ignoring prover response after fixed-point query: {extra}");
        }
        Ok(())
    }

    fn unexpected(&self, resp: Option<&Sexp>) -> ProverError {
        match resp {
            Some(resp) => ProverError::Unexpected(resp.to_string()),
            None => ProverError::NoResponse,
        }
    }

    /// Record `err` in the diagnostics and hand it back.
    fn record(&self, err: ProverError) -> ProverError {
        self.protocol_error(&err.to_string());
        err
    }

    fn sexp_to_model(&self, resp: &Sexp) -> Option<Model> {
        let parsed = model_text(resp).map(|body| {
            self.options
                .model_parser
                .parse(&model_document(&body), self.options.model_format())
        });
        match parsed {
            Some(Ok(mut models)) if !models.is_empty() => Some(models.swap_remove(0)),
            _ => {
                self.protocol_error(&format!("no model from prover: {resp}"));
                None
            }
        }
    }

    /// Add the conjectures the solver wrote to `path` with a `.tmp` suffix.
    pub fn read_conjectures(&mut self, rpfp: &mut Rpfp, path: &str) -> Result<(), ProverError> {
        let file = format!("{path}.tmp");
        let text = fs::read_to_string(&file).map_err(|err| {
            self.record(ProverError::Conjectures(format!(
                "no conjecture file from prover: {file}: {err}"
            )))
        })?;
        let defs = parse_many(&text)
            .map_err(|err| self.record(ProverError::Conjectures(err.to_string())))?
            .into_iter()
            .filter(|s| !matches!(s, Sexp::Comment(_)))
            .collect::<Vec<_>>();
        let reconstructor = Reconstructor::new(self.translator.declarations());
        rpfp.add_conjectures(&defs, &reconstructor)
            .map_err(|e| ProverError::Conjectures(e.to_string()))
            .map_err(|e| self.record(e))
    }
}
