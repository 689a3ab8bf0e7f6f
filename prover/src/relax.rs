// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Checks under assumptions: unsat cores of named assumptions, and the
//! relaxation search for which soft assumptions have to be given up.

use crate::{
    error::ProverError,
    expr::Expr,
    outcome::{ErrorHandler, Outcome},
    session::Session,
    translate::{Polarity, VcTranslator},
};
use smtlib::proc::Launcher;
use std::collections::HashMap;

impl<L: Launcher, T: VcTranslator> Session<L, T> {
    /// Check `assumptions` together with the current context. If they are
    /// inconsistent (`Valid`), also return the indices of an unsat core.
    ///
    /// Requires a session created with
    /// [`ProverOptions::produce_unsat_cores`](crate::options::ProverOptions).
    pub fn check_assumptions(
        &mut self,
        assumptions: &[Expr],
        handler: &mut dyn ErrorHandler,
    ) -> Result<(Outcome, Vec<usize>), ProverError> {
        if !self.options.produce_unsat_cores {
            return Err(ProverError::UnsatCoresDisabled);
        }
        self.mark_check();
        self.prepare_common();
        self.push();
        let mut names = HashMap::new();
        for (i, a) in assumptions.iter().enumerate() {
            let name = format!("a{}", self.name_counter);
            self.name_counter += 1;
            let s = self.linearize(a, Polarity::Positive);
            self.assert_axioms();
            self.send_local(&format!("(assert (! {s} :named {name}))"));
            names.insert(name, i);
        }
        self.check();

        let outcome = self.check_outcome_core(handler);
        if outcome != Outcome::Valid {
            self.pop();
            return Ok((outcome, vec![]));
        }

        self.send_local("(get-unsat-core)");
        let core: Result<Vec<usize>, ProverError> = match self.read_response() {
            None => Err(ProverError::NoResponse),
            Some(resp) => {
                // (a0 a2) is read as a0 applied to a2
                let head = resp.name();
                let members = (!head.is_empty())
                    .then(|| head.into_owned())
                    .into_iter()
                    .chain(resp.args().iter().map(|a| a.name().into_owned()));
                members
                    .map(|n| {
                        names.get(&n).copied().ok_or_else(|| {
                            ProverError::Unexpected(format!("unknown name in unsat core: {n}"))
                        })
                    })
                    .collect()
            }
        };
        if let Err(err) = &core {
            self.protocol_error(&err.to_string());
        }
        self.flush_transcript();
        self.pop();
        Ok((outcome, core?))
    }

    /// Find soft assumptions whose removal makes `hard` and `soft` jointly
    /// satisfiable.
    ///
    /// If `hard` alone is not satisfiable (the check does not come back
    /// `Invalid`), its outcome is returned with no indices. Otherwise, while
    /// the assumptions are inconsistent, every soft assumption `s_i` is
    /// relaxed to `(or s_i (= relax_k i))` with a fresh `relax_k`, so that
    /// each round can excuse one more assumption. When a round is no longer
    /// inconsistent, the values of the `relax_k` name the excused indices.
    ///
    /// This does not terminate if the solver keeps answering `unsat` however
    /// many assumptions are excused.
    pub fn check_soft_assumptions(
        &mut self,
        hard: &[Expr],
        soft: &[Expr],
        handler: &mut dyn ErrorHandler,
    ) -> Result<(Outcome, Vec<usize>), ProverError> {
        let hard = hard
            .iter()
            .map(|a| self.linearize(a, Polarity::Positive))
            .collect::<Vec<_>>();
        let mut current = soft
            .iter()
            .map(|a| self.linearize(a, Polarity::Positive))
            .collect::<Vec<_>>();

        self.mark_check();
        self.prepare_common();
        self.push();
        self.assert_axioms();
        for a in &hard {
            self.send_local(&format!("(assert {a})"));
        }
        self.check();
        let outcome = self.get_response(handler);
        if outcome != Outcome::Invalid {
            self.pop();
            return Ok((outcome, vec![]));
        }

        let mut relax_vars = vec![];
        let outcome = loop {
            self.push();
            for a in &current {
                self.send_local(&format!("(assert {a})"));
            }
            self.check();
            let outcome = self.check_outcome_core(handler);
            if outcome != Outcome::Valid {
                break outcome;
            }
            self.pop();

            let var = format!("relax_{}", relax_vars.len());
            log::debug!("soft assumptions inconsistent, relaxing with {var}");
            self.send_local(&format!("(declare-fun {var} () Int)"));
            current = current
                .iter()
                .enumerate()
                .map(|(i, a)| format!("(or {a} (= {var} {i}))"))
                .collect();
            relax_vars.push(var);
        };

        let mut unsatisfied = vec![];
        if outcome == Outcome::Invalid {
            for var in &relax_vars {
                self.send_local(&format!("(get-value ({var}))"));
                self.flush_transcript();
                match self.read_response().as_ref().and_then(relaxed_index) {
                    Some(i) => unsatisfied.push(i),
                    None => break,
                }
            }
        }
        self.pop();
        self.pop();
        Ok((outcome, unsatisfied))
    }
}

/// The value in a `((relax_k v))` reply, if it is an index.
fn relaxed_index(resp: &smtlib::sexp::Sexp) -> Option<usize> {
    let [entry] = resp.args() else { return None };
    if !resp.name().is_empty() || entry.name().is_empty() {
        return None;
    }
    let [v] = entry.args() else { return None };
    if v.arg_count() != 0 {
        return None;
    }
    v.name().parse().ok()
}

#[cfg(test)]
mod tests {
    use crate::{
        error::ProverError,
        expr::{Expr, Type},
        options::ProverOptions,
        outcome::{Outcome, Recorder},
        services::Services,
        session::Session,
        testing::Script,
        translate::SmtTranslator,
    };

    fn session(opts: ProverOptions, script: &Script) -> Session<Script> {
        Session::new(opts, script.clone(), SmtTranslator::new(), Services::new())
    }

    #[test_log::test]
    fn test_relaxation_finds_both_indices() {
        let script = Script::new();
        script
            .on("(check-sat)", &["sat", "unsat", "unsat", "sat"])
            .on("(labels)", &["(labels)"])
            .on("(get-value (relax_0))", &["((relax_0 0))"])
            .on("(get-value (relax_1))", &["((relax_1 1))"]);
        let mut s = session(ProverOptions::default(), &script);
        let mut handler = Recorder::new();

        let (outcome, excused) = s
            .check_soft_assumptions(
                &[Expr::Lit(true)],
                &[Expr::Lit(false), Expr::Lit(false)],
                &mut handler,
            )
            .unwrap();
        assert_eq!(outcome, Outcome::Invalid);
        assert_eq!(excused, vec![0, 1]);
        assert_eq!(s.depth(), 0);

        let sent = script.sent();
        assert!(sent.contains(&"(declare-fun relax_1 () Int)".to_string()));
        assert!(sent.contains(
            &"(assert (or (or false (= relax_0 1)) (= relax_1 1)))".to_string()
        ));
    }

    #[test]
    fn test_relaxation_stops_on_unsat_hard() {
        let script = Script::new();
        script.on("(check-sat)", &["unsat"]);
        let mut s = session(ProverOptions::default(), &script);
        let mut handler = Recorder::new();
        let (outcome, excused) = s
            .check_soft_assumptions(&[Expr::Lit(false)], &[Expr::Lit(true)], &mut handler)
            .unwrap();
        assert_eq!(outcome, Outcome::Valid);
        assert!(excused.is_empty());
        assert_eq!(s.depth(), 0);
    }

    #[test]
    fn test_relaxation_bad_value_stops_read_back() {
        let script = Script::new();
        script
            .on("(check-sat)", &["sat", "unsat", "sat"])
            .on("(labels)", &["(labels)"])
            .on("(get-value (relax_0))", &["((relax_0 x))"]);
        let mut s = session(ProverOptions::default(), &script);
        let mut handler = Recorder::new();
        let (outcome, excused) = s
            .check_soft_assumptions(&[], &[Expr::Lit(false)], &mut handler)
            .unwrap();
        assert_eq!(outcome, Outcome::Invalid);
        assert!(excused.is_empty());
        assert_eq!(s.depth(), 0);
    }

    #[test]
    fn test_unsat_core() {
        let script = Script::new();
        script
            .on("(check-sat)", &["unsat"])
            .on("(get-unsat-core)", &["(a0 a2)", "(a3)"]);
        let mut opts = ProverOptions::default();
        opts.produce_unsat_cores = true;
        let mut s = session(opts, &script);
        let mut handler = Recorder::new();
        let p = Expr::var("p", Type::Bool);
        let assumptions = [p.clone(), Expr::Lit(true), Expr::not(p)];

        let (outcome, core) = s.check_assumptions(&assumptions, &mut handler).unwrap();
        assert_eq!(outcome, Outcome::Valid);
        assert_eq!(core, vec![0, 2]);
        assert!(script
            .sent()
            .contains(&"(assert (! (not p) :named a2))".to_string()));
        assert_eq!(s.depth(), 0);

        // names are never reused within a session
        let (_, core) = s.check_assumptions(&assumptions, &mut handler).unwrap();
        assert_eq!(core, vec![0]);
    }

    #[test]
    fn test_unsat_core_requires_option() {
        let script = Script::new();
        let mut s = session(ProverOptions::default(), &script);
        let mut handler = Recorder::new();
        assert!(matches!(
            s.check_assumptions(&[Expr::Lit(true)], &mut handler),
            Err(ProverError::UnsatCoresDisabled)
        ));
    }
}
