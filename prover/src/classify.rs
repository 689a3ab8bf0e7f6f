// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Classifying the solver's answer to a query and retrieving the evidence
//! for a failed one.
//!
//! After `(check-sat)` the replies up to the pong decide the outcome:
//! `unsat` is `Valid`, and both `sat` and `unknown` are `Invalid`. An
//! `unknown` answer is refined with `(get-info :reason-unknown)`. For every
//! failing outcome the failing path is retrieved, either as the labels the
//! solver reports or by walking the `ControlFlow` function one step at a
//! time, and then blocked so that the next `(check-sat)` looks for a
//! different counterexample.

use crate::{
    model::{model_document, model_text, Model},
    outcome::{ErrorHandler, Outcome, Resource},
    session::Session,
    translate::{label_var, quote_id, VcTranslator},
};
use smtlib::proc::Launcher;

impl<L: Launcher, T: VcTranslator> Session<L, T> {
    /// Read and classify the replies to a `(check-sat)`.
    pub(crate) fn get_response(&mut self, handler: &mut dyn ErrorHandler) -> Outcome {
        let mut result = Outcome::Undetermined;
        let mut was_unknown = false;

        for resp in self.replies_until_pong() {
            match resp.name().as_ref() {
                "unsat" => result = Outcome::Valid,
                "sat" => result = Outcome::Invalid,
                "unknown" => {
                    result = Outcome::Invalid;
                    was_unknown = true;
                }
                _ => self.protocol_error(&format!("unexpected prover response: {resp}")),
            }
        }

        if was_unknown {
            self.send_local("(get-info :reason-unknown)");
            for resp in self.replies_until_pong() {
                match (resp.name().as_ref(), resp.args()) {
                    (":reason-unknown", [reason]) => match reason.name().as_ref() {
                        "memout" => {
                            handler.on_resource_exceeded(Resource::Memory);
                            result = Outcome::OutOfMemory;
                            self.needs_restart = true;
                        }
                        "timeout" | "canceled" => {
                            handler.on_resource_exceeded(Resource::Timeout);
                            result = Outcome::TimeOut;
                        }
                        _ => {}
                    },
                    _ => self.protocol_error(&format!(
                        "unexpected prover response (getting info about 'unknown' response): {resp}"
                    )),
                }
            }
        }

        if result == Outcome::Undetermined
            && self.diagnostics.any_error_since(self.check_mark, "canceled")
        {
            result = Outcome::TimeOut;
        }
        log::debug!("prover outcome: {result:?}");
        result
    }

    /// The labels of the failing path, with `|` quotes removed.
    pub(crate) fn get_labels_info(&mut self) -> Option<Vec<String>> {
        self.send_local("(labels)");
        let mut labels = None;
        for resp in self.replies_until_pong() {
            if labels.is_some() {
                self.protocol_error("expecting only one sequence of labels but got many");
            }
            if resp.name() == "labels" && resp.list().is_some() {
                labels = Some(
                    resp.args()
                        .iter()
                        .map(|l| l.name().replace('|', ""))
                        .collect(),
                );
            } else {
                self.protocol_error(&format!(
                    "unexpected prover response getting labels: {resp}"
                ));
            }
        }
        labels
    }

    /// Recover the failing path from the `ControlFlow` function: starting at
    /// block 0, ask for the successor of each block until the solver answers
    /// with a negated block, which ends the path.
    pub fn calculate_path(&mut self, control_flow: i64) -> Vec<String> {
        self.send_local(&format!("(get-value ((ControlFlow {control_flow} 0)))"));
        let mut path = vec![];
        while let Some(resp) = self.read_response() {
            // ((entry)) where entry is ((ControlFlow c b) v)
            let [entry] = resp.args() else { break };
            if !resp.name().is_empty() {
                break;
            }
            let [_, v] = entry.args() else { break };
            if !entry.name().is_empty() {
                break;
            }
            if v.name() == "-" && v.arg_count() == 1 {
                path.push(v.args()[0].name().into_owned());
                break;
            } else if v.arg_count() != 0 {
                break;
            }
            let v = v.name().into_owned();
            self.send_local(&format!("(get-value ((ControlFlow {control_flow} {v})))"));
            path.push(v);
        }
        path
    }

    /// Fetch the model for a failing check, if models are produced.
    pub(crate) fn get_error_model(&mut self) -> Option<Model> {
        if !self.options.produce_models() {
            return None;
        }
        self.send_local("(get-model)");
        let mut the_model = None;
        for resp in self.replies_until_pong() {
            if the_model.is_some() {
                self.protocol_error("expecting only one model but got many");
            }
            let Some(body) = model_text(&resp) else {
                self.protocol_error(&format!(
                    "unexpected prover response getting model: {resp}"
                ));
                continue;
            };
            let parsed = self
                .options
                .model_parser
                .parse(&model_document(&body), self.options.model_format());
            match parsed {
                Err(msg) => self.protocol_error(&format!("model parsing error: {msg}")),
                Ok(models) if models.is_empty() => {
                    self.protocol_error("could not parse any models")
                }
                Ok(mut models) if models.len() == 1 => the_model = models.pop(),
                Ok(_) => self.protocol_error("expecting only one model but got many"),
            }
        }
        the_model
    }

    /// Classify the reply to the current query and report counterexamples to
    /// `handler`, blocking each failing path and checking again until no new
    /// path is found or the error budget is spent.
    ///
    /// Returns the outcome of the first check.
    pub fn check_outcome_core(&mut self, handler: &mut dyn ErrorHandler) -> Outcome {
        if self.conn.is_none() {
            return Outcome::Undetermined;
        }
        self.flush_warnings(handler);

        let mut errors_left = self.options.error_budget();
        let mut global = Outcome::Undetermined;
        loop {
            errors_left -= 1;
            let mut path = None;

            let result = self.get_response(handler);
            if global == Outcome::Undetermined {
                global = result;
            }

            if result.has_evidence() {
                let reported = if self.options.use_labels {
                    let labels = self.get_labels_info();
                    let reported = labels
                        .iter()
                        .flatten()
                        .map(|l| l.replace(['@', '+'], ""))
                        .collect::<Vec<_>>();
                    path = labels;
                    reported
                } else {
                    let labels = self.calculate_path(handler.starting_proc_id());
                    path = Some(labels.clone());
                    labels
                };
                let model = if result == Outcome::Invalid {
                    self.get_error_model()
                } else {
                    None
                };
                handler.on_model(&reported, model, result);
            }
            self.flush_warnings(handler);

            let Some(path) = path.filter(|p| !p.is_empty()) else {
                break;
            };
            if errors_left == 0 {
                break;
            }

            if self.options.use_labels {
                let (neg, pos): (Vec<&String>, Vec<&String>) =
                    path.iter().partition(|l| l.starts_with('@'));
                let lbl = |s: &str| quote_id(&label_var(s));
                let pos = if self.options.multi_traces { pos } else { vec![] };
                let disjuncts = pos
                    .iter()
                    .map(|s| format!("(not {})", lbl(s)))
                    .chain(neg.iter().map(|s| lbl(s)))
                    .collect::<Vec<_>>();
                let block = match disjuncts.as_slice() {
                    [] => "false".to_string(),
                    [one] => one.clone(),
                    _ => format!("(or {})", disjuncts.join(" ")),
                };
                self.send_local(&format!("(assert {block})"));
            } else {
                let [.., source, target] = path.as_slice() else {
                    self.protocol_error(&format!(
                        "control-flow path too short to block: {path:?}"
                    ));
                    break;
                };
                self.send_local(&format!(
                    "(assert (not (= (ControlFlow 0 {source}) (- {target}))))"
                ));
            }
            self.send_local("(check-sat)");
        }

        self.flush_transcript();
        if self.options.restart_per_vc && self.conn.is_some() {
            self.needs_restart = true;
        }
        global
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        expr::{Expr, Type},
        options::ProverOptions,
        outcome::{Event, Outcome, Recorder, Resource},
        services::Services,
        session::Session,
        testing::Script,
        translate::SmtTranslator,
    };
    use smtlib::conf::SolverKind;

    fn check(opts: ProverOptions, script: &Script) -> (Outcome, Recorder, Session<Script>) {
        let mut s = Session::new(opts, script.clone(), SmtTranslator::new(), Services::new());
        let mut handler = Recorder::new();
        s.begin_check("vc", &Expr::var("p", Type::Bool));
        let outcome = s.check_outcome(&mut handler);
        (outcome, handler, s)
    }

    #[test]
    fn test_base_classification() {
        for (reply, expected) in [
            ("unsat", Outcome::Valid),
            ("sat", Outcome::Invalid),
            ("unknown", Outcome::Invalid),
        ] {
            let script = Script::new();
            script.on("(check-sat)", &[reply]).on("(labels)", &["(labels)"]);
            let (outcome, handler, s) = check(ProverOptions::default(), &script);
            assert_eq!(outcome, expected, "reply {reply}");
            assert!(s.diagnostics().errors().is_empty());
            let reported = handler.labels().len();
            assert_eq!(reported, usize::from(expected == Outcome::Invalid));
        }

        let script = Script::new();
        script.on("(check-sat)", &["success"]);
        let (outcome, _, s) = check(ProverOptions::default(), &script);
        assert_eq!(outcome, Outcome::Undetermined);
        assert_eq!(
            s.diagnostics().errors(),
            vec!["unexpected prover response: success"]
        );
    }

    #[test_log::test]
    fn test_reason_unknown() {
        let script = Script::new();
        script
            .on("(check-sat)", &["unknown"])
            .on("(get-info :reason-unknown)", &["(:reason-unknown memout)"])
            .on("(labels)", &["(labels)"]);
        let (outcome, handler, s) = check(ProverOptions::default(), &script);
        assert_eq!(outcome, Outcome::OutOfMemory);
        assert!(s.needs_restart());
        assert_eq!(handler.events[0], Event::ResourceExceeded(Resource::Memory));

        for reason in ["timeout", "\"canceled\""] {
            let script = Script::new();
            script
                .on("(check-sat)", &["unknown"])
                .on(
                    "(get-info :reason-unknown)",
                    &[format!("(:reason-unknown {reason})").as_str()],
                )
                .on("(labels)", &["(labels)"]);
            let (outcome, handler, s) = check(ProverOptions::default(), &script);
            assert_eq!(outcome, Outcome::TimeOut);
            assert!(!s.needs_restart());
            assert_eq!(handler.events[0], Event::ResourceExceeded(Resource::Timeout));
            // no model is fetched for a timeout
            assert!(matches!(
                &handler.events[1],
                Event::Model { model: None, outcome: Outcome::TimeOut, .. }
            ));
        }

        let script = Script::new();
        script
            .on("(check-sat)", &["unknown"])
            .on("(get-info :reason-unknown)", &["(:reason-unknown incomplete)"])
            .on("(labels)", &["(labels)"]);
        let (outcome, _, _) = check(ProverOptions::default(), &script);
        assert_eq!(outcome, Outcome::Invalid);
    }

    #[test]
    fn test_canceled_error_is_timeout() {
        let script = Script::new();
        script.on("(check-sat)", &["(error \"canceled\")"]);
        let (outcome, _, _) = check(ProverOptions::default(), &script);
        assert_eq!(outcome, Outcome::TimeOut);
    }

    #[test]
    fn test_warnings_reach_handler() {
        let script = Script::new();
        script.on(
            "(check-sat)",
            &["(error \"WARNING: pattern ignored\nWARNING: slow\") unsat"],
        );
        let (outcome, handler, s) = check(ProverOptions::default(), &script);
        assert_eq!(outcome, Outcome::Valid);
        assert!(s.diagnostics().errors().is_empty());
        assert_eq!(
            handler.events,
            vec![
                Event::Warning("pattern ignored".to_string()),
                Event::Warning("slow".to_string()),
            ]
        );
    }

    #[test]
    fn test_old_errors_are_forgotten() {
        let script = Script::new();
        script.on("(check-sat)", &["success", "unsat"]);
        let mut s = Session::new(
            ProverOptions::default(),
            script.clone(),
            SmtTranslator::new(),
            Services::new(),
        );
        let mut handler = Recorder::new();
        let p = Expr::var("p", Type::Bool);

        s.begin_check("first", &p);
        assert_eq!(s.check_outcome(&mut handler), Outcome::Undetermined);
        s.begin_check("second", &p);
        assert_eq!(s.check_outcome(&mut handler), Outcome::Valid);
        // kept until the check after the one it belongs to
        assert_eq!(s.diagnostics().errors().len(), 1);
        s.begin_check("third", &p);
        assert_eq!(s.check_outcome(&mut handler), Outcome::Valid);
        assert!(s.diagnostics().errors().is_empty());
    }

    #[test]
    fn test_dead_prover() {
        let script = Script::new();
        let mut s = Session::new(
            ProverOptions::default(),
            script.clone(),
            SmtTranslator::new(),
            Services::new(),
        );
        let mut handler = Recorder::new();
        s.begin_check("vc", &Expr::Lit(true));
        script.kill();
        assert_eq!(s.check_outcome(&mut handler), Outcome::Undetermined);
        assert_eq!(s.diagnostics().errors(), vec!["prover did not respond"]);
        assert!(s.needs_restart());
        assert!(handler.events.is_empty());
    }

    #[test]
    fn test_control_flow_path() {
        let script = Script::new();
        script
            .on("(check-sat)", &["sat"])
            .on("(get-value ((ControlFlow 7 0)))", &["(((ControlFlow 7 0) 5))"])
            .on("(get-value ((ControlFlow 7 5)))", &["(((ControlFlow 7 5) 7))"])
            .on("(get-value ((ControlFlow 7 7)))", &["(((ControlFlow 7 7) 12))"])
            .on("(get-value ((ControlFlow 7 12)))", &["(((ControlFlow 7 12) (- 3)))"]);
        let mut s = Session::new(
            ProverOptions::default(),
            script.clone(),
            SmtTranslator::new(),
            Services::new(),
        );
        assert_eq!(s.calculate_path(7), vec!["5", "7", "12", "3"]);

        let mut opts = ProverOptions::default();
        opts.use_labels = false;
        opts.error_limit = 2;
        let mut s = Session::new(opts, script.clone(), SmtTranslator::new(), Services::new());
        let mut handler = Recorder::new();
        handler.proc_id = 7;
        s.begin_check("vc", &Expr::Lit(true));
        assert_eq!(s.check_outcome(&mut handler), Outcome::Invalid);
        assert_eq!(
            handler.labels(),
            vec![vec!["5", "7", "12", "3"], vec!["5", "7", "12", "3"]]
        );
        assert!(script
            .sent()
            .contains(&"(assert (not (= (ControlFlow 0 12) (- 3))))".to_string()));
    }

    #[test]
    fn test_label_blocking() {
        let script = Script::new();
        script
            .on("(check-sat)", &["sat", "sat", "unsat"])
            .on("(labels)", &["(labels |@L1| +L2)", "(labels @L3)"])
            .on("(get-model)", &["(model (define-fun p () Bool false))"]);
        let mut opts = ProverOptions::default();
        opts.expect_model = true;
        opts.error_limit = 5;
        let (outcome, handler, _) = check(opts, &script);
        assert_eq!(outcome, Outcome::Invalid);
        assert_eq!(handler.labels(), vec![vec!["L1", "L2"], vec!["L3"]]);
        let Event::Model { model: Some(model), .. } = &handler.events[0] else {
            panic!("no model: {:?}", handler.events);
        };
        assert_eq!(model.text, "(define-fun p () Bool false)\n");

        let sent = script.sent();
        let blocks = sent
            .iter()
            .filter(|c| c.starts_with("(assert %lbl%"))
            .collect::<Vec<_>>();
        assert_eq!(blocks, vec!["(assert %lbl%@L1)", "(assert %lbl%@L3)"]);
    }

    #[test]
    fn test_multi_traces_and_budget() {
        let script = Script::new();
        script
            .on("(check-sat)", &["sat"])
            .on("(labels)", &["(labels @L1 +L2)"]);
        let mut opts = ProverOptions::new(SolverKind::Z3);
        opts.multi_traces = true;
        opts.error_limit = 2;
        let (outcome, handler, _) = check(opts, &script);
        assert_eq!(outcome, Outcome::Invalid);
        assert_eq!(handler.labels().len(), 2);
        let sent = script.sent();
        let blocks = sent
            .iter()
            .filter(|c| c.starts_with("(assert (or"))
            .collect::<Vec<_>>();
        assert_eq!(blocks, vec!["(assert (or (not %lbl%+L2) %lbl%@L1))"]);
    }
}
