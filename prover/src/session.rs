// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A stateful conversation with one solver process.
//!
//! Every command is either *common* or *local*. Common commands (options,
//! background declarations, declarations and axioms) are appended to a log
//! that is replayed in one batch whenever the solver is restarted; local
//! commands (scopes, assertions, queries) only matter to the query at hand.
//!
//! The session works without a process: if the solver cannot be launched,
//! commands are still logged, and [`Session::start`] replays them once a
//! launch succeeds.

use crate::{
    error::ProverError,
    expr::{Expr, Function, Op, Type, Var},
    options::ProverOptions,
    outcome::{ErrorHandler, Outcome},
    services::Services,
    translate::{quote_id, Polarity, SmtTranslator, VcTranslator},
};
use smtlib::{
    conf::{SolverCmd, SolverKind, Z3Conf},
    diag::Diagnostics,
    proc::{is_pong, Connection, Launcher},
    sexp::Sexp,
    transcript::{sanitize, Transcript},
};
use std::sync::Arc;

/// A value read back with `(get-value ...)`.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    /// Anything not of Boolean or integer sort, as printed by the solver
    Other(String),
}

/// A prover session: the solver process, the command log replayed on restart,
/// the push/pop depth and the pending declarations and axioms.
pub struct Session<L: Launcher = SolverCmd, T: VcTranslator = SmtTranslator> {
    pub(crate) options: ProverOptions,
    // options for the next prelude; set_timeout edits these
    pub(crate) smt_options: Vec<(String, String)>,
    launcher: L,
    pub(crate) translator: T,
    services: Arc<Services>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) conn: Option<L::Conn>,
    pub(crate) needs_restart: bool,
    common: String,
    transcript: Option<Transcript>,
    axioms: Vec<String>,
    type_decls: Vec<String>,
    pub(crate) axioms_are_setup: bool,
    depth: usize,
    // number of diagnostics errors recorded before the current check
    pub(crate) check_mark: usize,
    pub(crate) name_counter: usize,
}

impl<T: VcTranslator> Session<SolverCmd, T> {
    /// Launch the solver described by `options`, sharing the global services.
    pub fn spawn(options: ProverOptions, translator: T) -> Self {
        let cmd = options.solver_cmd();
        Self::new(options, cmd, translator, Services::global())
    }
}

impl<L: Launcher, T: VcTranslator> Session<L, T> {
    /// Create a session and try to launch its solver. A failed launch is
    /// logged and leaves the session without a process.
    pub fn new(options: ProverOptions, launcher: L, translator: T, services: Arc<Services>) -> Self {
        let smt_options = options.solver_cmd().options;
        let diagnostics = Diagnostics::new();
        let conn = match launcher.launch(&diagnostics) {
            Ok(conn) => Some(conn),
            Err(err) => {
                log::warn!("could not start prover: {err}");
                None
            }
        };
        let mut session = Self {
            options,
            smt_options,
            launcher,
            translator,
            services,
            diagnostics,
            conn,
            needs_restart: false,
            common: String::new(),
            transcript: None,
            axioms: vec![],
            type_decls: vec![],
            axioms_are_setup: false,
            depth: 0,
            check_mark: 0,
            name_counter: 0,
        };
        // sessions used through assumption checks never call begin_check
        if session.options.stratified_inlining > 0 || session.options.produce_unsat_cores {
            session.open_transcript("");
            session.prepare_common();
        }
        session
    }

    /// The options the session was created with.
    pub fn options(&self) -> &ProverOptions {
        &self.options
    }

    /// The session's diagnostics: warnings and errors printed by the solver
    /// and protocol errors found in its replies.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// The expression translator.
    pub fn translator(&self) -> &T {
        &self.translator
    }

    /// The common log, as replayed on restart.
    pub fn common_log(&self) -> &str {
        &self.common
    }

    /// Number of scopes opened with [`Session::push`] and not yet popped.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether a solver process is attached.
    pub fn is_running(&self) -> bool {
        self.conn.is_some()
    }

    /// Whether the solver will be restarted before the next query.
    pub fn needs_restart(&self) -> bool {
        self.needs_restart
    }

    /// Ask for the solver to be restarted before the next query.
    pub fn request_restart(&mut self) {
        self.needs_restart = true;
    }

    /// Launch the solver if there is no process, replaying the common log.
    pub fn start(&mut self) -> Result<(), ProverError> {
        if self.conn.is_some() {
            return Ok(());
        }
        let mut conn = self.launcher.launch(&self.diagnostics)?;
        if !self.common.is_empty() {
            log::debug!("replaying {} bytes of common prelude", self.common.len());
            // a dead process shows up as end-of-stream on the next read
            _ = conn.send(&self.common);
        }
        self.conn = Some(conn);
        self.needs_restart = false;
        Ok(())
    }

    /// Replace a process flagged as needing a restart with a fresh one.
    pub(crate) fn possibly_restart(&mut self) {
        if !self.needs_restart {
            return;
        }
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        log::info!("restarting prover");
        conn.close();
        if let Err(err) = self.start() {
            log::warn!("could not restart prover: {err}");
        }
    }

    /// Shut the solver down and close the transcript.
    pub fn close(&mut self) {
        self.close_transcript();
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
    }

    fn send(&mut self, cmd: &str, common: bool) {
        let cmd = sanitize(cmd);
        if common {
            self.common.push_str(&cmd);
            self.common.push_str("\r\n");
        }
        if let Some(conn) = &mut self.conn {
            if let Err(err) = conn.send(&cmd) {
                log::debug!("could not send to prover: {err}");
            }
        }
        if let Some(transcript) = &mut self.transcript {
            if let Err(err) = transcript.command(&cmd) {
                log::warn!("could not write to {}: {err}", transcript.path().display());
            }
        }
    }

    /// Send a command that is part of the replayed prelude.
    pub fn send_common(&mut self, cmd: &str) {
        self.send(cmd, true)
    }

    /// Send a command for the current query only.
    pub fn send_local(&mut self, cmd: &str) {
        self.send(cmd, false)
    }

    pub(crate) fn open_transcript(&mut self, name: &str) {
        let Some(pattern) = &self.options.log_filename else {
            return;
        };
        if self.transcript.is_some() {
            return;
        }
        let filename = self.services.claim_name(&pattern.replace("@PROC@", name));
        match Transcript::create(&filename) {
            Ok(mut transcript) => {
                if let Err(err) = transcript.raw(&self.common) {
                    log::warn!("could not write to {filename}: {err}");
                }
                self.transcript = Some(transcript);
            }
            Err(err) => log::warn!("could not open transcript {filename}: {err}"),
        }
    }

    pub(crate) fn close_transcript(&mut self) {
        if let Some(mut transcript) = self.transcript.take() {
            _ = transcript.flush();
        }
    }

    pub(crate) fn flush_transcript(&mut self) {
        if let Some(transcript) = &mut self.transcript {
            _ = transcript.flush();
        }
    }

    /// Send the prelude if nothing has been sent yet, and queue the context
    /// axioms if they have not been set up.
    pub(crate) fn prepare_common(&mut self) {
        if self.common.is_empty() {
            self.send_common("(set-option :print-success false)");
            self.send_common("(set-info :smt-lib-version 2.0)");
            if self.options.produce_models() {
                self.send_common("(set-option :produce-models true)");
            }
            if self.options.produce_unsat_cores {
                self.send_common("(set-option :produce-unsat-cores true)");
            }
            for (name, value) in self.smt_options.clone() {
                self.send_common(&format!("(set-option :{name} {value})"));
            }
            if let Some(logic) = self.options.logic.clone().filter(|l| !l.is_empty()) {
                self.send_common(&format!("(set-logic {logic})"));
            }
            self.send_common("; done setting options\n");
            let background = self
                .services
                .background_predicates(self.options.type_encoding)
                .to_string();
            if !background.is_empty() {
                self.send_common(&background);
            }
            if self.options.use_tickle_bool {
                self.send_common("(declare-fun tickleBool (Bool) Bool)");
                self.send_common("(assert (and (tickleBool true) (tickleBool false)))");
            }
        }

        if !self.axioms_are_setup {
            match self.translator.context_axioms() {
                Expr::App(Op::And, conjuncts) => {
                    for e in &conjuncts {
                        let s = self.linearize(e, Polarity::Negative);
                        if s != "true" {
                            self.axioms.push(s);
                        }
                    }
                }
                axioms => {
                    let s = self.linearize(&axioms, Polarity::Negative);
                    self.axioms.push(s);
                }
            }
            self.axioms_are_setup = true;
        }
    }

    /// Linearize through the translator, queueing whatever declarations and
    /// axioms that produces.
    pub(crate) fn linearize(&mut self, expr: &Expr, polarity: Polarity) -> String {
        let s = self.translator.linearize(expr, polarity);
        self.type_decls.extend(self.translator.new_declarations());
        if let Some(axiom) = self.translator.new_axioms() {
            self.axioms.push(axiom);
        }
        s
    }

    fn flush_axioms(&mut self) {
        for decl in std::mem::take(&mut self.type_decls) {
            self.send_common(&decl);
        }
        for axiom in std::mem::take(&mut self.axioms) {
            if axiom != "true" {
                self.send_common(&format!("(assert {axiom})"));
            }
        }
    }

    /// Start a new check: errors from before the previous check are
    /// forgotten, and errors from now on belong to this one.
    pub(crate) fn mark_check(&mut self) {
        self.diagnostics.forget_before(self.check_mark);
        self.check_mark = self.diagnostics.error_count();
    }

    /// Send the pending declarations and axioms.
    pub fn assert_axioms(&mut self) {
        self.flush_axioms();
    }

    /// Start checking the validity of `vc`, named `name` in the transcript
    /// and the query tag. The result is read by [`Session::check_outcome`].
    pub fn begin_check(&mut self, name: &str, vc: &Expr) {
        if self.options.separate_log_files {
            self.close_transcript();
        }
        self.open_transcript(name);
        self.mark_check();

        self.prepare_common();
        let vc = self.linearize(vc, Polarity::Positive);
        let vc = format!("(assert (not\n{vc}\n))");
        self.flush_axioms();

        self.possibly_restart();

        self.send_local("(push 1)");
        self.send_local(&format!("(set-info :vc-id {})", quote_id(name)));
        self.send_local(&vc);
        self.flush_transcript();

        if self.conn.is_some() {
            // flush any errors
            self.ping_pong();
        }

        self.send_local("(check-sat)");
        self.flush_transcript();
    }

    /// Classify the reply to the query sent by [`Session::begin_check`],
    /// reporting counterexamples to `handler`, and close the query's scope.
    pub fn check_outcome(&mut self, handler: &mut dyn ErrorHandler) -> Outcome {
        let outcome = self.check_outcome_core(handler);
        self.send_local("(pop 1)");
        self.flush_transcript();
        outcome
    }

    /// Open an assertion scope.
    pub fn push(&mut self) {
        self.send_local("(push 1)");
        self.translator.push();
        self.depth += 1;
    }

    /// Close the innermost scope, forgetting the declarations made in it.
    ///
    /// Panics if there is no open scope.
    pub fn pop(&mut self) {
        assert!(self.depth > 0, "pop without a matching push");
        self.send_local("(pop 1)");
        self.translator.pop();
        self.depth -= 1;
    }

    /// Assert `expr`, or its negation if `polarity` is false.
    pub fn assert(&mut self, expr: &Expr, polarity: bool) {
        let s = self.linearize(expr, Polarity::Positive);
        let cmd = if polarity {
            format!("(assert {s})")
        } else {
            format!("(assert (not\n{s}\n))")
        };
        self.assert_axioms();
        self.send_local(&cmd);
    }

    /// Define `f` as a macro with parameters `params` and body `body`.
    pub fn define_macro(&mut self, f: &Arc<Function>, params: &[Var], body: &Expr) {
        self.translator.add_function(f);
        let params = params
            .iter()
            .map(|p| format!("({} {})", quote_id(&p.name), p.ty))
            .collect::<Vec<_>>()
            .join(" ");
        let body = self.linearize(body, Polarity::Positive);
        let decl = format!(
            "(define-fun {} ({params}) {} {body})",
            quote_id(&f.name),
            f.result
        );
        self.assert_axioms();
        self.send_local(&decl);
    }

    /// Send `(check-sat)`, preparing the prelude if needed.
    pub fn check(&mut self) {
        self.prepare_common();
        self.send_local("(check-sat)");
        self.flush_transcript();
    }

    /// Change the per-query time limit. Only Z3 supports this; the new limit
    /// is also used by the prelude of a session that is fully reset.
    pub fn set_timeout(&mut self, ms: usize) {
        if self.options.solver != SolverKind::Z3 {
            return;
        }
        let name = Z3Conf::TIMEOUT_OPTION;
        self.options.time_limit_ms = Some(ms);
        self.smt_options.retain(|(n, _)| n != name);
        self.smt_options.push((name.to_string(), ms.to_string()));
        self.send_local(&format!("(set-option :{name} {ms})"));
    }

    /// Clear the solver's assertions and replay the common log (Z3 only).
    pub fn reset(&mut self) {
        if self.options.solver != SolverKind::Z3 {
            return;
        }
        self.send_local("(reset)");
        if self.common.is_empty() {
            return;
        }
        if let Some(conn) = &mut self.conn {
            _ = conn.send(&self.common);
        }
        if let Some(transcript) = &mut self.transcript {
            _ = transcript.raw(&self.common);
        }
    }

    /// Forget the common log, the declarations and the axioms, so that the
    /// next query starts from a fresh prelude (Z3 only).
    pub fn full_reset(&mut self) {
        if self.options.solver != SolverKind::Z3 {
            return;
        }
        self.common.clear();
        self.axioms.clear();
        self.type_decls.clear();
        self.axioms_are_setup = false;
        self.translator.reset();
        self.send_local("; doing a full reset...");
    }

    /// Evaluate `expr` in the current model.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value, ProverError> {
        let s = self.linearize(expr, Polarity::Positive);
        self.send_local(&format!("(get-value ({s}))"));
        let resp = self.read_response().ok_or(ProverError::NoResponse)?;
        let bad = || ProverError::Evaluation(resp.to_string());

        let [entry] = resp.args() else {
            return Err(bad());
        };
        if !resp.name().is_empty() {
            return Err(bad());
        }
        // ((e v)) for an expression, but (x v) is named by the variable
        let value = match (entry.name().is_empty(), entry.args()) {
            (true, [_, v]) | (false, [v]) => v,
            _ => return Err(bad()),
        };

        if value.name() == "-" {
            let [n] = value.args() else {
                return Err(bad());
            };
            return format!("-{}", n.name())
                .parse()
                .map(Value::Int)
                .map_err(|_| bad());
        }
        if value.arg_count() != 0 {
            return Err(bad());
        }
        let v = value.name();
        match expr.ty() {
            Some(Type::Bool) => v.parse().map(Value::Bool).map_err(|_| bad()),
            Some(Type::Int) => v.parse().map(Value::Int).map_err(|_| bad()),
            _ => Ok(Value::Other(v.into_owned())),
        }
    }

    /// Record a problem with the solver's output.
    pub(crate) fn protocol_error(&self, msg: &str) {
        self.diagnostics.report(msg);
    }

    /// The next reply, or `None` at end-of-stream or without a process.
    pub(crate) fn read_response(&mut self) -> Option<Sexp> {
        self.conn.as_mut()?.read_response()
    }

    fn ping(&mut self) -> bool {
        let Some(conn) = &mut self.conn else {
            return false;
        };
        // a dead process shows up as end-of-stream on the next read
        if let Err(err) = conn.ping() {
            log::debug!("could not ping prover: {err}");
        }
        true
    }

    /// Ping, and collect every reply up to the pong.
    ///
    /// If the stream ends first, the loss is recorded and the process is
    /// flagged for a restart.
    pub(crate) fn replies_until_pong(&mut self) -> Vec<Sexp> {
        let mut replies = vec![];
        if !self.ping() {
            return replies;
        }
        loop {
            match self.read_response() {
                Some(resp) if is_pong(&resp) => break,
                Some(resp) => replies.push(resp),
                None => {
                    self.protocol_error("prover did not respond");
                    self.needs_restart = true;
                    break;
                }
            }
        }
        replies
    }

    /// Wait for the solver to process everything sent so far, recording any
    /// reply as unexpected.
    pub(crate) fn ping_pong(&mut self) {
        for resp in self.replies_until_pong() {
            self.protocol_error(&format!("invalid ping response from the prover: {resp}"));
        }
    }

    /// Pass buffered solver warnings on to `handler`.
    pub(crate) fn flush_warnings(&self, handler: &mut dyn ErrorHandler) {
        for warning in self.diagnostics.take_warnings() {
            handler.on_prover_warning(&warning);
        }
    }
}

impl<L: Launcher, T: VcTranslator> Drop for Session<L, T> {
    fn drop(&mut self) {
        self.close();
    }
}
