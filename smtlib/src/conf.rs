// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Construct launch and option configurations for Z3 and CVC4.
//!
//! Options are not sent when the process starts: they belong to the session's
//! common prelude so that they are replayed whenever the solver is restarted.

use itertools::Itertools;
use serde::Serialize;

/// The kind of solver being driven.
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum SolverKind {
    Z3,
    Cvc4,
}

/// The full invocation of a solver binary.
#[derive(Debug, Clone)]
pub struct SolverCmd {
    /// Which solver this launches
    pub kind: SolverKind,
    /// Binary to launch
    pub cmd: String,
    /// Arguments to pass
    pub args: Vec<String>,
    /// SMT options to send as part of the common prelude
    pub options: Vec<(String, String)>,
}

impl SolverCmd {
    fn args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
    }

    /// Set an option, replacing an earlier value for the same name.
    pub fn option<S: AsRef<str>>(&mut self, name: &str, val: S) {
        self.options.retain(|(n, _)| n != name);
        self.options
            .push((name.to_string(), val.as_ref().to_string()));
    }

    /// Build the command line string, for printing purposes.
    pub fn cmdline(&self) -> String {
        let args = self
            .args
            .iter()
            .map(|a| {
                if a.contains(' ') {
                    format!("\"{a}\"")
                } else {
                    a.to_string()
                }
            })
            .join(" ");
        format!("{} {args}", &self.cmd)
    }
}

/// Builder for creating a Z3 [`SolverCmd`].
#[derive(Debug, Clone)]
pub struct Z3Conf(SolverCmd);

impl Z3Conf {
    /// Name of the option carrying Z3's per-query time limit.
    pub const TIMEOUT_OPTION: &'static str = "timeout";

    /// Create a Z3Conf with some default options. Uses `cmd` as the path to Z3.
    pub fn new(cmd: &str) -> Self {
        let mut cmd = SolverCmd {
            kind: SolverKind::Z3,
            cmd: cmd.to_string(),
            args: vec![],
            options: vec![],
        };
        cmd.args(["AUTO_CONFIG=false", "-smt2", "-in"]);
        Self(cmd)
    }

    /// Set the SMT timeout option. None leaves Z3's default (no limit).
    pub fn timeout_ms(&mut self, ms: Option<usize>) {
        if let Some(ms) = ms {
            self.0.option(Self::TIMEOUT_OPTION, format!("{ms}"));
        }
    }

    /// Set the random seeds used by the SMT core and the SAT solver.
    pub fn seed(&mut self, seed: usize) {
        self.0.option("smt.random_seed", format!("{seed}"));
        self.0.option("sat.random_seed", format!("{seed}"));
    }

    /// Get access to the raw options of the solver.
    pub fn options(&mut self) -> &mut SolverCmd {
        &mut self.0
    }

    /// Get the final command to run the solver.
    pub fn done(self) -> SolverCmd {
        self.0
    }
}

/// Builder for a CVC4 [`SolverCmd`].
#[derive(Debug, Clone)]
pub struct CvcConf {
    cmd: SolverCmd,
}

impl CvcConf {
    /// Create a new CVC4 builder with some default options.
    pub fn new_cvc4(cmd: &str) -> Self {
        let mut cmd = SolverCmd {
            kind: SolverKind::Cvc4,
            cmd: cmd.to_string(),
            args: vec![],
            options: vec![],
        };
        cmd.args([
            "--lang=smt",
            "--no-strict-parsing",
            "--no-condense-function-values",
            "--incremental",
        ]);
        Self { cmd }
    }

    /// Set a per-query time limit. None sets no time limit.
    pub fn timeout_ms(&mut self, ms: Option<usize>) {
        let ms = ms.unwrap_or(0);
        self.cmd.option("tlimit-per", format!("{ms}"));
    }

    /// Set the random seed.
    pub fn seed(&mut self, seed: usize) {
        self.cmd.option("random-seed", format!("{seed}"));
    }

    /// Get access to the raw options of the solver.
    pub fn options(&mut self) -> &mut SolverCmd {
        &mut self.cmd
    }

    /// Get the final command to run the solver.
    pub fn done(self) -> SolverCmd {
        self.cmd
    }
}
