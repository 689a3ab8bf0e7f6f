// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A scripted in-memory solver for driving sessions in tests.
//!
//! A [`Script`] maps command prefixes to queues of replies. Every command
//! line that starts with a registered prefix enqueues the next reply of its
//! queue; the last reply of a queue is repeated forever. Commands with no
//! matching prefix are silent, as a solver with `:print-success false` is.

use smtlib::{
    diag::Diagnostics,
    proc::{Connection, Launcher, SolverError, DONE},
    sexp::{atom_s, parse_many, Sexp},
};
use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
};

/// Logged in place of a command whenever a solver is launched.
pub const LAUNCH: &str = "; launch";

#[derive(Debug)]
struct Rule {
    prefix: String,
    replies: VecDeque<String>,
}

#[derive(Debug, Default)]
struct State {
    rules: Vec<Rule>,
    sent: Vec<String>,
    launches: usize,
    failing_launches: usize,
    dead: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Script(Arc<Mutex<State>>);

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to commands starting with `prefix` with `replies`, in order.
    /// A reply may hold several s-expressions.
    pub fn on(&self, prefix: &str, replies: &[&str]) -> &Self {
        self.0.lock().unwrap().rules.push(Rule {
            prefix: prefix.to_string(),
            replies: replies.iter().map(|r| r.to_string()).collect(),
        });
        self
    }

    /// Make the next `n` launches fail.
    pub fn fail_launches(&self, n: usize) {
        self.0.lock().unwrap().failing_launches = n;
    }

    /// Simulate the running solver being killed.
    pub fn kill(&self) {
        self.0.lock().unwrap().dead = true;
    }

    /// Every command sent so far, with line endings normalized to `\n`, and
    /// [`LAUNCH`] for each launch.
    pub fn sent(&self) -> Vec<String> {
        self.0.lock().unwrap().sent.clone()
    }

    pub fn launches(&self) -> usize {
        self.0.lock().unwrap().launches
    }
}

impl State {
    fn replies_to(&mut self, line: &str) -> Vec<Sexp> {
        let Some(rule) = self.rules.iter_mut().find(|r| line.starts_with(&r.prefix)) else {
            return vec![];
        };
        let reply = if rule.replies.len() > 1 {
            rule.replies.pop_front()
        } else {
            rule.replies.front().cloned()
        };
        match reply {
            Some(reply) => parse_many(&reply).expect("bad scripted reply"),
            None => vec![],
        }
    }
}

#[derive(Debug)]
pub struct ScriptedConn {
    script: Script,
    diagnostics: Diagnostics,
    out: VecDeque<Sexp>,
    closed: bool,
}

impl ScriptedConn {
    fn check_alive(&self) -> Result<(), SolverError> {
        if self.closed || self.script.0.lock().unwrap().dead {
            return Err(SolverError::Killed);
        }
        Ok(())
    }
}

impl Launcher for Script {
    type Conn = ScriptedConn;

    fn launch(&self, diagnostics: &Diagnostics) -> Result<ScriptedConn, SolverError> {
        let mut state = self.0.lock().unwrap();
        if state.failing_launches > 0 {
            state.failing_launches -= 1;
            return Err(SolverError::Spawn {
                cmd: "scripted".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "launch disabled"),
            });
        }
        state.launches += 1;
        state.dead = false;
        state.sent.push(LAUNCH.to_string());
        Ok(ScriptedConn {
            script: self.clone(),
            diagnostics: diagnostics.clone(),
            out: VecDeque::new(),
            closed: false,
        })
    }
}

impl Connection for ScriptedConn {
    fn send(&mut self, cmd: &str) -> Result<(), SolverError> {
        self.check_alive()?;
        let mut state = self.script.0.lock().unwrap();
        state.sent.push(cmd.replace("\r\n", "\n"));
        for line in cmd.lines() {
            let replies = state.replies_to(line.trim());
            self.out.extend(replies);
        }
        Ok(())
    }

    fn ping(&mut self) -> Result<(), SolverError> {
        self.check_alive()?;
        self.out.push_back(atom_s(DONE));
        Ok(())
    }

    fn read_response(&mut self) -> Option<Sexp> {
        loop {
            self.check_alive().ok()?;
            let resp = self.out.pop_front()?;
            if resp.name() == "error" {
                let msg = match resp.args() {
                    [msg] => msg.name().into_owned(),
                    _ => resp.to_string(),
                };
                self.diagnostics.report(&msg);
                continue;
            }
            return Some(resp);
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
