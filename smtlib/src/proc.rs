// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Manage a running SMT process.
//!
//! This is a low-level generic API for SMT-LIB solvers. A [`Connection`] is a
//! strictly request/response conversation: commands go out one per line, and
//! replies come back one s-expression at a time. Replies to a burst of
//! commands are delimited by a ping, an `(echo ...)` of a marker the solver
//! prints back verbatim (the pong).
//!
//! The process is never restarted here; callers decide when to relaunch
//! through a [`Launcher`].

use crate::conf::SolverCmd;
use crate::diag::Diagnostics;
use crate::reader::SexpReader;
use crate::sexp::Sexp;
use nix::{errno::Errno, sys::signal, unistd::Pid};
use std::{
    io::{self, BufRead, BufReader, ErrorKind, Write},
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
};
use thiserror::Error;

/// The states that the process can be in.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Status {
    /// Solver is running normally.
    Running,
    /// The solver has been killed but needs a `.wait()` call to reap the process.
    NeedsWait,
    /// The solver has exited and the process has been reaped with `.wait()`.
    Terminated,
}

#[derive(Error, Debug)]
/// An error from trying to talk to the solver
pub enum SolverError {
    /// I/O went wrong
    #[error("some I/O went wrong: {0}")]
    Io(#[from] io::Error),
    /// The solver binary could not be started
    #[error("could not start solver `{cmd}`: {source}")]
    Spawn {
        /// The command line that failed
        cmd: String,
        /// Why it failed
        source: io::Error,
    },
    /// Solver killed specifically by SIGKILL signal
    #[error("solver was killed")]
    Killed,
}

type Result<T> = std::result::Result<T, SolverError>;

/// The marker echoed back by the solver in response to a ping.
pub const DONE: &str = "<<DONE>>";

/// The command that makes the solver print the pong marker.
pub fn ping_command() -> String {
    format!(r#"(echo "{DONE}")"#)
}

/// Is this reply the solver's answer to a ping?
pub fn is_pong(resp: &Sexp) -> bool {
    resp.atom_s() == Some(DONE)
}

/// One conversation with a running solver.
pub trait Connection: Send {
    /// Send one command line. Fails if the solver is gone; callers that don't
    /// need a reply may treat that as a no-op.
    fn send(&mut self, cmd: &str) -> Result<()>;

    /// Ask the solver to print the pong marker once it has processed everything
    /// sent so far.
    fn ping(&mut self) -> Result<()>;

    /// Block until the next reply. Returns `None` at end-of-stream, which is
    /// how a crashed or killed solver manifests.
    ///
    /// Error replies are reported to the connection's diagnostics and skipped.
    fn read_response(&mut self) -> Option<Sexp>;

    /// Shut the solver down.
    fn close(&mut self);
}

/// Something that can start solver processes.
pub trait Launcher {
    /// The kind of connection produced.
    type Conn: Connection;

    /// Start a fresh solver, reporting its diagnostics to `diagnostics`.
    fn launch(&self, diagnostics: &Diagnostics) -> Result<Self::Conn>;
}

impl Launcher for SolverCmd {
    type Conn = SmtProc;

    fn launch(&self, diagnostics: &Diagnostics) -> Result<SmtProc> {
        SmtProc::new(self, diagnostics.clone())
    }
}

/// SmtProc wraps an instance of a solver process.
#[derive(Debug)]
pub struct SmtProc {
    child: Child,
    stdin: ChildStdin,
    replies: SexpReader<BufReader<ChildStdout>>,
    diagnostics: Diagnostics,
    stderr_reader: Option<JoinHandle<()>>,
    // shared with SmtPid so that a killed process is not signalled again
    // long afterward when the pid might have been reused
    terminated: Arc<Mutex<Status>>,
}

/// A handle to the SMT process for cancelling an in-progress check.
#[derive(Debug, Clone)]
pub struct SmtPid {
    pid: Pid,
    terminated: Arc<Mutex<Status>>,
}

impl SmtPid {
    /// Kill the SMT process by pid.
    ///
    /// Any read in progress on the process then sees end-of-stream.
    pub fn kill(&self) {
        let mut terminated = self.terminated.lock().unwrap();
        if *terminated != Status::Running {
            return;
        }
        if let Err(errno) = signal::kill(self.pid, signal::Signal::SIGKILL) {
            if errno != Errno::ESRCH {
                log::error!("killing SMT process {} failed with {errno}", self.pid);
                return;
            }
        }
        *terminated = Status::NeedsWait;
    }
}

impl Drop for SmtProc {
    fn drop(&mut self) {
        self.close();
    }
}

impl SmtProc {
    /// Create a new SMT process by running a solver.
    pub fn new(cmd: &SolverCmd, diagnostics: Diagnostics) -> Result<Self> {
        let spawn_err = |source: io::Error| SolverError::Spawn {
            cmd: cmd.cmdline(),
            source,
        };
        let mut child = Command::new(&cmd.cmd)
            .args(&cmd.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;
        let missing = |what: &str| spawn_err(io::Error::new(ErrorKind::Other, format!("no {what}")));
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let diag = diagnostics.clone();
        let stderr_reader = thread::Builder::new()
            .name("smt-stderr".to_string())
            .spawn(move || {
                for line in BufReader::new(stderr).split(b'\n') {
                    let Ok(line) = line else { break };
                    let line = String::from_utf8_lossy(&line);
                    if !line.trim().is_empty() {
                        diag.report(&line);
                    }
                }
            })?;
        log::debug!("started solver {}", cmd.cmdline());
        Ok(Self {
            child,
            stdin,
            replies: SexpReader::new(BufReader::new(stdout)),
            diagnostics,
            stderr_reader: Some(stderr_reader),
            terminated: Arc::new(Mutex::new(Status::Running)),
        })
    }

    /// Get a handle to the process for cancellation.
    pub fn pid(&self) -> SmtPid {
        // Child guarantees a positive pid, which always fits
        let pid = Pid::from_raw(self.child.id() as i32);
        SmtPid {
            pid,
            terminated: self.terminated.clone(),
        }
    }

    fn check_running(&mut self) -> Result<()> {
        let mut status = self.terminated.lock().unwrap();
        match *status {
            Status::Running => Ok(()),
            Status::NeedsWait => {
                _ = self.child.wait();
                *status = Status::Terminated;
                Err(SolverError::Killed)
            }
            Status::Terminated => Err(SolverError::Killed),
        }
    }

    fn write_stdin(&mut self, line: &str) -> Result<()> {
        self.check_running()?;
        match writeln!(self.stdin, "{line}") {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.kind() == ErrorKind::BrokenPipe {
                    self.check_running()?;
                }
                Err(SolverError::from(err))
            }
        }
    }
}

impl Connection for SmtProc {
    fn send(&mut self, cmd: &str) -> Result<()> {
        self.write_stdin(cmd)
    }

    fn ping(&mut self) -> Result<()> {
        self.write_stdin(&ping_command())?;
        self.stdin.flush()?;
        Ok(())
    }

    fn read_response(&mut self) -> Option<Sexp> {
        _ = self.stdin.flush();
        loop {
            let resp = match self.replies.next()? {
                Ok(resp) => resp,
                Err(err) => {
                    self.diagnostics.report(&err.to_string());
                    continue;
                }
            };
            let name = resp.name().into_owned();
            match name.as_str() {
                "error" => {
                    let args = resp.args();
                    if args.len() == 1 && args[0].arg_count() == 0 {
                        self.diagnostics.report(&args[0].name());
                    } else {
                        self.diagnostics.report(&resp.to_string());
                    }
                }
                // a benign leftover from an earlier command, or a progress report
                "unsupported" | "progress" => {}
                _ => return Some(resp),
            }
        }
    }

    fn close(&mut self) {
        _ = writeln!(self.stdin, "(exit)");
        _ = self.stdin.flush();
        _ = self.child.kill();
        _ = self.child.wait();
        *self.terminated.lock().unwrap() = Status::Terminated;
        if let Some(handle) = self.stderr_reader.take() {
            _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        conf::Z3Conf,
        diag::Diagnostics,
        proc::{is_pong, Connection, Launcher, SmtProc, SolverError},
        sexp::atom_s,
    };
    use std::{sync::mpsc, thread, time::Duration};

    fn z3(diagnostics: &Diagnostics) -> Option<SmtProc> {
        let _ = pretty_env_logger::try_init();
        match Z3Conf::new("z3").done().launch(diagnostics) {
            Ok(proc) => Some(proc),
            Err(err) => {
                eprintln!("could not start z3 ({err}), skipping test");
                None
            }
        }
    }

    /// Collect replies up to the pong.
    fn replies(proc: &mut SmtProc) -> Vec<String> {
        proc.ping().unwrap();
        let mut out = vec![];
        while let Some(resp) = proc.read_response() {
            if is_pong(&resp) {
                break;
            }
            out.push(resp.to_string());
        }
        out
    }

    #[test]
    fn test_check_sat_z3() {
        let diagnostics = Diagnostics::new();
        let Some(mut proc) = z3(&diagnostics) else {
            return;
        };
        proc.send("(declare-const a Bool)").unwrap();
        proc.send("(assert (and a (not a)))").unwrap();
        proc.send("(check-sat)").unwrap();
        assert_eq!(replies(&mut proc), vec!["unsat"]);
    }

    #[test]
    fn test_error_reply_is_diagnostic() {
        let diagnostics = Diagnostics::new();
        let Some(mut proc) = z3(&diagnostics) else {
            return;
        };
        // unbound symbol
        proc.send("(assert p)").unwrap();
        proc.send("(check-sat)").unwrap();
        assert_eq!(replies(&mut proc), vec!["sat"]);
        assert_eq!(diagnostics.error_count(), 1);
    }

    #[test]
    fn test_kill_is_end_of_stream() {
        let diagnostics = Diagnostics::new();
        let Some(mut proc) = z3(&diagnostics) else {
            return;
        };
        let pid = proc.pid();
        let (send, recv) = mpsc::channel();
        thread::spawn(move || {
            // never answered: nothing is sent before reading
            let r = proc.read_response();
            let after = proc.send("(check-sat)");
            send.send((r, after)).unwrap();
        });
        thread::sleep(Duration::from_millis(50));
        pid.kill();
        let (r, after) = recv.recv().unwrap();
        assert_eq!(r, None);
        assert!(matches!(after, Err(SolverError::Killed)));
    }

    #[test]
    fn test_pong_marker() {
        assert!(is_pong(&atom_s("<<DONE>>")));
        assert!(!is_pong(&atom_s("sat")));
    }
}
