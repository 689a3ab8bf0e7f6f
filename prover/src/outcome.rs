// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Results of a check and the callbacks through which they are reported.

use crate::model::Model;
use serde::Serialize;
use std::fmt;

/// The result of one check.
///
/// `Valid` means the negated condition is unsatisfiable; `Invalid` means the
/// solver answered `sat` or `unknown`.
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Valid,
    Invalid,
    TimeOut,
    OutOfMemory,
    Undetermined,
}

impl Outcome {
    /// Whether a counterexample (labels, and for `Invalid` a model) is
    /// retrieved for this outcome.
    pub fn has_evidence(&self) -> bool {
        matches!(
            self,
            Outcome::Invalid | Outcome::TimeOut | Outcome::OutOfMemory
        )
    }
}

/// A resource the solver ran out of.
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum Resource {
    Memory,
    Timeout,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resource::Memory => "memory",
            Resource::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// Receives the results of checks as they are found.
pub trait ErrorHandler {
    /// A failing check: the labels on the failing path, the model if one was
    /// requested, and the outcome it belongs to.
    fn on_model(&mut self, labels: &[String], model: Option<Model>, outcome: Outcome);

    /// The solver gave up because of `resource`.
    fn on_resource_exceeded(&mut self, resource: Resource) {
        log::info!("prover ran out of {resource}");
    }

    /// A warning printed by the solver.
    fn on_prover_warning(&mut self, msg: &str) {
        log::warn!("prover warning: {msg}");
    }

    /// The control-flow constant identifying the procedure being checked, used
    /// when paths are recovered without labels.
    fn starting_proc_id(&self) -> i64 {
        0
    }
}

/// One call made on a [`Recorder`].
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Event {
    Model {
        labels: Vec<String>,
        model: Option<Model>,
        outcome: Outcome,
    },
    ResourceExceeded(Resource),
    Warning(String),
}

/// An [`ErrorHandler`] that keeps everything it is told.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    /// Control-flow constant reported by [`ErrorHandler::starting_proc_id`]
    pub proc_id: i64,
    /// Everything reported so far, in order
    pub events: Vec<Event>,
}

impl Recorder {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// The label lists of all reported counterexamples.
    pub fn labels(&self) -> Vec<Vec<String>> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Model { labels, .. } => Some(labels.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ErrorHandler for Recorder {
    fn on_model(&mut self, labels: &[String], model: Option<Model>, outcome: Outcome) {
        self.events.push(Event::Model {
            labels: labels.to_vec(),
            model,
            outcome,
        });
    }

    fn on_resource_exceeded(&mut self, resource: Resource) {
        self.events.push(Event::ResourceExceeded(resource));
    }

    fn on_prover_warning(&mut self, msg: &str) {
        self.events.push(Event::Warning(msg.to_string()));
    }

    fn starting_proc_id(&self) -> i64 {
        self.proc_id
    }
}
