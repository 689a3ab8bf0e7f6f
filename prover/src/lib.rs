// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A session with an SMT-LIB2 prover process for checking verification
//! conditions.
//!
//! A [`session::Session`] owns the solver process, the prelude and axioms
//! every fresh process is primed with, and the assertion scopes of the
//! queries sent so far. Verification conditions come in as [`expr::Expr`]
//! and are rendered through a [`translate::VcTranslator`]; the replies are
//! classified into an [`outcome::Outcome`], with counterexamples reported to
//! an [`outcome::ErrorHandler`]. Fixed-point queries over relations and the
//! counterexample derivations they produce live in [`fixedpoint`] and
//! [`derivation`].

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::type_complexity)]
#![deny(clippy::uninlined_format_args)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod classify;
pub mod derivation;
pub mod error;
pub mod expr;
pub mod fixedpoint;
pub mod model;
pub mod options;
pub mod outcome;
pub mod reconstruct;
pub mod relax;
pub mod services;
pub mod session;
pub mod translate;

#[cfg(test)]
mod testing;
