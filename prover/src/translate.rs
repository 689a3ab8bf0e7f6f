// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Turning expressions into SMT-LIB text, and keeping track of what has been
//! declared to the solver.
//!
//! The session only ever sees strings: [`VcTranslator::linearize`] produces the
//! term, and the declarations and axioms needed by the terms linearized so far
//! are collected separately and flushed before the next assertion.

use crate::expr::{Expr, Function, Type, Var};
use std::{collections::HashMap, sync::Arc};

/// Which side of a query an expression is linearized for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Polarity {
    /// The goal: a verification condition or an asserted assumption.
    Positive,
    /// A hypothesis, such as a context axiom.
    Negative,
}

/// The free variables and functions declared to the solver so far, by name.
/// Solver output is interpreted against these.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    /// Declared constants
    pub vars: HashMap<String, Var>,
    /// Declared functions
    pub funcs: HashMap<String, Arc<Function>>,
}

/// The expression and type subsystem producing the text sent to the solver.
pub trait VcTranslator {
    /// Linearize an expression to an SMT-LIB term, collecting whatever it
    /// needs declared.
    fn linearize(&mut self, expr: &Expr, polarity: Polarity) -> String;

    /// Declarations needed by terms linearized since the last call.
    fn new_declarations(&mut self) -> Vec<String>;

    /// Axioms generated while linearizing since the last call, if any.
    fn new_axioms(&mut self) -> Option<String> {
        None
    }

    /// Axioms of the context, asserted once as part of the common prelude.
    fn context_axioms(&self) -> Expr {
        Expr::Lit(true)
    }

    /// Open a declaration scope.
    fn push(&mut self);

    /// Forget everything declared since the matching [`VcTranslator::push`].
    fn pop(&mut self);

    /// Treat `f` as a fixed-point relation rather than an ordinary function.
    fn register_relation(&mut self, f: &Arc<Function>);

    /// Record `f` as declared by the caller (e.g. by a macro definition).
    fn add_function(&mut self, f: &Arc<Function>);

    /// Everything declared so far.
    fn declarations(&self) -> &Declarations;

    /// Forget all declarations.
    fn reset(&mut self);
}

/// Characters allowed in an unquoted SMT-LIB symbol besides alphanumerics.
const SYMBOL_CHARS: &str = "~!@$%^&*_-+=<>.?/";

/// Quote an identifier with `|...|` unless it is already a simple symbol.
pub fn quote_id(s: &str) -> String {
    let simple = !s.is_empty()
        && !s.starts_with(|c: char| c.is_ascii_digit())
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || SYMBOL_CHARS.contains(c));
    if simple {
        s.to_string()
    } else {
        format!("|{}|", s.replace(['|', '\\'], "_"))
    }
}

/// The solver-side name of the Boolean tracking label `label`.
pub fn label_var(label: &str) -> String {
    format!("%lbl%{label}")
}

#[derive(Debug, Clone)]
enum Declared {
    Var(String),
    Func(String),
    Relation(String),
}

/// A translator for monomorphic expressions: terms are printed as they are
/// and every free variable and function is declared the first time it is
/// seen in the current scope.
#[derive(Debug, Default)]
pub struct SmtTranslator {
    decls: Declarations,
    relations: Vec<String>,
    // what was declared in each open scope, innermost last
    scopes: Vec<Vec<Declared>>,
    pending: Vec<String>,
    axioms: Expr,
}

impl SmtTranslator {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// A translator whose context asserts `axioms`.
    pub fn with_axioms(axioms: Expr) -> Self {
        Self {
            axioms,
            ..Self::default()
        }
    }

    fn record(&mut self, d: Declared) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(d);
        }
    }

    fn collect(&mut self, expr: &Expr) {
        for f in expr.functions() {
            if self.decls.funcs.contains_key(&f.name) {
                continue;
            }
            let decl = if self.relations.contains(&f.name) {
                let sorts = f.args.iter().map(Type::to_string).collect::<Vec<_>>();
                format!("(declare-rel {} ({}))", quote_id(&f.name), sorts.join(" "))
            } else {
                f.declaration().to_string()
            };
            self.pending.push(decl);
            self.decls.funcs.insert(f.name.clone(), f.clone());
            self.record(Declared::Func(f.name.clone()));
        }
        for v in expr.free_vars() {
            if self.decls.vars.contains_key(&v.name) {
                continue;
            }
            self.pending
                .push(format!("(declare-fun {} () {})", quote_id(&v.name), v.ty));
            self.record(Declared::Var(v.name.clone()));
            self.decls.vars.insert(v.name.clone(), v);
        }
    }
}

impl VcTranslator for SmtTranslator {
    fn linearize(&mut self, expr: &Expr, _polarity: Polarity) -> String {
        self.collect(expr);
        expr.to_string()
    }

    fn new_declarations(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }

    fn context_axioms(&self) -> Expr {
        self.axioms.clone()
    }

    fn push(&mut self) {
        self.scopes.push(vec![]);
    }

    fn pop(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        for d in scope {
            match d {
                Declared::Var(name) => {
                    self.decls.vars.remove(&name);
                }
                Declared::Func(name) => {
                    self.decls.funcs.remove(&name);
                }
                Declared::Relation(name) => self.relations.retain(|r| *r != name),
            }
        }
    }

    fn register_relation(&mut self, f: &Arc<Function>) {
        if !self.relations.contains(&f.name) {
            self.relations.push(f.name.clone());
            self.record(Declared::Relation(f.name.clone()));
        }
    }

    fn add_function(&mut self, f: &Arc<Function>) {
        if self.decls.funcs.insert(f.name.clone(), f.clone()).is_none() {
            self.record(Declared::Func(f.name.clone()));
        }
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn reset(&mut self) {
        self.decls = Declarations::default();
        self.relations.clear();
        self.scopes.clear();
        self.pending.clear();
    }
}
