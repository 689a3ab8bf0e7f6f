// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Rebuild [`Expr`]s from the s-expressions a solver prints.
//!
//! The interpreter dispatches on the head symbol of each node. Bound names live
//! in a persistent [`Scope`]: entering a binder extends the scope for the body
//! only, so bindings never leak into sibling subterms. `let` is expanded by
//! substitution; the bound name maps directly to its reconstructed definition.

use crate::{
    error::ReconstructError,
    expr::{Expr, Op, Quantifier, Type, Var},
    translate::Declarations,
};
use itertools::Itertools;
use smtlib::sexp::Sexp;
use std::rc::Rc;

/// Remove the `@@` disambiguation suffix the namer adds to solver symbols.
pub fn strip_cruft(name: &str) -> &str {
    match name.rfind("@@") {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Names bound by enclosing quantifiers and lets, innermost first.
#[derive(Debug, Clone, Default)]
pub struct Scope(Option<Rc<Frame>>);

#[derive(Debug)]
struct Frame {
    name: String,
    value: Expr,
    parent: Scope,
}

impl Scope {
    /// The empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// This scope extended with `name` bound to `value`.
    pub fn bind(&self, name: &str, value: Expr) -> Scope {
        Scope(Some(Rc::new(Frame {
            name: name.to_string(),
            value,
            parent: self.clone(),
        })))
    }

    /// The innermost binding of `name`.
    pub fn lookup(&self, name: &str) -> Option<&Expr> {
        let mut cur = self;
        while let Some(frame) = &cur.0 {
            if frame.name == name {
                return Some(&frame.value);
            }
            cur = &frame.parent;
        }
        None
    }
}

/// Interpret a binder `(name sort)` as a typed variable.
///
/// Only `Int`, `Bool` and arrays with an `Int` or `Bool` value sort are
/// supported; array indices are taken to be `Int`.
pub fn binder_var(b: &Sexp) -> Result<Var, ReconstructError> {
    if b.arg_count() != 1 {
        return Err(ReconstructError::BadQuantifier(b.to_string()));
    }
    let name = strip_cruft(&b.name()).to_string();
    let sort = &b.args()[0];
    let scalar = |s: &Sexp| match s.name().as_ref() {
        "Int" if s.arg_count() == 0 => Some(Type::Int),
        "Bool" if s.arg_count() == 0 => Some(Type::Bool),
        _ => None,
    };
    let ty = match sort.name().as_ref() {
        "Array" => {
            let value = match sort.args() {
                [_, value] => scalar(value),
                _ => None,
            };
            match value {
                Some(value) => Type::int_map(value),
                None => return Err(ReconstructError::UnsupportedSort(sort.to_string())),
            }
        }
        _ => scalar(sort).ok_or_else(|| ReconstructError::UnsupportedSort(sort.to_string()))?,
    };
    Ok(Var { name, ty })
}

/// A `define-fun` read back from the solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    /// The defined name, without its disambiguation suffix
    pub name: String,
    /// The parameters
    pub params: Vec<Var>,
    /// The body, over the parameters
    pub body: Expr,
}

/// Interprets solver output against the symbols declared so far.
#[derive(Debug, Clone, Copy)]
pub struct Reconstructor<'a> {
    decls: &'a Declarations,
}

impl<'a> Reconstructor<'a> {
    #[allow(missing_docs)]
    pub fn new(decls: &'a Declarations) -> Self {
        Self { decls }
    }

    fn args(&self, e: &Sexp, scope: &Scope) -> Result<Vec<Expr>, ReconstructError> {
        e.args().iter().map(|a| self.expr(a, scope)).collect()
    }

    fn leaf(&self, e: &Sexp, scope: &Scope) -> Result<Expr, ReconstructError> {
        let full = e.name();
        let name = strip_cruft(&full);
        if name.starts_with(|c: char| c.is_ascii_digit()) {
            return name
                .parse()
                .map(Expr::Int)
                .map_err(|_| ReconstructError::BadNumeral(name.to_string()));
        }
        if let Some(value) = scope.lookup(name) {
            return Ok(value.clone());
        }
        match name {
            "true" => Ok(Expr::Lit(true)),
            "false" => Ok(Expr::Lit(false)),
            _ => match (self.decls.vars.get(name), self.decls.funcs.get(name)) {
                (Some(v), _) => Ok(Expr::Var(v.clone())),
                (None, Some(f)) if f.args.is_empty() => Ok(Expr::Call(f.clone(), vec![])),
                _ => Err(ReconstructError::UnknownSymbol(name.to_string())),
            },
        }
    }

    /// Apply a binary operator to any number of `args` the way SMT-LIB reads
    /// it: `=>` associates to the right, comparisons chain pairwise, and
    /// everything else associates to the left.
    fn fold(&self, op: Op, args: Vec<Expr>) -> Result<Expr, ReconstructError> {
        let chained = matches!(op, Op::Eq | Op::Le | Op::Lt | Op::Ge | Op::Gt);
        if (chained || op == Op::Implies) && args.len() < 2 {
            return Err(ReconstructError::Arity {
                op: op.smt_name().to_string(),
                expected: 2,
                got: args.len(),
            });
        }
        if chained {
            let pairs = args
                .into_iter()
                .tuple_windows::<(Expr, Expr)>()
                .map(|(a, b)| Expr::App(op, vec![a, b]))
                .collect();
            return self.fold(Op::And, pairs);
        }
        if op == Op::Implies {
            return Ok(args
                .into_iter()
                .rev()
                .reduce(|acc, arg| Expr::App(op, vec![arg, acc]))
                .unwrap_or(Expr::Lit(true)));
        }
        let mut args = args.into_iter();
        let Some(first) = args.next() else {
            return match op {
                Op::And => Ok(Expr::Lit(true)),
                Op::Or => Ok(Expr::Lit(false)),
                Op::Add => Ok(Expr::Int(0)),
                _ => Err(ReconstructError::EmptyFold(op.smt_name().to_string())),
            };
        };
        Ok(args.fold(first, |acc, arg| Expr::App(op, vec![acc, arg])))
    }

    fn quantifier(
        &self,
        quantifier: Quantifier,
        e: &Sexp,
        scope: &Scope,
    ) -> Result<Expr, ReconstructError> {
        let [binds, body] = e.args() else {
            return Err(ReconstructError::BadQuantifier(e.to_string()));
        };
        let mut inner = scope.clone();
        let mut binders = vec![];
        for b in binds.args() {
            let v = binder_var(b)?;
            inner = inner.bind(&v.name, Expr::Var(v.clone()));
            binders.push(v);
        }
        let body = self.expr(body, &inner)?;
        Ok(Expr::Quant {
            quantifier,
            binders,
            body: Box::new(body),
        })
    }

    fn let_(&self, e: &Sexp, scope: &Scope) -> Result<Expr, ReconstructError> {
        let [binds, body] = e.args() else {
            return Err(ReconstructError::BadLet(e.to_string()));
        };
        // bindings are visible to the definitions that follow them
        let mut inner = scope.clone();
        for b in binds.args() {
            let [def] = b.args() else {
                return Err(ReconstructError::BadLet(b.to_string()));
            };
            let def = self.expr(def, &inner)?;
            inner = inner.bind(strip_cruft(&b.name()), def);
        }
        self.expr(body, &inner)
    }

    /// Reconstruct `e` with the names bound in `scope`.
    pub fn expr(&self, e: &Sexp, scope: &Scope) -> Result<Expr, ReconstructError> {
        if e.arg_count() == 0 {
            return self.leaf(e, scope);
        }
        let head = e.name();
        match head.as_ref() {
            "select" => Ok(Expr::Select(self.args(e, scope)?)),
            "store" => Ok(Expr::Store(self.args(e, scope)?)),
            "forall" => self.quantifier(Quantifier::Forall, e, scope),
            "exists" => self.quantifier(Quantifier::Exists, e, scope),
            "-" if e.arg_count() == 1 => {
                let x = self.expr(&e.args()[0], scope)?;
                Ok(Expr::App(Op::Sub, vec![Expr::Int(0), x]))
            }
            // annotations are commentary
            "!" => self.expr(&e.args()[0], scope),
            "let" => self.let_(e, scope),
            name => {
                if let Some(op) = Op::from_smt(name) {
                    let args = self.args(e, scope)?;
                    if op.arity() == 2 {
                        return self.fold(op, args);
                    }
                    if args.len() != op.arity() {
                        return Err(ReconstructError::Arity {
                            op: name.to_string(),
                            expected: op.arity(),
                            got: args.len(),
                        });
                    }
                    return Ok(Expr::App(op, args));
                }
                match self.decls.funcs.get(strip_cruft(name)) {
                    Some(f) => Ok(Expr::Call(f.clone(), self.args(e, scope)?)),
                    None => Err(ReconstructError::UnknownOperator(name.to_string())),
                }
            }
        }
    }

    /// Interpret `(define-fun name ((x sort) ...) range body)`.
    pub fn define_fun(&self, line: &Sexp) -> Result<Definition, ReconstructError> {
        if line.name() != "define-fun" {
            return Err(ReconstructError::ExpectedDefine(line.name().into_owned()));
        }
        let [name, params, _range, body] = line.args() else {
            return Err(ReconstructError::Arity {
                op: "define-fun".to_string(),
                expected: 4,
                got: line.arg_count(),
            });
        };
        let mut scope = Scope::new();
        let mut vars = vec![];
        for p in params.args() {
            let v = binder_var(p)?;
            scope = scope.bind(&v.name, Expr::Var(v.clone()));
            vars.push(v);
        }
        Ok(Definition {
            name: strip_cruft(&name.name()).to_string(),
            params: vars,
            body: self.expr(body, &scope)?,
        })
    }
}
