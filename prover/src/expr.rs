// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The typed expressions exchanged with the solver.
//!
//! Verification conditions arrive in this form from the caller and are
//! linearized to SMT-LIB; solver output (fixed-point solutions, derivations)
//! is reconstructed back into it.

use itertools::Itertools;
use serde::Serialize;
use smtlib::sexp::{app, atom_i, atom_s, sexp_l, Sexp};
use std::{fmt, sync::Arc};

/// The sort of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Type {
    /// Booleans
    Bool,
    /// Mathematical integers
    Int,
    /// Total maps (SMT-LIB arrays) from `args` to `result`
    Map {
        /// The index sorts
        args: Vec<Type>,
        /// The value sort
        result: Box<Type>,
    },
}

impl Type {
    /// A map indexed by integers.
    pub fn int_map(result: Type) -> Self {
        Type::Map {
            args: vec![Type::Int],
            result: Box::new(result),
        }
    }

    /// The SMT-LIB rendition of this sort.
    pub fn to_sexp(&self) -> Sexp {
        match self {
            Type::Bool => atom_s("Bool"),
            Type::Int => atom_s("Int"),
            Type::Map { args, result } => {
                app("Array", args.iter().map(Type::to_sexp).chain([result.to_sexp()]))
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_sexp())
    }
}

/// A typed variable, either free (declared to the solver) or bound by a
/// quantifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Var {
    /// The variable's name
    pub name: String,
    /// Its sort
    pub ty: Type,
}

impl Var {
    #[allow(missing_docs)]
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }

    fn binder(&self) -> Sexp {
        app(&self.name, [self.ty.to_sexp()])
    }
}

/// A declared, uninterpreted function (a relation if its result is Bool).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Function {
    /// The function's name
    pub name: String,
    /// The argument sorts
    pub args: Vec<Type>,
    /// The result sort
    pub result: Type,
}

impl Function {
    #[allow(missing_docs)]
    pub fn new(name: &str, args: Vec<Type>, result: Type) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            args,
            result,
        })
    }

    /// The `declare-fun` command for this function.
    pub fn declaration(&self) -> Sexp {
        app(
            "declare-fun",
            [
                atom_s(&self.name),
                sexp_l(self.args.iter().map(Type::to_sexp)),
                self.result.to_sexp(),
            ],
        )
    }
}

/// Built-in operators.
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Le,
    Lt,
    Ge,
    Gt,
    And,
    Or,
    Not,
    Ite,
    Implies,
}

impl Op {
    /// Look up an operator by its SMT-LIB name.
    pub fn from_smt(name: &str) -> Option<Op> {
        let op = match name {
            "+" => Op::Add,
            "-" => Op::Sub,
            "*" => Op::Mul,
            "div" => Op::Div,
            "=" => Op::Eq,
            "<=" => Op::Le,
            "<" => Op::Lt,
            ">=" => Op::Ge,
            ">" => Op::Gt,
            "and" => Op::And,
            "or" => Op::Or,
            "not" => Op::Not,
            "ite" => Op::Ite,
            "=>" => Op::Implies,
            _ => return None,
        };
        Some(op)
    }

    /// The SMT-LIB name of this operator.
    pub fn smt_name(&self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "div",
            Op::Eq => "=",
            Op::Le => "<=",
            Op::Lt => "<",
            Op::Ge => ">=",
            Op::Gt => ">",
            Op::And => "and",
            Op::Or => "or",
            Op::Not => "not",
            Op::Ite => "ite",
            Op::Implies => "=>",
        }
    }

    /// Number of arguments the operator takes.
    pub fn arity(&self) -> usize {
        match self {
            Op::Not => 1,
            Op::Ite => 3,
            _ => 2,
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Quantifier {
    Forall,
    Exists,
}

/// A typed expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Expr {
    /// `true` or `false`
    Lit(bool),
    /// An integer literal
    Int(i64),
    /// A free or bound variable
    Var(Var),
    /// A built-in operator applied to arguments
    App(Op, Vec<Expr>),
    /// A declared function applied to arguments
    Call(Arc<Function>, Vec<Expr>),
    /// Map read: the map followed by the indices
    Select(Vec<Expr>),
    /// Map write: the map, the indices, then the new value
    Store(Vec<Expr>),
    /// A quantified formula, without triggers
    Quant {
        #[allow(missing_docs)]
        quantifier: Quantifier,
        #[allow(missing_docs)]
        binders: Vec<Var>,
        #[allow(missing_docs)]
        body: Box<Expr>,
    },
}

impl Default for Expr {
    fn default() -> Self {
        Expr::Lit(true)
    }
}

impl Expr {
    #[allow(missing_docs)]
    pub fn var(name: &str, ty: Type) -> Self {
        Expr::Var(Var::new(name, ty))
    }

    #[allow(missing_docs)]
    pub fn not(e: Expr) -> Self {
        Expr::App(Op::Not, vec![e])
    }

    #[allow(missing_docs)]
    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Expr::App(Op::Eq, vec![lhs, rhs])
    }

    /// Conjunction of any number of conjuncts; `true` if there are none.
    pub fn and<I: IntoIterator<Item = Expr>>(es: I) -> Self {
        let es = es.into_iter().collect::<Vec<_>>();
        if es.is_empty() {
            Expr::Lit(true)
        } else {
            Expr::App(Op::And, es)
        }
    }

    #[allow(missing_docs)]
    pub fn call(f: &Arc<Function>, args: Vec<Expr>) -> Self {
        Expr::Call(f.clone(), args)
    }

    #[allow(missing_docs)]
    pub fn forall(binders: Vec<Var>, body: Expr) -> Self {
        Expr::Quant {
            quantifier: Quantifier::Forall,
            binders,
            body: Box::new(body),
        }
    }

    /// The sort of the expression, if it can be determined.
    pub fn ty(&self) -> Option<Type> {
        match self {
            Expr::Lit(_) | Expr::Quant { .. } => Some(Type::Bool),
            Expr::Int(_) => Some(Type::Int),
            Expr::Var(v) => Some(v.ty.clone()),
            Expr::App(op, args) => match op {
                Op::Add | Op::Sub | Op::Mul | Op::Div => Some(Type::Int),
                Op::Ite => args.get(1).and_then(Expr::ty),
                _ => Some(Type::Bool),
            },
            Expr::Call(f, _) => Some(f.result.clone()),
            Expr::Select(args) => match args.first().and_then(Expr::ty) {
                Some(Type::Map { result, .. }) => Some(*result),
                _ => None,
            },
            Expr::Store(args) => args.first().and_then(Expr::ty),
        }
    }

    /// Convert to an S-expression.
    pub fn to_sexp(&self) -> Sexp {
        match self {
            Expr::Lit(true) => atom_s("true"),
            Expr::Lit(false) => atom_s("false"),
            Expr::Int(i) => {
                // lossless: i64 magnitudes always fit in u64
                let n = i.unsigned_abs();
                let n = usize::try_from(n).map(atom_i).unwrap_or_else(|_| atom_s(n.to_string()));
                if *i < 0 {
                    app("-", [n])
                } else {
                    n
                }
            }
            Expr::Var(v) => atom_s(&v.name),
            Expr::App(op, args) => app(op.smt_name(), args.iter().map(Expr::to_sexp)),
            Expr::Call(f, args) => {
                if args.is_empty() {
                    atom_s(&f.name)
                } else {
                    app(&f.name, args.iter().map(Expr::to_sexp))
                }
            }
            Expr::Select(args) => app("select", args.iter().map(Expr::to_sexp)),
            Expr::Store(args) => app("store", args.iter().map(Expr::to_sexp)),
            Expr::Quant {
                quantifier,
                binders,
                body,
            } => {
                let quantifier = match quantifier {
                    Quantifier::Forall => "forall",
                    Quantifier::Exists => "exists",
                };
                app(
                    quantifier,
                    [sexp_l(binders.iter().map(Var::binder)), body.to_sexp()],
                )
            }
        }
    }

    /// Every variable occurring free in the expression, in order of first
    /// occurrence.
    pub fn free_vars(&self) -> Vec<Var> {
        fn go(e: &Expr, bound: &mut Vec<String>, out: &mut Vec<Var>) {
            match e {
                Expr::Lit(_) | Expr::Int(_) => {}
                Expr::Var(v) => {
                    if !bound.contains(&v.name) && !out.contains(v) {
                        out.push(v.clone())
                    }
                }
                Expr::App(_, args)
                | Expr::Call(_, args)
                | Expr::Select(args)
                | Expr::Store(args) => args.iter().for_each(|a| go(a, bound, out)),
                Expr::Quant { binders, body, .. } => {
                    let n = bound.len();
                    bound.extend(binders.iter().map(|b| b.name.clone()));
                    go(body, bound, out);
                    bound.truncate(n);
                }
            }
        }
        let mut out = vec![];
        go(self, &mut vec![], &mut out);
        out
    }

    /// Every declared function applied in the expression, in order of first
    /// occurrence.
    pub fn functions(&self) -> Vec<Arc<Function>> {
        fn go(e: &Expr, out: &mut Vec<Arc<Function>>) {
            match e {
                Expr::Lit(_) | Expr::Int(_) | Expr::Var(_) => {}
                Expr::Call(f, args) => {
                    if !out.iter().any(|g| g.name == f.name) {
                        out.push(f.clone());
                    }
                    args.iter().for_each(|a| go(a, out));
                }
                Expr::App(_, args) | Expr::Select(args) | Expr::Store(args) => {
                    args.iter().for_each(|a| go(a, out))
                }
                Expr::Quant { body, .. } => go(body, out),
            }
        }
        let mut out = vec![];
        go(self, &mut out);
        out
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_sexp())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}): {}",
            self.name,
            self.args.iter().join(", "),
            self.result
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{Expr, Function, Op, Type, Var};

    #[test]
    fn test_linearize() {
        let x = Var::new("x", Type::Int);
        let a = Var::new("a", Type::int_map(Type::Bool));
        let p = Function::new("p", vec![Type::Int], Type::Bool);
        let e = Expr::forall(
            vec![x.clone()],
            Expr::App(
                Op::Implies,
                vec![
                    Expr::Select(vec![Expr::Var(a), Expr::Var(x.clone())]),
                    Expr::call(&p, vec![Expr::App(Op::Sub, vec![Expr::Var(x), Expr::Int(-3)])]),
                ],
            ),
        );
        insta::assert_snapshot!(e, @"(forall ((x Int)) (=> (select a x) (p (- x (- 3)))))");
        assert_eq!(e.ty(), Some(Type::Bool));
        assert_eq!(
            e.free_vars(),
            vec![Var::new("a", Type::int_map(Type::Bool))]
        );
        assert_eq!(e.functions(), vec![p.clone()]);
        insta::assert_snapshot!(p.declaration(), @"(declare-fun p (Int) Bool)");
        insta::assert_snapshot!(p, @"p(Int): Bool");
    }

    #[test]
    fn test_op_names() {
        for op in [
            Op::Add,
            Op::Sub,
            Op::Mul,
            Op::Div,
            Op::Eq,
            Op::Le,
            Op::Lt,
            Op::Ge,
            Op::Gt,
            Op::And,
            Op::Or,
            Op::Not,
            Op::Ite,
            Op::Implies,
        ] {
            assert_eq!(Op::from_smt(op.smt_name()), Some(op));
        }
        assert_eq!(Op::from_smt("select"), None);
        assert_eq!(Op::Ite.arity(), 3);
    }

    #[test]
    fn test_types() {
        insta::assert_snapshot!(Type::int_map(Type::Int), @"(Array Int Int)");
        let ite = Expr::App(
            Op::Ite,
            vec![Expr::Lit(true), Expr::Int(1), Expr::Int(2)],
        );
        assert_eq!(ite.ty(), Some(Type::Int));
        assert_eq!(Expr::and([]), Expr::Lit(true));
    }
}
