// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A custom s-expression data type and parsing.
//!
//! This implementation supports comments as part of the grammar, since solvers
//! are free to interleave them with their replies. Replies handed out by the
//! [`reader`](crate::reader) have their comments stripped.
//!
//! Besides the structural view ([`Sexp::list`]), the protocol driver looks at
//! replies through a *name and children* view: an atom is a name with no
//! children, a list whose first element is an atom is named by that atom, and
//! any other list is anonymous (its name is `""`) with all of its elements as
//! children. See [`Sexp::name`] and [`Sexp::args`].

use peg::str::LineCol;
use serde::Serialize;
use std::{borrow::Cow, fmt};

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, PartialOrd, Ord)]
pub enum Atom {
    I(usize),
    S(String),
}

impl Atom {
    /// The textual name of the atom; integers are printed in decimal.
    pub fn name(&self) -> Cow<'_, str> {
        match self {
            Atom::I(i) => Cow::Owned(i.to_string()),
            Atom::S(s) => Cow::Borrowed(s),
        }
    }
}

/// An s-expression which also tracks comments.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, PartialOrd, Ord)]
pub enum Sexp {
    Atom(Atom),
    Comment(String),
    List(Vec<Sexp>),
}

/// Construct an sexp atom from a string.
pub fn atom_s<S: AsRef<str>>(s: S) -> Sexp {
    Sexp::Atom(Atom::S(s.as_ref().to_string()))
}

/// Construct an sexp atom from an integer.
pub fn atom_i(i: usize) -> Sexp {
    Sexp::Atom(Atom::I(i))
}

/// Construct an sexp list from an iteratable.
pub fn sexp_l<I>(i: I) -> Sexp
where
    I: IntoIterator,
    I::IntoIter: Iterator<Item = Sexp>,
{
    Sexp::List(i.into_iter().collect())
}

/// Construct an sexp list with a string atom as its "head" element, followed by
/// an iterable of remaining arguments.
pub fn app<I>(head: &str, args: I) -> Sexp
where
    I: IntoIterator,
    I::IntoIter: Iterator<Item = Sexp>,
{
    let mut ss = vec![atom_s(head)];
    #[allow(clippy::useless_conversion)]
    ss.extend(args.into_iter());
    Sexp::List(ss)
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::I(i) => write!(f, "{i}"),
            Atom::S(s) => {
                if s.is_empty() || s.contains([' ', '\"', '\'', '\n', '(', ')']) {
                    write!(f, "|{s}|")
                } else if s.contains('|') {
                    write!(f, "\"{s}\"")
                } else {
                    write!(f, "{s}")
                }
            }
        }
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Atom(s) => write!(f, "{s}"),
            Sexp::Comment(s) => write!(f, ";{s}"),
            Sexp::List(ss) => {
                write!(f, "(")?;
                for (i, s) in ss.iter().enumerate() {
                    let last = i == ss.len() - 1;
                    let this_comment = matches!(s, Sexp::Comment(_));
                    let next_comment = !last && matches!(ss[i + 1], Sexp::Comment(_));
                    let space = if last || this_comment || next_comment {
                        ""
                    } else {
                        " "
                    };
                    if this_comment {
                        write!(f, "\n{s}\n{space}")?;
                    } else {
                        write!(f, "{s}{space}")?;
                    }
                }
                write!(f, ")")?;
                Ok(())
            }
        }
    }
}

impl Sexp {
    /// Return the inner elements if self is a Sexp::List
    pub fn list(&self) -> Option<&[Sexp]> {
        if let Sexp::List(ss) = self {
            Some(ss)
        } else {
            None
        }
    }

    /// Return the inner string if self is a string atom.
    pub fn atom_s(&self) -> Option<&str> {
        if let Sexp::Atom(Atom::S(s)) = self {
            Some(s)
        } else {
            None
        }
    }

    /// The name of this node: the atom itself for a leaf, the head atom of a
    /// list, or `""` for an anonymous list (empty, or headed by a list).
    pub fn name(&self) -> Cow<'_, str> {
        match self {
            Sexp::Atom(a) => a.name(),
            Sexp::Comment(_) => Cow::Borrowed(""),
            Sexp::List(ss) => match ss.first() {
                Some(Sexp::Atom(a)) => a.name(),
                _ => Cow::Borrowed(""),
            },
        }
    }

    /// The children of this node in the name view (see [`Sexp::name`]).
    pub fn args(&self) -> &[Sexp] {
        match self {
            Sexp::Atom(_) | Sexp::Comment(_) => &[],
            Sexp::List(ss) => match ss.first() {
                Some(Sexp::Atom(_)) => &ss[1..],
                _ => ss,
            },
        }
    }

    /// Number of children in the name view.
    pub fn arg_count(&self) -> usize {
        self.args().len()
    }

    /// Remove all comments, recursively.
    pub fn strip_comments(self) -> Sexp {
        match self {
            Sexp::List(ss) => Sexp::List(
                ss.into_iter()
                    .filter(|s| !matches!(s, Sexp::Comment(_)))
                    .map(Sexp::strip_comments)
                    .collect(),
            ),
            s => s,
        }
    }
}

peg::parser! {
grammar parser() for str {
  rule symbol_char() = ['a'..='z' | 'A'..='Z' | '_' | '\'' | '<' | '>' | ':' | '=' | '$' | '@'
                       | '+' | '-' | '*' | '!' | '%' | '~' | '^' | '&' | '.' | '?' | '/' | '#']
  rule ident_start() = symbol_char()
  rule ident_char() = symbol_char() / ['0'..='9']
  rule ident() = quiet! { ident_start() ident_char()* } / expected!("atom")

  rule whitespace() = [' ' | '\t' | '\n' | '\r']
  rule _ = whitespace()*

  rule quoted_atom() -> Atom
  = "\"" s:$(([^'"'] / "\"\"")*) "\"" { Atom::S(s.replace("\"\"", "\"")) }

  rule pipe_quoted_atom() -> Atom
  = "|" s:$([^'|']*) "|" { Atom::S(s.to_string()) }

  rule unquoted_atom() -> Atom
  = s:$(ident()) { Atom::S(s.to_string()) }

  rule decimal_atom() -> Atom
  = s:$(['0'..='9']+ "." ['0'..='9']+) { Atom::S(s.to_string()) }

  rule int_atom() -> Atom
  = i:$(['0'..='9']+) {
      match i.parse() {
          Ok(n) => Atom::I(n),
          // numerals beyond usize are kept verbatim
          Err(_) => Atom::S(i.to_string()),
      }
  }

  rule atom() -> Sexp
  = s:(quoted_atom() /
       pipe_quoted_atom() /
       unquoted_atom() /
       decimal_atom() /
       int_atom()) { Sexp::Atom(s) }

  rule comment() -> Sexp
  = ";" s:$(([^'\n']*)) ['\n'] { Sexp::Comment(s.to_string()) }

  rule list() -> Sexp
  = "(" _ ss:(sexp() ** _) _ ")" { Sexp::List(ss) }

  rule sexp() -> Sexp
  = atom() / comment() / list()

  /// Parse an sexp but be tolerant to whitespace around it.
  pub(super) rule sexp_whitespace() -> Sexp
  = _ s:sexp() _ { s }

  /// Parse a sequence of sexps.
  pub(super) rule sexps() -> Vec<Sexp>
  = _ ss:(sexp() ** _) _ { ss }
}
}

/// Parse an sexp.
///
/// Allows whitespace before or after.
pub fn parse(s: &str) -> Result<Sexp, peg::error::ParseError<LineCol>> {
    parser::sexp_whitespace(s)
}

/// Parse a sequence of sexps, separated by whitespace.
pub fn parse_many(s: &str) -> Result<Vec<Sexp>, peg::error::ParseError<LineCol>> {
    parser::sexps(s)
}

#[cfg(test)]
mod tests {
    use super::parse;
    use super::{app, atom_i, atom_s, sexp_l, Sexp};

    #[test]
    fn test_parsing() {
        assert_eq!(
            parse("(foo  a (bar () 1))"),
            Ok(app(
                "foo",
                [atom_s("a"), app("bar", [sexp_l([]), atom_i(1)])]
            ))
        );
    }

    #[test]
    fn test_app_from_iterator() {
        let args = (1..4).map(atom_i);
        insta::assert_snapshot!(app("distinct", args), @"(distinct 1 2 3)");
        assert_eq!(app("f", Vec::<Sexp>::new()), sexp_l([atom_s("f")]));
    }

    #[test]
    fn test_printing() {
        let e = parse(
            r#"(hello a b c (there
            ; here's a comment
            (friend)))
            "#,
        )
        .unwrap();
        insta::assert_snapshot!(e, @r#"
        (hello a b c (there
        ; here's a comment
        (friend)))
        "#);
        insta::assert_snapshot!(e.strip_comments(), @"(hello a b c (there (friend)))");
    }

    #[test]
    fn test_parsing_solver_symbols() {
        let s = vec![
            "(p A!val!0)",
            "(q foo.thread@0)",
            "<<DONE>>\n",
            "(:reason-unknown \"timeout\")",
            "(labels |@12| |+7|)",
            "%lbl%@3",
            "(/ 1.5 2.0)",
            "(error \"line 1: \"\"x\"\" unknown\")",
        ]
        .into_iter()
        .map(|s| parse(s).unwrap_or_else(|err| panic!("`{s}` did not parse: {err}")));
        let printed: Vec<String> = s.map(|s| s.to_string()).collect();
        insta::assert_snapshot!(printed.join("\n"), @r###"
        (p A!val!0)
        (q foo.thread@0)
        <<DONE>>
        (:reason-unknown timeout)
        (labels @12 +7)
        %lbl%@3
        (/ 1.5 2.0)
        (error |line 1: "x" unknown|)
        "###);
    }

    #[test]
    fn test_name_view() {
        let e = parse("((ControlFlow 0 0) 5)").unwrap();
        assert_eq!(e.name(), "");
        assert_eq!(e.arg_count(), 2);
        assert_eq!(e.args()[1].name(), "5");
        assert_eq!(e.args()[1].arg_count(), 0);

        let e = parse("(- 3)").unwrap();
        assert_eq!(e.name(), "-");
        assert_eq!(e.args(), &[atom_i(3)]);

        let e = parse("()").unwrap();
        assert_eq!(e.name(), "");
        assert!(e.args().is_empty());

        let e = parse("(ref true n!1)").unwrap();
        assert_eq!(e.name(), "ref");
        assert_eq!(
            e.args().iter().map(|a| a.name().to_string()).collect::<Vec<_>>(),
            vec!["true", "n!1"]
        );
    }

    #[test]
    fn test_huge_numeral_is_kept() {
        let e = parse("123456789012345678901234567890").unwrap();
        assert_eq!(e, atom_s("123456789012345678901234567890"));
        assert!(matches!(parse("12").unwrap(), Sexp::Atom(_)));
    }

    #[test]
    fn test_roundtrip_parsing() {
        let mut es = vec![];
        for s in vec![
            r#"  "hello there" "#,
            r#"|"hello"|"#,
            r#"|also has a space|"#,
            r#"(forall ((x Int)) (= x x@@0))"#,
        ]
        .into_iter()
        {
            let e = parse(s).unwrap_or_else(|_| panic!("`{s}` did not parse"));
            es.push(e.clone());
            assert_eq!(
                parse(&e.to_string()).unwrap(),
                e,
                "`{s}` does not roundtrip",
            );
        }
        insta::assert_snapshot!(&es[0], @"|hello there|");
        insta::assert_snapshot!(&es[1], @r#"|"hello"|"#);
        insta::assert_snapshot!(&es[2], @"|also has a space|");
    }
}
