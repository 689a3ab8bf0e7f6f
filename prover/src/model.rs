// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Counter-models returned by the solver.
//!
//! The session does not interpret models. The text of a `(get-model)` reply is
//! wrapped in an `Error model:` document and handed to a [`ModelParser`].

use serde::Serialize;
use smtlib::sexp::Sexp;
use std::fmt;

/// The header starting each model in a model document.
pub const MODEL_HEADER: &str = "Error model: ";

/// Which model syntax the solver prints.
#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum ModelFormat {
    /// The solver's own model format
    Native,
    /// Plain SMT-LIB2 `define-fun`s
    SmtLib2,
}

/// An interpretation of the declared symbols, opaque to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Model {
    /// The model's body
    pub text: String,
    /// The syntax the body is in
    pub format: ModelFormat,
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Turns a model document into models.
pub trait ModelParser: fmt::Debug + Send + Sync {
    /// Parse every model in `doc`.
    fn parse(&self, doc: &str, format: ModelFormat) -> Result<Vec<Model>, String>;
}

/// Splits a document at its model headers, keeping each body verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawModels;

impl ModelParser for RawModels {
    fn parse(&self, doc: &str, format: ModelFormat) -> Result<Vec<Model>, String> {
        let header = MODEL_HEADER.trim_end();
        let mut models: Vec<Model> = vec![];
        for line in doc.lines() {
            if line.trim_end() == header {
                models.push(Model {
                    text: String::new(),
                    format,
                });
                continue;
            }
            match models.last_mut() {
                Some(m) => {
                    m.text.push_str(line);
                    m.text.push('\n');
                }
                None if line.trim().is_empty() => {}
                None => return Err(format!("text before the first model: {line}")),
            }
        }
        Ok(models)
    }
}

/// The body of a model reply: `(model ...)`, a bare list of definitions, or a
/// legacy `->` table atom.
pub fn model_text(resp: &Sexp) -> Option<String> {
    let name = resp.name();
    let is_list = resp.list().is_some();
    if (name == "model" && resp.arg_count() >= 1) || (is_list && name.is_empty()) {
        let mut text = String::new();
        for arg in resp.args() {
            text.push_str(&arg.to_string());
            text.push('\n');
        }
        Some(text)
    } else if resp.arg_count() == 0 && name.contains("->") {
        Some(name.into_owned())
    } else {
        None
    }
}

/// Wrap a model body in a document for a [`ModelParser`].
pub fn model_document(body: &str) -> String {
    format!("{MODEL_HEADER}\n{body}")
}

#[cfg(test)]
mod tests {
    use super::{model_document, model_text, ModelFormat, ModelParser, RawModels};
    use smtlib::sexp::parse;

    #[test]
    fn test_model_text() {
        let resp = parse("(model (define-fun x () Int 3) (define-fun b () Bool false))").unwrap();
        assert_eq!(
            model_text(&resp).unwrap(),
            "(define-fun x () Int 3)\n(define-fun b () Bool false)\n"
        );
        let resp = parse("((define-fun x () Int 3))").unwrap();
        assert_eq!(model_text(&resp).unwrap(), "(define-fun x () Int 3)\n");
        assert_eq!(model_text(&parse("()").unwrap()).unwrap(), "");
        assert_eq!(model_text(&parse("sat").unwrap()), None);
        assert_eq!(model_text(&parse("(model)").unwrap()), None);
    }

    #[test]
    fn test_raw_models() {
        let doc = model_document("(define-fun x () Int 3)\n");
        let models = RawModels.parse(&doc, ModelFormat::SmtLib2).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].text, "(define-fun x () Int 3)\n");

        let two = format!("{doc}{doc}");
        assert_eq!(RawModels.parse(&two, ModelFormat::Native).unwrap().len(), 2);
        assert!(RawModels.parse("x -> 1", ModelFormat::Native).is_err());
    }
}
