// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! State shared by all sessions of a process.
//!
//! Sessions hold an `Arc<Services>`; [`Services::global`] is the instance
//! shared by default, but tests and embedders can create their own.

use crate::options::TypeEncoding;
use lazy_static::lazy_static;
use std::{
    collections::HashSet,
    sync::{Arc, Mutex, OnceLock},
};

/// Declarations sent at the start of every session unless the encoding is
/// monomorphic.
const BACKGROUND_PREDICATES: &str = r#"
(set-info :category "industrial")
(declare-sort |T@U| 0)
(declare-sort |T@T| 0)
(declare-fun real_pow (Real Real) Real)
(declare-fun UOrdering2 (|T@U| |T@U|) Bool)
(declare-fun UOrdering3 (|T@T| |T@U| |T@U|) Bool)"#;

/// Lock-protected registry of transcript names, and the background
/// declarations computed on first use.
#[derive(Debug, Default)]
pub struct Services {
    used_names: Mutex<HashSet<String>>,
    background: OnceLock<String>,
}

lazy_static! {
    static ref GLOBAL: Arc<Services> = Arc::new(Services::default());
}

impl Services {
    /// A fresh set of services, independent of the global one.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The services shared by every session that isn't given its own.
    pub fn global() -> Arc<Self> {
        GLOBAL.clone()
    }

    /// Reserve a file name derived from `base`: `base` itself if unused,
    /// otherwise the first free `base.1`, `base.2`, ...
    pub fn claim_name(&self, base: &str) -> String {
        let mut used = self.used_names.lock().unwrap();
        let mut name = base.to_string();
        let mut n = 1;
        while used.contains(&name) {
            name = format!("{base}.{n}");
            n += 1;
        }
        used.insert(name.clone());
        name
    }

    /// The background declarations. The encoding of the first caller decides
    /// them for the lifetime of these services.
    pub fn background_predicates(&self, encoding: TypeEncoding) -> &str {
        self.background.get_or_init(|| match encoding {
            TypeEncoding::Monomorphic => String::new(),
            TypeEncoding::Predicates | TypeEncoding::Arguments => {
                BACKGROUND_PREDICATES.to_string()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Services;
    use crate::options::TypeEncoding;
    use std::{sync::Arc, thread};

    #[test]
    fn test_claim_name() {
        let s = Services::new();
        assert_eq!(s.claim_name("vc.smt2"), "vc.smt2");
        assert_eq!(s.claim_name("vc.smt2"), "vc.smt2.1");
        assert_eq!(s.claim_name("vc.smt2"), "vc.smt2.2");
        assert_eq!(s.claim_name("other"), "other");
    }

    #[test]
    fn test_claim_name_concurrently() {
        let s = Services::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&s);
                thread::spawn(move || s.claim_name("log"))
            })
            .collect();
        let mut names: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
    }

    #[test]
    fn test_background_is_computed_once() {
        let s = Services::new();
        assert_eq!(s.background_predicates(TypeEncoding::Monomorphic), "");
        assert_eq!(s.background_predicates(TypeEncoding::Predicates), "");

        let s = Services::new();
        assert!(s
            .background_predicates(TypeEncoding::Arguments)
            .contains("(declare-sort |T@U| 0)"));
    }
}
