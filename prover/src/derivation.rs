// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Relational fixed-point problems and the artifacts the solver returns for
//! them: solutions, conjectures, and counterexample derivations.
//!
//! A derivation is printed by the solver as a flat list of proof steps
//!
//! ```text
//! (derivation
//!   (step conclusion rule!n (subst (= x v) ...) (labels l ...) (ref true|step ...))
//!   ...
//!   query-step)
//! ```
//!
//! where each step may only refer to steps listed before it. The last step
//! concludes the query itself and is not part of the counterexample.

use crate::{
    error::DerivationError,
    expr::{Expr, Function, Var},
    model::Model,
    reconstruct::{strip_cruft, Definition, Reconstructor},
};
use smtlib::sexp::Sexp;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::Arc,
};

/// Index of a node of an [`Rpfp`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Index of an edge of an [`Rpfp`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub usize);

/// A relation over the parameters, e.g. a solution for a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformer {
    #[allow(missing_docs)]
    pub params: Vec<Var>,
    #[allow(missing_docs)]
    pub body: Expr,
}

impl From<Definition> for Transformer {
    fn from(def: Definition) -> Self {
        Self {
            params: def.params,
            body: def.body,
        }
    }
}

/// An unknown predicate of the problem.
#[derive(Debug, Clone)]
pub struct Node {
    /// The relation the solver knows the predicate as
    pub relation: Arc<Function>,
    /// The solution found for it, if it was requested
    pub annotation: Option<Transformer>,
}

/// A Horn rule deriving `parent` from `children`.
#[derive(Debug, Clone)]
pub struct Edge {
    #[allow(missing_docs)]
    pub parent: NodeId,
    #[allow(missing_docs)]
    pub children: Vec<NodeId>,
    /// The rule as a closed formula, sent as `(rule ...)`
    pub rule: Expr,
}

/// A bound on a predicate conjectured by the solver.
#[derive(Debug, Clone)]
pub struct Conjecture {
    #[allow(missing_docs)]
    pub node: NodeId,
    #[allow(missing_docs)]
    pub bound: Transformer,
}

/// A relational fixed-point problem: predicates, the rules relating them, and
/// the query whose unreachability is to be proven.
#[derive(Debug, Clone)]
pub struct Rpfp {
    #[allow(missing_docs)]
    pub nodes: Vec<Node>,
    #[allow(missing_docs)]
    pub edges: Vec<Edge>,
    /// Sent as `(query ...)`
    pub query: Expr,
    /// Conjectures read back after a query
    pub conjectures: Vec<Conjecture>,
}

impl Rpfp {
    /// A problem with no predicates yet.
    pub fn new(query: Expr) -> Self {
        Self {
            nodes: vec![],
            edges: vec![],
            query,
            conjectures: vec![],
        }
    }

    /// Add a predicate.
    pub fn add_node(&mut self, relation: &Arc<Function>) -> NodeId {
        self.nodes.push(Node {
            relation: relation.clone(),
            annotation: None,
        });
        NodeId(self.nodes.len() - 1)
    }

    /// Add a rule. Rules are numbered from 1 in order of addition, which is
    /// how the solver refers to them (`rule!n`).
    pub fn add_edge(&mut self, parent: NodeId, children: Vec<NodeId>, rule: Expr) -> EdgeId {
        self.edges.push(Edge {
            parent,
            children,
            rule,
        });
        EdgeId(self.edges.len() - 1)
    }

    #[allow(missing_docs)]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Look up predicates by relation name.
    pub fn node_map(&self) -> HashMap<&str, NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.relation.name.as_str(), NodeId(i)))
            .collect()
    }

    /// Record the solution printed in a `(fixedpoint (define-fun ...) ...)`
    /// reply as the annotation of each predicate.
    ///
    /// Definitions of internal symbols (starting with `@`) are ignored; any
    /// other unknown predicate is an error.
    pub fn apply_solution(
        &mut self,
        resp: &Sexp,
        r: &Reconstructor,
    ) -> Result<(), DerivationError> {
        for (id, def) in self.definitions(resp.args(), r)? {
            self.nodes[id.0].annotation = Some(def.into());
        }
        Ok(())
    }

    /// Add the `define-fun`s in `defs` as conjectures.
    pub fn add_conjectures(
        &mut self,
        defs: &[Sexp],
        r: &Reconstructor,
    ) -> Result<(), DerivationError> {
        for (node, def) in self.definitions(defs, r)? {
            self.conjectures.push(Conjecture {
                node,
                bound: def.into(),
            });
        }
        Ok(())
    }

    fn definitions(
        &self,
        lines: &[Sexp],
        r: &Reconstructor,
    ) -> Result<Vec<(NodeId, Definition)>, DerivationError> {
        let pmap = self.node_map();
        let mut defs = vec![];
        for line in lines {
            let def = r.define_fun(line)?;
            match pmap.get(def.name.as_str()) {
                Some(&id) => defs.push((id, def)),
                None if def.name.starts_with('@') => {}
                None => return Err(DerivationError::UnknownPredicate(def.name)),
            }
        }
        Ok(defs)
    }
}

/// Index of a node of a [`Derivation`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CexNodeId(pub usize);

/// A node of a counterexample: a copy of a predicate of the problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CexNode {
    /// The step of the derivation that concluded this node
    pub step: String,
    /// Copy of the predicate's relation
    pub relation: Arc<Function>,
    /// The predicate of the problem this node instantiates
    pub map: NodeId,
}

/// One application of a rule in a counterexample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CexEdge {
    #[allow(missing_docs)]
    pub parent: CexNodeId,
    /// The premises; `None` where the solver printed `true` or referred to a
    /// step about an internal symbol
    pub children: Vec<Option<CexNodeId>>,
    /// The rule of the problem that was applied
    pub map: EdgeId,
    /// Labels reported on this application
    pub labels: BTreeSet<String>,
    /// Values of the rule's variables, printed by the solver
    pub subst: BTreeMap<String, String>,
}

/// A counterexample to a fixed-point query: a tree (in general a DAG) of rule
/// applications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivation {
    #[allow(missing_docs)]
    pub nodes: Vec<CexNode>,
    /// One edge per proof step, in the order of the steps
    pub edges: Vec<CexEdge>,
    /// The conclusion of the last step before the query
    pub root: CexNodeId,
    /// The model the solver printed along with the derivation
    pub background_model: Option<Model>,
}

impl Derivation {
    #[allow(missing_docs)]
    pub fn node(&self, id: CexNodeId) -> &CexNode {
        &self.nodes[id.0]
    }

    /// The edge concluding `node`.
    pub fn edge_of(&self, node: CexNodeId) -> Option<&CexEdge> {
        self.edges.iter().find(|e| e.parent == node)
    }
}

fn children(
    refs: &Sexp,
    steps: &HashMap<String, CexNodeId>,
    internal: &HashSet<String>,
) -> Result<Vec<Option<CexNodeId>>, DerivationError> {
    if refs.name() != "ref" || refs.list().is_none() {
        return Err(DerivationError::BadReferences(refs.to_string()));
    }
    refs.args()
        .iter()
        .map(|c| match c.name().as_ref() {
            "true" => Ok(None),
            name if internal.contains(name) => Ok(None),
            name => steps
                .get(name)
                .map(|&id| Some(id))
                .ok_or_else(|| DerivationError::UnknownReference(c.to_string())),
        })
        .collect()
}

fn rule_index(rule: &Sexp, num_edges: usize) -> Result<EdgeId, DerivationError> {
    let bad = || DerivationError::BadRule(rule.to_string());
    let n: usize = rule
        .name()
        .strip_prefix("rule!")
        .ok_or_else(bad)?
        .parse()
        .map_err(|_| bad())?;
    if n == 0 || n > num_edges {
        return Err(bad());
    }
    Ok(EdgeId(n - 1))
}

fn labels(labs: &Sexp) -> Result<BTreeSet<String>, DerivationError> {
    if labs.name() != "labels" || labs.list().is_none() {
        return Err(DerivationError::BadLabels(labs.to_string()));
    }
    Ok(labs.args().iter().map(|l| l.name().into_owned()).collect())
}

fn subst(subst: &Sexp) -> Result<BTreeMap<String, String>, DerivationError> {
    if subst.name() != "subst" || subst.list().is_none() {
        return Err(DerivationError::BadSubst(subst.to_string()));
    }
    let mut map = BTreeMap::new();
    for eq in subst.args() {
        match eq.args() {
            [x, v] if eq.name() == "=" => {
                map.insert(strip_cruft(&x.name()).to_string(), v.to_string());
            }
            _ => return Err(DerivationError::BadEquation(eq.to_string())),
        }
    }
    Ok(map)
}

/// Build the counterexample printed as a `(derivation ...)` reply to a query
/// on `rpfp`.
pub fn build_derivation(rpfp: &Rpfp, resp: &Sexp) -> Result<Derivation, DerivationError> {
    let pmap = rpfp.node_map();
    let lines = resp.args();
    let mut nodes = vec![];
    let mut edges = vec![];
    let mut steps: HashMap<String, CexNodeId> = HashMap::new();
    // steps about internal symbols; referring to one is like referring to `true`
    let mut internal: HashSet<String> = HashSet::new();
    let mut root = None;

    for line in &lines[..lines.len().saturating_sub(1)] {
        let Some([name, conseq, rule, sub, labs, refs]) = line.list() else {
            return Err(DerivationError::BadLine(line.to_string()));
        };
        let pred = conseq.name();
        let pred = strip_cruft(&pred);
        let Some(&template) = pmap.get(pred) else {
            if pred.starts_with('@') {
                log::debug!("skipping derivation step for internal symbol {pred}");
                internal.insert(name.name().into_owned());
                continue;
            }
            return Err(DerivationError::UnknownPredicate(pred.to_string()));
        };
        let step = name.name().into_owned();
        if steps.contains_key(&step) {
            return Err(DerivationError::DuplicateStep(step));
        }
        let children = children(refs, &steps, &internal)?;
        let map = rule_index(rule, rpfp.edges.len())?;
        let labels = labels(labs)?;
        let subst = subst(sub)?;

        let id = CexNodeId(nodes.len());
        nodes.push(CexNode {
            step: step.clone(),
            relation: Arc::new(rpfp.node(template).relation.as_ref().clone()),
            map: template,
        });
        edges.push(CexEdge {
            parent: id,
            children,
            map,
            labels,
            subst,
        });
        steps.insert(step, id);
        root = Some(id);
    }

    match root {
        Some(root) => Ok(Derivation {
            nodes,
            edges,
            root,
            background_model: None,
        }),
        None => Err(DerivationError::Empty(resp.to_string())),
    }
}
