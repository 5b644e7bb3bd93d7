// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The operator grammar registry.
//!
//! The grammar decides whether two infix operators may follow each other
//! without parentheses (`a op1 b op2 c`) and, if so, how the resulting tree is
//! shaped. It is assembled by a [GrammarBuilder] during factory setup and then
//! frozen into an [OperatorGrammar], which is only ever read.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::syntax::{AssociativeExprOp, AssociativePredOp, BinaryExprOp, BinaryPredOp};

/// An error in the operator grammar or in its use
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// The two operators cannot follow each other without parentheses.
    #[allow(missing_docs)]
    #[error("operators {left} and {right} require parentheses")]
    IllegalJuxtaposition { left: String, right: String },
    /// A grammar declaration is inconsistent.
    #[error("invalid extension configuration: {0}")]
    InvalidExtensionConfiguration(String),
    /// The operator was never declared.
    #[error("unknown operator {0}")]
    UnknownOperator(String),
}

/// The node shape an infix operator builds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorShape {
    /// A node with exactly two children
    Binary,
    /// A variadic node
    Associative,
}

/// How `a left b right c` is shaped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Juxtaposition {
    /// `a left (b right c)`
    LeftParent,
    /// `(a left b) right c`
    RightParent,
    /// `left(a, b, c)`, for an associative operator
    Flatten,
}

/// Mutable grammar, only used during setup.
#[derive(Debug, Clone, Default)]
pub struct GrammarBuilder {
    shapes: BTreeMap<String, OperatorShape>,
    // (lower, higher): the lower priority operator is the parent
    priorities: BTreeSet<(String, String)>,
    compatibilities: BTreeSet<(String, String)>,
    associative: BTreeSet<String>,
}

impl GrammarBuilder {
    /// A grammar with no operator.
    pub fn new() -> Self {
        Self::default()
    }

    /// The grammar of the core operators.
    ///
    /// Priorities go, from lowest to highest: maplets, then the relation set
    /// constructors, then the other binary set operators. Implication and
    /// equivalence have a lower priority than conjunction and disjunction.
    /// The relation set constructors are compatible with one another.
    pub fn with_core_operators() -> Self {
        let mut grammar = Self::new();
        for op in BinaryExprOp::ALL.into_iter().filter(|op| op.is_infix()) {
            grammar.declare(op.id(), OperatorShape::Binary);
        }
        for op in AssociativeExprOp::ALL {
            grammar.declare(op.id(), OperatorShape::Associative);
            grammar.associative.insert(op.id().to_string());
        }
        for op in [BinaryPredOp::Limp, BinaryPredOp::Leqv] {
            grammar.declare(op.id(), OperatorShape::Binary);
        }
        for op in [AssociativePredOp::Land, AssociativePredOp::Lor] {
            grammar.declare(op.id(), OperatorShape::Associative);
            grammar.associative.insert(op.id().to_string());
        }

        let relation_sets = [
            BinaryExprOp::Rel,
            BinaryExprOp::Tfun,
            BinaryExprOp::Tinj,
            BinaryExprOp::Tsur,
            BinaryExprOp::Tbij,
            BinaryExprOp::Strel,
        ]
        .map(BinaryExprOp::id);
        let set_operators = [
            AssociativeExprOp::Union.id(),
            AssociativeExprOp::Inter.id(),
            AssociativeExprOp::Ovr.id(),
            BinaryExprOp::SetMinus.id(),
            BinaryExprOp::Cprod.id(),
            BinaryExprOp::Dprod.id(),
            BinaryExprOp::DomRes.id(),
        ];
        let tiers: [&[&str]; 3] = [&[BinaryExprOp::Mapsto.id()], &relation_sets, &set_operators];
        for (i, lower) in tiers.iter().enumerate() {
            for higher in &tiers[i + 1..] {
                for l in lower.iter() {
                    for h in higher.iter() {
                        grammar.insert_priority(l, h);
                    }
                }
            }
        }
        for l in [BinaryPredOp::Limp.id(), BinaryPredOp::Leqv.id()] {
            for h in [AssociativePredOp::Land.id(), AssociativePredOp::Lor.id()] {
                grammar.insert_priority(l, h);
            }
        }
        for l in relation_sets {
            for r in relation_sets {
                grammar
                    .compatibilities
                    .insert((l.to_string(), r.to_string()));
            }
        }
        grammar
    }

    fn insert_priority(&mut self, lower: &str, higher: &str) {
        self.priorities
            .insert((lower.to_string(), higher.to_string()));
    }

    fn check_declared(&self, id: &str) -> Result<OperatorShape, GrammarError> {
        self.shapes
            .get(id)
            .copied()
            .ok_or_else(|| GrammarError::UnknownOperator(id.to_string()))
    }

    /// Declare an operator and the shape of the nodes it builds.
    pub fn declare(&mut self, id: &str, shape: OperatorShape) {
        self.shapes.insert(id.to_string(), shape);
    }

    /// State that `lower` has a lower priority than `higher`: in
    /// `a lower b higher c` as well as in `a higher b lower c`, the `lower`
    /// node is the parent.
    pub fn add_priority(&mut self, lower: &str, higher: &str) -> Result<(), GrammarError> {
        self.check_declared(lower)?;
        self.check_declared(higher)?;
        if lower == higher {
            return Err(GrammarError::InvalidExtensionConfiguration(format!(
                "operator {lower} cannot have a priority over itself"
            )));
        }
        self.insert_priority(lower, higher);
        Ok(())
    }

    /// State that `right` may follow `left` without parentheses. The
    /// compatibility is oriented.
    pub fn add_compatibility(&mut self, left: &str, right: &str) -> Result<(), GrammarError> {
        self.check_declared(left)?;
        self.check_declared(right)?;
        self.compatibilities
            .insert((left.to_string(), right.to_string()));
        Ok(())
    }

    /// Mark an operator as associative: repeated occurrences are flattened
    /// into a single node. Only operators with an associative shape qualify.
    pub fn add_associativity(&mut self, id: &str) -> Result<(), GrammarError> {
        match self.check_declared(id)? {
            OperatorShape::Associative => {
                self.associative.insert(id.to_string());
                Ok(())
            }
            OperatorShape::Binary => Err(GrammarError::InvalidExtensionConfiguration(format!(
                "operator {id} is binary and cannot be associative"
            ))),
        }
    }

    /// Freeze the grammar. Priorities are closed transitively; a cycle of
    /// priorities is rejected.
    pub fn build(self) -> Result<OperatorGrammar, GrammarError> {
        let mut closure = self.priorities;
        loop {
            let mut added = vec![];
            for (a, b) in &closure {
                for (c, d) in closure.range((b.clone(), String::new())..) {
                    if c != b {
                        break;
                    }
                    if !closure.contains(&(a.clone(), d.clone())) {
                        added.push((a.clone(), d.clone()));
                    }
                }
            }
            if added.is_empty() {
                break;
            }
            closure.extend(added);
        }
        if let Some((op, _)) = closure.iter().find(|(a, b)| a == b) {
            return Err(GrammarError::InvalidExtensionConfiguration(format!(
                "cyclic priorities through operator {op}"
            )));
        }
        log::debug!(
            "froze operator grammar with {} operators and {} priorities",
            self.shapes.len(),
            closure.len()
        );
        Ok(OperatorGrammar {
            shapes: self.shapes,
            priorities: closure,
            compatibilities: self.compatibilities,
            associative: self.associative,
        })
    }
}

/// A frozen operator grammar.
#[derive(Debug, Clone)]
pub struct OperatorGrammar {
    shapes: BTreeMap<String, OperatorShape>,
    priorities: BTreeSet<(String, String)>,
    compatibilities: BTreeSet<(String, String)>,
    associative: BTreeSet<String>,
}

/// A tree of operator applications, as shaped by [OperatorGrammar::shape].
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpTree<T> {
    Leaf(T),
    Node {
        operator: String,
        children: Vec<OpTree<T>>,
    },
}

impl OperatorGrammar {
    /// The shape of a declared operator.
    pub fn shape_of(&self, id: &str) -> Option<OperatorShape> {
        self.shapes.get(id).copied()
    }

    /// Whether the operator is associative.
    pub fn is_associative(&self, id: &str) -> bool {
        self.associative.contains(id)
    }

    /// Whether `lower` has a lower priority than `higher`, directly or by
    /// transitivity.
    pub fn has_priority(&self, lower: &str, higher: &str) -> bool {
        self.priorities
            .contains(&(lower.to_string(), higher.to_string()))
    }

    /// Whether an explicit compatibility `left -> right` was declared.
    pub fn is_compatible(&self, left: &str, right: &str) -> bool {
        self.compatibilities
            .contains(&(left.to_string(), right.to_string()))
    }

    /// Decide how `a left b right c` is shaped.
    pub fn juxtapose(&self, left: &str, right: &str) -> Result<Juxtaposition, GrammarError> {
        for id in [left, right] {
            if !self.shapes.contains_key(id) {
                return Err(GrammarError::UnknownOperator(id.to_string()));
            }
        }
        if self.has_priority(left, right) {
            return Ok(Juxtaposition::LeftParent);
        }
        if self.has_priority(right, left) {
            return Ok(Juxtaposition::RightParent);
        }
        if left == right && self.is_associative(left) {
            return Ok(Juxtaposition::Flatten);
        }
        if self.is_compatible(left, right) {
            return Ok(Juxtaposition::LeftParent);
        }
        Err(GrammarError::IllegalJuxtaposition {
            left: left.to_string(),
            right: right.to_string(),
        })
    }

    /// Shape a sequence `first op1 a1 op2 a2 …` into a tree, or report the
    /// first pair of operators that cannot follow each other.
    pub fn shape<T>(&self, first: T, rest: Vec<(String, T)>) -> Result<OpTree<T>, GrammarError> {
        // open nodes along the right spine, outermost first; each holds all
        // of its children but the last
        if let Some((op, _)) = rest.iter().find(|(op, _)| !self.shapes.contains_key(op)) {
            return Err(GrammarError::UnknownOperator(op.clone()));
        }
        let mut spine: Vec<(String, Vec<OpTree<T>>)> = vec![];
        let mut current = OpTree::Leaf(first);
        for (op, operand) in rest {
            loop {
                let Some((top, _)) = spine.last() else {
                    break;
                };
                match self.juxtapose(top, &op)? {
                    Juxtaposition::LeftParent => break,
                    Juxtaposition::Flatten => break,
                    Juxtaposition::RightParent => {
                        if let Some((operator, mut children)) = spine.pop() {
                            children.push(current);
                            current = OpTree::Node { operator, children };
                        }
                    }
                }
            }
            let flatten = matches!(
                spine.last(),
                Some((top, _)) if *top == op && self.is_associative(&op)
            );
            match spine.last_mut() {
                Some((_, children)) if flatten => children.push(current),
                _ => spine.push((op, vec![current])),
            }
            current = OpTree::Leaf(operand);
        }
        while let Some((operator, mut children)) = spine.pop() {
            children.push(current);
            current = OpTree::Node { operator, children };
        }
        Ok(current)
    }
}

/// Additional grammar declarations, read from a JSON configuration file.
///
/// ```json
/// {
///   "priorities": [["mapsto", "myop"]],
///   "compatibilities": [["myop", "myop"]],
///   "associative": ["myassoc"]
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    /// Pairs `(lower, higher)`
    pub priorities: Vec<(String, String)>,
    /// Pairs `(left, right)`
    pub compatibilities: Vec<(String, String)>,
    /// Associative operators
    pub associative: Vec<String>,
}

impl LanguageConfig {
    /// Parse a configuration file.
    pub fn from_json(text: &str) -> Result<Self, GrammarError> {
        serde_json::from_str(text)
            .map_err(|e| GrammarError::InvalidExtensionConfiguration(e.to_string()))
    }

    /// Add the declarations of this file to a grammar under construction.
    pub fn apply(&self, builder: &mut GrammarBuilder) -> Result<(), GrammarError> {
        for (lower, higher) in &self.priorities {
            builder.add_priority(lower, higher)?;
        }
        for (left, right) in &self.compatibilities {
            builder.add_compatibility(left, right)?;
        }
        for id in &self.associative {
            builder.add_associativity(id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn core() -> OperatorGrammar {
        GrammarBuilder::with_core_operators().build().unwrap()
    }

    fn operands(ops: &[&str]) -> Vec<(String, char)> {
        ops.iter()
            .zip('b'..)
            .map(|(op, c)| (op.to_string(), c))
            .collect()
    }

    fn print(tree: &OpTree<char>) -> String {
        match tree {
            OpTree::Leaf(c) => c.to_string(),
            OpTree::Node { operator, children } => {
                format!("{operator}({})", children.iter().map(print).join(", "))
            }
        }
    }

    #[test]
    fn test_associative_flattening() {
        let tree = core()
            .shape('a', operands(&["union", "union"]))
            .unwrap();
        assert_eq!(print(&tree), "union(a, b, c)");
        let tree = core()
            .shape('a', operands(&["land", "land", "land"]))
            .unwrap();
        assert_eq!(print(&tree), "land(a, b, c, d)");
    }

    #[test]
    fn test_priorities() {
        let grammar = core();
        assert!(grammar.has_priority("mapsto", "union"));
        assert_eq!(
            grammar.juxtapose("mapsto", "cprod"),
            Ok(Juxtaposition::LeftParent)
        );
        assert_eq!(
            grammar.juxtapose("cprod", "mapsto"),
            Ok(Juxtaposition::RightParent)
        );
        let tree = grammar
            .shape('a', operands(&["cprod", "mapsto", "union", "union"]))
            .unwrap();
        assert_eq!(print(&tree), "mapsto(cprod(a, b), union(c, d, e))");
        let tree = grammar.shape('a', operands(&["limp", "land"])).unwrap();
        assert_eq!(print(&tree), "limp(a, land(b, c))");
    }

    #[test]
    fn test_oriented_compatibility() {
        let grammar = core();
        let tree = grammar.shape('a', operands(&["tfun", "rel"])).unwrap();
        assert_eq!(print(&tree), "tfun(a, rel(b, c))");

        let mut builder = GrammarBuilder::new();
        builder.declare("op1", OperatorShape::Binary);
        builder.declare("op2", OperatorShape::Binary);
        builder.add_compatibility("op1", "op2").unwrap();
        let grammar = builder.build().unwrap();
        assert_eq!(grammar.juxtapose("op1", "op2"), Ok(Juxtaposition::LeftParent));
        assert!(matches!(
            grammar.juxtapose("op2", "op1"),
            Err(GrammarError::IllegalJuxtaposition { .. })
        ));
    }

    #[test]
    fn test_self_compatibility_does_not_flatten() {
        let mut builder = GrammarBuilder::new();
        builder.declare("op", OperatorShape::Associative);
        builder.add_compatibility("op", "op").unwrap();
        let grammar = builder.build().unwrap();
        let tree = grammar.shape('a', operands(&["op", "op"])).unwrap();
        assert_eq!(print(&tree), "op(a, op(b, c))");
    }

    #[test]
    fn test_unrelated_operators_are_illegal() {
        let grammar = core();
        for (left, right) in [("union", "inter"), ("inter", "union"), ("limp", "leqv")] {
            assert_eq!(
                grammar.juxtapose(left, right),
                Err(GrammarError::IllegalJuxtaposition {
                    left: left.to_string(),
                    right: right.to_string(),
                })
            );
        }
        assert!(grammar.shape('a', operands(&["union", "inter"])).is_err());
        assert!(grammar.shape('a', operands(&["inter", "union"])).is_err());
    }

    #[test]
    fn test_unknown_operator() {
        let grammar = core();
        let unknown = Err(GrammarError::UnknownOperator("nope".to_string()));
        assert_eq!(grammar.shape('a', operands(&["nope"])), unknown);
        assert_eq!(grammar.shape('a', operands(&["nope", "union"])), unknown);
        assert_eq!(grammar.shape('a', operands(&["union", "nope"])), unknown);
    }

    #[test]
    fn test_invalid_configuration() {
        let mut builder = GrammarBuilder::with_core_operators();
        assert!(matches!(
            builder.add_associativity("mapsto"),
            Err(GrammarError::InvalidExtensionConfiguration(_))
        ));
        assert_eq!(
            builder.add_compatibility("nope", "union"),
            Err(GrammarError::UnknownOperator("nope".to_string()))
        );
        builder.add_priority("union", "mapsto").unwrap();
        assert!(matches!(
            builder.build(),
            Err(GrammarError::InvalidExtensionConfiguration(_))
        ));
    }

    #[test]
    fn test_language_config() {
        let config = LanguageConfig::from_json(
            r#"{"compatibilities": [["setminus", "setminus"]], "associative": ["ovr"]}"#,
        )
        .unwrap();
        assert!(config.priorities.is_empty());
        let mut builder = GrammarBuilder::with_core_operators();
        config.apply(&mut builder).unwrap();
        let grammar = builder.build().unwrap();
        assert!(grammar.is_compatible("setminus", "setminus"));
        assert!(LanguageConfig::from_json("{\"priorities\": 3}").is_err());
    }
}
