// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use fxhash::FxHasher;

use crate::{
    extension::ExtensionRef,
    factory::FormulaFactory,
    syntax::{BoundIdentDecl, Expression, Formula, TypedSlot},
    typing,
};

/// Unary predicate operators
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum UnaryPredOp {
    /// Negation
    Not,
}

/// Binary predicate operators
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum BinaryPredOp {
    /// Implication
    Limp,
    /// Equivalence
    Leqv,
}

impl BinaryPredOp {
    /// The operator id in the grammar.
    pub fn id(self) -> &'static str {
        match self {
            BinaryPredOp::Limp => "limp",
            BinaryPredOp::Leqv => "leqv",
        }
    }
}

/// Associative predicate operators
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum AssociativePredOp {
    /// Conjunction
    Land,
    /// Disjunction
    Lor,
}

impl AssociativePredOp {
    /// The operator id in the grammar.
    pub fn id(self) -> &'static str {
        match self {
            AssociativePredOp::Land => "land",
            AssociativePredOp::Lor => "lor",
        }
    }
}

/// Relational predicate operators
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum RelationalPredOp {
    Equal,
    NotEqual,
    /// Membership
    In,
    NotIn,
    /// Strict subset
    Subset,
    SubsetEq,
    NotSubset,
    NotSubsetEq,
}

/// Predicates over a list of expressions
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum MultiplePredOp {
    /// `partition(S, a, b, …)`: the sets after the first are pairwise disjoint
    /// and their union is the first set.
    Partition,
}

/// A kind of quantifier (forall or exists)
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum Quantifier {
    Forall,
    Exists,
}

/// An application of a predicate extension
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct ExtendedPredicate {
    /// The applied extension
    pub extension: ExtensionRef,
    /// Expression children
    pub expressions: Vec<Expression>,
    /// Predicate children, after the expressions
    pub predicates: Vec<Predicate>,
}

/// The kind of a predicate node, with its children.
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub enum PredKind {
    /// `⊤` or `⊥`
    Literal(bool),
    /// A unary operation
    Unary(UnaryPredOp, Predicate),
    /// A binary operation
    Binary(BinaryPredOp, Predicate, Predicate),
    /// An associative operation, with at least two children
    Associative(AssociativePredOp, Vec<Predicate>),
    /// A relation between two expressions
    Relational(RelationalPredOp, Expression, Expression),
    /// A predicate over a non-empty list of expressions
    Multiple(MultiplePredOp, Vec<Expression>),
    /// A quantified predicate. Children are the declarations, then the body.
    #[allow(missing_docs)]
    Quantified {
        quantifier: Quantifier,
        decls: Vec<BoundIdentDecl>,
        predicate: Predicate,
    },
    /// An extended predicate
    Extended(ExtendedPredicate),
}

impl PredKind {
    fn children(&self) -> Vec<Formula> {
        match self {
            PredKind::Literal(_) => vec![],
            PredKind::Unary(_, child) => vec![child.clone().into()],
            PredKind::Binary(_, left, right) => vec![left.clone().into(), right.clone().into()],
            PredKind::Associative(_, children) => {
                children.iter().cloned().map(Formula::from).collect()
            }
            PredKind::Relational(_, left, right) => {
                vec![left.clone().into(), right.clone().into()]
            }
            PredKind::Multiple(_, children) => {
                children.iter().cloned().map(Formula::from).collect()
            }
            PredKind::Quantified {
                decls, predicate, ..
            } => decls
                .iter()
                .cloned()
                .map(Formula::from)
                .chain([predicate.clone().into()])
                .collect(),
            PredKind::Extended(ext) => ext
                .expressions
                .iter()
                .cloned()
                .map(Formula::from)
                .chain(ext.predicates.iter().cloned().map(Formula::from))
                .collect(),
        }
    }
}

pub(crate) struct PredNode {
    kind: PredKind,
    factory: FormulaFactory,
    hash: u64,
    typed: TypedSlot<()>,
}

/// A predicate: a shared, immutable node.
///
/// Equality is structural; hashing is consistent with it.
#[derive(Clone)]
pub struct Predicate(Arc<PredNode>);

impl Predicate {
    pub(crate) fn new(factory: &FormulaFactory, kind: PredKind) -> Self {
        for child in kind.children() {
            let child_factory = match &child {
                Formula::Expression(expr) => expr.factory(),
                Formula::Predicate(pred) => pred.factory(),
                _ => continue,
            };
            assert!(
                child_factory == factory,
                "cannot mix formulas built by different factories"
            );
        }
        let mut hasher = FxHasher::default();
        kind.hash(&mut hasher);
        let typed = TypedSlot::new();
        if typing::synthesize_predicate(&kind) {
            typed.resolve(());
        }
        Predicate(Arc::new(PredNode {
            kind,
            factory: factory.clone(),
            hash: hasher.finish(),
            typed,
        }))
    }

    /// The kind of this node, with its children.
    pub fn kind(&self) -> &PredKind {
        &self.0.kind
    }

    /// The factory that built this node.
    pub fn factory(&self) -> &FormulaFactory {
        &self.0.factory
    }

    /// Whether this predicate and all of its sub-formulas are typed.
    pub fn is_type_checked(&self) -> bool {
        self.0.typed.get().is_some()
    }

    /// The direct children, in position order.
    pub fn children(&self) -> Vec<Formula> {
        self.0.kind.children()
    }

    /// The extension application, for extended predicates.
    pub fn as_extended(&self) -> Option<&ExtendedPredicate> {
        match &self.0.kind {
            PredKind::Extended(ext) => Some(ext),
            _ => None,
        }
    }

    pub(crate) fn slot(&self) -> &TypedSlot<()> {
        &self.0.typed
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.hash == other.0.hash && self.0.kind == other.0.kind)
    }
}

impl Eq for Predicate {}

impl Hash for Predicate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({self})")
    }
}
