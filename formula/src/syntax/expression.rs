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
    syntax::{BoundIdentDecl, Formula, Predicate, TypeState, TypedSlot},
    types::Type,
    typing,
};

/// Binary expression operators
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum BinaryExprOp {
    /// Maplet `a ↦ b`
    Mapsto,
    /// Function application `f(x)`
    FunImage,
    /// Relational image `r[s]`
    RelImage,
    /// Cartesian product
    Cprod,
    /// Direct product
    Dprod,
    /// Set of relations
    Rel,
    /// Set of total functions
    Tfun,
    /// Set of total injections
    Tinj,
    /// Set of total surjections
    Tsur,
    /// Set of total bijections
    Tbij,
    /// Set of total surjective relations
    Strel,
    SetMinus,
    /// Domain restriction
    DomRes,
}

impl BinaryExprOp {
    /// The operator id in the grammar.
    pub fn id(self) -> &'static str {
        match self {
            BinaryExprOp::Mapsto => "mapsto",
            BinaryExprOp::FunImage => "funimage",
            BinaryExprOp::RelImage => "relimage",
            BinaryExprOp::Cprod => "cprod",
            BinaryExprOp::Dprod => "dprod",
            BinaryExprOp::Rel => "rel",
            BinaryExprOp::Tfun => "tfun",
            BinaryExprOp::Tinj => "tinj",
            BinaryExprOp::Tsur => "tsur",
            BinaryExprOp::Tbij => "tbij",
            BinaryExprOp::Strel => "strel",
            BinaryExprOp::SetMinus => "setminus",
            BinaryExprOp::DomRes => "domres",
        }
    }

    /// The operator symbol, for infix operators.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryExprOp::Mapsto => "↦",
            BinaryExprOp::FunImage | BinaryExprOp::RelImage => "",
            BinaryExprOp::Cprod => "×",
            BinaryExprOp::Dprod => "⊗",
            BinaryExprOp::Rel => "↔",
            BinaryExprOp::Tfun => "→",
            BinaryExprOp::Tinj => "↣",
            BinaryExprOp::Tsur => "↠",
            BinaryExprOp::Tbij => "⤖",
            // Rodin math font code points
            BinaryExprOp::Strel => "\u{e102}",
            BinaryExprOp::SetMinus => "∖",
            BinaryExprOp::DomRes => "◁",
        }
    }

    /// Whether the operator is written between its operands.
    pub fn is_infix(self) -> bool {
        !matches!(self, BinaryExprOp::FunImage | BinaryExprOp::RelImage)
    }

    /// All binary expression operators.
    pub const ALL: [BinaryExprOp; 13] = [
        BinaryExprOp::Mapsto,
        BinaryExprOp::FunImage,
        BinaryExprOp::RelImage,
        BinaryExprOp::Cprod,
        BinaryExprOp::Dprod,
        BinaryExprOp::Rel,
        BinaryExprOp::Tfun,
        BinaryExprOp::Tinj,
        BinaryExprOp::Tsur,
        BinaryExprOp::Tbij,
        BinaryExprOp::Strel,
        BinaryExprOp::SetMinus,
        BinaryExprOp::DomRes,
    ];
}

/// Unary expression operators
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum UnaryExprOp {
    Converse,
    Dom,
    Ran,
    /// Power set
    Pow,
}

/// Associative expression operators
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum AssociativeExprOp {
    Union,
    Inter,
    /// Relational overriding
    Ovr,
}

impl AssociativeExprOp {
    /// The operator id in the grammar.
    pub fn id(self) -> &'static str {
        match self {
            AssociativeExprOp::Union => "union",
            AssociativeExprOp::Inter => "inter",
            AssociativeExprOp::Ovr => "ovr",
        }
    }

    /// The operator symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            AssociativeExprOp::Union => "∪",
            AssociativeExprOp::Inter => "∩",
            AssociativeExprOp::Ovr => "\u{e103}",
        }
    }

    /// All associative expression operators.
    pub const ALL: [AssociativeExprOp; 3] = [
        AssociativeExprOp::Union,
        AssociativeExprOp::Inter,
        AssociativeExprOp::Ovr,
    ];
}

/// Atomic expressions
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum AtomicExpr {
    EmptySet,
    /// The set `BOOL`
    BoolSet,
    True,
    False,
}

/// Quantified expression operators
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum QuantifiedExprOp {
    /// Set comprehension `{x · P ∣ E}`
    Cset,
    /// Quantified union
    Qunion,
    /// Quantified intersection
    Qinter,
}

/// An application of an expression extension
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct ExtendedExpression {
    /// The applied extension
    pub extension: ExtensionRef,
    /// Expression children
    pub expressions: Vec<Expression>,
    /// Predicate children, after the expressions
    pub predicates: Vec<Predicate>,
}

/// The kind of an expression node, with its children.
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub enum ExprKind {
    /// A binary operation
    Binary(BinaryExprOp, Expression, Expression),
    /// A unary operation
    Unary(UnaryExprOp, Expression),
    /// An associative operation, with at least two children
    Associative(AssociativeExprOp, Vec<Expression>),
    /// An atomic expression
    Atomic(AtomicExpr),
    /// `{a, b, …}`
    SetExtension(Vec<Expression>),
    /// `bool(P)`
    Bool(Predicate),
    /// A quantified expression. Children are the declarations, then the
    /// predicate, then the expression.
    #[allow(missing_docs)]
    Quantified {
        op: QuantifiedExprOp,
        decls: Vec<BoundIdentDecl>,
        predicate: Predicate,
        expression: Expression,
    },
    /// A bound identifier, as a de Bruijn index: 0 denotes the last
    /// declaration of the innermost quantifier.
    BoundIdentifier(usize),
    /// A free identifier
    FreeIdentifier(String),
    /// An extended expression
    Extended(ExtendedExpression),
}

impl ExprKind {
    fn children(&self) -> Vec<Formula> {
        match self {
            ExprKind::Binary(_, left, right) => vec![left.clone().into(), right.clone().into()],
            ExprKind::Unary(_, child) => vec![child.clone().into()],
            ExprKind::Associative(_, children) | ExprKind::SetExtension(children) => {
                children.iter().cloned().map(Formula::from).collect()
            }
            ExprKind::Atomic(_) | ExprKind::BoundIdentifier(_) | ExprKind::FreeIdentifier(_) => {
                vec![]
            }
            ExprKind::Bool(pred) => vec![pred.clone().into()],
            ExprKind::Quantified {
                decls,
                predicate,
                expression,
                ..
            } => decls
                .iter()
                .cloned()
                .map(Formula::from)
                .chain([predicate.clone().into(), expression.clone().into()])
                .collect(),
            ExprKind::Extended(ext) => ext
                .expressions
                .iter()
                .cloned()
                .map(Formula::from)
                .chain(ext.predicates.iter().cloned().map(Formula::from))
                .collect(),
        }
    }
}

pub(crate) struct ExprNode {
    kind: ExprKind,
    factory: FormulaFactory,
    hash: u64,
    // the type given at construction, checked by `type_check` even when it
    // could not be synthesized
    explicit: Option<Type>,
    ty: TypedSlot<Type>,
}

/// An expression: a shared, immutable node.
///
/// Equality is structural and ignores types; hashing is consistent with it.
#[derive(Clone)]
pub struct Expression(Arc<ExprNode>);

impl Expression {
    /// Build a node, typing it when its children are typed. Only called by
    /// the factory, which checks the arities.
    pub(crate) fn new(factory: &FormulaFactory, kind: ExprKind, ty: Option<Type>) -> Self {
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
        let slot = TypedSlot::new();
        if let Some(ty) = typing::synthesize_expression(&kind, ty.as_ref()) {
            slot.resolve(ty);
        }
        Expression(Arc::new(ExprNode {
            kind,
            factory: factory.clone(),
            hash: hasher.finish(),
            explicit: ty,
            ty: slot,
        }))
    }

    /// The kind of this node, with its children.
    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    /// The factory that built this node.
    pub fn factory(&self) -> &FormulaFactory {
        &self.0.factory
    }

    /// The type of this expression, once known.
    pub fn ty(&self) -> Option<&Type> {
        self.0.ty.get()
    }

    /// The type given when the node was built, if any. It constrains the
    /// node even when it conflicts with its children.
    pub fn explicit_type(&self) -> Option<&Type> {
        self.0.explicit.as_ref()
    }

    /// Whether the type is known.
    pub fn type_state(&self) -> TypeState<'_, Type> {
        self.0.ty.state()
    }

    /// Whether this expression (and thus all of its sub-formulas) is typed.
    pub fn is_type_checked(&self) -> bool {
        self.ty().is_some()
    }

    /// The direct children, in position order.
    pub fn children(&self) -> Vec<Formula> {
        self.0.kind.children()
    }

    /// The name of a free identifier.
    pub fn as_free_identifier(&self) -> Option<&str> {
        match &self.0.kind {
            ExprKind::FreeIdentifier(name) => Some(name),
            _ => None,
        }
    }

    /// The extension application, for extended expressions.
    pub fn as_extended(&self) -> Option<&ExtendedExpression> {
        match &self.0.kind {
            ExprKind::Extended(ext) => Some(ext),
            _ => None,
        }
    }

    /// Whether this expression denotes a type, seen as a set: a given set
    /// `S` (typed `ℙ(S)`), `BOOL`, or a power set, cartesian product or type
    /// constructor applied to type expressions.
    pub fn is_type_expression(&self) -> bool {
        match &self.0.kind {
            ExprKind::FreeIdentifier(name) => matches!(
                self.ty().and_then(Type::base_type),
                Some(Type::Given(given)) if given == name
            ),
            ExprKind::Atomic(AtomicExpr::BoolSet) => true,
            ExprKind::Unary(UnaryExprOp::Pow, child) => child.is_type_expression(),
            ExprKind::Binary(BinaryExprOp::Cprod, left, right) => {
                left.is_type_expression() && right.is_type_expression()
            }
            ExprKind::Extended(ext) => {
                ext.extension.is_type_constructor()
                    && ext.expressions.iter().all(Expression::is_type_expression)
            }
            _ => false,
        }
    }

    pub(crate) fn slot(&self) -> &TypedSlot<Type> {
        &self.0.ty
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.hash == other.0.hash && self.0.kind == other.0.kind)
    }
}

impl Eq for Expression {}

impl Hash for Expression {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash)
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expression({self})")
    }
}
