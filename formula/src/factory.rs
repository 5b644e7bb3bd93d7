// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Factory configurations and node constructors.
//!
//! A [FormulaFactory] is a frozen configuration: the language version, the
//! registered extensions and datatypes, and the operator grammar. It is
//! assembled once by a [FactoryBuilder] and then shared read-only by every
//! formula it builds. Formulas built by different factories cannot be mixed.

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    datatype::DatatypeRef,
    extension::{ArityRange, Extension, ExtensionKind, ExtensionRef, Notation, Typing},
    grammar::{GrammarBuilder, GrammarError, LanguageConfig, OperatorGrammar, OperatorShape},
    syntax::*,
    types::Type,
};

/// Versions of the mathematical language
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LanguageVersion {
    V1,
    #[default]
    V2,
}

/// An error while assembling a factory configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FactoryError {
    /// Two extensions share an id
    #[error("extension {0} is already registered")]
    DuplicateExtension(String),
    /// An extension with expression children has no argument type pattern
    #[error("extension {0} takes expressions but declares no argument types")]
    MissingArgumentTypes(String),
    /// The operator grammar is invalid
    #[error(transparent)]
    Grammar(#[from] GrammarError),
}

struct FactoryConfig {
    version: LanguageVersion,
    extensions: BTreeMap<String, ExtensionRef>,
    datatypes: Vec<DatatypeRef>,
    grammar: OperatorGrammar,
}

/// A frozen factory configuration, cheap to clone and share.
///
/// Two factories are equal only when they are clones of the same built
/// configuration.
#[derive(Clone)]
pub struct FormulaFactory(Arc<FactoryConfig>);

impl PartialEq for FormulaFactory {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for FormulaFactory {}

impl fmt::Debug for FormulaFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormulaFactory")
            .field("version", &self.0.version)
            .field("extensions", &self.0.extensions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Assembles a [FormulaFactory].
#[derive(Debug, Clone)]
pub struct FactoryBuilder {
    version: LanguageVersion,
    extensions: BTreeMap<String, ExtensionRef>,
    datatypes: Vec<DatatypeRef>,
    grammar: GrammarBuilder,
}

impl FactoryBuilder {
    /// Set the language version.
    pub fn version(&mut self, version: LanguageVersion) -> &mut Self {
        self.version = version;
        self
    }

    /// Register an extension. Infix and associative extensions are declared
    /// as operators of the grammar.
    pub fn extension(&mut self, extension: Extension) -> Result<&mut Self, FactoryError> {
        if self.extensions.contains_key(&extension.id) {
            return Err(FactoryError::DuplicateExtension(extension.id));
        }
        if let Typing::Rule { args, .. } = &extension.typing {
            if args.is_empty() && extension.arity.expressions != ArityRange::Fixed(0) {
                return Err(FactoryError::MissingArgumentTypes(extension.id));
            }
        }
        match extension.notation {
            Notation::Prefix => {}
            Notation::Infix => {
                self.grammar.declare(&extension.id, OperatorShape::Binary);
            }
            Notation::Associative => {
                self.grammar
                    .declare(&extension.id, OperatorShape::Associative);
                self.grammar.add_associativity(&extension.id)?;
            }
        }
        self.extensions
            .insert(extension.id.clone(), ExtensionRef::new(extension));
        Ok(self)
    }

    /// Register a datatype with all of its extensions.
    pub fn datatype(&mut self, datatype: &DatatypeRef) -> Result<&mut Self, FactoryError> {
        for extension in datatype.extensions() {
            self.extension(extension)?;
        }
        self.datatypes.push(datatype.clone());
        Ok(self)
    }

    /// The grammar under construction, to add priorities and compatibilities.
    pub fn grammar(&mut self) -> &mut GrammarBuilder {
        &mut self.grammar
    }

    /// Apply a language configuration file to the grammar.
    pub fn configure(&mut self, config: &LanguageConfig) -> Result<&mut Self, FactoryError> {
        config.apply(&mut self.grammar)?;
        Ok(self)
    }

    /// Freeze the configuration.
    pub fn build(self) -> Result<FormulaFactory, FactoryError> {
        let grammar = self.grammar.build()?;
        log::debug!(
            "built formula factory {:?} with {} extensions",
            self.version,
            self.extensions.len()
        );
        Ok(FormulaFactory(Arc::new(FactoryConfig {
            version: self.version,
            extensions: self.extensions,
            datatypes: self.datatypes,
            grammar,
        })))
    }
}

/// Configuration accessors
impl FormulaFactory {
    /// Start assembling a configuration over the core operators.
    pub fn builder() -> FactoryBuilder {
        FactoryBuilder {
            version: LanguageVersion::default(),
            extensions: BTreeMap::new(),
            datatypes: vec![],
            grammar: GrammarBuilder::with_core_operators(),
        }
    }

    /// The language version.
    pub fn version(&self) -> LanguageVersion {
        self.0.version
    }

    /// The registered extension with this id.
    pub fn extension(&self, id: &str) -> Option<&ExtensionRef> {
        self.0.extensions.get(id)
    }

    /// All registered extensions, by id.
    pub fn extensions(&self) -> impl Iterator<Item = &ExtensionRef> {
        self.0.extensions.values()
    }

    /// The registered datatypes, in registration order.
    pub fn datatypes(&self) -> &[DatatypeRef] {
        &self.0.datatypes
    }

    /// The operator grammar.
    pub fn grammar(&self) -> &OperatorGrammar {
        &self.0.grammar
    }

    /// The type constructor extension of a registered datatype.
    ///
    /// Panics if the datatype is not registered in this factory.
    pub fn type_constructor(&self, datatype: &DatatypeRef) -> &ExtensionRef {
        self.extension(datatype.name())
            .filter(|ext| ext.is_type_constructor())
            .unwrap_or_else(|| panic!("datatype {} is not registered", datatype.name()))
    }

    /// A configuration with the same version and grammar, keeping only the
    /// extensions that do not come from a datatype.
    pub fn without_datatypes(&self) -> FormulaFactory {
        let extensions = self
            .0
            .extensions
            .iter()
            .filter(|(_, ext)| ext.datatype().is_none())
            .map(|(id, ext)| (id.clone(), ext.clone()))
            .collect();
        FormulaFactory(Arc::new(FactoryConfig {
            version: self.0.version,
            extensions,
            datatypes: vec![],
            grammar: self.0.grammar.clone(),
        }))
    }

    fn check_extension(
        &self,
        extension: &ExtensionRef,
        kind: ExtensionKind,
        exprs: usize,
        preds: usize,
    ) {
        assert!(
            self.extension(&extension.id).is_some(),
            "extension {} is not registered in this factory",
            extension.id
        );
        assert_eq!(extension.kind, kind, "wrong kind of extension {}", extension.id);
        assert!(
            extension.arity.expressions.contains(exprs),
            "extension {} expects {} expressions, got {exprs}",
            extension.id,
            extension.arity.expressions
        );
        assert!(
            extension.arity.predicates.contains(preds),
            "extension {} expects {} predicates, got {preds}",
            extension.id,
            extension.arity.predicates
        );
    }
}

/// Expression constructors. Leaves take an optional type; other nodes are
/// typed as soon as all of their children are typed.
impl FormulaFactory {
    /// A free identifier.
    pub fn make_free_identifier(&self, name: &str, ty: Option<Type>) -> Expression {
        Expression::new(self, ExprKind::FreeIdentifier(name.to_string()), ty)
    }

    /// A bound identifier with a de Bruijn index.
    pub fn make_bound_identifier(&self, index: usize, ty: Option<Type>) -> Expression {
        Expression::new(self, ExprKind::BoundIdentifier(index), ty)
    }

    /// An atomic expression. The type is only needed for `∅`.
    pub fn make_atomic_expression(&self, atom: AtomicExpr, ty: Option<Type>) -> Expression {
        Expression::new(self, ExprKind::Atomic(atom), ty)
    }

    /// A binary expression.
    pub fn make_binary_expression(
        &self,
        op: BinaryExprOp,
        left: Expression,
        right: Expression,
    ) -> Expression {
        Expression::new(self, ExprKind::Binary(op, left, right), None)
    }

    /// A unary expression.
    pub fn make_unary_expression(&self, op: UnaryExprOp, child: Expression) -> Expression {
        Expression::new(self, ExprKind::Unary(op, child), None)
    }

    /// An associative expression over at least two children.
    pub fn make_associative_expression(
        &self,
        op: AssociativeExprOp,
        children: Vec<Expression>,
    ) -> Expression {
        assert!(children.len() >= 2, "associative expressions need two children");
        Expression::new(self, ExprKind::Associative(op, children), None)
    }

    /// A set in extension. The type is only needed when `members` is empty.
    pub fn make_set_extension(&self, members: Vec<Expression>, ty: Option<Type>) -> Expression {
        Expression::new(self, ExprKind::SetExtension(members), ty)
    }

    /// `bool(P)`
    pub fn make_bool_expression(&self, predicate: Predicate) -> Expression {
        Expression::new(self, ExprKind::Bool(predicate), None)
    }

    /// A quantified expression.
    pub fn make_quantified_expression(
        &self,
        op: QuantifiedExprOp,
        decls: Vec<BoundIdentDecl>,
        predicate: Predicate,
        expression: Expression,
    ) -> Expression {
        assert!(!decls.is_empty(), "a quantifier declares at least one identifier");
        Expression::new(
            self,
            ExprKind::Quantified {
                op,
                decls,
                predicate,
                expression,
            },
            None,
        )
    }

    /// An extended expression. The type is only needed when it cannot be
    /// derived from the children.
    pub fn make_extended_expression(
        &self,
        extension: &ExtensionRef,
        expressions: Vec<Expression>,
        predicates: Vec<Predicate>,
        ty: Option<Type>,
    ) -> Expression {
        self.check_extension(
            extension,
            ExtensionKind::Expression,
            expressions.len(),
            predicates.len(),
        );
        Expression::new(
            self,
            ExprKind::Extended(ExtendedExpression {
                extension: extension.clone(),
                expressions,
                predicates,
            }),
            ty,
        )
    }

    /// The declaration of a bound identifier.
    pub fn make_bound_ident_decl(&self, name: &str, ty: Option<Type>) -> BoundIdentDecl {
        BoundIdentDecl::new(name, ty)
    }

    /// The expression denoting a type, seen as the set of all of its values.
    ///
    /// Panics if a parametric type refers to a datatype that is not
    /// registered in this factory.
    pub fn type_expression(&self, ty: &Type) -> Expression {
        match ty {
            Type::Boolean => self.make_atomic_expression(AtomicExpr::BoolSet, None),
            Type::Given(name) => {
                self.make_free_identifier(name, Some(Type::power(ty.clone())))
            }
            Type::Power(base) => {
                self.make_unary_expression(UnaryExprOp::Pow, self.type_expression(base))
            }
            Type::Product(left, right) => self.make_binary_expression(
                BinaryExprOp::Cprod,
                self.type_expression(left),
                self.type_expression(right),
            ),
            Type::Parametric(instance) => self.make_extended_expression(
                self.type_constructor(&instance.datatype),
                instance
                    .params
                    .iter()
                    .map(|param| self.type_expression(param))
                    .collect(),
                vec![],
                None,
            ),
        }
    }
}

/// Predicate constructors.
impl FormulaFactory {
    /// `⊤` or `⊥`
    pub fn make_literal_predicate(&self, value: bool) -> Predicate {
        Predicate::new(self, PredKind::Literal(value))
    }

    /// A unary predicate.
    pub fn make_unary_predicate(&self, op: UnaryPredOp, child: Predicate) -> Predicate {
        Predicate::new(self, PredKind::Unary(op, child))
    }

    /// A binary predicate.
    pub fn make_binary_predicate(
        &self,
        op: BinaryPredOp,
        left: Predicate,
        right: Predicate,
    ) -> Predicate {
        Predicate::new(self, PredKind::Binary(op, left, right))
    }

    /// An associative predicate over at least two children.
    pub fn make_associative_predicate(
        &self,
        op: AssociativePredOp,
        children: Vec<Predicate>,
    ) -> Predicate {
        assert!(children.len() >= 2, "associative predicates need two children");
        Predicate::new(self, PredKind::Associative(op, children))
    }

    /// A relational predicate.
    pub fn make_relational_predicate(
        &self,
        op: RelationalPredOp,
        left: Expression,
        right: Expression,
    ) -> Predicate {
        Predicate::new(self, PredKind::Relational(op, left, right))
    }

    /// A predicate over a non-empty list of expressions.
    pub fn make_multiple_predicate(
        &self,
        op: MultiplePredOp,
        children: Vec<Expression>,
    ) -> Predicate {
        assert!(!children.is_empty(), "a partition needs at least one set");
        Predicate::new(self, PredKind::Multiple(op, children))
    }

    /// A quantified predicate.
    pub fn make_quantified_predicate(
        &self,
        quantifier: Quantifier,
        decls: Vec<BoundIdentDecl>,
        predicate: Predicate,
    ) -> Predicate {
        assert!(!decls.is_empty(), "a quantifier declares at least one identifier");
        Predicate::new(
            self,
            PredKind::Quantified {
                quantifier,
                decls,
                predicate,
            },
        )
    }

    /// An extended predicate.
    pub fn make_extended_predicate(
        &self,
        extension: &ExtensionRef,
        expressions: Vec<Expression>,
        predicates: Vec<Predicate>,
    ) -> Predicate {
        self.check_extension(
            extension,
            ExtensionKind::Predicate,
            expressions.len(),
            predicates.len(),
        );
        Predicate::new(
            self,
            PredKind::Extended(ExtendedPredicate {
                extension: extension.clone(),
                expressions,
                predicates,
            }),
        )
    }
}

/// Assignment constructors. The assigned expressions must be distinct free
/// identifiers.
impl FormulaFactory {
    /// `x, y ≔ E, F`
    pub fn make_becomes_equal_to(
        &self,
        lhs: Vec<Expression>,
        values: Vec<Expression>,
    ) -> Assignment {
        Assignment::new(self, lhs, AssignKind::BecomesEqualTo(values))
    }

    /// `x :∈ S`
    pub fn make_becomes_member_of(&self, lhs: Expression, set: Expression) -> Assignment {
        Assignment::new(self, vec![lhs], AssignKind::BecomesMemberOf(set))
    }

    /// `x, y :∣ P`, where `primed` declares the after values referred to by
    /// `condition`.
    pub fn make_becomes_such_that(
        &self,
        lhs: Vec<Expression>,
        primed: Vec<BoundIdentDecl>,
        condition: Predicate,
    ) -> Assignment {
        Assignment::new(self, lhs, AssignKind::BecomesSuchThat { primed, condition })
    }
}
