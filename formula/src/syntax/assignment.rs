// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

use std::{
    collections::BTreeSet,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use fxhash::FxHasher;

use crate::{
    factory::FormulaFactory,
    rewrite,
    syntax::{
        AssociativePredOp, AtomicExpr, BoundIdentDecl, Expression, FormulaError, Predicate,
        Quantifier, RelationalPredOp, TypedSlot,
    },
    typing,
};

/// The right-hand side of an assignment
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub enum AssignKind {
    /// `x, y ≔ E, F`: one expression per assigned identifier
    BecomesEqualTo(Vec<Expression>),
    /// `x :∈ S`: a single assigned identifier
    BecomesMemberOf(Expression),
    /// `x, y :∣ P`: `P` refers to the after values through one primed
    /// declaration per assigned identifier
    #[allow(missing_docs)]
    BecomesSuchThat {
        primed: Vec<BoundIdentDecl>,
        condition: Predicate,
    },
}

pub(crate) struct AssignNode {
    lhs: Vec<Expression>,
    kind: AssignKind,
    factory: FormulaFactory,
    hash: u64,
    typed: TypedSlot<()>,
}

/// An assignment of new values to free identifiers.
///
/// Assignments are terminal: they are never rewritten nor descended into.
#[derive(Clone)]
pub struct Assignment(Arc<AssignNode>);

impl Assignment {
    pub(crate) fn new(factory: &FormulaFactory, lhs: Vec<Expression>, kind: AssignKind) -> Self {
        assert!(!lhs.is_empty(), "an assignment assigns at least one identifier");
        let mut names = BTreeSet::new();
        for ident in &lhs {
            let name = ident
                .as_free_identifier()
                .unwrap_or_else(|| panic!("cannot assign to {ident}"));
            assert!(names.insert(name), "{name} is assigned twice");
        }
        let rhs_count = match &kind {
            AssignKind::BecomesEqualTo(values) => values.len(),
            AssignKind::BecomesMemberOf(_) => 1,
            AssignKind::BecomesSuchThat { primed, .. } => primed.len(),
        };
        assert_eq!(
            lhs.len(),
            rhs_count,
            "assigned identifiers and right-hand side do not match"
        );
        let factories = lhs.iter().map(Expression::factory).chain(match &kind {
            AssignKind::BecomesEqualTo(values) => values.iter().map(Expression::factory).collect(),
            AssignKind::BecomesMemberOf(set) => vec![set.factory()],
            AssignKind::BecomesSuchThat { condition, .. } => vec![condition.factory()],
        });
        for child_factory in factories {
            assert!(
                child_factory == factory,
                "cannot mix formulas built by different factories"
            );
        }
        let mut hasher = FxHasher::default();
        lhs.hash(&mut hasher);
        kind.hash(&mut hasher);
        let typed = TypedSlot::new();
        if typing::synthesize_assignment(&lhs, &kind) {
            typed.resolve(());
        }
        Assignment(Arc::new(AssignNode {
            lhs,
            kind,
            factory: factory.clone(),
            hash: hasher.finish(),
            typed,
        }))
    }

    /// The assigned free identifiers.
    pub fn assigned_identifiers(&self) -> &[Expression] {
        &self.0.lhs
    }

    /// The right-hand side.
    pub fn kind(&self) -> &AssignKind {
        &self.0.kind
    }

    /// The factory that built this node.
    pub fn factory(&self) -> &FormulaFactory {
        &self.0.factory
    }

    /// Whether the assignment is typed.
    pub fn is_type_checked(&self) -> bool {
        self.0.typed.get().is_some()
    }

    pub(crate) fn slot(&self) -> &TypedSlot<()> {
        &self.0.typed
    }

    // the after value `x'` of an assigned identifier
    fn primed_identifiers(&self) -> Vec<Expression> {
        self.0
            .lhs
            .iter()
            .map(|ident| {
                let name = ident.as_free_identifier().unwrap_or_default();
                self.0
                    .factory
                    .make_free_identifier(&format!("{name}'"), ident.ty().cloned())
            })
            .collect()
    }

    fn conjunction(&self, mut conjuncts: Vec<Predicate>) -> Predicate {
        if conjuncts.len() == 1 {
            conjuncts.remove(0)
        } else {
            self.0
                .factory
                .make_associative_predicate(AssociativePredOp::Land, conjuncts)
        }
    }

    /// The feasibility predicate: under which condition the assignment can
    /// be performed.
    pub fn fis_predicate(&self) -> Result<Predicate, FormulaError> {
        if !self.is_type_checked() {
            return Err(FormulaError::NotTypeChecked);
        }
        let factory = &self.0.factory;
        Ok(match &self.0.kind {
            AssignKind::BecomesEqualTo(_) => factory.make_literal_predicate(true),
            AssignKind::BecomesMemberOf(set) => factory.make_relational_predicate(
                RelationalPredOp::NotEqual,
                set.clone(),
                factory.make_atomic_expression(AtomicExpr::EmptySet, set.ty().cloned()),
            ),
            AssignKind::BecomesSuchThat { primed, condition } => factory
                .make_quantified_predicate(Quantifier::Exists, primed.clone(), condition.clone()),
        })
    }

    /// The before-after predicate: relates the values of the assigned
    /// identifiers before the assignment to their primed values after it.
    pub fn ba_predicate(&self) -> Result<Predicate, FormulaError> {
        if !self.is_type_checked() {
            return Err(FormulaError::NotTypeChecked);
        }
        let factory = &self.0.factory;
        let primed = self.primed_identifiers();
        Ok(match &self.0.kind {
            AssignKind::BecomesEqualTo(values) => self.conjunction(
                primed
                    .into_iter()
                    .zip(values)
                    .map(|(ident, value)| {
                        factory.make_relational_predicate(
                            RelationalPredOp::Equal,
                            ident,
                            value.clone(),
                        )
                    })
                    .collect(),
            ),
            AssignKind::BecomesMemberOf(set) => factory.make_relational_predicate(
                RelationalPredOp::In,
                primed[0].clone(),
                set.clone(),
            ),
            AssignKind::BecomesSuchThat { condition, .. } => {
                rewrite::instantiate_bound(condition, &primed)?
            }
        })
    }

    /// The free identifiers the assignment reads, in order of first
    /// occurrence.
    pub fn used_identifiers(&self) -> Vec<Expression> {
        match &self.0.kind {
            AssignKind::BecomesEqualTo(values) => {
                let mut result: Vec<Expression> = vec![];
                for value in values {
                    for ident in value.free_identifiers() {
                        if !result.contains(&ident) {
                            result.push(ident);
                        }
                    }
                }
                result
            }
            AssignKind::BecomesMemberOf(set) => set.free_identifiers(),
            AssignKind::BecomesSuchThat { condition, .. } => condition.free_identifiers(),
        }
    }
}

impl PartialEq for Assignment {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.hash == other.0.hash
                && self.0.lhs == other.0.lhs
                && self.0.kind == other.0.kind)
    }
}

impl Eq for Assignment {}

impl Hash for Assignment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash)
    }
}

impl fmt::Debug for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Assignment({self})")
    }
}

#[cfg(test)]
mod tests {
    use crate::{factory::FormulaFactory, syntax::*, types::Type, typing::TypeEnvironment};

    fn names(idents: Vec<Expression>) -> Vec<String> {
        idents.iter().map(|ident| ident.to_string()).collect()
    }

    #[test]
    fn test_becomes_equal_to() {
        let ff = FormulaFactory::builder().build().unwrap();
        let s = Type::given("S");
        let x = ff.make_free_identifier("x", Some(s.clone()));
        let y = ff.make_free_identifier("y", Some(s));
        let swap = ff.make_becomes_equal_to(vec![x.clone(), y.clone()], vec![y, x]);
        swap.type_check(&TypeEnvironment::new()).unwrap();
        insta::assert_display_snapshot!(swap.fis_predicate().unwrap(), @"⊤");
        insta::assert_display_snapshot!(swap.ba_predicate().unwrap(), @"x' = y ∧ y' = x");
        assert_eq!(names(swap.used_identifiers()), vec!["y", "x"]);
    }

    #[test]
    fn test_becomes_member_of() {
        let ff = FormulaFactory::builder().build().unwrap();
        let choose = ff.make_becomes_member_of(
            ff.make_free_identifier("x", None),
            ff.make_free_identifier("A", None),
        );
        assert_eq!(choose.fis_predicate(), Err(FormulaError::NotTypeChecked));

        let mut env = TypeEnvironment::new();
        env.add("A", Type::power(Type::given("S")));
        choose.type_check(&env).unwrap();
        insta::assert_display_snapshot!(choose.fis_predicate().unwrap(), @"A ≠ ∅");
        insta::assert_display_snapshot!(choose.ba_predicate().unwrap(), @"x' ∈ A");
        assert_eq!(names(choose.used_identifiers()), vec!["A"]);
    }

    #[test]
    fn test_becomes_such_that() {
        let ff = FormulaFactory::builder().build().unwrap();
        let x = ff.make_free_identifier("x", None);
        let grow = ff.make_becomes_such_that(
            vec![x.clone()],
            vec![ff.make_bound_ident_decl("x'", None)],
            ff.make_relational_predicate(
                RelationalPredOp::NotEqual,
                ff.make_bound_identifier(0, None),
                x,
            ),
        );
        let mut env = TypeEnvironment::new();
        env.add("x", Type::given("S"));
        grow.type_check(&env).unwrap();
        insta::assert_display_snapshot!(grow.fis_predicate().unwrap(), @"∃x'·x' ≠ x");
        insta::assert_display_snapshot!(grow.ba_predicate().unwrap(), @"x' ≠ x");
        assert_eq!(names(grow.used_identifiers()), vec!["x"]);
    }
}
