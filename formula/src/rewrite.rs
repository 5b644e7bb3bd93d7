// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Rebuild formulas bottom-up, possibly into another factory.

use std::collections::HashMap;

use crate::{
    factory::FormulaFactory,
    syntax::*,
    types::Type,
};

/// Hooks called while a formula is rebuilt. Every other node is rebuilt
/// as is from its rewritten children, in the factory of the rewriter.
///
/// Types of the source nodes go through [Rewriter::rewrite_type] and are
/// passed to the hooks; the rebuilt formula is typed whenever the source
/// formula was.
pub trait Rewriter {
    /// Error returned by the hooks
    type Error: From<FormulaError>;

    /// The factory building the rewritten formulas.
    fn factory(&self) -> &FormulaFactory;

    /// Rewrite a type carried by a source node.
    fn rewrite_type(&mut self, ty: &Type) -> Result<Type, Self::Error> {
        Ok(ty.clone())
    }

    /// Rewrite a free identifier.
    fn rewrite_free_identifier(
        &mut self,
        src: &Expression,
        name: &str,
        ty: Option<Type>,
    ) -> Result<Expression, Self::Error> {
        let _ = src;
        Ok(self.factory().make_free_identifier(name, ty))
    }

    /// Rewrite a bound identifier found below `depth` declarations of the
    /// rewritten formula.
    fn rewrite_bound_identifier(
        &mut self,
        src: &Expression,
        index: usize,
        depth: usize,
        ty: Option<Type>,
    ) -> Result<Expression, Self::Error> {
        let _ = (src, depth);
        Ok(self.factory().make_bound_identifier(index, ty))
    }

    /// Rewrite an extended expression, given its rewritten children.
    fn rewrite_extended_expression(
        &mut self,
        src: &Expression,
        ext: &ExtendedExpression,
        expressions: Vec<Expression>,
        predicates: Vec<Predicate>,
        ty: Option<Type>,
    ) -> Result<Expression, Self::Error> {
        let _ = src;
        Ok(self
            .factory()
            .make_extended_expression(&ext.extension, expressions, predicates, ty))
    }

    /// Rewrite an extended predicate, given its rewritten children.
    fn rewrite_extended_predicate(
        &mut self,
        src: &Predicate,
        ext: &ExtendedPredicate,
        expressions: Vec<Expression>,
        predicates: Vec<Predicate>,
    ) -> Result<Predicate, Self::Error> {
        let _ = src;
        Ok(self
            .factory()
            .make_extended_predicate(&ext.extension, expressions, predicates))
    }
}

fn node_type<R: Rewriter + ?Sized>(r: &mut R, ty: Option<&Type>) -> Result<Option<Type>, R::Error> {
    ty.map(|ty| r.rewrite_type(ty)).transpose()
}

fn declarations<R: Rewriter + ?Sized>(
    r: &mut R,
    decls: &[BoundIdentDecl],
) -> Result<Vec<BoundIdentDecl>, R::Error> {
    let mut result = vec![];
    for decl in decls {
        let ty = node_type(r, decl.ty())?;
        result.push(r.factory().make_bound_ident_decl(decl.name(), ty));
    }
    Ok(result)
}

fn expressions<R: Rewriter + ?Sized>(
    r: &mut R,
    exprs: &[Expression],
    depth: usize,
) -> Result<Vec<Expression>, R::Error> {
    exprs.iter().map(|e| rewrite_expression(r, e, depth)).collect()
}

fn predicates<R: Rewriter + ?Sized>(
    r: &mut R,
    preds: &[Predicate],
    depth: usize,
) -> Result<Vec<Predicate>, R::Error> {
    preds.iter().map(|p| rewrite_predicate(r, p, depth)).collect()
}

fn rewrite_expression<R: Rewriter + ?Sized>(
    r: &mut R,
    expr: &Expression,
    depth: usize,
) -> Result<Expression, R::Error> {
    let ty = node_type(r, expr.ty().or(expr.explicit_type()))?;
    Ok(match expr.kind() {
        ExprKind::Binary(op, left, right) => {
            let left = rewrite_expression(r, left, depth)?;
            let right = rewrite_expression(r, right, depth)?;
            r.factory().make_binary_expression(*op, left, right)
        }
        ExprKind::Unary(op, child) => {
            let child = rewrite_expression(r, child, depth)?;
            r.factory().make_unary_expression(*op, child)
        }
        ExprKind::Associative(op, children) => {
            let children = expressions(r, children, depth)?;
            r.factory().make_associative_expression(*op, children)
        }
        ExprKind::Atomic(atom) => r.factory().make_atomic_expression(*atom, ty),
        ExprKind::SetExtension(members) => {
            let members = expressions(r, members, depth)?;
            r.factory().make_set_extension(members, ty)
        }
        ExprKind::Bool(pred) => {
            let pred = rewrite_predicate(r, pred, depth)?;
            r.factory().make_bool_expression(pred)
        }
        ExprKind::Quantified {
            op,
            decls,
            predicate,
            expression,
        } => {
            let inner = depth + decls.len();
            let decls = declarations(r, decls)?;
            let predicate = rewrite_predicate(r, predicate, inner)?;
            let expression = rewrite_expression(r, expression, inner)?;
            r.factory()
                .make_quantified_expression(*op, decls, predicate, expression)
        }
        ExprKind::BoundIdentifier(index) => {
            return r.rewrite_bound_identifier(expr, *index, depth, ty)
        }
        ExprKind::FreeIdentifier(name) => return r.rewrite_free_identifier(expr, name, ty),
        ExprKind::Extended(ext) => {
            let exprs = expressions(r, &ext.expressions, depth)?;
            let preds = predicates(r, &ext.predicates, depth)?;
            return r.rewrite_extended_expression(expr, ext, exprs, preds, ty);
        }
    })
}

fn rewrite_predicate<R: Rewriter + ?Sized>(
    r: &mut R,
    pred: &Predicate,
    depth: usize,
) -> Result<Predicate, R::Error> {
    Ok(match pred.kind() {
        PredKind::Literal(value) => r.factory().make_literal_predicate(*value),
        PredKind::Unary(op, child) => {
            let child = rewrite_predicate(r, child, depth)?;
            r.factory().make_unary_predicate(*op, child)
        }
        PredKind::Binary(op, left, right) => {
            let left = rewrite_predicate(r, left, depth)?;
            let right = rewrite_predicate(r, right, depth)?;
            r.factory().make_binary_predicate(*op, left, right)
        }
        PredKind::Associative(op, children) => {
            let children = predicates(r, children, depth)?;
            r.factory().make_associative_predicate(*op, children)
        }
        PredKind::Relational(op, left, right) => {
            let left = rewrite_expression(r, left, depth)?;
            let right = rewrite_expression(r, right, depth)?;
            r.factory().make_relational_predicate(*op, left, right)
        }
        PredKind::Multiple(op, children) => {
            let children = expressions(r, children, depth)?;
            r.factory().make_multiple_predicate(*op, children)
        }
        PredKind::Quantified {
            quantifier,
            decls,
            predicate,
        } => {
            let inner = depth + decls.len();
            let decls = declarations(r, decls)?;
            let predicate = rewrite_predicate(r, predicate, inner)?;
            r.factory()
                .make_quantified_predicate(*quantifier, decls, predicate)
        }
        PredKind::Extended(ext) => {
            let exprs = expressions(r, &ext.expressions, depth)?;
            let preds = predicates(r, &ext.predicates, depth)?;
            return r.rewrite_extended_predicate(pred, ext, exprs, preds);
        }
    })
}

impl Expression {
    /// Rebuild this expression through a rewriter.
    pub fn rewrite<R: Rewriter + ?Sized>(&self, rewriter: &mut R) -> Result<Expression, R::Error> {
        rewrite_expression(rewriter, self, 0)
    }
}

impl Predicate {
    /// Rebuild this predicate through a rewriter.
    pub fn rewrite<R: Rewriter + ?Sized>(&self, rewriter: &mut R) -> Result<Predicate, R::Error> {
        rewrite_predicate(rewriter, self, 0)
    }
}

impl Assignment {
    /// Assignments are terminal and cannot be rewritten: this always fails
    /// with [FormulaError::UnsupportedStructuralOperation].
    pub fn rewrite<R: Rewriter + ?Sized>(&self, rewriter: &mut R) -> Result<Assignment, R::Error> {
        let _ = rewriter;
        Err(FormulaError::UnsupportedStructuralOperation("rewriting").into())
    }
}

impl Formula {
    /// Rebuild this formula through a rewriter. Fails on assignments.
    pub fn rewrite<R: Rewriter + ?Sized>(&self, rewriter: &mut R) -> Result<Formula, R::Error> {
        match self {
            Formula::Expression(expr) => Ok(expr.rewrite(rewriter)?.into()),
            Formula::Predicate(pred) => Ok(pred.rewrite(rewriter)?.into()),
            Formula::Assignment(assignment) => Ok(assignment.rewrite(rewriter)?.into()),
            Formula::Declaration(decl) => {
                let mut decls = declarations(rewriter, std::slice::from_ref(decl))?;
                Ok(decls.remove(0).into())
            }
        }
    }
}

/// Replace free identifiers by expressions, by name.
///
/// The replacements must not contain bound identifiers that are not bound
/// within them.
pub struct Substitution {
    factory: FormulaFactory,
    replacements: HashMap<String, Expression>,
}

impl Substitution {
    /// A substitution building its results in `factory`, where the
    /// replacements were built.
    pub fn new(factory: &FormulaFactory, replacements: HashMap<String, Expression>) -> Self {
        Substitution {
            factory: factory.clone(),
            replacements,
        }
    }
}

impl Rewriter for Substitution {
    type Error = FormulaError;

    fn factory(&self) -> &FormulaFactory {
        &self.factory
    }

    fn rewrite_free_identifier(
        &mut self,
        _src: &Expression,
        name: &str,
        ty: Option<Type>,
    ) -> Result<Expression, FormulaError> {
        Ok(match self.replacements.get(name) {
            Some(replacement) => replacement.clone(),
            None => self.factory.make_free_identifier(name, ty),
        })
    }
}

// Substitute the outermost declarations of a formula (declared outside of
// it) by expressions without loose bound identifiers.
struct BoundInstantiation<'a> {
    factory: FormulaFactory,
    replacements: &'a [Expression],
}

impl Rewriter for BoundInstantiation<'_> {
    type Error = FormulaError;

    fn factory(&self) -> &FormulaFactory {
        &self.factory
    }

    fn rewrite_bound_identifier(
        &mut self,
        _src: &Expression,
        index: usize,
        depth: usize,
        ty: Option<Type>,
    ) -> Result<Expression, FormulaError> {
        let n = self.replacements.len();
        Ok(if index < depth {
            self.factory.make_bound_identifier(index, ty)
        } else if index - depth < n {
            self.replacements[n - 1 - (index - depth)].clone()
        } else {
            self.factory.make_bound_identifier(index - n, ty)
        })
    }
}

/// Replace the bound identifiers referring to `replacements.len()`
/// declarations enclosing `pred`: the `i`-th replacement stands for the
/// `i`-th of these declarations.
pub(crate) fn instantiate_bound(
    pred: &Predicate,
    replacements: &[Expression],
) -> Result<Predicate, FormulaError> {
    pred.rewrite(&mut BoundInstantiation {
        factory: pred.factory().clone(),
        replacements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typing::TypeEnvironment;

    fn s() -> Type {
        Type::given("S")
    }

    #[test]
    fn test_substitution() {
        let ff = FormulaFactory::builder().build().unwrap();
        // ∀x·x ∈ A ⇒ x ∈ B
        let pred = ff.make_quantified_predicate(
            Quantifier::Forall,
            vec![ff.make_bound_ident_decl("x", None)],
            ff.make_binary_predicate(
                BinaryPredOp::Limp,
                ff.make_relational_predicate(
                    RelationalPredOp::In,
                    ff.make_bound_identifier(0, None),
                    ff.make_free_identifier("A", None),
                ),
                ff.make_relational_predicate(
                    RelationalPredOp::In,
                    ff.make_bound_identifier(0, None),
                    ff.make_free_identifier("B", None),
                ),
            ),
        );
        let mut env = TypeEnvironment::new();
        env.add("A", Type::power(s()));
        env.add("B", Type::power(s()));
        pred.type_check(&env).unwrap();

        let empty = ff.make_atomic_expression(AtomicExpr::EmptySet, Some(Type::power(s())));
        let mut substitution = Substitution::new(&ff, HashMap::from([("B".to_string(), empty)]));
        let result = pred.rewrite(&mut substitution).unwrap();
        insta::assert_display_snapshot!(result, @"∀x·x ∈ A ⇒ x ∈ ∅");
        assert!(result.is_type_checked());
        assert_ne!(result, pred);
    }

    #[test]
    fn test_instantiate_bound() {
        let ff = FormulaFactory::builder().build().unwrap();
        // under the declarations x, y: y = x ∧ (∃z·z = x)
        let pred = ff.make_associative_predicate(
            AssociativePredOp::Land,
            vec![
                ff.make_relational_predicate(
                    RelationalPredOp::Equal,
                    ff.make_bound_identifier(0, Some(s())),
                    ff.make_bound_identifier(1, Some(s())),
                ),
                ff.make_quantified_predicate(
                    Quantifier::Exists,
                    vec![ff.make_bound_ident_decl("z", Some(s()))],
                    ff.make_relational_predicate(
                        RelationalPredOp::Equal,
                        ff.make_bound_identifier(0, Some(s())),
                        ff.make_bound_identifier(2, Some(s())),
                    ),
                ),
            ],
        );
        let a = ff.make_free_identifier("a", Some(s()));
        let b = ff.make_free_identifier("b", Some(s()));
        let result = instantiate_bound(&pred, &[a, b]).unwrap();
        insta::assert_display_snapshot!(result, @"b = a ∧ (∃z·z = a)");
    }

    #[test]
    fn test_assignments_are_terminal() {
        let ff = FormulaFactory::builder().build().unwrap();
        let assignment = ff.make_becomes_equal_to(
            vec![ff.make_free_identifier("x", None)],
            vec![ff.make_atomic_expression(AtomicExpr::True, None)],
        );
        let unsupported =
            |e: FormulaError| matches!(e, FormulaError::UnsupportedStructuralOperation(_));
        let mut substitution = Substitution::new(&ff, HashMap::new());
        assert!(unsupported(assignment.rewrite(&mut substitution).unwrap_err()));

        let formula = Formula::from(assignment);
        assert!(unsupported(formula.rewrite(&mut substitution).unwrap_err()));
        assert!(unsupported(formula.child(0).unwrap_err()));
        assert!(unsupported(formula.child_count().unwrap_err()));
        assert!(unsupported(formula.children().unwrap_err()));
        assert!(unsupported(
            formula.descendant(&Position::root()).unwrap_err()
        ));
    }
}
