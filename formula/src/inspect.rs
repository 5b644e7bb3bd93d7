// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Pre-order walks over formulas that report positions.

use crate::syntax::*;

/// What an [Inspector] sees while walking a formula: the position of the
/// current node, the findings so far, and controls over the walk.
#[derive(Debug)]
pub struct Accumulator<F> {
    findings: Vec<F>,
    position: Position,
    skip_children: bool,
    skip_all: bool,
}

impl<F> Accumulator<F> {
    fn new() -> Self {
        Accumulator {
            findings: vec![],
            position: Position::root(),
            skip_children: false,
            skip_all: false,
        }
    }

    /// Position of the node being inspected, relative to the root of the
    /// walk.
    pub fn current_position(&self) -> &Position {
        &self.position
    }

    /// Record a finding.
    pub fn add(&mut self, finding: F) {
        self.findings.push(finding);
    }

    /// Do not visit the children of the current node.
    pub fn skip_children(&mut self) {
        self.skip_children = true;
    }

    /// Stop the walk after the current node.
    pub fn skip_all(&mut self) {
        self.skip_all = true;
    }

    /// The findings recorded so far.
    pub fn findings(&self) -> &[F] {
        &self.findings
    }
}

/// Visits every node of a formula. All methods do nothing by default.
pub trait Inspector<F> {
    #[allow(missing_docs)]
    fn inspect_expression(&mut self, expr: &Expression, acc: &mut Accumulator<F>) {
        let _ = (expr, acc);
    }

    #[allow(missing_docs)]
    fn inspect_predicate(&mut self, pred: &Predicate, acc: &mut Accumulator<F>) {
        let _ = (pred, acc);
    }

    #[allow(missing_docs)]
    fn inspect_declaration(&mut self, decl: &BoundIdentDecl, acc: &mut Accumulator<F>) {
        let _ = (decl, acc);
    }
}

/// Selects sub-formulas. Nothing is selected by default.
pub trait FormulaFilter {
    #[allow(missing_docs)]
    fn select_expression(&self, expr: &Expression) -> bool {
        let _ = expr;
        false
    }

    #[allow(missing_docs)]
    fn select_predicate(&self, pred: &Predicate) -> bool {
        let _ = pred;
        false
    }

    #[allow(missing_docs)]
    fn select_declaration(&self, decl: &BoundIdentDecl) -> bool {
        let _ = decl;
        false
    }
}

fn walk<F, I>(formula: &Formula, inspector: &mut I, acc: &mut Accumulator<F>)
where
    I: Inspector<F> + ?Sized,
{
    match formula {
        Formula::Expression(expr) => inspector.inspect_expression(expr, acc),
        Formula::Predicate(pred) => inspector.inspect_predicate(pred, acc),
        Formula::Declaration(decl) => inspector.inspect_declaration(decl, acc),
        // never reached: assignments are rejected before walking
        Formula::Assignment(_) => {}
    }
    if std::mem::take(&mut acc.skip_children) {
        return;
    }
    let children = match formula {
        Formula::Expression(expr) => expr.children(),
        Formula::Predicate(pred) => pred.children(),
        Formula::Declaration(_) | Formula::Assignment(_) => vec![],
    };
    for (i, child) in children.iter().enumerate() {
        if acc.skip_all {
            return;
        }
        let parent = std::mem::replace(&mut acc.position, Position::root());
        acc.position = parent.child(i);
        walk(child, inspector, acc);
        acc.position = parent;
    }
}

impl Formula {
    /// Walk this formula pre-order, left to right, and return the findings of
    /// the inspector. Fails on assignments.
    pub fn inspect<F, I>(&self, inspector: &mut I) -> Result<Vec<F>, FormulaError>
    where
        I: Inspector<F> + ?Sized,
    {
        if let Formula::Assignment(_) = self {
            return Err(FormulaError::UnsupportedStructuralOperation("inspection"));
        }
        let mut acc = Accumulator::new();
        walk(self, inspector, &mut acc);
        Ok(acc.findings)
    }

    /// The positions of the sub-formulas selected by `filter`, in pre-order.
    /// Fails on assignments.
    pub fn positions<T>(&self, filter: &T) -> Result<Vec<Position>, FormulaError>
    where
        T: FormulaFilter + ?Sized,
    {
        self.inspect(&mut Selection(filter))
    }
}

struct Selection<'a, T: ?Sized>(&'a T);

impl<T: FormulaFilter + ?Sized> Inspector<Position> for Selection<'_, T> {
    fn inspect_expression(&mut self, expr: &Expression, acc: &mut Accumulator<Position>) {
        if self.0.select_expression(expr) {
            acc.add(acc.current_position().clone());
        }
    }

    fn inspect_predicate(&mut self, pred: &Predicate, acc: &mut Accumulator<Position>) {
        if self.0.select_predicate(pred) {
            acc.add(acc.current_position().clone());
        }
    }

    fn inspect_declaration(&mut self, decl: &BoundIdentDecl, acc: &mut Accumulator<Position>) {
        if self.0.select_declaration(decl) {
            acc.add(acc.current_position().clone());
        }
    }
}

struct FreeIdentifiers;

impl Inspector<Expression> for FreeIdentifiers {
    fn inspect_expression(&mut self, expr: &Expression, acc: &mut Accumulator<Expression>) {
        if expr.as_free_identifier().is_some() && !acc.findings().contains(expr) {
            acc.add(expr.clone());
        }
    }
}

fn free_identifiers(formula: Formula) -> Vec<Expression> {
    formula.inspect(&mut FreeIdentifiers).unwrap_or_default()
}

impl Expression {
    /// The distinct free identifiers of this expression, in order of first
    /// occurrence.
    pub fn free_identifiers(&self) -> Vec<Expression> {
        free_identifiers(self.clone().into())
    }
}

impl Predicate {
    /// The distinct free identifiers of this predicate, in order of first
    /// occurrence.
    pub fn free_identifiers(&self) -> Vec<Expression> {
        free_identifiers(self.clone().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::FormulaFactory;

    // x ∈ A ∧ (∀y·y ∈ A ⇒ y = x)
    fn sample(ff: &FormulaFactory) -> Predicate {
        let x = ff.make_free_identifier("x", None);
        let a = ff.make_free_identifier("A", None);
        ff.make_associative_predicate(
            AssociativePredOp::Land,
            vec![
                ff.make_relational_predicate(RelationalPredOp::In, x.clone(), a.clone()),
                ff.make_quantified_predicate(
                    Quantifier::Forall,
                    vec![ff.make_bound_ident_decl("y", None)],
                    ff.make_binary_predicate(
                        BinaryPredOp::Limp,
                        ff.make_relational_predicate(
                            RelationalPredOp::In,
                            ff.make_bound_identifier(0, None),
                            a,
                        ),
                        ff.make_relational_predicate(
                            RelationalPredOp::Equal,
                            ff.make_bound_identifier(0, None),
                            x,
                        ),
                    ),
                ),
            ],
        )
    }

    struct Identifiers;

    impl FormulaFilter for Identifiers {
        fn select_expression(&self, expr: &Expression) -> bool {
            matches!(
                expr.kind(),
                ExprKind::FreeIdentifier(_) | ExprKind::BoundIdentifier(_)
            )
        }
    }

    #[test]
    fn test_positions() {
        let ff = FormulaFactory::builder().build().unwrap();
        let pred = Formula::from(sample(&ff));
        let positions: Vec<String> = pred
            .positions(&Identifiers)
            .unwrap()
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(
            positions,
            vec!["0.0", "0.1", "1.1.0.0", "1.1.0.1", "1.1.1.0", "1.1.1.1"]
        );
        for position in pred.positions(&Identifiers).unwrap() {
            assert!(matches!(pred.descendant(&position), Ok(Formula::Expression(_))));
        }
    }

    struct Quantifiers;

    impl Inspector<String> for Quantifiers {
        fn inspect_predicate(&mut self, pred: &Predicate, acc: &mut Accumulator<String>) {
            if let PredKind::Quantified { .. } = pred.kind() {
                acc.add(acc.current_position().to_string());
                acc.skip_children();
            }
        }

        fn inspect_declaration(&mut self, decl: &BoundIdentDecl, acc: &mut Accumulator<String>) {
            acc.add(decl.name().to_string());
        }

        fn inspect_expression(&mut self, _expr: &Expression, acc: &mut Accumulator<String>) {
            acc.skip_all();
        }
    }

    #[test]
    fn test_skipping() {
        let ff = FormulaFactory::builder().build().unwrap();
        let pred = Formula::from(sample(&ff));
        // the walk stops at the first expression, x
        assert_eq!(pred.inspect(&mut Quantifiers).unwrap(), Vec::<String>::new());

        let quantified = pred.child(1).unwrap();
        assert_eq!(quantified.inspect(&mut Quantifiers).unwrap(), vec!["root"]);
    }

    #[test]
    fn test_free_identifiers() {
        let ff = FormulaFactory::builder().build().unwrap();
        let names: Vec<String> = sample(&ff)
            .free_identifiers()
            .iter()
            .map(|e| e.to_string())
            .collect();
        assert_eq!(names, vec!["x", "A"]);

        let assignment = ff.make_becomes_member_of(
            ff.make_free_identifier("x", None),
            ff.make_free_identifier("A", None),
        );
        assert!(matches!(
            Formula::from(assignment).inspect(&mut FreeIdentifiers),
            Err(FormulaError::UnsupportedStructuralOperation(_))
        ));
    }
}
