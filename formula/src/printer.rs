// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use itertools::Itertools;

use crate::{extension::Notation, syntax::*};

fn parens(add_parens: bool, s: String) -> String {
    if add_parens {
        format!("({s})")
    } else {
        s
    }
}

// names of the declarations in scope, innermost last
type Names = Vec<String>;

fn bound(index: usize, names: &Names) -> String {
    if index < names.len() {
        names[names.len() - 1 - index].clone()
    } else {
        format!("[{index}]")
    }
}

fn with_decls<T>(
    names: &mut Names,
    decls: &[BoundIdentDecl],
    f: impl FnOnce(&mut Names) -> T,
) -> T {
    let depth = names.len();
    names.extend(decls.iter().map(|decl| decl.name().to_string()));
    let result = f(names);
    names.truncate(depth);
    result
}

fn decl_names(decls: &[BoundIdentDecl]) -> String {
    decls.iter().map(BoundIdentDecl::name).join(",")
}

fn relational_symbol(op: RelationalPredOp) -> &'static str {
    match op {
        RelationalPredOp::Equal => "=",
        RelationalPredOp::NotEqual => "≠",
        RelationalPredOp::In => "∈",
        RelationalPredOp::NotIn => "∉",
        RelationalPredOp::Subset => "⊂",
        RelationalPredOp::SubsetEq => "⊆",
        RelationalPredOp::NotSubset => "⊄",
        RelationalPredOp::NotSubsetEq => "⊈",
    }
}

// whether an expression needs parentheses as the operand of an operator
fn compound(e: &Expression) -> bool {
    match e.kind() {
        ExprKind::Binary(op, _, _) => op.is_infix(),
        ExprKind::Associative(_, _) => true,
        ExprKind::Quantified { op, .. } => *op != QuantifiedExprOp::Cset,
        ExprKind::Extended(ext) => ext.extension.notation != Notation::Prefix,
        _ => false,
    }
}

fn operand(e: &Expression, names: &mut Names) -> String {
    parens(compound(e), expression(e, names))
}

fn extended(
    symbol: &str,
    notation: Notation,
    exprs: &[Expression],
    preds: &[Predicate],
    names: &mut Names,
) -> String {
    match notation {
        Notation::Prefix if exprs.is_empty() && preds.is_empty() => symbol.to_string(),
        Notation::Prefix => {
            let mut args = exprs.iter().map(|e| expression(e, names)).collect_vec();
            args.extend(preds.iter().map(|p| predicate(p, names)));
            format!("{symbol}({})", args.iter().join(", "))
        }
        Notation::Infix | Notation::Associative => exprs
            .iter()
            .map(|e| operand(e, names))
            .join(&format!(" {symbol} ")),
    }
}

fn expression(e: &Expression, names: &mut Names) -> String {
    match e.kind() {
        ExprKind::Binary(BinaryExprOp::FunImage, f, x) => {
            format!("{}({})", operand(f, names), expression(x, names))
        }
        ExprKind::Binary(BinaryExprOp::RelImage, r, s) => {
            format!("{}[{}]", operand(r, names), expression(s, names))
        }
        ExprKind::Binary(op, left, right) => {
            let left = operand(left, names);
            let right = operand(right, names);
            format!("{left} {} {right}", op.symbol())
        }
        ExprKind::Unary(op, child) => match op {
            UnaryExprOp::Converse => format!("{}∼", operand(child, names)),
            UnaryExprOp::Dom => format!("dom({})", expression(child, names)),
            UnaryExprOp::Ran => format!("ran({})", expression(child, names)),
            UnaryExprOp::Pow => format!("ℙ({})", expression(child, names)),
        },
        ExprKind::Associative(op, children) => children
            .iter()
            .map(|child| operand(child, names))
            .join(&format!(" {} ", op.symbol())),
        ExprKind::Atomic(atom) => match atom {
            AtomicExpr::EmptySet => "∅",
            AtomicExpr::BoolSet => "BOOL",
            AtomicExpr::True => "TRUE",
            AtomicExpr::False => "FALSE",
        }
        .to_string(),
        ExprKind::SetExtension(members) => {
            format!("{{{}}}", members.iter().map(|m| expression(m, names)).join(", "))
        }
        ExprKind::Bool(pred) => format!("bool({})", predicate(pred, names)),
        ExprKind::Quantified {
            op,
            decls,
            predicate: pred,
            expression: expr,
        } => {
            let (pred, expr) = with_decls(names, decls, |names| {
                (predicate(pred, names), expression(expr, names))
            });
            let decls = decl_names(decls);
            match op {
                QuantifiedExprOp::Cset => format!("{{{decls}·{pred} ∣ {expr}}}"),
                QuantifiedExprOp::Qunion => format!("⋃{decls}·{pred} ∣ {expr}"),
                QuantifiedExprOp::Qinter => format!("⋂{decls}·{pred} ∣ {expr}"),
            }
        }
        ExprKind::BoundIdentifier(index) => bound(*index, names),
        ExprKind::FreeIdentifier(name) => name.clone(),
        ExprKind::Extended(ext) => extended(
            &ext.extension.symbol,
            ext.extension.notation,
            &ext.expressions,
            &ext.predicates,
            names,
        ),
    }
}

// a predicate operand of a logical connective
fn sub_predicate(p: &Predicate, names: &mut Names) -> String {
    let add_parens = matches!(
        p.kind(),
        PredKind::Binary(_, _, _) | PredKind::Associative(_, _) | PredKind::Quantified { .. }
    );
    parens(add_parens, predicate(p, names))
}

fn predicate(p: &Predicate, names: &mut Names) -> String {
    match p.kind() {
        PredKind::Literal(true) => "⊤".to_string(),
        PredKind::Literal(false) => "⊥".to_string(),
        PredKind::Unary(UnaryPredOp::Not, child) => format!("¬{}", sub_predicate(child, names)),
        PredKind::Binary(op, left, right) => {
            let left = sub_predicate(left, names);
            let right = sub_predicate(right, names);
            let op = match op {
                BinaryPredOp::Limp => "⇒",
                BinaryPredOp::Leqv => "⇔",
            };
            format!("{left} {op} {right}")
        }
        PredKind::Associative(op, children) => {
            let op = match op {
                AssociativePredOp::Land => " ∧ ",
                AssociativePredOp::Lor => " ∨ ",
            };
            children.iter().map(|child| sub_predicate(child, names)).join(op)
        }
        PredKind::Relational(op, left, right) => {
            let left = expression(left, names);
            let right = expression(right, names);
            format!("{left} {} {right}", relational_symbol(*op))
        }
        PredKind::Multiple(MultiplePredOp::Partition, children) => {
            format!("partition({})", children.iter().map(|c| expression(c, names)).join(", "))
        }
        PredKind::Quantified {
            quantifier,
            decls,
            predicate: body,
        } => {
            let body = with_decls(names, decls, |names| predicate(body, names));
            let quantifier = match quantifier {
                Quantifier::Forall => "∀",
                Quantifier::Exists => "∃",
            };
            format!("{quantifier}{}·{body}", decl_names(decls))
        }
        PredKind::Extended(ext) => extended(
            &ext.extension.symbol,
            ext.extension.notation,
            &ext.expressions,
            &ext.predicates,
            names,
        ),
    }
}

fn assignment(a: &Assignment) -> String {
    let mut names = vec![];
    let lhs = a.assigned_identifiers().iter().join(", ");
    match a.kind() {
        AssignKind::BecomesEqualTo(values) => {
            let values = values.iter().map(|v| expression(v, &mut names)).join(", ");
            format!("{lhs} ≔ {values}")
        }
        AssignKind::BecomesMemberOf(set) => format!("{lhs} :∈ {}", expression(set, &mut names)),
        AssignKind::BecomesSuchThat { primed, condition } => {
            let condition = with_decls(&mut names, primed, |names| predicate(condition, names));
            format!("{lhs} :∣ {condition}")
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", expression(self, &mut vec![]))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", predicate(self, &mut vec![]))
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", assignment(self))
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Expression(e) => write!(f, "{e}"),
            Formula::Predicate(p) => write!(f, "{p}"),
            Formula::Assignment(a) => write!(f, "{a}"),
            Formula::Declaration(decl) => write!(f, "{}", decl.name()),
        }
    }
}
