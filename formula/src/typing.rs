// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Type checking of formulas.
//!
//! Checking is a two-phase process. The first phase walks the formula
//! (pre-order, left to right), gives every node a [TypeTerm] synthesized from
//! the terms of its children, and records the constraints in a
//! [TypeUnifier]. The second phase resolves the term of every untyped node to
//! a ground type and publishes all of them at once; if any term cannot be
//! resolved, nothing is published.
//!
//! The typing rules are shared with the factory, which uses them to type a
//! node at construction when its children are already typed.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use im::Vector;
use thiserror::Error;

use crate::{
    extension::{DatatypeRole, ExtensionRef, Typing},
    syntax::*,
    types::Type,
    unify::{TypeError, TypeTerm, TypeUnifier},
};

/// Types of free identifiers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeEnvironment {
    names: BTreeMap<String, Type>,
}

impl TypeEnvironment {
    /// An empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the type of an identifier, replacing any previous one.
    pub fn add(&mut self, name: &str, ty: Type) {
        self.names.insert(name.to_string(), ty);
    }

    /// Record a given set `name`, whose type is `ℙ(name)`.
    pub fn add_given_set(&mut self, name: &str) {
        self.add(name, Type::power(Type::given(name)));
    }

    /// The type of an identifier.
    pub fn get(&self, name: &str) -> Option<&Type> {
        self.names.get(name)
    }

    /// Whether the identifier has a type.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// All identifiers with their types, by name.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Type)> {
        self.names.iter()
    }

    /// Number of identifiers.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no identifier has a type.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<(String, Type)> for TypeEnvironment {
    fn from_iter<I: IntoIterator<Item = (String, Type)>>(iter: I) -> Self {
        TypeEnvironment {
            names: iter.into_iter().collect(),
        }
    }
}

/// The outcome of a successful check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeCheckResult {
    inferred: TypeEnvironment,
}

impl TypeCheckResult {
    /// Free identifiers and given sets found in the formula that were not in
    /// the environment, with their inferred types.
    pub fn inferred(&self) -> &TypeEnvironment {
        &self.inferred
    }
}

/// A type error, located in the checked formula.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error} at position {position}")]
pub struct TypeCheckError {
    /// What went wrong
    pub error: TypeError,
    /// The sub-formula where it went wrong (for assignments, left-hand side
    /// identifiers come first, then the right-hand side)
    pub position: Position,
}

fn located(position: &Position) -> impl FnOnce(TypeError) -> TypeCheckError + '_ {
    move |error| TypeCheckError {
        error,
        position: position.clone(),
    }
}

fn power(t: TypeTerm) -> TypeTerm {
    TypeTerm::power(t)
}

fn relation(u: &mut TypeUnifier) -> (TypeTerm, TypeTerm, TypeTerm) {
    let s = u.fresh_var();
    let t = u.fresh_var();
    let rel = TypeTerm::relational(s.clone(), t.clone());
    (s, t, rel)
}

fn binary_rule(
    op: BinaryExprOp,
    u: &mut TypeUnifier,
    a: &TypeTerm,
    b: &TypeTerm,
) -> Result<TypeTerm, TypeError> {
    use BinaryExprOp::*;
    match op {
        Mapsto => Ok(TypeTerm::product(a.clone(), b.clone())),
        FunImage => {
            let (s, t, rel) = relation(u);
            u.unify(a, &rel)?;
            u.unify(b, &s)?;
            Ok(t)
        }
        RelImage => {
            let (s, t, rel) = relation(u);
            u.unify(a, &rel)?;
            u.unify(b, &power(s))?;
            Ok(power(t))
        }
        Cprod => {
            let (s, t, rel) = relation(u);
            u.unify(a, &power(s))?;
            u.unify(b, &power(t))?;
            Ok(rel)
        }
        Dprod => {
            let (s, t, left) = relation(u);
            let v = u.fresh_var();
            u.unify(a, &left)?;
            u.unify(b, &TypeTerm::relational(s.clone(), v.clone()))?;
            Ok(TypeTerm::relational(s, TypeTerm::product(t, v)))
        }
        Rel | Tfun | Tinj | Tsur | Tbij | Strel => {
            let (s, t, rel) = relation(u);
            u.unify(a, &power(s))?;
            u.unify(b, &power(t))?;
            Ok(power(rel))
        }
        SetMinus => {
            let set = power(u.fresh_var());
            u.unify(a, &set)?;
            u.unify(b, &set)?;
            Ok(set)
        }
        DomRes => {
            let (s, _, rel) = relation(u);
            u.unify(a, &power(s))?;
            u.unify(b, &rel)?;
            Ok(rel)
        }
    }
}

fn unary_rule(op: UnaryExprOp, u: &mut TypeUnifier, a: &TypeTerm) -> Result<TypeTerm, TypeError> {
    match op {
        UnaryExprOp::Converse => {
            let (s, t, rel) = relation(u);
            u.unify(a, &rel)?;
            Ok(TypeTerm::relational(t, s))
        }
        UnaryExprOp::Dom => {
            let (s, _, rel) = relation(u);
            u.unify(a, &rel)?;
            Ok(power(s))
        }
        UnaryExprOp::Ran => {
            let (_, t, rel) = relation(u);
            u.unify(a, &rel)?;
            Ok(power(t))
        }
        UnaryExprOp::Pow => {
            let set = power(u.fresh_var());
            u.unify(a, &set)?;
            Ok(power(set))
        }
    }
}

/// The type of an extended formula, from the types of its expression
/// children. `None` for predicate extensions.
fn extension_rule(
    extension: &ExtensionRef,
    u: &mut TypeUnifier,
    terms: &[TypeTerm],
) -> Result<Option<TypeTerm>, TypeError> {
    match &extension.typing {
        Typing::Rule { args, result } => {
            let mut substitution = HashMap::new();
            for (i, term) in terms.iter().enumerate() {
                if let Some(pattern) = args.get(i).or(args.last()) {
                    let expected = u.instantiate_with(pattern, &mut substitution);
                    u.unify(term, &expected)?;
                }
            }
            Ok(result
                .as_ref()
                .map(|result| u.instantiate_with(result, &mut substitution)))
        }
        Typing::Datatype { datatype, role } => {
            let params: Vec<TypeTerm> = datatype
                .formal_names()
                .iter()
                .map(|_| u.fresh_var())
                .collect();
            let instance = TypeTerm::Parametric(datatype.clone(), params.clone());
            match *role {
                DatatypeRole::TypeConstructor => {
                    for (term, param) in terms.iter().zip(&params) {
                        u.unify(term, &power(param.clone()))?;
                    }
                    Ok(Some(power(instance)))
                }
                DatatypeRole::Constructor(c) => {
                    let constructor = &datatype.constructors()[c];
                    for (term, arg) in terms.iter().zip(&constructor.arguments) {
                        u.unify(term, &arg.ty.instantiate(&params, &instance))?;
                    }
                    Ok(Some(instance))
                }
                DatatypeRole::Destructor {
                    constructor,
                    argument,
                } => {
                    u.unify(&terms[0], &instance)?;
                    let arg = &datatype.constructors()[constructor].arguments[argument];
                    Ok(Some(arg.ty.instantiate(&params, &instance)))
                }
            }
        }
    }
}

/// The type of an expression node, given the terms of its expression
/// children in position order (for quantified expressions: the declarations,
/// then the expression). Identifiers get a fresh variable.
pub(crate) fn expression_rule(
    kind: &ExprKind,
    u: &mut TypeUnifier,
    terms: &[TypeTerm],
) -> Result<TypeTerm, TypeError> {
    match kind {
        ExprKind::Binary(op, _, _) => binary_rule(*op, u, &terms[0], &terms[1]),
        ExprKind::Unary(op, _) => unary_rule(*op, u, &terms[0]),
        ExprKind::Associative(op, _) => {
            let expected = match op {
                AssociativeExprOp::Union | AssociativeExprOp::Inter => power(u.fresh_var()),
                AssociativeExprOp::Ovr => relation(u).2,
            };
            for term in terms {
                u.unify(term, &expected)?;
            }
            Ok(expected)
        }
        ExprKind::Atomic(AtomicExpr::EmptySet) => Ok(power(u.fresh_var())),
        ExprKind::Atomic(AtomicExpr::BoolSet) => Ok(power(TypeTerm::Boolean)),
        ExprKind::Atomic(AtomicExpr::True | AtomicExpr::False) => Ok(TypeTerm::Boolean),
        ExprKind::SetExtension(_) => {
            let member = u.fresh_var();
            for term in terms {
                u.unify(term, &member)?;
            }
            Ok(power(member))
        }
        ExprKind::Bool(_) => Ok(TypeTerm::Boolean),
        ExprKind::Quantified { op, decls, .. } => {
            let body = &terms[decls.len()];
            match op {
                QuantifiedExprOp::Cset => Ok(power(body.clone())),
                QuantifiedExprOp::Qunion | QuantifiedExprOp::Qinter => {
                    let set = power(u.fresh_var());
                    u.unify(body, &set)?;
                    Ok(set)
                }
            }
        }
        ExprKind::BoundIdentifier(_) | ExprKind::FreeIdentifier(_) => Ok(u.fresh_var()),
        ExprKind::Extended(ext) => match extension_rule(&ext.extension, u, terms)? {
            Some(result) => Ok(result),
            None => Ok(u.fresh_var()),
        },
    }
}

/// Check the constraints of a predicate node on the terms of its expression
/// children, in position order.
pub(crate) fn predicate_rule(
    kind: &PredKind,
    u: &mut TypeUnifier,
    terms: &[TypeTerm],
) -> Result<(), TypeError> {
    match kind {
        PredKind::Relational(op, _, _) => {
            let (a, b) = (&terms[0], &terms[1]);
            match op {
                RelationalPredOp::Equal | RelationalPredOp::NotEqual => u.unify(a, b),
                RelationalPredOp::In | RelationalPredOp::NotIn => u.unify(b, &power(a.clone())),
                RelationalPredOp::Subset
                | RelationalPredOp::SubsetEq
                | RelationalPredOp::NotSubset
                | RelationalPredOp::NotSubsetEq => {
                    let set = power(u.fresh_var());
                    u.unify(a, &set)?;
                    u.unify(b, &set)
                }
            }
        }
        PredKind::Multiple(MultiplePredOp::Partition, _) => {
            let set = power(u.fresh_var());
            for term in terms {
                u.unify(term, &set)?;
            }
            Ok(())
        }
        PredKind::Extended(ext) => extension_rule(&ext.extension, u, terms).map(|_| ()),
        PredKind::Literal(_)
        | PredKind::Unary(_, _)
        | PredKind::Binary(_, _, _)
        | PredKind::Associative(_, _)
        | PredKind::Quantified { .. } => Ok(()),
    }
}

/// Relate the assigned identifiers to the right-hand side: the values, the
/// set, or the primed declarations.
pub(crate) fn assignment_rule(
    kind: &AssignKind,
    u: &mut TypeUnifier,
    lhs: &[TypeTerm],
    rhs: &[TypeTerm],
) -> Result<(), TypeError> {
    match kind {
        AssignKind::BecomesMemberOf(_) => u.unify(&rhs[0], &power(lhs[0].clone())),
        AssignKind::BecomesEqualTo(_) | AssignKind::BecomesSuchThat { .. } => {
            for (left, right) in lhs.iter().zip(rhs) {
                u.unify(left, right)?;
            }
            Ok(())
        }
    }
}

fn known(expr: &Expression) -> Option<TypeTerm> {
    expr.ty().map(TypeTerm::from)
}

fn known_all<'e>(exprs: impl IntoIterator<Item = &'e Expression>) -> Option<Vec<TypeTerm>> {
    exprs.into_iter().map(known).collect()
}

/// The type of a new node whose children are all typed, or `None`.
pub(crate) fn synthesize_expression(kind: &ExprKind, explicit: Option<&Type>) -> Option<Type> {
    let terms = match kind {
        ExprKind::Binary(_, left, right) => known_all([left, right])?,
        ExprKind::Unary(_, child) => known_all([child])?,
        ExprKind::Associative(_, children) | ExprKind::SetExtension(children) => {
            known_all(children)?
        }
        ExprKind::Atomic(_) | ExprKind::BoundIdentifier(_) | ExprKind::FreeIdentifier(_) => {
            vec![]
        }
        ExprKind::Bool(pred) => pred.is_type_checked().then(Vec::new)?,
        ExprKind::Quantified {
            decls,
            predicate,
            expression,
            ..
        } => {
            if !predicate.is_type_checked() {
                return None;
            }
            decls
                .iter()
                .map(|decl| decl.ty().map(TypeTerm::from))
                .chain([known(expression)])
                .collect::<Option<Vec<_>>>()?
        }
        ExprKind::Extended(ext) => {
            if !ext.predicates.iter().all(Predicate::is_type_checked) {
                return None;
            }
            known_all(&ext.expressions)?
        }
    };
    let mut unifier = TypeUnifier::new();
    let result = expression_rule(kind, &mut unifier, &terms).ok()?;
    if let Some(ty) = explicit {
        unifier.unify(&result, &ty.into()).ok()?;
    }
    unifier.solve(&result).ok()
}

/// Whether a new predicate node whose children are all typed is well typed.
pub(crate) fn synthesize_predicate(kind: &PredKind) -> bool {
    let terms = match kind {
        PredKind::Literal(_) => Some(vec![]),
        PredKind::Unary(_, child) => child.is_type_checked().then(Vec::new),
        PredKind::Binary(_, left, right) => {
            (left.is_type_checked() && right.is_type_checked()).then(Vec::new)
        }
        PredKind::Associative(_, children) => children
            .iter()
            .all(Predicate::is_type_checked)
            .then(Vec::new),
        PredKind::Relational(_, left, right) => known_all([left, right]),
        PredKind::Multiple(_, children) => known_all(children),
        PredKind::Quantified {
            decls, predicate, ..
        } => (predicate.is_type_checked() && decls.iter().all(BoundIdentDecl::is_type_checked))
            .then(Vec::new),
        PredKind::Extended(ext) => {
            if ext.predicates.iter().all(Predicate::is_type_checked) {
                known_all(&ext.expressions)
            } else {
                None
            }
        }
    };
    match terms {
        Some(terms) => predicate_rule(kind, &mut TypeUnifier::new(), &terms).is_ok(),
        None => false,
    }
}

/// Whether a new assignment whose children are all typed is well typed.
pub(crate) fn synthesize_assignment(lhs: &[Expression], kind: &AssignKind) -> bool {
    let Some(lhs) = known_all(lhs) else {
        return false;
    };
    let rhs = match kind {
        AssignKind::BecomesEqualTo(values) => known_all(values),
        AssignKind::BecomesMemberOf(set) => known_all([set]),
        AssignKind::BecomesSuchThat { primed, condition } => {
            if !condition.is_type_checked() {
                return false;
            }
            primed
                .iter()
                .map(|decl| decl.ty().map(TypeTerm::from))
                .collect()
        }
    };
    match rhs {
        Some(rhs) => assignment_rule(kind, &mut TypeUnifier::new(), &lhs, &rhs).is_ok(),
        None => false,
    }
}

// State of one checking pass.
struct Checker<'a> {
    env: &'a TypeEnvironment,
    unifier: TypeUnifier,
    // free identifiers missing from the environment, with the position of
    // their first occurrence
    free: BTreeMap<String, (TypeTerm, Position)>,
    // declarations in scope, innermost last
    scope: Vector<TypeTerm>,
    // terms of the untyped slots seen so far, by slot address, so that
    // shared nodes get a single type
    seen: HashMap<usize, TypeTerm>,
    pending: Vec<(&'a TypedSlot<Type>, TypeTerm, Position)>,
    marks: Vec<&'a TypedSlot<()>>,
    // given sets occurring in the types of already typed nodes
    given: BTreeSet<String>,
}

impl<'a> Checker<'a> {
    fn new(env: &'a TypeEnvironment) -> Self {
        Checker {
            env,
            unifier: TypeUnifier::new(),
            free: BTreeMap::new(),
            scope: Vector::new(),
            seen: HashMap::new(),
            pending: vec![],
            marks: vec![],
            given: BTreeSet::new(),
        }
    }

    fn free_identifier(&mut self, name: &str, position: &Position) -> TypeTerm {
        if let Some(ty) = self.env.get(name) {
            return ty.into();
        }
        if let Some((term, _)) = self.free.get(name) {
            return term.clone();
        }
        let term = self.unifier.fresh_var();
        self.free
            .insert(name.to_string(), (term.clone(), position.clone()));
        term
    }

    fn bound_identifier(&self, index: usize) -> Result<TypeTerm, TypeError> {
        let len = self.scope.len();
        if index >= len {
            return Err(TypeError::UnboundIdentifier(index));
        }
        Ok(self.scope[len - 1 - index].clone())
    }

    // record the term of a slot, or check it against its known value
    fn slot(
        &mut self,
        slot: &'a TypedSlot<Type>,
        term: TypeTerm,
        position: Position,
    ) -> Result<TypeTerm, TypeCheckError> {
        if let Some(ty) = slot.get() {
            ty.collect_given_types(&mut self.given);
            self.unifier
                .unify(&term, &ty.into())
                .map_err(located(&position))?;
            return Ok(term);
        }
        let key = slot as *const TypedSlot<Type> as usize;
        match self.seen.get(&key) {
            Some(previous) => {
                let previous = previous.clone();
                self.unifier
                    .unify(&term, &previous)
                    .map_err(located(&position))?;
            }
            None => {
                self.seen.insert(key, term.clone());
                self.pending.push((slot, term.clone(), position));
            }
        }
        Ok(term)
    }

    fn declarations(
        &mut self,
        decls: &'a [BoundIdentDecl],
        position: &Position,
        first: usize,
    ) -> Result<Vec<TypeTerm>, TypeCheckError> {
        let mut terms = vec![];
        for (i, decl) in decls.iter().enumerate() {
            let term = match decl.ty() {
                Some(ty) => ty.into(),
                None => self.unifier.fresh_var(),
            };
            terms.push(self.slot(decl.slot(), term, position.child(first + i))?);
        }
        Ok(terms)
    }

    fn expression(
        &mut self,
        expr: &'a Expression,
        position: Position,
    ) -> Result<TypeTerm, TypeCheckError> {
        let kind = expr.kind();
        let mut terms = vec![];
        let term = match kind {
            ExprKind::BoundIdentifier(index) => self
                .bound_identifier(*index)
                .map_err(located(&position))?,
            ExprKind::FreeIdentifier(name) => self.free_identifier(name, &position),
            _ => {
                match kind {
                    ExprKind::Binary(_, left, right) => {
                        terms.push(self.expression(left, position.child(0))?);
                        terms.push(self.expression(right, position.child(1))?);
                    }
                    ExprKind::Unary(_, child) => {
                        terms.push(self.expression(child, position.child(0))?);
                    }
                    ExprKind::Associative(_, children) | ExprKind::SetExtension(children) => {
                        for (i, child) in children.iter().enumerate() {
                            terms.push(self.expression(child, position.child(i))?);
                        }
                    }
                    ExprKind::Bool(pred) => self.predicate(pred, position.child(0))?,
                    ExprKind::Quantified {
                        decls,
                        predicate,
                        expression,
                        ..
                    } => {
                        let saved = self.scope.clone();
                        terms = self.declarations(decls, &position, 0)?;
                        self.scope.extend(terms.iter().cloned());
                        self.predicate(predicate, position.child(decls.len()))?;
                        terms.push(self.expression(expression, position.child(decls.len() + 1))?);
                        self.scope = saved;
                    }
                    ExprKind::Extended(ext) => {
                        for (i, child) in ext.expressions.iter().enumerate() {
                            terms.push(self.expression(child, position.child(i))?);
                        }
                        let offset = ext.expressions.len();
                        for (i, child) in ext.predicates.iter().enumerate() {
                            self.predicate(child, position.child(offset + i))?;
                        }
                    }
                    ExprKind::Atomic(_)
                    | ExprKind::BoundIdentifier(_)
                    | ExprKind::FreeIdentifier(_) => {}
                }
                expression_rule(kind, &mut self.unifier, &terms).map_err(located(&position))?
            }
        };
        if let Some(ty) = expr.explicit_type() {
            ty.collect_given_types(&mut self.given);
            self.unifier
                .unify(&term, &ty.into())
                .map_err(located(&position))?;
        }
        self.slot(expr.slot(), term, position)
    }

    fn predicate(&mut self, pred: &'a Predicate, position: Position) -> Result<(), TypeCheckError> {
        let mut terms = vec![];
        match pred.kind() {
            PredKind::Literal(_) => {}
            PredKind::Unary(_, child) => self.predicate(child, position.child(0))?,
            PredKind::Binary(_, left, right) => {
                self.predicate(left, position.child(0))?;
                self.predicate(right, position.child(1))?;
            }
            PredKind::Associative(_, children) => {
                for (i, child) in children.iter().enumerate() {
                    self.predicate(child, position.child(i))?;
                }
            }
            PredKind::Relational(_, left, right) => {
                terms.push(self.expression(left, position.child(0))?);
                terms.push(self.expression(right, position.child(1))?);
            }
            PredKind::Multiple(_, children) => {
                for (i, child) in children.iter().enumerate() {
                    terms.push(self.expression(child, position.child(i))?);
                }
            }
            PredKind::Quantified {
                decls, predicate, ..
            } => {
                let saved = self.scope.clone();
                let decl_terms = self.declarations(decls, &position, 0)?;
                self.scope.extend(decl_terms);
                self.predicate(predicate, position.child(decls.len()))?;
                self.scope = saved;
            }
            PredKind::Extended(ext) => {
                for (i, child) in ext.expressions.iter().enumerate() {
                    terms.push(self.expression(child, position.child(i))?);
                }
                let offset = ext.expressions.len();
                for (i, child) in ext.predicates.iter().enumerate() {
                    self.predicate(child, position.child(offset + i))?;
                }
            }
        }
        predicate_rule(pred.kind(), &mut self.unifier, &terms).map_err(located(&position))?;
        if !pred.is_type_checked() {
            self.marks.push(pred.slot());
        }
        Ok(())
    }

    fn assignment(&mut self, assignment: &'a Assignment) -> Result<(), TypeCheckError> {
        let root = Position::root();
        let lhs = assignment.assigned_identifiers();
        let n = lhs.len();
        let mut rhs = vec![];
        match assignment.kind() {
            AssignKind::BecomesEqualTo(values) => {
                for (j, value) in values.iter().enumerate() {
                    rhs.push(self.expression(value, root.child(n + j))?);
                }
            }
            AssignKind::BecomesMemberOf(set) => rhs.push(self.expression(set, root.child(n))?),
            AssignKind::BecomesSuchThat { primed, condition } => {
                let saved = self.scope.clone();
                rhs = self.declarations(primed, &root, n)?;
                self.scope.extend(rhs.iter().cloned());
                self.predicate(condition, root.child(n + primed.len()))?;
                self.scope = saved;
            }
        }
        let mut lhs_terms = vec![];
        for (i, ident) in lhs.iter().enumerate() {
            lhs_terms.push(self.expression(ident, root.child(i))?);
        }
        assignment_rule(assignment.kind(), &mut self.unifier, &lhs_terms, &rhs)
            .map_err(located(&root))?;
        if !assignment.is_type_checked() {
            self.marks.push(assignment.slot());
        }
        Ok(())
    }

    // resolve every pending slot, then publish all of them
    fn finish(mut self) -> Result<TypeCheckResult, TypeCheckError> {
        let mut solved = vec![];
        for (slot, term, position) in &self.pending {
            let ty = self.unifier.solve(term).map_err(located(position))?;
            solved.push((*slot, ty));
        }
        let mut inferred = TypeEnvironment::new();
        for (name, (term, position)) in &self.free {
            let ty = self.unifier.solve(term).map_err(located(position))?;
            inferred.add(name, ty);
        }
        let mut given = std::mem::take(&mut self.given);
        for (_, ty) in &solved {
            ty.collect_given_types(&mut given);
        }
        for (_, ty) in inferred.iter() {
            ty.collect_given_types(&mut given);
        }
        for name in given {
            let set_type = Type::power(Type::given(&name));
            match self.env.get(&name).or(inferred.get(&name)) {
                Some(ty) if *ty != set_type => {
                    return Err(TypeCheckError {
                        error: TypeError::TypeMismatch(ty.into(), (&set_type).into()),
                        position: Position::root(),
                    })
                }
                Some(_) => {}
                None => inferred.add(&name, set_type),
            }
        }
        for (slot, ty) in solved {
            slot.resolve(ty);
        }
        for mark in self.marks {
            mark.resolve(());
        }
        Ok(TypeCheckResult { inferred })
    }
}

fn report<T>(result: Result<T, TypeCheckError>) -> Result<T, TypeCheckError> {
    if let Err(e) = &result {
        log::debug!("type check failed: {e}");
    }
    result
}

impl Expression {
    /// Type check this expression in an environment. On success, every node
    /// of the expression is typed.
    pub fn type_check(&self, env: &TypeEnvironment) -> Result<TypeCheckResult, TypeCheckError> {
        log::debug!("type checking expression {self}");
        let mut checker = Checker::new(env);
        report(
            checker
                .expression(self, Position::root())
                .and_then(|_| checker.finish()),
        )
    }
}

impl Predicate {
    /// Type check this predicate in an environment. On success, every node
    /// of the predicate is typed.
    pub fn type_check(&self, env: &TypeEnvironment) -> Result<TypeCheckResult, TypeCheckError> {
        log::debug!("type checking predicate {self}");
        let mut checker = Checker::new(env);
        report(
            checker
                .predicate(self, Position::root())
                .and_then(|_| checker.finish()),
        )
    }
}

impl Assignment {
    /// Type check this assignment in an environment: the right-hand side
    /// first, then the assigned identifiers.
    pub fn type_check(&self, env: &TypeEnvironment) -> Result<TypeCheckResult, TypeCheckError> {
        log::debug!("type checking assignment {self}");
        let mut checker = Checker::new(env);
        report(checker.assignment(self).and_then(|_| checker.finish()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{datatype::tests::list, extension::Extension, factory::FormulaFactory};

    fn env(entries: &[(&str, Type)]) -> TypeEnvironment {
        entries
            .iter()
            .map(|(name, ty)| (name.to_string(), ty.clone()))
            .collect()
    }

    #[test]
    fn test_infers_free_identifiers() {
        let ff = FormulaFactory::builder().build().unwrap();
        // x ∈ A ∧ A ⊆ S, with S a given set
        let x = ff.make_free_identifier("x", None);
        let a = ff.make_free_identifier("A", None);
        let pred = ff.make_associative_predicate(
            AssociativePredOp::Land,
            vec![
                ff.make_relational_predicate(RelationalPredOp::In, x.clone(), a.clone()),
                ff.make_relational_predicate(
                    RelationalPredOp::SubsetEq,
                    a.clone(),
                    ff.make_free_identifier("S", None),
                ),
            ],
        );
        let mut environment = TypeEnvironment::new();
        environment.add_given_set("S");
        let result = pred.type_check(&environment).unwrap();
        assert!(pred.is_type_checked());
        assert_eq!(x.ty(), Some(&Type::given("S")));
        assert_eq!(
            result.inferred(),
            &env(&[
                ("A", Type::power(Type::given("S"))),
                ("x", Type::given("S"))
            ])
        );
    }

    #[test]
    fn test_idempotent() {
        let ff = FormulaFactory::builder().build().unwrap();
        let pred = ff.make_relational_predicate(
            RelationalPredOp::In,
            ff.make_binary_expression(
                BinaryExprOp::Mapsto,
                ff.make_free_identifier("x", None),
                ff.make_free_identifier("y", None),
            ),
            ff.make_free_identifier("r", Some(Type::relational(Type::given("S"), Type::Boolean))),
        );
        let first = pred.type_check(&TypeEnvironment::new()).unwrap();
        let second = pred.type_check(&TypeEnvironment::new()).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.inferred().get("S"),
            Some(&Type::power(Type::given("S")))
        );
    }

    #[test]
    fn test_mismatch_position() {
        let ff = FormulaFactory::builder().build().unwrap();
        // x = TRUE ∧ x ∈ S
        let x = ff.make_free_identifier("x", None);
        let pred = ff.make_associative_predicate(
            AssociativePredOp::Land,
            vec![
                ff.make_relational_predicate(
                    RelationalPredOp::Equal,
                    x.clone(),
                    ff.make_atomic_expression(AtomicExpr::True, None),
                ),
                ff.make_relational_predicate(
                    RelationalPredOp::In,
                    x.clone(),
                    ff.make_free_identifier("S", Some(Type::power(Type::given("S")))),
                ),
            ],
        );
        let err = pred.type_check(&TypeEnvironment::new()).unwrap_err();
        assert_eq!(err.position, Position::from(vec![1]));
        assert!(matches!(err.error, TypeError::TypeMismatch(_, _)));
        // nothing was published
        assert!(!pred.is_type_checked());
        assert_eq!(x.ty(), None);
    }

    #[test]
    fn test_unsolved() {
        let ff = FormulaFactory::builder().build().unwrap();
        let pred = ff.make_relational_predicate(
            RelationalPredOp::Equal,
            ff.make_free_identifier("a", None),
            ff.make_free_identifier("b", None),
        );
        let err = pred.type_check(&TypeEnvironment::new()).unwrap_err();
        assert!(matches!(err.error, TypeError::UnsolvedType(_)));
        assert_eq!(err.position, Position::from(vec![0]));
    }

    #[test]
    fn test_bound_identifiers() {
        let ff = FormulaFactory::builder().build().unwrap();
        // ∀x,y·x ↦ y ∈ r
        let body = ff.make_relational_predicate(
            RelationalPredOp::In,
            ff.make_binary_expression(
                BinaryExprOp::Mapsto,
                ff.make_bound_identifier(1, None),
                ff.make_bound_identifier(0, None),
            ),
            ff.make_free_identifier("r", None),
        );
        let pred = ff.make_quantified_predicate(
            Quantifier::Forall,
            vec![
                ff.make_bound_ident_decl("x", Some(Type::given("S"))),
                ff.make_bound_ident_decl("y", None),
            ],
            body,
        );
        let err = pred.type_check(&TypeEnvironment::new()).unwrap_err();
        assert!(matches!(err.error, TypeError::UnsolvedType(_)));
        let environment = env(&[("r", Type::relational(Type::given("S"), Type::Boolean))]);
        pred.type_check(&environment).unwrap();
        match pred.kind() {
            PredKind::Quantified { decls, .. } => assert_eq!(decls[1].ty(), Some(&Type::Boolean)),
            _ => unreachable!(),
        }
        let loose = ff.make_relational_predicate(
            RelationalPredOp::Equal,
            ff.make_bound_identifier(0, None),
            ff.make_atomic_expression(AtomicExpr::True, None),
        );
        let err = loose.type_check(&TypeEnvironment::new()).unwrap_err();
        assert_eq!(err.error, TypeError::UnboundIdentifier(0));
    }

    #[test]
    fn test_datatype_typing() {
        let list = list();
        let mut builder = FormulaFactory::builder();
        builder.datatype(&list).unwrap();
        let ff = builder.build().unwrap();
        let cons = ff.extension("cons").unwrap();
        let head = ff.extension("head").unwrap();
        // head(cons(x, l)) = y, with l : List(S)
        let l_type = Type::parametric(&list, vec![Type::given("S")]);
        let pred = ff.make_relational_predicate(
            RelationalPredOp::Equal,
            ff.make_extended_expression(
                head,
                vec![ff.make_extended_expression(
                    cons,
                    vec![
                        ff.make_free_identifier("x", None),
                        ff.make_free_identifier("l", None),
                    ],
                    vec![],
                    None,
                )],
                vec![],
                None,
            ),
            ff.make_free_identifier("y", None),
        );
        let result = pred
            .type_check(&env(&[("l", l_type.clone())]))
            .unwrap();
        assert_eq!(result.inferred().get("x"), Some(&Type::given("S")));
        assert_eq!(result.inferred().get("y"), Some(&Type::given("S")));
    }

    #[test]
    fn test_explicit_type_of_untyped_set() {
        let ff = FormulaFactory::builder().build().unwrap();
        let s = Type::given("S");
        // {a} = b, with {a} given the type ℙ(S)
        let a = ff.make_free_identifier("a", None);
        let set = ff.make_set_extension(vec![a.clone()], Some(Type::power(s.clone())));
        assert!(!set.is_type_checked());
        assert_eq!(set.explicit_type(), Some(&Type::power(s.clone())));
        let pred = ff.make_relational_predicate(
            RelationalPredOp::Equal,
            set.clone(),
            ff.make_free_identifier("b", None),
        );
        let result = pred.type_check(&TypeEnvironment::new()).unwrap();
        assert_eq!(set.ty(), Some(&Type::power(s.clone())));
        assert_eq!(a.ty(), Some(&s));
        assert_eq!(
            result.inferred(),
            &env(&[
                ("S", Type::power(s.clone())),
                ("a", s.clone()),
                ("b", Type::power(s))
            ])
        );
    }

    #[test]
    fn test_conflicting_explicit_type() {
        let mut builder = FormulaFactory::builder();
        builder
            .extension(Extension::expression(
                "first",
                "first",
                vec![TypeTerm::param(0), TypeTerm::param(1)],
                TypeTerm::param(0),
            ))
            .unwrap();
        let ff = builder.build().unwrap();
        let first = |ty: Type| {
            ff.make_extended_expression(
                ff.extension("first").unwrap(),
                vec![
                    ff.make_free_identifier("a", Some(Type::given("S"))),
                    ff.make_free_identifier("b", Some(Type::Boolean)),
                ],
                vec![],
                Some(ty),
            )
        };
        assert_eq!(first(Type::given("S")).ty(), Some(&Type::given("S")));

        // first(a, b) is an S, not a BOOL
        let wrong = first(Type::Boolean);
        assert!(!wrong.is_type_checked());
        let err = wrong.type_check(&TypeEnvironment::new()).unwrap_err();
        assert_eq!(err.position, Position::root());
        assert_eq!(
            err.error,
            TypeError::TypeMismatch(TypeTerm::given("S"), TypeTerm::Boolean)
        );
        assert!(!wrong.is_type_checked());
    }

    #[test]
    fn test_assignment() {
        let ff = FormulaFactory::builder().build().unwrap();
        let x = ff.make_free_identifier("x", None);
        let assignment = ff.make_becomes_member_of(
            x.clone(),
            ff.make_free_identifier("S", Some(Type::power(Type::given("S")))),
        );
        assert!(!assignment.is_type_checked());
        assignment.type_check(&TypeEnvironment::new()).unwrap();
        assert!(assignment.is_type_checked());
        assert_eq!(x.ty(), Some(&Type::given("S")));

        let bad = ff.make_becomes_equal_to(
            vec![ff.make_free_identifier("b", Some(Type::Boolean))],
            vec![ff.make_free_identifier("S", Some(Type::power(Type::given("S"))))],
        );
        let err = bad.type_check(&TypeEnvironment::new()).unwrap_err();
        assert_eq!(err.position, Position::root());
    }
}
