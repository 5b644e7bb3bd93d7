// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Union-find based unification of type terms.
//!
//! A [TypeTerm] is a [Type] that may contain unresolved type variables. The
//! [TypeUnifier] records which variables denote which terms; [TypeUnifier::resolve]
//! substitutes the recorded representatives back into a term.

use std::{collections::HashMap, fmt};

use ena::unify::{InPlace, UnificationTable, UnifyKey, UnifyValue};
use itertools::Itertools;
use thiserror::Error;

use crate::{
    datatype::DatatypeRef,
    types::{ParametricType, Type},
};

/// An error encountered while solving types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// Two type terms with incompatible constructors had to be equal.
    #[error("type mismatch: could not unify {0} and {1}")]
    TypeMismatch(TypeTerm, TypeTerm),
    /// Binding a variable would have built an infinite type.
    #[error("infinite type: {0} occurs in {1}")]
    InfiniteType(TypeTerm, TypeTerm),
    /// Checking finished without gaining enough information to find a ground type.
    #[error("could not solve type {0}")]
    UnsolvedType(TypeTerm),
    /// A bound identifier refers to a declaration that is not in scope.
    #[error("bound identifier [{0}] is not in scope")]
    UnboundIdentifier(usize),
}

/// A type term: a [Type] possibly containing type variables.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeTerm {
    Var(TypeVar),
    Boolean,
    Given(String),
    Power(Box<TypeTerm>),
    Product(Box<TypeTerm>, Box<TypeTerm>),
    Parametric(DatatypeRef, Vec<TypeTerm>),
}

/// A unification variable.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TypeVar(u32);

impl TypeTerm {
    /// A placeholder for the `index`-th parameter of a typing pattern. Patterns
    /// are instantiated with fresh variables by [TypeUnifier::instantiate]
    /// before they take part in unification.
    pub fn param(index: u32) -> Self {
        TypeTerm::Var(TypeVar(index))
    }

    /// Smart constructor for given types that takes &str
    pub fn given(name: &str) -> Self {
        TypeTerm::Given(name.to_string())
    }

    /// Smart constructor for `ℙ(t)`
    pub fn power(t: TypeTerm) -> Self {
        TypeTerm::Power(Box::new(t))
    }

    /// Smart constructor for `left × right`
    pub fn product(left: TypeTerm, right: TypeTerm) -> Self {
        TypeTerm::Product(Box::new(left), Box::new(right))
    }

    /// The relational term `ℙ(left × right)`
    pub fn relational(left: TypeTerm, right: TypeTerm) -> Self {
        Self::power(Self::product(left, right))
    }

    /// Convert to a ground [Type], or `None` if a variable remains.
    pub fn to_type(&self) -> Option<Type> {
        Some(match self {
            TypeTerm::Var(_) => return None,
            TypeTerm::Boolean => Type::Boolean,
            TypeTerm::Given(name) => Type::Given(name.clone()),
            TypeTerm::Power(base) => Type::power(base.to_type()?),
            TypeTerm::Product(left, right) => Type::product(left.to_type()?, right.to_type()?),
            TypeTerm::Parametric(datatype, params) => Type::Parametric(ParametricType {
                datatype: datatype.clone(),
                params: params
                    .iter()
                    .map(TypeTerm::to_type)
                    .collect::<Option<Vec<_>>>()?,
            }),
        })
    }

    fn contains_var(&self, var: TypeVar) -> bool {
        match self {
            TypeTerm::Var(v) => *v == var,
            TypeTerm::Boolean | TypeTerm::Given(_) => false,
            TypeTerm::Power(base) => base.contains_var(var),
            TypeTerm::Product(left, right) => left.contains_var(var) || right.contains_var(var),
            TypeTerm::Parametric(_, params) => params.iter().any(|p| p.contains_var(var)),
        }
    }
}

impl From<&Type> for TypeTerm {
    fn from(ty: &Type) -> Self {
        match ty {
            Type::Boolean => TypeTerm::Boolean,
            Type::Given(name) => TypeTerm::Given(name.clone()),
            Type::Power(base) => TypeTerm::power(base.as_ref().into()),
            Type::Product(left, right) => {
                TypeTerm::product(left.as_ref().into(), right.as_ref().into())
            }
            Type::Parametric(instance) => TypeTerm::Parametric(
                instance.datatype.clone(),
                instance.params.iter().map(TypeTerm::from).collect(),
            ),
        }
    }
}

impl fmt::Display for TypeTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTerm::Var(var) => write!(f, "?{}", var.0),
            TypeTerm::Boolean => write!(f, "BOOL"),
            TypeTerm::Given(name) => write!(f, "{name}"),
            TypeTerm::Power(base) => write!(f, "ℙ({base})"),
            TypeTerm::Product(left, right) => match **right {
                TypeTerm::Product(_, _) => write!(f, "{left} × ({right})"),
                _ => write!(f, "{left} × {right}"),
            },
            TypeTerm::Parametric(datatype, params) => {
                write!(f, "{}", datatype.name())?;
                if !params.is_empty() {
                    write!(f, "({})", params.iter().join(", "))?;
                }
                Ok(())
            }
        }
    }
}

// wrapper to implement ena::unify traits on
#[doc(hidden)]
#[derive(Clone, Debug, PartialEq)]
pub struct Binding(Option<TypeTerm>);

impl UnifyKey for TypeVar {
    type Value = Binding;
    fn index(&self) -> u32 {
        self.0
    }
    fn from_index(u: u32) -> TypeVar {
        TypeVar(u)
    }
    fn tag() -> &'static str {
        "TypeVar"
    }
}

impl UnifyValue for Binding {
    type Error = TypeError;
    fn unify_values(a: &Binding, b: &Binding) -> Result<Binding, TypeError> {
        // the unifier only merges variables that are both unbound, and only
        // binds variables that are unbound, so structural unification of two
        // bound terms never happens here
        match (&a.0, &b.0) {
            (None, None) => Ok(Binding(None)),
            (None, t @ Some(_)) | (t @ Some(_), None) => Ok(Binding(t.clone())),
            (Some(x), Some(y)) if x == y => Ok(Binding(Some(x.clone()))),
            (Some(x), Some(y)) => Err(TypeError::TypeMismatch(x.clone(), y.clone())),
        }
    }
}

/// Solves equations between [TypeTerm]s.
///
/// The union-find table is private to one checking pass; it is never shared.
pub struct TypeUnifier {
    table: UnificationTable<InPlace<TypeVar>>,
}

impl Default for TypeUnifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeUnifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeUnifier")
            .field("vars", &self.table.len())
            .finish()
    }
}

impl TypeUnifier {
    /// Create a unifier with no variables.
    pub fn new() -> Self {
        TypeUnifier {
            table: UnificationTable::new(),
        }
    }

    /// Allocate a fresh, unbound type variable.
    pub fn fresh_var(&mut self) -> TypeTerm {
        TypeTerm::Var(self.table.new_key(Binding(None)))
    }

    /// Replace every parameter of a typing pattern (see [TypeTerm::param])
    /// with a fresh variable. Occurrences of the same parameter share the same
    /// fresh variable.
    pub fn instantiate(&mut self, pattern: &TypeTerm) -> TypeTerm {
        self.instantiate_with(pattern, &mut HashMap::new())
    }

    /// Like [TypeUnifier::instantiate], sharing the parameter substitution
    /// across several patterns.
    pub fn instantiate_with(
        &mut self,
        pattern: &TypeTerm,
        substitution: &mut HashMap<TypeVar, TypeTerm>,
    ) -> TypeTerm {
        match pattern {
            TypeTerm::Var(param) => substitution
                .entry(*param)
                .or_insert_with(|| TypeTerm::Var(self.table.new_key(Binding(None))))
                .clone(),
            TypeTerm::Boolean | TypeTerm::Given(_) => pattern.clone(),
            TypeTerm::Power(base) => TypeTerm::power(self.instantiate_with(base, substitution)),
            TypeTerm::Product(left, right) => TypeTerm::product(
                self.instantiate_with(left, substitution),
                self.instantiate_with(right, substitution),
            ),
            TypeTerm::Parametric(datatype, params) => TypeTerm::Parametric(
                datatype.clone(),
                params
                    .iter()
                    .map(|p| self.instantiate_with(p, substitution))
                    .collect(),
            ),
        }
    }

    // follow variable bindings until reaching a constructor or an unbound
    // variable (its representative)
    fn shallow(&mut self, term: &TypeTerm) -> TypeTerm {
        match term {
            TypeTerm::Var(var) => match self.table.probe_value(*var).0 {
                Some(bound) => self.shallow(&bound),
                None => TypeTerm::Var(self.table.find(*var)),
            },
            _ => term.clone(),
        }
    }

    /// Substitute the representative of every bound variable in `term`,
    /// recursively. Unbound variables are replaced by their representative.
    pub fn resolve(&mut self, term: &TypeTerm) -> TypeTerm {
        match self.shallow(term) {
            TypeTerm::Power(base) => TypeTerm::power(self.resolve(&base)),
            TypeTerm::Product(left, right) => {
                TypeTerm::product(self.resolve(&left), self.resolve(&right))
            }
            TypeTerm::Parametric(datatype, params) => TypeTerm::Parametric(
                datatype,
                params.iter().map(|p| self.resolve(p)).collect(),
            ),
            resolved => resolved,
        }
    }

    /// Resolve `term` to a ground [Type].
    pub fn solve(&mut self, term: &TypeTerm) -> Result<Type, TypeError> {
        let resolved = self.resolve(term);
        resolved
            .to_type()
            .ok_or(TypeError::UnsolvedType(resolved))
    }

    /// Record that `a` and `b` denote the same type, or report why they cannot.
    pub fn unify(&mut self, a: &TypeTerm, b: &TypeTerm) -> Result<(), TypeError> {
        let a = self.shallow(a);
        let b = self.shallow(b);
        match (&a, &b) {
            (TypeTerm::Var(x), TypeTerm::Var(y)) => self.table.unify_var_var(*x, *y),
            (TypeTerm::Var(var), term) | (term, TypeTerm::Var(var)) => {
                let term = self.resolve(term);
                if term.contains_var(*var) {
                    return Err(TypeError::InfiniteType(TypeTerm::Var(*var), term));
                }
                self.table.unify_var_value(*var, Binding(Some(term)))
            }
            (TypeTerm::Boolean, TypeTerm::Boolean) => Ok(()),
            (TypeTerm::Given(x), TypeTerm::Given(y)) if x == y => Ok(()),
            (TypeTerm::Power(x), TypeTerm::Power(y)) => self.unify(x, y),
            (TypeTerm::Product(x1, y1), TypeTerm::Product(x2, y2)) => {
                self.unify(x1, x2)?;
                self.unify(y1, y2)
            }
            (TypeTerm::Parametric(d1, p1), TypeTerm::Parametric(d2, p2))
                if d1 == d2 && p1.len() == p2.len() =>
            {
                for (x, y) in p1.iter().zip(p2) {
                    self.unify(x, y)?;
                }
                Ok(())
            }
            _ => Err(TypeError::TypeMismatch(self.resolve(&a), self.resolve(&b))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unify_binds_variable() {
        let mut unifier = TypeUnifier::new();
        let x = unifier.fresh_var();
        unifier
            .unify(&TypeTerm::power(x.clone()), &TypeTerm::power(TypeTerm::given("S")))
            .expect("should unify");
        assert_eq!(unifier.resolve(&x), TypeTerm::given("S"));
        assert_eq!(unifier.solve(&x), Ok(Type::given("S")));
    }

    #[test]
    fn test_binding_values() {
        let unbound: <TypeVar as UnifyKey>::Value = Binding(None);
        let bound = Binding(Some(TypeTerm::Boolean));
        assert_eq!(Binding::unify_values(&unbound, &bound), Ok(bound.clone()));
        assert!(Binding::unify_values(&bound, &Binding(Some(TypeTerm::given("S")))).is_err());
    }

    #[test]
    fn test_occurs_check() {
        let mut unifier = TypeUnifier::new();
        let x = unifier.fresh_var();
        let result = unifier.unify(&x, &TypeTerm::product(x.clone(), TypeTerm::given("S")));
        assert!(matches!(result, Err(TypeError::InfiniteType(_, _))));
    }

    #[test]
    fn test_occurs_check_through_binding() {
        let mut unifier = TypeUnifier::new();
        let x = unifier.fresh_var();
        let y = unifier.fresh_var();
        unifier.unify(&y, &TypeTerm::power(x.clone())).unwrap();
        let result = unifier.unify(&x, &y);
        assert!(matches!(result, Err(TypeError::InfiniteType(_, _))));
    }

    #[test]
    fn test_mismatch_names_constructors() {
        let mut unifier = TypeUnifier::new();
        let x = unifier.fresh_var();
        unifier.unify(&x, &TypeTerm::Boolean).unwrap();
        let result = unifier.unify(&TypeTerm::power(x), &TypeTerm::power(TypeTerm::given("S")));
        assert_eq!(
            result,
            Err(TypeError::TypeMismatch(TypeTerm::Boolean, TypeTerm::given("S")))
        );
    }

    #[test]
    fn test_var_var_then_value() {
        let mut unifier = TypeUnifier::new();
        let x = unifier.fresh_var();
        let y = unifier.fresh_var();
        unifier.unify(&x, &y).unwrap();
        unifier.unify(&y, &TypeTerm::Boolean).unwrap();
        assert_eq!(unifier.resolve(&x), TypeTerm::Boolean);
        // a product whose components are still unknown is not solved
        let z = unifier.fresh_var();
        let pair = TypeTerm::product(x, z);
        assert!(matches!(
            unifier.solve(&pair),
            Err(TypeError::UnsolvedType(_))
        ));
    }

    #[test]
    fn test_instantiate_shares_parameters() {
        let mut unifier = TypeUnifier::new();
        let pattern = TypeTerm::relational(TypeTerm::param(0), TypeTerm::param(0));
        let instance = unifier.instantiate(&pattern);
        let other = unifier.fresh_var();
        unifier
            .unify(
                &instance,
                &TypeTerm::relational(TypeTerm::given("S"), other.clone()),
            )
            .unwrap();
        assert_eq!(unifier.resolve(&other), TypeTerm::given("S"));
        assert_eq!(
            unifier.solve(&instance).unwrap().to_string(),
            "ℙ(S × S)"
        );
    }
}
