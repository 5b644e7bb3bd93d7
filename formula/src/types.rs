// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The type model of the mathematical language.
//!
//! Types are immutable trees. Two types are equal (and hash equal) exactly
//! when their constructor trees are equal.

use std::{collections::BTreeSet, fmt};

use itertools::Itertools;
use serde::Serialize;

use crate::datatype::DatatypeRef;

/// A ground type of the mathematical language.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Serialize)]
pub enum Type {
    /// The boolean type `BOOL`
    Boolean,
    /// An atomic, uninterpreted carrier set identified by its name
    Given(String),
    /// The type of sets of elements of the inner type
    Power(Box<Type>),
    /// The type of pairs
    Product(Box<Type>, Box<Type>),
    /// A datatype applied to type arguments
    Parametric(ParametricType),
}

/// A datatype's type constructor applied to concrete type arguments, for
/// instance `List(S)`.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Serialize)]
pub struct ParametricType {
    /// The datatype whose type constructor is applied
    pub datatype: DatatypeRef,
    /// One type argument per formal parameter of the datatype
    pub params: Vec<Type>,
}

/// Smart constructors for Type.
impl Type {
    /// Smart constructor for given types that takes &str
    pub fn given(name: &str) -> Self {
        Self::Given(name.to_string())
    }

    /// Smart constructor for `ℙ(ty)`
    pub fn power(ty: Type) -> Self {
        Self::Power(Box::new(ty))
    }

    /// Smart constructor for `left × right`
    pub fn product(left: Type, right: Type) -> Self {
        Self::Product(Box::new(left), Box::new(right))
    }

    /// The relational type `ℙ(left × right)`
    pub fn relational(left: Type, right: Type) -> Self {
        Self::power(Self::product(left, right))
    }

    /// Smart constructor for a parametric datatype type
    pub fn parametric(datatype: &DatatypeRef, params: Vec<Type>) -> Self {
        Self::Parametric(ParametricType {
            datatype: datatype.clone(),
            params,
        })
    }

    /// Fold the given types into a left-nested product `((t1 × t2) × t3) …`.
    /// Returns `None` for an empty sequence.
    pub fn product_of<I>(types: I) -> Option<Type>
    where
        I: IntoIterator<Item = Type>,
    {
        types.into_iter().reduce(Type::product)
    }
}

/// Utilities for getting information about a given [`Type`]
impl Type {
    /// The element type of a power set type.
    pub fn base_type(&self) -> Option<&Type> {
        match self {
            Type::Power(base) => Some(base),
            _ => None,
        }
    }

    /// The source type of a relational type `ℙ(S × T)`, that is `S`.
    pub fn source(&self) -> Option<&Type> {
        match self.base_type() {
            Some(Type::Product(left, _)) => Some(left),
            _ => None,
        }
    }

    /// The target type of a relational type `ℙ(S × T)`, that is `T`.
    pub fn target(&self) -> Option<&Type> {
        match self.base_type() {
            Some(Type::Product(_, right)) => Some(right),
            _ => None,
        }
    }

    /// Whether this type is some `ℙ(S × T)`.
    pub fn is_relational(&self) -> bool {
        self.source().is_some()
    }

    /// Add the names of all given types occurring in this type to `acc`.
    pub fn collect_given_types(&self, acc: &mut BTreeSet<String>) {
        match self {
            Type::Boolean => {}
            Type::Given(name) => {
                acc.insert(name.clone());
            }
            Type::Power(base) => base.collect_given_types(acc),
            Type::Product(left, right) => {
                left.collect_given_types(acc);
                right.collect_given_types(acc);
            }
            Type::Parametric(instance) => {
                for param in &instance.params {
                    param.collect_given_types(acc);
                }
            }
        }
    }
}

impl ParametricType {
    /// The type of the values of this datatype instance.
    pub fn to_type(&self) -> Type {
        Type::Parametric(self.clone())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Boolean => write!(f, "BOOL"),
            Type::Given(name) => write!(f, "{name}"),
            Type::Power(base) => write!(f, "ℙ({base})"),
            // products associate to the left, so only a right product needs
            // parentheses
            Type::Product(left, right) => match **right {
                Type::Product(_, _) => write!(f, "{left} × ({right})"),
                _ => write!(f, "{left} × {right}"),
            },
            Type::Parametric(instance) => write!(f, "{instance}"),
        }
    }
}

impl fmt::Display for ParametricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.datatype.name())?;
        if !self.params.is_empty() {
            write!(f, "({})", self.params.iter().join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Type;
    use std::collections::{hash_map::DefaultHasher, BTreeSet};
    use std::hash::{Hash, Hasher};

    fn hash(ty: &Type) -> u64 {
        let mut hasher = DefaultHasher::new();
        ty.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_structural_equality() {
        let a = Type::relational(Type::given("S"), Type::Boolean);
        let b = Type::power(Type::product(Type::given("S"), Type::Boolean));
        assert_eq!(a, b);
        assert_eq!(hash(&a), hash(&b));
        assert_ne!(a, Type::relational(Type::given("T"), Type::Boolean));
    }

    #[test]
    fn test_relational_accessors() {
        let rel = Type::relational(Type::given("S"), Type::given("T"));
        assert!(rel.is_relational());
        assert_eq!(rel.source(), Some(&Type::given("S")));
        assert_eq!(rel.target(), Some(&Type::given("T")));
        assert!(!Type::power(Type::given("S")).is_relational());
        assert_eq!(Type::Boolean.base_type(), None);
    }

    #[test]
    fn test_product_of() {
        assert_eq!(Type::product_of(vec![]), None);
        assert_eq!(
            Type::product_of(vec![Type::given("A"), Type::given("B"), Type::given("C")]),
            Some(Type::product(
                Type::product(Type::given("A"), Type::given("B")),
                Type::given("C")
            ))
        );
    }

    #[test]
    fn test_display() {
        let ty = Type::power(Type::product(
            Type::given("A"),
            Type::product(Type::given("B"), Type::Boolean),
        ));
        assert_eq!(ty.to_string(), "ℙ(A × (B × BOOL))");
        let ty = Type::product(Type::product(Type::given("A"), Type::given("B")), Type::given("C"));
        assert_eq!(ty.to_string(), "A × B × C");
        let list = crate::datatype::tests::list();
        let ty = Type::parametric(&list, vec![Type::power(Type::given("S"))]);
        assert_eq!(ty.to_string(), "List(ℙ(S))");
        assert_eq!(crate::unify::TypeTerm::from(&ty).to_string(), "List(ℙ(S))");
    }

    #[test]
    fn test_given_types() {
        let mut acc = BTreeSet::new();
        Type::relational(Type::given("T"), Type::power(Type::given("S")))
            .collect_given_types(&mut acc);
        assert_eq!(acc.into_iter().collect::<Vec<_>>(), vec!["S", "T"]);
    }
}
