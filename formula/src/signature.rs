// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Signatures of extension occurrences.
//!
//! Two occurrences of an extension have the same signature when they could
//! be replaced by the same function: same extension, same number of
//! predicate children, same child types (and same type, for expressions).

use crate::{
    extension::ExtensionRef,
    syntax::{Expression, FormulaError, Predicate},
    types::Type,
};

/// The signature of an extended expression or predicate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExtensionSignature {
    extension: ExtensionRef,
    predicates: usize,
    child_types: Vec<Type>,
    // the type of an expression occurrence; absent for predicates
    return_type: Option<Type>,
}

impl ExtensionSignature {
    /// The signature of an expression extension from its parts.
    pub fn expression(
        extension: &ExtensionRef,
        return_type: Type,
        predicates: usize,
        child_types: Vec<Type>,
    ) -> Self {
        ExtensionSignature {
            extension: extension.clone(),
            predicates,
            child_types,
            return_type: Some(return_type),
        }
    }

    /// The signature of a predicate extension from its parts.
    pub fn predicate(extension: &ExtensionRef, predicates: usize, child_types: Vec<Type>) -> Self {
        ExtensionSignature {
            extension: extension.clone(),
            predicates,
            child_types,
            return_type: None,
        }
    }

    /// The signature of a type-checked extended expression.
    pub fn of_expression(expr: &Expression) -> Result<Self, FormulaError> {
        let ext = expr
            .as_extended()
            .ok_or_else(|| FormulaError::NotExtended(expr.to_string()))?;
        let return_type = expr.ty().ok_or(FormulaError::NotTypeChecked)?;
        Ok(Self::expression(
            &ext.extension,
            return_type.clone(),
            ext.predicates.len(),
            child_types(&ext.expressions)?,
        ))
    }

    /// The signature of a type-checked extended predicate.
    pub fn of_predicate(pred: &Predicate) -> Result<Self, FormulaError> {
        let ext = pred
            .as_extended()
            .ok_or_else(|| FormulaError::NotExtended(pred.to_string()))?;
        if !pred.is_type_checked() {
            return Err(FormulaError::NotTypeChecked);
        }
        Ok(Self::predicate(
            &ext.extension,
            ext.predicates.len(),
            child_types(&ext.expressions)?,
        ))
    }

    /// The extension of the occurrence.
    pub fn extension(&self) -> &ExtensionRef {
        &self.extension
    }

    /// Whether this is the signature of an expression.
    pub fn is_expression(&self) -> bool {
        self.return_type.is_some()
    }

    /// The type of a function that can replace every occurrence with this
    /// signature.
    ///
    /// The domain is the product `((t1 × t2) × …) × BOOL …` of the child
    /// types followed by one `BOOL` per predicate child; the range is the type
    /// of the occurrence, or `BOOL` for predicates. An occurrence without
    /// children is atomic: its functional type is the range itself.
    pub fn functional_type(&self) -> Type {
        let domain = Type::product_of(
            self.child_types
                .iter()
                .cloned()
                .chain(std::iter::repeat(Type::Boolean).take(self.predicates)),
        );
        let range = self.return_type.clone().unwrap_or(Type::Boolean);
        match domain {
            Some(domain) => Type::relational(domain, range),
            None => range,
        }
    }
}

fn child_types(children: &[Expression]) -> Result<Vec<Type>, FormulaError> {
    children
        .iter()
        .map(|child| child.ty().cloned().ok_or(FormulaError::NotTypeChecked))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        extension::{Arity, ArityRange, Extension},
        factory::FormulaFactory,
        unify::TypeTerm,
    };
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn factory() -> FormulaFactory {
        let mut builder = FormulaFactory::builder();
        // first(a, b) : the type of a
        builder
            .extension(Extension::expression(
                "first",
                "first",
                vec![TypeTerm::param(0), TypeTerm::param(1)],
                TypeTerm::param(0),
            ))
            .unwrap();
        // holds(a, …; P) over sets of the same type
        builder
            .extension(
                Extension::predicate("holds", "holds", vec![TypeTerm::power(TypeTerm::param(0))])
                    .with_arity(Arity {
                        expressions: ArityRange::AtLeast(1),
                        predicates: ArityRange::Fixed(1),
                    }),
            )
            .unwrap();
        builder.build().unwrap()
    }

    fn first(ff: &FormulaFactory, a: Type, b: Type) -> Expression {
        ff.make_extended_expression(
            ff.extension("first").unwrap(),
            vec![
                ff.make_free_identifier("a", Some(a)),
                ff.make_free_identifier("b", Some(b)),
            ],
            vec![],
            None,
        )
    }

    #[test]
    fn test_equal_signatures() {
        let ff = factory();
        let s = Type::given("S");
        let one = ExtensionSignature::of_expression(&first(&ff, s.clone(), Type::Boolean)).unwrap();
        let two = ExtensionSignature::of_expression(&first(&ff, s.clone(), Type::Boolean)).unwrap();
        assert_eq!(one, two);
        assert_eq!(hash(&one), hash(&two));
        assert_eq!(
            one,
            ExtensionSignature::expression(
                ff.extension("first").unwrap(),
                s.clone(),
                0,
                vec![s.clone(), Type::Boolean],
            )
        );

        let other = ExtensionSignature::of_expression(&first(&ff, s.clone(), s.clone())).unwrap();
        assert_ne!(one, other);
    }

    #[test]
    fn test_functional_type() {
        let ff = factory();
        let s = Type::given("S");
        let sig = ExtensionSignature::of_expression(&first(&ff, s.clone(), Type::Boolean)).unwrap();
        insta::assert_display_snapshot!(sig.functional_type(), @"ℙ(S × BOOL × S)");

        let holds = ff.extension("holds").unwrap();
        let sig = ExtensionSignature::predicate(
            holds,
            1,
            vec![Type::power(s.clone()), Type::power(s.clone())],
        );
        assert!(!sig.is_expression());
        let ty = sig.functional_type();
        insta::assert_display_snapshot!(ty, @"ℙ(ℙ(S) × ℙ(S) × BOOL × BOOL)");

        let atomic = ExtensionSignature::expression(ff.extension("first").unwrap(), s, 0, vec![]);
        insta::assert_display_snapshot!(atomic.functional_type(), @"S");
    }

    #[test]
    fn test_of_predicate() {
        let ff = factory();
        let s = Type::power(Type::given("S"));
        let pred = ff.make_extended_predicate(
            ff.extension("holds").unwrap(),
            vec![ff.make_free_identifier("A", Some(s.clone()))],
            vec![ff.make_literal_predicate(true)],
        );
        let sig = ExtensionSignature::of_predicate(&pred).unwrap();
        assert_eq!(
            sig,
            ExtensionSignature::predicate(ff.extension("holds").unwrap(), 1, vec![s])
        );
        let untyped = ff.make_extended_predicate(
            ff.extension("holds").unwrap(),
            vec![ff.make_free_identifier("A", None)],
            vec![ff.make_literal_predicate(true)],
        );
        assert_eq!(
            ExtensionSignature::of_predicate(&untyped),
            Err(FormulaError::NotTypeChecked)
        );
        let not_extended = ff.make_literal_predicate(false);
        assert!(matches!(
            ExtensionSignature::of_predicate(&not_extended),
            Err(FormulaError::NotExtended(_))
        ));
    }
}
