// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Descriptors of operators added to the core language.
//!
//! An [Extension] is registered once in a factory configuration and is then
//! shared by every node that uses it through an [ExtensionRef].

use std::{fmt, hash, ops::Deref, sync::Arc};

use serde::{Serialize, Serializer};

use crate::{datatype::DatatypeRef, unify::TypeTerm};

/// Whether an extension builds expressions or predicates
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExtensionKind {
    Expression,
    Predicate,
}

/// The admissible number of children of one family
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArityRange {
    /// Exactly this many children
    Fixed(usize),
    /// At least this many children
    AtLeast(usize),
}

impl ArityRange {
    /// Whether `count` children are admissible.
    pub fn contains(&self, count: usize) -> bool {
        match *self {
            ArityRange::Fixed(n) => count == n,
            ArityRange::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for ArityRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArityRange::Fixed(n) => write!(f, "{n}"),
            ArityRange::AtLeast(n) => write!(f, "{n} or more"),
        }
    }
}

/// Number of expression and predicate children of an extension
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Arity {
    /// Expression children, which come first
    pub expressions: ArityRange,
    /// Predicate children, which come after the expressions
    pub predicates: ArityRange,
}

/// How an extension is written
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Notation {
    /// `op(a, b, …)`
    Prefix,
    /// `a op b`, a binary operator
    Infix,
    /// `a op b op c`, a variadic operator
    Associative,
}

/// The role an extension plays for its datatype
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DatatypeRole {
    /// The type constructor
    TypeConstructor,
    /// The constructor with this index
    Constructor(usize),
    /// The destructor of an argument of a constructor
    #[allow(missing_docs)]
    Destructor { constructor: usize, argument: usize },
}

/// How the type of an extended formula relates to the types of its children
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Typing {
    /// Type patterns over [TypeTerm::param]s. `args` holds one pattern per
    /// expression child; when there are more children than patterns, the last
    /// pattern applies to the remaining children. `result` is the type of an
    /// expression extension and is absent for predicate extensions.
    #[allow(missing_docs)]
    Rule {
        args: Vec<TypeTerm>,
        result: Option<TypeTerm>,
    },
    /// Typing given by the datatype model
    #[allow(missing_docs)]
    Datatype {
        datatype: DatatypeRef,
        role: DatatypeRole,
    },
}

/// An operator added to the core language.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Extension {
    /// Unique identifier within a factory configuration, also used as the
    /// operator id in the grammar
    pub id: String,
    /// The syntax symbol
    pub symbol: String,
    /// Expression or predicate extension
    pub kind: ExtensionKind,
    /// Number of children
    pub arity: Arity,
    /// How the operator is written
    pub notation: Notation,
    /// Typing of the operator
    pub typing: Typing,
}

impl Extension {
    /// A prefix expression operator with a fixed number of expression children.
    pub fn expression(id: &str, symbol: &str, args: Vec<TypeTerm>, result: TypeTerm) -> Self {
        Extension {
            id: id.to_string(),
            symbol: symbol.to_string(),
            kind: ExtensionKind::Expression,
            arity: Arity {
                expressions: ArityRange::Fixed(args.len()),
                predicates: ArityRange::Fixed(0),
            },
            notation: Notation::Prefix,
            typing: Typing::Rule {
                args,
                result: Some(result),
            },
        }
    }

    /// A prefix predicate operator with a fixed number of expression children.
    pub fn predicate(id: &str, symbol: &str, args: Vec<TypeTerm>) -> Self {
        Extension {
            id: id.to_string(),
            symbol: symbol.to_string(),
            kind: ExtensionKind::Predicate,
            arity: Arity {
                expressions: ArityRange::Fixed(args.len()),
                predicates: ArityRange::Fixed(0),
            },
            notation: Notation::Prefix,
            typing: Typing::Rule { args, result: None },
        }
    }

    /// Change the arity.
    pub fn with_arity(mut self, arity: Arity) -> Self {
        self.arity = arity;
        self
    }

    /// Change the notation.
    pub fn with_notation(mut self, notation: Notation) -> Self {
        self.notation = notation;
        self
    }

    /// The datatype this extension was generated from, with its role.
    pub fn datatype(&self) -> Option<(&DatatypeRef, DatatypeRole)> {
        match &self.typing {
            Typing::Datatype { datatype, role } => Some((datatype, *role)),
            Typing::Rule { .. } => None,
        }
    }

    /// Whether this is the type constructor of a datatype.
    pub fn is_type_constructor(&self) -> bool {
        matches!(self.datatype(), Some((_, DatatypeRole::TypeConstructor)))
    }
}

/// A shared, read-only handle on a registered [Extension].
///
/// Handles compare, hash and serialize by extension id.
#[derive(Clone)]
pub struct ExtensionRef(Arc<Extension>);

impl ExtensionRef {
    /// Wrap an extension in a shared handle.
    pub fn new(extension: Extension) -> Self {
        ExtensionRef(Arc::new(extension))
    }
}

impl Deref for ExtensionRef {
    type Target = Extension;

    fn deref(&self) -> &Extension {
        &self.0
    }
}

impl PartialEq for ExtensionRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.id == other.id
    }
}

impl Eq for ExtensionRef {}

impl hash::Hash for ExtensionRef {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl fmt::Debug for ExtensionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtensionRef({})", self.id)
    }
}

impl Serialize for ExtensionRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity() {
        assert!(ArityRange::Fixed(2).contains(2));
        assert!(!ArityRange::Fixed(2).contains(3));
        assert!(ArityRange::AtLeast(2).contains(5));
        assert!(!ArityRange::AtLeast(2).contains(1));
        assert_eq!(ArityRange::AtLeast(2).to_string(), "2 or more");
    }

    #[test]
    fn test_handles_compare_by_id() {
        let a = ExtensionRef::new(Extension::predicate(
            "prime",
            "prime",
            vec![TypeTerm::power(TypeTerm::given("Z"))],
        ));
        let b = ExtensionRef::new(Extension::predicate("prime", "isPrime", vec![]));
        assert_eq!(a, b);
        assert!(!a.is_type_constructor());
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"prime\"");
    }
}
