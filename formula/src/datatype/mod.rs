// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Algebraic datatypes and their translation to the core language.
//!
//! A [Datatype] is a named, possibly parametric, type with a list of
//! constructors. Registering it in a factory registers one extension for its
//! type constructor, one per constructor and one per named destructor. The
//! [translation] module compiles formulas using these extensions into formulas
//! of the core set-theoretic language plus axioms.

use std::{collections::BTreeSet, fmt, hash, ops::Deref, sync::Arc};

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::{
    extension::{Arity, ArityRange, DatatypeRole, Extension, ExtensionKind, Notation, Typing},
    factory::FormulaFactory,
    syntax::{AtomicExpr, BinaryExprOp, Expression, UnaryExprOp},
    types::Type,
    unify::TypeTerm,
};

pub mod translation;
pub mod translator;

pub use translation::{DatatypeTranslation, TranslationContext, TranslationError};
pub use translator::DatatypeTranslator;

/// An error in the definition of a datatype
#[allow(missing_docs)]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatatypeError {
    #[error("datatype {0} has no constructor")]
    NoConstructor(String),
    #[error("symbol {symbol} is declared twice in datatype {datatype}")]
    DuplicateSymbol { datatype: String, symbol: String },
    #[error("datatype {datatype} has no type parameter #{index}")]
    UnknownTypeParameter { datatype: String, index: usize },
    #[error("recursive occurrence of datatype {datatype} in argument of {constructor} is not positive")]
    IllegalRecursion {
        datatype: String,
        constructor: String,
    },
}

/// The type of a constructor argument, expressed over the formal type
/// parameters of its datatype.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArgType {
    /// The formal type parameter with this index
    Param(usize),
    /// A given type
    Given(String),
    /// `BOOL`
    Boolean,
    /// A power set type
    Power(Box<ArgType>),
    /// A product type
    Product(Box<ArgType>, Box<ArgType>),
    /// The datatype being defined, applied to its own formal parameters
    Recursive,
    /// Another, previously defined, datatype
    Datatype(DatatypeRef, Vec<ArgType>),
}

impl ArgType {
    /// Smart constructor for given types that takes &str
    pub fn given(name: &str) -> Self {
        ArgType::Given(name.to_string())
    }

    /// Smart constructor for `ℙ(ty)`
    pub fn power(ty: ArgType) -> Self {
        ArgType::Power(Box::new(ty))
    }

    /// Smart constructor for `left × right`
    pub fn product(left: ArgType, right: ArgType) -> Self {
        ArgType::Product(Box::new(left), Box::new(right))
    }

    /// The type term of this argument, given the terms of the actual type
    /// parameters and of the datatype instance itself.
    pub fn instantiate(&self, params: &[TypeTerm], recursive: &TypeTerm) -> TypeTerm {
        match self {
            ArgType::Param(i) => params[*i].clone(),
            ArgType::Given(name) => TypeTerm::Given(name.clone()),
            ArgType::Boolean => TypeTerm::Boolean,
            ArgType::Power(base) => TypeTerm::power(base.instantiate(params, recursive)),
            ArgType::Product(left, right) => TypeTerm::product(
                left.instantiate(params, recursive),
                right.instantiate(params, recursive),
            ),
            ArgType::Recursive => recursive.clone(),
            ArgType::Datatype(datatype, args) => TypeTerm::Parametric(
                datatype.clone(),
                args.iter()
                    .map(|arg| arg.instantiate(params, recursive))
                    .collect(),
            ),
        }
    }

    /// The ground type of this argument for a datatype instance.
    pub fn instantiate_type(&self, params: &[Type], recursive: &Type) -> Type {
        match self {
            ArgType::Param(i) => params[*i].clone(),
            ArgType::Given(name) => Type::Given(name.clone()),
            ArgType::Boolean => Type::Boolean,
            ArgType::Power(base) => Type::power(base.instantiate_type(params, recursive)),
            ArgType::Product(left, right) => Type::product(
                left.instantiate_type(params, recursive),
                right.instantiate_type(params, recursive),
            ),
            ArgType::Recursive => recursive.clone(),
            ArgType::Datatype(datatype, args) => Type::parametric(
                datatype,
                args.iter()
                    .map(|arg| arg.instantiate_type(params, recursive))
                    .collect(),
            ),
        }
    }

    /// The set of values of this argument type that are built from the given
    /// subsets of the type parameters. `own_set` is the set of values of the
    /// datatype itself built from these subsets.
    pub fn set_expression(
        &self,
        factory: &FormulaFactory,
        sets: &[Expression],
        own_set: &Expression,
    ) -> Expression {
        match self {
            ArgType::Param(i) => sets[*i].clone(),
            ArgType::Given(name) => factory.type_expression(&Type::given(name)),
            ArgType::Boolean => factory.make_atomic_expression(AtomicExpr::BoolSet, None),
            ArgType::Power(base) => factory.make_unary_expression(
                UnaryExprOp::Pow,
                base.set_expression(factory, sets, own_set),
            ),
            ArgType::Product(left, right) => factory.make_binary_expression(
                BinaryExprOp::Cprod,
                left.set_expression(factory, sets, own_set),
                right.set_expression(factory, sets, own_set),
            ),
            ArgType::Recursive => own_set.clone(),
            ArgType::Datatype(datatype, args) => {
                let children = args
                    .iter()
                    .map(|arg| arg.set_expression(factory, sets, own_set))
                    .collect();
                factory.make_extended_expression(
                    factory.type_constructor(datatype),
                    children,
                    vec![],
                    None,
                )
            }
        }
    }

    fn max_param(&self) -> Option<usize> {
        match self {
            ArgType::Param(i) => Some(*i),
            ArgType::Given(_) | ArgType::Boolean | ArgType::Recursive => None,
            ArgType::Power(base) => base.max_param(),
            ArgType::Product(left, right) => left.max_param().max(right.max_param()),
            ArgType::Datatype(_, args) => args.iter().filter_map(ArgType::max_param).max(),
        }
    }

    // the datatype may only occur at the top of an argument or as a component
    // of a product
    fn has_illegal_recursion(&self, top: bool) -> bool {
        match self {
            ArgType::Recursive => !top,
            ArgType::Param(_) | ArgType::Given(_) | ArgType::Boolean => false,
            ArgType::Power(base) => base.has_illegal_recursion(false),
            ArgType::Product(left, right) => {
                left.has_illegal_recursion(top) || right.has_illegal_recursion(top)
            }
            ArgType::Datatype(_, args) => args.iter().any(|arg| arg.has_illegal_recursion(false)),
        }
    }
}

/// One argument of a constructor
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConstructorArgument {
    /// The name of the destructor that accesses this argument, if any
    pub destructor: Option<String>,
    /// The type of the argument
    pub ty: ArgType,
}

impl ConstructorArgument {
    /// An argument accessed by a destructor.
    pub fn destructor(name: &str, ty: ArgType) -> Self {
        ConstructorArgument {
            destructor: Some(name.to_string()),
            ty,
        }
    }

    /// An argument without destructor.
    pub fn unnamed(ty: ArgType) -> Self {
        ConstructorArgument {
            destructor: None,
            ty,
        }
    }
}

/// A constructor of a datatype
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Constructor {
    /// The constructor's symbol, also its extension id
    pub symbol: String,
    /// Arguments, in order
    pub arguments: Vec<ConstructorArgument>,
}

impl Constructor {
    /// Whether this constructor takes any argument.
    pub fn has_arguments(&self) -> bool {
        !self.arguments.is_empty()
    }
}

/// An algebraic datatype definition.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Datatype {
    name: String,
    formal_names: Vec<String>,
    constructors: Vec<Constructor>,
}

impl Datatype {
    /// Start the definition of a datatype.
    pub fn builder(name: &str) -> DatatypeBuilder {
        DatatypeBuilder {
            name: name.to_string(),
            formal_names: vec![],
            constructors: vec![],
        }
    }

    /// The name of the datatype, also the symbol of its type constructor.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of the formal type parameters.
    pub fn formal_names(&self) -> &[String] {
        &self.formal_names
    }

    /// The constructors, in declaration order.
    pub fn constructors(&self) -> &[Constructor] {
        &self.constructors
    }

    /// Whether some constructor takes arguments.
    pub fn has_destructors(&self) -> bool {
        self.constructors.iter().any(Constructor::has_arguments)
    }
}

/// A shared handle on a [Datatype].
///
/// Datatypes are identified by name: two handles are equal when they name the
/// same datatype.
#[derive(Clone)]
pub struct DatatypeRef(Arc<Datatype>);

impl DatatypeRef {
    /// The extensions to register in a factory for this datatype: the type
    /// constructor, then each constructor followed by its destructors.
    pub fn extensions(&self) -> Vec<Extension> {
        let mut result = vec![Extension {
            id: self.name.clone(),
            symbol: self.name.clone(),
            kind: ExtensionKind::Expression,
            arity: Arity {
                expressions: ArityRange::Fixed(self.formal_names.len()),
                predicates: ArityRange::Fixed(0),
            },
            notation: Notation::Prefix,
            typing: Typing::Datatype {
                datatype: self.clone(),
                role: DatatypeRole::TypeConstructor,
            },
        }];
        for (c, constructor) in self.constructors.iter().enumerate() {
            result.push(Extension {
                id: constructor.symbol.clone(),
                symbol: constructor.symbol.clone(),
                kind: ExtensionKind::Expression,
                arity: Arity {
                    expressions: ArityRange::Fixed(constructor.arguments.len()),
                    predicates: ArityRange::Fixed(0),
                },
                notation: Notation::Prefix,
                typing: Typing::Datatype {
                    datatype: self.clone(),
                    role: DatatypeRole::Constructor(c),
                },
            });
            for (a, argument) in constructor.arguments.iter().enumerate() {
                if let Some(name) = &argument.destructor {
                    result.push(Extension {
                        id: name.clone(),
                        symbol: name.clone(),
                        kind: ExtensionKind::Expression,
                        arity: Arity {
                            expressions: ArityRange::Fixed(1),
                            predicates: ArityRange::Fixed(0),
                        },
                        notation: Notation::Prefix,
                        typing: Typing::Datatype {
                            datatype: self.clone(),
                            role: DatatypeRole::Destructor {
                                constructor: c,
                                argument: a,
                            },
                        },
                    });
                }
            }
        }
        result
    }
}

impl Deref for DatatypeRef {
    type Target = Datatype;

    fn deref(&self) -> &Datatype {
        &self.0
    }
}

impl PartialEq for DatatypeRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.name == other.name
    }
}

impl Eq for DatatypeRef {}

impl hash::Hash for DatatypeRef {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state)
    }
}

impl fmt::Debug for DatatypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DatatypeRef({})", self.name)
    }
}

impl Serialize for DatatypeRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

/// Builds a [Datatype], checking it is well formed.
#[derive(Debug, Clone)]
pub struct DatatypeBuilder {
    name: String,
    formal_names: Vec<String>,
    constructors: Vec<Constructor>,
}

impl DatatypeBuilder {
    /// Add a formal type parameter.
    pub fn type_parameter(mut self, name: &str) -> Self {
        self.formal_names.push(name.to_string());
        self
    }

    /// Add a constructor.
    pub fn constructor(mut self, symbol: &str, arguments: Vec<ConstructorArgument>) -> Self {
        self.constructors.push(Constructor {
            symbol: symbol.to_string(),
            arguments,
        });
        self
    }

    /// Finish the definition.
    pub fn build(self) -> Result<DatatypeRef, DatatypeError> {
        if self.constructors.is_empty() {
            return Err(DatatypeError::NoConstructor(self.name));
        }
        let mut symbols = BTreeSet::from([self.name.clone()]);
        let destructors = self
            .constructors
            .iter()
            .flat_map(|c| c.arguments.iter().filter_map(|a| a.destructor.as_ref()));
        for symbol in self
            .constructors
            .iter()
            .map(|c| &c.symbol)
            .chain(destructors)
        {
            if !symbols.insert(symbol.clone()) {
                return Err(DatatypeError::DuplicateSymbol {
                    datatype: self.name,
                    symbol: symbol.clone(),
                });
            }
        }
        for constructor in &self.constructors {
            for argument in &constructor.arguments {
                if let Some(index) = argument.ty.max_param() {
                    if index >= self.formal_names.len() {
                        return Err(DatatypeError::UnknownTypeParameter {
                            datatype: self.name,
                            index,
                        });
                    }
                }
                if argument.ty.has_illegal_recursion(true) {
                    return Err(DatatypeError::IllegalRecursion {
                        datatype: self.name,
                        constructor: constructor.symbol.clone(),
                    });
                }
            }
        }
        log::debug!(
            "defined datatype {} with {} constructors",
            self.name,
            self.constructors.len()
        );
        Ok(DatatypeRef(Arc::new(Datatype {
            name: self.name,
            formal_names: self.formal_names,
            constructors: self.constructors,
        })))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// `List(T) ::= nil | cons(head: T, tail: List(T))`
    pub(crate) fn list() -> DatatypeRef {
        Datatype::builder("List")
            .type_parameter("T")
            .constructor("nil", vec![])
            .constructor(
                "cons",
                vec![
                    ConstructorArgument::destructor("head", ArgType::Param(0)),
                    ConstructorArgument::destructor("tail", ArgType::Recursive),
                ],
            )
            .build()
            .unwrap()
    }

    /// `Color ::= red | green | blue`
    pub(crate) fn color() -> DatatypeRef {
        Datatype::builder("Color")
            .constructor("red", vec![])
            .constructor("green", vec![])
            .constructor("blue", vec![])
            .build()
            .unwrap()
    }

    /// `Pair ::= mk(fst: S, snd: T)` over given types `S` and `T`
    pub(crate) fn pair() -> DatatypeRef {
        Datatype::builder("Pair")
            .constructor(
                "mk",
                vec![
                    ConstructorArgument::destructor("fst", ArgType::given("S")),
                    ConstructorArgument::destructor("snd", ArgType::given("T")),
                ],
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_extensions() {
        let ids: Vec<String> = list().extensions().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["List", "nil", "cons", "head", "tail"]);
        assert!(list().has_destructors());
        assert!(!color().has_destructors());
    }

    #[test]
    fn test_malformed() {
        assert_eq!(
            Datatype::builder("Empty").build(),
            Err(DatatypeError::NoConstructor("Empty".to_string()))
        );
        let duplicate = Datatype::builder("D")
            .constructor("c", vec![ConstructorArgument::destructor("c", ArgType::Boolean)])
            .build();
        assert!(matches!(duplicate, Err(DatatypeError::DuplicateSymbol { .. })));
        let unknown = Datatype::builder("D")
            .type_parameter("T")
            .constructor("c", vec![ConstructorArgument::unnamed(ArgType::Param(1))])
            .build();
        assert!(matches!(
            unknown,
            Err(DatatypeError::UnknownTypeParameter { index: 1, .. })
        ));
        let negative = Datatype::builder("D")
            .constructor(
                "c",
                vec![ConstructorArgument::unnamed(ArgType::power(ArgType::Recursive))],
            )
            .build();
        assert!(matches!(negative, Err(DatatypeError::IllegalRecursion { .. })));
    }

    #[test]
    fn test_instantiate() {
        let list = list();
        let instance = Type::parametric(&list, vec![Type::given("S")]);
        let tail = &list.constructors()[1].arguments[1];
        assert_eq!(tail.ty.instantiate_type(&[Type::given("S")], &instance), instance);
        let head = &list.constructors()[1].arguments[0];
        assert_eq!(
            head.ty
                .instantiate(&[TypeTerm::given("S")], &TypeTerm::from(&instance)),
            TypeTerm::given("S")
        );
    }
}
