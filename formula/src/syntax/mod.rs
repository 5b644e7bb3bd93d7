// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The typed AST of expressions, predicates and assignments.
//!
//! Nodes are immutable and shared through reference counting; they are built
//! by a [FormulaFactory](crate::factory::FormulaFactory). The only change a
//! node ever sees is the transition of its [TypedSlot] from unresolved to
//! resolved, performed once by type checking or at construction.

use std::{fmt, hash, sync::OnceLock};

use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;

use crate::types::Type;

mod assignment;
mod expression;
mod predicate;

pub use assignment::*;
pub use expression::*;
pub use predicate::*;

/// An error returned by a structural operation on formulas
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormulaError {
    /// Assignments are terminal: they cannot be rewritten, inspected or
    /// descended into.
    #[error("assignments do not support {0}")]
    UnsupportedStructuralOperation(&'static str),
    /// The operation needs a type-checked formula.
    #[error("formula is not type-checked")]
    NotTypeChecked,
    /// The position does not denote a sub-formula.
    #[error("no sub-formula at position {0}")]
    InvalidPosition(Position),
    /// The expression is not an extended expression or predicate.
    #[error("not an extended formula: {0}")]
    NotExtended(String),
}

/// The observable state of a [TypedSlot]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeState<'a, T> {
    /// Not yet type-checked
    Unresolved,
    /// Type-checked, with the resolved type
    Resolved(&'a T),
}

/// A slot that transitions at most once from unresolved to resolved.
///
/// Slots do not take part in structural equality or hashing of formulas.
pub struct TypedSlot<T>(OnceLock<T>);

impl<T: PartialEq + fmt::Debug> TypedSlot<T> {
    /// An unresolved slot.
    pub fn new() -> Self {
        TypedSlot(OnceLock::new())
    }

    /// The current state.
    pub fn state(&self) -> TypeState<'_, T> {
        match self.0.get() {
            Some(value) => TypeState::Resolved(value),
            None => TypeState::Unresolved,
        }
    }

    /// The resolved value, if any.
    pub fn get(&self) -> Option<&T> {
        self.0.get()
    }

    /// Resolve the slot. Resolving again with the same value is a no-op;
    /// resolving with a different value is a bug in the caller.
    pub(crate) fn resolve(&self, value: T) {
        if let Err(value) = self.0.set(value) {
            assert_eq!(
                self.0.get(),
                Some(&value),
                "a resolved type slot cannot change"
            );
        }
    }
}

impl<T: PartialEq + fmt::Debug> Default for TypedSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for TypedSlot<T> {
    fn clone(&self) -> Self {
        TypedSlot(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for TypedSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(value) => write!(f, "Resolved({value:?})"),
            None => write!(f, "Unresolved"),
        }
    }
}

impl<T> PartialEq for TypedSlot<T> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T> Eq for TypedSlot<T> {}

impl<T> hash::Hash for TypedSlot<T> {
    fn hash<H: hash::Hasher>(&self, _state: &mut H) {}
}

/// The declaration of a bound identifier by a quantifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BoundIdentDecl {
    name: String,
    ty: TypedSlot<Type>,
}

impl BoundIdentDecl {
    pub(crate) fn new(name: &str, ty: Option<Type>) -> Self {
        let slot = TypedSlot::new();
        if let Some(ty) = ty {
            slot.resolve(ty);
        }
        BoundIdentDecl {
            name: name.to_string(),
            ty: slot,
        }
    }

    /// The declared name, only used for printing.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type of the bound identifier, once known.
    pub fn ty(&self) -> Option<&Type> {
        self.ty.get()
    }

    /// Whether the type of this declaration is known.
    pub fn is_type_checked(&self) -> bool {
        self.ty.get().is_some()
    }

    pub(crate) fn slot(&self) -> &TypedSlot<Type> {
        &self.ty
    }
}

/// A path from a root formula to one of its sub-formulas, as a sequence of
/// child indices.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position(Vec<usize>);

impl Position {
    /// The position of the root.
    pub fn root() -> Self {
        Position(vec![])
    }

    /// The position of the `index`-th child of the sub-formula at this position.
    pub fn child(&self, index: usize) -> Self {
        let mut indexes = self.0.clone();
        indexes.push(index);
        Position(indexes)
    }

    /// The position of the parent, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Position(rest.to_vec()))
    }

    /// Whether this is the root position.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The child indices from the root.
    pub fn indexes(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for Position {
    fn from(indexes: Vec<usize>) -> Self {
        Position(indexes)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "root");
        }
        write!(f, "{}", self.0.iter().join("."))
    }
}

/// Any node of the AST.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Formula {
    Expression(Expression),
    Predicate(Predicate),
    Assignment(Assignment),
    Declaration(BoundIdentDecl),
}

impl From<Expression> for Formula {
    fn from(value: Expression) -> Self {
        Formula::Expression(value)
    }
}

impl From<Predicate> for Formula {
    fn from(value: Predicate) -> Self {
        Formula::Predicate(value)
    }
}

impl From<Assignment> for Formula {
    fn from(value: Assignment) -> Self {
        Formula::Assignment(value)
    }
}

impl From<BoundIdentDecl> for Formula {
    fn from(value: BoundIdentDecl) -> Self {
        Formula::Declaration(value)
    }
}

impl Formula {
    /// The direct children, in position order.
    pub fn children(&self) -> Result<Vec<Formula>, FormulaError> {
        match self {
            Formula::Expression(expr) => Ok(expr.children()),
            Formula::Predicate(pred) => Ok(pred.children()),
            Formula::Assignment(_) => Err(FormulaError::UnsupportedStructuralOperation(
                "fetching children",
            )),
            Formula::Declaration(_) => Ok(vec![]),
        }
    }

    /// The number of direct children.
    pub fn child_count(&self) -> Result<usize, FormulaError> {
        match self {
            Formula::Assignment(_) => Err(FormulaError::UnsupportedStructuralOperation(
                "counting children",
            )),
            _ => Ok(self.children()?.len()),
        }
    }

    /// The `index`-th direct child.
    pub fn child(&self, index: usize) -> Result<Formula, FormulaError> {
        if let Formula::Assignment(_) = self {
            return Err(FormulaError::UnsupportedStructuralOperation(
                "fetching a child",
            ));
        }
        self.children()?
            .into_iter()
            .nth(index)
            .ok_or_else(|| FormulaError::InvalidPosition(Position::root().child(index)))
    }

    /// The sub-formula at `position`, relative to this formula.
    pub fn descendant(&self, position: &Position) -> Result<Formula, FormulaError> {
        if let Formula::Assignment(_) = self {
            return Err(FormulaError::UnsupportedStructuralOperation(
                "fetching a descendant",
            ));
        }
        let mut current = self.clone();
        for &index in position.indexes() {
            current = current
                .children()?
                .into_iter()
                .nth(index)
                .ok_or_else(|| FormulaError::InvalidPosition(position.clone()))?;
        }
        Ok(current)
    }

    /// Whether the formula is type-checked.
    pub fn is_type_checked(&self) -> bool {
        match self {
            Formula::Expression(expr) => expr.is_type_checked(),
            Formula::Predicate(pred) => pred.is_type_checked(),
            Formula::Assignment(assignment) => assignment.is_type_checked(),
            Formula::Declaration(decl) => decl.is_type_checked(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_slot() {
        let slot: TypedSlot<Type> = TypedSlot::new();
        assert_eq!(slot.state(), TypeState::Unresolved);
        slot.resolve(Type::Boolean);
        slot.resolve(Type::Boolean);
        assert_eq!(slot.state(), TypeState::Resolved(&Type::Boolean));
    }

    #[test]
    #[should_panic(expected = "a resolved type slot cannot change")]
    fn test_typed_slot_is_set_once() {
        let slot: TypedSlot<Type> = TypedSlot::new();
        slot.resolve(Type::Boolean);
        slot.resolve(Type::given("S"));
    }

    #[test]
    fn test_position() {
        let position = Position::root().child(1).child(0);
        assert_eq!(position.to_string(), "1.0");
        assert_eq!(position.parent(), Some(Position::from(vec![1])));
        assert_eq!(Position::root().parent(), None);
        assert_eq!(Position::root().to_string(), "root");
    }
}
