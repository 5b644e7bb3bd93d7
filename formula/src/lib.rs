// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The formula engine of a set-theoretic specification language.
//!
//! The crate provides a typed, immutable AST of expressions, predicates and
//! assignments ([syntax]), built through a frozen factory configuration
//! ([factory]) that carries the registered [extension]s and the operator
//! [grammar]. Formulas are type checked by unification ([typing], [unify]),
//! extension occurrences are canonicalized into [signature]s, and algebraic
//! datatypes are compiled down to the core set-theoretic language by the
//! [datatype] translator.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::type_complexity)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod datatype;
pub mod extension;
pub mod factory;
pub mod grammar;
pub mod inspect;
pub mod printer;
pub mod rewrite;
pub mod signature;
pub mod syntax;
pub mod types;
pub mod typing;
pub mod unify;
