// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Compilation of datatypes away.
//!
//! A [DatatypeTranslation] rewrites type-checked formulas of a factory with
//! datatypes into formulas of the same factory stripped of its datatypes.
//! Every datatype instance met on the way gets a [DatatypeTranslator], which
//! allocates fresh names that do not clash with the identifiers of the source
//! type environment nor with those of the translated formulas. The axioms
//! describing the fresh names are then available from [DatatypeTranslation::axioms].

use std::sync::Arc;

use fxhash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::{
    extension::DatatypeRole,
    factory::FormulaFactory,
    rewrite::Rewriter,
    syntax::*,
    types::{ParametricType, Type},
    typing::TypeEnvironment,
};

use super::translator::DatatypeTranslator;

/// An error raised while translating datatypes away
#[allow(missing_docs)]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error(transparent)]
    Formula(#[from] FormulaError),
    #[error("datatype {0} is not registered in the source factory")]
    UnknownDatatype(String),
    #[error("{0} does not denote a datatype instance")]
    NotADatatype(String),
}

/// What a [DatatypeTranslator] needs from the ongoing translation.
pub trait TranslationContext {
    /// The factory of the translated formulas.
    fn source_factory(&self) -> &FormulaFactory;

    /// The factory of the produced formulas.
    fn target_factory(&self) -> &FormulaFactory;

    /// Allocate a fresh given type, named after `name`.
    fn solve_given_type(&mut self, name: &str) -> Type;

    /// Allocate a fresh free identifier of type `ty`, named after `name`.
    fn solve_identifier(&mut self, name: &str, ty: Type) -> Expression;

    /// Translate a source type.
    fn translate_type(&mut self, ty: &Type) -> Result<Type, TranslationError>;

    /// Translate a type-checked source expression.
    fn translate_expression(&mut self, expr: &Expression) -> Result<Expression, TranslationError>;
}

/// The translation of the datatypes of a factory, relative to a type
/// environment.
#[derive(Debug)]
pub struct DatatypeTranslation {
    source: FormulaFactory,
    target: FormulaFactory,
    source_env: TypeEnvironment,
    used_names: FxHashSet<String>,
    // the fresh names, with their types
    allocated: TypeEnvironment,
    cache: FxHashMap<ParametricType, usize>,
    translators: Vec<Arc<DatatypeTranslator>>,
}

impl DatatypeTranslation {
    /// Prepare the translation of formulas built by `source`, whose free
    /// identifiers are typed by `env`.
    pub fn new(source: &FormulaFactory, env: &TypeEnvironment) -> Self {
        let mut used_names: FxHashSet<String> = env.iter().map(|(name, _)| name.clone()).collect();
        let mut given = Default::default();
        for (_, ty) in env.iter() {
            ty.collect_given_types(&mut given);
        }
        used_names.extend(given);
        DatatypeTranslation {
            source: source.clone(),
            target: source.without_datatypes(),
            source_env: env.clone(),
            used_names,
            allocated: TypeEnvironment::new(),
            cache: FxHashMap::default(),
            translators: vec![],
        }
    }

    /// The factory of the formulas produced by this translation.
    pub fn target(&self) -> &FormulaFactory {
        &self.target
    }

    fn fresh_name(&mut self, name: &str) -> String {
        let mut fresh = name.to_string();
        let mut suffix = 0;
        while self.used_names.contains(&fresh) {
            fresh = format!("{name}{suffix}");
            suffix += 1;
        }
        if fresh != name {
            log::trace!("{name} is taken, using {fresh}");
        }
        self.used_names.insert(fresh.clone());
        fresh
    }

    /// The translator of a datatype instance, created on first use.
    pub fn translator(
        &mut self,
        instance: &ParametricType,
    ) -> Result<Arc<DatatypeTranslator>, TranslationError> {
        if let Some(&index) = self.cache.get(instance) {
            return Ok(self.translators[index].clone());
        }
        if !self.source.datatypes().contains(&instance.datatype) {
            return Err(TranslationError::UnknownDatatype(
                instance.datatype.name().to_string(),
            ));
        }
        let translator = Arc::new(DatatypeTranslator::new(instance, self)?);
        self.cache.insert(instance.clone(), self.translators.len());
        self.translators.push(translator.clone());
        Ok(translator)
    }

    /// Translate a type-checked predicate of the source factory.
    pub fn translate_predicate(&mut self, pred: &Predicate) -> Result<Predicate, TranslationError> {
        if !pred.is_type_checked() {
            return Err(FormulaError::NotTypeChecked.into());
        }
        for ident in pred.free_identifiers() {
            if let Some(name) = ident.as_free_identifier() {
                self.used_names.insert(name.to_string());
            }
        }
        pred.rewrite(&mut DatatypeRewriter { translation: self })
    }

    /// The axioms of all the datatype instances translated so far.
    pub fn axioms(&mut self) -> Result<Vec<Predicate>, TranslationError> {
        let mut axioms = vec![];
        // the axioms of an instance can bring in new instances
        let mut i = 0;
        while i < self.translators.len() {
            let translator = self.translators[i].clone();
            axioms.extend(translator.axioms(self)?);
            i += 1;
        }
        Ok(axioms)
    }

    /// The type environment of the translated formulas: the translated
    /// source environment plus the fresh names.
    pub fn target_type_environment(&mut self) -> Result<TypeEnvironment, TranslationError> {
        let source: Vec<(String, Type)> = self
            .source_env
            .iter()
            .map(|(name, ty)| (name.clone(), ty.clone()))
            .collect();
        let mut env = TypeEnvironment::new();
        for (name, ty) in source {
            env.add(&name, self.translate_type(&ty)?);
        }
        for (name, ty) in self.allocated.iter() {
            env.add(name, ty.clone());
        }
        Ok(env)
    }
}

impl TranslationContext for DatatypeTranslation {
    fn source_factory(&self) -> &FormulaFactory {
        &self.source
    }

    fn target_factory(&self) -> &FormulaFactory {
        &self.target
    }

    fn solve_given_type(&mut self, name: &str) -> Type {
        let name = self.fresh_name(name);
        self.allocated.add_given_set(&name);
        Type::given(&name)
    }

    fn solve_identifier(&mut self, name: &str, ty: Type) -> Expression {
        let name = self.fresh_name(name);
        self.allocated.add(&name, ty.clone());
        self.target.make_free_identifier(&name, Some(ty))
    }

    fn translate_type(&mut self, ty: &Type) -> Result<Type, TranslationError> {
        Ok(match ty {
            Type::Boolean | Type::Given(_) => ty.clone(),
            Type::Power(base) => Type::power(self.translate_type(base)?),
            Type::Product(left, right) => {
                Type::product(self.translate_type(left)?, self.translate_type(right)?)
            }
            Type::Parametric(instance) => self.translator(instance)?.translated_type().clone(),
        })
    }

    fn translate_expression(&mut self, expr: &Expression) -> Result<Expression, TranslationError> {
        expr.rewrite(&mut DatatypeRewriter { translation: self })
    }
}

struct DatatypeRewriter<'t> {
    translation: &'t mut DatatypeTranslation,
}

impl Rewriter for DatatypeRewriter<'_> {
    type Error = TranslationError;

    fn factory(&self) -> &FormulaFactory {
        &self.translation.target
    }

    fn rewrite_type(&mut self, ty: &Type) -> Result<Type, TranslationError> {
        self.translation.translate_type(ty)
    }

    fn rewrite_extended_expression(
        &mut self,
        src: &Expression,
        ext: &ExtendedExpression,
        expressions: Vec<Expression>,
        predicates: Vec<Predicate>,
        ty: Option<Type>,
    ) -> Result<Expression, TranslationError> {
        let Some((_, role)) = ext.extension.datatype() else {
            return Ok(self.translation.target.make_extended_expression(
                &ext.extension,
                expressions,
                predicates,
                ty,
            ));
        };
        let instance_type = match role {
            DatatypeRole::TypeConstructor => src.ty().and_then(Type::base_type),
            DatatypeRole::Constructor(_) => src.ty(),
            DatatypeRole::Destructor { .. } => ext.expressions.first().and_then(Expression::ty),
        };
        let Some(Type::Parametric(instance)) = instance_type else {
            return Err(TranslationError::NotADatatype(src.to_string()));
        };
        let translator = self.translation.translator(instance)?;
        translator.rewrite(src, ext, expressions)
    }
}
