// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Translation of one instance of a datatype.
//!
//! The values of an instance are represented by a fresh given type. Every
//! constructor becomes a fresh function into this type and every argument of
//! a constructor a fresh function out of its image. When the datatype is
//! parametric and some constructor takes arguments, a fresh *set
//! constructor* relates the values of the type parameters to the values of
//! the datatype built from them, so that `List[A]` denotes the lists whose
//! elements are in `A`.

use crate::{
    extension::DatatypeRole,
    factory::FormulaFactory,
    syntax::*,
    types::{ParametricType, Type},
};

use super::translation::{TranslationContext, TranslationError};

// Name of the destructor of an argument that has none.
const UNNAMED_ARGUMENT: &str = "d";

/// The translation of a datatype instance, such as `List(S)`.
#[derive(Debug)]
pub struct DatatypeTranslator {
    instance: ParametricType,
    source: FormulaFactory,
    target: FormulaFactory,
    single_constructor: bool,
    trg_params: Vec<Type>,
    trg_datatype: Type,
    trg_datatype_expr: Expression,
    set_constructor: Option<Expression>,
    // per constructor: its replacement and the target types of its arguments
    constructors: Vec<(Expression, Vec<Type>)>,
    // per constructor, per argument
    destructors: Vec<Vec<Expression>>,
}

fn constructor_type(args: &[Type], datatype: &Type) -> Type {
    match Type::product_of(args.iter().cloned()) {
        Some(domain) => Type::relational(domain, datatype.clone()),
        None => datatype.clone(),
    }
}

impl DatatypeTranslator {
    /// Allocate the fresh names of the translation of `instance`: the
    /// translated type parameters first, then the representation type, the
    /// set constructor and, for every constructor, its destructors followed
    /// by the constructor itself.
    pub fn new<C>(instance: &ParametricType, context: &mut C) -> Result<Self, TranslationError>
    where
        C: TranslationContext + ?Sized,
    {
        let datatype = &instance.datatype;
        let has_set_constructor = datatype.has_destructors() && !instance.params.is_empty();
        let trg_params = instance
            .params
            .iter()
            .map(|param| context.translate_type(param))
            .collect::<Result<Vec<_>, _>>()?;

        let name = datatype.name();
        let trg_datatype = if has_set_constructor {
            context.solve_given_type(&format!("{name}_Type"))
        } else {
            context.solve_given_type(name)
        };
        let target = context.target_factory().clone();
        let trg_datatype_expr = target.type_expression(&trg_datatype);
        let set_constructor = if has_set_constructor {
            Some(context.solve_identifier(name, constructor_type(&trg_params, &trg_datatype)))
        } else {
            None
        };

        let own_type = instance.to_type();
        let mut constructors = vec![];
        let mut destructors = vec![];
        for constructor in datatype.constructors() {
            let mut arg_types = vec![];
            let mut replacements = vec![];
            for argument in &constructor.arguments {
                let src_type = argument.ty.instantiate_type(&instance.params, &own_type);
                let trg_type = translate_argument(&src_type, &own_type, &trg_datatype, context)?;
                let symbol = argument.destructor.as_deref().unwrap_or(UNNAMED_ARGUMENT);
                replacements.push(context.solve_identifier(
                    symbol,
                    Type::relational(trg_datatype.clone(), trg_type.clone()),
                ));
                arg_types.push(trg_type);
            }
            let replacement = context.solve_identifier(
                &constructor.symbol,
                constructor_type(&arg_types, &trg_datatype),
            );
            constructors.push((replacement, arg_types));
            destructors.push(replacements);
        }
        log::debug!("translating {} to {trg_datatype}", own_type);

        Ok(DatatypeTranslator {
            instance: instance.clone(),
            source: context.source_factory().clone(),
            target,
            single_constructor: datatype.constructors().len() == 1,
            trg_params,
            trg_datatype,
            trg_datatype_expr,
            set_constructor,
            constructors,
            destructors,
        })
    }

    /// The translated datatype instance.
    pub fn instance(&self) -> &ParametricType {
        &self.instance
    }

    /// The given type representing the values of the instance.
    pub fn translated_type(&self) -> &Type {
        &self.trg_datatype
    }

    /// The set constructor, for parametric datatypes with destructors.
    pub fn set_constructor(&self) -> Option<&Expression> {
        self.set_constructor.as_ref()
    }

    // left-nested application of a binary operator
    fn combine(&self, op: BinaryExprOp, exprs: Vec<Expression>) -> Option<Expression> {
        exprs
            .into_iter()
            .reduce(|left, right| self.target.make_binary_expression(op, left, right))
    }

    fn image(&self, relation: &Expression, sets: Vec<Expression>) -> Expression {
        match self.combine(BinaryExprOp::Cprod, sets) {
            Some(product) => {
                self.target
                    .make_binary_expression(BinaryExprOp::RelImage, relation.clone(), product)
            }
            None => relation.clone(),
        }
    }

    fn apply(&self, function: &Expression, args: Vec<Expression>) -> Expression {
        match self.combine(BinaryExprOp::Mapsto, args) {
            Some(maplets) => {
                self.target
                    .make_binary_expression(BinaryExprOp::FunImage, function.clone(), maplets)
            }
            None => function.clone(),
        }
    }

    /// Replace an occurrence of an extension of the datatype, given its
    /// translated children.
    ///
    /// The type constructor becomes the representation type when it denotes
    /// the type itself, or else the image of its arguments by the set
    /// constructor. Constructors and destructors become the application of
    /// their replacement to their arguments.
    pub fn rewrite(
        &self,
        src: &Expression,
        ext: &ExtendedExpression,
        children: Vec<Expression>,
    ) -> Result<Expression, TranslationError> {
        let Some((_, role)) = ext.extension.datatype() else {
            return Err(TranslationError::NotADatatype(ext.extension.id.clone()));
        };
        Ok(match role {
            DatatypeRole::TypeConstructor => match &self.set_constructor {
                Some(set_constructor) if !src.is_type_expression() => {
                    self.image(set_constructor, children)
                }
                _ => self.trg_datatype_expr.clone(),
            },
            DatatypeRole::Constructor(c) => self.apply(&self.constructors[c].0, children),
            DatatypeRole::Destructor {
                constructor,
                argument,
            } => self.apply(&self.destructors[constructor][argument], children),
        })
    }

    fn membership(
        &self,
        element: &Expression,
        op: BinaryExprOp,
        domain: Expression,
        range: Expression,
    ) -> Predicate {
        let f = &self.target;
        f.make_relational_predicate(
            RelationalPredOp::In,
            element.clone(),
            f.make_binary_expression(op, domain, range),
        )
    }

    fn singleton(&self, element: &Expression) -> Expression {
        self.target.make_set_extension(vec![element.clone()], None)
    }

    // the values built by a constructor
    fn constructor_image(&self, c: usize) -> Expression {
        let (replacement, arg_types) = &self.constructors[c];
        if arg_types.is_empty() {
            self.singleton(replacement)
        } else {
            self.target
                .make_unary_expression(UnaryExprOp::Ran, replacement.clone())
        }
    }

    /// The axioms of the translation, in order: the typing of the set
    /// constructor; for each constructor with arguments, its typing, the
    /// typing of its destructors and their relation to the constructor; the
    /// partition of the representation type by the constructors; the
    /// definition of the set constructor.
    pub fn axioms<C>(&self, context: &mut C) -> Result<Vec<Predicate>, TranslationError>
    where
        C: TranslationContext + ?Sized,
    {
        let f = &self.target;
        let datatype = &self.instance.datatype;
        let mut axioms = vec![];

        if let Some(set_constructor) = &self.set_constructor {
            let params = Type::product_of(self.trg_params.iter().cloned())
                .ok_or_else(|| TranslationError::NotADatatype(datatype.name().to_string()))?;
            axioms.push(self.membership(
                set_constructor,
                BinaryExprOp::Strel,
                f.type_expression(&params),
                self.trg_datatype_expr.clone(),
            ));
        }

        for (c, (replacement, arg_types)) in self.constructors.iter().enumerate() {
            let Some(domain) = Type::product_of(arg_types.iter().cloned()) else {
                continue;
            };
            let op = if self.single_constructor {
                BinaryExprOp::Tbij
            } else {
                BinaryExprOp::Tinj
            };
            axioms.push(self.membership(
                replacement,
                op,
                f.type_expression(&domain),
                self.trg_datatype_expr.clone(),
            ));
            for (destructor, arg_type) in self.destructors[c].iter().zip(arg_types) {
                axioms.push(self.membership(
                    destructor,
                    BinaryExprOp::Tsur,
                    self.constructor_image(c),
                    f.type_expression(arg_type),
                ));
            }
            if let Some(product) = self.combine(BinaryExprOp::Dprod, self.destructors[c].clone()) {
                axioms.push(f.make_relational_predicate(
                    RelationalPredOp::Equal,
                    product,
                    f.make_unary_expression(UnaryExprOp::Converse, replacement.clone()),
                ));
            }
        }

        // a single constructor with arguments is already a bijection
        let single_with_arguments = self.single_constructor && !self.constructors[0].1.is_empty();
        if !single_with_arguments {
            let parts = std::iter::once(self.trg_datatype_expr.clone())
                .chain((0..self.constructors.len()).map(|c| self.constructor_image(c)))
                .collect();
            axioms.push(f.make_multiple_predicate(MultiplePredOp::Partition, parts));
        }

        if let Some(set_constructor) = &self.set_constructor {
            axioms.push(self.set_constructor_definition(set_constructor, context)?);
        }
        log::debug!(
            "emitted {} axioms for {}",
            axioms.len(),
            self.instance.to_type()
        );
        Ok(axioms)
    }

    // ∀T·partition(List[T], {nil}, cons[T × List[T]]), built in the source
    // language over the subsets T of the type parameters, then translated
    fn set_constructor_definition<C>(
        &self,
        set_constructor: &Expression,
        context: &mut C,
    ) -> Result<Predicate, TranslationError>
    where
        C: TranslationContext + ?Sized,
    {
        let src = &self.source;
        let datatype = &self.instance.datatype;
        let n = self.instance.params.len();
        let subsets: Vec<Expression> = self
            .instance
            .params
            .iter()
            .enumerate()
            .map(|(i, param)| {
                src.make_bound_identifier(n - 1 - i, Some(Type::power(param.clone())))
            })
            .collect();
        let own_set = src.make_extended_expression(
            src.type_constructor(datatype),
            subsets.clone(),
            vec![],
            None,
        );

        let translated_subsets = subsets
            .iter()
            .map(|subset| context.translate_expression(subset))
            .collect::<Result<Vec<_>, _>>()?;
        let mut parts = vec![self.image(set_constructor, translated_subsets)];
        for (c, constructor) in datatype.constructors().iter().enumerate() {
            let replacement = &self.constructors[c].0;
            if !constructor.has_arguments() {
                parts.push(self.singleton(replacement));
                continue;
            }
            let mut sets = vec![];
            for argument in &constructor.arguments {
                let set = argument.ty.set_expression(src, &subsets, &own_set);
                sets.push(context.translate_expression(&set)?);
            }
            parts.push(self.image(replacement, sets));
        }

        let f = &self.target;
        let decls = datatype
            .formal_names()
            .iter()
            .zip(&self.trg_params)
            .map(|(name, param)| f.make_bound_ident_decl(name, Some(Type::power(param.clone()))))
            .collect();
        Ok(f.make_quantified_predicate(
            Quantifier::Forall,
            decls,
            f.make_multiple_predicate(MultiplePredOp::Partition, parts),
        ))
    }
}

// Translate the type of a constructor argument, where the instance being
// translated stands for itself.
fn translate_argument<C>(
    ty: &Type,
    own_type: &Type,
    trg_datatype: &Type,
    context: &mut C,
) -> Result<Type, TranslationError>
where
    C: TranslationContext + ?Sized,
{
    if ty == own_type {
        return Ok(trg_datatype.clone());
    }
    Ok(match ty {
        Type::Power(base) => {
            Type::power(translate_argument(base, own_type, trg_datatype, context)?)
        }
        Type::Product(left, right) => Type::product(
            translate_argument(left, own_type, trg_datatype, context)?,
            translate_argument(right, own_type, trg_datatype, context)?,
        ),
        Type::Boolean | Type::Given(_) | Type::Parametric(_) => context.translate_type(ty)?,
    })
}
