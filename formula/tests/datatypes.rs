// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

use formula::{
    datatype::{ArgType, ConstructorArgument, Datatype, DatatypeRef, DatatypeTranslation},
    factory::FormulaFactory,
    syntax::*,
    types::Type,
    typing::TypeEnvironment,
};

fn list() -> DatatypeRef {
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

fn factory() -> FormulaFactory {
    let mut builder = FormulaFactory::builder();
    builder.datatype(&list()).unwrap();
    builder.build().unwrap()
}

#[test]
fn infer_then_translate() {
    let _ = pretty_env_logger::try_init();
    let ff = factory();
    let x = ff.make_free_identifier("x", None);
    let l = ff.make_free_identifier("l", None);
    let nil = ff.make_extended_expression(ff.extension("nil").unwrap(), vec![], vec![], None);
    let cons = ff.make_extended_expression(
        ff.extension("cons").unwrap(),
        vec![x.clone(), nil],
        vec![],
        None,
    );
    // x ∈ S ∧ l = cons(x, nil)
    let pred = ff.make_associative_predicate(
        AssociativePredOp::Land,
        vec![
            ff.make_relational_predicate(
                RelationalPredOp::In,
                x,
                ff.make_free_identifier("S", None),
            ),
            ff.make_relational_predicate(RelationalPredOp::Equal, l, cons),
        ],
    );
    assert!(!pred.is_type_checked());

    let mut env = TypeEnvironment::new();
    env.add_given_set("S");
    let result = pred.type_check(&env).unwrap();
    assert!(pred.is_type_checked());
    let s = Type::given("S");
    assert_eq!(result.inferred().get("x"), Some(&s));
    assert_eq!(
        result.inferred().get("l"),
        Some(&Type::parametric(&list(), vec![s.clone()]))
    );

    for (name, ty) in result.inferred().iter() {
        env.add(name, ty.clone());
    }
    let mut translation = DatatypeTranslation::new(&ff, &env);
    let translated = translation.translate_predicate(&pred).unwrap();
    insta::assert_display_snapshot!(translated, @"x ∈ S ∧ l = cons(x ↦ nil)");
    assert!(translation.target().datatypes().is_empty());

    let axioms = translation.axioms().unwrap();
    assert_eq!(axioms.len(), 7);
    let target_env = translation.target_type_environment().unwrap();
    assert_eq!(target_env.get("l"), Some(&Type::given("List_Type")));
    assert_eq!(target_env.get("nil"), Some(&Type::given("List_Type")));
    translated.type_check(&target_env).unwrap();
    for axiom in &axioms {
        assert!(axiom.is_type_checked(), "{axiom} is not typed");
        axiom.type_check(&target_env).unwrap();
    }
}

#[test]
fn ill_typed_constructor() {
    let _ = pretty_env_logger::try_init();
    let ff = factory();
    let mut env = TypeEnvironment::new();
    env.add_given_set("S");
    env.add("b", Type::Boolean);
    // cons(b, nil) = cons(x, nil) with x ∈ S
    let cons = |head: Expression| {
        let nil = ff.make_extended_expression(ff.extension("nil").unwrap(), vec![], vec![], None);
        ff.make_extended_expression(ff.extension("cons").unwrap(), vec![head, nil], vec![], None)
    };
    let x = ff.make_free_identifier("x", None);
    let pred = ff.make_associative_predicate(
        AssociativePredOp::Land,
        vec![
            ff.make_relational_predicate(
                RelationalPredOp::In,
                x.clone(),
                ff.make_free_identifier("S", None),
            ),
            ff.make_relational_predicate(
                RelationalPredOp::Equal,
                cons(ff.make_free_identifier("b", None)),
                cons(x),
            ),
        ],
    );
    assert!(pred.type_check(&env).is_err());
    assert!(!pred.is_type_checked());
}
