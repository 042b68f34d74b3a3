use jelly_infer::core::capabilities::EQUATABLE;
use jelly_infer::core::concrete::ConcreteType;
use jelly_infer::jelly::JellyBindings;
use jelly_infer::registry::file::RegistryFile;
use jelly_infer::{
    conversion_factor, parse_jelly, ErrorKind, Registry, TypeChecker, TypeContext, TypeExpr, Unit,
    UnitExpr,
};
use num_rational::BigRational;
use std::sync::Arc;

fn checker() -> TypeChecker {
    let registry: Arc<dyn Registry> = TypeContext::with_builtins().snapshot();
    TypeChecker::new(registry)
}

const DIVIDE: &str = "((NUMBER{@UNITVAR a}, NUMBER{@UNITVAR b}) -> NUMBER{@UNITVAR a/@UNITVAR b})";

#[test]
fn speed_divided_by_time_is_acceleration() {
    let mut checker = checker();
    let divide = checker.instantiate(&parse_jelly(DIVIDE).unwrap()).unwrap();
    let speed = checker.instantiate(&parse_jelly("NUMBER{m/s}").unwrap()).unwrap();
    let time = checker.instantiate(&parse_jelly("NUMBER{s}").unwrap()).unwrap();

    let result = checker.apply_function(&divide, &[speed, time]).unwrap();
    let concrete = checker.concretize(&result).unwrap();
    assert_eq!(concrete.to_string(), "NUMBER{m/s^2}");
}

#[test]
fn each_use_site_gets_fresh_variables() {
    let mut checker = checker();
    let signature = parse_jelly(DIVIDE).unwrap();
    let first = checker.instantiate(&signature).unwrap();
    let second = checker.instantiate(&signature).unwrap();

    let metres = TypeExpr::number(UnitExpr::named("m"));
    let seconds = TypeExpr::number(UnitExpr::named("s"));
    let a = checker.apply_function(&first, &[metres.clone(), seconds.clone()]).unwrap();
    let b = checker.apply_function(&second, &[seconds, metres]).unwrap();

    assert_eq!(checker.concretize(&a).unwrap().to_string(), "NUMBER{m/s}");
    assert_eq!(checker.concretize(&b).unwrap().to_string(), "NUMBER{s/m}");
}

#[test]
fn metres_do_not_unify_with_seconds() {
    let mut checker = checker();
    let err = checker
        .unify(&TypeExpr::number(UnitExpr::named("m")), &TypeExpr::number(UnitExpr::named("s")))
        .unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::UnitMismatch {
            expected: "m".to_string(),
            found: "s".to_string(),
            convertible: false,
        }
    );
    assert!(err.suggestions.is_empty());
}

#[test]
fn convertible_units_suggest_a_factor() {
    let mut checker = checker();
    let err = checker
        .unify(&TypeExpr::number(UnitExpr::named("h")), &TypeExpr::number(UnitExpr::named("min")))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnitMismatch { convertible: true, .. }));
    assert_eq!(err.suggestions, vec!["multiply by 60 to convert h to min".to_string()]);

    let snapshot = TypeContext::with_builtins().snapshot();
    let factor = conversion_factor(&Unit::named("h"), &Unit::named("min"), snapshot.as_ref()).unwrap();
    assert_eq!(factor, Some(BigRational::from_integer(60.into())));
}

#[test]
fn optional_example() {
    let mut checker = checker();
    let some = checker
        .construct_tag("Optional", "Is", Some(&TypeExpr::scalar_number()))
        .unwrap();
    let none = checker.construct_tag("Optional", "None", None).unwrap();

    // Both branches of a conditional must agree
    let unified = checker.unify(&some, &none).unwrap();
    let ConcreteType::Tagged(tagged) = checker.concretize(&unified).unwrap() else {
        panic!("expected a tagged type");
    };
    assert_eq!(tagged.name, "Optional");

    let tags = tagged.tags(checker.registry()).unwrap();
    let names: Vec<&str> = tags.iter().map(|tag| tag.name.as_str()).collect();
    assert_eq!(names, vec!["None", "Is"]);
    assert_eq!(tags[1].payload, Some(ConcreteType::scalar_number()));
}

#[test]
fn equality_needs_equatable_operands() {
    let mut checker = checker();
    let equals = parse_jelly("((@TYPEVAR t, @TYPEVAR t) -> BOOLEAN)").unwrap();

    let mut bindings = JellyBindings::default();
    let op = checker.instantiate_with(&equals, &mut bindings).unwrap();
    let operand = bindings.types["t"].clone();
    checker.require_capability(&operand, EQUATABLE, "operator =").unwrap();

    let texts = checker.apply_function(&op, &[TypeExpr::Text, TypeExpr::Text]).unwrap();
    assert_eq!(checker.concretize(&texts).unwrap(), ConcreteType::Boolean);

    let fresh = checker.instantiate(&equals).unwrap();
    let function = TypeExpr::function(vec![], TypeExpr::Text);
    let mut bindings = JellyBindings::default();
    let second = checker.instantiate_with(&equals, &mut bindings).unwrap();
    checker
        .require_capability(&bindings.types["t"], EQUATABLE, "operator =")
        .unwrap();
    let err = checker
        .apply_function(&second, &[function.clone(), function])
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MissingCapability { .. }));
    assert!(err.message.contains("operator ="));

    // Without the requirement functions go through
    assert!(checker
        .apply_function(&fresh, &vec![TypeExpr::function(vec![], TypeExpr::Text); 2])
        .is_ok());
}

#[test]
fn requirements_flow_into_arrays() {
    let mut checker = checker();
    let distinct = parse_jelly("(([@TYPEVAR t]) -> [@TYPEVAR t])").unwrap();
    let mut bindings = JellyBindings::default();
    let f = checker.instantiate_with(&distinct, &mut bindings).unwrap();
    checker
        .require_capability(&bindings.types["t"], EQUATABLE, "distinct")
        .unwrap();

    let element = checker.fresh_type_var();
    let list = TypeExpr::array(element.clone());
    checker.apply_function(&f, &[list]).unwrap();

    // The element variable inherited the requirement
    let err = checker
        .unify(&element, &TypeExpr::function(vec![], TypeExpr::Boolean))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::MissingCapability { .. }));
}

#[test]
fn registry_files_extend_the_builtins() {
    let context = TypeContext::with_builtins();
    RegistryFile::parse(
        r#"
[[unit]]
name = "ft"
scale = "0.3048"
base = "m"

[[type]]
name = "Measured"
params = ["@UNITVAR u"]
tag = [{ name = "Value", payload = "NUMBER{@UNITVAR u}" }]
"#,
    )
    .unwrap()
    .declare_into(&context)
    .unwrap();

    let registry: Arc<dyn Registry> = context.snapshot();
    let mut checker = TypeChecker::new(registry);
    let feet = TypeExpr::number(UnitExpr::named("ft"));
    let measured = checker.construct_tag("Measured", "Value", Some(&feet)).unwrap();
    let concrete = checker.concretize(&measured).unwrap();
    assert_eq!(concrete.to_string(), "TAGGED \"Measured\" {ft}");

    let err = checker
        .unify(&feet, &TypeExpr::number(UnitExpr::named("m")))
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnitMismatch { convertible: true, .. }));
}

#[test]
fn snapshots_are_isolated_from_later_declarations() {
    let context = TypeContext::with_builtins();
    let before = context.snapshot();
    context
        .declare_base_unit("mol")
        .unwrap();

    assert!(before.lookup_declared_unit("mol").is_none());
    assert!(context.snapshot().lookup_declared_unit("mol").is_some());
}
