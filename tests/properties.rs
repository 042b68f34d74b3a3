use jelly_infer::analysis::{Concretizer, Unifier};
use jelly_infer::core::capabilities::{CapabilitySet, EQUATABLE};
use jelly_infer::jelly::{parse_jelly, JellyType};
use jelly_infer::registry::TypeContext;
use jelly_infer::units::canonicalize;
use jelly_infer::{ErrorKind, TypeExpr, Unit, UnitExpr, Universe};
use proptest::prelude::*;
use proptest::strategy::Union;

/// Shapes with numbered variable slots, turned into types inside a universe.
#[derive(Debug, Clone)]
enum Shape {
    Slot(usize),
    Number(&'static str),
    /// A declared unit (or none) times powers of unit variable slots.
    Measure(Option<&'static str>, Vec<(usize, i32)>),
    Text,
    Boolean,
    Array(Box<Shape>),
    Tuple(Vec<Shape>),
    Function(Vec<Shape>, Box<Shape>),
}

/// Type slots; the last one requires `Equatable`.
const SLOTS: usize = 3;
const UNIT_SLOTS: usize = 2;

fn unit_powers() -> impl Strategy<Value = Vec<(usize, i32)>> {
    prop::collection::vec((0..UNIT_SLOTS, -3i32..=3), 1..3)
}

fn shape(with_slots: bool) -> BoxedStrategy<Shape> {
    let mut leaves = vec![
        Just(Shape::Text).boxed(),
        Just(Shape::Boolean).boxed(),
        prop_oneof![Just("m"), Just("s"), Just("km")]
            .prop_map(Shape::Number)
            .boxed(),
    ];
    if with_slots {
        leaves.push((0..SLOTS).prop_map(Shape::Slot).boxed());
        leaves.push(
            (prop::option::of(prop_oneof![Just("m"), Just("s")]), unit_powers())
                .prop_map(|(unit, powers)| Shape::Measure(unit, powers))
                .boxed(),
        );
    }
    Union::new(leaves).prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            inner.clone().prop_map(|s| Shape::Array(Box::new(s))),
            prop::collection::vec(inner.clone(), 2..4).prop_map(Shape::Tuple),
            (prop::collection::vec(inner.clone(), 0..3), inner)
                .prop_map(|(params, result)| Shape::Function(params, Box::new(result))),
        ]
    })
    .boxed()
}

struct Slots {
    types: Vec<TypeExpr>,
    units: Vec<UnitExpr>,
}

fn unit_of(unit: Option<&str>, powers: &[(usize, i32)], units: &[UnitExpr]) -> UnitExpr {
    let declared = unit.map(UnitExpr::named).unwrap_or_else(UnitExpr::scalar);
    powers
        .iter()
        .fold(declared, |acc, (slot, e)| acc.multiply(&units[*slot].raised_to(*e)))
}

fn build(shape: &Shape, slots: &Slots) -> TypeExpr {
    match shape {
        Shape::Slot(i) => slots.types[*i].clone(),
        Shape::Number(unit) => TypeExpr::number(UnitExpr::named(*unit)),
        Shape::Measure(unit, powers) => TypeExpr::number(unit_of(*unit, powers, &slots.units)),
        Shape::Text => TypeExpr::Text,
        Shape::Boolean => TypeExpr::Boolean,
        Shape::Array(item) => TypeExpr::array(build(item, slots)),
        Shape::Tuple(items) => TypeExpr::Tuple(items.iter().map(|s| build(s, slots)).collect()),
        Shape::Function(params, result) => TypeExpr::function(
            params.iter().map(|s| build(s, slots)).collect(),
            build(result, slots),
        ),
    }
}

fn universe_with_slots() -> (Universe, Slots) {
    let mut universe = Universe::new();
    let mut types: Vec<TypeExpr> = (0..SLOTS - 1).map(|_| universe.fresh_type_var()).collect();
    let constrained = universe.fresh_type_var_with(CapabilitySet::require(EQUATABLE, "operator ="));
    types.push(TypeExpr::Var(constrained));
    let units = (0..UNIT_SLOTS)
        .map(|_| UnitExpr::var(universe.fresh_unit_var()))
        .collect();
    (universe, Slots { types, units })
}

fn jelly_text() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        Just("TEXT".to_string()),
        Just("BOOLEAN".to_string()),
        Just("DATETIMEZONED".to_string()),
        Just("NUMBER".to_string()),
        Just("NUMBER{m/s^2}".to_string()),
        Just("NUMBER{kg/@UNITVAR u^2}".to_string()),
        Just("@TYPEVAR t".to_string()),
        Just("TAGGED \"Optional\" (TEXT)".to_string()),
    ];
    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            inner.clone().prop_map(|s| format!("[{}]", s)),
            prop::collection::vec(inner.clone(), 2..4).prop_map(|items| format!("({})", items.join(", "))),
            (prop::collection::vec(inner.clone(), 0..3), inner.clone())
                .prop_map(|(params, result)| format!("(({}) -> {})", params.join(", "), result)),
            prop::collection::vec(inner, 0..3).prop_map(|fields| {
                let fields: Vec<String> = fields
                    .iter()
                    .enumerate()
                    .map(|(i, ty)| format!("field{}: {}", i, ty))
                    .collect();
                format!("RECORD{{{}}}", fields.join(", "))
            }),
        ]
    })
}

proptest! {
    #[test]
    fn occurs_check_rejects_self_reference(inner in shape(true)) {
        let (mut universe, slots) = universe_with_slots();
        let var = slots.types[0].clone();
        let containing = TypeExpr::array(TypeExpr::Tuple(vec![build(&inner, &slots), var.clone()]));

        let err = Unifier::new(&mut universe).unify(&var, &containing).unwrap_err();
        let is_cyclic = matches!(err.kind, ErrorKind::CyclicType { .. });
        prop_assert!(is_cyclic, "unexpected error: {}", err);
    }

    #[test]
    fn unification_outcome_is_symmetric(a in shape(true), b in shape(true)) {
        let (mut left, left_slots) = universe_with_slots();
        let forward = Unifier::new(&mut left)
            .unify(&build(&a, &left_slots), &build(&b, &left_slots))
            .is_ok();

        let (mut right, right_slots) = universe_with_slots();
        let backward = Unifier::new(&mut right)
            .unify(&build(&b, &right_slots), &build(&a, &right_slots))
            .is_ok();

        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn successful_unification_makes_both_sides_equal(a in shape(true), b in shape(true)) {
        let (mut universe, slots) = universe_with_slots();
        let (a, b) = (build(&a, &slots), build(&b, &slots));
        if Unifier::new(&mut universe).unify(&a, &b).is_ok() {
            prop_assert_eq!(universe.resolve(&a), universe.resolve(&b));
        }
    }

    #[test]
    fn unit_solving_is_symmetric_and_sound(
        left in (prop::option::of(prop_oneof![Just("m"), Just("s")]), unit_powers()),
        right in (prop::option::of(prop_oneof![Just("m"), Just("kg")]), unit_powers()),
    ) {
        let (mut forward_universe, forward_slots) = universe_with_slots();
        let a = unit_of(left.0, &left.1, &forward_slots.units);
        let b = unit_of(right.0, &right.1, &forward_slots.units);
        let forward = Unifier::new(&mut forward_universe).unify_units(&a, &b).is_ok();
        if forward {
            prop_assert_eq!(forward_universe.prune_unit(&a), forward_universe.prune_unit(&b));
        }

        let (mut backward_universe, backward_slots) = universe_with_slots();
        let a = unit_of(left.0, &left.1, &backward_slots.units);
        let b = unit_of(right.0, &right.1, &backward_slots.units);
        let backward = Unifier::new(&mut backward_universe).unify_units(&b, &a).is_ok();
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn ground_types_concretize_to_themselves(ground in shape(false)) {
        let snapshot = TypeContext::with_builtins().snapshot();
        let universe = Universe::new();
        let slots = Slots { types: Vec::new(), units: Vec::new() };
        let ty = build(&ground, &slots);
        let concrete = Concretizer::new(&universe, snapshot.as_ref(), false)
            .concretize(&ty)
            .unwrap();
        prop_assert_eq!(concrete.to_type_expr(), Some(ty));
    }

    #[test]
    fn jelly_text_round_trips(text in jelly_text()) {
        let parsed = parse_jelly(&text).unwrap();
        prop_assert_eq!(parsed.save(), text);
        let reparsed: JellyType = parse_jelly(&parsed.save()).unwrap();
        prop_assert_eq!(reparsed, parsed);
    }

    #[test]
    fn canonicalization_is_idempotent(
        exponents in prop::collection::vec((prop_oneof![Just("km"), Just("h"), Just("g"), Just("min"), Just("s")], -3i32..=3), 0..4)
    ) {
        let snapshot = TypeContext::with_builtins().snapshot();
        let unit = exponents
            .iter()
            .fold(Unit::scalar(), |acc, (name, e)| acc.multiply(&Unit::named(*name).raised_to(*e)));

        let once = canonicalize(&unit, snapshot.as_ref()).unwrap();
        let twice = canonicalize(&once.unit, snapshot.as_ref()).unwrap();
        prop_assert_eq!(&twice.unit, &once.unit);
        prop_assert!(num_traits::One::is_one(&twice.scale));
    }
}

#[test]
fn slot_variables_are_sequential() {
    let (universe, slots) = universe_with_slots();
    assert_eq!(universe.type_var_count(), SLOTS);
    assert_eq!(universe.unit_var_count(), UNIT_SLOTS);
    assert_eq!(slots.types[2].to_string(), "_t2");
    let TypeExpr::Var(constrained) = &slots.types[2] else {
        panic!("slots are variables");
    };
    assert!(universe.capabilities(*constrained).unwrap().contains(EQUATABLE));
}

#[test]
fn constrained_slots_reject_functions_in_either_order() {
    for flip in [false, true] {
        let (mut universe, slots) = universe_with_slots();
        let pair = [
            TypeExpr::Tuple(vec![slots.types[2].clone(), slots.types[0].clone()]),
            TypeExpr::Tuple(vec![
                slots.types[0].clone(),
                TypeExpr::function(vec![], TypeExpr::Text),
            ]),
        ];
        let (a, b) = if flip { (&pair[1], &pair[0]) } else { (&pair[0], &pair[1]) };
        let err = Unifier::new(&mut universe).unify(a, b).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MissingCapability { .. }), "{}", err);
    }
}
