mod common;

use common::{World, raised, speak};
use pic_core::{DynamicMethod, ErrorClass, Value};
use pic_runtime::{Arity, DispatchConfig, GuardPolicy, Tier};

fn redefinition_is_seen_on_next_call(policy: GuardPolicy) {
    let w = World::with_config(DispatchConfig {
        guard_policy: policy,
        ..DispatchConfig::default()
    });
    let dog = w.speaker("Dog", 1);
    let rex = w.obj(&dog);
    let site = w.site("speak", Arity::One);
    for _ in 0..3 {
        assert_eq!(w.call_int(&site, &rex, &[Value::Int(0)]), 100);
    }

    w.reg.define_method(&dog, speak(2));
    assert_eq!(w.call_int(&site, &rex, &[Value::Int(0)]), 200);
    assert_eq!(site.tier(), Tier::Monomorphic);
    assert_eq!(site.rebind_count(), 1);
    assert_eq!(site.stats().misses(), 2);
}

#[test]
fn redefinition_under_generation_guards() {
    redefinition_is_seen_on_next_call(GuardPolicy::Generation);
}

#[test]
fn redefinition_under_switch_point_guards() {
    redefinition_is_seen_on_next_call(GuardPolicy::SwitchPoint);
}

#[test]
fn ancestor_redefinition_reaches_subclass_links() {
    let w = World::new();
    let animal = w.speaker("Animal", 1);
    let dog = w.subclass("Dog", &animal);
    let rex = w.obj(&dog);
    let site = w.site("speak", Arity::One);
    assert_eq!(w.call_int(&site, &rex, &[Value::Int(3)]), 103);

    w.reg.define_method(&animal, speak(4));
    assert_eq!(w.call_int(&site, &rex, &[Value::Int(3)]), 403);
}

#[test]
fn subclass_override_shadows_linked_inherited_method() {
    let w = World::new();
    let animal = w.speaker("Animal", 1);
    let dog = w.subclass("Dog", &animal);
    let rex = w.obj(&dog);
    let site = w.site("speak", Arity::One);
    assert_eq!(w.call_int(&site, &rex, &[Value::Int(0)]), 100);

    w.reg.define_method(&dog, speak(5));
    assert_eq!(w.call_int(&site, &rex, &[Value::Int(0)]), 500);
    assert_eq!(site.tier(), Tier::Monomorphic);
}

#[test]
fn including_a_module_relinks() {
    let w = World::new();
    let animal = w.speaker("Animal", 1);
    let dog = w.subclass("Dog", &animal);
    let rex = w.obj(&dog);
    let site = w.site("speak", Arity::One);
    assert_eq!(w.call_int(&site, &rex, &[Value::Int(0)]), 100);

    let loud = w.reg.define_module("Loud").unwrap();
    w.reg.define_method(&loud, speak(6));
    w.reg.include_module(&dog, &loud).unwrap();
    assert_eq!(w.call_int(&site, &rex, &[Value::Int(0)]), 600);

    // Redefining inside the included module reaches includers.
    w.reg.define_method(&loud, speak(7));
    assert_eq!(w.call_int(&site, &rex, &[Value::Int(0)]), 700);
}

#[test]
fn singleton_method_only_affects_its_object() {
    let w = World::new();
    let dog = w.speaker("Dog", 1);
    let rex = w.obj(&dog);
    let fido = w.obj(&dog);
    let site = w.site("speak", Arity::One);
    assert_eq!(w.call_int(&site, &rex, &[Value::Int(0)]), 100);
    assert_eq!(w.call_int(&site, &fido, &[Value::Int(0)]), 100);

    let meta = w.reg.singleton_class(&rex).unwrap();
    w.reg.define_method(&meta, speak(9));

    assert_eq!(w.call_int(&site, &rex, &[Value::Int(0)]), 900);
    assert_eq!(w.call_int(&site, &fido, &[Value::Int(0)]), 100);
    assert_eq!(site.tier(), Tier::Polymorphic);
    assert_eq!(site.seen_shapes().len(), 2);
}

#[test]
fn undef_makes_linked_method_missing() {
    let w = World::new();
    let animal = w.speaker("Animal", 1);
    let dog = w.subclass("Dog", &animal);
    let rex = w.obj(&dog);
    let site = w.site("speak", Arity::One);
    assert_eq!(w.call_int(&site, &rex, &[Value::Int(0)]), 100);

    w.reg.undef_method(&dog, "speak").unwrap();
    let err = raised(w.call(&site, &rex, &[Value::Int(0)]));
    assert_eq!(err.class, ErrorClass::NoMethodError);
    assert_eq!(err.message, "undefined method `speak' for #<Dog>");
    assert_eq!(site.stats().method_missing(), 1);

    // The ancestor is untouched.
    let plain = w.obj(&animal);
    assert_eq!(w.call_int(&site, &plain, &[Value::Int(0)]), 100);
}

#[test]
fn remove_exposes_inherited_definition() {
    let w = World::new();
    let animal = w.speaker("Animal", 1);
    let dog = w.subclass("Dog", &animal);
    w.reg.define_method(&dog, speak(2));
    let rex = w.obj(&dog);
    let site = w.site("speak", Arity::One);
    assert_eq!(w.call_int(&site, &rex, &[Value::Int(0)]), 200);

    w.reg.remove_method(&dog, "speak").unwrap();
    assert_eq!(w.call_int(&site, &rex, &[Value::Int(0)]), 100);
}

#[test]
fn reopening_integer_relinks_immediate_sites() {
    let w = World::new();
    let int = w.reg.integer().clone();
    w.reg.define_method(
        &int,
        DynamicMethod::native0("double", |_, recv, _| {
            Ok(Value::Int(recv.as_int().unwrap_or(0) * 2))
        }),
    );
    let site = w.site("double", Arity::Zero);
    assert_eq!(w.call_int(&site, &Value::Int(21), &[]), 42);
    assert_eq!(w.call_int(&site, &Value::Int(5), &[]), 10);
    assert_eq!(site.stats().misses(), 1);

    w.reg.define_method(
        &int,
        DynamicMethod::native0("double", |_, recv, _| {
            Ok(Value::Int(recv.as_int().unwrap_or(0) * 3))
        }),
    );
    assert_eq!(w.call_int(&site, &Value::Int(21), &[]), 63);
}

#[test]
fn object_mutation_fires_the_builtin_signal() {
    let w = World::new();
    w.reg.define_method(
        w.reg.object(),
        DynamicMethod::native0("tag", |_, _, _| Ok(Value::sym("object"))),
    );
    let site = w.site("tag", Arity::Zero);
    assert_eq!(w.call(&site, &Value::Int(1), &[]).unwrap(), Value::sym("object"));

    w.reg.define_method(
        w.reg.kernel(),
        DynamicMethod::native0("unrelated", |_, _, _| Ok(Value::Nil)),
    );
    let misses = site.stats().misses();
    assert_eq!(w.call(&site, &Value::Int(1), &[]).unwrap(), Value::sym("object"));
    assert_eq!(site.stats().misses(), misses + 1);

    w.reg.define_method(
        w.reg.integer(),
        DynamicMethod::native0("tag", |_, _, _| Ok(Value::sym("integer"))),
    );
    assert_eq!(w.call(&site, &Value::Int(1), &[]).unwrap(), Value::sym("integer"));
}

#[test]
fn unrelated_mutation_leaves_links_alone() {
    let w = World::new();
    let dog = w.speaker("Dog", 1);
    let cat = w.speaker("Cat", 2);
    let rex = w.obj(&dog);
    let site = w.site("speak", Arity::One);
    w.call(&site, &rex, &[Value::Int(0)]).unwrap();

    w.reg.define_method(&cat, speak(3));
    w.reg.define_method(
        w.reg.integer(),
        DynamicMethod::native0("speak", |_, _, _| Ok(Value::Nil)),
    );
    assert_eq!(w.call_int(&site, &rex, &[Value::Int(0)]), 100);
    assert_eq!(site.stats().misses(), 1);
    assert_eq!(site.rebind_count(), 0);
}

#[test]
fn visibility_change_is_an_invalidation() {
    let w = World::new();
    let dog = w.speaker("Dog", 1);
    let rex = w.obj(&dog);
    let site = w.site("speak", Arity::One);
    assert_eq!(w.call_int(&site, &rex, &[Value::Int(0)]), 100);

    w.reg
        .set_visibility(&dog, "speak", pic_core::Visibility::Private)
        .unwrap();
    let err = raised(w.call(&site, &rex, &[Value::Int(0)]));
    assert_eq!(err.message, "private method `speak' called for #<Dog>");
}

#[test]
fn unrelated_object_method_keeps_polymorphic_sites() {
    let w = World::new();
    let dog = w.speaker("Dog", 1);
    let cat = w.speaker("Cat", 2);
    let (rex, tom) = (w.obj(&dog), w.obj(&cat));
    let site = w.site("speak", Arity::One);
    w.call(&site, &rex, &[Value::Int(0)]).unwrap();
    w.call(&site, &tom, &[Value::Int(0)]).unwrap();
    assert_eq!(site.tier(), Tier::Polymorphic);

    w.reg.define_method(
        w.reg.object(),
        DynamicMethod::native0("unrelated", |_, _, _| Ok(Value::Nil)),
    );
    assert_eq!(w.call_int(&site, &rex, &[Value::Int(1)]), 101);
    assert_eq!(w.call_int(&site, &tom, &[Value::Int(1)]), 201);
    assert_eq!(site.tier(), Tier::Polymorphic);
    assert_eq!(site.stats().fail_transitions(), 0);
    assert_eq!(site.seen_shapes().len(), 2);
    assert_eq!(site.rebind_count(), 2);

    // Refreshed links hit again without resolving.
    let misses = site.stats().misses();
    assert_eq!(w.call_int(&site, &rex, &[Value::Int(2)]), 102);
    assert_eq!(w.call_int(&site, &tom, &[Value::Int(2)]), 202);
    assert_eq!(site.stats().misses(), misses);

    // A real change to a chained class still degrades.
    w.reg.define_method(&cat, speak(3));
    assert_eq!(w.call_int(&site, &tom, &[Value::Int(0)]), 300);
    assert_eq!(site.tier(), Tier::Megamorphic);
}

#[test]
fn refreshes_draw_on_the_rebind_budget() {
    let w = World::with_config(DispatchConfig {
        max_rebind_count: 1,
        ..DispatchConfig::default()
    });
    let dog = w.speaker("Dog", 1);
    let rex = w.obj(&dog);
    let site = w.site("speak", Arity::One);
    w.call(&site, &rex, &[Value::Int(0)]).unwrap();

    for round in 0..2 {
        w.reg.define_method(
            w.reg.kernel(),
            DynamicMethod::native0(&format!("noise{round}"), |_, _, _| Ok(Value::Nil)),
        );
        assert_eq!(w.call_int(&site, &rex, &[Value::Int(0)]), 100);
    }
    assert_eq!(site.rebind_count(), 1);
    assert_eq!(site.tier(), Tier::Megamorphic);
}
