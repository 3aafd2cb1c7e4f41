mod common;

use std::sync::Arc;

use common::{World, raised};
use pic_core::{ArityRange, ClassRef, DynamicMethod, ErrorClass, Value};
use pic_runtime::{
    Arity, CallShape, CallType, DispatchConfig, IndirectReason, SiteDescriptor, StrategyBuilder,
    Tier,
};

fn int_args(args: &[Value]) -> i64 {
    args.iter().filter_map(Value::as_int).sum()
}

fn calculator(w: &World) -> ClassRef {
    let calc = w.class("Calc");
    let methods = [
        DynamicMethod::native0("zero", |_, _, _| Ok(Value::Int(0))),
        DynamicMethod::native1("one", |_, _, a, _| Ok(a.clone())),
        DynamicMethod::native2("two", |_, _, a, b, _| {
            Ok(Value::Int(int_args(&[a.clone(), b.clone()])))
        }),
        DynamicMethod::native3("three", |_, _, a, b, c, _| {
            Ok(Value::Int(int_args(&[a.clone(), b.clone(), c.clone()])))
        }),
        DynamicMethod::native_varargs("sum", ArityRange::rest(0), |_, _, args, _| {
            Ok(Value::Int(int_args(args)))
        }),
        DynamicMethod::native_varargs("pair", ArityRange::optional(1, 1), |_, _, args, _| {
            Ok(Value::Int(args.len() as i64))
        }),
        DynamicMethod::generic("tenfold", ArityRange::fixed(1), |_, _, args, _| {
            Ok(Value::Int(int_args(args) * 10))
        }),
        DynamicMethod::native0("depth", |ctx, _, _| Ok(Value::Int(ctx.depth() as i64)))
            .needing_frame(),
        DynamicMethod::attr_reader("label"),
        DynamicMethod::attr_writer("label"),
    ];
    for method in methods {
        w.reg.define_method(&calc, method);
    }
    calc
}

/// (name, site arity, args, expected direct binding with direct dispatch on)
fn cases() -> Vec<(&'static str, Arity, Vec<Value>, bool)> {
    let ints = |v: &[i64]| v.iter().copied().map(Value::Int).collect::<Vec<_>>();
    vec![
        ("zero", Arity::Zero, vec![], true),
        ("one", Arity::One, ints(&[4]), true),
        ("two", Arity::Two, ints(&[4, 5]), true),
        ("three", Arity::Three, ints(&[1, 2, 3]), true),
        ("sum", Arity::Many, ints(&[1, 2, 3, 4, 5]), true),
        ("sum", Arity::Two, ints(&[1, 2]), true),
        ("one", Arity::Many, ints(&[9]), false),
        ("tenfold", Arity::One, ints(&[3]), false),
        ("depth", Arity::Zero, vec![], false),
        ("label=", Arity::One, vec![Value::str("calc")], true),
        ("label", Arity::Zero, vec![], true),
    ]
}

fn run_cases(config: DispatchConfig) -> Vec<(pic_core::CallResult, u64, u64)> {
    let w = World::with_config(config);
    let obj = w.obj(&calculator(&w));
    cases()
        .into_iter()
        .map(|(name, arity, args, _)| {
            let site = w.site(name, arity);
            let first = w.call(&site, &obj, &args);
            let second = w.call(&site, &obj, &args);
            assert_eq!(format!("{first:?}"), format!("{second:?}"), "{name}");
            (first, site.stats().direct_binds(), site.stats().indirect_binds())
        })
        .collect()
}

#[test]
fn direct_and_indirect_bindings_agree() {
    let direct = run_cases(DispatchConfig::default());
    let indirect = run_cases(DispatchConfig {
        enable_direct_dispatch: false,
        ..DispatchConfig::default()
    });

    for ((case, d), i) in cases().iter().zip(&direct).zip(&indirect) {
        let (name, _, _, expect_direct) = case;
        assert_eq!(format!("{:?}", d.0), format!("{:?}", i.0), "{name}");
        assert_eq!(d.1 == 1, *expect_direct, "{name} direct binds");
        assert_eq!(i.1, 0, "{name}");
        assert_eq!(i.2, 1, "{name}");
    }
    assert_eq!(direct[0].0.as_ref().unwrap(), &Value::Int(0));
    assert_eq!(direct[3].0.as_ref().unwrap(), &Value::Int(6));
    assert_eq!(direct[4].0.as_ref().unwrap(), &Value::Int(15));
    assert_eq!(direct[7].0.as_ref().unwrap(), &Value::Int(30));
    // The framed method runs one frame below the caller.
    assert_eq!(direct[8].0.as_ref().unwrap(), &Value::Int(2));
    assert_eq!(direct[10].0.as_ref().unwrap(), &Value::str("calc"));
}

#[test]
fn arity_errors_are_identical_on_both_paths() {
    for enable_direct_dispatch in [true, false] {
        let w = World::with_config(DispatchConfig {
            enable_direct_dispatch,
            ..DispatchConfig::default()
        });
        let obj = w.obj(&calculator(&w));
        let many = |n: i64| (0..n).map(Value::Int).collect::<Vec<_>>();

        let pair = w.site("pair", Arity::Many);
        assert_eq!(w.call_int(&pair, &obj, &many(2)), 2);
        let err = raised(w.call(&pair, &obj, &many(3)));
        assert_eq!(err.class, ErrorClass::ArgumentError);
        assert_eq!(err.message, "wrong number of arguments (given 3, expected 1..2)");
        let err = raised(w.call(&pair, &obj, &[]));
        assert_eq!(err.message, "wrong number of arguments (given 0, expected 1..2)");

        let one = w.site("one", Arity::Many);
        let err = raised(w.call(&one, &obj, &many(2)));
        assert_eq!(err.message, "wrong number of arguments (given 2, expected 1)");
    }
}

#[test]
fn aliases_bind_to_the_original_body() {
    let w = World::new();
    let calc = calculator(&w);
    w.reg.alias_method(&calc, "plus", "two").unwrap();
    let obj = w.obj(&calc);
    let site = w.site("plus", Arity::Two);
    assert_eq!(w.call_int(&site, &obj, &[Value::Int(2), Value::Int(3)]), 5);
    assert_eq!(site.stats().direct_binds(), 1);
}

#[test]
fn without_indirect_binding_generic_methods_use_the_fail_tier() {
    let w = World::with_config(DispatchConfig {
        enable_indirect_binding: false,
        ..DispatchConfig::default()
    });
    let obj = w.obj(&calculator(&w));

    let generic = w.site("tenfold", Arity::One);
    assert_eq!(w.call_int(&generic, &obj, &[Value::Int(4)]), 40);
    assert_eq!(generic.tier(), Tier::Megamorphic);
    assert_eq!(w.call_int(&generic, &obj, &[Value::Int(5)]), 50);
    assert_eq!(generic.stats().fail_hits(), 1);

    let native = w.site("two", Arity::Two);
    assert_eq!(w.call_int(&native, &obj, &[Value::Int(1), Value::Int(1)]), 2);
    assert_eq!(native.tier(), Tier::Monomorphic);
}

#[test]
fn sites_count_indirect_binds_by_reason() {
    let w = World::new();
    let obj = w.obj(&calculator(&w));
    let arity = IndirectReason::ArityMismatch {
        site: Arity::Many,
        method: String::new(),
    };
    for (name, site_arity, args, reason) in [
        ("tenfold", Arity::One, vec![Value::Int(1)], IndirectReason::NoNativeEntry),
        ("depth", Arity::Zero, vec![], IndirectReason::NeedsFrame),
        ("one", Arity::Many, vec![Value::Int(1)], arity.clone()),
    ] {
        let site = w.site(name, site_arity);
        w.call(&site, &obj, &args).unwrap();
        let stats = site.stats();
        assert_eq!(stats.indirect_binds(), 1, "{name}");
        assert_eq!(stats.indirect_binds_for(&reason), 1, "{name}");
        assert_eq!(stats.indirect_binds_for(&IndirectReason::DirectDisabled), 0, "{name}");
    }

    let off = World::with_config(DispatchConfig {
        enable_direct_dispatch: false,
        ..DispatchConfig::default()
    });
    let calc = off.obj(&calculator(&off));
    let site = off.site("two", Arity::Two);
    off.call(&site, &calc, &[Value::Int(1), Value::Int(2)]).unwrap();
    assert_eq!(site.stats().indirect_binds_for(&IndirectReason::DirectDisabled), 1);
    assert_eq!(site.stats().indirect_binds_for(&arity), 0);
}

#[test]
fn builder_reports_why_it_went_indirect() {
    let builder = StrategyBuilder::new(DispatchConfig::default());
    let shape = |arity| CallShape::new(arity, CallType::Normal);
    let fixed2 = Arc::new(DynamicMethod::native2("two", |_, _, _, _, _| Ok(Value::Nil)));

    assert!(builder.direct(&shape(Arity::Two), &fixed2).is_ok());
    assert_eq!(
        builder.direct(&shape(Arity::One), &fixed2).err(),
        Some(IndirectReason::ArityMismatch {
            site: Arity::One,
            method: "2".to_string(),
        })
    );

    let generic = Arc::new(DynamicMethod::generic("g", ArityRange::rest(0), |_, _, _, _| {
        Ok(Value::Nil)
    }));
    assert_eq!(
        builder.direct(&shape(Arity::Zero), &generic).err(),
        Some(IndirectReason::NoNativeEntry)
    );

    let framed = Arc::new(
        DynamicMethod::native0("f", |_, _, _| Ok(Value::Nil)).needing_frame(),
    );
    assert_eq!(
        builder.direct(&shape(Arity::Zero), &framed).err(),
        Some(IndirectReason::NeedsFrame)
    );

    let disabled = StrategyBuilder::new(DispatchConfig {
        enable_direct_dispatch: false,
        ..DispatchConfig::default()
    });
    assert_eq!(
        disabled.direct(&shape(Arity::Two), &fixed2).err(),
        Some(IndirectReason::DirectDisabled)
    );
}

#[test]
fn functional_site_shape_is_reported() {
    let w = World::new();
    let site = w.site_with(
        SiteDescriptor::new("puts", Arity::Many, CallType::Functional)
            .with_block()
            .at("main.rb", 12),
    );
    assert!(site.shape().has_block);
    assert_eq!(site.call_type(), CallType::Functional);
    assert_eq!(site.id().line, 12);
    assert!(site.id().to_string().starts_with("main.rb:12#"));
}
