use pic_core::{ThreadContext, Value};
use pic_runtime::{Arity, CallSite, CallType, DispatchConfig, SiteDescriptor, Tier};

use crate::args::ScenarioName;
use crate::commands::{Harness, expected, speak};

type Scenario = fn(&mut Harness, &ThreadContext) -> Result<(), String>;

/// Runs the selected scenarios, each against a fresh object model. Returns
/// whether every check passed.
pub(crate) fn run(
    name: ScenarioName,
    config: DispatchConfig,
    report: bool,
) -> Result<bool, String> {
    let scenarios: [(ScenarioName, &str, Scenario); 3] = [
        (ScenarioName::DogCat, "dog-cat", dog_cat),
        (ScenarioName::Megamorphic, "megamorphic", megamorphic),
        (ScenarioName::Redefine, "redefine", redefine),
    ];
    let selected = scenarios
        .into_iter()
        .filter(|(which, _, _)| name == ScenarioName::All || name == *which);

    let mut all_ok = true;
    for (_, label, scenario) in selected {
        let mut h = Harness::new(config);
        let ctx = ThreadContext::new();
        scenario(&mut h, &ctx)?;
        if h.failures().is_empty() {
            println!("{label}: ok");
        } else {
            all_ok = false;
            println!("{label}: FAILED");
            for failure in h.failures() {
                eprintln!("  {failure}");
            }
        }
        if report {
            h.print_report();
        }
    }
    Ok(all_ok)
}

fn speak_at(site: &CallSite, ctx: &ThreadContext, recv: &Value, arg: i64) -> Result<i64, String> {
    match site.invoke(ctx, &Value::Nil, recv, &[Value::Int(arg)], None) {
        Ok(Value::Int(i)) => Ok(i),
        Ok(other) => Err(format!("unexpected result {other:?}")),
        Err(e) => Err(e.to_string()),
    }
}

fn speak_site(h: &Harness, file: &str) -> std::sync::Arc<CallSite> {
    h.engine
        .call_site(SiteDescriptor::new("speak", Arity::One, CallType::Normal).at(file, 1))
}

/// Ten Dog calls, then a Cat: monomorphic, then a two-entry chain that
/// answers both without resolving again.
fn dog_cat(h: &mut Harness, ctx: &ThreadContext) -> Result<(), String> {
    let dog = h.speaker("Dog", 1)?;
    let cat = h.speaker("Cat", 2)?;
    let rex = h.instance(&dog)?;
    let tom = h.instance(&cat)?;
    let site = speak_site(h, "dog_cat.rb");

    for i in 0..10 {
        let got = speak_at(&site, ctx, &rex, i);
        h.check(got == Ok(expected(1, i)), || format!("Dog#speak({i}) = {got:?}"));
    }
    let tier = site.tier();
    h.check(tier == Tier::Monomorphic, || format!("after Dog calls: {tier:?}"));

    let got = speak_at(&site, ctx, &tom, 0);
    h.check(got == Ok(expected(2, 0)), || format!("Cat#speak(0) = {got:?}"));
    let tier = site.tier();
    h.check(tier == Tier::Polymorphic, || format!("after Cat call: {tier:?}"));
    let seen = site.seen_shapes();
    h.check(
        seen.len() == 2 && seen.contains(&dog.id()) && seen.contains(&cat.id()),
        || format!("seen shapes {seen:?}"),
    );

    let misses = site.stats().misses();
    for i in 0..5 {
        let got = speak_at(&site, ctx, &rex, i);
        h.check(got == Ok(expected(1, i)), || format!("Dog#speak({i}) = {got:?}"));
        let got = speak_at(&site, ctx, &tom, i);
        h.check(got == Ok(expected(2, i)), || format!("Cat#speak({i}) = {got:?}"));
    }
    let after = site.stats().misses();
    h.check(after == misses, || format!("chain missed {} times", after - misses));
    Ok(())
}

/// Twelve classes through one site: the chain stops growing at the
/// configured degree and the fail tier answers everything after.
fn megamorphic(h: &mut Harness, ctx: &ThreadContext) -> Result<(), String> {
    let degree = h.engine.config().max_polymorphic_degree;
    let mut receivers = Vec::new();
    for (i, name) in ["Dog", "Cat"].into_iter().enumerate() {
        let class = h.speaker(name, i as i64 + 1)?;
        receivers.push((i as i64 + 1, h.instance(&class)?));
    }
    for i in 0..10 {
        let value = i + 3;
        let class = h.speaker(&format!("Animal{i}"), value)?;
        receivers.push((value, h.instance(&class)?));
    }
    let site = speak_site(h, "megamorphic.rb");

    for (n, (value, recv)) in receivers.iter().enumerate() {
        let got = speak_at(&site, ctx, recv, 7);
        h.check(got == Ok(expected(*value, 7)), || format!("receiver {n}: {got:?}"));
        let tier = site.tier();
        let want_fail = n + 1 > degree;
        h.check((tier == Tier::Megamorphic) == want_fail, || {
            format!("after {} distinct classes: {tier:?} (degree {degree})", n + 1)
        });
    }
    for (value, recv) in &receivers {
        let got = speak_at(&site, ctx, recv, 1);
        h.check(got == Ok(expected(*value, 1)), || format!("revisit {value}: {got:?}"));
    }
    let seen = site.seen_shapes().len();
    h.check(seen <= degree, || format!("{seen} shapes chained, degree {degree}"));
    Ok(())
}

/// Redefining a method behind a monomorphic site is seen on the next call.
fn redefine(h: &mut Harness, ctx: &ThreadContext) -> Result<(), String> {
    let dog = h.speaker("Dog", 1)?;
    let rex = h.instance(&dog)?;
    let site = speak_site(h, "redefine.rb");

    for _ in 0..3 {
        let got = speak_at(&site, ctx, &rex, 0);
        h.check(got == Ok(expected(1, 0)), || format!("before: {got:?}"));
    }
    h.reg.define_method(&dog, speak(5));
    let got = speak_at(&site, ctx, &rex, 0);
    h.check(got == Ok(expected(5, 0)), || format!("after redefinition: {got:?}"));
    let tier = site.tier();
    h.check(tier != Tier::Unlinked, || format!("site left {tier:?}"));
    Ok(())
}
