use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use pic_core::{ThreadContext, Value};
use pic_runtime::{Arity, CallType, DispatchConfig, SiteDescriptor};

use crate::commands::{Harness, expected, speak};

pub(crate) struct StressOptions {
    pub threads: usize,
    pub classes: usize,
    pub calls: usize,
    pub redefine: bool,
    pub report: bool,
}

/// Every worker walks the receivers round-robin through one shared site and
/// checks each result. With `redefine`, class 0 gets a new `speak` version
/// while they run, so its results may be any version up to the latest.
pub(crate) fn run(opts: &StressOptions, config: DispatchConfig) -> Result<bool, String> {
    if opts.threads == 0 || opts.classes == 0 {
        return Err("--threads and --classes must be at least 1".to_string());
    }
    let h = Harness::new(config);
    let mut receivers = Vec::with_capacity(opts.classes);
    let mut classes = Vec::with_capacity(opts.classes);
    for i in 0..opts.classes {
        let value = i as i64 + 1;
        let class = h.speaker(&format!("Worker{i}"), value)?;
        receivers.push((value, h.instance(&class)?));
        classes.push(class);
    }
    let site = h
        .engine
        .call_site(SiteDescriptor::new("speak", Arity::One, CallType::Normal).at("stress.rb", 1));

    let latest = AtomicU64::new(1);
    let done = AtomicUsize::new(0);
    let mismatches = AtomicU64::new(0);
    let started = Instant::now();

    thread::scope(|s| {
        for t in 0..opts.threads {
            let (site, receivers, latest, done, mismatches) =
                (&site, &receivers, &latest, &done, &mismatches);
            s.spawn(move || {
                let ctx = ThreadContext::new();
                for n in 0..opts.calls {
                    let idx = (t + n) % receivers.len();
                    let (value, recv) = &receivers[idx];
                    let arg = (n % 7) as i64;
                    let got = site.invoke(&ctx, &Value::Nil, recv, &[Value::Int(arg)], None);
                    let ok = match got {
                        Ok(Value::Int(i)) if idx == 0 && opts.redefine => {
                            let version = (i - arg) / 100;
                            (i - arg) % 100 == 0
                                && version >= 1
                                && version <= latest.load(Ordering::Acquire) as i64
                        }
                        Ok(Value::Int(i)) => i == expected(*value, arg),
                        _ => false,
                    };
                    if !ok {
                        mismatches.fetch_add(1, Ordering::Relaxed);
                    }
                }
                done.fetch_add(1, Ordering::AcqRel);
            });
        }
        if opts.redefine {
            let (h, classes, latest, done) = (&h, &classes, &latest, &done);
            s.spawn(move || {
                while done.load(Ordering::Acquire) < opts.threads {
                    let version = latest.load(Ordering::Acquire) as i64 + 1;
                    // Publish the bound before the definition becomes visible.
                    latest.store(version as u64, Ordering::Release);
                    h.reg.define_method(&classes[0], speak(version));
                    thread::yield_now();
                }
            });
        }
    });

    let elapsed = started.elapsed();
    let total = opts.threads * opts.calls;
    let bad = mismatches.load(Ordering::Relaxed);
    println!(
        "stress: {} threads x {} calls over {} classes in {:.3}ms, {} redefinitions, {} mismatches",
        opts.threads,
        opts.calls,
        opts.classes,
        elapsed.as_secs_f64() * 1000.0,
        latest.load(Ordering::Relaxed) - 1,
        bad
    );
    println!("tier: {:?}, {} calls", site.tier(), total);
    if opts.report {
        h.print_report();
    }
    Ok(bad == 0)
}
