//! Integration tests for the loop lifts.

mod common;

use std::collections::BTreeSet;

use approx::assert_relative_eq;
use common::{init_test_logging, root_scope, scalar};
use scopelift::lift::{InOut, ScanOptions, remat_scan, scan};
use scopelift::{Array, Collection, Filter, LiftError, Result, Scope, Tensor, Value, Variables, dict};

fn post_increment(_: &Scope, c: Value, _: Vec<Value>) -> Result<(Value, Value)> {
    let n = c.to_f64()?;
    Ok((Value::scalar(n + 1.0), Value::scalar(n)))
}

#[test]
fn test_carry_threads_through_five_steps() {
    init_test_logging();
    let scope = root_scope(&[]);
    let looped = scan(post_increment, ScanOptions::new().length(5));
    let (c, ys) = looped(&scope, Value::scalar(0.0), Vec::new()).unwrap();
    assert_eq!(c, Value::scalar(5.0));
    assert_eq!(ys.as_array().unwrap().data(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_reverse_visits_last_step_first() {
    init_test_logging();
    let scope = root_scope(&[]);
    let looped = scan(
        |_: &Scope, c: Value, xs: Vec<Value>| -> Result<(Value, Value)> {
            let c = c.to_f64()? * 10.0 + xs[0].to_f64()?;
            Ok((Value::scalar(c), Value::scalar(c)))
        },
        ScanOptions::new().reverse(true),
    );
    let (c, ys) = looped(&scope, Value::scalar(0.0), vec![Tensor::arange(3).into()]).unwrap();
    assert_eq!(c, Value::scalar(210.0));
    // outputs stay at the index of the step that produced them
    assert_eq!(ys.as_array().unwrap().data(), &[210.0, 21.0, 2.0]);
}

#[test]
fn test_carried_collection_updates_outer_scope() {
    init_test_logging();
    let scope = root_scope(&[("counter", &[("n", 0.0)])]);
    let looped = scan(
        |scope: &Scope, c: Value, _: Vec<Value>| -> Result<(Value, Value)> {
            let n = scope.get_variable("counter", "n").map_or(Ok(0.0), |v| v.to_f64())?;
            scope.put_variable("counter", "n", Value::scalar(n + 1.0))?;
            Ok((c, Value::scalar(n)))
        },
        ScanOptions::new().variable_carry("counter").length(5),
    );
    let (_, ys) = looped(&scope, Value::unit(), Vec::new()).unwrap();
    assert_eq!(ys.as_array().unwrap().data(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
    assert_eq!(scalar(&scope, "counter", "n"), Some(5.0));
}

#[test]
fn test_scanned_params_sliced_per_step() {
    init_test_logging();
    let scope = root_scope(&[]);
    scope
        .put_variable("params", "w", Array::from_vec(vec![1.0, 2.0, 3.0], &[3]).unwrap().into())
        .unwrap();
    let looped = scan(
        |scope: &Scope, c: Value, xs: Vec<Value>| -> Result<(Value, Value)> {
            let w = scope.param("w", |_| Value::scalar(0.0))?.to_f64()?;
            let y = w * xs[0].to_f64()?;
            Ok((Value::scalar(c.to_f64()? + y), Value::scalar(y)))
        },
        ScanOptions::new().variable_axis("params", 0),
    );
    let (c, ys) = looped(&scope, Value::scalar(0.0), vec![Array::full(&[3], 2.0).into()]).unwrap();
    assert_eq!(ys.as_array().unwrap().data(), &[2.0, 4.0, 6.0]);
    assert_relative_eq!(c.to_f64().unwrap(), 12.0);
}

#[test]
fn test_broadcast_params_identical_at_every_step() {
    init_test_logging();
    let scope = root_scope(&[]);
    let looped = scan(
        |scope: &Scope, c: Value, _: Vec<Value>| -> Result<(Value, Value)> {
            let w = scope.param("w", |key| Tensor::uniform(key, &[]).into())?;
            Ok((c, w))
        },
        ScanOptions::new()
            .variable_broadcast("params")
            .split_rng("params", false)
            .length(4),
    );
    let (_, ys) = looped(&scope, Value::unit(), Vec::new()).unwrap();
    let w = scalar(&scope, "params", "w").unwrap();
    for &y in ys.as_array().unwrap().data() {
        assert_relative_eq!(y, w);
    }
}

#[test]
fn test_output_only_collection_stacked_per_step() {
    init_test_logging();
    let scope = root_scope(&[]);
    let looped = scan(
        |scope: &Scope, c: Value, xs: Vec<Value>| -> Result<(Value, Value)> {
            let x = xs[0].to_f64()?;
            scope.put_variable("intermediates", "x2", Value::scalar(x * 2.0))?;
            Ok((c, Value::unit()))
        },
        ScanOptions::new().variable_axis("intermediates", InOut::Out(0)),
    );
    looped(&scope, Value::unit(), vec![Tensor::arange(4).into()]).unwrap();
    let x2 = scope.get_variable("intermediates", "x2").unwrap();
    assert_eq!(x2.as_array().unwrap().data(), &[0.0, 2.0, 4.0, 6.0]);
}

#[test]
fn test_split_rngs_give_each_step_its_own_key() {
    init_test_logging();
    let scope = root_scope(&[]);
    let looped = scan(
        |scope: &Scope, c: Value, _: Vec<Value>| -> Result<(Value, Value)> {
            Ok((c, Tensor::uniform(scope.make_rng("dropout")?, &[]).into()))
        },
        ScanOptions::new().split_rng("dropout", true).length(3),
    );
    let (_, ys) = looped(&scope, Value::unit(), Vec::new()).unwrap();
    let distinct: BTreeSet<u64> = ys.as_array().unwrap().data().iter().map(|y| y.to_bits()).collect();
    assert_eq!(distinct.len(), 3);
}

#[test]
fn test_inconsistent_lengths_rejected() {
    init_test_logging();
    let scope = root_scope(&[]);
    let looped = scan(post_increment, ScanOptions::new());
    let err = looped(
        &scope,
        Value::scalar(0.0),
        vec![Tensor::zeros(&[3]).into(), Tensor::zeros(&[4]).into()],
    )
    .unwrap_err();
    assert_eq!(
        err,
        LiftError::InconsistentScanLengths {
            lengths: BTreeSet::from([3, 4])
        }
    );
}

#[test]
fn test_missing_length_rejected() {
    init_test_logging();
    let scope = root_scope(&[]);
    let looped = scan(post_increment, ScanOptions::new());
    let err = looped(&scope, Value::scalar(0.0), Vec::new()).unwrap_err();
    assert_eq!(err, LiftError::LengthUnspecified);
}

#[test]
fn test_remat_scan_runs_product_of_lengths() {
    init_test_logging();
    let scope = root_scope(&[("counter", &[("n", 0.0)])]);
    let body = |scope: &Scope, c: Value| -> Result<Value> {
        let n = scalar(scope, "counter", "n").unwrap_or(0.0);
        scope.put_variable("counter", "n", Value::scalar(n + 1.0))?;
        Ok(Value::scalar(c.to_f64()? + 1.0))
    };
    let options = ScanOptions::new().variable_carry("counter");
    let c = remat_scan(&body, &scope, Value::scalar(0.0), &[2, 2, 3], &options).unwrap();
    assert_eq!(c, Value::scalar(12.0));
    assert_eq!(scalar(&scope, "counter", "n"), Some(12.0));
}

#[test]
fn test_read_only_broadcast_collection_passes_through() {
    init_test_logging();
    let vars = Variables::from([(
        "params".to_string(),
        Collection::Mutable(dict([("w", Value::scalar(2.0))])),
    )]);
    let scope = Scope::new(vars, Default::default(), Filter::Nothing);
    let looped = scan(
        |scope: &Scope, c: Value, _: Vec<Value>| -> Result<(Value, Value)> {
            let w = scope.param("w", |_| Value::scalar(0.0))?.to_f64()?;
            Ok((Value::scalar(c.to_f64()? + w), Value::unit()))
        },
        ScanOptions::new().variable_broadcast("params").length(3),
    );
    let (c, _) = looped(&scope, Value::scalar(0.0), Vec::new()).unwrap();
    assert_relative_eq!(c.to_f64().unwrap(), 6.0);
    assert_eq!(scalar(&scope, "params", "w"), Some(2.0));
    assert!(scope.variables()["params"].is_frozen());
}
