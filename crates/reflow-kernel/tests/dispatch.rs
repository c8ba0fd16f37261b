use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use reflow_kernel::{Action, HandlerRegistry, ReduceError, Value};
use serde_json::json;

fn counter_registry() -> Result<HandlerRegistry, reflow_kernel::BuildError> {
    HandlerRegistry::build(Value::Int(0), |b| {
        b.add_case("increment", |draft, _action| {
            let n = draft.as_int().unwrap_or(0);
            draft.set(n + 1);
            Ok(None)
        })?;
        b.add_matcher(
            |action| action.kind.starts_with('i'),
            |draft, _action| {
                let n = draft.as_int().unwrap_or(0);
                Ok(Some(Value::Int(n * 5)))
            },
        )?;
        b.add_matcher(
            |action| action.kind.ends_with('t'),
            |draft, _action| {
                let n = draft.as_int().unwrap_or(0);
                draft.set(n + 2);
                Ok(None)
            },
        )?;
        Ok(())
    })
}

#[test]
fn pipeline_runs_exact_case_then_matchers_in_registration_order() -> Result<()> {
    let registry = counter_registry()?;
    // 0 -> case(+1) -> M1(*5) -> M2(+2)
    let next = registry.reduce(None, &Action::new("increment"))?;
    assert_eq!(next.as_int(), Some(7));
    Ok(())
}

#[test]
fn all_matching_matchers_run_even_without_an_exact_case() -> Result<()> {
    let registry = counter_registry()?;
    // "idle" hits M1 only; "automat" hits M2 only; "input" hits both.
    assert_eq!(registry.reduce(Some(&Value::Int(3)), &Action::new("idle"))?.as_int(), Some(15));
    assert_eq!(registry.reduce(Some(&Value::Int(3)), &Action::new("automat"))?.as_int(), Some(5));
    assert_eq!(registry.reduce(Some(&Value::Int(3)), &Action::new("input"))?.as_int(), Some(17));
    Ok(())
}

#[test]
fn exact_case_runs_first_even_when_registered_after_matchers() -> Result<()> {
    let registry = HandlerRegistry::build(Value::Int(0), |b| {
        b.add_matcher(
            |action| action.kind == "step",
            |draft, _action| {
                let n = draft.as_int().unwrap_or(0);
                draft.set(n * 3);
                Ok(None)
            },
        )?;
        b.add_case("step", |draft, _action| {
            let n = draft.as_int().unwrap_or(0);
            draft.set(n + 1);
            Ok(None)
        })?;
        Ok(())
    })?;

    // Exact dispatch is resolved by discriminant lookup, not list
    // position: the case (+1) feeds the earlier-registered matcher (*3).
    assert_eq!(registry.reduce(None, &Action::new("step"))?.as_int(), Some(3));
    Ok(())
}

#[test]
fn no_match_returns_the_previous_state_by_identity() -> Result<()> {
    let registry = counter_registry()?;
    let state = Value::record([("untouched", Value::list([Value::Int(1)]))]);
    let next = registry.reduce(Some(&state), &Action::new("unrelated"))?;
    assert!(Value::ptr_eq(&state, &next));
    Ok(())
}

#[test]
fn first_call_without_previous_state_uses_the_initial_provider() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let registry = HandlerRegistry::build_with(
        move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Value::Int(100)
        },
        |b| {
            b.add_case("bump", |draft, _action| {
                let n = draft.as_int().unwrap_or(0);
                draft.set(n + 1);
                Ok(None)
            })?;
            Ok(())
        },
    )?;

    assert_eq!(registry.reduce(None, &Action::new("bump"))?.as_int(), Some(101));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A previous state suppresses the provider entirely.
    assert_eq!(
        registry.reduce(Some(&Value::Int(5)), &Action::new("bump"))?.as_int(),
        Some(6)
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn no_match_on_first_call_returns_the_initial_state() -> Result<()> {
    let registry = counter_registry()?;
    let next = registry.reduce(None, &Action::new("unrelated"))?;
    assert_eq!(next.as_int(), Some(0));
    Ok(())
}

#[test]
fn default_runs_only_when_nothing_else_did() -> Result<()> {
    let registry = HandlerRegistry::build(Value::Int(0), |b| {
        b.add_case("known", |draft, _action| {
            draft.set(1i64);
            Ok(None)
        })?;
        b.add_matcher(
            |action| action.kind.starts_with('k'),
            |draft, _action| {
                let n = draft.as_int().unwrap_or(0);
                draft.set(n + 10);
                Ok(None)
            },
        )?;
        b.add_default(|draft, _action| {
            draft.set(-1i64);
            Ok(None)
        })?;
        Ok(())
    })?;

    // Exact case suppresses the default.
    assert_eq!(registry.reduce(Some(&Value::Int(5)), &Action::new("known"))?.as_int(), Some(11));
    // A matcher alone also suppresses it.
    assert_eq!(registry.reduce(Some(&Value::Int(5)), &Action::new("kick"))?.as_int(), Some(15));
    // Nothing matched: the default runs exactly once.
    assert_eq!(registry.reduce(Some(&Value::Int(5)), &Action::new("other"))?.as_int(), Some(-1));
    Ok(())
}

#[test]
fn structural_sharing_survives_the_reduction_boundary() -> Result<()> {
    let registry = HandlerRegistry::build(Value::Null, |b| {
        b.add_case("rename", |draft, action| {
            let name = action
                .payload()
                .and_then(|p| p.as_text())
                .unwrap_or("anonymous")
                .to_owned();
            draft.field_mut("profile")?.set_field("name", name)?;
            Ok(None)
        })?;
        Ok(())
    })?;

    let state = Value::from_json(json!({
        "profile": {"name": "ada", "role": "engineer"},
        "audit": ["created"]
    }))?;

    let next = registry.reduce(
        Some(&state),
        &Action::with_payload("rename", Value::from("grace")),
    )?;

    assert_eq!(
        next.field("profile").and_then(|p| p.field("name")).and_then(Value::as_text),
        Some("grace")
    );
    // The untouched sibling keeps its allocation across the reduction.
    assert!(Value::ptr_eq(
        state.field("audit").unwrap(),
        next.field("audit").unwrap()
    ));
    assert!(!Value::ptr_eq(
        state.field("profile").unwrap(),
        next.field("profile").unwrap()
    ));
    Ok(())
}

#[test]
fn read_only_handler_preserves_identity() -> Result<()> {
    let registry = HandlerRegistry::build(Value::Null, |b| {
        b.add_case("inspect", |draft, _action| {
            // Reads, including a snapshot for diagnostics, are not writes.
            let _ = draft.get_field("profile");
            let _ = draft.snapshot();
            Ok(None)
        })?;
        Ok(())
    })?;

    let state = Value::record([("profile", Value::record([("name", Value::from("ada"))]))]);
    let next = registry.reduce(Some(&state), &Action::new("inspect"))?;
    assert!(Value::ptr_eq(&state, &next));
    Ok(())
}

#[test]
fn handler_may_replace_the_state_with_a_scalar_reset() -> Result<()> {
    let registry = HandlerRegistry::build(Value::Null, |b| {
        b.add_case("reset", |_draft, _action| Ok(Some(Value::Int(0))))?;
        Ok(())
    })?;

    let state = Value::record([("count", Value::Int(41))]);
    let next = registry.reduce(Some(&state), &Action::new("reset"))?;
    assert_eq!(next.as_int(), Some(0));
    Ok(())
}

#[test]
fn mutating_and_returning_is_ambiguous_for_record_state() -> Result<()> {
    let registry = HandlerRegistry::build(Value::Null, |b| {
        b.add_case("conflict", |draft, _action| {
            draft.set_field("count", 1i64)?;
            Ok(Some(Value::record([("count", Value::Int(2))])))
        })?;
        Ok(())
    })?;

    let state = Value::record([("count", Value::Int(0))]);
    let err = registry.reduce(Some(&state), &Action::new("conflict")).unwrap_err();
    assert!(matches!(err, ReduceError::AmbiguousUpdate { kind } if kind == "conflict"));
    Ok(())
}

#[test]
fn mutating_and_returning_is_ambiguous_for_list_state_in_a_matcher() -> Result<()> {
    let registry = HandlerRegistry::build(Value::Null, |b| {
        b.add_matcher(
            |action| action.kind == "conflict",
            |draft, _action| {
                draft.push(3i64)?;
                Ok(Some(Value::list([])))
            },
        )?;
        Ok(())
    })?;

    let state = Value::list([Value::Int(1), Value::Int(2)]);
    let err = registry.reduce(Some(&state), &Action::new("conflict")).unwrap_err();
    assert!(matches!(err, ReduceError::AmbiguousUpdate { kind } if kind == "conflict"));
    Ok(())
}

#[test]
fn read_only_child_access_plus_replacement_is_not_ambiguous() -> Result<()> {
    let registry = HandlerRegistry::build(Value::Null, |b| {
        b.add_case("flatten", |draft, _action| {
            // Entering a nested draft to read records no write, so
            // returning a replacement is still unambiguous.
            let name = draft
                .field_mut("profile")?
                .get_field("name")
                .unwrap_or(Value::Null);
            Ok(Some(Value::record([("name", name)])))
        })?;
        Ok(())
    })?;

    let state = Value::record([("profile", Value::record([("name", Value::from("ada"))]))]);
    let next = registry.reduce(Some(&state), &Action::new("flatten"))?;
    assert_eq!(next.field("name").and_then(Value::as_text), Some("ada"));
    Ok(())
}

#[test]
fn deep_mutation_alone_is_not_ambiguous() -> Result<()> {
    let registry = HandlerRegistry::build(Value::Null, |b| {
        b.add_case("tag", |draft, _action| {
            draft.field_mut("items")?.push("tagged")?;
            Ok(None)
        })?;
        Ok(())
    })?;

    let state = Value::record([("items", Value::list([Value::from("first")]))]);
    let next = registry.reduce(Some(&state), &Action::new("tag"))?;
    let items = next.field("items").and_then(Value::as_list).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].as_text(), Some("tagged"));
    Ok(())
}

#[test]
fn draft_shape_misuse_surfaces_as_a_typed_error() -> Result<()> {
    let registry = HandlerRegistry::build(Value::Null, |b| {
        b.add_case("oops", |draft, _action| {
            // Field write against a list-shaped state.
            draft.set_field("x", 1i64)?;
            Ok(None)
        })?;
        Ok(())
    })?;

    let state = Value::list([Value::Int(1)]);
    let err = registry.reduce(Some(&state), &Action::new("oops")).unwrap_err();
    assert!(matches!(err, ReduceError::Draft(_)));
    Ok(())
}

#[test]
fn registry_is_shareable_across_threads() -> Result<()> {
    let registry = Arc::new(counter_registry()?);
    let mut handles = Vec::new();
    for seed in 0..4i64 {
        let registry = registry.clone();
        handles.push(std::thread::spawn(move || {
            let state = Value::Int(seed);
            registry
                .reduce(Some(&state), &Action::new("increment"))
                .map(|v| v.as_int())
        }));
    }
    for (seed, handle) in handles.into_iter().enumerate() {
        let got = handle.join().expect("worker panicked")?;
        assert_eq!(got, Some((seed as i64 + 1) * 5 + 2));
    }
    Ok(())
}
