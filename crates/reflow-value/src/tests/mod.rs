use crate::value::Value;


/// A nested state used across draft tests: a record with a scalar field,
/// a nested record, and a list sibling that should stay shared when
/// untouched.
pub(crate) fn sample_state() -> Value {
    Value::record([
        ("count", Value::Int(0)),
        (
            "session",
            Value::record([
                ("user", Value::from("ada")),
                ("active", Value::Bool(true)),
            ]),
        ),
        (
            "history",
            Value::list([Value::from("boot"), Value::from("login")]),
        ),
    ])
}
