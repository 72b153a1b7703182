use relmodel::methods::{MethodCall, ParamKind, Signature};
use relmodel::{Environment, FieldInfo, ModelError, ModelInfo, RecordSet, Result, Value};
use std::collections::HashSet;

fn env() -> Environment {
    let env = Environment::new();
    env.declare_model(
        ModelInfo::new("Partner")
            .with_field(FieldInfo::text("name"))
            .with_field(FieldInfo::integer("age")),
    )
    .unwrap();
    env
}

fn greet(_call: &MethodCall<'_>, _rs: &RecordSet, name: String) -> Result<String> {
    Ok(format!("Hello {}", name))
}

fn greet_loudly(call: &MethodCall<'_>, rs: &RecordSet, name: String) -> Result<String> {
    let below = call.call_next(rs, &[Value::Text(name)])?;
    Ok(format!("{}!", below))
}

fn greet_politely(call: &MethodCall<'_>, rs: &RecordSet, name: String) -> Result<String> {
    call.next(rs, &[Value::Text(format!("dear {}", name))])
}

fn greet_count(_call: &MethodCall<'_>, _rs: &RecordSet, name: String, times: i64) -> Result<String> {
    Ok(name.repeat(times as usize))
}

fn record_count(_call: &MethodCall<'_>, rs: &RecordSet) -> Result<i64> {
    Ok(rs.len() as i64)
}

fn describe(call: &MethodCall<'_>, rs: &RecordSet) -> Result<String> {
    let count = call.call(rs, "record_count", &[])?;
    let greeting = call.call(rs, "greet", &[Value::from("you")])?;
    Ok(format!("{} ({} records)", greeting, count))
}

#[test]
fn test_layers_run_top_down() {
    let env = env();
    env.declare_method("Partner", "greet", greet).unwrap();
    env.declare_method("Partner", "greet", greet_loudly).unwrap();
    env.declare_method("Partner", "greet", greet_politely).unwrap();
    env.bootstrap().unwrap();

    let rs = env.recordset("Partner", vec![1]).unwrap();
    let res = env.call(&rs, "greet", &[Value::from("Bob")]).unwrap();
    assert_eq!(res, Value::from("Hello dear Bob!"));
}

#[test]
fn test_typed_next_converts_result() {
    let env = env();
    env.declare_method("Partner", "greet", greet).unwrap();
    env.declare_method("Partner", "greet", greet_politely).unwrap();
    let rs = env.recordset("Partner", vec![1]).unwrap();
    assert_eq!(env.call(&rs, "greet", &[Value::from("Ann")]).unwrap(), Value::from("Hello dear Ann"));

    fn next_as_int(call: &MethodCall<'_>, rs: &RecordSet, name: String) -> Result<String> {
        let n: i64 = call.next(rs, &[Value::Text(name)])?;
        Ok(n.to_string())
    }
    env.declare_method("Partner", "greet", next_as_int).unwrap();
    assert!(matches!(
        env.call(&rs, "greet", &[Value::from("Ann")]),
        Err(ModelError::TypeMismatch(_))
    ));
}

#[test]
fn test_resolve_next_visits_every_layer_once() {
    let env = env();
    let mut declared = HashSet::new();
    for _ in 0..4 {
        declared.insert(env.declare_method("Partner", "greet", greet).unwrap());
    }

    let registry = env.methods();
    let info = registry.lookup("Partner", "greet").unwrap();
    let mut visited = HashSet::new();
    let mut current = Some(info.top_layer().unwrap().clone());
    while let Some(layer) = current {
        assert!(visited.insert(layer.id), "{} visited twice", layer.id);
        current = registry.resolve_next(layer.id).unwrap();
    }
    assert_eq!(visited, declared);
}

#[test]
fn test_mismatched_signature_leaves_chain_untouched() {
    let env = env();
    env.declare_method("Partner", "greet", greet).unwrap();

    let err = env.declare_method("Partner", "greet", greet_count).unwrap_err();
    assert!(matches!(err, ModelError::SignatureMismatch { .. }));
    assert!(err.to_string().contains("fn(RecordSet, Text) -> Text"));

    let err = env
        .declare_dynamic_method(
            "Partner",
            "greet",
            Signature::method(&[ParamKind::Integer], ParamKind::Text),
            |_: &MethodCall<'_>, _: &RecordSet, _: &[Value]| Ok(Value::from("x")),
        )
        .unwrap_err();
    assert!(matches!(err, ModelError::SignatureMismatch { .. }));

    assert_eq!(env.methods().lookup("Partner", "greet").unwrap().len(), 1);
}

#[test]
fn test_dynamic_layer_on_typed_chain() {
    let env = env();
    env.declare_method("Partner", "greet", greet).unwrap();
    env.declare_dynamic_method(
        "Partner",
        "greet",
        Signature::method(&[ParamKind::Text], ParamKind::Text),
        |call: &MethodCall<'_>, rs: &RecordSet, args: &[Value]| {
            let below = call.call_next(rs, args)?;
            Ok(Value::Text(below.to_string().to_uppercase()))
        },
    )
    .unwrap();

    let rs = env.recordset("Partner", vec![]).unwrap();
    assert_eq!(
        env.call(&rs, "greet", &[Value::from("ann")]).unwrap(),
        Value::from("HELLO ANN")
    );
}

#[test]
fn test_dynamic_layer_return_is_checked() {
    let env = env();
    env.declare_dynamic_method(
        "Partner",
        "age_of",
        Signature::method(&[], ParamKind::Integer),
        |_: &MethodCall<'_>, _: &RecordSet, _: &[Value]| Ok(Value::from("old")),
    )
    .unwrap();
    let rs = env.recordset("Partner", vec![1]).unwrap();
    let err = env.call(&rs, "age_of", &[]).unwrap_err();
    assert!(matches!(err, ModelError::TypeMismatch(_)));
}

#[test]
fn test_call_arguments_are_checked() {
    let env = env();
    env.declare_method("Partner", "greet_count", greet_count).unwrap();
    let rs = env.recordset("Partner", vec![1]).unwrap();

    assert_eq!(
        env.call(&rs, "greet_count", &[Value::from("ab"), Value::Integer(2)]).unwrap(),
        Value::from("abab")
    );

    let err = env.call(&rs, "greet_count", &[Value::from("ab")]).unwrap_err();
    assert!(err.is_data());
    let err = env
        .call(&rs, "greet_count", &[Value::Integer(2), Value::from("ab")])
        .unwrap_err();
    assert!(err.is_data());
}

#[test]
fn test_bottom_layer_cannot_delegate() {
    let env = env();
    env.declare_method("Partner", "greet", greet_loudly).unwrap();
    let rs = env.recordset("Partner", vec![1]).unwrap();
    let err = env.call(&rs, "greet", &[Value::from("x")]).unwrap_err();
    assert!(matches!(err, ModelError::NoNextLayer { .. }));
}

#[test]
fn test_layers_call_other_methods() {
    let env = env();
    env.declare_method("Partner", "record_count", record_count).unwrap();
    env.declare_method("Partner", "greet", greet).unwrap();
    env.declare_method("Partner", "describe", describe).unwrap();

    let rs = env.recordset("Partner", vec![4, 5]).unwrap();
    assert_eq!(
        env.call(&rs, "describe", &[]).unwrap(),
        Value::from("Hello you (2 records)")
    );
}

#[test]
fn test_registration_after_bootstrap_fails() {
    let env = env();
    env.declare_method("Partner", "greet", greet).unwrap();
    env.bootstrap().unwrap();

    let err = env.declare_method("Partner", "greet", greet_loudly).unwrap_err();
    assert!(matches!(err, ModelError::AlreadyBootstrapped(_)));
    assert!(err.is_configuration());
    let err = env.declare_method("Partner", "fresh", record_count).unwrap_err();
    assert!(matches!(err, ModelError::AlreadyBootstrapped(_)));

    assert_eq!(env.methods().lookup("Partner", "greet").unwrap().len(), 1);
    assert!(!env.methods().has_method("Partner", "fresh"));
}

#[test]
fn test_unknown_model_and_method() {
    let env = env();
    assert!(matches!(
        env.declare_method("Invoice", "greet", greet),
        Err(ModelError::UnknownModel(_))
    ));
    let rs = env.recordset("Partner", vec![1]).unwrap();
    assert!(matches!(
        env.call(&rs, "missing", &[]),
        Err(ModelError::UnknownMethod { .. })
    ));
}

#[test]
fn test_receiver_must_be_recordset() {
    let env = env();
    let err = env
        .declare_dynamic_method(
            "Partner",
            "bad",
            Signature::new(vec![ParamKind::Text], ParamKind::Unit),
            |_: &MethodCall<'_>, _: &RecordSet, _: &[Value]| Ok(Value::Null),
        )
        .unwrap_err();
    assert!(matches!(err, ModelError::InvalidSignature { .. }));
}
