use recordsmith_core::{Field, FieldType, Specification, validate_spec};

#[test]
fn applies_field_level_defaults() {
    let spec: Specification = serde_json::from_str(
        r#"{
  "model": {},
  "dataset": {
    "fields": [
      { "name": "sku" },
      { "name": "price", "type": "float", "range": [1, 500] }
    ]
  }
}"#,
    )
    .expect("parse spec");

    assert_eq!(spec.model.endpoint, "http://localhost:11434");
    assert_eq!(spec.model.name, "llama3.1:8b");
    assert_eq!(spec.model.batch_size, 32);
    assert_eq!(spec.dataset.count, 1000);
    assert_eq!(spec.dataset.domain, "Generic data");
    assert_eq!(spec.dataset.fields[0].field_type, FieldType::String);
    assert_eq!(spec.dataset.fields[1].bounds(), Some((1, 500)));
    validate_spec(&spec).expect("valid spec");
}

#[test]
fn serializes_fields_without_empty_constraints() {
    let field = Field::new("status", FieldType::Enum)
        .required()
        .with_values(["active", "inactive"]);

    let json = serde_json::to_string_pretty(&field).expect("serialize field");
    let expected = r#"{
  "name": "status",
  "type": "enum",
  "required": true,
  "values": [
    "active",
    "inactive"
  ]
}"#;
    assert_eq!(json, expected);
}

#[test]
fn rejects_duplicate_fields_and_bad_ranges() {
    let mut spec: Specification = serde_json::from_str(
        r#"{"model": {}, "dataset": {"count": 10, "fields": [{"name": "a"}, {"name": "a"}]}}"#,
    )
    .expect("parse spec");
    let err = validate_spec(&spec).expect_err("duplicate field");
    assert!(err.to_string().contains("duplicate field name"));

    spec.dataset.fields = vec![Field::new("n", FieldType::Integer).with_range(5, 5)];
    let err = validate_spec(&spec).expect_err("empty range");
    assert!(err.to_string().contains("min < max"));

    spec.dataset.fields = vec![Field::new("kind", FieldType::Enum)];
    let err = validate_spec(&spec).expect_err("enum without values");
    assert!(err.to_string().contains("requires values"));
}

#[test]
fn rejects_zero_count() {
    let spec: Specification = serde_json::from_str(
        r#"{"model": {}, "dataset": {"count": 0, "fields": [{"name": "a"}]}}"#,
    )
    .expect("parse spec");
    assert!(validate_spec(&spec).is_err());
}
