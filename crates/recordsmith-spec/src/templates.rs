use recordsmith_core::{DatasetConfig, Field, FieldType, ModelConfig, Specification};

const TEMPLATE_NAMES: [&str; 5] = ["basic", "ecommerce", "user", "product", "healthcare"];

/// Names accepted by [`template`].
pub fn template_names() -> &'static [&'static str] {
    &TEMPLATE_NAMES
}

/// Built-in starter specification by name.
pub fn template(name: &str) -> Option<Specification> {
    let (count, domain, fields) = match name {
        "basic" => (
            1000,
            "Custom data domain",
            vec![
                Field::new("id", FieldType::Integer)
                    .required()
                    .with_description("Unique identifier"),
                Field::new("name", FieldType::String)
                    .required()
                    .with_description("Name field"),
                Field::new("created_at", FieldType::Datetime)
                    .required()
                    .with_description("Creation timestamp"),
            ],
        ),
        "ecommerce" => (
            1000,
            "E-commerce customer data",
            vec![
                Field::new("email", FieldType::Email)
                    .required()
                    .with_pattern(r"@(gmail|yahoo|outlook)\.com$"),
                Field::new("age", FieldType::Integer)
                    .required()
                    .with_range(18, 80),
                Field::new("status", FieldType::Enum)
                    .required()
                    .with_values(["active", "inactive", "pending"]),
                Field::new("created_at", FieldType::Datetime)
                    .required()
                    .with_description("Account creation date"),
                Field::new("preferences", FieldType::Object)
                    .with_description("Customer preferences and settings"),
            ],
        ),
        "user" => (
            500,
            "User profile data",
            vec![
                Field::new("username", FieldType::String)
                    .required()
                    .with_pattern("^[a-zA-Z0-9_]{3,20}$"),
                Field::new("email", FieldType::Email).required(),
                Field::new("full_name", FieldType::String).required(),
                Field::new("bio", FieldType::Text).with_description("User biography"),
                Field::new("avatar_url", FieldType::Url).with_description("Profile picture URL"),
            ],
        ),
        "product" => (
            2000,
            "Product catalog data",
            vec![
                Field::new("name", FieldType::String).required(),
                Field::new("description", FieldType::Text).required(),
                Field::new("price", FieldType::Float)
                    .required()
                    .with_range(1, 1000),
                Field::new("category", FieldType::Enum)
                    .required()
                    .with_values(["electronics", "clothing", "books", "home", "sports"]),
                Field::new("sku", FieldType::String)
                    .required()
                    .with_pattern("^[A-Z]{2}[0-9]{6}$"),
                Field::new("in_stock", FieldType::Boolean).required(),
            ],
        ),
        "healthcare" => (
            1000,
            "Synthetic patient visit records",
            vec![
                Field::new("patient_id", FieldType::Uuid).required(),
                Field::new("visit_date", FieldType::Date).required(),
                Field::new("department", FieldType::Enum)
                    .required()
                    .with_values(["cardiology", "oncology", "pediatrics", "emergency"]),
                Field::new("age", FieldType::Integer)
                    .required()
                    .with_range(0, 100),
                Field::new("diagnosis_code", FieldType::String)
                    .with_pattern("^[A-Z][0-9]{2}\\.[0-9]$")
                    .with_description("ICD-10 style code"),
                Field::new("notes", FieldType::Text).with_description("Clinician notes"),
            ],
        ),
        _ => return None,
    };

    Some(Specification {
        model: ModelConfig::default(),
        dataset: DatasetConfig {
            count,
            domain: domain.to_string(),
            fields,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate_spec_semantics;

    #[test]
    fn every_template_passes_semantic_validation() {
        for name in template_names() {
            let spec = template(name).expect("known template");
            let report = validate_spec_semantics(&spec);
            assert!(report.is_ok(), "{name}: {:?}", report.errors);
        }
    }

    #[test]
    fn unknown_template_is_none() {
        assert!(template("inventory").is_none());
    }
}
