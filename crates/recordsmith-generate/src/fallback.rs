use std::collections::HashMap;

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_regex::Regex as RandRegex;
use recordsmith_core::{Field, FieldType, Record, Specification, Value};

const PATTERN_MAX_REPEAT: u32 = 16;
const DATE_SPAN_DAYS: u64 = 3650;

/// Procedural record synthesis used when the backend cannot deliver.
///
/// Values derive from each field's type and constraints plus a run-wide
/// cursor, so successive batches differ and output is reproducible for a
/// given seed. Synthesis never fails.
#[derive(Debug)]
pub struct FallbackSynthesizer {
    seed: u64,
    cursor: u64,
    base_date: NaiveDate,
    patterns: HashMap<String, Option<RandRegex>>,
}

impl FallbackSynthesizer {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            cursor: 0,
            base_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            patterns: HashMap::new(),
        }
    }

    /// Records synthesized so far in this run.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn synthesize(&mut self, spec: &Specification, count: usize) -> Vec<Record> {
        (0..count).map(|_| self.next_record(spec)).collect()
    }

    fn next_record(&mut self, spec: &Specification) -> Record {
        let index = self.cursor;
        self.cursor += 1;
        let mut rng = ChaCha8Rng::seed_from_u64(hash_record_seed(self.seed, index));

        let mut record = Record::with_capacity(spec.dataset.fields.len());
        for field in &spec.dataset.fields {
            let value = self.field_value(field, index, &mut rng);
            record.insert(field.name.clone(), value);
        }
        record
    }

    fn field_value(&mut self, field: &Field, index: u64, rng: &mut ChaCha8Rng) -> Value {
        let name = field.name.as_str();
        match field.field_type {
            FieldType::String | FieldType::Text | FieldType::Phone if field.pattern.is_some() => {
                self.pattern_value(field, index, rng)
            }
            FieldType::String => Value::Text(format!("fallback_{name}_{index}")),
            FieldType::Text => Value::Text(format!("Synthetic {name} entry number {index}.")),
            FieldType::Phone => Value::Text(format!(
                "+1-555-{:03}-{:04}",
                (index / 10_000) % 1000,
                index % 10_000
            )),
            FieldType::Email => Value::Text(format!("user{index}@example.com")),
            FieldType::Url => Value::Text(format!("https://example.com/{name}/{index}")),
            FieldType::Uuid => Value::Text(random_uuid(rng)),
            FieldType::Integer => match field.bounds() {
                Some((min, max)) if min < max => {
                    let span = (i128::from(max) - i128::from(min) + 1) as u128;
                    let offset = (u128::from(index) % span) as i128;
                    Value::Int((i128::from(min) + offset) as i64)
                }
                _ => Value::Int(index as i64 + 1),
            },
            FieldType::Float => match field.bounds() {
                Some((min, max)) if min < max => {
                    let step = (index % 100) as f64 / 100.0;
                    let jitter = rng.random_range(0.0..0.01);
                    let value = min as f64 + (step + jitter) * (max - min) as f64;
                    Value::Float((value * 100.0).round() / 100.0)
                }
                _ => Value::Float(index as f64 + 0.5),
            },
            FieldType::Boolean => Value::Bool(index % 2 == 0),
            FieldType::Enum => {
                if field.values.is_empty() {
                    Value::Null
                } else {
                    let slot = (index % field.values.len() as u64) as usize;
                    Value::Text(field.values[slot].clone())
                }
            }
            FieldType::Date => {
                let days = (index % DATE_SPAN_DAYS) as i64;
                let date = self.base_date - ChronoDuration::days(days);
                Value::Text(date.format("%Y-%m-%d").to_string())
            }
            FieldType::Datetime => {
                let start = self.base_date.and_time(NaiveTime::MIN);
                let at = start - ChronoDuration::hours((index % (DATE_SPAN_DAYS * 24)) as i64);
                Value::Text(at.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            }
            FieldType::Time => {
                let seconds = ((index * 37) % 86_400) as u32;
                let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)
                    .unwrap_or_default();
                Value::Text(time.format("%H:%M:%S").to_string())
            }
            FieldType::Object => {
                let mut nested = Record::with_capacity(2);
                nested.insert("id", index as i64);
                nested.insert("label", format!("{name}_{index}"));
                Value::Object(nested)
            }
            FieldType::Array => Value::List(vec![
                Value::Text(format!("item_{index}_1")),
                Value::Text(format!("item_{index}_2")),
            ]),
        }
    }

    fn pattern_value(&mut self, field: &Field, index: u64, rng: &mut ChaCha8Rng) -> Value {
        let pattern = field.pattern.as_deref().unwrap_or_default();
        let compiled = self
            .patterns
            .entry(pattern.to_string())
            .or_insert_with(|| RandRegex::compile(strip_anchors(pattern), PATTERN_MAX_REPEAT).ok());
        match compiled {
            Some(regex) => Value::Text(rng.sample::<String, _>(&*regex)),
            None => Value::Text(format!("fallback_{}_{index}", field.name)),
        }
    }
}

fn strip_anchors(pattern: &str) -> &str {
    let pattern = pattern.strip_prefix('^').unwrap_or(pattern);
    match pattern.strip_suffix('$') {
        Some(stripped) if !stripped.ends_with('\\') => stripped,
        _ => pattern,
    }
}

fn hash_record_seed(seed: u64, index: u64) -> u64 {
    let mut hash = seed ^ index.wrapping_mul(0x9e3779b97f4a7c15);
    hash = hash.wrapping_mul(0x100000001b3);
    hash ^ (hash >> 29)
}

fn random_uuid(rng: &mut ChaCha8Rng) -> String {
    let mut bytes = [0_u8; 16];
    rng.fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    uuid::Uuid::from_bytes(bytes).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordsmith_core::{DatasetConfig, ModelConfig};

    fn spec(fields: Vec<Field>) -> Specification {
        Specification {
            model: ModelConfig::default(),
            dataset: DatasetConfig {
                count: 10,
                domain: "test".to_string(),
                fields,
            },
        }
    }

    #[test]
    fn cursor_is_run_wide() {
        let spec = spec(vec![Field::new("name", FieldType::String)]);
        let mut synth = FallbackSynthesizer::new(7);
        let first = synth.synthesize(&spec, 2);
        let second = synth.synthesize(&spec, 2);

        assert_eq!(synth.cursor(), 4);
        assert_eq!(first[0].get("name"), Some(&Value::from("fallback_name_0")));
        assert_eq!(second[1].get("name"), Some(&Value::from("fallback_name_3")));
    }

    #[test]
    fn same_seed_reproduces_output() {
        let spec = spec(vec![
            Field::new("id", FieldType::Uuid),
            Field::new("score", FieldType::Float).with_range(0, 10),
        ]);
        let left = FallbackSynthesizer::new(42).synthesize(&spec, 5);
        let right = FallbackSynthesizer::new(42).synthesize(&spec, 5);
        let other = FallbackSynthesizer::new(43).synthesize(&spec, 5);
        assert_eq!(left, right);
        assert_ne!(left, other);
    }

    #[test]
    fn values_respect_constraints() {
        let spec = spec(vec![
            Field::new("age", FieldType::Integer).with_range(18, 20),
            Field::new("status", FieldType::Enum).with_values(["a", "b"]),
            Field::new("sku", FieldType::String).with_pattern("^[A-Z]{2}[0-9]{6}$"),
            Field::new("joined", FieldType::Date),
            Field::new("active", FieldType::Boolean),
        ]);
        let records = FallbackSynthesizer::new(1).synthesize(&spec, 4);

        let ages: Vec<_> = records
            .iter()
            .filter_map(|record| record.get("age").and_then(Value::as_i64))
            .collect();
        assert_eq!(ages, vec![18, 19, 20, 18]);

        let statuses: Vec<_> = records
            .iter()
            .filter_map(|record| record.get("status").and_then(Value::as_str))
            .collect();
        assert_eq!(statuses, vec!["a", "b", "a", "b"]);

        let pattern = regex_lite_check();
        for record in &records {
            let sku = record.get("sku").and_then(Value::as_str).expect("sku");
            assert!(pattern(sku), "unexpected sku {sku}");
        }

        assert_eq!(
            records[1].get("joined"),
            Some(&Value::from("2023-12-31"))
        );
        assert_eq!(records[0].get("active"), Some(&Value::Bool(true)));
    }

    #[test]
    fn invalid_pattern_uses_placeholder() {
        let spec = spec(vec![Field::new("code", FieldType::String).with_pattern("(unclosed")]);
        let records = FallbackSynthesizer::new(0).synthesize(&spec, 1);
        assert_eq!(records[0].get("code"), Some(&Value::from("fallback_code_0")));
    }

    #[test]
    fn anchors_are_stripped_before_compiling() {
        assert_eq!(strip_anchors("^abc$"), "abc");
        assert_eq!(strip_anchors("abc\\$"), "abc\\$");
        assert_eq!(strip_anchors("plain"), "plain");
    }

    fn regex_lite_check() -> impl Fn(&str) -> bool {
        |value: &str| {
            value.len() == 8
                && value[..2].chars().all(|c| c.is_ascii_uppercase())
                && value[2..].chars().all(|c| c.is_ascii_digit())
        }
    }
}
