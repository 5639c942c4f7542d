//! Generate records with no backend: every request fails, so each batch is
//! synthesized by the fallback path and streamed to stdout.

use async_trait::async_trait;
use recordsmith_core::{DatasetConfig, Field, FieldType, ModelConfig, Record, Specification};
use recordsmith_generate::{
    BatchSource, GenerateOptions, GenerationPipeline, OutputTarget, SourceError, StreamSink,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Offline;

#[async_trait]
impl BatchSource for Offline {
    async fn request_batch(
        &mut self,
        _spec: &Specification,
        _desired: usize,
        _deadline: Instant,
    ) -> Result<Vec<Record>, SourceError> {
        Err(SourceError::unavailable("no backend configured"))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let spec = Specification {
        model: ModelConfig {
            batch_size: 5,
            ..ModelConfig::default()
        },
        dataset: DatasetConfig {
            count: 12,
            domain: "Customer accounts".to_string(),
            fields: vec![
                Field::new("id", FieldType::Uuid).required(),
                Field::new("email", FieldType::Email).required(),
                Field::new("plan", FieldType::Enum).with_values(["free", "pro", "team"]),
                Field::new("seats", FieldType::Integer).with_range(1, 50),
                Field::new("code", FieldType::String).with_pattern("^[A-Z]{3}-[0-9]{4}$"),
            ],
        },
    };

    let sink = StreamSink::open(&OutputTarget::Stdout, 100)?;
    let options = GenerateOptions::default().with_seed(42);
    let mut pipeline = GenerationPipeline::new(Offline, sink, options);
    let result = pipeline.run(&spec, CancellationToken::new()).await?;

    eprintln!(
        "generated {} records, {} fallback batches",
        result.report.generated, result.report.fallback_batches
    );
    Ok(())
}
