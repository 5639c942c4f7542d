pub mod jsonl;

pub use jsonl::{
    DEFAULT_BUFFER_LIMIT, OutputTarget, OutputWriter, RecordSink, SinkError, StreamSink,
    StreamTarget,
};
