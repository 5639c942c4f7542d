use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Stdout, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use recordsmith_core::Record;
use thiserror::Error;

/// Records held before the buffer is drained to the target.
pub const DEFAULT_BUFFER_LIMIT: usize = 100;

/// Errors raised while persisting records. All of them are fatal to a run.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("sink is closed")]
    Closed,
    #[error("sink failed on an earlier write")]
    Failed,
}

/// Destination for confirmed-unique records.
pub trait RecordSink {
    /// Persist one record; ownership moves to the sink.
    fn write(&mut self, record: Record) -> Result<(), SinkError>;
    /// Push buffered records to durable storage.
    fn flush(&mut self) -> Result<(), SinkError>;
    /// Flush and release resources. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), SinkError>;
    /// Records handed to the underlying target so far. Records still held
    /// in a buffer, or dropped by a failed write, are not counted.
    fn written(&self) -> u64;
    /// Encoded bytes handed to the target, when the sink tracks them.
    fn bytes_written(&self) -> Option<u64> {
        None
    }
}

/// Byte stream a [`StreamSink`] writes to.
pub trait StreamTarget: Write {
    /// Make flushed bytes durable.
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Write trailers and flush; called once on close.
    fn finish(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl StreamTarget for Vec<u8> {}

impl StreamTarget for io::Sink {}

/// Output location parsed from a user-supplied path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
    /// Whole-stream gzip, selected by a `.gz` suffix.
    Gzip(PathBuf),
}

impl OutputTarget {
    pub fn parse(path: &str) -> Self {
        let trimmed = path.trim();
        if trimmed.is_empty() || trimmed == "-" || trimmed == "stdout" {
            return OutputTarget::Stdout;
        }
        let path = PathBuf::from(trimmed);
        if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
        {
            OutputTarget::Gzip(path)
        } else {
            OutputTarget::File(path)
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            OutputTarget::Stdout => None,
            OutputTarget::File(path) | OutputTarget::Gzip(path) => Some(path),
        }
    }

    /// Open the target, creating parent directories for files.
    pub fn open(&self) -> Result<OutputWriter, SinkError> {
        match self {
            OutputTarget::Stdout => Ok(OutputWriter::Stdout(BufWriter::new(io::stdout()))),
            OutputTarget::File(path) => Ok(OutputWriter::File(BufWriter::new(create_file(path)?))),
            OutputTarget::Gzip(path) => Ok(OutputWriter::Gzip(GzEncoder::new(
                BufWriter::new(create_file(path)?),
                Compression::default(),
            ))),
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Stdout => f.write_str("stdout"),
            OutputTarget::File(path) => write!(f, "{}", path.display()),
            OutputTarget::Gzip(path) => write!(f, "{} (gzip)", path.display()),
        }
    }
}

fn create_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    File::create(path)
}

/// Opened [`OutputTarget`].
pub enum OutputWriter {
    Stdout(BufWriter<Stdout>),
    File(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl fmt::Debug for OutputWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            OutputWriter::Stdout(_) => "stdout",
            OutputWriter::File(_) => "file",
            OutputWriter::Gzip(_) => "gzip",
        };
        f.debug_tuple("OutputWriter").field(&kind).finish()
    }
}

impl Write for OutputWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputWriter::Stdout(inner) => inner.write(buf),
            OutputWriter::File(inner) => inner.write(buf),
            OutputWriter::Gzip(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputWriter::Stdout(inner) => inner.flush(),
            OutputWriter::File(inner) => inner.flush(),
            OutputWriter::Gzip(inner) => inner.flush(),
        }
    }
}

impl StreamTarget for OutputWriter {
    fn sync(&mut self) -> io::Result<()> {
        match self {
            OutputWriter::Stdout(_) => Ok(()),
            OutputWriter::File(inner) => inner.get_ref().sync_data(),
            OutputWriter::Gzip(inner) => inner.get_ref().get_ref().sync_data(),
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        match self {
            OutputWriter::Stdout(inner) => inner.flush(),
            OutputWriter::File(inner) => {
                inner.flush()?;
                inner.get_ref().sync_data()
            }
            OutputWriter::Gzip(inner) => {
                inner.try_finish()?;
                inner.get_mut().flush()?;
                inner.get_ref().get_ref().sync_data()
            }
        }
    }
}

/// JSON Lines sink with a bounded record buffer.
///
/// Each record is encoded on `write`, so encoding failures surface on the
/// record that caused them. Encoded lines are held until `buffer_limit` is
/// reached and then written in one pass. A failed write poisons the sink:
/// the lines still buffered are dropped and later writes are refused.
#[derive(Debug)]
pub struct StreamSink<W: StreamTarget> {
    target: CountingWriter<W>,
    buffer: Vec<String>,
    buffer_limit: usize,
    peak_buffered: usize,
    accepted: u64,
    persisted: u64,
    failed: bool,
    closed: bool,
}

impl StreamSink<OutputWriter> {
    /// Open `target` and wrap it.
    pub fn open(target: &OutputTarget, buffer_limit: usize) -> Result<Self, SinkError> {
        Ok(Self::with_buffer_limit(target.open()?, buffer_limit))
    }
}

impl<W: StreamTarget> StreamSink<W> {
    pub fn new(target: W) -> Self {
        Self::with_buffer_limit(target, DEFAULT_BUFFER_LIMIT)
    }

    pub fn with_buffer_limit(target: W, buffer_limit: usize) -> Self {
        let buffer_limit = buffer_limit.max(1);
        Self {
            target: CountingWriter::new(target),
            buffer: Vec::with_capacity(buffer_limit),
            buffer_limit,
            peak_buffered: 0,
            accepted: 0,
            persisted: 0,
            failed: false,
            closed: false,
        }
    }

    pub fn buffer_limit(&self) -> usize {
        self.buffer_limit
    }

    /// Records currently held in the buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Highest number of records ever held at once.
    pub fn peak_buffered(&self) -> usize {
        self.peak_buffered
    }

    /// Records accepted by `write`, including those still buffered.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn get_ref(&self) -> &W {
        &self.target.inner
    }

    pub fn into_inner(self) -> W {
        self.target.inner
    }

    fn drain(&mut self) -> Result<(), SinkError> {
        let result = self.write_buffered();
        self.buffer.clear();
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn write_buffered(&mut self) -> Result<(), SinkError> {
        for line in &self.buffer {
            self.target.write_all(line.as_bytes())?;
            self.target.write_all(b"\n")?;
            self.persisted += 1;
        }
        Ok(())
    }

    fn poison<T>(&mut self, result: io::Result<T>) -> Result<T, SinkError> {
        result.map_err(|err| {
            self.failed = true;
            SinkError::Io(err)
        })
    }
}

impl<W: StreamTarget> RecordSink for StreamSink<W> {
    fn write(&mut self, record: Record) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        if self.failed {
            return Err(SinkError::Failed);
        }
        if self.buffer.len() >= self.buffer_limit {
            self.drain()?;
        }
        self.buffer.push(record.to_json_line()?);
        self.peak_buffered = self.peak_buffered.max(self.buffer.len());
        self.accepted += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        if self.closed {
            return Ok(());
        }
        if self.failed {
            return Err(SinkError::Failed);
        }
        self.drain()?;
        let flushed = self.target.flush();
        self.poison(flushed)?;
        let synced = self.target.inner.sync();
        self.poison(synced)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.failed {
            return Err(SinkError::Failed);
        }
        self.drain()?;
        let finished = self.target.inner.finish();
        self.poison(finished)?;
        Ok(())
    }

    fn written(&self) -> u64 {
        self.persisted
    }

    fn bytes_written(&self) -> Option<u64> {
        Some(self.target.bytes_written())
    }
}

#[derive(Debug)]
struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts `budget` bytes, then fails every write.
    struct LimitedTarget {
        data: Vec<u8>,
        budget: usize,
    }

    impl LimitedTarget {
        fn new(budget: usize) -> Self {
            Self {
                data: Vec::new(),
                budget,
            }
        }

        fn complete_lines(&self) -> u64 {
            self.data.iter().filter(|byte| **byte == b'\n').count() as u64
        }
    }

    impl Write for LimitedTarget {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.budget.saturating_sub(self.data.len());
            if room == 0 {
                return Err(io::Error::other("no space left on device"));
            }
            let size = room.min(buf.len());
            self.data.extend_from_slice(&buf[..size]);
            Ok(size)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl StreamTarget for LimitedTarget {}

    fn record(id: i64) -> Record {
        let mut record = Record::new();
        record.insert("id", id);
        record.insert("name", format!("n{id}"));
        record
    }

    #[test]
    fn buffer_never_exceeds_limit() {
        let mut sink = StreamSink::with_buffer_limit(Vec::new(), 3);
        for id in 0..10 {
            sink.write(record(id)).expect("write");
            assert!(sink.buffered() <= 3);
        }
        assert_eq!(sink.peak_buffered(), 3);
        sink.close().expect("close");

        let text = String::from_utf8(sink.into_inner()).expect("utf8");
        assert_eq!(text.lines().count(), 10);
        assert_eq!(text.lines().next(), Some(r#"{"id":0,"name":"n0"}"#));
    }

    #[test]
    fn flush_drains_buffer_and_counts_bytes() {
        let mut sink = StreamSink::new(Vec::new());
        sink.write(record(1)).expect("write");
        assert!(sink.get_ref().is_empty());

        sink.flush().expect("flush");
        let expected = "{\"id\":1,\"name\":\"n1\"}\n";
        assert_eq!(sink.get_ref().as_slice(), expected.as_bytes());
        assert_eq!(sink.bytes_written(), Some(expected.len() as u64));
    }

    #[test]
    fn close_is_idempotent_and_rejects_later_writes() {
        let mut sink = StreamSink::new(io::sink());
        sink.write(record(1)).expect("write");
        sink.close().expect("close");
        sink.close().expect("second close");
        assert!(matches!(sink.write(record(2)), Err(SinkError::Closed)));
        assert_eq!(sink.written(), 1);
    }

    #[test]
    fn failed_drain_counts_only_persisted_lines() {
        let mut sink = StreamSink::with_buffer_limit(LimitedTarget::new(60), 2);
        let mut failure = None;
        for id in 0..20 {
            if let Err(err) = sink.write(record(id)) {
                failure = Some(err);
                break;
            }
        }

        assert!(matches!(failure, Some(SinkError::Io(_))));
        assert!(sink.is_failed());
        assert!(sink.accepted() > sink.written());
        assert_eq!(sink.written(), sink.get_ref().complete_lines());
        assert_eq!(sink.buffered(), 0);
        assert!(matches!(sink.write(record(99)), Err(SinkError::Failed)));
        assert!(matches!(sink.flush(), Err(SinkError::Failed)));
        assert!(matches!(sink.close(), Err(SinkError::Failed)));
        assert!(sink.close().is_ok());
    }

    #[test]
    fn failed_final_flush_counts_only_persisted_lines() {
        let mut sink = StreamSink::with_buffer_limit(LimitedTarget::new(50), 100);
        for id in 0..10 {
            sink.write(record(id)).expect("buffered write");
        }
        assert_eq!(sink.written(), 0);

        assert!(matches!(sink.flush(), Err(SinkError::Io(_))));
        assert_eq!(sink.accepted(), 10);
        assert_eq!(sink.written(), 2);
        assert_eq!(sink.written(), sink.get_ref().complete_lines());
    }

    #[test]
    fn target_is_chosen_by_name() {
        assert_eq!(OutputTarget::parse("-"), OutputTarget::Stdout);
        assert_eq!(OutputTarget::parse(""), OutputTarget::Stdout);
        assert_eq!(
            OutputTarget::parse("out/data.jsonl.gz"),
            OutputTarget::Gzip(PathBuf::from("out/data.jsonl.gz"))
        );
        assert_eq!(
            OutputTarget::parse("data.jsonl"),
            OutputTarget::File(PathBuf::from("data.jsonl"))
        );
    }
}
