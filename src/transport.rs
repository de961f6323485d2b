//! The line transport: read and write halves of one framed TCP stream.
//!
//! Owns no policy. The connection manager decides when these halves are
//! created and dropped; the underlying socket closes once both halves are
//! gone.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::debug;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::codec::LineCodec;
use crate::error::ChatError;

type FramedLines = Framed<TcpStream, LineCodec>;

/// Serialized, flushing writer for one line per call.
pub struct LineWriter {
    sink: SplitSink<FramedLines, String>,
}

/// One-line-at-a-time reader; `None` means the peer closed the stream.
pub struct LineReader {
    stream: SplitStream<FramedLines>,
}

/// Wraps an established stream in the line codec and splits it.
///
/// Nagle is disabled: chat is interactive and every line should leave
/// immediately.
pub fn line_channel(stream: TcpStream) -> (LineWriter, LineReader) {
    if let Err(err) = stream.set_nodelay(true) {
        debug!("could not disable nagle: {err}");
    }
    let (sink, stream) = Framed::new(stream, LineCodec::new()).split();
    (LineWriter { sink }, LineReader { stream })
}

impl LineWriter {
    /// Writes `line` plus a single terminator and flushes.
    ///
    /// Callers serialize access (the manager keeps the writer behind a
    /// mutex), so two sends never interleave partial lines on the wire.
    pub async fn write_line(&mut self, line: &str) -> Result<(), ChatError> {
        self.sink
            .send(line.to_owned())
            .await
            .map_err(|err| ChatError::WriteFailed(err.to_string()))
    }

    /// Flushes and shuts down the write half so the peer observes EOF.
    ///
    /// Tearing down a dead socket is not itself an error; failures are
    /// logged and swallowed.
    pub async fn close(&mut self) {
        if let Err(err) = self.sink.close().await {
            debug!("ignoring error while closing the write half: {err}");
        }
    }
}

impl LineReader {
    /// Suspends until a full line arrives, the peer closes (`None`), or
    /// the read fails.
    pub async fn read_line(&mut self) -> Option<Result<String, ChatError>> {
        self.stream
            .next()
            .await
            .map(|result| result.map_err(|err| ChatError::ReadFailed(err.to_string())))
    }
}
