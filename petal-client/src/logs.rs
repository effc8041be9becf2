//! Log-related API endpoints

use std::pin::Pin;

use futures::{Stream, StreamExt};
use petal_core::domain::log::LogEntry;
use petal_core::dto::log::{StreamLogsRequest, StreamLogsResponse};

use crate::ExecClient;
use crate::error::{ClientError, Result};

/// Chunks of a run's output, in order
///
/// Ends when the server closes the stream, which it does once the run is
/// finished and fully drained.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<StreamLogsResponse>> + Send>>;

impl ExecClient {
    /// Open a log stream for a run
    ///
    /// `after` resumes from the cursor of a previously received chunk.
    /// Unknown runs fail here with a 404 `ApiError`, before any chunk.
    pub async fn stream_logs(&self, run_id: i64, after: Option<i64>) -> Result<LogStream> {
        let url = format!("{}/run/logs/stream", self.base_url);
        let req = StreamLogsRequest::resume(run_id, after);
        let response = self.client.post(&url).json(&req).send().await?;
        let response = self.check_status(response).await?;

        tracing::debug!("Opened log stream for run {}", run_id);

        Ok(decode_stream(response.bytes_stream()))
    }

    /// Append log entries to a run
    pub async fn send_logs(&self, run_id: i64, entries: &[LogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let url = format!("{}/run/{}/logs", self.base_url, run_id);
        let response = self.client.post(&url).json(entries).send().await?;

        self.handle_empty_response(response).await
    }
}

fn decode_stream<S, B>(bytes: S) -> LogStream
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    let state = (Box::pin(bytes), NdjsonDecoder::default(), false);

    Box::pin(futures::stream::unfold(
        state,
        |(mut bytes, mut decoder, mut done)| async move {
            loop {
                if let Some(item) = decoder.next_item() {
                    return Some((item, (bytes, decoder, done)));
                }
                if done {
                    return decoder
                        .finish()
                        .map(|item| (item, (bytes, NdjsonDecoder::default(), true)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => decoder.push(chunk.as_ref()),
                    Some(Err(e)) => return Some((Err(e.into()), (bytes, decoder, true))),
                    None => done = true,
                }
            }
        },
    ))
}

/// Incremental decoder for newline-delimited JSON log chunks
///
/// Network reads do not line up with record boundaries, so partial lines are
/// held until their newline arrives.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    /// Feed raw bytes from the wire
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Next complete record, if one is buffered
    pub fn next_item(&mut self) -> Option<Result<StreamLogsResponse>> {
        loop {
            let newline = self.buffer.iter().position(|b| *b == b'\n')?;
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(item) = parse_line(&line[..newline]) {
                return Some(item);
            }
        }
    }

    /// Decode whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<Result<StreamLogsResponse>> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(line: &[u8]) -> Option<Result<StreamLogsResponse>> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        serde_json::from_slice(trimmed)
            .map_err(|e| ClientError::ParseError(format!("Invalid log chunk: {}", e))),
    )
}
