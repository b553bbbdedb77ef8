use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::{Client, Response};

use crate::app::Message;
use crate::session::SessionId;
use crate::sse::SseDecoder;

/// End-of-stream marker sent as an ordinary event payload.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One event observed on an open answer stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A literal fragment of the answer, to be appended in arrival order.
    Fragment(String),
    /// The sentinel was received; the stream is finished and must be dropped.
    Done,
}

#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the stored conversation for this session, oldest first.
    pub async fn history(&self, session: &SessionId) -> Result<Vec<Message>> {
        let url = format!("{}/api/chat/history", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("session_id", session.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "history request failed with status: {}",
                response.status()
            ));
        }

        let body = response.text().await?;
        parse_history(&body)
    }

    /// Open the server-push channel for one question.
    ///
    /// Succeeding here only means the channel is open; fragments, the sentinel
    /// and transport errors all arrive through the returned stream.
    pub async fn open_stream(&self, session: &SessionId, question: &str) -> Result<AnswerStream> {
        let url = format!("{}/api/chat/stream", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("session_id", session.as_str()), ("question", question)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "stream request failed with status: {}",
                response.status()
            ));
        }

        Ok(AnswerStream::new(response))
    }
}

/// The history payload must be an ordered list of `{role, content}` records;
/// anything else is surfaced as an error rather than guessed at.
pub fn parse_history(body: &str) -> Result<Vec<Message>> {
    serde_json::from_str(body).map_err(|err| anyhow!("history payload is not a message list: {err}"))
}

/// A single answer subscription: a finite sequence of text events terminated
/// by the sentinel or a transport error. Dropping it closes the connection.
pub struct AnswerStream {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl AnswerStream {
    fn new(response: Response) -> Self {
        Self {
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Next event in arrival order. Returns `Ok(None)` only after the stream
    /// already finished; connection loss before the sentinel is an error.
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        loop {
            if let Some(data) = self.pending.pop_front() {
                if data == DONE_SENTINEL {
                    self.finished = true;
                    self.pending.clear();
                    return Ok(Some(StreamEvent::Done));
                }
                return Ok(Some(StreamEvent::Fragment(data)));
            }

            if self.finished {
                return Ok(None);
            }

            match self.body.next().await {
                Some(Ok(chunk)) => {
                    self.pending.extend(self.decoder.feed(&chunk));
                }
                Some(Err(err)) => {
                    self.finished = true;
                    return Err(err.into());
                }
                None => {
                    self.finished = true;
                    return Err(anyhow!("stream closed before end-of-stream marker"));
                }
            }
        }
    }
}
