//! In-memory stand-in for the chat service, for exercising the client
//! end to end. Streams canned answers one character at a time over SSE and
//! keeps per-session history for the lifetime of the process.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DONE_SENTINEL: &str = "[DONE]";
const FRAGMENT_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

type Store = Arc<Mutex<HashMap<String, Vec<Message>>>>;

#[derive(Deserialize)]
struct HistoryParams {
    session_id: String,
}

#[derive(Deserialize)]
struct StreamParams {
    session_id: String,
    question: String,
}

fn canned_answer(question: &str) -> String {
    let lowered = question.to_lowercase();
    if lowered.contains("hello") || lowered.contains("hi") {
        "Hello! Happy to help - ask me anything and I will do my best to answer.".to_string()
    } else if lowered.contains("context") || lowered.contains("multi-turn") {
        "Multi-turn conversation works by keeping earlier exchanges around as context, \
         so follow-up questions can refer back to them."
            .to_string()
    } else if lowered.contains("stream") {
        "Streaming output returns the answer piece by piece instead of all at once, \
         which makes the interface feel much more responsive."
            .to_string()
    } else {
        format!(
            "You asked: \"{question}\". This is a canned reply, streamed character by \
             character to demonstrate incremental output."
        )
    }
}

async fn get_history(
    State(store): State<Store>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<Message>> {
    let store = store.lock().await;
    Json(store.get(&params.session_id).cloned().unwrap_or_default())
}

async fn chat_stream(
    State(store): State<Store>,
    Query(params): Query<StreamParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let answer = canned_answer(&params.question);
    let session_id = params.session_id;

    {
        let mut store = store.lock().await;
        store.entry(session_id.clone()).or_default().push(Message {
            role: "user".to_string(),
            content: params.question,
        });
    }

    info!(%session_id, "streaming {} characters", answer.chars().count());

    // One SSE event per character, sentinel last; the full reply lands in the
    // session history only after the stream has drained.
    let chars = answer.chars().collect::<Vec<char>>().into_iter();
    let events = stream::unfold(Some(chars), move |state| {
        let store = store.clone();
        let session_id = session_id.clone();
        let answer = answer.clone();
        async move {
            let mut chars = state?;
            match chars.next() {
                Some(c) => {
                    tokio::time::sleep(FRAGMENT_DELAY).await;
                    Some((Ok(Event::default().data(c.to_string())), Some(chars)))
                }
                None => {
                    store.lock().await.entry(session_id).or_default().push(Message {
                        role: "assistant".to_string(),
                        content: answer,
                    });
                    Some((Ok(Event::default().data(DONE_SENTINEL)), None))
                }
            }
        }
    });

    Sse::new(events)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store: Store = Arc::new(Mutex::new(HashMap::new()));
    let app = Router::new()
        .route("/api/chat/history", get(get_history))
        .route("/api/chat/stream", get(chat_stream))
        .with_state(store);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
    info!("mock chat server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
