//! Long-lived event loop for `relay listen`.
//!
//! Reads one JSON message per line and writes one JSON run report per line
//! as dispatches finish:
//!
//! ```text
//! {"type": "push", "ref": "refs/heads/main", "sha": "4f2a9c1"}
//! {"type": "pull_request", "ref": "refs/pull/7/merge", "repository": "fork/widget"}
//! {"type": "cancel", "ref": "refs/heads/main", "reason": "operator abort"}
//! ```
//!
//! Events for a ref supersede the dispatch still running for it.

use crate::handlers::HandlerResult;
use relay_core::trigger::RawEvent;
use relay_scheduler::{Dispatcher, RunReport};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const DEFAULT_ACTOR: &str = "listener";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Message {
    Push(EventMessage),
    PullRequest(EventMessage),
    Cancel(CancelMessage),
}

#[derive(Debug, Deserialize)]
struct EventMessage {
    #[serde(rename = "ref")]
    git_ref: String,
    repository: Option<String>,
    sha: Option<String>,
    actor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancelMessage {
    #[serde(rename = "ref")]
    git_ref: String,
    repository: Option<String>,
    #[serde(default = "default_cancel_reason")]
    reason: String,
}

fn default_cancel_reason() -> String {
    "cancelled by request".to_string()
}

pub struct Listener {
    dispatcher: Arc<Dispatcher>,
    default_repository: String,
}

impl Listener {
    pub fn new(dispatcher: Arc<Dispatcher>, default_repository: impl Into<String>) -> Self {
        Self {
            dispatcher,
            default_repository: default_repository.into(),
        }
    }

    /// Serve messages from `input` until it closes or `shutdown` resolves,
    /// then wait for the dispatches still running. Shutdown cancels them.
    ///
    /// Returns every report written to `output`, in completion order.
    pub async fn serve<R, W>(
        &self,
        input: R,
        mut output: W,
        shutdown: impl Future<Output = ()>,
    ) -> HandlerResult<Vec<RunReport>>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        let mut running: JoinSet<RunReport> = JoinSet::new();
        let mut reports = Vec::new();
        let mut open = true;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                line = lines.next_line(), if open => match line? {
                    Some(line) => self.handle(&line, &mut running).await,
                    None => {
                        debug!(running = running.len(), "Input closed");
                        open = false;
                    }
                },
                _ = &mut shutdown, if open => {
                    warn!("Interrupted, cancelling");
                    self.dispatcher.cancel_all("interrupted").await;
                    open = false;
                }
                Some(joined) = running.join_next(), if !running.is_empty() => match joined {
                    Ok(report) => {
                        let mut line = serde_json::to_string(&report)?;
                        line.push('\n');
                        output.write_all(line.as_bytes()).await?;
                        output.flush().await?;
                        reports.push(report);
                    }
                    Err(e) => warn!(error = %e, "Dispatch task failed"),
                },
                else => break,
            }
        }

        Ok(reports)
    }

    /// Admit an event before spawning its run so supersede order follows
    /// input order.
    async fn handle(&self, line: &str, running: &mut JoinSet<RunReport>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let message: Message = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed message");
                return;
            }
        };

        let raw = match message {
            Message::Push(event) => self.raw_event(event, |r, repo| RawEvent::push(r, repo)),
            Message::PullRequest(event) => {
                self.raw_event(event, |r, repo| RawEvent::pull_request(r, repo))
            }
            Message::Cancel(cancel) => {
                let repository = cancel
                    .repository
                    .as_deref()
                    .unwrap_or(&self.default_repository);
                let found = self
                    .dispatcher
                    .cancel_ref(repository, &cancel.git_ref, &cancel.reason)
                    .await;
                if !found {
                    info!(git_ref = %cancel.git_ref, "Nothing running to cancel");
                }
                return;
            }
        };

        let admission = self.dispatcher.admit(raw).await;
        let dispatcher = self.dispatcher.clone();
        running.spawn(async move { dispatcher.execute(admission).await.report() });
    }

    fn raw_event(&self, event: EventMessage, make: fn(String, String) -> RawEvent) -> RawEvent {
        let repository = event
            .repository
            .unwrap_or_else(|| self.default_repository.clone());
        let mut raw = make(event.git_ref, repository)
            .with_actor(event.actor.unwrap_or_else(|| DEFAULT_ACTOR.to_string()));
        if let Some(sha) = event.sha {
            raw = raw.with_sha(sha);
        }
        raw
    }
}
