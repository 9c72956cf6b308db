//! Scriptable fake actions.
//!
//! A [`FakeAction`] stands in for one action kind. It counts its calls,
//! records what each call saw (job, step, credentials) and answers with a
//! scripted [`Behavior`], per step id or by default.

use async_trait::async_trait;
use relay_core::pipeline::ActionKind;
use relay_core::run::Outputs;
use relay_core::{Error, Result};
use relay_runner::{OutputLine, OutputStream, StepContext, StepResult, StepRunner};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// How a fake action answers.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Exit 0 with these outputs.
    Succeed(Outputs),
    /// Exit with this non-zero code.
    Fail(i32),
    /// Return an action error.
    Error(String),
    /// Never finish; only cancellation or a timeout ends the step.
    Hang,
    /// Succeed after a delay.
    Delay(Duration),
}

/// What one call observed.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub job: String,
    pub step: String,
    pub git_ref: String,
    /// Credentials in the step environment, by variable name.
    pub secrets: BTreeMap<String, String>,
}

pub struct FakeAction {
    kind: ActionKind,
    default: Behavior,
    first_call: Option<Behavior>,
    per_step: HashMap<String, Behavior>,
    calls: AtomicUsize,
    invocations: Mutex<Vec<Invocation>>,
}

impl FakeAction {
    /// A fake that succeeds without outputs.
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            default: Behavior::Succeed(Outputs::new()),
            first_call: None,
            per_step: HashMap::new(),
            calls: AtomicUsize::new(0),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Default behavior for every step.
    pub fn behave(mut self, behavior: Behavior) -> Self {
        self.default = behavior;
        self
    }

    /// Behavior for one step id, overriding the default.
    pub fn on_step(mut self, step: &str, behavior: Behavior) -> Self {
        self.per_step.insert(step.to_string(), behavior);
        self
    }

    /// Behavior for the very first call only.
    pub fn first_call(mut self, behavior: Behavior) -> Self {
        self.first_call = Some(behavior);
        self
    }

    /// Shorthand for succeeding with the given outputs.
    pub fn outputs<K, V>(self, outputs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<relay_core::run::OutputValue>,
    {
        let outputs = outputs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.behave(Behavior::Succeed(outputs))
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Calls made for a given job.
    pub fn calls_for(&self, job: &str) -> usize {
        self.invocations().iter().filter(|i| i.job == job).count()
    }
}

#[async_trait]
impl StepRunner for FakeAction {
    async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.invocations.lock() {
            calls.push(Invocation {
                job: ctx.job_id.to_string(),
                step: ctx.step.id.to_string(),
                git_ref: ctx.git_ref.clone(),
                secrets: ctx.secrets.clone().into_iter().collect(),
            });
        }

        let _ = output_tx
            .send(OutputLine {
                stream: OutputStream::Stdout,
                content: format!("fake {} {}", self.kind, ctx.step.id),
                line_number: 1,
                timestamp: chrono::Utc::now(),
            })
            .await;

        let behavior = match (&self.first_call, call) {
            (Some(first), 0) => first.clone(),
            _ => self
                .per_step
                .get(ctx.step.id.as_str())
                .unwrap_or(&self.default)
                .clone(),
        };
        match behavior {
            Behavior::Succeed(outputs) => Ok(StepResult::success(outputs)),
            Behavior::Fail(code) => Ok(StepResult::failure(code)),
            Behavior::Error(message) => Err(Error::InvalidInput(message)),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Ok(StepResult::success(Outputs::new()))
            }
            Behavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(StepResult::success(Outputs::new()))
            }
        }
    }

    fn kind(&self) -> ActionKind {
        self.kind
    }
}
