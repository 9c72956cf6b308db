//! Typed job and step conditions.
//!
//! Conditions are structured predicates over upstream job outputs, upstream
//! job statuses and earlier step outputs. They are written in YAML as
//! externally tagged values:
//!
//! ```yaml
//! if:
//!   all:
//!     - equals: { job: release, output: release_created, value: true }
//!     - status: { job: test, is: succeeded }
//! ```

use crate::run::{JobStatus, OutputValue};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Always,
    Equals(OutputMatch),
    NotEquals(OutputMatch),
    StepEquals(StepOutputMatch),
    Status(StatusMatch),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutputMatch {
    pub job: String,
    pub output: String,
    pub value: OutputValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StepOutputMatch {
    pub step: String,
    pub output: String,
    pub value: OutputValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatusMatch {
    pub job: String,
    pub is: JobStatus,
}

/// What a condition can observe while it is evaluated.
pub trait ConditionContext {
    fn job_output(&self, job: &str, output: &str) -> Option<&OutputValue>;
    fn job_status(&self, job: &str) -> Option<JobStatus>;
    fn step_output(&self, step: &str, output: &str) -> Option<&OutputValue>;
}

impl Condition {
    pub fn equals(job: &str, output: &str, value: impl Into<OutputValue>) -> Self {
        Condition::Equals(OutputMatch {
            job: job.to_string(),
            output: output.to_string(),
            value: value.into(),
        })
    }

    pub fn status(job: &str, is: JobStatus) -> Self {
        Condition::Status(StatusMatch {
            job: job.to_string(),
            is,
        })
    }

    /// Evaluate against the given context.
    ///
    /// A missing output never equals anything.
    pub fn evaluate(&self, ctx: &dyn ConditionContext) -> bool {
        match self {
            Condition::Always => true,
            Condition::Equals(m) => ctx.job_output(&m.job, &m.output) == Some(&m.value),
            Condition::NotEquals(m) => ctx.job_output(&m.job, &m.output) != Some(&m.value),
            Condition::StepEquals(m) => ctx.step_output(&m.step, &m.output) == Some(&m.value),
            Condition::Status(m) => ctx.job_status(&m.job) == Some(m.is),
            Condition::All(items) => items.iter().all(|c| c.evaluate(ctx)),
            Condition::Any(items) => items.iter().any(|c| c.evaluate(ctx)),
            Condition::Not(inner) => !inner.evaluate(ctx),
        }
    }

    /// Whether this condition explicitly tests the status of `job`.
    pub fn tests_status_of(&self, job: &str) -> bool {
        let mut found = false;
        self.visit(&mut |c| {
            if let Condition::Status(m) = c
                && m.job == job
            {
                found = true;
            }
        });
        found
    }

    /// Depth-first walk over this condition and every nested one.
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Condition)) {
        f(self);
        match self {
            Condition::All(items) | Condition::Any(items) => {
                for item in items {
                    item.visit(f);
                }
            }
            Condition::Not(inner) => inner.visit(f),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Ctx {
        outputs: HashMap<(String, String), OutputValue>,
        statuses: HashMap<String, JobStatus>,
        steps: HashMap<(String, String), OutputValue>,
    }

    impl ConditionContext for Ctx {
        fn job_output(&self, job: &str, output: &str) -> Option<&OutputValue> {
            self.outputs.get(&(job.to_string(), output.to_string()))
        }

        fn job_status(&self, job: &str) -> Option<JobStatus> {
            self.statuses.get(job).copied()
        }

        fn step_output(&self, step: &str, output: &str) -> Option<&OutputValue> {
            self.steps.get(&(step.to_string(), output.to_string()))
        }
    }

    #[test]
    fn test_equals_on_bool_output() {
        let mut ctx = Ctx::default();
        ctx.outputs.insert(
            ("release".into(), "release_created".into()),
            OutputValue::Bool(false),
        );
        let cond = Condition::equals("release", "release_created", true);
        assert!(!cond.evaluate(&ctx));

        ctx.outputs.insert(
            ("release".into(), "release_created".into()),
            OutputValue::Bool(true),
        );
        assert!(cond.evaluate(&ctx));
    }

    #[test]
    fn test_missing_output_is_not_equal() {
        let ctx = Ctx::default();
        assert!(!Condition::equals("release", "release_created", true).evaluate(&ctx));
        let ne = Condition::NotEquals(OutputMatch {
            job: "release".into(),
            output: "release_created".into(),
            value: OutputValue::Bool(true),
        });
        assert!(ne.evaluate(&ctx));
    }

    #[test]
    fn test_combinators_and_status_tests() {
        let mut ctx = Ctx::default();
        ctx.statuses.insert("lint".into(), JobStatus::Skipped);
        let cond = Condition::Any(vec![
            Condition::status("lint", JobStatus::Skipped),
            Condition::Not(Box::new(Condition::equals("test", "ok", true))),
        ]);
        assert!(cond.evaluate(&ctx));
        assert!(cond.tests_status_of("lint"));
        assert!(!cond.tests_status_of("test"));
    }

    #[test]
    fn test_yaml_shape() {
        let yaml = r#"
all:
  - equals: { job: release, output: release_created, value: true }
  - step_equals: { step: detect, output: count, value: 3 }
  - not: always
"#;
        let cond: Condition = serde_yaml::from_str(yaml).unwrap();
        let Condition::All(items) = &cond else {
            panic!("expected all");
        };
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Condition::equals("release", "release_created", true));
        match &items[1] {
            Condition::StepEquals(m) => assert_eq!(m.value, OutputValue::Integer(3)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
