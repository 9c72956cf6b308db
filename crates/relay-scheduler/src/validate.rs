//! Load-time validation of condition references.

use relay_core::condition::Condition;
use relay_core::error::ConfigError;
use relay_core::pipeline::{JobDefinition, PipelineDefinition};
use relay_core::run::JobStatus;
use std::collections::HashSet;

/// Validate every job and step condition in a pipeline, plus step id
/// uniqueness, job output declarations and the credentials actions consume.
pub fn validate_pipeline(pipeline: &PipelineDefinition) -> Result<(), ConfigError> {
    for job in &pipeline.jobs {
        let mut step_ids = HashSet::new();
        for step in &job.steps {
            if !step_ids.insert(step.id.as_str()) {
                return Err(ConfigError::DuplicateStep {
                    job: job.id.to_string(),
                    step: step.id.to_string(),
                });
            }
        }

        for step in &job.steps {
            if let Some(credential) = step.required_credential()
                && !step.credentials.iter().any(|c| c.as_str() == credential)
            {
                return Err(ConfigError::UnlistedCredential {
                    job: job.id.to_string(),
                    step: step.id.to_string(),
                    credential: credential.to_string(),
                });
            }
        }

        for output in &job.outputs {
            if !job.steps.iter().any(|s| s.outputs.contains(output)) {
                return Err(ConfigError::InvalidDefinition(format!(
                    "job '{}' exports output '{}' that no step declares",
                    job.id, output
                )));
            }
        }

        if let Some(condition) = &job.condition {
            let location = format!("job '{}'", job.id);
            check_condition(condition, pipeline, job, None, &location)?;
        }

        for (position, step) in job.steps.iter().enumerate() {
            if let Some(condition) = &step.condition {
                let location = format!("step '{}' of job '{}'", step.id, job.id);
                check_condition(condition, pipeline, job, Some(position), &location)?;
            }
        }
    }
    Ok(())
}

/// `step_position` is `Some` for step conditions: only steps before it may
/// be referenced.
fn check_condition(
    condition: &Condition,
    pipeline: &PipelineDefinition,
    job: &JobDefinition,
    step_position: Option<usize>,
    location: &str,
) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidCondition {
        location: location.to_string(),
        reason,
    };

    let mut result = Ok(());
    condition.visit(&mut |c| {
        if result.is_err() {
            return;
        }
        result = match c {
            Condition::Equals(m) | Condition::NotEquals(m) => {
                check_upstream_job(&m.job, job, location).and_then(|_| {
                    let declared = pipeline
                        .job(&m.job)
                        .is_some_and(|upstream| upstream.declares_output(&m.output));
                    if declared {
                        Ok(())
                    } else {
                        Err(invalid(format!(
                            "job '{}' does not declare output '{}'",
                            m.job, m.output
                        )))
                    }
                })
            }
            Condition::Status(m) => check_upstream_job(&m.job, job, location).and_then(|_| {
                if matches!(m.is, JobStatus::Succeeded | JobStatus::Skipped) {
                    Ok(())
                } else {
                    Err(invalid(format!(
                        "status of '{}' can only be tested for succeeded or skipped, not {}",
                        m.job, m.is
                    )))
                }
            }),
            Condition::StepEquals(m) => match step_position {
                None => Err(invalid(
                    "step_equals is only valid on step conditions".to_string(),
                )),
                Some(position) => {
                    let earlier = job.steps[..position]
                        .iter()
                        .find(|s| s.id.as_str() == m.step);
                    match earlier {
                        None => Err(invalid(format!(
                            "step '{}' is not an earlier step of job '{}'",
                            m.step, job.id
                        ))),
                        Some(step) if !step.outputs.contains(&m.output) => Err(invalid(format!(
                            "step '{}' does not declare output '{}'",
                            m.step, m.output
                        ))),
                        Some(_) => Ok(()),
                    }
                }
            },
            Condition::Always | Condition::All(_) | Condition::Any(_) | Condition::Not(_) => Ok(()),
        };
    });
    result
}

fn check_upstream_job(name: &str, job: &JobDefinition, location: &str) -> Result<(), ConfigError> {
    if job.needs.iter().any(|n| n.as_str() == name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidCondition {
            location: location.to_string(),
            reason: format!("job '{}' is not listed in needs", name),
        })
    }
}
