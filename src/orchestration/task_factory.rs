//! # Task Factory
//!
//! Expands a process description into its ordered task list. Building is
//! pure: no I/O, no clock, and task ids are derived from the process id and
//! order index, so the same process always yields the same tasks.
//!
//! Emission order:
//!
//! 1. `ENV_SETUP`
//! 2. one `INPUT_STAGING` per input value that lives in a file
//! 3. `JOB_SUBMISSION`
//! 4. batch submissions only: one `INTERMEDIATE_STAGING` per streaming
//!    output, then `MONITOR`
//! 5. one `OUTPUT_STAGING` per declared output
//! 6. `CLEANUP`

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{params, DataObject, DataType, ProcessSpec, TaskSpec, TaskType};

#[derive(Debug, Default, Clone, Copy)]
pub struct TaskFactory;

impl TaskFactory {
    pub fn build_task_specs(spec: &ProcessSpec) -> Vec<TaskSpec> {
        let mut builder = Builder::new(&spec.process_id);

        builder.push(TaskType::EnvSetup, Vec::new());

        for input in spec.inputs.iter().filter(|i| i.data_type.requires_movement()) {
            for value in input.values() {
                builder.push(
                    TaskType::InputStaging,
                    vec![
                        (params::DATA_NAME, input.name.clone()),
                        (params::SOURCE, value.clone()),
                        (params::DESTINATION, spec.staged_path(&value)),
                    ],
                );
            }
        }

        builder.push(TaskType::JobSubmission, Vec::new());

        if spec.is_asynchronous_submission() {
            for output in spec.outputs.iter().filter(|o| o.streaming) {
                let mut parameters = output_parameters(spec, output);
                parameters.push((params::OPTIONAL, "true".to_string()));
                builder.push(TaskType::IntermediateStaging, parameters);
            }
            builder.push(TaskType::Monitor, Vec::new());
        }

        for output in &spec.outputs {
            builder.push(TaskType::OutputStaging, output_parameters(spec, output));
        }

        builder.push(TaskType::Cleanup, Vec::new());

        builder.finish()
    }

    /// Order indices must be unique, contiguous from 0, owned by the process,
    /// and include exactly one JOB_SUBMISSION
    pub fn verify_task_order(process_id: &str, specs: &[TaskSpec]) -> OrchestratorResult<()> {
        if specs.is_empty() {
            return Err(OrchestratorError::invariant(format!(
                "process {process_id} has no tasks"
            )));
        }

        let mut seen = vec![false; specs.len()];
        for task in specs {
            if task.process_id != process_id {
                return Err(OrchestratorError::invariant(format!(
                    "task {} belongs to process {}, not {process_id}",
                    task.task_id, task.process_id
                )));
            }
            let index = task.order_index as usize;
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(OrchestratorError::invariant(format!(
                        "duplicate order index {index} in process {process_id}"
                    )))
                }
                None => {
                    return Err(OrchestratorError::invariant(format!(
                        "order index {index} leaves a gap in process {process_id}"
                    )))
                }
            }
        }

        let submissions = specs
            .iter()
            .filter(|t| t.task_type == TaskType::JobSubmission)
            .count();
        if submissions != 1 {
            return Err(OrchestratorError::invariant(format!(
                "process {process_id} has {submissions} JOB_SUBMISSION tasks"
            )));
        }

        Ok(())
    }
}

pub fn build_task_specs(spec: &ProcessSpec) -> Vec<TaskSpec> {
    TaskFactory::build_task_specs(spec)
}

/// Remote source and gateway destination of an output; values that are not
/// files carry no paths
fn output_parameters(spec: &ProcessSpec, output: &DataObject) -> Vec<(&'static str, String)> {
    let source = match output.data_type {
        DataType::Stdout => Some(spec.stdout_path()),
        DataType::Stderr => Some(spec.stderr_path()),
        DataType::Uri | DataType::UriCollection => Some(
            output
                .value
                .as_deref()
                .map(|v| spec.remote_path(v))
                .unwrap_or_else(|| spec.remote_path(&output.name)),
        ),
        DataType::String | DataType::Integer | DataType::Float => None,
    };

    let mut parameters = vec![(params::DATA_NAME, output.name.clone())];
    if let Some(source) = source {
        let file_name = source.rsplit('/').next().unwrap_or(&source).to_string();
        let destination = format!(
            "{}/{}",
            spec.storage_directory.trim_end_matches('/'),
            file_name
        );
        parameters.push((params::SOURCE, source));
        parameters.push((params::DESTINATION, destination));
    }
    parameters
}

struct Builder<'a> {
    process_id: &'a str,
    tasks: Vec<TaskSpec>,
}

impl<'a> Builder<'a> {
    fn new(process_id: &'a str) -> Self {
        Self {
            process_id,
            tasks: Vec::new(),
        }
    }

    fn push(&mut self, task_type: TaskType, parameters: Vec<(&'static str, String)>) {
        let order_index = self.tasks.len() as u32;
        let task = parameters.into_iter().fold(
            TaskSpec::new(self.process_id, task_type, order_index),
            |task, (key, value)| task.with_parameter(key, value),
        );
        self.tasks.push(task);
    }

    fn finish(self) -> Vec<TaskSpec> {
        self.tasks
    }
}
