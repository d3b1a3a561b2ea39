use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::endpoint::Endpoint;
use crate::error::{DriverError, OperationError};
use crate::listener::WorkloadEventListener;
use crate::metrics::{GroupOutcome, GroupStatus, LatencyRecorder, RunSummary, TeardownFailure};
use crate::operation::{Operation, OperationGroup};
use crate::validator::Validator;
use crate::workload::Workload;

/// Log target executed operations are mirrored to when a workload asks for it.
pub const OPERATIONS_LOG_TARGET: &str = "iodriver::operations";

/// Runs one workload against one endpoint.
///
/// Order of a run: setup (sequential), all groups (concurrently, one task
/// each), teardown (sequential, always), `finished()` on the listener, then
/// validation.
pub struct Driver {
    endpoint: Arc<dyn Endpoint>,
    workload: Arc<dyn Workload>,
    listener: Arc<dyn WorkloadEventListener>,
    validator: Box<dyn Validator>,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("endpoint", &self.endpoint.name())
            .field("workload", &self.workload.name())
            .field("validator", &self.validator.name())
            .finish()
    }
}

impl Driver {
    /// Fails with [`DriverError::EndpointMismatch`] when the endpoint lacks a
    /// capability the workload requires. Nothing has executed at that point.
    pub fn new(
        endpoint: Arc<dyn Endpoint>,
        workload: Arc<dyn Workload>,
        listener: Arc<dyn WorkloadEventListener>,
        validator: Box<dyn Validator>,
    ) -> Result<Self, DriverError> {
        let required = workload.required_capabilities();
        let available = endpoint.capabilities();
        if !available.satisfies(&required) {
            return Err(DriverError::EndpointMismatch {
                endpoint: endpoint.name().to_string(),
                workload: workload.name().to_string(),
                required,
                available,
            });
        }
        Ok(Self {
            endpoint,
            workload,
            listener,
            validator,
        })
    }

    pub fn listener(&self) -> &Arc<dyn WorkloadEventListener> {
        &self.listener
    }

    pub async fn run(&self) -> Result<RunSummary, DriverError> {
        let started_at = Utc::now();
        let t0 = Instant::now();
        let log_ops = self.workload.log_operations();
        let mut overall = LatencyRecorder::new();
        let mut executed: u64 = 0;

        info!(
            workload = self.workload.name(),
            endpoint = self.endpoint.name(),
            "running setup"
        );
        if let Err((operation, source)) = self.run_setup(log_ops, &mut overall, &mut executed).await
        {
            warn!(operation = %operation, error = %source, "setup failed");
            self.run_teardown(log_ops).await;
            self.listener.finished();
            return Err(DriverError::Setup {
                workload: self.workload.name().to_string(),
                operation,
                source,
            });
        }

        let groups = self.workload.create_operations();
        info!(groups = groups.len(), "starting operation groups");
        let mut set = JoinSet::new();
        let mut group_of_task = HashMap::with_capacity(groups.len());
        for (index, group) in groups.into_iter().enumerate() {
            let endpoint = self.endpoint.clone();
            let listener = self.listener.clone();
            let handle =
                set.spawn(async move { run_group(index, group, endpoint, listener, log_ops).await });
            group_of_task.insert(handle.id(), index);
        }

        let mut outcomes = Vec::new();
        while let Some(res) = set.join_next_with_id().await {
            match res {
                Ok((_, run)) => {
                    overall.merge(&run.recorder);
                    executed += run.outcome.operations_executed;
                    outcomes.push(run.outcome);
                }
                Err(e) => {
                    let index = group_of_task.get(&e.id()).copied().unwrap_or(usize::MAX);
                    warn!(group = index, error = %e, "operation group task aborted");
                    outcomes.push(GroupOutcome {
                        index,
                        operations_executed: 0,
                        status: GroupStatus::Failed {
                            operation: "<task>".to_string(),
                            error: e.to_string(),
                        },
                    });
                }
            }
        }
        outcomes.sort_by_key(|o| o.index);

        info!("running teardown");
        let teardown_failures = self.run_teardown(log_ops).await;
        self.listener.finished();

        let validation = self.validator.validate(self.listener.as_ref());
        let volumes = self
            .listener
            .get_volumes()
            .into_iter()
            .filter_map(|name| self.listener.get_stats(&name).ok())
            .collect();

        let summary = RunSummary {
            workload: self.workload.name().to_string(),
            endpoint: self.endpoint.name().to_string(),
            started_at,
            duration: t0.elapsed(),
            operations_executed: executed,
            groups: outcomes,
            teardown_failures,
            latency: overall.to_stats(),
            volumes,
            validation,
            results: self.workload.results(),
        };
        info!(
            operations = summary.operations_executed,
            groups_failed = summary.groups_failed(),
            passed = summary.validation.passed,
            "run finished"
        );
        Ok(summary)
    }

    async fn run_setup(
        &self,
        log_ops: bool,
        recorder: &mut LatencyRecorder,
        executed: &mut u64,
    ) -> Result<(), (String, OperationError)> {
        for op in self.workload.create_setup() {
            execute_one(
                op.as_ref(),
                self.endpoint.as_ref(),
                self.listener.as_ref(),
                log_ops,
                recorder,
            )
            .await
            .map_err(|e| (op.description(), e))?;
            *executed += 1;
        }
        Ok(())
    }

    async fn run_teardown(&self, log_ops: bool) -> Vec<TeardownFailure> {
        let mut recorder = LatencyRecorder::new();
        let mut failures = Vec::new();
        for op in self.workload.create_teardown() {
            if let Err(e) = execute_one(
                op.as_ref(),
                self.endpoint.as_ref(),
                self.listener.as_ref(),
                log_ops,
                &mut recorder,
            )
            .await
            {
                warn!(operation = %op.description(), error = %e, "teardown step failed");
                failures.push(TeardownFailure {
                    operation: op.description(),
                    error: e.to_string(),
                });
            }
        }
        failures
    }
}

struct GroupRun {
    outcome: GroupOutcome,
    recorder: LatencyRecorder,
}

async fn run_group(
    index: usize,
    group: OperationGroup,
    endpoint: Arc<dyn Endpoint>,
    listener: Arc<dyn WorkloadEventListener>,
    log_ops: bool,
) -> GroupRun {
    let mut recorder = LatencyRecorder::new();
    let mut operations_executed = 0;
    for op in &group {
        match execute_one(
            op.as_ref(),
            endpoint.as_ref(),
            listener.as_ref(),
            log_ops,
            &mut recorder,
        )
        .await
        {
            Ok(()) => operations_executed += 1,
            Err(e) => {
                warn!(group = index, operation = %op.description(), error = %e, "operation group failed");
                return GroupRun {
                    outcome: GroupOutcome {
                        index,
                        operations_executed,
                        status: GroupStatus::Failed {
                            operation: op.description(),
                            error: e.to_string(),
                        },
                    },
                    recorder,
                };
            }
        }
    }
    debug!(group = index, operations = operations_executed, "operation group completed");
    GroupRun {
        outcome: GroupOutcome {
            index,
            operations_executed,
            status: GroupStatus::Completed,
        },
        recorder,
    }
}

async fn execute_one(
    op: &dyn Operation,
    endpoint: &dyn Endpoint,
    listener: &dyn WorkloadEventListener,
    log_ops: bool,
    recorder: &mut LatencyRecorder,
) -> Result<(), OperationError> {
    let t0 = Instant::now();
    op.execute(endpoint, listener).await?;
    let dt = t0.elapsed();
    recorder.record(dt);

    let description = op.description();
    listener.report_operation_execution(&description);
    if log_ops {
        info!(
            target: OPERATIONS_LOG_TARGET,
            operation = %description,
            latency_us = dt.as_micros() as u64,
            "operation executed"
        );
    }
    Ok(())
}
