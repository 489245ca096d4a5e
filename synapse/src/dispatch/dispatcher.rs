//! Execution Dispatcher

use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinError;
use tracing::{debug, warn};

use super::{DispatchError, DispatcherConfig, ExecutionFailure, ExecutionOutcome, Result};
use crate::agents::{AgentId, AgentStore};
use crate::handlers::{Handler, HandlerRegistry, Operation};
use crate::performance::{ExecutionRecord, PerformanceAggregator};

/// Validates, resolves, invokes and records operation executions
pub struct ExecutionDispatcher {
    store: Arc<AgentStore>,
    registry: Arc<HandlerRegistry>,
    performance: Arc<PerformanceAggregator>,
    config: DispatcherConfig,
    agent_locks: DashMap<AgentId, Arc<AsyncMutex<()>>>,
}

impl ExecutionDispatcher {
    pub fn new(
        store: Arc<AgentStore>,
        registry: Arc<HandlerRegistry>,
        performance: Arc<PerformanceAggregator>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            registry,
            performance,
            config,
            agent_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Execute `operation` on an agent addressed through `declared_type`.
    ///
    /// Rejections before the handler stage return `Err` and leave no
    /// record. Once the handler is invoked the outcome, failed or not, is
    /// returned as `Ok` together with its sealed record.
    pub async fn execute(
        &self,
        agent_id: &AgentId,
        declared_type: &str,
        operation: &str,
        data: JsonValue,
    ) -> Result<ExecutionOutcome> {
        let agent = self
            .store
            .get(agent_id)
            .map_err(|_| DispatchError::NotFound(agent_id.to_string()))?;

        if agent.agent_type.as_str() != declared_type {
            return Err(DispatchError::TypeMismatch {
                declared: declared_type.to_string(),
                actual: agent.agent_type,
            });
        }

        let (op, handler) = self
            .registry
            .resolve(agent.agent_type, operation)
            .ok_or_else(|| DispatchError::UnknownOperation {
                agent_type: agent.agent_type,
                operation: operation.to_string(),
            })?;

        if !self.config.readiness.permits(agent.status) {
            return Err(DispatchError::AgentNotReady {
                id: agent_id.to_string(),
                status: agent.status,
            });
        }

        let serial = self
            .config
            .serialize_per_agent
            .then(|| self.agent_locks.entry(agent_id.clone()).or_default().clone());

        let timeout = self.config.timeout_for(op);
        debug!(agent_id = %agent_id, "Dispatching {} (timeout {:?})", op, timeout);

        // The supervisor owns the invocation from here on, so the record is
        // sealed even when the caller stops waiting.
        let invocation = Invocation {
            agent_id: agent_id.clone(),
            op,
            handler,
            data,
            timeout,
            serial,
            performance: Arc::clone(&self.performance),
        };
        let started = Utc::now();
        let clock = Instant::now();
        match tokio::spawn(invocation.run(started, clock)).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Only reachable when the runtime cancels the supervisor
                let failure = ExecutionFailure::Panicked(panic_message(e));
                let record = ExecutionRecord::failure(
                    agent_id.clone(),
                    op.name(),
                    JsonValue::Null,
                    failure.reason(),
                    failure.to_string(),
                    started,
                    clock.elapsed(),
                );
                self.performance.seal(record.clone());
                Ok(ExecutionOutcome {
                    record,
                    result: Err(failure),
                })
            }
        }
    }
}

/// One handler-stage invocation, run on its own task
struct Invocation {
    agent_id: AgentId,
    op: Operation,
    handler: Arc<dyn Handler>,
    data: JsonValue,
    timeout: Duration,
    serial: Option<Arc<AsyncMutex<()>>>,
    performance: Arc<PerformanceAggregator>,
}

impl Invocation {
    async fn run(self, started: DateTime<Utc>, clock: Instant) -> ExecutionOutcome {
        let Invocation {
            agent_id,
            op,
            handler,
            data,
            timeout,
            serial,
            performance,
        } = self;
        let deadline = tokio::time::Instant::from_std(clock) + timeout;
        let input = data.clone();

        // Waiting for the agent's turn counts against the time bound
        let result = match serial {
            Some(lock) => match tokio::time::timeout_at(deadline, lock.lock_owned()).await {
                Ok(guard) => {
                    let result = invoke(handler, data, deadline, timeout).await;
                    drop(guard);
                    result
                }
                Err(_) => Err(ExecutionFailure::Timeout(timeout)),
            },
            None => invoke(handler, data, deadline, timeout).await,
        };
        let duration = clock.elapsed();

        let record = match &result {
            Ok(output) => ExecutionRecord::success(
                agent_id.clone(),
                op.name(),
                input,
                output.clone(),
                started,
                duration,
            ),
            Err(failure) => {
                warn!(agent_id = %agent_id, "{} failed: {}", op, failure);
                ExecutionRecord::failure(
                    agent_id.clone(),
                    op.name(),
                    input,
                    failure.reason(),
                    failure.to_string(),
                    started,
                    duration,
                )
            }
        };
        performance.seal(record.clone());

        debug!(
            agent_id = %agent_id,
            "{} finished in {:?} ({:?})",
            op,
            duration,
            record.status
        );

        ExecutionOutcome { record, result }
    }
}

async fn invoke(
    handler: Arc<dyn Handler>,
    data: JsonValue,
    deadline: tokio::time::Instant,
    timeout: Duration,
) -> std::result::Result<JsonValue, ExecutionFailure> {
    let mut task = tokio::spawn(async move { handler.handle(data).await });
    match tokio::time::timeout_at(deadline, &mut task).await {
        Ok(Ok(Ok(output))) => Ok(output),
        Ok(Ok(Err(e))) => Err(ExecutionFailure::Handler(e)),
        Ok(Err(e)) => Err(ExecutionFailure::Panicked(panic_message(e))),
        Err(_) => {
            task.abort();
            Err(ExecutionFailure::Timeout(timeout))
        }
    }
}

fn panic_message(error: JoinError) -> String {
    if error.is_cancelled() {
        return "handler task was cancelled".to_string();
    }
    let payload = error.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentSpec, AgentStatus, AgentType};
    use crate::dispatch::{FailureReason, ReadinessPolicy};
    use crate::handlers::{from_async_fn, from_fn, HandlerError, ManageOp, Operation};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Fixture {
        store: Arc<AgentStore>,
        performance: Arc<PerformanceAggregator>,
        dispatcher: ExecutionDispatcher,
    }

    fn fixture(registry: HandlerRegistry, config: DispatcherConfig) -> Fixture {
        let store = Arc::new(AgentStore::new());
        let performance = Arc::new(PerformanceAggregator::new());
        let dispatcher = ExecutionDispatcher::new(
            store.clone(),
            Arc::new(registry),
            performance.clone(),
            config,
        );
        Fixture { store, performance, dispatcher }
    }

    fn ready_agent(store: &AgentStore, agent_type: AgentType) -> AgentId {
        let id = store.create(AgentSpec::new("Agent", agent_type)).unwrap().id;
        store
            .transition_status(&id, &[AgentStatus::Created], AgentStatus::Training)
            .unwrap();
        store
            .transition_status(&id, &[AgentStatus::Training], AgentStatus::Ready)
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_successful_execution_is_recorded() {
        let fx = fixture(HandlerRegistry::builtin(), DispatcherConfig::default());
        let id = ready_agent(&fx.store, AgentType::Insights);

        let outcome = fx
            .dispatcher
            .execute(
                &id,
                "insights",
                "generate_dashboard",
                json!({"hospitalId": 1, "dateRange": "last_30_days"}),
            )
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.record.operation, "generate_dashboard");
        assert_eq!(fx.performance.records_for(&id), vec![outcome.record]);
    }

    #[tokio::test]
    async fn test_rejections_leave_no_record() {
        let fx = fixture(HandlerRegistry::builtin(), DispatcherConfig::default());
        let manage = ready_agent(&fx.store, AgentType::Manage);

        let missing = fx
            .dispatcher
            .execute(&AgentId::from_string("nope"), "manage", "digital_checkin", json!({}))
            .await
            .unwrap_err();
        assert_eq!(missing.code(), "NotFound");

        let mismatch = fx
            .dispatcher
            .execute(&manage, "insights", "generate_dashboard", json!({}))
            .await
            .unwrap_err();
        assert_eq!(mismatch.code(), "TypeMismatch");

        let unknown_type = fx
            .dispatcher
            .execute(&manage, "teleport", "digital_checkin", json!({}))
            .await
            .unwrap_err();
        assert_eq!(unknown_type.code(), "TypeMismatch");

        assert_eq!(fx.performance.total_records(), 0);
    }

    #[tokio::test]
    async fn test_unknown_operation_for_every_type() {
        let fx = fixture(HandlerRegistry::builtin(), DispatcherConfig::default());

        for agent_type in AgentType::ALL {
            let id = ready_agent(&fx.store, agent_type);
            let foreign: Vec<Operation> = Operation::all()
                .into_iter()
                .filter(|op| op.agent_type() != agent_type)
                .collect();

            for name in std::iter::once("no_such_operation").chain(foreign.iter().map(|op| op.name())) {
                let err = fx
                    .dispatcher
                    .execute(&id, agent_type.as_str(), name, json!({}))
                    .await
                    .unwrap_err();
                assert_eq!(err.code(), "UnknownOperation", "{} via {}", name, agent_type);
            }
        }
        assert_eq!(fx.performance.total_records(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_operation_is_unknown() {
        let mut registry = HandlerRegistry::builtin();
        registry.unregister(ManageOp::ClassifyTriage);
        let fx = fixture(registry, DispatcherConfig::default());
        let id = ready_agent(&fx.store, AgentType::Manage);

        let err = fx
            .dispatcher
            .execute(&id, "manage", "classify_triage", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownOperation { .. }));
    }

    #[tokio::test]
    async fn test_readiness_policy() {
        let fx = fixture(HandlerRegistry::builtin(), DispatcherConfig::default());
        let id = fx.store.create(AgentSpec::new("Fresh", AgentType::Manage)).unwrap().id;

        let err = fx
            .dispatcher
            .execute(&id, "manage", "predict_wait_time", json!({"queueLength": 3}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AgentNotReady");
        assert_eq!(fx.performance.total_records(), 0);

        let lenient = fixture(
            HandlerRegistry::builtin(),
            DispatcherConfig {
                readiness: ReadinessPolicy::AllowWhileTraining,
                ..Default::default()
            },
        );
        let id = lenient.store.create(AgentSpec::new("Fresh", AgentType::Manage)).unwrap().id;
        let outcome = lenient
            .dispatcher
            .execute(&id, "manage", "predict_wait_time", json!({"queueLength": 3}))
            .await
            .unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_handler_error_is_captured() {
        let fx = fixture(HandlerRegistry::builtin(), DispatcherConfig::default());
        let id = ready_agent(&fx.store, AgentType::Insights);

        let outcome = fx
            .dispatcher
            .execute(&id, "insights", "generate_dashboard", json!({"dateRange": "forever"}))
            .await
            .unwrap();

        assert!(matches!(
            outcome.result,
            Err(ExecutionFailure::Handler(HandlerError::InvalidInput(_)))
        ));
        assert_eq!(outcome.record.failure_reason, Some(FailureReason::HandlerError));
        assert!(outcome.record.error.is_some());
        assert_eq!(fx.performance.snapshot(&id).count, 1);
    }

    #[tokio::test]
    async fn test_timeout_is_bounded_and_recorded() {
        let mut registry = HandlerRegistry::builtin();
        registry.register(
            ManageOp::PredictWaitTime,
            from_async_fn(|_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(json!("late"))
            }),
        );
        let mut config = DispatcherConfig::default();
        config
            .operation_timeouts
            .insert("manage.predict_wait_time".to_string(), Duration::from_millis(50));
        let fx = fixture(registry, config);
        let id = ready_agent(&fx.store, AgentType::Manage);

        let clock = Instant::now();
        let outcome = fx
            .dispatcher
            .execute(&id, "manage", "predict_wait_time", json!({}))
            .await
            .unwrap();

        assert!(clock.elapsed() < Duration::from_secs(5));
        assert!(matches!(outcome.result, Err(ExecutionFailure::Timeout(_))));

        let records = fx.performance.records_for(&id);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].failure_reason, Some(FailureReason::Timeout));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let mut registry = HandlerRegistry::builtin();
        registry.register(ManageOp::DigitalCheckin, from_fn(|_| panic!("handler bug")));
        let fx = fixture(registry, DispatcherConfig::default());
        let id = ready_agent(&fx.store, AgentType::Manage);

        let outcome = fx
            .dispatcher
            .execute(&id, "manage", "digital_checkin", json!({}))
            .await
            .unwrap();

        match outcome.result {
            Err(ExecutionFailure::Panicked(msg)) => assert_eq!(msg, "handler bug"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(outcome.record.failure_reason, Some(FailureReason::Panicked));
    }

    #[tokio::test]
    async fn test_serialize_per_agent() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut registry = HandlerRegistry::builtin();
        {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            registry.register(
                ManageOp::PredictWaitTime,
                from_async_fn(move |_| {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(json!(null))
                    }
                }),
            );
        }

        let fx = Arc::new(fixture(
            registry,
            DispatcherConfig {
                serialize_per_agent: true,
                ..Default::default()
            },
        ));
        let id = ready_agent(&fx.store, AgentType::Manage);

        let calls: Vec<_> = (0..4)
            .map(|_| {
                let fx = fx.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    fx.dispatcher
                        .execute(&id, "manage", "predict_wait_time", json!({}))
                        .await
                        .map(|outcome| outcome.is_success())
                })
            })
            .collect();
        for call in calls {
            assert!(call.await.unwrap().unwrap());
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(fx.performance.snapshot(&id).count, 4);
    }

    #[tokio::test]
    async fn test_abandoned_caller_still_records() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::builtin();
        {
            let ran = ran.clone();
            registry.register(
                ManageOp::PredictWaitTime,
                from_async_fn(move |_| {
                    let ran = ran.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        ran.fetch_add(1, Ordering::SeqCst);
                        Ok(json!({"estimatedWaitMinutes": 12}))
                    }
                }),
            );
        }
        let fx = Arc::new(fixture(registry, DispatcherConfig::default()));
        let id = ready_agent(&fx.store, AgentType::Manage);

        let caller = {
            let fx = fx.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _ = fx
                    .dispatcher
                    .execute(&id, "manage", "predict_wait_time", json!({}))
                    .await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        let records = fx.performance.records_for(&id);
        assert_eq!(records.len(), 1);
        assert!(records[0].is_success());
    }

    #[tokio::test]
    async fn test_queued_execution_shares_time_bound() {
        let mut registry = HandlerRegistry::builtin();
        registry.register(
            ManageOp::PredictWaitTime,
            from_async_fn(|_| async {
                tokio::time::sleep(Duration::from_millis(400)).await;
                Ok(json!(null))
            }),
        );
        let fx = Arc::new(fixture(
            registry,
            DispatcherConfig {
                default_timeout: Duration::from_secs(1),
                serialize_per_agent: true,
                ..Default::default()
            },
        ));
        let id = ready_agent(&fx.store, AgentType::Manage);

        let clock = Instant::now();
        let calls: Vec<_> = (0..4)
            .map(|_| {
                let fx = fx.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    fx.dispatcher
                        .execute(&id, "manage", "predict_wait_time", json!({}))
                        .await
                        .unwrap()
                })
            })
            .collect();
        let mut timeouts = 0;
        for call in calls {
            let outcome = call.await.unwrap();
            if matches!(outcome.result, Err(ExecutionFailure::Timeout(_))) {
                timeouts += 1;
            }
        }

        // Four 400 ms runs cannot all fit in one shared second
        assert!(timeouts >= 1);
        assert!(clock.elapsed() < Duration::from_millis(1900));
        assert_eq!(fx.performance.snapshot(&id).count, 4);
    }
}
