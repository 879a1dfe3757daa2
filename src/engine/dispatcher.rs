// SPDX-License-Identifier: Apache-2.0

//! Event dispatcher
//!
//! Decodes each inbound notification, routes it to the builder and the
//! column reconciler, retries retryable failures, and reports everything an
//! operator should see to the audit sink. A bad notification never stops the
//! stream.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{field, info, instrument, warn, Span};

use lineage_core::EntityGuid;

use super::columns::DerivedColumnReconciler;
use super::events::{ChangeNotification, Decoded, NewDeployedSchemaEvent, NewViewEvent};
use super::lineage::{LineageGraphBuilder, LineageProfile, LineageSource};
use super::retry::RetryPolicy;
use crate::audit::{AuditCode, AuditRecord, AuditSink};
use crate::error::SyncResult;
use crate::metrics::{self, EventResult};

/// Event kind recorded for payloads whose kind could not be read
const UNKNOWN_KIND: &str = "unknown";

/// Terminal signal for one notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Table and columns reconciled; `root` is the table node
    ///
    /// `partial` is set when the stored columns differ from the report;
    /// `failed_columns` names the reported columns that were not reconciled.
    Reconciled {
        root: EntityGuid,
        partial: bool,
        failed_columns: Vec<String>,
    },
    /// The view reported no columns and its subtree was removed
    Retracted { deleted_columns: usize },
    /// Deployed schema lineage materialized; `root` is the schema node
    SchemaRegistered { root: EntityGuid },
    Dropped { reason: String },
    Failed { error: String },
}

impl DispatchOutcome {
    fn metric(&self) -> EventResult {
        match self {
            Self::Reconciled { .. } | Self::SchemaRegistered { .. } => EventResult::Reconciled,
            Self::Retracted { .. } => EventResult::Retracted,
            Self::Dropped { .. } => EventResult::Dropped,
            Self::Failed { .. } => EventResult::Failed,
        }
    }
}

/// Counts of a [`EventDispatcher::run`] loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub dispatched: u64,
    pub dropped: u64,
    pub failed: u64,
}

pub struct EventDispatcher {
    builder: Arc<LineageGraphBuilder>,
    reconciler: Arc<DerivedColumnReconciler>,
    audit: Arc<dyn AuditSink>,
    retry: RetryPolicy,
}

impl EventDispatcher {
    pub fn new(
        builder: Arc<LineageGraphBuilder>,
        reconciler: Arc<DerivedColumnReconciler>,
        audit: Arc<dyn AuditSink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            builder,
            reconciler,
            audit,
            retry,
        }
    }

    /// Processes one raw notification to completion
    #[instrument(skip(self, payload), fields(kind = field::Empty, attempts = field::Empty))]
    pub async fn dispatch(&self, payload: &str) -> DispatchOutcome {
        let start = Instant::now();
        metrics::record_received();

        let outcome = self.dispatch_inner(payload).await;

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        metrics::record_event(outcome.metric(), duration_ms);
        outcome
    }

    async fn dispatch_inner(&self, payload: &str) -> DispatchOutcome {
        let notification = match ChangeNotification::decode(payload) {
            Ok(Decoded::Known(notification)) => notification,
            Ok(Decoded::Unknown(kind)) => {
                Span::current().record("kind", kind.as_str());
                info!("Ignoring unhandled event type");
                self.audit.record(AuditRecord::new(
                    AuditCode::UnknownEventType,
                    kind.as_str(),
                    &[kind.as_str()],
                ));
                return DispatchOutcome::Dropped {
                    reason: format!("unknown event type {}", kind),
                };
            }
            Err(e) => {
                let cause = e.to_string();
                warn!(error = %cause, "Dropping undecodable event");
                self.audit.record(
                    AuditRecord::new(
                        AuditCode::ParseEventException,
                        UNKNOWN_KIND,
                        &[UNKNOWN_KIND, &cause],
                    )
                    .with_cause(cause.clone())
                    .with_payload(payload),
                );
                return DispatchOutcome::Dropped { reason: cause };
            }
        };

        let kind = notification.kind();
        Span::current().record("kind", kind);

        if let Err(e) = notification.validate() {
            let cause = e.to_string();
            warn!(error = %cause, "Dropping invalid event");
            self.audit.record(
                AuditRecord::new(AuditCode::InvalidEvent, kind, &[kind, &cause])
                    .with_cause(cause.clone())
                    .with_payload(payload),
            );
            return DispatchOutcome::Dropped { reason: cause };
        }

        let attempted = self.retry.execute(|| self.process(&notification)).await;
        Span::current().record("attempts", attempted.attempts);

        match attempted.result {
            Ok(outcome) => {
                info!(outcome = ?outcome, "Event processed");
                outcome
            }
            Err(e) => {
                let cause = e.to_string();
                let record = if e.is_retryable() {
                    warn!(error = %cause, attempts = attempted.attempts, "Retries exhausted");
                    AuditRecord::new(
                        AuditCode::RetriesExhausted,
                        kind,
                        &[kind, &attempted.attempts.to_string(), &cause],
                    )
                } else {
                    warn!(error = %cause, "Event processing failed");
                    AuditRecord::new(AuditCode::ProcessEventException, kind, &[kind, &cause])
                };
                self.audit
                    .record(record.with_cause(cause.clone()).with_payload(payload));
                DispatchOutcome::Failed { error: cause }
            }
        }
    }

    /// Routes an already validated notification
    pub async fn process(&self, notification: &ChangeNotification) -> SyncResult<DispatchOutcome> {
        match notification {
            ChangeNotification::NewView(event) => self.process_view(event).await,
            ChangeNotification::NewDeployedSchema(event) => self.process_deployed_schema(event).await,
        }
    }

    async fn process_view(&self, event: &NewViewEvent) -> SyncResult<DispatchOutcome> {
        let table = &event.table_source;
        if event.derived_columns.is_empty() {
            let retracted = self.reconciler.retract_view(table).await?;
            return Ok(DispatchOutcome::Retracted {
                deleted_columns: retracted.deleted_columns.len(),
            });
        }

        let handles = self
            .builder
            .build(&LineageSource::from(table), &LineageProfile::information_view())
            .await?;
        let outcome = self
            .reconciler
            .reconcile(table, &handles.schema_type, &event.derived_columns)
            .await?;
        Ok(DispatchOutcome::Reconciled {
            partial: outcome.is_partial(),
            failed_columns: outcome
                .failed_columns
                .into_iter()
                .map(|failure| failure.column)
                .collect(),
            root: outcome.table.guid,
        })
    }

    async fn process_deployed_schema(
        &self,
        event: &NewDeployedSchemaEvent,
    ) -> SyncResult<DispatchOutcome> {
        let schema = &event.deployed_database_schema;
        let profile = LineageProfile::deployed_schema(schema.external_source.clone());
        let handles = self
            .builder
            .build(&LineageSource::from(schema), &profile)
            .await?;
        Ok(DispatchOutcome::SchemaRegistered {
            root: handles.container.guid,
        })
    }

    /// Consumes notifications until the channel closes or `shutdown` fires
    ///
    /// A notification already being processed when shutdown is requested is
    /// finished; no further one is started.
    pub async fn run(
        &self,
        mut receiver: mpsc::Receiver<String>,
        shutdown: CancellationToken,
    ) -> RunStats {
        let mut stats = RunStats::default();
        loop {
            let payload = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, no further events will be dispatched");
                    break;
                }
                payload = receiver.recv() => match payload {
                    Some(payload) => payload,
                    None => break,
                },
            };

            stats.dispatched += 1;
            match self.dispatch(&payload).await {
                DispatchOutcome::Dropped { .. } => stats.dropped += 1,
                DispatchOutcome::Failed { .. } => stats.failed += 1,
                _ => {}
            }
        }
        stats
    }
}
