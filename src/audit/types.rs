//! Audit Types
//!
//! Records, message set, and the sink trait through which the engine reports
//! operator-visible outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of an audit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
    Exception,
}

/// Message set of the service
///
/// Each code carries a stable identifier, a severity, a message template with
/// positional `{0}`, `{1}`… parameters, and what the system and the operator
/// should do about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCode {
    ServiceInitializing,
    ServiceInitialized,
    ServiceShutdown,
    ParseEventException,
    UnknownEventType,
    InvalidEvent,
    ProcessEventException,
    RetriesExhausted,
    PartialColumnFailure,
    StaleColumnDeleteFailed,
}

impl AuditCode {
    pub fn message_id(&self) -> &'static str {
        match self {
            Self::ServiceInitializing => "LINEAGE-SYNC-0001",
            Self::ServiceInitialized => "LINEAGE-SYNC-0002",
            Self::ServiceShutdown => "LINEAGE-SYNC-0003",
            Self::ParseEventException => "LINEAGE-SYNC-0004",
            Self::UnknownEventType => "LINEAGE-SYNC-0005",
            Self::InvalidEvent => "LINEAGE-SYNC-0006",
            Self::ProcessEventException => "LINEAGE-SYNC-0007",
            Self::RetriesExhausted => "LINEAGE-SYNC-0008",
            Self::PartialColumnFailure => "LINEAGE-SYNC-0009",
            Self::StaleColumnDeleteFailed => "LINEAGE-SYNC-0010",
        }
    }

    pub fn severity(&self) -> AuditSeverity {
        match self {
            Self::ServiceInitializing | Self::ServiceInitialized | Self::ServiceShutdown => {
                AuditSeverity::Info
            }
            Self::UnknownEventType => AuditSeverity::Info,
            Self::PartialColumnFailure | Self::StaleColumnDeleteFailed => AuditSeverity::Warning,
            Self::InvalidEvent | Self::RetriesExhausted => AuditSeverity::Error,
            Self::ParseEventException | Self::ProcessEventException => AuditSeverity::Exception,
        }
    }

    fn template(&self) -> &'static str {
        match self {
            Self::ServiceInitializing => "The lineage sync service is initializing server {0}",
            Self::ServiceInitialized => "The lineage sync service has initialized server {0}",
            Self::ServiceShutdown => "The lineage sync service is shutting down server {0}",
            Self::ParseEventException => "Event {0} could not be parsed: {1}",
            Self::UnknownEventType => "Event type {0} is not handled and was ignored",
            Self::InvalidEvent => "Event {0} is incomplete: {1}",
            Self::ProcessEventException => "Event {0} could not be processed: {1}",
            Self::RetriesExhausted => "Event {0} failed after {1} attempts: {2}",
            Self::PartialColumnFailure => "Columns {1} of table {0} could not be reconciled",
            Self::StaleColumnDeleteFailed => "Stale column {1} of table {0} could not be deleted: {2}",
        }
    }

    pub fn system_action(&self) -> &'static str {
        match self {
            Self::ServiceInitializing | Self::ServiceInitialized | Self::ServiceShutdown => {
                "No action is required. This is part of the normal operation of the service."
            }
            Self::ParseEventException | Self::UnknownEventType | Self::InvalidEvent => {
                "The event was dropped and the service continues with the next event."
            }
            Self::ProcessEventException | Self::RetriesExhausted => {
                "The event was abandoned; no partial lineage was kept beyond what the store accepted."
            }
            Self::PartialColumnFailure => {
                "The remaining columns were reconciled; the failed ones keep their previous state."
            }
            Self::StaleColumnDeleteFailed => {
                "The column stays linked and will be deleted again on the next reconciliation of the table."
            }
        }
    }

    pub fn user_action(&self) -> &'static str {
        match self {
            Self::ServiceInitializing | Self::ServiceInitialized | Self::ServiceShutdown => {
                "No action is required."
            }
            Self::ParseEventException | Self::InvalidEvent => {
                "Verify the format of the events produced by the data platform connector."
            }
            Self::UnknownEventType => "Check the connector and service versions match.",
            Self::ProcessEventException | Self::RetriesExhausted => {
                "Review the cause and the availability of the metadata repository, then resend the event."
            }
            Self::PartialColumnFailure | Self::StaleColumnDeleteFailed => {
                "Review the cause in the logs; the next event for this table will converge it."
            }
        }
    }

    /// Renders the message template with positional parameters
    pub fn format(&self, params: &[&str]) -> String {
        let mut message = self.template().to_string();
        for (i, param) in params.iter().enumerate() {
            message = message.replace(&format!("{{{}}}", i), param);
        }
        message
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub code: AuditCode,
    pub message_id: String,
    /// Event kind or lifecycle phase the record is about
    pub event_kind: String,
    pub severity: AuditSeverity,
    pub message: String,
    pub cause: Option<String>,
    /// Original notification payload, for failures
    pub payload: Option<String>,
}

impl AuditRecord {
    pub fn new(code: AuditCode, event_kind: impl Into<String>, params: &[&str]) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            code,
            message_id: code.message_id().to_string(),
            event_kind: event_kind.into(),
            severity: code.severity(),
            message: code.format(params),
            cause: None,
            payload: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// Destination of audit records
///
/// Recording never fails from the caller's point of view: a sink that cannot
/// persist a record logs the problem itself.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Filter for audit queries
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub limit: Option<usize>,
    pub offset: usize,
    pub code: Option<AuditCode>,
    pub min_severity: Option<AuditSeverity>,
    pub search: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

impl AuditSeverity {
    fn rank(&self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Warning => 1,
            Self::Error => 2,
            Self::Exception => 3,
        }
    }

    pub fn at_least(&self, other: AuditSeverity) -> bool {
        self.rank() >= other.rank()
    }
}

/// Audit log statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: u64,
    pub last_hour: u64,
    pub last_day: u64,
    pub by_severity: std::collections::HashMap<String, u64>,
    pub by_code: std::collections::HashMap<String, u64>,
}
