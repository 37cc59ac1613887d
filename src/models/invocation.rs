use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_PROVIDER: &str = "teamtailor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Received,
    Processing,
    Succeeded,
    Failed,
}

impl InvocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationStatus::Received => "received",
            InvocationStatus::Processing => "processing",
            InvocationStatus::Succeeded => "succeeded",
            InvocationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvocationStatus::Succeeded | InvocationStatus::Failed)
    }
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvocationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(InvocationStatus::Received),
            "processing" => Ok(InvocationStatus::Processing),
            "succeeded" => Ok(InvocationStatus::Succeeded),
            "failed" => Ok(InvocationStatus::Failed),
            other => Err(format!("unknown invocation status: {other}")),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvocationError {
    #[error("invocation already finalized as {status}")]
    AlreadyFinalized { status: InvocationStatus },
}

/// Receipt metadata captured before the body is looked at.
#[derive(Debug, Clone, Default)]
pub struct NewInvocation {
    pub provider: Option<String>,
    pub request_id: Option<String>,
    pub remote_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Fields lifted from the inbound webhook body.
#[derive(Debug, Clone, Default)]
pub struct ReceivedEvent {
    pub event: Option<String>,
    pub triggered_at: Option<OffsetDateTime>,
    /// The raw `triggeredAt` text, kept for the payload snapshot.
    pub triggered_at_raw: Option<String>,
    pub application_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum InvocationOutcome {
    Succeeded {
        http_status: u16,
        metadata: Option<Value>,
    },
    Failed {
        http_status: u16,
        error_class: String,
        error_message: Option<String>,
        metadata: Option<Value>,
    },
}

/// Durable record of one webhook processing attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub id: Uuid,
    pub provider: String,
    pub event: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub triggered_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub duration_ms: Option<i64>,
    pub status: InvocationStatus,
    pub http_status: Option<i32>,
    pub error_class: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Option<Value>,
    pub payload: Option<String>,
    pub application_id: Option<String>,
    pub hr_employee_id: Option<String>,
    pub recruiting_comment_id: Option<String>,
    pub request_id: Option<String>,
    pub remote_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl InvocationRecord {
    pub fn received(new: NewInvocation) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: new
                .provider
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            event: None,
            triggered_at: None,
            received_at: OffsetDateTime::now_utc(),
            completed_at: None,
            duration_ms: None,
            status: InvocationStatus::Received,
            http_status: None,
            error_class: None,
            error_message: None,
            metadata: None,
            payload: None,
            application_id: None,
            hr_employee_id: None,
            recruiting_comment_id: None,
            request_id: new.request_id,
            remote_ip: new.remote_ip,
            user_agent: new.user_agent,
        }
    }

    pub fn begin_processing(&mut self) -> Result<(), InvocationError> {
        match self.status {
            InvocationStatus::Received => {
                self.status = InvocationStatus::Processing;
                Ok(())
            }
            InvocationStatus::Processing => Ok(()),
            status => Err(InvocationError::AlreadyFinalized { status }),
        }
    }

    /// Stores the webhook fields and a JSON snapshot of them.
    pub fn mark_received(&mut self, event: ReceivedEvent) -> Result<(), InvocationError> {
        self.ensure_open()?;
        let snapshot = json!({
            "event": event.event,
            "triggeredAt": event.triggered_at_raw,
            "applicationId": event.application_id,
        });
        self.event = event.event;
        self.triggered_at = event.triggered_at;
        self.application_id = event.application_id;
        self.payload = Some(snapshot.to_string());
        Ok(())
    }

    pub fn attach_application(&mut self, application_id: &str) -> Result<(), InvocationError> {
        self.ensure_open()?;
        self.application_id = Some(application_id.to_string());
        Ok(())
    }

    pub fn attach_employee(&mut self, employee_id: &str) -> Result<(), InvocationError> {
        self.ensure_open()?;
        self.hr_employee_id = Some(employee_id.to_string());
        Ok(())
    }

    pub fn attach_comment(&mut self, comment_id: &str) -> Result<(), InvocationError> {
        self.ensure_open()?;
        self.recruiting_comment_id = Some(comment_id.to_string());
        Ok(())
    }

    /// The single terminal transition. Sets `completed_at` and `duration_ms`.
    pub fn finalize(&mut self, outcome: InvocationOutcome) -> Result<(), InvocationError> {
        self.ensure_open()?;
        let now = OffsetDateTime::now_utc();
        let elapsed = (now - self.received_at).whole_milliseconds().max(0);

        match outcome {
            InvocationOutcome::Succeeded {
                http_status,
                metadata,
            } => {
                self.status = InvocationStatus::Succeeded;
                self.http_status = Some(i32::from(http_status));
                self.metadata = merge_metadata(self.metadata.take(), metadata);
            }
            InvocationOutcome::Failed {
                http_status,
                error_class,
                error_message,
                metadata,
            } => {
                self.status = InvocationStatus::Failed;
                self.http_status = Some(i32::from(http_status));
                self.error_class = Some(error_class);
                self.error_message = error_message;
                self.metadata = merge_metadata(self.metadata.take(), metadata);
            }
        }
        self.completed_at = Some(now);
        self.duration_ms = Some(i64::try_from(elapsed).unwrap_or(i64::MAX));
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), InvocationError> {
        if self.status.is_terminal() {
            return Err(InvocationError::AlreadyFinalized {
                status: self.status,
            });
        }
        Ok(())
    }
}

fn merge_metadata(current: Option<Value>, extra: Option<Value>) -> Option<Value> {
    match (current, extra) {
        (Some(Value::Object(mut base)), Some(Value::Object(more))) => {
            base.extend(more);
            Some(Value::Object(base))
        }
        (current, None) => current,
        (_, extra) => extra,
    }
}

/// Row shape used by the Postgres repository.
#[derive(Debug, FromRow)]
pub struct InvocationRow {
    pub id: Uuid,
    pub provider: String,
    pub event: Option<String>,
    pub triggered_at: Option<OffsetDateTime>,
    pub received_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub duration_ms: Option<i64>,
    pub status: String,
    pub http_status: Option<i32>,
    pub error_class: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Option<Value>,
    pub payload: Option<String>,
    pub application_id: Option<String>,
    pub hr_employee_id: Option<String>,
    pub recruiting_comment_id: Option<String>,
    pub request_id: Option<String>,
    pub remote_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl TryFrom<InvocationRow> for InvocationRecord {
    type Error = String;

    fn try_from(row: InvocationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            provider: row.provider,
            event: row.event,
            triggered_at: row.triggered_at,
            received_at: row.received_at,
            completed_at: row.completed_at,
            duration_ms: row.duration_ms,
            status: row.status.parse()?,
            http_status: row.http_status,
            error_class: row.error_class,
            error_message: row.error_message,
            metadata: row.metadata,
            payload: row.payload,
            application_id: row.application_id,
            hr_employee_id: row.hr_employee_id,
            recruiting_comment_id: row.recruiting_comment_id,
            request_id: row.request_id,
            remote_ip: row.remote_ip,
            user_agent: row.user_agent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processing() -> InvocationRecord {
        let mut record = InvocationRecord::received(NewInvocation {
            request_id: Some("req-1".into()),
            ..Default::default()
        });
        record.begin_processing().unwrap();
        record
    }

    #[test]
    fn new_record_is_open_without_completion_fields() {
        let record = InvocationRecord::received(NewInvocation::default());
        assert_eq!(record.status, InvocationStatus::Received);
        assert_eq!(record.provider, DEFAULT_PROVIDER);
        assert!(record.completed_at.is_none());
        assert!(record.duration_ms.is_none());
    }

    #[test]
    fn mark_received_stores_fields_and_snapshot() {
        let mut record = processing();
        record
            .mark_received(ReceivedEvent {
                event: Some("new_hire".into()),
                triggered_at: None,
                triggered_at_raw: Some("yesterday".into()),
                application_id: Some("42".into()),
            })
            .unwrap();
        assert_eq!(record.event.as_deref(), Some("new_hire"));
        assert_eq!(record.application_id.as_deref(), Some("42"));
        let snapshot: Value = serde_json::from_str(record.payload.as_deref().unwrap()).unwrap();
        assert_eq!(
            snapshot,
            json!({ "event": "new_hire", "triggeredAt": "yesterday", "applicationId": "42" })
        );
    }

    #[test]
    fn finalize_sets_completion_fields_once() {
        let mut record = processing();
        record.attach_employee("emp-1").unwrap();
        record
            .finalize(InvocationOutcome::Succeeded {
                http_status: 200,
                metadata: Some(json!({ "employee_reused": false })),
            })
            .unwrap();

        assert_eq!(record.status, InvocationStatus::Succeeded);
        assert_eq!(record.http_status, Some(200));
        assert!(record.completed_at.is_some());
        assert!(record.duration_ms.unwrap() >= 0);

        let err = record
            .finalize(InvocationOutcome::Failed {
                http_status: 502,
                error_class: "Late".into(),
                error_message: None,
                metadata: None,
            })
            .unwrap_err();
        assert_eq!(
            err,
            InvocationError::AlreadyFinalized {
                status: InvocationStatus::Succeeded
            }
        );
        assert_eq!(record.status, InvocationStatus::Succeeded);
        assert!(record.attach_comment("c-1").is_err());
    }

    #[test]
    fn failure_records_error_and_merges_metadata() {
        let mut record = processing();
        record.metadata = Some(json!({ "attachment_bytes": 10 }));
        record
            .finalize(InvocationOutcome::Failed {
                http_status: 502,
                error_class: "RecruitingHttpError".into(),
                error_message: Some("boom".into()),
                metadata: Some(json!({ "downstream_status": 401 })),
            })
            .unwrap();
        assert_eq!(record.status, InvocationStatus::Failed);
        assert_eq!(record.error_class.as_deref(), Some("RecruitingHttpError"));
        assert_eq!(
            record.metadata,
            Some(json!({ "attachment_bytes": 10, "downstream_status": 401 }))
        );
    }

    #[test]
    fn begin_processing_rejects_terminal_records() {
        let mut record = processing();
        record
            .finalize(InvocationOutcome::Failed {
                http_status: 400,
                error_class: "InvalidJson".into(),
                error_message: None,
                metadata: None,
            })
            .unwrap();
        assert!(record.begin_processing().is_err());
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            InvocationStatus::Received,
            InvocationStatus::Processing,
            InvocationStatus::Succeeded,
            InvocationStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<InvocationStatus>().unwrap(), status);
        }
        assert!("stuck".parse::<InvocationStatus>().is_err());
    }
}
