use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::OffsetDateTime;
use tokio::task::JoinError;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::db::invocation_repository::InvocationRepository;
use crate::models::application::{jget, value_as_id, ApplicationData};
use crate::models::employee_payload::{EmployeeOverrides, EmployeePayload};
use crate::models::invocation::{
    InvocationError, InvocationOutcome, InvocationRecord, NewInvocation, ReceivedEvent,
};
use crate::services::hr::{employee_id, HrClient, HrError};
use crate::services::recruiting::{Downloaded, RecruitingClient, RecruitingError};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub resume_context: String,
    pub download_dir: PathBuf,
    pub default_site: String,
}

/// The raw webhook delivery plus what we know about the caller.
#[derive(Debug, Clone, Default)]
pub struct InboundWebhook {
    pub body: Vec<u8>,
    pub request_id: Option<String>,
    pub remote_ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl IntoResponse for PipelineResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Every way a run can end early. Each variant maps to one response and one
/// terminal record state in [`Failure::into_outcome`].
#[derive(Debug)]
enum Failure {
    InvalidJson(serde_json::Error),
    MissingApplicationId,
    Recruiting(RecruitingError),
    Hr(HrError),
    Internal { class: &'static str, message: String },
}

impl Failure {
    fn internal(class: &'static str, message: impl ToString) -> Self {
        Failure::Internal {
            class,
            message: message.to_string(),
        }
    }

    fn into_outcome(self) -> (InvocationOutcome, PipelineResponse) {
        match self {
            Failure::InvalidJson(err) => (
                failed(400, "InvalidJson", err.to_string(), None),
                respond(StatusCode::BAD_REQUEST, json!({ "error": "invalid JSON" })),
            ),
            Failure::MissingApplicationId => (
                failed(422, "MissingApplicationId", "missing application id", None),
                respond(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    json!({ "error": "missing application id" }),
                ),
            ),
            Failure::Recruiting(err) if err.is_downstream() => {
                let status = err.status();
                let request_id = err.request_id().map(str::to_string);
                (
                    failed(
                        502,
                        err.error_class(),
                        err.to_string(),
                        Some(json!({ "downstream_status": status, "request_id": request_id })),
                    ),
                    respond(
                        StatusCode::BAD_GATEWAY,
                        json!({
                            "error": "recruiting system error",
                            "status": status,
                            "requestId": request_id,
                        }),
                    ),
                )
            }
            Failure::Hr(err) if err.is_downstream() => {
                let status = err.status();
                let message = err.to_string();
                (
                    failed(
                        502,
                        err.error_class(),
                        message.clone(),
                        Some(json!({ "downstream_status": status })),
                    ),
                    respond(
                        StatusCode::BAD_GATEWAY,
                        json!({ "error": "HR system error", "status": status, "message": message }),
                    ),
                )
            }
            Failure::Recruiting(err) => internal_error(err.error_class(), err.to_string()),
            Failure::Hr(err) => internal_error(err.error_class(), err.to_string()),
            Failure::Internal { class, message } => internal_error(class, message),
        }
    }
}

impl From<InvocationError> for Failure {
    fn from(err: InvocationError) -> Self {
        Failure::internal("InvocationStateError", err)
    }
}

fn failed(
    http_status: u16,
    error_class: &str,
    message: impl Into<String>,
    metadata: Option<Value>,
) -> InvocationOutcome {
    InvocationOutcome::Failed {
        http_status,
        error_class: error_class.to_string(),
        error_message: Some(message.into()),
        metadata,
    }
}

fn respond(status: StatusCode, body: Value) -> PipelineResponse {
    PipelineResponse { status, body }
}

fn internal_error(class: &str, message: String) -> (InvocationOutcome, PipelineResponse) {
    (
        failed(500, class, message.clone(), None),
        respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": "internal error", "message": message }),
        ),
    )
}

struct Completed {
    application: ApplicationData,
    employee_reused: bool,
    attachment_bytes: u64,
}

/// Drives one hire webhook through the recruiting and HR systems.
pub struct HirePipeline {
    recruiting: RecruitingClient,
    hr: HrClient,
    invocations: Arc<dyn InvocationRepository>,
    settings: PipelineSettings,
}

impl HirePipeline {
    pub fn new(
        recruiting: RecruitingClient,
        hr: HrClient,
        invocations: Arc<dyn InvocationRepository>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            recruiting,
            hr,
            invocations,
            settings,
        }
    }

    /// Runs the webhook on a detached task. Dropping the returned future (a
    /// caller that hangs up) does not stop the run; it still finalizes the
    /// record and finishes any downstream call already issued.
    pub async fn handle(self: &Arc<Self>, inbound: InboundWebhook) -> PipelineResponse {
        let pipeline = Arc::clone(self);
        match tokio::spawn(pipeline.supervise(inbound)).await {
            Ok(response) => response,
            Err(err) => {
                error!(?err, "hire webhook supervisor aborted");
                internal_error("PipelineTaskAborted", err.to_string()).1
            }
        }
    }

    /// Owns the run's task and finalizes the record if that task dies.
    async fn supervise(self: Arc<Self>, inbound: InboundWebhook) -> PipelineResponse {
        let span = info_span!("hire_webhook", request_id = inbound.request_id.as_deref());
        let record = InvocationRecord::received(NewInvocation {
            provider: None,
            request_id: inbound.request_id,
            remote_ip: inbound.remote_ip,
            user_agent: inbound.user_agent,
        });
        let invocation_id = record.id;

        let pipeline = Arc::clone(&self);
        let run = tokio::spawn(
            async move { pipeline.process(record, inbound.body).await }.instrument(span),
        );
        match run.await {
            Ok(response) => response,
            Err(err) => self.recover(invocation_id, err).await,
        }
    }

    async fn recover(&self, invocation_id: Uuid, err: JoinError) -> PipelineResponse {
        let class = if err.is_panic() {
            "PipelineTaskPanicked"
        } else {
            "PipelineTaskAborted"
        };
        error!(%invocation_id, ?err, "hire webhook task died");
        let (outcome, response) = internal_error(class, err.to_string());

        match self.invocations.find(invocation_id).await {
            Ok(Some(mut record)) if !record.status.is_terminal() => {
                if let Err(err) = record.finalize(outcome) {
                    error!(%invocation_id, %err, "invocation could not be finalized");
                }
                self.persist(&record).await;
            }
            Ok(Some(_)) => {}
            Ok(None) => warn!(%invocation_id, "invocation was never stored"),
            Err(err) => error!(%invocation_id, ?err, "failed to load invocation for recovery"),
        }
        response
    }

    async fn process(&self, mut record: InvocationRecord, body: Vec<u8>) -> PipelineResponse {
        if let Err(failure) = self.open(&mut record).await {
            return self.fail(record, failure).await;
        }

        let payload: Value = match serde_json::from_slice(&body) {
            Ok(payload) => payload,
            Err(err) => return self.fail(record, Failure::InvalidJson(err)).await,
        };

        let received = parse_event(&payload);
        let application_id = received.application_id.clone();
        let triggered_at = received.triggered_at_raw.clone();
        if let Err(err) = record.mark_received(received) {
            return self.fail(record, err.into()).await;
        }
        self.persist(&record).await;

        let Some(application_id) = application_id else {
            return self.fail(record, Failure::MissingApplicationId).await;
        };

        match self.run_steps(&mut record, &application_id).await {
            Ok(done) => {
                let response = respond(
                    StatusCode::OK,
                    json!({
                        "ok": true,
                        "event": record.event,
                        "triggeredAt": triggered_at,
                        "applicationId": application_id,
                        "application": done.application.raw,
                    }),
                );
                let outcome = InvocationOutcome::Succeeded {
                    http_status: 200,
                    metadata: Some(json!({
                        "employee_reused": done.employee_reused,
                        "attachment_bytes": done.attachment_bytes,
                    })),
                };
                self.conclude(record, outcome, response).await
            }
            Err(failure) => self.fail(record, failure).await,
        }
    }

    async fn open(&self, record: &mut InvocationRecord) -> Result<(), Failure> {
        record.begin_processing()?;
        self.invocations
            .create(record)
            .await
            .map_err(|err| Failure::internal("InvocationPersistError", err))
    }

    /// Steps that talk to the downstream systems. The scratch directory holding
    /// the resume is removed when it drops, on success and on every early return.
    async fn run_steps(
        &self,
        record: &mut InvocationRecord,
        application_id: &str,
    ) -> Result<Completed, Failure> {
        tokio::fs::create_dir_all(&self.settings.download_dir)
            .await
            .map_err(|err| Failure::internal("AttachmentDirError", err))?;
        let workdir = tempfile::Builder::new()
            .prefix("hirehook-")
            .tempdir_in(&self.settings.download_dir)
            .map_err(|err| Failure::internal("AttachmentDirError", err))?;

        let application = self
            .recruiting
            .get_application_data(application_id)
            .await
            .map_err(Failure::Recruiting)?;
        record.attach_application(application.id.as_deref().unwrap_or(application_id))?;

        let (resume_path, attachment_bytes) = match self
            .recruiting
            .download_application_attachment(
                &application,
                &self.settings.resume_context,
                Some(workdir.path()),
            )
            .await
            .map_err(Failure::Recruiting)?
        {
            Downloaded::Written { path, bytes } => (path, bytes),
            Downloaded::Bytes(_) => {
                return Err(Failure::internal(
                    "AttachmentNotWritten",
                    "attachment was not written to disk",
                ))
            }
        };

        let email = application.email.as_deref().unwrap_or_default();
        let existing = self
            .hr
            .find_employee_by_email(email, None, false)
            .await
            .map_err(Failure::Hr)?;
        let (employee, employee_reused) = match existing {
            Some(existing) => (existing, true),
            None => {
                let payload = EmployeePayload::from_recruiting_data(
                    &application,
                    EmployeeOverrides {
                        site: Some(self.settings.default_site.clone()),
                        ..Default::default()
                    },
                );
                let created = self
                    .hr
                    .create_employee(&payload)
                    .await
                    .map_err(Failure::Hr)?;
                (created, false)
            }
        };
        let employee_id = employee_id(&employee).ok_or(Failure::Hr(HrError::MissingEmployeeId))?;
        record.attach_employee(&employee_id)?;
        self.persist(record).await;
        info!(
            invocation_id = %record.id,
            employee_id = %employee_id,
            employee_reused,
            "HR employee resolved"
        );

        self.hr
            .upload_shared_document(&employee_id, &resume_path)
            .await
            .map_err(Failure::Hr)?;

        let comment_id = self
            .recruiting
            .comment_record_created(application_id, &employee_id)
            .await
            .map_err(Failure::Recruiting)?;
        record.attach_comment(&comment_id)?;

        Ok(Completed {
            application,
            employee_reused,
            attachment_bytes,
        })
    }

    async fn fail(&self, record: InvocationRecord, failure: Failure) -> PipelineResponse {
        warn!(invocation_id = %record.id, ?failure, "hire webhook failed");
        let (outcome, response) = failure.into_outcome();
        self.conclude(record, outcome, response).await
    }

    async fn conclude(
        &self,
        mut record: InvocationRecord,
        outcome: InvocationOutcome,
        response: PipelineResponse,
    ) -> PipelineResponse {
        if let Err(err) = record.finalize(outcome) {
            error!(invocation_id = %record.id, %err, "invocation could not be finalized");
        }
        self.persist(&record).await;
        info!(
            invocation_id = %record.id,
            status = %record.status,
            http_status = record.http_status,
            duration_ms = record.duration_ms,
            "hire webhook finished"
        );
        response
    }

    async fn persist(&self, record: &InvocationRecord) {
        if let Err(err) = self.invocations.save(record).await {
            error!(?err, invocation_id = %record.id, "failed to persist invocation");
        }
    }
}

/// Unparseable timestamps are dropped rather than rejected.
fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    OffsetDateTime::parse(raw, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(raw, &Iso8601::DEFAULT))
        .ok()
}

fn parse_event(payload: &Value) -> ReceivedEvent {
    let triggered_at_raw = payload
        .get("triggeredAt")
        .and_then(Value::as_str)
        .map(str::to_string);
    ReceivedEvent {
        event: payload
            .get("event")
            .and_then(Value::as_str)
            .map(str::to_string),
        triggered_at: triggered_at_raw.as_deref().and_then(parse_timestamp),
        triggered_at_raw,
        application_id: jget(payload, &["data", "application", "id"]).and_then(value_as_id),
    }
}
