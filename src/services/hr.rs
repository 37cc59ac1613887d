use std::path::Path;
use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::io::AsyncReadExt;

use crate::models::employee_payload::{EmployeePayload, PayloadError};
use crate::services::http_json::{ApiError, BasicAuth, HttpError, HttpJsonClient, HttpTimeouts};
use crate::services::request_logger::RequestLogger;

pub const HR_BASE_URL: &str = "https://api.hibob.com/v1";
pub const DEFAULT_SEARCH_LIMIT: u32 = 10;

#[derive(Debug, Error)]
pub enum HrError {
    #[error("{0}")]
    Validation(String),
    #[error("HR API error: {0}")]
    Api(#[from] ApiError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error("HR response is missing the employee id")]
    MissingEmployeeId,
    #[error("document read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl HrError {
    pub fn http_error(&self) -> Option<&HttpError> {
        match self {
            HrError::Api(err) => err.http_error(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.http_error().map(|err| err.status)
    }

    pub fn is_downstream(&self) -> bool {
        matches!(self, HrError::Api(_) | HrError::MissingEmployeeId)
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            HrError::Validation(_) => "HrValidationError",
            HrError::Api(ApiError::Http(_)) => "HrHttpError",
            HrError::Api(_) => "HrApiError",
            HrError::Payload(_) => "EmployeePayloadError",
            HrError::MissingEmployeeId => "MissingEmployeeId",
            HrError::Io(_) => "DocumentIoError",
        }
    }
}

/// Anything that can be sent as the body of an employee creation.
pub trait EmployeeBody {
    fn to_employee_json(&self) -> Result<Value, HrError>;
}

impl EmployeeBody for Value {
    fn to_employee_json(&self) -> Result<Value, HrError> {
        Ok(self.clone())
    }
}

impl EmployeeBody for Map<String, Value> {
    fn to_employee_json(&self) -> Result<Value, HrError> {
        Ok(Value::Object(self.clone()))
    }
}

impl EmployeeBody for EmployeePayload {
    fn to_employee_json(&self) -> Result<Value, HrError> {
        Ok(self.to_json()?)
    }
}

/// Pulls the employee id out of a created/found employee object.
pub fn employee_id(employee: &Value) -> Option<String> {
    crate::models::application::value_as_id(employee.get("id")?)
}

#[derive(Debug, Clone)]
pub struct HrSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

#[derive(Clone)]
pub struct HrClient {
    api: HttpJsonClient,
}

impl HrClient {
    pub fn new(
        settings: &HrSettings,
        timeouts: HttpTimeouts,
        logger: Arc<dyn RequestLogger>,
    ) -> Result<Self, HrError> {
        let api = HttpJsonClient::new(
            "hr",
            &settings.base_url,
            timeouts,
            Arc::new(BasicAuth::new(&settings.username, &settings.password)),
        )?
        .with_logger(logger);
        Ok(Self { api })
    }

    pub async fn create_employee<B: EmployeeBody + ?Sized>(
        &self,
        payload: &B,
    ) -> Result<Value, HrError> {
        let body = payload.to_employee_json()?;
        let created = self
            .api
            .request(Method::POST, "/people", None, Some(&body), None)
            .await?;
        Ok(created)
    }

    pub async fn search_people(
        &self,
        query: &Value,
        fields: Option<&[&str]>,
        limit: u32,
        include_inactive: bool,
    ) -> Result<Value, HrError> {
        if is_empty_query(query) {
            return Err(HrError::Validation("search query is required".into()));
        }

        let mut body = json!({
            "query": query,
            "limit": limit,
            "includeInactive": include_inactive,
        });
        if let Some(fields) = fields.filter(|fields| !fields.is_empty()) {
            body["fields"] = json!(fields);
        }

        let value = self
            .api
            .request(Method::POST, "/people/search", None, Some(&body), None)
            .await?;
        Ok(value)
    }

    /// Exact-match lookup used before creating an employee.
    pub async fn find_employee_by_email(
        &self,
        email: &str,
        fields: Option<&[&str]>,
        include_inactive: bool,
    ) -> Result<Option<Value>, HrError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(HrError::Validation("email is required".into()));
        }

        let query = json!({
            "field": "email",
            "operator": "equals",
            "value": email,
        });
        let response = self
            .search_people(&query, fields, 1, include_inactive)
            .await?;

        Ok(response
            .get("employees")
            .and_then(Value::as_array)
            .and_then(|employees| employees.first())
            .cloned())
    }

    pub async fn upload_shared_document(
        &self,
        employee_id: &str,
        file_path: &Path,
    ) -> Result<Value, HrError> {
        let employee_id = employee_id.trim();
        if employee_id.is_empty() {
            return Err(HrError::Validation("employee id is required".into()));
        }
        if file_path.as_os_str().is_empty() {
            return Err(HrError::Validation("file path is required".into()));
        }

        let file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        // The handle lives only inside this block and is closed on every path out of it.
        let contents = {
            let mut file = tokio::fs::File::open(file_path).await?;
            let mut contents = Vec::new();
            file.read_to_end(&mut contents).await?;
            contents
        };

        let part = Part::bytes(contents)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(ApiError::from)?;
        let form = Form::new().part("file", part);

        let path = format!(
            "/docs/people/{}/shared/upload",
            urlencoding::encode(employee_id)
        );
        let value = self.api.request_multipart(&path, form).await?;
        Ok(value)
    }
}

fn is_empty_query(query: &Value) -> bool {
    match query {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
