use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Method, Url};
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::application::{value_as_id, ApplicationData};
use crate::services::http_json::{
    ApiError, ApiKeyHeader, HttpError, HttpJsonClient, HttpTimeouts,
};
use crate::services::request_logger::RequestLogger;

pub const RECRUITING_BASE_URL: &str = "https://api.teamtailor.com/v1";
pub const DEFAULT_MAX_REDIRECTS: u32 = 3;

/// Header names checked, in order, for a correlation id on responses.
pub const REQUEST_ID_HEADERS: &[&str] = &[
    "x-request-id",
    "request-id",
    "x-amz-request-id",
    "x-amzn-requestid",
    "x-correlation-id",
    "correlation-id",
    "x-trace-id",
    "trace-id",
    "x-amzn-trace-id",
];

#[derive(Debug, Error)]
pub enum RecruitingError {
    #[error("{0}")]
    Validation(String),
    #[error("recruiting API error: {0}")]
    Api(#[from] ApiError),
    #[error("no attachment with context {context:?}")]
    AttachmentNotFound { context: String },
    #[error("attachment with context {context:?} has no url")]
    AttachmentMissingUrl { context: String },
    #[error("redirect {status} from {url} has no Location header")]
    MissingRedirectLocation { status: u16, url: String },
    #[error("too many redirects (max {max_redirects}) while fetching {url}")]
    TooManyRedirects { url: String, max_redirects: u32 },
    #[error("attachment write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl RecruitingError {
    pub fn http_error(&self) -> Option<&HttpError> {
        match self {
            RecruitingError::Api(err) => err.http_error(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.http_error().map(|err| err.status)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.http_error().and_then(|err| err.request_id.as_deref())
    }

    /// True when the failure came from talking to the recruiting system rather than local state.
    pub fn is_downstream(&self) -> bool {
        matches!(
            self,
            RecruitingError::Api(_)
                | RecruitingError::MissingRedirectLocation { .. }
                | RecruitingError::TooManyRedirects { .. }
        )
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            RecruitingError::Validation(_) => "RecruitingValidationError",
            RecruitingError::Api(ApiError::Http(_)) => "RecruitingHttpError",
            RecruitingError::Api(_) => "RecruitingApiError",
            RecruitingError::AttachmentNotFound { .. } => "AttachmentNotFound",
            RecruitingError::AttachmentMissingUrl { .. } => "AttachmentMissingUrl",
            RecruitingError::MissingRedirectLocation { .. } => "MissingRedirectLocation",
            RecruitingError::TooManyRedirects { .. } => "TooManyRedirects",
            RecruitingError::Io(_) => "AttachmentIoError",
        }
    }
}

/// First non-blank value among [`REQUEST_ID_HEADERS`].
pub fn extract_request_id(headers: &HeaderMap) -> Option<String> {
    REQUEST_ID_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Downloaded {
    Bytes(Vec<u8>),
    /// Saved to `path`; `bytes` is the length written.
    Written { path: PathBuf, bytes: u64 },
}

#[derive(Debug, Clone)]
pub struct RecruitingSettings {
    pub base_url: String,
    pub api_key: String,
    pub api_version: Option<String>,
}

#[derive(Clone)]
pub struct RecruitingClient {
    api: HttpJsonClient,
}

impl RecruitingClient {
    pub fn new(
        settings: &RecruitingSettings,
        timeouts: HttpTimeouts,
        logger: Arc<dyn RequestLogger>,
    ) -> Result<Self, RecruitingError> {
        let mut api = HttpJsonClient::new(
            "recruiting",
            &settings.base_url,
            timeouts,
            Arc::new(ApiKeyHeader::new("x-api-key", settings.api_key.clone())),
        )?
        .with_logger(logger)
        .with_request_id_extractor(extract_request_id);
        if let Some(version) = settings.api_version.as_deref() {
            api = api.with_default_header("x-api-version", version)?;
        }
        Ok(Self { api })
    }

    pub async fn get_application_with_attachments(
        &self,
        application_id: &str,
    ) -> Result<Value, RecruitingError> {
        let application_id = required(application_id, "application id")?;
        let path = format!("/applications/{}", urlencoding::encode(application_id));
        let value = self
            .api
            .request(
                Method::GET,
                &path,
                Some(&[("extra_fields[applications]", "attachments")][..]),
                None,
                None,
            )
            .await?;
        Ok(value)
    }

    pub async fn get_application_data(
        &self,
        application_id: &str,
    ) -> Result<ApplicationData, RecruitingError> {
        let raw = self.get_application_with_attachments(application_id).await?;
        Ok(ApplicationData::from_json(raw))
    }

    pub async fn list_applications(
        &self,
        params: &[(&str, &str)],
    ) -> Result<Value, RecruitingError> {
        let value = self
            .api
            .request(Method::GET, "/applications", Some(params), None, None)
            .await?;
        Ok(value)
    }

    /// Posts a JSON:API comment on an application and returns the new comment id.
    pub async fn create_comment(
        &self,
        application_id: &str,
        body_text: &str,
    ) -> Result<String, RecruitingError> {
        let application_id = required(application_id, "application id")?;
        let body_text = required(body_text, "comment body")?;

        let document = json!({
            "data": {
                "type": "comments",
                "attributes": { "body_text": body_text },
                "relationships": {
                    "commentable": {
                        "data": { "type": "applications", "id": application_id }
                    }
                }
            }
        });
        let response = self
            .api
            .request(Method::POST, "/comments", None, Some(&document), None)
            .await?;

        response
            .get("data")
            .and_then(|data| data.get("id"))
            .and_then(value_as_id)
            .ok_or_else(|| {
                RecruitingError::Api(ApiError::InvalidResponse(
                    "comment response is missing data.id".into(),
                ))
            })
    }

    pub async fn comment_record_created(
        &self,
        application_id: &str,
        hr_employee_id: &str,
    ) -> Result<String, RecruitingError> {
        let body = format!(
            "Employee record created in the HR system (employee ID: {}).",
            hr_employee_id
        );
        self.create_comment(application_id, &body).await
    }

    /// Fetches an absolute URL, following up to `max_redirects` redirects by hand.
    pub async fn download_file(
        &self,
        url: &str,
        to_path: Option<&Path>,
        headers: Option<&HeaderMap>,
        max_redirects: u32,
    ) -> Result<Downloaded, RecruitingError> {
        let mut current = Url::parse(required(url, "download url")?)
            .map_err(|err| ApiError::InvalidUrl(err.to_string()))?;
        let mut remaining = max_redirects;

        let response = loop {
            let response = self
                .api
                .fetch(&current, headers.cloned().unwrap_or_default())
                .await?;

            if !response.status.is_redirection() {
                break response;
            }

            let location = response
                .headers
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| RecruitingError::MissingRedirectLocation {
                    status: response.status.as_u16(),
                    url: current.to_string(),
                })?;
            if remaining == 0 {
                return Err(RecruitingError::TooManyRedirects {
                    url: current.to_string(),
                    max_redirects,
                });
            }
            remaining -= 1;
            current = current
                .join(location)
                .map_err(|err| ApiError::InvalidUrl(err.to_string()))?;
        };

        if !response.status.is_success() {
            return Err(ApiError::Http(HttpError {
                status: response.status.as_u16(),
                body: String::from_utf8_lossy(&response.body).into_owned(),
                method: Method::GET.to_string(),
                path: current.path().to_string(),
                request_id: extract_request_id(&response.headers),
            })
            .into());
        }

        match to_path {
            Some(path) => {
                tokio::fs::write(path, &response.body).await?;
                Ok(Downloaded::Written {
                    path: path.to_path_buf(),
                    bytes: response.body.len() as u64,
                })
            }
            None => Ok(Downloaded::Bytes(response.body)),
        }
    }

    /// Downloads the attachment tagged `context`. A directory `to_path` receives
    /// the attachment under its own file name.
    pub async fn download_application_attachment(
        &self,
        application: &ApplicationData,
        context: &str,
        to_path: Option<&Path>,
    ) -> Result<Downloaded, RecruitingError> {
        let attachment =
            application
                .attachment(context)
                .ok_or_else(|| RecruitingError::AttachmentNotFound {
                    context: context.to_string(),
                })?;
        let url = attachment
            .url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| RecruitingError::AttachmentMissingUrl {
                context: context.to_string(),
            })?;

        let target = match to_path {
            Some(path) if is_dir(path).await => {
                let file_name = attachment
                    .filename
                    .as_deref()
                    .and_then(|name| Path::new(name).file_name())
                    .map(|name| name.to_os_string())
                    .unwrap_or_else(|| format!("attachment-{}", context).into());
                Some(path.join(file_name))
            }
            Some(path) => Some(path.to_path_buf()),
            None => None,
        };

        self.download_file(url, target.as_deref(), None, DEFAULT_MAX_REDIRECTS)
            .await
    }
}

fn required<'a>(value: &'a str, what: &str) -> Result<&'a str, RecruitingError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RecruitingError::Validation(format!("{} is required", what)));
    }
    Ok(trimmed)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}
