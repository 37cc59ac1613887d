use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Read-only view of a recruiting application, built from the JSON:API response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationData {
    pub id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub attachments: Vec<Attachment>,
    #[serde(skip)]
    pub raw: Value,
}

// Small helper: nested json lookup
pub fn jget<'a>(val: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = val;
    for key in path {
        cur = cur.get(*key)?;
    }
    Some(cur)
}

/// Renders a string or number as an identifier. Blank strings count as absent.
pub fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn attribute(attributes: Option<&Value>, keys: &[&str]) -> Option<String> {
    let attributes = attributes?;
    keys.iter()
        .filter_map(|key| attributes.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

impl ApplicationData {
    pub fn from_json(raw: Value) -> Self {
        let root = raw.get("data").filter(|d| d.is_object()).unwrap_or(&raw);
        let attributes = root.get("attributes");

        let id = root
            .get("id")
            .and_then(value_as_id)
            .or_else(|| jget(root, &["attributes", "id"]).and_then(value_as_id));

        let first_name = attribute(attributes, &["first-name", "first_name", "firstName"]);
        let last_name = attribute(attributes, &["last-name", "last_name", "lastName"]);
        let email = attribute(attributes, &["email"]);
        let full_name = attribute(attributes, &["full-name", "full_name", "fullName"]).or_else(
            || match (first_name.as_deref(), last_name.as_deref()) {
                (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
                (Some(only), None) | (None, Some(only)) => Some(only.to_string()),
                (None, None) => None,
            },
        );

        let attachments = attributes
            .and_then(|attrs| attrs.get("attachments"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.is_object())
                    .filter_map(|item| serde_json::from_value::<Attachment>(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id,
            first_name,
            last_name,
            email,
            full_name,
            attachments,
            raw,
        }
    }

    /// First attachment tagged with `context`.
    pub fn attachment(&self, context: &str) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|a| a.context.as_deref() == Some(context))
    }
}
