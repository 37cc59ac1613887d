use chrono::{Local, Months, NaiveDate};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::models::application::ApplicationData;

pub const DEFAULT_SITE: &str = "New York (Demo)";
const DEFAULT_START_OFFSET_MONTHS: u32 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("invalid start date: {0}")]
    InvalidStartDate(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartDate {
    Date(NaiveDate),
    Iso(String),
}

impl StartDate {
    fn resolve(&self) -> Result<NaiveDate, PayloadError> {
        match self {
            StartDate::Date(date) => Ok(*date),
            StartDate::Iso(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| PayloadError::InvalidStartDate(raw.clone())),
        }
    }
}

impl From<NaiveDate> for StartDate {
    fn from(date: NaiveDate) -> Self {
        StartDate::Date(date)
    }
}

/// Optional overrides applied on top of the candidate data.
#[derive(Debug, Clone, Default)]
pub struct EmployeeOverrides {
    pub title: Option<String>,
    pub department: Option<String>,
    pub site: Option<String>,
    pub start_date: Option<StartDate>,
}

/// HR-bound employee record. Construction never fails; required fields are
/// checked when the payload is rendered with [`EmployeePayload::to_json`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeePayload {
    pub first_name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
    pub site: Option<String>,
    pub start_date: Option<StartDate>,
}

impl EmployeePayload {
    pub fn new(
        first_name: Option<String>,
        surname: Option<String>,
        email: Option<String>,
        overrides: EmployeeOverrides,
    ) -> Self {
        Self {
            first_name,
            surname,
            email,
            title: overrides.title,
            department: overrides.department,
            site: overrides.site.or_else(|| Some(DEFAULT_SITE.to_string())),
            start_date: overrides.start_date,
        }
    }

    pub fn from_recruiting_data(application: &ApplicationData, overrides: EmployeeOverrides) -> Self {
        Self::new(
            application.first_name.clone(),
            application.last_name.clone(),
            application.email.clone(),
            overrides,
        )
    }

    pub fn to_json(&self) -> Result<Value, PayloadError> {
        self.to_json_as_of(Local::now().date_naive())
    }

    fn to_json_as_of(&self, today: NaiveDate) -> Result<Value, PayloadError> {
        let required = [
            ("firstName", &self.first_name),
            ("surname", &self.surname),
            ("email", &self.email),
        ];
        let missing: Vec<&'static str> = required
            .iter()
            .filter(|(_, value)| is_blank(value))
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(PayloadError::MissingFields(missing));
        }

        let start_date = match &self.start_date {
            Some(date) => date.resolve()?,
            None => default_start_date(today),
        };

        let mut work = Map::new();
        for (key, value) in [
            ("title", &self.title),
            ("department", &self.department),
            ("site", &self.site),
        ] {
            if let Some(value) = value {
                work.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        work.insert(
            "startDate".to_string(),
            Value::String(start_date.format("%Y-%m-%d").to_string()),
        );

        Ok(json!({
            "firstName": self.first_name,
            "surname": self.surname,
            "email": self.email,
            "work": work,
        }))
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or_default().is_empty()
}

pub fn default_start_date(today: NaiveDate) -> NaiveDate {
    today
        .checked_add_months(Months::new(DEFAULT_START_OFFSET_MONTHS))
        .unwrap_or(today)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> EmployeePayload {
        EmployeePayload::new(
            Some("Ada".into()),
            Some("Lovelace".into()),
            Some("ada@example.com".into()),
            EmployeeOverrides::default(),
        )
    }

    #[test]
    fn serializes_with_defaults() {
        let today = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let json = complete().to_json_as_of(today).unwrap();
        assert_eq!(json["firstName"], "Ada");
        assert_eq!(json["surname"], "Lovelace");
        assert_eq!(json["email"], "ada@example.com");
        assert_eq!(json["work"]["site"], DEFAULT_SITE);
        // Clamped to the last day of February.
        assert_eq!(json["work"]["startDate"], "2025-02-28");
        assert!(json["work"].get("title").is_none());
        assert!(json["work"].get("department").is_none());
    }

    #[test]
    fn default_start_date_is_two_months_from_today() {
        let json = complete().to_json().unwrap();
        let expected = Local::now()
            .date_naive()
            .checked_add_months(Months::new(2))
            .unwrap()
            .format("%Y-%m-%d")
            .to_string();
        assert_eq!(json["work"]["startDate"], expected);
    }

    #[test]
    fn missing_fields_are_listed_in_order() {
        let payload = EmployeePayload::new(
            None,
            Some("  ".into()),
            None,
            EmployeeOverrides::default(),
        );
        let err = payload.to_json().unwrap_err();
        assert_eq!(
            err,
            PayloadError::MissingFields(vec!["firstName", "surname", "email"])
        );
        assert_eq!(
            err.to_string(),
            "missing required fields: firstName, surname, email"
        );

        let only_email = EmployeePayload::new(
            Some("Ada".into()),
            Some("Lovelace".into()),
            None,
            EmployeeOverrides::default(),
        );
        assert_eq!(
            only_email.to_json().unwrap_err(),
            PayloadError::MissingFields(vec!["email"])
        );
    }

    #[test]
    fn overrides_and_iso_start_date() {
        let payload = EmployeePayload::new(
            Some("Ada".into()),
            Some("Lovelace".into()),
            Some("ada@example.com".into()),
            EmployeeOverrides {
                title: Some("Engineer".into()),
                department: Some("R&D".into()),
                site: Some("London".into()),
                start_date: Some(StartDate::Iso("2025-03-01".into())),
            },
        );
        let json = payload.to_json().unwrap();
        assert_eq!(
            json["work"],
            json!({
                "title": "Engineer",
                "department": "R&D",
                "site": "London",
                "startDate": "2025-03-01"
            })
        );
    }

    #[test]
    fn native_date_and_bad_iso_string() {
        let mut payload = complete();
        payload.start_date = Some(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap().into());
        assert_eq!(payload.to_json().unwrap()["work"]["startDate"], "2025-06-02");

        payload.start_date = Some(StartDate::Iso("next monday".into()));
        assert_eq!(
            payload.to_json().unwrap_err(),
            PayloadError::InvalidStartDate("next monday".into())
        );
    }

    #[test]
    fn from_recruiting_data_maps_names() {
        let app = ApplicationData::from_json(json!({
            "data": { "id": "1", "attributes": {
                "first-name": "Grace", "last-name": "Hopper", "email": "grace@example.com"
            }}
        }));
        let payload = EmployeePayload::from_recruiting_data(&app, EmployeeOverrides::default());
        assert_eq!(payload.first_name.as_deref(), Some("Grace"));
        assert_eq!(payload.surname.as_deref(), Some("Hopper"));
        assert_eq!(payload.email.as_deref(), Some("grace@example.com"));
        assert_eq!(payload.site.as_deref(), Some(DEFAULT_SITE));
        assert!(payload.start_date.is_none());
    }
}
