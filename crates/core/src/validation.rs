//! Client-side validation for request payloads
//!
//! Requests are checked before they are sent so that bad input is reported
//! per field without a round trip to the backend.

use crate::types::{
    ApiStatus, CreateApiRequest, CreateEndpointRequest, Pricing, ReviewDecision,
    UpdateApiRequest, UpdateEndpointRequest, UpdateProfileRequest,
};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 2000;

/// A single field that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every problem found in one payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    /// Record the outcome of a single check
    pub fn check(&mut self, result: Result<(), FieldError>) {
        if let Err(err) = result {
            self.errors.push(err);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Messages for one field, in the order they were found
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.errors
            .iter()
            .filter(move |e| e.field == field)
            .map(|e| e.message.as_str())
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Trait for payloads that can be checked before submission
pub trait Validate {
    /// Returns Ok(()) if valid, or every field error found
    fn validate(&self) -> Result<(), ValidationErrors>;
}

/// Common validation helpers
pub mod validators {
    use super::FieldError;

    fn fail(field: &str, message: impl Into<String>) -> Result<(), FieldError> {
        Err(FieldError {
            field: field.to_string(),
            message: message.into(),
        })
    }

    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field: &str) -> Result<(), FieldError> {
        if value.trim().is_empty() {
            return fail(field, "cannot be empty");
        }
        Ok(())
    }

    /// Validate that a string fits in `max` characters
    pub fn validate_max_len(value: &str, max: usize, field: &str) -> Result<(), FieldError> {
        if value.chars().count() > max {
            return fail(field, format!("must be at most {max} characters"));
        }
        Ok(())
    }

    /// Validate URL format; only http and https are accepted
    pub fn validate_url(value: &str, field: &str) -> Result<(), FieldError> {
        match url::Url::parse(value) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
            Ok(url) => fail(field, format!("unsupported scheme '{}'", url.scheme())),
            Err(e) => fail(field, format!("invalid URL - {e}")),
        }
    }

    /// Validate that an endpoint path is absolute
    pub fn validate_path(path: &str, field: &str) -> Result<(), FieldError> {
        if !path.starts_with('/') {
            return fail(field, "must start with '/'");
        }
        if path.chars().any(char::is_whitespace) {
            return fail(field, "cannot contain whitespace");
        }
        Ok(())
    }
}

use validators::*;

fn check_name(errors: &mut ValidationErrors, name: &str) {
    errors.check(validate_not_empty(name, "name"));
    errors.check(validate_max_len(name, MAX_NAME_LEN, "name"));
}

fn check_pricing(errors: &mut ValidationErrors, pricing: &Pricing) {
    if let Pricing::Paid { price_per_call } = pricing {
        if price_per_call.is_sign_negative() || price_per_call.is_zero() {
            errors.add("pricing", "paid pricing needs a positive price per call");
        }
    }
}

fn check_optional_url(errors: &mut ValidationErrors, url: Option<&str>, field: &str) {
    if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
        errors.check(validate_url(url, field));
    }
}

impl Validate for CreateApiRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_name(&mut errors, &self.name);
        errors.check(validate_max_len(
            &self.description,
            MAX_DESCRIPTION_LEN,
            "description",
        ));
        errors.check(validate_url(&self.base_url, "base_url"));
        check_optional_url(&mut errors, self.documentation_url.as_deref(), "documentation_url");
        check_pricing(&mut errors, &self.pricing);
        errors.into_result()
    }
}

impl Validate for UpdateApiRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.is_empty() {
            errors.add("request", "nothing to update");
        }
        if let Some(name) = &self.name {
            check_name(&mut errors, name);
        }
        if let Some(description) = &self.description {
            errors.check(validate_max_len(
                description,
                MAX_DESCRIPTION_LEN,
                "description",
            ));
        }
        if let Some(base_url) = &self.base_url {
            errors.check(validate_url(base_url, "base_url"));
        }
        check_optional_url(&mut errors, self.documentation_url.as_deref(), "documentation_url");
        if let Some(pricing) = &self.pricing {
            check_pricing(&mut errors, pricing);
        }
        errors.into_result()
    }
}

impl Validate for CreateEndpointRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_name(&mut errors, &self.name);
        errors.check(validate_path(&self.path, "path"));
        errors.check(validate_max_len(
            &self.description,
            MAX_DESCRIPTION_LEN,
            "description",
        ));
        errors.into_result()
    }
}

impl Validate for UpdateEndpointRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self == &Self::default() {
            errors.add("request", "nothing to update");
        }
        if let Some(name) = &self.name {
            check_name(&mut errors, name);
        }
        if let Some(path) = &self.path {
            errors.check(validate_path(path, "path"));
        }
        if let Some(description) = &self.description {
            errors.check(validate_max_len(
                description,
                MAX_DESCRIPTION_LEN,
                "description",
            ));
        }
        errors.into_result()
    }
}

impl Validate for UpdateProfileRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(name) = &self.display_name {
            errors.check(validate_not_empty(name, "display_name"));
            errors.check(validate_max_len(name, MAX_NAME_LEN, "display_name"));
        }
        check_optional_url(&mut errors, self.avatar_url.as_deref(), "avatar_url");
        errors.into_result()
    }
}

impl Validate for ReviewDecision {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        match self.status {
            ApiStatus::Approved => {}
            ApiStatus::Rejected => match self.reason.as_deref() {
                Some(reason) => errors.check(validate_not_empty(reason, "reason")),
                None => errors.add("reason", "a rejection needs a reason"),
            },
            other => errors.add("status", format!("'{other}' is not a review outcome")),
        }
        errors.into_result()
    }
}
