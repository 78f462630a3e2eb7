//! Validator - RawFeedback -> FeedbackRecord
//!
//! Rules run in a fixed order so the first reported error is deterministic:
//! text, url, systems, offset, feedback, manual flag, optional strings.

use contracts::{
    fields, ContractError, FeedbackRecord, FeedbackVerdict, OffsetPolicy, RawFeedback,
    ValidationConfig,
};
use url::Url;

use crate::{BatchError, ValidationError};

/// Turns untrusted fields into validated records
#[derive(Debug, Clone)]
pub struct Validator {
    placeholder_base: String,
    offset_policy: OffsetPolicy,
}

impl Validator {
    /// Create a validator from configuration
    ///
    /// # Errors
    /// Fails when the placeholder base cannot produce absolute URLs.
    pub fn new(config: &ValidationConfig) -> Result<Self, ContractError> {
        Url::parse(&config.placeholder_url_base).map_err(|e| {
            ContractError::config_validation(
                "validation.placeholder_url_base",
                format!("'{}' is not an absolute URL: {}", config.placeholder_url_base, e),
            )
        })?;

        Ok(Self {
            placeholder_base: config.placeholder_url_base.clone(),
            offset_policy: config.offset_policy,
        })
    }

    /// Validate one submission
    pub fn validate(&self, raw: &RawFeedback) -> Result<FeedbackRecord, ValidationError> {
        let text = raw
            .get(fields::TEXT)
            .ok_or(ValidationError::MissingField {
                field: fields::TEXT,
            })?
            .to_string();

        let doc_url = self.resolve_url(raw.get(fields::URL), &text)?;
        let systems = split_systems(raw.get(fields::SYSTEMS));
        let offset = self.parse_offset(raw.get(fields::OFFSET))?;
        let verdict = parse_verdict(raw.get(fields::FEEDBACK))?;
        let is_manual = parse_flag(fields::IS_MANUAL, raw.get(fields::IS_MANUAL))?;

        Ok(FeedbackRecord {
            text,
            doc_url,
            entity_uri: trimmed(raw.get(fields::ENTITY_URI)).unwrap_or_default(),
            surface_form: trimmed(raw.get(fields::SURFACE_FORM)).unwrap_or_default(),
            offset,
            verdict,
            systems,
            is_manual,
            language: trimmed(raw.get(fields::LANGUAGE)),
            discourse_type: trimmed(raw.get(fields::DISCOURSE_TYPE)),
            right_entity: trimmed(raw.get(fields::RIGHT_ENTITY)),
        })
    }

    /// Validate every batch item; the first failure rejects the whole batch
    pub fn validate_batch(&self, items: &[RawFeedback]) -> Result<Vec<FeedbackRecord>, BatchError> {
        if items.is_empty() {
            return Err(BatchError::Empty);
        }
        items
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                self.validate(raw)
                    .map_err(|source| BatchError::Item { index, source })
            })
            .collect()
    }

    fn resolve_url(&self, value: Option<&str>, text: &str) -> Result<Url, ValidationError> {
        match value.map(str::trim) {
            Some(value) => Url::parse(value).map_err(|_| ValidationError::MalformedUrl {
                value: value.to_string(),
            }),
            None => placeholder_url(&self.placeholder_base, text),
        }
    }

    fn parse_offset(&self, value: Option<&str>) -> Result<Option<u32>, ValidationError> {
        let Some(value) = value.map(str::trim) else {
            return Ok(None);
        };
        match value.parse::<u32>() {
            Ok(offset) => Ok(Some(offset)),
            Err(_) => match self.offset_policy {
                OffsetPolicy::Reject => Err(ValidationError::InvalidOffset {
                    value: value.to_string(),
                }),
                OffsetPolicy::Unspecified => Ok(None),
            },
        }
    }
}

/// Placeholder URL for a text: `<base><text_hash(text)>`
pub fn placeholder_url(base: &str, text: &str) -> Result<Url, ValidationError> {
    let candidate = format!("{}{}", base, text_hash(text));
    Url::parse(&candidate).map_err(|_| ValidationError::MalformedUrl { value: candidate })
}

/// Stable 32-bit polynomial hash (`h = 31 * h + c` over UTF-16 code units)
pub fn text_hash(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

fn split_systems(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(|c: char| c.is_whitespace() || c == ',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_verdict(value: Option<&str>) -> Result<FeedbackVerdict, ValidationError> {
    let raw = value.unwrap_or_default();
    FeedbackVerdict::from_normalized(&raw.trim().to_lowercase()).ok_or_else(|| {
        ValidationError::InvalidFeedbackValue {
            value: raw.to_string(),
        }
    })
}

fn parse_flag(field: &'static str, value: Option<&str>) -> Result<bool, ValidationError> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ValidationError::InvalidFlag {
            field,
            value: value.to_string(),
        }),
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}
