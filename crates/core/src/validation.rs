//! Input validation utilities.
//!
//! Registry operations validate caller metadata here, before any store is touched, turning
//! the loosely typed [`DocumentMetadata`] into a [`ValidatedMetadata`] whose fields are all
//! well-formed.

use crate::coding::{Author, CodedValue, DocumentSource};
use crate::constants::{MAX_LANGUAGE_CODE_LEN, MAX_TITLE_LEN};
use crate::entry::{
    AvailabilityStatus, DocumentEntry, DocumentMetadata, EntryId, TrailAction, TrailEvent,
};
use crate::error::{RegistryError, RegistryResult};
use crate::location::LocationId;
use crate::permissions::Actor;
use chrono::{DateTime, Utc};
use docreg_files::StoredContent;
use docreg_types::NonEmptyText;

/// Metadata that passed boundary validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMetadata {
    pub patient_id: NonEmptyText,
    pub title: Option<NonEmptyText>,
    pub comments: Option<String>,
    pub content_type: NonEmptyText,
    pub class_code: Option<CodedValue>,
    pub type_code: Option<CodedValue>,
    pub format_code: Option<CodedValue>,
    pub healthcare_facility_type_code: Option<CodedValue>,
    pub practice_setting_code: Option<CodedValue>,
    pub confidentiality_code: Option<CodedValue>,
    pub author: Option<Author>,
    pub source: DocumentSource,
    pub language_code: Option<NonEmptyText>,
    pub service_start_time: Option<DateTime<Utc>>,
    pub service_stop_time: Option<DateTime<Utc>>,
}

/// Validates caller metadata for a new entry.
///
/// # Errors
///
/// Returns `RegistryError::Validation` naming the first offending field.
pub fn validate_metadata(metadata: DocumentMetadata) -> RegistryResult<ValidatedMetadata> {
    let patient_id = required_text("patient_id", metadata.patient_id)?;
    let content_type = validate_content_type(metadata.content_type)?;

    let title = metadata
        .title
        .filter(|t| !t.trim().is_empty())
        .map(|t| {
            NonEmptyText::bounded(t, MAX_TITLE_LEN).map_err(|e| RegistryError::validation("title", e))
        })
        .transpose()?;

    let language_code = metadata
        .language_code
        .map(|code| {
            NonEmptyText::bounded(code, MAX_LANGUAGE_CODE_LEN)
                .map_err(|e| RegistryError::validation("language_code", e))
        })
        .transpose()?;

    for (field, value) in [
        ("class_code", &metadata.class_code),
        ("type_code", &metadata.type_code),
        ("format_code", &metadata.format_code),
        (
            "healthcare_facility_type_code",
            &metadata.healthcare_facility_type_code,
        ),
        ("practice_setting_code", &metadata.practice_setting_code),
        ("confidentiality_code", &metadata.confidentiality_code),
    ] {
        if let Some(value) = value {
            value.check_bounds(field)?;
        }
    }

    validate_service_period(metadata.service_start_time, metadata.service_stop_time)?;

    Ok(ValidatedMetadata {
        patient_id,
        title,
        comments: metadata.comments.filter(|c| !c.trim().is_empty()),
        content_type,
        class_code: metadata.class_code,
        type_code: metadata.type_code,
        format_code: metadata.format_code,
        healthcare_facility_type_code: metadata.healthcare_facility_type_code,
        practice_setting_code: metadata.practice_setting_code,
        confidentiality_code: metadata.confidentiality_code,
        author: metadata.author,
        source: metadata.source.unwrap_or_default(),
        language_code,
        service_start_time: metadata.service_start_time,
        service_stop_time: metadata.service_stop_time,
    })
}

fn required_text(field: &str, value: Option<String>) -> RegistryResult<NonEmptyText> {
    let value = value.ok_or_else(|| RegistryError::validation(field, "is required"))?;
    NonEmptyText::new(value).map_err(|e| RegistryError::validation(field, e))
}

/// Checks that a declared content type has the `type/subtype` shape.
pub fn validate_content_type(value: Option<String>) -> RegistryResult<NonEmptyText> {
    let content_type = required_text("content_type", value)?;
    let essence = essence(content_type.as_str());

    let well_formed = match essence.split_once('/') {
        Some((major, minor)) => {
            !major.is_empty()
                && !minor.is_empty()
                && !minor.contains('/')
                && essence
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b"/+-.!#$&^_".contains(&b))
        }
        None => false,
    };

    if !well_formed {
        return Err(RegistryError::validation(
            "content_type",
            format!("'{}' is not a MIME type of the form type/subtype", content_type),
        ));
    }
    Ok(content_type)
}

/// `serviceStopTime` must not precede `serviceStartTime`.
pub fn validate_service_period(
    start: Option<DateTime<Utc>>,
    stop: Option<DateTime<Utc>>,
) -> RegistryResult<()> {
    if let (Some(start), Some(stop)) = (start, stop) {
        if stop < start {
            return Err(RegistryError::validation(
                "service_stop_time",
                format!("{} is before service_start_time {}", stop, start),
            ));
        }
    }
    Ok(())
}

/// The MIME type without parameters, lowercased.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Structured syntax shared by a family of media types: the `+xml`/`+json` suffix, or the
/// bare `xml`/`json` subtype under `text` or `application`.
fn structured_syntax(essence: &str) -> Option<&str> {
    let (major, minor) = essence.split_once('/')?;
    if let Some((_, suffix)) = minor.rsplit_once('+') {
        return Some(suffix);
    }
    match (major, minor) {
        ("text" | "application", "xml" | "json") => Some(minor),
        _ => None,
    }
}

/// Returns true when a sniffed media type contradicts the declared one.
///
/// Types agree when they share a top-level type (`application`, `image`, `text`, ...), since
/// sniffing cannot tell apart container formats that share magic bytes, or when they share a
/// structured syntax, so `application/hl7-v3+xml` agrees with a sniffed `text/xml`.
pub fn content_type_mismatch(declared: &NonEmptyText, detected: Option<&NonEmptyText>) -> bool {
    let Some(detected) = detected else {
        return false;
    };
    let declared = essence(declared.as_str());
    let detected = essence(detected.as_str());
    let major = |s: &str| s.split('/').next().unwrap_or_default().to_owned();
    if major(&declared) == major(&detected) {
        return false;
    }
    match (structured_syntax(&declared), structured_syntax(&detected)) {
        (Some(a), Some(b)) => a != b,
        _ => true,
    }
}

impl ValidatedMetadata {
    /// Builds a new `Approved` entry around freshly stored content.
    pub fn into_entry(
        self,
        location_id: LocationId,
        stored: StoredContent,
        actor: &Actor,
        supersedes: Option<EntryId>,
        now: DateTime<Utc>,
    ) -> DocumentEntry {
        let entry_id = EntryId::new();
        DocumentEntry {
            entry_id,
            location_id,
            patient_id: self.patient_id,
            title: self.title,
            comments: self.comments,
            content_type: self.content_type,
            detected_media_type: stored.detected_media_type,
            class_code: self.class_code,
            type_code: self.type_code,
            format_code: self.format_code,
            healthcare_facility_type_code: self.healthcare_facility_type_code,
            practice_setting_code: self.practice_setting_code,
            confidentiality_code: self.confidentiality_code,
            author: self.author,
            source: self.source,
            language_code: self.language_code,
            service_start_time: self.service_start_time,
            service_stop_time: self.service_stop_time,
            availability_status: AvailabilityStatus::Approved,
            content_ref: stored.content_ref,
            content_hash: stored.hash,
            content_size: stored.size_bytes,
            supersedes: supersedes.clone(),
            superseded_by: None,
            created_at: now,
            updated_at: now,
            created_by: actor.identity.clone(),
            audit_trail: vec![TrailEvent {
                action: TrailAction::Registered,
                actor: actor.identity.clone(),
                role: actor.role.clone(),
                at: now,
                reason: None,
                related_entry: supersedes,
            }],
        }
    }
}
