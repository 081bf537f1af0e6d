//! Document entry model.
//!
//! A [`DocumentEntry`] is one version of a registered document. Versions of the same document
//! form a chain through `supersedes` / `superseded_by`. The entry that is `Approved` and not
//! superseded is the chain's head; it is the only version returned by default queries.

use crate::coding::{Author, CodedValue, DocumentSource};
use crate::location::LocationId;
use crate::permissions::Role;
use chrono::{DateTime, Utc};
use docreg_types::NonEmptyText;
use docreg_uuid::{Sha256Hash, UuidService};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a single document entry version.
pub type EntryId = UuidService;

/// Reference to stored content in the content store.
pub type ContentRef = UuidService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AvailabilityStatus {
    Approved,
    Deprecated,
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvailabilityStatus::Approved => f.write_str("Approved"),
            AvailabilityStatus::Deprecated => f.write_str("Deprecated"),
        }
    }
}

impl std::str::FromStr for AvailabilityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approved" => Ok(AvailabilityStatus::Approved),
            "deprecated" => Ok(AvailabilityStatus::Deprecated),
            other => Err(format!("unknown availability status '{}'", other)),
        }
    }
}

/// Lifecycle transitions recorded on an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailAction {
    Registered,
    Superseded,
    Deprecated,
}

/// One record in an entry's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailEvent {
    pub action: TrailAction,
    pub actor: NonEmptyText,
    pub role: Role,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The other entry involved, e.g. the successor for `Superseded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_entry: Option<EntryId>,
}

/// One stored version of a clinical document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub entry_id: EntryId,
    pub location_id: LocationId,
    pub patient_id: NonEmptyText,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<NonEmptyText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,

    /// Caller-declared MIME type; authoritative for response encoding.
    pub content_type: NonEmptyText,
    /// Media type sniffed from the bytes at registration, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_media_type: Option<NonEmptyText>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_code: Option<CodedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_code: Option<CodedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_code: Option<CodedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcare_facility_type_code: Option<CodedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practice_setting_code: Option<CodedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidentiality_code: Option<CodedValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    pub source: DocumentSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<NonEmptyText>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_stop_time: Option<DateTime<Utc>>,

    pub availability_status: AvailabilityStatus,

    pub content_ref: ContentRef,
    pub content_hash: Sha256Hash,
    pub content_size: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<EntryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<EntryId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: NonEmptyText,

    #[serde(default)]
    pub audit_trail: Vec<TrailEvent>,
}

impl DocumentEntry {
    /// True when this entry is the current version of its chain.
    pub fn is_head(&self) -> bool {
        self.availability_status == AvailabilityStatus::Approved && self.superseded_by.is_none()
    }

    pub fn is_deprecated(&self) -> bool {
        self.availability_status == AvailabilityStatus::Deprecated
    }
}

/// Caller-supplied metadata for `register`.
///
/// Fields are loosely typed here and validated at the registry boundary, so that a missing
/// required field is reported as a validation error rather than a parse error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentMetadata {
    pub patient_id: Option<String>,
    pub title: Option<String>,
    pub comments: Option<String>,
    pub content_type: Option<String>,
    pub class_code: Option<CodedValue>,
    pub type_code: Option<CodedValue>,
    pub format_code: Option<CodedValue>,
    pub healthcare_facility_type_code: Option<CodedValue>,
    pub practice_setting_code: Option<CodedValue>,
    pub confidentiality_code: Option<CodedValue>,
    pub author: Option<Author>,
    pub source: Option<DocumentSource>,
    pub language_code: Option<String>,
    pub service_start_time: Option<DateTime<Utc>>,
    pub service_stop_time: Option<DateTime<Utc>>,
}

/// Metadata changes applied by `update`; unset fields are inherited from the prior head.
pub type MetadataPatch = DocumentMetadata;

impl DocumentMetadata {
    /// Fills every unset field from `prior`.
    pub fn merged_over(self, prior: &DocumentEntry) -> DocumentMetadata {
        DocumentMetadata {
            patient_id: self
                .patient_id
                .or_else(|| Some(prior.patient_id.to_string())),
            title: self
                .title
                .or_else(|| prior.title.as_ref().map(ToString::to_string)),
            comments: self.comments.or_else(|| prior.comments.clone()),
            content_type: self
                .content_type
                .or_else(|| Some(prior.content_type.to_string())),
            class_code: self.class_code.or_else(|| prior.class_code.clone()),
            type_code: self.type_code.or_else(|| prior.type_code.clone()),
            format_code: self.format_code.or_else(|| prior.format_code.clone()),
            healthcare_facility_type_code: self
                .healthcare_facility_type_code
                .or_else(|| prior.healthcare_facility_type_code.clone()),
            practice_setting_code: self
                .practice_setting_code
                .or_else(|| prior.practice_setting_code.clone()),
            confidentiality_code: self
                .confidentiality_code
                .or_else(|| prior.confidentiality_code.clone()),
            author: self.author.or_else(|| prior.author.clone()),
            source: self.source.or(Some(prior.source)),
            language_code: self
                .language_code
                .or_else(|| prior.language_code.as_ref().map(ToString::to_string)),
            service_start_time: self.service_start_time.or(prior.service_start_time),
            service_stop_time: self.service_stop_time.or(prior.service_stop_time),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds an approved entry with only the required fields populated.
    pub(crate) fn sample_entry(location: &str, patient: &str) -> DocumentEntry {
        let now = Utc::now();
        DocumentEntry {
            entry_id: EntryId::new(),
            location_id: LocationId::parse(location).unwrap(),
            patient_id: NonEmptyText::new(patient).unwrap(),
            title: None,
            comments: None,
            content_type: NonEmptyText::new("text/plain").unwrap(),
            detected_media_type: None,
            class_code: None,
            type_code: None,
            format_code: None,
            healthcare_facility_type_code: None,
            practice_setting_code: None,
            confidentiality_code: None,
            author: None,
            source: DocumentSource::Internal,
            language_code: None,
            service_start_time: None,
            service_stop_time: None,
            availability_status: AvailabilityStatus::Approved,
            content_ref: ContentRef::new(),
            content_hash: Sha256Hash::from_bytes(&[0; 32]),
            content_size: 0,
            supersedes: None,
            superseded_by: None,
            created_at: now,
            updated_at: now,
            created_by: NonEmptyText::new("dr-weber").unwrap(),
            audit_trail: Vec::new(),
        }
    }

    #[test]
    fn head_requires_approved_and_not_superseded() {
        let mut entry = sample_entry("L1", "P1");
        assert!(entry.is_head());

        entry.superseded_by = Some(EntryId::new());
        assert!(!entry.is_head());

        entry.superseded_by = None;
        entry.availability_status = AvailabilityStatus::Deprecated;
        assert!(!entry.is_head());
        assert!(entry.is_deprecated());
    }

    #[test]
    fn merged_over_keeps_patch_values_and_inherits_the_rest() {
        let mut prior = sample_entry("L1", "P1");
        prior.title = Some(NonEmptyText::new("Laborbefund").unwrap());
        prior.class_code = Some(CodedValue::new("LAB", "local", "Labor").unwrap());
        prior.source = DocumentSource::External;

        let patch = MetadataPatch {
            title: Some("Laborbefund (korrigiert)".into()),
            ..Default::default()
        };
        let merged = patch.merged_over(&prior);

        assert_eq!(merged.title.as_deref(), Some("Laborbefund (korrigiert)"));
        assert_eq!(merged.patient_id.as_deref(), Some("P1"));
        assert_eq!(merged.content_type.as_deref(), Some("text/plain"));
        assert_eq!(merged.class_code, prior.class_code);
        assert_eq!(merged.source, Some(DocumentSource::External));
    }

    #[test]
    fn entry_yaml_roundtrip_keeps_chain_links() {
        let mut entry = sample_entry("L1", "P1");
        entry.supersedes = Some(EntryId::new());

        let yaml = serde_yaml::to_string(&entry).unwrap();
        assert!(yaml.contains("availability_status: Approved"));
        assert!(!yaml.contains("superseded_by"));

        let back: DocumentEntry = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(
            "deprecated".parse::<AvailabilityStatus>().unwrap(),
            AvailabilityStatus::Deprecated
        );
        assert!("gone".parse::<AvailabilityStatus>().is_err());
    }
}
