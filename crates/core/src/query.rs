//! Query predicates, ordering and pagination over document entries.

use crate::coding::{CodedValue, DocumentSource};
use crate::entry::{AvailabilityStatus, DocumentEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Matches a coded attribute by code, and by coding scheme when one is given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMatch {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coding_scheme: Option<String>,
}

impl CodeMatch {
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            coding_scheme: None,
        }
    }

    pub fn with_scheme(code: impl Into<String>, coding_scheme: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            coding_scheme: Some(coding_scheme.into()),
        }
    }

    fn matches(&self, value: Option<&CodedValue>) -> bool {
        let Some(value) = value else {
            return false;
        };
        value.code.as_str() == self.code.trim()
            && self
                .coding_scheme
                .as_deref()
                .map_or(true, |scheme| value.coding_scheme.as_str() == scheme.trim())
    }
}

/// Filters for a registry query. Every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryFilter {
    pub patient_id: Option<String>,
    pub class_code: Option<CodeMatch>,
    pub type_code: Option<CodeMatch>,
    pub format_code: Option<CodeMatch>,
    pub healthcare_facility_type_code: Option<CodeMatch>,
    pub practice_setting_code: Option<CodeMatch>,
    pub confidentiality_code: Option<CodeMatch>,
    pub source: Option<DocumentSource>,
    /// Case-insensitive substring of the title.
    pub title: Option<String>,
    /// Start of the window the service period must overlap.
    pub date_from: Option<DateTime<Utc>>,
    /// End of the window the service period must overlap.
    pub date_to: Option<DateTime<Utc>>,
    /// Statuses to include; `None` means only `Approved`.
    pub statuses: Option<Vec<AvailabilityStatus>>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

/// One page of query results plus the total number of matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPage {
    pub entries: Vec<DocumentEntry>,
    pub total: usize,
}

impl QueryFilter {
    pub fn for_patient(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: Some(patient_id.into()),
            ..Default::default()
        }
    }

    /// Include deprecated entries alongside approved ones.
    pub fn including_deprecated(mut self) -> Self {
        self.statuses = Some(vec![
            AvailabilityStatus::Approved,
            AvailabilityStatus::Deprecated,
        ]);
        self
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.patient_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Tests every predicate except pagination.
    pub fn matches(&self, entry: &DocumentEntry) -> bool {
        let status_ok = match &self.statuses {
            Some(statuses) => statuses.contains(&entry.availability_status),
            None => entry.availability_status == AvailabilityStatus::Approved,
        };
        if !status_ok {
            return false;
        }

        if let Some(patient_id) = self.patient_id() {
            if entry.patient_id.as_str() != patient_id {
                return false;
            }
        }

        let coded = [
            (&self.class_code, entry.class_code.as_ref()),
            (&self.type_code, entry.type_code.as_ref()),
            (&self.format_code, entry.format_code.as_ref()),
            (
                &self.healthcare_facility_type_code,
                entry.healthcare_facility_type_code.as_ref(),
            ),
            (
                &self.practice_setting_code,
                entry.practice_setting_code.as_ref(),
            ),
            (
                &self.confidentiality_code,
                entry.confidentiality_code.as_ref(),
            ),
        ];
        if coded.iter().any(|(filter, value)| match filter {
            Some(f) => !f.matches(*value),
            None => false,
        }) {
            return false;
        }

        if let Some(source) = self.source {
            if entry.source != source {
                return false;
            }
        }

        if let Some(needle) = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let needle = needle.to_lowercase();
            let found = entry
                .title
                .as_ref()
                .is_some_and(|title| title.as_str().to_lowercase().contains(&needle));
            if !found {
                return false;
            }
        }

        self.overlaps_service_period(entry)
    }

    /// An entry's period is `[start, stop]`, with `stop` defaulting to `start`.
    ///
    /// Entries without a start time never match a date-constrained query.
    fn overlaps_service_period(&self, entry: &DocumentEntry) -> bool {
        if self.date_from.is_none() && self.date_to.is_none() {
            return true;
        }
        let Some(start) = entry.service_start_time else {
            return false;
        };
        let stop = entry.service_stop_time.unwrap_or(start);

        self.date_to.map_or(true, |to| start <= to)
            && self.date_from.map_or(true, |from| stop >= from)
    }
}

/// Newest first; equal creation times fall back to ascending entry id.
pub fn result_order(a: &DocumentEntry, b: &DocumentEntry) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.entry_id.cmp(&b.entry_id))
}

/// Sorts matches and cuts out the requested page.
pub fn paginate(mut matches: Vec<DocumentEntry>, skip: usize, limit: usize) -> QueryPage {
    let total = matches.len();
    matches.sort_by(result_order);
    let entries = matches.into_iter().skip(skip).take(limit).collect();
    QueryPage { entries, total }
}
