//! Constants used throughout the registry core crate.

/// Default directory for registry data when none is configured.
pub const DEFAULT_DATA_DIR: &str = "document_data";

/// Subdirectory of the data directory holding document bytes.
pub const CONTENT_DIR_NAME: &str = "content";

/// Subdirectory of the data directory holding document entry records.
pub const METADATA_DIR_NAME: &str = "metadata";

/// Directory name, under each location, holding entry YAML files.
pub const ENTRIES_DIR_NAME: &str = "entries";

/// File extension of persisted entry records.
pub const ENTRY_FILE_EXTENSION: &str = "yaml";

/// Filename of the permission table inside the data directory.
pub const LOCATIONS_FILENAME: &str = "locations.yaml";

/// Page size used when a query does not set `limit`.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Upper bound on a single query page.
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Maximum length of a location identifier.
pub const MAX_LOCATION_ID_LEN: usize = 128;

/// Maximum length of a document title.
pub const MAX_TITLE_LEN: usize = 512;

/// Maximum length of a BCP-47 language tag.
pub const MAX_LANGUAGE_CODE_LEN: usize = 35;

/// Maximum length of any single code, coding scheme or display name.
pub const MAX_CODE_COMPONENT_LEN: usize = 256;
