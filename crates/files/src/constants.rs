/// Directory name, under each location, holding stored document bytes.
pub const FILES_FOLDER_NAME: &str = "files";

/// Prefix for in-flight temporary files; never listed as content.
pub(crate) const TEMP_FILE_PREFIX: &str = ".tmp-";

/// Attempts made to allocate an unused content reference before giving up.
pub(crate) const MAX_ALLOCATION_ATTEMPTS: usize = 5;
