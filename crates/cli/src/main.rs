use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use docreg_core::constants::{DEFAULT_DATA_DIR, LOCATIONS_FILENAME};
use docreg_core::{
    load_locations_file, Actor, AvailabilityStatus, CodeMatch, CodedValue, CoreConfig,
    DocumentMetadata, DocumentSource, EntryId, LocationId, QueryFilter, RegistryService,
    TracingAuditSink,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "docreg")]
#[command(about = "Per-location clinical document registry")]
struct Cli {
    /// Root directory for stored content and metadata
    #[arg(long, env = "DOCREG_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,
    /// Location permission table (default: <data-dir>/locations.yaml)
    #[arg(long, env = "DOCREG_LOCATIONS_FILE")]
    locations_file: Option<PathBuf>,
    /// Reject documents whose sniffed media type contradicts the declared one
    #[arg(long)]
    reject_content_type_mismatch: bool,
    /// Page size for queries that do not pass --limit
    #[arg(long, env = "DOCREG_DEFAULT_QUERY_LIMIT")]
    default_query_limit: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

/// Who is calling, and where.
#[derive(Args)]
struct Caller {
    /// Location id
    #[arg(long)]
    location: LocationId,
    /// Role of the caller, checked against the location's permissions
    #[arg(long)]
    role: String,
    /// Identity of the caller, recorded in audit trails
    #[arg(long)]
    actor: String,
}

impl Caller {
    fn actor(&self) -> anyhow::Result<Actor> {
        Actor::new(&self.role, &self.actor).map_err(|e| anyhow!("invalid actor: {}", e))
    }
}

#[derive(Args, Default)]
struct MetadataArgs {
    /// YAML or JSON file with document metadata; flags override its fields
    #[arg(long)]
    metadata: Option<PathBuf>,
    #[arg(long)]
    patient_id: Option<String>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    comments: Option<String>,
    /// Declared MIME type, e.g. application/pdf
    #[arg(long)]
    content_type: Option<String>,
    /// Coded value as code^display^scheme
    #[arg(long)]
    class_code: Option<String>,
    /// Coded value as code^display^scheme
    #[arg(long)]
    type_code: Option<String>,
    /// Coded value as code^display^scheme
    #[arg(long)]
    format_code: Option<String>,
    /// Coded value as code^display^scheme
    #[arg(long)]
    healthcare_facility_type_code: Option<String>,
    /// Coded value as code^display^scheme
    #[arg(long)]
    practice_setting_code: Option<String>,
    /// Coded value as code^display^scheme
    #[arg(long)]
    confidentiality_code: Option<String>,
    /// internal or external
    #[arg(long)]
    source: Option<DocumentSource>,
    #[arg(long)]
    language_code: Option<String>,
    /// RFC 3339 timestamp
    #[arg(long)]
    service_start: Option<DateTime<Utc>>,
    /// RFC 3339 timestamp
    #[arg(long)]
    service_stop: Option<DateTime<Utc>>,
}

/// Query filters. Code filters take `code` or `code^scheme`.
#[derive(Args, Default)]
struct QueryArgs {
    #[arg(long)]
    patient_id: Option<String>,
    #[arg(long)]
    class_code: Option<String>,
    #[arg(long)]
    type_code: Option<String>,
    #[arg(long)]
    format_code: Option<String>,
    #[arg(long)]
    healthcare_facility_type_code: Option<String>,
    #[arg(long)]
    practice_setting_code: Option<String>,
    #[arg(long)]
    confidentiality_code: Option<String>,
    #[arg(long)]
    source: Option<DocumentSource>,
    /// Case-insensitive title substring
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    date_from: Option<DateTime<Utc>>,
    #[arg(long)]
    date_to: Option<DateTime<Utc>>,
    /// Include deprecated entries
    #[arg(long)]
    include_deprecated: bool,
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    skip: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new document
    Register {
        #[command(flatten)]
        caller: Caller,
        /// File holding the document content
        file: PathBuf,
        #[command(flatten)]
        metadata: MetadataArgs,
    },
    /// Query document entries
    Query {
        #[command(flatten)]
        caller: Caller,
        #[command(flatten)]
        filter: QueryArgs,
    },
    /// Retrieve a document's content
    Retrieve {
        #[command(flatten)]
        caller: Caller,
        entry_id: EntryId,
        /// Where to write the content; the entry is printed either way
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Supersede a document with new content
    Update {
        #[command(flatten)]
        caller: Caller,
        entry_id: EntryId,
        /// File holding the new content
        file: PathBuf,
        #[command(flatten)]
        metadata: MetadataArgs,
    },
    /// Mark a document deprecated
    Deprecate {
        #[command(flatten)]
        caller: Caller,
        entry_id: EntryId,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Hard-delete a document entry
    Delete {
        #[command(flatten)]
        caller: Caller,
        entry_id: EntryId,
        /// Delete even if the entry is still approved
        #[arg(long)]
        force: bool,
    },
    /// Show the version chain of a document
    Versions {
        #[command(flatten)]
        caller: Caller,
        entry_id: EntryId,
    },
    /// Remove content no entry references
    Gc {
        #[command(flatten)]
        caller: Caller,
    },
}

/// Parses `code^display^scheme`.
fn parse_coded(field: &str, value: &str) -> anyhow::Result<CodedValue> {
    let mut parts = value.splitn(3, '^');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(code), Some(display), Some(scheme)) => {
            CodedValue::new(code, scheme, display).with_context(|| format!("--{}", field))
        }
        _ => bail!("--{} must be code^display^scheme, got '{}'", field, value),
    }
}

/// Parses `code` or `code^scheme`.
fn parse_code_match(value: String) -> CodeMatch {
    match value.split_once('^') {
        Some((code, scheme)) => CodeMatch::with_scheme(code, scheme),
        None => CodeMatch::code(value),
    }
}

impl QueryArgs {
    fn into_filter(self) -> QueryFilter {
        let statuses = self.include_deprecated.then(|| {
            vec![AvailabilityStatus::Approved, AvailabilityStatus::Deprecated]
        });
        QueryFilter {
            patient_id: self.patient_id,
            class_code: self.class_code.map(parse_code_match),
            type_code: self.type_code.map(parse_code_match),
            format_code: self.format_code.map(parse_code_match),
            healthcare_facility_type_code: self
                .healthcare_facility_type_code
                .map(parse_code_match),
            practice_setting_code: self.practice_setting_code.map(parse_code_match),
            confidentiality_code: self.confidentiality_code.map(parse_code_match),
            source: self.source,
            title: self.title,
            date_from: self.date_from,
            date_to: self.date_to,
            statuses,
            limit: self.limit,
            skip: self.skip,
        }
    }
}

fn read_metadata_file(path: &Path) -> anyhow::Result<DocumentMetadata> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read metadata file {}", path.display()))?;
    // YAML is a superset of JSON, so one parser covers both.
    serde_yaml::from_str(&text)
        .with_context(|| format!("failed to parse metadata file {}", path.display()))
}

impl MetadataArgs {
    fn into_metadata(self) -> anyhow::Result<DocumentMetadata> {
        let mut metadata = match &self.metadata {
            Some(path) => read_metadata_file(path)?,
            None => DocumentMetadata::default(),
        };

        let coded = |field: &str, value: Option<String>| {
            value.map(|v| parse_coded(field, &v)).transpose()
        };

        if let Some(v) = self.patient_id {
            metadata.patient_id = Some(v);
        }
        if let Some(v) = self.title {
            metadata.title = Some(v);
        }
        if let Some(v) = self.comments {
            metadata.comments = Some(v);
        }
        if let Some(v) = self.content_type {
            metadata.content_type = Some(v);
        }
        if let Some(v) = coded("class-code", self.class_code)? {
            metadata.class_code = Some(v);
        }
        if let Some(v) = coded("type-code", self.type_code)? {
            metadata.type_code = Some(v);
        }
        if let Some(v) = coded("format-code", self.format_code)? {
            metadata.format_code = Some(v);
        }
        if let Some(v) = coded(
            "healthcare-facility-type-code",
            self.healthcare_facility_type_code,
        )? {
            metadata.healthcare_facility_type_code = Some(v);
        }
        if let Some(v) = coded("practice-setting-code", self.practice_setting_code)? {
            metadata.practice_setting_code = Some(v);
        }
        if let Some(v) = coded("confidentiality-code", self.confidentiality_code)? {
            metadata.confidentiality_code = Some(v);
        }
        if let Some(v) = self.source {
            metadata.source = Some(v);
        }
        if let Some(v) = self.language_code {
            metadata.language_code = Some(v);
        }
        if let Some(v) = self.service_start {
            metadata.service_start_time = Some(v);
        }
        if let Some(v) = self.service_stop {
            metadata.service_stop_time = Some(v);
        }
        Ok(metadata)
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_content(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn open_registry(cli: &Cli) -> anyhow::Result<RegistryService> {
    let locations_file = cli
        .locations_file
        .clone()
        .unwrap_or_else(|| cli.data_dir.join(LOCATIONS_FILENAME));
    let locations = load_locations_file(&locations_file)?;

    let mut cfg = CoreConfig::new(cli.data_dir.clone(), locations)?
        .with_reject_content_type_mismatch(cli.reject_content_type_mismatch);
    if let Some(limit) = cli.default_query_limit {
        cfg = cfg.with_default_query_limit(limit)?;
    }

    Ok(RegistryService::open(Arc::new(cfg), Arc::new(TracingAuditSink))?)
}

/// Entry point for the `docreg` CLI.
///
/// # Environment Variables
/// - `DOCREG_DATA_DIR`: data directory (default: `document_data`)
/// - `DOCREG_LOCATIONS_FILE`: permission table (default: `<data_dir>/locations.yaml`)
/// - `DOCREG_DEFAULT_QUERY_LIMIT`: page size when a query passes no limit
/// - `RUST_LOG`: log filter, added to the default `docreg=info`
fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("docreg=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let registry = open_registry(&cli)?;

    match cli.command {
        Commands::Register {
            caller,
            file,
            metadata,
        } => {
            let bytes = read_content(&file)?;
            let entry = registry.register(
                &caller.location,
                &bytes,
                metadata.into_metadata()?,
                &caller.actor()?,
            )?;
            print_json(&entry)?;
        }
        Commands::Query { caller, filter } => {
            let page = registry.query(&caller.location, filter.into_filter(), &caller.actor()?)?;
            print_json(&page)?;
        }
        Commands::Retrieve {
            caller,
            entry_id,
            out,
        } => {
            let document = registry.retrieve(&caller.location, &entry_id, &caller.actor()?)?;
            if let Some(out) = out {
                std::fs::write(&out, &document.bytes)
                    .with_context(|| format!("failed to write {}", out.display()))?;
                tracing::info!(path = %out.display(), bytes = document.bytes.len(), "wrote content");
            }
            print_json(&document.entry)?;
        }
        Commands::Update {
            caller,
            entry_id,
            file,
            metadata,
        } => {
            let bytes = read_content(&file)?;
            let entry = registry.update(
                &caller.location,
                &entry_id,
                &bytes,
                metadata.into_metadata()?,
                &caller.actor()?,
            )?;
            print_json(&entry)?;
        }
        Commands::Deprecate {
            caller,
            entry_id,
            reason,
        } => {
            let entry = registry.deprecate(
                &caller.location,
                &entry_id,
                &caller.actor()?,
                reason.as_deref(),
            )?;
            print_json(&entry)?;
        }
        Commands::Delete {
            caller,
            entry_id,
            force,
        } => {
            registry.delete(&caller.location, &entry_id, &caller.actor()?, force)?;
            println!("Deleted {}", entry_id);
        }
        Commands::Versions { caller, entry_id } => {
            let chain = registry.versions(&caller.location, &entry_id, &caller.actor()?)?;
            print_json(&chain)?;
        }
        Commands::Gc { caller } => {
            let removed = registry.collect_garbage(&caller.location, &caller.actor()?)?;
            print_json(&removed)?;
        }
    }

    Ok(())
}
