/*!
relsnap CLI - Command-line interface for the relsnap snapshot system.

Backs up the live database to timestamped snapshot directories, restores them,
and inspects what is stored.
*/

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{bail, Context};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use relsnap_core::inspect::FileStatus;
use relsnap_core::observability::init_tracing;
use relsnap_core::{
    EntityCatalog, EntityDef, LocalFileStorage, Manifest, Sha256PasswordHasher, SnapshotConfig,
    SnapshotFormat, SnapshotInspector, SnapshotRestorer, SnapshotWriter, SqliteStore,
};
use tabled::{Table, Tabled};
use tracing::{error, info};

/// Selects every catalog entity
const ALL: &str = "all";

#[derive(Parser)]
#[command(name = "relsnap")]
#[command(about = "Entity-aware relational snapshot and restore")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// SQLite database holding the live data
    #[arg(long, global = true, env = "RELSNAP_DATABASE", default_value = "database.sqlite")]
    database: String,

    /// Root directory of the snapshot storage
    #[arg(long, global = true, env = "RELSNAP_STORAGE_ROOT", default_value = "storage")]
    storage_root: String,

    /// Directory under the storage root holding snapshot directories
    #[arg(long, global = true, default_value = "backups")]
    backup_dir: String,

    /// Application key protecting sensitive fields (`base64:...` or a passphrase)
    #[arg(long, global = true, env = "RELSNAP_APP_KEY", hide_env_values = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a new snapshot
    Backup {
        #[command(subcommand)]
        target: BackupTarget,
    },
    /// Replay a snapshot into the live database
    Restore {
        #[command(subcommand)]
        target: RestoreTarget,
    },
    /// List stored snapshots
    List,
    /// Verify the checksums of a snapshot against its manifest
    Verify {
        /// Snapshot path relative to the storage root
        snapshot_path: String,
    },
}

#[derive(Subcommand)]
enum BackupTarget {
    /// Back up table data
    Data {
        /// Entity to back up, or `all`
        #[arg(long = "type", default_value = ALL)]
        entity: String,
        /// json (structured), csv (tabular) or sql
        #[arg(long, default_value = "json")]
        format: String,
    },
}

#[derive(Subcommand)]
enum RestoreTarget {
    /// Restore table data
    Data {
        /// Snapshot path relative to the storage root
        snapshot_path: String,
        /// Entity to restore, or `all`
        #[arg(long, default_value = ALL)]
        table: String,
        /// Skip confirmation prompt
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Result")]
    result: String,
}

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "Snapshot")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Format")]
    format: String,
    #[tabled(rename = "Entities")]
    entities: String,
    #[tabled(rename = "Records")]
    records: String,
    #[tabled(rename = "Created")]
    created: String,
}

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Records")]
    records: u64,
    #[tabled(rename = "Status")]
    status: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose, cli.json_logs) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("✗ {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = SnapshotConfig::default_local()
        .with_database(&cli.database)
        .with_storage_root(&cli.storage_root)
        .with_backup_dir(&cli.backup_dir);
    if let Some(key) = cli.key {
        config = config.with_app_key(key);
    }
    config.validate()?;

    match cli.command {
        Commands::Backup {
            target: BackupTarget::Data { entity, format },
        } => backup_data(&config, &entity, &format),
        Commands::Restore {
            target:
                RestoreTarget::Data {
                    snapshot_path,
                    table,
                    confirm,
                },
        } => restore_data(&config, &snapshot_path, &table, confirm),
        Commands::List => list_snapshots(&config),
        Commands::Verify { snapshot_path } => verify_snapshot(&config, &snapshot_path),
    }
}

fn backup_data(config: &SnapshotConfig, entity: &str, format: &str) -> anyhow::Result<()> {
    // Reject unknown formats and entities before any I/O.
    let format: SnapshotFormat = format.parse()?;
    let catalog = EntityCatalog::standard();
    let selected = select_entities(&catalog, entity)?;
    let encrypter = config.encrypter_for(selected)?;

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    let storage = LocalFileStorage::with_base_dir(&config.storage_root);
    let writer = SnapshotWriter::new(&store, &storage, encrypter.as_ref(), &catalog);

    let prefix = config.snapshot_prefix(Utc::now());
    info!("Writing {format} snapshot to {prefix}");

    if entity == ALL {
        let manifest = writer.write_all(&prefix, format)?;
        let rows: Vec<EntityRow> = manifest
            .files
            .iter()
            .map(|file| EntityRow {
                entity: file.entity.clone(),
                result: format!("{} records", file.records),
            })
            .collect();
        println!("{}", Table::new(rows));
        println!(
            "✓ Backup complete: {} records in {}",
            manifest.total_records, prefix
        );
    } else {
        let count = writer.write(entity, &prefix, format)?;
        println!("✓ Backed up {count} {entity} records to {prefix}");
    }

    Ok(())
}

fn restore_data(
    config: &SnapshotConfig,
    snapshot_path: &str,
    table: &str,
    confirm: bool,
) -> anyhow::Result<()> {
    let catalog = EntityCatalog::standard();
    let selected = select_entities(&catalog, table)?;
    let encrypter = config.encrypter_for(selected)?;

    let storage = LocalFileStorage::with_base_dir(&config.storage_root);
    match Manifest::read(&storage, snapshot_path)? {
        Some(manifest) => {
            print_manifest(&manifest);
            manifest.ensure_restorable()?;
        }
        None => println!("No manifest found at {snapshot_path}, the snapshot may be incomplete"),
    }

    if !confirm {
        let target = if table == ALL {
            "ALL restorable tables".to_string()
        } else {
            format!("table '{table}'")
        };
        print!("This will replace the contents of {target}. Continue? (y/N): ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().to_lowercase().starts_with('y') {
            println!("Restore cancelled");
            return Ok(());
        }
    }

    let mut store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    let mut restorer = SnapshotRestorer::new(
        &mut store,
        &storage,
        encrypter.as_ref(),
        &Sha256PasswordHasher,
        &catalog,
    );

    let rows: Vec<EntityRow> = if table == ALL {
        let report = restorer.restore_all(snapshot_path)?;
        report
            .entries
            .into_iter()
            .map(|(entity, outcome)| EntityRow {
                entity,
                result: outcome.to_string(),
            })
            .collect()
    } else {
        let outcome = restorer.restore(table, snapshot_path)?;
        vec![EntityRow {
            entity: table.to_string(),
            result: outcome.to_string(),
        }]
    };

    let entities = rows.len();
    println!("{}", Table::new(rows));
    println!("✓ Restore finished for {entities} entities");
    Ok(())
}

fn list_snapshots(config: &SnapshotConfig) -> anyhow::Result<()> {
    let storage = LocalFileStorage::with_base_dir(&config.storage_root);
    let snapshots = SnapshotInspector::new(&storage).list(&config.backup_dir)?;

    if snapshots.is_empty() {
        println!("No snapshots found");
        return Ok(());
    }

    let rows: Vec<SnapshotRow> = snapshots
        .into_iter()
        .map(|snapshot| match &snapshot.manifest {
            Some(manifest) => SnapshotRow {
                name: snapshot.name.clone(),
                status: snapshot.status().to_string(),
                format: manifest.format.to_string(),
                entities: manifest.entities.len().to_string(),
                records: manifest.total_records.to_string(),
                created: format_timestamp(manifest.created_at),
            },
            None => SnapshotRow {
                name: snapshot.name.clone(),
                status: snapshot.status().to_string(),
                format: "-".to_string(),
                entities: "-".to_string(),
                records: "-".to_string(),
                created: "-".to_string(),
            },
        })
        .collect();

    println!("{}", Table::new(rows));
    Ok(())
}

fn verify_snapshot(config: &SnapshotConfig, snapshot_path: &str) -> anyhow::Result<()> {
    info!("Verifying snapshot: {snapshot_path}");

    let storage = LocalFileStorage::with_base_dir(&config.storage_root);
    let report = SnapshotInspector::new(&storage).verify(snapshot_path)?;

    let rows: Vec<CheckRow> = report
        .checks
        .iter()
        .map(|check| CheckRow {
            entity: check.entity.clone(),
            records: check.records,
            status: match &check.status {
                FileStatus::Intact => "✓ intact".to_string(),
                FileStatus::Missing => "✗ missing".to_string(),
                FileStatus::Mismatch { actual, .. } => format!("✗ checksum {}", short_hash(actual)),
            },
        })
        .collect();
    println!("{}", Table::new(rows));

    if !report.is_intact() {
        bail!("Integrity check failed for {snapshot_path}");
    }
    println!("✓ Snapshot is valid and integrity check passed");
    Ok(())
}

fn print_manifest(manifest: &Manifest) {
    println!("Snapshot Details:");
    println!("  ID: {}", manifest.snapshot_id);
    println!("  Created: {}", format_timestamp(manifest.created_at));
    println!("  Format: {}", manifest.format);
    println!("  Entities: {}", manifest.entities.join(", "));
    println!("  Total records: {}", manifest.total_records);
    if manifest.partial {
        println!("  Scope: partial (single-entity backups)");
    }
}

/// The catalog entries a command runs over, every entry for `all`
fn select_entities<'c>(catalog: &'c EntityCatalog, name: &str) -> anyhow::Result<Vec<&'c EntityDef>> {
    if name == ALL {
        return Ok(catalog.iter().collect());
    }
    Ok(vec![catalog.require(name)?])
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_backup_flags() {
        let cli = Cli::parse_from(["relsnap", "backup", "data", "--type", "users", "--format", "tabular"]);
        match cli.command {
            Commands::Backup {
                target: BackupTarget::Data { entity, format },
            } => {
                assert_eq!(entity, "users");
                assert_eq!(format.parse::<SnapshotFormat>().unwrap(), SnapshotFormat::Csv);
            }
            _ => panic!("expected backup command"),
        }
    }

    #[test]
    fn test_restore_defaults_to_all_with_prompt() {
        let cli = Cli::parse_from(["relsnap", "restore", "data", "backups/2024-03-09_14-05-00"]);
        match cli.command {
            Commands::Restore {
                target:
                    RestoreTarget::Data {
                        snapshot_path,
                        table,
                        confirm,
                    },
            } => {
                assert_eq!(snapshot_path, "backups/2024-03-09_14-05-00");
                assert_eq!(table, ALL);
                assert!(!confirm);
            }
            _ => panic!("expected restore command"),
        }
    }

    #[test]
    fn test_key_needed_only_for_sensitive_selections() {
        let catalog = EntityCatalog::standard();
        let config = SnapshotConfig::default_local();

        assert!(config
            .encrypter_for(select_entities(&catalog, "tags").unwrap())
            .is_ok());
        assert!(config
            .encrypter_for(select_entities(&catalog, "users").unwrap())
            .is_err());
        assert!(config
            .encrypter_for(select_entities(&catalog, ALL).unwrap())
            .is_err());
        assert!(select_entities(&catalog, "invoices").is_err());
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_hash("abc"), "abc");
    }
}
