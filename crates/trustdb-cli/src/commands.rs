use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context as _};
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::Serialize;
use trustdb_store::{
    Context, Database, Kind, Query, Scope, TrustDb, TrustDbConfig, TrustReader, TrustWriter,
    WriteAheadLog,
};
use trustdb_types::{Certificate, Chain, CustKey, Trc, IA};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), cli.db.as_deref())?;
    let format = cli.format;

    if let Command::Log(args) = &cli.command {
        return cmd_log(&config, args, format);
    }

    let db = Database::open(config.clone()).context("opening trust database")?;
    let ctx = config.context();
    let result = match cli.command {
        Command::Insert(args) => cmd_insert(&db, &ctx, args.object, format).await,
        Command::Get(args) => cmd_get(&db, &ctx, args.object, format).await,
        Command::List(args) => cmd_list(&db, &ctx, args.kind, format).await,
        Command::Stats => cmd_stats(&db, &ctx, format).await,
        Command::Log(_) => Ok(()),
    };
    db.close().await?;
    result
}

fn load_config(file: Option<&Path>, db: Option<&Path>) -> anyhow::Result<TrustDbConfig> {
    let mut config = match file {
        Some(path) => TrustDbConfig::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrustDbConfig::default(),
    };
    if let Some(db) = db {
        config.path = Some(db.to_path_buf());
    }
    Ok(config)
}

fn read_json<T: DeserializeOwned>(file: &Path) -> anyhow::Result<T> {
    let text = if file == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?
    };
    serde_json::from_str(&text).with_context(|| format!("parsing {}", file.display()))
}

/// One-line text rendering of a stored object.
trait Summary {
    fn summary(&self) -> String;
}

impl Summary for Trc {
    fn summary(&self) -> String {
        format!(
            "{} isd {} v{}  core ASes: {}  signatures: {}  {}",
            "TRC".bold(),
            self.isd,
            self.version,
            self.core_ases.len(),
            self.signatures.len(),
            digest_label(self.digest()),
        )
    }
}

impl Summary for Certificate {
    fn summary(&self) -> String {
        let role = if self.can_issue { "issuer" } else { "leaf" };
        format!(
            "{} {} v{}  issued by {} v{}  {}",
            role.bold(),
            self.subject.to_string().cyan(),
            self.version,
            self.issuer,
            self.issuer_version,
            digest_label(self.digest()),
        )
    }
}

impl Summary for Chain {
    fn summary(&self) -> String {
        format!(
            "{} {} v{}  issuer {} v{}  {}",
            "chain".bold(),
            self.ia().to_string().cyan(),
            self.version(),
            self.issuer.subject,
            self.issuer.version,
            digest_label(self.digest()),
        )
    }
}

impl Summary for CustKey {
    fn summary(&self) -> String {
        format!(
            "{} {} v{}  trc v{}  {} bytes  {}",
            "key".bold(),
            self.ia.to_string().cyan(),
            self.version,
            self.trc_version,
            self.key.len(),
            digest_label(self.digest()),
        )
    }
}

fn digest_label<E>(digest: Result<trustdb_types::Digest, E>) -> String {
    match digest {
        Ok(d) => d.short_hex().dimmed().to_string(),
        Err(_) => "?".dimmed().to_string(),
    }
}

fn emit<T: Serialize + Summary>(format: OutputFormat, value: &T) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => println!("{}", value.summary()),
    }
    Ok(())
}

fn emit_all<T: Serialize + Summary>(format: OutputFormat, values: &[T]) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(values)?),
        OutputFormat::Text => {
            for value in values {
                println!("{}", value.summary());
            }
            println!("{} {}", values.len().to_string().bold(), "records".dimmed());
        }
    }
    Ok(())
}

fn report_insert(format: OutputFormat, what: &str, written: u64) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "object": what, "written": written }));
        }
        OutputFormat::Text if written == 0 => {
            println!("{} {} already stored", "=".yellow().bold(), what);
        }
        OutputFormat::Text => {
            println!("{} Stored {} ({} new records)", "✓".green().bold(), what, written);
        }
    }
    Ok(())
}

async fn cmd_insert(
    db: &Database,
    ctx: &Context,
    object: InsertObject,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let (what, written) = match object {
        InsertObject::Trc { file } => {
            let trc: Trc = read_json(&file)?;
            let what = format!("trc isd {} v{}", trc.isd, trc.version);
            (what, db.insert_trc(ctx, &trc).await?)
        }
        InsertObject::Chain { file } => {
            let chain: Chain = read_json(&file)?;
            let what = format!("chain {} v{}", chain.ia(), chain.version());
            (what, db.insert_chain(ctx, &chain).await?)
        }
        InsertObject::IssCert { file } => {
            let cert: Certificate = read_json(&file)?;
            let what = format!("issuer certificate {} v{}", cert.subject, cert.version);
            (what, db.insert_iss_cert(ctx, &cert).await?)
        }
        InsertObject::LeafCert { file } => {
            let cert: Certificate = read_json(&file)?;
            let what = format!("leaf certificate {} v{}", cert.subject, cert.version);
            (what, db.insert_leaf_cert(ctx, &cert).await?)
        }
        InsertObject::CustKey {
            ia,
            version,
            key,
            trc_version,
        } => {
            let raw = hex::decode(key.trim()).context("customer key must be hex")?;
            let existing = db.get_cust_key_version(ctx, ia, version).await.ok();
            db.insert_cust_key(ctx, ia, version, &raw, trc_version).await?;
            let written = u64::from(existing.is_none());
            (format!("customer key {ia} v{version}"), written)
        }
    };
    report_insert(format, &what, written)
}

async fn cmd_get(
    db: &Database,
    ctx: &Context,
    object: GetObject,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match object {
        GetObject::Trc { isd, version } => {
            let trc = match version {
                Some(v) => db.get_trc_version(ctx, isd, v).await?,
                None => db.get_trc_max_version(ctx, isd).await?,
            };
            emit(format, &trc)
        }
        GetObject::Chain { ia, version } => {
            let chain = match version {
                Some(v) => db.get_chain_version(ctx, ia, v).await?,
                None => db.get_chain_max_version(ctx, ia).await?,
            };
            emit(format, &chain)
        }
        GetObject::IssCert { ia, version } => {
            let cert = match version {
                Some(v) => db.get_iss_cert_version(ctx, ia, v).await?,
                None => db.get_iss_cert_max_version(ctx, ia).await?,
            };
            emit(format, &cert)
        }
        GetObject::LeafCert { ia, version } => {
            let cert = match version {
                Some(v) => db.get_leaf_cert_version(ctx, ia, v).await?,
                None => db.get_leaf_cert_max_version(ctx, ia).await?,
            };
            emit(format, &cert)
        }
        GetObject::CustKey { ia, version } => emit(format, &cust_key(db, ctx, ia, version).await?),
    }
}

async fn cust_key(
    db: &Database,
    ctx: &Context,
    ia: IA,
    version: Option<u64>,
) -> anyhow::Result<CustKey> {
    let query = match version {
        Some(version) => Query::Version {
            kind: Kind::CustKey,
            scope: Scope::Ia(ia),
            version,
        },
        None => Query::Max {
            kind: Kind::CustKey,
            scope: Scope::Ia(ia),
        },
    };
    Ok(db.query_one(ctx, query).await?.into_cust_key()?)
}

async fn cmd_list(
    db: &Database,
    ctx: &Context,
    kind: ListKind,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match kind {
        ListKind::Trcs => emit_all(format, &db.get_all_trcs(ctx).await?),
        ListKind::Chains => emit_all(format, &db.get_all_chains(ctx).await?),
        ListKind::IssCerts => emit_all(format, &db.get_all_iss_certs(ctx).await?),
        ListKind::LeafCerts => emit_all(format, &db.get_all_leaf_certs(ctx).await?),
        ListKind::CustKeys => emit_all(format, &db.get_all_cust_keys(ctx).await?),
    }
}

async fn cmd_stats(db: &Database, ctx: &Context, format: OutputFormat) -> anyhow::Result<()> {
    let records: BTreeMap<String, usize> = db
        .record_counts(ctx)
        .await?
        .into_iter()
        .map(|(kind, n)| (kind.to_string(), n))
        .collect();
    let pool = db.pool_stats()?;
    let location = db
        .config()
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "in memory".into());

    match format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "location": location,
                "records": records,
                "pool": pool,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            println!("Trust database: {}", location.bold());
            for (kind, n) in &records {
                println!("  {:<20} {}", kind, n.to_string().bold());
            }
            let max_open = match pool.max_open {
                0 => "unlimited".to_string(),
                n => n.to_string(),
            };
            println!(
                "Pool: {} open, {} in use, {} idle (max open {}, max idle {}, waits {})",
                pool.open, pool.in_use, pool.idle, max_open, pool.max_idle, pool.wait_count
            );
        }
    }
    Ok(())
}

fn cmd_log(config: &TrustDbConfig, args: &LogArgs, format: OutputFormat) -> anyhow::Result<()> {
    let Some(path) = &config.path else {
        bail!("no commit log configured; pass --db or set `path` in the config file");
    };
    if !path.exists() {
        bail!("commit log {} does not exist", path.display());
    }
    let log = WriteAheadLog::open(path, config.sync_mode)?;
    let batches = log.recover()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&batches)?),
        OutputFormat::Text => {
            for batch in &batches {
                println!(
                    "{} {}  schema {}  {} records",
                    "commit".yellow(),
                    batch.commit_seq.to_string().yellow().bold(),
                    batch.schema,
                    batch.records.len()
                );
                if args.records {
                    for record in &batch.records {
                        println!("    {}", record.key());
                    }
                }
            }
            println!(
                "{} batches, {} bytes",
                batches.len().to_string().bold(),
                log.offset()
            );
        }
    }
    Ok(())
}
