use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;

use archiiv_crypto::TokenSecret;
use archiiv_server::{ArchiivServer, ServerConfig, UserStore, SECRET_ENV};
use archiiv_store::{init_store_dir, LoadedGraph, RecordInfo, RecoveryLoader};
use archiiv_types::RecordId;

use crate::cli::*;

pub const CONFIG_FILE: &str = "archiiv.toml";

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Init(args) => cmd_init(args, &format),
        Command::Serve(args) => cmd_serve(args),
        Command::User(args) => cmd_user(args, &format),
        Command::Secret => cmd_secret(&format),
        Command::Ls(args) => cmd_ls(args, &format),
        Command::Fsck(args) => cmd_fsck(args, &format),
    }
}

/// Config file first, then command-line overrides.
fn resolve_config(args: &StoreArgs) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(fs_root) = &args.fs_root {
        config.fs_root = fs_root.clone();
    }
    if let Some(users) = &args.users {
        config.users_path = users.clone();
    }
    if let Some(root) = &args.root {
        config.root_id = Some(RecordId::parse(root).with_context(|| format!("parsing root id {root}"))?);
    }
    Ok(config)
}

fn store_root(config: &ServerConfig) -> anyhow::Result<RecordId> {
    config
        .root_id
        .context("no root id; pass --root or --config")
}

fn cmd_init(args: InitArgs, format: &OutputFormat) -> anyhow::Result<()> {
    std::fs::create_dir_all(&args.dir)
        .with_context(|| format!("creating {}", args.dir.display()))?;
    let dir = args
        .dir
        .canonicalize()
        .with_context(|| format!("resolving {}", args.dir.display()))?;
    let layout = init_store_dir(&dir).with_context(|| format!("initializing {}", dir.display()))?;

    let config = ServerConfig::default().with_layout(&layout);
    let config_path = dir.join(CONFIG_FILE);
    std::fs::write(&config_path, config.to_toml()?)
        .with_context(|| format!("writing {}", config_path.display()))?;

    if let (Some(user), Some(password)) = (&args.user, &args.password) {
        UserStore::load(&layout.users_path)?.create_user(user, password)?;
    }

    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({ "root": layout.root, "config": config_path, "fs_root": layout.fs_root })
        ),
        OutputFormat::Text => {
            println!("{} Initialized Archiiv store in {}", "✓".green().bold(), dir.display().to_string().bold());
            println!("  Root: {}", layout.root.to_string().cyan());
            println!("  Config: {}", config_path.display());
            if let Some(user) = &args.user {
                println!("  User: {}", user.yellow());
            }
        }
    }
    Ok(())
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = resolve_config(&args.store)?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if args.cors {
        config.permissive_cors = true;
    }

    let seed = std::env::var(SECRET_ENV)
        .with_context(|| format!("{SECRET_ENV} is not set; generate one with `archiiv secret`"))?;
    let secret = TokenSecret::from_hex(seed.trim()).with_context(|| format!("decoding {SECRET_ENV}"))?;

    let server = ArchiivServer::open(config, secret).context("opening store")?;
    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    runtime.block_on(server.serve())?;
    Ok(())
}

fn cmd_user(args: UserArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let config = resolve_config(&args.store)?;
    let users = UserStore::load(&config.users_path)?;
    match args.action {
        UserAction::Add { name, password } => {
            users.create_user(&name, &password)?;
            println!("{} Added user {}", "✓".green(), name.yellow());
        }
        UserAction::Remove { name } => {
            users.delete_user(&name)?;
            println!("Removed user {}", name.yellow());
        }
        UserAction::List => {
            let names = users.usernames()?;
            match format {
                OutputFormat::Json => println!("{}", json!(names)),
                OutputFormat::Text if names.is_empty() => println!("No users."),
                OutputFormat::Text => names.iter().for_each(|n| println!("{n}")),
            }
        }
    }
    Ok(())
}

fn cmd_secret(format: &OutputFormat) -> anyhow::Result<()> {
    let secret = TokenSecret::generate().to_hex();
    match format {
        OutputFormat::Json => println!("{}", json!({ "secret": secret })),
        OutputFormat::Text => println!("{secret}"),
    }
    Ok(())
}

fn cmd_ls(args: LsArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let config = resolve_config(&args.store)?;
    // Loaded, not opened: listing must not collect leftovers.
    let graph = RecoveryLoader::new(&config.fs_root, store_root(&config)?)
        .run()
        .with_context(|| format!("loading {}", config.fs_root.display()))?;
    let start = match &args.id {
        Some(id) => RecordId::parse(id)?,
        None => graph.root,
    };

    let tree = walk(&graph, start, args.depth)?;
    match format {
        OutputFormat::Json => {
            let infos: Vec<&RecordInfo> = tree.iter().map(|(_, info)| info).collect();
            println!("{}", serde_json::to_string_pretty(&infos)?);
        }
        OutputFormat::Text => {
            for (depth, info) in &tree {
                print_entry(*depth, info);
            }
        }
    }
    Ok(())
}

/// Depth-first listing, each entry paired with its depth.
fn walk(graph: &LoadedGraph, start: RecordId, max_depth: usize) -> anyhow::Result<Vec<(usize, RecordInfo)>> {
    let mut out = Vec::new();
    let mut stack = vec![(0, start)];
    while let Some((depth, id)) = stack.pop() {
        let Some(info) = graph.record_info(id) else {
            bail!("record {id} not found");
        };
        if depth < max_depth {
            stack.extend(info.children.iter().rev().map(|child| (depth + 1, *child)));
        }
        out.push((depth, info));
    }
    Ok(out)
}

fn print_entry(depth: usize, info: &RecordInfo) {
    let indent = "  ".repeat(depth);
    let name = if info.name.is_empty() { "/" } else { info.name.as_str() };
    let name = if info.is_dir {
        format!("{name}/").blue().bold()
    } else {
        name.normal()
    };
    let shared = if info.ref_count > 1 {
        format!(" (×{})", info.ref_count).yellow()
    } else {
        "".normal()
    };
    println!("{indent}{name} {}{shared}", info.id.short_id().dimmed());
}

fn cmd_fsck(args: StoreArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;
    let report = fsck(&config.fs_root, store_root(&config)?);
    match format {
        OutputFormat::Json => println!("{}", report.to_json()),
        OutputFormat::Text => report.print(),
    }
    if let FsckReport::Failed(e) = report {
        bail!("store is corrupt: {e}");
    }
    Ok(())
}

enum FsckReport {
    Loaded {
        records: usize,
        leftovers: Vec<RecordId>,
        stray_sections: Vec<String>,
    },
    Failed(String),
}

fn fsck(fs_root: &Path, root: RecordId) -> FsckReport {
    match RecoveryLoader::new(fs_root, root).run() {
        Ok(graph) => FsckReport::Loaded {
            records: graph.records.len(),
            leftovers: graph.leftovers,
            stray_sections: graph.stray_sections.iter().map(ToString::to_string).collect(),
        },
        Err(e) => FsckReport::Failed(e.to_string()),
    }
}

impl FsckReport {
    fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Loaded {
                records,
                leftovers,
                stray_sections,
            } => json!({
                "ok": true,
                "records": records,
                "leftovers": leftovers,
                "stray_sections": stray_sections,
            }),
            Self::Failed(e) => json!({ "ok": false, "error": e }),
        }
    }

    fn print(&self) {
        match self {
            Self::Loaded {
                records,
                leftovers,
                stray_sections,
            } => {
                println!("{} {} records load cleanly", "✓".green().bold(), records);
                if leftovers.is_empty() && stray_sections.is_empty() {
                    println!("{} No issues.", "✓".green().bold());
                    return;
                }
                for id in leftovers {
                    println!("  {} unreferenced record {}", "!".yellow().bold(), id);
                }
                for file in stray_sections {
                    println!("  {} section without record {}", "!".yellow().bold(), file);
                }
                println!("  These are removed the next time the store is opened.");
            }
            Self::Failed(e) => println!("{} {}", "✗".red().bold(), e),
        }
    }
}
