//! RETS command-line client.
//!
//! # Commands
//!
//! - `login` - Log in and print the banner details
//! - `metadata` - Fetch resource, class or field metadata
//! - `search` - Run a DMQL2 search
//! - `object` - Download an object (photo) or its location
//!
//! Settings come from `--config` (or the default config path), then
//! `RETS_*` environment variables, then command-line flags.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rets::{
    protocol::CountMode, ObjectRequest, SearchFormat, SearchQuery, Session, Settings,
    UaDigestScheme, VERSION,
};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "rets")]
#[command(version = VERSION)]
#[command(about = "RETS client - log in, browse metadata and search listings", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Full login URL (overrides protocol/host/port/path)
    #[arg(long, global = true)]
    login_url: Option<String>,

    /// Server host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Login path
    #[arg(long, global = true)]
    path: Option<String>,

    /// Login user
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Login password (prefer RETS_PASS)
    #[arg(long, global = true)]
    pass: Option<String>,

    /// RETS version
    #[arg(long, global = true)]
    rets_version: Option<String>,

    /// User-Agent
    #[arg(long, global = true)]
    agent: Option<String>,

    /// User-Agent password (prefer RETS_AGENT_PASSWORD)
    #[arg(long, global = true)]
    agent_password: Option<String>,

    /// User-Agent digest form: standard, legacy
    #[arg(long, global = true)]
    ua_digest: Option<String>,

    /// Verify TLS certificates
    #[arg(long, global = true)]
    strict_tls: bool,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print provider, metadata and capability details
    Login,

    /// Fetch metadata
    Metadata {
        #[command(subcommand)]
        table: MetadataCommand,
    },

    /// Run a DMQL2 search
    Search {
        /// Resource (SearchType)
        #[arg(short, long, default_value = "Property")]
        resource: String,

        /// Class
        #[arg(short = 'C', long, default_value = "A")]
        class: String,

        /// DMQL2 query, e.g. "(ListPrice=300000+)"
        #[arg(short, long, default_value = "")]
        query: String,

        /// Result format: compact, compact-decoded, standard-xml
        #[arg(short, long, default_value = "compact-decoded")]
        format: String,

        /// Row limit (0 = no limit)
        #[arg(short, long, default_value = "99")]
        limit: u32,

        /// Comma-separated field list
        #[arg(long)]
        select: Option<String>,

        /// Use standard field names
        #[arg(long)]
        standard_names: bool,

        /// Only return the record count
        #[arg(long)]
        count_only: bool,
    },

    /// Download an object or ask for its location
    Object {
        /// Resource
        #[arg(short, long, default_value = "Property")]
        resource: String,

        /// Object type
        #[arg(short = 't', long, default_value = "Photo")]
        object_type: String,

        /// Resource key (listing id)
        id: String,

        /// Object number or *
        #[arg(long, default_value = "1")]
        object_id: String,

        /// Request the object's URL instead of its bytes
        #[arg(long)]
        location: bool,

        /// Write the body to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum MetadataCommand {
    /// METADATA-RESOURCE
    Resources,
    /// METADATA-CLASS for a resource
    Classes {
        /// Resource id
        #[arg(default_value = "Property")]
        resource: String,
    },
    /// METADATA-TABLE for a resource and class
    Table {
        /// Resource id
        resource: String,
        /// Class name
        class: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.json_logs);

    let settings = build_settings(&cli.connection)?;
    settings.validate()?;

    let runtime = tokio::runtime::Runtime::new()?;
    let output = runtime.block_on(run(settings, cli.command))?;

    if let Some(output) = output {
        if cli.pretty {
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", serde_json::to_string(&output)?);
        }
    }
    Ok(())
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_settings(args: &ConnectionArgs) -> anyhow::Result<Settings> {
    let mut settings = match args.config.clone().or_else(|| {
        Settings::default_path().filter(|p| p.exists())
    }) {
        Some(path) => Settings::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Settings::default(),
    }
    .with_env_overrides();

    if let Some(url) = &args.login_url {
        let from_url = Settings::from_login_url(url, &settings.user, &settings.pass)?;
        settings.protocol = from_url.protocol;
        settings.host = from_url.host;
        settings.port = from_url.port;
        settings.path = from_url.path;
    }
    if let Some(host) = &args.host {
        settings.host = host.clone();
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(path) = &args.path {
        settings.path = path.clone();
    }
    if let Some(user) = &args.user {
        settings.user = user.clone();
    }
    if let Some(pass) = &args.pass {
        settings.pass = pass.clone();
    }
    if let Some(version) = &args.rets_version {
        settings.version = version.clone();
    }
    if let Some(agent) = &args.agent {
        settings.agent.user = agent.clone();
    }
    if let Some(password) = &args.agent_password {
        settings.agent.password = Some(password.clone());
    }
    if let Some(scheme) = &args.ua_digest {
        settings.ua_digest = scheme
            .parse::<UaDigestScheme>()
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    if args.strict_tls {
        settings.transport.accept_invalid_certs = false;
    }
    if let Some(timeout) = args.timeout {
        settings.transport.timeout_secs = Some(timeout);
    }

    Ok(settings)
}

async fn run(settings: Settings, command: Commands) -> anyhow::Result<Option<Value>> {
    let mut session = Session::new(settings)?;
    session.login().await.context("login failed")?;

    let output = match command {
        Commands::Login => Some(json!({
            "provider": session.provider(),
            "metadata": session.metadata_info(),
            "server": session.server_info(),
            "session_id": session.session_id(),
            "capabilities": session
                .capabilities()
                .iter()
                .map(|(cap, url)| (cap.name().to_string(), Value::String(url.to_string())))
                .collect::<serde_json::Map<_, _>>(),
        })),
        Commands::Metadata { table } => {
            let set = match table {
                MetadataCommand::Resources => session.get_resources().await?,
                MetadataCommand::Classes { resource } => {
                    session.get_classifications(Some(&resource)).await?
                },
                MetadataCommand::Table { resource, class } => {
                    session.get_table(&resource, &class).await?
                },
            };
            Some(serde_json::to_value(set)?)
        },
        Commands::Search {
            resource,
            class,
            query,
            format,
            limit,
            select,
            standard_names,
            count_only,
        } => {
            let format: SearchFormat = format.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let mut search = SearchQuery::new(resource, class, query)
                .format(format)
                .limit((limit > 0).then_some(limit))
                .standard_names(standard_names);
            if let Some(select) = select {
                search = search.select(select);
            }
            if count_only {
                search = search.count(CountMode::CountOnly);
            }
            let result = session.search(search).await?;
            if let Some(err) = &result.query_error {
                tracing::warn!(code = err.code, "server reported: {}", err.text);
            }
            Some(serde_json::to_value(result)?)
        },
        Commands::Object {
            resource,
            object_type,
            id,
            object_id,
            location,
            output,
        } => {
            let request = ObjectRequest {
                resource,
                object_type,
                id,
                object_id,
                location,
            };
            let object = session.get_object(request).await?;
            if let Some(path) = &output {
                std::fs::write(path, &object.body)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            Some(json!({
                "content_type": object.content_type,
                "content_id": object.content_id,
                "object_id": object.object_id,
                "location": object.location,
                "bytes": object.body.len(),
                "output": output.map(|p| p.display().to_string()),
            }))
        },
    };

    if let Err(e) = session.logout().await {
        tracing::warn!("logout failed: {e}");
    }
    Ok(output)
}
