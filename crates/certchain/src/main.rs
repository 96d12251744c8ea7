use alloy_primitives::Address;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use certchain::{
    CertChainClient, CredentialMetadata, IssueRequest, PinningClient, RootConfig, RootError,
    RootResult,
};
use certchain_core::{CredentialId, NetworkTransport};
use certchain_fhe::{BackendSelector, CandidateEndpoint, HttpTransport};

/// CertChain: verifiable credentials with confidential revocation.
///
/// Issuers publish credentials whose revocation flag and course tag are
/// encrypted on chain; holders and issuers decrypt them with a signed grant.
#[derive(Parser, Debug)]
#[command(name = "certchain", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a configuration file
    Init {
        /// JSON-RPC endpoint of the chain hosting the registry
        #[arg(long)]
        rpc_url: Option<String>,

        /// Deployed registry contract
        #[arg(long)]
        registry: Option<Address>,
    },

    /// Show which encryption backend the configured node resolves to
    Backend,

    /// Issue a credential with an encrypted course tag
    Issue {
        #[arg(long)]
        recipient: Address,

        /// Confidential course tag
        #[arg(long)]
        tag: u32,

        /// Metadata URI, usually from `pin-json`
        #[arg(long)]
        metadata_uri: String,

        /// Unix seconds or YYYY-MM-DD; omitted means never lapses
        #[arg(long)]
        valid_until: Option<String>,

        /// Credential id (32-byte hex); random when omitted
        #[arg(long, conflicts_with = "auto")]
        id: Option<CredentialId>,

        /// Let the registry choose the id
        #[arg(long)]
        auto: bool,
    },

    /// Decrypt and report a credential's status
    Verify { id: CredentialId },

    /// Revoke a credential
    Revoke {
        id: CredentialId,

        #[arg(long, default_value = "")]
        reason: String,
    },

    /// Lift a revocation
    Restore { id: CredentialId },

    /// Register the acting account as an issuer
    RegisterIssuer {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        metadata_uri: String,
    },

    /// Check whether an account is a registered issuer
    IsIssuer {
        /// Defaults to the acting account
        account: Option<Address>,
    },

    /// List credentials issued to an account
    History {
        /// Defaults to the acting account
        recipient: Option<Address>,
    },

    /// Pin credential metadata as JSON
    PinJson {
        #[arg(long)]
        title: String,

        #[arg(long)]
        recipient_name: String,

        #[arg(long)]
        issuer_name: String,

        #[arg(long)]
        course: String,

        #[arg(long, default_value = "")]
        grade: String,
    },

    /// Pin a file
    PinFile { path: PathBuf },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("certchain=debug,certchain_fhe=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("certchain=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> RootResult<RootConfig> {
    match path {
        Some(p) => RootConfig::load(p),
        None => {
            let default_path = RootConfig::default_config_path();
            RootConfig::load(&default_path)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli).await;
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> RootResult<()> {
    let config_path = cli.config.as_ref();
    match cli.command {
        Commands::Init { rpc_url, registry } => cmd_init(config_path, rpc_url, registry),
        Commands::Backend => cmd_backend(config_path).await,
        Commands::Issue {
            recipient,
            tag,
            metadata_uri,
            valid_until,
            id,
            auto,
        } => {
            let request = IssueRequest {
                recipient,
                metadata_uri,
                valid_until: parse_valid_until(valid_until.as_deref())?,
                course_tag: tag,
            };
            cmd_issue(config_path, request, id, auto).await
        }
        Commands::Verify { id } => cmd_verify(config_path, id).await,
        Commands::Revoke { id, reason } => {
            let client = connect(config_path).await?;
            let tx = client.revoke(id, &reason).await?;
            println!("Revoked {} (tx {})", id, tx);
            Ok(())
        }
        Commands::Restore { id } => {
            let client = connect(config_path).await?;
            let tx = client.restore(id).await?;
            println!("Restored {} (tx {})", id, tx);
            Ok(())
        }
        Commands::RegisterIssuer { name, metadata_uri } => {
            let client = connect(config_path).await?;
            match client.ensure_issuer(&name, &metadata_uri).await? {
                Some(tx) => println!("Registered {} as issuer (tx {})", client.user(), tx),
                None => println!("{} is already an issuer", client.user()),
            }
            Ok(())
        }
        Commands::IsIssuer { account } => {
            let client = connect(config_path).await?;
            let account = account.unwrap_or_else(|| client.user());
            println!("{}: {}", account, client.is_issuer(account).await?);
            Ok(())
        }
        Commands::History { recipient } => cmd_history(config_path, recipient).await,
        Commands::PinJson {
            title,
            recipient_name,
            issuer_name,
            course,
            grade,
        } => {
            let metadata =
                CredentialMetadata::dated_today(title, recipient_name, issuer_name, course, grade);
            let uri = pinning_client(config_path)?.pin_json(&metadata).await?;
            println!("{}", uri);
            Ok(())
        }
        Commands::PinFile { path } => {
            let uri = pinning_client(config_path)?.pin_file(&path).await?;
            println!("{}", uri);
            Ok(())
        }
    }
}

async fn connect(config_path: Option<&PathBuf>) -> RootResult<CertChainClient> {
    let config = load_config(config_path)?;
    CertChainClient::connect(&config).await
}

fn pinning_client(config_path: Option<&PathBuf>) -> RootResult<PinningClient> {
    let config = load_config(config_path)?;
    let credential = config.pinning.credential()?;
    Ok(PinningClient::new(
        config.pinning.endpoint.clone(),
        credential,
        config.backend.request_timeout(),
    )?)
}

fn cmd_init(
    config_path: Option<&PathBuf>,
    rpc_url: Option<String>,
    registry: Option<Address>,
) -> RootResult<()> {
    let mut config = load_config(config_path)?;

    if let Some(url) = rpc_url {
        config.rpc_url = url;
    }
    if let Some(addr) = registry {
        config.registry_address = addr;
    }
    config.validate()?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(RootConfig::default_config_path);
    config.save(&save_path)?;

    info!(path = %save_path.display(), "configuration written");
    println!("CertChain configured.");
    println!("  RPC URL:  {}", config.rpc_url);
    println!("  Registry: {}", config.registry_address);
    println!("  Config:   {}", save_path.display());

    Ok(())
}

async fn cmd_backend(config_path: Option<&PathBuf>) -> RootResult<()> {
    let config = load_config(config_path)?;
    let transport: Arc<dyn NetworkTransport> = Arc::new(HttpTransport::new(
        config.rpc_url.clone(),
        config.backend.request_timeout(),
    )?);
    let backend = BackendSelector::new(config.backend.clone())
        .resolve(CandidateEndpoint::Transport(transport))
        .await?;
    let network = backend.network();

    println!("Backend:  {}", network.endpoint_kind);
    println!("Chain id: {}", network.chain_id);
    println!("Target:   {}", network.rpc_target);
    Ok(())
}

async fn cmd_issue(
    config_path: Option<&PathBuf>,
    request: IssueRequest,
    id: Option<CredentialId>,
    auto: bool,
) -> RootResult<()> {
    let client = connect(config_path).await?;
    let issued = if auto {
        client.issue_auto(request).await?
    } else {
        client.issue(request, id).await?
    };

    println!("Issued credential {}", issued.id);
    println!("  tx: {}", issued.tx_hash);
    Ok(())
}

async fn cmd_verify(config_path: Option<&PathBuf>, id: CredentialId) -> RootResult<()> {
    let client = connect(config_path).await?;
    let status = client.verify(id).await?;

    if client.session().backend().network().endpoint_kind == certchain_core::EndpointKind::Local {
        println!("(simulated encryption on a developer node)");
    }
    let json = serde_json::to_string_pretty(&status)?;
    println!("{}", json);
    println!("Valid: {}", status.is_valid());
    Ok(())
}

async fn cmd_history(config_path: Option<&PathBuf>, recipient: Option<Address>) -> RootResult<()> {
    let client = connect(config_path).await?;
    let recipient = recipient.unwrap_or_else(|| client.user());
    let ids = client.history(recipient).await?;

    if ids.is_empty() {
        println!("No credentials issued to {}.", recipient);
        return Ok(());
    }
    for id in ids {
        println!("{}", id);
    }
    Ok(())
}

/// Unix seconds, or a `YYYY-MM-DD` date taken as midnight UTC.
fn parse_valid_until(raw: Option<&str>) -> RootResult<u64> {
    let Some(raw) = raw else {
        return Ok(0);
    };
    if let Ok(seconds) = raw.parse::<u64>() {
        return Ok(seconds);
    }
    let date = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| RootError::Config(format!("invalid --valid-until {:?}: {}", raw, e)))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| RootError::Config(format!("invalid --valid-until {:?}", raw)))?;
    u64::try_from(midnight.and_utc().timestamp())
        .map_err(|_| RootError::Config(format!("--valid-until {:?} is before 1970", raw)))
}
