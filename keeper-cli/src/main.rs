use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use keeper_core::sync::{Credentials, SyncClient, SyncEngine};
use keeper_core::{
    BinarySecret, CardSecret, ClientConfig, Database, KeyEnvelopeStore, LoginSecret, Secret,
    SecretPayload, SecretRepository, TokenStore, VaultService,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Largest file accepted as a binary secret.
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Keeper - an encrypted secrets vault with multi-device sync
#[derive(Parser)]
#[command(name = "keeper")]
#[command(about = "Encrypted secrets vault with multi-device sync", long_about = None)]
struct Cli {
    /// Path to the client configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account on the sync server and unlock this device
    Register(AccountArgs),

    /// Log in to an existing account and unlock this device
    Login(AccountArgs),

    /// Forget the vault key and the session tokens on this device
    Logout,

    /// Add a new secret
    Add {
        /// Free-form description shown in listings
        #[arg(short, long, default_value = "")]
        description: String,

        #[command(subcommand)]
        payload: PayloadArgs,
    },

    /// Show a decrypted secret
    Get {
        uid: String,
    },

    /// List all secrets
    List,

    /// Replace the contents of a secret
    Update {
        uid: String,

        /// New description; the current one is kept when omitted
        #[arg(short, long)]
        description: Option<String>,

        #[command(subcommand)]
        payload: PayloadArgs,
    },

    /// Delete a secret on every device
    Delete {
        uid: String,
    },

    /// Write a file secret into a directory
    Download {
        uid: String,

        /// Target directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Run one sync cycle with the server
    Sync,

    /// Show local vault and sync state
    Status,
}

#[derive(clap::Args)]
struct AccountArgs {
    /// Account login
    #[arg(short, long)]
    login: String,

    /// Device name registered with the server; defaults to this store's id
    #[arg(long)]
    device: Option<String>,
}

#[derive(Subcommand)]
enum PayloadArgs {
    /// A free-form text note
    Text {
        /// Note content (will prompt if not provided)
        content: Option<String>,
    },

    /// A login and password pair
    Login {
        #[arg(long)]
        login: String,

        /// Password (will prompt if not provided)
        #[arg(long)]
        password: Option<String>,
    },

    /// Bank card details
    Card {
        #[arg(long)]
        number: String,

        /// Expiry as MM/YY
        #[arg(long)]
        expiry: String,

        /// Card verification code (will prompt if not provided)
        #[arg(long)]
        ccv: Option<String>,
    },

    /// The contents of a file
    File {
        path: PathBuf,
    },
}

impl PayloadArgs {
    fn into_payload(self) -> Result<SecretPayload> {
        let payload = match self {
            Self::Text { content } => SecretPayload::Text(match content {
                Some(content) => content,
                None => rpassword::prompt_password("Text: ")?,
            }),
            Self::Login { login, password } => SecretPayload::Login(LoginSecret {
                login,
                password: match password {
                    Some(password) => password,
                    None => rpassword::prompt_password("Password: ")?,
                },
            }),
            Self::Card { number, expiry, ccv } => SecretPayload::Card(CardSecret {
                number,
                expiry,
                ccv: match ccv {
                    Some(ccv) => ccv,
                    None => rpassword::prompt_password("CCV: ")?,
                },
            }),
            Self::File { path } => SecretPayload::Binary(read_file(&path)?),
        };
        Ok(payload)
    }
}

fn read_file(path: &Path) -> Result<BinarySecret> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("Cannot read {}", path.display()))?
        .len();
    if size > MAX_FILE_SIZE {
        bail!(
            "{} is {} bytes, the limit is {} bytes",
            path.display(),
            size,
            MAX_FILE_SIZE
        );
    }

    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .context("File name is not valid UTF-8")?
        .to_string();
    let content = std::fs::read(path)?;
    Ok(BinarySecret::new(name, content))
}

/// Everything a command needs, opened from the client configuration.
struct App {
    config: ClientConfig,
    db: Arc<Mutex<Database>>,
    envelope: KeyEnvelopeStore,
}

impl App {
    fn open(config_path: Option<&Path>) -> Result<Self> {
        let config = ClientConfig::load_or_default(config_path)?;
        let db = Database::open(&config.database_path)
            .with_context(|| format!("Cannot open {}", config.database_path.display()))?
            .shared();
        let envelope = KeyEnvelopeStore::new(config.envelope_path.clone());
        Ok(Self {
            config,
            db,
            envelope,
        })
    }

    fn repository(&self) -> SecretRepository {
        SecretRepository::new(self.db.clone())
    }

    fn tokens(&self) -> TokenStore {
        TokenStore::new(self.db.clone())
    }

    fn vault(&self) -> VaultService {
        VaultService::new(self.repository(), self.envelope.clone())
    }

    fn client(&self) -> Result<SyncClient> {
        Ok(SyncClient::new(
            &self.config.server_url,
            self.config.request_timeout(),
            self.tokens(),
        )?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let ctx = App::open(cli.config.as_deref())?;

    match cli.command {
        Commands::Register(args) => {
            let (client, credentials) = account(&ctx, args)?;
            let salt = client.register(&credentials).await?;
            ctx.envelope
                .derive_and_save(credentials.password.as_bytes(), &salt)?;
            println!("Registered {} on {}", credentials.login, ctx.config.server_url);
        }
        Commands::Login(args) => {
            let (client, credentials) = account(&ctx, args)?;
            let salt = client.login(&credentials).await?;
            ctx.envelope
                .derive_and_save(credentials.password.as_bytes(), &salt)?;
            println!("Logged in as {}", credentials.login);
        }
        Commands::Logout => {
            ctx.envelope.clear()?;
            ctx.tokens().clear()?;
            println!("Logged out");
        }
        Commands::Add {
            description,
            payload,
        } => {
            let secret = ctx.vault().add(&description, &payload.into_payload()?)?;
            println!("{}", secret.uid);
        }
        Commands::Get { uid } => {
            print_secret(&ctx.vault().get(&uid)?);
        }
        Commands::List => {
            let secrets = ctx.vault().list()?;
            if secrets.is_empty() {
                println!("No secrets");
            }
            for secret in &secrets {
                println!(
                    "{}  {}  {}",
                    secret.uid,
                    secret.payload.kind(),
                    secret.description
                );
            }
        }
        Commands::Update {
            uid,
            description,
            payload,
        } => {
            let secret = ctx
                .vault()
                .update(&uid, description.as_deref(), &payload.into_payload()?)?;
            println!("Updated {}", secret.uid);
        }
        Commands::Delete { uid } => {
            ctx.vault().delete(&uid)?;
            println!("Deleted {}", uid);
        }
        Commands::Download { uid, output } => {
            let path = ctx.vault().export_file(&uid, &output)?;
            println!("Wrote {}", path.display());
        }
        Commands::Sync => {
            let engine = SyncEngine::new(ctx.client()?, ctx.repository());
            let report = engine.run_once().await?;
            info!(?report, "Sync finished");
            println!(
                "Pushed {}, received {}, applied {}, dropped {}",
                report.pushed, report.received, report.applied, report.dropped
            );
        }
        Commands::Status => {
            let repo = ctx.repository();
            println!("Server:      {}", ctx.config.server_url);
            println!("Device:      {}", repo.device_id()?);
            println!(
                "Unlocked:    {}",
                if ctx.envelope.exists() { "yes" } else { "no" }
            );
            println!(
                "Session:     {}",
                if ctx.tokens().load().is_ok() { "active" } else { "none" }
            );
            match repo.last_synced_at()? {
                Some(at) => println!("Last sync:   {}", at.to_rfc3339()),
                None => println!("Last sync:   never"),
            }
            println!("Secrets:     {}", repo.list_active()?.len());
        }
    }

    Ok(())
}

fn account(ctx: &App, args: AccountArgs) -> Result<(SyncClient, Credentials)> {
    let device = match args.device {
        Some(device) => device,
        None => ctx.repository().device_id()?,
    };
    let password = rpassword::prompt_password("Master password: ")?;
    let credentials = Credentials {
        login: args.login,
        password,
        device,
    };
    credentials.validate()?;
    Ok((ctx.client()?, credentials))
}

fn print_secret(secret: &Secret) {
    println!("uid:         {}", secret.uid);
    println!("description: {}", secret.description);
    println!("updated:     {}", secret.updated_at.to_rfc3339());
    match &secret.payload {
        SecretPayload::Text(text) => println!("text:        {}", text),
        SecretPayload::Login(login) => {
            println!("login:       {}", login.login);
            println!("password:    {}", login.password);
        }
        SecretPayload::Card(card) => {
            println!("number:      {}", card.number);
            println!("expiry:      {}", card.expiry);
            println!("ccv:         {}", card.ccv);
        }
        SecretPayload::Binary(file) => {
            println!("file:        {} ({} bytes)", file.name, file.size);
        }
    }
}
