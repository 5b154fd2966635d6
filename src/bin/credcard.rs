//! CredCard CLI
//!
//! Commands: serve, render, check-token
//! `render` and `check-token` print JSON to stdout and exit non-zero on failure.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use credcard_core::api::{self, AppState};
use credcard_core::credential::ValidationToken;
use credcard_core::service::load_template;
use credcard_core::store::{CredentialStore, JsonFileStore};
use credcard_core::{
    AppConfig, CardFormat, CardRenderer, CardService, CpfDisplay, CredentialId, Environment,
    HttpPhotoSource, MemoryPhotoSource, PhotoSource, PrintSpec, RenderOptions, ValidationResolver,
};

#[derive(Parser)]
#[command(name = "credcard")]
#[command(about = "CredCard - member credential card engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve(ServeArgs),

    /// Render one credential JSON file to a PNG
    Render(RenderArgs),

    /// Check that a string is a well-formed validation token
    CheckToken {
        token: String,
    },
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "CREDCARD_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Host embedded in validation URLs
    #[arg(long, env = "CREDCARD_PUBLIC_HOST")]
    public_host: String,

    /// Background template PNG
    #[arg(long, env = "CREDCARD_BACKGROUND", default_value = "assets/background.png")]
    background: PathBuf,

    /// Credential records (JSON); issued identifiers are written back
    #[arg(long, env = "CREDCARD_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Base URL of the photo store
    #[arg(long, env = "CREDCARD_PHOTO_STORE_URL")]
    photo_store_url: Option<String>,

    /// Operator bearer token
    #[arg(long, env = "CREDCARD_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    #[arg(long, env = "CREDCARD_ENV", value_enum, default_value_t = Environment::Production)]
    environment: Environment,

    #[arg(long, env = "CREDCARD_FETCH_TIMEOUT_MS", default_value_t = 5000)]
    fetch_timeout_ms: u64,
}

impl ServeArgs {
    fn into_config(self) -> AppConfig {
        AppConfig {
            public_host: self.public_host,
            background_path: self.background,
            credentials_path: self.credentials,
            photo_store_url: self.photo_store_url,
            auth_token: self.auth_token,
            environment: self.environment,
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Raster,
    Print,
}

#[derive(Args)]
struct RenderArgs {
    /// Credential record or list of records (JSON); issued identifiers are
    /// written back to this file
    #[arg(short, long)]
    credential: PathBuf,

    /// Which record to render when the file holds more than one
    #[arg(long)]
    id: Option<String>,

    /// Member photo (PNG or JPEG)
    #[arg(short, long)]
    photo: Option<PathBuf>,

    #[arg(short, long, env = "CREDCARD_BACKGROUND")]
    background: PathBuf,

    #[arg(long, env = "CREDCARD_PUBLIC_HOST")]
    public_host: String,

    #[arg(short, long)]
    output: PathBuf,

    #[arg(long, value_enum, default_value = "raster")]
    format: FormatArg,

    /// Print resolution; only used with `--format print`
    #[arg(long)]
    dpi: Option<u32>,

    #[arg(long, default_value_t = false)]
    full_cpf: bool,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn fail(error: impl std::fmt::Display) -> ExitCode {
    println!("{}", serde_json::json!({ "success": false, "error": error.to_string() }));
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Serve(args) => match serve(args.bind, args.into_config()).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "server stopped");
                ExitCode::FAILURE
            }
        },
        Commands::Render(args) => render(args).await,
        Commands::CheckToken { token } => match ValidationToken::parse(&token) {
            Ok(token) => {
                println!("{}", serde_json::json!({ "valid": true, "token": token }));
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("{}", serde_json::json!({ "valid": false, "error": e.to_string() }));
                ExitCode::from(2)
            }
        },
    }
}

async fn serve(bind: SocketAddr, config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let template = load_template(&config.background_path, config.fetch_timeout).await?;
    let renderer = Arc::new(CardRenderer::new(template, config.public_host.clone())?);

    let photos: Arc<dyn PhotoSource> = match &config.photo_store_url {
        Some(url) => {
            let client = reqwest::Client::builder().timeout(config.fetch_timeout).build()?;
            Arc::new(HttpPhotoSource::new(client, url.clone()))
        }
        None => {
            tracing::warn!("no photo store configured, every card gets the placeholder");
            Arc::new(MemoryPhotoSource::new())
        }
    };

    let store = config.open_store()?;
    let cards = CardService::new(store.clone(), renderer, photos)
        .with_fetch_timeout(config.fetch_timeout);
    let resolver = ValidationResolver::new(store);

    if config.auth_token.is_none() {
        tracing::warn!("CREDCARD_AUTH_TOKEN unset, operator routes are unauthenticated");
    }
    let app = api::app(AppState::new(config, cards, resolver));

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        version = credcard_core::ENGINE_VERSION,
        "credcard listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}

async fn render(args: RenderArgs) -> ExitCode {
    let store = match JsonFileStore::open(&args.credential) {
        Ok(store) => Arc::new(store),
        Err(e) => return fail(format!("invalid credential file: {e}")),
    };
    let id = match (&args.id, store.ids().as_slice()) {
        (Some(id), _) => CredentialId::new(id.clone()),
        (None, [only]) => only.clone(),
        (None, _) => return fail("credential file holds several records, pass --id"),
    };

    let format = match args.format {
        FormatArg::Raster => CardFormat::Raster,
        FormatArg::Print => match args.dpi.map(PrintSpec::from_user).transpose() {
            Ok(spec) => CardFormat::Print(spec.unwrap_or_default()),
            Err(e) => return fail(e),
        },
    };
    let options = RenderOptions {
        format,
        cpf_display: if args.full_cpf { CpfDisplay::Full } else { CpfDisplay::Masked },
        ..RenderOptions::default()
    };

    let template = match load_template(&args.background, Duration::from_secs(10)).await {
        Ok(t) => t,
        Err(e) => return fail(e),
    };
    let renderer = match CardRenderer::new(template, args.public_host) {
        Ok(r) => Arc::new(r),
        Err(e) => return fail(e),
    };

    let service = CardService::new(store.clone(), renderer, Arc::new(MemoryPhotoSource::new()));
    let rendered = match &args.photo {
        Some(path) => match std::fs::read(path) {
            Ok(bytes) => service.render_card_with_photo(&id, bytes, options).await,
            Err(e) => return fail(format!("{}: {e}", path.display())),
        },
        None => service.render_card(&id, options).await,
    };
    let card = match rendered {
        Ok(card) => card,
        Err(e) => return fail(e),
    };
    if let Err(e) = std::fs::write(&args.output, &card.png) {
        return fail(format!("{}: {e}", args.output.display()));
    }

    let identifiers = match store.get(&id) {
        Ok(record) => record.and_then(|c| c.identifiers),
        Err(e) => return fail(e),
    };
    let output = serde_json::json!({
        "success": true,
        "output": args.output,
        "card_number": card.card_number,
        "fingerprint": card.fingerprint,
        "identifiers": identifiers,
    });
    println!("{output}");
    ExitCode::SUCCESS
}
