use clap::{Args, Parser, Subcommand};
use formpay::application::holding::SubmissionHoldingArea;
use formpay::application::orchestrator::PaymentOrchestrator;
use formpay::application::token::TokenLifecycleManager;
use formpay::config::{
    Credentials, GatewayConfig, HoldingConfig, OrchestratorConfig, RefreshFallback,
    SANDBOX_BASE_URL, TOKEN_STORE_CAPACITY,
};
use formpay::domain::ports::{
    FormStore, FormStoreBox, KeyValueStoreRef, PaymentGatewayRef, PaymentStoreBox, TokenIssuer,
};
use formpay::domain::provider::ProviderOutcome;
use formpay::infrastructure::bkash::{BkashClient, BkashGateway};
#[cfg(feature = "storage-rocksdb")]
use formpay::infrastructure::rocksdb::RocksDBStore;
use formpay::infrastructure::in_memory::{InMemoryFormStore, InMemoryPaymentStore};
use formpay::infrastructure::ttl_cache::MokaKeyValueStore;
use formpay::interfaces::http;
use formpay::interfaces::json::form_loader::FormLoader;
use formpay::telemetry::{self, LogFormat};
use miette::{IntoDiagnostic, Result, miette};
use std::fs::File;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true, env = "FORMPAY_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "FORMPAY_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(flatten)]
    gateway: GatewayArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GatewayArgs {
    /// Provider checkout API root
    #[arg(long, global = true, env = "BKASH_BASE_URL", default_value = SANDBOX_BASE_URL)]
    base_url: String,

    #[arg(long, global = true, env = "BKASH_APP_KEY")]
    app_key: Option<String>,

    #[arg(long, global = true, env = "BKASH_APP_SECRET", hide_env_values = true)]
    app_secret: Option<String>,

    #[arg(long, global = true, env = "BKASH_USERNAME")]
    username: Option<String>,

    #[arg(long, global = true, env = "BKASH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long, global = true, env = "BKASH_CURRENCY", default_value = "BDT")]
    currency: String,

    /// Seconds subtracted from the provider-reported token lifetime
    #[arg(long, global = true, env = "BKASH_TOKEN_EXPIRY_MARGIN_SECS", default_value_t = 60)]
    token_expiry_margin_secs: u64,

    /// Propagate transport failures during refresh instead of regenerating
    #[arg(long, global = true, env = "BKASH_STRICT_REFRESH")]
    strict_refresh: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the payment endpoints over HTTP
    Serve {
        #[arg(long, env = "FORMPAY_BIND", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,

        /// Form definitions to load before serving
        #[arg(long, env = "FORMPAY_FORMS")]
        forms: Option<PathBuf>,

        /// Form that held submissions are stored into when none is named
        #[arg(long, env = "FORMPAY_PAYMENT_FORM_ID", default_value_t = 2)]
        payment_form_id: u64,

        /// Lifetime of held form data, in seconds
        #[arg(long, env = "FORMPAY_SUBMISSION_TTL_SECS", default_value_t = 3_600)]
        submission_ttl_secs: u64,

        /// Most submissions held at once; older ones are evicted past it
        #[arg(long, env = "FORMPAY_MAX_HELD_SUBMISSIONS", default_value_t = 100_000)]
        max_held_submissions: u64,
    },
    /// Request one token grant to check the configured credentials
    VerifyCredentials,
    /// Print stored payment records as JSON lines
    ListPayments,
    /// Validate a form definitions file and summarize it
    ListForms {
        #[arg(long)]
        forms: PathBuf,
    },
}

impl GatewayArgs {
    fn config(&self) -> Result<GatewayConfig> {
        let credentials = Credentials {
            app_key: required(&self.app_key, "BKASH_APP_KEY")?,
            app_secret: required(&self.app_secret, "BKASH_APP_SECRET")?,
            username: required(&self.username, "BKASH_USERNAME")?,
            password: required(&self.password, "BKASH_PASSWORD")?,
        };
        let mut config = GatewayConfig::new(&self.base_url, credentials).into_diagnostic()?;
        config.currency = self.currency.clone();
        config.token_expiry_margin = Duration::from_secs(self.token_expiry_margin_secs);
        if self.strict_refresh {
            config.refresh_fallback = RefreshFallback::ProviderRejectionOnly;
        }
        Ok(config)
    }
}

fn required(value: &Option<String>, env: &str) -> Result<String> {
    value
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| miette!("missing provider credential: set {env}"))
}

struct Stores {
    payments: PaymentStoreBox,
    forms: FormStoreBox,
}

fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(db_path) => {
            let store = RocksDBStore::open(db_path).into_diagnostic()?;
            Ok(Stores {
                payments: Box::new(store.clone()),
                forms: Box::new(store),
            })
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            tracing::warn!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(in_memory_stores())
        }
        None => Ok(in_memory_stores()),
    }
}

fn in_memory_stores() -> Stores {
    Stores {
        payments: Box::new(InMemoryPaymentStore::new()),
        forms: Box::new(InMemoryFormStore::new()),
    }
}

fn token_manager(config: &Arc<GatewayConfig>, cache: KeyValueStoreRef) -> Arc<TokenLifecycleManager> {
    Arc::new(TokenLifecycleManager::new(
        Arc::new(BkashClient::new(config.clone())),
        cache,
        config.token_expiry_margin,
        config.token_cache_ttl,
        config.refresh_fallback,
    ))
}

async fn load_forms(path: PathBuf, store: &dyn FormStore) -> Result<usize> {
    let file = File::open(path).into_diagnostic()?;
    FormLoader::new(file).load_into(store).await.into_diagnostic()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_format);

    match cli.command {
        Command::Serve {
            bind,
            forms,
            payment_form_id,
            submission_ttl_secs,
            max_held_submissions,
        } => {
            let config = Arc::new(cli.gateway.config()?);
            let stores = open_stores(cli.db_path)?;
            if let Some(path) = forms {
                load_forms(path, stores.forms.as_ref()).await?;
            }

            let token_store: KeyValueStoreRef =
                Arc::new(MokaKeyValueStore::with_capacity(TOKEN_STORE_CAPACITY));
            let tokens = token_manager(&config, token_store);
            let gateway: PaymentGatewayRef =
                Arc::new(BkashGateway::new(BkashClient::new(config.clone()), tokens));
            let holding_config = HoldingConfig {
                submission_ttl: Duration::from_secs(submission_ttl_secs),
                max_entries: max_held_submissions,
            };
            let held: KeyValueStoreRef =
                Arc::new(MokaKeyValueStore::with_capacity(holding_config.max_entries));
            let orchestrator = PaymentOrchestrator::new(
                gateway,
                SubmissionHoldingArea::new(held, holding_config.submission_ttl),
                stores.payments,
                stores.forms,
                OrchestratorConfig {
                    default_form_id: payment_form_id,
                },
            );

            let listener = tokio::net::TcpListener::bind(bind).await.into_diagnostic()?;
            tracing::info!(%bind, "listening");
            axum::serve(listener, http::router(Arc::new(orchestrator)))
                .await
                .into_diagnostic()?;
        }
        Command::VerifyCredentials => {
            let config = Arc::new(cli.gateway.config()?);
            match BkashClient::new(config).grant().await.into_diagnostic()? {
                ProviderOutcome::Success(grant) => {
                    println!("Credentials accepted (token lifetime {}s)", grant.expires_in);
                }
                ProviderOutcome::Rejected(rejection) => {
                    return Err(miette!(
                        "credentials rejected: {} ({})",
                        rejection.status_message,
                        rejection.status_code
                    ));
                }
            }
        }
        Command::ListPayments => {
            let stores = open_stores(cli.db_path)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for record in stores.payments.get_all().await.into_diagnostic()? {
                let line = serde_json::to_string(&record).into_diagnostic()?;
                writeln!(out, "{line}").into_diagnostic()?;
            }
        }
        Command::ListForms { forms } => {
            let file = File::open(forms).into_diagnostic()?;
            let definitions = FormLoader::new(file).definitions().into_diagnostic()?;
            for definition in definitions {
                println!(
                    "{}\t{}\t{} fields",
                    definition.form.id,
                    definition.form.name,
                    definition.fields.len()
                );
            }
        }
    }

    Ok(())
}
