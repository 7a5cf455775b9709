use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Deserialize;
use tokio::{io::BufReader, sync::broadcast};
use tsq_common::{Signal, internal, logging};
use tsq_storage::{DEFAULT_QUEUE_NAME, MediumConfig, StorageConfig};
use tsq_tracing::traced;

use crate::{
    dispatcher::{self, Dispatcher},
    session::Session,
};

/// Environment variable naming the configuration file.
pub const CONFIG_VAR: &str = "TSQ_CONFIG";

/// Configuration files tried, in order, when none is named explicitly.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["./tsq.config.ron", "/etc/tsq/tsq.config.ron"];

/// Storage backend chosen on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Memory,
    Queue,
    Cached,
}

/// The top-level configuration, and the application it describes
///
/// ```ron
/// Tsq (
///     storage: Queue(
///         medium: File(path: "/var/lib/tsq"),
///     ),
/// )
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Tsq {
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Tsq {
    /// Load the configuration
    ///
    /// `explicit` takes precedence over [`find_config_file`]. Without any
    /// configuration file the defaults are used.
    ///
    /// # Errors
    /// If a configuration file is named but missing, cannot be read, or does
    /// not parse
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = find_config_file(explicit)? else {
            internal!(level = INFO, "No configuration file found, using defaults");
            return Ok(Self::default());
        };

        internal!(level = INFO, "Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {}", path.display(), e)
        })?;

        Self::parse(&content)
    }

    /// Parse a configuration from RON.
    ///
    /// # Errors
    /// If `content` is not a valid configuration
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(content)?)
    }

    /// Switch to `backend`, keeping the configured queue and medium where the
    /// new backend has a use for them.
    #[must_use]
    pub fn with_backend(mut self, backend: Backend) -> Self {
        let (queue, medium) = match self.storage {
            StorageConfig::Queue { queue, medium } | StorageConfig::CachedQueue { queue, medium } => {
                (queue, medium)
            }
            StorageConfig::Memory => (DEFAULT_QUEUE_NAME.to_string(), MediumConfig::default()),
        };

        self.storage = match backend {
            Backend::Memory => StorageConfig::Memory,
            Backend::Queue => StorageConfig::Queue { queue, medium },
            Backend::Cached => StorageConfig::CachedQueue { queue, medium },
        };
        self
    }

    async fn bind(self) -> anyhow::Result<Dispatcher> {
        internal!("Using {} storage", self.storage.kind());

        let mut dispatcher = Dispatcher::new();
        dispatcher.bind(self.storage.into_service()?).await?;
        Ok(dispatcher)
    }

    /// Run a single action and return the rendered reply.
    ///
    /// # Errors
    /// If the storage service cannot be built or bound
    pub async fn run_action(self, line: &str) -> anyhow::Result<String> {
        let mut dispatcher = self.bind().await?;

        let reply = dispatcher::render(&dispatcher.dispatch(line).await);

        if let Some(service) = dispatcher.bound().cloned() {
            dispatcher.unbind(&service).await?;
        }

        Ok(reply)
    }

    /// Run an interactive session over stdin and stdout
    ///
    /// Ends at end of input, or on CTRL+C or SIGTERM.
    ///
    /// # Errors
    /// If the storage service cannot be built or bound, or the terminal fails
    #[traced(instrument(level = tracing::Level::TRACE, skip_all, err), timing(precision = "s"))]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();
        let mut dispatcher = self.bind().await?;

        internal!(level = INFO, "Session starting");

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let signals = tokio::spawn(async move {
            match shutdown().await {
                Ok(()) => {
                    // The session may already have finished
                    let _ = shutdown_tx.send(Signal::Shutdown);
                }
                Err(e) => {
                    internal!(level = ERROR, "Unable to listen for shutdown signals: {e}");
                    std::future::pending::<()>().await;
                }
            }
        });

        let ret = Session::new(
            &dispatcher,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
        .run(shutdown_rx)
        .await;
        signals.abort();

        if let Ok(handled) = ret {
            internal!("Handled {handled} actions");
        }

        internal!(level = INFO, "Shutting down...");

        if let Some(service) = dispatcher.bound().cloned() {
            dispatcher.unbind(&service).await?;
        }

        ret?;
        Ok(())
    }
}

#[traced(instrument(level = tracing::Level::TRACE))]
async fn shutdown() -> std::io::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            r?;
            internal!(level = INFO, "CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    Ok(())
}

/// Find the configuration file using the following precedence:
/// 1. `explicit`, usually from `--config`
/// 2. `TSQ_CONFIG` environment variable
/// 3. ./tsq.config.ron (current working directory)
/// 4. /etc/tsq/tsq.config.ron (system-wide config)
///
/// # Errors
/// If `explicit` or `TSQ_CONFIG` names a file that does not exist
pub fn find_config_file(explicit: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    let env_path = std::env::var_os(CONFIG_VAR).map(PathBuf::from);
    find_config_file_from(explicit, env_path.as_deref(), &DEFAULT_CONFIG_PATHS.map(Path::new))
}

fn find_config_file_from(
    explicit: Option<&Path>,
    env_path: Option<&Path>,
    default_paths: &[&Path],
) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        anyhow::bail!("Config file does not exist: {}", path.display());
    }

    if let Some(path) = env_path {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        anyhow::bail!(
            "{CONFIG_VAR} points to non-existent file: {}",
            path.display()
        );
    }

    Ok(default_paths
        .iter()
        .find(|path| path.exists())
        .map(|path| path.to_path_buf()))
}
