use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "org.rollcall.Rollcall1",
    default_service = "org.rollcall.Rollcall1",
    default_path = "/org/rollcall/Rollcall1"
)]
trait Rollcall {
    fn register(&self, user: &str) -> zbus::Result<()>;
    fn enroll(&self, user: &str, images: &[Vec<u8>]) -> zbus::Result<String>;
    fn mark_attendance(&self, user: &str, image: &[u8]) -> zbus::Result<String>;
    fn list_references(&self, user: &str) -> zbus::Result<String>;
    fn remove_reference(&self, user: &str, key: &str) -> zbus::Result<bool>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall face attendance CLI")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    /// User to act as (defaults to $USER)
    #[arg(short, long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare storage for a user without uploading anything
    Register,
    /// Upload one or more reference photos
    Enroll {
        /// Image files (JPEG, PNG, ...)
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Mark attendance with a probe photo
    Attend {
        image: PathBuf,
    },
    /// List stored reference photos
    List,
    /// Remove a stored reference photo
    Remove {
        /// Storage key as printed by `list`
        key: String,
    },
    /// Show daemon status
    Status,
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn pretty(json: &str) -> String {
    serde_json::from_str::<serde_json::Value>(json)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or_else(|_| json.to_string())
}

/// Status field of a daemon reply; missing counts as failure.
fn reply_status(json: &str) -> u64 {
    serde_json::from_str::<serde_json::Value>(json)
        .ok()
        .and_then(|v| v["status"].as_u64())
        .unwrap_or(500)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("failed to connect to D-Bus")?;
    let proxy = RollcallProxy::new(&conn)
        .await
        .context("rollcalld is not reachable")?;

    let user = match cli.user {
        Some(user) => user,
        None => std::env::var("USER").context("no --user given and $USER is unset")?,
    };
    tracing::debug!(%user, "connected to rollcalld");

    match cli.command {
        Commands::Register => {
            proxy.register(&user).await?;
            println!("Registered {user}");
        }
        Commands::Enroll { images } => {
            let blobs = images.iter().map(|p| read_image(p)).collect::<Result<Vec<_>>>()?;
            let reply = proxy.enroll(&user, &blobs).await?;
            println!("{}", pretty(&reply));
            if reply_status(&reply) != 200 {
                std::process::exit(1);
            }
        }
        Commands::Attend { image } => {
            let probe = read_image(&image)?;
            let reply = proxy.mark_attendance(&user, &probe).await?;
            println!("{}", pretty(&reply));
            if reply_status(&reply) != 200 {
                std::process::exit(1);
            }
        }
        Commands::List => {
            let reply = proxy.list_references(&user).await?;
            let keys: Vec<String> = serde_json::from_str(&reply).context("malformed reply")?;
            if keys.is_empty() {
                println!("No reference photos for {user}");
            }
            for key in keys {
                println!("{key}");
            }
        }
        Commands::Remove { key } => {
            if !proxy.remove_reference(&user, &key).await? {
                bail!("no reference {key} for {user}");
            }
            println!("Removed {key}");
        }
        Commands::Status => {
            println!("{}", pretty(&proxy.status().await?));
        }
    }

    Ok(())
}
