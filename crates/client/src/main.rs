// crates/client/src/main.rs
use clap::{Parser, Subcommand};
use helpdesk_client::{Console, ConsoleConfig};
use helpdesk_types::TicketStatus;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "helpdesk", version, about = "Support ticket chat console")]
struct Cli {
    /// REST base URL [env: HELPDESK_API_URL]
    #[arg(long)]
    api_url: Option<String>,

    /// Media base URL [env: HELPDESK_MEDIA_URL]
    #[arg(long)]
    media_url: Option<String>,

    /// Socket endpoint, defaults to the API URL [env: HELPDESK_SOCKET_URL]
    #[arg(long)]
    socket_url: Option<String>,

    /// Login cookie, e.g. "isLoggedIn=true; id=7; userToken=..." [env: HELPDESK_COOKIE]
    #[arg(long)]
    cookie: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print one page of tickets
    Tickets {
        #[arg(long, default_value = "open")]
        status: TicketStatus,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Interactive chat console
    Chat {
        #[arg(long, default_value = "open")]
        status: TicketStatus,
    },
}

impl Cli {
    fn config(&self) -> ConsoleConfig {
        let mut config = ConsoleConfig::default();
        if let Some(url) = &self.socket_url {
            config.override_socket_url(url.clone());
        }
        if let Some(url) = &self.api_url {
            config.override_api_url(url.clone());
        }
        if let Some(url) = &self.media_url {
            config.media_url = url.clone();
        }
        if let Some(cookie) = &self.cookie {
            config.cookie = cookie.clone();
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,helpdesk_client=info,helpdesk_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let cli = Cli::parse();
    let mut console = Console::new(&cli.config())?;
    match cli.command {
        Command::Tickets { status, page } => console.list(status, page).await?,
        Command::Chat { status } => console.run(status).await?,
    }
    Ok(())
}
