use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use agentmarket_assistant::model::{Product, ProductQuery};
use agentmarket_assistant::voice::{MAX_RECORDING, Microphone, SampleBuffer};
use agentmarket_assistant::{
    AgentApi, AssistantSession, AuthApi, CatalogApi, ClientContext, Config, CpalMicrophone,
    FileStore, RealtimeChannel, SuggestionsOutcome, TransportClient, VoiceCapture,
};

const GREETING: &str = "Hi! I'm your shopping assistant. What are you looking for today?";

/// Agentmarket - conversational shopping assistant client
#[derive(Parser)]
#[command(name = "agentmarket", version, about)]
struct Cli {
    /// Base URL of the assistant API
    #[arg(long, env = "AGENTMARKET_API_URL")]
    api_url: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive chat (default)
    Chat {
        /// Use the realtime channel instead of request/response
        #[arg(long)]
        realtime: bool,
    },
    /// Record one voice message and send it
    Voice,
    /// Search the catalog
    Products {
        /// Free-text search
        search: Option<String>,
        /// Category id
        #[arg(long)]
        category: Option<i64>,
        /// Minimum price
        #[arg(long)]
        min_price: Option<f64>,
        /// Maximum price
        #[arg(long)]
        max_price: Option<f64>,
        /// Max results
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Show one product
    Product {
        /// Product id
        id: i64,
    },
    /// List featured products
    Featured,
    /// List product categories
    Categories,
    /// Show the stored conversation for the current session
    History,
    /// Inspect or change the persisted session id
    Session {
        #[command(subcommand)]
        action: Option<SessionAction>,
    },
    /// Log in and store the access token
    Login {
        /// Account email
        email: String,
        /// Account password
        #[arg(long, env = "AGENTMARKET_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored access token
    Logout,
    /// Check backend health
    Health,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Print the session id
    Show,
    /// Replace the session id
    Set {
        /// New session id
        id: String,
    },
    /// Start a fresh session
    New,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,agentmarket_assistant=info",
        1 => "info,agentmarket_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }
    tracing::debug!(?config, "loaded configuration");

    let store = Arc::new(FileStore::open(config.state_file())?);
    let ctx = ClientContext::from_config(&config, store)?;
    let transport = TransportClient::new(ctx.clone());

    match cli.command.unwrap_or(Command::Chat { realtime: false }) {
        Command::Chat { realtime } => {
            if realtime || config.realtime_enabled {
                chat_realtime(&ctx, transport).await
            } else {
                chat(&ctx, transport).await
            }
        }
        Command::Voice => voice(&ctx, transport).await,
        Command::Products {
            search,
            category,
            min_price,
            max_price,
            limit,
        } => {
            let query = ProductQuery {
                search,
                category,
                min_price,
                max_price,
                limit,
                ..ProductQuery::default()
            };
            let products = CatalogApi::new(transport).products(&query).await?;
            print_products(&products);
            Ok(())
        }
        Command::Product { id } => {
            let product = CatalogApi::new(transport).product(id).await?;
            println!("{}", serde_json::to_string_pretty(&product)?);
            Ok(())
        }
        Command::Featured => {
            print_products(&CatalogApi::new(transport).featured().await?);
            Ok(())
        }
        Command::Categories => {
            for category in CatalogApi::new(transport).categories().await? {
                println!("{:>4}  {}", category.id, category.name);
            }
            Ok(())
        }
        Command::History => {
            let conversation = AgentApi::new(transport)
                .conversation(&ctx.sessions().session_id())
                .await?;
            println!("{}", serde_json::to_string_pretty(&conversation)?);
            Ok(())
        }
        Command::Session { action } => session(&ctx, action.unwrap_or(SessionAction::Show)),
        Command::Login { email, password } => {
            let response = AuthApi::new(transport).login(&email, &password).await?;
            match response.user {
                Some(user) => println!("logged in as {} ({:?})", user.username, user.role),
                None => println!("logged in"),
            }
            Ok(())
        }
        Command::Logout => {
            AuthApi::new(transport).logout()?;
            println!("logged out");
            Ok(())
        }
        Command::Health => {
            let health = AgentApi::new(transport).health().await?;
            println!("{}", health.status);
            Ok(())
        }
        Command::TestMic { duration } => test_mic(duration).await,
    }
}

/// Request/response chat loop over stdin
async fn chat(ctx: &ClientContext, transport: TransportClient) -> anyhow::Result<()> {
    let session = AssistantSession::new(Arc::new(AgentApi::new(transport)), ctx.sessions())
        .with_greeting(GREETING);
    println!("assistant> {GREETING}");
    println!("(type /quit to exit)\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }

        match session.send_text(line).await {
            Ok(outcome) => {
                println!("assistant> {}", outcome.reply.text);
                if let SuggestionsOutcome::Applied { .. } = outcome.suggestions {
                    print_products(&session.suggestions());
                }
            }
            Err(e) => println!("error: {e}"),
        }
    }

    Ok(())
}

/// Chat loop over the realtime channel; replies are printed as they arrive
async fn chat_realtime(ctx: &ClientContext, transport: TransportClient) -> anyhow::Result<()> {
    let session = Arc::new(AssistantSession::new(
        Arc::new(AgentApi::new(transport)),
        ctx.sessions(),
    ));
    let channel = RealtimeChannel::new(ctx)?;
    let mut inbound = channel.connect().await?;
    println!("connected to {} (type /quit to exit)\n", channel.url());

    let printer = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            while let Some(message) = inbound.next().await {
                println!("{}> {}", message.role, message.text);
                session.receive(message);
            }
            println!("realtime channel closed");
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Err(e) = session.send_realtime(&channel, line) {
            println!("error: {e}");
            if !channel.is_open() {
                break;
            }
        }
    }

    channel.disconnect();
    printer.abort();
    Ok(())
}

/// Record until Enter or the ceiling, then send
#[allow(clippy::future_not_send)]
async fn voice(ctx: &ClientContext, transport: TransportClient) -> anyhow::Result<()> {
    let mut capture = VoiceCapture::new(CpalMicrophone::new());

    println!(
        "Recording... press Enter to stop (max {}s)",
        MAX_RECORDING.as_secs()
    );
    let recording = capture
        .record(async {
            let mut line = String::new();
            let _ = BufReader::new(tokio::io::stdin()).read_line(&mut line).await;
        })
        .await?;
    println!("Sending {} bytes of audio...", recording.len());

    let session = AssistantSession::new(Arc::new(AgentApi::new(transport)), ctx.sessions());
    let reply = session.send_voice(recording).await?;
    println!("assistant> {}", reply.text);
    Ok(())
}

fn session(ctx: &ClientContext, action: SessionAction) -> anyhow::Result<()> {
    let sessions = ctx.sessions();
    match action {
        SessionAction::Show => println!("{}", sessions.session_id()),
        SessionAction::Set { id } => {
            sessions.set_session_id(&id)?;
            println!("{id}");
        }
        SessionAction::New => {
            let id = agentmarket_assistant::store::generate_session_id();
            sessions.set_session_id(&id)?;
            println!("{id}");
        }
    }
    Ok(())
}

fn print_products(products: &[Product]) {
    if products.is_empty() {
        println!("(no products)");
        return;
    }
    for product in products {
        println!("{:>6}  {:<40}  {:>10.2}", product.id, product.name, product.price);
    }
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let microphone = CpalMicrophone::new();
    let buffer = SampleBuffer::new();
    let stream = microphone.acquire(buffer.clone())?;

    println!("Sample rate: {} Hz", microphone.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = buffer.take();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    stream.release();
    println!("\nMicrophone test complete!");
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
