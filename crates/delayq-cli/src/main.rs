use std::io::Write;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use delayq_core::{ConsumerConfig, DelayQueue, DelayqConfig, QueueError, RedisStore, StoreError};
use tokio_stream::StreamExt;
use tracing::info;

#[derive(Parser)]
#[command(name = "delayq", about = "Delayed message queue CLI")]
struct Cli {
    /// Store URL; overrides the config file
    #[arg(long, env = "DELAYQ_REDIS_URL", global = true)]
    url: Option<String>,

    /// Config file (default: ./delayq.toml, then /etc/delayq/delayq.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule a message
    Enqueue {
        /// Queue id
        queue: String,

        /// Message payload (ignored with --file)
        #[arg(required_unless_present = "file")]
        payload: Option<String>,

        /// Read the payload from a file instead ("-" for stdin)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Delay in milliseconds before the message is due
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        delay_ms: i64,
    },

    /// Remove and print due messages
    Dequeue {
        /// Queue id
        queue: String,

        /// Maximum number of messages (0 = all due)
        #[arg(long, default_value = "1", allow_negative_numbers = true)]
        limit: i64,

        /// Print payloads hex-encoded
        #[arg(long)]
        hex: bool,
    },

    /// Print the number of messages in a queue, due or not
    Pending {
        /// Queue id
        queue: String,
    },

    /// Stream due messages until interrupted
    Watch {
        /// Queue id
        queue: String,

        /// Print payloads hex-encoded
        #[arg(long)]
        hex: bool,
    },
}

fn format_queue_error(err: &QueueError) -> String {
    match err {
        QueueError::InvalidQueueId(id) => format!("Error: invalid queue id {id:?}"),
        QueueError::Store(StoreError::Redis(e)) if e.is_io_error() || e.is_connection_refusal() => {
            "Error: cannot connect to store".to_string()
        }
        QueueError::Store(StoreError::Timeout(after)) => {
            format!("Error: store did not answer within {after:?}")
        }
        other => format!("Error: {other}"),
    }
}

fn fail(message: impl AsRef<str>) -> ! {
    eprintln!("{}", message.as_ref());
    process::exit(1);
}

fn write_payload(out: &mut impl Write, payload: &[u8], hex: bool) -> std::io::Result<()> {
    if hex {
        writeln!(out, "{}", hex::encode(payload))
    } else {
        out.write_all(payload)?;
        out.write_all(b"\n")
    }
}

fn read_payload(payload: Option<String>, file: Option<PathBuf>) -> Vec<u8> {
    match file {
        Some(path) if path.as_os_str() == "-" => {
            let mut buf = Vec::new();
            if let Err(e) = std::io::Read::read_to_end(&mut std::io::stdin(), &mut buf) {
                fail(format!("Error: reading stdin: {e}"));
            }
            buf
        }
        Some(path) => match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => fail(format!("Error: reading {}: {e}", path.display())),
        },
        None => payload.unwrap_or_default().into_bytes(),
    }
}

async fn cmd_enqueue(queue: &DelayQueue<RedisStore>, id: &str, payload: &[u8], delay_ms: i64) {
    match queue.enqueue(id, payload, delay_ms).await {
        Ok(()) => println!("Enqueued {} bytes to \"{id}\" (due in {delay_ms} ms)", payload.len()),
        Err(e) => fail(format_queue_error(&e)),
    }
}

async fn cmd_dequeue(queue: &DelayQueue<RedisStore>, id: &str, limit: i64, hex: bool) {
    let payloads = match queue.dequeue(id, limit).await {
        Ok(payloads) => payloads,
        Err(e) => fail(format_queue_error(&e)),
    };

    let mut out = std::io::stdout().lock();
    for payload in &payloads {
        if let Err(e) = write_payload(&mut out, payload, hex) {
            fail(format!("Error: writing output: {e}"));
        }
    }
}

async fn cmd_pending(queue: &DelayQueue<RedisStore>, id: &str) {
    match queue.pending(id).await {
        Ok(count) => println!("{count}"),
        Err(e) => fail(format_queue_error(&e)),
    }
}

async fn cmd_watch(queue: &DelayQueue<RedisStore>, id: &str, consumer: ConsumerConfig, hex: bool) {
    let mut stream = queue.consume(id, consumer);
    info!(queue = %id, "watching for due messages");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(payload)) => {
                    let mut out = std::io::stdout().lock();
                    if let Err(e) = write_payload(&mut out, &payload, hex).and_then(|()| out.flush()) {
                        fail(format!("Error: writing output: {e}"));
                    }
                }
                // Transient store errors are logged by the consumer; keep polling.
                Some(Err(e)) => eprintln!("{}", format_queue_error(&e)),
                None => break,
            },
            _ = &mut ctrl_c => break,
        }
    }
}

#[tokio::main]
async fn main() {
    delayq_core::telemetry::init_tracing();
    let cli = Cli::parse();

    let mut config = match DelayqConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail(format!("Error: {e}")),
    };
    if let Some(url) = cli.url {
        config.store.url = url;
    }

    let store = match RedisStore::connect(&config.store.url, config.store.response_timeout()).await
    {
        Ok(store) => store,
        Err(e) => fail(format!(
            "Error: cannot connect to store at {}: {e}",
            config.store.url
        )),
    };
    let queue = DelayQueue::with_options(store, config.queue);

    match cli.command {
        Commands::Enqueue {
            queue: id,
            payload,
            file,
            delay_ms,
        } => {
            let payload = read_payload(payload, file);
            cmd_enqueue(&queue, &id, &payload, delay_ms).await
        }
        Commands::Dequeue {
            queue: id,
            limit,
            hex,
        } => cmd_dequeue(&queue, &id, limit, hex).await,
        Commands::Pending { queue: id } => cmd_pending(&queue, &id).await,
        Commands::Watch { queue: id, hex } => {
            cmd_watch(&queue, &id, config.consumer, hex).await
        }
    }
}
