mod cache;
mod client;
mod config;
mod connectivity;
mod db;
mod http;
mod interceptor;
mod logging;
mod net;
mod notify;
mod queue;
#[cfg(test)]
mod testing;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::cache::{CacheStore, MemoryCacheStore, SqliteCacheStore};
use crate::client::OfflineClient;
use crate::config::Config;
use crate::connectivity::ConnectivityMonitor;
use crate::http::{Headers, Request};
use crate::net::ReqwestNetwork;
use crate::notify::{ClickOutcome, HeadlessPlatform, Notification};
use crate::queue::{MemoryOperationQueue, OperationQueue, SqliteOperationQueue};
use crate::worker::{Outcome, ServiceWorker, WorkerEvent, WorkerSettings};

#[derive(Parser, Debug)]
#[command(name = "evidence-sync")]
#[command(about = "Offline cache and sync layer for the evidence analysis front end")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/evidence-sync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Application origin, e.g. http://localhost:3000
  #[arg(long, global = true)]
  origin: Option<String>,

  /// Keep cache and queue in memory for this run only
  #[arg(long, global = true)]
  ephemeral: bool,

  /// Debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Precache the static assets and activate the current cache version
  Install,
  /// Send a request through the offline layer and print the body
  Fetch {
    /// Absolute URL or path relative to the origin
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Extra header, 'Name: value'
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
    /// Request body
    #[arg(short, long)]
    data: Option<String>,
    /// Ask for an HTML document (enables the offline page fallback)
    #[arg(long)]
    html: bool,
  },
  /// List cache partitions; the current one is starred
  Caches,
  /// Inspect pending operations
  Queue {
    #[command(subcommand)]
    action: QueueAction,
  },
  /// Replay pending operations now
  Sync {
    /// Sync tag (defaults to the configured one)
    #[arg(long)]
    tag: Option<String>,
  },
  /// Deliver a push message given as JSON
  Push { payload: String },
  /// Click a notification pointing at URL
  Click { url: String },
  /// Watch connectivity and sync whenever the origin comes back
  Watch,
}

#[derive(Subcommand, Debug)]
enum QueueAction {
  List,
  Remove { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  let config = if let Some(origin) = args.origin.clone() {
    Config { origin, ..config }
  } else {
    config
  };

  let data_dir = config.data_dir()?;
  let _log_guard = logging::init(&data_dir, args.verbose)?;

  let settings = WorkerSettings::from_config(&config)?;
  let network = ReqwestNetwork::new(&settings.origin, config.network.timeout())?;

  if args.ephemeral {
    run(
      args.command,
      &config,
      settings,
      MemoryCacheStore::new(),
      MemoryOperationQueue::new(),
      network,
    )
    .await
  } else {
    let cache = SqliteCacheStore::open(&data_dir.join("cache.db"))?;
    let queue = SqliteOperationQueue::open(&data_dir.join("queue.db"))?;
    run(args.command, &config, settings, cache, queue, network).await
  }
}

async fn run<C, Q>(
  command: Command,
  config: &Config,
  settings: WorkerSettings,
  cache: C,
  queue: Q,
  network: ReqwestNetwork,
) -> Result<()>
where
  C: CacheStore,
  Q: OperationQueue,
{
  let worker = Arc::new(ServiceWorker::new(
    settings,
    cache,
    queue,
    network,
    HeadlessPlatform::new(),
  ));

  match command {
    Command::Install => {
      worker.start().await?;
      println!("Activated {}", worker.settings().cache_name);
    }
    Command::Fetch {
      url,
      method,
      headers,
      data,
      html,
    } => {
      if let Err(e) = worker.start().await {
        warn!(error = %e, "Worker not active, requests go straight to the network");
      }

      let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;
      let mut request = Request::new(method, worker.settings().resolve(&url)?);
      for line in &headers {
        let (name, value) = Headers::parse_line(line)?;
        request.headers.insert(&name, value);
      }
      if html {
        request.headers.insert("Accept", "text/html");
      }
      if let Some(data) = data {
        request.body = Some(data.into_bytes());
      }

      let client = OfflineClient::new(worker.clone());
      let sent = client.send(request).await?;

      eprintln!("HTTP {}", sent.response.status);
      if let Some(id) = sent.queued_as {
        eprintln!("Queued as operation {}", id);
      }
      std::io::stdout()
        .write_all(&sent.response.body)
        .map_err(|e| eyre!("Failed to write response body: {}", e))?;
    }
    Command::Caches => {
      for name in worker.cache().keys()? {
        let marker = if name == worker.settings().cache_name { "*" } else { " " };
        println!("{} {}", marker, name);
      }
    }
    Command::Queue { action } => match action {
      QueueAction::List => {
        for queued in worker.queue().drain()? {
          let op = &queued.operation;
          println!(
            "{}\t{}\t{}\t{}\t{}",
            queued.id,
            queued.queued_at.to_rfc3339(),
            op.method,
            op.url,
            op.body.as_deref().unwrap_or("-")
          );
        }
      }
      QueueAction::Remove { id } => {
        worker.queue().remove(id)?;
        println!("Removed operation {}", id);
      }
    },
    Command::Sync { tag } => {
      let tag = tag.unwrap_or_else(|| worker.settings().sync_tag.clone());
      match OfflineClient::new(worker.clone()).request_sync(&tag).await? {
        Some(report) => println!(
          "Replayed {} of {} operation(s), {} still pending",
          report.replayed.len(),
          report.attempted(),
          report.failed.len()
        ),
        None => println!("Nothing registered for sync tag '{}'", tag),
      }
    }
    Command::Push { payload } => {
      worker
        .dispatch(WorkerEvent::Push(payload.into_bytes()))
        .await?;
      for n in worker.platform().shown()? {
        println!("{}: {}", n.title, n.body);
      }
    }
    Command::Click { url } => {
      let notification = Notification {
        title: String::new(),
        body: String::new(),
        icon: worker.settings().notification_icon.clone(),
        badge: worker.settings().notification_badge.clone(),
        url: Some(url),
      };
      match worker
        .dispatch(WorkerEvent::NotificationClick(notification))
        .await?
      {
        Outcome::Clicked(ClickOutcome::Focused(id)) => println!("Focused window {}", id),
        Outcome::Clicked(ClickOutcome::Opened(id)) => println!("Opened window {}", id),
        _ => println!("Nothing to open"),
      }
    }
    Command::Watch => {
      if let Err(e) = worker.start().await {
        warn!(error = %e, "Worker not active, watching connectivity only");
      }
      let probe_url = worker.settings().resolve(&config.sync.probe_path)?;
      let interval = Duration::from_secs(config.sync.probe_interval_secs.max(1));
      ConnectivityMonitor::new(probe_url, interval)
        .run(&*worker)
        .await?;
    }
  }

  Ok(())
}
