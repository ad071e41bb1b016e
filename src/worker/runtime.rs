use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::{decide, Effect, Lifecycle, Strategy, Task, WorkerEvent, WorkerSettings};
use crate::cache::CacheStore;
use crate::http::{Request, Response};
use crate::interceptor::FetchInterceptor;
use crate::net::Network;
use crate::notify::{handle_click, ClickOutcome, Platform};
use crate::queue::{replay_pending, OperationQueue, SyncReport};

/// Result of handling one event.
#[derive(Debug)]
pub enum Outcome {
  Responded(Response),
  Synced(SyncReport),
  Clicked(ClickOutcome),
  Done,
  Ignored,
}

/// Executes effects and owns the collaborators they act on.
pub struct ServiceWorker<C, Q, N, P> {
  settings: Arc<WorkerSettings>,
  cache: Arc<C>,
  queue: Arc<Q>,
  network: Arc<N>,
  platform: Arc<P>,
  interceptor: FetchInterceptor<C, N>,
  lifecycle: Mutex<Lifecycle>,
}

impl<C, Q, N, P> ServiceWorker<C, Q, N, P>
where
  C: CacheStore,
  Q: OperationQueue,
  N: Network,
  P: Platform,
{
  pub fn new(settings: WorkerSettings, cache: C, queue: Q, network: N, platform: P) -> Self {
    let settings = Arc::new(settings);
    let cache = Arc::new(cache);
    let network = Arc::new(network);
    let interceptor = FetchInterceptor::new(settings.clone(), cache.clone(), network.clone());

    Self {
      settings,
      cache,
      queue: Arc::new(queue),
      network,
      platform: Arc::new(platform),
      interceptor,
      lifecycle: Mutex::new(Lifecycle::Parsed),
    }
  }

  pub fn settings(&self) -> &WorkerSettings {
    &self.settings
  }

  pub fn cache(&self) -> &C {
    &self.cache
  }

  pub fn queue(&self) -> &Q {
    &self.queue
  }

  pub fn network(&self) -> &N {
    &self.network
  }

  pub fn platform(&self) -> &P {
    &self.platform
  }

  pub fn lifecycle(&self) -> Result<Lifecycle> {
    Ok(*self.lifecycle.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?)
  }

  fn set_lifecycle(&self, lifecycle: Lifecycle) -> Result<()> {
    *self.lifecycle.lock().map_err(|e| eyre!("Lock poisoned: {}", e))? = lifecycle;
    debug!(?lifecycle, "Worker lifecycle changed");
    Ok(())
  }

  /// Bring the worker to `Activated`.
  ///
  /// Installation (precaching) is skipped when the current partition already
  /// exists, i.e. this version was installed by an earlier run.
  pub async fn start(&self) -> Result<()> {
    if self.cache.keys()?.contains(&self.settings.cache_name) {
      info!(cache = %self.settings.cache_name, "Worker already installed");
      self.set_lifecycle(Lifecycle::Installed)?;
    } else {
      self.dispatch(WorkerEvent::Install).await?;
    }

    self.dispatch(WorkerEvent::Activate).await?;
    Ok(())
  }

  /// Handle one event to completion.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<Outcome> {
    let effect = decide(event, &self.settings, self.lifecycle()?)?;
    self.execute(effect).await
  }

  /// Send a request through the worker as the application would.
  pub async fn fetch(&self, request: Request) -> Result<Response> {
    match self.dispatch(WorkerEvent::Fetch(request)).await? {
      Outcome::Responded(response) => Ok(response),
      other => Err(eyre!("Unexpected outcome for fetch: {:?}", other)),
    }
  }

  async fn execute(&self, effect: Effect) -> Result<Outcome> {
    match effect {
      Effect::Passthrough(request) => {
        let response = self.network.fetch(&request).await?;
        Ok(Outcome::Responded(response))
      }
      Effect::RespondWith(Strategy::NetworkFirst, request) => {
        let response = self.interceptor.network_first(&request).await?;
        Ok(Outcome::Responded(response))
      }
      Effect::RespondWith(Strategy::CacheFirst, request) => {
        let response = self.interceptor.cache_first(&request).await?;
        Ok(Outcome::Responded(response))
      }
      Effect::WaitUntil(Task::Precache) => {
        self.install().await?;
        Ok(Outcome::Done)
      }
      Effect::WaitUntil(Task::PurgeStaleCaches) => {
        self.activate()?;
        Ok(Outcome::Done)
      }
      Effect::WaitUntil(Task::ReplayPendingOperations) => {
        let report = replay_pending(&*self.queue, &*self.network).await?;
        Ok(Outcome::Synced(report))
      }
      Effect::WaitUntil(Task::ShowNotification(notification)) => {
        self.platform.show_notification(&notification)?;
        Ok(Outcome::Done)
      }
      Effect::WaitUntil(Task::FocusOrOpenWindow(notification)) => {
        let outcome = handle_click(&*self.platform, &notification)?;
        Ok(Outcome::Clicked(outcome))
      }
      Effect::Ignore => Ok(Outcome::Ignored),
    }
  }

  async fn install(&self) -> Result<()> {
    self.set_lifecycle(Lifecycle::Installing)?;

    match self.precache().await {
      Ok(count) => {
        info!(cache = %self.settings.cache_name, count, "Cached static assets");
        self.set_lifecycle(Lifecycle::Installed)
      }
      Err(e) => {
        warn!(error = %e, "Install failed");
        self.set_lifecycle(Lifecycle::Redundant)?;
        Err(e)
      }
    }
  }

  /// Fetch the whole manifest, then store it. Nothing is stored unless every
  /// asset arrived with a 2xx status.
  async fn precache(&self) -> Result<usize> {
    info!(count = self.settings.static_assets.len(), "Caching static assets");

    let fetched = try_join_all(self.settings.static_assets.iter().map(|url| async move {
      let request = Request::get(url.clone());
      let response = self.network.fetch(&request).await?;
      if !response.is_ok() {
        return Err(eyre!(
          "Failed to precache {}: status {}",
          url,
          response.status
        ));
      }
      Ok((request, response))
    }))
    .await?;

    let handle = self.cache.open(&self.settings.cache_name)?;
    let count = fetched.len();
    for (request, response) in fetched {
      self.cache.put(&handle, &request, response)?;
    }

    Ok(count)
  }

  fn activate(&self) -> Result<()> {
    if self.lifecycle()? == Lifecycle::Redundant {
      return Err(eyre!("Cannot activate a worker whose install failed"));
    }
    self.set_lifecycle(Lifecycle::Activating)?;

    for name in self.cache.keys()? {
      if name != self.settings.cache_name {
        info!(cache = %name, "Deleting old cache");
        self.cache.delete(&name)?;
      }
    }

    self.set_lifecycle(Lifecycle::Activated)?;
    info!(cache = %self.settings.cache_name, "Worker activated, claiming clients");
    Ok(())
  }
}
