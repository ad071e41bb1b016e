//! Event handling for the interception layer.
//!
//! `decide` maps each platform event to an [`Effect`] without doing any I/O.
//! [`ServiceWorker`] carries effects out against the cache, queue, network and
//! platform, and tracks the install/activate lifecycle.

mod runtime;
mod settings;

use color_eyre::Result;

use crate::http::Request;
use crate::interceptor::{classify, RequestClass};
use crate::notify::{Notification, PushPayload};

pub use runtime::{Outcome, ServiceWorker};
pub use settings::WorkerSettings;

/// Lifecycle of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  Parsed,
  Installing,
  Installed,
  Activating,
  /// Controls traffic
  Activated,
  /// Install failed; never controls traffic
  Redundant,
}

/// Events delivered by the host.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
  Install,
  Activate,
  Fetch(Request),
  Sync { tag: String },
  Push(Vec<u8>),
  NotificationClick(Notification),
}

/// Caching strategy for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  NetworkFirst,
  CacheFirst,
}

/// Background work the worker must finish before the event is done.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
  Precache,
  PurgeStaleCaches,
  ReplayPendingOperations,
  ShowNotification(Notification),
  FocusOrOpenWindow(Notification),
}

/// What the host should do with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
  /// Not intercepted; the request goes to the network untouched
  Passthrough(Request),
  RespondWith(Strategy, Request),
  WaitUntil(Task),
  Ignore,
}

/// Decide how to handle `event` given the worker's current lifecycle.
pub fn decide(event: WorkerEvent, settings: &WorkerSettings, lifecycle: Lifecycle) -> Result<Effect> {
  let effect = match event {
    WorkerEvent::Install => Effect::WaitUntil(Task::Precache),
    WorkerEvent::Activate => Effect::WaitUntil(Task::PurgeStaleCaches),
    WorkerEvent::Fetch(request) => {
      if lifecycle != Lifecycle::Activated {
        return Ok(Effect::Passthrough(request));
      }
      match classify(&request, settings) {
        RequestClass::CrossOrigin => Effect::Passthrough(request),
        RequestClass::Api => Effect::RespondWith(Strategy::NetworkFirst, request),
        RequestClass::Static => Effect::RespondWith(Strategy::CacheFirst, request),
      }
    }
    WorkerEvent::Sync { tag } if tag == settings.sync_tag => {
      Effect::WaitUntil(Task::ReplayPendingOperations)
    }
    WorkerEvent::Sync { .. } => Effect::Ignore,
    WorkerEvent::Push(data) => {
      let payload = PushPayload::parse(&data)?;
      Effect::WaitUntil(Task::ShowNotification(Notification::from_push(payload, settings)))
    }
    WorkerEvent::NotificationClick(notification) => {
      Effect::WaitUntil(Task::FocusOrOpenWindow(notification))
    }
  };

  Ok(effect)
}
