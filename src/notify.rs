//! Push messages, notifications and window focus.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::info;

use crate::worker::WorkerSettings;

/// JSON body of a push message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
  pub title: String,
  #[serde(default)]
  pub body: String,
  #[serde(default)]
  pub url: Option<String>,
}

impl PushPayload {
  pub fn parse(data: &[u8]) -> Result<Self> {
    serde_json::from_slice(data).map_err(|e| eyre!("Invalid push payload: {}", e))
  }
}

/// A notification ready to be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  /// Page to bring up when the notification is clicked
  pub url: Option<String>,
}

impl Notification {
  pub fn from_push(payload: PushPayload, settings: &WorkerSettings) -> Self {
    Self {
      title: payload.title,
      body: payload.body,
      icon: settings.notification_icon.clone(),
      badge: settings.notification_badge.clone(),
      url: payload.url,
    }
  }
}

/// A browser window controlled by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
  pub id: u64,
  pub url: String,
}

/// Host facilities for notifications and windows.
pub trait Platform: Send + Sync {
  fn show_notification(&self, notification: &Notification) -> Result<()>;
  fn close_notification(&self, notification: &Notification) -> Result<()>;
  fn windows(&self) -> Result<Vec<WindowClient>>;
  fn focus(&self, id: u64) -> Result<()>;
  fn open_window(&self, url: &str) -> Result<WindowClient>;
}

/// What a notification click led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  Focused(u64),
  Opened(u64),
  /// The notification carried no URL
  Nothing,
}

/// Close the notification, then focus a window already showing its URL or open one.
pub fn handle_click<P: Platform + ?Sized>(
  platform: &P,
  notification: &Notification,
) -> Result<ClickOutcome> {
  platform.close_notification(notification)?;

  let Some(url) = notification.url.as_deref() else {
    return Ok(ClickOutcome::Nothing);
  };

  if let Some(window) = platform.windows()?.into_iter().find(|w| w.url == url) {
    platform.focus(window.id)?;
    return Ok(ClickOutcome::Focused(window.id));
  }

  let window = platform.open_window(url)?;
  Ok(ClickOutcome::Opened(window.id))
}

/// Platform without a display: notifications are logged, windows are tracked in memory.
#[derive(Default)]
pub struct HeadlessPlatform {
  shown: Mutex<Vec<Notification>>,
  windows: Mutex<Vec<WindowClient>>,
  focused: Mutex<Option<u64>>,
  next_id: AtomicU64,
}

impl HeadlessPlatform {
  pub fn new() -> Self {
    Self::default()
  }

  /// Notifications currently on screen.
  pub fn shown(&self) -> Result<Vec<Notification>> {
    Ok(self.shown.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?.clone())
  }

  #[allow(dead_code)]
  pub fn focused(&self) -> Result<Option<u64>> {
    Ok(*self.focused.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?)
  }
}

impl Platform for HeadlessPlatform {
  fn show_notification(&self, notification: &Notification) -> Result<()> {
    info!(
      title = %notification.title,
      body = %notification.body,
      icon = %notification.icon,
      badge = %notification.badge,
      "Notification"
    );
    self
      .shown
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .push(notification.clone());
    Ok(())
  }

  fn close_notification(&self, notification: &Notification) -> Result<()> {
    self
      .shown
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .retain(|n| n != notification);
    Ok(())
  }

  fn windows(&self) -> Result<Vec<WindowClient>> {
    Ok(self.windows.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?.clone())
  }

  fn focus(&self, id: u64) -> Result<()> {
    info!(window = id, "Focusing window");
    *self.focused.lock().map_err(|e| eyre!("Lock poisoned: {}", e))? = Some(id);
    Ok(())
  }

  fn open_window(&self, url: &str) -> Result<WindowClient> {
    let window = WindowClient {
      id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
      url: url.to_string(),
    };
    info!(window = window.id, url, "Opening window");
    self
      .windows
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .push(window.clone());
    *self.focused.lock().map_err(|e| eyre!("Lock poisoned: {}", e))? = Some(window.id);
    Ok(window)
  }
}
