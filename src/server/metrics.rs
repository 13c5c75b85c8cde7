//! Prometheus gauge exposing when the database was last checked and replaced.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `vulndb` | Gauge (Unix seconds) | `action` = `last_db_update_attempt` \| `last_db_update` |

use crate::core::{Result, ServerError};
use crate::db::MetadataStore;
use chrono::{DateTime, Utc};
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::path::Path;

pub const GAUGE_NAME: &str = "vulndb";
pub const GAUGE_HELP: &str =
    "Gauge Metrics associated with the vulnerability DB - Last DB Update, Last DB Update Attempt ...";
pub const ACTION_LABEL: &str = "action";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    /// An update cycle started, whether or not it replaced anything.
    Attempt,
    /// A new database was swapped in.
    Success,
}

impl UpdateAction {
    pub const fn label(self) -> &'static str {
        match self {
            UpdateAction::Attempt => "last_db_update_attempt",
            UpdateAction::Success => "last_db_update",
        }
    }
}

/// The two update timestamps. Clones share the underlying samples.
#[derive(Clone)]
pub struct UpdateGauge {
    gauge: GaugeVec,
}

impl UpdateGauge {
    /// Creates the gauge and registers it with `registry`.
    ///
    /// # Errors
    ///
    /// Fails if a collector with the same name is already registered.
    pub fn register(registry: &Registry) -> Result<Self> {
        let gauge = GaugeVec::new(Opts::new(GAUGE_NAME, GAUGE_HELP), &[ACTION_LABEL])?;
        registry.register(Box::new(gauge.clone()))?;
        Ok(Self { gauge })
    }

    pub fn set(&self, action: UpdateAction, unix_seconds: f64) {
        self.gauge
            .with_label_values(&[action.label()])
            .set(unix_seconds);
    }

    pub fn get(&self, action: UpdateAction) -> f64 {
        self.gauge.with_label_values(&[action.label()]).get()
    }
}

/// Records `at` for `action`. A missing gauge is a configuration error and is
/// reported rather than skipped.
pub fn record_update(
    gauge: Option<&UpdateGauge>,
    action: UpdateAction,
    at: DateTime<Utc>,
) -> Result<()> {
    let gauge = gauge.ok_or(ServerError::GaugeUninitialized)?;
    gauge.set(action, at.timestamp() as f64);
    Ok(())
}

/// Seeds both samples from the persisted metadata so they survive restarts.
pub async fn seed_from_metadata(gauge: Option<&UpdateGauge>, cache_dir: &Path) -> Result<()> {
    let metadata = MetadataStore::new(cache_dir)
        .get()
        .await
        .map_err(ServerError::Seed)?;
    record_update(gauge, UpdateAction::Attempt, metadata.updated_at)?;
    record_update(gauge, UpdateAction::Success, metadata.updated_at)?;
    Ok(())
}

/// Renders every metric in `registry` in the Prometheus text format.
pub fn encode_text(registry: &Registry) -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(|err| ServerError::MetricsEncoding(err.to_string()))?;
    String::from_utf8(buffer).map_err(|err| ServerError::MetricsEncoding(err.to_string()))
}
