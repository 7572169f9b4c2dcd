//! Data access facade: one call per resource that combines the cache, the
//! refresh governor and the upstream data source.
//!
//! Every getter follows the same path:
//!
//! 1. load whatever is cached for the key, however old
//! 2. ask the governor whether a fetch is worth it
//! 3. if so, fetch (bounded by a timeout) and store the result
//! 4. serve the fresh payload, else the cached one, else nothing
//!
//! Network and payload errors never leave this module; callers get shaped data
//! or `None`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, DataSource, Endpoint, ErgastClient};
use crate::background::{send_event, RefreshEvent};
use crate::cache::{CacheStore, RefreshGovernor, StorageError};
use crate::config::{CacheSettings, Config, ResourceSettings};
use crate::models::{first_race_date, ConstructorStanding, DriverStanding, LastRace, NextRace};
use crate::utils::age_display;

pub const NEXT_RACE_KEY: &str = "next_race";
pub const LAST_RACE_KEY: &str = "last_race";
pub const DRIVER_STANDINGS_KEY: &str = "driver_standings";
const CONSTRUCTOR_STANDINGS_PREFIX: &str = "constructor_standings_";

/// Season alias understood by the API
pub const CURRENT_SEASON: &str = "current";

/// A logical resource: one cache key, one endpoint, one refresh policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    NextRace,
    LastRace,
    DriverStandings,
    ConstructorStandings { season: String },
}

impl Resource {
    pub fn constructor_standings(season: impl Into<String>) -> Self {
        Resource::ConstructorStandings {
            season: season.into(),
        }
    }

    pub fn cache_key(&self) -> String {
        match self {
            Resource::NextRace => NEXT_RACE_KEY.to_string(),
            Resource::LastRace => LAST_RACE_KEY.to_string(),
            Resource::DriverStandings => DRIVER_STANDINGS_KEY.to_string(),
            Resource::ConstructorStandings { season } => {
                format!("{}{}", CONSTRUCTOR_STANDINGS_PREFIX, season)
            }
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            NEXT_RACE_KEY => Some(Resource::NextRace),
            LAST_RACE_KEY => Some(Resource::LastRace),
            DRIVER_STANDINGS_KEY => Some(Resource::DriverStandings),
            _ => key
                .strip_prefix(CONSTRUCTOR_STANDINGS_PREFIX)
                .filter(|season| !season.is_empty())
                .map(Resource::constructor_standings),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        match self {
            Resource::NextRace => Endpoint::NextRace,
            Resource::LastRace => Endpoint::LastRaceResults,
            Resource::DriverStandings => Endpoint::DriverStandings,
            Resource::ConstructorStandings { season } => Endpoint::ConstructorStandings {
                season: season.clone(),
            },
        }
    }

    pub fn settings<'a>(&self, table: &'a ResourceSettings) -> &'a CacheSettings {
        match self {
            Resource::NextRace => &table.next_race,
            Resource::LastRace => &table.last_race,
            Resource::DriverStandings => &table.driver_standings,
            Resource::ConstructorStandings { .. } => &table.constructor_standings,
        }
    }

    /// Resources covered by a bulk refresh, in refresh order.
    pub fn refresh_set() -> Vec<Resource> {
        vec![
            Resource::NextRace,
            Resource::LastRace,
            Resource::DriverStandings,
            Resource::constructor_standings(CURRENT_SEASON),
        ]
    }

    /// Check a payload can be shaped for display before it replaces the cache.
    pub fn validate(&self, payload: &Value) -> anyhow::Result<()> {
        match self {
            Resource::NextRace => NextRace::from_payload(payload).map(|_| ()),
            Resource::LastRace => LastRace::from_payload(payload).map(|_| ()),
            Resource::DriverStandings => DriverStanding::list_from_payload(payload).map(|_| ()),
            Resource::ConstructorStandings { .. } => {
                ConstructorStanding::list_from_payload(payload).map(|_| ())
            }
        }
    }
}

/// Where a served payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Origin {
    Fresh,
    Cached,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub data: T,
    pub origin: Origin,
}

/// Prefer a freshly fetched payload, else fall back to the cached one.
pub fn resolve<T>(fresh: Option<T>, stale: Option<T>) -> Option<Snapshot<T>> {
    match (fresh, stale) {
        (Some(data), _) => Some(Snapshot {
            data,
            origin: Origin::Fresh,
        }),
        (None, Some(data)) => Some(Snapshot {
            data,
            origin: Origin::Cached,
        }),
        (None, None) => None,
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Fetched but could not cache: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshOutcome {
    pub key: String,
    /// `None` on success
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub outcomes: Vec<RefreshOutcome>,
}

impl RefreshReport {
    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.error.is_none())
            .map(|o| o.key.as_str())
            .collect()
    }

    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.error.is_some())
            .map(|o| o.key.as_str())
            .collect()
    }
}

/// Diagnostic view of one cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub key: String,
    pub has_cache: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub fetch_count: u64,
    pub calls_in_window: u64,
    pub max_fetches_per_day: Option<u32>,
    /// Cached, but older than the configured max age
    pub beyond_max_age: bool,
}

impl CacheStatus {
    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        self.last_update
            .map(|t| age_display(t, now))
            .unwrap_or_else(|| "never".to_string())
    }
}

async fn notify(progress: Option<&mpsc::Sender<RefreshEvent>>, event: RefreshEvent) {
    if let Some(tx) = progress {
        send_event(tx, event).await;
    }
}

pub struct F1Service<S> {
    source: S,
    store: Arc<CacheStore>,
    governor: RefreshGovernor,
    settings: ResourceSettings,
    fetch_timeout: Duration,
    /// One async lock per key so at most one fetch per key is in flight.
    in_flight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl F1Service<ErgastClient> {
    /// Build the live service: HTTP source, on-disk cache, configured policies.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = CacheStore::new(config.cache_dir()?)?;
        let client = ErgastClient::new(&config.api)?;
        let fetch_timeout = ErgastClient::fetch_budget(&config.api);
        Ok(Self::new(client, Arc::new(store), config.cache.clone(), fetch_timeout))
    }
}

impl<S: DataSource> F1Service<S> {
    pub fn new(
        source: S,
        store: Arc<CacheStore>,
        settings: ResourceSettings,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            governor: RefreshGovernor::new(Arc::clone(&store)),
            store,
            settings,
            fetch_timeout,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    fn key_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Date of the next race as currently cached, used for schedule-aware refresh.
    fn cached_event_date(&self) -> Option<String> {
        self.store
            .load(NEXT_RACE_KEY)
            .as_ref()
            .and_then(first_race_date)
            .map(str::to_string)
    }

    fn should_fetch(&self, resource: &Resource, force_refresh: bool) -> bool {
        let key = resource.cache_key();
        let settings = resource.settings(&self.settings);

        if settings.schedule_aware && !force_refresh {
            let event_date = self.cached_event_date();
            self.governor.should_refresh_on_schedule(
                &key,
                event_date.as_deref(),
                settings.refresh_interval(),
                settings.max_fetches_per_day,
            )
        } else {
            self.governor.should_refresh(
                &key,
                settings.refresh_interval(),
                settings.max_fetches_per_day,
                force_refresh,
            )
        }
    }

    /// Fetch and validate a payload. Timeouts surface as `ApiError::Timeout`.
    async fn fetch_fresh(&self, resource: &Resource) -> Result<Value, ApiError> {
        let endpoint = resource.endpoint();
        debug!(endpoint = %endpoint, "Fetching from API");

        let payload = tokio::time::timeout(self.fetch_timeout, self.source.fetch(&endpoint))
            .await
            .map_err(|_| ApiError::Timeout(self.fetch_timeout))??;

        resource
            .validate(&payload)
            .map_err(|e| ApiError::InvalidResponse(format!("{:#}", e)))?;
        Ok(payload)
    }

    /// Best available raw payload for `resource`, or `None` when there is
    /// neither cached data nor a successful fetch.
    pub async fn get(&self, resource: &Resource, force_refresh: bool) -> Option<Snapshot<Value>> {
        let key = resource.cache_key();
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        let cached = self.store.load(&key);

        let fresh = if self.should_fetch(resource, force_refresh) {
            match self.fetch_fresh(resource).await {
                Ok(payload) => {
                    if let Err(e) = self.store.save(&key, &payload) {
                        error!(key = %key, error = %e, "Failed to cache fetched data, serving it uncached");
                    }
                    Some(payload)
                }
                Err(e) if e.is_network() => {
                    warn!(key = %key, error = %e, has_cache = cached.is_some(), "Source unreachable, falling back to cache");
                    None
                }
                Err(e) => {
                    error!(key = %key, error = %e, has_cache = cached.is_some(), "Source returned unusable data, falling back to cache");
                    None
                }
            }
        } else {
            None
        };

        let snapshot = resolve(fresh, cached);
        if snapshot.is_none() {
            warn!(key = %key, "No data available");
        }
        snapshot
    }

    async fn get_shaped<T, F>(&self, resource: &Resource, force_refresh: bool, shape: F) -> Option<T>
    where
        F: FnOnce(&Value) -> anyhow::Result<T>,
    {
        let snapshot = self.get(resource, force_refresh).await?;
        match shape(&snapshot.data) {
            Ok(data) => Some(data),
            Err(e) => {
                error!(
                    key = %resource.cache_key(),
                    origin = ?snapshot.origin,
                    error = %format!("{:#}", e),
                    "Payload has unexpected shape"
                );
                None
            }
        }
    }

    pub async fn next_race(&self, force_refresh: bool) -> Option<NextRace> {
        self.get_shaped(&Resource::NextRace, force_refresh, NextRace::from_payload)
            .await
    }

    pub async fn last_race(&self, force_refresh: bool) -> Option<LastRace> {
        self.get_shaped(&Resource::LastRace, force_refresh, LastRace::from_payload)
            .await
    }

    pub async fn driver_standings(&self, force_refresh: bool) -> Option<Vec<DriverStanding>> {
        self.get_shaped(
            &Resource::DriverStandings,
            force_refresh,
            DriverStanding::list_from_payload,
        )
        .await
    }

    pub async fn constructor_standings(
        &self,
        season: &str,
        force_refresh: bool,
    ) -> Option<Vec<ConstructorStanding>> {
        self.get_shaped(
            &Resource::constructor_standings(season),
            force_refresh,
            ConstructorStanding::list_from_payload,
        )
        .await
    }

    /// Fetch and store `resource` unconditionally, reporting what went wrong.
    pub async fn force_refresh(&self, resource: &Resource) -> Result<(), RefreshError> {
        let key = resource.cache_key();
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        let payload = self.fetch_fresh(resource).await?;
        self.store.save(&key, &payload)?;
        Ok(())
    }

    /// Force-refresh every resource in turn. One failure never stops the rest.
    pub async fn refresh_all(&self) -> RefreshReport {
        self.refresh_all_with_progress(None).await
    }

    /// `refresh_all`, also sending a [`RefreshEvent`] as each resource finishes.
    pub async fn refresh_all_with_progress(
        &self,
        progress: Option<&mpsc::Sender<RefreshEvent>>,
    ) -> RefreshReport {
        let resources = Resource::refresh_set();
        info!(total = resources.len(), "Refreshing all resources");
        notify(progress, RefreshEvent::Started { total: resources.len() }).await;

        let mut report = RefreshReport::default();
        for resource in resources {
            let key = resource.cache_key();
            let error = match self.force_refresh(&resource).await {
                Ok(()) => {
                    debug!(key = %key, "Refreshed");
                    notify(progress, RefreshEvent::Updated { key: key.clone() }).await;
                    None
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Refresh failed");
                    let reason = e.to_string();
                    notify(
                        progress,
                        RefreshEvent::Failed {
                            key: key.clone(),
                            reason: reason.clone(),
                        },
                    )
                    .await;
                    Some(reason)
                }
            };
            report.outcomes.push(RefreshOutcome { key, error });
        }

        let succeeded = report.succeeded().len();
        let failed = report.failed().len();
        info!(succeeded, failed, "Refresh complete");
        notify(progress, RefreshEvent::Completed { succeeded, failed }).await;
        report
    }

    pub fn status(&self) -> Vec<CacheStatus> {
        let now = Utc::now();
        let mut keys: Vec<String> = Resource::refresh_set()
            .iter()
            .map(Resource::cache_key)
            .collect();
        keys.extend(self.store.keys());
        keys.sort();
        keys.dedup();

        keys.into_iter()
            .map(|key| {
                let meta = self.store.metadata(&key);
                let has_cache = self.store.has_payload(&key);
                let settings = Resource::from_key(&key).map(|r| *r.settings(&self.settings));
                let beyond_max_age = match (has_cache, settings) {
                    (true, Some(settings)) => match meta.last_update {
                        Some(t) => (now - t)
                            .to_std()
                            .map(|age| age > settings.max_age())
                            .unwrap_or(false),
                        // A payload nobody recorded fetching has unknown age
                        None => true,
                    },
                    _ => false,
                };
                CacheStatus {
                    has_cache,
                    last_update: meta.last_update,
                    fetch_count: meta.fetch_count,
                    calls_in_window: meta.calls_in_window(now),
                    max_fetches_per_day: settings.and_then(|s| s.max_fetches_per_day),
                    beyond_max_age,
                    key,
                }
            })
            .collect()
    }

    /// Drop the cached payload for `key`, or every payload when `key` is `None`.
    pub fn clear(&self, key: Option<&str>) -> Result<usize, StorageError> {
        self.store.clear(key)
    }
}
