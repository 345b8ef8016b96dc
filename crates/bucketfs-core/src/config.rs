//! Configuration module
//!
//! Driver options are supplied once at construction. Anything taken from the process
//! environment (credential fallbacks, `.env` files) is read here and nowhere else, so the
//! drivers themselves only ever see an already-resolved, immutable configuration.

use std::env;
use std::fmt;

use serde::Deserialize;

use crate::storage_types::StorageBackend;

/// Region used when none is configured
pub const DEFAULT_REGION: &str = "cn-shanghai";
/// S3-compatible endpoint used when none is configured
pub const DEFAULT_ENDPOINT: &str = "https://tos-s3-cn-shanghai.ivolces.com";
/// Environment variable consulted when no access key is configured
pub const ACCESS_KEY_ENV: &str = "TOS_ACCESS_KEY";
/// Environment variable consulted when no secret key is configured
pub const SECRET_KEY_ENV: &str = "TOS_SECRET_KEY";

const DEFAULT_LOCAL_PATH: &str = "./storage";

/// Options recognized by the object-store driver.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DriverConfig {
    /// Prefix under which every key is resolved.
    #[serde(default)]
    pub root: Option<String>,
    pub bucket: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

/// Driver configuration after defaults and environment fallbacks have been applied.
///
/// Built once by [`DriverConfig::resolve`] and never mutated afterwards.
#[derive(Clone)]
pub struct ResolvedDriverConfig {
    /// Root prefix exactly as configured; drivers normalize it when they are built.
    pub root: String,
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl fmt::Debug for ResolvedDriverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedDriverConfig")
            .field("root", &self.root)
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl DriverConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_credentials(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self.secret = Some(secret.into());
        self
    }

    /// Resolve against the process environment.
    pub fn resolve(&self) -> Result<ResolvedDriverConfig, anyhow::Error> {
        self.resolve_with(|name| env::var(name).ok())
    }

    /// Resolve using `lookup` for environment fallbacks.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<ResolvedDriverConfig, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.bucket.trim().is_empty() {
            return Err(anyhow::anyhow!("bucket is required"));
        }

        let access_key_id = non_empty(self.key.clone()).or_else(|| non_empty(lookup(ACCESS_KEY_ENV)));
        let secret_access_key =
            non_empty(self.secret.clone()).or_else(|| non_empty(lookup(SECRET_KEY_ENV)));

        Ok(ResolvedDriverConfig {
            root: self.root.clone().unwrap_or_default(),
            bucket: self.bucket.clone(),
            endpoint: non_empty(self.endpoint.clone())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            region: non_empty(self.region.clone()).unwrap_or_else(|| DEFAULT_REGION.to_string()),
            access_key_id,
            secret_access_key,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Backend selection plus the options for every backend.
#[derive(Clone, Debug)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub driver: DriverConfig,
    /// Base directory for the local backend.
    pub local_path: String,
}

impl StorageSettings {
    pub fn tos(driver: DriverConfig) -> Self {
        Self {
            backend: StorageBackend::Tos,
            driver,
            local_path: DEFAULT_LOCAL_PATH.to_string(),
        }
    }

    pub fn local(local_path: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Local,
            driver: DriverConfig::default(),
            local_path: local_path.into(),
        }
    }

    /// Load settings from `STORAGE_*` environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("STORAGE_BACKEND") {
            Some(value) => value.parse::<StorageBackend>()?,
            None => StorageBackend::Tos,
        };

        let bucket = lookup("STORAGE_BUCKET").unwrap_or_default();
        if backend == StorageBackend::Tos && bucket.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "STORAGE_BUCKET is required for the {} backend",
                backend
            ));
        }

        let driver = DriverConfig {
            root: lookup("STORAGE_ROOT"),
            bucket,
            endpoint: lookup("STORAGE_ENDPOINT"),
            region: lookup("STORAGE_REGION"),
            key: lookup("STORAGE_KEY"),
            secret: lookup("STORAGE_SECRET"),
        };

        Ok(Self {
            backend,
            driver,
            local_path: lookup("STORAGE_LOCAL_PATH")
                .unwrap_or_else(|| DEFAULT_LOCAL_PATH.to_string()),
        })
    }
}
