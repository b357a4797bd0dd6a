//! Environment variable capture
//!
//! Recovery needs the runtime environment as much as the files. A curated
//! list of well-known variables is captured from a caller-supplied lookup so
//! tests never depend on the real process environment. Secrets are masked by
//! the catalog before they reach disk.

use crate::error::CatalogError;
use crate::store::Catalog;

/// Variables worth preserving from most operational environments.
pub const WELL_KNOWN_ENV_VARS: &[&str] = &[
    "PATH",
    "PYTHONPATH",
    "NODE_PATH",
    "JAVA_HOME",
    "GOPATH",
    "DATABASE_URL",
    "API_KEY",
    "SECRET_KEY",
    "JWT_SECRET",
    "REDIS_URL",
    "MONGODB_URI",
    "POSTGRES_URL",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_REGION",
    "GOOGLE_APPLICATION_CREDENTIALS",
    "AZURE_TENANT_ID",
    "DOCKER_HOST",
    "KUBERNETES_SERVICE_HOST",
];

/// Priority assigned to secret variables.
const SECRET_PRIORITY: u8 = 1;
/// Priority assigned to plain variables.
const PLAIN_PRIORITY: u8 = 2;

/// Preserve every well-known variable the lookup can resolve. Returns the
/// number captured; unset variables are silently skipped.
///
/// # Errors
/// Storage errors only.
pub fn preserve_well_known(
    catalog: &Catalog,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<usize, CatalogError> {
    let mut preserved = 0;
    for name in WELL_KNOWN_ENV_VARS {
        let Some(value) = lookup(name) else {
            continue;
        };
        let priority = if catalog.is_secret_name(name) { SECRET_PRIORITY } else { PLAIN_PRIORITY };
        catalog.preserve_env_var(name, &value, priority, "captured from process environment")?;
        preserved += 1;
    }
    tracing::info!(preserved, "environment variables captured");
    Ok(preserved)
}
