//! Running several providers in one invocation

use log::{error, info, warn};

use super::{ProviderRegistry, SyncContext};
use crate::error::{ErrorKind, SyncError, kind_of};

/// What happened to one provider
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderStatus {
    Synced,
    /// Not enabled in configuration
    Skipped,
    Failed {
        kind: Option<ErrorKind>,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutcome {
    pub provider: String,
    pub status: ProviderStatus,
}

/// Per-provider results of [`sync_providers`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub outcomes: Vec<ProviderOutcome>,
}

impl SyncReport {
    pub fn failures(&self) -> impl Iterator<Item = &ProviderOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, ProviderStatus::Failed { .. }))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn status(&self, provider: &str) -> Option<&ProviderStatus> {
        self.outcomes
            .iter()
            .find(|o| o.provider == provider)
            .map(|o| &o.status)
    }

    fn push(&mut self, provider: &str, status: ProviderStatus) {
        self.outcomes.push(ProviderOutcome {
            provider: provider.to_string(),
            status,
        });
    }
}

/// Sync each requested provider in order.
///
/// Disabled providers are skipped. A failing provider is recorded and the
/// remaining ones still run.
pub fn sync_providers(
    registry: &ProviderRegistry,
    ctx: &SyncContext<'_>,
    ids: &[&str],
) -> SyncReport {
    let mut report = SyncReport::default();

    for &id in ids {
        let Some(provider) = registry.get(id) else {
            let err = SyncError::config(
                format!("Unknown provider {}", id),
                Some(format!("Known providers: {}", registry.ids().join(", "))),
            );
            warn!("[SYNC] {}", err);
            report.push(
                id,
                ProviderStatus::Failed {
                    kind: Some(err.kind()),
                    message: err.to_string(),
                },
            );
            continue;
        };

        if !ctx.config.is_enabled(id) {
            info!("[SYNC] Skipping {} (disabled)", id);
            report.push(id, ProviderStatus::Skipped);
            continue;
        }

        info!("[SYNC] Syncing {}", id);
        match provider.sync(ctx) {
            Ok(()) => report.push(id, ProviderStatus::Synced),
            Err(err) => {
                let kind = kind_of(&err);
                let label = kind.map_or_else(|| "unclassified".to_string(), |k| k.to_string());
                error!("[SYNC] {} failed ({}): {:#}", id, label, err);
                report.push(
                    id,
                    ProviderStatus::Failed {
                        kind,
                        message: format!("{:#}", err),
                    },
                );
            }
        }
    }

    report
}
