//! Notification subscription bookkeeping
//! Remembers which characteristics the caller wants pushed, independent of the
//! transport session, so the wish survives reconnects and rediscovery.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};
use uuid::Uuid;

use crate::core::bluetooth::types::{GattCharacteristic, ServiceTable};

/// Outcome of one replay pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Pairs re-enabled on the new session
    pub restored: Vec<(Uuid, Uuid)>,
    /// Pairs absent from the new service table
    pub missing: Vec<(Uuid, Uuid)>,
    /// Pairs present but the re-enable could not be initiated
    pub failed: Vec<(Uuid, Uuid)>,
}

/// Desired subscriptions, keyed by service then characteristic
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    entries: BTreeMap<Uuid, BTreeSet<Uuid>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pair. Recording the same pair twice is a no-op.
    pub fn record(&mut self, service: Uuid, characteristic: Uuid) {
        if self.entries.entry(service).or_default().insert(characteristic) {
            debug!("Recorded subscription {} / {}", service, characteristic);
        }
    }

    pub fn contains(&self, service: Uuid, characteristic: Uuid) -> bool {
        self.entries
            .get(&service)
            .is_some_and(|chars| chars.contains(&characteristic))
    }

    /// All recorded pairs in a stable order
    pub fn entries(&self) -> Vec<(Uuid, Uuid)> {
        self.entries
            .iter()
            .flat_map(|(service, chars)| chars.iter().map(move |c| (*service, *c)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Re-enables every recorded pair found in `services` through `enable`.
    /// Each entry is independent: a missing or failing one is logged and skipped.
    pub fn replay<F>(&self, services: &ServiceTable, mut enable: F) -> ReplayReport
    where
        F: FnMut(Uuid, &GattCharacteristic) -> bool,
    {
        let mut report = ReplayReport::default();
        if self.is_empty() {
            debug!("No notifications to restore");
            return report;
        }

        info!("Restoring {} enabled notification(s)...", self.len());
        for (service, characteristic) in self.entries() {
            let Some(found) = services.characteristic(service, characteristic) else {
                warn!(
                    "Characteristic {} / {} not found for notification restoration",
                    service, characteristic
                );
                report.missing.push((service, characteristic));
                continue;
            };

            if enable(service, found) {
                debug!("Restored notification for {}", characteristic);
                report.restored.push((service, characteristic));
            } else {
                warn!("Failed to restore notification for {}", characteristic);
                report.failed.push((service, characteristic));
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::*;
    use crate::core::bluetooth::types::{CharacteristicProperties, GattService};

    fn table_with(pairs: &[(Uuid, Uuid)]) -> ServiceTable {
        let services = pairs
            .iter()
            .map(|(service, characteristic)| {
                GattService::new(
                    *service,
                    vec![GattCharacteristic::new(
                        *characteristic,
                        CharacteristicProperties::notify(),
                        vec![UUID_CLIENT_CHARACTERISTIC_CONFIG],
                    )],
                )
            })
            .collect();
        ServiceTable::new(services)
    }

    #[test]
    fn record_is_idempotent() {
        let mut registry = SubscriptionRegistry::new();
        registry.record(UUID_HEART_RATE_SERVICE, UUID_HEART_RATE_MEASUREMENT);
        registry.record(UUID_HEART_RATE_SERVICE, UUID_HEART_RATE_MEASUREMENT);
        registry.record(UUID_GLUCOSE_SERVICE, UUID_GLUCOSE_MEASUREMENT);

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(UUID_HEART_RATE_SERVICE, UUID_HEART_RATE_MEASUREMENT));
        assert!(!registry.contains(UUID_HEART_RATE_SERVICE, UUID_GLUCOSE_MEASUREMENT));

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn replay_skips_missing_entries_and_continues() {
        let mut registry = SubscriptionRegistry::new();
        registry.record(UUID_HEART_RATE_SERVICE, UUID_HEART_RATE_MEASUREMENT);
        registry.record(UUID_GLUCOSE_SERVICE, UUID_GLUCOSE_MEASUREMENT);
        registry.record(UUID_PULSE_OXIMETER_SERVICE, UUID_PLX_CONTINUOUS_MEASUREMENT);

        let table = table_with(&[
            (UUID_HEART_RATE_SERVICE, UUID_HEART_RATE_MEASUREMENT),
            (UUID_PULSE_OXIMETER_SERVICE, UUID_PLX_CONTINUOUS_MEASUREMENT),
        ]);

        let mut enabled = Vec::new();
        let report = registry.replay(&table, |service, characteristic| {
            enabled.push((service, characteristic.uuid));
            true
        });

        assert_eq!(report.missing, vec![(UUID_GLUCOSE_SERVICE, UUID_GLUCOSE_MEASUREMENT)]);
        assert_eq!(report.restored.len(), 2);
        assert!(report.failed.is_empty());
        assert_eq!(enabled, report.restored);
        // entries are never dropped by a replay
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn replay_reports_failed_enables() {
        let mut registry = SubscriptionRegistry::new();
        registry.record(UUID_HEART_RATE_SERVICE, UUID_HEART_RATE_MEASUREMENT);
        registry.record(UUID_GLUCOSE_SERVICE, UUID_GLUCOSE_MEASUREMENT);
        let table = table_with(&[
            (UUID_HEART_RATE_SERVICE, UUID_HEART_RATE_MEASUREMENT),
            (UUID_GLUCOSE_SERVICE, UUID_GLUCOSE_MEASUREMENT),
        ]);

        let report = registry.replay(&table, |service, _| service != UUID_GLUCOSE_SERVICE);
        assert_eq!(report.restored, vec![(UUID_HEART_RATE_SERVICE, UUID_HEART_RATE_MEASUREMENT)]);
        assert_eq!(report.failed, vec![(UUID_GLUCOSE_SERVICE, UUID_GLUCOSE_MEASUREMENT)]);
    }
}
