//! Diffing the cloud's robot list against the host's robot devices.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::device_registry::{LocalRobotRecord, RobotDescriptor};
use crate::robot::Robot;
use events::Id;

/// Changes needed to bring the device registry in line with the cloud.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Robots the cloud reports that have no device yet.
    pub to_add: Vec<Robot>,
    /// Devices whose name or secret key differ from the cloud's robot.
    pub to_update: Vec<(LocalRobotRecord, Robot)>,
    /// Devices whose serial the cloud no longer reports, and extra devices
    /// sharing a serial with an earlier one.
    pub to_remove: Vec<LocalRobotRecord>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_remove.is_empty()
    }

    /// Device descriptors for `to_add`, attached to `account_id`.
    pub fn descriptors(&self, account_id: Id) -> Vec<RobotDescriptor> {
        self.to_add
            .iter()
            .map(|robot| RobotDescriptor {
                account_id,
                name: robot.name.clone(),
                model: robot.model.clone(),
                serial: robot.serial.clone(),
                secret_key: robot.secret_key.clone(),
            })
            .collect()
    }
}

/// Match robots to devices by serial.
///
/// Pure: nothing is applied. The first occurrence wins when the cloud
/// reports a serial twice, and likewise for devices: later devices with an
/// already seen serial are removed. Output order follows the input order.
pub fn reconcile(discovered: &[Robot], known: &[LocalRobotRecord]) -> Reconciliation {
    let mut known_by_serial: HashMap<&str, &LocalRobotRecord> = HashMap::new();
    let mut duplicates: HashSet<Id> = HashSet::new();
    for record in known {
        match known_by_serial.entry(record.serial.as_str()) {
            Entry::Occupied(_) => {
                duplicates.insert(record.id);
            }
            Entry::Vacant(entry) => {
                entry.insert(record);
            }
        }
    }

    let mut seen = HashSet::new();
    let mut reconciliation = Reconciliation::default();

    for robot in discovered {
        if !seen.insert(robot.serial.as_str()) {
            continue;
        }
        match known_by_serial.get(robot.serial.as_str()) {
            None => reconciliation.to_add.push(robot.clone()),
            Some(record) if record.name != robot.name || record.secret_key != robot.secret_key => {
                reconciliation
                    .to_update
                    .push(((*record).clone(), robot.clone()))
            }
            Some(_) => {}
        }
    }

    reconciliation.to_remove = known
        .iter()
        .filter(|record| {
            !seen.contains(record.serial.as_str()) || duplicates.contains(&record.id)
        })
        .cloned()
        .collect();

    reconciliation
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn robot(serial: &str, name: &str, secret_key: &str) -> Robot {
        Robot {
            serial: serial.to_string(),
            prefix: "P".to_string(),
            name: name.to_string(),
            model: "botvacD7".to_string(),
            secret_key: secret_key.to_string(),
            purchased_at: None,
            linked_at: None,
            traits: Vec::new(),
        }
    }

    fn record(account_id: Id, serial: &str, name: &str, secret_key: &str) -> LocalRobotRecord {
        LocalRobotRecord {
            id: Uuid::new_v4(),
            account_id,
            serial: serial.to_string(),
            name: name.to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    /// What the host would hold after applying the reconciliation.
    fn apply(account_id: Id, known: &[LocalRobotRecord], plan: &Reconciliation) -> Vec<LocalRobotRecord> {
        let removed: HashSet<Id> = plan.to_remove.iter().map(|r| r.id).collect();
        let mut result: Vec<LocalRobotRecord> = known
            .iter()
            .filter(|r| !removed.contains(&r.id))
            .map(|r| {
                match plan.to_update.iter().find(|(existing, _)| existing.id == r.id) {
                    Some((_, robot)) => LocalRobotRecord {
                        name: robot.name.clone(),
                        secret_key: robot.secret_key.clone(),
                        ..r.clone()
                    },
                    None => r.clone(),
                }
            })
            .collect();
        result.extend(
            plan.to_add
                .iter()
                .map(|robot| record(account_id, &robot.serial, &robot.name, &robot.secret_key)),
        );
        result
    }

    #[test]
    fn test_new_account_adds_everything() {
        let discovered = vec![robot("SN1", "Kitchen", "k1"), robot("SN2", "Hall", "k2")];

        let plan = reconcile(&discovered, &[]);

        assert_eq!(plan.to_add, discovered);
        assert!(plan.to_update.is_empty());
        assert!(plan.to_remove.is_empty());
    }

    #[test]
    fn test_add_update_and_remove() {
        let account = Uuid::new_v4();
        let known = vec![
            record(account, "SN1", "Old name", "k1"),
            record(account, "SN2", "Hall", "k2"),
            record(account, "SN3", "Bedroom", "k3"),
            record(account, "SN4", "Office", "k4"),
        ];
        let discovered = vec![
            robot("SN1", "Kitchen", "k1"),
            robot("SN2", "Hall", "rotated"),
            robot("SN3", "Bedroom", "k3"),
            robot("SN5", "Garage", "k5"),
        ];

        let plan = reconcile(&discovered, &known);

        assert_eq!(plan.to_add, vec![robot("SN5", "Garage", "k5")]);
        assert_eq!(
            plan.to_update,
            vec![
                (known[0].clone(), robot("SN1", "Kitchen", "k1")),
                (known[1].clone(), robot("SN2", "Hall", "rotated")),
            ]
        );
        assert_eq!(plan.to_remove, vec![known[3].clone()]);
    }

    #[test]
    fn test_empty_cloud_list_removes_all() {
        let account = Uuid::new_v4();
        let known = vec![record(account, "SN1", "Kitchen", "k1")];

        let plan = reconcile(&[], &known);

        assert_eq!(plan.to_remove, known);
        assert!(plan.to_add.is_empty());
    }

    #[test]
    fn test_duplicate_serial_added_once() {
        let discovered = vec![robot("SN1", "Kitchen", "k1"), robot("SN1", "Copy", "k9")];

        let plan = reconcile(&discovered, &[]);

        assert_eq!(plan.to_add, vec![robot("SN1", "Kitchen", "k1")]);
    }

    #[test]
    fn test_duplicate_devices_are_removed() {
        let account = Uuid::new_v4();
        let known = vec![
            record(account, "SN1", "Kitchen", "k1"),
            record(account, "SN1", "Stale copy", "old"),
            record(account, "SN2", "Gone", "k2"),
            record(account, "SN2", "Gone too", "k2"),
        ];
        let discovered = vec![robot("SN1", "Kitchen", "k1")];

        let plan = reconcile(&discovered, &known);

        assert!(plan.to_add.is_empty());
        assert!(plan.to_update.is_empty());
        assert_eq!(
            plan.to_remove,
            vec![known[1].clone(), known[2].clone(), known[3].clone()]
        );

        let applied = apply(account, &known, &plan);
        assert_eq!(applied, vec![known[0].clone()]);
        assert!(reconcile(&discovered, &applied).is_empty());
    }

    #[test]
    fn test_reconciling_applied_state_is_a_noop() {
        let account = Uuid::new_v4();
        let known = vec![
            record(account, "SN1", "Old", "k1"),
            record(account, "SN2", "Gone", "k2"),
        ];
        let discovered = vec![robot("SN1", "Kitchen", "k1"), robot("SN3", "Garage", "k3")];

        let plan = reconcile(&discovered, &known);
        let applied = apply(account, &known, &plan);

        assert!(reconcile(&discovered, &applied).is_empty());
    }

    #[test]
    fn test_descriptors_carry_account_and_model() {
        let account = Uuid::new_v4();
        let plan = reconcile(&[robot("SN1", "Kitchen", "k1")], &[]);

        let descriptors = plan.descriptors(account);

        assert_eq!(
            descriptors,
            vec![RobotDescriptor {
                account_id: account,
                name: "Kitchen".to_string(),
                model: "botvacD7".to_string(),
                serial: "SN1".to_string(),
                secret_key: "k1".to_string(),
            }]
        );
    }
}
