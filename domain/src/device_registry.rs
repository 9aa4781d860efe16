//! Contract with the host's device registry, where robot things live.

use async_trait::async_trait;
use dashmap::DashMap;
use events::Id;
use uuid::Uuid;

use crate::error::{DomainErrorKind, Error, InternalErrorKind};

/// A robot device the host already knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRobotRecord {
    pub id: Id,
    /// The account (parent thing) this robot belongs to.
    pub account_id: Id,
    pub serial: String,
    pub name: String,
    pub secret_key: String,
}

/// A robot device to be created by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotDescriptor {
    pub account_id: Id,
    pub name: String,
    /// Shown as the device description; the robot model.
    pub model: String,
    pub serial: String,
    pub secret_key: String,
}

#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// All robot records attached to an account. Robots are matched by
    /// serial within this set only; a record under another account with
    /// the same serial is left to that account.
    async fn robots_of(&self, account_id: Id) -> Result<Vec<LocalRobotRecord>, Error>;

    /// Create robot devices in one batch.
    async fn add_robots(&self, robots: Vec<RobotDescriptor>) -> Result<(), Error>;

    /// Remove robot devices in one batch. Unknown ids are ignored.
    async fn remove_robots(&self, ids: Vec<Id>) -> Result<(), Error>;

    async fn rename_robot(&self, id: Id, name: &str) -> Result<(), Error>;

    async fn set_robot_secret(&self, id: Id, secret_key: &str) -> Result<(), Error>;
}

/// Process-local device registry.
#[derive(Default)]
pub struct MemoryDeviceRegistry {
    records: DashMap<Id, LocalRobotRecord>,
}

impl MemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: Id) -> Option<LocalRobotRecord> {
        self.records.get(&id).map(|entry| entry.value().clone())
    }

    pub fn find_by_serial(&self, serial: &str) -> Option<LocalRobotRecord> {
        self.records
            .iter()
            .find(|entry| entry.serial == serial)
            .map(|entry| entry.value().clone())
    }

    fn unknown_device(id: Id) -> Error {
        Error::new(
            DomainErrorKind::Internal(InternalErrorKind::Storage),
            &format!("no robot device with id {id}"),
        )
    }
}

#[async_trait]
impl DeviceRegistry for MemoryDeviceRegistry {
    async fn robots_of(&self, account_id: Id) -> Result<Vec<LocalRobotRecord>, Error> {
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.account_id == account_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn add_robots(&self, robots: Vec<RobotDescriptor>) -> Result<(), Error> {
        for robot in robots {
            let id = Uuid::new_v4();
            self.records.insert(
                id,
                LocalRobotRecord {
                    id,
                    account_id: robot.account_id,
                    serial: robot.serial,
                    name: robot.name,
                    secret_key: robot.secret_key,
                },
            );
        }
        Ok(())
    }

    async fn remove_robots(&self, ids: Vec<Id>) -> Result<(), Error> {
        for id in ids {
            self.records.remove(&id);
        }
        Ok(())
    }

    async fn rename_robot(&self, id: Id, name: &str) -> Result<(), Error> {
        let mut record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| Self::unknown_device(id))?;
        record.name = name.to_string();
        Ok(())
    }

    async fn set_robot_secret(&self, id: Id, secret_key: &str) -> Result<(), Error> {
        let mut record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| Self::unknown_device(id))?;
        record.secret_key = secret_key.to_string();
        Ok(())
    }
}
