use serde::Serialize;

use master_domain::SlaveId;

use crate::registry::Registry;
use crate::role::DispatchRole;
use crate::slave::SlaveConnection;

/// 注册表的只读快照，用于日志与状态查询
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrySnapshot {
    pub uid_counter: u64,
    pub completed_total: u64,
    pub orphaned: usize,
    pub slaves: Vec<SlaveSnapshot>,
    pub roles: Vec<RoleSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlaveSnapshot {
    pub id: SlaveId,
    pub name: String,
    pub performance: f64,
    pub in_flight: usize,
    pub completed: usize,
    pub excluded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleSnapshot {
    pub name: String,
    pub resource: f64,
    pub enforced: bool,
    pub in_flight: usize,
    pub completed: usize,
}

impl From<&SlaveConnection> for SlaveSnapshot {
    fn from(slave: &SlaveConnection) -> Self {
        Self {
            id: slave.id(),
            name: slave.name().to_string(),
            performance: slave.performance(),
            in_flight: slave.in_flight_count(),
            completed: slave.completed_count(),
            excluded: slave.is_excluded(),
        }
    }
}

impl From<&DispatchRole> for RoleSnapshot {
    fn from(role: &DispatchRole) -> Self {
        Self {
            name: role.name().to_string(),
            resource: role.resource(),
            enforced: role.is_enforced(),
            in_flight: role.in_flight_count(),
            completed: role.completed_count(),
        }
    }
}

impl Registry {
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            uid_counter: self.uid_counter(),
            completed_total: self.completed_total(),
            orphaned: self.orphaned_count(),
            slaves: self.slaves().map(SlaveSnapshot::from).collect(),
            roles: self.roles().map(RoleSnapshot::from).collect(),
        }
    }
}

impl RegistrySnapshot {
    pub fn slave(&self, id: SlaveId) -> Option<&SlaveSnapshot> {
        self.slaves.iter().find(|slave| slave.id == id)
    }

    pub fn role(&self, name: &str) -> Option<&RoleSnapshot> {
        self.roles.iter().find(|role| role.name == name)
    }

    pub fn in_flight_total(&self) -> usize {
        self.slaves.iter().map(|slave| slave.in_flight).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryOptions;

    #[test]
    fn test_empty_registry_snapshot() {
        let mut registry = Registry::new(RegistryOptions::default());
        registry.add_role(DispatchRole::new("video")).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.uid_counter, 0);
        assert!(snapshot.slaves.is_empty());
        assert_eq!(snapshot.role("video").map(|r| r.resource), Some(1.0));

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["roles"][0]["name"], "video");
        assert_eq!(json["orphaned"], 0);
    }
}
