//! Availability zones with their emulated host and per-volume-type storages.

use serde::{Deserialize, Serialize};
use stratus_core::resource::{
    CloudResource, HOST_STATUS_RUNNING, STORAGE_STATUS_OFFLINE, STORAGE_STATUS_ONLINE, ZONE_STATUS_ENABLE,
    ZONE_STATUS_SOLDOUT,
};
use stratus_core::{CloudError, CloudResult};

use crate::config::CLOUD_PROVIDER_AWS;
use crate::ec2::AvailabilityZone;

/// EBS volume types offered as storages in every zone.
pub const STORAGE_TYPES: [&str; 7] = ["gp2", "gp3", "io1", "io2", "st1", "sc1", "standard"];

/// (volume type, region) pairs reported offline instead of online.
///
/// Zones are not queried for the volume types they sell, so this table is the
/// only source of per-region availability. Add a pair when a region does not
/// offer a type from [`STORAGE_TYPES`].
const OFFLINE_STORAGES: &[(&str, &str)] = &[("io2", "cn-north-1"), ("io2", "cn-northwest-1")];

fn storage_status(storage_type: &str, region_id: &str) -> &'static str {
    if OFFLINE_STORAGES
        .iter()
        .any(|(t, r)| *t == storage_type && *r == region_id)
    {
        STORAGE_STATUS_OFFLINE
    } else {
        STORAGE_STATUS_ONLINE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    provider_id: String,
    region_id: String,
    zone_id: String,
    state: String,
}

impl Zone {
    pub fn new(provider_id: &str, region_id: &str, zone: &AvailabilityZone) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            region_id: region_id.to_string(),
            zone_id: zone.zone_name.clone(),
            state: zone.zone_state.clone(),
        }
    }

    pub fn region_id(&self) -> &str {
        &self.region_id
    }

    /// The zone's single emulated host.
    pub fn host(&self) -> Host {
        Host {
            id: format!("{}-{}", self.provider_id, self.zone_id),
            zone_id: self.zone_id.clone(),
            region_id: self.region_id.clone(),
        }
    }

    pub fn storages(&self) -> Vec<Storage> {
        STORAGE_TYPES
            .iter()
            .map(|t| Storage {
                id: format!("{}-{}-{}", self.provider_id, self.zone_id, t),
                storage_type: t.to_string(),
                zone_id: self.zone_id.clone(),
                status: storage_status(t, &self.region_id).to_string(),
            })
            .collect()
    }

    pub fn host_by_id(&self, id: &str) -> CloudResult<Host> {
        let host = self.host();
        if host.global_id() == id {
            Ok(host)
        } else {
            Err(CloudError::NotFound(format!("host {} in zone {}", id, self.zone_id)))
        }
    }

    pub fn storage_by_id(&self, id: &str) -> CloudResult<Storage> {
        self.storages()
            .into_iter()
            .find(|s| s.global_id() == id)
            .ok_or_else(|| CloudError::NotFound(format!("storage {} in zone {}", id, self.zone_id)))
    }
}

impl CloudResource for Zone {
    fn id(&self) -> String {
        self.zone_id.clone()
    }

    fn global_id(&self) -> String {
        format!("{}/{}/{}", CLOUD_PROVIDER_AWS, self.region_id, self.zone_id)
    }

    fn status(&self) -> String {
        match self.state.as_str() {
            "available" => ZONE_STATUS_ENABLE,
            _ => ZONE_STATUS_SOLDOUT,
        }
        .to_string()
    }
}

/// Stand-in for the hypervisor pool of a zone; AWS exposes none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: String,
    pub zone_id: String,
    pub region_id: String,
}

impl CloudResource for Host {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn status(&self) -> String {
        HOST_STATUS_RUNNING.to_string()
    }

    fn is_emulated(&self) -> bool {
        true
    }
}

/// One EBS volume type in one zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storage {
    pub id: String,
    pub storage_type: String,
    pub zone_id: String,
    pub status: String,
}

impl CloudResource for Storage {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> String {
        format!("{}-{}", self.zone_id, self.storage_type)
    }

    fn status(&self) -> String {
        self.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::ErrorKind;

    fn zone(region: &str, name: &str, state: &str) -> Zone {
        let az = AvailabilityZone {
            zone_name: name.into(),
            zone_id: None,
            zone_state: state.into(),
            region_name: region.into(),
        };
        Zone::new("acc-1", region, &az)
    }

    #[test]
    fn emulated_host() {
        let z = zone("us-east-1", "us-east-1a", "available");
        let host = z.host();
        assert_eq!(host.id(), "acc-1-us-east-1a");
        assert!(host.is_emulated());
        assert_eq!(z.host_by_id("acc-1-us-east-1a").unwrap(), host);
        assert_eq!(z.host_by_id("acc-1-us-east-1b").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn one_storage_per_volume_type() {
        let z = zone("us-east-1", "us-east-1a", "available");
        let storages = z.storages();
        assert_eq!(storages.len(), STORAGE_TYPES.len());
        assert!(storages.iter().all(|s| s.status == STORAGE_STATUS_ONLINE));
        let gp3 = z.storage_by_id("acc-1-us-east-1a-gp3").unwrap();
        assert_eq!(gp3.storage_type, "gp3");
        assert_eq!(gp3.name(), "us-east-1a-gp3");
    }

    #[test]
    fn io2_offline_in_china() {
        let z = zone("cn-north-1", "cn-north-1a", "available");
        let io2 = z.storage_by_id("acc-1-cn-north-1a-io2").unwrap();
        assert_eq!(io2.status(), STORAGE_STATUS_OFFLINE);
        let gp2 = z.storage_by_id("acc-1-cn-north-1a-gp2").unwrap();
        assert_eq!(gp2.status(), STORAGE_STATUS_ONLINE);
        let other = zone("cn-northwest-1", "cn-northwest-1a", "available");
        assert_eq!(other.storage_by_id("acc-1-cn-northwest-1a-io2").unwrap().status(), STORAGE_STATUS_OFFLINE);
        assert_eq!(storage_status("io2", "us-east-1"), STORAGE_STATUS_ONLINE);
    }

    #[test]
    fn zone_status_and_ids() {
        let z = zone("eu-west-1", "eu-west-1b", "impaired");
        assert_eq!(z.status(), ZONE_STATUS_SOLDOUT);
        assert_eq!(z.global_id(), "Aws/eu-west-1/eu-west-1b");
        assert_eq!(zone("eu-west-1", "eu-west-1a", "available").status(), ZONE_STATUS_ENABLE);
    }
}
