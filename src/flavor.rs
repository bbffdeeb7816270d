//! # Flavor resolution
//!
//! A base VM is resumed with the exact hardware envelope it was snapshotted
//! with, so a flavor only matches when its vCPU count, RAM and disk are all
//! equal to the requirement. A bigger flavor is never picked instead.
use std::collections::BTreeSet;

use cloudlet_models::models::{FlavorCandidate, FlavorSpec, HardwareDescriptor};
use tracing::{debug, trace};

use crate::builder::{
    flavor::FlavorSpecBuilder, image::PROPERTY_RESOURCE_XML, Builder, BuilderError,
};
use crate::image::ImageCache;
use crate::memory::parse_resources;
use crate::service::{ImageService, ServiceError};

pub const DEFAULT_FLAVOR_PREFIX: &str = "cloudlet-flavor-";

/// Hardware a flavor must provide to host a base VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlavorRequirement {
    pub vcpus: u32,
    pub ram_mb: u64,
    pub disk_gb: u64,
}

impl FlavorRequirement {
    pub fn new(hardware: &HardwareDescriptor, disk_gb: u64) -> FlavorRequirement {
        FlavorRequirement {
            vcpus: hardware.cpu_count,
            ram_mb: hardware.memory_size_mb,
            disk_gb,
        }
    }

    pub fn is_met_exactly_by(&self, flavor: &FlavorCandidate) -> bool {
        flavor.vcpus == self.vcpus && flavor.ram_mb == self.ram_mb && flavor.disk_gb == self.disk_gb
    }
}

impl std::fmt::Display for FlavorRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cpu:{}, memory:{}, disk:{}",
            self.vcpus, self.ram_mb, self.disk_gb
        )
    }
}

/// A flavor matching a requirement, ordered by id then name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlavorMatch {
    pub id: String,
    pub name: String,
}

/// Every flavor whose `(vcpus, ram, disk)` is exactly the requirement.
pub fn find_matching(flavors: &[FlavorCandidate], requirement: &FlavorRequirement) -> BTreeSet<FlavorMatch> {
    flavors
        .iter()
        .filter(|flavor| {
            let matched = requirement.is_met_exactly_by(flavor);
            trace!(flavor = %flavor.name, matched, "compare flavor");
            matched
        })
        .map(|flavor| FlavorMatch {
            id: flavor.id.clone(),
            name: flavor.name.clone(),
        })
        .collect()
}

/// Flavors able to resume at least one of the base VMs listed by `images`,
/// sorted so the choice offered to the user stays stable.
///
/// The hardware of each base VM is read back from the domain XML stored on
/// its disk image, the disk size from the image `min_disk`.
pub fn flavor_choices<S: ImageService + ?Sized>(
    flavors: &[FlavorCandidate],
    images: &mut ImageCache<'_, S>,
) -> Result<Vec<FlavorMatch>, ServiceError> {
    let mut choices = BTreeSet::new();
    for image in images.base_vms()? {
        let hardware = match image.property(PROPERTY_RESOURCE_XML).and_then(parse_resources) {
            Some(hardware) => hardware,
            None => {
                debug!("Base VM image {} has no usable resource description", image.id);
                continue;
            }
        };
        let requirement = FlavorRequirement::new(&hardware, image.min_disk);
        choices.extend(find_matching(flavors, &requirement));
    }
    Ok(choices.into_iter().collect())
}

/// Name of the flavor created for the base VM `name`
pub fn flavor_name(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, name)
}

/// Outcome of a flavor resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlavorResolution {
    /// Existing flavors fit, sorted so the choice list stays stable
    Matched(Vec<FlavorMatch>),
    /// Nothing fits: this flavor must be created
    Create(FlavorSpec),
}

/// Match the requirement against `flavors`, or describe the public flavor to
/// create when none matches.
pub fn resolve(
    flavors: &[FlavorCandidate],
    requirement: &FlavorRequirement,
    new_flavor_name: String,
) -> Result<FlavorResolution, BuilderError> {
    let matches = find_matching(flavors, requirement);
    if !matches.is_empty() {
        debug!("{} flavor(s) match ({})", matches.len(), requirement);
        return Ok(FlavorResolution::Matched(matches.into_iter().collect()));
    }

    debug!("No flavor matches ({})", requirement);
    let spec = FlavorSpecBuilder::new()
        .with_name(new_flavor_name)
        .with_vcpus(requirement.vcpus)
        .with_ram_mb(requirement.ram_mb)
        .with_disk_gb(requirement.disk_gb)
        .as_public()
        .try_build()?;
    Ok(FlavorResolution::Create(spec))
}

#[cfg(test)]
mod tests {
    use cloudlet_models::models::{ImageRecord, Visibility};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::builder::image::PROPERTY_CLOUDLET_TYPE;
    use crate::service::tests::FakeImages;

    fn flavor(id: &str, vcpus: u32, ram_mb: u64, disk_gb: u64) -> FlavorCandidate {
        FlavorCandidate::new(id.to_string(), format!("m-{}", id), vcpus, ram_mb, disk_gb)
    }

    fn requirement(vcpus: u32, ram_mb: u64, disk_gb: u64) -> FlavorRequirement {
        FlavorRequirement {
            vcpus,
            ram_mb,
            disk_gb,
        }
    }

    #[test]
    fn exact_match_only() {
        let flavors = vec![flavor("small", 2, 2048, 20)];
        assert!(find_matching(&flavors, &requirement(2, 2048, 21)).is_empty());
        assert!(find_matching(&flavors, &requirement(1, 2048, 20)).is_empty());
        assert!(find_matching(&flavors, &requirement(2, 1024, 20)).is_empty());
        assert_eq!(find_matching(&flavors, &requirement(2, 2048, 20)).len(), 1);
    }

    #[test]
    fn larger_flavor_is_not_a_match() {
        let flavors = vec![flavor("big", 8, 16384, 100)];
        assert!(find_matching(&flavors, &requirement(2, 2048, 20)).is_empty());
    }

    #[test]
    fn all_matches_sorted() {
        let flavors = vec![
            flavor("f3", 4, 8192, 10),
            flavor("f1", 4, 8192, 10),
            flavor("f2", 2, 8192, 10),
            flavor("f0", 4, 8192, 10),
        ];
        let req = requirement(4, 8192, 10);
        let first = find_matching(&flavors, &req);
        let second = find_matching(&flavors, &req);
        assert_eq!(first, second);

        let ids: Vec<_> = first.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["f0", "f1", "f3"]);
    }

    #[test]
    fn duplicated_flavor_listed_once() {
        let flavors = vec![flavor("f1", 1, 512, 1), flavor("f1", 1, 512, 1)];
        assert_eq!(find_matching(&flavors, &requirement(1, 512, 1)).len(), 1);
    }

    #[test]
    fn resolve_matched() {
        let flavors = vec![flavor("f1", 4, 8192, 10)];
        let resolution = resolve(&flavors, &requirement(4, 8192, 10), "unused".to_string()).unwrap();
        assert_eq!(
            resolution,
            FlavorResolution::Matched(vec![FlavorMatch {
                id: "f1".to_string(),
                name: "m-f1".to_string()
            }])
        );
    }

    #[test]
    fn resolve_create() {
        let name = flavor_name(DEFAULT_FLAVOR_PREFIX, "ubuntu-base");
        assert_eq!(name, "cloudlet-flavor-ubuntu-base");

        let resolution = resolve(&[], &requirement(2, 2048, 3), name).unwrap();
        match resolution {
            FlavorResolution::Create(spec) => {
                assert_eq!(spec.name, "cloudlet-flavor-ubuntu-base");
                assert_eq!((spec.vcpus, spec.ram_mb, spec.disk_gb), (2, 2048, 3));
                assert!(spec.is_public);
            }
            other => panic!("unexpected resolution {:?}", other),
        }
    }

    fn base_vm(id: &str, xml: Option<&str>, min_disk: u64) -> ImageRecord {
        let mut image = ImageRecord::new(id.to_string(), format!("{}-disk", id));
        image.visibility = Visibility::Public;
        image.min_disk = min_disk;
        image.properties.insert(
            PROPERTY_CLOUDLET_TYPE.to_string(),
            "cloudlet_base_disk".to_string(),
        );
        if let Some(xml) = xml {
            image
                .properties
                .insert(PROPERTY_RESOURCE_XML.to_string(), xml.to_string());
        }
        image
    }

    #[test]
    fn choices_from_all_base_vms() {
        let service = FakeImages::default();
        service.images.borrow_mut().extend(vec![
            base_vm(
                "a",
                Some("<domain><vcpu>2</vcpu><memory unit='KiB'>2097152</memory></domain>"),
                10,
            ),
            base_vm(
                "b",
                Some("<domain><vcpu>2</vcpu><memory unit='GiB'>2</memory></domain>"),
                10,
            ),
            base_vm(
                "c",
                Some("<domain><vcpu>4</vcpu><memory unit='MiB'>4096</memory></domain>"),
                20,
            ),
            base_vm("no-xml", None, 10),
            base_vm("no-cpu", Some("<domain><memory unit='MiB'>4096</memory></domain>"), 20),
        ]);
        let flavors = vec![
            flavor("f4", 4, 4096, 21),
            flavor("f3", 4, 4096, 20),
            flavor("f2", 2, 2048, 10),
            flavor("f1", 2, 2048, 10),
            flavor("f0", 1, 512, 1),
        ];

        let mut cache = ImageCache::new(&service);
        let choices = flavor_choices(&flavors, &mut cache).unwrap();
        let ids: Vec<_> = choices.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "f2", "f3"]);

        assert_eq!(flavor_choices(&flavors, &mut cache).unwrap(), choices);
        assert_eq!(*service.list_calls.borrow(), 1);
    }

    #[test]
    fn no_base_vm_no_choice() {
        let service = FakeImages::default();
        let mut cache = ImageCache::new(&service);
        let flavors = vec![flavor("f1", 2, 2048, 10)];
        assert!(flavor_choices(&flavors, &mut cache).unwrap().is_empty());
    }

    #[test]
    fn requirement_from_hardware() {
        let req = FlavorRequirement::new(&HardwareDescriptor::new(4, 8192), 10);
        assert_eq!(req, requirement(4, 8192, 10));
        assert_eq!(req.to_string(), "cpu:4, memory:8192, disk:10");
    }
}
