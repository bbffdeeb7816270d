use std::{
    cell::RefCell,
    fs::OpenOptions,
    io::{Cursor, Write},
    path::Path,
};

use cloudlet_base::{
    builder::{importer::ImporterBuilder, Builder},
    flavor::{find_matching, FlavorMatch, FlavorRequirement},
    importer::{FlavorOutcome, ImportError, ImportRequest, Stage},
    memory::{parse_resources, read_embedded_descriptor, QemuMemoryHeader},
    package::{extract_paths, is_bundle, minimum_disk_gb, BaseVmPackage},
    service::{ComputeService, ImageFilter, ImageService, ServiceError},
};
use cloudlet_models::models::{
    FlavorCandidate, FlavorSpec, HardwareDescriptor, ImageMetadata, ImageRecord,
};
use pretty_assertions::assert_eq;
use zip::write::FileOptions;

const GIB: u64 = 1024 * 1024 * 1024;

const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<image xmlns="http://opencloudlet.org/xmlns/vmsynthesis/package" hash_value="abc123">
  <disk path="d.img"/>
  <memory path="m.img"/>
  <disk_hash path="d.sha"/>
  <memory_hash path="m.sha"/>
</image>"#;

const DOMAIN: &str = r#"<domain type="kvm">
  <name>ubuntu-base</name>
  <vcpu>4</vcpu>
  <memory unit="MiB">8192</memory>
  <devices><disk type="file"/></devices>
</domain>"#;

fn memory_image(xml: &str) -> Vec<u8> {
    let mut out = QemuMemoryHeader::MAGIC.to_vec();
    for value in [QemuMemoryHeader::VERSION, xml.len() as u32 + 1, 0, 0] {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(&[0u8; 60]);
    out.extend_from_slice(xml.as_bytes());
    out.push(0);
    out
}

fn package() -> Cursor<Vec<u8>> {
    let memory = memory_image(DOMAIN);
    let entries: [(&str, &[u8]); 5] = [
        ("package.xml", MANIFEST.as_bytes()),
        ("d.img", b"disk"),
        ("m.img", &memory),
        ("d.sha", b"disk-hash"),
        ("m.sha", b"memory-hash"),
    ];
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer.start_file(name, FileOptions::default()).unwrap();
        writer.write_all(content).unwrap();
    }
    let mut cursor = writer.finish().unwrap();
    cursor.set_position(0);
    cursor
}

#[derive(Default)]
struct Compute {
    flavors: Vec<FlavorCandidate>,
    created: RefCell<Vec<FlavorSpec>>,
}

impl ComputeService for Compute {
    fn list_flavors(&self) -> Result<Vec<FlavorCandidate>, ServiceError> {
        Ok(self.flavors.clone())
    }

    fn create_flavor(&self, spec: &FlavorSpec) -> Result<FlavorCandidate, ServiceError> {
        self.created.borrow_mut().push(spec.clone());
        Ok(FlavorCandidate::new(
            spec.id.to_string(),
            spec.name.clone(),
            spec.vcpus,
            spec.ram_mb,
            spec.disk_gb,
        ))
    }
}

#[derive(Default)]
struct Images {
    created: RefCell<Vec<ImageRecord>>,
}

impl ImageService for Images {
    fn list_images(&self, filter: &ImageFilter) -> Result<Vec<ImageRecord>, ServiceError> {
        Ok(self
            .created
            .borrow()
            .iter()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect())
    }

    fn create_image(&self, metadata: &ImageMetadata, data: &Path) -> Result<ImageRecord, ServiceError> {
        assert!(data.is_file(), "{} should exist during upload", data.display());
        let mut image = ImageRecord::new(
            format!("{}-id", metadata.name),
            metadata.name.clone(),
        );
        image.visibility = metadata.visibility;
        image.properties = metadata.properties.clone();
        self.created.borrow_mut().push(image.clone());
        Ok(image)
    }
}

#[test]
fn test_it_resolves_a_ten_gib_base_vm() {
    let mut zip = package();
    assert!(is_bundle(&mut zip));

    let mut package = BaseVmPackage::open(zip).unwrap();
    let manifest = package.read_manifest().unwrap().unwrap();
    assert_eq!(manifest.hash_value, "abc123");
    let paths = extract_paths(&manifest).unwrap();

    let workspace = package.unpack(None).unwrap();
    let disk = workspace.artifact(&paths.disk).unwrap();
    // grow the unpacked disk to exactly 10 GiB, sparse
    OpenOptions::new()
        .write(true)
        .open(&disk)
        .unwrap()
        .set_len(10 * GIB)
        .unwrap();

    let xml = read_embedded_descriptor(workspace.artifact(&paths.memory).unwrap()).unwrap();
    let hardware = parse_resources(&xml).unwrap();
    assert_eq!(hardware, HardwareDescriptor::new(4, 8192));
    let disk_gb = minimum_disk_gb(&disk).unwrap();
    assert_eq!(disk_gb, 10);

    let requirement = FlavorRequirement::new(&hardware, disk_gb);
    let flavors = vec![
        FlavorCandidate::new("f1".to_string(), "cloudlet.base".to_string(), 4, 8192, 10),
        FlavorCandidate::new("f2".to_string(), "m1.large".to_string(), 4, 8192, 80),
    ];
    let matches: Vec<_> = find_matching(&flavors, &requirement).into_iter().collect();
    assert_eq!(
        matches,
        vec![FlavorMatch {
            id: "f1".to_string(),
            name: "cloudlet.base".to_string()
        }]
    );

    let dir = workspace.path().to_path_buf();
    drop(workspace);
    assert!(!dir.exists());
}

#[test]
fn test_it_imports_then_rejects_the_same_base_vm() {
    let scratch = tempfile::tempdir().unwrap();
    let importer = ImporterBuilder::new()
        .with_scratch_dir(scratch.path().to_path_buf())
        .try_build()
        .unwrap();
    let compute = Compute::default();
    let images = Images::default();

    let outcome = importer
        .import(ImportRequest::new("ubuntu-base".to_string(), package()), &compute, &images)
        .unwrap();
    assert_eq!(outcome.stage, Stage::MetadataReady);
    assert_eq!(outcome.hardware, HardwareDescriptor::new(4, 8192));
    assert_eq!(outcome.disk_gb, 1);
    match &outcome.flavor {
        FlavorOutcome::Created(flavor) => assert_eq!(flavor.name, "cloudlet-flavor-ubuntu-base"),
        other => panic!("unexpected flavor {:?}", other),
    }
    assert_eq!(compute.created.borrow().len(), 1);
    assert_eq!(images.created.borrow().len(), 4);
    assert_eq!(outcome.disk_image().unwrap().name, "ubuntu-base-disk");

    let again = importer.import(
        ImportRequest::new("ubuntu-base-2".to_string(), package()),
        &compute,
        &images,
    );
    match again {
        Err(ImportError::BaseVmExists(id)) => assert_eq!(id, "ubuntu-base-memory-id"),
        other => panic!("unexpected result {:?}", other),
    }
    assert!(std::fs::read_dir(scratch.path()).unwrap().next().is_none());
}
