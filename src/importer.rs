//! # Base VM import (recommended)
//!
//! This module chains the package inspection, the hardware extraction and the
//! flavor resolution into a single request, then stores the base VM as four
//! images through the image service. Every request goes through these stages:
//!
//! `Received → BundleValidated → ManifestParsed → ResourcesExtracted →
//! FlavorResolved → MetadataReady`
//!
//! Any failure rejects the request for good; the caller has to submit a new
//! one with a corrected package. The scratch directory the package is unpacked
//! in is removed on every path, success or not.
//!
//! ## Example
//!
//! ```ignore
//! use std::fs::File;
//! use cloudlet_base::builder::{Builder, importer::ImporterBuilder};
//! use cloudlet_base::importer::ImportRequest;
//!
//! let importer = ImporterBuilder::auto().try_build().unwrap();
//! let request = ImportRequest::new("ubuntu-base".to_string(), File::open("ubuntu-base.zip").unwrap());
//! // `compute` and `images` are clients authenticated for the current user
//! let outcome = importer.import(request, &compute, &images).unwrap();
//! println!("base VM stored as {}", outcome.disk_image().unwrap().id);
//! ```
use std::{
    collections::BTreeMap,
    io::{Read, Seek},
    path::PathBuf,
};

use cloudlet_models::models::{
    ArtifactKind, ArtifactPaths, FlavorCandidate, HardwareDescriptor, ImageRecord, Manifest,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    builder::{
        image::{ImageMetadataBuilder, PROPERTY_RESOURCE_XML},
        Builder, BuilderError,
    },
    flavor::{flavor_name, resolve, FlavorMatch, FlavorRequirement, FlavorResolution},
    image::ImageCache,
    memory::{parse_resources, read_embedded_descriptor, MemoryError},
    package::{extract_paths, minimum_disk_gb, BaseVmPackage, PackageError, Workspace},
    schema::{ManifestSchema, SchemaError},
    service::{ComputeService, ImageService, ServiceError},
};

const MAX_NAME_LENGTH: usize = 255;

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("Image file is not valid, not a zipped base VM")]
    NotAnArchive,
    #[error("Image file is not valid, no manifest file")]
    ManifestMissing,
    #[error("Image file is not valid, {0}")]
    ManifestSchemaInvalid(SchemaError),
    #[error("Base VM package does not provide its {0}")]
    ArtifactPathMissing(String),
    #[error("Base VM package references {0:?} which is outside of the package")]
    UnsafeArtifactPath(String),
    #[error("Cannot read the memory snapshot of the base VM: {0}")]
    SnapshotUnreadable(MemoryError),
    #[error("Cannot find memory size or CPU number of Base VM")]
    ResourceFieldsMissing,
    #[error("Base VM exists : UUID({0})")]
    BaseVmExists(String),
    #[error("Invalid base VM name {0:?}")]
    InvalidName(String),
    #[error("Could not prepare the request, reason: {0}")]
    InvalidRequest(#[from] BuilderError),
    #[error("Could not process the base VM package, reason: {0}")]
    Io(String),
    /// A failure while uploading leaves the images created so far in the
    /// image service, their ids are logged.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<PackageError> for ImportError {
    fn from(e: PackageError) -> ImportError {
        match e {
            PackageError::NotAnArchive(_) => ImportError::NotAnArchive,
            PackageError::MalformedManifest(e) => ImportError::ManifestSchemaInvalid(e),
            PackageError::MissingArtifact(kind) => {
                ImportError::ArtifactPathMissing(format!("{} entry in the manifest", kind))
            }
            PackageError::ArtifactNotInArchive(path) => {
                ImportError::ArtifactPathMissing(format!("file {:?}", path))
            }
            PackageError::UnsafeArtifactPath(path) => ImportError::UnsafeArtifactPath(path),
            PackageError::Archive(e) => ImportError::Io(e),
            PackageError::WorkspaceCreation(e) => ImportError::Io(e.to_string()),
            PackageError::Io(path, e) => ImportError::Io(format!("{}: {}", path.display(), e)),
        }
    }
}

impl From<MemoryError> for ImportError {
    fn from(e: MemoryError) -> ImportError {
        ImportError::SnapshotUnreadable(e)
    }
}

/// Progress of an import request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    BundleValidated,
    ManifestParsed,
    ResourcesExtracted,
    FlavorResolved,
    MetadataReady,
}

/// Settings shared by every request handled by an [Importer]
#[derive(Debug, Clone)]
pub struct ImporterOptions {
    /// Directory packages are unpacked in, the system temporary directory if unset
    pub scratch_dir: Option<PathBuf>,
    /// Prefix of the flavors created for new base VMs
    pub flavor_prefix: String,
    /// Whether imported images are public
    pub public: bool,
    pub schema: ManifestSchema,
}

/// A base VM package uploaded by a user
#[derive(Debug)]
pub struct ImportRequest<R> {
    /// Name of the base VM, used to name its images and flavor
    pub name: String,
    pub package: R,
}

impl<R> ImportRequest<R> {
    pub fn new(name: String, package: R) -> ImportRequest<R> {
        ImportRequest { name, package }
    }
}

/// A package whose archive and manifest were checked
#[derive(Debug)]
pub struct ValidatedPackage<R> {
    pub package: BaseVmPackage<R>,
    pub manifest: Manifest,
}

/// Hardware requirements read from an unpacked package. The workspace is
/// removed when the inspection is dropped.
#[derive(Debug)]
pub struct Inspection {
    pub workspace: Workspace,
    pub manifest: Manifest,
    pub paths: ArtifactPaths,
    /// Libvirt domain XML embedded in the memory snapshot
    pub descriptor_xml: String,
    pub hardware: HardwareDescriptor,
    pub disk_gb: u64,
}

impl Inspection {
    pub fn requirement(&self) -> FlavorRequirement {
        FlavorRequirement::new(&self.hardware, self.disk_gb)
    }
}

/// Flavor the base VM will be resumed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlavorOutcome {
    /// Existing flavors with the exact hardware of the base VM
    Existing(Vec<FlavorMatch>),
    /// No flavor matched, this one was created
    Created(FlavorCandidate),
}

/// Result of a successful import
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub name: String,
    pub manifest: Manifest,
    pub hardware: HardwareDescriptor,
    pub disk_gb: u64,
    pub flavor: FlavorOutcome,
    /// Created images, the disk image comes last
    pub images: Vec<ImageRecord>,
    pub stage: Stage,
}

impl ImportOutcome {
    pub fn disk_image(&self) -> Option<&ImageRecord> {
        self.images.last()
    }
}

/// Imports base VM packages, one request at a time
#[derive(Debug)]
pub struct Importer {
    options: ImporterOptions,
}

impl Importer {
    pub fn new(options: ImporterOptions) -> Importer {
        Importer { options }
    }

    pub fn options(&self) -> &ImporterOptions {
        &self.options
    }

    /// Check the archive and its manifest, and make sure the base VM was not
    /// imported already.
    #[instrument(skip_all)]
    pub fn validate<R, I>(&self, package: R, images: &mut ImageCache<'_, I>) -> Result<ValidatedPackage<R>, ImportError>
    where
        R: Read + Seek,
        I: ImageService + ?Sized,
    {
        let mut package = self.open(package)?;
        let manifest = self.check_manifest(&mut package, images)?;
        Ok(ValidatedPackage { package, manifest })
    }

    fn open<R: Read + Seek>(&self, package: R) -> Result<BaseVmPackage<R>, ImportError> {
        let package = BaseVmPackage::open(package)?.with_schema(self.options.schema.clone());
        debug!("Package is a valid archive");
        Ok(package)
    }

    fn check_manifest<R, I>(
        &self,
        package: &mut BaseVmPackage<R>,
        images: &mut ImageCache<'_, I>,
    ) -> Result<Manifest, ImportError>
    where
        R: Read + Seek,
        I: ImageService + ?Sized,
    {
        let manifest = package.read_manifest()?.ok_or(ImportError::ManifestMissing)?;
        if let Some(existing) = images.find_base(&manifest.hash_value)? {
            return Err(ImportError::BaseVmExists(existing.id.clone()));
        }
        Ok(manifest)
    }

    /// Unpack the package and read the hardware it needs.
    #[instrument(skip_all, fields(hash = %validated.manifest.hash_value))]
    pub fn inspect<R: Read + Seek>(&self, validated: ValidatedPackage<R>) -> Result<Inspection, ImportError> {
        let ValidatedPackage {
            mut package,
            manifest,
        } = validated;
        let paths = extract_paths(&manifest)?;
        let workspace = package.unpack(self.options.scratch_dir.as_deref())?;

        let memory = workspace.artifact(&paths.memory)?;
        let descriptor_xml = read_embedded_descriptor(&memory)?;
        let hardware = parse_resources(&descriptor_xml).ok_or(ImportError::ResourceFieldsMissing)?;

        let disk = workspace.artifact(&paths.disk)?;
        let disk_gb = minimum_disk_gb(disk)?;
        debug!(
            cpu = hardware.cpu_count,
            memory_mb = hardware.memory_size_mb,
            disk_gb,
            "Base VM resources"
        );

        Ok(Inspection {
            workspace,
            manifest,
            paths,
            descriptor_xml,
            hardware,
            disk_gb,
        })
    }

    /// Find the flavors matching the base VM, or create one if none does.
    #[instrument(skip(self, compute))]
    pub fn resolve_flavor<C: ComputeService + ?Sized>(
        &self,
        compute: &C,
        name: &str,
        requirement: &FlavorRequirement,
    ) -> Result<FlavorOutcome, ImportError> {
        let flavors = compute.list_flavors()?;
        let new_name = flavor_name(&self.options.flavor_prefix, name);
        match resolve(&flavors, requirement, new_name)? {
            FlavorResolution::Matched(matches) => Ok(FlavorOutcome::Existing(matches)),
            FlavorResolution::Create(spec) => {
                let flavor = compute.create_flavor(&spec)?;
                info!("Create new flavor {} with ({})", spec.name, requirement);
                Ok(FlavorOutcome::Created(flavor))
            }
        }
    }

    /// Store the four artifacts as images. The disk image is created last so
    /// it can reference the three others.
    ///
    /// Images are not deleted when a later upload fails: their ids are logged
    /// and the error is returned.
    #[instrument(skip(self, images, inspection))]
    pub fn upload<I: ImageService + ?Sized>(
        &self,
        images: &I,
        name: &str,
        inspection: &Inspection,
    ) -> Result<Vec<ImageRecord>, ImportError> {
        let mut created = Vec::with_capacity(ArtifactKind::ALL.len());
        match self.upload_into(images, name, inspection, &mut created) {
            Ok(()) => Ok(created),
            Err(e) => {
                if !created.is_empty() {
                    let ids: Vec<&str> = created.iter().map(|image| image.id.as_str()).collect();
                    warn!("Upload of {} failed, images left behind: {}", name, ids.join(", "));
                }
                Err(e)
            }
        }
    }

    fn upload_into<I: ImageService + ?Sized>(
        &self,
        images: &I,
        name: &str,
        inspection: &Inspection,
        created: &mut Vec<ImageRecord>,
    ) -> Result<(), ImportError> {
        let metadata = |kind: ArtifactKind| {
            ImageMetadataBuilder::new()
                .with_base_name(name.to_string())
                .with_artifact(kind)
                .with_base_hash(inspection.manifest.hash_value.clone())
                .with_min_disk(inspection.disk_gb)
                .with_min_ram(inspection.hardware.memory_size_mb)
                .as_public(self.options.public)
        };

        let mut references = BTreeMap::new();
        references.insert(
            PROPERTY_RESOURCE_XML.to_string(),
            inspection.descriptor_xml.replace('\n', ""),
        );

        for kind in ArtifactKind::ALL.into_iter().filter(|k| *k != ArtifactKind::Disk) {
            let meta = metadata(kind).try_build()?;
            let path = inspection.workspace.artifact(inspection.paths.get(kind))?;
            debug!("Upload image {}", meta.name);
            let image = images.create_image(&meta, &path)?;
            references.insert(kind.cloudlet_type().to_string(), image.id.clone());
            created.push(image);
        }

        let mut disk = metadata(ArtifactKind::Disk);
        for (key, value) in references {
            disk = disk.with_property(key, value);
        }
        let meta = disk.try_build()?;
        let path = inspection.workspace.artifact(&inspection.paths.disk)?;
        let image = images.create_image(&meta, &path)?;
        info!("Your image {} has been queued for creation", meta.name);
        created.push(image);
        Ok(())
    }

    /// Run a whole import request. The image listing is cached for the
    /// duration of this call only.
    #[instrument(skip_all, fields(name = %request.name))]
    pub fn import<R, C, I>(&self, request: ImportRequest<R>, compute: &C, images: &I) -> Result<ImportOutcome, ImportError>
    where
        R: Read + Seek,
        C: ComputeService + ?Sized,
        I: ImageService + ?Sized,
    {
        let mut stage = Stage::Received;
        let result = self.run(request, compute, images, &mut stage);
        match &result {
            Ok(_) => debug!("Request reached {:?}", stage),
            Err(e) => warn!("Request rejected after {:?}: {}", stage, e),
        }
        result
    }

    fn run<R, C, I>(
        &self,
        request: ImportRequest<R>,
        compute: &C,
        images: &I,
        stage: &mut Stage,
    ) -> Result<ImportOutcome, ImportError>
    where
        R: Read + Seek,
        C: ComputeService + ?Sized,
        I: ImageService + ?Sized,
    {
        let ImportRequest { name, package } = request;
        if name.trim().is_empty() || name.len() > MAX_NAME_LENGTH {
            return Err(ImportError::InvalidName(name));
        }

        let mut cache = ImageCache::new(images);
        let mut package = self.open(package)?;
        *stage = Stage::BundleValidated;

        let manifest = self.check_manifest(&mut package, &mut cache)?;
        *stage = Stage::ManifestParsed;

        let inspection = self.inspect(ValidatedPackage { package, manifest })?;
        *stage = Stage::ResourcesExtracted;

        let flavor = self.resolve_flavor(compute, &name, &inspection.requirement())?;
        *stage = Stage::FlavorResolved;

        let created = self.upload(images, &name, &inspection)?;
        *stage = Stage::MetadataReady;

        let Inspection {
            workspace,
            manifest,
            hardware,
            disk_gb,
            ..
        } = inspection;
        if let Err(e) = workspace.close() {
            warn!("Unable to remove scratch directory: {}", e);
        }

        Ok(ImportOutcome {
            name,
            manifest,
            hardware,
            disk_gb,
            flavor,
            images: created,
            stage: *stage,
        })
    }
}
