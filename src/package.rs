//! # Base VM package inspection
//!
//! A base VM package is a zip archive holding a disk image, a memory snapshot,
//! their hashes and a manifest describing where each of them lives inside the
//! archive. This module checks the archive, reads its manifest through a
//! [ManifestSchema] and unpacks it into a scratch [Workspace].
//!
//! ## Example
//!
//! ```no_run
//! use std::fs::File;
//! use cloudlet_base::package::{extract_paths, minimum_disk_gb, BaseVmPackage};
//!
//! let file = File::open("ubuntu-base.zip").unwrap();
//! let mut package = BaseVmPackage::open(file).unwrap();
//! let manifest = package.read_manifest().unwrap().expect("no manifest");
//! let paths = extract_paths(&manifest).unwrap();
//! let workspace = package.unpack(None).unwrap();
//! let disk = workspace.artifact(&paths.disk).unwrap();
//! println!("disk needs {} GiB", minimum_disk_gb(disk).unwrap());
//! // the scratch directory is removed when `workspace` goes out of scope
//! ```
use std::{
    io::{Read, Seek, SeekFrom},
    path::{Component, Path, PathBuf},
};

use cloudlet_models::models::{ArtifactKind, ArtifactPaths, Manifest};
use tempfile::TempDir;
use tracing::{debug, instrument, trace};
use zip::{result::ZipError, ZipArchive};

use crate::schema::{ManifestSchema, SchemaError};

const GIB: u64 = 1024 * 1024 * 1024;
const SCRATCH_PREFIX: &str = "cloudlet-base-";

#[derive(thiserror::Error, Debug)]
pub enum PackageError {
    #[error("Image file is not valid, not a zipped base VM: {0}")]
    NotAnArchive(String),
    #[error("Manifest does not match the package schema: {0}")]
    MalformedManifest(#[from] SchemaError),
    #[error("Manifest has no {0} entry")]
    MissingArtifact(ArtifactKind),
    #[error("Artifact path {0:?} points outside of the package")]
    UnsafeArtifactPath(String),
    #[error("Artifact {0:?} is listed in the manifest but absent from the package")]
    ArtifactNotInArchive(String),
    #[error("Could not read package archive, reason: {0}")]
    Archive(String),
    #[error("Could not initiate workspace for package, reason: {0}")]
    WorkspaceCreation(std::io::Error),
    #[error("Could not read file {0:?}, reason: {1}")]
    Io(PathBuf, std::io::Error),
}

impl From<ZipError> for PackageError {
    fn from(e: ZipError) -> PackageError {
        match e {
            ZipError::InvalidArchive(reason) => PackageError::NotAnArchive(reason.to_string()),
            other => PackageError::Archive(other.to_string()),
        }
    }
}

/// Tells whether the given stream is a zip archive. Only the container format
/// is checked, not its content. The stream is rewound before returning.
pub fn is_bundle<R: Read + Seek>(reader: &mut R) -> bool {
    let is_zip = ZipArchive::new(&mut *reader).is_ok();
    if let Err(e) = reader.seek(SeekFrom::Start(0)) {
        debug!("Unable to rewind package stream: {}", e);
        return false;
    }
    is_zip
}

/// An opened base VM package
#[derive(Debug)]
pub struct BaseVmPackage<R> {
    archive: ZipArchive<R>,
    schema: ManifestSchema,
}

impl<R: Read + Seek> BaseVmPackage<R> {
    /// Open the archive using the default cloudlet manifest schema
    pub fn open(reader: R) -> Result<Self, PackageError> {
        let archive = ZipArchive::new(reader).map_err(|e| match e {
            ZipError::Io(e) => PackageError::NotAnArchive(e.to_string()),
            e => PackageError::from(e),
        })?;
        Ok(Self {
            archive,
            schema: ManifestSchema::default(),
        })
    }

    pub fn with_schema(self, schema: ManifestSchema) -> Self {
        Self { schema, ..self }
    }

    pub fn schema(&self) -> &ManifestSchema {
        &self.schema
    }

    /// Names of all the entries of the archive
    pub fn entries(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// Read the manifest of the package. Returns `Ok(None)` when the archive
    /// has no manifest file.
    #[instrument(skip(self), fields(manifest = %self.schema.filename))]
    pub fn read_manifest(&mut self) -> Result<Option<Manifest>, PackageError> {
        let mut file = match self.archive.by_name(&self.schema.filename) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => {
                debug!("Package has no manifest");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let mut xml = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut xml)
            .map_err(|e| PackageError::Archive(e.to_string()))?;
        trace!("Manifest content: {}", String::from_utf8_lossy(&xml));

        let manifest = self.schema.parse(&xml)?;
        debug!("Manifest parsed, hash value {}", manifest.hash_value);
        Ok(Some(manifest))
    }

    /// Extract the whole archive into a new scratch directory, created under
    /// `scratch_root` or the system temporary directory. The directory is
    /// removed when the returned [Workspace] is dropped.
    #[instrument(skip(self))]
    pub fn unpack(&mut self, scratch_root: Option<&Path>) -> Result<Workspace, PackageError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let dir = match scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(PackageError::WorkspaceCreation)?;

        debug!("Unpacking package into {}", dir.path().display());
        self.archive.extract(dir.path())?;
        Ok(Workspace { dir })
    }
}

/// Collect the four artifact paths of a manifest, making sure each of them is
/// present and stays inside the package.
pub fn extract_paths(manifest: &Manifest) -> Result<ArtifactPaths, PackageError> {
    let path = |kind: ArtifactKind| -> Result<String, PackageError> {
        let path = manifest
            .path(kind)
            .filter(|p| !p.trim().is_empty())
            .ok_or(PackageError::MissingArtifact(kind))?;
        check_relative(path)?;
        Ok(path.to_string())
    };

    Ok(ArtifactPaths {
        disk: path(ArtifactKind::Disk)?,
        memory: path(ArtifactKind::Memory)?,
        disk_hash: path(ArtifactKind::DiskHash)?,
        memory_hash: path(ArtifactKind::MemoryHash)?,
    })
}

fn check_relative(path: &str) -> Result<(), PackageError> {
    let escapes = Path::new(path).components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(PackageError::UnsafeArtifactPath(path.to_string()));
    }
    Ok(())
}

/// Minimum disk size, in GiB, a flavor needs to hold the given disk image.
/// Rounds up so a flavor is never smaller than the image.
pub fn minimum_disk_gb<P: AsRef<Path>>(disk: P) -> Result<u64, PackageError> {
    let disk = disk.as_ref();
    let size = std::fs::metadata(disk)
        .map_err(|e| PackageError::Io(disk.to_path_buf(), e))?
        .len();
    Ok(size / GIB + u64::from(size % GIB != 0))
}

/// Scratch directory holding an unpacked package, exclusively owned by one
/// import request and removed when dropped.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Resolve an artifact path relative to the workspace, failing if the file
    /// was not part of the archive.
    pub fn artifact(&self, relative: &str) -> Result<PathBuf, PackageError> {
        check_relative(relative)?;
        let path = self.dir.path().join(relative);
        if !path.is_file() {
            return Err(PackageError::ArtifactNotInArchive(relative.to_string()));
        }
        Ok(path)
    }

    /// Remove the directory now, reporting failures instead of ignoring them
    pub fn close(self) -> std::io::Result<()> {
        self.dir.close()
    }

    /// Give up ownership of the directory: it will not be removed anymore
    pub fn keep(self) -> PathBuf {
        self.dir.keep()
    }
}
