use std::{env::var_os, path::PathBuf};

use crate::{
    builder::{Builder, BuilderError},
    flavor::DEFAULT_FLAVOR_PREFIX,
    importer::{Importer, ImporterOptions},
    schema::ManifestSchema,
};

/// Environment variable pointing to the directory packages are unpacked in
pub const SCRATCH_DIR_ENV: &str = "CLOUDLET_SCRATCH_DIR";

#[derive(Debug)]
pub struct ImporterBuilder {
    scratch_dir: Option<PathBuf>,
    flavor_prefix: Option<String>,
    public: bool,
    schema: Option<ManifestSchema>,
}

impl Default for ImporterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImporterBuilder {
    pub fn new() -> ImporterBuilder {
        ImporterBuilder {
            scratch_dir: None,
            flavor_prefix: None,
            public: true,
            schema: None,
        }
    }

    /// Tries to determine if variable `CLOUDLET_SCRATCH_DIR` exists, if it does, it will check
    /// that it points to a directory, if it does, it will return the content of the variable.
    fn find_scratch_dir_from_env() -> Option<PathBuf> {
        if let Some(path) = var_os(SCRATCH_DIR_ENV) {
            if PathBuf::from(&path).is_dir() {
                return Some(PathBuf::from(path));
            }

            log::warn!(
                "{} is set but the directory does not exist: {:?}",
                SCRATCH_DIR_ENV,
                path
            );
        }
        None
    }

    /// Create a builder configured from the environment. The scratch directory
    /// is taken from `CLOUDLET_SCRATCH_DIR` when it points to an existing
    /// directory, otherwise packages are unpacked in the system temporary
    /// directory.
    pub fn auto() -> ImporterBuilder {
        let builder = Self::new();
        match Self::find_scratch_dir_from_env() {
            Some(dir) => builder.with_scratch_dir(dir),
            None => builder,
        }
    }

    pub fn with_scratch_dir(mut self, scratch_dir: PathBuf) -> ImporterBuilder {
        self.scratch_dir = Some(scratch_dir);
        self
    }

    /// Prefix of the flavors created for new base VMs
    pub fn with_flavor_prefix(mut self, flavor_prefix: String) -> ImporterBuilder {
        self.flavor_prefix = Some(flavor_prefix);
        self
    }

    /// Whether imported images are public, defaults to `true`
    pub fn with_public(mut self, public: bool) -> ImporterBuilder {
        self.public = public;
        self
    }

    pub fn with_schema(mut self, schema: ManifestSchema) -> ImporterBuilder {
        self.schema = Some(schema);
        self
    }
}

impl Builder<Importer> for ImporterBuilder {
    fn try_build(self) -> Result<Importer, BuilderError> {
        if let Some(dir) = &self.scratch_dir {
            if !dir.is_dir() {
                return Err(BuilderError::InvalidField(
                    stringify!(self.scratch_dir).to_string(),
                    format!("{} is not a directory", dir.display()),
                ));
            }
        }
        let schema = self.schema.unwrap_or_default();
        if schema.filename.is_empty() {
            return Err(BuilderError::InvalidField(
                stringify!(self.schema).to_string(),
                "manifest filename must not be empty".to_string(),
            ));
        }

        Ok(Importer::new(ImporterOptions {
            scratch_dir: self.scratch_dir,
            flavor_prefix: self
                .flavor_prefix
                .unwrap_or_else(|| DEFAULT_FLAVOR_PREFIX.to_string()),
            public: self.public,
            schema,
        }))
    }
}
