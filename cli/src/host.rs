use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use mat_core::{Host, VmConfig};
use tracing::debug;

/// Host backed by the filesystem: modules come from the import paths, output goes to stdout.
pub(crate) struct FsHost {
    import_paths: Vec<PathBuf>,
    extension: String,
}

impl FsHost {
    pub(crate) fn new(config: &VmConfig) -> Self {
        Self {
            import_paths: config.import_paths.clone(),
            extension: config.module_extension.clone(),
        }
    }

    /// First `<dir>/<module>` or `<dir>/<module>.<ext>` that exists, in import path order.
    pub(crate) fn resolve(&self, module: &str) -> Option<PathBuf> {
        self.import_paths.iter().find_map(|dir| {
            let plain = dir.join(module);
            if plain.is_file() {
                return Some(plain);
            }
            let with_ext = dir.join(format!("{}.{}", module, self.extension));
            with_ext.is_file().then_some(with_ext)
        })
    }
}

impl Host for FsHost {
    fn import(&mut self, module: &str) -> Result<Vec<u8>> {
        let Some(path) = self.resolve(module) else {
            let searched: Vec<String> = self.import_paths.iter().map(|p| p.display().to_string()).collect();
            bail!("module '{}' not found (searched: {})", module, searched.join(", "));
        };
        debug!(target: "mat_cli", module, path = %path.display(), "module resolved");
        std::fs::read(&path).with_context(|| format!("Failed to read module {}", path.display()))
    }

    fn print(&mut self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", text);
    }
}
