//! Shader modules and the compiled-binary library.
//!
//! Shader compilation is an external collaborator: this layer only consumes
//! pre-compiled SPIR-V blobs. The [`ShaderLibrary`] resolves a blob by the
//! module label — in-memory registrations first, then `<search_path>/<label>.spv`
//! on disk. A missing blob is a configuration error, not a backend error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ash::vk;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::errors::{GpuError, Result};
use crate::vulkan::device::{next_resource_id, DeviceShared};

/// Label-keyed registry of compiled SPIR-V binaries.
pub struct ShaderLibrary {
    entries: Mutex<FxHashMap<String, Vec<u32>>>,
    search_path: Mutex<Option<PathBuf>>,
}

impl ShaderLibrary {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            search_path: Mutex::new(None),
        }
    }

    /// Registers a compiled binary under `label`. The byte length must be a
    /// multiple of 4 (SPIR-V word size).
    pub fn register(&self, label: &str, bytes: &[u8]) -> Result<()> {
        let words = words_from_bytes(label, bytes)?;
        self.entries.lock().insert(label.to_owned(), words);
        Ok(())
    }

    /// Directory consulted for `<label>.spv` files when a label has no
    /// in-memory registration.
    pub fn set_search_path(&self, path: impl Into<PathBuf>) {
        *self.search_path.lock() = Some(path.into());
    }

    /// Whether a binary is resolvable for `label` without touching the device.
    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.resolve(label).is_ok()
    }

    pub(crate) fn resolve(&self, label: &str) -> Result<Vec<u32>> {
        if let Some(words) = self.entries.lock().get(label) {
            return Ok(words.clone());
        }
        if let Some(dir) = self.search_path.lock().as_deref() {
            if let Some(words) = load_from_dir(dir, label)? {
                return Ok(words);
            }
        }
        Err(GpuError::ShaderResourceNotFound(label.to_owned()))
    }
}

fn load_from_dir(dir: &Path, label: &str) -> Result<Option<Vec<u32>>> {
    let path = dir.join(format!("{label}.spv"));
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = std::fs::read(&path)
        .map_err(|e| GpuError::Validation(format!("failed to read {}: {e}", path.display())))?;
    words_from_bytes(label, &bytes).map(Some)
}

fn words_from_bytes(label: &str, bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(GpuError::Validation(format!(
            "shader '{label}' binary size {} is not a non-zero multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// A compiled shader module attached to a device.
pub struct ShaderModule {
    shared: Arc<DeviceShared>,
    id: u64,
    pub(crate) raw: vk::ShaderModule,
    label: String,
    destroyed: AtomicBool,
}

impl ShaderModule {
    pub(crate) fn create(shared: Arc<DeviceShared>, label: &str, words: &[u32]) -> Result<Self> {
        let info = vk::ShaderModuleCreateInfo::builder().code(words);
        let raw = unsafe { shared.raw.create_shader_module(&info, None) }.map_err(|e| {
            GpuError::ResourceCreation {
                kind: "shader module",
                reason: e.to_string(),
            }
        })?;
        let id = next_resource_id();
        log::debug!("created shader module {id} ('{label}')");
        Ok(Self {
            shared,
            id,
            raw,
            label: label.to_owned(),
            destroyed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Destroys the module. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.shared.alive() {
            unsafe { self.shared.raw.destroy_shader_module(self.raw, None) };
            log::debug!("destroyed shader module {} ('{}')", self.id, self.label);
        }
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_rejects_misaligned_binaries() {
        let library = ShaderLibrary::new();
        assert!(matches!(
            library.register("vs_main", &[0u8; 7]),
            Err(GpuError::Validation(_))
        ));
        assert!(library.register("vs_main", &[0u8; 8]).is_ok());
    }

    #[test]
    fn resolve_prefers_in_memory_registrations() {
        let library = ShaderLibrary::new();
        library.register("fs_main", &42u32.to_le_bytes()).unwrap();
        assert_eq!(library.resolve("fs_main").unwrap(), vec![42]);
    }

    #[test]
    fn missing_label_is_a_configuration_error() {
        let library = ShaderLibrary::new();
        assert!(matches!(
            library.resolve("nope"),
            Err(GpuError::ShaderResourceNotFound(label)) if label == "nope"
        ));
    }

    #[test]
    fn words_are_little_endian() {
        let words = words_from_bytes("x", &[0x01, 0x02, 0x03, 0x04]).unwrap();
        assert_eq!(words, vec![0x0403_0201]);
    }
}
