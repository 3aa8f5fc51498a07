//! Probe steps.

use std::path::{Path, PathBuf};

use glob::{glob, Pattern};

use super::{is_nvshmem_dir, AcceleratorInstall, ProbeOutcome, ProbeStep};
use crate::util::process::{find_executable, ProcessBuilder};

/// Versioned host runtime, as shipped in the NVSHMEM wheels.
pub const RUNTIME_LIBRARY_PATTERN: &str = "libnvshmem_host.so.*";

/// Host runtime name used when only an unversioned install is available.
pub const UNVERSIONED_RUNTIME_LIBRARY: &str = "libnvshmem_host.so";

/// Static device library linked into the extension.
pub const DEVICE_STATIC_LIBRARY: &str = "libnvshmem_device.a";

/// Package path of the NVSHMEM wheel below a site-packages root.
const PACKAGE_SUBDIR: &str = "nvidia/nvshmem";

const FIND_SPEC_SCRIPT: &str = "import importlib.util as u; \
     s = u.find_spec('nvidia.nvshmem'); \
     print(s.submodule_search_locations[0])";

/// Find the versioned host runtime below `root/lib`.
///
/// Matches are sorted so that the same tree always yields the same file.
pub fn find_runtime_library(root: &Path) -> Option<String> {
    let pattern = format!(
        "{}/lib/**/{}",
        Pattern::escape(&root.to_string_lossy()),
        RUNTIME_LIBRARY_PATTERN
    );

    let mut matches: Vec<PathBuf> = glob(&pattern)
        .ok()?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("glob error: {}", e);
                None
            }
        })
        .collect();
    matches.sort();

    matches
        .into_iter()
        .find_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
}

/// Locate a wheel-style install at `dir`, or explain why it is unusable.
fn inspect_package_dir(dir: &Path) -> Result<AcceleratorInstall, String> {
    if !is_nvshmem_dir(dir) {
        return Err(format!("{} is not an NVSHMEM package", dir.display()));
    }
    match find_runtime_library(dir) {
        Some(runtime) => Ok(AcceleratorInstall::new(dir, runtime)),
        None => Err(format!(
            "malformed install at {}: no {} under lib/",
            dir.display(),
            RUNTIME_LIBRARY_PATTERN
        )),
    }
}

/// The explicit `NVSHMEM_DIR` override.
#[derive(Debug, Clone)]
pub struct ExplicitDirStep {
    dir: Option<PathBuf>,
}

impl ExplicitDirStep {
    pub fn new(dir: Option<PathBuf>) -> Self {
        ExplicitDirStep { dir }
    }
}

impl ProbeStep for ExplicitDirStep {
    fn name(&self) -> &'static str {
        "NVSHMEM_DIR"
    }

    fn probe(&self) -> ProbeOutcome {
        let Some(dir) = &self.dir else {
            return ProbeOutcome::NotFound("not specified".to_string());
        };

        if !dir.is_dir() {
            return ProbeOutcome::Invalid {
                path: dir.clone(),
                reason: "the specified NVSHMEM directory does not exist".to_string(),
            };
        }

        // Source builds only ship the unversioned soname.
        let runtime = find_runtime_library(dir)
            .unwrap_or_else(|| UNVERSIONED_RUNTIME_LIBRARY.to_string());
        ProbeOutcome::Found(AcceleratorInstall::new(dir.clone(), runtime))
    }
}

/// Ask the Python interpreter where `nvidia.nvshmem` is installed.
#[derive(Debug, Clone, Default)]
pub struct InterpreterStep {
    interpreter: Option<PathBuf>,
}

impl InterpreterStep {
    /// Use `python3` from `PATH`.
    pub fn new() -> Self {
        InterpreterStep { interpreter: None }
    }

    /// Use a specific interpreter.
    pub fn with_interpreter(path: impl Into<PathBuf>) -> Self {
        InterpreterStep {
            interpreter: Some(path.into()),
        }
    }
}

impl ProbeStep for InterpreterStep {
    fn name(&self) -> &'static str {
        "python"
    }

    fn probe(&self) -> ProbeOutcome {
        let Some(python) = self
            .interpreter
            .clone()
            .or_else(|| find_executable("python3"))
        else {
            return ProbeOutcome::NotFound("no python3 interpreter on PATH".to_string());
        };

        let output = match ProcessBuilder::new(&python)
            .args(["-c", FIND_SPEC_SCRIPT])
            .exec()
        {
            Ok(output) => output,
            Err(e) => return ProbeOutcome::NotFound(format!("{:#}", e)),
        };

        if !output.status.success() {
            return ProbeOutcome::NotFound(
                "the nvidia.nvshmem module is not installed".to_string(),
            );
        }

        let location = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if location.is_empty() {
            return ProbeOutcome::NotFound("nvidia.nvshmem has no package location".to_string());
        }

        match inspect_package_dir(Path::new(&location)) {
            Ok(install) => ProbeOutcome::Found(install),
            Err(reason) => ProbeOutcome::NotFound(reason),
        }
    }
}

/// Scan package roots (site-packages, `PYTHONPATH` entries) for the wheel.
#[derive(Debug, Clone, Default)]
pub struct SitePackagesStep {
    roots: Vec<PathBuf>,
}

impl SitePackagesStep {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        SitePackagesStep { roots }
    }
}

impl ProbeStep for SitePackagesStep {
    fn name(&self) -> &'static str {
        "site-packages"
    }

    fn probe(&self) -> ProbeOutcome {
        if self.roots.is_empty() {
            return ProbeOutcome::NotFound("no package roots configured".to_string());
        }

        let mut misses = Vec::new();
        for root in &self.roots {
            match inspect_package_dir(&root.join(PACKAGE_SUBDIR)) {
                Ok(install) => return ProbeOutcome::Found(install),
                Err(reason) => misses.push(reason),
            }
        }

        ProbeOutcome::NotFound(misses.join("; "))
    }
}
