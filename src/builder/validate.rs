//! Plan validation.
//!
//! Re-checks an assembled plan against the flags it was built from. Every
//! violation is collected rather than stopping at the first, so one run
//! reports everything wrong with a plan.

use std::collections::HashSet;
use std::path::Path;

use crate::builder::plan::{defines, BuildPlan, SourceUnit, BASE_INCLUDE_DIR, BASE_LINK_FLAGS};
use crate::core::arch::ArchList;
use crate::core::features::{ArchGeneration, FeatureFlags};
use crate::probe::DEVICE_STATIC_LIBRARY;
use crate::resolver::InvariantViolation;

/// Validate a plan against resolved flags.
pub fn validate(plan: &BuildPlan, flags: &FeatureFlags) -> Result<(), InvariantViolation> {
    let mut errors = Vec::new();

    if plan.features != *flags {
        errors.push(InvariantViolation::FlagsMismatch);
    }

    check_sources(plan, flags, &mut errors);
    check_accelerator(plan, flags, &mut errors);

    for (stage, stage_flags) in [
        ("host", &plan.compile_flags.cxx),
        ("device", &plan.compile_flags.nvcc),
    ] {
        check_definitions(stage, stage_flags, flags, &mut errors);
    }

    if plan.arch_list.trim().is_empty() {
        errors.push(InvariantViolation::EmptyArch);
    } else {
        match plan.arch_list.parse::<ArchList>() {
            Ok(arch) => {
                if let Err(e) = flags.check(&arch) {
                    errors.push(e);
                }
            }
            Err(e) => errors.push(InvariantViolation::Sources {
                reason: format!("architecture descriptor `{}`: {}", plan.arch_list, e),
            }),
        }
    }

    match InvariantViolation::collect(errors) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn check_sources(plan: &BuildPlan, flags: &FeatureFlags, errors: &mut Vec<InvariantViolation>) {
    let mut seen = HashSet::new();
    for unit in &plan.sources {
        if !seen.insert(unit) {
            errors.push(InvariantViolation::Sources {
                reason: format!("`{}` listed more than once", unit.path()),
            });
        }
    }

    if !plan.sources.starts_with(&SourceUnit::BASE) {
        errors.push(InvariantViolation::Sources {
            reason: "base sources missing or out of order".to_string(),
        });
    }

    for unit in SourceUnit::ACCELERATOR {
        if plan.sources.contains(&unit) != flags.accelerator_enabled {
            errors.push(InvariantViolation::AcceleratorMismatch {
                what: "source",
                item: unit.path().to_string(),
                enabled: flags.accelerator_enabled,
            });
        }
    }
}

fn check_accelerator(plan: &BuildPlan, flags: &FeatureFlags, errors: &mut Vec<InvariantViolation>) {
    let enabled = flags.accelerator_enabled;
    let mismatch = |what: &'static str, item: String| InvariantViolation::AcceleratorMismatch {
        what,
        item,
        enabled,
    };

    match (&plan.nvshmem_dir, enabled) {
        (Some(root), true) => check_accelerator_items(plan, root, errors),
        (Some(root), false) => errors.push(mismatch("NVSHMEM root", root.display().to_string())),
        (None, true) => errors.push(mismatch("NVSHMEM root", "<none>".to_string())),
        (None, false) => {}
    }

    if enabled {
        return;
    }

    // Without NVSHMEM only the base search paths and link flags remain.
    for dir in &plan.include_dirs {
        if dir != Path::new(BASE_INCLUDE_DIR) {
            errors.push(mismatch("include dir", dir.display().to_string()));
        }
    }
    for dir in &plan.library_dirs {
        errors.push(mismatch("library dir", dir.display().to_string()));
    }
    if let Some(dlink) = &plan.compile_flags.nvcc_dlink {
        errors.push(mismatch("device link stage", dlink.join(" ")));
    }
    for flag in &plan.link_flags {
        if !BASE_LINK_FLAGS.contains(&flag.as_str()) {
            errors.push(mismatch("link flag", flag.clone()));
        }
    }
}

/// Everything an NVSHMEM install at `root` must contribute to the plan.
fn check_accelerator_items(plan: &BuildPlan, root: &Path, errors: &mut Vec<InvariantViolation>) {
    let mismatch = |what: &'static str, item: String| InvariantViolation::AcceleratorMismatch {
        what,
        item,
        enabled: true,
    };
    let include_dir = root.join("include");
    let lib_dir = root.join("lib");

    if !plan.include_dirs.contains(&include_dir) {
        errors.push(mismatch("include dir", include_dir.display().to_string()));
    }

    if plan.library_dirs != [lib_dir.clone()] {
        errors.push(mismatch("library dir", lib_dir.display().to_string()));
    }

    let dlink = vec![
        "-dlink".to_string(),
        format!("-L{}", lib_dir.display()),
        "-lnvshmem_device".to_string(),
    ];
    if plan.compile_flags.nvcc_dlink.as_ref() != Some(&dlink) {
        errors.push(mismatch("device link stage", dlink.join(" ")));
    }

    let device_lib = format!("-l:{}", DEVICE_STATIC_LIBRARY);
    let rpath = format!("-Wl,-rpath,{}", lib_dir.display());
    for required in [&device_lib, &rpath] {
        if !plan.link_flags.contains(required) {
            errors.push(mismatch("link flag", required.clone()));
        }
    }

    let runtime: Vec<&String> = plan
        .link_flags
        .iter()
        .filter(|f| f.starts_with("-l:") && **f != device_lib)
        .collect();
    if runtime.len() != 1 {
        errors.push(mismatch(
            "runtime link flag",
            format!("{} `-l:` runtime libraries", runtime.len()),
        ));
    }
}

fn check_definitions(
    stage: &'static str,
    stage_flags: &[String],
    flags: &FeatureFlags,
    errors: &mut Vec<InvariantViolation>,
) {
    let bare = |name: &'static str, expected: bool, errors: &mut Vec<InvariantViolation>| {
        let flag = format!("-D{}", name);
        let present = stage_flags.iter().any(|f| *f == flag);
        if present != expected {
            errors.push(InvariantViolation::DefinitionPresence {
                stage,
                name,
                present,
            });
        }
    };
    bare(defines::DISABLE_NVSHMEM, !flags.accelerator_enabled, errors);
    bare(
        defines::DISABLE_SM90_FEATURES,
        flags.arch_generation == ArchGeneration::Legacy,
        errors,
    );

    let valued = [
        (
            defines::DISABLE_AGGRESSIVE_PTX_INSTRS,
            u8::from(!flags.aggressive_instr_enabled).to_string(),
        ),
        (defines::TOPK_IDX_BITS, flags.index_width.to_string()),
    ];
    for (name, expected) in valued {
        let prefix = format!("-D{}=", name);
        let values: Vec<&str> = stage_flags
            .iter()
            .filter_map(|f| f.strip_prefix(&prefix))
            .collect();

        match values.as_slice() {
            [found] if *found == expected => {}
            [found] => errors.push(InvariantViolation::DefinitionValue {
                stage,
                name,
                expected,
                found: found.to_string(),
            }),
            _ => errors.push(InvariantViolation::DefinitionCount {
                stage,
                name,
                count: values.len(),
            }),
        }
    }
}
