//! On-disk kernel-artifact cache layout.
//!
//! The scheduler-side compiler drops a kernel's work-group IR artifact at a
//! deterministic path; device backends place the generated native module
//! beside it. Paths are keyed by (program build hash, device index, kernel,
//! work-group-size hint) so distinct devices or programs never collide.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::kernel::Program;

/// Filesystem location of the work-group IR artifact for one
/// (program, device, kernel, work-group-size hint) tuple.
pub fn work_group_function_path(
    cache_dir: &Path,
    program: &Program,
    device_index: u32,
    kernel_name: &str,
    wg_hint: (u32, u32, u32),
) -> PathBuf {
    cache_dir
        .join(&program.build_hash)
        .join(device_index.to_string())
        .join(kernel_name)
        .join(format!("{}-{}-{}", wg_hint.0, wg_hint.1, wg_hint.2))
        .join(format!("{kernel_name}.bc"))
}

/// Location of the generated native module for an IR artifact: the IR path
/// with ".ptx" appended.
pub fn module_path(ir_path: &Path) -> PathBuf {
    let mut name = OsString::from(ir_path.as_os_str());
    name.push(".ptx");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_deterministic_and_collision_free() {
        let cache = Path::new("/var/cache/helio");
        let a = Program::from_ir(1, b"program a");
        let b = Program::from_ir(2, b"program b");

        let p = |prog: &Program, dev, kernel| {
            work_group_function_path(cache, prog, dev, kernel, (0, 0, 0))
        };

        assert_eq!(p(&a, 0, "scale"), p(&a, 0, "scale"));
        assert_ne!(p(&a, 0, "scale"), p(&b, 0, "scale"));
        assert_ne!(p(&a, 0, "scale"), p(&a, 1, "scale"));
        assert_ne!(p(&a, 0, "scale"), p(&a, 0, "offset"));
        assert_ne!(
            work_group_function_path(cache, &a, 0, "scale", (0, 0, 0)),
            work_group_function_path(cache, &a, 0, "scale", (64, 1, 1)),
        );
    }

    #[test]
    fn module_lives_beside_ir() {
        let ir = Path::new("/var/cache/helio/abc/0/scale/0-0-0/scale.bc");
        let ptx = module_path(ir);
        assert_eq!(ptx.parent(), ir.parent());
        assert!(ptx.to_string_lossy().ends_with("scale.bc.ptx"));
    }
}
