use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::memory::MemObject;

/// Kind of one kernel argument, in declaration order. Marshaling dispatches
/// on this closed set; future argument classes extend the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Plain by-value argument, passed through verbatim.
    Value,
    /// Pointer into global or constant memory.
    GlobalPtr,
    /// Pointer into work-group local memory, laid out at launch time.
    LocalPtr,
    Image,
    Sampler,
}

/// A bound argument value supplied by the scheduler.
#[derive(Clone)]
pub enum ArgValue {
    /// Raw bytes of a by-value argument.
    Value(Box<[u8]>),
    /// Buffer bound to a global/constant pointer argument; `None` passes a
    /// null device pointer.
    Mem(Option<Arc<MemObject>>),
    /// Byte size of an explicit local allocation.
    Local(usize),
}

/// A program as handed down by the scheduler: a compiled IR artifact the
/// device backends generate native modules from.
pub struct Program {
    pub id: u64,
    /// SHA-256 of the program IR; keys the on-disk artifact cache so
    /// distinct programs never collide.
    pub build_hash: String,
}

impl Program {
    pub fn from_ir(id: u64, ir: &[u8]) -> Self {
        let digest = Sha256::digest(ir);
        let build_hash = digest.iter().map(|b| format!("{b:02x}")).collect();
        Self { id, build_hash }
    }
}

/// A backend-resolved, launch-ready function handle. Opaque at this level;
/// the owning backend knows what the fields point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFunction {
    pub module: usize,
    pub function: usize,
}

/// One kernel of a program, with its per-device compiled-function slots.
pub struct Kernel {
    pub id: u64,
    pub name: String,
    pub program: Arc<Program>,
    /// Declared argument kinds, positional.
    pub args: Vec<ArgKind>,
    /// Compiler-inserted local allocations (byte sizes), appended after the
    /// explicit argument list at launch time.
    pub automatic_locals: Vec<usize>,
    artifacts: DashMap<u32, NativeFunction>,
}

impl Kernel {
    pub fn new(
        id: u64,
        name: impl Into<String>,
        program: Arc<Program>,
        args: Vec<ArgKind>,
        automatic_locals: Vec<usize>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            program,
            args,
            automatic_locals,
            artifacts: DashMap::new(),
        }
    }

    /// Launch-ready function for `device_index`, if already resolved.
    pub fn artifact(&self, device_index: u32) -> Option<NativeFunction> {
        self.artifacts.get(&device_index).map(|f| *f)
    }

    /// Idempotent insert into the device slot: the first resolution wins and
    /// is returned to every caller, racing or not.
    pub fn artifact_or_insert(&self, device_index: u32, f: NativeFunction) -> NativeFunction {
        *self.artifacts.entry(device_index).or_insert(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_hash_is_stable_and_content_keyed() {
        let a = Program::from_ir(1, b"kernel ir bytes");
        let b = Program::from_ir(2, b"kernel ir bytes");
        let c = Program::from_ir(3, b"different ir");
        assert_eq!(a.build_hash, b.build_hash);
        assert_ne!(a.build_hash, c.build_hash);
        assert_eq!(a.build_hash.len(), 64);
    }

    #[test]
    fn artifact_slot_first_insert_wins() {
        let program = Arc::new(Program::from_ir(1, b"ir"));
        let kernel = Kernel::new(7, "scale", program, vec![ArgKind::GlobalPtr], vec![]);
        assert!(kernel.artifact(0).is_none());

        let first = NativeFunction { module: 0x10, function: 0x20 };
        let second = NativeFunction { module: 0x30, function: 0x40 };
        assert_eq!(kernel.artifact_or_insert(0, first), first);
        assert_eq!(kernel.artifact_or_insert(0, second), first);
        assert_eq!(kernel.artifact(0), Some(first));
        // A different device resolves its own slot.
        assert_eq!(kernel.artifact_or_insert(1, second), second);
    }
}
