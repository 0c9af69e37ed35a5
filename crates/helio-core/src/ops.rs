use crate::command::{Command, CommandNode, CopyRect, HostRect, Mapping};
use crate::memory::MemObject;

/// Driver-facing operations a device backend implements. Kernel execution is
/// deliberately absent: backends intercept kernel commands in their own
/// submit path, and everything else goes through [`execute_immediate`].
///
/// Transfers are synchronous; a method returning means the bytes have moved.
pub trait DeviceOps {
    fn read(&self, mem: &MemObject, offset: usize, size: usize, dst: *mut u8);
    fn write(&self, mem: &MemObject, offset: usize, size: usize, src: *const u8);
    fn copy(
        &self,
        src: &MemObject,
        src_offset: usize,
        dst: &MemObject,
        dst_offset: usize,
        size: usize,
    );
    fn read_rect(&self, mem: &MemObject, host: *mut u8, rect: &HostRect);
    fn write_rect(&self, mem: &MemObject, host: *const u8, rect: &HostRect);
    fn copy_rect(&self, src: &MemObject, dst: &MemObject, rect: &CopyRect);
    fn map_mem(&self, mem: &MemObject, mapping: &Mapping);
    fn unmap_mem(&self, mem: &MemObject, mapping: &Mapping);
}

/// Immediate-execution path shared by backends for non-kernel commands: runs
/// the operation synchronously and completes the node's event in the same
/// call (no separate running/complete split).
pub fn execute_immediate(ops: &dyn DeviceOps, node: &CommandNode) {
    match &node.command {
        Command::ReadBuffer { mem, offset, size, dst } => {
            ops.read(mem, *offset, *size, dst.0);
        }
        Command::WriteBuffer { mem, offset, size, src } => {
            ops.write(mem, *offset, *size, src.0 as *const u8);
        }
        Command::CopyBuffer { src, dst, src_offset, dst_offset, size } => {
            ops.copy(src, *src_offset, dst, *dst_offset, *size);
        }
        Command::ReadBufferRect { mem, host, rect } => {
            ops.read_rect(mem, host.0, rect);
        }
        Command::WriteBufferRect { mem, host, rect } => {
            ops.write_rect(mem, host.0 as *const u8, rect);
        }
        Command::CopyBufferRect { src, dst, rect } => {
            ops.copy_rect(src, dst, rect);
        }
        Command::MapBuffer { mem, mapping } => {
            ops.map_mem(mem, mapping);
        }
        Command::UnmapBuffer { mem, mapping } => {
            ops.unmap_mem(mem, mapping);
        }
        Command::NdRangeKernel { .. } => {
            unreachable!("kernel commands are dispatched by the backend submit path")
        }
    }
    node.event.mark_complete();
}
