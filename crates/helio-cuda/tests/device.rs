//! Integration tests against a real CUDA device.
//!
//! Every test gates on driver/device availability and skips cleanly on
//! machines without a GPU, so the suite is safe to run anywhere.
//!
//! Run with: cargo test -p helio-cuda --test device -- --nocapture

use std::sync::Arc;

use helio_core::cache;
use helio_core::command::{
    Command, CommandNode, EventStatus, HostPtr, HostRect, LaunchGeometry, Mapping,
};
use helio_core::config::CudaConfig;
use helio_core::error::CoreError;
use helio_core::kernel::{ArgKind, ArgValue, Kernel, Program};
use helio_core::memory::{MemFlags, MemObject};
use helio_cuda::driver::CudaDriver;
use helio_cuda::CudaDevice;

/// PTX fixture: doubles each 32-bit value of a buffer in place.
/// __global__ void double_u32(unsigned* buf, unsigned n) {
///     unsigned i = blockIdx.x * blockDim.x + threadIdx.x;
///     if (i < n) buf[i] *= 2;
/// }
const DOUBLE_U32_PTX: &str = r#"
.version 7.0
.target sm_50
.address_size 64

.visible .entry double_u32(
    .param .u64 buf,
    .param .u32 n
)
{
    .reg .pred %p<2>;
    .reg .b32 %r<7>;
    .reg .b64 %rd<4>;

    ld.param.u64 %rd1, [buf];
    ld.param.u32 %r1, [n];

    mov.u32 %r2, %ctaid.x;
    mov.u32 %r3, %ntid.x;
    mov.u32 %r4, %tid.x;
    mad.lo.s32 %r5, %r2, %r3, %r4;

    setp.ge.u32 %p1, %r5, %r1;
    @%p1 bra $done;

    cvta.to.global.u64 %rd2, %rd1;
    mul.wide.u32 %rd3, %r5, 4;
    add.s64 %rd2, %rd2, %rd3;

    ld.global.u32 %r6, [%rd2];
    shl.b32 %r6, %r6, 1;
    st.global.u32 [%rd2], %r6;

$done:
    ret;
}
"#;

fn test_device(cache_dir: Option<&std::path::Path>) -> Option<CudaDevice> {
    if CudaDevice::probe() == 0 {
        println!("no CUDA device available - skipping");
        return None;
    }
    let config = CudaConfig {
        cache_dir: cache_dir.map(|p| p.to_string_lossy().into_owned()),
        ..CudaConfig::default()
    };
    Some(CudaDevice::init(0, 0, 0, &config).expect("device init"))
}

fn submit(device: &CudaDevice, command: Command) -> CommandNode {
    let node = CommandNode::new(command);
    device.submit(&node);
    node
}

#[test]
fn driver_loads_and_reports_devices() {
    match CudaDriver::load() {
        Ok(driver) => {
            let version = driver.driver_get_version().expect("driver version");
            println!("CUDA driver version: {version}");
            println!("probe: {} device(s)", CudaDevice::probe());
        }
        Err(e) => {
            println!("CUDA driver not available (skipping): {e}");
        }
    }
}

#[test]
fn device_init_snapshot() {
    let Some(device) = test_device(None) else { return };
    let ctx = device.context();
    println!(
        "device: {} ({} CUs, arch {})",
        ctx.props.name, ctx.props.compute_units, ctx.arch
    );
    assert!(ctx.props.max_work_group_size > 0);
    assert!(ctx.global_mem_size > 0);
    assert!(ctx.max_alloc_size >= 128 * 1024 * 1024);
    assert!(ctx.max_alloc_size >= ctx.global_mem_size / 4);
    assert!(ctx.arch.starts_with("sm_"));
}

#[test]
fn linear_write_then_read_returns_same_bytes() {
    let Some(device) = test_device(None) else { return };

    let mem = Arc::new(MemObject::new(1, 8192, MemFlags::empty(), None));
    device.alloc_mem_obj(&mem).expect("alloc");

    // Write N bytes at offset O, read the same range back.
    let offset = 1024;
    let pattern: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    let node = submit(
        &device,
        Command::WriteBuffer {
            mem: Arc::clone(&mem),
            offset,
            size: pattern.len(),
            src: HostPtr(pattern.as_ptr() as *mut u8),
        },
    );
    assert_eq!(node.event.status(), EventStatus::Complete);
    let timeline = node.event.timeline();
    assert!(timeline.submitted_at.is_some() && timeline.complete_at.is_some());

    let mut readback = vec![0u8; pattern.len()];
    submit(
        &device,
        Command::ReadBuffer {
            mem: Arc::clone(&mem),
            offset,
            size: readback.len(),
            dst: HostPtr(readback.as_mut_ptr()),
        },
    );
    assert_eq!(readback, pattern);

    device.join();
    device.free_mem_obj(&mem);
}

#[test]
fn rect_roundtrip_with_padded_pitches() {
    let Some(device) = test_device(None) else { return };

    // Buffer laid out as 8 rows x 2 slices with 64-byte rows; host side uses
    // strictly larger pitches than the packed minimum.
    let mem = Arc::new(MemObject::new(2, 64 * 8 * 2, MemFlags::empty(), None));
    device.alloc_mem_obj(&mem).expect("alloc");

    let region = [16usize, 4, 2];
    let host_row_pitch = 24usize;
    let host_slice_pitch = host_row_pitch * 5;
    let rect = HostRect {
        buffer_origin: [8, 2, 0],
        host_origin: [4, 1, 0],
        region,
        buffer_row_pitch: 64,
        buffer_slice_pitch: 64 * 8,
        host_row_pitch,
        host_slice_pitch,
    };

    let src: Vec<u8> = (0..host_slice_pitch * 3).map(|i| (i % 241) as u8).collect();
    submit(
        &device,
        Command::WriteBufferRect {
            mem: Arc::clone(&mem),
            host: HostPtr(src.as_ptr() as *mut u8),
            rect,
        },
    );

    let mut dst = vec![0u8; src.len()];
    submit(
        &device,
        Command::ReadBufferRect {
            mem: Arc::clone(&mem),
            host: HostPtr(dst.as_mut_ptr()),
            rect,
        },
    );

    // Only the described region moved; compare it row by row.
    for z in 0..region[2] {
        for y in 0..region[1] {
            let row =
                (rect.host_origin[2] + z) * host_slice_pitch
                    + (rect.host_origin[1] + y) * host_row_pitch
                    + rect.host_origin[0];
            assert_eq!(
                &dst[row..row + region[0]],
                &src[row..row + region[0]],
                "row mismatch at y={y} z={z}"
            );
        }
    }

    device.free_mem_obj(&mem);
}

#[test]
fn self_copy_leaves_contents_unchanged() {
    let Some(device) = test_device(None) else { return };

    let mem = Arc::new(MemObject::new(3, 4096, MemFlags::empty(), None));
    device.alloc_mem_obj(&mem).expect("alloc");

    let pattern: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 256) as u8).collect();
    submit(
        &device,
        Command::WriteBuffer {
            mem: Arc::clone(&mem),
            offset: 0,
            size: pattern.len(),
            src: HostPtr(pattern.as_ptr() as *mut u8),
        },
    );

    submit(
        &device,
        Command::CopyBuffer {
            src: Arc::clone(&mem),
            dst: Arc::clone(&mem),
            src_offset: 0,
            dst_offset: 0,
            size: pattern.len(),
        },
    );

    let mut readback = vec![0u8; pattern.len()];
    submit(
        &device,
        Command::ReadBuffer {
            mem: Arc::clone(&mem),
            offset: 0,
            size: readback.len(),
            dst: HostPtr(readback.as_mut_ptr()),
        },
    );
    assert_eq!(readback, pattern);

    device.free_mem_obj(&mem);
}

#[test]
fn device_to_device_copy_moves_bytes() {
    let Some(device) = test_device(None) else { return };

    let src = Arc::new(MemObject::new(4, 2048, MemFlags::empty(), None));
    let dst = Arc::new(MemObject::new(5, 2048, MemFlags::empty(), None));
    device.alloc_mem_obj(&src).expect("alloc src");
    device.alloc_mem_obj(&dst).expect("alloc dst");

    let pattern: Vec<u8> = (0..2048u32).map(|i| (i % 199) as u8).collect();
    submit(
        &device,
        Command::WriteBuffer {
            mem: Arc::clone(&src),
            offset: 0,
            size: pattern.len(),
            src: HostPtr(pattern.as_ptr() as *mut u8),
        },
    );
    submit(
        &device,
        Command::CopyBuffer {
            src: Arc::clone(&src),
            dst: Arc::clone(&dst),
            src_offset: 512,
            dst_offset: 0,
            size: 1024,
        },
    );

    let mut readback = vec![0u8; 1024];
    submit(
        &device,
        Command::ReadBuffer {
            mem: Arc::clone(&dst),
            offset: 0,
            size: 1024,
            dst: HostPtr(readback.as_mut_ptr()),
        },
    );
    assert_eq!(&readback[..], &pattern[512..1536]);

    device.free_mem_obj(&src);
    device.free_mem_obj(&dst);
}

#[test]
fn map_of_device_only_buffer_stages_and_writes_back() {
    let Some(device) = test_device(None) else { return };

    let mem = Arc::new(MemObject::new(6, 1024, MemFlags::empty(), None));
    device.alloc_mem_obj(&mem).expect("alloc");

    let pattern = vec![0x5au8; 256];
    submit(
        &device,
        Command::WriteBuffer {
            mem: Arc::clone(&mem),
            offset: 128,
            size: pattern.len(),
            src: HostPtr(pattern.as_ptr() as *mut u8),
        },
    );

    let mapping = Arc::new(Mapping::new(128, 256));
    submit(
        &device,
        Command::MapBuffer {
            mem: Arc::clone(&mem),
            mapping: Arc::clone(&mapping),
        },
    );
    // Device-only objects map to a distinct staging address.
    assert!(mapping.is_staged());
    let ptr = mapping.host_ptr();
    assert!(!ptr.is_null());

    let staged = unsafe { std::slice::from_raw_parts_mut(ptr, 256) };
    assert_eq!(staged, &pattern[..]);
    staged.fill(0xa5);

    submit(
        &device,
        Command::UnmapBuffer {
            mem: Arc::clone(&mem),
            mapping: Arc::clone(&mapping),
        },
    );

    let mut readback = vec![0u8; 256];
    submit(
        &device,
        Command::ReadBuffer {
            mem: Arc::clone(&mem),
            offset: 128,
            size: 256,
            dst: HostPtr(readback.as_mut_ptr()),
        },
    );
    assert!(readback.iter().all(|&b| b == 0xa5));

    device.free_mem_obj(&mem);
}

#[test]
fn map_of_host_visible_buffer_returns_supplied_address() {
    let Some(device) = test_device(None) else { return };
    if !device.context().can_map_host {
        println!("host mapping unsupported here - skipping");
        return;
    }

    let mut backing = vec![7u8; 4096];
    let base = backing.as_mut_ptr();
    let mem = Arc::new(MemObject::new(7, backing.len(), MemFlags::USE_HOST_PTR, Some(base)));
    device.alloc_mem_obj(&mem).expect("alloc");

    let mapping = Arc::new(Mapping::new(64, 512));
    submit(
        &device,
        Command::MapBuffer {
            mem: Arc::clone(&mem),
            mapping: Arc::clone(&mapping),
        },
    );
    assert!(!mapping.is_staged());
    assert_eq!(mapping.host_ptr(), unsafe { base.add(64) });

    submit(
        &device,
        Command::UnmapBuffer {
            mem: Arc::clone(&mem),
            mapping: Arc::clone(&mapping),
        },
    );

    device.free_mem_obj(&mem);
    drop(backing);
}

#[test]
fn default_path_allocation_failure_is_recoverable() {
    let Some(device) = test_device(None) else { return };

    // Far beyond any device: the driver must refuse, and the refusal must
    // come back as a result instead of taking the process down.
    let mem = Arc::new(MemObject::new(8, 1usize << 46, MemFlags::empty(), None));
    match device.alloc_mem_obj(&mem) {
        Err(CoreError::AllocationFailure) => {}
        other => panic!("expected allocation failure, got {other:?}"),
    }
    // The object never became resident, so releasing it is a no-op.
    device.free_mem_obj(&mem);
}

#[test]
fn kernel_doubles_buffer_in_place() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let Some(device) = test_device(Some(tmp.path())) else { return };

    // Stage the program artifacts where the loader expects them; the module
    // is pre-seeded, so no external generator run is needed.
    let ir = b"double_u32 workgroup ir".to_vec();
    let program = Arc::new(Program::from_ir(1, &ir));
    let ir_path = cache::work_group_function_path(tmp.path(), &program, 0, "double_u32", (0, 0, 0));
    std::fs::create_dir_all(ir_path.parent().expect("parent")).expect("cache dirs");
    std::fs::write(&ir_path, &ir).expect("write ir");
    std::fs::write(cache::module_path(&ir_path), DOUBLE_U32_PTX).expect("write ptx");

    let kernel = Arc::new(Kernel::new(
        1,
        "double_u32",
        Arc::clone(&program),
        vec![ArgKind::GlobalPtr, ArgKind::Value],
        vec![],
    ));

    // 8 KiB buffer, 4 KiB of pattern data doubled in place.
    let mem = Arc::new(MemObject::new(9, 8192, MemFlags::empty(), None));
    device.alloc_mem_obj(&mem).expect("alloc");

    let n: u32 = 1024;
    let values: Vec<u32> = (0..n).map(|i| i * 3 + 1).collect();
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
    submit(
        &device,
        Command::WriteBuffer {
            mem: Arc::clone(&mem),
            offset: 0,
            size: bytes.len(),
            src: HostPtr(bytes.as_ptr() as *mut u8),
        },
    );

    let node = submit(
        &device,
        Command::NdRangeKernel {
            kernel: Arc::clone(&kernel),
            args: vec![
                ArgValue::Mem(Some(Arc::clone(&mem))),
                ArgValue::Value(n.to_ne_bytes().to_vec().into_boxed_slice()),
            ],
            geometry: LaunchGeometry {
                groups: [n / 256, 1, 1],
                local: [256, 1, 1],
            },
        },
    );
    assert_eq!(node.event.status(), EventStatus::Complete);
    let timeline = node.event.timeline();
    assert!(timeline.running_at.is_some(), "kernel commands mark running");

    device.join();

    let mut readback = vec![0u8; bytes.len()];
    submit(
        &device,
        Command::ReadBuffer {
            mem: Arc::clone(&mem),
            offset: 0,
            size: readback.len(),
            dst: HostPtr(readback.as_mut_ptr()),
        },
    );
    let result: Vec<u32> = readback
        .chunks_exact(4)
        .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    for (i, (&got, &wrote)) in result.iter().zip(&values).enumerate() {
        assert_eq!(got, wrote * 2, "element {i}");
    }

    // Second submit must reuse the cached function (no regeneration).
    device.compile_kernel(&kernel);
    assert!(kernel.artifact(0).is_some());

    device.free_mem_obj(&mem);
}

#[test]
fn flush_is_a_noop_and_join_blocks() {
    let Some(device) = test_device(None) else { return };
    device.flush();
    device.join();
}
