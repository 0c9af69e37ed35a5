use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::kernel::{ArgValue, Kernel};
use crate::memory::MemObject;

/// Lifecycle of a command's completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventStatus {
    #[default]
    Queued,
    Submitted,
    Running,
    Complete,
}

#[derive(Debug, Default)]
struct EventInner {
    status: EventStatus,
    submitted_at: Option<Instant>,
    running_at: Option<Instant>,
    complete_at: Option<Instant>,
}

/// Completion event attached to a command node. The executor is the only
/// writer; it advances the state monotonically and stamps each transition.
#[derive(Debug, Default)]
pub struct Event {
    inner: Mutex<EventInner>,
}

/// Snapshot of an event's transition timestamps.
#[derive(Debug, Clone, Copy)]
pub struct EventTimeline {
    pub submitted_at: Option<Instant>,
    pub running_at: Option<Instant>,
    pub complete_at: Option<Instant>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> EventStatus {
        self.inner.lock().status
    }

    pub fn mark_submitted(&self) {
        let mut inner = self.inner.lock();
        inner.status = EventStatus::Submitted;
        inner.submitted_at = Some(Instant::now());
    }

    pub fn mark_running(&self) {
        let mut inner = self.inner.lock();
        inner.status = EventStatus::Running;
        inner.running_at = Some(Instant::now());
    }

    pub fn mark_complete(&self) {
        let mut inner = self.inner.lock();
        inner.status = EventStatus::Complete;
        inner.complete_at = Some(Instant::now());
    }

    pub fn timeline(&self) -> EventTimeline {
        let inner = self.inner.lock();
        EventTimeline {
            submitted_at: inner.submitted_at,
            running_at: inner.running_at,
            complete_at: inner.complete_at,
        }
    }
}

/// Raw host address carried by a transfer command. The scheduler guarantees
/// the allocation outlives the command's execution.
#[derive(Debug, Clone, Copy)]
pub struct HostPtr(pub *mut u8);

// SAFETY: a HostPtr is only dereferenced by the backend executing the
// command, under the upstream scheduler's ordering guarantees.
unsafe impl Send for HostPtr {}
unsafe impl Sync for HostPtr {}

/// 3-D launch decomposition: group counts and per-group work-item sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    pub groups: [u32; 3],
    pub local: [u32; 3],
}

/// Origin/region/pitch parameters of one host↔device rectangular transfer.
/// Region width is in bytes, height in rows, depth in slices.
#[derive(Debug, Clone, Copy)]
pub struct HostRect {
    pub buffer_origin: [usize; 3],
    pub host_origin: [usize; 3],
    pub region: [usize; 3],
    pub buffer_row_pitch: usize,
    pub buffer_slice_pitch: usize,
    pub host_row_pitch: usize,
    pub host_slice_pitch: usize,
}

/// Origin/region/pitch parameters of one device↔device rectangular copy.
#[derive(Debug, Clone, Copy)]
pub struct CopyRect {
    pub src_origin: [usize; 3],
    pub dst_origin: [usize; 3],
    pub region: [usize; 3],
    pub src_row_pitch: usize,
    pub src_slice_pitch: usize,
    pub dst_row_pitch: usize,
    pub dst_slice_pitch: usize,
}

/// An in-flight map of a buffer sub-range. The backend records the
/// host-visible address here; `staged` distinguishes a staging copy (written
/// back and released at unmap) from a directly host-visible pointer.
#[derive(Debug)]
pub struct Mapping {
    pub offset: usize,
    pub size: usize,
    ptr: AtomicPtr<u8>,
    staged: AtomicBool,
}

impl Mapping {
    pub fn new(offset: usize, size: usize) -> Self {
        Self {
            offset,
            size,
            ptr: AtomicPtr::new(std::ptr::null_mut()),
            staged: AtomicBool::new(false),
        }
    }

    pub fn record(&self, ptr: *mut u8, staged: bool) {
        self.staged.store(staged, Ordering::Release);
        self.ptr.store(ptr, Ordering::Release);
    }

    pub fn host_ptr(&self) -> *mut u8 {
        self.ptr.load(Ordering::Acquire)
    }

    pub fn is_staged(&self) -> bool {
        self.staged.load(Ordering::Acquire)
    }

    /// Clear and return the recorded address (unmap consumes the mapping).
    pub fn take(&self) -> *mut u8 {
        self.ptr.swap(std::ptr::null_mut(), Ordering::AcqRel)
    }
}

/// One unit of work handed down by the scheduler.
pub enum Command {
    NdRangeKernel {
        kernel: Arc<Kernel>,
        args: Vec<ArgValue>,
        geometry: LaunchGeometry,
    },
    ReadBuffer {
        mem: Arc<MemObject>,
        offset: usize,
        size: usize,
        dst: HostPtr,
    },
    WriteBuffer {
        mem: Arc<MemObject>,
        offset: usize,
        size: usize,
        src: HostPtr,
    },
    CopyBuffer {
        src: Arc<MemObject>,
        dst: Arc<MemObject>,
        src_offset: usize,
        dst_offset: usize,
        size: usize,
    },
    ReadBufferRect {
        mem: Arc<MemObject>,
        host: HostPtr,
        rect: HostRect,
    },
    WriteBufferRect {
        mem: Arc<MemObject>,
        host: HostPtr,
        rect: HostRect,
    },
    CopyBufferRect {
        src: Arc<MemObject>,
        dst: Arc<MemObject>,
        rect: CopyRect,
    },
    MapBuffer {
        mem: Arc<MemObject>,
        mapping: Arc<Mapping>,
    },
    UnmapBuffer {
        mem: Arc<MemObject>,
        mapping: Arc<Mapping>,
    },
}

/// A command plus its completion event. Owned by the scheduler; a backend
/// only transitions the event and never retains the node past execution.
pub struct CommandNode {
    pub command: Command,
    pub event: Event,
}

impl CommandNode {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            event: Event::new(),
        }
    }
}
