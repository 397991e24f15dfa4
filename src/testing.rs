//! In-memory doubles for the kernel services the system-call layer uses.

use std::cell::UnsafeCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use spin::Mutex;

use crate::config::{regions, Config, SYSCALL_VECTOR};
use crate::console::{Console, InputDevice, PowerControl};
use crate::fs::{FileSystem, FsError, FsGuard, OpenFile};
use crate::mm::{KernelAddr, Mapping, PageDirectory, PageFlags, VirtAddr, PAGE_SIZE};
use crate::process::{Pid, Process, ProcessManager};
use crate::{Devices, Disposition, InterruptFrame, Kernel};

struct Page(UnsafeCell<[u8; PAGE_SIZE]>);

// SAFETY: tests only touch page contents from one thread at a time
unsafe impl Sync for Page {}

impl Page {
    fn new() -> Arc<Self> {
        Arc::new(Self(UnsafeCell::new([0; PAGE_SIZE])))
    }

    fn base(&self) -> *mut u8 {
        self.0.get() as *mut u8
    }
}

/// Page directory backed by heap pages. Clones share the same pages.
#[derive(Clone, Default)]
pub struct TestAddressSpace {
    pages: Arc<Mutex<BTreeMap<usize, (Arc<Page>, PageFlags)>>>,
}

impl TestAddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `count` zeroed user pages starting at page-aligned `base`.
    pub fn map(&mut self, base: usize, count: usize, writable: bool) {
        let mut flags = PageFlags::PRESENT | PageFlags::USER;
        if writable {
            flags |= PageFlags::WRITABLE;
        }
        self.map_with(base, count, flags);
    }

    /// Map a page the kernel has but user mode may not touch.
    pub fn map_kernel_only(&mut self, base: usize) {
        self.map_with(base, 1, PageFlags::PRESENT | PageFlags::WRITABLE);
    }

    /// Map `count` writable user pages that all share one frame.
    pub fn map_alias(&mut self, base: usize, count: usize) {
        assert_eq!(base % PAGE_SIZE, 0);
        let frame = Page::new();
        let flags = PageFlags::PRESENT | PageFlags::USER | PageFlags::WRITABLE;
        let mut pages = self.pages.lock();
        for i in 0..count {
            pages.insert(base + i * PAGE_SIZE, (Arc::clone(&frame), flags));
        }
    }

    fn map_with(&mut self, base: usize, count: usize, flags: PageFlags) {
        assert_eq!(base % PAGE_SIZE, 0);
        let mut pages = self.pages.lock();
        for i in 0..count {
            pages.insert(base + i * PAGE_SIZE, (Page::new(), flags));
        }
    }

    fn page(&self, addr: usize) -> Arc<Page> {
        let pages = self.pages.lock();
        let (page, _) = pages
            .get(&(addr & !(PAGE_SIZE - 1)))
            .unwrap_or_else(|| panic!("test wrote to unmapped {:#x}", addr));
        Arc::clone(page)
    }

    /// Store bytes at a user address, ignoring page permissions.
    pub fn write(&mut self, addr: usize, bytes: &[u8]) {
        let mut done = 0;
        while done < bytes.len() {
            let at = addr + done;
            let offset = at % PAGE_SIZE;
            let n = (PAGE_SIZE - offset).min(bytes.len() - done);
            let page = self.page(at);
            // SAFETY: offset + n <= PAGE_SIZE; no kernel call is running
            unsafe {
                std::ptr::copy_nonoverlapping(bytes[done..].as_ptr(), page.base().add(offset), n);
            }
            done += n;
        }
    }

    /// Load bytes from a user address.
    pub fn read(&self, addr: usize, len: usize) -> Vec<u8> {
        let mut out = vec![0; len];
        let mut done = 0;
        while done < len {
            let at = addr + done;
            let offset = at % PAGE_SIZE;
            let n = (PAGE_SIZE - offset).min(len - done);
            let page = self.page(at);
            // SAFETY: offset + n <= PAGE_SIZE; no kernel call is running
            unsafe {
                std::ptr::copy_nonoverlapping(page.base().add(offset), out[done..].as_mut_ptr(), n);
            }
            done += n;
        }
        out
    }
}

// SAFETY: pages are never unmapped and live as long as any clone of the
// space, so returned frames stay valid while the directory is borrowed.
unsafe impl PageDirectory for TestAddressSpace {
    fn lookup(&self, page: VirtAddr) -> Option<Mapping> {
        let pages = self.pages.lock();
        let (frame, flags) = pages.get(&page.as_usize())?;
        Some(Mapping {
            frame: KernelAddr::new(frame.base()),
            flags: *flags,
        })
    }
}

#[derive(Debug, Default)]
struct FsStats {
    open: AtomicUsize,
    failing_close: Mutex<BTreeSet<String>>,
}

/// Flat in-memory filesystem. Files have a fixed size, like the ones
/// `create` makes.
#[derive(Debug, Default)]
pub struct MemFs {
    files: BTreeMap<String, Arc<Mutex<Vec<u8>>>>,
    stats: Arc<FsStats>,
    busy: AtomicBool,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Files opened and not yet closed.
    pub fn open_count(&self) -> usize {
        self.stats.open.load(Ordering::SeqCst)
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.get(name).map(|data| data.lock().clone())
    }

    pub fn put(&mut self, name: &str, contents: &[u8]) {
        self.files
            .insert(name.to_string(), Arc::new(Mutex::new(contents.to_vec())));
    }

    /// Make every later close of `name` report failure.
    pub fn fail_close_of(&self, name: &str) {
        self.stats.failing_close.lock().insert(name.to_string());
    }

    /// Mark the filesystem busy; false if it already was.
    pub fn enter(&self) -> bool {
        !self.busy.swap(true, Ordering::SeqCst)
    }

    pub fn leave(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

impl FileSystem for MemFs {
    type File = MemFile;

    fn create(&mut self, name: &str, initial_size: u32) -> bool {
        if name.is_empty() || self.exists(name) {
            return false;
        }
        self.put(name, &vec![0; initial_size as usize]);
        true
    }

    fn remove(&mut self, name: &str) -> bool {
        self.files.remove(name).is_some()
    }

    fn open(&mut self, name: &str) -> Option<MemFile> {
        let data = self.files.get(name)?;
        self.stats.open.fetch_add(1, Ordering::SeqCst);
        Some(MemFile {
            name: name.to_string(),
            data: Arc::clone(data),
            pos: 0,
            stats: Arc::clone(&self.stats),
        })
    }
}

#[derive(Debug)]
pub struct MemFile {
    name: String,
    data: Arc<Mutex<Vec<u8>>>,
    pos: u32,
    stats: Arc<FsStats>,
}

impl OpenFile for MemFile {
    fn length(&self) -> u32 {
        self.data.lock().len() as u32
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let data = self.data.lock();
        let start = (self.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u32;
        n
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let mut data = self.data.lock();
        let start = (self.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        data[start..start + n].copy_from_slice(&buf[..n]);
        self.pos += n as u32;
        n
    }

    fn seek(&mut self, position: u32) {
        self.pos = position;
    }

    fn tell(&self) -> u32 {
        self.pos
    }

    fn close(self) -> Result<(), FsError> {
        self.stats.open.fetch_sub(1, Ordering::SeqCst);
        if self.stats.failing_close.lock().contains(&self.name) {
            return Err(FsError::CloseFailed);
        }
        Ok(())
    }
}

/// Console that keeps everything written to it.
#[derive(Default)]
pub struct RecordingConsole {
    writes: Mutex<Vec<Vec<u8>>>,
}

impl RecordingConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.writes.lock().concat()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }
}

impl Console for RecordingConsole {
    fn write(&self, bytes: &[u8]) {
        self.writes.lock().push(bytes.to_vec());
    }
}

/// Input device that replays queued bytes.
#[derive(Default)]
pub struct ScriptedInput {
    queue: Mutex<VecDeque<u8>>,
}

impl ScriptedInput {
    pub fn push(&self, bytes: &[u8]) {
        self.queue.lock().extend(bytes.iter().copied());
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().len()
    }
}

impl InputDevice for ScriptedInput {
    fn read_byte(&self) -> u8 {
        self.queue.lock().pop_front().unwrap_or(0)
    }
}

#[derive(Default)]
pub struct TestPower {
    off: AtomicBool,
}

impl TestPower {
    pub fn is_off(&self) -> bool {
        self.off.load(Ordering::SeqCst)
    }
}

impl PowerControl for TestPower {
    fn power_off(&self) {
        self.off.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ProcState {
    next_pid: i32,
    launched: Vec<String>,
    children: BTreeMap<Pid, (Pid, i32)>,
    fs_locked_during_load: bool,
}

/// Process service: a command "starts" if its program file exists.
/// Every child "exits" with its pid times ten.
#[derive(Clone)]
pub struct TestProcesses {
    state: Arc<Mutex<ProcState>>,
    parent: Pid,
}

impl TestProcesses {
    pub fn new(parent: Pid) -> Self {
        let procs = Self {
            state: Arc::default(),
            parent,
        };
        procs.state.lock().next_pid = 100;
        procs
    }

    pub fn launched(&self) -> Vec<String> {
        self.state.lock().launched.clone()
    }

    pub fn fs_locked_during_load(&self) -> bool {
        self.state.lock().fs_locked_during_load
    }
}

impl ProcessManager<MemFs> for TestProcesses {
    fn execute(&self, cmd_line: &str, fs: &FsGuard<MemFs>) -> Option<Pid> {
        let program = cmd_line.split_whitespace().next()?;
        let (loaded, locked) = fs.with_lock(|inner| (inner.exists(program), fs.is_locked()));
        let mut state = self.state.lock();
        state.fs_locked_during_load |= locked;
        if !loaded {
            return None;
        }
        let pid = Pid::new(state.next_pid);
        state.next_pid += 1;
        state.launched.push(cmd_line.to_string());
        state.children.insert(pid, (self.parent, pid.as_i32() * 10));
        Some(pid)
    }

    fn wait(&self, parent: Pid, child: Pid) -> Option<i32> {
        let mut state = self.state.lock();
        match state.children.get(&child) {
            Some((owner, _)) if *owner == parent => {}
            _ => return None,
        }
        state.children.remove(&child).map(|(_, status)| status)
    }
}

/// Stack pointer used for test traps.
pub const ESP: usize = regions::KERNEL_SPLIT - 256;
/// Start of four writable data pages.
pub const DATA: usize = 0x0805_0000;
/// One read-only code page.
pub const CODE: usize = regions::USER_BASE;
/// Value `eax` holds before a trap.
pub const UNTOUCHED: u32 = 0x5A5A_5A5A;

/// A kernel with one process and in-memory devices.
pub struct Harness {
    pub kernel: Kernel<MemFs>,
    pub process: Process<MemFs>,
    pub space: TestAddressSpace,
    pub console: Arc<RecordingConsole>,
    pub input: Arc<ScriptedInput>,
    pub power: Arc<TestPower>,
    pub procs: TestProcesses,
}

impl Harness {
    pub fn new(name: &str) -> Self {
        let pid = Pid::new(7);
        let console = Arc::new(RecordingConsole::new());
        let input = Arc::new(ScriptedInput::default());
        let power = Arc::new(TestPower::default());
        let procs = TestProcesses::new(pid);

        let devices = Devices {
            console: Arc::clone(&console) as Arc<dyn Console>,
            input: Arc::clone(&input) as Arc<dyn InputDevice>,
            power: Arc::clone(&power) as Arc<dyn PowerControl>,
        };
        let kernel = Kernel::new(Config::default(), MemFs::new(), devices, Box::new(procs.clone()));

        let mut space = TestAddressSpace::new();
        space.map(regions::KERNEL_SPLIT - PAGE_SIZE, 1, true);
        space.map(DATA, 4, true);
        space.map(CODE, 1, false);
        let process = kernel.new_process(pid, name, Box::new(space.clone()));

        Self {
            kernel,
            process,
            space,
            console,
            input,
            power,
            procs,
        }
    }

    /// Push `words` (call number first) at [`ESP`] and build the trap frame.
    pub fn frame(&mut self, words: &[u32]) -> InterruptFrame {
        for (i, word) in words.iter().enumerate() {
            self.space.write(ESP + i * 4, &word.to_le_bytes());
        }
        let mut frame = InterruptFrame::syscall(SYSCALL_VECTOR, ESP as u32);
        frame.eax = UNTOUCHED;
        frame
    }

    /// Trap with `words` on the stack; returns the disposition and `eax`.
    pub fn syscall(&mut self, words: &[u32]) -> (Disposition, u32) {
        let mut frame = self.frame(words);
        let disposition = self.kernel.dispatch(&mut self.process, &mut frame);
        (disposition, frame.eax)
    }

    /// Like [`Self::syscall`] for calls that must resume; returns `eax` as
    /// a signed value.
    pub fn call(&mut self, words: &[u32]) -> i32 {
        let (disposition, eax) = self.syscall(words);
        assert_eq!(disposition, Disposition::Resume, "call {:?}", words);
        eax as i32
    }

    /// Store a NUL-terminated string in user memory; returns its address.
    pub fn put_str(&mut self, addr: usize, s: &str) -> u32 {
        self.space.write(addr, s.as_bytes());
        self.space.write(addr + s.len(), &[0]);
        addr as u32
    }

    /// Run `op` on the filesystem under the guard.
    pub fn fs<R>(&self, op: impl FnOnce(&mut MemFs) -> R) -> R {
        self.kernel.fs().with_lock(op)
    }
}
