#![allow(unsafe_code)]

//! Scoped advisory locks guarding repository mutation.
//!
//! Two nested locks exist: the coarse working-state lock (`wlock`) guarding
//! the working position and in-progress evolve state, and the store lock
//! (`lock`) guarding changeset creation and marker appends. Both are
//! re-entrant within one handle and released when their guard drops.
//! Repositories backed by a directory also take an OS byte-range lock on a
//! lock file per slot, so a second handle or process fails fast. The OS
//! drops those locks when the holder exits, so a killed process never
//! leaves the repository locked.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{const_mutex, Mutex};
use tracing::debug;

use crate::types::{EvolveError, Result};

const WLOCK_FILE: &str = "wlock";
const STORE_LOCK_FILE: &str = "lock";
const LOCK_START: u64 = 0;
const LOCK_LEN: u64 = 1;

/// Lock files held by this process. Record locks do not conflict within one
/// process, so handles on the same repository are excluded here.
static HELD: Mutex<Vec<PathBuf>> = const_mutex(Vec::new());

/// Lock coordinator shared by every clone of one repository handle.
#[derive(Clone)]
pub struct RepoLocks {
    inner: Arc<Inner>,
}

struct Inner {
    dir: Option<PathBuf>,
    state: Mutex<LockState>,
}

#[derive(Default)]
struct LockState {
    working: u32,
    store: u32,
    working_file: Option<HeldFile>,
    store_file: Option<HeldFile>,
}

/// Snapshot of lock depths for observability and tests.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSnapshot {
    /// Re-entrant depth of the working-state lock.
    pub working: u32,
    /// Re-entrant depth of the store lock.
    pub store: u32,
}

/// Guard representing a held working-state lock.
pub struct WorkingLockGuard {
    _guard: SlotGuard,
}

/// Guard representing a held store lock.
pub struct StoreLockGuard {
    _guard: SlotGuard,
}

impl RepoLocks {
    /// Locks that only exist inside this process.
    pub fn in_memory() -> Self {
        Self::build(None)
    }

    /// Locks that are also taken on lock files inside `dir`.
    pub fn on_disk(dir: impl AsRef<Path>) -> Self {
        Self::build(Some(dir.as_ref().to_path_buf()))
    }

    fn build(dir: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                dir,
                state: Mutex::new(LockState::default()),
            }),
        }
    }

    /// Acquires the working-state lock.
    ///
    /// Fails when only the store lock is held: the working lock must always
    /// be taken first.
    pub fn wlock(&self) -> Result<WorkingLockGuard> {
        let mut state = self.inner.state.lock();
        if state.working == 0 && state.store > 0 {
            return Err(EvolveError::Lock(
                "working-state lock requested while holding the store lock".into(),
            ));
        }
        if state.working == 0 {
            state.working_file = self.inner.acquire_file(Slot::Working)?;
        }
        state.working += 1;
        Ok(WorkingLockGuard {
            _guard: SlotGuard::new(self.inner.clone(), Slot::Working),
        })
    }

    /// Acquires the store lock.
    pub fn lock(&self) -> Result<StoreLockGuard> {
        let mut state = self.inner.state.lock();
        if state.store == 0 {
            state.store_file = self.inner.acquire_file(Slot::Store)?;
        }
        state.store += 1;
        Ok(StoreLockGuard {
            _guard: SlotGuard::new(self.inner.clone(), Slot::Store),
        })
    }

    /// Returns a snapshot of the current lock depths.
    pub fn snapshot(&self) -> LockSnapshot {
        let state = self.inner.state.lock();
        LockSnapshot {
            working: state.working,
            store: state.store,
        }
    }
}

impl Inner {
    fn acquire_file(&self, slot: Slot) -> Result<Option<HeldFile>> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        let path = dir.join(slot.file_name());
        let mut held = HELD.lock();
        if held.contains(&path) {
            return Err(busy(&path));
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        if !lock_region(&file, LOCK_START, LOCK_LEN)? {
            return Err(busy(&path));
        }
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        held.push(path.clone());
        Ok(Some(HeldFile { path, file }))
    }
}

fn busy(path: &Path) -> EvolveError {
    EvolveError::Lock(format!("{} is held by another process", path.display()))
}

/// An OS lock on one lock file, released on drop.
struct HeldFile {
    path: PathBuf,
    file: File,
}

impl Drop for HeldFile {
    fn drop(&mut self) {
        if let Err(err) = unlock_region(&self.file, LOCK_START, LOCK_LEN) {
            debug!(path = %self.path.display(), error = %err, "locks.release.unlock_failed");
        }
        HELD.lock().retain(|p| p != &self.path);
    }
}

struct SlotGuard {
    inner: Arc<Inner>,
    slot: Slot,
}

impl SlotGuard {
    fn new(inner: Arc<Inner>, slot: Slot) -> Self {
        Self { inner, slot }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let released = {
            let mut state = self.inner.state.lock();
            let state = &mut *state;
            let (depth, file) = match self.slot {
                Slot::Working => (&mut state.working, &mut state.working_file),
                Slot::Store => (&mut state.store, &mut state.store_file),
            };
            *depth = depth.saturating_sub(1);
            if *depth == 0 {
                file.take()
            } else {
                None
            }
        };
        drop(released);
    }
}

#[derive(Copy, Clone, Debug)]
enum Slot {
    Working,
    Store,
}

impl Slot {
    fn file_name(self) -> &'static str {
        match self {
            Slot::Working => WLOCK_FILE,
            Slot::Store => STORE_LOCK_FILE,
        }
    }
}

fn lock_region(file: &File, start: u64, len: u64) -> io::Result<bool> {
    #[cfg(unix)]
    {
        unix::lock_region(file, start, len)
    }
    #[cfg(windows)]
    {
        windows::lock_region(file, start, len)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = (file, start, len);
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "file locking unsupported on this platform",
        ))
    }
}

fn unlock_region(file: &File, start: u64, len: u64) -> io::Result<()> {
    #[cfg(unix)]
    {
        unix::unlock_region(file, start, len)
    }
    #[cfg(windows)]
    {
        windows::unlock_region(file, start, len)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = (file, start, len);
        Ok(())
    }
}

#[cfg(unix)]
mod unix {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    fn region(l_type: libc::c_short, start: u64, len: u64) -> libc::flock {
        // SAFETY: `flock` is plain old data; every field we rely on is set below.
        let mut flock: libc::flock = unsafe { std::mem::zeroed() };
        flock.l_type = l_type;
        flock.l_whence = libc::SEEK_SET as _;
        flock.l_start = start as libc::off_t;
        flock.l_len = len as libc::off_t;
        flock
    }

    pub fn lock_region(file: &File, start: u64, len: u64) -> io::Result<bool> {
        let fd = file.as_raw_fd();
        let mut flock = region(libc::F_WRLCK as libc::c_short, start, len);
        loop {
            // SAFETY: `fd` is open for the lifetime of `file` and `flock` is valid.
            let res = unsafe { libc::fcntl(fd, libc::F_SETLK, &mut flock) };
            if res == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::EAGAIN) | Some(libc::EACCES) => return Ok(false),
                _ => return Err(err),
            }
        }
    }

    pub fn unlock_region(file: &File, start: u64, len: u64) -> io::Result<()> {
        let fd = file.as_raw_fd();
        let mut flock = region(libc::F_UNLCK as libc::c_short, start, len);
        // SAFETY: as in `lock_region`.
        let res = unsafe { libc::fcntl(fd, libc::F_SETLK, &mut flock) };
        if res == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::fs::File;
    use std::io;
    use std::mem::zeroed;
    use std::os::windows::io::AsRawHandle;

    use windows_sys::Win32::Foundation::ERROR_LOCK_VIOLATION;
    use windows_sys::Win32::Storage::FileSystem::{
        LockFileEx, UnlockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
    };
    use windows_sys::Win32::System::IO::OVERLAPPED;

    pub fn lock_region(file: &File, start: u64, len: u64) -> io::Result<bool> {
        unsafe {
            let handle = file.as_raw_handle();
            let mut overlapped: OVERLAPPED = zeroed();
            overlapped.Anonymous.Anonymous.Offset = start as u32;
            overlapped.Anonymous.Anonymous.OffsetHigh = (start >> 32) as u32;
            let flags = LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY;
            let res = LockFileEx(
                handle as isize,
                flags,
                0,
                len as u32,
                (len >> 32) as u32,
                &mut overlapped,
            );
            if res != 0 {
                Ok(true)
            } else {
                let err = io::Error::last_os_error();
                if matches!(err.raw_os_error(), Some(code) if code as u32 == ERROR_LOCK_VIOLATION) {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    pub fn unlock_region(file: &File, start: u64, len: u64) -> io::Result<()> {
        unsafe {
            let handle = file.as_raw_handle();
            let mut overlapped: OVERLAPPED = zeroed();
            overlapped.Anonymous.Anonymous.Offset = start as u32;
            overlapped.Anonymous.Anonymous.OffsetHigh = (start >> 32) as u32;
            let res = UnlockFileEx(handle as isize, 0, len as u32, (len >> 32) as u32, &mut overlapped);
            if res != 0 {
                Ok(())
            } else {
                Err(io::Error::last_os_error())
            }
        }
    }
}
