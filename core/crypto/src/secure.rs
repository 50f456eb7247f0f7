//! Scoped secret buffers.
//!
//! A [`SecretBuffer`] owns a fixed heap allocation that is locked into RAM
//! where the platform allows it and overwritten with zeros before it is
//! released. The allocation never grows or moves, so no stale copies of the
//! secret are left behind by reallocation. The type is deliberately not
//! `Clone`.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use zeroize::Zeroize;

use deaddrop_common::{expand_home, Error, Result};

/// Initial allocation when reading a file of unknown size.
const READ_CHUNK: usize = 4096;

/// Heap buffer for key material and decrypted plaintext.
pub struct SecretBuffer {
    bytes: Box<[u8]>,
    locked: bool,
}

impl SecretBuffer {
    /// Allocate a zero-filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        let bytes = vec![0u8; len].into_boxed_slice();
        let locked = memlock::lock(&bytes);
        Self { bytes, locked }
    }

    /// Copy `data` into a new buffer.
    ///
    /// # Security
    /// The caller remains responsible for wiping `data`.
    pub fn from_slice(data: &[u8]) -> Self {
        let mut buffer = Self::zeroed(data.len());
        buffer.bytes.copy_from_slice(data);
        buffer
    }

    /// Load the entire contents of a file.
    ///
    /// The path goes through home-directory expansion first. Regular files
    /// are read straight into a locked allocation of their size; pipes,
    /// `/proc` entries and other files without a meaningful size are read
    /// to EOF. On any read error the partially filled buffer is wiped before
    /// the error is returned.
    ///
    /// # Errors
    /// - `KeyAccess` if the path cannot be resolved, opened or read, or a
    ///   regular file grows while it is being read
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = path.as_ref();
        let path = expand_home(raw).map_err(|e| {
            Error::KeyAccess(format!("Cannot locate '{}': {}", raw.display(), e))
        })?;
        let read_error =
            |e: io::Error| Error::KeyAccess(format!("Cannot read '{}': {}", path.display(), e));

        let mut file = File::open(&path).map_err(|e| {
            Error::KeyAccess(format!("Cannot open '{}': {}", path.display(), e))
        })?;

        let metadata = file
            .metadata()
            .map_err(|e| Error::KeyAccess(format!("Cannot stat '{}': {}", path.display(), e)))?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Self::read_to_end(&mut file).map_err(read_error);
        }

        let len = usize::try_from(metadata.len())
            .map_err(|_| Error::KeyAccess(format!("'{}' is too large", path.display())))?;

        let mut buffer = Self::zeroed(len);
        file.read_exact(buffer.as_mut_bytes()).map_err(read_error)?;

        let mut extra = Self::zeroed(1);
        if file.read(extra.as_mut_bytes()).map_err(read_error)? != 0 {
            return Err(Error::KeyAccess(format!(
                "'{}' changed while being read",
                path.display()
            )));
        }

        Ok(buffer)
    }

    /// Read `reader` to EOF, growing by copying into a fresh buffer. Each
    /// outgrown buffer is wiped when it is replaced.
    fn read_to_end(reader: &mut impl Read) -> io::Result<Self> {
        let mut buffer = Self::zeroed(READ_CHUNK);
        let mut filled = 0;

        loop {
            if filled == buffer.len() {
                let mut grown = Self::zeroed(buffer.len() * 2);
                grown.bytes[..filled].copy_from_slice(&buffer.bytes[..filled]);
                buffer = grown;
            }

            match reader.read(&mut buffer.bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(Self::from_slice(&buffer.bytes[..filled]))
    }

    /// Get the buffer contents.
    ///
    /// # Security
    /// The returned slice should be used immediately and not copied.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get the buffer contents mutably.
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether `mlock` succeeded for this allocation.
    ///
    /// Locking works on whole pages. Small buffers can share a page with
    /// another buffer, and releasing either one unlocks the shared page, so
    /// `true` means the lock was taken, not that the page is still resident.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Wipe and release the buffer.
    ///
    /// Dropping has the same effect; this spells out the release point at
    /// call sites.
    pub fn destroy(self) {
        drop(self);
    }

    /// Zero the contents and unlock the allocation. Idempotent.
    fn release(&mut self) {
        self.bytes[..].zeroize();
        if self.locked {
            memlock::unlock(&self.bytes);
            self.locked = false;
        }
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBuffer([REDACTED; {} bytes])", self.bytes.len())
    }
}

#[cfg(unix)]
mod memlock {
    /// Best-effort `mlock`; `RLIMIT_MEMLOCK` may refuse it.
    pub(super) fn lock(bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return false;
        }
        // SAFETY: the range covers a live allocation owned by the caller.
        unsafe { libc::mlock(bytes.as_ptr().cast(), bytes.len()) == 0 }
    }

    pub(super) fn unlock(bytes: &[u8]) {
        // SAFETY: same range that was passed to `mlock`.
        unsafe {
            libc::munlock(bytes.as_ptr().cast(), bytes.len());
        }
    }
}

#[cfg(not(unix))]
mod memlock {
    pub(super) fn lock(_bytes: &[u8]) -> bool {
        false
    }

    pub(super) fn unlock(_bytes: &[u8]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_reads_entire_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789abcdef0123456789abcdef").unwrap();

        let buffer = SecretBuffer::load(file.path()).unwrap();
        assert_eq!(buffer.as_bytes(), b"0123456789abcdef0123456789abcdef");
        assert_eq!(buffer.len(), 32);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_load_file_without_size() {
        let expected = std::fs::read("/proc/self/cmdline").unwrap();
        assert!(!expected.is_empty());

        let buffer = SecretBuffer::load("/proc/self/cmdline").unwrap();
        assert_eq!(buffer.as_bytes(), &expected[..]);
    }

    #[cfg(unix)]
    #[test]
    fn test_load_from_fifo() {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let fifo = dir.path().join("key.fifo");
        let c_path = CString::new(fifo.as_os_str().as_bytes()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) }, 0);

        let key = vec![0x5Au8; 10_000];
        let writer = {
            let fifo = fifo.clone();
            let key = key.clone();
            std::thread::spawn(move || std::fs::write(fifo, key).unwrap())
        };

        let buffer = SecretBuffer::load(&fifo).unwrap();
        writer.join().unwrap();
        assert_eq!(buffer.as_bytes(), &key[..]);
    }

    #[test]
    fn test_read_to_end_grows_past_chunk() {
        let data: Vec<u8> = (0..3 * READ_CHUNK + 17).map(|i| i as u8).collect();
        let buffer = SecretBuffer::read_to_end(&mut std::io::Cursor::new(&data)).unwrap();
        assert_eq!(buffer.as_bytes(), &data[..]);

        let empty = SecretBuffer::read_to_end(&mut std::io::empty()).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_load_missing_file_is_key_access_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = SecretBuffer::load(dir.path().join("absent.key"));
        assert!(matches!(result, Err(Error::KeyAccess(_))));
    }

    #[test]
    fn test_load_unsupported_home_form_is_key_access_error() {
        let result = SecretBuffer::load("~nobody/key");
        assert!(matches!(result, Err(Error::KeyAccess(_))));
    }

    #[test]
    fn test_release_zeroes_backing_memory() {
        let mut buffer = SecretBuffer::from_slice(&[0xA5u8; 64]);
        let ptr = buffer.bytes.as_ptr();

        buffer.release();

        // Same allocation, now wiped.
        assert_eq!(buffer.bytes.as_ptr(), ptr);
        assert!(buffer.as_bytes().iter().all(|b| *b == 0));
        assert!(!buffer.is_locked());

        // A second release (as run by Drop) is harmless.
        buffer.release();
    }

    #[test]
    fn test_move_keeps_allocation() {
        let buffer = SecretBuffer::from_slice(b"secret");
        let ptr = buffer.as_bytes().as_ptr();
        let moved = buffer;
        assert_eq!(moved.as_bytes().as_ptr(), ptr);
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = SecretBuffer::zeroed(0);
        assert!(buffer.is_empty());
        assert!(!buffer.is_locked());
        buffer.destroy();
    }

    #[test]
    fn test_debug_redacts_contents() {
        let buffer = SecretBuffer::from_slice(b"hunter2");
        let debug = format!("{:?}", buffer);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }
}
