//! Owned secret bytes that are wiped when released.
//!
//! Pages backing a `SecureBuffer` are locked with `mlock` on Unix when the
//! `memlock` feature is enabled. Locking is best-effort: a process without
//! `RLIMIT_MEMLOCK` headroom still gets a zero-on-drop buffer.

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

pub struct SecureBuffer {
    bytes: Box<[u8]>,
    locked: bool,
}

impl SecureBuffer {
    /// Allocates `len` zero bytes.
    pub fn zeroed(len: usize) -> Self {
        let bytes = vec![0u8; len].into_boxed_slice();
        let locked = lock_memory(&bytes);
        SecureBuffer { bytes, locked }
    }

    /// Copies `data` into a fresh buffer. The caller still owns `data`.
    pub fn from_slice(data: &[u8]) -> Self {
        let mut buffer = Self::zeroed(data.len());
        buffer.bytes.copy_from_slice(data);
        buffer
    }

    /// Takes ownership of `data`, wiping the vector's allocation afterwards.
    pub fn from_vec(mut data: Vec<u8>) -> Self {
        let buffer = Self::from_slice(&data);
        data.zeroize();
        buffer
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Zeroes and releases the contents, leaving an empty buffer.
    pub fn clear(&mut self) {
        self.wipe();
        self.bytes = Box::default();
    }

    fn wipe(&mut self) {
        self.bytes.zeroize();
        if self.locked {
            unlock_memory(&self.bytes);
            self.locked = false;
        }
    }
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl AsRef<[u8]> for SecureBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Constant time for buffers of equal length.
impl PartialEq for SecureBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice().ct_eq(other.as_slice()).into()
    }
}

impl Eq for SecureBuffer {}

impl fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureBuffer")
            .field("len", &self.bytes.len())
            .field("locked", &self.locked)
            .finish_non_exhaustive()
    }
}

#[cfg(all(unix, feature = "memlock"))]
fn lock_memory(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    // SAFETY: the pointer and length describe a live allocation owned by the caller.
    let res = unsafe { libc::mlock(bytes.as_ptr() as *const libc::c_void, bytes.len()) };
    res == 0
}

#[cfg(all(unix, feature = "memlock"))]
fn unlock_memory(bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    // SAFETY: same region that was passed to `mlock`.
    unsafe {
        libc::munlock(bytes.as_ptr() as *const libc::c_void, bytes.len());
    }
}

#[cfg(not(all(unix, feature = "memlock")))]
fn lock_memory(_bytes: &[u8]) -> bool {
    false
}

#[cfg(not(all(unix, feature = "memlock")))]
fn unlock_memory(_bytes: &[u8]) {}
