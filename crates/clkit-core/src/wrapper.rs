//! Common machinery behind every typed wrapper.
//!
//! A wrapper is an `Arc<Shared<S>>`: the driver handle, an info cache and
//! per-kind state `S`. Cloning a wrapper is a retain, dropping it is a
//! release; when the last clone goes, `S` is torn down first and then the
//! handle is released at driver level.
//!
//! A process-wide registry keeps a weak pointer per live handle so that
//! wrapping the same handle twice yields the same wrapper.

use std::{
    any::Any,
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use bytemuck::Pod;
use once_cell::sync::Lazy;

use crate::{
    driver::Driver,
    error::{ClError, Result, cl_try},
    types::{CL_INVALID_VALUE, InfoClass, ObjectKind, RawHandle},
};

/* ───────────── info values ─────────────────────────────── */

/// Immutable, shareable result of an info query.
#[derive(Clone, PartialEq, Eq)]
pub struct InfoValue(Arc<[u8]>);

impl InfoValue {
    pub fn size(&self) -> usize {
        self.0.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Reads the value as one `T`. Fails when the blob is too short.
    pub fn scalar<T: Pod>(&self) -> Result<T> {
        let n = std::mem::size_of::<T>();
        match self.0.get(..n) {
            Some(b) => Ok(bytemuck::pod_read_unaligned(b)),
            None => Err(ClError::InvalidArgument(format!(
                "info value of {} bytes read as {} ({n} bytes)",
                self.0.len(),
                std::any::type_name::<T>()
            ))),
        }
    }

    /// Reads the value as a packed array of `T`; trailing bytes are ignored.
    pub fn array<T: Pod>(&self) -> Vec<T> {
        self.0
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    /// NUL-terminated string value.
    pub fn string(&self) -> String {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl std::fmt::Debug for InfoValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InfoValue({:02x?})", &self.0[..])
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct InfoKey {
    class: InfoClass,
    param: u32,
    secondary: Option<RawHandle>,
}

/// Uncached two-call fetch.
pub(crate) fn fetch_info(
    driver: &dyn Driver,
    class: InfoClass,
    object: RawHandle,
    secondary: Option<RawHandle>,
    param: u32,
) -> Result<InfoValue> {
    let size = cl_try!(
        driver.info(class, object, secondary, param, None),
        "unable to get size of {class:?} info {param:#06x}"
    );
    if size == 0 {
        return Err(ClError::driver(CL_INVALID_VALUE, format!("{class:?} info {param:#06x} unavailable")));
    }
    let mut buf = vec![0u8; size];
    cl_try!(
        driver.info(class, object, secondary, param, Some(&mut buf)),
        "unable to get {class:?} info {param:#06x}"
    );
    Ok(InfoValue(buf.into()))
}

/* ───────────── registry ────────────────────────────────── */

type RegKey = (usize, ObjectKind, RawHandle);
type Registry = HashMap<RegKey, (u64, Weak<dyn Any + Send + Sync>)>;

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| Mutex::new(HashMap::new()));
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn registry() -> std::sync::MutexGuard<'static, Registry> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

fn driver_key(driver: &Arc<dyn Driver>) -> usize {
    Arc::as_ptr(driver) as *const () as usize
}

/// Number of wrappers currently alive in the process.
pub fn live_wrappers() -> usize {
    registry().values().filter(|(_, w)| w.strong_count() > 0).count()
}

/// `true` when every wrapper has been released.
pub fn memcheck() -> bool {
    live_wrappers() == 0
}

/* ───────────── core ────────────────────────────────────── */

/// Handle, driver and cache; releases the handle on drop.
pub(crate) struct Core {
    id: u64,
    driver: Arc<dyn Driver>,
    kind: ObjectKind,
    handle: RawHandle,
    cache: Mutex<HashMap<InfoKey, InfoValue>>,
}

impl Core {
    pub(crate) fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub(crate) fn handle(&self) -> RawHandle {
        self.handle
    }

    /// Cached (or refreshed) info query. Failures leave the cache as is.
    pub(crate) fn query(
        &self,
        class: InfoClass,
        secondary: Option<RawHandle>,
        param: u32,
        use_cache: bool,
    ) -> Result<InfoValue> {
        let key = InfoKey { class, param, secondary };
        if use_cache {
            if let Some(v) = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(&key) {
                return Ok(v.clone());
            }
        }
        let value = fetch_info(self.driver.as_ref(), class, self.handle, secondary, param)?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.clone());
        Ok(value)
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        {
            let mut reg = registry();
            let key = (driver_key(&self.driver), self.kind, self.handle);
            if reg.get(&key).is_some_and(|(id, _)| *id == self.id) {
                reg.remove(&key);
            }
        }
        if self.kind.is_refcounted() {
            if let Err(code) = self.driver.release(self.kind, self.handle) {
                log::warn!(
                    "releasing {} {:#x} failed: {}",
                    self.kind.as_str(),
                    self.handle.0,
                    crate::error::status_name(code)
                );
            }
        }
        log::trace!("released {} {:#x}", self.kind.as_str(), self.handle.0);
    }
}

/// Wrapper payload. `state` is declared first so it is dropped before the
/// handle in `core` is released.
pub(crate) struct Shared<S> {
    pub(crate) state: S,
    pub(crate) core: Core,
}

/// Wraps a handle the caller owns one driver reference to.
///
/// If the handle is already wrapped, the existing wrapper is returned and
/// the surplus driver reference is dropped.
pub(crate) fn adopt<S: Send + Sync + 'static>(
    driver: &Arc<dyn Driver>,
    kind: ObjectKind,
    handle: RawHandle,
    state: impl FnOnce() -> S,
) -> Arc<Shared<S>> {
    if let Some(existing) = lookup::<S>(driver, kind, handle) {
        log::warn!("{} {:#x} is already wrapped, reusing wrapper", kind.as_str(), handle.0);
        if kind.is_refcounted() {
            if let Err(code) = driver.release(kind, handle) {
                log::warn!("dropping duplicate reference to {:#x} failed: {code}", handle.0);
            }
        }
        return existing;
    }
    insert(driver, kind, handle, state())
}

/// Wraps a handle obtained without a driver reference (from an info
/// query or enumeration). Reuses a live wrapper, otherwise retains first.
pub(crate) fn wrap_borrowed<S: Send + Sync + 'static>(
    driver: &Arc<dyn Driver>,
    kind: ObjectKind,
    handle: RawHandle,
    state: impl FnOnce() -> S,
) -> Result<Arc<Shared<S>>> {
    if handle.is_null() {
        return Err(ClError::InvalidArgument(format!("null {} handle", kind.as_str())));
    }
    if let Some(existing) = lookup::<S>(driver, kind, handle) {
        return Ok(existing);
    }
    if kind.is_refcounted() {
        cl_try!(driver.retain(kind, handle), "unable to retain {} {:#x}", kind.as_str(), handle.0);
    }
    Ok(insert(driver, kind, handle, state()))
}

fn lookup<S: Send + Sync + 'static>(driver: &Arc<dyn Driver>, kind: ObjectKind, handle: RawHandle) -> Option<Arc<Shared<S>>> {
    // Upgrade under the lock, downcast (and maybe drop) outside of it.
    let any = registry().get(&(driver_key(driver), kind, handle)).and_then(|(_, w)| w.upgrade())?;
    any.downcast::<Shared<S>>().ok()
}

fn insert<S: Send + Sync + 'static>(driver: &Arc<dyn Driver>, kind: ObjectKind, handle: RawHandle, state: S) -> Arc<Shared<S>> {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let shared = Arc::new(Shared {
        state,
        core: Core { id, driver: Arc::clone(driver), kind, handle, cache: Mutex::new(HashMap::new()) },
    });
    let weak: Weak<Shared<S>> = Arc::downgrade(&shared);
    let weak: Weak<dyn Any + Send + Sync> = weak;
    registry().insert((driver_key(driver), kind, handle), (id, weak));
    log::trace!("adopted {} {:#x}", kind.as_str(), handle.0);
    shared
}

/* ───────────── typed wrappers ──────────────────────────── */

/// Declares a typed wrapper over `Arc<Shared<$state>>`.
macro_rules! cl_wrapper {
    ($(#[$meta:meta])* $name:ident, $state:ty, $kind:expr, $class:expr) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name(pub(crate) std::sync::Arc<$crate::wrapper::Shared<$state>>);

        impl $name {
            pub const KIND: $crate::types::ObjectKind = $kind;

            /// Raw driver handle.
            pub fn handle(&self) -> $crate::types::RawHandle {
                self.0.core.handle()
            }

            pub fn driver(&self) -> &std::sync::Arc<dyn $crate::driver::Driver> {
                self.0.core.driver()
            }

            /// Takes another reference; same as `clone`.
            pub fn retain(&self) -> Self {
                self.clone()
            }

            /// Gives up this reference. The driver handle is released with
            /// the last one.
            pub fn release(self) {
                drop(self)
            }

            /// Live references to this wrapper.
            pub fn ref_count(&self) -> usize {
                std::sync::Arc::strong_count(&self.0)
            }

            /// Cached info query.
            pub fn info(&self, param: u32) -> $crate::error::Result<$crate::wrapper::InfoValue> {
                self.0.core.query($class, None, param, true)
            }

            /// Info query that bypasses and refreshes the cache.
            pub fn info_fresh(&self, param: u32) -> $crate::error::Result<$crate::wrapper::InfoValue> {
                self.0.core.query($class, None, param, false)
            }

            #[allow(dead_code)]
            pub(crate) fn state(&self) -> &$state {
                &self.0.state
            }

            #[allow(dead_code)]
            pub(crate) fn core(&self) -> &$crate::wrapper::Core {
                &self.0.core
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.handle() == other.handle()
            }
        }

        impl Eq for $name {}

        impl std::hash::Hash for $name {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                std::hash::Hash::hash(&self.handle(), state)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.handle().0)
            }
        }
    };
}
pub(crate) use cl_wrapper;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::stub::StubDriver;

    #[test]
    fn registry_entries_upgrade_only_to_their_own_state() {
        let driver: Arc<dyn Driver> = StubDriver::single_gpu();
        let handle = RawHandle(0x5eed_0001);
        let shared = insert(&driver, ObjectKind::Platform, handle, 7u32);

        let found = lookup::<u32>(&driver, ObjectKind::Platform, handle).unwrap();
        assert!(Arc::ptr_eq(&found, &shared));
        assert_eq!(found.state, 7);
        assert!(lookup::<String>(&driver, ObjectKind::Platform, handle).is_none());
        assert!(lookup::<u32>(&driver, ObjectKind::Device, handle).is_none());

        drop((found, shared));
        assert!(lookup::<u32>(&driver, ObjectKind::Platform, handle).is_none());
    }
}
