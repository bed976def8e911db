//! Diagnostics registry for live objects.
//!
//! Observes the counting state machine, never drives it: the pointer layer
//! inserts an object on its first 0→1 native transition and [`Object::dec_ref`]
//! removes it at final native deallocation. On top of the live set, call-site
//! tracking can be switched on at runtime to attribute every ticket
//! acquire/release to its source location, with a stack trace captured the
//! first time a site shows up. [`report_alive_objects`] turns the whole thing
//! into an end-of-process leak report.
//!
//! [`Object::dec_ref`]: crate::object::Object::dec_ref

use core::ops::Deref;
use core::panic::Location;
use core::ptr::NonNull;
use std::backtrace::{Backtrace, BacktraceStatus};

use indexmap::IndexMap;
use lumen_common::atomic::{Atomic, Ordering};
use lumen_common::lock::{Lazy, Mutex};

#[cfg(not(feature = "threading"))]
use lumen_common::atomic::Radium;

use crate::object::core::Object;

/// Registry pointers are only dereferenced while the registry lock is held,
/// and entries are removed before their object's storage is freed, so the
/// pointee is always live at dereference time.
#[repr(transparent)]
struct WrappedPtr(NonNull<Object>);

unsafe impl Send for WrappedPtr {}

impl Deref for WrappedPtr {
    type Target = NonNull<Object>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// (file, line, column) of a ticket operation.
type SiteKey = (&'static str, u32, u32);

struct SiteRecord {
    /// Net tickets attributed to this site; negative when a site releases
    /// more than it acquires.
    tickets: i64,
    backtrace: Option<String>,
}

impl SiteRecord {
    fn new() -> Self {
        let bt = Backtrace::capture();
        Self {
            tickets: 0,
            backtrace: (bt.status() == BacktraceStatus::Captured).then(|| bt.to_string()),
        }
    }
}

struct Entry {
    ptr: WrappedPtr,
    class_name: &'static str,
    sites: IndexMap<SiteKey, SiteRecord>,
}

#[derive(Default)]
struct Registry {
    objects: Mutex<IndexMap<usize, Entry>>,
    track_sites: Atomic<bool>,
}

cfg_if::cfg_if! {
    if #[cfg(feature = "threading")] {
        static REGISTRY: Lazy<Registry> = Lazy::new(Registry::default);

        fn with_registry<R>(f: impl FnOnce(&Registry) -> R) -> R {
            f(&REGISTRY)
        }
    } else {
        thread_local! {
            static REGISTRY: Lazy<Registry> = Lazy::new(Registry::default);
        }

        fn with_registry<R>(f: impl FnOnce(&Registry) -> R) -> R {
            REGISTRY.with(|r| f(&**r))
        }
    }
}

fn addr_of(obj: &Object) -> usize {
    obj as *const Object as usize
}

/// Switches per-call-site ticket attribution on or off, process-wide.
/// Attribution has a cost (a map update per counting operation), so it is off
/// by default.
pub fn set_site_tracking(enabled: bool) {
    with_registry(|r| r.track_sites.store(enabled, Ordering::Relaxed))
}

pub fn site_tracking() -> bool {
    with_registry(|r| r.track_sites.load(Ordering::Relaxed))
}

pub(super) fn register(obj: &Object, class_name: &'static str) {
    with_registry(|r| {
        r.objects
            .lock()
            .entry(addr_of(obj))
            .or_insert_with(|| Entry {
                ptr: WrappedPtr(NonNull::from(obj)),
                class_name,
                sites: IndexMap::new(),
            });
    })
}

pub(super) fn unregister(obj: &Object) {
    with_registry(|r| {
        r.objects.lock().swap_remove(&addr_of(obj));
    })
}

pub(super) fn note_inc(obj: &Object, site: &'static Location<'static>) {
    note(obj, site, 1)
}

pub(super) fn note_dec(obj: &Object, site: &'static Location<'static>) {
    note(obj, site, -1)
}

fn note(obj: &Object, site: &'static Location<'static>, delta: i64) {
    with_registry(|r| {
        if !r.track_sites.load(Ordering::Relaxed) {
            return;
        }
        let mut objects = r.objects.lock();
        if let Some(entry) = objects.get_mut(&addr_of(obj)) {
            let record = entry
                .sites
                .entry((site.file(), site.line(), site.column()))
                .or_insert_with(SiteRecord::new);
            record.tickets += delta;
        }
    })
}

pub fn is_tracked(obj: &Object) -> bool {
    with_registry(|r| r.objects.lock().contains_key(&addr_of(obj)))
}

/// Number of objects currently alive in the registry.
pub fn tracked_object_count() -> usize {
    with_registry(|r| r.objects.lock().len())
}

/// Structured snapshot of everything still alive, for tests and tooling.
pub fn alive_objects() -> Vec<AliveObject> {
    with_registry(|r| {
        r.objects
            .lock()
            .values()
            .map(|entry| AliveObject {
                class_name: entry.class_name,
                address: entry.ptr.as_ptr() as usize,
                ref_count: unsafe { entry.ptr.as_ref() }.ref_count(),
                sites: entry
                    .sites
                    .iter()
                    .map(|(&(file, line, column), record)| SiteReport {
                        file,
                        line,
                        column,
                        tickets: record.tickets,
                        backtrace: record.backtrace.clone(),
                    })
                    .collect(),
            })
            .collect()
    })
}

/// Logs every object still alive, with per-site detail when site tracking was
/// on. Returns the number of objects reported; 0 means a clean shutdown.
pub fn report_alive_objects() -> usize {
    let alive = alive_objects();
    for obj in &alive {
        warn!(
            "alive object: {} @ {:#x} with {} outstanding ticket(s)",
            obj.class_name, obj.address, obj.ref_count
        );
        for site in &obj.sites {
            if site.tickets == 0 {
                continue;
            }
            warn!(
                "  {:+} ticket(s) from {}:{}:{}",
                site.tickets, site.file, site.line, site.column
            );
            if let Some(bt) = &site.backtrace {
                debug!("  first acquired at:\n{bt}");
            }
        }
    }
    alive.len()
}

#[derive(Debug, Clone)]
pub struct AliveObject {
    pub class_name: &'static str,
    pub address: usize,
    pub ref_count: usize,
    pub sites: Vec<SiteReport>,
}

#[derive(Debug, Clone)]
pub struct SiteReport {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
    pub tickets: i64,
    pub backtrace: Option<String>,
}
