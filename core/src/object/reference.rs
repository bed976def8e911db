use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::ptr::NonNull;

use crate::object::core::{AsObject, DecStatus};

/// Owning smart pointer over any type embedding an [`Object`].
///
/// Holds exactly one ticket on its target for as long as it is non-null:
/// cloning takes another ticket, moving transfers the ticket untouched, and
/// dropping (or [`reset`]ting) releases it with deallocation requested. While
/// a `Ref` holds its ticket the counting machinery will not destroy the
/// target, though ownership may still be handed to the foreign runtime.
///
/// Like the raw pointers it replaces, a `Ref` can be null; a null `Ref`
/// compares equal to every other null `Ref` and panics on dereference.
/// Equality, ordering and hashing are by pointer identity, never by value.
///
/// [`Object`]: crate::object::Object
/// [`reset`]: Ref::reset
pub struct Ref<T: AsObject> {
    ptr: Option<NonNull<T>>,
}

unsafe impl<T: AsObject + Send + Sync> Send for Ref<T> {}
unsafe impl<T: AsObject + Send + Sync> Sync for Ref<T> {}

/// Takes one ticket on the object behind `ptr` and feeds the diagnostics
/// registry on the 0→1 transition.
///
/// # Safety
///
/// `ptr` must point to a live `T`.
#[cfg_attr(feature = "tracking", track_caller)]
pub(super) unsafe fn acquire<T: AsObject>(ptr: NonNull<T>) {
    let value = ptr.as_ref();
    let obj = value.as_object();
    let prev = obj.inc_ref();
    #[cfg(feature = "tracking")]
    {
        if prev == 0 && obj.foreign_owner().is_none() {
            crate::object::tracker::register(obj, value.class_name());
        }
        crate::object::tracker::note_inc(obj, core::panic::Location::caller());
    }
    #[cfg(not(feature = "tracking"))]
    let _ = prev;
}

/// Releases one ticket and frees the allocation if it was the last one.
///
/// # Safety
///
/// `ptr` must point to a live `T` on which the caller holds a ticket; the
/// pointer must not be used again if this was the last ticket.
#[cfg_attr(feature = "tracking", track_caller)]
pub(super) unsafe fn release<T: AsObject>(ptr: NonNull<T>) {
    let obj = ptr.as_ref().as_object();
    #[cfg(feature = "tracking")]
    crate::object::tracker::note_dec(obj, core::panic::Location::caller());
    if obj.dec_ref(true) == DecStatus::ShouldDrop {
        drop(Box::from_raw(ptr.as_ptr()));
    }
}

impl<T: AsObject> Ref<T> {
    /// Moves `value` to the heap and takes the first ticket on it.
    #[cfg_attr(feature = "tracking", track_caller)]
    pub fn new(value: T) -> Self {
        let ptr = NonNull::from(Box::leak(Box::new(value)));
        unsafe { acquire(ptr) };
        Self { ptr: Some(ptr) }
    }

    pub const fn null() -> Self {
        Self { ptr: None }
    }

    /// Builds a `Ref` from a raw pointer, taking a fresh ticket.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a live, heap-allocated `T` managed by
    /// this counting machinery.
    #[cfg_attr(feature = "tracking", track_caller)]
    pub unsafe fn from_ptr(ptr: *const T) -> Self {
        let ptr = NonNull::new(ptr.cast_mut());
        if let Some(ptr) = ptr {
            acquire(ptr);
        }
        Self { ptr }
    }

    /// Builds a `Ref` from a raw pointer, adopting a ticket the caller
    /// already holds (the counterpart of [`Ref::into_raw`]).
    ///
    /// # Safety
    ///
    /// `ptr` must be null or point to a live `T` with an outstanding ticket
    /// that is hereby transferred to the new `Ref`.
    pub unsafe fn from_raw(ptr: *const T) -> Self {
        Self {
            ptr: NonNull::new(ptr.cast_mut()),
        }
    }

    /// Consumes the `Ref` without releasing its ticket.
    pub fn into_raw(this: Self) -> *const T {
        let ptr = this.as_ptr();
        core::mem::forget(this);
        ptr
    }

    pub fn get(&self) -> Option<&T> {
        self.ptr.map(|ptr| unsafe { ptr.as_ref() })
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr
            .map_or(core::ptr::null(), |ptr| ptr.as_ptr().cast_const())
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_none()
    }

    /// Releases the held ticket and becomes null.
    #[cfg_attr(feature = "tracking", track_caller)]
    pub fn reset(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            unsafe { release(ptr) };
        }
    }

    /// Native ticket count of the target; 0 when null or foreign-owned.
    pub fn ref_count(&self) -> usize {
        self.get().map_or(0, |v| v.as_object().ref_count())
    }
}

impl<T: AsObject> Clone for Ref<T> {
    fn clone(&self) -> Self {
        if let Some(ptr) = self.ptr {
            unsafe { acquire(ptr) };
        }
        Self { ptr: self.ptr }
    }
}

impl<T: AsObject> Drop for Ref<T> {
    fn drop(&mut self) {
        if let Some(ptr) = self.ptr {
            unsafe { release(ptr) };
        }
    }
}

impl<T: AsObject> Default for Ref<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: AsObject> core::ops::Deref for Ref<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get().expect("dereferenced a null Ref")
    }
}

impl<T: AsObject> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T: AsObject> Eq for Ref<T> {}

impl<T: AsObject> PartialOrd for Ref<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: AsObject> Ord for Ref<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.as_ptr() as usize).cmp(&(other.as_ptr() as usize))
    }
}

impl<T: AsObject> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.as_ptr() as usize).hash(state)
    }
}

impl<T: AsObject> fmt::Pointer for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.as_ptr(), f)
    }
}

impl<T: AsObject> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => write!(
                f,
                "Ref<{}>({:p}, {} ticket(s))",
                value.class_name(),
                self.as_ptr(),
                self.ref_count()
            ),
            None => write!(f, "Ref(null)"),
        }
    }
}

// a Ref is a bare pointer at rest; the count lives in the target
static_assertions::assert_eq_size!(Ref<crate::object::Object>, *const ());
