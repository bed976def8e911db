use core::fmt;
use core::hash::{Hash, Hasher};
use core::ptr::NonNull;

use crate::object::core::AsObject;
use crate::object::reference::{acquire, release, Ref};

/// Owning pointer with an escape hatch for reference cycles.
///
/// Behaves exactly like [`Ref`] until [`break_strong_reference`] is called:
/// that releases the held ticket but keeps the raw pointer around for
/// continued dereferencing, moving the pointer irreversibly into the Broken
/// state. Breaking is the sanctioned way to collapse a strong-reference
/// cycle that pure counting cannot collect.
///
/// A Broken pointer is only sound while some other strong owner keeps the
/// target alive; dereferencing it after the last real ticket is gone is an
/// ordinary use-after-free. Every use site should be able to say which owner
/// survives the break.
///
/// Typical shape: device `D` owns its buffer through `Ref<Buf>`, the buffer
/// points back through `BreakableRef<D>`, and some external holder keeps `D`
/// alive. At teardown the back edge is broken, the cycle disappears, and once
/// the external holder lets go both objects destruct normally.
///
/// [`break_strong_reference`]: BreakableRef::break_strong_reference
pub struct BreakableRef<T: AsObject> {
    ptr: Option<NonNull<T>>,
    owning: bool,
}

unsafe impl<T: AsObject + Send + Sync> Send for BreakableRef<T> {}
unsafe impl<T: AsObject + Send + Sync> Sync for BreakableRef<T> {}

impl<T: AsObject> BreakableRef<T> {
    /// Moves `value` to the heap and takes the first ticket on it.
    #[cfg_attr(feature = "tracking", track_caller)]
    pub fn new(value: T) -> Self {
        Self::from_ref(Ref::new(value))
    }

    pub const fn null() -> Self {
        Self {
            ptr: None,
            owning: false,
        }
    }

    /// Adopts the ticket held by `strong`.
    pub fn from_ref(strong: Ref<T>) -> Self {
        let ptr = NonNull::new(Ref::into_raw(strong).cast_mut());
        Self {
            ptr,
            owning: ptr.is_some(),
        }
    }

    /// Releases this pointer's ticket while keeping the raw pointer value.
    /// Idempotent: a second call, or a call on a null pointer, does nothing.
    ///
    /// If this was the last ticket anywhere the target is destroyed here and
    /// now, and any later dereference through this pointer is a
    /// use-after-free; only break when the object graph guarantees another
    /// strong owner is still standing.
    #[cfg_attr(feature = "tracking", track_caller)]
    pub fn break_strong_reference(&mut self) {
        if !self.owning {
            return;
        }
        self.owning = false;
        if let Some(ptr) = self.ptr {
            unsafe { release(ptr) };
        }
    }

    /// True once [`break_strong_reference`] has run.
    ///
    /// [`break_strong_reference`]: BreakableRef::break_strong_reference
    pub fn is_broken(&self) -> bool {
        self.ptr.is_some() && !self.owning
    }

    /// Takes a fresh ticket and returns a strong pointer to the target.
    ///
    /// # Safety
    ///
    /// When this pointer is Broken the caller must guarantee the target is
    /// still alive (some other strong owner exists).
    #[cfg_attr(feature = "tracking", track_caller)]
    pub unsafe fn to_ref(&self) -> Ref<T> {
        Ref::from_ptr(self.as_ptr())
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

    /// Native ticket count of the target; 0 when null or foreign-owned.
    pub fn ref_count(&self) -> usize {
        self.get().map_or(0, |v| v.as_object().ref_count())
    }
}

impl<T: AsObject> From<Ref<T>> for BreakableRef<T> {
    fn from(strong: Ref<T>) -> Self {
        Self::from_ref(strong)
    }
}

impl<T: AsObject> Clone for BreakableRef<T> {
    /// A clone of an Owning pointer takes its own ticket; a clone of a Broken
    /// pointer copies the bare pointer value and is Broken as well.
    fn clone(&self) -> Self {
        if self.owning {
            if let Some(ptr) = self.ptr {
                unsafe { acquire(ptr) };
            }
        }
        Self {
            ptr: self.ptr,
            owning: self.owning,
        }
    }
}

impl<T: AsObject> Drop for BreakableRef<T> {
    fn drop(&mut self) {
        if self.owning {
            if let Some(ptr) = self.ptr {
                unsafe { release(ptr) };
            }
        }
    }
}

impl<T: AsObject> Default for BreakableRef<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: AsObject> core::ops::Deref for BreakableRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get().expect("dereferenced a null BreakableRef")
    }
}

impl<T: AsObject> PartialEq for BreakableRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T: AsObject> Eq for BreakableRef<T> {}

impl<T: AsObject> Hash for BreakableRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.as_ptr() as usize).hash(state)
    }
}

impl<T: AsObject> fmt::Pointer for BreakableRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.as_ptr(), f)
    }
}

impl<T: AsObject> fmt::Debug for BreakableRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ptr {
            Some(_) => write!(
                f,
                "BreakableRef({:p}, {})",
                self.as_ptr(),
                if self.owning { "owning" } else { "broken" }
            ),
            None => write!(f, "BreakableRef(null)"),
        }
    }
}
