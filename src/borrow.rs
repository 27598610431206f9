//! Implements an `AtomicRefCell`

use std::cell::UnsafeCell;
use std::fmt::{self, Display, Formatter};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};

/// Error returned when an `AtomicRefCell`
/// is already mutably borrowed.
#[derive(Debug)]
pub struct MutablyBorrowed;

impl Display for MutablyBorrowed {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "value already mutably borrowed")
    }
}

impl std::error::Error for MutablyBorrowed {}

/// Error returned when an `AtomicRefCell` has
/// existing immutable borrows.
#[derive(Debug)]
pub struct ImmutablyBorrowed;

impl Display for ImmutablyBorrowed {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "value already immutably borrowed")
    }
}

impl std::error::Error for ImmutablyBorrowed {}

/// Like `RefCell`, but atomic. Akin to a `RwLock`
/// which never blocks.
///
/// This is used in this crate for interior mutability
/// of component storages and group memberships. Note that all components of the
/// same type are wrapped in a single `AtomicRefCell`. This
/// means that you cannot have a mutable reference to two
/// components of the same type at once, even if they belong
/// to different entities. Split the borrowed slice instead.
#[derive(Debug, Default)]
pub struct AtomicRefCell<T> {
    value: UnsafeCell<T>,
    /// Flag has MSB set if currently
    /// mutably borrowed. The other bits indicate
    /// the number of current immutable borrows.
    flag: AtomicU32,
}

// Safety: access to `value` is guarded by `flag`, which
// admits either many readers or one writer.
unsafe impl<T: Send> Send for AtomicRefCell<T> {}
unsafe impl<T: Send + Sync> Sync for AtomicRefCell<T> {}

const NO_BORROWS: u32 = 0;
const MUTABLE_MASK: u32 = 1 << 31;

impl<T> AtomicRefCell<T> {
    /// Creates a new `AtomicRefCell` initialized with the given value.
    pub fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
            flag: AtomicU32::new(NO_BORROWS),
        }
    }

    /// Immutably borrows the value.
    ///
    /// # Panics
    /// Panics if the value is already borrowed mutably.
    /// If you wish to handle this gracefully, use `try_borrow()`.
    pub fn borrow(&self) -> AtomicRef<T> {
        self.try_borrow().unwrap_or_else(|e| {
            panic!(
                "failed to immutably borrow `AtomicRefCell` of type {}: {}",
                std::any::type_name::<T>(),
                e
            )
        })
    }

    /// Mutably borrows the value.
    ///
    /// # Panics
    /// Panics if the value has existing immutable borrows.
    /// If you wish to handle this gracefully, use `try_borrow_mut()`.
    pub fn borrow_mut(&self) -> AtomicRefMut<T> {
        self.try_borrow_mut().unwrap_or_else(|e| {
            panic!(
                "failed to mutably borrow `AtomicRefCell` of type {}: {}",
                std::any::type_name::<T>(),
                e
            )
        })
    }

    /// Attempts to immutably borrow the value.
    ///
    /// Returns an error if the value is already borrowed
    /// mutably.
    pub fn try_borrow(&self) -> Result<AtomicRef<T>, MutablyBorrowed> {
        // Increment the borrow count.
        // Note that the count will even be incremented
        // if there is an existing mutable borrow. However,
        // `release_mut()` stores 0 into the flag, so
        // these "phantom borrows" are cleared out.
        let flag = self.flag.fetch_add(1, Ordering::AcqRel);

        if flag & MUTABLE_MASK != 0 {
            Err(MutablyBorrowed)
        } else {
            Ok(AtomicRef {
                // Safety: no mutable borrow exists and none can be
                // obtained until our count is released.
                value: unsafe { &*self.value.get() },
                flag: &self.flag,
            })
        }
    }

    /// Attempts to mutably borrow the value.
    ///
    /// Returns an error if the value has one or more
    /// existing immutable borrows.
    pub fn try_borrow_mut(&self) -> Result<AtomicRefMut<T>, ImmutablyBorrowed> {
        // Compare and swap the borrow flag; if the old
        // value is NO_BORROWS, then we have unique access
        // to the value.
        match self.flag.compare_exchange(
            NO_BORROWS,
            MUTABLE_MASK,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(AtomicRefMut {
                value: self.value.get(),
                flag: &self.flag,
                _marker: PhantomData,
            }),
            Err(_) => Err(ImmutablyBorrowed),
        }
    }

    /// Returns a mutable reference to the value. No runtime
    /// check is needed since `&mut self` proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Consumes the cell, returning the wrapped value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

fn release_ref(flag: &AtomicU32) {
    // Decrement the flag value.
    // This causes the immutable reference
    // count to drop by one.
    debug_assert_eq!(flag.load(Ordering::Acquire) & MUTABLE_MASK, 0);
    debug_assert!(flag.load(Ordering::Acquire) > 0);
    flag.fetch_sub(1, Ordering::AcqRel);
}

fn release_mut(flag: &AtomicU32) {
    // Set the flag value to NO_BORROWS.
    // Since a mutable borrow requires exclusivity,
    // releasing it causes no borrows to exist.
    flag.store(NO_BORROWS, Ordering::Release);
}

/// RAII guard for an immutably borrowed value
/// from an `AtomicRefCell`.
pub struct AtomicRef<'a, T: ?Sized> {
    value: &'a T,
    flag: &'a AtomicU32,
}

impl<'a, T: ?Sized> AtomicRef<'a, T> {
    /// Makes a new `AtomicRef` for a component of the borrowed data.
    /// The borrow is carried over to the new guard.
    pub fn map<U: ?Sized, F>(orig: Self, f: F) -> AtomicRef<'a, U>
    where
        F: FnOnce(&T) -> &U,
    {
        let flag = orig.flag;
        let value = f(orig.value);
        std::mem::forget(orig);
        AtomicRef { value, flag }
    }

    /// Like `map`, but the closure may decline and hand back
    /// the original guard.
    pub fn filter_map<U: ?Sized, F>(orig: Self, f: F) -> Result<AtomicRef<'a, U>, Self>
    where
        F: FnOnce(&T) -> Option<&U>,
    {
        match f(orig.value) {
            Some(value) => {
                let flag = orig.flag;
                std::mem::forget(orig);
                Ok(AtomicRef { value, flag })
            }
            None => Err(orig),
        }
    }
}

impl<'a, T: ?Sized> Deref for AtomicRef<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.value
    }
}

impl<'a, T: ?Sized> Drop for AtomicRef<'a, T> {
    fn drop(&mut self) {
        release_ref(self.flag);
    }
}

/// RAII guard for a mutably borrowed value
/// from an `AtomicRefCell`.
pub struct AtomicRefMut<'a, T: ?Sized> {
    value: *mut T,
    flag: &'a AtomicU32,
    _marker: PhantomData<&'a mut T>,
}

// Safety: the guard is semantically a `&'a mut T`.
unsafe impl<'a, T: ?Sized + Send> Send for AtomicRefMut<'a, T> {}
unsafe impl<'a, T: ?Sized + Sync> Sync for AtomicRefMut<'a, T> {}

impl<'a, T: ?Sized> AtomicRefMut<'a, T> {
    /// Makes a new `AtomicRefMut` for a component of the borrowed data.
    /// The borrow is carried over to the new guard.
    pub fn map<U: ?Sized, F>(orig: Self, f: F) -> AtomicRefMut<'a, U>
    where
        F: FnOnce(&mut T) -> &mut U,
    {
        let flag = orig.flag;
        // Safety: `orig` held the unique borrow, which is
        // transferred to the returned guard.
        let value: *mut U = f(unsafe { &mut *orig.value });
        std::mem::forget(orig);
        AtomicRefMut {
            value,
            flag,
            _marker: PhantomData,
        }
    }

    /// Like `map`, but the closure may decline, in which
    /// case the borrow is released.
    pub fn filter_map<U: ?Sized, F>(orig: Self, f: F) -> Option<AtomicRefMut<'a, U>>
    where
        F: FnOnce(&mut T) -> Option<&mut U>,
    {
        let flag = orig.flag;
        // Safety: see `map()`
        let value = f(unsafe { &mut *orig.value }).map(|v| v as *mut U);
        std::mem::forget(orig);
        match value {
            Some(value) => Some(AtomicRefMut {
                value,
                flag,
                _marker: PhantomData,
            }),
            None => {
                release_mut(flag);
                None
            }
        }
    }
}

impl<'a, T: ?Sized> Deref for AtomicRefMut<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // Safety: an `AtomicRefMut` can only be created
        // through `AtomicRefCell::try_borrow_mut()`, which
        // marks the flag to ensure the borrow is unique.
        unsafe { &*self.value }
    }
}

impl<'a, T: ?Sized> DerefMut for AtomicRefMut<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // Safety: see `deref()`
        unsafe { &mut *self.value }
    }
}

impl<'a, T: ?Sized> Drop for AtomicRefMut<'a, T> {
    fn drop(&mut self) {
        release_mut(self.flag);
    }
}
