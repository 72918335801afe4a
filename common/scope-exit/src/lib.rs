//! Ad-hoc scope guards.

#![warn(missing_docs)]

use std::{mem::ManuallyDrop, ops::{Deref, DerefMut}};

#[doc(hidden)]
pub struct ScopeExit<F>
    where F: FnOnce()
{
    f: ManuallyDrop<F>,
}

impl<F> ScopeExit<F>
    where F: FnOnce()
{
    pub fn new(f: F) -> Self
    {
        Self{f: ManuallyDrop::new(f)}
    }
}

impl<F> Drop for ScopeExit<F>
    where F: FnOnce()
{
    fn drop(&mut self)
    {
        // SAFETY: self.f will not be used anymore.
        let f = unsafe { ManuallyDrop::take(&mut self.f) };
        f();
    }
}

/// Define an ad-hoc scope guard.
///
/// The code passed to this macro is performed at the end of the scope.
/// It is performed when the scope ends or when a panic passes through.
///
/// # Examples
///
/// ```
/// # use scope_exit::scope_exit;
/// use std::cell::Cell;
/// let x = Cell::new(0);
/// {
///     scope_exit! { x.set(1); }
///     x.set(2);
/// }
/// assert_eq!(x.get(), 1);
/// ```
#[macro_export]
macro_rules! scope_exit
{
    { $($tt:tt)* } => {
        let __scope_exit = $crate::ScopeExit::new(|| { $($tt)* });
    };
}

/// Value that is passed to a cleanup function at the end of the scope.
///
/// Unlike [`scope_exit`], the guard owns the value it cleans up,
/// and gives access to it in the meantime through [`Deref`].
/// Use [`ScopeGuard::into_inner`] to keep the value after all.
///
/// # Examples
///
/// ```
/// # use scope_exit::guard;
/// use std::cell::RefCell;
/// let released = RefCell::new(Vec::new());
/// {
///     let handle = guard(7, |h| released.borrow_mut().push(h));
///     assert_eq!(*handle + 1, 8);
/// }
/// assert_eq!(*released.borrow(), [7]);
/// ```
pub struct ScopeGuard<T, F>
    where F: FnOnce(T)
{
    value: ManuallyDrop<T>,
    f: ManuallyDrop<F>,
}

/// Create a [`ScopeGuard`].
pub fn guard<T, F>(value: T, f: F) -> ScopeGuard<T, F>
    where F: FnOnce(T)
{
    ScopeGuard{value: ManuallyDrop::new(value), f: ManuallyDrop::new(f)}
}

impl<T, F> ScopeGuard<T, F>
    where F: FnOnce(T)
{
    /// Take the value out without running the cleanup function.
    pub fn into_inner(this: Self) -> T
    {
        let mut this = ManuallyDrop::new(this);
        // SAFETY: this is never dropped, so neither field is used again.
        unsafe {
            ManuallyDrop::drop(&mut this.f);
            ManuallyDrop::take(&mut this.value)
        }
    }
}

impl<T, F> Deref for ScopeGuard<T, F>
    where F: FnOnce(T)
{
    type Target = T;

    fn deref(&self) -> &T
    {
        &self.value
    }
}

impl<T, F> DerefMut for ScopeGuard<T, F>
    where F: FnOnce(T)
{
    fn deref_mut(&mut self) -> &mut T
    {
        &mut self.value
    }
}

impl<T, F> Drop for ScopeGuard<T, F>
    where F: FnOnce(T)
{
    fn drop(&mut self)
    {
        // SAFETY: Neither field will be used anymore.
        let (value, f) = unsafe {
            (ManuallyDrop::take(&mut self.value), ManuallyDrop::take(&mut self.f))
        };
        f(value);
    }
}
