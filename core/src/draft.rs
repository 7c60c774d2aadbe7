//! Copy-on-write draft builder
//!
//! A [`Draft`] lets a reducer write "mutating" code against a scratch copy
//! while still honoring the identity contract: if nothing is ever touched
//! mutably, [`Draft::finish`] hands back the original `Arc`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tideway_core::produce;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Todos {
//!     items: Vec<String>,
//!     filter: String,
//! }
//!
//! let base = Arc::new(Todos { items: vec![], filter: "all".into() });
//!
//! let next = produce(&base, |draft| {
//!     draft.get_mut().items.push("write docs".into());
//! });
//! assert_eq!(next.items.len(), 1);
//! assert!(base.items.is_empty());
//!
//! let untouched = produce(&base, |draft| {
//!     assert_eq!(draft.filter, "all");
//! });
//! assert!(Arc::ptr_eq(&base, &untouched));
//! ```

use std::ops::Deref;
use std::sync::Arc;

/// A scratch copy of a state value that is only cloned on first write
#[derive(Debug)]
pub struct Draft<T> {
    current: Arc<T>,
    touched: bool,
}

impl<T: Clone> Draft<T> {
    /// Start a draft over `base`
    ///
    /// The draft holds its own reference, so `base` is never written through.
    #[must_use]
    pub fn new(base: &Arc<T>) -> Self {
        Self {
            current: Arc::clone(base),
            touched: false,
        }
    }

    /// Mutable access to the scratch copy
    ///
    /// The first call clones the value; later calls reuse that copy.
    pub fn get_mut(&mut self) -> &mut T {
        self.touched = true;
        Arc::make_mut(&mut self.current)
    }

    /// Replace the whole value
    pub fn set(&mut self, value: T) {
        self.touched = true;
        self.current = Arc::new(value);
    }

    /// Whether any mutable access happened
    #[must_use]
    pub const fn is_touched(&self) -> bool {
        self.touched
    }

    /// Produce the resulting state
    ///
    /// Returns the original `Arc` when the draft was never touched.
    #[must_use]
    pub fn finish(self) -> Arc<T> {
        self.current
    }
}

impl<T> Deref for Draft<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.current
    }
}

/// Run `recipe` against a draft of `base` and return the result
pub fn produce<T, F>(base: &Arc<T>, recipe: F) -> Arc<T>
where
    T: Clone,
    F: FnOnce(&mut Draft<T>),
{
    let mut draft = Draft::new(base);
    recipe(&mut draft);
    draft.finish()
}
