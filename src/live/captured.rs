//! Opaque evaluation errors
//!
//! Whatever failed during background evaluation is latched as a
//! `CapturedError`. The delivery layer never looks inside it; callers that
//! know the concrete type can `downcast_ref`.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// A shared, type-erased evaluation error
#[derive(Clone)]
pub struct CapturedError {
    inner: Arc<dyn Error + Send + Sync + 'static>,
}

impl CapturedError {
    pub fn new<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(err),
        }
    }

    pub fn message(&self) -> String {
        self.inner.to_string()
    }

    /// Borrow the original error if it is an `E`
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// True if both handles share the same latched error
    pub fn ptr_eq(&self, other: &CapturedError) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<E> From<E> for CapturedError
where
    E: Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::new(err)
    }
}

impl fmt::Debug for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CapturedError").field(&self.message()).finish()
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StorageError;

    #[test]
    fn test_downcast_to_original() {
        let err = CapturedError::new(StorageError::CollectionNotFound("posts".into()));
        assert_eq!(
            err.downcast_ref::<StorageError>(),
            Some(&StorageError::CollectionNotFound("posts".into()))
        );
        assert!(err.downcast_ref::<std::io::Error>().is_none());
    }

    #[test]
    fn test_clones_share_the_error() {
        let err = CapturedError::from(StorageError::ViewDetached);
        let clone = err.clone();
        assert!(err.ptr_eq(&clone));
        assert_eq!(clone.message(), "Table view is not attached");
    }
}
