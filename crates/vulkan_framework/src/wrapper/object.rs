//! Ownership base shared by every device-object wrapper
//!
//! Each wrapper pairs its native handle with a weak reference to the object
//! that created it. Parents are held through `Rc` by whoever owns them, children
//! only point back, so the graph never forms a cycle:
//!
//! ```text
//! Instance -> PhysicalDevice -> Device -> { Buffer, Image, CommandPool, DescriptorPool, ... }
//!                                          CommandPool -> CommandBuffer
//!                                          DescriptorPool -> DescriptorSet
//! ```
//!
//! If a parent goes away first, lookups through the child fail soft: `parent()`
//! returns `None` and logs a warning, and the child's `Drop` skips the native
//! destroy call instead of calling into a dead device.

use ash::vk::{self, Handle};
use std::rc::{Rc, Weak};

use crate::error::{VulkanError, VulkanResult};

/// Native handle plus a weak reference to the owning parent
///
/// Not `Clone`: a native handle has exactly one owner. Moving the value moves
/// ownership; [`GpuObject::take_handle`] nulls the stored handle so a second
/// release is a no-op.
pub struct GpuObject<P, H: Handle + Copy> {
    parent: Weak<P>,
    handle: H,
}

impl<P, H: Handle + Copy> GpuObject<P, H> {
    /// Wrap `handle`, remembering `parent` weakly
    pub fn new(parent: &Rc<P>, handle: H) -> Self {
        Self {
            parent: Rc::downgrade(parent),
            handle,
        }
    }

    /// Wrap a handle that has no parent object
    pub fn orphan(handle: H) -> Self {
        Self {
            parent: Weak::new(),
            handle,
        }
    }

    /// The native handle, null once released
    pub fn handle(&self) -> H {
        self.handle
    }

    /// Whether the handle is non-null
    pub fn is_valid(&self) -> bool {
        self.handle.as_raw() != 0
    }

    /// The parent if it is still alive
    ///
    /// Logs a warning and returns `None` when the parent has been dropped.
    pub fn parent(&self) -> Option<Rc<P>> {
        let parent = self.parent.upgrade();
        if parent.is_none() {
            log::warn!(
                "Parent object not found for {:?} {:#x}",
                H::TYPE,
                self.handle.as_raw()
            );
        }
        parent
    }

    /// The parent, or [`VulkanError::ParentDropped`]
    pub fn require_parent(&self) -> VulkanResult<Rc<P>> {
        self.parent
            .upgrade()
            .ok_or(VulkanError::ParentDropped { object: H::TYPE })
    }

    /// Take the handle out, leaving null behind
    ///
    /// Returns `None` if the handle was already null.
    pub fn take_handle(&mut self) -> Option<H> {
        if !self.is_valid() {
            return None;
        }
        let handle = self.handle;
        self.handle = H::from_raw(0);
        Some(handle)
    }

    /// Release the handle through `destroy` while the parent is alive
    ///
    /// Used by `Drop` impls. Null handles are skipped. With the parent already
    /// gone the handle cannot be destroyed safely and is dropped with a warning.
    pub fn release_with(&mut self, destroy: impl FnOnce(&P, H)) {
        let Some(handle) = self.take_handle() else {
            return;
        };
        match self.parent.upgrade() {
            Some(parent) => destroy(&parent, handle),
            None => log::warn!(
                "{:?} {:#x} released after its parent, skipping native destroy",
                H::TYPE,
                handle.as_raw()
            ),
        }
    }
}

impl<P, H: Handle + Copy + std::fmt::Debug> std::fmt::Debug for GpuObject<P, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuObject")
            .field("handle", &self.handle)
            .field("parent_alive", &(self.parent.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeParent {
        destroyed: Cell<u32>,
    }

    fn parent() -> Rc<FakeParent> {
        Rc::new(FakeParent {
            destroyed: Cell::new(0),
        })
    }

    #[test]
    fn test_parent_lookup_while_alive() {
        let owner = parent();
        let object = GpuObject::new(&owner, vk::Buffer::from_raw(7));
        assert!(object.is_valid());
        assert!(object.parent().is_some());
        assert!(object.require_parent().is_ok());
    }

    #[test]
    fn test_parent_lookup_fails_soft_after_drop() {
        let owner = parent();
        let object = GpuObject::new(&owner, vk::Buffer::from_raw(7));
        drop(owner);
        assert!(object.parent().is_none());
        assert!(matches!(
            object.require_parent(),
            Err(VulkanError::ParentDropped {
                object: vk::ObjectType::BUFFER
            })
        ));
    }

    #[test]
    fn test_release_runs_once() {
        let owner = parent();
        let mut object = GpuObject::new(&owner, vk::Fence::from_raw(3));
        object.release_with(|p, _| p.destroyed.set(p.destroyed.get() + 1));
        object.release_with(|p, _| p.destroyed.set(p.destroyed.get() + 1));
        assert_eq!(owner.destroyed.get(), 1);
        assert!(!object.is_valid());
    }

    #[test]
    fn test_release_skipped_without_parent() {
        let owner = parent();
        let mut object = GpuObject::new(&owner, vk::Fence::from_raw(3));
        drop(owner);
        let mut called = false;
        object.release_with(|_, _| called = true);
        assert!(!called);
        assert!(!object.is_valid());
    }

    #[test]
    fn test_null_handle_is_invalid() {
        let object: GpuObject<FakeParent, vk::Image> = GpuObject::orphan(vk::Image::null());
        assert!(!object.is_valid());
    }
}
