//! Remote object table
//!
//! Every engine object the client can name (browsers, frames, callbacks, requests,
//! message routers…) is reachable only through a [`Handle`]. The table is an arena:
//! a handle packs a slot index with the slot's generation, so a handle kept past
//! its release is rejected even after the slot has been reused.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::engine::{
    AuthCallback, Browser, Callback, Frame, MessageRouter, QueryCallback, Request, Response,
};
use crate::error::{BridgeError, Result};

/// Opaque identifier of an engine object, as seen by the client
///
/// Low 32 bits: slot index. High 32 bits: generation (never zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(u64);

impl Handle {
    fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | index as u64)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    fn index(self) -> usize {
        (self.0 & 0xffff_ffff) as usize
    }

    fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index(), self.generation())
    }
}

/// Kind of object stored behind a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Browser,
    Frame,
    Callback,
    AuthCallback,
    QueryCallback,
    MessageRouter,
    Request,
    Response,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 8] = [
        ObjectKind::Browser,
        ObjectKind::Frame,
        ObjectKind::Callback,
        ObjectKind::AuthCallback,
        ObjectKind::QueryCallback,
        ObjectKind::MessageRouter,
        ObjectKind::Request,
        ObjectKind::Response,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::Browser => "browser",
            ObjectKind::Frame => "frame",
            ObjectKind::Callback => "callback",
            ObjectKind::AuthCallback => "auth_callback",
            ObjectKind::QueryCallback => "query_callback",
            ObjectKind::MessageRouter => "message_router",
            ObjectKind::Request => "request",
            ObjectKind::Response => "response",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An engine object reachable through a handle
#[derive(Clone)]
pub enum TrackedObject {
    Browser(Arc<dyn Browser>),
    Frame(Arc<dyn Frame>),
    Callback(Arc<dyn Callback>),
    AuthCallback(Arc<dyn AuthCallback>),
    QueryCallback(Arc<dyn QueryCallback>),
    MessageRouter(Arc<dyn MessageRouter>),
    Request(Arc<dyn Request>),
    Response(Arc<dyn Response>),
}

impl TrackedObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            TrackedObject::Browser(_) => ObjectKind::Browser,
            TrackedObject::Frame(_) => ObjectKind::Frame,
            TrackedObject::Callback(_) => ObjectKind::Callback,
            TrackedObject::AuthCallback(_) => ObjectKind::AuthCallback,
            TrackedObject::QueryCallback(_) => ObjectKind::QueryCallback,
            TrackedObject::MessageRouter(_) => ObjectKind::MessageRouter,
            TrackedObject::Request(_) => ObjectKind::Request,
            TrackedObject::Response(_) => ObjectKind::Response,
        }
    }
}

impl fmt::Debug for TrackedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrackedObject::{:?}", self.kind())
    }
}

struct Slot {
    generation: u32,
    object: Option<TrackedObject>,
    // handle whose release also releases this one
    owner: Option<Handle>,
}

#[derive(Default)]
struct Slots {
    entries: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Slots {
    fn is_live(&self, handle: Handle) -> bool {
        self.entries
            .get(handle.index())
            .is_some_and(|slot| slot.generation == handle.generation() && slot.object.is_some())
    }

    fn insert(&mut self, object: TrackedObject, owner: Option<Handle>) -> Handle {
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.entries[index as usize];
                slot.object = Some(object);
                slot.owner = owner;
                Handle::new(index, slot.generation)
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(Slot {
                    generation: 1,
                    object: Some(object),
                    owner,
                });
                Handle::new(index, 1)
            }
        };
        self.live += 1;
        handle
    }

    /// Empty a slot and retire its generation
    fn take(&mut self, index: usize) -> Option<TrackedObject> {
        let slot = self.entries.get_mut(index)?;
        let object = slot.object.take()?;
        slot.owner = None;
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        self.free.push(index as u32);
        self.live -= 1;
        Some(object)
    }
}

/// Process-wide registry of handle → engine object
///
/// All operations take the table lock for the duration of a single slot access
/// only. Resolution hands out a clone of the object reference, so an object stays
/// usable by an in-flight call even if another thread releases its handle.
#[derive(Default)]
pub struct ObjectTable {
    slots: Mutex<Slots>,
}

macro_rules! typed_resolve {
    ($(#[$doc:meta])* $fn_name:ident, $variant:ident, $trait_name:ident) => {
        $(#[$doc])*
        pub fn $fn_name(&self, handle: Handle) -> Result<Arc<dyn $trait_name>> {
            match self.resolve(handle)? {
                TrackedObject::$variant(object) => Ok(object),
                other => Err(BridgeError::WrongObjectKind {
                    handle,
                    expected: ObjectKind::$variant,
                    found: other.kind(),
                }),
            }
        }
    };
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // A panic while holding the lock cannot leave a slot half-written,
        // every mutation is a single assignment.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store an object and return its freshly allocated handle
    pub fn register(&self, object: TrackedObject) -> Handle {
        let kind = object.kind();
        let handle = self.lock().insert(object, None);
        tracing::trace!(%handle, %kind, "registered remote object");
        handle
    }

    /// Store an object that lives no longer than `owner`
    ///
    /// Fails with `InvalidHandle` when `owner` is already gone, so nothing can be
    /// attached to a released object.
    pub fn register_owned(&self, object: TrackedObject, owner: Handle) -> Result<Handle> {
        let kind = object.kind();
        let mut slots = self.lock();
        if !slots.is_live(owner) {
            return Err(BridgeError::InvalidHandle(owner));
        }
        let handle = slots.insert(object, Some(owner));
        drop(slots);

        tracing::trace!(%handle, %kind, %owner, "registered owned remote object");
        Ok(handle)
    }

    /// Like [`register_owned`](Self::register_owned), reusing the live handle of
    /// the same kind already owned by `owner`
    pub fn register_unique(&self, object: TrackedObject, owner: Handle) -> Result<Handle> {
        let kind = object.kind();
        let mut slots = self.lock();
        if !slots.is_live(owner) {
            return Err(BridgeError::InvalidHandle(owner));
        }
        let existing = slots.entries.iter().enumerate().find_map(|(index, slot)| {
            let object = slot.object.as_ref()?;
            (slot.owner == Some(owner) && object.kind() == kind)
                .then(|| Handle::new(index as u32, slot.generation))
        });
        Ok(existing.unwrap_or_else(|| slots.insert(object, Some(owner))))
    }

    /// Look up the object behind a handle
    pub fn resolve(&self, handle: Handle) -> Result<TrackedObject> {
        let slots = self.lock();
        slots
            .entries
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.object.clone())
            .ok_or(BridgeError::InvalidHandle(handle))
    }

    /// Drop the mapping for a handle
    ///
    /// Releasing an unknown or already released handle does nothing. Returns the
    /// object that was removed, if any.
    pub fn release(&self, handle: Handle) -> Option<TrackedObject> {
        let mut slots = self.lock();
        if !slots.is_live(handle) {
            return None;
        }
        let object = slots.take(handle.index())?;
        drop(slots);

        tracing::trace!(%handle, kind = %object.kind(), "released remote object");
        Some(object)
    }

    /// Release a handle together with every handle it owns
    ///
    /// Returns the number of handles released.
    pub fn release_tree(&self, owner: Handle) -> usize {
        let mut slots = self.lock();
        let mut released = usize::from(slots.is_live(owner) && slots.take(owner.index()).is_some());
        let owned: Vec<usize> = slots
            .entries
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.object.is_some() && slot.owner == Some(owner))
            .map(|(index, _)| index)
            .collect();
        for index in owned {
            released += usize::from(slots.take(index).is_some());
        }
        released
    }

    typed_resolve!(
        /// Resolve a handle that must name a browser
        browser, Browser, Browser
    );
    typed_resolve!(frame, Frame, Frame);
    typed_resolve!(callback, Callback, Callback);
    typed_resolve!(auth_callback, AuthCallback, AuthCallback);
    typed_resolve!(query_callback, QueryCallback, QueryCallback);
    typed_resolve!(message_router, MessageRouter, MessageRouter);
    typed_resolve!(request, Request, Request);
    typed_resolve!(response, Response, Response);

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live handles per object kind
    pub fn counts(&self) -> Vec<(ObjectKind, usize)> {
        let slots = self.lock();
        ObjectKind::ALL
            .iter()
            .map(|&kind| {
                let count = slots
                    .entries
                    .iter()
                    .filter_map(|slot| slot.object.as_ref())
                    .filter(|object| object.kind() == kind)
                    .count();
                (kind, count)
            })
            .collect()
    }

    /// Release every handle, returning the objects that were still live
    pub fn clear(&self) -> Vec<TrackedObject> {
        let mut slots = self.lock();
        (0..slots.entries.len()).filter_map(|index| slots.take(index)).collect()
    }
}
