//! Typed event names and handlers.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Binds one event name to one payload type.
///
/// Implementors are usually zero-sized marker types generated by
/// [`event_map!`](crate::event_map). The payload bounds let every transport,
/// including those that put payloads on a wire, carry the event.
///
/// ```
/// use typed_bus::Event;
///
/// struct UserCreated;
///
/// impl Event for UserCreated {
///     const NAME: &'static str = "user.created";
///     type Payload = String;
/// }
///
/// assert_eq!(UserCreated::NAME, "user.created");
/// ```
pub trait Event: 'static {
    /// Name the event travels under. Unique within one event map.
    const NAME: &'static str;

    /// Data carried by one emission of the event.
    type Payload: Serialize + DeserializeOwned + Send + Sync + 'static;
}

/// Declares the marker types of an event map.
///
/// ```
/// use typed_bus::{event_map, Event};
///
/// #[derive(serde::Serialize, serde::Deserialize)]
/// pub struct User {
///     pub name: String,
/// }
///
/// event_map! {
///     /// A user signed up.
///     pub struct UserCreated: "user.created" => User;
///     pub struct UserDeleted: "user.deleted" => u64;
/// }
///
/// assert_eq!(UserDeleted::NAME, "user.deleted");
/// ```
#[macro_export]
macro_rules! event_map {
    ($( $(#[$meta:meta])* $vis:vis struct $name:ident : $key:literal => $payload:ty ; )*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
            $vis struct $name;

            impl $crate::Event for $name {
                const NAME: &'static str = $key;
                type Payload = $payload;
            }
        )*
    };
}

/// Stable identity of a [`Handler`], shared by all of its clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(usize);

/// A callback invoked with a payload reference.
///
/// Handlers are compared by identity, never by value: clones of one handler
/// are the same handler, while two handlers built from identical closures are
/// not. Keep a clone around to [`off`](crate::Bus::off) it later.
pub struct Handler<P> {
    callback: Arc<dyn Fn(&P) + Send + Sync>,
}

impl<P> Handler<P> {
    /// Wrap `callback` in a new handler with its own identity.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Invoke the callback with `payload`.
    pub fn call(&self, payload: &P) {
        (self.callback)(payload)
    }

    /// Identity shared by this handler and all of its clones.
    pub fn id(&self) -> HandlerId {
        HandlerId(Arc::as_ptr(&self.callback) as *const () as usize)
    }

    /// `true` if `other` is this handler or a clone of it.
    pub fn same(&self, other: &Handler<P>) -> bool {
        self.id() == other.id()
    }
}

impl<P> Clone for Handler<P> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<P> fmt::Debug for Handler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.id()).finish()
    }
}
