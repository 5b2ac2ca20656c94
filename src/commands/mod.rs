//! The remote method surface
//!
//! Each method is a [`Command`](crate::ipc::Command) whose fields are the
//! positional arguments on the wire. Methods that return a value wait for the
//! engine with [`Dispatcher::post_sync_or`](crate::Dispatcher::post_sync_or)
//! and answer a default on timeout; the rest are queued with `post_async`.

use crate::ipc::Router;

pub mod browser;
pub mod callbacks;
pub mod message_router;
pub mod objects;
pub mod session;

/// Fire-and-forget method on one object kind
///
/// Resolves the handle on the calling thread, then queues the body on the
/// engine thread.
macro_rules! engine_action {
    (
        $(#[$doc:meta])*
        $name:ident, $method:literal, $resolve:ident,
        |$target:ident $(, $field:ident: $ty:ty)*| $body:expr
    ) => {
        $(#[$doc])*
        #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
        pub struct $name {
            pub $target: crate::handle::Handle,
            $(pub $field: $ty,)*
        }

        impl crate::ipc::Command for $name {
            const METHOD: &'static str = $method;
            type Reply = ();

            fn handle(self, session: &mut crate::session::Session) -> crate::error::Result<()> {
                let bridge = session.bridge();
                let $target = bridge.objects().$resolve(self.$target)?;
                $(let $field = self.$field;)*
                bridge.dispatcher().post_async(move || $body)
            }
        }
    };
}

/// Value-returning method on one object kind, answering `$default` on timeout
macro_rules! engine_getter {
    (
        $(#[$doc:meta])*
        $name:ident, $method:literal, $resolve:ident -> $reply:ty = $default:expr,
        |$target:ident $(, $field:ident: $ty:ty)*| $body:expr
    ) => {
        $(#[$doc])*
        #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
        pub struct $name {
            pub $target: crate::handle::Handle,
            $(pub $field: $ty,)*
        }

        impl crate::ipc::Command for $name {
            const METHOD: &'static str = $method;
            type Reply = $reply;

            fn handle(self, session: &mut crate::session::Session) -> crate::error::Result<$reply> {
                let bridge = session.bridge();
                let $target = bridge.objects().$resolve(self.$target)?;
                $(let $field = self.$field;)*
                bridge.dispatcher().post_sync_or($default, move || $body)
            }
        }
    };
}

/// Release a handle of one kind
///
/// Checks the kind first so disposing a live handle of another kind fails.
/// Disposing a handle that is already gone succeeds.
macro_rules! dispose {
    ($(#[$doc:meta])* $name:ident, $method:literal, $resolve:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
        pub struct $name {
            pub handle: crate::handle::Handle,
        }

        impl crate::ipc::Command for $name {
            const METHOD: &'static str = $method;
            type Reply = ();

            fn handle(self, session: &mut crate::session::Session) -> crate::error::Result<()> {
                let objects = session.bridge().objects();
                match objects.$resolve(self.handle) {
                    Ok(_) => {
                        objects.release(self.handle);
                        Ok(())
                    }
                    Err(crate::error::BridgeError::InvalidHandle(_)) => Ok(()),
                    Err(e) => Err(e),
                }
            }
        }
    };
}

pub(crate) use {dispose, engine_action, engine_getter};

/// Router with every method registered
pub fn build_router() -> Router {
    let router = Router::new();
    let router = session::register(router);
    let router = browser::register(router);
    let router = objects::register(router);
    let router = callbacks::register(router);
    message_router::register(router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_covers_method_surface() {
        let router = build_router();
        for method in [
            "connect",
            "connectTcp",
            "log",
            "echo",
            "version",
            "state",
            "stop",
            "createBrowser",
            "startBrowserCreation",
            "closeBrowser",
            "Browser_Reload",
            "Browser_GetURL",
            "Browser_SendKeyEvent",
            "Browser_SendMouseWheelEvent",
            "Browser_ImeCancelComposing",
            "Browser_GetMainFrame",
            "Frame_GetURL",
            "Request_Set",
            "Request_Update",
            "Response_SetHeaderByName",
            "Callback_Continue",
            "AuthCallback_Continue",
            "QueryCallback_Failure",
            "MessageRouter_Create",
            "MessageRouter_CancelPending",
        ] {
            assert!(router.contains(method), "{method} is not registered");
        }
    }
}
