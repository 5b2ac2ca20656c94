//! Answers to engine callbacks handed to the client
//!
//! Continuing or cancelling does not release the handle, `*_Dispose` does.

use super::{dispose, engine_action};
use crate::ipc::Router;

engine_action!(CallbackContinue, "Callback_Continue", callback, |callback| callback.proceed());
engine_action!(CallbackCancel, "Callback_Cancel", callback, |callback| callback.cancel());
dispose!(CallbackDispose, "Callback_Dispose", callback);

engine_action!(
    AuthCallbackContinue, "AuthCallback_Continue", auth_callback,
    |auth_callback, username: String, password: String| auth_callback.proceed(&username, &password)
);
engine_action!(AuthCallbackCancel, "AuthCallback_Cancel", auth_callback, |auth_callback| auth_callback.cancel());
dispose!(AuthCallbackDispose, "AuthCallback_Dispose", auth_callback);

engine_action!(
    QueryCallbackSuccess, "QueryCallback_Success", query_callback,
    |query_callback, response: String| query_callback.success(&response)
);
engine_action!(
    QueryCallbackFailure, "QueryCallback_Failure", query_callback,
    |query_callback, code: i32, message: String| query_callback.failure(code, &message)
);
dispose!(QueryCallbackDispose, "QueryCallback_Dispose", query_callback);

pub(super) fn register(router: Router) -> Router {
    router
        .register::<CallbackContinue>()
        .register::<CallbackCancel>()
        .register::<CallbackDispose>()
        .register::<AuthCallbackContinue>()
        .register::<AuthCallbackCancel>()
        .register::<AuthCallbackDispose>()
        .register::<QueryCallbackSuccess>()
        .register::<QueryCallbackFailure>()
        .register::<QueryCallbackDispose>()
}
