//! `Request_*` and `Response_*` accessors
//!
//! Requests and responses reach the client inside `onBeforeResourceLoad` and
//! `onResourceResponse`; their handles stay valid until disposed.

use serde::{Deserialize, Serialize};

use super::{dispose, engine_action, engine_getter};
use crate::engine::{HeaderMap, PostData};
use crate::ipc::Router;

/// Everything the client usually reads from a request, in one round trip
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub url: String,
    pub method: String,
    pub headers: HeaderMap,
    pub post_data: Option<PostData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: i32,
    pub status_text: String,
    pub mime_type: String,
    pub headers: HeaderMap,
}

engine_getter!(
    RequestGetHeaderMap, "Request_GetHeaderMap", request -> HeaderMap = HeaderMap::new(),
    |request| request.header_map()
);
engine_action!(
    RequestSetHeaderMap, "Request_SetHeaderMap", request,
    |request, headers: HeaderMap| request.set_header_map(headers)
);
engine_getter!(
    /// Empty when the header is absent
    RequestGetHeaderByName, "Request_GetHeaderByName", request -> String = String::new(),
    |request, name: String| request.header(&name)
);
engine_action!(
    RequestSetHeaderByName, "Request_SetHeaderByName", request,
    |request, name: String, value: String, overwrite: bool| request.set_header(&name, &value, overwrite)
);
engine_getter!(
    RequestGetPostData, "Request_GetPostData", request -> PostData = PostData::default(),
    |request| request.post_data().unwrap_or_default()
);
engine_action!(
    RequestSetPostData, "Request_SetPostData", request,
    |request, post_data: PostData| request.set_post_data(post_data)
);
engine_action!(
    RequestSet, "Request_Set", request,
    |request, url: String, method: String, post_data: Option<PostData>, headers: HeaderMap|
        request.set(&url, &method, post_data, headers)
);
engine_getter!(
    RequestUpdate, "Request_Update", request -> RequestSnapshot = RequestSnapshot::default(),
    |request| RequestSnapshot {
        url: request.url(),
        method: request.method(),
        headers: request.header_map(),
        post_data: request.post_data(),
    }
);
dispose!(RequestDispose, "Request_Dispose", request);

engine_getter!(
    ResponseGetHeaderMap, "Response_GetHeaderMap", response -> HeaderMap = HeaderMap::new(),
    |response| response.header_map()
);
engine_action!(
    ResponseSetHeaderMap, "Response_SetHeaderMap", response,
    |response, headers: HeaderMap| response.set_header_map(headers)
);
engine_getter!(
    ResponseGetHeaderByName, "Response_GetHeaderByName", response -> String = String::new(),
    |response, name: String| response.header(&name)
);
engine_action!(
    ResponseSetHeaderByName, "Response_SetHeaderByName", response,
    |response, name: String, value: String, overwrite: bool| response.set_header(&name, &value, overwrite)
);
engine_getter!(
    ResponseUpdate, "Response_Update", response -> ResponseSnapshot = ResponseSnapshot::default(),
    |response| ResponseSnapshot {
        status: response.status(),
        status_text: response.status_text(),
        mime_type: response.mime_type(),
        headers: response.header_map(),
    }
);
dispose!(ResponseDispose, "Response_Dispose", response);

pub(super) fn register(router: Router) -> Router {
    router
        .register::<RequestGetHeaderMap>()
        .register::<RequestSetHeaderMap>()
        .register::<RequestGetHeaderByName>()
        .register::<RequestSetHeaderByName>()
        .register::<RequestGetPostData>()
        .register::<RequestSetPostData>()
        .register::<RequestSet>()
        .register::<RequestUpdate>()
        .register::<RequestDispose>()
        .register::<ResponseGetHeaderMap>()
        .register::<ResponseSetHeaderMap>()
        .register::<ResponseGetHeaderByName>()
        .register::<ResponseSetHeaderByName>()
        .register::<ResponseUpdate>()
        .register::<ResponseDispose>()
}
