//! Collaborator routes named in section 6 whose implementations live
//! outside this core: youtube/answer/agent/activity.

use axum::response::Response;

use super::not_implemented;

pub async fn youtube() -> Response {
    not_implemented("youtube extractor")
}

pub async fn answer() -> Response {
    not_implemented("llm-driven research agent")
}

pub async fn agent() -> Response {
    not_implemented("llm-driven research agent")
}

pub async fn agent_async() -> Response {
    not_implemented("llm-driven research agent")
}

pub async fn agent_stream() -> Response {
    not_implemented("llm-driven research agent")
}

pub async fn activity() -> Response {
    not_implemented("persistent auth/activity store")
}
