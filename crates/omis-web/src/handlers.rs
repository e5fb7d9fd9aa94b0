use axum::extract::{Form, Query, State};
use axum::response::{Html, Redirect};
use omis_core::{CoreError, NewRequest, RequestStore};
use serde::Deserialize;

use crate::html::{render_new_request, render_request_list, Banner};
use crate::WebState;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct NoticeQuery {
    #[serde(default)]
    notice: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl NoticeQuery {
    fn banner(&self) -> Option<Banner> {
        if let Some(error) = self.error.as_deref() {
            return Some(Banner::Error(match error {
                "duplicate" => "This request and position already exist.",
                "storage" => "The request could not be saved.",
                "missing" => "Request number and position number are required.",
                _ => "Something went wrong.",
            }));
        }
        match self.notice.as_deref() {
            Some("created") => Some(Banner::Success("Request created.")),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AddRequestForm {
    #[serde(default)]
    request_number: String,
    #[serde(default)]
    position_number: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    comment_author: String,
}

pub(crate) async fn index() -> Redirect {
    Redirect::to("/requests")
}

pub(crate) async fn list_requests(
    State(state): State<WebState>,
    Query(query): Query<NoticeQuery>,
) -> Html<String> {
    let mut banner = query.banner();
    let records = match state.with_store(|store| store.list()).await {
        Ok(records) => records,
        Err(error) => {
            tracing::error!(%error, "failed to load request list");
            banner = Some(Banner::Error("Could not load the request list."));
            Vec::new()
        }
    };
    Html(render_request_list(&records, banner))
}

pub(crate) async fn new_request(Query(query): Query<NoticeQuery>) -> Html<String> {
    Html(render_new_request(query.banner()))
}

pub(crate) async fn add_request(
    State(state): State<WebState>,
    Form(form): Form<AddRequestForm>,
) -> Redirect {
    let request = NewRequest {
        request_number: form.request_number,
        position_number: form.position_number,
        comment: Some(form.comment),
        comment_author: Some(form.comment_author),
    };
    let request = match request.normalized() {
        Ok(request) => request,
        Err(_) => return Redirect::to("/new?error=missing"),
    };

    match state.with_store(move |store| store.add(request)).await {
        Ok(_) => Redirect::to("/requests?notice=created"),
        Err(CoreError::DuplicateRequest { .. }) => Redirect::to("/requests?error=duplicate"),
        Err(CoreError::Validation(_)) => Redirect::to("/new?error=missing"),
        Err(error) => {
            tracing::error!(%error, "failed to store submitted request");
            Redirect::to("/requests?error=storage")
        }
    }
}
