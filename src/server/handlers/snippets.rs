use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Extension, Form,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{debug, error, info};

use crate::{
    app_state::AppState,
    sessions::{self, SessionUser},
    snippets,
    templates::{
        HtmlTemplate, SnippetCreateTemplate, SnippetFieldErrors, SnippetFormValues, SnippetRow,
        SnippetViewTemplate,
    },
    validator::{self, Validator},
};

use super::shared::{layout_from_session, not_found_response};
use crate::server::{
    constants::{
        DEFAULT_EXPIRY_DAYS, PERMITTED_EXPIRY_DAYS, SNIPPET_CONTENT_MAX_CHARS,
        SNIPPET_TITLE_MAX_CHARS,
    },
    utils::server_error_response,
};

#[derive(Debug, Default, Deserialize)]
pub struct SnippetCreateForm {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    expires: String,
}

impl SnippetCreateForm {
    /// Check the submission, returning the parsed expiry in days when it is valid.
    fn validate(&self) -> Result<i64, Validator> {
        let mut v = Validator::new();

        v.check_field(
            validator::not_blank(&self.title),
            "title",
            "This field cannot be blank",
        );
        v.check_field(
            validator::max_chars(&self.title, SNIPPET_TITLE_MAX_CHARS),
            "title",
            format!("This field cannot be more than {SNIPPET_TITLE_MAX_CHARS} characters long"),
        );
        v.check_field(
            validator::not_blank(&self.content),
            "content",
            "This field cannot be blank",
        );
        v.check_field(
            validator::max_chars(&self.content, SNIPPET_CONTENT_MAX_CHARS),
            "content",
            format!("This field cannot be more than {SNIPPET_CONTENT_MAX_CHARS} characters long"),
        );

        let expires = self.expires.trim().parse::<i64>().ok();
        v.check_field(
            expires.is_some_and(|days| validator::permitted_value(&days, &PERMITTED_EXPIRY_DAYS)),
            "expires",
            "This field must equal 1, 7 or 365",
        );

        match expires {
            Some(days) if v.is_valid() => Ok(days),
            _ => Err(v),
        }
    }

    fn values(&self) -> SnippetFormValues {
        SnippetFormValues {
            title: self.title.clone(),
            content: self.content.clone(),
            expires: self.expires.trim().to_string(),
        }
    }
}

/// GET /snippet/view/:id
pub async fn snippet_view_handler(
    State(state): State<AppState>,
    session: Session,
    Path(raw_id): Path<String>,
) -> Response {
    let Some(id) = snippets::parse_snippet_id(&raw_id) else {
        debug!(target: "snippets", raw_id = %raw_id, "rejecting malformed snippet id");
        return not_found_response(&state, &session).await;
    };

    let snippet = match snippets::get_snippet(state.db(), id).await {
        Ok(Some(snippet)) => snippet,
        Ok(None) => return not_found_response(&state, &session).await,
        Err(err) => {
            error!(target: "snippets", %err, id, "failed to load snippet");
            return server_error_response();
        }
    };

    let row = SnippetRow::from(snippet);
    let title = format!("Snippet #{}", row.id);
    let layout = layout_from_session(&state, &session, &title).await;

    HtmlTemplate::new(SnippetViewTemplate::new(layout, row)).into_response()
}

/// GET /snippet/create
pub async fn snippet_create_form_handler(
    State(state): State<AppState>,
    session: Session,
) -> Response {
    let form = SnippetFormValues {
        expires: DEFAULT_EXPIRY_DAYS.to_string(),
        ..SnippetFormValues::default()
    };

    render_create_form(&state, &session, StatusCode::OK, form, SnippetFieldErrors::default()).await
}

/// POST /snippet/create
pub async fn snippet_create_submit_handler(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    session: Session,
    Form(form): Form<SnippetCreateForm>,
) -> Response {
    let expires_days = match form.validate() {
        Ok(days) => days,
        Err(v) => {
            return render_create_form(
                &state,
                &session,
                StatusCode::UNPROCESSABLE_ENTITY,
                form.values(),
                SnippetFieldErrors::from_validator(&v),
            )
            .await;
        }
    };

    let id = match snippets::insert_snippet(state.db(), &form.title, &form.content, expires_days)
        .await
    {
        Ok(id) => id,
        Err(err) => {
            error!(target: "snippets", %err, user_id = user.id, "failed to insert snippet");
            return server_error_response();
        }
    };

    if let Err(err) = sessions::put_flash(&session, "Snippet successfully created!").await {
        error!(target: "sessions", %err, "failed to store flash after snippet creation");
    }

    info!(target: "snippets", id, user_id = user.id, expires_days, "snippet created");

    Redirect::to(&format!("/snippet/view/{id}")).into_response()
}

async fn render_create_form(
    state: &AppState,
    session: &Session,
    status: StatusCode,
    form: SnippetFormValues,
    field_errors: SnippetFieldErrors,
) -> Response {
    let layout = layout_from_session(state, session, "Create a New Snippet").await;
    let template = SnippetCreateTemplate::new(layout, form).with_field_errors(field_errors);

    HtmlTemplate::with_status(template, status).into_response()
}
