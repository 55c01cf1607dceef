use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use time::OffsetDateTime;
use tower_sessions::Session;
use tracing::error;

use crate::{
    app_state::AppState,
    csrf,
    logins::{self, LoginError},
    server::utils::{format_timestamp_utc, server_error_response},
    sessions::{take_flash, SessionUser},
    snippets::Snippet,
    validator::Validator,
};

/// Shared layout context injected into all templates
#[derive(Clone, Debug)]
pub struct LayoutContext {
    pub title: String,
    pub brand_name: String,
    pub csrf: Option<CsrfMeta>,
    pub current_user: Option<SessionUser>,
    pub flash: Option<String>,
    pub current_year: i32,
}

/// CSRF metadata exposed to templates
#[derive(Clone, Debug)]
pub struct CsrfMeta {
    pub token: String,
}

impl LayoutContext {
    /// Build a layout context using only the configured brand name
    pub fn from_state(state: &AppState, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            brand_name: state.config().ui.brand_name.clone(),
            csrf: None,
            current_user: None,
            flash: None,
            current_year: OffsetDateTime::now_utc().year(),
        }
    }

    /// Build the full context: CSRF token, signed-in user (only with a live login) and the
    /// pending flash message.
    ///
    /// The flash message is consumed here, so only call this for pages that will be shown.
    pub async fn from_session(
        state: &AppState,
        session: &Session,
        title: impl Into<String>,
    ) -> Result<Self, LoginError> {
        let token = csrf::ensure_csrf_token(session).await?;
        let ttl = state.config().session_idle_timeout();
        let user = logins::resolve_user(state.db(), session, ttl).await?;
        let flash = take_flash(session).await?;

        let mut layout = Self::from_state(state, title).with_csrf_token(Some(token));
        layout.current_user = user;
        layout.flash = flash;
        Ok(layout)
    }

    /// Attach a CSRF token that will be emitted in forms
    pub fn with_csrf_token(mut self, token: Option<String>) -> Self {
        self.csrf = token.map(|token| CsrfMeta { token });
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_user.is_some()
    }

    /// Token value for hidden form fields; empty when none was issued.
    pub fn csrf_token(&self) -> &str {
        self.csrf.as_ref().map(|csrf| csrf.token.as_str()).unwrap_or("")
    }
}

/// Wrapper that converts Askama templates into Axum responses with logging
pub struct HtmlTemplate<T: Template> {
    template: T,
    status: StatusCode,
}

impl<T: Template> HtmlTemplate<T> {
    pub fn new(template: T) -> Self {
        Self {
            template,
            status: StatusCode::OK,
        }
    }

    pub fn with_status(template: T, status: StatusCode) -> Self {
        Self { template, status }
    }
}

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.template.render() {
            Ok(html) => (self.status, Html(html)).into_response(),
            Err(err) => {
                error!(target: "templates", error = %err, "failed to render template");
                server_error_response()
            }
        }
    }
}

/// A snippet prepared for display.
#[derive(Clone, Debug)]
pub struct SnippetRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created_display: String,
    pub expires_display: String,
}

impl From<Snippet> for SnippetRow {
    fn from(snippet: Snippet) -> Self {
        Self {
            id: snippet.id,
            title: snippet.title,
            content: snippet.content,
            created_display: format_timestamp_utc(snippet.created_at),
            expires_display: format_timestamp_utc(snippet.expires_at),
        }
    }
}

#[derive(Template)]
#[template(path = "home.html", escape = "html")]
pub struct HomeTemplate {
    pub layout: LayoutContext,
    pub snippets: Vec<SnippetRow>,
}

impl HomeTemplate {
    pub fn new(layout: LayoutContext, snippets: Vec<SnippetRow>) -> Self {
        Self { layout, snippets }
    }
}

#[derive(Template)]
#[template(path = "view.html", escape = "html")]
pub struct SnippetViewTemplate {
    pub layout: LayoutContext,
    pub snippet: SnippetRow,
}

impl SnippetViewTemplate {
    pub fn new(layout: LayoutContext, snippet: SnippetRow) -> Self {
        Self { layout, snippet }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SnippetFormValues {
    pub title: String,
    pub content: String,
    pub expires: String,
}

#[derive(Clone, Debug, Default)]
pub struct SnippetFieldErrors {
    pub title: Option<String>,
    pub content: Option<String>,
    pub expires: Option<String>,
}

impl SnippetFieldErrors {
    pub fn from_validator(validator: &Validator) -> Self {
        Self {
            title: validator.first_error("title"),
            content: validator.first_error("content"),
            expires: validator.first_error("expires"),
        }
    }
}

/// One radio button of the expiry picker.
#[derive(Clone, Debug)]
pub struct ExpiryOption {
    pub days: i64,
    pub label: &'static str,
}

#[derive(Template)]
#[template(path = "create.html", escape = "html")]
pub struct SnippetCreateTemplate {
    pub layout: LayoutContext,
    pub form: SnippetFormValues,
    pub field_errors: SnippetFieldErrors,
    pub expiry_options: Vec<ExpiryOption>,
}

impl SnippetCreateTemplate {
    pub fn new(layout: LayoutContext, form: SnippetFormValues) -> Self {
        let expiry_options = crate::server::constants::EXPIRY_OPTIONS
            .iter()
            .map(|&(days, label)| ExpiryOption { days, label })
            .collect();

        Self {
            layout,
            form,
            field_errors: SnippetFieldErrors::default(),
            expiry_options,
        }
    }

    pub fn with_field_errors(mut self, field_errors: SnippetFieldErrors) -> Self {
        self.field_errors = field_errors;
        self
    }

    /// Whether the radio button for `days` should be pre-selected.
    pub fn is_selected(&self, days: &i64) -> bool {
        self.form.expires.trim() == days.to_string()
    }
}

/// Values echoed back into the signup form. The password is never echoed.
#[derive(Clone, Debug, Default)]
pub struct SignupFormValues {
    pub name: String,
    pub email: String,
}

#[derive(Clone, Debug, Default)]
pub struct SignupFieldErrors {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl SignupFieldErrors {
    pub fn from_validator(validator: &Validator) -> Self {
        Self {
            name: validator.first_error("name"),
            email: validator.first_error("email"),
            password: validator.first_error("password"),
        }
    }
}

#[derive(Template)]
#[template(path = "signup.html", escape = "html")]
pub struct SignupTemplate {
    pub layout: LayoutContext,
    pub form: SignupFormValues,
    pub field_errors: SignupFieldErrors,
}

impl SignupTemplate {
    pub fn new(layout: LayoutContext) -> Self {
        Self {
            layout,
            form: SignupFormValues::default(),
            field_errors: SignupFieldErrors::default(),
        }
    }

    pub fn with_form(mut self, form: SignupFormValues) -> Self {
        self.form = form;
        self
    }

    pub fn with_field_errors(mut self, field_errors: SignupFieldErrors) -> Self {
        self.field_errors = field_errors;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoginFieldErrors {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl LoginFieldErrors {
    pub fn from_validator(validator: &Validator) -> Self {
        Self {
            email: validator.first_error("email"),
            password: validator.first_error("password"),
        }
    }
}

#[derive(Template)]
#[template(path = "login.html", escape = "html")]
pub struct LoginTemplate {
    pub layout: LayoutContext,
    pub email: String,
    pub field_errors: LoginFieldErrors,
    pub error_messages: Vec<String>,
}

impl LoginTemplate {
    pub fn new(layout: LayoutContext) -> Self {
        Self {
            layout,
            email: String::new(),
            field_errors: LoginFieldErrors::default(),
            error_messages: Vec::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_validator(mut self, validator: &Validator) -> Self {
        self.field_errors = LoginFieldErrors::from_validator(validator);
        self.error_messages = validator.non_field_errors().to_vec();
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_messages.push(message.into());
        self
    }
}

#[derive(Template)]
#[template(path = "not_found.html", escape = "html")]
pub struct NotFoundTemplate {
    pub layout: LayoutContext,
}

impl NotFoundTemplate {
    pub fn new(layout: LayoutContext) -> Self {
        Self { layout }
    }
}
