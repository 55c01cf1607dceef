use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Extension, Form,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{error, info, warn};

use crate::{
    app_state::AppState,
    auth::{self, randomized_backoff, AuthError, PASSWORD_MIN_CHARS},
    csrf,
    logins,
    rate_limit::RateLimitError,
    sessions::{self, SessionUser},
    templates::{
        HtmlTemplate, LoginTemplate, SignupFieldErrors, SignupFormValues, SignupTemplate,
    },
    validator::{self, Validator, EMAIL_RX},
};

use crate::server::{
    constants::{AFTER_LOGIN_PATH, EMAIL_MAX_CHARS, LOGIN_PATH, USER_NAME_MAX_CHARS},
    utils::{attach_retry_after, server_error_response},
};

use super::shared::layout_from_session;

const INVALID_CREDENTIALS_MESSAGE: &str = "Email or password is incorrect";
const DUPLICATE_EMAIL_MESSAGE: &str = "Email address is already in use";

#[derive(Debug, Default, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

impl SignupForm {
    fn validate(&self) -> Validator {
        let mut v = Validator::new();

        v.check_field(
            validator::not_blank(&self.name),
            "name",
            "This field cannot be blank",
        );
        v.check_field(
            validator::max_chars(&self.name, USER_NAME_MAX_CHARS),
            "name",
            format!("This field cannot be more than {USER_NAME_MAX_CHARS} characters long"),
        );
        v.check_field(
            validator::not_blank(&self.email),
            "email",
            "This field cannot be blank",
        );
        v.check_field(
            validator::max_chars(&self.email, EMAIL_MAX_CHARS),
            "email",
            format!("This field cannot be more than {EMAIL_MAX_CHARS} characters long"),
        );
        v.check_field(
            validator::matches(&self.email, &EMAIL_RX),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(
            validator::not_blank(&self.password),
            "password",
            "This field cannot be blank",
        );
        v.check_field(
            validator::min_chars(&self.password, PASSWORD_MIN_CHARS),
            "password",
            format!("This field must be at least {PASSWORD_MIN_CHARS} characters long"),
        );

        v
    }

    fn values(&self) -> SignupFormValues {
        SignupFormValues {
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

impl LoginForm {
    fn validate(&self) -> Validator {
        let mut v = Validator::new();

        v.check_field(
            validator::not_blank(&self.email),
            "email",
            "This field cannot be blank",
        );
        v.check_field(
            validator::matches(&self.email, &EMAIL_RX),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(
            validator::not_blank(&self.password),
            "password",
            "This field cannot be blank",
        );

        v
    }
}

/// GET /user/signup
pub async fn signup_form_handler(State(state): State<AppState>, session: Session) -> Response {
    render_signup_form(
        &state,
        &session,
        StatusCode::OK,
        SignupFormValues::default(),
        SignupFieldErrors::default(),
    )
    .await
}

/// POST /user/signup
///
/// The CSRF guard has already run. Duplicate emails are only detected by the
/// insert itself so two concurrent signups can't both pass a pre-check.
pub async fn signup_submit_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<SignupForm>,
) -> Response {
    let v = form.validate();
    if !v.is_valid() {
        return render_signup_form(
            &state,
            &session,
            StatusCode::UNPROCESSABLE_ENTITY,
            form.values(),
            SignupFieldErrors::from_validator(&v),
        )
        .await;
    }

    let user_id = match auth::register_user(
        state.db(),
        &form.name,
        &form.email,
        &form.password,
        state.password_pepper(),
    )
    .await
    {
        Ok(id) => id,
        Err(AuthError::DuplicateEmail) => {
            let mut v = Validator::new();
            v.add_field_error("email", DUPLICATE_EMAIL_MESSAGE);
            return render_signup_form(
                &state,
                &session,
                StatusCode::UNPROCESSABLE_ENTITY,
                form.values(),
                SignupFieldErrors::from_validator(&v),
            )
            .await;
        }
        Err(err) => {
            error!(target: "auth", %err, "failed to create user during signup");
            return server_error_response();
        }
    };

    if let Err(err) =
        sessions::put_flash(&session, "Your signup was successful. Please log in.").await
    {
        error!(target: "sessions", %err, "failed to store signup flash message");
    }

    info!(target: "auth", user_id, "user signed up");

    Redirect::to(LOGIN_PATH).into_response()
}

/// GET /user/login
pub async fn login_form_handler(State(state): State<AppState>, session: Session) -> Response {
    let layout = layout_from_session(&state, &session, "Login").await;
    HtmlTemplate::new(LoginTemplate::new(layout)).into_response()
}

/// POST /user/login
pub async fn login_submit_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let client_ip = addr.ip();

    if let Err(err) = state.login_rate_limiter().check_ip(client_ip) {
        warn!(target: "auth", ip = %client_ip, %err, "rate limited login by IP");
        return rate_limited_login_response(&state, &session, &form.email, &err).await;
    }

    let v = form.validate();
    if !v.is_valid() {
        let template = LoginTemplate::new(layout_from_session(&state, &session, "Login").await)
            .with_email(form.email.as_str())
            .with_validator(&v);
        return HtmlTemplate::with_status(template, StatusCode::UNPROCESSABLE_ENTITY)
            .into_response();
    }

    if let Err(err) = state.login_rate_limiter().check_email(&form.email) {
        warn!(target: "auth", %err, "rate limited login by email");
        return rate_limited_login_response(&state, &session, &form.email, &err).await;
    }

    let user = match auth::authenticate(
        state.db(),
        &form.email,
        &form.password,
        state.password_pepper(),
    )
    .await
    {
        Ok(user) => user,
        Err(AuthError::InvalidCredentials) => {
            randomized_backoff().await;
            let mut v = Validator::new();
            v.add_non_field_error(INVALID_CREDENTIALS_MESSAGE);
            let template = LoginTemplate::new(layout_from_session(&state, &session, "Login").await)
                .with_email(form.email.as_str())
                .with_validator(&v);
            return HtmlTemplate::with_status(template, StatusCode::UNPROCESSABLE_ENTITY)
                .into_response();
        }
        Err(err) => {
            error!(target: "auth", %err, "error verifying credentials");
            return server_error_response();
        }
    };

    let ttl = state.config().session_idle_timeout();
    let login_token = match logins::start_login(state.db(), user.id, ttl).await {
        Ok(token) => token,
        Err(err) => {
            error!(target: "auth", %err, "failed to record login");
            return server_error_response();
        }
    };

    if let Err(err) = sessions::rotate_session(&session).await {
        error!(target: "auth", %err, "failed to cycle session ID on login");
        return server_error_response();
    }

    let session_user = SessionUser::new(user.id, user.name.clone(), login_token);
    if let Err(err) = sessions::store_user(&session, &session_user).await {
        error!(target: "auth", %err, "failed to persist authenticated user in session");
        return server_error_response();
    }

    if let Err(err) = csrf::rotate_csrf_token(&session).await {
        error!(target: "csrf", %err, "failed to rotate CSRF token after login");
    }

    let destination = match sessions::take_redirect(&session).await {
        Ok(path) => path.unwrap_or_else(|| AFTER_LOGIN_PATH.to_string()),
        Err(err) => {
            error!(target: "sessions", %err, "failed to read post-login redirect");
            AFTER_LOGIN_PATH.to_string()
        }
    };

    info!(target: "auth", user_id = user.id, "user logged in");

    Redirect::to(&destination).into_response()
}

/// POST /user/logout
///
/// The login record is deleted first: from then on no copy of this session,
/// including one saved late by a request still in flight, is authenticated.
/// The CSRF token survives so forms already open in other tabs keep working.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    session: Session,
) -> Response {
    if let Err(err) = logins::end_login(state.db(), &user.login_token).await {
        error!(target: "auth", %err, user_id = user.id, "failed to end login");
        return server_error_response();
    }

    if let Err(err) = sessions::clear_user(&session).await {
        error!(target: "auth", %err, "failed to clear user session on logout");
        return server_error_response();
    }

    if let Err(err) = sessions::rotate_session(&session).await {
        error!(target: "auth", %err, "failed to cycle session after logout");
        return server_error_response();
    }

    if let Err(err) = sessions::put_flash(&session, "You've been logged out successfully!").await {
        error!(target: "sessions", %err, "failed to store logout flash message");
    }

    info!(target: "auth", user_id = user.id, "user logged out");

    Redirect::to("/").into_response()
}

async fn render_signup_form(
    state: &AppState,
    session: &Session,
    status: StatusCode,
    form: SignupFormValues,
    field_errors: SignupFieldErrors,
) -> Response {
    let template = SignupTemplate::new(layout_from_session(state, session, "Signup").await)
        .with_form(form)
        .with_field_errors(field_errors);

    HtmlTemplate::with_status(template, status).into_response()
}

async fn rate_limited_login_response(
    state: &AppState,
    session: &Session,
    email: &str,
    error: &RateLimitError,
) -> Response {
    let message = match error {
        RateLimitError::Ip(_) => {
            "Too many login attempts from this IP address. Please wait and try again."
        }
        RateLimitError::Email(_) => {
            "Too many login attempts for this account. Please wait before trying again."
        }
    };

    let template = LoginTemplate::new(layout_from_session(state, session, "Login").await)
        .with_email(email)
        .with_error_message(message);
    let mut response =
        HtmlTemplate::with_status(template, StatusCode::TOO_MANY_REQUESTS).into_response();

    attach_retry_after(&mut response, error.retry_after().as_secs());

    response
}
