/// Largest url-encoded form body accepted, matching axum's default body limit.
pub const MAX_FORM_BODY_BYTES: usize = 2 * 1024 * 1024;
pub const LATEST_SNIPPETS_LIMIT: i64 = 10;
pub const SNIPPET_TITLE_MAX_CHARS: usize = 100;
/// Even fully percent-encoded 4-byte characters stay well inside
/// [`MAX_FORM_BODY_BYTES`], so over-long content is a field error, never a 413.
pub const SNIPPET_CONTENT_MAX_CHARS: usize = 65_535;
pub const USER_NAME_MAX_CHARS: usize = 255;
pub const EMAIL_MAX_CHARS: usize = 255;
pub const DEFAULT_EXPIRY_DAYS: i64 = 365;
/// Permitted snippet lifetimes in days, with their labels on the create form.
pub const EXPIRY_OPTIONS: [(i64, &str); 3] = [(365, "One Year"), (7, "One Week"), (1, "One Day")];
pub const PERMITTED_EXPIRY_DAYS: [i64; 3] = [1, 7, 365];
pub const LOGIN_PATH: &str = "/user/login";
pub const AFTER_LOGIN_PATH: &str = "/snippet/create";
