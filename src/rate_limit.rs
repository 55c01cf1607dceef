use std::{net::IpAddr, num::NonZeroU32, time::Duration};

use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use thiserror::Error;

/// Login attempts allowed per minute, per client IP and per email.
const LOGIN_BURST: u32 = 5;

/// Rate limiter shared for login attempts.
pub struct LoginRateLimiter {
    ip_limiter: RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>,
    email_limiter: RateLimiter<String, DashMapStateStore<String>, DefaultClock>,
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        let burst = NonZeroU32::new(LOGIN_BURST).expect("burst must be non-zero");
        let quota = Quota::per_minute(burst);
        Self {
            ip_limiter: RateLimiter::keyed(quota),
            email_limiter: RateLimiter::keyed(quota),
        }
    }

    pub fn check_ip(&self, ip: IpAddr) -> Result<(), RateLimitError> {
        match self.ip_limiter.check_key(&ip) {
            Ok(_) => {
                self.ip_limiter.retain_recent();
                Ok(())
            }
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                Err(RateLimitError::Ip(wait))
            }
        }
    }

    /// Emails are compared case-insensitively so `Bob@` and `bob@` share a budget.
    pub fn check_email(&self, email: &str) -> Result<(), RateLimitError> {
        let key = email.trim().to_lowercase();
        match self.email_limiter.check_key(&key) {
            Ok(_) => {
                self.email_limiter.retain_recent();
                Ok(())
            }
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                Err(RateLimitError::Email(wait))
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Too many attempts from this IP. Try again in {0:?}.")]
    Ip(Duration),
    #[error("Too many attempts for this email. Try again in {0:?}.")]
    Email(Duration),
}

impl RateLimitError {
    pub fn retry_after(&self) -> Duration {
        match self {
            RateLimitError::Ip(duration) | RateLimitError::Email(duration) => *duration,
        }
    }
}
