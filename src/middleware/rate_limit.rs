use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Window {
    opened_at: Instant,
    used: u32,
}

/// Requests-per-second budget shared by every route it is layered on.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Arc<Mutex<Window>>,
}

impl RateLimiter {
    /// A limit of zero is treated as one.
    pub fn per_second(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            window: Arc::new(Mutex::new(Window {
                opened_at: Instant::now(),
                used: 0,
            })),
        }
    }

    /// Takes one slot, or returns how long until the window reopens.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        let mut window = self.window.lock().unwrap_or_else(|p| p.into_inner());
        let elapsed = now.saturating_duration_since(window.opened_at);
        if elapsed >= WINDOW {
            window.opened_at = now;
            window.used = 0;
        }
        if window.used >= self.limit {
            return Err(WINDOW.saturating_sub(elapsed));
        }
        window.used += 1;
        Ok(())
    }
}

pub async fn limit_requests(
    State(limiter): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Err(wait) = limiter.try_acquire() {
        tracing::warn!(path = %req.uri().path(), "rate limit exceeded");
        // Retry-After is whole seconds; round up so clients never retry early.
        let retry_after = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "rate_limited", "message": "Too many requests" })),
        )
            .into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after.max(1)));
        return response;
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_within_window() {
        let limiter = RateLimiter::per_second(3);
        let now = Instant::now();
        assert!(limiter.try_acquire_at(now).is_ok());
        assert!(limiter.try_acquire_at(now).is_ok());
        assert!(limiter.try_acquire_at(now).is_ok());
        assert!(limiter.try_acquire_at(now).is_err());
    }

    #[test]
    fn window_reopens_after_a_second() {
        let limiter = RateLimiter::per_second(1);
        let start = Instant::now();
        assert!(limiter.try_acquire_at(start).is_ok());
        let wait = limiter
            .try_acquire_at(start + Duration::from_millis(400))
            .unwrap_err();
        assert_eq!(wait, Duration::from_millis(600));
        assert!(limiter.try_acquire_at(start + WINDOW).is_ok());
    }

    #[test]
    fn zero_is_treated_as_one() {
        let limiter = RateLimiter::per_second(0);
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());
    }

    #[test]
    fn clones_share_the_window() {
        let limiter = RateLimiter::per_second(1);
        let other = limiter.clone();
        assert!(limiter.try_acquire().is_ok());
        assert!(other.try_acquire().is_err());
    }
}
