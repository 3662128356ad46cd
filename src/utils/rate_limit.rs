use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: usize },
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Per-client request budget. Implementations decide where the history lives;
/// the in-process one below forgets everything on restart.
pub trait RateLimit: Send + Sync {
    /// Drops requests older than the window, checks what is left against the
    /// budget and, only if allowed, records this request at `now`.
    fn check_and_record(&self, client: &str, now: Instant) -> RateDecision;
}

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        RateLimiter {
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(10))
    }
}

impl RateLimit for RateLimiter {
    fn check_and_record(&self, client: &str, now: Instant) -> RateDecision {
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let window = self.window;
        for history in clients.values_mut() {
            while history
                .front()
                .is_some_and(|&t| now.saturating_duration_since(t) >= window)
            {
                history.pop_front();
            }
        }
        clients.retain(|_, history| !history.is_empty());

        let history = clients.entry(client.to_string()).or_default();
        if history.len() >= self.max_requests {
            let retry_after = history
                .front()
                .map(|&oldest| window.saturating_sub(now.saturating_duration_since(oldest)))
                .unwrap_or_default();
            log::warn!(
                "Rate limit exceeded for {} ({} requests in {:?})",
                client,
                history.len(),
                window
            );
            return RateDecision::Limited { retry_after };
        }

        history.push_back(now);
        RateDecision::Allowed {
            remaining: self.max_requests - history.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixth_request_in_window_is_rejected() {
        let limiter = RateLimiter::default();
        let start = Instant::now();

        for i in 0..5 {
            let decision = limiter.check_and_record("10.0.0.1", start + Duration::from_secs(i));
            assert_eq!(decision, RateDecision::Allowed { remaining: 4 - i as usize });
        }

        let sixth = limiter.check_and_record("10.0.0.1", start + Duration::from_secs(9));
        assert_eq!(
            sixth,
            RateDecision::Limited {
                retry_after: Duration::from_secs(1)
            }
        );
    }

    #[test]
    fn rejected_requests_are_not_recorded() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();

        assert!(limiter.check_and_record("a", start).is_allowed());
        for s in 1..10 {
            assert!(!limiter.check_and_record("a", start + Duration::from_secs(s)).is_allowed());
        }
        assert!(limiter.check_and_record("a", start + Duration::from_secs(10)).is_allowed());
    }

    #[test]
    fn window_rolls() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();

        assert!(limiter.check_and_record("a", start).is_allowed());
        assert!(limiter.check_and_record("a", start + Duration::from_secs(5)).is_allowed());
        assert!(!limiter.check_and_record("a", start + Duration::from_secs(9)).is_allowed());
        // the first request has aged out, the second has not
        assert!(limiter.check_and_record("a", start + Duration::from_secs(10)).is_allowed());
        assert!(!limiter.check_and_record("a", start + Duration::from_secs(11)).is_allowed());
    }

    #[test]
    fn clients_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let now = Instant::now();

        assert!(limiter.check_and_record("a", now).is_allowed());
        assert!(!limiter.check_and_record("a", now).is_allowed());
        assert!(limiter.check_and_record("b", now).is_allowed());
    }

    #[test]
    fn idle_clients_are_forgotten() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        let start = Instant::now();

        limiter.check_and_record("a", start);
        limiter.check_and_record("b", start);
        assert_eq!(limiter.tracked_clients(), 2);

        limiter.check_and_record("c", start + Duration::from_secs(30));
        assert_eq!(limiter.tracked_clients(), 1);
    }
}
