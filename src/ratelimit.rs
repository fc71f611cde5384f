//! Per-client rate limiting.
//!
//! Every client identity may make a burst of `requests_per_minute` requests,
//! after which one more is allowed every `60 / requests_per_minute` seconds.
//! Admission is decided by a keyed [`governor`] limiter (GCRA over a
//! DashMap-backed store), so concurrent requests from one identity cannot
//! double-spend while other identities proceed in parallel.
//!
//! # Memory bound
//!
//! Governor's store does not track idleness, so a second map records when
//! each identity was last seen:
//!
//! - Identities idle for longer than `idle_ttl_secs` are evicted by
//!   [`RateLimiter::sweep`], periodically via [`spawn_sweep_task`], and the
//!   governor store drops states that have fully replenished. Validation
//!   keeps the TTL at or above one refill window, so an evicted identity was
//!   already back at a full burst and recreating it grants nothing extra.
//! - At `max_entries` a new identity triggers an inline sweep; if the map is
//!   still full the request is refused until space frees up.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    clock::{Clock, DefaultClock, Reference},
    middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
    Quota,
};
use std::{
    net::SocketAddr,
    num::NonZeroU32,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::config::RateLimitConfig;
use crate::server::AppError;

/// Keyed GCRA limiter, one state per client identity.
type KeyedLimiter<C> =
    governor::RateLimiter<String, DashMapStateStore<String>, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Allowed,
    Denied {
        /// Time until the identity may make one more request.
        retry_after: Duration,
        reason: DenyReason,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The identity used up its burst.
    Exhausted,
    /// Too many identities are tracked to admit a new one.
    AtCapacity,
}

/// Shared limiter handle. Cheap to clone.
///
/// Generic over the governor clock so tests can drive time by hand; the
/// server uses the default monotonic clock.
#[derive(Clone)]
pub struct RateLimiter<C: Clock = DefaultClock> {
    inner: Option<Arc<Inner<C>>>,
}

struct Inner<C: Clock> {
    limiter: KeyedLimiter<C>,
    /// Last admission attempt per identity, for idle eviction.
    last_access: DashMap<String, C::Instant>,
    clock: C,
    max_entries: usize,
    idle_ttl: Duration,
    trust_forwarded_headers: bool,
    at_capacity_warned: AtomicBool,
    connect_info_warned: AtomicBool,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_clock(config, DefaultClock::default())
    }

    /// A limiter that admits everything.
    pub fn disabled() -> Self {
        Self { inner: None }
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(config: &RateLimitConfig, clock: C) -> Self {
        if !config.enabled {
            return Self { inner: None };
        }
        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let limiter = governor::RateLimiter::dashmap_with_clock(Quota::per_minute(per_minute), &clock);
        Self {
            inner: Some(Arc::new(Inner {
                limiter,
                last_access: DashMap::new(),
                clock,
                max_entries: config.max_entries.max(1),
                idle_ttl: Duration::from_secs(config.idle_ttl_secs),
                trust_forwarded_headers: config.trust_forwarded_headers,
                at_capacity_warned: AtomicBool::new(false),
                connect_info_warned: AtomicBool::new(false),
            })),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn admit(&self, identity: &str) -> Admission {
        let Some(inner) = &self.inner else {
            return Admission::Allowed;
        };

        let now = inner.clock.now();
        if !self.track(inner, identity, now) {
            let len = inner.last_access.len();
            if !inner.at_capacity_warned.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    entries = len,
                    max_entries = inner.max_entries,
                    "rate limiter at capacity, refusing new clients"
                );
            }
            return Admission::Denied {
                retry_after: Duration::from_secs(60),
                reason: DenyReason::AtCapacity,
            };
        }

        match inner.limiter.check_key(&identity.to_string()) {
            Ok(_) => Admission::Allowed,
            Err(not_until) => Admission::Denied {
                retry_after: not_until.wait_time_from(inner.clock.now()),
                reason: DenyReason::Exhausted,
            },
        }
    }

    /// Record `identity` as seen at `now`. Returns false when a new identity
    /// cannot be tracked without exceeding `max_entries`.
    fn track(&self, inner: &Inner<C>, identity: &str, now: C::Instant) -> bool {
        if let Some(mut seen) = inner.last_access.get_mut(identity) {
            *seen = now;
            return true;
        }

        // len() must not be called while holding an entry guard.
        if inner.last_access.len() >= inner.max_entries {
            self.sweep();
            if inner.last_access.len() >= inner.max_entries {
                return false;
            }
        }

        inner.last_access.insert(identity.to_string(), now);
        // Concurrent new identities can all pass the check above; whoever
        // lands past the bound backs its own entry out.
        if inner.last_access.len() > inner.max_entries {
            inner.last_access.remove_if(identity, |_, seen| *seen == now);
            return false;
        }
        true
    }

    /// Evict identities idle longer than the TTL. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let Some(inner) = &self.inner else {
            return 0;
        };
        let now = inner.clock.now();
        let ttl = inner.idle_ttl;
        let idle = |seen: &C::Instant| Duration::from(now.duration_since(*seen)) > ttl;

        let stale: Vec<String> = inner
            .last_access
            .iter()
            .filter(|e| idle(e.value()))
            .map(|e| e.key().clone())
            .collect();

        // remove_if re-checks under the lock so an identity touched meanwhile survives.
        let evicted = stale
            .iter()
            .filter(|key| {
                inner
                    .last_access
                    .remove_if(key.as_str(), |_, seen| idle(seen))
                    .is_some()
            })
            .count();

        if evicted > 0 {
            inner.limiter.retain_recent();
            inner.limiter.shrink_to_fit();
            inner.at_capacity_warned.store(false, Ordering::Relaxed);
            tracing::debug!(
                evicted,
                remaining = inner.last_access.len(),
                "rate limiter sweep"
            );
        }
        evicted
    }

    pub fn entry_count(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.last_access.len())
    }

    fn trusts_forwarded_headers(&self) -> bool {
        self.inner
            .as_ref()
            .map_or(false, |inner| inner.trust_forwarded_headers)
    }

    fn warn_connect_info_missing(&self) {
        if let Some(inner) = &self.inner {
            if !inner.connect_info_warned.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "peer address unavailable; clients without forwarding headers share one limit"
                );
            }
        }
    }
}

/// Resolve the client identity: first `X-Forwarded-For` entry, then
/// `X-Real-IP` (both only when `trust_forwarded` is set), then the peer
/// address.
pub fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded: bool,
) -> Option<String> {
    if trust_forwarded {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(ip) = forwarded {
            return Some(ip.to_string());
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(ip) = real_ip {
            return Some(ip.to_string());
        }
    }

    peer.map(|addr| addr.ip().to_string())
}

/// axum middleware gating every request through the limiter.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    if peer.is_none() {
        limiter.warn_connect_info_missing();
    }
    let identity = client_identity(req.headers(), peer, limiter.trusts_forwarded_headers())
        .unwrap_or_else(|| "unknown".to_string());

    match limiter.admit(&identity) {
        Admission::Allowed => next.run(req).await,
        Admission::Denied {
            retry_after,
            reason,
        } => {
            tracing::debug!(client = %identity, ?reason, "request rate limited");
            AppError::rate_limited(retry_after).into_response()
        }
    }
}

/// Periodically evict idle identities.
pub fn spawn_sweep_task(limiter: RateLimiter, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let evicted = limiter.sweep();
            if evicted > 0 {
                tracing::info!(evicted, "rate limiter evicted idle clients");
            }
        }
    })
}
