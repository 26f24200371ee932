use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::AppState;

/// (max requests, window) per scope
pub const GENERAL_LIMIT: (u32, Duration) = (100, Duration::from_secs(15 * 60));
pub const UPLOAD_LIMIT: (u32, Duration) = (10, Duration::from_secs(15 * 60));
pub const ANALYZE_LIMIT: (u32, Duration) = (20, Duration::from_secs(10 * 60));

/// Rate-limit exceedances tolerated; the next one blocks the IP
const BLOCK_AFTER_EXCEEDANCES: u32 = 5;

const BOT_AGENT_FRAGMENTS: &[&str] = &[
    "bot", "crawler", "spider", "curl", "wget", "python-requests", "scrapy",
];

const SENSITIVE_PATHS: &[&str] = &[
    "/admin",
    "/.env",
    "/wp-admin",
    "/wp-login",
    "/.git",
    "/config",
    "/phpmyadmin",
];

struct RateWindow {
    started: Instant,
    count: u32,
}

/// All security state is in-memory and process-local; a restart resets
/// blocks and counters by design of the deployment.
pub struct SecurityService {
    strict: bool,
    blocked: Mutex<HashSet<IpAddr>>,
    suspicious: Mutex<HashMap<IpAddr, u32>>,
    exceedances: Mutex<HashMap<IpAddr, u32>>,
    windows: Mutex<HashMap<(IpAddr, &'static str), RateWindow>>,
    last_seen: Mutex<HashMap<IpAddr, Instant>>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SecurityStats {
    pub blocked_ips: Vec<String>,
    pub suspicious_ips: usize,
    pub strict_mode: bool,
}

impl SecurityService {
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            blocked: Mutex::new(HashSet::new()),
            suspicious: Mutex::new(HashMap::new()),
            exceedances: Mutex::new(HashMap::new()),
            windows: Mutex::new(HashMap::new()),
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        self.blocked.lock().map(|b| b.contains(&ip)).unwrap_or(false)
    }

    pub fn block(&self, ip: IpAddr, reason: &str) {
        if ip.is_loopback() && !self.strict {
            return;
        }
        warn!("Blocking IP {}: {}", ip, reason);
        if let Ok(mut blocked) = self.blocked.lock() {
            blocked.insert(ip);
        }
    }

    pub fn unblock(&self, ip: IpAddr) -> bool {
        self.blocked.lock().map(|mut b| b.remove(&ip)).unwrap_or(false)
    }

    /// Fixed-window counter. Returns seconds until the window resets
    /// when the limit is exceeded.
    pub fn check_rate(
        &self,
        ip: IpAddr,
        scope: &'static str,
        max: u32,
        window: Duration,
    ) -> Result<(), u64> {
        let mut windows = match self.windows.lock() {
            Ok(w) => w,
            Err(_) => return Ok(()),
        };
        let entry = windows.entry((ip, scope)).or_insert(RateWindow {
            started: Instant::now(),
            count: 0,
        });

        if entry.started.elapsed() > window {
            entry.started = Instant::now();
            entry.count = 0;
        }
        entry.count += 1;

        if entry.count > max {
            let retry_after = window.saturating_sub(entry.started.elapsed()).as_secs();
            drop(windows);
            self.record_exceedance(ip);
            Err(retry_after.max(1))
        } else {
            Ok(())
        }
    }

    fn record_exceedance(&self, ip: IpAddr) {
        let prior = {
            let mut exceedances = match self.exceedances.lock() {
                Ok(e) => e,
                Err(_) => return,
            };
            let count = exceedances.entry(ip).or_insert(0);
            let prior = *count;
            *count += 1;
            prior
        };
        if prior >= BLOCK_AFTER_EXCEEDANCES {
            self.block(ip, "repeated rate-limit violations");
        }
    }

    /// Suspicion points for one request. Scores are not carried over
    /// between requests; only the rapid-repeat signal looks back.
    pub fn score_request(&self, ip: IpAddr, req: &Request) -> u32 {
        let mut points = 0u32;

        match req
            .headers()
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
        {
            Some(agent) => {
                let agent = agent.to_lowercase();
                if BOT_AGENT_FRAGMENTS.iter().any(|f| agent.contains(f)) {
                    points += 2;
                }
            }
            None => points += 3,
        }

        if let Ok(mut last_seen) = self.last_seen.lock() {
            let now = Instant::now();
            if let Some(previous) = last_seen.insert(ip, now) {
                if now.duration_since(previous) < Duration::from_millis(500) {
                    points += 2;
                }
            }
        }

        if let Some(len) = req
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
        {
            if len > 100 * 1024 * 1024 {
                points += 3;
            }
        }

        if req.headers().contains_key("x-forwarded-for") && req.headers().contains_key("x-real-ip")
        {
            points += 1;
        }

        let path = req.uri().path();
        if SENSITIVE_PATHS.iter().any(|p| path.starts_with(p)) {
            points += 4;
        }

        points
    }

    /// A single request whose score reaches the threshold gets its IP
    /// blocked. The per-IP event counter only feeds stats and is
    /// cleared hourly.
    pub fn note_suspicion(&self, ip: IpAddr, points: u32) -> bool {
        if points == 0 {
            return false;
        }
        if let Ok(mut suspicious) = self.suspicious.lock() {
            *suspicious.entry(ip).or_insert(0) += 1;
        }

        let threshold = if self.strict { 5 } else { 8 };
        if points >= threshold {
            self.block(ip, "suspicious activity score reached");
            self.is_blocked(ip)
        } else {
            false
        }
    }

    pub fn stats(&self) -> SecurityStats {
        SecurityStats {
            blocked_ips: self
                .blocked
                .lock()
                .map(|b| b.iter().map(|ip| ip.to_string()).collect())
                .unwrap_or_default(),
            suspicious_ips: self.suspicious.lock().map(|s| s.len()).unwrap_or(0),
            strict_mode: self.strict,
        }
    }

    pub fn clear_suspicious(&self) {
        if let Ok(mut suspicious) = self.suspicious.lock() {
            suspicious.clear();
        }
        if let Ok(mut exceedances) = self.exceedances.lock() {
            exceedances.clear();
        }
        if let Ok(mut last_seen) = self.last_seen.lock() {
            last_seen.clear();
        }
    }

    /// Hourly reset of the suspicion and exceedance bookkeeping.
    pub async fn run_reset(self: std::sync::Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(3600)) => {
                    info!("Clearing suspicious-activity counters");
                    self.clear_suspicious();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

/// First x-forwarded-for hop, else the socket peer, else loopback (unit
/// tests drive the router without a socket).
pub fn client_ip(req: &Request) -> IpAddr {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse() {
                return ip;
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
}

fn blocked_response(code: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": "Access denied",
            "code": code,
        })),
    )
        .into_response()
}

fn rate_limited_response(retry_after: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "Too many requests",
            "code": "RATE_LIMITED",
            "retry_after": retry_after,
        })),
    )
        .into_response()
}

/// Outer gate: blocked-IP check, suspicion scoring, general rate limit.
pub async fn security_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&req);
    let security = &state.security;

    if security.is_blocked(ip) {
        return blocked_response("IP_BLOCKED");
    }

    let points = security.score_request(ip, &req);
    if security.note_suspicion(ip, points) {
        return blocked_response("SUSPICIOUS_ACTIVITY");
    }

    let (max, window) = GENERAL_LIMIT;
    if let Err(retry_after) = security.check_rate(ip, "general", max, window) {
        return rate_limited_response(retry_after);
    }

    next.run(req).await
}

pub async fn upload_rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&req);
    let (max, window) = UPLOAD_LIMIT;
    if let Err(retry_after) = state.security.check_rate(ip, "upload", max, window) {
        return rate_limited_response(retry_after);
    }
    next.run(req).await
}

pub async fn analyze_rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&req);
    let (max, window) = ANALYZE_LIMIT;
    if let Err(retry_after) = state.security.check_rate(ip, "analyze", max, window) {
        return rate_limited_response(retry_after);
    }
    next.run(req).await
}
