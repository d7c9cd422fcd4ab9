use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_MAX_REQUESTS: usize = 30;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_MUTATION_SPACING: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Read,
    /// 建立、更新、刪除
    Mutating,
}

#[derive(Debug, Default)]
struct WindowState {
    requests: VecDeque<Instant>,
    last_mutation: Option<Instant>,
}

/// 滑動視窗限流器
///
/// 視窗內最多 `max_requests` 個請求；寫入類請求另外保持最小間隔。
/// 檢查、清除過期紀錄與登記新請求在同一把鎖內完成，等待時不持有鎖。
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    min_mutation_spacing: Duration,
    state: Mutex<WindowState>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW, DEFAULT_MUTATION_SPACING)
    }
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration, min_mutation_spacing: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            min_mutation_spacing,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// 等到送出請求不會超過限制為止，並登記這次請求
    pub async fn acquire(&self, kind: RequestKind) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();

                while let Some(oldest) = state.requests.front() {
                    if now.saturating_duration_since(*oldest) >= self.window {
                        state.requests.pop_front();
                    } else {
                        break;
                    }
                }

                let window_wait = match state.requests.front() {
                    Some(oldest) if state.requests.len() >= self.max_requests => {
                        (*oldest + self.window).saturating_duration_since(now)
                    }
                    _ => Duration::ZERO,
                };

                let spacing_wait = match (kind, state.last_mutation) {
                    (RequestKind::Mutating, Some(last)) => {
                        (last + self.min_mutation_spacing).saturating_duration_since(now)
                    }
                    _ => Duration::ZERO,
                };

                let wait = window_wait.max(spacing_wait);
                if wait.is_zero() {
                    state.requests.push_back(now);
                    if kind == RequestKind::Mutating {
                        state.last_mutation = Some(now);
                    }
                    return;
                }
                wait
            };

            if wait >= Duration::from_secs(1) {
                tracing::warn!(
                    "⏳ Rate limit window full ({} requests / {:?}), waiting {:.1}s",
                    self.max_requests,
                    self.window,
                    wait.as_secs_f64()
                );
            } else {
                tracing::debug!("⏳ Spacing mutating request by {:?}", wait);
            }
            tokio::time::sleep(wait).await;
        }
    }

    /// 目前視窗內（尚未過期）的請求數
    pub async fn window_len(&self) -> usize {
        let state = self.state.lock().await;
        let now = Instant::now();
        state
            .requests
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < self.window)
            .count()
    }
}
