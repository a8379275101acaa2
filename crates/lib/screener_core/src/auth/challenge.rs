//! Human-verification challenges (captcha).
//!
//! A challenge is a short random code with an expiry, bound to the login key
//! it was issued for. Each login key has at most one pending challenge:
//! issuing a new one discards the old. The issuer renders the code as SVG for
//! display; verification consumes the challenge whatever the outcome, so one
//! id gets exactly one guess.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::{Rng, rng};
use tracing::debug;
use uuid::Uuid;

use super::AuthPolicy;

/// Unambiguous glyphs only: no 0/O, 1/I/L.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

const GLYPH_WIDTH: u32 = 28;
const IMAGE_HEIGHT: u32 = 48;
const NOISE_LINES: usize = 6;

/// Produces a challenge code of the requested length.
pub type CodeGenerator = Arc<dyn Fn(usize) -> String + Send + Sync>;

/// A freshly issued challenge.
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub id: Uuid,
    /// SVG rendering of the code.
    pub image: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PendingChallenge {
    login_key: String,
    code: String,
    expires_at: DateTime<Utc>,
}

/// Submitted answer to a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeAnswer {
    pub challenge_id: Uuid,
    pub response: String,
}

/// Issues and verifies single-use challenges held in memory.
pub struct ChallengeIssuer {
    pending: DashMap<Uuid, PendingChallenge>,
    /// Login key to its single pending challenge.
    by_login: DashMap<String, Uuid>,
    ttl: Duration,
    length: usize,
    generator: CodeGenerator,
}

impl ChallengeIssuer {
    pub fn new(ttl: Duration, length: usize) -> Self {
        Self {
            pending: DashMap::new(),
            by_login: DashMap::new(),
            ttl,
            length,
            generator: Arc::new(random_code),
        }
    }

    pub fn from_policy(policy: &AuthPolicy) -> Self {
        Self::new(policy.challenge_ttl, policy.challenge_length)
    }

    /// Replace the code source (deterministic codes in tests).
    pub fn with_generator(mut self, generator: CodeGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Issue a challenge for `login_key`, replacing any challenge still
    /// pending for that key.
    pub fn issue(&self, login_key: &str) -> IssuedChallenge {
        let login_key = login_key.trim();
        let code = (self.generator)(self.length);
        let id = Uuid::new_v4();
        let expires_at = Utc::now() + self.ttl;
        let image = render_svg(&code);
        self.pending.insert(
            id,
            PendingChallenge {
                login_key: login_key.to_string(),
                code,
                expires_at,
            },
        );
        if let Some(replaced) = self.by_login.insert(login_key.to_string(), id) {
            self.pending.remove(&replaced);
            debug!(login_key, challenge_id = %replaced, "pending challenge replaced");
        }
        debug!(login_key, challenge_id = %id, "challenge issued");
        IssuedChallenge {
            id,
            image,
            expires_at,
        }
    }

    /// Check `response` against challenge `id` on behalf of `login_key`. The
    /// challenge is consumed either way. A challenge issued for another login
    /// key never verifies. Comparison ignores case and surrounding whitespace.
    pub fn verify(&self, id: Uuid, login_key: &str, response: &str) -> bool {
        let Some((_, pending)) = self.pending.remove(&id) else {
            return false;
        };
        self.by_login
            .remove_if(&pending.login_key, |_, current| *current == id);
        if pending.login_key != login_key.trim() {
            debug!(challenge_id = %id, "challenge presented for a different login key");
            return false;
        }
        if Utc::now() >= pending.expires_at {
            debug!(challenge_id = %id, "challenge expired");
            return false;
        }
        pending.code.eq_ignore_ascii_case(response.trim())
    }

    /// Check a submitted answer (see [`ChallengeIssuer::verify`]).
    pub fn verify_answer(&self, login_key: &str, answer: &ChallengeAnswer) -> bool {
        self.verify(answer.challenge_id, login_key, &answer.response)
    }

    /// Number of challenges awaiting verification.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Evict expired challenges.
    pub fn cleanup(&self) {
        let now = Utc::now();
        self.pending.retain(|_, c| c.expires_at > now);
        self.by_login.retain(|_, id| self.pending.contains_key(&*id));
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let issuer = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(StdDuration::from_secs(60));
            loop {
                interval.tick().await;
                issuer.cleanup();
            }
        })
    }
}

impl Default for ChallengeIssuer {
    fn default() -> Self {
        Self::from_policy(&AuthPolicy::default())
    }
}

impl std::fmt::Debug for ChallengeIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeIssuer")
            .field("pending", &self.pending.len())
            .field("ttl", &self.ttl)
            .field("length", &self.length)
            .finish()
    }
}

fn random_code(length: usize) -> String {
    let mut rng = rng();
    (0..length)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Render `code` as an SVG with jittered glyphs and noise lines.
fn render_svg(code: &str) -> String {
    let mut rng = rng();
    let width = GLYPH_WIDTH * code.chars().count() as u32 + 20;
    let mut svg = format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{IMAGE_HEIGHT}" viewBox="0 0 {width} {IMAGE_HEIGHT}"><rect width="100%" height="100%" fill="#f4f4f4"/>"##
    );
    for _ in 0..NOISE_LINES {
        let _ = write!(
            svg,
            r##"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="#{:06x}" stroke-width="1"/>"##,
            rng.random_range(0..width),
            rng.random_range(0..IMAGE_HEIGHT),
            rng.random_range(0..width),
            rng.random_range(0..IMAGE_HEIGHT),
            rng.random_range(0x40_4040..0xa0_a0a0u32),
        );
    }
    for (i, ch) in code.chars().enumerate() {
        let x = 10 + GLYPH_WIDTH * i as u32 + rng.random_range(0..6);
        let y = 32 + rng.random_range(0..8);
        let angle: i32 = rng.random_range(-25..=25);
        let _ = write!(
            svg,
            r##"<text x="{x}" y="{y}" transform="rotate({angle} {x} {y})" font-family="monospace" font-size="26" fill="#{:06x}">{ch}</text>"##,
            rng.random_range(0x10_1010..0x60_6060u32),
        );
    }
    svg.push_str("</svg>");
    svg
}
