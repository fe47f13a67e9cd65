use std::sync::{Arc, Mutex, MutexGuard};

use cookie::Cookie;
use indexmap::IndexMap;
use stash_core::{Clock, Result, StashError, SystemClock};
use time::OffsetDateTime;

/// Header-style string channel carrying cookies.
pub trait CookieChannel: Send + Sync {
    /// Current entries as a `Cookie` request header: `k1=v1; k2=v2`.
    fn read(&self) -> Result<String>;

    /// Applies one `Set-Cookie` style line.
    fn write(&self, line: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct JarEntry {
    value: String,
    /// Absolute deadline in epoch milliseconds; `None` lives until removed.
    expires_at: Option<i64>,
}

impl JarEntry {
    fn is_live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory jar that applies written lines the way a user agent would.
///
/// Entries are keyed by name only; `Path` and `Domain` are not used for scoping.
/// Each entry remembers its deadline (`Max-Age` from the time of writing, else
/// `Expires`) and disappears once the clock reaches it, whether or not it is
/// written again. A line whose deadline has already passed deletes the entry.
#[derive(Clone)]
pub struct MemoryCookieChannel {
    jar: Arc<Mutex<IndexMap<String, JarEntry>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryCookieChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCookieChannel {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            jar: Arc::default(),
            clock: Arc::new(clock),
        }
    }

    /// Live entries as `Set-Cookie` lines carrying an absolute `Expires`,
    /// suitable for [`load_lines`](Self::load_lines) later.
    pub fn set_cookie_lines(&self) -> Result<Vec<String>> {
        let jar = self.live()?;
        Ok(jar
            .iter()
            .map(|(name, entry)| {
                let mut cookie = Cookie::new(name.as_str(), entry.value.as_str());
                if let Some(at) = entry.expires_at.and_then(datetime_from_millis) {
                    cookie.set_expires(at);
                }
                cookie.encoded().to_string()
            })
            .collect())
    }

    /// Replaces the jar with previously saved `Set-Cookie` lines. Blank lines
    /// are skipped and lines that have expired since are dropped.
    pub fn load_lines<'a>(&self, lines: impl IntoIterator<Item = &'a str>) -> Result<()> {
        self.lock()?.clear();
        for line in lines.into_iter().map(str::trim).filter(|l| !l.is_empty()) {
            self.write(line)?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, IndexMap<String, JarEntry>>> {
        self.jar
            .lock()
            .map_err(|err| StashError::backend(format!("lock poisoned: {err}")))
    }

    /// Locks the jar after dropping entries whose deadline has passed.
    fn live(&self) -> Result<MutexGuard<'_, IndexMap<String, JarEntry>>> {
        let now = self.clock.now_millis();
        let mut jar = self.lock()?;
        jar.retain(|_, entry| entry.is_live(now));
        Ok(jar)
    }
}

impl CookieChannel for MemoryCookieChannel {
    fn read(&self) -> Result<String> {
        let jar = self.live()?;
        let pairs: Vec<String> = jar
            .iter()
            .map(|(name, entry)| {
                Cookie::new(name.as_str(), entry.value.as_str())
                    .encoded()
                    .to_string()
            })
            .collect();
        Ok(pairs.join("; "))
    }

    fn write(&self, line: &str) -> Result<()> {
        let cookie = Cookie::parse_encoded(line).map_err(|e| StashError::Backend {
            reason: format!("malformed cookie line: {e}"),
        })?;
        let now = self.clock.now_millis();
        let entry = JarEntry {
            value: cookie.value().to_string(),
            expires_at: deadline(&cookie, now),
        };
        let mut jar = self.live()?;
        if entry.is_live(now) {
            jar.insert(cookie.name().to_string(), entry);
        } else {
            jar.shift_remove(cookie.name());
        }
        Ok(())
    }
}

/// `Max-Age` counted from `now` wins over `Expires`.
fn deadline(cookie: &Cookie<'_>, now: i64) -> Option<i64> {
    if let Some(max_age) = cookie.max_age() {
        let millis = i64::try_from(max_age.whole_milliseconds()).unwrap_or(i64::MAX);
        return Some(now.saturating_add(millis));
    }
    cookie
        .expires_datetime()
        .map(|at| i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX))
}

fn datetime_from_millis(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

#[cfg(test)]
mod tests {
    use stash_core::ManualClock;

    use super::*;

    // 2025-01-01T00:00:00Z
    const NOW: i64 = 1_735_689_600_000;

    #[test]
    fn read_joins_pairs_without_attributes() {
        let channel = MemoryCookieChannel::new();
        channel.write("a=1; Path=/; Secure").expect("write a");
        channel.write("b=2").expect("write b");
        assert_eq!(channel.read().expect("read"), "a=1; b=2");
    }

    #[test]
    fn special_characters_survive_saved_lines() {
        let channel = MemoryCookieChannel::new();
        let line = Cookie::new("b c", "x;y=z").encoded().to_string();
        channel.write(&line).expect("write");

        let lines = channel.set_cookie_lines().expect("lines");
        let reloaded = MemoryCookieChannel::new();
        reloaded
            .load_lines(lines.iter().map(String::as_str))
            .expect("load");
        let jar = reloaded.lock().expect("lock");
        assert_eq!(jar.get("b c").map(|e| e.value.as_str()), Some("x;y=z"));
    }

    #[test]
    fn past_expiry_and_zero_max_age_delete() {
        let channel = MemoryCookieChannel::with_clock(ManualClock::new(NOW));
        channel.write("a=1").expect("write a");
        channel.write("b=2").expect("write b");

        channel
            .write("a=; Expires=Thu, 01 Jan 1970 00:00:00 GMT")
            .expect("expire a");
        channel.write("b=; Max-Age=0").expect("expire b");
        assert_eq!(channel.read().expect("read"), "");
    }

    #[test]
    fn max_age_runs_out_without_a_rewrite() {
        let clock = ManualClock::new(NOW);
        let channel = MemoryCookieChannel::with_clock(clock.clone());
        channel.write("k=v; Max-Age=1").expect("write");
        channel.write("keep=1").expect("write session cookie");

        clock.advance(999);
        assert_eq!(channel.read().expect("read"), "k=v; keep=1");

        clock.advance(3_600_000);
        assert_eq!(channel.read().expect("read"), "keep=1");
    }

    #[test]
    fn expires_runs_out_without_a_rewrite() {
        let clock = ManualClock::new(NOW);
        let channel = MemoryCookieChannel::with_clock(clock.clone());
        channel
            .write("k=v; Expires=Wed, 01 Jan 2025 01:00:00 GMT")
            .expect("write");
        assert_eq!(channel.read().expect("read"), "k=v");

        clock.advance(3_600_000);
        assert_eq!(channel.read().expect("read"), "");
    }

    #[test]
    fn max_age_takes_precedence_over_expires() {
        let clock = ManualClock::new(NOW);
        let channel = MemoryCookieChannel::with_clock(clock.clone());
        channel
            .write("k=v; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=60")
            .expect("write");
        assert_eq!(channel.read().expect("read"), "k=v");

        clock.advance(60_000);
        assert_eq!(channel.read().expect("read"), "");
    }

    #[test]
    fn saved_lines_carry_absolute_expiry() {
        let clock = ManualClock::new(NOW);
        let channel = MemoryCookieChannel::with_clock(clock.clone());
        channel.write("k=v; Max-Age=60").expect("write");
        channel.write("plain=1").expect("write plain");

        let lines = channel.set_cookie_lines().expect("lines");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("k=v"));
        assert!(lines[0].contains("Expires=Wed, 01 Jan 2025 00:01:00 GMT"));
        assert_eq!(lines[1], "plain=1");

        let reloaded = MemoryCookieChannel::with_clock(clock.clone());
        clock.advance(30_000);
        reloaded
            .load_lines(lines.iter().map(String::as_str))
            .expect("load");
        assert_eq!(reloaded.read().expect("read"), "k=v; plain=1");

        clock.advance(30_000);
        assert_eq!(reloaded.read().expect("read"), "plain=1");
    }

    #[test]
    fn load_lines_replaces_and_later_duplicates_win() {
        let channel = MemoryCookieChannel::new();
        channel.write("old=1").expect("write");
        channel
            .load_lines(["a=1", "", "b=2", "a=3"])
            .expect("load");
        assert_eq!(channel.read().expect("read"), "a=3; b=2");
    }

    #[test]
    fn rejects_malformed_line() {
        let channel = MemoryCookieChannel::new();
        assert!(channel.write("no-equals-sign").is_err());
    }
}
