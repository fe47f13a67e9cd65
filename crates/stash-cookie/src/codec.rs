use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime};
use cookie::Cookie;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use stash_core::{
    batch::run_batch, BatchOptions, BatchReport, Cipher, Diagnostic, DiagnosticKind,
    DiagnosticSink, Result, TracingSink, ValidationError,
};
use time::{Duration, OffsetDateTime};
use tracing::{debug, instrument};

use crate::channel::CookieChannel;

const SCOPE: &str = "cookie";

/// Attributes applied when a write does not set its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieDefaults {
    pub path: Option<String>,
    pub domain: Option<String>,
    #[serde(default)]
    pub secure: bool,
}

/// One cookie write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOptions {
    pub key: String,
    pub value: String,
    /// HTTP date (`Wed, 01 Jan 2025 00:00:00 GMT`) or RFC 3339 timestamp.
    pub expires: Option<String>,
    pub max_age: Option<i64>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub secure: bool,
    pub encrypt: bool,
    pub secret_key: Option<String>,
}

impl CookieOptions {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn expires(mut self, expires: impl Into<String>) -> Self {
        self.expires = Some(expires.into());
        self
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn encrypted(mut self, secret_key: impl Into<String>) -> Self {
        self.encrypt = true;
        self.secret_key = Some(secret_key.into());
        self
    }
}

/// Reads and writes cookies over a [`CookieChannel`], with optional value encryption.
///
/// Expiry of cookies is left to the channel owner.
pub struct CookieCodec {
    channel: Arc<dyn CookieChannel>,
    cipher: Arc<dyn Cipher>,
    sink: Arc<dyn DiagnosticSink>,
    defaults: CookieDefaults,
}

impl CookieCodec {
    pub fn new(channel: Arc<dyn CookieChannel>, cipher: impl Cipher + 'static) -> Self {
        Self {
            channel,
            cipher: Arc::new(cipher),
            sink: Arc::new(TracingSink),
            defaults: CookieDefaults::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: CookieDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Builds the `Set-Cookie` style line for `options` without writing it.
    pub fn encode(&self, options: &CookieOptions) -> Result<String> {
        if options.key.is_empty() {
            return Err(ValidationError::MissingKey.into());
        }
        if options.value.is_empty() {
            return Err(ValidationError::MissingValue.into());
        }
        let expires = options.expires.as_deref().map(parse_expires).transpose()?;
        if let Some(seconds) = options.max_age.filter(|s| *s < 0) {
            return Err(ValidationError::InvalidMaxAge { seconds }.into());
        }

        let value = if options.encrypt {
            let secret = non_empty(options.secret_key.as_deref())
                .ok_or(ValidationError::MissingSecretKey)?;
            self.cipher.encrypt(&options.value, secret)?
        } else {
            options.value.clone()
        };

        let mut builder = Cookie::build((options.key.clone(), value));
        if let Some(expires) = expires {
            builder = builder.expires(expires);
        }
        if let Some(seconds) = options.max_age {
            builder = builder.max_age(Duration::seconds(seconds));
        }
        if let Some(path) = options.path.clone().or_else(|| self.defaults.path.clone()) {
            builder = builder.path(path);
        }
        if let Some(domain) = options.domain.clone().or_else(|| self.defaults.domain.clone()) {
            builder = builder.domain(domain);
        }
        if options.secure || self.defaults.secure {
            builder = builder.secure(true);
        }
        Ok(builder.build().encoded().to_string())
    }

    /// Writes one cookie and returns the line that was written.
    #[instrument(skip_all, fields(key = %options.key))]
    pub fn set(&self, options: &CookieOptions) -> Result<String> {
        let line = self.encode(options)?;
        self.channel.write(&line)?;
        Ok(line)
    }

    pub fn set_many(&self, options: &[CookieOptions], batch: BatchOptions) -> Result<BatchReport> {
        run_batch(
            options,
            batch,
            |item| item.key.clone(),
            |item| self.set(item).map(|_| ()),
        )
    }

    /// All decoded entries in header order. The first of duplicate names wins.
    pub fn entries(&self) -> Result<IndexMap<String, String>> {
        let header = self.channel.read()?;
        let mut entries = IndexMap::new();
        for cookie in Cookie::split_parse_encoded(header.as_str()).flatten() {
            entries
                .entry(cookie.name().to_string())
                .or_insert_with(|| cookie.value().to_string());
        }
        Ok(entries)
    }

    /// Value of `key`, decrypted with `secret_key` when given.
    /// A value that fails to decrypt reads as `None` and is reported to the sink.
    #[instrument(skip(self, secret_key))]
    pub fn get(&self, key: &str, secret_key: Option<&str>) -> Result<Option<String>> {
        if key.is_empty() {
            return Err(ValidationError::MissingKey.into());
        }
        Ok(self
            .entries()?
            .get(key)
            .and_then(|value| self.reveal(key, value, secret_key)))
    }

    /// Values for every requested key present in the channel, in header order.
    #[instrument(skip_all)]
    pub fn get_many<S: AsRef<str>>(
        &self,
        keys: &[S],
        secret_key: Option<&str>,
    ) -> Result<IndexMap<String, String>> {
        let wanted: Vec<&str> = keys.iter().map(AsRef::<str>::as_ref).collect();
        if wanted.iter().any(|key| key.is_empty()) {
            return Err(ValidationError::MissingKey.into());
        }
        let mut out = IndexMap::new();
        for (name, value) in self.entries()? {
            if !wanted.contains(&name.as_str()) {
                continue;
            }
            if let Some(value) = self.reveal(&name, &value, secret_key) {
                out.insert(name, value);
            }
        }
        Ok(out)
    }

    /// Overwrites `key` with an already-expired entry at the default path (or `/`).
    #[instrument(skip(self))]
    pub fn remove(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(ValidationError::MissingKey.into());
        }
        let path = self.defaults.path.clone().unwrap_or_else(|| "/".to_string());
        let mut builder = Cookie::build((key.to_string(), String::new()))
            .path(path)
            .expires(OffsetDateTime::UNIX_EPOCH)
            .max_age(Duration::ZERO);
        if let Some(domain) = self.defaults.domain.clone() {
            builder = builder.domain(domain);
        }
        self.channel
            .write(&builder.build().encoded().to_string())
    }

    pub fn remove_many<S: AsRef<str>>(&self, keys: &[S], batch: BatchOptions) -> Result<BatchReport> {
        run_batch(
            keys,
            batch,
            |key| AsRef::<str>::as_ref(*key).to_string(),
            |key| self.remove(AsRef::<str>::as_ref(*key)),
        )
    }

    /// Expires every entry currently in the channel.
    #[instrument(skip(self))]
    pub fn clear(&self) -> Result<()> {
        let names: Vec<String> = self.entries()?.into_keys().collect();
        debug!(count = names.len(), "clearing cookies");
        for name in names {
            self.remove(&name)?;
        }
        Ok(())
    }

    fn reveal(&self, key: &str, value: &str, secret_key: Option<&str>) -> Option<String> {
        let Some(secret) = non_empty(secret_key) else {
            return Some(value.to_string());
        };
        match self.cipher.decrypt(value, secret) {
            Ok(plaintext) => Some(plaintext),
            Err(err) => {
                self.sink
                    .report(&Diagnostic::new(SCOPE, key, DiagnosticKind::Decrypt, err));
                None
            }
        }
    }
}

fn non_empty(secret: Option<&str>) -> Option<&str> {
    secret.filter(|s| !s.is_empty())
}

/// Accepts RFC 2822 / HTTP dates and RFC 3339 timestamps. The weekday name is
/// not checked against the date.
fn parse_expires(raw: &str) -> std::result::Result<OffsetDateTime, ValidationError> {
    let trimmed = raw.trim();
    let seconds = DateTime::parse_from_rfc2822(trimmed)
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed))
        .map(|dt| dt.timestamp())
        .ok()
        .or_else(|| {
            let without_weekday = trimmed.split_once(", ").map_or(trimmed, |(_, rest)| rest);
            NaiveDateTime::parse_from_str(without_weekday, "%d %b %Y %H:%M:%S GMT")
                .ok()
                .map(|naive| naive.and_utc().timestamp())
        });

    seconds
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
        .ok_or_else(|| ValidationError::InvalidExpires {
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use stash_core::{ManualClock, RecordingSink, StashError};
    use stash_storage::AesGcmCipher;

    use super::*;
    use crate::channel::MemoryCookieChannel;

    // 2025-01-01T00:00:00Z
    const NOW: i64 = 1_735_689_600_000;

    fn codec() -> (CookieCodec, MemoryCookieChannel, RecordingSink) {
        let channel = MemoryCookieChannel::with_clock(ManualClock::new(NOW));
        let sink = RecordingSink::new();
        let codec = CookieCodec::new(Arc::new(channel.clone()), AesGcmCipher::new())
            .with_sink(sink.clone());
        (codec, channel, sink)
    }

    #[test]
    fn sets_and_gets_with_attributes() {
        let (codec, _, _) = codec();
        let line = codec
            .set(
                &CookieOptions::new("testKey", "testValue")
                    .expires("Fri, 01 Jan 2027 00:00:00 GMT")
                    .path("/")
                    .domain("example.com")
                    .secure(),
            )
            .expect("set");

        assert!(line.starts_with("testKey=testValue"));
        assert!(line.contains("Path=/"));
        assert!(line.contains("Domain=example.com"));
        assert!(line.contains("Secure"));
        assert!(line.contains("Expires=Fri, 01 Jan 2027 00:00:00 GMT"));
        assert_eq!(
            codec.get("testKey", None).expect("get").as_deref(),
            Some("testValue")
        );
    }

    #[test]
    fn max_age_is_rendered_in_seconds() {
        let (codec, _, _) = codec();
        let line = codec
            .encode(&CookieOptions::new("k", "v").max_age(3600))
            .expect("encode");
        assert!(line.contains("Max-Age=3600"));
    }

    #[test]
    fn defaults_fill_missing_attributes() {
        let (codec, _, _) = codec();
        let codec = codec.with_defaults(CookieDefaults {
            path: Some("/app".into()),
            domain: None,
            secure: true,
        });

        let line = codec.encode(&CookieOptions::new("k", "v")).expect("encode");
        assert!(line.contains("Path=/app"));
        assert!(line.contains("Secure"));

        let line = codec
            .encode(&CookieOptions::new("k", "v").path("/other"))
            .expect("encode");
        assert!(line.contains("Path=/other"));
    }

    #[test]
    fn keys_and_values_are_percent_encoded() {
        let (codec, _, _) = codec();
        let line = codec
            .set(&CookieOptions::new("user name", "a;b=c"))
            .expect("set");
        assert!(line.starts_with("user%20name="));
        assert_eq!(
            codec.get("user name", None).expect("get").as_deref(),
            Some("a;b=c")
        );
    }

    #[test]
    fn validation_errors_do_not_touch_the_channel() {
        let (codec, channel, _) = codec();
        let cases = [
            (CookieOptions::new("", "v"), ValidationError::MissingKey),
            (CookieOptions::new("k", ""), ValidationError::MissingValue),
            (
                CookieOptions::new("k", "v").expires("not a date"),
                ValidationError::InvalidExpires {
                    value: "not a date".into(),
                },
            ),
            (
                CookieOptions::new("k", "v").max_age(-1),
                ValidationError::InvalidMaxAge { seconds: -1 },
            ),
            (
                CookieOptions {
                    encrypt: true,
                    ..CookieOptions::new("k", "v")
                },
                ValidationError::MissingSecretKey,
            ),
        ];
        for (options, expected) in cases {
            let err = codec.set(&options).expect_err("should be rejected");
            assert_eq!(err, StashError::Validation(expected));
        }
        assert_eq!(channel.read().expect("read"), "");
    }

    #[test]
    fn accepts_rfc3339_and_mismatched_weekday() {
        assert_eq!(
            parse_expires("2025-06-01T12:00:00Z").expect("rfc3339").unix_timestamp(),
            1_748_779_200
        );
        // 2025-01-01 is a Wednesday.
        assert_eq!(
            parse_expires("Fri, 01 Jan 2025 00:00:00 GMT")
                .expect("weekday ignored")
                .unix_timestamp(),
            1_735_689_600
        );
    }

    #[test]
    fn encrypted_cookie_round_trip() {
        let (codec, channel, sink) = codec();
        codec
            .set(&CookieOptions::new("session", "user-42").encrypted("s3cret"))
            .expect("set");

        assert!(!channel.read().expect("read").contains("user-42"));
        assert_eq!(
            codec.get("session", Some("s3cret")).expect("get").as_deref(),
            Some("user-42")
        );
        assert_eq!(codec.get("session", Some("wrong")).expect("get"), None);
        assert_eq!(sink.diagnostics().len(), 1);
        assert_eq!(sink.diagnostics()[0].scope, "cookie");
    }

    #[test]
    fn get_many_returns_header_order() {
        let (codec, _, _) = codec();
        for (key, value) in [("a", "1"), ("b", "2"), ("c", "3")] {
            codec.set(&CookieOptions::new(key, value)).expect("set");
        }

        let found = codec.get_many(&["c", "a", "missing"], None).expect("get_many");
        let pairs: Vec<_> = found.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        assert_eq!(pairs, vec![("a", "1"), ("c", "3")]);

        let err = codec.get_many(&["a", ""], None).expect_err("empty key");
        assert!(err.is_validation());
    }

    #[test]
    fn cookies_lapse_as_the_clock_moves() {
        let clock = ManualClock::new(NOW);
        let channel = MemoryCookieChannel::with_clock(clock.clone());
        let codec = CookieCodec::new(Arc::new(channel), AesGcmCipher::new());
        codec
            .set(&CookieOptions::new("short", "1").max_age(60))
            .expect("set short");
        codec
            .set(&CookieOptions::new("dated", "2").expires("Wed, 01 Jan 2025 00:10:00 GMT"))
            .expect("set dated");
        codec.set(&CookieOptions::new("session", "3")).expect("set session");

        clock.advance(60_000);
        assert_eq!(codec.get("short", None).expect("get"), None);
        assert_eq!(codec.get("dated", None).expect("get").as_deref(), Some("2"));

        clock.advance(10 * 60_000);
        let names: Vec<String> = codec.entries().expect("entries").into_keys().collect();
        assert_eq!(names, vec!["session"]);
    }

    #[test]
    fn remove_writes_an_expired_entry() {
        let (codec, channel, _) = codec();
        codec
            .set(&CookieOptions::new("gone", "soon").max_age(3600))
            .expect("set");
        codec.remove("gone").expect("remove");
        codec.remove("gone").expect("remove again");

        assert_eq!(codec.get("gone", None).expect("get"), None);
        assert!(!channel.read().expect("read").contains("gone"));
    }

    #[test]
    fn clear_expires_everything() {
        let (codec, channel, _) = codec();
        codec.set(&CookieOptions::new("a", "1")).expect("set");
        codec.set(&CookieOptions::new("b", "2")).expect("set");

        codec.clear().expect("clear");
        assert!(codec.entries().expect("entries").is_empty());
        assert_eq!(channel.read().expect("read"), "");
        codec.clear().expect("clear empty jar");
    }

    #[test]
    fn batch_policy_controls_failure_handling() {
        let (codec, _, _) = codec();
        let batch = vec![
            CookieOptions::new("one", "1"),
            CookieOptions::new("", "2"),
            CookieOptions::new("three", "3"),
        ];

        let err = codec
            .set_many(&batch, BatchOptions::stop_on_first_error())
            .expect_err("stops on empty key");
        assert_eq!(err, StashError::Validation(ValidationError::MissingKey));
        assert_eq!(codec.get("three", None).expect("get"), None);

        let report = codec
            .set_many(&batch, BatchOptions::best_effort())
            .expect("best effort");
        assert!(!report.is_complete());
        assert_eq!(report.succeeded(), 2);
        assert_eq!(codec.get("three", None).expect("get").as_deref(), Some("3"));

        let report = codec
            .remove_many(&["one", "three"], BatchOptions::default())
            .expect("remove_many");
        assert!(report.is_complete());
        assert!(codec.entries().expect("entries").is_empty());
    }
}
