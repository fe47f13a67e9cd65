use std::path::PathBuf;

use stash_cookie::{CookieChannel, MemoryCookieChannel};
use stash_core::{Clock, Result, StashError, SystemClock};
use stash_storage::atomic_file::{read_optional, with_exclusive_lock, write_atomic};

/// Cookie channel persisted as one `Set-Cookie` line per cookie, each with an
/// absolute `Expires`, so the jar and its deadlines survive between CLI runs.
pub struct FileCookieChannel {
    path: PathBuf,
    jar: MemoryCookieChannel,
}

impl FileCookieChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, SystemClock)
    }

    pub fn with_clock(path: impl Into<PathBuf>, clock: impl Clock + 'static) -> Self {
        Self {
            path: path.into(),
            jar: MemoryCookieChannel::with_clock(clock),
        }
    }

    fn load(&self) -> Result<()> {
        let text = match read_optional(&self.path)? {
            Some(bytes) => String::from_utf8(bytes).map_err(StashError::backend)?,
            None => String::new(),
        };
        self.jar.load_lines(text.lines())
    }
}

impl CookieChannel for FileCookieChannel {
    fn read(&self) -> Result<String> {
        self.load()?;
        self.jar.read()
    }

    fn write(&self, line: &str) -> Result<()> {
        with_exclusive_lock(&self.path, || {
            self.load()?;
            self.jar.write(line)?;
            let mut body = self.jar.set_cookie_lines()?.join("\n");
            body.push('\n');
            write_atomic(&self.path, body.as_bytes())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stash_cookie::{CookieCodec, CookieOptions};
    use stash_core::ManualClock;
    use stash_storage::AesGcmCipher;

    use super::*;

    #[test]
    fn jar_survives_reopening() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cookies.txt");
        {
            let codec = CookieCodec::new(Arc::new(FileCookieChannel::new(&path)), AesGcmCipher);
            codec
                .set(&CookieOptions::new("a", "1").max_age(3600))
                .expect("set a");
            codec.set(&CookieOptions::new("b", "two words")).expect("set b");
        }

        let codec = CookieCodec::new(Arc::new(FileCookieChannel::new(&path)), AesGcmCipher);
        assert_eq!(codec.get("b", None).expect("get").as_deref(), Some("two words"));

        codec.remove("a").expect("remove");
        let reopened = FileCookieChannel::new(&path);
        assert_eq!(reopened.read().expect("read"), "b=two%20words");
    }

    #[test]
    fn max_age_deadline_survives_reopening() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cookies.txt");
        // 2025-01-01T00:00:00Z
        let clock = ManualClock::new(1_735_689_600_000);

        FileCookieChannel::with_clock(&path, clock.clone())
            .write("k=v; Max-Age=60")
            .expect("write");

        clock.advance(59_000);
        let reopened = FileCookieChannel::with_clock(&path, clock.clone());
        assert_eq!(reopened.read().expect("read"), "k=v");

        clock.advance(2_000);
        let reopened = FileCookieChannel::with_clock(&path, clock.clone());
        assert_eq!(reopened.read().expect("read"), "");
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let channel = FileCookieChannel::new(dir.path().join("none.txt"));
        assert_eq!(channel.read().expect("read"), "");
    }
}
