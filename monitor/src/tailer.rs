//! Per-source log tailer.
//!
//! A [`Tailer`] owns one log file: its open handle, the file identity, the
//! byte offset of the next unread line, and the matcher that turns lines
//! into addresses. Its control loop ([`Tailer::run`]) reacts to change
//! notifications:
//!
//! - a data append triggers a read pass from the stored offset;
//! - anything else may be a rotation: after a grace period the path is
//!   re-opened, its identity compared with the stored one, and on change the
//!   offset restarts at 0 and the watch is re-registered.
//!
//! Only complete, newline-terminated lines are consumed. A trailing fragment
//! stays unread until the writer finishes it, so the offset never points
//! into the middle of a line.
//!
//! Read, stat and re-open failures are logged and the loop keeps going.
//! Losing the notification stream ends the tailer.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};

use crate::address_set::AddressSet;
use crate::config::{ConfigError, RotationConfig, SetConfig, Severity, SourceConfig};
use crate::file_id::FileId;
use crate::matcher::PatternMatcher;
use crate::notifier::{ChangeEvent, ChangeNotifier, NotifierError};
use crate::sink::Sink;
use crate::stats::SourceStats;

/// Errors that end a tailer.
#[derive(Error, Debug)]
pub enum TailerError {
    /// The log file could not be opened at start-up.
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The source configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Change notifications failed.
    #[error("change notification error: {0}")]
    Notifier(#[from] NotifierError),

    /// The change notification stream ended.
    #[error("change notification stream for {path} closed")]
    EventsClosed { path: PathBuf },
}

/// Where the control loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailerState {
    /// Constructed, file not opened yet.
    Idle,
    /// Inside a read pass.
    Reading,
    /// Waiting for the next change notification.
    AwaitingEvent,
    /// Re-opening the path after a possible rotation.
    Refreshing,
    /// The loop has ended; no further reads happen.
    Terminated,
}

/// Tails a single log file and forwards the addresses it finds.
pub struct Tailer {
    name: String,
    path: PathBuf,
    matcher: PatternMatcher,
    sink: Arc<dyn Sink>,
    stats: Arc<SourceStats>,
    rotation: RotationConfig,
    log_level: LevelFilter,
    file: Option<File>,
    file_id: Option<FileId>,
    position: u64,
    state: TailerState,
    needs_refresh: bool,
}

impl std::fmt::Debug for Tailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tailer")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("sink", &self.sink.target())
            .field("file_id", &self.file_id)
            .field("position", &self.position)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Tailer {
    /// Builds a tailer for `source` feeding `sink`.
    ///
    /// Patterns are compiled here; invalid ones are logged and skipped. The
    /// file itself is not touched until [`Tailer::open`] or [`Tailer::run`].
    pub fn new(
        source: &SourceConfig,
        set: &SetConfig,
        rotation: RotationConfig,
        sink: Arc<dyn Sink>,
    ) -> Result<Self, TailerError> {
        let log_level = source
            .log_level
            .map_or(LevelFilter::INFO, Severity::level_filter);
        let matcher = PatternMatcher::compile(
            &source.name,
            &source.patterns,
            set.address_family,
            source.parse_whitelist()?,
        )
        .with_verbose(log_level >= LevelFilter::DEBUG);

        Ok(Self {
            name: source.name.clone(),
            path: source.logfile.clone(),
            matcher,
            sink,
            stats: Arc::new(SourceStats::new()),
            rotation,
            log_level,
            file: None,
            file_id: None,
            position: 0,
            state: TailerState::Idle,
            needs_refresh: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset of the first unread byte.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Identity of the file currently held open.
    pub fn file_id(&self) -> Option<FileId> {
        self.file_id
    }

    pub fn state(&self) -> TailerState {
        self.state
    }

    /// Counters shared with the stats reporter.
    pub fn stats(&self) -> Arc<SourceStats> {
        Arc::clone(&self.stats)
    }

    /// Opens the log file and records its identity. The next read pass
    /// starts at byte 0.
    pub fn open(&mut self) -> Result<(), TailerError> {
        let open_err = |source| TailerError::Open {
            path: self.path.clone(),
            source,
        };
        let file = File::open(&self.path).map_err(open_err)?;
        let file_id = FileId::from_file(&file).map_err(open_err)?;

        debug!(source = %self.name, path = %self.path.display(), file_id = %file_id, "Opened log file");
        self.file = Some(file);
        self.file_id = Some(file_id);
        self.position = 0;
        Ok(())
    }

    /// Reads every complete line after the stored offset and returns the
    /// addresses found.
    ///
    /// A file that shrank below the offset was truncated in place and is
    /// read again from the start. The offset advances by the bytes of the
    /// complete lines consumed; a read error ends the pass early but keeps
    /// what was read before it.
    pub fn read_pass(&mut self) -> io::Result<AddressSet> {
        let found = AddressSet::new();
        let Some(file) = self.file.as_ref() else {
            return Ok(found);
        };
        self.state = TailerState::Reading;

        let size = file.metadata()?.len();
        if size < self.position {
            info!(
                source = %self.name,
                path = %self.path.display(),
                old_pos = self.position,
                new_size = size,
                "File truncated, resetting position to 0"
            );
            self.position = 0;
        }

        let mut handle = file;
        handle.seek(SeekFrom::Start(self.position))?;
        let mut reader = BufReader::new(handle);

        let mut buf = Vec::new();
        let mut bytes = 0u64;
        let mut lines = 0u64;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                // Unterminated tail, left for the next pass.
                Ok(_) if buf.last() != Some(&b'\n') => break,
                Ok(n) => {
                    bytes += n as u64;
                    lines += 1;
                    let line = String::from_utf8_lossy(&buf);
                    found.extend(self.matcher.match_line(line.trim_end_matches(['\n', '\r'])));
                }
                Err(e) => {
                    warn!(source = %self.name, path = %self.path.display(), error = %e, "Error reading line");
                    break;
                }
            }
        }

        self.position += bytes;
        self.stats.record_pass(bytes, lines);
        if self.log_level >= LevelFilter::DEBUG {
            debug!(
                source = %self.name,
                bytes,
                lines,
                addresses = found.len(),
                position = self.position,
                "Read pass complete"
            );
        }
        Ok(found)
    }

    /// Re-opens the path and compares the file behind it with the one held.
    ///
    /// Returns `true` when the identity changed; the new handle then
    /// replaces the old one and the offset restarts at 0. The caller is
    /// responsible for re-registering the change watch.
    pub fn refresh(&mut self) -> io::Result<bool> {
        self.state = TailerState::Refreshing;

        let file = File::open(&self.path)?;
        let file_id = FileId::from_file(&file)?;
        if self.file_id == Some(file_id) {
            debug!(source = %self.name, file_id = %file_id, "File identity unchanged");
            return Ok(false);
        }

        info!(
            source = %self.name,
            path = %self.path.display(),
            old = ?self.file_id.map(|id| id.to_string()),
            new = %file_id,
            "Log file rotated, reading new file from the start"
        );
        self.file = Some(file);
        self.file_id = Some(file_id);
        self.position = 0;
        Ok(true)
    }

    /// Hands the addresses of a pass to the sink.
    ///
    /// Empty sets are not sent. A sink failure is logged and nothing is
    /// counted as added.
    pub async fn forward(&self, found: AddressSet) {
        if found.is_empty() {
            return;
        }
        let addresses = found.into_addresses();

        match self.sink.add(&addresses).await {
            Ok(added) => {
                self.stats.record_added(added.len() as u64);
                if self.log_level >= LevelFilter::INFO {
                    let set = self.sink.target();
                    for address in &added {
                        info!(source = %self.name, address = %address, set = %set, "Added address");
                    }
                }
            }
            Err(e) => {
                error!(
                    source = %self.name,
                    set = %self.sink.target(),
                    count = addresses.len(),
                    error = %e,
                    "Failed to add addresses"
                );
            }
        }
    }

    /// Reacts to one change notification.
    ///
    /// Only notification failures are returned; everything else is logged.
    pub async fn handle_event(
        &mut self,
        event: ChangeEvent,
        notifier: &mut ChangeNotifier,
    ) -> Result<(), TailerError> {
        self.stats.record_event();
        if self.log_level >= LevelFilter::DEBUG {
            debug!(source = %self.name, event = %event, "Change notification");
        }

        if !event.is_data_only() || self.needs_refresh {
            self.refresh_after_grace(notifier).await?;
        }

        let found = self.pass();
        self.forward(found).await;
        self.state = TailerState::AwaitingEvent;
        Ok(())
    }

    /// Runs the tailer until shutdown or a fatal error.
    ///
    /// The file is opened (unless [`Tailer::open`] already did), watched,
    /// and read once from the start. The watch is in place before the first
    /// pass, so a line appended during it produces an event. Events are
    /// handled strictly in order; a pass in progress always completes before
    /// shutdown is seen.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), TailerError> {
        if self.file.is_none() {
            self.open()?;
        }
        let (mut notifier, mut events) = ChangeNotifier::new(&self.path)?;

        let found = self.pass();
        self.forward(found).await;
        self.state = TailerState::AwaitingEvent;
        info!(source = %self.name, path = %self.path.display(), set = %self.sink.target(), "Watching log file");

        let result = loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break Ok(());
                    }
                }
                event = events.recv() => match event {
                    Some(Ok(event)) => {
                        if let Err(e) = self.handle_event(event, &mut notifier).await {
                            break Err(e);
                        }
                    }
                    Some(Err(e)) => break Err(e.into()),
                    None => break Err(TailerError::EventsClosed { path: self.path.clone() }),
                },
                () = tokio::time::sleep(self.rotation.grace_period()), if self.needs_refresh => {
                    if let Err(e) = self.refresh_once(&mut notifier) {
                        break Err(e);
                    }
                    if !self.needs_refresh {
                        let found = self.pass();
                        self.forward(found).await;
                    }
                    self.state = TailerState::AwaitingEvent;
                }
            }
        };

        self.state = TailerState::Terminated;
        drop(notifier);
        self.file = None;
        match &result {
            Ok(()) => info!(source = %self.name, "Stopped watching log file"),
            Err(e) => error!(source = %self.name, error = %e, "Tailer terminated"),
        }
        result
    }

    /// Read pass whose I/O failure is only logged.
    fn pass(&mut self) -> AddressSet {
        match self.read_pass() {
            Ok(found) => found,
            Err(e) => {
                warn!(source = %self.name, path = %self.path.display(), error = %e, "Read pass failed");
                AddressSet::new()
            }
        }
    }

    /// Waits the grace period and re-opens the path, up to the configured
    /// number of attempts. When every attempt fails, the source keeps its
    /// old handle and retries on the next event or grace tick.
    async fn refresh_after_grace(&mut self, notifier: &mut ChangeNotifier) -> Result<(), TailerError> {
        let attempts = self.rotation.reopen_attempts.max(1);
        for attempt in 1..=attempts {
            tokio::time::sleep(self.rotation.grace_period()).await;
            self.refresh_once(notifier)?;
            if !self.needs_refresh {
                return Ok(());
            }
            debug!(source = %self.name, attempt, attempts, "Re-open attempt failed");
        }
        error!(
            source = %self.name,
            path = %self.path.display(),
            attempts,
            "Log file still not accessible, will retry"
        );
        Ok(())
    }

    /// One refresh attempt; only a failed re-watch is an error.
    fn refresh_once(&mut self, notifier: &mut ChangeNotifier) -> Result<(), TailerError> {
        match self.refresh() {
            Ok(rotated) => {
                if rotated {
                    notifier.rewatch()?;
                }
                self.needs_refresh = false;
            }
            Err(e) => {
                warn!(source = %self.name, path = %self.path.display(), error = %e, "Failed to re-open log file");
                self.needs_refresh = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::AddressFamily;
    use crate::sink::SinkError;
    use async_trait::async_trait;
    use std::fs;
    use std::io::Write;
    use std::net::IpAddr;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const BLOCKED: &str = r"blocked (\S+)";

    /// Sink that records every call.
    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<Vec<IpAddr>>>,
        fail: bool,
    }

    impl RecordingSink {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Vec<IpAddr>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sink for RecordingSink {
        fn target(&self) -> String {
            "@test".to_string()
        }

        async fn add(&self, addresses: &[IpAddr]) -> Result<Vec<IpAddr>, SinkError> {
            self.calls.lock().unwrap().push(addresses.to_vec());
            if self.fail {
                return Err(SinkError::CommandFailed {
                    program: "nft".to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: "no such set".to_string(),
                });
            }
            Ok(addresses.to_vec())
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn write_file(path: &Path, content: &str) {
        let mut file = File::create(path).expect("Failed to create file");
        file.write_all(content.as_bytes()).expect("Failed to write content");
    }

    fn append(path: &Path, content: &str) {
        let mut file = fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn source(path: &Path, whitelist: &[&str]) -> SourceConfig {
        SourceConfig {
            name: "test".to_string(),
            logfile: path.to_path_buf(),
            patterns: vec![BLOCKED.to_string()],
            whitelist: whitelist.iter().map(|s| s.to_string()).collect(),
            log_level: Some(Severity::Debug),
            set: None,
        }
    }

    fn set() -> SetConfig {
        SetConfig {
            family: "inet".to_string(),
            table: "filter".to_string(),
            name: "test".to_string(),
            address_family: AddressFamily::Ipv4,
        }
    }

    fn tailer(path: &Path, whitelist: &[&str], sink: Arc<RecordingSink>) -> Tailer {
        Tailer::new(&source(path, whitelist), &set(), RotationConfig::default(), sink).unwrap()
    }

    fn setup(content: &str) -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("app.log");
        write_file(&path, content);
        (dir, path)
    }

    #[test]
    fn new_tailer_is_idle() {
        let (_dir, path) = setup("");
        let t = tailer(&path, &[], Arc::new(RecordingSink::default()));
        assert_eq!(t.state(), TailerState::Idle);
        assert_eq!(t.position(), 0);
        assert!(t.file_id().is_none());
    }

    #[test]
    fn invalid_whitelist_is_rejected() {
        let (_dir, path) = setup("");
        let result = Tailer::new(
            &source(&path, &["not-an-address"]),
            &set(),
            RotationConfig::default(),
            Arc::new(RecordingSink::default()),
        );
        assert!(matches!(result, Err(TailerError::Config(_))));
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = tailer(&dir.path().join("missing.log"), &[], Arc::new(RecordingSink::default()));
        let err = t.open().unwrap_err();
        assert!(matches!(err, TailerError::Open { .. }));
        assert!(err.to_string().contains("missing.log"));
    }

    #[test]
    fn first_pass_reads_whole_file() {
        let content = "blocked 10.0.0.5\nnothing here\nblocked 10.0.0.6\n";
        let (_dir, path) = setup(content);
        let mut t = tailer(&path, &[], Arc::new(RecordingSink::default()));
        t.open().unwrap();

        let found = t.read_pass().unwrap();
        assert_eq!(found.addresses(), vec![ip("10.0.0.5"), ip("10.0.0.6")]);
        assert_eq!(t.position(), content.len() as u64);
        assert_eq!(t.state(), TailerState::Reading);

        let snap = t.stats().snapshot();
        assert_eq!(snap.bytes_read, content.len() as u64);
        assert_eq!(snap.lines_read, 3);
        assert_eq!(snap.passes, 1);
    }

    #[test]
    fn only_new_lines_are_read() {
        let (_dir, path) = setup("blocked 10.0.0.5\n");
        let mut t = tailer(&path, &[], Arc::new(RecordingSink::default()));
        t.open().unwrap();
        t.read_pass().unwrap();

        append(&path, "blocked 10.0.0.9\n");
        let found = t.read_pass().unwrap();
        assert_eq!(found.addresses(), vec![ip("10.0.0.9")]);
        assert_eq!(t.position(), 34);
    }

    #[test]
    fn partial_line_is_not_consumed() {
        let (_dir, path) = setup("blocked 10.0.0.5\nblocked 10.0.");
        let mut t = tailer(&path, &[], Arc::new(RecordingSink::default()));
        t.open().unwrap();

        let found = t.read_pass().unwrap();
        assert_eq!(found.addresses(), vec![ip("10.0.0.5")]);
        assert_eq!(t.position(), 17);

        append(&path, "0.7\n");
        let found = t.read_pass().unwrap();
        assert_eq!(found.addresses(), vec![ip("10.0.0.7")]);
        assert_eq!(t.position(), 34);
    }

    #[test]
    fn crlf_lines_are_trimmed() {
        let (_dir, path) = setup("blocked 10.0.0.5\r\n");
        let mut t = tailer(&path, &[], Arc::new(RecordingSink::default()));
        t.open().unwrap();
        assert_eq!(t.read_pass().unwrap().addresses(), vec![ip("10.0.0.5")]);
        assert_eq!(t.position(), 18);
    }

    #[test]
    fn invalid_utf8_does_not_stop_the_pass() {
        let (_dir, path) = setup("");
        fs::write(&path, b"\xff\xfe garbage\nblocked 10.0.0.5\n").unwrap();
        let mut t = tailer(&path, &[], Arc::new(RecordingSink::default()));
        t.open().unwrap();
        assert_eq!(t.read_pass().unwrap().addresses(), vec![ip("10.0.0.5")]);
    }

    #[test]
    fn truncation_rereads_from_start() {
        let (_dir, path) = setup("blocked 10.0.0.5\nblocked 10.0.0.6\n");
        let mut t = tailer(&path, &[], Arc::new(RecordingSink::default()));
        t.open().unwrap();
        t.read_pass().unwrap();
        assert_eq!(t.position(), 34);

        // Truncate in place, keeping the same file.
        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(0).unwrap();
        drop(file);
        append(&path, "blocked 10.0.0.8\n");

        let found = t.read_pass().unwrap();
        assert_eq!(found.addresses(), vec![ip("10.0.0.8")]);
        assert_eq!(t.position(), 17);
    }

    #[test]
    fn repeated_address_counted_once_per_pass() {
        let (_dir, path) = setup("blocked 10.0.0.5\nblocked 10.0.0.5\n");
        let mut t = tailer(&path, &[], Arc::new(RecordingSink::default()));
        t.open().unwrap();
        assert_eq!(t.read_pass().unwrap().addresses(), vec![ip("10.0.0.5")]);
    }

    #[test]
    fn bad_capture_does_not_abort_the_pass() {
        let (_dir, path) = setup("blocked nonsense\nblocked 10.0.0.6\n");
        let mut t = tailer(&path, &[], Arc::new(RecordingSink::default()));
        t.open().unwrap();
        assert_eq!(t.read_pass().unwrap().addresses(), vec![ip("10.0.0.6")]);
        assert_eq!(t.position(), 34);
    }

    #[test]
    fn refresh_keeps_offset_for_same_file() {
        let (_dir, path) = setup("blocked 10.0.0.5\n");
        let mut t = tailer(&path, &[], Arc::new(RecordingSink::default()));
        t.open().unwrap();
        t.read_pass().unwrap();
        let id = t.file_id();

        append(&path, "more\n");
        assert!(!t.refresh().unwrap());
        assert_eq!(t.file_id(), id);
        assert_eq!(t.position(), 17);
        assert_eq!(t.state(), TailerState::Refreshing);
    }

    #[cfg(unix)]
    #[test]
    fn rotation_to_smaller_file_reads_new_file_from_start() {
        let old = format!("{:<99}\n", "blocked 10.0.0.5");
        let new = format!("{:<39}\n", "blocked 10.0.0.7");
        assert_eq!(old.len(), 100);
        assert_eq!(new.len(), 40);

        let (dir, path) = setup(&old);
        let mut t = tailer(&path, &[], Arc::new(RecordingSink::default()));
        t.open().unwrap();
        t.read_pass().unwrap();
        assert_eq!(t.position(), 100);
        let old_id = t.file_id();

        // Replace the file behind the path, as logrotate's create mode does.
        let staged = dir.path().join("app.log.new");
        write_file(&staged, &new);
        fs::rename(&path, dir.path().join("app.log.1")).unwrap();
        fs::rename(&staged, &path).unwrap();

        assert!(t.refresh().unwrap());
        assert_ne!(t.file_id(), old_id);
        assert_eq!(t.position(), 0);

        let found = t.read_pass().unwrap();
        assert_eq!(found.addresses(), vec![ip("10.0.0.7")]);
        assert_eq!(t.position(), 40);
    }

    #[test]
    fn refresh_of_missing_path_is_an_io_error() {
        let (_dir, path) = setup("blocked 10.0.0.5\n");
        let mut t = tailer(&path, &[], Arc::new(RecordingSink::default()));
        t.open().unwrap();
        t.read_pass().unwrap();

        fs::remove_file(&path).unwrap();
        assert!(t.refresh().is_err());
        assert_eq!(t.position(), 17);
        assert!(t.file_id().is_some());
    }

    #[tokio::test]
    async fn forward_sends_blocked_address() {
        let (_dir, path) = setup("2024-01-01 sshd: blocked 10.0.0.5\n");
        let sink = Arc::new(RecordingSink::default());
        let mut t = tailer(&path, &[], Arc::clone(&sink));
        t.open().unwrap();

        let found = t.read_pass().unwrap();
        t.forward(found).await;

        assert_eq!(sink.calls(), vec![vec![ip("10.0.0.5")]]);
        assert_eq!(t.stats().snapshot().addresses_added, 1);
    }

    #[tokio::test]
    async fn whitelisted_address_is_never_sent() {
        let (_dir, path) = setup("blocked 10.0.0.5\nblocked 127.0.0.1\n");
        let sink = Arc::new(RecordingSink::default());
        let mut t = tailer(&path, &["127.0.0.1", "10.0.0.0/8"], Arc::clone(&sink));
        t.open().unwrap();

        let found = t.read_pass().unwrap();
        assert!(found.is_empty());
        t.forward(found).await;

        assert!(sink.calls().is_empty());
        assert_eq!(t.stats().snapshot().addresses_added, 0);
    }

    #[tokio::test]
    async fn sink_error_counts_nothing() {
        let (_dir, path) = setup("blocked 10.0.0.5\n");
        let sink = Arc::new(RecordingSink::failing());
        let mut t = tailer(&path, &[], Arc::clone(&sink));
        t.open().unwrap();

        let found = t.read_pass().unwrap();
        t.forward(found).await;

        append(&path, "blocked 10.0.0.6\n");
        let found = t.read_pass().unwrap();
        t.forward(found).await;

        assert_eq!(sink.calls().len(), 2);
        assert_eq!(t.stats().snapshot().addresses_added, 0);
        assert_eq!(t.position(), 34);
    }

    #[tokio::test]
    async fn modified_event_triggers_a_pass() {
        let (_dir, path) = setup("");
        let sink = Arc::new(RecordingSink::default());
        let mut t = tailer(&path, &[], Arc::clone(&sink));
        t.open().unwrap();
        let (mut notifier, _events) = ChangeNotifier::new(&path).unwrap();

        append(&path, "blocked 10.0.0.5\n");
        t.handle_event(ChangeEvent::Modified, &mut notifier).await.unwrap();

        assert_eq!(sink.calls(), vec![vec![ip("10.0.0.5")]]);
        assert_eq!(t.state(), TailerState::AwaitingEvent);
        assert_eq!(t.stats().snapshot().events_received, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn rotation_event_rewatches_and_reads_new_file() {
        let (dir, path) = setup("blocked 10.0.0.5\n");
        let sink = Arc::new(RecordingSink::default());
        let rotation = RotationConfig {
            grace_period_ms: 10,
            reopen_attempts: 3,
        };
        let mut t = Tailer::new(&source(&path, &[]), &set(), rotation, Arc::clone(&sink) as Arc<dyn Sink>).unwrap();
        t.open().unwrap();
        t.read_pass().unwrap();
        let (mut notifier, _events) = ChangeNotifier::new(&path).unwrap();

        fs::rename(&path, dir.path().join("app.log.1")).unwrap();
        write_file(&path, "blocked 10.0.0.7\n");

        t.handle_event(
            ChangeEvent::PossibleRotation(crate::notifier::RotationHint::Moved),
            &mut notifier,
        )
        .await
        .unwrap();

        assert_eq!(sink.calls(), vec![vec![ip("10.0.0.7")]]);
        assert_eq!(t.position(), 17);
    }

    #[tokio::test]
    async fn failed_reopen_is_retried_on_next_event() {
        let (_dir, path) = setup("blocked 10.0.0.5\n");
        let sink = Arc::new(RecordingSink::default());
        let rotation = RotationConfig {
            grace_period_ms: 5,
            reopen_attempts: 2,
        };
        let mut t = Tailer::new(&source(&path, &[]), &set(), rotation, Arc::clone(&sink) as Arc<dyn Sink>).unwrap();
        t.open().unwrap();
        t.read_pass().unwrap();
        let (mut notifier, _events) = ChangeNotifier::new(&path).unwrap();

        fs::remove_file(&path).unwrap();
        t.handle_event(
            ChangeEvent::PossibleRotation(crate::notifier::RotationHint::Removed),
            &mut notifier,
        )
        .await
        .unwrap();
        assert!(t.needs_refresh);

        write_file(&path, "blocked 10.0.0.8\n");
        t.handle_event(ChangeEvent::Modified, &mut notifier).await.unwrap();
        assert!(!t.needs_refresh);
        assert_eq!(sink.calls(), vec![vec![ip("10.0.0.8")]]);
    }
}
