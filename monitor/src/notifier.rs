//! Bridge between OS file notifications and a tailer's control loop.
//!
//! The [`notify`] backend runs its own thread that blocks on the OS event
//! source (inotify on Linux). The callback installed here only decodes each
//! raw event into a [`ChangeEvent`] and pushes it into an unbounded channel;
//! all file I/O happens in the tailer that owns the receiving end.
//!
//! Dropping the [`ChangeNotifier`] removes the watch and stops the backend
//! thread, which also ends the event stream.

use std::fmt;
use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// What a non-data change may mean for the watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationHint {
    /// Permissions, ownership, link count or timestamps changed.
    Attributes,
    /// The watched file was renamed.
    Moved,
    /// The watched file was removed.
    Removed,
    /// A file was created at the watched path.
    Created,
}

/// A decoded change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Data was written to the file in place.
    Modified,
    /// The file behind the path may have been replaced.
    PossibleRotation(RotationHint),
    /// A change the decoder does not recognise.
    Unknown,
}

impl ChangeEvent {
    /// Decodes a raw notify event kind.
    ///
    /// Returns `None` for events that never require action, such as the
    /// open/close notifications caused by the tailer's own reads.
    pub fn decode(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Access(_) => None,
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => Some(Self::Modified),
            EventKind::Modify(ModifyKind::Metadata(_)) => {
                Some(Self::PossibleRotation(RotationHint::Attributes))
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                Some(Self::PossibleRotation(RotationHint::Moved))
            }
            EventKind::Remove(_) => Some(Self::PossibleRotation(RotationHint::Removed)),
            EventKind::Create(_) => Some(Self::PossibleRotation(RotationHint::Created)),
            EventKind::Modify(ModifyKind::Other) | EventKind::Other | EventKind::Any => {
                Some(Self::Unknown)
            }
        }
    }

    /// Returns `true` for in-place data appends.
    pub fn is_data_only(&self) -> bool {
        matches!(self, Self::Modified)
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Modified => f.write_str("modified"),
            Self::PossibleRotation(RotationHint::Attributes) => f.write_str("attributes changed"),
            Self::PossibleRotation(RotationHint::Moved) => f.write_str("moved"),
            Self::PossibleRotation(RotationHint::Removed) => f.write_str("removed"),
            Self::PossibleRotation(RotationHint::Created) => f.write_str("created"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Errors from the notification subsystem itself.
///
/// Any of these ends the owning tailer: without an event source it cannot
/// observe the file any more.
#[derive(Error, Debug)]
pub enum NotifierError {
    /// The backend could not be created or the watch could not be added.
    #[error("failed to register watch on {path}: {source}")]
    Register {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// The backend reported an error while reading events.
    #[error("notification backend error: {0}")]
    Backend(#[from] notify::Error),
}

/// Item carried by the notification channel.
pub type Notification = Result<ChangeEvent, NotifierError>;

/// Watch on a single file path.
pub struct ChangeNotifier {
    watcher: RecommendedWatcher,
    path: PathBuf,
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ChangeNotifier {
    /// Starts watching `path` and returns the notifier with the receiving
    /// end of its event channel.
    pub fn new(path: &Path) -> Result<(Self, mpsc::UnboundedReceiver<Notification>), NotifierError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let register_err = |source| NotifierError::Register {
            path: path.to_path_buf(),
            source,
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| forward_event(res, &tx),
            Config::default(),
        )
        .map_err(register_err)?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(register_err)?;

        debug!(path = %path.display(), "Registered change notification watch");

        Ok((
            Self {
                watcher,
                path: path.to_path_buf(),
            },
            rx,
        ))
    }

    /// Path being watched.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drops the current watch and registers a new one for the same path.
    ///
    /// Called after a rotation: the old watch follows the old inode, so a new
    /// one is needed for the file now at the path.
    pub fn rewatch(&mut self) -> Result<(), NotifierError> {
        if let Err(e) = self.watcher.unwatch(&self.path) {
            // The backend drops watches on deleted files by itself.
            debug!(path = %self.path.display(), error = %e, "Old watch already gone");
        }
        self.watcher
            .watch(&self.path, RecursiveMode::NonRecursive)
            .map_err(|source| NotifierError::Register {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), "Re-registered change notification watch");
        Ok(())
    }
}

/// Notify callback: decode and hand off, nothing else.
fn forward_event(res: notify::Result<Event>, tx: &mpsc::UnboundedSender<Notification>) {
    let notification = match res {
        Ok(event) => {
            trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");
            match ChangeEvent::decode(&event.kind) {
                Some(change) => Ok(change),
                None => return,
            }
        }
        Err(e) => Err(NotifierError::Backend(e)),
    };

    if tx.send(notification).is_err() {
        trace!("Notification receiver dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{
        AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode,
    };
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn decode_data_change_is_modified() {
        assert_eq!(
            ChangeEvent::decode(&EventKind::Modify(ModifyKind::Data(DataChange::Any))),
            Some(ChangeEvent::Modified)
        );
        assert_eq!(
            ChangeEvent::decode(&EventKind::Modify(ModifyKind::Any)),
            Some(ChangeEvent::Modified)
        );
    }

    #[test]
    fn decode_rotation_signals() {
        assert_eq!(
            ChangeEvent::decode(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))),
            Some(ChangeEvent::PossibleRotation(RotationHint::Attributes))
        );
        assert_eq!(
            ChangeEvent::decode(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            Some(ChangeEvent::PossibleRotation(RotationHint::Moved))
        );
        assert_eq!(
            ChangeEvent::decode(&EventKind::Remove(RemoveKind::File)),
            Some(ChangeEvent::PossibleRotation(RotationHint::Removed))
        );
        assert_eq!(
            ChangeEvent::decode(&EventKind::Create(CreateKind::File)),
            Some(ChangeEvent::PossibleRotation(RotationHint::Created))
        );
    }

    #[test]
    fn decode_unknown_and_ignored() {
        assert_eq!(ChangeEvent::decode(&EventKind::Other), Some(ChangeEvent::Unknown));
        assert_eq!(ChangeEvent::decode(&EventKind::Any), Some(ChangeEvent::Unknown));
        assert_eq!(ChangeEvent::decode(&EventKind::Access(AccessKind::Any)), None);
    }

    #[test]
    fn only_modified_is_data_only() {
        assert!(ChangeEvent::Modified.is_data_only());
        assert!(!ChangeEvent::Unknown.is_data_only());
        assert!(!ChangeEvent::PossibleRotation(RotationHint::Moved).is_data_only());
    }

    #[test]
    fn register_missing_path_fails() {
        let err = ChangeNotifier::new(Path::new("/nonexistent/banwatch/file.log")).unwrap_err();
        assert!(matches!(err, NotifierError::Register { .. }));
        assert!(err.to_string().contains("/nonexistent/banwatch/file.log"));
    }

    #[tokio::test]
    async fn append_produces_modified_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "").unwrap();

        let (notifier, mut rx) = ChangeNotifier::new(&path).unwrap();
        assert_eq!(notifier.path(), path.as_path());

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "hello").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Some(Ok(ChangeEvent::Modified)) => return Some(ChangeEvent::Modified),
                    Some(_) => continue,
                    None => return None,
                }
            }
        })
        .await
        .expect("timed out waiting for event");
        assert_eq!(event, Some(ChangeEvent::Modified));
    }

    #[tokio::test]
    async fn rewatch_after_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "").unwrap();

        let (mut notifier, _rx) = ChangeNotifier::new(&path).unwrap();
        std::fs::rename(&path, dir.path().join("app.log.1")).unwrap();
        std::fs::write(&path, "").unwrap();

        assert!(notifier.rewatch().is_ok());
    }
}
