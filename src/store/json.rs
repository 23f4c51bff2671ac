use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::config::StoreConfig;
use crate::model::Collection;

use super::journal::{CommitRecord, Journal, JournalState};
use super::{is_unpublished, Changeset, RecordStore, Unpublished};

const JOURNAL_FILE: &str = "commit.journal";

/// Collections as pretty JSON arrays in `data_dir`, one file each.
///
/// A commit stages every file as `<name>.tmp` (fsynced), journals the file set
/// when more than one collection is involved, then backs up and renames each
/// file into place. [`JsonStore::open`] and every commit first finish or undo
/// whatever an interrupted commit left behind.
#[derive(Debug, Clone)]
pub struct JsonStore {
    data_dir: PathBuf,
    backup_dir: PathBuf,
    max_backups: usize,
    journal: Journal,
}

impl JsonStore {
    pub fn open(config: &StoreConfig) -> io::Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        let store = Self {
            data_dir: config.data_dir.clone(),
            backup_dir: config.backup_dir.clone(),
            max_backups: config.max_backups,
            journal: Journal::new(config.data_dir.join(JOURNAL_FILE)),
        };
        store.recover()?;
        Ok(store)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn path_of(&self, collection: Collection) -> PathBuf {
        self.data_dir.join(collection.file_name())
    }

    fn staged_path(&self, file_name: &str) -> PathBuf {
        self.data_dir.join(format!("{file_name}.tmp"))
    }

    /// Roll a journaled commit forward, then drop any staged file that no
    /// journal vouches for. A roll-forward that fails again leaves the journal
    /// in place and reports [`Unpublished`].
    fn recover(&self) -> io::Result<()> {
        match self.journal.read()? {
            JournalState::Pending(record) => {
                if let Err(cause) = self.roll_forward(&record) {
                    return Err(Unpublished {
                        commit: record.id,
                        files: record.files,
                        cause,
                    }
                    .into_io());
                }
                info!("rolled forward commit {} ({} files)", record.id, record.files.len());
            }
            JournalState::Torn => {
                self.journal.finish()?;
                warn!("discarded torn commit journal in {}", self.data_dir.display());
            }
            JournalState::Absent => {}
        }

        for collection in Collection::ALL {
            let staged = self.staged_path(collection.file_name());
            match fs::remove_file(&staged) {
                Ok(()) => warn!("removed orphan staged file {}", staged.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn roll_forward(&self, record: &CommitRecord) -> io::Result<()> {
        for file in &record.files {
            let staged = self.staged_path(file);
            if staged.exists() {
                fs::rename(&staged, self.data_dir.join(file))?;
            }
        }
        let _ = File::open(&self.data_dir).and_then(|dir| dir.sync_all());
        self.journal.finish()
    }

    /// Recover before committing. A journaled commit that still cannot be
    /// published only blocks commits that would need the journal or touch one
    /// of its files.
    fn recover_for(&self, entries: &[(Collection, Vec<u8>)]) -> io::Result<()> {
        let Err(e) = self.recover() else {
            return Ok(());
        };
        if !is_unpublished(&e) {
            return Err(e);
        }
        match self.journal.read()? {
            JournalState::Pending(record)
                if entries.len() == 1
                    && !record.files.iter().any(|f| f == entries[0].0.file_name()) =>
            {
                warn!("{e}; committing {} alongside it", entries[0].0);
                Ok(())
            }
            _ => Err(e),
        }
    }

    fn commit_blocking(&self, entries: Vec<(Collection, Vec<u8>)>) -> io::Result<()> {
        self.recover_for(&entries)?;

        let mut staged: Vec<PathBuf> = Vec::with_capacity(entries.len());
        for (collection, bytes) in &entries {
            let path = self.staged_path(collection.file_name());
            let written = write_synced(&path, bytes);
            staged.push(path);
            if let Err(e) = written {
                discard(&staged);
                return Err(e);
            }
        }

        let record = CommitRecord {
            id: Ulid::new(),
            files: entries.iter().map(|(c, _)| c.file_name().to_string()).collect(),
        };
        let journaled = entries.len() > 1;
        if journaled && let Err(e) = self.journal.begin(&record) {
            discard(&staged);
            let _ = self.journal.finish();
            return Err(e);
        }

        // Past this point a journaled commit is decided: failures roll forward.
        for ((collection, _), staged_file) in entries.iter().zip(&staged) {
            if let Err(e) = self.backup_file(*collection) {
                warn!("backup of {collection} failed: {e}");
            }
            if let Err(e) = fs::rename(staged_file, self.path_of(*collection)) {
                if !journaled {
                    discard(&staged);
                    return Err(e);
                }
                warn!("commit {} stopped at {collection}: {e}; rolling forward", record.id);
                return self.roll_forward(&record).map_err(|cause| {
                    Unpublished {
                        commit: record.id,
                        files: record.files.clone(),
                        cause,
                    }
                    .into_io()
                });
            }
        }
        let _ = File::open(&self.data_dir).and_then(|dir| dir.sync_all());

        if journaled {
            self.journal.finish()?;
        }
        debug!("commit {} wrote {:?}", record.id, record.files);
        Ok(())
    }

    /// Copy the current file of `collection` into the backup directory and
    /// prune. Returns `None` when there is nothing to back up.
    fn backup_file(&self, collection: Collection) -> io::Result<Option<String>> {
        let source = self.path_of(collection);
        if !source.exists() {
            return Ok(None);
        }
        fs::create_dir_all(&self.backup_dir)?;
        let stamp = Utc::now()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        let name = self.free_backup_name(collection, &stamp);
        fs::copy(&source, self.backup_dir.join(&name))?;
        self.prune(collection)?;
        Ok(Some(name))
    }

    /// `<file>.<stamp>.bak`, or `<file>.<stamp>_NNN.bak` when a backup in the
    /// same millisecond already took that name. `_` sorts after `.`, so
    /// suffixed names stay in commit order for pruning.
    fn free_backup_name(&self, collection: Collection, stamp: &str) -> String {
        let file = collection.file_name();
        let mut name = format!("{file}.{stamp}.bak");
        let mut n = 1;
        while self.backup_dir.join(&name).exists() {
            name = format!("{file}.{stamp}_{n:03}.bak");
            n += 1;
        }
        name
    }

    /// Keep only the `max_backups` newest backups of `collection`.
    fn prune(&self, collection: Collection) -> io::Result<()> {
        let prefix = format!("{}.", collection.file_name());
        let mut backups: Vec<String> = fs::read_dir(&self.backup_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(&prefix) && name.ends_with(".bak"))
            .collect();
        if backups.len() <= self.max_backups {
            return Ok(());
        }
        backups.sort();
        let excess = backups.len() - self.max_backups;
        for name in &backups[..excess] {
            fs::remove_file(self.backup_dir.join(name))?;
            debug!("pruned backup {name}");
        }
        Ok(())
    }

    fn backup_all(&self) -> io::Result<Vec<String>> {
        let mut written = Vec::new();
        for collection in Collection::ALL {
            if let Some(name) = self.backup_file(collection)? {
                written.push(name);
            }
        }
        Ok(written)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn discard(staged: &[PathBuf]) {
    for path in staged {
        let _ = fs::remove_file(path);
    }
}

#[async_trait]
impl RecordStore for JsonStore {
    async fn read(&self, collection: Collection) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_of(collection)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn commit(&self, changes: Changeset) -> io::Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let size = changes.len();
        let start = Instant::now();
        let this = self.clone();
        let result = tokio::task::spawn_blocking(move || this.commit_blocking(changes.into_entries()))
            .await
            .map_err(io::Error::other)?;

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(crate::observability::COMMITS_TOTAL, "status" => status).increment(1);
        metrics::histogram!(crate::observability::COMMIT_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());
        metrics::histogram!(crate::observability::COMMIT_COLLECTIONS).record(size as f64);
        result
    }

    async fn backup(&self) -> io::Result<Vec<String>> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.backup_all())
            .await
            .map_err(io::Error::other)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::store::get;

    fn test_config(name: &str) -> StoreConfig {
        let root = std::env::temp_dir()
            .join("frontdesk_test_store")
            .join(format!("{name}_{}", Ulid::new()));
        StoreConfig::new(root.join("data"), root.join("backups")).with_max_backups(3)
    }

    fn room_type(id: Id, name: &str) -> RoomType {
        RoomType {
            room_type_id: id,
            type_name: name.into(),
            price: 100.0,
        }
    }

    fn backups_of(store: &JsonStore, collection: Collection) -> Vec<String> {
        let prefix = format!("{}.", collection.file_name());
        let mut names: Vec<String> = match fs::read_dir(store.backup_dir()) {
            Ok(dir) => dir
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().into_string().ok())
                .filter(|n| n.starts_with(&prefix))
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    #[tokio::test]
    async fn missing_and_corrupt_files_read_empty() {
        let store = JsonStore::open(&test_config("missing")).unwrap();
        assert!(store.read(Collection::Guests).await.unwrap().is_none());

        fs::write(store.path_of(Collection::Guests), "[{oops").unwrap();
        let guests: Vec<Guest> = get(&store).await.unwrap();
        assert!(guests.is_empty());
    }

    #[tokio::test]
    async fn commit_writes_every_collection() {
        let store = JsonStore::open(&test_config("commit")).unwrap();
        let types = vec![room_type(1, "Single")];
        let rooms = vec![Room {
            room_id: 1,
            room_number: "101".into(),
            room_type_id: 1,
            status: RoomStatus::Available,
        }];
        let mut changes = Changeset::new();
        changes.save(&types).unwrap();
        changes.save(&rooms).unwrap();
        store.commit(changes).await.unwrap();

        assert_eq!(get::<RoomType>(&store).await.unwrap(), types);
        assert_eq!(get::<Room>(&store).await.unwrap(), rooms);
        assert!(!store.staged_path("rooms.json").exists());
        assert!(!store.data_dir().join(JOURNAL_FILE).exists());
        // nothing existed before the first commit
        assert!(backups_of(&store, Collection::Rooms).is_empty());
    }

    #[tokio::test]
    async fn replacing_a_file_backs_it_up_and_prunes() {
        let store = JsonStore::open(&test_config("prune")).unwrap();
        let mut changes = Changeset::new();
        changes.save(&[room_type(1, "Single")]).unwrap();
        store.commit(changes).await.unwrap();

        fs::create_dir_all(store.backup_dir()).unwrap();
        for n in 0..5 {
            let name = format!("room_types.json.2020-01-01T00-00-0{n}-000Z.bak");
            fs::write(store.backup_dir().join(name), "[]").unwrap();
        }
        fs::write(store.backup_dir().join("rooms.json.2020-01-01T00-00-00-000Z.bak"), "[]").unwrap();

        let mut changes = Changeset::new();
        changes.save(&[room_type(1, "Double")]).unwrap();
        store.commit(changes).await.unwrap();

        let kept = backups_of(&store, Collection::RoomTypes);
        assert_eq!(kept.len(), 3);
        assert!(kept[0].starts_with("room_types.json.2020-01-01T00-00-03"));
        let newest = fs::read_to_string(store.backup_dir().join(&kept[2])).unwrap();
        assert!(newest.contains("Single"));
        assert_eq!(backups_of(&store, Collection::Rooms).len(), 1);
    }

    #[tokio::test]
    async fn explicit_backup_copies_existing_collections() {
        let store = JsonStore::open(&test_config("backup")).unwrap();
        let mut changes = Changeset::new();
        changes.save(&[room_type(1, "Single")]).unwrap();
        store.commit(changes).await.unwrap();

        let written = store.backup().await.unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].starts_with("room_types.json."));
        assert!(written[0].ends_with(".bak"));
        assert!(!written[0].contains(':'));
    }

    #[test]
    fn same_millisecond_backups_get_ordered_suffixes() {
        let store = JsonStore::open(&test_config("backup_names")).unwrap();
        fs::create_dir_all(store.backup_dir()).unwrap();
        let stamp = "2024-01-10T14-00-00-000Z";

        let first = store.free_backup_name(Collection::Guests, stamp);
        assert_eq!(first, "guests.json.2024-01-10T14-00-00-000Z.bak");
        fs::write(store.backup_dir().join(&first), "[]").unwrap();

        let second = store.free_backup_name(Collection::Guests, stamp);
        assert_eq!(second, "guests.json.2024-01-10T14-00-00-000Z_001.bak");
        fs::write(store.backup_dir().join(&second), "[]").unwrap();
        let third = store.free_backup_name(Collection::Guests, stamp);
        assert_eq!(third, "guests.json.2024-01-10T14-00-00-000Z_002.bak");

        let later = "guests.json.2024-01-10T14-00-00-001Z.bak".to_string();
        let mut names = vec![later.clone(), third.clone(), first.clone(), second.clone()];
        names.sort();
        assert_eq!(names, vec![first, second, third, later]);
    }

    #[test]
    fn open_rolls_journaled_commit_forward() {
        let config = test_config("roll_forward");
        fs::create_dir_all(&config.data_dir).unwrap();
        fs::write(config.data_dir.join("bookings.json"), "[]").unwrap();
        fs::write(config.data_dir.join("bookings.json.tmp"), "[1]").unwrap();
        fs::write(config.data_dir.join("rooms.json.tmp"), "[2]").unwrap();
        let journal = Journal::new(config.data_dir.join(JOURNAL_FILE));
        journal
            .begin(&CommitRecord {
                id: Ulid::new(),
                files: vec!["bookings.json".into(), "rooms.json".into()],
            })
            .unwrap();

        let store = JsonStore::open(&config).unwrap();
        assert_eq!(fs::read_to_string(store.path_of(Collection::Bookings)).unwrap(), "[1]");
        assert_eq!(fs::read_to_string(store.path_of(Collection::Rooms)).unwrap(), "[2]");
        assert_eq!(journal.read().unwrap(), JournalState::Absent);
    }

    #[test]
    fn open_discards_torn_journal_and_orphans() {
        let config = test_config("roll_back");
        fs::create_dir_all(&config.data_dir).unwrap();
        fs::write(config.data_dir.join("guests.json"), "[]").unwrap();
        fs::write(config.data_dir.join("guests.json.tmp"), "[9]").unwrap();
        fs::write(config.data_dir.join("payments.json.tmp"), "[9]").unwrap();
        fs::write(config.data_dir.join(JOURNAL_FILE), [7u8, 0, 0]).unwrap();

        let store = JsonStore::open(&config).unwrap();
        assert_eq!(fs::read_to_string(store.path_of(Collection::Guests)).unwrap(), "[]");
        assert!(!store.staged_path("guests.json").exists());
        assert!(!store.staged_path("payments.json").exists());
        assert!(!store.data_dir().join(JOURNAL_FILE).exists());
    }

    #[tokio::test]
    async fn stuck_rename_is_reported_unpublished_and_finished_on_reopen() {
        let config = test_config("unpublished");
        let store = JsonStore::open(&config).unwrap();
        // a non-empty directory where payments.json belongs makes its rename fail
        let blocker = store.path_of(Collection::Payments);
        fs::create_dir_all(blocker.join("keep")).unwrap();

        let guests = vec![Guest {
            guest_id: 1,
            full_name: "Ada".into(),
            phone: String::new(),
            email: String::new(),
            address: "1 Loop Rd".into(),
        }];
        let mut changes = Changeset::new();
        changes.save(&guests).unwrap();
        changes.save::<Payment>(&[]).unwrap();
        let err = store.commit(changes).await.unwrap_err();
        assert!(is_unpublished(&err));
        assert!(matches!(store.journal.read().unwrap(), JournalState::Pending(_)));
        assert!(store.staged_path("payments.json").exists());

        // unrelated single-collection commits still go through
        let mut changes = Changeset::new();
        changes.save(&[room_type(1, "Single")]).unwrap();
        store.commit(changes).await.unwrap();
        assert_eq!(get::<RoomType>(&store).await.unwrap().len(), 1);

        // files owned by the stuck commit stay locked
        let mut changes = Changeset::new();
        changes.save(&guests).unwrap();
        assert!(is_unpublished(&store.commit(changes).await.unwrap_err()));

        fs::remove_dir_all(&blocker).unwrap();
        let reopened = JsonStore::open(&config).unwrap();
        assert_eq!(get::<Guest>(&reopened).await.unwrap(), guests);
        assert_eq!(fs::read_to_string(reopened.path_of(Collection::Payments)).unwrap(), "[]");
        assert_eq!(reopened.journal.read().unwrap(), JournalState::Absent);
    }
}
