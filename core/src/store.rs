use crate::index::{DocId, KeywordIndex};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const MEETINGS_TREE: &str = "meetings";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: DocId,
    pub title: String,
    /// When the meeting took place, RFC 3339 in UTC.
    pub datetime: String,
    pub participants: String,
    pub raw_notes: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMeeting {
    pub title: String,
    pub datetime: String,
    #[serde(default)]
    pub participants: String,
    pub raw_notes: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeetingUpdate {
    pub title: Option<String>,
    pub datetime: Option<String>,
    pub participants: Option<String>,
    pub raw_notes: Option<String>,
}

pub struct StorePaths {
    pub root: PathBuf,
}

impl StorePaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn db(&self) -> PathBuf { self.root.join("meetings.sled") }
}

/// Parse an RFC 3339 timestamp, e.g. `2024-03-01T10:00:00Z`.
pub fn parse_datetime(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value.trim(), &Rfc3339).with_context(|| format!("invalid RFC 3339 datetime: {value:?}"))
}

fn normalize_datetime(value: &str) -> Result<String> {
    let dt = parse_datetime(value)?.to_offset(time::UtcOffset::UTC);
    Ok(dt.format(&Rfc3339)?)
}

fn now() -> Result<String> {
    Ok(OffsetDateTime::now_utc().format(&Rfc3339)?)
}

fn key(id: DocId) -> [u8; 8] { id.to_be_bytes() }

/// Persistent meeting records, the source the keyword index is rebuilt from.
#[derive(Clone)]
pub struct MeetingStore {
    db: sled::Db,
    meetings: sled::Tree,
    // read-modify-write on a record must not interleave
    write_lock: Arc<Mutex<()>>,
}

impl MeetingStore {
    pub fn open(paths: &StorePaths) -> Result<Self> {
        std::fs::create_dir_all(&paths.root)?;
        let db = sled::open(paths.db()).with_context(|| format!("opening store at {}", paths.root.display()))?;
        let meetings = db.open_tree(MEETINGS_TREE)?;
        Ok(Self { db, meetings, write_lock: Arc::new(Mutex::new(())) })
    }

    pub fn create(&self, new: NewMeeting) -> Result<Meeting> {
        let datetime = normalize_datetime(&new.datetime)?;
        let ts = now()?;
        let _guard = self.write_lock.lock();
        // sled ids start at 0; meeting ids start at 1
        let id = self.db.generate_id()? + 1;
        let meeting = Meeting {
            id,
            title: new.title,
            datetime,
            participants: new.participants,
            raw_notes: new.raw_notes,
            created_at: ts.clone(),
            updated_at: ts,
        };
        self.put(&meeting)?;
        Ok(meeting)
    }

    pub fn get(&self, id: DocId) -> Result<Option<Meeting>> {
        match self.meetings.get(key(id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Apply the set fields of `update`. Returns `None` if no meeting has this id.
    pub fn update(&self, id: DocId, update: MeetingUpdate) -> Result<Option<Meeting>> {
        let datetime = update.datetime.as_deref().map(normalize_datetime).transpose()?;
        let _guard = self.write_lock.lock();
        let Some(mut meeting) = self.get(id)? else { return Ok(None) };
        if let Some(title) = update.title { meeting.title = title; }
        if let Some(datetime) = datetime { meeting.datetime = datetime; }
        if let Some(participants) = update.participants { meeting.participants = participants; }
        if let Some(raw_notes) = update.raw_notes { meeting.raw_notes = raw_notes; }
        meeting.updated_at = now()?;
        self.put(&meeting)?;
        Ok(Some(meeting))
    }

    pub fn delete(&self, id: DocId) -> Result<Option<Meeting>> {
        let _guard = self.write_lock.lock();
        match self.meetings.remove(key(id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every stored meeting, in id order.
    pub fn all(&self) -> Result<Vec<Meeting>> {
        let mut out = Vec::with_capacity(self.meetings.len());
        for entry in self.meetings.iter() {
            let (_k, bytes) = entry?;
            out.push(bincode::deserialize(&bytes)?);
        }
        Ok(out)
    }

    /// Meetings ordered by meeting datetime, most recent first.
    pub fn list(&self, skip: usize, limit: usize) -> Result<Vec<Meeting>> {
        let mut meetings = self.all()?;
        meetings.sort_by_cached_key(|m| std::cmp::Reverse((parse_datetime(&m.datetime).ok(), m.id)));
        Ok(meetings.into_iter().skip(skip).take(limit).collect())
    }

    pub fn len(&self) -> usize { self.meetings.len() }

    pub fn is_empty(&self) -> bool { self.meetings.is_empty() }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn put(&self, meeting: &Meeting) -> Result<()> {
        let bytes = bincode::serialize(meeting)?;
        self.meetings.insert(key(meeting.id), bytes)?;
        Ok(())
    }
}

/// Rebuild the keyword index from every stored meeting's notes.
pub fn build_index(store: &MeetingStore) -> Result<KeywordIndex> {
    let meetings = store.all()?;
    Ok(KeywordIndex::from_documents(meetings.into_iter().map(|m| (m.id, m.raw_notes))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_meeting(title: &str, datetime: &str, notes: &str) -> NewMeeting {
        NewMeeting { title: title.into(), datetime: datetime.into(), participants: "ana, bo".into(), raw_notes: notes.into() }
    }

    #[test]
    fn create_get_delete() {
        let dir = tempdir().unwrap();
        let store = MeetingStore::open(&StorePaths::new(dir.path())).unwrap();
        let m = store.create(new_meeting("Kickoff", "2024-03-01T10:00:00+01:00", "scope and budget")).unwrap();
        assert_eq!(m.datetime, "2024-03-01T09:00:00Z");
        assert_eq!(store.get(m.id).unwrap(), Some(m.clone()));
        assert_eq!(store.delete(m.id).unwrap(), Some(m.clone()));
        assert_eq!(store.get(m.id).unwrap(), None);
        assert_eq!(store.delete(m.id).unwrap(), None);
    }

    #[test]
    fn rejects_bad_datetime() {
        let dir = tempdir().unwrap();
        let store = MeetingStore::open(&StorePaths::new(dir.path())).unwrap();
        assert!(store.create(new_meeting("x", "yesterday", "notes")).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn update_is_partial() {
        let dir = tempdir().unwrap();
        let store = MeetingStore::open(&StorePaths::new(dir.path())).unwrap();
        let m = store.create(new_meeting("Sync", "2024-03-01T10:00:00Z", "old notes")).unwrap();
        let upd = MeetingUpdate { raw_notes: Some("new notes".into()), ..Default::default() };
        let updated = store.update(m.id, upd).unwrap().unwrap();
        assert_eq!(updated.title, "Sync");
        assert_eq!(updated.raw_notes, "new notes");
        assert!(store.update(999, MeetingUpdate::default()).unwrap().is_none());
    }

    #[test]
    fn list_orders_by_datetime_desc() {
        let dir = tempdir().unwrap();
        let store = MeetingStore::open(&StorePaths::new(dir.path())).unwrap();
        store.create(new_meeting("old", "2023-01-01T00:00:00Z", "a")).unwrap();
        store.create(new_meeting("new", "2024-06-01T00:00:00Z", "b")).unwrap();
        store.create(new_meeting("mid", "2023-09-01T00:00:00Z", "c")).unwrap();
        let titles: Vec<String> = store.list(0, 10).unwrap().into_iter().map(|m| m.title).collect();
        assert_eq!(titles, vec!["new", "mid", "old"]);
        assert_eq!(store.list(1, 1).unwrap()[0].title, "mid");
    }

    #[test]
    fn reopen_and_rebuild_index() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::new(dir.path());
        let id = {
            let store = MeetingStore::open(&paths).unwrap();
            let m = store.create(new_meeting("Retro", "2024-03-01T10:00:00Z", "deployment pipeline flaky")).unwrap();
            store.flush().unwrap();
            m.id
        };
        let store = MeetingStore::open(&paths).unwrap();
        let index = build_index(&store).unwrap();
        assert_eq!(index.search("pipeline").into_iter().collect::<Vec<_>>(), vec![id]);
    }
}
