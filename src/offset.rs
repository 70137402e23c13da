//! Binlog 처리 위치 추적 (Checkpoint 및 PositionTracker)
//!
//! Binlog 파일명 + 위치로 정확한 재시작 지점을 추적합니다.
//! 예: "mysql-bin.000003" 파일의 4097 바이트 위치

use crate::dispatcher::EventListener;
use crate::error::{CdcError, Result};
use crate::events::{BinlogEvent, BinlogEventData, EventType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// MySQL binlog 파일의 첫 이벤트 위치 (4 바이트 매직 넘버 다음)
pub const BINLOG_START_POSITION: u64 = 4;

/// 재시작 가능한 Binlog 위치
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Checkpoint {
    /// 바이너리 로그 파일명 (e.g., "mysql-bin.000001"). 모르면 빈 문자열
    pub filename: String,
    /// 바이트 위치
    pub position: u64,
}

impl Checkpoint {
    pub fn new(filename: impl Into<String>, position: u64) -> Self {
        Checkpoint {
            filename: filename.into(),
            position,
        }
    }

    /// 파일명에서 시퀀스 번호 추출
    pub fn file_sequence(&self) -> Option<u64> {
        self.filename
            .rsplit('.')
            .next()
            .and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename, self.position)
    }
}

/// Checkpoint 콜백
pub type CheckpointCallback = Box<dyn FnMut(Checkpoint) -> Result<()> + Send>;

/// 처리된 모든 이벤트의 위치를 추적하고 매 이벤트마다 Checkpoint를 내보낸다.
pub struct PositionTracker {
    filename: Option<String>,
    position: u64,
    callback: CheckpointCallback,
}

impl PositionTracker {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(Checkpoint) -> Result<()> + Send + 'static,
    {
        PositionTracker {
            filename: None,
            position: 0,
            callback: Box::new(callback),
        }
    }

    /// 저장된 위치에서 시작
    pub fn with_checkpoint(mut self, checkpoint: &Checkpoint) -> Self {
        self.seed(Some(checkpoint));
        self
    }

    /// 현재 위치
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            filename: self.filename.clone().unwrap_or_default(),
            position: self.position,
        }
    }

    fn seed(&mut self, checkpoint: Option<&Checkpoint>) {
        match checkpoint {
            Some(cp) => {
                self.filename = (!cp.filename.is_empty()).then(|| cp.filename.clone());
                self.position = cp.position;
            }
            None => {
                self.filename = None;
                self.position = 0;
            }
        }
    }

    fn advance(&mut self, event: &BinlogEvent) -> Result<()> {
        if event.event_type() == EventType::RotateEvent {
            let rotate = match &event.data {
                BinlogEventData::Rotate(rotate) => rotate,
                other => {
                    return Err(CdcError::MalformedPayload(format!(
                        "ROTATE event carries {} payload",
                        payload_kind(other)
                    )))
                }
            };

            info!(
                "Binlog rotated: {} -> {}:{}",
                self.checkpoint(),
                rotate.next_binlog_name,
                rotate.position
            );
            self.filename = Some(rotate.next_binlog_name.clone());
            self.position = rotate.position;
            return Ok(());
        }

        if !event.header.has_log_position() {
            return Ok(());
        }

        let next_pos = event.header.next_pos;
        if next_pos < self.position {
            warn!(
                "Ignoring {} at pos {}: behind current position {}",
                event.event_type(),
                next_pos,
                self.checkpoint()
            );
            return Ok(());
        }

        self.position = next_pos;
        Ok(())
    }
}

impl EventListener for PositionTracker {
    fn on_event(&mut self, event: &BinlogEvent) -> Result<()> {
        self.advance(event)?;

        let checkpoint = self.checkpoint();
        debug!("Checkpoint: {}", checkpoint);
        (self.callback)(checkpoint)
    }

    fn reset(&mut self, resume: Option<&Checkpoint>) {
        self.seed(resume);
    }
}

pub(crate) fn payload_kind(data: &BinlogEventData) -> &'static str {
    match data {
        BinlogEventData::TableMap(_) => "TableMap",
        BinlogEventData::WriteRows(_) => "WriteRows",
        BinlogEventData::UpdateRows(_) => "UpdateRows",
        BinlogEventData::DeleteRows(_) => "DeleteRows",
        BinlogEventData::Rotate(_) => "Rotate",
        BinlogEventData::Unknown(_) => "Unknown",
    }
}

/// 마지막 Checkpoint를 JSON 파일로 보관
///
/// 코어는 Checkpoint를 저장하지 않는다. 소비자가 콜백에서 직접 호출한다.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileCheckpointStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 저장된 Checkpoint 읽기. 파일이 없으면 None
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// 임시 파일에 쓴 뒤 rename 으로 교체
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&serde_json::to_vec(checkpoint)?)?;
        // rename 전에 내용이 디스크에 있어야 한다
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CellValue, Row, TableMapData, UpdatedRow};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn collecting_tracker() -> (PositionTracker, Arc<Mutex<Vec<Checkpoint>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let tracker = PositionTracker::new(move |cp| {
            sink.lock().push(cp);
            Ok(())
        });
        (tracker, seen)
    }

    fn row(value: i64) -> Row {
        [("c".to_string(), CellValue::from(value))].into_iter().collect()
    }

    #[test]
    fn test_checkpoint_file_sequence() {
        let cp = Checkpoint::new("mysql-bin.000123", 4096);
        assert_eq!(cp.file_sequence(), Some(123));
        assert_eq!(cp.to_string(), "mysql-bin.000123:4096");
    }

    #[test]
    fn test_rotate_switches_file_and_resets_position() {
        let (mut tracker, seen) = collecting_tracker();

        tracker
            .on_event(&BinlogEvent::write_rows(120, 1, vec![row(1)]))
            .unwrap();
        tracker
            .on_event(&BinlogEvent::rotate("log.2", 4))
            .unwrap();
        tracker
            .on_event(&BinlogEvent::update_rows(
                190,
                1,
                vec![UpdatedRow { before: row(1), after: row(2) }],
            ))
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], Checkpoint::new("", 120));
        assert_eq!(seen[1], Checkpoint::new("log.2", 4));
        assert_eq!(seen[2].filename, "log.2");
        assert!(seen[2].position >= 4);
    }

    #[test]
    fn test_positions_never_decrease_within_file() {
        let (tracker, seen) = collecting_tracker();
        let mut tracker = tracker.with_checkpoint(&Checkpoint::new("mysql-bin.000001", 4));

        for pos in [200, 350, 300, 500] {
            let event = BinlogEvent::table_map(pos, TableMapData::new(1, "db", "t"));
            tracker.on_event(&event).unwrap();
        }

        let positions: Vec<u64> = seen.lock().iter().map(|cp| cp.position).collect();
        assert_eq!(positions, vec![200, 350, 350, 500]);
        assert!(seen.lock().iter().all(|cp| cp.filename == "mysql-bin.000001"));
    }

    #[test]
    fn test_event_without_position_still_emits_checkpoint() {
        let (tracker, seen) = collecting_tracker();
        let mut tracker = tracker.with_checkpoint(&Checkpoint::new("mysql-bin.000001", 400));

        let mut event = BinlogEvent::table_map(0, TableMapData::new(1, "db", "t"));
        event.header.event_type = EventType::HeartbeatEvent;
        tracker.on_event(&event).unwrap();

        assert_eq!(*seen.lock(), vec![Checkpoint::new("mysql-bin.000001", 400)]);
    }

    #[test]
    fn test_rotate_with_wrong_payload_is_malformed() {
        let (mut tracker, seen) = collecting_tracker();
        let mut event = BinlogEvent::write_rows(100, 1, vec![]);
        event.header.event_type = EventType::RotateEvent;

        let err = tracker.on_event(&event).unwrap_err();
        assert!(matches!(err, CdcError::MalformedPayload(_)));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_reset_reseeds_from_resume_cursor() {
        let (mut tracker, _seen) = collecting_tracker();
        tracker
            .on_event(&BinlogEvent::rotate("mysql-bin.000007", 4))
            .unwrap();

        tracker.reset(Some(&Checkpoint::new("mysql-bin.000003", 1024)));
        assert_eq!(tracker.checkpoint(), Checkpoint::new("mysql-bin.000003", 1024));

        tracker.reset(None);
        assert_eq!(tracker.checkpoint(), Checkpoint::default());
    }

    #[test]
    fn test_file_checkpoint_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));

        assert_eq!(store.load().unwrap(), None);

        let cp = Checkpoint::new("mysql-bin.000002", 4321);
        store.save(&cp).unwrap();
        assert_eq!(store.load().unwrap(), Some(cp));
    }

    #[test]
    fn test_file_checkpoint_store_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let store = FileCheckpointStore::new(&path);

        store.save(&Checkpoint::new("mysql-bin.000002", 4321)).unwrap();
        store.save(&Checkpoint::new("mysql-bin.000003", 4)).unwrap();

        assert_eq!(store.load().unwrap(), Some(Checkpoint::new("mysql-bin.000003", 4)));
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
