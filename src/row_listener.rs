//! 행 이벤트 재구성
//!
//! 가장 최근의 TABLE_MAP 이벤트를 기억해 두었다가, 뒤따르는 WRITE/UPDATE/DELETE_ROWS
//! 이벤트에 데이터베이스/테이블 정보를 붙여 [`RowChange`]로 만듭니다.
//!
//! 테이블 정보는 table_id 로 찾지 않고 로그 순서상 바로 앞의 TABLE_MAP 에서 가져온다.
//! 행 이벤트의 table_id 와 슬롯의 table_id 가 같은지도 검사하지 않는다.

use crate::dispatcher::EventListener;
use crate::error::{CdcError, Result};
use crate::events::{BinlogEvent, BinlogEventData, ChangeType, EventType, RowChange, RowData, TableMapData};
use crate::offset::{payload_kind, Checkpoint};
use tracing::{debug, trace};

/// 이 리스너가 구독하는 이벤트 타입
pub const ROW_LISTENER_EVENTS: [EventType; 4] = [
    EventType::TableMapEvent,
    EventType::WriteRowsEvent,
    EventType::UpdateRowsEvent,
    EventType::DeleteRowsEvent,
];

/// 행 변경 콜백
pub type RowCallback = Box<dyn FnMut(RowChange) -> Result<()> + Send>;

/// 행 재구성 엔진. 스트림 하나당 인스턴스 하나
pub struct RowEventListener {
    table_map: Option<TableMapData>,
    callback: RowCallback,
}

impl RowEventListener {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(RowChange) -> Result<()> + Send + 'static,
    {
        RowEventListener {
            table_map: None,
            callback: Box::new(callback),
        }
    }

    /// 현재 기억 중인 테이블 맵
    pub fn current_table(&self) -> Option<&TableMapData> {
        self.table_map.as_ref()
    }

    /// 행 이벤트를 RowChange로 변환. 행 이벤트가 아니면 None
    pub fn build_row_change(&self, event: &BinlogEvent) -> Result<Option<RowChange>> {
        let Some(change_type) = ChangeType::from_event_type(event.event_type()) else {
            return Ok(None);
        };

        let (table_id, rows) = match (change_type, &event.data) {
            (ChangeType::WriteRows, BinlogEventData::WriteRows(data))
            | (ChangeType::DeleteRows, BinlogEventData::DeleteRows(data)) => {
                (data.table_id, RowData::Rows(data.rows.clone()))
            }
            (ChangeType::UpdateRows, BinlogEventData::UpdateRows(data)) => {
                (data.table_id, RowData::Updates(data.rows.clone()))
            }
            (_, other) => {
                return Err(CdcError::MalformedPayload(format!(
                    "{} event carries {} payload",
                    change_type,
                    payload_kind(other)
                )))
            }
        };

        let (database, table) = match &self.table_map {
            Some(table_map) => (table_map.database.clone(), table_map.table.clone()),
            None => {
                debug!(
                    "{} for table_id {} arrived before any TABLE_MAP",
                    change_type, table_id
                );
                (String::new(), String::new())
            }
        };

        Ok(Some(RowChange {
            change_type,
            table_id,
            database,
            table,
            rows,
            timestamp: event.header.timestamp,
            position: event.header.next_pos,
        }))
    }
}

impl EventListener for RowEventListener {
    fn on_event(&mut self, event: &BinlogEvent) -> Result<()> {
        if event.event_type() == EventType::TableMapEvent {
            return match &event.data {
                BinlogEventData::TableMap(data) => {
                    trace!("Table map: {}.{} (id={})", data.database, data.table, data.table_id);
                    self.table_map = Some(data.clone());
                    Ok(())
                }
                other => Err(CdcError::MalformedPayload(format!(
                    "TABLE_MAP event carries {} payload",
                    payload_kind(other)
                ))),
            };
        }

        // 구독 목록 밖에서 넘어온 이벤트
        if !event.event_type().is_row_event() {
            trace!("Ignoring {} event", event.event_type());
            return Ok(());
        }

        match self.build_row_change(event)? {
            Some(change) => {
                debug!(
                    "{} {}.{}: {} row(s)",
                    change.change_type,
                    change.database,
                    change.table,
                    change.rows.len()
                );
                (self.callback)(change)
            }
            None => Ok(()),
        }
    }

    fn reset(&mut self, _resume: Option<&Checkpoint>) {
        self.table_map = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CellValue, Row, UpdatedRow};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn collecting_listener() -> (RowEventListener, Arc<Mutex<Vec<RowChange>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener = RowEventListener::new(move |change| {
            sink.lock().push(change);
            Ok(())
        });
        (listener, seen)
    }

    fn row(value: i64) -> Row {
        [("c".to_string(), CellValue::from(value))].into_iter().collect()
    }

    #[test]
    fn test_write_rows_gets_table_identity() {
        let (mut listener, seen) = collecting_listener();

        listener
            .on_event(&BinlogEvent::table_map(100, TableMapData::new(5, "shop", "orders")))
            .unwrap();
        listener
            .on_event(&BinlogEvent::write_rows(150, 5, vec![row(1), row(2)]))
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        let change = &seen[0];
        assert_eq!(change.change_type.as_str(), "WRITE_ROWS");
        assert_eq!(change.table_id, 5);
        assert_eq!(change.database, "shop");
        assert_eq!(change.table, "orders");
        assert_eq!(change.rows, RowData::Rows(vec![row(1), row(2)]));
        assert_eq!(change.position, 150);
    }

    #[test]
    fn test_row_event_without_table_map_is_degraded() {
        let (mut listener, seen) = collecting_listener();

        listener
            .on_event(&BinlogEvent::delete_rows(90, 3, vec![row(7)]))
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen[0].change_type, ChangeType::DeleteRows);
        assert_eq!(seen[0].database, "");
        assert_eq!(seen[0].table, "");
        assert!(!seen[0].has_table_identity());
    }

    #[test]
    fn test_update_rows_preserve_pairs_and_order() {
        let (mut listener, seen) = collecting_listener();
        let updates = vec![
            UpdatedRow { before: row(1), after: row(2) },
            UpdatedRow { before: row(3), after: row(4) },
        ];

        listener
            .on_event(&BinlogEvent::table_map(10, TableMapData::new(1, "db", "t")))
            .unwrap();
        listener
            .on_event(&BinlogEvent::update_rows(20, 1, updates.clone()))
            .unwrap();

        assert_eq!(seen.lock()[0].rows, RowData::Updates(updates));
        assert_eq!(seen.lock()[0].change_type.as_str(), "UPDATE_ROWS");
    }

    #[test]
    fn test_interleaved_tables_use_preceding_table_map() {
        let (mut listener, seen) = collecting_listener();
        let stream = vec![
            BinlogEvent::table_map(10, TableMapData::new(1, "A", "X")),
            BinlogEvent::write_rows(20, 1, vec![row(1)]),
            BinlogEvent::table_map(30, TableMapData::new(2, "B", "Y")),
            BinlogEvent::write_rows(40, 2, vec![row(2)]),
        ];

        for event in &stream {
            listener.on_event(event).unwrap();
        }

        let identities: Vec<(String, String)> = seen
            .lock()
            .iter()
            .map(|c| (c.database.clone(), c.table.clone()))
            .collect();
        assert_eq!(
            identities,
            vec![
                ("A".to_string(), "X".to_string()),
                ("B".to_string(), "Y".to_string())
            ]
        );
    }

    #[test]
    fn test_table_id_mismatch_is_not_validated() {
        let (mut listener, seen) = collecting_listener();

        listener
            .on_event(&BinlogEvent::table_map(10, TableMapData::new(1, "db", "first")))
            .unwrap();
        listener
            .on_event(&BinlogEvent::write_rows(20, 99, vec![row(1)]))
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen[0].table_id, 99);
        assert_eq!(seen[0].table, "first");
    }

    #[test]
    fn test_same_event_twice_yields_identical_changes() {
        let (mut listener, seen) = collecting_listener();
        let event = BinlogEvent::write_rows(20, 1, vec![row(1)]);

        listener.on_event(&event).unwrap();
        listener.on_event(&event).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
    }

    #[test]
    fn test_other_events_are_ignored() {
        let (mut listener, seen) = collecting_listener();

        listener
            .on_event(&BinlogEvent::rotate("mysql-bin.000002", 4))
            .unwrap();
        let xid = BinlogEvent {
            header: crate::events::EventHeader::new(EventType::XidEvent, 90),
            data: BinlogEventData::Unknown(vec![0x01]),
        };
        listener.on_event(&xid).unwrap();

        assert!(seen.lock().is_empty());
        assert!(listener.current_table().is_none());
    }

    #[test]
    fn test_malformed_row_payload_is_an_error() {
        let (mut listener, seen) = collecting_listener();
        let mut event = BinlogEvent::write_rows(20, 1, vec![row(1)]);
        event.header.event_type = EventType::UpdateRowsEvent;

        let err = listener.on_event(&event).unwrap_err();
        assert!(matches!(err, CdcError::MalformedPayload(_)));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_callback_failure_propagates() {
        let mut listener = RowEventListener::new(|_change| Err(CdcError::Callback("sink down".into())));

        let err = listener
            .on_event(&BinlogEvent::write_rows(20, 1, vec![row(1)]))
            .unwrap_err();
        assert!(matches!(err, CdcError::Callback(_)));
    }

    #[test]
    fn test_reset_drops_table_map() {
        let (mut listener, seen) = collecting_listener();

        listener
            .on_event(&BinlogEvent::table_map(10, TableMapData::new(1, "db", "t")))
            .unwrap();
        listener.reset(None);
        listener
            .on_event(&BinlogEvent::write_rows(20, 1, vec![row(1)]))
            .unwrap();

        assert_eq!(seen.lock()[0].table, "");
    }
}
