//! MySQL Binlog 이벤트 타입 및 데이터 구조 정의
//!
//! 전송 계층이 이미 (헤더, 페이로드) 쌍으로 파싱한 이벤트를 표현합니다.
//! 바이트 단위 파싱은 이 크레이트의 범위가 아닙니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// MySQL Binlog 이벤트 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventType {
    /// 알 수 없는 이벤트
    Unknown = 0,
    /// 쿼리 이벤트 (DDL, BEGIN 등)
    QueryEvent = 2,
    /// 로테이션 이벤트 (새 binlog 파일)
    RotateEvent = 4,
    /// 포맷 설명 이벤트
    FormatDescriptionEvent = 15,
    /// XID 이벤트 (커밋)
    XidEvent = 16,
    /// 테이블 맵 이벤트 (스키마 정보)
    TableMapEvent = 19,
    /// 하트비트 이벤트
    HeartbeatEvent = 27,
    /// WRITE_ROWS 이벤트 (INSERT)
    WriteRowsEvent = 30,
    /// UPDATE_ROWS 이벤트 (UPDATE)
    UpdateRowsEvent = 31,
    /// DELETE_ROWS 이벤트 (DELETE)
    DeleteRowsEvent = 32,
    /// GTID 이벤트
    GtidEvent = 33,
    /// 익명 GTID 이벤트
    AnonymousGtidEvent = 34,
    /// Rows Query 이벤트 (원본 쿼리)
    RowsQueryEvent = 36,
}

impl EventType {
    pub fn from_u8(val: u8) -> Self {
        match val {
            2 => EventType::QueryEvent,
            4 => EventType::RotateEvent,
            15 => EventType::FormatDescriptionEvent,
            16 => EventType::XidEvent,
            19 => EventType::TableMapEvent,
            27 => EventType::HeartbeatEvent,
            30 => EventType::WriteRowsEvent,
            31 => EventType::UpdateRowsEvent,
            32 => EventType::DeleteRowsEvent,
            33 => EventType::GtidEvent,
            34 => EventType::AnonymousGtidEvent,
            36 => EventType::RowsQueryEvent,
            _ => EventType::Unknown,
        }
    }

    /// 이벤트 타입 라벨 (예: "WRITE_ROWS")
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Unknown => "UNKNOWN",
            EventType::QueryEvent => "QUERY",
            EventType::RotateEvent => "ROTATE",
            EventType::FormatDescriptionEvent => "FORMAT_DESCRIPTION",
            EventType::XidEvent => "XID",
            EventType::TableMapEvent => "TABLE_MAP",
            EventType::HeartbeatEvent => "HEARTBEAT",
            EventType::WriteRowsEvent => "WRITE_ROWS",
            EventType::UpdateRowsEvent => "UPDATE_ROWS",
            EventType::DeleteRowsEvent => "DELETE_ROWS",
            EventType::GtidEvent => "GTID",
            EventType::AnonymousGtidEvent => "ANONYMOUS_GTID",
            EventType::RowsQueryEvent => "ROWS_QUERY",
        }
    }

    /// WRITE/UPDATE/DELETE_ROWS 여부
    pub fn is_row_event(&self) -> bool {
        matches!(
            self,
            EventType::WriteRowsEvent | EventType::UpdateRowsEvent | EventType::DeleteRowsEvent
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binlog 이벤트 헤더
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    /// 이벤트 타임스탬프 (초 단위)
    pub timestamp: u32,
    /// 이벤트 타입
    pub event_type: EventType,
    /// MySQL 서버 ID
    pub server_id: u32,
    /// 이벤트 길이 (바이트)
    pub event_length: u32,
    /// 다음 이벤트 위치. 0이면 위치 정보가 없는 인공 이벤트
    pub next_pos: u64,
    /// 이벤트 플래그
    pub flags: u16,
}

impl EventHeader {
    pub fn new(event_type: EventType, next_pos: u64) -> Self {
        EventHeader {
            timestamp: 0,
            event_type,
            server_id: 0,
            event_length: 0,
            next_pos,
            flags: 0,
        }
    }

    /// 로그 위치를 가진 이벤트인지 여부
    pub fn has_log_position(&self) -> bool {
        self.next_pos > 0
    }
}

/// 테이블 맵 정보 (컬럼 메타데이터)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMapData {
    /// 테이블 ID
    pub table_id: u64,
    /// 데이터베이스명
    pub database: String,
    /// 테이블명
    pub table: String,
    /// 컬럼 타입들
    #[serde(default)]
    pub column_types: Vec<u8>,
    /// nullable 비트맵
    #[serde(default)]
    pub nullable_bitmap: Vec<u8>,
}

impl TableMapData {
    pub fn new(table_id: u64, database: impl Into<String>, table: impl Into<String>) -> Self {
        TableMapData {
            table_id,
            database: database.into(),
            table: table.into(),
            column_types: Vec::new(),
            nullable_bitmap: Vec::new(),
        }
    }
}

/// 컬럼명 -> 값 매핑 (한 행)
pub type Row = HashMap<String, CellValue>;

/// WRITE_ROWS / DELETE_ROWS 이벤트 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowsData {
    /// 테이블 ID
    pub table_id: u64,
    /// 플래그
    #[serde(default)]
    pub flags: u16,
    /// 행 데이터들
    pub rows: Vec<Row>,
}

/// UPDATE 된 한 행의 변경 전후 값
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedRow {
    pub before: Row,
    pub after: Row,
}

/// UPDATE_ROWS 이벤트 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRowsData {
    /// 테이블 ID
    pub table_id: u64,
    /// 플래그
    #[serde(default)]
    pub flags: u16,
    /// 변경 전후 데이터 쌍들
    pub rows: Vec<UpdatedRow>,
}

/// 셀 값 (다양한 MySQL 타입 지원)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    Date(String),
    Time(String),
    Decimal(String),
    Json(serde_json::Value),
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int64(value)
    }
}

/// 회전 이벤트 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotateEventData {
    /// 새 바이너리 로그 파일명
    pub next_binlog_name: String,
    /// 새 파일의 시작 위치
    pub position: u64,
}

/// 이벤트 타입별 페이로드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BinlogEventData {
    TableMap(TableMapData),
    WriteRows(RowsData),
    UpdateRows(UpdateRowsData),
    DeleteRows(RowsData),
    Rotate(RotateEventData),
    Unknown(Vec<u8>),
}

/// 완성된 Binlog 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinlogEvent {
    /// 이벤트 헤더
    pub header: EventHeader,
    /// 이벤트 데이터
    pub data: BinlogEventData,
}

impl BinlogEvent {
    pub fn table_map(next_pos: u64, data: TableMapData) -> Self {
        BinlogEvent {
            header: EventHeader::new(EventType::TableMapEvent, next_pos),
            data: BinlogEventData::TableMap(data),
        }
    }

    pub fn write_rows(next_pos: u64, table_id: u64, rows: Vec<Row>) -> Self {
        BinlogEvent {
            header: EventHeader::new(EventType::WriteRowsEvent, next_pos),
            data: BinlogEventData::WriteRows(RowsData { table_id, flags: 0, rows }),
        }
    }

    pub fn update_rows(next_pos: u64, table_id: u64, rows: Vec<UpdatedRow>) -> Self {
        BinlogEvent {
            header: EventHeader::new(EventType::UpdateRowsEvent, next_pos),
            data: BinlogEventData::UpdateRows(UpdateRowsData { table_id, flags: 0, rows }),
        }
    }

    pub fn delete_rows(next_pos: u64, table_id: u64, rows: Vec<Row>) -> Self {
        BinlogEvent {
            header: EventHeader::new(EventType::DeleteRowsEvent, next_pos),
            data: BinlogEventData::DeleteRows(RowsData { table_id, flags: 0, rows }),
        }
    }

    /// 로테이트 이벤트. MySQL과 같이 헤더 위치는 0(인공 이벤트)으로 둔다.
    pub fn rotate(next_binlog_name: impl Into<String>, position: u64) -> Self {
        BinlogEvent {
            header: EventHeader::new(EventType::RotateEvent, 0),
            data: BinlogEventData::Rotate(RotateEventData {
                next_binlog_name: next_binlog_name.into(),
                position,
            }),
        }
    }

    pub fn event_type(&self) -> EventType {
        self.header.event_type
    }
}

/// 행 변경 종류. 직렬화 라벨은 원본 이벤트 타입 라벨과 같다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    WriteRows,
    UpdateRows,
    DeleteRows,
}

impl ChangeType {
    pub fn from_event_type(event_type: EventType) -> Option<Self> {
        match event_type {
            EventType::WriteRowsEvent => Some(ChangeType::WriteRows),
            EventType::UpdateRowsEvent => Some(ChangeType::UpdateRows),
            EventType::DeleteRowsEvent => Some(ChangeType::DeleteRows),
            _ => None,
        }
    }

    /// 원본 이벤트 타입 라벨 ("WRITE_ROWS" 등)
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::WriteRows => "WRITE_ROWS",
            ChangeType::UpdateRows => "UPDATE_ROWS",
            ChangeType::DeleteRows => "DELETE_ROWS",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 변경 타입에 따라 모양이 달라지는 행 목록
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowData {
    /// WRITE_ROWS / DELETE_ROWS
    Rows(Vec<Row>),
    /// UPDATE_ROWS
    Updates(Vec<UpdatedRow>),
}

impl RowData {
    pub fn len(&self) -> usize {
        match self {
            RowData::Rows(rows) => rows.len(),
            RowData::Updates(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 행 변경 이벤트 (application-level view)
///
/// 행 이벤트 하나당 하나씩 만들어지며, 콜백에 넘겨진 뒤에는 호출자가 소유합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    /// 변경 종류
    pub change_type: ChangeType,
    /// 테이블 ID
    pub table_id: u64,
    /// 데이터베이스명 (테이블 맵을 아직 못 봤으면 빈 문자열)
    pub database: String,
    /// 테이블명 (테이블 맵을 아직 못 봤으면 빈 문자열)
    pub table: String,
    /// 영향받은 행들
    pub rows: RowData,
    /// 원본 이벤트 타임스탬프 (초 단위)
    pub timestamp: u32,
    /// 원본 이벤트의 로그 위치
    pub position: u64,
}

impl RowChange {
    pub fn has_table_identity(&self) -> bool {
        !self.database.is_empty() || !self.table.is_empty()
    }
}
