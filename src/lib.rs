//! MySQL Binlog 행 변경 스트림
//!
//! 전송 계층이 넘겨주는 binlog 이벤트에서 행 단위 변경(INSERT/UPDATE/DELETE)과
//! 재시작 가능한 위치(파일명 + 오프셋)를 만들어 냅니다.
//! 주요 기능:
//! - 이벤트 타입별 리스너 디스패치
//! - TABLE_MAP 을 이용한 행 이벤트 재구성
//! - 로그 로테이션을 따라가는 Checkpoint 추적
//! - 콜백 등록 및 start/stop, 재시작 위치 관리

pub mod binlog_client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod offset;
pub mod replay;
pub mod row_listener;

pub use binlog_client::{BinlogClient, EventSource, EventStream};
pub use config::{ClientConfig, ConnectionConfig};
pub use dispatcher::{Dispatcher, EventListener, Subscription};
pub use error::{CdcError, Result};
pub use events::{BinlogEvent, ChangeType, EventType, RowChange, RowData};
pub use offset::{Checkpoint, FileCheckpointStore, PositionTracker};
pub use replay::{ChannelSource, JsonLinesSource};
pub use row_listener::RowEventListener;
