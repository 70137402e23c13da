//! CDC 관련 에러 타입

use thiserror::Error;
use std::io;

#[derive(Error, Debug)]
pub enum CdcError {
    #[error("잘못된 이벤트 페이로드: {0}")]
    MalformedPayload(String),

    #[error("콜백 실패: {0}")]
    Callback(String),

    #[error("클라이언트가 이미 시작되었습니다")]
    AlreadyStarted,

    #[error("스트림 작업 실패: {0}")]
    Worker(String),

    #[error("이벤트 소스 에러: {0}")]
    Transport(String),

    #[error("설정 에러: {0}")]
    Config(String),

    #[error("I/O 에러: {0}")]
    IoError(String),

    #[error("직렬화 에러: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("채널이 닫혔습니다")]
    ChannelClosed,
}

impl From<io::Error> for CdcError {
    fn from(err: io::Error) -> Self {
        CdcError::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CdcError>;
