//! 클라이언트 설정

use crate::error::{CdcError, Result};
use crate::offset::{Checkpoint, BINLOG_START_POSITION};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// MySQL 연결 설정. 전송 계층에 그대로 전달된다.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub server_id: u32,
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            hostname: "localhost".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            server_id: 1,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ConnectionConfig {
    pub fn new(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        ConnectionConfig {
            hostname: hostname.into(),
            username: username.into(),
            ..Default::default()
        }
    }
}

/// 이벤트 소스와 클라이언트 사이 채널의 기본 크기
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Binlog 클라이언트 설정
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connection: ConnectionConfig,
    /// 재시작할 binlog 파일명
    pub binlog_filename: Option<String>,
    /// 재시작할 위치
    pub binlog_position: Option<u64>,
    /// 처리 대기 중인 이벤트 최대 개수. 가득 차면 소스가 기다린다.
    pub event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            connection: ConnectionConfig::default(),
            binlog_filename: None,
            binlog_position: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl ClientConfig {
    pub fn new(connection: ConnectionConfig) -> Self {
        ClientConfig {
            connection,
            ..Default::default()
        }
    }

    /// 환경 변수에서 설정 읽기
    ///
    /// `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_SERVER_ID`,
    /// `BINLOG_FILENAME`, `BINLOG_POSITION`, `EVENT_BUFFER`
    pub fn from_env() -> Result<Self> {
        let defaults = ConnectionConfig::default();

        let connection = ConnectionConfig {
            hostname: env::var("DB_HOST").unwrap_or(defaults.hostname),
            port: parse_var("DB_PORT")?.unwrap_or(defaults.port),
            username: env::var("DB_USER").unwrap_or(defaults.username),
            password: env::var("DB_PASSWORD").unwrap_or(defaults.password),
            server_id: parse_var("DB_SERVER_ID")?.unwrap_or(defaults.server_id),
            timeout: defaults.timeout,
        };

        Ok(ClientConfig {
            connection,
            binlog_filename: env::var("BINLOG_FILENAME").ok().filter(|s| !s.is_empty()),
            binlog_position: parse_var("BINLOG_POSITION")?,
            event_buffer: event_buffer(parse_var("EVENT_BUFFER")?)?,
        })
    }

    /// 재시작 위치. 파일명이 없으면 None (서버의 현재 위치부터)
    pub fn resume_checkpoint(&self) -> Option<Checkpoint> {
        self.binlog_filename.as_ref().map(|filename| {
            Checkpoint::new(
                filename.clone(),
                self.binlog_position.unwrap_or(BINLOG_START_POSITION),
            )
        })
    }
}

fn event_buffer(value: Option<usize>) -> Result<usize> {
    match value {
        Some(0) => Err(CdcError::Config("EVENT_BUFFER must be at least 1".to_string())),
        Some(size) => Ok(size),
        None => Ok(DEFAULT_EVENT_BUFFER),
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CdcError::Config(format!("{} is not valid: {:?}", name, value))),
        Err(_) => Ok(None),
    }
}
