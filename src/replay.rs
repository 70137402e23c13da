//! 미리 파싱된 이벤트를 공급하는 EventSource 구현들
//!
//! - [`ChannelSource`]: 메모리 내 채널로 이벤트를 공급 (테스트, 임베딩용)
//! - [`JsonLinesSource`]: 한 줄에 하나씩 직렬화된 `BinlogEvent` 파일을 재생

use crate::binlog_client::{EventSource, EventStream};
use crate::config::{ClientConfig, DEFAULT_EVENT_BUFFER};
use crate::error::{CdcError, Result};
use crate::events::{BinlogEvent, BinlogEventData};
use crate::offset::Checkpoint;
use std::collections::VecDeque;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// 메모리 채널 이벤트 소스
///
/// `session()` 하나가 `open()` 한 번에 대응한다.
pub struct ChannelSource {
    capacity: usize,
    sessions: VecDeque<EventStream>,
    resume_requests: Vec<Option<Checkpoint>>,
}

impl Default for ChannelSource {
    fn default() -> Self {
        ChannelSource::with_capacity(DEFAULT_EVENT_BUFFER)
    }
}

impl ChannelSource {
    pub fn new() -> Self {
        ChannelSource::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ChannelSource {
            capacity,
            sessions: VecDeque::new(),
            resume_requests: Vec::new(),
        }
    }

    /// 다음 open() 에 쓰일 채널을 만들고 송신측을 돌려준다
    pub fn session(&mut self) -> mpsc::Sender<Result<BinlogEvent>> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.sessions.push_back(rx);
        tx
    }

    /// open() 이 받은 재시작 위치들
    pub fn resume_requests(&self) -> &[Option<Checkpoint>] {
        &self.resume_requests
    }
}

impl EventSource for ChannelSource {
    fn open(&mut self, _config: &ClientConfig, resume: Option<&Checkpoint>) -> Result<EventStream> {
        self.resume_requests.push(resume.cloned());
        self.sessions
            .pop_front()
            .ok_or_else(|| CdcError::Transport("no pending channel session".to_string()))
    }
}

/// JSON Lines 파일 재생 소스
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonLinesSource { path: path.into() }
    }

    async fn replay(
        path: PathBuf,
        resume: Option<Checkpoint>,
        tx: &mpsc::Sender<Result<BinlogEvent>>,
    ) -> Result<usize> {
        let file = File::open(&path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut filter = ResumeFilter::new(resume.clone());
        let mut sent = 0;

        // 서버와 같이 재시작 위치를 알리는 로테이트 이벤트를 먼저 보낸다
        if let Some(cp) = resume {
            tx.send(Ok(BinlogEvent::rotate(cp.filename, cp.position)))
                .await
                .map_err(|_| CdcError::ChannelClosed)?;
        }

        let mut line_no = 0;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }

            let event: BinlogEvent = serde_json::from_str(&line).map_err(|e| {
                CdcError::MalformedPayload(format!("{}:{}: {}", path.display(), line_no, e))
            })?;

            if !filter.admit(&event) {
                continue;
            }

            // 채널이 가득 차면 소비자가 따라올 때까지 기다린다
            tx.send(Ok(event)).await.map_err(|_| CdcError::ChannelClosed)?;
            sent += 1;
        }

        if let Some(target) = filter.missed() {
            warn!(
                "Resume file of {} never appeared in {}; no events replayed",
                target,
                path.display()
            );
        }

        Ok(sent)
    }
}

impl EventSource for JsonLinesSource {
    fn open(&mut self, config: &ClientConfig, resume: Option<&Checkpoint>) -> Result<EventStream> {
        if !self.path.is_file() {
            return Err(CdcError::Transport(format!(
                "replay file not found: {}",
                self.path.display()
            )));
        }

        let (tx, rx) = mpsc::channel(config.event_buffer);
        let path = self.path.clone();
        let resume = resume.cloned();

        info!("Replaying {} from {:?}", path.display(), resume);

        tokio::spawn(async move {
            match Self::replay(path, resume, &tx).await {
                Ok(sent) => info!("Replay finished: {} event(s)", sent),
                Err(CdcError::ChannelClosed) => debug!("Replay stopped: receiver dropped"),
                Err(e) => {
                    error!("Replay error: {}", e);
                    // 클라이언트가 이 에러로 스트림을 끝낸다
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        Ok(rx)
    }
}

/// 재시작 위치 이전의 이벤트를 걸러낸다
struct ResumeFilter {
    target: Option<Checkpoint>,
    current_file: String,
    in_target_file: bool,
    reached: bool,
}

impl ResumeFilter {
    fn new(target: Option<Checkpoint>) -> Self {
        let reached = target.is_none();
        ResumeFilter {
            target,
            current_file: String::new(),
            in_target_file: false,
            reached,
        }
    }

    fn admit(&mut self, event: &BinlogEvent) -> bool {
        if self.reached {
            return true;
        }
        let Some(target) = &self.target else {
            return true;
        };

        if let BinlogEventData::Rotate(rotate) = &event.data {
            self.current_file = rotate.next_binlog_name.clone();
            if self.current_file == target.filename {
                self.in_target_file = true;
            } else if self.in_target_file {
                // 대상 파일을 지나쳤다
                self.reached = true;
            }
            return self.reached;
        }

        if self.current_file == target.filename {
            self.in_target_file = true;
            if event.header.next_pos > target.position {
                self.reached = true;
            }
        }

        self.reached
    }

    /// 대상 파일을 한 번도 만나지 못했으면 그 위치.
    /// 대상 파일의 마지막 이벤트에서 재시작한 경우는 해당하지 않는다.
    fn missed(&self) -> Option<&Checkpoint> {
        if self.reached || self.in_target_file {
            None
        } else {
            self.target.as_ref()
        }
    }
}
