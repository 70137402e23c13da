//! Binlog 클라이언트
//!
//! 전송 계층([`EventSource`])이 넘겨주는 이벤트 스트림을 디스패처에 흘려 보내고,
//! 콜백 등록, 재시작 위치, start/stop 생명주기를 관리합니다.
//!
//! 이벤트는 한 번에 하나씩, 도착 순서대로 처리됩니다. 콜백이 느리면 스트림 전체가 멈추고,
//! 채널이 가득 차면 소스도 기다립니다.

use crate::config::ClientConfig;
use crate::dispatcher::{Dispatcher, EventListener};
use crate::error::{CdcError, Result};
use crate::events::{BinlogEvent, EventType, RowChange};
use crate::offset::{Checkpoint, CheckpointCallback, PositionTracker};
use crate::row_listener::{RowEventListener, ROW_LISTENER_EVENTS};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// 소스가 넘겨주는 이벤트 스트림. 소스 쪽 에러도 같은 채널로 온다.
pub type EventStream = mpsc::Receiver<Result<BinlogEvent>>;

/// 프로토콜 이벤트 공급자 (네트워크 연결, 인증, 바이트 파싱은 구현체 몫)
pub trait EventSource: Send {
    /// 스트림 열기. `resume`이 있으면 정확히 그 위치부터 이벤트를 보내야 한다.
    ///
    /// 채널은 `config.event_buffer` 크기로 제한하고, 읽기 실패는 `Err`로 보낸 뒤 닫는다.
    fn open(&mut self, config: &ClientConfig, resume: Option<&Checkpoint>) -> Result<EventStream>;
}

type SharedCallbacks = Arc<Mutex<Vec<CheckpointCallback>>>;

struct Worker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<()>>,
    // 스트림이 끝나면 리스너가 여기로 돌아온다
    returned: Arc<Mutex<Option<Dispatcher>>>,
}

/// Binlog 클라이언트
pub struct BinlogClient<S: EventSource> {
    id: Uuid,
    config: ClientConfig,
    source: S,
    dispatcher: Option<Dispatcher>,
    checkpoint_callbacks: SharedCallbacks,
    latest: Arc<RwLock<Option<Checkpoint>>>,
    worker: Option<Worker>,
}

impl<S: EventSource> BinlogClient<S> {
    /// 새 Binlog 클라이언트 생성
    pub fn new(config: ClientConfig, source: S) -> Self {
        BinlogClient {
            id: Uuid::new_v4(),
            config,
            source,
            dispatcher: Some(Dispatcher::new()),
            checkpoint_callbacks: Arc::new(Mutex::new(Vec::new())),
            latest: Arc::new(RwLock::new(None)),
            worker: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// 행 변경 콜백 등록
    pub fn on_row_event<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(RowChange) -> Result<()> + Send + 'static,
    {
        self.dispatcher_mut()?
            .register(ROW_LISTENER_EVENTS, RowEventListener::new(callback));
        Ok(())
    }

    /// Checkpoint 콜백 등록
    ///
    /// 등록 순서와 상관없이 한 이벤트의 모든 리스너가 성공한 뒤에만 호출된다.
    pub fn on_save_position<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(Checkpoint) -> Result<()> + Send + 'static,
    {
        self.dispatcher_mut()?;
        self.checkpoint_callbacks.lock().push(Box::new(callback));
        Ok(())
    }

    /// 임의의 리스너 등록
    pub fn on_event<L>(&mut self, types: impl IntoIterator<Item = EventType>, listener: L) -> Result<()>
    where
        L: EventListener + 'static,
    {
        self.dispatcher_mut()?.register(types, listener);
        Ok(())
    }

    pub fn set_binlog_filename(&mut self, filename: impl Into<String>) {
        self.config.binlog_filename = Some(filename.into());
    }

    pub fn set_binlog_position(&mut self, position: u64) {
        self.config.binlog_position = Some(position);
    }

    /// 마지막으로 완전히 처리된 이벤트의 위치. 아직 없으면 재시작 위치
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.latest
            .read()
            .clone()
            .or_else(|| self.config.resume_checkpoint())
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|worker| !worker.handle.is_finished())
            .unwrap_or(false)
    }

    /// 현재 태스크에서 스트림이 끝날 때까지 처리. 첫 에러를 그대로 돌려준다.
    pub async fn run(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(CdcError::AlreadyStarted);
        }
        self.reap().await;
        let (dispatcher, tracker, rx) = self.open_stream()?;

        // 송신측을 잡고 있어 run() 에서는 종료 신호가 오지 않는다
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();
        let span = info_span!("binlog_client", id = %self.id);
        let (dispatcher, result) = stream_events(dispatcher, tracker, rx, shutdown_rx)
            .instrument(span)
            .await;

        self.finish(dispatcher);
        result
    }

    /// 백그라운드 태스크에서 스트림 시작
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(CdcError::AlreadyStarted);
        }
        self.reap().await;

        let (dispatcher, tracker, rx) = self.open_stream()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let returned = Arc::new(Mutex::new(None));
        let slot = returned.clone();
        let span = info_span!("binlog_client", id = %self.id);
        let handle = tokio::spawn(
            async move {
                let (dispatcher, result) =
                    stream_events(dispatcher, tracker, rx, shutdown_rx).await;
                *slot.lock() = Some(dispatcher);
                result
            }
            .instrument(span),
        );

        self.worker = Some(Worker {
            shutdown: shutdown_tx,
            handle,
            returned,
        });
        Ok(())
    }

    /// 스트림 중지. 여러 번 호출하거나 시작 전에 호출해도 된다.
    /// 스트림이 에러로 끝났다면 그 에러를 돌려준다.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            debug!("Client {} is not running", self.id);
            return Ok(());
        };

        info!("Stopping binlog client {}", self.id);
        // 이미 끝난 태스크는 수신측을 버렸을 수 있다
        let Worker {
            shutdown,
            handle,
            returned,
        } = worker;
        let _ = shutdown.send(());
        self.join(handle, returned).await
    }

    /// 등록용 디스패처. 스스로 끝난 워커가 있으면 리스너를 먼저 되찾는다.
    /// 워커의 결과는 다음 stop() 이 돌려준다.
    fn dispatcher_mut(&mut self) -> Result<&mut Dispatcher> {
        if self.is_running() {
            return Err(CdcError::AlreadyStarted);
        }

        let returned = self
            .worker
            .as_ref()
            .and_then(|worker| worker.returned.lock().take());
        if let Some(dispatcher) = returned {
            self.finish(dispatcher);
        }

        self.dispatcher
            .as_mut()
            .ok_or_else(|| CdcError::Worker("listeners were lost by a failed stream".to_string()))
    }

    fn open_stream(&mut self) -> Result<(Dispatcher, PositionTracker, EventStream)> {
        let resume = self.config.resume_checkpoint();
        match &resume {
            Some(cp) => info!("Starting binlog stream {} from {}", self.id, cp),
            None => info!("Starting binlog stream {} from server position", self.id),
        }

        let mut dispatcher = self
            .dispatcher
            .take()
            .ok_or_else(|| CdcError::Worker("listeners were lost by a failed stream".to_string()))?;

        let rx = match self.source.open(&self.config, resume.as_ref()) {
            Ok(rx) => rx,
            Err(e) => {
                self.dispatcher = Some(dispatcher);
                return Err(e);
            }
        };

        dispatcher.reset(resume.as_ref());
        *self.latest.write() = None;

        // 사용자 Checkpoint 콜백은 디스패치가 모두 성공한 뒤 이 트래커에서만 불린다
        let latest = self.latest.clone();
        let callbacks = self.checkpoint_callbacks.clone();
        let mut tracker = PositionTracker::new(move |cp: Checkpoint| {
            for callback in callbacks.lock().iter_mut() {
                callback(cp.clone())?;
            }
            *latest.write() = Some(cp);
            Ok(())
        });
        tracker.reset(resume.as_ref());

        Ok((dispatcher, tracker, rx))
    }

    /// 스스로 끝난 워커 정리
    async fn reap(&mut self) {
        if let Some(worker) = self.worker.take() {
            if let Err(e) = self.join(worker.handle, worker.returned).await {
                warn!("Previous binlog stream {} ended with error: {}", self.id, e);
            }
        }
    }

    async fn join(
        &mut self,
        handle: JoinHandle<Result<()>>,
        returned: Arc<Mutex<Option<Dispatcher>>>,
    ) -> Result<()> {
        match handle.await {
            Ok(result) => {
                let returned = returned.lock().take();
                if let Some(dispatcher) = returned {
                    self.finish(dispatcher);
                }
                result
            }
            Err(e) => {
                error!("Binlog stream {} panicked: {}", self.id, e);
                Err(CdcError::Worker(e.to_string()))
            }
        }
    }

    /// 다음 시작을 위해 리스너를 되돌려 받고 마지막 위치를 재시작 위치로 삼는다
    fn finish(&mut self, dispatcher: Dispatcher) {
        self.dispatcher = Some(dispatcher);

        let latest = self.latest.read().clone();
        if let Some(cp) = latest {
            if !cp.filename.is_empty() {
                debug!("Resume cursor for {} is now {}", self.id, cp);
                self.config.binlog_filename = Some(cp.filename);
                self.config.binlog_position = Some(cp.position);
            }
        }
    }
}

async fn stream_events(
    mut dispatcher: Dispatcher,
    mut tracker: PositionTracker,
    mut rx: EventStream,
    mut shutdown: oneshot::Receiver<()>,
) -> (Dispatcher, Result<()>) {
    let mut event_count: u64 = 0;

    let result = loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Stop requested");
                break Ok(());
            }
            event = rx.recv() => {
                let event = match event {
                    Some(Ok(event)) => event,
                    Some(Err(e)) => {
                        error!("Event source failed at {}: {}", tracker.checkpoint(), e);
                        break Err(e);
                    }
                    None => {
                        info!("Event source closed");
                        break Ok(());
                    }
                };

                // 위치는 모든 리스너가 성공한 뒤에만 전진한다
                if let Err(e) = dispatcher
                    .dispatch(&event)
                    .and_then(|_| tracker.on_event(&event))
                {
                    error!("Failed to process {} at {}: {}", event.event_type(), tracker.checkpoint(), e);
                    break Err(e);
                }
                event_count += 1;
            }
        }
    };

    info!(
        "Binlog streaming ended. Total events processed: {}, position: {}",
        event_count,
        tracker.checkpoint()
    );
    (dispatcher, result)
}
