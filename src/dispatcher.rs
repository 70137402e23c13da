//! 이벤트 디스패처
//!
//! 이벤트 타입별로 등록된 리스너에게 이벤트를 동기적으로 전달합니다.
//! 리스너는 등록 순서대로 호출되며, 하나가 실패하면 그 이벤트의 나머지 리스너는
//! 호출되지 않고 에러가 호출자에게 그대로 전파됩니다.

use crate::error::Result;
use crate::events::{BinlogEvent, EventType};
use crate::offset::Checkpoint;
use std::collections::HashSet;
use tracing::trace;

/// 프로토콜 이벤트를 소비하는 리스너
pub trait EventListener: Send {
    fn on_event(&mut self, event: &BinlogEvent) -> Result<()>;

    /// 스트림이 (재)시작될 때 호출됨
    fn reset(&mut self, _resume: Option<&Checkpoint>) {}
}

impl<F> EventListener for F
where
    F: FnMut(&BinlogEvent) -> Result<()> + Send,
{
    fn on_event(&mut self, event: &BinlogEvent) -> Result<()> {
        self(event)
    }
}

/// 리스너가 구독하는 이벤트 범위
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    /// 모든 이벤트
    All,
    /// 지정한 타입만
    Types(HashSet<EventType>),
}

impl Subscription {
    pub fn types(types: impl IntoIterator<Item = EventType>) -> Self {
        Subscription::Types(types.into_iter().collect())
    }

    pub fn matches(&self, event_type: EventType) -> bool {
        match self {
            Subscription::All => true,
            Subscription::Types(types) => types.contains(&event_type),
        }
    }
}

struct Registration {
    subscription: Subscription,
    listener: Box<dyn EventListener>,
}

/// 이벤트 디스패처
#[derive(Default)]
pub struct Dispatcher {
    registrations: Vec<Registration>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher::default()
    }

    /// 지정한 이벤트 타입들에 리스너 등록
    pub fn register<L>(&mut self, types: impl IntoIterator<Item = EventType>, listener: L)
    where
        L: EventListener + 'static,
    {
        self.register_with(Subscription::types(types), listener);
    }

    /// 모든 이벤트 타입에 리스너 등록
    pub fn register_all<L>(&mut self, listener: L)
    where
        L: EventListener + 'static,
    {
        self.register_with(Subscription::All, listener);
    }

    pub fn register_with<L>(&mut self, subscription: Subscription, listener: L)
    where
        L: EventListener + 'static,
    {
        self.registrations.push(Registration {
            subscription,
            listener: Box::new(listener),
        });
    }

    /// 이벤트를 구독 중인 리스너들에게 등록 순서대로 전달
    pub fn dispatch(&mut self, event: &BinlogEvent) -> Result<()> {
        let event_type = event.event_type();
        trace!("Dispatching {} (pos={})", event_type, event.header.next_pos);

        for registration in &mut self.registrations {
            if registration.subscription.matches(event_type) {
                registration.listener.on_event(event)?;
            }
        }

        Ok(())
    }

    /// 모든 리스너에게 스트림 재시작 알림
    pub fn reset(&mut self, resume: Option<&Checkpoint>) {
        for registration in &mut self.registrations {
            registration.listener.reset(resume);
        }
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CdcError;
    use crate::events::TableMapData;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> impl EventListener {
        let log = log.clone();
        move |event: &BinlogEvent| -> Result<()> {
            log.lock().push(format!("{}:{}", name, event.event_type()));
            Ok(())
        }
    }

    #[test]
    fn test_dispatch_routes_by_type_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.register([EventType::WriteRowsEvent], recorder(&log, "rows"));
        dispatcher.register_all(recorder(&log, "all"));
        dispatcher.register([EventType::RotateEvent], recorder(&log, "rotate"));

        dispatcher
            .dispatch(&BinlogEvent::write_rows(100, 1, vec![]))
            .unwrap();
        dispatcher
            .dispatch(&BinlogEvent::rotate("mysql-bin.000002", 4))
            .unwrap();

        assert_eq!(
            *log.lock(),
            vec!["rows:WRITE_ROWS", "all:WRITE_ROWS", "all:ROTATE", "rotate:ROTATE"]
        );
    }

    #[test]
    fn test_failing_listener_aborts_dispatch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_all(recorder(&log, "first"));
        dispatcher.register_all(|_: &BinlogEvent| -> Result<()> {
            Err(CdcError::Callback("boom".to_string()))
        });
        dispatcher.register_all(recorder(&log, "third"));

        let event = BinlogEvent::table_map(50, TableMapData::new(1, "db", "t"));
        let err = dispatcher.dispatch(&event).unwrap_err();

        assert!(matches!(err, CdcError::Callback(_)));
        assert_eq!(*log.lock(), vec!["first:TABLE_MAP"]);
    }

    #[test]
    fn test_unsubscribed_event_is_ignored() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.register([EventType::TableMapEvent], recorder(&log, "tm"));

        dispatcher
            .dispatch(&BinlogEvent::delete_rows(10, 1, vec![]))
            .unwrap();

        assert!(log.lock().is_empty());
        assert_eq!(dispatcher.len(), 1);
    }
}
