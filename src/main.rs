//! Binlog 행 변경 스트림 사용 예제
//!
//! JSON Lines 파일에 기록된 binlog 이벤트를 재생하면서 행 변경을 출력하고,
//! CHECKPOINT_FILE 이 지정되면 매 이벤트마다 위치를 저장해 다음 실행 때 이어서 처리합니다.

use binlog_rows::{BinlogClient, CdcError, ClientConfig, FileCheckpointStore, JsonLinesSource};
use std::env;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 초기화
    tracing_subscriber::fmt::init();

    let config = ClientConfig::from_env()?;
    let replay_file = env::var("REPLAY_FILE")
        .map_err(|_| CdcError::Config("REPLAY_FILE is not set".to_string()))?;

    let store = env::var("CHECKPOINT_FILE").ok().map(FileCheckpointStore::new);

    let mut client = BinlogClient::new(config, JsonLinesSource::new(&replay_file));

    // 저장된 위치가 있으면 환경 변수보다 우선
    if let Some(store) = &store {
        if let Some(cp) = store.load()? {
            info!("Resuming from saved checkpoint {}", cp);
            client.set_binlog_filename(cp.filename);
            client.set_binlog_position(cp.position);
        }
    }

    client.on_row_event(|change| {
        println!("{}", serde_json::to_string(&change)?);
        Ok(())
    })?;

    if let Some(store) = store {
        client.on_save_position(move |cp| store.save(&cp))?;
    }

    info!("Replaying binlog events from {}", replay_file);
    client.run().await?;

    if let Some(cp) = client.checkpoint() {
        info!("Stopped at {}", cp);
    }

    Ok(())
}
