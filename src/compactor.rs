use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that rewrites the ledger once enough appends have
/// accumulated since the last compaction. Keeps replay time bounded on a
/// long-running install.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        let appends = engine.ledger_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_ledger().await {
            Ok(()) => info!("compacted ledger after {appends} appends"),
            Err(e) => tracing::warn!("ledger compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_ledger(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("farmstead_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{name}_{}.ledger", Ulid::new()));
        let _ = std::fs::remove_file(&path);
        path
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn append_counter_resets_after_compaction() {
        let path = test_ledger("counter_reset");
        let engine = Arc::new(Engine::new(path, Arc::new(NotifyHub::new())).unwrap());

        let room = Ulid::new();
        engine
            .create_room(
                room,
                RoomDraft {
                    name: "Cottage".into(),
                    description: String::new(),
                    base_price: 3000,
                    capacity: 2,
                    amenities: vec![],
                    images: vec![],
                },
            )
            .await
            .unwrap();
        engine
            .reserve(ReserveRequest {
                room_id: room,
                guest_name: "Asha".into(),
                guest_phone: "+919900112233".into(),
                check_in: d("2030-06-10"),
                check_out: d("2030-06-12"),
                paid: false,
            })
            .await
            .unwrap();

        assert_eq!(engine.ledger_appends_since_compact().await, 2);
        engine.compact_ledger().await.unwrap();
        assert_eq!(engine.ledger_appends_since_compact().await, 0);
    }
}
