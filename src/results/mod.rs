pub mod source;

pub use source::{ResultSource, StoredResults};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::db::models::Match;

/// Poll every source concurrently once and merge their finished matches by id.
/// Matches without a final result are dropped; a failing or slow source only loses its share.
pub async fn poll_sources(sources: &[Arc<dyn ResultSource>], timeout: Duration) -> Vec<Match> {
    let fetches: Vec<_> = sources
        .iter()
        .map(|s| {
            let s = Arc::clone(s);
            async move {
                let res = match tokio::time::timeout(timeout, s.fetch_finished()).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!("timed out after {:?}", timeout)),
                };
                (s.name().to_string(), res)
            }
        })
        .collect();

    let results = futures_util::future::join_all(fetches).await;

    let mut merged: HashMap<i64, Match> = HashMap::new();
    for (name, result) in results {
        match result {
            Ok(matches) => {
                for m in matches.into_iter().filter(|m| m.result().is_some()) {
                    merged.entry(m.id).or_insert(m);
                }
            }
            Err(e) => warn!("Result source '{}' failed: {}", name, e),
        }
    }

    let mut out: Vec<Match> = merged.into_values().collect();
    out.sort_by_key(|m| (m.kickoff, m.id));
    out
}

/// Spawns a background task that polls the result sources at `poll_interval` and sends
/// each finished match through the returned channel for settlement.
pub fn start_settlement_monitor(
    sources: Vec<Arc<dyn ResultSource>>,
    poll_interval: Duration,
) -> mpsc::Receiver<Match> {
    let (tx, rx) = mpsc::channel(256);

    tokio::spawn(async move {
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        info!(
            "Settlement monitor started ({} sources: {:?}, interval={:?})",
            sources.len(),
            names,
            poll_interval
        );
        let source_timeout = poll_interval.min(Duration::from_secs(10));
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let finished = poll_sources(&sources, source_timeout).await;
            if !finished.is_empty() {
                debug!("{} finished match(es) ready for settlement", finished.len());
            }
            for m in finished {
                if let Err(e) = tx.try_send(m) {
                    match e {
                        mpsc::error::TrySendError::Closed(_) => {
                            info!("Settlement channel closed, monitor stopping");
                            return;
                        }
                        mpsc::error::TrySendError::Full(m) => {
                            error!("Settlement channel full, match {} deferred to next poll", m.id);
                        }
                    }
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::MatchStatus;
    use crate::db::test_support::{played, upcoming};
    use async_trait::async_trait;

    struct Fixed(&'static str, Vec<Match>);

    #[async_trait]
    impl ResultSource for Fixed {
        async fn fetch_finished(&self) -> anyhow::Result<Vec<Match>> {
            Ok(self.1.clone())
        }
        fn name(&self) -> &str {
            self.0
        }
    }

    struct Broken;

    #[async_trait]
    impl ResultSource for Broken {
        async fn fetch_finished(&self) -> anyhow::Result<Vec<Match>> {
            anyhow::bail!("feed offline")
        }
        fn name(&self) -> &str {
            "broken"
        }
    }

    struct Hanging;

    #[async_trait]
    impl ResultSource for Hanging {
        async fn fetch_finished(&self) -> anyhow::Result<Vec<Match>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }
        fn name(&self) -> &str {
            "hanging"
        }
    }

    #[tokio::test]
    async fn test_merges_and_dedupes_by_match_id() {
        let mut live = upcoming(9, 1, 2);
        live.status = MatchStatus::Live;
        let sources: Vec<Arc<dyn ResultSource>> = vec![
            Arc::new(Fixed("a", vec![played(1, 10, 20, 2, 1, 0), played(2, 30, 40, 1, 0, 0)])),
            Arc::new(Fixed("b", vec![played(1, 10, 20, 2, 1, 0), live])),
            Arc::new(Broken),
        ];
        let merged = poll_sources(&sources, Duration::from_secs(1)).await;
        let ids: Vec<i64> = merged.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let sources: Vec<Arc<dyn ResultSource>> = vec![
            Arc::new(Hanging),
            Arc::new(Fixed("ok", vec![played(5, 10, 20, 1, 2, 2)])),
        ];
        let merged = poll_sources(&sources, Duration::from_millis(50)).await;
        assert_eq!(merged.len(), 1);
    }

    #[tokio::test]
    async fn test_monitor_forwards_finished_matches() {
        let sources: Vec<Arc<dyn ResultSource>> =
            vec![Arc::new(Fixed("ok", vec![played(7, 10, 20, 1, 3, 1)]))];
        let mut rx = start_settlement_monitor(sources, Duration::from_secs(60));
        let m = rx.recv().await.unwrap();
        assert_eq!(m.id, 7);
    }
}
