use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Recommendation, Snapshot};
use crate::artifact::{ArtifactError, ArtifactSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServingMode {
    /// スナップショットが公開済み。
    Live,
    /// 利用可能なスナップショットがなく、空の結果を返している。
    Degraded,
}

/// 配信モード付きのクエリ結果。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Served {
    pub mode: ServingMode,
    pub recommendations: Vec<Recommendation>,
}

impl Served {
    fn degraded() -> Self {
        Self {
            mode: ServingMode::Degraded,
            recommendations: Vec::new(),
        }
    }
}

/// 現在のスナップショットを保持し、原子的に差し替える。
///
/// 読み手は [`Arc`] を複製してロックを解放するため、クエリ実行中に
/// [`publish`](Self::publish) が走っても、そのクエリは開始時点のスナップショットだけを見る。
#[derive(Debug, Default)]
pub struct SnapshotHandle {
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotHandle {
    /// スナップショットなし（劣化モード）で開始する。
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(snapshot))),
        }
    }

    /// 新しいスナップショットを公開し、直前のものを返す。
    pub fn publish(&self, snapshot: Snapshot) -> Option<Arc<Snapshot>> {
        let next = Arc::new(snapshot);
        let prepared_at = next.prepared_at();
        let previous = self.current.write().replace(next);
        info!(
            %prepared_at,
            replaced = previous.is_some(),
            "recommender snapshot published"
        );
        previous
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.read().clone()
    }

    #[must_use]
    pub fn mode(&self) -> ServingMode {
        if self.current.read().is_some() {
            ServingMode::Live
        } else {
            ServingMode::Degraded
        }
    }

    /// `source` から読み込んで公開する。失敗時は現在のスナップショットをそのまま残す。
    ///
    /// # Errors
    /// 取得・検証に失敗した場合は [`ArtifactError`]。
    pub fn reload_from(&self, source: &dyn ArtifactSource) -> Result<(), ArtifactError> {
        match source.load() {
            Ok(snapshot) => {
                self.publish(snapshot);
                Ok(())
            }
            Err(error) => {
                warn!(
                    source = %source.describe(),
                    %error,
                    corrupt = error.is_corrupt(),
                    mode = ?self.mode(),
                    "snapshot reload failed, keeping current state"
                );
                Err(error)
            }
        }
    }

    #[must_use]
    pub fn recommend_for_user(&self, user_id: &str, n: usize) -> Served {
        self.serve(|snapshot| snapshot.recommend_for_user(user_id, n))
    }

    #[must_use]
    pub fn recommend_popular(&self, n: usize) -> Served {
        self.serve(|snapshot| snapshot.recommend_popular(n))
    }

    #[must_use]
    pub fn recommend_similar(&self, article_id: &str, n: usize) -> Served {
        self.serve(|snapshot| snapshot.recommend_similar(article_id, n))
    }

    fn serve<F>(&self, query: F) -> Served
    where
        F: FnOnce(&Snapshot) -> Vec<Recommendation>,
    {
        match self.current() {
            Some(snapshot) => Served {
                mode: ServingMode::Live,
                recommendations: query(&snapshot),
            },
            None => {
                debug!("no snapshot loaded, serving degraded response");
                Served::degraded()
            }
        }
    }
}
