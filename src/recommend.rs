//! 推薦エンジン。
//!
//! [`Snapshot`] は準備済みの状態（コーパス・TF-IDF・人気スコア）を不変に保持し、
//! [`SnapshotHandle`] がそれを原子的に差し替えながら配信する。
pub mod engine;
pub mod handle;

use serde::{Deserialize, Serialize};

use crate::corpus::Article;

pub use engine::{PrepareOptions, QueryError, Snapshot};
pub use handle::{Served, ServingMode, SnapshotHandle};

/// 1件の推薦結果。クエリごとに生成され、永続化されない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub article_id: String,
    pub title: String,
    pub url: String,
    pub score: f64,
}

impl Recommendation {
    pub(crate) fn from_article(article: &Article, score: f64) -> Self {
        Self {
            article_id: article.page.clone(),
            title: article.title.clone(),
            url: article.url.clone(),
            score,
        }
    }
}
