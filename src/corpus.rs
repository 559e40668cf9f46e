//! 記事とユーザーのコーパス。
//!
//! 読み込み直後のレコードを重複排除し、ID から行位置への索引を一度だけ構築する。
pub mod loader;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

pub use loader::{CorpusLoader, PartitionKind, PrepareError};

/// ニュース記事。`page` がキー。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub page: String,
    pub title: String,
    pub body: String,
    pub caption: Option<String>,
    pub published_at: DateTime<Utc>,
    pub url: String,
}

impl Article {
    /// TF-IDF 用の結合テキスト（title, body, caption の順）。
    #[must_use]
    pub fn content_text(&self) -> String {
        format!(
            "{} {} {}",
            self.title,
            self.body,
            self.caption.as_deref().unwrap_or_default()
        )
    }
}

/// ユーザーと閲覧履歴（古い順）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub history: Vec<String>,
}

impl User {
    #[must_use]
    pub fn history_size(&self) -> usize {
        self.history.len()
    }

    /// 最後に閲覧した記事。
    #[must_use]
    pub fn last_visited(&self) -> Option<&str> {
        self.history.last().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    articles: Vec<Article>,
    users: Vec<User>,
    article_rows: FxHashMap<String, usize>,
    user_rows: FxHashMap<String, usize>,
}

impl Corpus {
    /// 記事とユーザーを重複排除してコーパスを作る。
    ///
    /// 同じキーが複数回現れた場合は最初の行を残す。入力順は保たれる。
    #[must_use]
    pub fn new(articles: Vec<Article>, users: Vec<User>) -> Self {
        let (articles, article_rows) = dedup_first_wins(articles, |article| &article.page);
        let (users, user_rows) = dedup_first_wins(users, |user| &user.user_id);
        Self {
            articles,
            users,
            article_rows,
            user_rows,
        }
    }

    #[must_use]
    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    #[must_use]
    pub fn users(&self) -> &[User] {
        &self.users
    }

    #[must_use]
    pub fn article(&self, page: &str) -> Option<&Article> {
        self.article_row(page).map(|row| &self.articles[row])
    }

    #[must_use]
    pub fn article_row(&self, page: &str) -> Option<usize> {
        self.article_rows.get(page).copied()
    }

    #[must_use]
    pub fn user(&self, user_id: &str) -> Option<&User> {
        self.user_rows.get(user_id).map(|&row| &self.users[row])
    }

    /// 索引と行が一致しているかを検証する。アーティファクト読み込み時に使う。
    pub(crate) fn check_consistency(&self) -> Result<(), String> {
        if self.article_rows.len() != self.articles.len() {
            return Err(format!(
                "article index has {} entries for {} articles",
                self.article_rows.len(),
                self.articles.len()
            ));
        }
        if self.user_rows.len() != self.users.len() {
            return Err(format!(
                "user index has {} entries for {} users",
                self.user_rows.len(),
                self.users.len()
            ));
        }
        for (row, article) in self.articles.iter().enumerate() {
            if self.article_rows.get(&article.page) != Some(&row) {
                return Err(format!("article {} is not indexed at row {row}", article.page));
            }
        }
        for (row, user) in self.users.iter().enumerate() {
            if self.user_rows.get(&user.user_id) != Some(&row) {
                return Err(format!("user {} is not indexed at row {row}", user.user_id));
            }
        }
        Ok(())
    }
}

fn dedup_first_wins<T, F>(records: Vec<T>, key: F) -> (Vec<T>, FxHashMap<String, usize>)
where
    F: Fn(&T) -> &String,
{
    let mut rows: FxHashMap<String, usize> = FxHashMap::default();
    let mut kept = Vec::with_capacity(records.len());
    for record in records {
        if rows.contains_key(key(&record)) {
            continue;
        }
        rows.insert(key(&record).clone(), kept.len());
        kept.push(record);
    }
    (kept, rows)
}
