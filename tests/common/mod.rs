//! 統合テスト用のコーパス生成ヘルパー。
#![allow(dead_code)]

use std::path::Path;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tempfile::TempDir;

/// テスト全体で使う基準時刻。
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    now() - TimeDelta::days(days)
}

#[derive(Debug, Clone)]
pub struct NewsRow {
    pub page: String,
    pub title: String,
    pub body: String,
    pub caption: String,
    pub published_at: DateTime<Utc>,
}

impl NewsRow {
    pub fn new(page: &str, text: &str, published_at: DateTime<Utc>) -> Self {
        Self {
            page: page.to_string(),
            title: text.to_string(),
            body: format!("{text} {text}"),
            caption: String::new(),
            published_at,
        }
    }
}

/// 一時ディレクトリに itens-parte*.csv / treino_parte*.csv を書き出す。
pub struct CorpusFixture {
    dir: TempDir,
}

impl CorpusFixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn news_partition(&self, index: usize, rows: &[NewsRow]) -> &Self {
        let path = self.dir.path().join(format!("itens-parte{index}.csv"));
        let mut writer = csv::Writer::from_path(path).expect("open news partition");
        writer
            .write_record(["Page", "url", "issued", "title", "body", "caption"])
            .expect("write header");
        for row in rows {
            let url = format!("https://g1.example/{}", row.page);
            let issued = row.published_at.format("%Y-%m-%d %H:%M:%S%:z").to_string();
            writer
                .write_record([
                    row.page.as_str(),
                    url.as_str(),
                    issued.as_str(),
                    row.title.as_str(),
                    row.body.as_str(),
                    row.caption.as_str(),
                ])
                .expect("write news row");
        }
        writer.flush().expect("flush news partition");
        self
    }

    pub fn user_partition(&self, index: usize, rows: &[(&str, Vec<&str>)]) -> &Self {
        let path = self.dir.path().join(format!("treino_parte{index}.csv"));
        let mut writer = csv::Writer::from_path(path).expect("open user partition");
        writer
            .write_record(["userId", "userType", "history"])
            .expect("write header");
        for (user_id, history) in rows {
            writer
                .write_record([*user_id, "Logged", history.join(", ").as_str()])
                .expect("write user row");
        }
        writer.flush().expect("flush user partition");
        self
    }
}

fn repeat<'a>(page: &'a str, times: usize) -> Vec<&'a str> {
    std::iter::repeat_n(page, times).collect()
}

/// 6 記事（r1, r2 だけが直近 2 日以内）と 3 ユーザーの標準コーパス。
///
/// 人気順は o1 > o2 > r2 > o3 > r1 > o4。
pub fn standard_corpus() -> CorpusFixture {
    let fixture = CorpusFixture::new();
    fixture
        .news_partition(
            1,
            &[
                NewsRow::new("o1", "eleição presidencial debate candidatos", days_ago(10)),
                NewsRow::new("o2", "economia juros inflação banco central", days_ago(12)),
                NewsRow::new("o3", "futebol final campeonato flamengo", days_ago(20)),
            ],
        )
        .news_partition(
            2,
            &[
                NewsRow::new("o4", "tecnologia celular lançamento", days_ago(30)),
                NewsRow::new("r1", "chuva previsão tempo frente fria", days_ago(0)),
                NewsRow::new("r2", "futebol campeonato rodada flamengo vence", days_ago(1)),
                // duplicate of o1 in a later partition, dropped
                NewsRow::new("o1", "duplicated headline", days_ago(0)),
            ],
        );

    let mut heavy = repeat("o1", 20);
    heavy.extend(repeat("o2", 12));
    heavy.extend(repeat("r2", 3));
    fixture
        .user_partition(1, &[("heavy", heavy), ("new", Vec::new())])
        .user_partition(
            2,
            &[
                ("sports", {
                    let mut history = repeat("o3", 4);
                    history.push("r1");
                    history
                }),
                ("reader", vec!["o2", "o4", "o3"]),
            ],
        );
    fixture
}
